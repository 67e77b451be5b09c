// Copyright (C) 2026 Daniel Mueller <deso@posteo.net>
// SPDX-License-Identifier: GPL-3.0-or-later

mod common;

use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;

use evpump::AppContext;
use evpump::DragGate;
use evpump::DragSourceGate;
use evpump::Error;
use evpump::Event;
use evpump::EventFilter;
use evpump::EventId;
use evpump::EventSequencer;
use evpump::FilterAction;
use evpump::Pump;

use common::post;
use common::run_on;
use common::settle;
use common::shutdown;
use common::spawn_pump;
use common::DragExcludedSource;
use common::TestSource;
use common::TestSourceBuilder;


/// A filter rejecting all events of a certain kind.
#[derive(Debug)]
struct Rejecting {
  id: EventId,
  rejected: Mutex<Vec<(EventId, bool)>>,
}

impl Rejecting {
  fn new(id: EventId) -> Arc<Self> {
    Arc::new(Self {
      id,
      rejected: Mutex::new(Vec::new()),
    })
  }

  fn rejections(&self) -> Vec<(EventId, bool)> {
    self.rejected.lock().unwrap().clone()
  }
}

impl EventFilter for Rejecting {
  fn accept_event(&self, event: &Event) -> FilterAction {
    if event.id() == self.id {
      FilterAction::Reject
    } else {
      FilterAction::Accept
    }
  }

  fn rejected(&self, event: Event) {
    self
      .rejected
      .lock()
      .unwrap()
      .push((event.id(), event.is_consumed()))
  }
}

/// A filter inspecting and extending the pump's filters while
/// evaluating events.
#[derive(Debug)]
struct Installing {
  installs: Arc<Rejecting>,
  counts: Mutex<Vec<usize>>,
}

impl EventFilter for Installing {
  fn accept_event(&self, _event: &Event) -> FilterAction {
    if let Some(pump) = Pump::current() {
      self.counts.lock().unwrap().push(pump.filter_count());
      let _added = pump.add_event_filter(Arc::clone(&self.installs) as Arc<dyn EventFilter>);
    }
    FilterAction::Accept
  }
}


#[test]
fn dispatch_in_posting_order() {
  let (_sequencer, context, pump) = spawn_pump("order");
  assert_eq!(pump.name(), "EventDispatchThread-order");
  assert!(!pump.is_dispatch_thread());

  let source = TestSource::new();
  for i in 0..5u8 {
    post(&pump, Event::new(EventId::KEY_PRESSED, &source).with_payload([i]));
  }
  settle(&pump);

  let payloads = source.payloads();
  assert_eq!(payloads, vec![vec![0], vec![1], vec![2], vec![3], vec![4]]);
  assert!(run_on(&pump, || Pump::current().is_some()));
  assert_eq!(run_on(&pump, || Pump::current().map(|pump| pump.nesting_depth())), Some(1));

  shutdown(&context, &pump);
}

#[test]
fn rejected_events_are_consumed_and_skipped() {
  let (_sequencer, context, pump) = spawn_pump("reject");
  let filter = Rejecting::new(EventId::KEY_RELEASED);
  assert!(pump.add_event_filter(Arc::clone(&filter) as Arc<dyn EventFilter>));
  assert!(!pump.add_event_filter(Arc::clone(&filter) as Arc<dyn EventFilter>));
  assert_eq!(pump.filter_count(), 1);

  let source = TestSource::new();
  post(&pump, Event::new(EventId::KEY_RELEASED, &source));
  post(&pump, Event::new(EventId::KEY_PRESSED, &source));
  settle(&pump);

  assert_eq!(source.received(), vec![EventId::KEY_PRESSED]);
  assert_eq!(filter.rejections(), vec![(EventId::KEY_RELEASED, true)]);

  let filter = Arc::clone(&filter) as Arc<dyn EventFilter>;
  assert!(pump.remove_event_filter(&filter));
  assert!(!pump.remove_event_filter(&filter));

  post(&pump, Event::new(EventId::KEY_RELEASED, &source));
  settle(&pump);
  assert_eq!(
    source.received(),
    vec![EventId::KEY_PRESSED, EventId::KEY_RELEASED]
  );

  shutdown(&context, &pump);
}

#[test]
fn panics_and_errors_go_to_uncaught_handler() {
  let errors = Arc::new(Mutex::new(Vec::new()));
  let sequencer = EventSequencer::new();
  let context = AppContext::new("uncaught", &sequencer);
  let pump = {
    let errors = Arc::clone(&errors);
    Pump::builder(&context)
      .name("uncaught-pump")
      .uncaught_handler(move |name: &str, error: &Error| {
        let entry = match error {
          Error::Panicked { id, .. } => (name.to_string(), *id),
          Error::Dispatch { id, .. } => (name.to_string(), *id),
          _ => panic!("unexpected error: {error}"),
        };
        errors.lock().unwrap().push(entry)
      })
      .spawn()
      .unwrap()
  };

  let source = TestSourceBuilder::new()
    .handler(|event| match event.id() {
      EventId::KEY_TYPED => panic!("key typed"),
      EventId::KEY_RELEASED => Err(Error::dispatch(event.id(), "key released")),
      _ => Ok(()),
    })
    .build();

  post(&pump, Event::new(EventId::KEY_TYPED, &source));
  post(&pump, Event::new(EventId::KEY_RELEASED, &source));
  post(&pump, Event::new(EventId::KEY_PRESSED, &source));
  settle(&pump);

  assert_eq!(
    source.received(),
    vec![EventId::KEY_TYPED, EventId::KEY_RELEASED, EventId::KEY_PRESSED]
  );
  assert_eq!(
    *errors.lock().unwrap(),
    vec![
      ("uncaught-pump".to_string(), EventId::KEY_TYPED),
      ("uncaught-pump".to_string(), EventId::KEY_RELEASED),
    ]
  );
  assert!(pump.keep_dispatching());

  shutdown(&context, &pump);
}

#[test]
fn fatal_error_terminates_pump() {
  let (_sequencer, _context, pump) = spawn_pump("fatal");
  let source = TestSourceBuilder::new()
    .handler(|_event| Err(Error::Fatal("enough".to_string())))
    .build();

  post(&pump, Event::new(EventId::KEY_PRESSED, &source));
  let result = pump.join();
  assert!(matches!(result, Err(Error::Fatal(message)) if message == "enough"));
  assert!(!pump.keep_dispatching());
}

#[test]
fn filters_may_change_filters() {
  let (_sequencer, context, pump) = spawn_pump("reentrant");
  let rejecting = Rejecting::new(EventId::KEY_TYPED);
  let installing = Arc::new(Installing {
    installs: Arc::clone(&rejecting),
    counts: Mutex::new(Vec::new()),
  });
  assert!(pump.add_event_filter(Arc::clone(&installing) as Arc<dyn EventFilter>));

  let source = TestSource::new();
  post(&pump, Event::new(EventId::KEY_PRESSED, &source));
  post(&pump, Event::new(EventId::KEY_TYPED, &source));
  settle(&pump);

  assert_eq!(source.received(), vec![EventId::KEY_PRESSED]);
  assert_eq!(installing.counts.lock().unwrap()[..2], [1, 2]);
  assert_eq!(rejecting.rejections(), vec![(EventId::KEY_TYPED, true)]);
  assert_eq!(pump.filter_count(), 2);

  shutdown(&context, &pump);
}

#[test]
fn nested_pump_with_filter() {
  let (_sequencer, context, pump) = spawn_pump("nested");
  let filter = Rejecting::new(EventId::KEY_TYPED);
  let done = Arc::new(AtomicBool::new(false));
  let depth = Arc::new(AtomicUsize::new(0));
  let filters = Arc::new(AtomicUsize::new(0));

  let source = {
    let filter = Arc::clone(&filter) as Arc<dyn EventFilter>;
    let done = Arc::clone(&done);
    let depth = Arc::clone(&depth);
    let filters = Arc::clone(&filters);

    TestSourceBuilder::new()
      .handler(move |event| {
        let pump = Pump::current().unwrap();
        match event.id() {
          EventId::FOCUS_GAINED => {
            let done = Arc::clone(&done);
            pump.pump_events_for_filter(&move || !done.load(Ordering::SeqCst), Arc::clone(&filter))
          },
          EventId::MOUSE_CLICKED => {
            depth.store(pump.nesting_depth(), Ordering::SeqCst);
            filters.store(pump.filter_count(), Ordering::SeqCst);
            done.store(true, Ordering::SeqCst);
            Ok(())
          },
          _ => Ok(()),
        }
      })
      .build()
  };

  post(&pump, Event::new(EventId::FOCUS_GAINED, &source));
  post(&pump, Event::new(EventId::KEY_TYPED, &source));
  post(&pump, Event::new(EventId::KEY_PRESSED, &source));
  post(&pump, Event::new(EventId::MOUSE_CLICKED, &source));
  settle(&pump);

  assert_eq!(
    source.received(),
    vec![EventId::FOCUS_GAINED, EventId::KEY_PRESSED, EventId::MOUSE_CLICKED]
  );
  assert_eq!(filter.rejections(), vec![(EventId::KEY_TYPED, false)]);
  assert_eq!(depth.load(Ordering::SeqCst), 2);
  assert_eq!(filters.load(Ordering::SeqCst), 1);
  // The nested pump's filter is gone together with it.
  assert_eq!(pump.filter_count(), 0);

  post(&pump, Event::new(EventId::KEY_TYPED, &source));
  settle(&pump);
  assert_eq!(source.received().last(), Some(&EventId::KEY_TYPED));

  shutdown(&context, &pump);
}

#[test]
fn nested_pump_for_id_leaves_other_events() {
  let (_sequencer, context, pump) = spawn_pump("for-id");
  let count = Arc::new(AtomicUsize::new(0));

  let source = {
    let count = Arc::clone(&count);
    TestSourceBuilder::new()
      .handler(move |event| {
        match event.id() {
          EventId::FOCUS_GAINED => {
            let pump = Pump::current().unwrap();
            let count = Arc::clone(&count);
            pump.pump_events_for_id(EventId::KEY_PRESSED, &move || count.load(Ordering::SeqCst) < 2)?
          },
          EventId::KEY_PRESSED => {
            let _count = count.fetch_add(1, Ordering::SeqCst);
          },
          _ => (),
        }
        Ok(())
      })
      .build()
  };

  post(&pump, Event::new(EventId::FOCUS_GAINED, &source));
  post(&pump, Event::new(EventId::KEY_TYPED, &source));
  post(&pump, Event::new(EventId::KEY_PRESSED, &source).with_payload([1u8]));
  post(&pump, Event::new(EventId::KEY_PRESSED, &source).with_payload([2u8]));
  settle(&pump);

  assert_eq!(
    source.received(),
    vec![
      EventId::FOCUS_GAINED,
      EventId::KEY_PRESSED,
      EventId::KEY_PRESSED,
      EventId::KEY_TYPED,
    ]
  );
  assert_eq!(source.payloads()[1..3], [vec![1], vec![2]]);

  shutdown(&context, &pump);
}

#[test]
fn interrupt_stops_innermost_level() {
  let (_sequencer, context, pump) = spawn_pump("interrupt");
  let returned = Arc::new(AtomicBool::new(false));

  let source = {
    let returned = Arc::clone(&returned);
    TestSourceBuilder::new()
      .handler(move |_event| {
        let pump = Pump::current().unwrap();
        pump.pump_events(&|| true)?;
        returned.store(true, Ordering::SeqCst);
        Ok(())
      })
      .build()
  };

  post(&pump, Event::new(EventId::FOCUS_GAINED, &source));
  let depth = run_on(&pump, || Pump::current().unwrap().nesting_depth());
  assert_eq!(depth, 2);
  assert!(!returned.load(Ordering::SeqCst));

  pump.interrupt();
  let depth = run_on(&pump, || Pump::current().unwrap().nesting_depth());
  assert_eq!(depth, 1);
  assert!(returned.load(Ordering::SeqCst));
  assert!(pump.keep_dispatching());

  shutdown(&context, &pump);
}

#[test]
fn stop_dispatching_terminates_all_levels() {
  let (_sequencer, _context, pump) = spawn_pump("stop");
  let source = TestSourceBuilder::new()
    .handler(|_event| Pump::current().unwrap().pump_events(&|| true))
    .build();

  post(&pump, Event::new(EventId::FOCUS_GAINED, &source));
  assert_eq!(run_on(&pump, || Pump::current().unwrap().nesting_depth()), 2);

  pump.stop_dispatching();
  assert!(!pump.keep_dispatching());
  pump.join().unwrap();
}

#[test]
fn context_disposal_terminates_pump() {
  let (_sequencer, context, pump) = spawn_pump("dispose");
  let source = TestSource::new();
  post(&pump, Event::new(EventId::KEY_PRESSED, &source));
  settle(&pump);

  context.dispose();
  assert!(context.is_disposed());
  pump.join().unwrap();
  assert!(!pump.keep_dispatching());
  assert!(!context.queue().post_event(Event::new(EventId::KEY_PRESSED, &source)));
}

#[test]
fn pumping_requires_dispatch_thread() {
  let (_sequencer, context, pump) = spawn_pump("foreign");
  let result = pump.pump_events(&|| false);
  assert!(matches!(result, Err(Error::NotDispatchThread(name)) if name == "EventDispatchThread-foreign"));

  let clone = pump.clone();
  let result = run_on(&pump, move || clone.join());
  assert!(matches!(&result, Err(err) if !err.is_fatal()));
  assert!(matches!(result, Err(Error::SelfJoin(name)) if name == "EventDispatchThread-foreign"));

  shutdown(&context, &pump);
}

#[test]
fn events_of_dropped_sources_are_skipped() {
  let (_sequencer, context, pump) = spawn_pump("dropped");
  let source = TestSource::new();
  let event = Event::new(EventId::KEY_PRESSED, &source);
  drop(source);

  post(&pump, event);
  post(&pump, Event::sourceless(EventId::FOCUS_LOST));
  settle(&pump);
  assert!(pump.keep_dispatching());

  shutdown(&context, &pump);
}

#[test]
fn drag_gate_discards_mouse_events() {
  let sequencer = EventSequencer::new();
  let context = AppContext::new("drag", &sequencer);
  let gate = Arc::new(DragSourceGate::default());
  let pump = Pump::builder(&context)
    .drag_gate(Arc::clone(&gate) as Arc<dyn DragGate>)
    .spawn()
    .unwrap();

  let source = TestSource::new();
  let excluded = DragExcludedSource::new();
  gate.set_discarding_mouse_events(true);

  post(&pump, Event::new(EventId::MOUSE_MOVED, &source));
  post(&pump, Event::new(EventId::MOUSE_MOVED, &excluded));
  post(&pump, Event::new(EventId::KEY_PRESSED, &source));
  settle(&pump);

  assert_eq!(source.received(), vec![EventId::KEY_PRESSED]);
  assert_eq!(excluded.count(), 1);

  gate.set_discarding_mouse_events(false);
  post(&pump, Event::new(EventId::MOUSE_MOVED, &source));
  settle(&pump);
  assert_eq!(source.received(), vec![EventId::KEY_PRESSED, EventId::MOUSE_MOVED]);

  shutdown(&context, &pump);
}
