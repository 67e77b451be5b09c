// Copyright (C) 2026 Daniel Mueller <deso@posteo.net>
// SPDX-License-Identifier: GPL-3.0-or-later

use std::fmt::Debug;
use std::fmt::Formatter;
use std::fmt::Result as FmtResult;
use std::ops::Deref;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::mpsc;
use std::sync::Arc;
use std::sync::Mutex;
use std::thread::sleep;
use std::time::Duration;
use std::time::Instant;

use evpump::derive::Source;
use evpump::AppContext;
use evpump::Event;
use evpump::EventId;
use evpump::EventSequencer;
use evpump::Handleable;
use evpump::Id;
use evpump::Pump;
use evpump::Result;


/// The maximum time a test waits for something to happen on a
/// dispatch thread.
#[allow(unused)]
pub const TIMEOUT: Duration = Duration::from_secs(10);


struct Handler<T>(T);

impl<T> Debug for Handler<T> {
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    write!(f, "common::Handler")
  }
}

impl<T> Deref for Handler<T> {
  type Target = T;

  fn deref(&self) -> &Self::Target {
    &self.0
  }
}


type EventFn = dyn Fn(&mut Event) -> Result<()> + Send + Sync;


/// A source recording all events dispatched to it.
#[derive(Debug, Source)]
pub struct TestSource {
  id: Id,
  received: Mutex<Vec<(EventId, Vec<u8>)>>,
  handler: Option<Handler<Box<EventFn>>>,
}

#[allow(unused)]
impl TestSource {
  /// Create a new `TestSource` without custom event handler.
  pub fn new() -> Arc<Self> {
    TestSourceBuilder::new().build()
  }

  /// Retrieve the ids of all events received so far.
  pub fn received(&self) -> Vec<EventId> {
    self
      .received
      .lock()
      .unwrap()
      .iter()
      .map(|(id, _)| *id)
      .collect()
  }

  /// Retrieve the payloads of all events received so far.
  pub fn payloads(&self) -> Vec<Vec<u8>> {
    self
      .received
      .lock()
      .unwrap()
      .iter()
      .map(|(_, payload)| payload.clone())
      .collect()
  }
}

impl Handleable for TestSource {
  fn handle(&self, event: &mut Event) -> Result<()> {
    self
      .received
      .lock()
      .unwrap()
      .push((event.id(), event.payload().to_vec()));

    match &self.handler {
      Some(handler) => handler(event),
      None => Ok(()),
    }
  }
}


#[derive(Debug)]
pub struct TestSourceBuilder {
  handler: Option<Handler<Box<EventFn>>>,
}

#[allow(unused)]
impl TestSourceBuilder {
  /// Create a new `TestSourceBuilder` object.
  pub fn new() -> Self {
    Self { handler: None }
  }

  /// Set a handler for `Handleable::handle`.
  pub fn handler<F>(mut self, handler: F) -> Self
  where
    F: Fn(&mut Event) -> Result<()> + Send + Sync + 'static,
  {
    self.handler = Some(Handler(Box::new(handler)));
    self
  }

  /// Build the `TestSource` object.
  pub fn build(self) -> Arc<TestSource> {
    Arc::new(TestSource {
      id: Id::new(),
      received: Mutex::new(Vec::new()),
      handler: self.handler,
    })
  }
}


/// A source that is exempt from drag related mouse event discarding.
#[derive(Debug, Source)]
#[evpump(drag_excluded)]
pub struct DragExcludedSource {
  id: Id,
  count: AtomicUsize,
}

#[allow(unused)]
impl DragExcludedSource {
  pub fn new() -> Arc<Self> {
    Arc::new(Self {
      id: Id::new(),
      count: AtomicUsize::new(0),
    })
  }

  /// Retrieve the number of events received so far.
  pub fn count(&self) -> usize {
    self.count.load(Ordering::SeqCst)
  }
}

impl Handleable for DragExcludedSource {
  fn handle(&self, _event: &mut Event) -> Result<()> {
    let _count = self.count.fetch_add(1, Ordering::SeqCst);
    Ok(())
  }
}


/// Create a context with a running pump.
#[allow(unused)]
pub fn spawn_pump(name: &str) -> (Arc<EventSequencer>, Arc<AppContext>, Pump) {
  let sequencer = EventSequencer::with_poll_interval(Duration::from_millis(10));
  let context = AppContext::new(name, &sequencer);
  let pump = Pump::spawn(&context).unwrap();
  (sequencer, context, pump)
}

/// Post an event to the pump's queue.
#[allow(unused)]
pub fn post(pump: &Pump, event: Event) {
  assert!(pump.context().queue().post_event(event));
}

/// Run `f` on the pump's dispatch thread and wait for its result.
#[allow(unused)]
pub fn run_on<F, T>(pump: &Pump, f: F) -> T
where
  F: FnOnce() -> T + Send + 'static,
  T: Send + 'static,
{
  let (sender, receiver) = mpsc::channel();
  post(
    pump,
    Event::task(move || {
      sender.send(f()).unwrap();
      Ok(())
    }),
  );
  receiver.recv_timeout(TIMEOUT).unwrap()
}

/// Wait until the pump has dispatched all events posted so far.
#[allow(unused)]
pub fn settle(pump: &Pump) {
  run_on(pump, || ())
}

/// Tear down the pump's context and wait for the pump to terminate.
#[allow(unused)]
pub fn shutdown(context: &AppContext, pump: &Pump) {
  context.dispose();
  pump.join().unwrap();
}

/// Wait until `cond` holds, giving up after [`TIMEOUT`].
#[allow(unused)]
pub fn wait_until<F>(cond: F) -> bool
where
  F: Fn() -> bool,
{
  let start = Instant::now();
  while !cond() {
    if start.elapsed() > TIMEOUT {
      return false
    }
    sleep(Duration::from_millis(5));
  }
  true
}
