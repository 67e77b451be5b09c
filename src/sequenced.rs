// Copyright (C) 2026 Daniel Mueller <deso@posteo.net>
// SPDX-License-Identifier: GPL-3.0-or-later

use std::collections::VecDeque;
use std::fmt::Debug;
use std::fmt::Formatter;
use std::fmt::Result as FmtResult;
use std::mem::take;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Condvar;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::sync::Weak;
use std::time::Duration;

use tracing::debug;
use tracing::trace;

use crate::AppContext;
use crate::Event;
use crate::EventFilter;
use crate::EventKind;
use crate::EventQueue;
use crate::FilterAction;
use crate::Pump;
use crate::Result;
use crate::Source;


/// The default period after which threads not running a pump re-check
/// whether it is their turn.
const POLL_INTERVAL: Duration = Duration::from_millis(1000);


#[inline]
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
  mutex.lock().unwrap_or_else(PoisonError::into_inner)
}


#[derive(Debug, Default)]
struct State {
  /// All live sequenced events, in construction order.
  list: VecDeque<Arc<SequencedEvent>>,
  /// The sequenced event whose nested event is being dispatched, as
  /// tracked for keyboard focus bookkeeping.
  current: Option<Arc<SequencedEvent>>,
  next_ordinal: u64,
}

impl State {
  fn is_first(&self, event: &Arc<SequencedEvent>) -> bool {
    self
      .list
      .front()
      .map_or(false, |first| Arc::ptr_eq(first, event))
  }
}


/// The service establishing a global order among [`SequencedEvent`]s.
///
/// All contexts sharing a sequencer have their sequenced events
/// dispatched in construction order, no matter which queue they were
/// posted to.
#[derive(Debug)]
pub struct EventSequencer {
  state: Mutex<State>,
  changed: Condvar,
  poll_interval: Duration,
}

impl EventSequencer {
  /// Create a new sequencer.
  pub fn new() -> Arc<Self> {
    Self::with_poll_interval(POLL_INTERVAL)
  }

  /// Create a new sequencer with a custom re-check period for threads
  /// waiting without running a pump.
  pub fn with_poll_interval(poll_interval: Duration) -> Arc<Self> {
    Arc::new(Self {
      state: Mutex::default(),
      changed: Condvar::new(),
      poll_interval,
    })
  }

  #[inline]
  fn lock(&self) -> MutexGuard<'_, State> {
    lock(&self.state)
  }

  /// Retrieve the sequenced event whose nested event is currently
  /// being dispatched, if any.
  pub fn current_sequenced_event(&self) -> Option<Arc<SequencedEvent>> {
    self.lock().current.clone()
  }

  /// Retrieve the number of live sequenced events.
  pub fn len(&self) -> usize {
    self.lock().list.len()
  }

  /// Check whether there are no live sequenced events.
  pub fn is_empty(&self) -> bool {
    self.lock().list.is_empty()
  }

  /// Wake up all threads waiting for their turn, so that they re-check.
  ///
  /// Dispatch threads waiting by means of a nested pump are woken up
  /// through their queues.
  pub(crate) fn notify_waiters(&self) {
    let queues = {
      let state = self.lock();
      self.changed.notify_all();
      state
        .list
        .iter()
        .filter_map(|event| event.dispatch_queue())
        .collect::<Vec<_>>()
    };

    for queue in queues {
      let _posted = queue.post_event(Event::wake());
    }
  }

  /// Retrieve the head of the list, disposing of all leading events
  /// owned by torn down contexts.
  fn first_with_context(&self) -> Option<Arc<SequencedEvent>> {
    loop {
      let first = self.lock().list.front().cloned();
      match first {
        Some(first) if first.is_owner_disposed() => {
          debug!(event = ?first, "skipping sequenced event of disposed context");
          first.dispose()
        },
        first => break first,
      }
    }
  }

  /// Check whether `event` comes before `current` in the list.
  fn precedes(&self, event: &Arc<SequencedEvent>, current: &Arc<SequencedEvent>) -> bool {
    let state = self.lock();
    for other in &state.list {
      if Arc::ptr_eq(other, current) {
        break
      } else if Arc::ptr_eq(other, event) {
        return true
      }
    }
    false
  }
}


/// Disposes of a sequenced event when dropped, no matter how its
/// dispatch ended.
struct DisposeGuard<'event>(&'event Arc<SequencedEvent>);

impl Drop for DisposeGuard<'_> {
  fn drop(&mut self) {
    self.0.dispose()
  }
}


/// An event wrapper enforcing that wrapped events are dispatched in the
/// order in which they were wrapped.
///
/// Wrapped events may be posted to the queues of different contexts in
/// any order. Dispatching a sequenced event blocks until all sequenced
/// events constructed before it have been dispatched or disposed. On a
/// dispatch thread that happens by running a nested pump, which takes
/// care of earlier sequenced events arriving in the meantime and sets
/// all other events aside, to be re-posted once done.
pub struct SequencedEvent {
  ordinal: u64,
  sequencer: Arc<EventSequencer>,
  owner: Weak<AppContext>,
  source: Option<Weak<dyn Source>>,
  nested: Mutex<Option<Event>>,
  /// Only ever set while holding the sequencer's lock.
  disposed: AtomicBool,
  /// The queue of the context dispatching this event.
  dispatch_queue: Mutex<Option<Weak<EventQueue>>>,
  /// Events that arrived out of turn while waiting.
  pending: Mutex<Vec<Event>>,
}

impl SequencedEvent {
  /// Wrap `nested`, placing it at the end of the global order.
  ///
  /// `owner` is the context the nested event belongs to. Should it get
  /// torn down before it is this event's turn, the nested event is
  /// never dispatched.
  pub fn new(owner: &Arc<AppContext>, mut nested: Event) -> Arc<Self> {
    nested.mark_system_generated();

    let sequencer = owner.sequencer();
    let mut state = sequencer.lock();
    let ordinal = state.next_ordinal;
    state.next_ordinal += 1;

    let event = Arc::new(Self {
      ordinal,
      sequencer: Arc::clone(sequencer),
      owner: Arc::downgrade(owner),
      source: nested.source_ref(),
      nested: Mutex::new(Some(nested)),
      disposed: AtomicBool::new(false),
      dispatch_queue: Mutex::new(None),
      pending: Mutex::default(),
    });
    state.list.push_back(Arc::clone(&event));
    trace!(event = ?event, context = %owner.name(), "created sequenced event");
    event
  }

  /// Create the [`Event`] to post in order to get this sequenced event
  /// dispatched.
  pub fn to_event(self: &Arc<Self>) -> Event {
    Event::sequenced(self, self.source.clone())
  }

  /// Retrieve the position of this event in the global order.
  #[inline]
  pub fn ordinal(&self) -> u64 {
    self.ordinal
  }

  /// Check whether the event has been disposed of.
  #[inline]
  pub fn is_disposed(&self) -> bool {
    self.disposed.load(Ordering::SeqCst)
  }

  fn is_owner_disposed(&self) -> bool {
    self
      .owner
      .upgrade()
      .map_or(true, |owner| owner.is_disposed())
  }

  fn dispatch_queue(&self) -> Option<Arc<EventQueue>> {
    lock(&self.dispatch_queue).as_ref().and_then(Weak::upgrade)
  }

  /// Check whether the nested event is being dispatched through
  /// `queue`.
  pub(crate) fn is_dispatched_by(&self, queue: &Arc<EventQueue>) -> bool {
    self
      .dispatch_queue()
      .map_or(false, |dispatch_queue| Arc::ptr_eq(&dispatch_queue, queue))
  }

  /// Check whether it is this event's turn, or whether it got disposed.
  ///
  /// Events owned by torn down contexts at the head of the list are
  /// disposed of as part of the check.
  pub fn is_first_or_disposed(self: &Arc<Self>) -> bool {
    if self.is_disposed() {
      return true
    }

    let first = self.sequencer.first_with_context();
    first.map_or(false, |first| Arc::ptr_eq(&first, self)) || self.is_disposed()
  }

  /// Block the calling thread, which does not run a pump, until it is
  /// this event's turn.
  fn wait_for_turn(self: &Arc<Self>) {
    loop {
      if self.is_first_or_disposed() {
        break
      }

      let state = self.sequencer.lock();
      if self.is_disposed() || state.is_first(self) {
        break
      }

      let (_state, _timeout) = self
        .sequencer
        .changed
        .wait_timeout(state, self.sequencer.poll_interval)
        .unwrap_or_else(PoisonError::into_inner);
    }
  }

  /// Dispatch the nested event once all earlier sequenced events have
  /// been dispatched or disposed.
  ///
  /// The nested event is dispatched through `queue`, which also
  /// receives all events set aside while waiting. The sequenced event
  /// is disposed of afterwards, in any case.
  pub fn dispatch(self: &Arc<Self>, queue: &Arc<EventQueue>) -> Result<()> {
    let _guard = DisposeGuard(self);
    *lock(&self.dispatch_queue) = Some(Arc::downgrade(queue));

    if !self.is_first_or_disposed() {
      match Pump::current() {
        Some(pump) => {
          let filter = Arc::new(SequencedEventsFilter {
            current: Arc::clone(self),
          });
          let this = Arc::clone(self);
          pump.pump_events_for_filter(&move || !this.is_first_or_disposed(), filter)?;
        },
        None => self.wait_for_turn(),
      }
    }

    if !self.is_first_or_disposed() {
      debug!(event = ?self, "pumping stopped before sequenced event's turn; dropping it");
      return Ok(())
    }

    if self.is_disposed() {
      trace!(event = ?self, "sequenced event disposed before its turn");
      return Ok(())
    }

    self.sequencer.lock().current = Some(Arc::clone(self));
    let nested = lock(&self.nested).take();
    match nested {
      Some(nested) => queue.dispatch_event(nested),
      None => Ok(()),
    }
  }

  /// Set aside an event that arrived out of turn.
  fn defer(&self, event: Event) {
    let mut pending = lock(&self.pending);
    if !self.is_disposed() {
      pending.push(event);
      return
    }
    drop(pending);

    // Disposal already re-posted whatever was pending. Just append.
    if let Some(queue) = self.dispatch_queue() {
      let _posted = queue.post_event(event);
    }
  }

  /// Dispose of the event, passing the turn on to the next one.
  ///
  /// Disposing of an event more than once has no effect.
  pub fn dispose(self: &Arc<Self>) {
    let next = {
      let mut state = self.sequencer.lock();
      if self.disposed.swap(true, Ordering::SeqCst) {
        return
      }

      if state
        .current
        .as_ref()
        .map_or(false, |current| Arc::ptr_eq(current, self))
      {
        state.current = None;
      }

      let next = if state.is_first(self) {
        let _first = state.list.pop_front();
        state.list.front().cloned()
      } else {
        state.list.retain(|event| !Arc::ptr_eq(event, self));
        None
      };

      self.sequencer.changed.notify_all();
      next
    };

    // Queues are only ever posted to without holding the sequencer's
    // lock.
    if let Some(queue) = next.and_then(|next| next.dispatch_queue()) {
      let _posted = queue.post_event(Event::wake());
    }

    let pending = take(&mut *lock(&self.pending));
    if !pending.is_empty() {
      match self.dispatch_queue() {
        Some(queue) => {
          let count = queue.post_events(pending);
          trace!(event = ?self, count, "re-posted pending events");
        },
        None => debug!(event = ?self, count = pending.len(), "dropping pending events"),
      }
    }
  }
}

impl Debug for SequencedEvent {
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    f.debug_struct("SequencedEvent")
      .field("ordinal", &self.ordinal)
      .field("disposed", &self.is_disposed())
      .finish_non_exhaustive()
  }
}


/// The filter used while waiting for the turn of a sequenced event on
/// a dispatch thread.
///
/// It lets through wake up events and sequenced events preceding the
/// waiting one. Everything else is set aside.
#[derive(Debug)]
struct SequencedEventsFilter {
  current: Arc<SequencedEvent>,
}

impl EventFilter for SequencedEventsFilter {
  fn accept_event(&self, event: &Event) -> FilterAction {
    if self.current.is_disposed() {
      return FilterAction::Accept
    }

    match event.kind() {
      EventKind::Wake => FilterAction::Accept,
      EventKind::Sequenced => match event.as_sequenced() {
        Some(sequenced) if self.current.sequencer.precedes(sequenced, &self.current) => {
          FilterAction::Accept
        },
        _ => FilterAction::Reject,
      },
      EventKind::Plain | EventKind::Task => FilterAction::Reject,
    }
  }

  fn rejected(&self, event: Event) {
    self.current.defer(event)
  }
}
