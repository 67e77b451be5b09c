// Copyright (C) 2026 Daniel Mueller <deso@posteo.net>
// SPDX-License-Identifier: GPL-3.0-or-later

use std::collections::VecDeque;
use std::mem::take;
use std::sync::Arc;
use std::sync::Condvar;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::thread;
use std::thread::ThreadId;

use tracing::trace;

use crate::event::Body;
use crate::Error;
use crate::Event;
use crate::EventId;
use crate::EventKind;
use crate::Result;


#[derive(Debug, Default)]
struct State {
  events: VecDeque<Event>,
  /// Set by `interrupt` and cleared by the fetch observing it.
  interrupted: bool,
  shut_down: bool,
  dispatch_thread: Option<ThreadId>,
}


/// A blocking, thread-safe queue of events belonging to one
/// [`AppContext`][crate::AppContext].
///
/// Any thread may post events. Fetching is meant to be done by the
/// context's dispatch thread only.
#[derive(Debug)]
pub struct EventQueue {
  name: String,
  state: Mutex<State>,
  available: Condvar,
}

impl EventQueue {
  /// Create a new, empty, `EventQueue`.
  pub fn new(name: impl Into<String>) -> Arc<Self> {
    Arc::new(Self {
      name: name.into(),
      state: Mutex::default(),
      available: Condvar::new(),
    })
  }

  #[inline]
  fn lock(&self) -> MutexGuard<'_, State> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Retrieve the queue's name.
  #[inline]
  pub fn name(&self) -> &str {
    &self.name
  }

  /// Append an event to the queue.
  ///
  /// Returns `false` if the queue has been shut down, in which case
  /// the event is dropped.
  pub fn post_event(&self, event: Event) -> bool {
    let mut state = self.lock();
    if state.shut_down {
      trace!(queue = %self.name, id = %event.id(), "dropping event posted to shut down queue");
      return false
    }

    state.events.push_back(event);
    self.available.notify_all();
    true
  }

  /// Append a batch of events to the queue, atomically with respect to
  /// all other posters.
  ///
  /// The events keep their relative order and no concurrently posted
  /// event can end up in between them. Returns the number of events
  /// enqueued.
  pub fn post_events<I>(&self, events: I) -> usize
  where
    I: IntoIterator<Item = Event>,
  {
    let mut state = self.lock();
    if state.shut_down {
      return 0
    }

    let before = state.events.len();
    state.events.extend(events);
    let count = state.events.len() - before;
    if count > 0 {
      self.available.notify_all();
    }
    count
  }

  /// Fetch the next event, blocking until one is available.
  ///
  /// If `id` is provided, only an event of this kind is taken out of
  /// the queue; all others stay where they are.
  pub fn next_event(&self, id: Option<EventId>) -> Result<Event> {
    let mut state = self.lock();
    loop {
      if state.interrupted {
        state.interrupted = false;
        return Err(Error::Interrupted)
      }
      if state.shut_down {
        return Err(Error::Shutdown)
      }

      let idx = match id {
        None if !state.events.is_empty() => Some(0),
        None => None,
        Some(id) => state.events.iter().position(|event| event.id() == id),
      };

      if let Some(event) = idx.and_then(|idx| state.events.remove(idx)) {
        return Ok(event)
      }

      state = self
        .available
        .wait(state)
        .unwrap_or_else(PoisonError::into_inner);
    }
  }

  /// Retrieve the id of the event at the head of the queue, if any.
  pub fn peek_event(&self) -> Option<EventId> {
    self.lock().events.front().map(Event::id)
  }

  /// Retrieve the number of queued events.
  pub fn len(&self) -> usize {
    self.lock().events.len()
  }

  /// Check whether the queue is empty.
  pub fn is_empty(&self) -> bool {
    self.lock().events.is_empty()
  }

  /// Interrupt the (current or next) blocking fetch.
  pub fn interrupt(&self) {
    self.lock().interrupted = true;
    self.available.notify_all();
  }

  /// Shut down the queue, dropping all queued events.
  ///
  /// All current and future fetches fail with [`Error::Shutdown`].
  pub fn shutdown(&self) {
    let events = {
      let mut state = self.lock();
      state.shut_down = true;
      take(&mut state.events)
    };
    self.available.notify_all();
    trace!(queue = %self.name, dropped = events.len(), "event queue shut down");
  }

  /// Check whether the queue has been shut down.
  pub fn is_shut_down(&self) -> bool {
    self.lock().shut_down
  }

  pub(crate) fn attach_dispatch_thread(&self, thread: ThreadId) {
    self.lock().dispatch_thread = Some(thread);
  }

  pub(crate) fn detach_dispatch_thread(&self, thread: ThreadId) -> bool {
    let mut state = self.lock();
    if state.dispatch_thread == Some(thread) {
      state.dispatch_thread = None;
      true
    } else {
      false
    }
  }

  /// Check whether the calling thread is the one dispatching events
  /// from this queue.
  pub fn is_dispatch_thread(&self) -> bool {
    self.lock().dispatch_thread == Some(thread::current().id())
  }

  /// Dispatch an event on the calling thread.
  ///
  /// Ordinary events are handed to their source, tasks are run,
  /// sequenced events are dispatched in their global order, and wake
  /// up events are ignored.
  pub fn dispatch_event(self: &Arc<Self>, mut event: Event) -> Result<()> {
    trace!(queue = %self.name, event = ?event, "dispatching");

    match event.kind() {
      EventKind::Plain => match event.source() {
        Some(source) => source.handle(&mut event),
        None => {
          trace!(id = %event.id(), "event source gone; dropping event");
          Ok(())
        },
      },
      EventKind::Wake => Ok(()),
      EventKind::Task => match event.body_mut() {
        Body::Task(task) => task.take().map_or(Ok(()), |task| task()),
        _ => Ok(()),
      },
      EventKind::Sequenced => match event.as_sequenced() {
        Some(sequenced) => Arc::clone(sequenced).dispatch(self),
        None => Ok(()),
      },
    }
  }
}
