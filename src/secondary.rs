// Copyright (C) 2026 Daniel Mueller <deso@posteo.net>
// SPDX-License-Identifier: GPL-3.0-or-later

use std::fmt::Debug;
use std::fmt::Formatter;
use std::fmt::Result as FmtResult;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::mpsc;
use std::sync::mpsc::RecvTimeoutError;
use std::sync::Arc;
use std::sync::Condvar;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::sync::Weak;
use std::thread;
use std::time::Duration;
use std::time::Instant;

use tracing::debug;
use tracing::error;
use tracing::warn;

use crate::Conditional;
use crate::Error;
use crate::Event;
use crate::EventFilter;
use crate::Pump;
use crate::Result;


#[inline]
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
  mutex.lock().unwrap_or_else(PoisonError::into_inner)
}


/// A loop that blocks the calling thread while the pump keeps
/// dispatching events.
pub trait SecondaryLoop {
  /// Block until [`SecondaryLoop::exit`] is called (or some other
  /// stopping criterion is met).
  ///
  /// Returns `false` without blocking if the loop is running already
  /// or if `exit` was called before.
  fn enter(&self) -> bool;

  /// Unblock the thread that called [`SecondaryLoop::enter`].
  ///
  /// Returns `true` if a blocked `enter` got released by this call.
  fn exit(&self) -> bool;
}


/// A timer flipping the blocking flag of a pump thread wait once it
/// expires. Dropping it cancels it.
#[derive(Debug)]
struct Timer {
  _cancel: mpsc::Sender<()>,
}

impl Timer {
  fn start(shared: &Arc<Shared>, session: u64, timeout: Duration) -> Result<Self> {
    let (cancel, canceled) = mpsc::channel::<()>();
    let shared = Arc::downgrade(shared);

    let _handle = thread::Builder::new()
      .name("SecondaryLoopTimer".to_string())
      .spawn(move || {
        if let Err(RecvTimeoutError::Timeout) = canceled.recv_timeout(timeout) {
          if let Some(shared) = Weak::upgrade(&shared) {
            shared.timed_out(session)
          }
        }
      })
      .map_err(Error::Spawn)?;

    Ok(Self { _cancel: cancel })
  }
}


struct Shared {
  pump: Pump,
  condition: Option<Arc<dyn Conditional>>,
  filter: Option<Arc<dyn EventFilter>>,
  timeout: Option<Duration>,
  /// Set while an `enter` is in progress; guards against re-entry.
  keep_blocking_pump: AtomicBool,
  /// Set while a foreign thread is waiting for being woken up.
  keep_blocking_foreign: AtomicBool,
  /// Set by `exit` and consumed by `enter`.
  after_exit: AtomicBool,
  /// Incremented by every `enter`, so that work scheduled by an
  /// earlier one cannot interfere with a later one.
  session: AtomicU64,
  lock: Mutex<()>,
  wake: Condvar,
  timer: Mutex<Option<Timer>>,
}

impl Debug for Shared {
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    f.debug_struct("Shared")
      .field("pump", &self.pump.name())
      .field("filter", &self.filter)
      .field("timeout", &self.timeout)
      .field("keep_blocking_pump", &self.keep_blocking_pump)
      .field("keep_blocking_foreign", &self.keep_blocking_foreign)
      .field("after_exit", &self.after_exit)
      .finish_non_exhaustive()
  }
}

impl Shared {
  fn is_session(&self, session: u64) -> bool {
    self.session.load(Ordering::SeqCst) == session
  }

  fn evaluate_condition(&self) -> bool {
    self
      .condition
      .as_ref()
      .map_or(true, |condition| condition.evaluate())
  }

  /// The stopping condition of the nested pump.
  fn keep_pumping(&self, session: u64) -> bool {
    let current = self.is_session(session);
    let keep = current
      && self.keep_blocking_pump.load(Ordering::SeqCst)
      && !self.after_exit.load(Ordering::SeqCst)
      && self.evaluate_condition();

    if !keep && current {
      self.cancel_timer();
    }
    keep
  }

  fn cancel_timer(&self) {
    let _timer = lock(&self.timer).take();
  }

  fn wake_pump(&self) {
    let _posted = self.pump.context().queue().post_event(Event::wake());
  }

  fn timed_out(&self, session: u64) {
    if self.is_session(session) {
      debug!(pump = %self.pump.name(), "secondary loop timed out");
      self.keep_blocking_pump.store(false, Ordering::SeqCst);
      self.wake_pump();
    }
  }

  fn wake_foreign(&self) {
    let _guard = lock(&self.lock);
    self.keep_blocking_foreign.store(false, Ordering::SeqCst);
    self.wake.notify_all();
  }

  /// Run a nested pump for as long as the wait of `session` lasts.
  fn run_nested_pump(self: &Arc<Self>, session: u64) -> Result<()> {
    let this = Arc::clone(self);
    let condition = move || this.keep_pumping(session);

    match &self.filter {
      Some(filter) => self
        .pump
        .pump_events_for_filter(&condition, Arc::clone(filter)),
      None => self.pump.pump_events(&condition),
    }
  }
}


/// Resets all blocking state once an `enter` concludes.
struct ResetGuard<'shared>(&'shared Shared);

impl Drop for ResetGuard<'_> {
  fn drop(&mut self) {
    self.0.cancel_timer();
    // An `exit` either interrupted this session, or comes after it and
    // has its latch survive.
    let _guard = lock(&self.0.lock);
    self.0.keep_blocking_pump.store(false, Ordering::SeqCst);
    self.0.keep_blocking_foreign.store(false, Ordering::SeqCst);
    self.0.after_exit.store(false, Ordering::SeqCst);
  }
}

/// Uninstalls a filter once a foreign thread wait concludes.
struct FilterGuard<'shared>(&'shared Shared);

impl Drop for FilterGuard<'_> {
  fn drop(&mut self) {
    if let Some(filter) = &self.0.filter {
      let _removed = self.0.pump.remove_event_filter(filter);
    }
  }
}


/// The strategy of waiting on a particular kind of thread.
trait Wait {
  fn wait(&self, session: u64) -> Result<()>;
}


/// Waiting on the pump's own thread, by running a nested pump.
struct PumpThreadWait<'shared> {
  shared: &'shared Arc<Shared>,
}

impl Wait for PumpThreadWait<'_> {
  fn wait(&self, session: u64) -> Result<()> {
    let shared = self.shared;
    if let Some(timeout) = shared.timeout {
      *lock(&shared.timer) = Some(Timer::start(shared, session, timeout)?);
    }

    // A sequenced event whose dispatch we are nested in would never
    // see its turn end while we block. Get it out of the way. Events
    // being dispatched by other contexts' pumps end on their own.
    if let Some(current) = shared.pump.sequencer().current_sequenced_event() {
      if current.is_dispatched_by(shared.pump.context().queue()) {
        debug!(event = ?current, "disposing sequenced event being dispatched");
        current.dispose();
      }
    }

    shared.run_nested_pump(session)
  }
}


/// Waiting on an arbitrary thread, by asking the pump to run a nested
/// pump and blocking until it is done.
struct ForeignThreadWait<'shared> {
  shared: &'shared Arc<Shared>,
}

impl Wait for ForeignThreadWait<'_> {
  fn wait(&self, session: u64) -> Result<()> {
    let shared = self.shared;
    let deadline = shared.timeout.map(|timeout| Instant::now() + timeout);

    let mut guard = lock(&shared.lock);
    if let Some(filter) = &shared.filter {
      let _added = shared.pump.add_event_filter(Arc::clone(filter));
    }
    let _filter = FilterGuard(shared);

    let task = {
      let shared = Arc::clone(shared);
      Event::task(move || {
        let result = shared.run_nested_pump(session);
        if shared.is_session(session) {
          shared.wake_foreign();
        }
        result
      })
    };

    if !shared.pump.context().queue().post_event(task) {
      debug!(pump = %shared.pump.name(), "event queue shut down; not blocking");
      return Ok(())
    }

    shared.keep_blocking_foreign.store(true, Ordering::SeqCst);

    while shared.keep_blocking_foreign.load(Ordering::SeqCst)
      && shared.keep_blocking_pump.load(Ordering::SeqCst)
      && shared.evaluate_condition()
    {
      guard = match deadline {
        Some(deadline) => {
          let now = Instant::now();
          if now >= deadline {
            debug!(pump = %shared.pump.name(), "secondary loop timed out");
            break
          }
          let (guard, _timeout) = shared
            .wake
            .wait_timeout(guard, deadline - now)
            .unwrap_or_else(PoisonError::into_inner);
          guard
        },
        None => shared
          .wake
          .wait(guard)
          .unwrap_or_else(PoisonError::into_inner),
      };
    }
    drop(guard);

    // Make sure the nested pump winds down, in case we stopped waiting
    // on our own.
    if shared.keep_blocking_pump.swap(false, Ordering::SeqCst) {
      shared.wake_pump();
    }
    Ok(())
  }
}


/// A builder for [`WaitDispatchSupport`] objects.
pub struct WaitDispatchSupportBuilder {
  pump: Pump,
  condition: Option<Arc<dyn Conditional>>,
  filter: Option<Arc<dyn EventFilter>>,
  timeout: Option<Duration>,
}

impl Debug for WaitDispatchSupportBuilder {
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    f.debug_struct("WaitDispatchSupportBuilder")
      .field("pump", &self.pump.name())
      .field("filter", &self.filter)
      .field("timeout", &self.timeout)
      .finish_non_exhaustive()
  }
}

impl WaitDispatchSupportBuilder {
  /// Set an additional condition that has to hold for the loop to keep
  /// blocking.
  pub fn condition<C>(mut self, condition: C) -> Self
  where
    C: Conditional + 'static,
  {
    self.condition = Some(Arc::new(condition));
    self
  }

  /// Set a filter to install on the pump for the duration of the loop.
  pub fn filter(mut self, filter: Arc<dyn EventFilter>) -> Self {
    self.filter = Some(filter);
    self
  }

  /// Set a timeout after which the loop stops blocking on its own.
  pub fn timeout(mut self, timeout: Duration) -> Self {
    self.timeout = Some(timeout);
    self
  }

  /// Build the [`WaitDispatchSupport`] object.
  ///
  /// A zero timeout is rejected with [`Error::InvalidTimeout`].
  pub fn build(self) -> Result<WaitDispatchSupport> {
    if self.timeout == Some(Duration::ZERO) {
      return Err(Error::InvalidTimeout)
    }
    Ok(WaitDispatchSupport::from_builder(self))
  }
}


/// A [`SecondaryLoop`] blocking any thread while a pump keeps
/// dispatching.
///
/// On the pump's own thread, [`enter`][SecondaryLoop::enter] runs a
/// nested pump. On any other thread it asks the pump to run a nested
/// pump on its behalf and waits for that to finish. Either way the
/// loop ends once [`exit`][SecondaryLoop::exit] is called, the
/// configured condition no longer holds, or the timeout expires.
#[derive(Clone, Debug)]
pub struct WaitDispatchSupport {
  shared: Arc<Shared>,
}

impl WaitDispatchSupport {
  fn from_builder(builder: WaitDispatchSupportBuilder) -> Self {
    let shared = Shared {
      pump: builder.pump,
      condition: builder.condition,
      filter: builder.filter,
      timeout: builder.timeout,
      keep_blocking_pump: AtomicBool::new(false),
      keep_blocking_foreign: AtomicBool::new(false),
      after_exit: AtomicBool::new(false),
      session: AtomicU64::new(0),
      lock: Mutex::new(()),
      wake: Condvar::new(),
      timer: Mutex::new(None),
    };

    Self {
      shared: Arc::new(shared),
    }
  }

  /// Create a loop on the given pump without condition, filter, or
  /// timeout.
  pub fn new(pump: &Pump) -> Self {
    Self::from_builder(Self::builder(pump))
  }

  /// Start building a loop on the given pump.
  pub fn builder(pump: &Pump) -> WaitDispatchSupportBuilder {
    WaitDispatchSupportBuilder {
      pump: pump.clone(),
      condition: None,
      filter: None,
      timeout: None,
    }
  }

  /// Like [`SecondaryLoop::enter`], but report errors from the nested
  /// pump, such as [`Error::Fatal`], instead of just logging them.
  pub fn try_enter(&self) -> Result<bool> {
    let shared = &self.shared;
    if shared
      .keep_blocking_pump
      .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
      .is_err()
    {
      debug!(pump = %shared.pump.name(), "secondary loop running already");
      return Ok(false)
    }

    let _reset = ResetGuard(shared);
    if shared.after_exit.load(Ordering::SeqCst) {
      debug!(pump = %shared.pump.name(), "secondary loop exited already");
      return Ok(false)
    }

    let session = shared.session.fetch_add(1, Ordering::SeqCst) + 1;
    if shared.pump.is_dispatch_thread() {
      debug!(pump = %shared.pump.name(), "entering secondary loop on dispatch thread");
      PumpThreadWait { shared }.wait(session)?;
    } else {
      debug!(pump = %shared.pump.name(), "entering secondary loop on foreign thread");
      ForeignThreadWait { shared }.wait(session)?;
    }
    debug!(pump = %shared.pump.name(), "left secondary loop");
    Ok(true)
  }
}

impl SecondaryLoop for WaitDispatchSupport {
  fn enter(&self) -> bool {
    self.try_enter().unwrap_or_else(|err| {
      error!(pump = %self.shared.pump.name(), error = %err, "secondary loop failed");
      true
    })
  }

  fn exit(&self) -> bool {
    let shared = &self.shared;
    let interrupted = {
      let _guard = lock(&shared.lock);
      shared.after_exit.store(true, Ordering::SeqCst);
      let interrupted = shared.keep_blocking_pump.swap(false, Ordering::SeqCst);
      if interrupted {
        shared.wake.notify_all();
      }
      interrupted
    };

    if interrupted {
      debug!(pump = %shared.pump.name(), "exiting secondary loop");
      let task = {
        let shared = Arc::clone(shared);
        Event::task(move || {
          shared.wake_foreign();
          Ok(())
        })
      };
      if !shared.pump.context().queue().post_event(task) {
        warn!(pump = %shared.pump.name(), "failed to wake up dispatch thread");
      }
    }
    interrupted
  }
}
