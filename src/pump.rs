// Copyright (C) 2026 Daniel Mueller <deso@posteo.net>
// SPDX-License-Identifier: GPL-3.0-or-later

use std::any::Any;
use std::cell::RefCell;
use std::fmt::Debug;
use std::fmt::Formatter;
use std::fmt::Result as FmtResult;
use std::panic::catch_unwind;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::OnceLock;
use std::sync::PoisonError;
use std::thread;
use std::thread::JoinHandle;
use std::thread::ThreadId;

use tracing::debug;
use tracing::error;
use tracing::trace;

use crate::filter::FilterStack;
use crate::filter::Verdict;
use crate::AppContext;
use crate::Conditional;
use crate::DragGate;
use crate::DragSourceGate;
use crate::Error;
use crate::Event;
use crate::EventFilter;
use crate::EventId;
use crate::EventSequencer;
use crate::Result;


thread_local! {
  static CURRENT: RefCell<Option<Pump>> = const { RefCell::new(None) };
}


#[inline]
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
  mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
  if let Some(message) = payload.downcast_ref::<&str>() {
    (*message).to_string()
  } else if let Some(message) = payload.downcast_ref::<String>() {
    message.clone()
  } else {
    "<non-string panic payload>".to_string()
  }
}


/// A handler for errors escaping the dispatch of a single event.
pub trait UncaughtHandler: Send + Sync {
  /// Handle an error that occurred on the pump named `pump`.
  fn uncaught(&self, pump: &str, error: &Error);
}

impl<F> UncaughtHandler for F
where
  F: Fn(&str, &Error) + Send + Sync,
{
  fn uncaught(&self, pump: &str, error: &Error) {
    self(pump, error)
  }
}


/// The default [`UncaughtHandler`], merely logging the error.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogHandler;

impl UncaughtHandler for LogHandler {
  fn uncaught(&self, pump: &str, error: &Error) {
    error!(pump, error = %error, "uncaught error while dispatching event");
  }
}


/// One level of (possibly nested) pumping.
#[derive(Debug)]
struct Frame {
  event_id: Option<EventId>,
  filter: Option<Arc<dyn EventFilter>>,
  /// Whether `filter` got installed by this very frame.
  installed: bool,
}


/// Pops the innermost frame, uninstalling its filter, when dropped.
struct FrameGuard<'pump> {
  pump: &'pump Pump,
}

impl Drop for FrameGuard<'_> {
  fn drop(&mut self) {
    let frame = lock(&self.pump.shared.frames).pop();
    if let Some(frame) = frame {
      trace!(pump = %self.pump.name(), event_id = ?frame.event_id, "leaving pump level");

      if let (Some(filter), true) = (frame.filter, frame.installed) {
        let _removed = self.pump.remove_event_filter(&filter);
      }
    }
  }
}


struct Shared {
  name: String,
  context: Arc<AppContext>,
  thread: OnceLock<ThreadId>,
  handle: Mutex<Option<JoinHandle<Result<()>>>>,
  filters: Mutex<FilterStack>,
  frames: Mutex<Vec<Frame>>,
  /// Whether the pump should keep dispatching. Cleared once the pump
  /// is asked to stop and never set again, so that nested pumps cannot
  /// override the intent of an outer one.
  keep_dispatching: AtomicBool,
  handler: Arc<dyn UncaughtHandler>,
  drag_gate: Arc<dyn DragGate>,
}

impl Debug for Shared {
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    f.debug_struct("Shared")
      .field("name", &self.name)
      .field("context", &self.context.name())
      .field("thread", &self.thread.get())
      .field("frames", &lock(&self.frames).len())
      .field("keep_dispatching", &self.keep_dispatching)
      .field("drag_gate", &self.drag_gate)
      .finish_non_exhaustive()
  }
}


/// A builder for [`Pump`] objects.
pub struct PumpBuilder {
  context: Arc<AppContext>,
  name: Option<String>,
  handler: Option<Arc<dyn UncaughtHandler>>,
  drag_gate: Option<Arc<dyn DragGate>>,
}

impl Debug for PumpBuilder {
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    f.debug_struct("PumpBuilder")
      .field("context", &self.context.name())
      .field("name", &self.name)
      .field("drag_gate", &self.drag_gate)
      .finish_non_exhaustive()
  }
}

impl PumpBuilder {
  /// Set the name of the dispatch thread.
  pub fn name(mut self, name: impl Into<String>) -> Self {
    self.name = Some(name.into());
    self
  }

  /// Set the handler for errors escaping the dispatch of an event.
  ///
  /// By default such errors are logged.
  pub fn uncaught_handler<H>(mut self, handler: H) -> Self
  where
    H: UncaughtHandler + 'static,
  {
    self.handler = Some(Arc::new(handler));
    self
  }

  /// Set the drag gatekeeper to consult for every event.
  ///
  /// Pumps of different contexts may share a gatekeeper.
  pub fn drag_gate(mut self, gate: Arc<dyn DragGate>) -> Self {
    self.drag_gate = Some(gate);
    self
  }

  /// Spawn the dispatch thread and start pumping.
  pub fn spawn(self) -> Result<Pump> {
    let name = self
      .name
      .unwrap_or_else(|| format!("EventDispatchThread-{}", self.context.name()));
    let shared = Shared {
      name: name.clone(),
      context: self.context,
      thread: OnceLock::new(),
      handle: Mutex::new(None),
      filters: Mutex::default(),
      frames: Mutex::default(),
      keep_dispatching: AtomicBool::new(true),
      handler: self.handler.unwrap_or_else(|| Arc::new(LogHandler)),
      drag_gate: self
        .drag_gate
        .unwrap_or_else(|| Arc::new(DragSourceGate::default())),
    };
    let pump = Pump {
      shared: Arc::new(shared),
    };

    let runner = pump.clone();
    let handle = thread::Builder::new()
      .name(name)
      .spawn(move || runner.run())
      .map_err(Error::Spawn)?;

    let thread = handle.thread().id();
    let _ = pump.shared.thread.set(thread);
    pump.context().queue().attach_dispatch_thread(thread);
    *lock(&pump.shared.handle) = Some(handle);
    Ok(pump)
  }
}


/// A cooperative event pump running on a dedicated thread.
///
/// The pump repeatedly takes the next event from its context's queue,
/// runs it through the stack of installed filters, and dispatches it.
/// Event handlers may pump recursively (e.g., for the duration of a
/// modal interaction) by means of [`Pump::pump_events`] and friends,
/// each such nested pump installing its filter on top of the ones of
/// the pumps below.
///
/// `Pump` is a cheaply cloneable handle.
#[derive(Clone, Debug)]
pub struct Pump {
  shared: Arc<Shared>,
}

impl Pump {
  /// Start building a pump dispatching events of the given context.
  pub fn builder(context: &Arc<AppContext>) -> PumpBuilder {
    PumpBuilder {
      context: Arc::clone(context),
      name: None,
      handler: None,
      drag_gate: None,
    }
  }

  /// Spawn a pump with the default configuration.
  pub fn spawn(context: &Arc<AppContext>) -> Result<Pump> {
    Self::builder(context).spawn()
  }

  /// Retrieve the pump running on the calling thread, if any.
  pub fn current() -> Option<Pump> {
    CURRENT.with(|current| current.borrow().clone())
  }

  /// The body of the dispatch thread.
  fn run(self) -> Result<()> {
    let thread = thread::current().id();
    let _ = self.shared.thread.set(thread);
    let queue = Arc::clone(self.context().queue());
    queue.attach_dispatch_thread(thread);
    CURRENT.with(|current| *current.borrow_mut() = Some(self.clone()));

    debug!(pump = %self.name(), "dispatch thread started");
    let result = self.pump_events(&|| true);

    let _detached = queue.detach_dispatch_thread(thread);
    let _pump = CURRENT.with(|current| current.borrow_mut().take());

    match &result {
      Ok(()) => debug!(pump = %self.name(), "dispatch thread stopped"),
      Err(err) => error!(pump = %self.name(), error = %err, "dispatch thread terminated"),
    }
    result
  }

  /// Retrieve the name of the pump's thread.
  #[inline]
  pub fn name(&self) -> &str {
    &self.shared.name
  }

  /// Retrieve the context the pump dispatches events of.
  #[inline]
  pub fn context(&self) -> &Arc<AppContext> {
    &self.shared.context
  }

  /// Retrieve the sequencer of the pump's context.
  #[inline]
  pub fn sequencer(&self) -> &Arc<EventSequencer> {
    self.shared.context.sequencer()
  }

  /// Check whether the calling thread is the pump's thread.
  pub fn is_dispatch_thread(&self) -> bool {
    self.shared.thread.get() == Some(&thread::current().id())
  }

  fn ensure_dispatch_thread(&self) -> Result<()> {
    if self.is_dispatch_thread() {
      Ok(())
    } else {
      Err(Error::NotDispatchThread(self.shared.name.clone()))
    }
  }

  /// Retrieve the number of currently active pump levels.
  pub fn nesting_depth(&self) -> usize {
    lock(&self.shared.frames).len()
  }

  /// Check whether the pump is still supposed to dispatch events.
  #[inline]
  pub fn keep_dispatching(&self) -> bool {
    self.shared.keep_dispatching.load(Ordering::SeqCst)
  }

  /// Ask the pump to stop dispatching at all levels.
  ///
  /// The dispatch thread is woken up, so that it notices promptly.
  pub fn stop_dispatching(&self) {
    debug!(pump = %self.name(), "stopping dispatch");
    self.shared.keep_dispatching.store(false, Ordering::SeqCst);
    let _posted = self.context().queue().post_event(Event::wake());
  }

  /// Interrupt the pump level currently waiting for an event.
  pub fn interrupt(&self) {
    self.context().queue().interrupt()
  }

  /// Wait for the dispatch thread to terminate.
  ///
  /// This method must not be called from the dispatch thread itself.
  pub fn join(&self) -> Result<()> {
    if self.is_dispatch_thread() {
      return Err(Error::SelfJoin(self.shared.name.clone()))
    }

    let handle = lock(&self.shared.handle).take();
    match handle {
      Some(handle) => handle
        .join()
        .unwrap_or_else(|payload| Err(Error::Fatal(panic_message(payload)))),
      None => Ok(()),
    }
  }

  /// Install an event filter.
  ///
  /// Modal filters are sorted in by priority, all others are appended.
  /// Installing a filter that is present already has no effect and is
  /// reported by returning `false`.
  pub fn add_event_filter(&self, filter: Arc<dyn EventFilter>) -> bool {
    lock(&self.shared.filters).add(filter)
  }

  /// Uninstall an event filter, returning `false` if it was not
  /// installed.
  pub fn remove_event_filter(&self, filter: &Arc<dyn EventFilter>) -> bool {
    lock(&self.shared.filters).remove(filter)
  }

  /// Retrieve the number of installed event filters.
  pub fn filter_count(&self) -> usize {
    lock(&self.shared.filters).len()
  }

  /// Pump events of all kinds until `cond` evaluates to `false`.
  pub fn pump_events(&self, cond: &dyn Conditional) -> Result<()> {
    self.pump_events_for_filter_id(None, cond, None)
  }

  /// Pump events of kind `id` only, until `cond` evaluates to `false`.
  pub fn pump_events_for_id(&self, id: EventId, cond: &dyn Conditional) -> Result<()> {
    self.pump_events_for_filter_id(Some(id), cond, None)
  }

  /// Pump events of all kinds with `filter` installed for the duration
  /// of pumping, until `cond` evaluates to `false`.
  pub fn pump_events_for_filter(
    &self,
    cond: &dyn Conditional,
    filter: Arc<dyn EventFilter>,
  ) -> Result<()> {
    self.pump_events_for_filter_id(None, cond, Some(filter))
  }

  fn pump_events_for_filter_id(
    &self,
    id: Option<EventId>,
    cond: &dyn Conditional,
    filter: Option<Arc<dyn EventFilter>>,
  ) -> Result<()> {
    self.ensure_dispatch_thread()?;

    let _frame = self.push_frame(id, filter);
    debug!(pump = %self.name(), depth = self.nesting_depth(), "pumping events");

    while self.keep_dispatching() && cond.evaluate() {
      match self.pump_one_event_for_filters(id) {
        Ok(()) => (),
        Err(Error::Interrupted) => {
          debug!(pump = %self.name(), "pumping interrupted");
          break
        },
        Err(Error::Shutdown) => {
          debug!(pump = %self.name(), "event queue shut down");
          self.shared.keep_dispatching.store(false, Ordering::SeqCst);
          break
        },
        Err(err) => {
          self.shared.keep_dispatching.store(false, Ordering::SeqCst);
          return Err(err)
        },
      }
    }

    debug!(pump = %self.name(), depth = self.nesting_depth(), "done pumping events");
    Ok(())
  }

  fn push_frame(&self, event_id: Option<EventId>, filter: Option<Arc<dyn EventFilter>>) -> FrameGuard<'_> {
    let installed = filter
      .as_ref()
      .map_or(false, |filter| self.add_event_filter(Arc::clone(filter)));

    lock(&self.shared.frames).push(Frame {
      event_id,
      filter,
      installed,
    });
    FrameGuard { pump: self }
  }

  /// Fetch the next event passing all filters.
  ///
  /// Rejected events are consumed and handed to the rejecting filter.
  fn next_accepted_event(&self, id: Option<EventId>) -> Result<Event> {
    let queue = self.context().queue();
    loop {
      let mut event = queue.next_event(id)?;
      // Filters may install or remove filters themselves.
      let filters = lock(&self.shared.filters).clone();
      let verdict = filters.evaluate(&event);

      match verdict {
        Verdict::Accept if self.shared.drag_gate.check_event(&event) => return Ok(event),
        Verdict::Accept => {
          trace!(pump = %self.name(), event = ?event, "event rejected by drag gate");
          event.consume();
        },
        Verdict::Reject(filter) => {
          trace!(pump = %self.name(), event = ?event, filter = ?filter, "event rejected");
          event.consume();
          filter.rejected(event);
        },
      }
    }
  }

  /// Fetch and dispatch a single event.
  ///
  /// Errors escaping the dispatch are routed to the uncaught handler,
  /// except for fatal ones, which are returned. So are errors fetching
  /// the event.
  fn pump_one_event_for_filters(&self, id: Option<EventId>) -> Result<()> {
    let event = self.next_accepted_event(id)?;
    let event_id = event.id();
    let queue = self.context().queue();

    let result = catch_unwind(AssertUnwindSafe(|| queue.dispatch_event(event)))
      .unwrap_or_else(|payload| {
        Err(Error::Panicked {
          id: event_id,
          message: panic_message(payload),
        })
      });

    match result {
      Ok(()) => Ok(()),
      Err(err) if err.is_fatal() => Err(err),
      Err(err) => {
        self.shared.handler.uncaught(self.name(), &err);
        Ok(())
      },
    }
  }
}
