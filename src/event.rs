// Copyright (C) 2026 Daniel Mueller <deso@posteo.net>
// SPDX-License-Identifier: GPL-3.0-or-later

use std::fmt::Debug;
use std::fmt::Display;
use std::fmt::Formatter;
use std::fmt::Result as FmtResult;
use std::sync::Arc;
use std::sync::Weak;

use crate::Result;
use crate::SequencedEvent;
use crate::Source;


/// The kind of an event, as an integer id.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct EventId(pub i32);

impl EventId {
  /// A key was typed.
  pub const KEY_TYPED: EventId = EventId(400);
  /// A key was pressed.
  pub const KEY_PRESSED: EventId = EventId(401);
  /// A key was released.
  pub const KEY_RELEASED: EventId = EventId(402);
  /// A mouse button was clicked.
  pub const MOUSE_CLICKED: EventId = EventId(500);
  /// A mouse button was pressed.
  pub const MOUSE_PRESSED: EventId = EventId(501);
  /// A mouse button was released.
  pub const MOUSE_RELEASED: EventId = EventId(502);
  /// The mouse was moved.
  pub const MOUSE_MOVED: EventId = EventId(503);
  /// The mouse entered a component.
  pub const MOUSE_ENTERED: EventId = EventId(504);
  /// The mouse exited a component.
  pub const MOUSE_EXITED: EventId = EventId(505);
  /// The mouse was dragged.
  pub const MOUSE_DRAGGED: EventId = EventId(506);
  /// The mouse wheel was rotated.
  pub const MOUSE_WHEEL: EventId = EventId(507);
  /// A component gained the keyboard focus.
  pub const FOCUS_GAINED: EventId = EventId(1004);
  /// A component lost the keyboard focus.
  pub const FOCUS_LOST: EventId = EventId(1005);
  /// An event wrapped for globally ordered dispatch.
  pub const SEQUENCED: EventId = EventId(1006);
  /// An internal event merely waking up a dispatch thread.
  pub const WAKE: EventId = EventId(1007);
  /// Input method text changed.
  pub const INPUT_METHOD_TEXT_CHANGED: EventId = EventId(1100);
  /// Input method caret position changed.
  pub const INPUT_METHOD_CARET_POSITION_CHANGED: EventId = EventId(1101);
  /// A task to run on the dispatch thread.
  pub const INVOCATION: EventId = EventId(1200);

  /// Check whether events of this kind can be consumed.
  pub fn is_consumable(self) -> bool {
    matches!(
      self,
      Self::KEY_PRESSED
        | Self::KEY_RELEASED
        | Self::MOUSE_PRESSED
        | Self::MOUSE_RELEASED
        | Self::MOUSE_MOVED
        | Self::MOUSE_DRAGGED
        | Self::MOUSE_ENTERED
        | Self::MOUSE_EXITED
        | Self::MOUSE_WHEEL
        | Self::INPUT_METHOD_TEXT_CHANGED
        | Self::INPUT_METHOD_CARET_POSITION_CHANGED
    )
  }

  /// Check whether this is one of the mouse event kinds.
  pub fn is_mouse(self) -> bool {
    (Self::MOUSE_CLICKED.0..=Self::MOUSE_WHEEL.0).contains(&self.0)
  }
}

impl Display for EventId {
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    write!(f, "{}", self.0)
  }
}


/// A task run on the dispatch thread.
pub(crate) type Task = Box<dyn FnOnce() -> Result<()> + Send>;


/// The variant of an [`Event`] as far as the dispatch machinery is
/// concerned.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EventKind {
  /// An ordinary event, dispatched to its source.
  Plain,
  /// An event that does nothing but wake up a dispatch thread.
  Wake,
  /// An event carrying a task to run on the dispatch thread.
  Task,
  /// An event wrapping another one for globally ordered dispatch.
  Sequenced,
}


pub(crate) enum Body {
  Plain,
  Wake,
  Task(Option<Task>),
  Sequenced(Arc<SequencedEvent>),
}

impl Debug for Body {
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    match self {
      Self::Plain => write!(f, "Plain"),
      Self::Wake => write!(f, "Wake"),
      Self::Task(task) => write!(f, "Task(pending: {})", task.is_some()),
      Self::Sequenced(event) => f.debug_tuple("Sequenced").field(event).finish(),
    }
  }
}


/// An event handed around by queues and pumps.
///
/// An event is dispatched at most once, but may be inspected by
/// any number of filters before that.
pub struct Event {
  id: EventId,
  source: Option<Weak<dyn Source>>,
  consumed: bool,
  system_generated: bool,
  payload: Vec<u8>,
  body: Body,
}

impl Event {
  fn with_body(id: EventId, source: Option<Weak<dyn Source>>, body: Body) -> Self {
    Self {
      id,
      source,
      consumed: false,
      system_generated: false,
      payload: Vec::new(),
      body,
    }
  }

  /// Create a new event of the given kind originating from `source`.
  pub fn new<S>(id: EventId, source: &Arc<S>) -> Self
  where
    S: Source + 'static,
  {
    let source = Arc::downgrade(source) as Weak<dyn Source>;
    Self::with_body(id, Some(source), Body::Plain)
  }

  /// Create a new event without any source.
  ///
  /// Such an event is dropped silently when it gets dispatched, but it
  /// still travels through all filters.
  pub fn sourceless(id: EventId) -> Self {
    Self::with_body(id, None, Body::Plain)
  }

  /// Create an event running `task` on the dispatch thread.
  pub fn task<F>(task: F) -> Self
  where
    F: FnOnce() -> Result<()> + Send + 'static,
  {
    Self::with_body(EventId::INVOCATION, None, Body::Task(Some(Box::new(task))))
  }

  /// Create an event doing nothing but waking up the dispatch thread.
  pub fn wake() -> Self {
    let mut event = Self::with_body(EventId::WAKE, None, Body::Wake);
    event.system_generated = true;
    event
  }

  pub(crate) fn sequenced(event: &Arc<SequencedEvent>, source: Option<Weak<dyn Source>>) -> Self {
    let mut event = Self::with_body(EventId::SEQUENCED, source, Body::Sequenced(Arc::clone(event)));
    event.system_generated = true;
    event
  }

  /// Attach an opaque payload to the event.
  pub fn with_payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
    self.payload = payload.into();
    self
  }

  /// Retrieve the event's id.
  #[inline]
  pub fn id(&self) -> EventId {
    self.id
  }

  /// Retrieve the event's kind.
  pub fn kind(&self) -> EventKind {
    match self.body {
      Body::Plain => EventKind::Plain,
      Body::Wake => EventKind::Wake,
      Body::Task(..) => EventKind::Task,
      Body::Sequenced(..) => EventKind::Sequenced,
    }
  }

  /// Retrieve the event's source, if it is still alive.
  pub fn source(&self) -> Option<Arc<dyn Source>> {
    self.source.as_ref().and_then(Weak::upgrade)
  }

  pub(crate) fn source_ref(&self) -> Option<Weak<dyn Source>> {
    self.source.clone()
  }

  /// Retarget the event to a different source.
  pub fn set_source<S>(&mut self, source: &Arc<S>)
  where
    S: Source + 'static,
  {
    self.source = Some(Arc::downgrade(source) as Weak<dyn Source>);
  }

  /// Consume the event.
  ///
  /// Consumption is sticky and only has an effect on event kinds that
  /// are consumable (see [`EventId::is_consumable`]).
  pub fn consume(&mut self) {
    if self.id.is_consumable() {
      self.consumed = true;
    }
  }

  /// Check whether the event has been consumed.
  #[inline]
  pub fn is_consumed(&self) -> bool {
    self.consumed
  }

  /// Check whether the event was generated by the dispatch machinery
  /// itself (as opposed to having been posted by application code).
  #[inline]
  pub fn is_system_generated(&self) -> bool {
    self.system_generated
  }

  pub(crate) fn mark_system_generated(&mut self) {
    self.system_generated = true;
  }

  /// Retrieve the event's payload.
  #[inline]
  pub fn payload(&self) -> &[u8] {
    &self.payload
  }

  /// Copy the data private to this event into a derived event.
  pub fn copy_private_data_into(&self, other: &mut Event) {
    other.payload.clone_from(&self.payload);
    other.system_generated = self.system_generated;
  }

  /// Retrieve the sequenced event this event wraps, if any.
  pub fn as_sequenced(&self) -> Option<&Arc<SequencedEvent>> {
    match &self.body {
      Body::Sequenced(event) => Some(event),
      _ => None,
    }
  }

  pub(crate) fn body_mut(&mut self) -> &mut Body {
    &mut self.body
  }
}

impl Debug for Event {
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    f.debug_struct("Event")
      .field("id", &self.id)
      .field("source", &self.source().map(|source| source.id()))
      .field("consumed", &self.consumed)
      .field("system_generated", &self.system_generated)
      .field("payload", &self.payload)
      .field("body", &self.body)
      .finish()
  }
}


#[cfg(test)]
mod tests {
  use super::*;

  use crate::Handleable;
  use crate::Id;
  use crate::Object;


  #[derive(Debug)]
  struct Dummy {
    id: Id,
  }

  impl Object for Dummy {
    fn id(&self) -> Id {
      self.id
    }
  }

  impl Handleable for Dummy {}
  impl Source for Dummy {}


  #[test]
  fn consume_only_consumable() {
    let mut event = Event::sourceless(EventId::KEY_PRESSED);
    assert!(!event.is_consumed());
    event.consume();
    assert!(event.is_consumed());
    event.consume();
    assert!(event.is_consumed());

    let mut event = Event::sourceless(EventId::FOCUS_GAINED);
    event.consume();
    assert!(!event.is_consumed());

    let mut event = Event::sourceless(EventId::KEY_TYPED);
    event.consume();
    assert!(!event.is_consumed());
  }

  #[test]
  fn mouse_ids() {
    assert!(EventId::MOUSE_CLICKED.is_mouse());
    assert!(EventId::MOUSE_WHEEL.is_mouse());
    assert!(!EventId::KEY_PRESSED.is_mouse());
    assert!(!EventId(508).is_mouse());
  }

  #[test]
  fn source_rebinding() {
    let first = Arc::new(Dummy { id: Id::new() });
    let second = Arc::new(Dummy { id: Id::new() });

    let mut event = Event::new(EventId::MOUSE_MOVED, &first);
    assert_eq!(event.source().unwrap().id(), first.id);

    event.set_source(&second);
    assert_eq!(event.source().unwrap().id(), second.id);

    drop(second);
    assert!(event.source().is_none());
  }

  #[test]
  fn private_data_copy() {
    let event = Event::wake().with_payload(vec![1, 2, 3]);
    let mut derived = Event::sourceless(EventId::FOCUS_LOST);
    assert!(!derived.is_system_generated());

    event.copy_private_data_into(&mut derived);
    assert_eq!(derived.payload(), &[1, 2, 3]);
    assert!(derived.is_system_generated());
    assert_eq!(event.payload(), &[1, 2, 3]);
  }

  #[test]
  fn kinds() {
    assert_eq!(Event::wake().kind(), EventKind::Wake);
    assert_eq!(Event::task(|| Ok(())).kind(), EventKind::Task);
    assert_eq!(Event::sourceless(EventId::KEY_TYPED).kind(), EventKind::Plain);
    assert!(Event::wake().as_sequenced().is_none());
  }
}
