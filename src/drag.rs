// Copyright (C) 2026 Daniel Mueller <deso@posteo.net>
// SPDX-License-Identifier: GPL-3.0-or-later

use std::fmt::Debug;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use crate::Event;


/// A gatekeeper consulted for every event a pump is about to dispatch,
/// in addition to all installed filters.
pub trait DragGate: Debug + Send + Sync {
  /// Check whether the event may be dispatched.
  fn check_event(&self, event: &Event) -> bool;
}


/// The drag source gatekeeper.
///
/// While a drag operation is in progress mouse events are discarded,
/// unless they are destined for a source exempt from that (see
/// [`Source::is_drag_excluded`][crate::Source::is_drag_excluded]).
#[derive(Debug, Default)]
pub struct DragSourceGate {
  discarding_mouse_events: AtomicBool,
}

impl DragSourceGate {
  /// Start or stop discarding mouse events.
  pub fn set_discarding_mouse_events(&self, discard: bool) {
    self.discarding_mouse_events.store(discard, Ordering::SeqCst)
  }

  /// Check whether mouse events are currently being discarded.
  pub fn is_discarding_mouse_events(&self) -> bool {
    self.discarding_mouse_events.load(Ordering::SeqCst)
  }
}

impl DragGate for DragSourceGate {
  fn check_event(&self, event: &Event) -> bool {
    if !self.is_discarding_mouse_events() || !event.id().is_mouse() {
      return true
    }

    event
      .source()
      .map_or(false, |source| source.is_drag_excluded())
  }
}
