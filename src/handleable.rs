// Copyright (C) 2026 Daniel Mueller <deso@posteo.net>
// SPDX-License-Identifier: GPL-3.0-or-later

use crate::Event;
use crate::Result;


/// A trait representing an object capable of handling events.
pub trait Handleable {
  /// Handle an [`Event`] dispatched to this object.
  ///
  /// The handler runs on the dispatch thread of the queue the event
  /// was taken from. It may consume the event, run a nested pump (see
  /// [`Pump::current`][crate::Pump::current]), or report an error. An
  /// error (or a panic) is routed to the pump's uncaught handler and
  /// dispatching continues with the next event, unless it is an
  /// [`Error::Fatal`][crate::Error::Fatal].
  #[allow(unused_variables)]
  fn handle(&self, event: &mut Event) -> Result<()> {
    Ok(())
  }
}
