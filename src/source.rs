// Copyright (C) 2026 Daniel Mueller <deso@posteo.net>
// SPDX-License-Identifier: GPL-3.0-or-later

use std::fmt::Debug;

use crate::Handleable;
use crate::Object;


/// A source of events as referenced by an [`Event`][crate::Event].
///
/// Events only keep a weak reference to their source: once the source
/// is gone, events still in flight for it are silently dropped on
/// dispatch.
pub trait Source: Handleable + Object + Debug + Send + Sync {
  /// Check whether events from this source are exempt from being
  /// discarded while a drag operation is in progress.
  ///
  /// Drop targets report `true` here so that they keep receiving
  /// mouse events during a drag.
  fn is_drag_excluded(&self) -> bool {
    false
  }
}
