// Copyright (C) 2026 Daniel Mueller <deso@posteo.net>
// SPDX-License-Identifier: GPL-3.0-or-later

use std::fmt::Debug;
use std::fmt::Display;
use std::fmt::Formatter;
use std::fmt::Result;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;


/// An `Id` uniquely representing an object that events may originate
/// from.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Id {
  idx: usize,
}

impl Id {
  /// Allocate a new, process-wide unique, `Id`.
  pub fn new() -> Self {
    static NEXT_ID: AtomicUsize = AtomicUsize::new(0);

    Self {
      idx: NEXT_ID.fetch_add(1, Ordering::Relaxed),
    }
  }
}

impl Default for Id {
  fn default() -> Self {
    Self::new()
  }
}

impl Display for Id {
  /// Format the `Id` into the given formatter.
  fn fmt(&self, f: &mut Formatter<'_>) -> Result {
    write!(f, "{}", self.idx)
  }
}


/// An `Object` represents a first-class entity events can be sourced
/// from.
pub trait Object: Debug {
  /// Retrieve this object's [`Id`].
  fn id(&self) -> Id;
}
