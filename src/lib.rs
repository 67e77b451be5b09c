// Copyright (C) 2026 Daniel Mueller <deso@posteo.net>
// SPDX-License-Identifier: GPL-3.0-or-later

#![allow(
  clippy::let_unit_value,
  clippy::redundant_field_names,
)]
#![warn(
  future_incompatible,
  missing_copy_implementations,
  missing_debug_implementations,
  missing_docs,
  rust_2018_compatibility,
  rust_2018_idioms,
  trivial_numeric_casts,
  unreachable_pub,
  unstable_features,
  unused_import_braces,
  unused_qualifications,
  unused_results,
)]

//! A crate containing the event dispatch core of a user interface
//! toolkit: a cooperative, nestable, filtered event pump running on a
//! dedicated thread per context, sequenced events being dispatched in
//! a global order across contexts, and secondary loops allowing any
//! thread to block while a pump keeps dispatching.
//!
//! Everything beyond that (widgets, rendering, native windowing) is
//! left to the objects events are dispatched to, i.e., implementors
//! of [`Source`].

mod context;
mod drag;
mod error;
mod event;
mod filter;
mod handleable;
mod object;
mod pump;
mod queue;
mod secondary;
mod sequenced;
mod source;

pub use self::context::AppContext;
pub use self::drag::DragGate;
pub use self::drag::DragSourceGate;
pub use self::error::Error;
pub use self::error::Result;
pub use self::event::Event;
pub use self::event::EventId;
pub use self::event::EventKind;
pub use self::filter::Conditional;
pub use self::filter::EventFilter;
pub use self::filter::FilterAction;
pub use self::filter::FilterKind;
pub use self::handleable::Handleable;
pub use self::object::Id;
pub use self::object::Object;
pub use self::pump::LogHandler;
pub use self::pump::Pump;
pub use self::pump::PumpBuilder;
pub use self::pump::UncaughtHandler;
pub use self::queue::EventQueue;
pub use self::secondary::SecondaryLoop;
pub use self::secondary::WaitDispatchSupport;
pub use self::secondary::WaitDispatchSupportBuilder;
pub use self::sequenced::EventSequencer;
pub use self::sequenced::SequencedEvent;
pub use self::source::Source;

/// A module providing custom derive functionality for `evpump` related
/// traits.
///
/// The module merely re-reports the procedural macros provided by the
/// `evpump_derive` crate.
#[cfg(feature = "derive")]
pub mod derive {
  pub use evpump_derive::*;
}
