// Copyright (C) 2026 Daniel Mueller <deso@posteo.net>
// SPDX-License-Identifier: GPL-3.0-or-later

use std::fmt::Debug;
use std::sync::Arc;

use crate::Event;


/// The verdict of an [`EventFilter`] on a single event.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FilterAction {
  /// Let the event pass; less recently installed filters still get
  /// asked.
  Accept,
  /// Drop the event. It gets consumed and is never dispatched.
  Reject,
  /// Let the event pass without consulting any further filters.
  AcceptImmediately,
}


/// The category of an [`EventFilter`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FilterKind {
  /// An ordinary filter. Such filters are kept in installation order.
  Simple,
  /// A filter installed on behalf of a modal entity.
  ///
  /// Modal filters are kept sorted by priority among each other, with
  /// higher priorities being asked first.
  Modal {
    /// The priority of the filter.
    priority: u32,
  },
}


/// A filter deciding whether events get dispatched by a pump.
pub trait EventFilter: Debug + Send + Sync {
  /// Decide what to do with the given event.
  fn accept_event(&self, event: &Event) -> FilterAction;

  /// The category this filter belongs to.
  fn kind(&self) -> FilterKind {
    FilterKind::Simple
  }

  /// Take ownership of an event this filter rejected.
  ///
  /// The event has already been consumed. By default it is simply
  /// dropped.
  #[allow(unused_variables)]
  fn rejected(&self, event: Event) {}
}


/// A condition re-evaluated before every iteration of a pump.
///
/// Pumping stops once the condition evaluates to `false`.
pub trait Conditional: Send + Sync {
  /// Evaluate the condition.
  fn evaluate(&self) -> bool;
}

impl<F> Conditional for F
where
  F: Fn() -> bool + Send + Sync,
{
  #[inline]
  fn evaluate(&self) -> bool {
    self()
  }
}


/// The outcome of running an event through a [`FilterStack`].
#[derive(Debug)]
pub(crate) enum Verdict {
  /// The event may be dispatched.
  Accept,
  /// The event got rejected by the contained filter.
  Reject(Arc<dyn EventFilter>),
}


/// An ordered list of installed filters.
///
/// Filters are evaluated from the back, i.e., most recently installed
/// first.
#[derive(Clone, Debug, Default)]
pub(crate) struct FilterStack {
  filters: Vec<Arc<dyn EventFilter>>,
}

impl FilterStack {
  /// Install a filter, returning `false` if it was installed already.
  pub(crate) fn add(&mut self, filter: Arc<dyn EventFilter>) -> bool {
    if self.contains(&filter) {
      return false
    }

    match filter.kind() {
      FilterKind::Modal { priority } => {
        let idx = self
          .filters
          .iter()
          .position(|f| match f.kind() {
            FilterKind::Modal { priority: other } => other > priority,
            FilterKind::Simple => false,
          })
          .unwrap_or(self.filters.len());
        self.filters.insert(idx, filter)
      },
      FilterKind::Simple => self.filters.push(filter),
    }
    true
  }

  /// Remove a filter, returning `false` if it was not installed.
  pub(crate) fn remove(&mut self, filter: &Arc<dyn EventFilter>) -> bool {
    match self.filters.iter().position(|f| Arc::ptr_eq(f, filter)) {
      Some(idx) => {
        let _filter = self.filters.remove(idx);
        true
      },
      None => false,
    }
  }

  pub(crate) fn contains(&self, filter: &Arc<dyn EventFilter>) -> bool {
    self.filters.iter().any(|f| Arc::ptr_eq(f, filter))
  }

  #[inline]
  pub(crate) fn len(&self) -> usize {
    self.filters.len()
  }

  /// Run the event through all filters, most recently added first.
  pub(crate) fn evaluate(&self, event: &Event) -> Verdict {
    for filter in self.filters.iter().rev() {
      match filter.accept_event(event) {
        FilterAction::Accept => (),
        FilterAction::Reject => return Verdict::Reject(Arc::clone(filter)),
        FilterAction::AcceptImmediately => break,
      }
    }
    Verdict::Accept
  }
}
