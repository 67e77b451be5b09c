// Copyright (C) 2026 Daniel Mueller <deso@posteo.net>
// SPDX-License-Identifier: GPL-3.0-or-later

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use tracing::debug;

use crate::EventQueue;
use crate::EventSequencer;


/// An isolated execution scope with its own event queue.
///
/// A context can be torn down independently of all others. Sequenced
/// events owned by a torn down context are skipped instead of
/// dispatched.
#[derive(Debug)]
pub struct AppContext {
  name: String,
  queue: Arc<EventQueue>,
  sequencer: Arc<EventSequencer>,
  disposed: AtomicBool,
}

impl AppContext {
  /// Create a new context taking part in the ordering established by
  /// `sequencer`.
  pub fn new(name: impl Into<String>, sequencer: &Arc<EventSequencer>) -> Arc<Self> {
    let name = name.into();
    Arc::new(Self {
      queue: EventQueue::new(name.clone()),
      name,
      sequencer: Arc::clone(sequencer),
      disposed: AtomicBool::new(false),
    })
  }

  /// Retrieve the context's name.
  #[inline]
  pub fn name(&self) -> &str {
    &self.name
  }

  /// Retrieve the context's event queue.
  #[inline]
  pub fn queue(&self) -> &Arc<EventQueue> {
    &self.queue
  }

  /// Retrieve the sequencer the context belongs to.
  #[inline]
  pub fn sequencer(&self) -> &Arc<EventSequencer> {
    &self.sequencer
  }

  /// Tear down the context.
  ///
  /// The context's queue gets shut down, which stops its pump, and
  /// threads waiting for sequenced events owned by this context are
  /// woken up so that they can skip them.
  pub fn dispose(&self) {
    if self.disposed.swap(true, Ordering::SeqCst) {
      return
    }

    debug!(context = %self.name, "disposing context");
    self.queue.shutdown();
    self.sequencer.notify_waiters();
  }

  /// Check whether the context has been torn down.
  #[inline]
  pub fn is_disposed(&self) -> bool {
    self.disposed.load(Ordering::SeqCst)
  }
}
