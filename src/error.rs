// Copyright (C) 2026 Daniel Mueller <deso@posteo.net>
// SPDX-License-Identifier: GPL-3.0-or-later

use std::error::Error as StdError;
use std::io;

use thiserror::Error;

use crate::EventId;


/// The error type used throughout this crate.
#[derive(Debug, Error)]
pub enum Error {
  /// A pumping operation was invoked from a thread other than the
  /// pump's own.
  #[error("the calling thread is not the dispatch thread of `{0}`")]
  NotDispatchThread(String),
  /// The dispatch thread attempted to join itself.
  #[error("the dispatch thread of `{0}` cannot join itself")]
  SelfJoin(String),
  /// A blocking fetch from an event queue got interrupted.
  ///
  /// An interrupt only ever stops the pump level that was fetching.
  #[error("the blocking event fetch was interrupted")]
  Interrupted,
  /// The event queue got shut down because its context was disposed.
  #[error("the event queue has been shut down")]
  Shutdown,
  /// A secondary loop was configured with a timeout that is not
  /// positive.
  #[error("a secondary loop timeout has to be positive")]
  InvalidTimeout,
  /// A request to terminate the dispatch thread.
  ///
  /// Contrary to all other dispatch errors, this one is not handed to
  /// the uncaught handler but stops the pump and propagates.
  #[error("dispatch thread terminated: {0}")]
  Fatal(String),
  /// Dispatching of an event panicked.
  #[error("dispatch of event {id} panicked: {message}")]
  Panicked {
    /// The id of the event being dispatched.
    id: EventId,
    /// The panic message, if it could be recovered.
    message: String,
  },
  /// A source or task reported an error while handling an event.
  #[error("dispatch of event {id} failed")]
  Dispatch {
    /// The id of the event being dispatched.
    id: EventId,
    /// The underlying error.
    #[source]
    source: Box<dyn StdError + Send + Sync>,
  },
  /// The dispatch thread could not be spawned.
  #[error("failed to spawn dispatch thread")]
  Spawn(#[source] io::Error),
}

impl Error {
  /// Create an [`Error::Dispatch`] wrapping the provided error.
  pub fn dispatch<E>(id: EventId, error: E) -> Self
  where
    E: Into<Box<dyn StdError + Send + Sync>>,
  {
    Self::Dispatch {
      id,
      source: error.into(),
    }
  }

  /// Check whether the error is an [`Error::Fatal`].
  #[inline]
  pub fn is_fatal(&self) -> bool {
    matches!(self, Self::Fatal(..))
  }
}


/// A result type using our [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;
