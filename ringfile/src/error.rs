use std::{io, os::fd::RawFd, path::PathBuf};

use thiserror::Error;

use crate::request::OpCode;

/// Errors produced by the engine.
///
/// [`Setup`](Error::Setup), [`RingInit`](Error::RingInit),
/// [`Config`](Error::Config), [`Spawn`](Error::Spawn) and
/// [`Shutdown`](Error::Shutdown) are returned synchronously. The rest happen
/// after a request was accepted and are only observable on
/// [`Engine::errors`](crate::Engine::errors).
#[derive(Error, Debug)]
pub enum Error {
  /// Opening or inspecting the file failed. The callback never runs.
  #[error("failed to open {path:?}: {source}")]
  Setup {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  /// The ring could not be set up.
  #[error("failed to initialise ring: {0}")]
  RingInit(#[source] io::Error),

  #[error("invalid configuration: {0}")]
  Config(String),

  #[error("failed to spawn event loop: {0}")]
  Spawn(#[source] io::Error),

  /// The engine was cleaned up.
  #[error("engine has been shut down")]
  Shutdown,

  /// The ring rejected a request. The callback never runs.
  #[error("error while pushing {op} request: {source}")]
  Push {
    op: OpCode,
    #[source]
    source: io::Error,
  },

  /// The ring rejected a batch. The batch stays queued for the next flush.
  #[error("error while submitting batch of {batch}: {source}")]
  Submit {
    batch: usize,
    #[source]
    source: io::Error,
  },

  /// Retrieving a completion failed. `fd` is known when the kernel failed
  /// that one operation; its callback never runs.
  #[error("error while popping completion: {source}")]
  Pop {
    fd: Option<RawFd>,
    #[source]
    source: io::Error,
  },

  /// Closing a completed handle failed. The callback still ran.
  #[error("error while closing handle {fd}: {source}")]
  Close {
    fd: RawFd,
    #[source]
    source: io::Error,
  },
}

impl Error {
  pub(crate) fn setup(path: impl Into<PathBuf>, source: io::Error) -> Self {
    Self::Setup { path: path.into(), source }
  }

  /// Whether the error was delivered through the error channel rather than
  /// returned from a call.
  pub fn is_async(&self) -> bool {
    matches!(
      self,
      Self::Push { .. }
        | Self::Submit { .. }
        | Self::Pop { .. }
        | Self::Close { .. }
    )
  }

  /// The underlying OS error code, if there is one.
  pub fn raw_os_error(&self) -> Option<i32> {
    match self {
      Self::Setup { source, .. }
      | Self::Push { source, .. }
      | Self::Submit { source, .. }
      | Self::Pop { source, .. }
      | Self::Close { source, .. }
      | Self::RingInit(source)
      | Self::Spawn(source) => source.raw_os_error(),
      Self::Config(_) | Self::Shutdown => None,
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
