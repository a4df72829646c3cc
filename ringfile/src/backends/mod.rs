//! Ring primitives the event loop can drive.
//!
//! The event loop talks to the kernel through the [`Ring`] trait only. On
//! Linux the default is [`Uring`]; elsewhere, or when io_uring is not
//! available, [`BlockingRing`] performs the same contract with plain
//! `pread`/`pwrite` calls at submit time.

mod blocking;
pub use blocking::BlockingRing;

#[cfg(linux)]
mod io_uring;
#[cfg(linux)]
pub use ringfile_uring::Uring;

#[cfg(test)]
pub(crate) mod dummy;

use std::{io, os::fd::RawFd};

use crate::Config;

/// Typed result of a finished operation.
#[derive(Debug, PartialEq, Eq)]
pub enum Payload {
  /// Whole file contents, segments concatenated in order.
  Read(Vec<u8>),
  /// Number of bytes written.
  Written(usize),
}

/// A finished operation, identified by the handle it was pushed under.
#[derive(Debug)]
pub struct CompletionEvent {
  pub fd: RawFd,
  /// Kernel verdict for this one operation.
  pub result: io::Result<Payload>,
}

/// Submission/completion ring owned by a single event loop.
///
/// Implementations need not be thread safe; the loop is the only caller.
pub trait Ring: Send {
  /// Queues a read of `size` bytes from the start of `fd`.
  ///
  /// # Errors
  /// `WouldBlock` when there is no room; call [`submit`](Self::submit) and
  /// drain first.
  fn push_read(&mut self, fd: RawFd, size: usize) -> io::Result<()>;

  /// Queues a write of `buf` to the start of `fd`. The ring owns `buf` until
  /// the completion is popped.
  fn push_write(&mut self, fd: RawFd, buf: Vec<u8>) -> io::Result<()>;

  /// Whether the next push would be rejected for lack of room.
  fn is_full(&mut self) -> bool;

  /// Hands queued operations to the kernel and blocks until `wait_nr`
  /// completions are ready. Returns how many operations were handed over.
  fn submit(&mut self, wait_nr: usize) -> io::Result<usize>;

  /// Takes one ready completion.
  ///
  /// A completion for a handle that was never pushed is returned as an event
  /// for that handle with a failed `result`.
  ///
  /// # Errors
  /// `WouldBlock` when none is ready yet. Any other error concerns the ring
  /// itself; the completion it would have returned is lost.
  fn pop(&mut self) -> io::Result<CompletionEvent>;
}

/// The ring [`Engine::init`](crate::Engine::init) uses on this platform.
pub(crate) fn default_ring(config: &Config) -> io::Result<Box<dyn Ring>> {
  #[cfg(linux)]
  {
    let ring = Uring::with_capacity(config.queue_depth)?
      .with_segment_size(config.segment_size);
    Ok(Box::new(ring))
  }

  #[cfg(not(linux))]
  {
    Ok(Box::new(BlockingRing::with_capacity(config.queue_depth as usize)))
  }
}
