//! Single-owner io_uring ring for whole-file vectored reads and writes.
//!
//! [`Uring`] wraps one io_uring instance together with the buffers of every
//! operation pushed to it. An operation is identified by the file descriptor
//! it was pushed under; the descriptor doubles as the SQE `user_data`, so a
//! completion can be matched back to its buffers without any other lookup key.
//!
//! The ring is not safe for concurrent use: `Uring` is `Send` but not `Sync`,
//! and every method takes `&mut self`.
//!
//! # Example
//!
//! ```rust,no_run
//! use ringfile_uring::{Payload, Uring};
//! use std::os::fd::AsRawFd;
//!
//! # fn main() -> std::io::Result<()> {
//! let mut ring = Uring::with_capacity(16)?;
//!
//! let file = std::fs::File::create("/tmp/ringfile-uring-doc")?;
//! ring.push_write(file.as_raw_fd(), b"Hello, io_uring!".to_vec())?;
//! ring.submit(1)?;
//!
//! let completion = ring.pop()?;
//! assert_eq!(completion.result?, Payload::Written(16));
//! # Ok(())
//! # }
//! ```

mod completion;
mod inflight;

pub use completion::{Completion, Payload};

use std::{
  cell::Cell, collections::HashMap, io, marker::PhantomData, os::fd::RawFd,
};

use inflight::InFlight;
use io_uring::{IoUring, opcode, types};

/// Segment length reads are split into unless configured otherwise.
pub const DEFAULT_SEGMENT_SIZE: usize = 4096;

/// Maximum number of iovecs per operation (`IOV_MAX`).
pub const MAX_SEGMENTS: usize = 1024;

pub struct Uring {
  ring: IoUring,
  in_flight: HashMap<RawFd, InFlight>,
  segment_size: usize,

  _non_sync: PhantomData<Cell<()>>,
}

// SAFETY: the raw iovec pointers stored in `in_flight` only point into heap
// buffers owned by the same `InFlight` values, which travel with the ring.
unsafe impl Send for Uring {}

impl Uring {
  /// Sets up a ring with `entries` submission slots.
  ///
  /// # Errors
  /// Propagates the `io_uring_setup` error, e.g. `ENOSYS` on kernels without
  /// io_uring or `EPERM` when it is disabled by policy.
  pub fn with_capacity(entries: u32) -> io::Result<Self> {
    let ring = IoUring::new(entries.max(1))?;
    Ok(Self {
      ring,
      in_flight: HashMap::with_capacity(entries as usize),
      segment_size: DEFAULT_SEGMENT_SIZE,
      _non_sync: PhantomData,
    })
  }

  /// Sets the preferred segment length for subsequent reads.
  pub fn with_segment_size(mut self, segment_size: usize) -> Self {
    self.segment_size = segment_size.max(1);
    self
  }

  /// Queues a vectored read of `size` bytes from offset 0 of `fd`.
  ///
  /// # Errors
  /// `WouldBlock` if the submission queue is full, `AlreadyExists` if `fd`
  /// already has an operation in flight.
  pub fn push_read(&mut self, fd: RawFd, size: usize) -> io::Result<()> {
    self.push_new(fd, InFlight::read(size, self.segment_size))
  }

  /// Queues a write of the whole of `buf` at offset 0 of `fd`.
  ///
  /// The buffer is owned by the ring until the completion is popped.
  ///
  /// # Errors
  /// Same as [`push_read`](Self::push_read).
  pub fn push_write(&mut self, fd: RawFd, buf: Vec<u8>) -> io::Result<()> {
    self.push_new(fd, InFlight::write(buf))
  }

  fn push_new(&mut self, fd: RawFd, op: InFlight) -> io::Result<()> {
    if fd < 0 {
      return Err(io::Error::from_raw_os_error(libc::EBADF));
    }
    if self.in_flight.contains_key(&fd) {
      return Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        "handle already has an operation in flight",
      ));
    }

    // SAFETY: `op` moves into `in_flight` right after and stays there until
    // its completion is popped.
    unsafe { push_sqe(&mut self.ring, fd, &op) }?;
    self.in_flight.insert(fd, op);
    Ok(())
  }

  /// Whether another push would be rejected.
  pub fn is_full(&mut self) -> bool {
    self.ring.submission().is_full()
  }

  /// Operations pushed whose completions have not been popped yet.
  pub fn pending(&self) -> usize {
    self.in_flight.len()
  }

  /// Hands all queued entries to the kernel and waits until at least
  /// `wait_nr` completions are ready.
  ///
  /// `wait_nr` is capped at [`pending`](Self::pending), so waiting for more
  /// completions than can ever arrive does not hang.
  ///
  /// Returns the number of entries the kernel consumed.
  pub fn submit(&mut self, wait_nr: usize) -> io::Result<usize> {
    let wait_nr = wait_nr.min(self.in_flight.len());
    self.ring.submit_and_wait(wait_nr)
  }

  /// Pops the next ready completion without blocking.
  ///
  /// A transfer that moved only part of the data is pushed again for the
  /// remainder and reported as `WouldBlock`; the operation completes once
  /// all of it is transferred (or a read reaches end of file).
  ///
  /// A completion for a handle this ring never pushed is returned with an
  /// `InvalidData` result and the stray handle in [`Completion::fd`].
  ///
  /// # Errors
  /// `WouldBlock` (`EAGAIN`) when nothing is ready.
  pub fn pop(&mut self) -> io::Result<Completion> {
    let Some(cqe) = self.ring.completion().next() else {
      return Err(io::Error::from_raw_os_error(libc::EAGAIN));
    };

    let fd = cqe.user_data() as RawFd;
    let Some(mut op) = self.in_flight.remove(&fd) else {
      let stray = io::Error::new(
        io::ErrorKind::InvalidData,
        format!("completion for handle {fd} with no operation in flight"),
      );
      return Ok(Completion { fd, result: Err(stray) });
    };

    let result = match op.advance(cqe.result()) {
      Ok(true) => Ok(op.into_payload()),
      // SAFETY: `op` goes back into `in_flight` once the remainder is queued.
      Ok(false) => match unsafe { push_sqe(&mut self.ring, fd, &op) } {
        Ok(()) => {
          self.in_flight.insert(fd, op);
          return Err(io::Error::from_raw_os_error(libc::EAGAIN));
        }
        Err(err) => Err(err),
      },
      Err(err) => Err(err),
    };

    Ok(Completion { fd, result })
  }
}

/// Pushes the SQE for the untransferred part of `op`.
///
/// # Safety
/// `op` must stay alive, and its buffers unmoved, until the completion of the
/// pushed entry is reaped.
unsafe fn push_sqe(
  ring: &mut IoUring,
  fd: RawFd,
  op: &InFlight,
) -> io::Result<()> {
  let target = types::Fd(fd);
  let entry = if op.is_read() {
    opcode::Readv::new(target, op.iovecs_ptr(), op.iovecs_len())
      .offset(op.offset())
      .build()
  } else {
    opcode::Writev::new(target, op.iovecs_ptr(), op.iovecs_len())
      .offset(op.offset())
      .build()
  };
  let entry = entry.user_data(fd as u64);

  unsafe { ring.submission().push(&entry) }.map_err(|_| {
    io::Error::new(io::ErrorKind::WouldBlock, "submission queue is full")
  })
}

impl Drop for Uring {
  fn drop(&mut self) {
    // The kernel may still write into buffers of submitted operations; reap
    // them before the buffers are freed.
    while !self.in_flight.is_empty() {
      match self.ring.submit_and_wait(1) {
        Ok(_) => {}
        Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
        Err(_) => {
          // Unknown kernel state: leaking is the only sound option.
          std::mem::forget(std::mem::take(&mut self.in_flight));
          return;
        }
      }
      for cqe in self.ring.completion() {
        self.in_flight.remove(&(cqe.user_data() as RawFd));
      }
    }
  }
}
