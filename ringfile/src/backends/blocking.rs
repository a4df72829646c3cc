//! Blocking ring for platforms or sandboxes without io_uring.
//!
//! Pushed operations are only queued. [`submit`](Ring::submit) executes all
//! of them synchronously on the calling (event loop) thread and parks the
//! results for [`pop`](Ring::pop).

use std::{collections::VecDeque, io, os::fd::RawFd};

use crate::backends::{CompletionEvent, Payload, Ring};

enum PendingOp {
  Read { size: usize },
  Write { buf: Vec<u8> },
}

struct Pending {
  fd: RawFd,
  op: PendingOp,
}

pub struct BlockingRing {
  pending: VecDeque<Pending>,
  completed: VecDeque<CompletionEvent>,
  capacity: usize,
}

impl BlockingRing {
  pub fn with_capacity(capacity: usize) -> Self {
    let capacity = capacity.max(1);
    Self {
      pending: VecDeque::with_capacity(capacity),
      completed: VecDeque::with_capacity(capacity),
      capacity,
    }
  }

  fn push(&mut self, fd: RawFd, op: PendingOp) -> io::Result<()> {
    if self.is_full() {
      return Err(io::Error::new(
        io::ErrorKind::WouldBlock,
        "submission queue is full",
      ));
    }
    self.pending.push_back(Pending { fd, op });
    Ok(())
  }
}

impl Default for BlockingRing {
  fn default() -> Self {
    Self::with_capacity(crate::Config::DEFAULT_QUEUE_DEPTH as usize)
  }
}

impl Ring for BlockingRing {
  fn push_read(&mut self, fd: RawFd, size: usize) -> io::Result<()> {
    self.push(fd, PendingOp::Read { size })
  }

  fn push_write(&mut self, fd: RawFd, buf: Vec<u8>) -> io::Result<()> {
    self.push(fd, PendingOp::Write { buf })
  }

  fn is_full(&mut self) -> bool {
    self.pending.len() >= self.capacity
  }

  fn submit(&mut self, _wait_nr: usize) -> io::Result<usize> {
    let submitted = self.pending.len();
    for Pending { fd, op } in self.pending.drain(..) {
      let result = match op {
        PendingOp::Read { size } => read_all(fd, size).map(Payload::Read),
        PendingOp::Write { buf } => write_all(fd, &buf).map(Payload::Written),
      };
      self.completed.push_back(CompletionEvent { fd, result });
    }
    Ok(submitted)
  }

  fn pop(&mut self) -> io::Result<CompletionEvent> {
    self
      .completed
      .pop_front()
      .ok_or_else(|| io::Error::from_raw_os_error(libc::EAGAIN))
  }
}

fn read_all(fd: RawFd, size: usize) -> io::Result<Vec<u8>> {
  let mut buf = vec![0u8; size];
  let mut filled = 0;

  while filled < size {
    let ret = unsafe {
      libc::pread(
        fd,
        buf[filled..].as_mut_ptr().cast(),
        size - filled,
        filled as libc::off_t,
      )
    };
    match ret {
      -1 => {
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::Interrupted {
          continue;
        }
        return Err(err);
      }
      // EOF: the file shrank since it was opened.
      0 => break,
      n => filled += n as usize,
    }
  }

  buf.truncate(filled);
  Ok(buf)
}

fn write_all(fd: RawFd, buf: &[u8]) -> io::Result<usize> {
  let mut written = 0;

  while written < buf.len() {
    let ret = unsafe {
      libc::pwrite(
        fd,
        buf[written..].as_ptr().cast(),
        buf.len() - written,
        written as libc::off_t,
      )
    };
    match ret {
      -1 => {
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::Interrupted {
          continue;
        }
        return Err(err);
      }
      0 => return Err(io::ErrorKind::WriteZero.into()),
      n => written += n as usize,
    }
  }

  Ok(written)
}
