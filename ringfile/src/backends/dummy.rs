//! Scripted ring for testing failure paths.
//!
//! Wraps a [`BlockingRing`] and fails the next N calls of a given kind on
//! request. Counters are shared so a test can arm faults after the ring has
//! moved into the event loop.

use std::{
  io,
  os::fd::RawFd,
  sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
  },
};

use crate::backends::{BlockingRing, CompletionEvent, Ring};

#[derive(Default)]
pub(crate) struct Faults {
  /// Pushes to reject with `EBUSY`.
  pub push: AtomicUsize,
  /// Submits to reject with `EBUSY`.
  pub submit: AtomicUsize,
  /// Submits to interrupt with `EINTR`.
  pub interrupt: AtomicUsize,
  /// Pops to answer with `EAGAIN` although a completion is ready.
  pub would_block: AtomicUsize,
  /// Completions to turn into an `EIO` failure of that operation.
  pub completion: AtomicUsize,
  /// Pops to fail at ring level, consuming the completion.
  pub ring_pop: AtomicUsize,
  /// Pops to answer with a completion for [`STRAY_FD`], which was never
  /// pushed.
  pub stray: AtomicUsize,

  pub submits: AtomicUsize,
  pub drops: AtomicUsize,
}

impl Faults {
  pub fn arm(counter: &AtomicUsize, n: usize) {
    counter.store(n, Ordering::SeqCst);
  }

  fn take(counter: &AtomicUsize) -> bool {
    counter
      .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
      .is_ok()
  }
}

const STRAY_FD: RawFd = 999_999;

pub(crate) struct DummyRing {
  inner: BlockingRing,
  faults: Arc<Faults>,
}

impl DummyRing {
  pub fn new(capacity: usize) -> (Self, Arc<Faults>) {
    let faults = Arc::new(Faults::default());
    let ring =
      Self { inner: BlockingRing::with_capacity(capacity), faults: faults.clone() };
    (ring, faults)
  }
}

fn busy() -> io::Error {
  io::Error::from_raw_os_error(libc::EBUSY)
}

impl Ring for DummyRing {
  fn push_read(&mut self, fd: RawFd, size: usize) -> io::Result<()> {
    if Faults::take(&self.faults.push) {
      return Err(busy());
    }
    self.inner.push_read(fd, size)
  }

  fn push_write(&mut self, fd: RawFd, buf: Vec<u8>) -> io::Result<()> {
    if Faults::take(&self.faults.push) {
      return Err(busy());
    }
    self.inner.push_write(fd, buf)
  }

  fn is_full(&mut self) -> bool {
    self.inner.is_full()
  }

  fn submit(&mut self, wait_nr: usize) -> io::Result<usize> {
    self.faults.submits.fetch_add(1, Ordering::SeqCst);
    if Faults::take(&self.faults.interrupt) {
      return Err(io::Error::from_raw_os_error(libc::EINTR));
    }
    if Faults::take(&self.faults.submit) {
      return Err(busy());
    }
    self.inner.submit(wait_nr)
  }

  fn pop(&mut self) -> io::Result<CompletionEvent> {
    if Faults::take(&self.faults.would_block) {
      return Err(io::Error::from_raw_os_error(libc::EAGAIN));
    }
    if Faults::take(&self.faults.stray) {
      let result = Err(io::ErrorKind::InvalidData.into());
      return Ok(CompletionEvent { fd: STRAY_FD, result });
    }
    let mut event = self.inner.pop()?;
    if Faults::take(&self.faults.ring_pop) {
      return Err(io::Error::from_raw_os_error(libc::EFAULT));
    }
    if Faults::take(&self.faults.completion) {
      event.result = Err(io::Error::from_raw_os_error(libc::EIO));
    }
    Ok(event)
  }
}

impl Drop for DummyRing {
  fn drop(&mut self) {
    self.faults.drops.fetch_add(1, Ordering::SeqCst);
  }
}
