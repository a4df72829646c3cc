//! [`Ring`] impl for `io_uring`.

use std::{io, os::fd::RawFd};

use ringfile_uring::Uring;

use crate::backends::{CompletionEvent, Payload, Ring};

impl Ring for Uring {
  fn push_read(&mut self, fd: RawFd, size: usize) -> io::Result<()> {
    Uring::push_read(self, fd, size)
  }

  fn push_write(&mut self, fd: RawFd, buf: Vec<u8>) -> io::Result<()> {
    Uring::push_write(self, fd, buf)
  }

  fn is_full(&mut self) -> bool {
    Uring::is_full(self)
  }

  fn submit(&mut self, wait_nr: usize) -> io::Result<usize> {
    Uring::submit(self, wait_nr)
  }

  fn pop(&mut self) -> io::Result<CompletionEvent> {
    let completion = Uring::pop(self)?;
    let result = completion.result.map(|payload| match payload {
      ringfile_uring::Payload::Read(buf) => Payload::Read(buf),
      ringfile_uring::Payload::Written(n) => Payload::Written(n),
    });
    Ok(CompletionEvent { fd: completion.fd, result })
  }
}
