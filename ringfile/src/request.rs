use std::{
  fmt,
  fs::File,
  io,
  os::fd::{AsRawFd, IntoRawFd, RawFd},
};

use crate::backends::Payload;

pub type ReadCallback = Box<dyn FnOnce(Vec<u8>) + Send>;
pub type WriteCallback = Box<dyn FnOnce(usize) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
  Read,
  Write,
}

impl fmt::Display for OpCode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      Self::Read => "read",
      Self::Write => "write",
    })
  }
}

/// A whole-file operation on its way from a caller to the event loop.
pub(crate) enum Request {
  Read { file: File, size: usize, callback: ReadCallback },
  Write { file: File, buf: Vec<u8>, callback: WriteCallback },
}

/// What the ring is asked to do for a request.
pub(crate) enum Submission {
  Read { size: usize },
  Write { buf: Vec<u8> },
}

impl Request {
  pub fn fd(&self) -> RawFd {
    match self {
      Self::Read { file, .. } | Self::Write { file, .. } => file.as_raw_fd(),
    }
  }

  pub fn opcode(&self) -> OpCode {
    match self {
      Self::Read { .. } => OpCode::Read,
      Self::Write { .. } => OpCode::Write,
    }
  }

  /// Splits the request into what gets registered and what gets pushed.
  pub fn into_parts(self) -> (RawFd, CallbackEntry, Submission) {
    let fd = self.fd();
    match self {
      Self::Read { file, size, callback } => (
        fd,
        CallbackEntry::new(Callback::Read(callback), CloseAction::file(file)),
        Submission::Read { size },
      ),
      Self::Write { file, buf, callback } => (
        fd,
        CallbackEntry::new(Callback::Write(callback), CloseAction::file(file)),
        Submission::Write { buf },
      ),
    }
  }
}

pub(crate) enum Callback {
  Read(ReadCallback),
  Write(WriteCallback),
}

impl Callback {
  pub fn opcode(&self) -> OpCode {
    match self {
      Self::Read(_) => OpCode::Read,
      Self::Write(_) => OpCode::Write,
    }
  }

  pub fn invoke(self, fd: RawFd, payload: Payload) {
    match (self, payload) {
      (Self::Read(callback), Payload::Read(buf)) => callback(buf),
      (Self::Write(callback), Payload::Written(n)) => callback(n),
      (callback, payload) => panic!(
        "ringfile bookkeeping bug: handle {fd} awaits a {} completion, got {payload:?}",
        callback.opcode()
      ),
    }
  }
}

/// Releases the handle of a finished operation.
///
/// Dropping an action without running it still closes the handle, only
/// without reporting failures.
pub(crate) struct CloseAction(Box<dyn FnOnce() -> io::Result<()> + Send>);

impl CloseAction {
  pub fn file(file: File) -> Self {
    Self(Box::new(move || {
      let fd = file.into_raw_fd();
      // SAFETY: `fd` came out of an owned `File`; nothing else closes it.
      if unsafe { libc::close(fd) } == -1 {
        return Err(io::Error::last_os_error());
      }
      Ok(())
    }))
  }

  #[cfg(test)]
  pub fn from_fn<F>(f: F) -> Self
  where
    F: FnOnce() -> io::Result<()> + Send + 'static,
  {
    Self(Box::new(f))
  }

  pub fn run(self) -> io::Result<()> {
    (self.0)()
  }
}

/// Registry value: exactly one callback plus the close action.
pub(crate) struct CallbackEntry {
  pub callback: Callback,
  pub close: CloseAction,
}

// SAFETY: an entry is only ever reached through `&mut` (under the registry's
// write lock) or by value. Shared access to the registry never touches it.
unsafe impl Sync for CallbackEntry {}

impl CallbackEntry {
  pub fn new(callback: Callback, close: CloseAction) -> Self {
    Self { callback, close }
  }
}
