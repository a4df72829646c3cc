use std::{io, os::fd::RawFd};

/// Typed result of a finished operation.
#[derive(Debug, PartialEq, Eq)]
pub enum Payload {
  /// Bytes read, segments already concatenated in order.
  Read(Vec<u8>),
  /// Number of bytes written.
  Written(usize),
}

/// A completion popped from the ring.
///
/// `result` carries the kernel's verdict for this one operation. A completion
/// the ring cannot match to a pushed operation still names its handle, with
/// an `InvalidData` result.
#[derive(Debug)]
pub struct Completion {
  /// Handle the operation was pushed under (the SQE `user_data`).
  pub fd: RawFd,
  pub result: io::Result<Payload>,
}

impl Completion {
  /// Check if the operation succeeded
  pub fn is_ok(&self) -> bool {
    self.result.is_ok()
  }
}
