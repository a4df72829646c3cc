//! Channel-backed completion tokens.
//!
//! [`Engine::read`](crate::Engine::read) and
//! [`Engine::write`](crate::Engine::write) register a callback that forwards
//! its result into a one-slot channel and hand the receiving side back to the
//! caller:
//!
//! ```ignore
//! let token = engine.read("/etc/hostname")?;
//! engine.poll();
//! let contents = token.recv()?;
//! ```
//!
//! A token never hangs on an operation that failed after submission: the
//! callback is dropped unrun, which disconnects the channel, and the token
//! reports [`RecvError::Abandoned`]. The reason is on
//! [`Engine::errors`](crate::Engine::errors).

use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecvError {
  /// The operation will never complete; its callback was dropped.
  #[error("operation was abandoned before completing")]
  Abandoned,
  #[error("timed out waiting for completion")]
  Timeout,
}

/// Receiving half of a single operation's result.
pub struct CompletionReceiver<T> {
  rx: Receiver<T>,
}

pub(crate) fn completion<T>() -> (Sender<T>, CompletionReceiver<T>) {
  let (tx, rx) = crossbeam_channel::bounded(1);
  (tx, CompletionReceiver { rx })
}

impl<T> CompletionReceiver<T> {
  /// Blocks until the operation completes.
  pub fn recv(self) -> Result<T, RecvError> {
    self.rx.recv().map_err(|_| RecvError::Abandoned)
  }

  /// Blocks for at most `timeout`.
  pub fn recv_timeout(&self, timeout: Duration) -> Result<T, RecvError> {
    self.rx.recv_timeout(timeout).map_err(|err| match err {
      RecvTimeoutError::Timeout => RecvError::Timeout,
      RecvTimeoutError::Disconnected => RecvError::Abandoned,
    })
  }

  /// Returns the result if it is already there, `Ok(None)` if the operation
  /// is still in flight.
  pub fn try_recv(&self) -> Result<Option<T>, RecvError> {
    match self.rx.try_recv() {
      Ok(value) => Ok(Some(value)),
      Err(TryRecvError::Empty) => Ok(None),
      Err(TryRecvError::Disconnected) => Err(RecvError::Abandoned),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn delivers_once() {
    let (tx, token) = completion();
    assert_eq!(token.try_recv(), Ok(None));
    tx.send(7usize).unwrap();
    drop(tx);
    assert_eq!(token.try_recv(), Ok(Some(7)));
    assert_eq!(token.try_recv(), Err(RecvError::Abandoned));
  }

  #[test]
  fn dropped_sender_abandons() {
    let (tx, token) = completion::<Vec<u8>>();
    assert_eq!(
      token.recv_timeout(Duration::from_millis(10)),
      Err(RecvError::Timeout)
    );
    drop(tx);
    assert_eq!(token.recv(), Err(RecvError::Abandoned));
  }
}
