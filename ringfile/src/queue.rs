//! Hand-off of requests from caller threads to the event loop.

use crossbeam_channel::{Receiver, Sender};

use crate::{Error, request::Request};

/// Sending half, shared by every caller thread.
///
/// With zero capacity the hand-off is a rendezvous: [`enqueue`] returns only
/// once the event loop has taken the request, which keeps callers from
/// outrunning the loop.
///
/// [`enqueue`]: RequestQueue::enqueue
pub(crate) struct RequestQueue {
  tx: Sender<Request>,
}

pub(crate) fn request_queue(capacity: usize) -> (RequestQueue, Receiver<Request>) {
  let (tx, rx) = crossbeam_channel::bounded(capacity);
  (RequestQueue { tx }, rx)
}

impl RequestQueue {
  /// Blocks until the request is accepted.
  ///
  /// Fails with [`Error::Shutdown`] once the receiving loop is gone; the
  /// request, and with it the file handle, is dropped.
  pub fn enqueue(&self, request: Request) -> Result<(), Error> {
    self.tx.send(request).map_err(|_| Error::Shutdown)
  }
}
