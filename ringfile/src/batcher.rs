//! Flush policy.
//!
//! The count threshold amortizes the cost of entering the kernel under load.
//! The timer and explicit polls bound how long a request may wait when load
//! is low.

/// What woke the event loop up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
  /// A request was just pushed to the ring.
  Pushed,
  /// The periodic timer fired.
  Tick,
  /// A caller asked for a flush.
  Poll,
  /// The ring has no room for the next request.
  RingFull,
  /// The engine is shutting down.
  Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Batcher {
  threshold: usize,
}

impl Batcher {
  pub fn new(threshold: usize) -> Self {
    Self { threshold }
  }

  pub fn threshold(&self) -> usize {
    self.threshold
  }

  /// Whether `queued` pushed-but-unsubmitted requests should be submitted now.
  pub fn should_flush(&self, queued: usize, trigger: Trigger) -> bool {
    match trigger {
      Trigger::Pushed => queued > self.threshold,
      Trigger::Tick | Trigger::Poll | Trigger::RingFull | Trigger::Shutdown => {
        queued > 0
      }
    }
  }
}

impl Default for Batcher {
  fn default() -> Self {
    Self::new(crate::Config::DEFAULT_THRESHOLD)
  }
}
