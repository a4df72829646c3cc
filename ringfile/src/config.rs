//! Engine configuration.

use std::time::Duration;

use crate::{Error, Result};

/// Tunables for an [`Engine`](crate::Engine).
///
/// ```rust
/// use std::time::Duration;
///
/// let config = ringfile::Config::new()
///   .threshold(8)
///   .tick(Some(Duration::from_millis(100)));
/// assert_eq!(config.threshold, 8);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Config {
  /// A batch is submitted as soon as more than this many requests are queued.
  pub threshold: usize,
  /// Interval of the periodic flush. `None` leaves [`Engine::poll`] as the
  /// only way to flush a batch below the threshold.
  ///
  /// [`Engine::poll`]: crate::Engine::poll
  pub tick: Option<Duration>,
  /// Submission queue entries of the ring.
  pub queue_depth: u32,
  /// Preferred length of the segments a read is split into.
  pub segment_size: usize,
  /// Requests buffered between callers and the event loop. `0` is a
  /// rendezvous: every call blocks until the loop takes the request.
  pub request_capacity: usize,
}

impl Config {
  pub const DEFAULT_THRESHOLD: usize = 5;
  pub const DEFAULT_TICK: Duration = Duration::from_millis(500);
  pub const DEFAULT_QUEUE_DEPTH: u32 = 16;
  pub const DEFAULT_SEGMENT_SIZE: usize = 4096;

  pub fn new() -> Self {
    Self::default()
  }

  pub fn threshold(mut self, threshold: usize) -> Self {
    self.threshold = threshold;
    self
  }

  pub fn tick(mut self, tick: Option<Duration>) -> Self {
    self.tick = tick;
    self
  }

  pub fn queue_depth(mut self, queue_depth: u32) -> Self {
    self.queue_depth = queue_depth;
    self
  }

  pub fn segment_size(mut self, segment_size: usize) -> Self {
    self.segment_size = segment_size;
    self
  }

  pub fn request_capacity(mut self, request_capacity: usize) -> Self {
    self.request_capacity = request_capacity;
    self
  }

  pub(crate) fn validate(&self) -> Result<()> {
    if self.queue_depth == 0 {
      return Err(Error::Config("queue_depth must be at least 1".into()));
    }
    if self.segment_size == 0 {
      return Err(Error::Config("segment_size must be at least 1".into()));
    }
    if self.tick.is_some_and(|tick| tick.is_zero()) {
      return Err(Error::Config("tick must be non-zero".into()));
    }
    Ok(())
  }
}

impl Default for Config {
  fn default() -> Self {
    Self {
      threshold: Self::DEFAULT_THRESHOLD,
      tick: Some(Self::DEFAULT_TICK),
      queue_depth: Self::DEFAULT_QUEUE_DEPTH,
      segment_size: Self::DEFAULT_SEGMENT_SIZE,
      request_capacity: 0,
    }
  }
}
