//! Per-operation state the kernel may touch until its completion is reaped.
//!
//! Every pointer handed to an SQE points into a heap allocation owned by an
//! [`InFlight`]. Moving the `InFlight` itself (for example into a map) does not
//! move those allocations, so the SQE stays valid for as long as the value is
//! kept alive.
//!
//! A single transfer may move fewer bytes than asked for (the kernel caps one
//! read or write at `MAX_RW_COUNT`). [`InFlight::advance`] then trims the
//! iovecs to the remainder so the operation can be pushed again at
//! [`InFlight::offset`].

use std::io;

use crate::{MAX_SEGMENTS, Payload};

enum Kind {
  Read { segments: Vec<Vec<u8>> },
  Write { buf: Vec<u8> },
}

pub(crate) struct InFlight {
  kind: Kind,
  /// Iovecs still to transfer. Trimmed in place, never reallocated.
  iovecs: Vec<libc::iovec>,
  len: usize,
  done: usize,
}

/// Segment length used for a read of `size` bytes.
///
/// Grows past `preferred` when the file would otherwise need more than
/// [`MAX_SEGMENTS`] iovecs.
pub(crate) fn segment_len(size: usize, preferred: usize) -> usize {
  let preferred = preferred.max(1);
  if size.div_ceil(preferred) > MAX_SEGMENTS {
    size.div_ceil(MAX_SEGMENTS)
  } else {
    preferred
  }
}

impl InFlight {
  pub(crate) fn read(size: usize, preferred_segment: usize) -> Self {
    let seg = segment_len(size, preferred_segment);

    let mut segments = Vec::with_capacity(size.div_ceil(seg));
    let mut remaining = size;
    while remaining > 0 {
      let len = remaining.min(seg);
      segments.push(vec![0u8; len]);
      remaining -= len;
    }

    let iovecs = segments
      .iter_mut()
      .map(|segment| libc::iovec {
        iov_base: segment.as_mut_ptr().cast(),
        iov_len: segment.len(),
      })
      .collect();

    Self { kind: Kind::Read { segments }, iovecs, len: size, done: 0 }
  }

  pub(crate) fn write(mut buf: Vec<u8>) -> Self {
    let iovecs = vec![libc::iovec {
      iov_base: buf.as_mut_ptr().cast(),
      iov_len: buf.len(),
    }];
    let len = buf.len();
    Self { kind: Kind::Write { buf }, iovecs, len, done: 0 }
  }

  pub(crate) fn is_read(&self) -> bool {
    matches!(self.kind, Kind::Read { .. })
  }

  pub(crate) fn iovecs_ptr(&self) -> *const libc::iovec {
    self.iovecs.as_ptr()
  }

  pub(crate) fn iovecs_len(&self) -> u32 {
    // Bounded by MAX_SEGMENTS.
    self.iovecs.len() as u32
  }

  /// File offset the next transfer starts at.
  pub(crate) fn offset(&self) -> u64 {
    self.done as u64
  }

  /// Accounts for a transfer that returned `res`.
  ///
  /// Returns `Ok(true)` once the operation is finished and `Ok(false)` when
  /// the remainder has to be pushed again. A read that hits end of file is
  /// finished early; a write that makes no progress fails with `WriteZero`.
  pub(crate) fn advance(&mut self, res: i32) -> io::Result<bool> {
    if res < 0 {
      return Err(io::Error::from_raw_os_error(-res));
    }
    let n = res as usize;
    self.done += n;

    if self.done >= self.len {
      return Ok(true);
    }
    if n == 0 {
      return match self.kind {
        Kind::Read { .. } => Ok(true),
        Kind::Write { .. } => Err(io::ErrorKind::WriteZero.into()),
      };
    }

    self.consume(n);
    Ok(false)
  }

  fn consume(&mut self, mut n: usize) {
    let mut spent = 0;
    for iov in &mut self.iovecs {
      if n >= iov.iov_len {
        n -= iov.iov_len;
        spent += 1;
        continue;
      }
      // SAFETY: `n < iov_len`, so the pointer stays inside the same buffer.
      iov.iov_base = unsafe { iov.iov_base.cast::<u8>().add(n).cast() };
      iov.iov_len -= n;
      break;
    }
    self.iovecs.drain(..spent);
  }

  /// The typed result of a finished operation, releasing the buffers.
  pub(crate) fn into_payload(self) -> Payload {
    match self.kind {
      Kind::Read { mut segments } => {
        if segments.len() == 1 {
          let mut only = segments.pop().unwrap_or_default();
          only.truncate(self.done);
          return Payload::Read(only);
        }

        let mut out = Vec::with_capacity(self.done);
        for segment in &segments {
          let want = self.done - out.len();
          if want == 0 {
            break;
          }
          out.extend_from_slice(&segment[..want.min(segment.len())]);
        }
        Payload::Read(out)
      }
      Kind::Write { buf } => {
        debug_assert!(self.done <= buf.len());
        Payload::Written(self.done)
      }
    }
  }
}
