//! The single owner of the ring.
//!
//! All `push`/`submit`/`pop` calls happen on the thread running
//! [`EventLoop::run`]. Callers reach it through the request queue and the
//! control channel only.

use std::{io, sync::Arc, time::Duration};

use crossbeam_channel::{Receiver, Sender, select};

use crate::{
  Error,
  backends::{CompletionEvent, Ring},
  batcher::{Batcher, Trigger},
  registry::{CallbackRegistry, consistency_fault},
  request::{Request, Submission},
};

/// Signals besides requests.
pub(crate) enum Control {
  Flush,
  Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum State {
  Idle,
  Draining,
  Shutdown,
}

pub(crate) struct EventLoop {
  ring: Box<dyn Ring>,
  registry: Arc<CallbackRegistry>,
  requests: Receiver<Request>,
  control: Receiver<Control>,
  errors: Sender<Error>,
  batcher: Batcher,
  tick: Option<Duration>,
  /// Pushed to the ring, not yet drained.
  queued: usize,
  state: State,
}

impl EventLoop {
  pub fn new(
    ring: Box<dyn Ring>,
    registry: Arc<CallbackRegistry>,
    requests: Receiver<Request>,
    control: Receiver<Control>,
    errors: Sender<Error>,
    batcher: Batcher,
    tick: Option<Duration>,
  ) -> Self {
    Self {
      ring,
      registry,
      requests,
      control,
      errors,
      batcher,
      tick,
      queued: 0,
      state: State::Idle,
    }
  }

  /// Runs until shutdown. Dropping `self` afterwards releases the ring and
  /// closes the request queue and the error channel.
  pub fn run(mut self) {
    let requests = self.requests.clone();
    let control = self.control.clone();
    let ticker = match self.tick {
      Some(interval) => crossbeam_channel::tick(interval),
      None => crossbeam_channel::never(),
    };

    tracing::debug!(
      threshold = self.batcher.threshold(),
      tick = ?self.tick,
      "event loop started"
    );

    while self.state != State::Shutdown {
      select! {
        recv(requests) -> request => match request {
          Ok(request) => self.accept(request),
          Err(_) => self.shutdown(),
        },
        recv(control) -> signal => match signal {
          Ok(Control::Flush) => self.flush(Trigger::Poll),
          Ok(Control::Shutdown) | Err(_) => self.shutdown(),
        },
        recv(ticker) -> _ => self.flush(Trigger::Tick),
      }
    }

    tracing::debug!("event loop stopped");
  }

  fn accept(&mut self, request: Request) {
    if self.ring.is_full() {
      self.flush(Trigger::RingFull);
    }

    let opcode = request.opcode();
    let (fd, entry, submission) = request.into_parts();

    self.registry.register(fd, entry);
    let pushed = match submission {
      Submission::Read { size } => self.ring.push_read(fd, size),
      Submission::Write { buf } => self.ring.push_write(fd, buf),
    };

    match pushed {
      Ok(()) => {
        self.queued += 1;
        tracing::trace!(fd, %opcode, queued = self.queued, "request pushed");
        self.flush(Trigger::Pushed);
      }
      Err(source) => {
        self.registry.purge(fd);
        self.report(Error::Push { op: opcode, source });
      }
    }
  }

  fn flush(&mut self, trigger: Trigger) {
    if !self.batcher.should_flush(self.queued, trigger) {
      return;
    }

    let prev = std::mem::replace(&mut self.state, State::Draining);
    tracing::debug!(queued = self.queued, ?trigger, "submitting batch");

    match self.submit() {
      Ok(submitted) => {
        tracing::trace!(submitted, "batch submitted");
        self.drain();
        self.queued = 0;
      }
      // The batch stays queued; the next trigger submits it again.
      Err(source) => {
        self.report(Error::Submit { batch: self.queued, source })
      }
    }

    self.state = prev;
  }

  fn submit(&mut self) -> io::Result<usize> {
    loop {
      match self.ring.submit(self.queued) {
        Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
        result => return result,
      }
    }
  }

  fn drain(&mut self) {
    let mut remaining = self.queued;

    while remaining > 0 {
      match self.ring.pop() {
        Ok(event) => {
          remaining -= 1;
          self.complete(event);
        }
        // Not a failure: wait for the kernel and retry the same slot.
        Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
          if let Err(source) = self.wait_for_completion() {
            remaining -= 1;
            self.report(Error::Pop { fd: None, source });
          }
        }
        Err(source) => {
          remaining -= 1;
          self.report(Error::Pop { fd: None, source });
        }
      }
    }
  }

  fn wait_for_completion(&mut self) -> io::Result<()> {
    loop {
      match self.ring.submit(1) {
        Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
        result => return result.map(drop),
      }
    }
  }

  fn complete(&mut self, event: CompletionEvent) {
    let CompletionEvent { fd, result } = event;
    match result {
      Ok(payload) => {
        if let Err(err) = self.registry.resolve(fd, payload) {
          self.report(err);
        }
      }
      Err(source) => {
        if !self.registry.purge(fd) {
          consistency_fault(fd, "has no registered callback");
        }
        self.report(Error::Pop { fd: Some(fd), source });
      }
    }
  }

  fn shutdown(&mut self) {
    if self.queued > 0 {
      tracing::debug!(queued = self.queued, "flushing before shutdown");
    }
    self.flush(Trigger::Shutdown);
    self.state = State::Shutdown;
  }

  fn report(&self, err: Error) {
    tracing::warn!(error = %err, "ringfile error");
    // The engine keeps a receiver for as long as the loop runs.
    let _ = self.errors.send(err);
  }
}
