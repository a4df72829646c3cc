use std::{
  fs::{File, OpenOptions},
  io,
  os::unix::fs::OpenOptionsExt,
  panic,
  path::Path,
  sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
  },
  thread::{self, JoinHandle, ThreadId},
};

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;

use crate::{
  Config, Error, Result,
  backends::{self, Ring},
  batcher::Batcher,
  completion::{CompletionReceiver, completion},
  event_loop::{Control, EventLoop},
  queue::{RequestQueue, request_queue},
  registry::CallbackRegistry,
  request::Request,
};

const LOOP_THREAD_NAME: &str = "ringfile-loop";

/// Handle to a running event loop and the ring it owns.
///
/// Every method takes `&self`; share the engine between threads with an
/// [`Arc`]. Completion callbacks run on the loop thread and must not call
/// [`read_file`](Engine::read_file), [`write_file`](Engine::write_file) or
/// [`poll`](Engine::poll) on the engine that runs them.
pub struct Engine {
  requests: RequestQueue,
  control: Sender<Control>,
  errors: Receiver<Error>,
  registry: Arc<CallbackRegistry>,
  worker: Mutex<Option<JoinHandle<()>>>,
  loop_thread: ThreadId,
  closed: AtomicBool,
  config: Config,
}

impl Engine {
  /// Sets up the platform's default ring and starts the event loop.
  ///
  /// # Errors
  /// [`Error::Config`] for an invalid `config`, [`Error::RingInit`] when the
  /// kernel refuses the ring.
  pub fn init(config: Config) -> Result<Self> {
    config.validate()?;
    let ring = backends::default_ring(&config).map_err(Error::RingInit)?;
    Self::start(ring, config)
  }

  /// Starts the event loop on a caller-supplied ring.
  pub fn with_ring<R>(ring: R, config: Config) -> Result<Self>
  where
    R: Ring + 'static,
  {
    config.validate()?;
    Self::start(Box::new(ring), config)
  }

  fn start(ring: Box<dyn Ring>, config: Config) -> Result<Self> {
    let registry =
      Arc::new(CallbackRegistry::with_capacity(config.queue_depth as usize));
    let (requests, request_rx) = request_queue(config.request_capacity);
    let (control, control_rx) = crossbeam_channel::bounded(0);
    let (error_tx, errors) = crossbeam_channel::unbounded();

    let event_loop = EventLoop::new(
      ring,
      registry.clone(),
      request_rx,
      control_rx,
      error_tx,
      Batcher::new(config.threshold),
      config.tick,
    );

    let worker = thread::Builder::new()
      .name(LOOP_THREAD_NAME.into())
      .spawn(move || event_loop.run())
      .map_err(Error::Spawn)?;

    tracing::debug!(?config, "engine started");

    Ok(Self {
      requests,
      control,
      errors,
      registry,
      loop_thread: worker.thread().id(),
      worker: Mutex::new(Some(worker)),
      closed: AtomicBool::new(false),
      config,
    })
  }

  /// Reads the whole file at `path`.
  ///
  /// The file is opened and sized here; `callback` later receives its
  /// contents on the loop thread, after the handle was closed.
  ///
  /// # Errors
  /// [`Error::Setup`] if the file cannot be opened or inspected, in which case
  /// `callback` never runs. [`Error::Shutdown`] after [`cleanup`].
  ///
  /// [`cleanup`]: Engine::cleanup
  pub fn read_file<F>(&self, path: impl AsRef<Path>, callback: F) -> Result<()>
  where
    F: FnOnce(Vec<u8>) + Send + 'static,
  {
    self.ensure_open()?;
    let path = path.as_ref();

    let file = File::open(path).map_err(|err| Error::setup(path, err))?;
    let len = file.metadata().map_err(|err| Error::setup(path, err))?.len();
    let size = usize::try_from(len).map_err(|_| {
      Error::setup(
        path,
        io::Error::new(io::ErrorKind::FileTooLarge, "file exceeds usize"),
      )
    })?;

    self.enqueue(Request::Read { file, size, callback: Box::new(callback) })
  }

  /// Replaces the contents of the file at `path` with `data`, creating it
  /// with permission bits `mode` if needed. `callback` receives the number
  /// of bytes written.
  ///
  /// # Errors
  /// Same as [`read_file`](Engine::read_file).
  pub fn write_file<F>(
    &self,
    path: impl AsRef<Path>,
    data: impl Into<Vec<u8>>,
    mode: u32,
    callback: F,
  ) -> Result<()>
  where
    F: FnOnce(usize) + Send + 'static,
  {
    self.ensure_open()?;
    let path = path.as_ref();

    let file = OpenOptions::new()
      .write(true)
      .create(true)
      .truncate(true)
      .mode(mode)
      .open(path)
      .map_err(|err| Error::setup(path, err))?;

    self.enqueue(Request::Write {
      file,
      buf: data.into(),
      callback: Box::new(callback),
    })
  }

  /// [`read_file`](Engine::read_file) with the result delivered through a
  /// [`CompletionReceiver`].
  pub fn read(
    &self,
    path: impl AsRef<Path>,
  ) -> Result<CompletionReceiver<Vec<u8>>> {
    let (tx, token) = completion();
    self.read_file(path, move |buf| {
      let _ = tx.send(buf);
    })?;
    Ok(token)
  }

  /// [`write_file`](Engine::write_file) with the result delivered through a
  /// [`CompletionReceiver`].
  pub fn write(
    &self,
    path: impl AsRef<Path>,
    data: impl Into<Vec<u8>>,
    mode: u32,
  ) -> Result<CompletionReceiver<usize>> {
    let (tx, token) = completion();
    self.write_file(path, data, mode, move |n| {
      let _ = tx.send(n);
    })?;
    Ok(token)
  }

  /// Asks the loop to submit whatever is queued.
  ///
  /// Blocks until the loop takes the signal, not until the batch completes.
  /// Does nothing after [`cleanup`](Engine::cleanup).
  pub fn poll(&self) {
    if self.closed.load(Ordering::Acquire) {
      return;
    }
    self.assert_not_loop_thread("poll");
    // Disconnected only once the loop is gone, and then there is nothing
    // left to flush.
    if self.control.send(Control::Flush).is_err() {
      tracing::trace!("poll after the event loop exited");
    }
  }

  /// Errors reported after their request was accepted.
  ///
  /// Drain it from a dedicated thread if callers depend on the error signal.
  /// The channel is unbounded, so an undrained receiver never stalls the loop.
  /// Iteration ends once the engine is cleaned up and every reported error
  /// was received.
  pub fn errors(&self) -> Receiver<Error> {
    self.errors.clone()
  }

  /// Operations accepted by the loop that have not completed yet.
  pub fn in_flight(&self) -> usize {
    self.registry.len()
  }

  pub fn config(&self) -> &Config {
    &self.config
  }

  /// Stops the event loop and releases the ring.
  ///
  /// Requests already accepted are submitted and completed before the loop
  /// exits. Later calls return [`Error::Shutdown`]. Calling this again is a
  /// no-op.
  ///
  /// Called from a completion callback, it only marks the engine closed; the
  /// loop then stops once the engine is dropped.
  ///
  /// # Panics
  /// Re-raises a panic of the loop thread, such as a bookkeeping fault or a
  /// panicking callback.
  pub fn cleanup(&self) {
    let Some(worker) = self.worker.lock().take() else {
      return;
    };
    self.closed.store(true, Ordering::Release);

    if thread::current().id() == self.loop_thread {
      tracing::debug!("cleanup from the loop thread, detaching");
      return;
    }

    // Fails only if the loop already exited (it panicked); the join below
    // reports that.
    if self.control.send(Control::Shutdown).is_err() {
      tracing::trace!("event loop exited before shutdown");
    }
    match worker.join() {
      Ok(()) => tracing::debug!("engine stopped"),
      Err(payload) => {
        tracing::error!("event loop panicked");
        if !thread::panicking() {
          panic::resume_unwind(payload);
        }
      }
    }
  }

  fn ensure_open(&self) -> Result<()> {
    if self.closed.load(Ordering::Acquire) {
      return Err(Error::Shutdown);
    }
    Ok(())
  }

  fn enqueue(&self, request: Request) -> Result<()> {
    self.assert_not_loop_thread("enqueue");
    self.requests.enqueue(request)
  }

  fn assert_not_loop_thread(&self, what: &str) {
    assert!(
      thread::current().id() != self.loop_thread,
      "ringfile consumer error: {what} called from a completion callback would deadlock"
    );
  }
}

impl Drop for Engine {
  fn drop(&mut self) {
    self.cleanup();
  }
}
