#[macro_use]
mod common;

use std::{fs, sync::mpsc};

use common::{Scratch, WAIT};
use ringfile::{Error, RecvError};

backend_test!(setup_error_is_synchronous, common::config(), |engine| {
  let scratch = Scratch::new();

  let err = engine
    .read_file(scratch.path("missing"), |_| panic!("callback ran"))
    .unwrap_err();
  assert!(matches!(err, Error::Setup { .. }), "{err}");
  assert!(!err.is_async());

  let err = engine
    .write_file(scratch.path("no/such/dir"), "x", 0o644, |_| {
      panic!("callback ran")
    })
    .unwrap_err();
  assert!(matches!(err, Error::Setup { .. }), "{err}");

  engine.poll();
  assert!(engine.errors().try_recv().is_err());
  assert_eq!(engine.in_flight(), 0);
});

backend_test!(failed_read_is_reported_async, common::config(), |engine| {
  let scratch = Scratch::new();
  let dir = scratch.path("dir");
  fs::create_dir(&dir).unwrap();
  // Some filesystems report an empty directory as zero bytes long.
  fs::write(dir.join("entry"), b"").unwrap();

  // Opening a directory succeeds; reading it does not.
  let token = engine.read(&dir).unwrap();
  engine.poll();

  assert_eq!(token.recv_timeout(WAIT), Err(RecvError::Abandoned));
  let err = engine.errors().recv_timeout(WAIT).unwrap();
  assert!(matches!(err, Error::Pop { fd: Some(_), .. }), "{err}");
  assert!(err.raw_os_error().is_some());
  assert_eq!(engine.in_flight(), 0);
});

backend_test!(calls_after_cleanup_are_refused, common::config(), |engine| {
  let scratch = Scratch::new();
  let path = scratch.file("f", b"x");

  engine.cleanup();
  engine.cleanup();

  assert!(matches!(engine.read_file(&path, |_| {}), Err(Error::Shutdown)));
  assert!(matches!(
    engine.write_file(&path, "y", 0o644, |_| {}),
    Err(Error::Shutdown)
  ));
  engine.poll();
  assert_eq!(fs::read(&path).unwrap(), b"x");
});

backend_test!(error_channel_closes_on_cleanup, common::config(), |engine| {
  let errors = engine.errors();
  let drain = std::thread::spawn(move || errors.iter().count());

  engine.cleanup();
  assert_eq!(drain.join().unwrap(), 0);
});

backend_test!(cleanup_flushes_pending_batch, common::config(), |engine| {
  let scratch = Scratch::new();
  let path = scratch.file("f", b"pending");

  let token = engine.read(&path).unwrap();
  drop(engine);
  assert_eq!(token.recv_timeout(WAIT).unwrap(), b"pending");
});

#[cfg(target_os = "linux")]
fn open_handles_to(path: &std::path::Path) -> usize {
  fs::read_dir("/proc/self/fd")
    .unwrap()
    .filter_map(|entry| fs::read_link(entry.ok()?.path()).ok())
    .filter(|target| target == path)
    .count()
}

#[cfg(target_os = "linux")]
backend_test!(handle_closed_before_callback, common::config(), |engine| {
  let scratch = Scratch::new();
  let path = fs::canonicalize(scratch.file("f", b"closed")).unwrap();

  let (tx, rx) = mpsc::channel();
  let watched = path.clone();
  engine
    .read_file(&path, move |buf| {
      tx.send((buf, open_handles_to(&watched))).unwrap();
    })
    .unwrap();
  assert_eq!(open_handles_to(&path), 1);
  engine.poll();

  let (buf, open) = rx.recv_timeout(WAIT).unwrap();
  assert_eq!(buf, b"closed");
  assert_eq!(open, 0);
});

#[cfg(target_os = "linux")]
backend_test!(handle_closed_before_write_callback, common::config(), |engine| {
  let scratch = Scratch::new();
  let path = fs::canonicalize(scratch.file("w", b"")).unwrap();

  let (tx, rx) = mpsc::channel();
  let watched = path.clone();
  engine
    .write_file(&path, "data", 0o644, move |n| {
      tx.send((n, open_handles_to(&watched))).unwrap();
    })
    .unwrap();
  assert_eq!(open_handles_to(&path), 1);
  engine.poll();

  let (n, open) = rx.recv_timeout(WAIT).unwrap();
  assert_eq!(n, 4);
  assert_eq!(open, 0);
  assert_eq!(fs::read(&path).unwrap(), b"data");
});
