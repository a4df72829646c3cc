#[macro_use]
mod common;

use std::{fs, os::unix::fs::PermissionsExt, sync::Arc, thread};

use common::{Scratch, WAIT, payload};
use proptest::prelude::*;

backend_test!(writes_empty_buffer, common::config(), |engine| {
  let scratch = Scratch::new();
  let path = scratch.file("out", b"stale");

  let token = engine.write(&path, Vec::new(), 0o644).unwrap();
  engine.poll();

  assert_eq!(token.recv_timeout(WAIT).unwrap(), 0);
  assert_eq!(fs::read(&path).unwrap(), b"");
});

backend_test!(writes_and_reads_back, common::config(), |engine| {
  let scratch = Scratch::new();
  let path = scratch.path("out");
  let data = payload(64 * 1024 + 3);

  let written = engine.write(&path, data.clone(), 0o644).unwrap();
  engine.poll();
  assert_eq!(written.recv_timeout(WAIT).unwrap(), data.len());

  let read = engine.read(&path).unwrap();
  engine.poll();
  assert_eq!(read.recv_timeout(WAIT).unwrap(), data);
});

backend_test!(writes_large_buffer, common::config(), |engine| {
  let scratch = Scratch::new();
  let path = scratch.path("large");
  let data = payload(5 * 1024 * 1024);

  let token = engine.write(&path, data.clone(), 0o640).unwrap();
  engine.poll();

  assert_eq!(token.recv_timeout(WAIT).unwrap(), data.len());
  assert_eq!(fs::read(&path).unwrap(), data);
  let mode = fs::metadata(&path).unwrap().permissions().mode();
  assert_eq!(mode & 0o777, 0o640);
});

backend_test!(
  writes_from_many_threads,
  common::config().tick(Some(std::time::Duration::from_millis(20))),
  |engine| {
    let engine = Arc::new(engine);
    let scratch = Arc::new(Scratch::new());

    let workers: Vec<_> = (0..8)
      .map(|t| {
        let engine = engine.clone();
        let scratch = scratch.clone();
        thread::spawn(move || {
          (0..10)
            .map(|i| {
              let path = scratch.path(&format!("t{t}-{i}"));
              let data = format!("thread {t} file {i}");
              let token = engine.write(&path, data.clone(), 0o644).unwrap();
              (path, data, token)
            })
            .collect::<Vec<_>>()
        })
      })
      .collect();

    for worker in workers {
      for (path, data, token) in worker.join().unwrap() {
        assert_eq!(token.recv_timeout(WAIT).unwrap(), data.len());
        assert_eq!(fs::read_to_string(&path).unwrap(), data);
      }
    }
  }
);

proptest! {
  #![proptest_config(ProptestConfig::with_cases(32))]

  #[test]
  fn prop_written_file_equals_buffer(
    data in prop::collection::vec(any::<u8>(), 0..=20_000),
  ) {
    let engine = common::engine(common::Backend::Uring, common::config());
    let scratch = Scratch::new();
    let path = scratch.path("prop");

    let token = engine.write(&path, data.clone(), 0o644).unwrap();
    engine.poll();

    prop_assert_eq!(token.recv_timeout(WAIT).unwrap(), data.len());
    prop_assert_eq!(fs::read(&path).unwrap(), data);
  }
}
