#![allow(dead_code)]

use std::{path::PathBuf, time::Duration};

use ringfile::{BlockingRing, Config, Engine, Error};
use tracing_subscriber::EnvFilter;

pub const WAIT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy)]
pub enum Backend {
  Uring,
  Blocking,
}

pub fn init_tracing() {
  let _ = tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .with_test_writer()
    .try_init();
}

/// Timer off, so nothing flushes unless a test asks for it.
pub fn config() -> Config {
  Config::new().tick(None)
}

/// Starts an engine on `backend`. Falls back to the blocking ring when the
/// sandbox refuses io_uring.
pub fn engine(backend: Backend, config: Config) -> Engine {
  init_tracing();
  match backend {
    Backend::Uring => match Engine::init(config.clone()) {
      Ok(engine) => engine,
      Err(Error::RingInit(err)) => {
        eprintln!("io_uring unavailable ({err}), using blocking ring");
        blocking(config)
      }
      Err(err) => panic!("engine init failed: {err}"),
    },
    Backend::Blocking => blocking(config),
  }
}

fn blocking(config: Config) -> Engine {
  let ring = BlockingRing::with_capacity(config.queue_depth as usize);
  Engine::with_ring(ring, config).unwrap()
}

pub struct Scratch {
  dir: tempfile::TempDir,
}

impl Scratch {
  pub fn new() -> Self {
    Self { dir: tempfile::tempdir().unwrap() }
  }

  pub fn path(&self, name: &str) -> PathBuf {
    self.dir.path().join(name)
  }

  /// Creates `name` holding `contents`.
  pub fn file(&self, name: &str, contents: &[u8]) -> PathBuf {
    let path = self.path(name);
    std::fs::write(&path, contents).unwrap();
    path
  }
}

pub fn payload(len: usize) -> Vec<u8> {
  let mut rng = fastrand::Rng::new();
  std::iter::repeat_with(|| rng.u8(..)).take(len).collect()
}

/// Generates one test per backend from a single body.
///
/// ```ignore
/// backend_test!(reads_small_file, common::config(), |engine| { ... });
/// ```
macro_rules! backend_test {
  ($name:ident, $config:expr, |$engine:ident| $body:block) => {
    pastey::paste! {
      #[test]
      fn [<$name _uring>]() {
        let $engine = common::engine(common::Backend::Uring, $config);
        $body
      }

      #[test]
      fn [<$name _blocking>]() {
        let $engine = common::engine(common::Backend::Blocking, $config);
        $body
      }
    }
  };
}
