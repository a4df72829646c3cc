#![cfg_attr(docsrs, feature(doc_cfg))]

//! # ringfile - batched whole-file I/O over io_uring
//!
//! Reads and writes entire files through a kernel submission/completion ring
//! and reports each result to a callback. Requests are batched so the cost of
//! entering the kernel is shared between them.
//!
//! ## How it works
//!
//! ```text
//! caller threads ──enqueue──> RequestQueue ──> EventLoop ──push/submit/pop──> Ring
//!                                                 │
//!                          CallbackRegistry <─────┤ (fd -> callback)
//!                          errors()         <─────┘ (asynchronous failures)
//! ```
//!
//! A single thread owns the ring. Callers open the file, hand the request to
//! that thread and return. The loop pushes the request, and submits the batch
//! once more than [`Config::threshold`] requests are queued, when the periodic
//! [`Config::tick`] fires, or when [`Engine::poll`] asks for it. Completions
//! are matched to their callbacks by file handle; each handle is closed before
//! its callback runs.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use ringfile::{Config, Engine};
//!
//! fn main() -> ringfile::Result<()> {
//!   let engine = Engine::init(Config::default())?;
//!
//!   engine.read_file("/etc/hostname", |contents| {
//!     println!("{}", String::from_utf8_lossy(&contents));
//!   })?;
//!   let written = engine.write("/tmp/greeting", "hello", 0o644)?;
//!
//!   engine.poll();
//!   assert_eq!(written.recv().unwrap(), 5);
//!   engine.cleanup();
//!   Ok(())
//! }
//! ```
//!
//! ## Errors
//!
//! Failures before a request is accepted (opening the file, a closed engine)
//! are returned from the call and the callback never runs. Failures after
//! that are sent to [`Engine::errors`]; the affected callback never runs.
//!
//! ## Platform support
//!
//! | Platform   | Ring                       |
//! |------------|----------------------------|
//! | Linux      | io_uring                   |
//! | Other Unix | [`BlockingRing`] (pread/pwrite) |

pub mod backends;
pub mod batcher;
mod completion;
mod config;
mod engine;
mod error;
mod event_loop;
mod queue;
mod registry;
mod request;

pub use backends::{BlockingRing, CompletionEvent, Payload, Ring};
pub use batcher::{Batcher, Trigger};
pub use completion::{CompletionReceiver, RecvError};
pub use config::Config;
pub use engine::Engine;
pub use error::{Error, Result};
pub use request::{OpCode, ReadCallback, WriteCallback};
