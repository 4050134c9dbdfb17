#![forbid(unsafe_code)]
//! Runs a command and streams its output to SurrealDB.
//!
//! Each run gets a fresh table. Lines the child prints on stdout and stderr
//! become records in it, with GitHub-style workflow commands on stdout
//! (`::error file=x::msg`, `::add-mask::secret`, ...) stored as structured
//! records. Records are sent in batches whenever the buffered output grows
//! past a size limit or the child goes quiet for a while.

pub mod app;
pub mod config;
mod error;
pub mod process;
pub mod runner;
pub mod schema;
pub mod sender;

pub use config::{Cli, Options};
pub use error::{ConfigError, SurreallogError};
pub use runner::RunOptions;
pub use sender::{BatchSink, BatchingSender, BufferStats, EventRecord, FlushPolicy, SurrealSink};
