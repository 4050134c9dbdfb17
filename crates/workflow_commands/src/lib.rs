#![forbid(unsafe_code)]
//! Line-level interpretation of captured process output.
//!
//! This crate turns the raw bytes a child writes to stdout and stderr into
//! [`Event`]s:
//! - [`AsyncLineSplitter`] cuts a byte stream into LF, CRLF or CR terminated
//!   lines under a hard length cap.
//! - [`WorkflowCommand`] parses `::name key=value::data` annotations and
//!   [`options`] coerces their properties.
//! - [`MaskSet`] redacts registered secrets and [`CommandGate`] implements
//!   `stop-commands`.
//! - [`StreamInterpreter`] ties these together per stream.

mod command;
mod config;
mod error;
mod event;
mod gate;
mod interpreter;
mod mask;
pub mod options;
mod reader;

pub use command::{trim_leading_whitespace, PropertyBag, WorkflowCommand};
pub use config::SplitLimits;
pub use error::{CommandError, OptionError, SplitError};
pub use event::{Event, EventKind};
pub use gate::CommandGate;
pub use interpreter::StreamInterpreter;
pub use mask::{MaskSet, MASK_MARKER};
pub use options::{OptionRule, OptionValue, Properties};

#[cfg(feature = "tokio")]
pub use reader::AsyncLineSplitter;
