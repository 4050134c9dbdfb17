use thiserror::Error;

/// A line that looked like it might be a workflow command but does not follow
/// the `::name key=value::data` grammar. Callers treat the line as plain text.
#[derive(Debug, Clone, Copy, Error, Eq, PartialEq)]
pub enum CommandError {
    #[error("invalid workflow command syntax")]
    Syntax,
}

#[derive(Debug, Clone, Error, Eq, PartialEq)]
pub enum OptionError {
    #[error("workflow command property `{name}` must be a positive integer (got {value:?})")]
    OutOfRange { name: String, value: String },
}

#[derive(Debug, Error)]
pub enum SplitError {
    #[error("line {line_number} exceeds the maximum length of {max_line_bytes} bytes")]
    LineTooLong {
        line_number: usize,
        max_line_bytes: usize,
    },
    #[error("I/O error while reading line {line_number}: {source}")]
    Io {
        line_number: usize,
        #[source]
        source: std::io::Error,
    },
}
