use chrono::{DateTime, Utc};

use crate::options::Properties;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum EventKind {
    Stdout,
    Stderr,
    Command,
}

impl EventKind {
    /// Numeric code stored with each record: `-1` command, `1` stdout,
    /// `2` stderr.
    pub fn code(self) -> i8 {
        match self {
            EventKind::Command => -1,
            EventKind::Stdout => 1,
            EventKind::Stderr => 2,
        }
    }
}

/// One captured line or recognized workflow command.
///
/// For commands `text` holds the command name and `data` its (masked)
/// argument. `size` is the byte length of the line as read from the child,
/// before masking, and is what the batching sender accounts against its
/// threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
    pub text: String,
    pub data: Option<String>,
    pub properties: Option<Properties>,
    pub size: usize,
}

impl Event {
    pub fn line(kind: EventKind, text: &[u8], size: usize) -> Self {
        Self {
            kind,
            timestamp: Utc::now(),
            text: String::from_utf8_lossy(text).into_owned(),
            data: None,
            properties: None,
            size,
        }
    }

    pub fn command(
        name: &str,
        data: &[u8],
        properties: Option<Properties>,
        size: usize,
    ) -> Self {
        Self {
            kind: EventKind::Command,
            timestamp: Utc::now(),
            text: name.to_string(),
            data: (!data.is_empty()).then(|| String::from_utf8_lossy(data).into_owned()),
            properties: properties.filter(|props| !props.is_empty()),
            size,
        }
    }

    /// An event produced by the wrapper itself rather than read from the
    /// child. It does not count towards the flush threshold.
    pub fn synthetic(kind: EventKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            timestamp: Utc::now(),
            text: text.into(),
            data: None,
            properties: None,
            size: 0,
        }
    }

    pub fn command_name(&self) -> Option<&str> {
        (self.kind == EventKind::Command).then_some(self.text.as_str())
    }
}
