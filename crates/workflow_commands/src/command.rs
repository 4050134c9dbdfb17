use std::collections::HashMap;

use crate::error::{CommandError, OptionError};
use crate::options::{self, OptionRule, Properties};

/// Raw property values of a parsed command, keyed by property name.
///
/// Values are already percent-unescaped. Nothing is coerced until
/// [`WorkflowCommand::extract`] is called with a rule table.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct PropertyBag {
    values: HashMap<String, Vec<u8>>,
}

impl PropertyBag {
    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.values.get(name).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn insert(&mut self, key: &[u8], raw_value: &[u8]) {
        if let Some(value) = unescape_property(raw_value) {
            self.values
                .insert(String::from_utf8_lossy(key).into_owned(), value);
        }
    }
}

/// A line of the form `::name key=value,key=value::data`.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct WorkflowCommand {
    pub name: String,
    pub data: Vec<u8>,
    pub properties: PropertyBag,
}

impl WorkflowCommand {
    /// Parses one already-split line.
    ///
    /// Leading whitespace is ignored. Any deviation from the grammar (a single
    /// colon where `::` is expected, a second `=` inside a property, a `,`
    /// before a key's `=`, no data delimiter at all) yields
    /// [`CommandError::Syntax`].
    pub fn parse(line: &[u8]) -> Result<Self, CommandError> {
        let s = trim_leading_whitespace(line);
        if s.len() <= 4 || s[0] != b':' || s[1] != b':' {
            return Err(CommandError::Syntax);
        }

        let Some(name_end) = s[2..].iter().position(|b| *b == b':' || *b == b' ') else {
            return Err(CommandError::Syntax);
        };
        let name_end = name_end + 2;
        let name = String::from_utf8_lossy(&s[2..name_end]).into_owned();

        if s[name_end] == b':' {
            let data_start = expect_double_colon(s, name_end)?;
            return Ok(Self {
                name,
                data: unescape_data(&s[data_start..]),
                properties: PropertyBag::default(),
            });
        }

        let mut properties = PropertyBag::default();
        let mut start = name_end + 1;
        let mut key: Option<&[u8]> = None;
        for j in start..s.len() {
            match s[j] {
                b'=' => {
                    if key.is_some() {
                        return Err(CommandError::Syntax);
                    }
                    key = Some(&s[start..j]);
                    start = j + 1;
                }
                b',' => {
                    let Some(k) = key.take() else {
                        return Err(CommandError::Syntax);
                    };
                    properties.insert(k, &s[start..j]);
                    start = j + 1;
                }
                b':' => {
                    let data_start = expect_double_colon(s, j)?;
                    if let Some(k) = key {
                        properties.insert(k, &s[start..j]);
                    }
                    return Ok(Self {
                        name,
                        data: unescape_data(&s[data_start..]),
                        properties,
                    });
                }
                _ => {}
            }
        }

        Err(CommandError::Syntax)
    }

    /// Coerces the declared properties; see [`options::extract`].
    pub fn extract(&self, rules: &[(&str, OptionRule)]) -> Result<Properties, OptionError> {
        options::extract(&self.properties, rules)
    }
}

/// Returns the index just past a `::` starting at `at`.
fn expect_double_colon(s: &[u8], at: usize) -> Result<usize, CommandError> {
    if s.get(at + 1) == Some(&b':') {
        Ok(at + 2)
    } else {
        Err(CommandError::Syntax)
    }
}

/// Strips leading ASCII whitespace (space, tab, CR, LF, FF, VT) and any leading
/// Unicode whitespace.
pub fn trim_leading_whitespace(s: &[u8]) -> &[u8] {
    let mut start = 0;
    while start < s.len() {
        let byte = s[start];
        if byte.is_ascii() {
            if !matches!(byte, b' ' | b'\t' | b'\n' | b'\r' | 0x0b | 0x0c) {
                break;
            }
            start += 1;
            continue;
        }
        match leading_char(&s[start..]) {
            Some(ch) if ch.is_whitespace() => start += ch.len_utf8(),
            _ => break,
        }
    }
    &s[start..]
}

fn leading_char(s: &[u8]) -> Option<char> {
    let prefix = &s[..s.len().min(4)];
    let valid = match std::str::from_utf8(prefix) {
        Ok(valid) => valid,
        Err(err) => std::str::from_utf8(&prefix[..err.valid_up_to()]).ok()?,
    };
    valid.chars().next()
}

fn unescape_data(s: &[u8]) -> Vec<u8> {
    unescape(s, |hi, lo| match (hi, lo.to_ascii_uppercase()) {
        (b'0', b'A') => Some(b'\n'),
        (b'0', b'D') => Some(b'\r'),
        (b'2', b'5') => Some(b'%'),
        _ => None,
    })
}

/// An empty value means the property is absent.
fn unescape_property(s: &[u8]) -> Option<Vec<u8>> {
    if s.is_empty() {
        return None;
    }
    Some(unescape(s, |hi, lo| match (hi, lo.to_ascii_uppercase()) {
        (b'0', b'A') => Some(b'\n'),
        (b'0', b'D') => Some(b'\r'),
        (b'2', b'5') => Some(b'%'),
        (b'2', b'C') => Some(b','),
        (b'3', b'A') => Some(b':'),
        _ => None,
    }))
}

fn unescape(s: &[u8], decode: impl Fn(u8, u8) -> Option<u8>) -> Vec<u8> {
    let mut out = Vec::with_capacity(s.len());
    let mut i = 0;
    while i < s.len() {
        if s[i] == b'%' && i + 2 < s.len() {
            if let Some(byte) = decode(s[i + 1], s[i + 2]) {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(s[i]);
        i += 1;
    }
    out
}
