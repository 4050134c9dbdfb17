use std::collections::BTreeMap;

use serde::Serialize;

use crate::command::PropertyBag;
use crate::error::OptionError;

/// How a declared property is coerced out of a [`PropertyBag`].
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum OptionRule {
    /// Taken as-is; omitted when absent.
    String,
    /// Taken as-is; the default when absent.
    StringOr(&'static str),
    /// A base-10 integer of at least 1; omitted when absent.
    PositiveInt,
    /// A base-10 integer of at least 1; the default when absent.
    PositiveIntOr(i64),
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OptionValue {
    Text(String),
    Integer(i64),
}

pub type Properties = BTreeMap<String, OptionValue>;

/// Properties recognized on `notice`, `warning` and `error` annotations.
pub const ANNOTATION_RULES: &[(&str, OptionRule)] = &[
    ("title", OptionRule::String),
    ("file", OptionRule::StringOr(".github")),
    ("col", OptionRule::PositiveInt),
    ("endColumn", OptionRule::PositiveInt),
    ("line", OptionRule::PositiveIntOr(1)),
    ("endLine", OptionRule::PositiveIntOr(1)),
];

/// Applies every declared rule to `bag`.
///
/// Properties present in the bag without a rule are dropped. The first
/// malformed value aborts the extraction and discards everything coerced so
/// far.
pub fn extract(
    bag: &PropertyBag,
    rules: &[(&str, OptionRule)],
) -> Result<Properties, OptionError> {
    let mut out = Properties::new();
    for (name, rule) in rules {
        let raw = bag.get(name);
        let value = match (*rule, raw) {
            (OptionRule::String, None) | (OptionRule::PositiveInt, None) => continue,
            (OptionRule::String, Some(raw)) | (OptionRule::StringOr(_), Some(raw)) => {
                OptionValue::Text(String::from_utf8_lossy(raw).into_owned())
            }
            (OptionRule::StringOr(default), None) => OptionValue::Text(default.to_string()),
            (OptionRule::PositiveIntOr(default), None) => OptionValue::Integer(default),
            (OptionRule::PositiveInt, Some(raw)) | (OptionRule::PositiveIntOr(_), Some(raw)) => {
                OptionValue::Integer(positive_int(name, raw)?)
            }
        };
        out.insert((*name).to_string(), value);
    }
    Ok(out)
}

fn positive_int(name: &str, raw: &[u8]) -> Result<i64, OptionError> {
    let out_of_range = || OptionError::OutOfRange {
        name: name.to_string(),
        value: String::from_utf8_lossy(raw).into_owned(),
    };
    let text = std::str::from_utf8(raw).map_err(|_| out_of_range())?;
    let literal = text.trim_matches(|c: char| matches!(c, ' ' | '\t' | '\r' | '\n'));
    if !is_integer_literal(literal) {
        return Err(out_of_range());
    }
    match literal.parse::<i64>() {
        Ok(value) if value >= 1 => Ok(value),
        _ => Err(out_of_range()),
    }
}

/// `-?(0|[1-9][0-9]*)`: no sign other than minus, no leading zeros.
fn is_integer_literal(text: &str) -> bool {
    let digits = text.strip_prefix('-').unwrap_or(text);
    match digits.as_bytes() {
        [] => false,
        [b'0'] => true,
        [b'0', ..] => false,
        bytes => bytes.iter().all(u8::is_ascii_digit),
    }
}
