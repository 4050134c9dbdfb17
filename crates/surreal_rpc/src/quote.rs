//! Quoting for values spliced into SurrealQL text.

const BRACKET_L: &str = "⟨";
const BRACKET_R: &str = "⟩";
const BACKTICK: &str = "`";

/// Quotes a record id part. Plain `[A-Za-z0-9_]` ids are left alone unless
/// they are entirely numeric; anything else is wrapped in `⟨⟩`.
pub fn quote_record_id(rid: &str) -> String {
    let simple = rid.bytes().all(is_word_byte);
    let numeric = rid.bytes().all(|b| b.is_ascii_digit());
    if simple && !numeric {
        return rid.to_string();
    }
    wrap(rid, BRACKET_L, BRACKET_R)
}

/// Quotes an identifier. Plain `[A-Za-z0-9_]` names that do not start with a
/// digit are left alone; anything else is wrapped in backticks.
pub fn quote_ident(ident: &str) -> String {
    let simple = ident.bytes().all(is_word_byte);
    let leading_digit = ident.bytes().next().is_some_and(|b| b.is_ascii_digit());
    if simple && !leading_digit && !ident.is_empty() {
        return ident.to_string();
    }
    wrap(ident, BACKTICK, BACKTICK)
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

fn wrap(value: &str, left: &str, right: &str) -> String {
    let escaped = value.replace(right, &format!("\\{right}"));
    format!("{left}{escaped}{right}")
}
