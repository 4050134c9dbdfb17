use std::sync::{Arc, PoisonError, RwLock};

use memchr::memmem;

use crate::command::trim_leading_whitespace;

/// Replacement written over every occurrence of a registered secret.
pub const MASK_MARKER: &[u8] = b"***";

/// Ordered list of secrets to redact, shared between the stdout and stderr
/// readers. Clones share the same list.
#[derive(Debug, Clone, Default)]
pub struct MaskSet {
    tokens: Arc<RwLock<Vec<Vec<u8>>>>,
}

impl MaskSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `token` unless it is blank. Returns whether it was added.
    pub fn register(&self, token: &[u8]) -> bool {
        if trim_leading_whitespace(token).is_empty() {
            return false;
        }
        self.tokens
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(token.to_vec());
        true
    }

    /// Replaces each registered token with [`MASK_MARKER`], token by token in
    /// registration order, each pass running over the previous pass's output.
    pub fn apply(&self, input: &[u8]) -> Vec<u8> {
        let tokens = self.tokens.read().unwrap_or_else(PoisonError::into_inner);
        let mut out = input.to_vec();
        for token in tokens.iter() {
            out = replace_all(&out, token);
        }
        out
    }

    pub fn len(&self) -> usize {
        self.tokens
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn replace_all(haystack: &[u8], needle: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(haystack.len());
    let mut last = 0;
    for start in memmem::find_iter(haystack, needle) {
        out.extend_from_slice(&haystack[last..start]);
        out.extend_from_slice(MASK_MARKER);
        last = start + needle.len();
    }
    out.extend_from_slice(&haystack[last..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_every_occurrence() {
        let masks = MaskSet::new();
        assert!(masks.register(b"ichiro"));
        assert_eq!(masks.apply(b"ichiro and ichiro"), b"*** and ***");
    }

    #[test]
    fn blank_tokens_are_not_registered() {
        let masks = MaskSet::new();
        assert!(!masks.register(b""));
        assert!(!masks.register(b" \t "));
        assert!(masks.is_empty());
        assert_eq!(masks.apply(b"a b"), b"a b");
    }

    #[test]
    fn occurrences_do_not_overlap() {
        let masks = MaskSet::new();
        masks.register(b"aa");
        assert_eq!(masks.apply(b"aaaaa"), b"******a");
    }

    #[test]
    fn tokens_apply_in_registration_order() {
        let masks = MaskSet::new();
        masks.register(b"cd");
        masks.register(b"a***");
        assert_eq!(masks.apply(b"acd e"), b"*** e");
        assert_eq!(masks.len(), 2);
    }

    #[test]
    fn clones_share_registrations() {
        let writer = MaskSet::new();
        let reader = writer.clone();
        writer.register(b"token");
        assert_eq!(reader.apply(b"token!"), b"***!");
    }
}
