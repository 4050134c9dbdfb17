use std::sync::atomic::{AtomicU64, Ordering};

/// Request id generator. Ids start at 1, increase monotonically and wrap
/// back to 1 instead of ever producing 0.
#[derive(Debug, Default)]
pub(crate) struct RequestSequence {
    last: AtomicU64,
}

impl RequestSequence {
    #[cfg(test)]
    pub(crate) fn starting_after(last: u64) -> Self {
        Self {
            last: AtomicU64::new(last),
        }
    }

    pub(crate) fn next(&self) -> u64 {
        match self
            .last
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(successor(last))
            }) {
            Ok(previous) | Err(previous) => successor(previous),
        }
    }

    pub(crate) fn reset(&self) {
        self.last.store(0, Ordering::SeqCst);
    }
}

fn successor(last: u64) -> u64 {
    last.checked_add(1).unwrap_or(1)
}
