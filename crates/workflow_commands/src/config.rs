#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct SplitLimits {
    pub max_line_bytes: usize,
}

impl Default for SplitLimits {
    fn default() -> Self {
        Self {
            max_line_bytes: 64 * 1024,
        }
    }
}
