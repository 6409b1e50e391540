//! Filter phase machine.

/// Phase of the relative filter core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterPhase {
    /// No reference frame accepted yet; corrections cannot be applied.
    AwaitingFirstReference,
    /// A reference baseline exists and delayed corrections are fused.
    Tracking,
}

impl Default for FilterPhase {
    fn default() -> Self {
        Self::AwaitingFirstReference
    }
}
