//! Revision gating for applied snapshots.
//!
//! The gate is the sole ordering mechanism between the pull path (initial
//! fetch) and the push path (broadcasts): both feed the same gate, and a
//! snapshot is applied only if its revision is strictly newer than the last
//! one applied.

/// Per-entity revision gate.
///
/// Starts below any valid revision so the very first snapshot from either
/// path is always accepted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RevisionGate {
    last: Option<u64>,
}

impl RevisionGate {
    /// Create a gate that has applied nothing yet.
    pub const fn new() -> Self {
        Self { last: None }
    }

    /// Admit a revision if it is strictly newer than the last applied one.
    ///
    /// Returns true and records the revision if admitted; returns false and
    /// leaves the gate unchanged otherwise.
    pub fn admit(&mut self, revision: u64) -> bool {
        match self.last {
            Some(last) if revision <= last => false,
            _ => {
                self.last = Some(revision);
                true
            }
        }
    }

    /// The last admitted revision, if any.
    pub fn last_applied(&self) -> Option<u64> {
        self.last
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_revision_always_admitted() {
        let mut gate = RevisionGate::new();
        assert!(gate.admit(0));
        assert_eq!(gate.last_applied(), Some(0));
    }

    #[test]
    fn test_stale_revision_discarded() {
        let mut gate = RevisionGate::new();
        assert!(gate.admit(5));
        assert!(!gate.admit(5));
        assert!(!gate.admit(3));
        assert_eq!(gate.last_applied(), Some(5));
    }

    #[test]
    fn test_gap_is_admitted() {
        // Updates ship the full value, so skipping revisions is fine.
        let mut gate = RevisionGate::new();
        assert!(gate.admit(1));
        assert!(gate.admit(7));
        assert_eq!(gate.last_applied(), Some(7));
    }

    #[test]
    fn test_push_before_pull_race() {
        // A push at revision 1 lands before the pull's stale response at
        // revision 0; the stale response must not overwrite the push.
        let mut gate = RevisionGate::new();
        assert!(gate.admit(1));
        assert!(!gate.admit(0));
    }
}
