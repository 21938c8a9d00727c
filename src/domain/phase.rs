// ============================================================
// Layer 3 — Training Phase
// ============================================================
// The alignment model is trained as an adversarial game that
// alternates between two composite graphs, one epoch at a time:
//
//   Unfrozen — encoders, decoders and discriminator all learn
//              (reconstruction + discrimination losses)
//   Frozen   — only the discriminator learns
//
// The phase is owned by the training orchestrator and handed
// explicitly to the batch shaper through ShapeContext, so the
// shaper sees the phase that was current when the batch was
// produced.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    Unfrozen,
    Frozen,
}

impl Phase {
    /// Phase of the first epoch.
    pub fn initial() -> Self {
        Phase::Unfrozen
    }

    pub fn toggled(self) -> Self {
        match self {
            Phase::Unfrozen => Phase::Frozen,
            Phase::Frozen   => Phase::Unfrozen,
        }
    }

    /// Phase for a given epoch: flips on every epoch boundary.
    pub fn for_epoch(epoch: usize) -> Self {
        if epoch % 2 == 0 {
            Self::initial()
        } else {
            Self::initial().toggled()
        }
    }

    pub fn is_frozen(self) -> bool {
        self == Phase::Frozen
    }

    /// Tag prefix used when recording training scalars.
    pub fn metric_prefix(self) -> &'static str {
        match self {
            Phase::Unfrozen => "train_uf",
            Phase::Frozen   => "train_f",
        }
    }
}

/// Generator state visible to a BatchShaper while it builds one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShapeContext {
    pub phase:       Phase,
    pub epoch:       usize,
    pub batch_index: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_strictly_alternates() {
        let first = Phase::for_epoch(0);
        for epoch in 0..9 {
            let expected = if epoch % 2 == 1 { first.toggled() } else { first };
            assert_eq!(Phase::for_epoch(epoch), expected);
        }
    }

    #[test]
    fn test_first_epoch_is_unfrozen() {
        assert_eq!(Phase::for_epoch(0), Phase::Unfrozen);
        assert!(Phase::for_epoch(1).is_frozen());
    }

    #[test]
    fn test_toggle_is_involution() {
        assert_eq!(Phase::Frozen.toggled().toggled(), Phase::Frozen);
    }
}
