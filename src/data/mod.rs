// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything from a raw story-cloze CSV down to the numeric
// bundles a graph consumes for one step.
//
//   stories.csv
//       │
//       ▼
//   StoryCsvSource     → cleans + tokenises rows into Records
//       │                (prepare command only)
//       ▼
//   RecordStore        → persisted blob of Records; shuffles,
//       │                hands out windows
//       ▼
//   RecordTransform    → per-record preprocessing (vocab capping,
//       │                sentence → token ids)
//       ▼
//   BatchShaper        → noise + embeddings → TensorBundle
//       │
//       ▼
//   BatchGenerator     → lazy, per-epoch stream of bundles
//
// The entailment classifier reuses the same chain over
// SentencePair items read by SnliSource (snli.jsonl) instead
// of Records.
//
// Reference: Rust Book §13 (Iterators and Closures)

use rand::{rngs::StdRng, SeedableRng};

/// Persisted, pre-tokenised corpus with shuffling and windowed reads
pub mod record_store;

/// Token ↔ id table with reserved special tokens
pub mod vocabulary;

/// Word drop + local reorder perturbation of a sentence
pub mod noise;

/// Lazy per-epoch batch stream over a RecordStore
pub mod generator;

/// Transforms and shapers for the alignment graphs
pub mod alignment;

/// Transforms and shapers for the sentence-ordering scheduler
pub mod scheduler;

/// Cleans and word-tokenises raw story text
pub mod tokenize;

/// Reads story-cloze CSV files into Records
pub mod stories;

/// Holds out a random fraction of records for evaluation
pub mod splitter;

/// Reads SNLI JSONL files into sentence pairs
pub mod snli;

/// Transforms and shapers for the entailment classifier
pub mod entailment;

/// A seeded generator when a seed is configured, entropy otherwise.
pub fn rng_from_seed(seed: Option<u64>) -> StdRng {
    match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None    => StdRng::from_entropy(),
    }
}

/// A seed for a secondary generator, `offset` away from the run seed.
/// Wraps at `u64::MAX`; no seed stays no seed.
pub fn offset_seed(seed: Option<u64>, offset: u64) -> Option<u64> {
    seed.map(|s| s.wrapping_add(offset))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_seed_wraps() {
        assert_eq!(offset_seed(Some(5), 2), Some(7));
        assert_eq!(offset_seed(Some(u64::MAX), 1), Some(0));
        assert_eq!(offset_seed(Some(u64::MAX), 2), Some(1));
        assert_eq!(offset_seed(None, 1), None);
    }
}
