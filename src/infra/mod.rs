// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Cross-cutting concerns that don't belong in any specific
// business layer:
//
//   checkpoint.rs — Best-checkpoint retention per run
//                   Writes weights with Burn's CompactRecorder,
//                   deletes the superseded file, and keeps the
//                   run config as JSON so evaluation can rebuild
//                   the exact model.
//
//   metrics.rs    — Scalar metrics log
//                   Append-only step,tag,value CSV per run,
//                   standing in for a time-series dashboard.
//
//   embedding.rs  — Sentence embedding providers
//                   Local feature-hashing embedder and a bounded
//                   retry wrapper for flaky remote providers.
//
// Reference: Rust Book §7 (Modules)
//            Burn Book §5 (Checkpointing)

/// Best-checkpoint retention and run config persistence
pub mod checkpoint;

/// Scalar metrics CSV sink
pub mod metrics;

/// Sentence embedding providers
pub mod embedding;

/// Timestamp naming one run's checkpoint and log directories.
pub fn run_timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%d_%H-%M-%S").to_string()
}
