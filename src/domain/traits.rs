// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The training loop is assembled from small strategy objects,
// chosen once when a generator or orchestrator is constructed:
//
//   StorySource       → yields Records from some corpus format
//   RecordTransform   → per-record preprocessing (pure)
//   BatchShaper       → turns a window of transformed records
//                       into a TensorBundle
//   EmbeddingProvider → sentence text → fixed-width vectors
//   MetricSink        → append-only (tag, value, step) log
//   GraphRunner       → runs the active composite graph on
//                       a bundle and persists its parameters
//
// Each script variant (alignment training, alignment test,
// scheduler) is a different implementation of these traits
// rather than a different code path inside the generator.
//
// Reference: Rust Book §10 (Traits: Defining Shared Behaviour)

use anyhow::Result;
use std::path::{Path, PathBuf};

use crate::domain::bundle::TensorBundle;
use crate::domain::error::EmbeddingError;
use crate::domain::metrics::Metrics;
use crate::domain::phase::{Phase, ShapeContext};
use crate::domain::record::Record;

// ─── StorySource ──────────────────────────────────────────────────────────────
/// Any component that can load story records from a source.
///
/// Implementations:
///   - StoryCsvSource → story-cloze CSV files
pub trait StorySource {
    fn load_all(&self) -> Result<Vec<Record>>;
}

// ─── RecordTransform ──────────────────────────────────────────────────────────
/// Per-record preprocessing applied before a window is shaped.
/// Must be a pure function of the record. `R` is the stored item,
/// a story Record unless the store holds something else.
pub trait RecordTransform<R = Record> {
    type Output;

    fn apply(&self, record: &R) -> Result<Self::Output>;
}

// ─── BatchShaper ──────────────────────────────────────────────────────────────
/// Turns one window of transformed records into a TensorBundle.
///
/// This is where noise augmentation and embedding lookups happen.
/// Output must depend only on the window and the context, apart
/// from explicitly randomised steps.
pub trait BatchShaper<T> {
    fn shape(&mut self, window: &[T], ctx: &ShapeContext) -> Result<TensorBundle>;
}

// ─── EmbeddingProvider ────────────────────────────────────────────────────────
/// Converts raw sentences into fixed-width vectors.
/// Called once per input stream per batch, so it must not reload
/// anything expensive per call.
pub trait EmbeddingProvider {
    /// Width of every returned vector
    fn dim(&self) -> usize;

    /// One vector per sentence, in input order
    fn embed(&self, sentences: &[String]) -> std::result::Result<Vec<Vec<f32>>, EmbeddingError>;
}

// ─── MetricSink ───────────────────────────────────────────────────────────────
/// Append-only scalar log, e.g. a CSV file or an in-memory list.
pub trait MetricSink {
    fn record_scalar(&mut self, tag: &str, value: f64, step: usize) -> Result<()>;

    /// Record every value of `metrics` as `<prefix>_<name>`.
    fn record_all(&mut self, prefix: &str, metrics: &Metrics, step: usize) -> Result<()> {
        for (name, value) in metrics.iter() {
            self.record_scalar(&format!("{prefix}_{name}"), value, step)?;
        }
        Ok(())
    }
}

impl<M: MetricSink + ?Sized> MetricSink for &mut M {
    fn record_scalar(&mut self, tag: &str, value: f64, step: usize) -> Result<()> {
        (**self).record_scalar(tag, value, step)
    }
}

// ─── GraphRunner ──────────────────────────────────────────────────────────────
/// The orchestrator's view of the model: two composite graphs
/// sharing one parameter store.
pub trait GraphRunner {
    /// Apply one optimiser update with the graph active in `phase`.
    fn train_step(&mut self, phase: Phase, batch: &TensorBundle) -> Result<Metrics>;

    /// Forward-only pass through the evaluation graph.
    fn eval_step(&self, batch: &TensorBundle) -> Result<Metrics>;

    /// Persist the shared parameters. `stem` has no extension;
    /// the returned path is the file actually written.
    fn save(&self, stem: &Path) -> Result<PathBuf>;
}
