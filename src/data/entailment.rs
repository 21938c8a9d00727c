// ============================================================
// Layer 4 — Entailment Transforms and Shapers
// ============================================================
// Two sentence streams and one label per row:
//
//   inputs  sentence1, sentence2     [B, D] each
//   labels  entails                  [B, 1]
//
// Training rows come from inference pairs:
//
//   sentence1 = premise, sentence2 = hypothesis,
//   entails   = 0 for a contradiction, 1 otherwise
//
// Story-cloze rows test whether the classifier has learnt
// anything about endings. The whole body is the first sentence;
// one of the two endings, picked by a fair coin per row, is the
// second:
//
//   coin picks ending 1 → entails = 1 if ending 1 is right
//   coin picks ending 2 → entails = 1 if ending 2 is right
//
// Tokens are joined with single spaces before embedding; there
// is no vocabulary capping, since the embedder sees raw words.

use anyhow::Result;
use rand::{rngs::StdRng, Rng};
use std::sync::Arc;

use crate::data::alignment::embed_stream;
use crate::domain::bundle::{NumericArray, TensorBundle};
use crate::domain::phase::ShapeContext;
use crate::domain::record::{Record, SentencePair};
use crate::domain::traits::{BatchShaper, EmbeddingProvider, RecordTransform};

pub const SENTENCE1: &str = "sentence1";
pub const SENTENCE2: &str = "sentence2";
pub const ENTAILS:   &str = "entails";

/// One classifier row, ready to embed.
#[derive(Debug, Clone, PartialEq)]
pub struct EntailmentSample {
    pub first:   String,
    pub second:  String,
    pub entails: bool,
}

/// Story text split into context and the two candidate endings.
#[derive(Debug, Clone, PartialEq)]
pub struct EndingCandidates {
    pub context: String,
    pub endings: [String; 2],
    /// Zero-based index of the right ending
    pub label:   usize,
}

impl EndingCandidates {
    /// The row built from ending `choice` (0 or 1).
    pub fn pick(&self, choice: usize) -> EntailmentSample {
        EntailmentSample {
            first:   self.context.clone(),
            second:  self.endings[choice].clone(),
            entails: choice == self.label,
        }
    }
}

// ─── Transforms ───────────────────────────────────────────────────────────────
pub struct PairTransform;

impl RecordTransform<SentencePair> for PairTransform {
    type Output = EntailmentSample;

    fn apply(&self, pair: &SentencePair) -> Result<EntailmentSample> {
        Ok(EntailmentSample {
            first:   pair.premise.join(" "),
            second:  pair.hypothesis.join(" "),
            entails: pair.entails,
        })
    }
}

pub struct StoryEndingTransform;

impl RecordTransform for StoryEndingTransform {
    type Output = EndingCandidates;

    fn apply(&self, record: &Record) -> Result<EndingCandidates> {
        let context = record
            .body
            .iter()
            .map(|s| s.join(" "))
            .collect::<Vec<_>>()
            .join(" ");
        Ok(EndingCandidates {
            context,
            endings: [record.endings[0].join(" "), record.endings[1].join(" ")],
            label:   record.label(),
        })
    }
}

// ─── Shapers ──────────────────────────────────────────────────────────────────
fn pair_bundle(embedder: &dyn EmbeddingProvider, rows: &[EntailmentSample]) -> Result<TensorBundle> {
    let firsts: Vec<String>  = rows.iter().map(|r| r.first.clone()).collect();
    let seconds: Vec<String> = rows.iter().map(|r| r.second.clone()).collect();
    let labels: Vec<f32>     = rows.iter().map(|r| if r.entails { 1.0 } else { 0.0 }).collect();

    Ok(TensorBundle::new(
        vec![
            embed_stream(embedder, SENTENCE1, &firsts)?,
            embed_stream(embedder, SENTENCE2, &seconds)?,
        ],
        vec![NumericArray::column(ENTAILS, labels)],
    ))
}

pub struct EntailmentShaper {
    embedder: Arc<dyn EmbeddingProvider>,
}

impl EntailmentShaper {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self { embedder }
    }
}

impl BatchShaper<EntailmentSample> for EntailmentShaper {
    fn shape(&mut self, window: &[EntailmentSample], _ctx: &ShapeContext) -> Result<TensorBundle> {
        pair_bundle(self.embedder.as_ref(), window)
    }
}

/// Flips a coin per story to choose which ending is shown.
pub struct StoryEndingShaper {
    embedder: Arc<dyn EmbeddingProvider>,
    rng:      StdRng,
}

impl StoryEndingShaper {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, rng: StdRng) -> Self {
        Self { embedder, rng }
    }
}

impl BatchShaper<EndingCandidates> for StoryEndingShaper {
    fn shape(&mut self, window: &[EndingCandidates], _ctx: &ShapeContext) -> Result<TensorBundle> {
        let rows: Vec<EntailmentSample> = window
            .iter()
            .map(|c| c.pick(if self.rng.gen_bool(0.5) { 0 } else { 1 }))
            .collect();
        pair_bundle(self.embedder.as_ref(), &rows)
    }
}
