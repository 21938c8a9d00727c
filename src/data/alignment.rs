// ============================================================
// Layer 4 — Alignment Transform and Shapers
// ============================================================
// Builds the five parallel sentence streams the alignment
// graphs consume. Per record:
//
//   history   = last body sentence
//   beginning = ending 1
//   end       = ending 2
//   label     = correct ending − 1
//
// The "source" stream should carry the correct ending in the
// unfrozen phase and the wrong one in the frozen phase, so the
// endings are swapped when:
//
//   unfrozen and label == 1   → source = ending 2 (correct)
//   frozen   and label == 0   → source = ending 2 (wrong)
//
// Bundle layouts (D = embedding width, B = batch size):
//
//   unfrozen  inputs  src_clean, src_noised, target_clean,
//                     target_noised, history        [B, D] each
//             labels  distance=0, disc_src=0,
//                     disc_target=0                 [B, 1] each
//
//   frozen    inputs  src_noised, target_noised, history
//             labels  disc_src=1, disc_target=1
//
//   eval      inputs  src_noised, target_noised, history (no swap)
//             labels  disc_src=label, disc_target=1−label
//
// Noised views are made on the token sequence and joined with
// single spaces before embedding. A clean view and its noised
// view always come from the same ending of the same record.

use anyhow::Result;
use rand::rngs::StdRng;
use std::sync::Arc;

use crate::data::noise::NoiseAugmenter;
use crate::data::vocabulary::VocabularyStore;
use crate::domain::bundle::{NumericArray, TensorBundle};
use crate::domain::error::PipelineError;
use crate::domain::phase::{Phase, ShapeContext};
use crate::domain::record::Record;
use crate::domain::traits::{BatchShaper, EmbeddingProvider, RecordTransform};

// ─── Array names ──────────────────────────────────────────────────────────────
pub const SRC_CLEAN:     &str = "src_clean";
pub const SRC_NOISED:    &str = "src_noised";
pub const TARGET_CLEAN:  &str = "target_clean";
pub const TARGET_NOISED: &str = "target_noised";
pub const HISTORY:       &str = "history";

pub const DISTANCE:      &str = "distance";
pub const DISC_SRC:      &str = "disc_src";
pub const DISC_TARGET:   &str = "disc_target";

/// One record after vocabulary capping.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignmentSample {
    pub history: Vec<String>,
    pub endings: [Vec<String>; 2],
    pub label:   usize,
}

/// Replaces out-of-vocabulary tokens with the unknown token.
pub struct AlignmentTransform {
    vocab: Arc<VocabularyStore>,
}

impl AlignmentTransform {
    pub fn new(vocab: Arc<VocabularyStore>) -> Self {
        Self { vocab }
    }

    fn cap(&self, tokens: &[String]) -> Vec<String> {
        tokens.iter().map(|t| self.vocab.normalize(t).to_string()).collect()
    }
}

impl RecordTransform for AlignmentTransform {
    type Output = AlignmentSample;

    fn apply(&self, record: &Record) -> Result<AlignmentSample> {
        Ok(AlignmentSample {
            history: self.cap(record.last_body_sentence()),
            endings: [self.cap(&record.endings[0]), self.cap(&record.endings[1])],
            label:   record.label(),
        })
    }
}

/// Sentences of one batch, one Vec per stream.
#[derive(Default)]
struct Streams {
    src_clean:     Vec<String>,
    src_noised:    Vec<String>,
    target_clean:  Vec<String>,
    target_noised: Vec<String>,
    history:       Vec<String>,
}

impl Streams {
    fn collect(
        window: &[AlignmentSample],
        noise:  &NoiseAugmenter,
        rng:    &mut StdRng,
        swap:   impl Fn(&AlignmentSample) -> bool,
    ) -> Self {
        let mut s = Self::default();
        for sample in window {
            let [beginning, end] = &sample.endings;
            let noised_beginning = noise.perturb(beginning, rng).join(" ");
            let noised_end       = noise.perturb(end, rng).join(" ");
            let (beginning, end) = (beginning.join(" "), end.join(" "));

            if swap(sample) {
                s.src_clean.push(end);
                s.src_noised.push(noised_end);
                s.target_clean.push(beginning);
                s.target_noised.push(noised_beginning);
            } else {
                s.src_clean.push(beginning);
                s.src_noised.push(noised_beginning);
                s.target_clean.push(end);
                s.target_noised.push(noised_end);
            }
            s.history.push(sample.history.join(" "));
        }
        s
    }
}

/// Embed one stream and check every vector has the provider's width.
pub(crate) fn embed_stream(
    embedder:  &dyn EmbeddingProvider,
    name:      &str,
    sentences: &[String],
) -> Result<NumericArray> {
    let vectors = embedder.embed(sentences).map_err(PipelineError::from)?;
    if vectors.len() != sentences.len() {
        return Err(PipelineError::ShapeMismatch(format!(
            "stream '{name}': {} sentences embedded into {} vectors",
            sentences.len(),
            vectors.len()
        ))
        .into());
    }
    if let Some(bad) = vectors.iter().find(|v| v.len() != embedder.dim()) {
        return Err(PipelineError::ShapeMismatch(format!(
            "stream '{name}': embedding width {}, provider declares {}",
            bad.len(),
            embedder.dim()
        ))
        .into());
    }
    Ok(NumericArray::from_rows(name, &vectors)?)
}

// ─── Training shaper ──────────────────────────────────────────────────────────
/// Shapes training windows for whichever graph the phase selects.
pub struct AlignmentShaper {
    noise:    NoiseAugmenter,
    embedder: Arc<dyn EmbeddingProvider>,
    rng:      StdRng,
}

impl AlignmentShaper {
    pub fn new(noise: NoiseAugmenter, embedder: Arc<dyn EmbeddingProvider>, rng: StdRng) -> Self {
        Self { noise, embedder, rng }
    }
}

impl BatchShaper<AlignmentSample> for AlignmentShaper {
    fn shape(&mut self, window: &[AlignmentSample], ctx: &ShapeContext) -> Result<TensorBundle> {
        let phase   = ctx.phase;
        let streams = Streams::collect(window, &self.noise, &mut self.rng, |s| match phase {
            Phase::Unfrozen => s.label == 1,
            Phase::Frozen   => s.label == 0,
        });
        let rows     = window.len();
        let embedder = self.embedder.as_ref();

        let bundle = match phase {
            Phase::Unfrozen => TensorBundle::new(
                vec![
                    embed_stream(embedder, SRC_CLEAN, &streams.src_clean)?,
                    embed_stream(embedder, SRC_NOISED, &streams.src_noised)?,
                    embed_stream(embedder, TARGET_CLEAN, &streams.target_clean)?,
                    embed_stream(embedder, TARGET_NOISED, &streams.target_noised)?,
                    embed_stream(embedder, HISTORY, &streams.history)?,
                ],
                vec![
                    NumericArray::filled(DISTANCE, rows, 0.0),
                    NumericArray::filled(DISC_SRC, rows, 0.0),
                    NumericArray::filled(DISC_TARGET, rows, 0.0),
                ],
            ),
            // Swapped streams: both discriminator heads must say "1"
            Phase::Frozen => TensorBundle::new(
                vec![
                    embed_stream(embedder, SRC_NOISED, &streams.src_noised)?,
                    embed_stream(embedder, TARGET_NOISED, &streams.target_noised)?,
                    embed_stream(embedder, HISTORY, &streams.history)?,
                ],
                vec![
                    NumericArray::filled(DISC_SRC, rows, 1.0),
                    NumericArray::filled(DISC_TARGET, rows, 1.0),
                ],
            ),
        };
        Ok(bundle)
    }
}

// ─── Evaluation shaper ────────────────────────────────────────────────────────
/// Frozen-graph layout with the true labels and no swapping.
pub struct AlignmentEvalShaper {
    noise:    NoiseAugmenter,
    embedder: Arc<dyn EmbeddingProvider>,
    rng:      StdRng,
}

impl AlignmentEvalShaper {
    pub fn new(noise: NoiseAugmenter, embedder: Arc<dyn EmbeddingProvider>, rng: StdRng) -> Self {
        Self { noise, embedder, rng }
    }
}

impl BatchShaper<AlignmentSample> for AlignmentEvalShaper {
    fn shape(&mut self, window: &[AlignmentSample], _ctx: &ShapeContext) -> Result<TensorBundle> {
        let streams  = Streams::collect(window, &self.noise, &mut self.rng, |_| false);
        let embedder = self.embedder.as_ref();

        let src_labels: Vec<f32> = window.iter().map(|s| s.label as f32).collect();
        let target_labels        = src_labels.iter().map(|l| 1.0 - l).collect();

        Ok(TensorBundle::new(
            vec![
                embed_stream(embedder, SRC_NOISED, &streams.src_noised)?,
                embed_stream(embedder, TARGET_NOISED, &streams.target_noised)?,
                embed_stream(embedder, HISTORY, &streams.history)?,
            ],
            vec![
                NumericArray::column(DISC_SRC, src_labels),
                NumericArray::column(DISC_TARGET, target_labels),
            ],
        ))
    }
}
