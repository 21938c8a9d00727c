// ============================================================
// Layer 4 — Scheduler Transform and Shapers
// ============================================================
// Prepares the sentence-ordering task: a five-sentence story is
// shown in a random order and the model has to name which of
// the 5! = 120 orders was applied.
//
//   story:     s0 s1 s2 s3 s4        (4 body + 1 ending)
//   order 37:  [1, 3, 0, 4, 2]
//   shown:     s1 s3 s0 s4 s2
//
//   x     [B, 5 * sentence_len]   token ids, row-major by slot
//   order [B, 120]                one-hot of the applied order
//
// Orders are numbered in lexicographic order, so order 0 is the
// identity and order 119 is the full reversal.
//
// Evaluation builds two candidate stories per record (body +
// ending 1, body + ending 2), shuffles each independently and
// keeps the true orders plus which candidate is right.

use anyhow::Result;
use rand::{rngs::StdRng, Rng};
use std::sync::Arc;

use crate::data::vocabulary::VocabularyStore;
use crate::domain::bundle::{NumericArray, TensorBundle};
use crate::domain::phase::ShapeContext;
use crate::domain::record::{Record, MAX_BODY_SENTENCES};
use crate::domain::traits::{BatchShaper, RecordTransform};

/// Sentences per scheduled story.
pub const STORY_LEN: usize = MAX_BODY_SENTENCES + 1;

/// Number of orders of a five-sentence story.
pub const ORDER_COUNT: usize = 120;

pub const X:       &str = "x";
pub const X1:      &str = "x1";
pub const X2:      &str = "x2";
pub const ORDER:   &str = "order";
pub const ORDER1:  &str = "order1";
pub const ORDER2:  &str = "order2";
pub const CORRECT: &str = "correct";

/// Every order of `STORY_LEN` slots, lexicographically.
pub fn orderings() -> Vec<[usize; STORY_LEN]> {
    fn extend(prefix: &mut Vec<usize>, out: &mut Vec<[usize; STORY_LEN]>) {
        if prefix.len() == STORY_LEN {
            let mut order = [0; STORY_LEN];
            order.copy_from_slice(prefix);
            out.push(order);
            return;
        }
        for next in 0..STORY_LEN {
            if !prefix.contains(&next) {
                prefix.push(next);
                extend(prefix, out);
                prefix.pop();
            }
        }
    }

    let mut out = Vec::with_capacity(ORDER_COUNT);
    extend(&mut Vec::with_capacity(STORY_LEN), &mut out);
    out
}

/// One record as fixed-length id rows.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerSample {
    /// Always `MAX_BODY_SENTENCES` rows; missing sentences are all padding
    pub body:    Vec<Vec<u32>>,
    pub endings: [Vec<u32>; 2],
    /// Zero-based index of the correct ending
    pub correct: usize,
}

impl SchedulerSample {
    fn story(&self, ending: usize) -> Vec<&[u32]> {
        self.body
            .iter()
            .map(Vec::as_slice)
            .chain(std::iter::once(self.endings[ending].as_slice()))
            .collect()
    }
}

/// Maps sentences to ids, padded or cut to `sentence_len`.
pub struct SchedulerTransform {
    vocab:        Arc<VocabularyStore>,
    sentence_len: usize,
}

impl SchedulerTransform {
    pub fn new(vocab: Arc<VocabularyStore>, sentence_len: usize) -> Self {
        Self { vocab, sentence_len }
    }

    fn ids(&self, tokens: &[String]) -> Vec<u32> {
        let mut ids: Vec<u32> = tokens
            .iter()
            .take(self.sentence_len)
            .map(|t| self.vocab.token_to_id(t))
            .collect();
        ids.resize(self.sentence_len, self.vocab.pad_id());
        ids
    }
}

impl RecordTransform for SchedulerTransform {
    type Output = SchedulerSample;

    fn apply(&self, record: &Record) -> Result<SchedulerSample> {
        let mut body: Vec<Vec<u32>> = record.body.iter().map(|s| self.ids(s)).collect();
        body.resize(MAX_BODY_SENTENCES, vec![self.vocab.pad_id(); self.sentence_len]);

        Ok(SchedulerSample {
            body,
            endings: [self.ids(&record.endings[0]), self.ids(&record.endings[1])],
            correct: record.label(),
        })
    }
}

/// Shows `story` in a random order: the flattened row and the order index.
fn shuffle_story(
    story:  &[&[u32]],
    orders: &[[usize; STORY_LEN]],
    rng:    &mut StdRng,
) -> (Vec<f32>, usize) {
    let index = rng.gen_range(0..orders.len());
    let row = orders[index]
        .iter()
        .flat_map(|&slot| story[slot].iter().map(|&id| id as f32))
        .collect();
    (row, index)
}

fn one_hot(index: usize) -> Vec<f32> {
    let mut v = vec![0.0; ORDER_COUNT];
    v[index] = 1.0;
    v
}

// ─── Training shaper ──────────────────────────────────────────────────────────
/// Body plus the correct ending, shuffled.
pub struct SchedulerShaper {
    orders: Vec<[usize; STORY_LEN]>,
    rng:    StdRng,
}

impl SchedulerShaper {
    pub fn new(rng: StdRng) -> Self {
        Self { orders: orderings(), rng }
    }
}

impl BatchShaper<SchedulerSample> for SchedulerShaper {
    fn shape(&mut self, window: &[SchedulerSample], _ctx: &ShapeContext) -> Result<TensorBundle> {
        let mut xs     = Vec::with_capacity(window.len());
        let mut labels = Vec::with_capacity(window.len());
        for sample in window {
            let (row, order) = shuffle_story(&sample.story(sample.correct), &self.orders, &mut self.rng);
            xs.push(row);
            labels.push(one_hot(order));
        }
        Ok(TensorBundle::new(
            vec![NumericArray::from_rows(X, &xs)?],
            vec![NumericArray::from_rows(ORDER, &labels)?],
        ))
    }
}

// ─── Evaluation shaper ────────────────────────────────────────────────────────
/// Both candidate stories, each shuffled on its own.
pub struct SchedulerEvalShaper {
    orders: Vec<[usize; STORY_LEN]>,
    rng:    StdRng,
}

impl SchedulerEvalShaper {
    pub fn new(rng: StdRng) -> Self {
        Self { orders: orderings(), rng }
    }
}

impl BatchShaper<SchedulerSample> for SchedulerEvalShaper {
    fn shape(&mut self, window: &[SchedulerSample], _ctx: &ShapeContext) -> Result<TensorBundle> {
        let (mut x1, mut x2)         = (Vec::new(), Vec::new());
        let (mut order1, mut order2) = (Vec::new(), Vec::new());
        let mut correct              = Vec::new();

        for sample in window {
            let (row, order) = shuffle_story(&sample.story(0), &self.orders, &mut self.rng);
            x1.push(row);
            order1.push(one_hot(order));

            let (row, order) = shuffle_story(&sample.story(1), &self.orders, &mut self.rng);
            x2.push(row);
            order2.push(one_hot(order));

            correct.push(sample.correct as f32);
        }

        Ok(TensorBundle::new(
            vec![NumericArray::from_rows(X1, &x1)?, NumericArray::from_rows(X2, &x2)?],
            vec![
                NumericArray::from_rows(ORDER1, &order1)?,
                NumericArray::from_rows(ORDER2, &order2)?,
                NumericArray::column(CORRECT, correct),
            ],
        ))
    }
}
