// ============================================================
// Layer 2 — SchedulerUseCase
// ============================================================
// Sentence-ordering training run:
//
//   Step 1: Load the vocabulary                 (Layer 4 - data)
//   Step 2: Training generator: random windows,
//           reshuffled between epochs           (Layer 4 - data)
//   Step 3: Test generator: both candidate
//           stories per record                  (Layer 4 - data)
//   Step 4: Run dir + config + scalar log       (Layer 6 - infra)
//   Step 5: Train                               (Layer 5 - ml)

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::{path::Path, sync::Arc};

use crate::data::{
    generator::BatchGenerator,
    record_store::{RecordStore, Sampling},
    offset_seed,
    rng_from_seed,
    scheduler::{SchedulerEvalShaper, SchedulerShaper, SchedulerTransform},
    vocabulary::{SpecialTokens, VocabularyStore},
};
use crate::infra::{checkpoint::CheckpointManager, metrics::ScalarCsvSink, run_timestamp};
use crate::ml::scheduler::{run_scheduler_training, SchedulerSummary};

pub const CONFIG_FILE: &str = "scheduler_config.json";
const COMPONENT: &str = "scheduler";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub train_records: String,
    pub test_records:  String,
    pub vocab_path:    String,
    pub vocab_size:    usize,
    pub builds_dir:    String,
    pub logs_dir:      String,

    /// Tokens kept per sentence (padded or truncated)
    pub sentence_len:   usize,
    pub embedding_size: usize,
    pub hidden_size:    usize,
    pub dropout:        f64,

    pub batch_size: usize,
    pub epochs:     usize,
    pub lr:         f64,
    pub test_every: usize,
    pub save_every: usize,

    pub seed: Option<u64>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            train_records: "data/train_stories.bin".to_string(),
            test_records:  "data/test_stories.bin".to_string(),
            vocab_path:    "data/default.voc".to_string(),
            vocab_size:    20_000,
            builds_dir:    "builds".to_string(),
            logs_dir:      "logs".to_string(),

            sentence_len:   20,
            embedding_size: 100,
            hidden_size:    256,
            dropout:        0.2,

            batch_size: 32,
            epochs:     20,
            lr:         1e-3,
            test_every: 1,
            save_every: 5,

            seed: None,
        }
    }
}

pub struct SchedulerUseCase {
    config: SchedulerConfig,
}

impl SchedulerUseCase {
    pub fn new(config: SchedulerConfig) -> Self {
        Self { config }
    }

    pub fn execute(&self) -> Result<SchedulerSummary> {
        let cfg = &self.config;
        if cfg.batch_size == 0 || cfg.sentence_len == 0 {
            bail!("batch_size and sentence_len must be positive");
        }

        // ── Step 1: Vocabulary ────────────────────────────────────────────────
        let vocab = Arc::new(VocabularyStore::load(&cfg.vocab_path, cfg.vocab_size, SpecialTokens::default())?);
        tracing::info!("Vocabulary: {} tokens from '{}'", vocab.len(), cfg.vocab_path);

        // ── Steps 2–3: Generators ─────────────────────────────────────────────
        let mut train = BatchGenerator::new(
            RecordStore::load(&cfg.train_records, cfg.seed)?,
            SchedulerTransform::new(vocab.clone(), cfg.sentence_len),
            SchedulerShaper::new(rng_from_seed(cfg.seed)),
        )
        .with_sampling(Sampling::Random)
        .with_shuffle_between_epochs(true);

        let mut test = BatchGenerator::new(
            RecordStore::load(&cfg.test_records, offset_seed(cfg.seed, 1))?,
            SchedulerTransform::new(vocab.clone(), cfg.sentence_len),
            SchedulerEvalShaper::new(rng_from_seed(offset_seed(cfg.seed, 2))),
        )
        .with_sampling(Sampling::Random);

        // ── Step 4: Run directory ─────────────────────────────────────────────
        let ts          = run_timestamp();
        let checkpoints = CheckpointManager::create(&cfg.builds_dir, &ts, COMPONENT)?;
        checkpoints.save_config(CONFIG_FILE, cfg)?;
        let mut sink = ScalarCsvSink::create(Path::new(&cfg.logs_dir).join(format!("{ts}-{COMPONENT}")))?;

        // ── Step 5: Train ─────────────────────────────────────────────────────
        run_scheduler_training(cfg, vocab.len(), &mut train, &mut test, &checkpoints, &mut sink)
    }
}
