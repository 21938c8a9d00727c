// ============================================================
// Layer 2 — EntailmentUseCase
// ============================================================
// Sentence-pair classifier run:
//
//   Step 1: Embedding provider                 (Layer 6 - infra)
//   Step 2: Load SNLI pairs into a store,
//           reshuffled between passes          (Layer 4 - data)
//   Step 3: Story test generator, one coin
//           per story picks the ending shown   (Layer 4 - data)
//   Step 4: Run dir + config + scalar log      (Layer 6 - infra)
//   Step 5: Train with per-epoch validation    (Layer 5 - ml)

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::{path::Path, sync::Arc, time::Duration};

use crate::data::{
    entailment::{EntailmentShaper, PairTransform, StoryEndingShaper, StoryEndingTransform},
    generator::BatchGenerator,
    offset_seed,
    record_store::RecordStore,
    rng_from_seed,
    snli::SnliSource,
};
use crate::domain::traits::EmbeddingProvider;
use crate::infra::{
    checkpoint::CheckpointManager,
    embedding::{HashingEmbedder, RetryingEmbedder},
    metrics::ScalarCsvSink,
    run_timestamp,
};
use crate::ml::entailment::{run_entailment_training, EntailmentSummary};

pub const CONFIG_FILE: &str = "entailment_config.json";
const COMPONENT: &str = "entailment";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntailmentConfig {
    pub snli_train:   String,
    pub test_records: String,
    pub builds_dir:   String,
    pub logs_dir:     String,

    pub embedding_dim: usize,
    pub hidden1:       usize,
    pub hidden2:       usize,
    pub dropout:       f64,

    pub batch_size:      usize,
    pub epochs:          usize,
    /// Optimiser steps per epoch; validation runs after each epoch
    pub steps_per_epoch: usize,
    pub lr:              f64,
    pub log_every:       usize,

    pub embed_attempts:   usize,
    pub embed_backoff_ms: u64,

    pub seed: Option<u64>,
}

impl Default for EntailmentConfig {
    fn default() -> Self {
        Self {
            snli_train:   "data/snli_1.0/snli_1.0_train.jsonl".to_string(),
            test_records: "data/test_stories.bin".to_string(),
            builds_dir:   "builds".to_string(),
            logs_dir:     "logs".to_string(),

            embedding_dim: 1024,
            hidden1:       1000,
            hidden2:       500,
            dropout:       0.2,

            batch_size:      32,
            epochs:          10,
            steps_per_epoch: 300,
            lr:              1e-3,
            log_every:       10,

            embed_attempts:   3,
            embed_backoff_ms: 200,

            seed: None,
        }
    }
}

impl EntailmentConfig {
    fn embedder(&self) -> Arc<dyn EmbeddingProvider> {
        Arc::new(RetryingEmbedder::new(
            HashingEmbedder::new(self.embedding_dim),
            self.embed_attempts,
            Duration::from_millis(self.embed_backoff_ms),
        ))
    }

    fn validate(&self) -> Result<()> {
        if self.batch_size == 0 || self.embedding_dim == 0 || self.steps_per_epoch == 0 {
            bail!("batch_size, embedding_dim and steps_per_epoch must be positive");
        }
        if !(0.0..1.0).contains(&self.dropout) {
            bail!("dropout must lie in [0, 1), got {}", self.dropout);
        }
        Ok(())
    }
}

pub struct EntailmentUseCase {
    config: EntailmentConfig,
}

impl EntailmentUseCase {
    pub fn new(config: EntailmentConfig) -> Self {
        Self { config }
    }

    pub fn execute(&self) -> Result<EntailmentSummary> {
        let cfg = &self.config;
        cfg.validate()?;

        // ── Step 1: Embeddings ────────────────────────────────────────────────
        let embedder = cfg.embedder();

        // ── Steps 2–3: Generators ─────────────────────────────────────────────
        let pairs = SnliSource::new(&cfg.snli_train).load_all()?;
        let mut train = BatchGenerator::new(
            RecordStore::new(pairs, cfg.seed),
            PairTransform,
            EntailmentShaper::new(embedder.clone()),
        )
        .with_shuffle_between_epochs(true);

        let mut test = BatchGenerator::new(
            RecordStore::load(&cfg.test_records, offset_seed(cfg.seed, 1))?,
            StoryEndingTransform,
            StoryEndingShaper::new(embedder, rng_from_seed(offset_seed(cfg.seed, 2))),
        );

        // ── Step 4: Run directory ─────────────────────────────────────────────
        let ts              = run_timestamp();
        let mut checkpoints = CheckpointManager::create(&cfg.builds_dir, &ts, COMPONENT)?;
        checkpoints.save_config(CONFIG_FILE, cfg)?;
        let mut sink = ScalarCsvSink::create(Path::new(&cfg.logs_dir).join(format!("{ts}-{COMPONENT}")))?;
        tracing::info!(
            "Run '{ts}': checkpoints in '{}', scalars in '{}'",
            checkpoints.dir().display(),
            sink.csv_path().display()
        );

        // ── Step 5: Train ─────────────────────────────────────────────────────
        run_entailment_training(cfg, &mut train, &mut test, &mut checkpoints, &mut sink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_files_fall_back_to_defaults() {
        let cfg: EntailmentConfig = serde_json::from_str(r#"{ "steps_per_epoch": 50, "seed": 4 }"#).unwrap();
        assert_eq!(cfg.steps_per_epoch, 50);
        assert_eq!(cfg.seed, Some(4));
        assert_eq!(cfg.hidden1, 1000);
        assert_eq!(cfg.hidden2, 500);
    }

    #[test]
    fn test_missing_snli_file_stops_before_the_run_dir() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = EntailmentConfig {
            snli_train: dir.path().join("missing.jsonl").to_string_lossy().into_owned(),
            builds_dir: dir.path().join("builds").to_string_lossy().into_owned(),
            ..EntailmentConfig::default()
        };
        assert!(EntailmentUseCase::new(cfg).execute().is_err());
        assert!(!dir.path().join("builds").exists());
    }

    #[test]
    fn test_invalid_settings_are_rejected() {
        for cfg in [
            EntailmentConfig { steps_per_epoch: 0, ..EntailmentConfig::default() },
            EntailmentConfig { dropout: 1.0, ..EntailmentConfig::default() },
            EntailmentConfig { batch_size: 0, ..EntailmentConfig::default() },
        ] {
            assert!(EntailmentUseCase::new(cfg).execute().is_err());
        }
    }
}
