// ============================================================
// Layer 2 — AlignmentUseCase
// ============================================================
// Wires the alignment pipeline together and hands it to the
// training loop (Layer 5):
//
//   Step 1: Load the vocabulary              (Layer 4 - data)
//   Step 2: Build the embedding provider     (Layer 6 - infra)
//   Step 3: Load train + test record stores  (Layer 4 - data)
//   Step 4: Build both batch generators      (Layer 4 - data)
//   Step 5: Open run dir, save config, open
//           the scalar log                   (Layer 6 - infra)
//   Step 6: Run the adversarial training     (Layer 5 - ml)
//
// Evaluation reloads the run's saved config so the model is
// rebuilt with exactly the shapes it was trained with.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::{path::Path, sync::Arc, time::Duration};

use crate::data::{
    alignment::{AlignmentEvalShaper, AlignmentShaper, AlignmentTransform},
    generator::BatchGenerator,
    noise::NoiseAugmenter,
    record_store::RecordStore,
    offset_seed,
    rng_from_seed,
    vocabulary::{SpecialTokens, VocabularyStore},
};
use crate::domain::traits::EmbeddingProvider;
use crate::infra::{
    checkpoint::{load_config, CheckpointManager},
    embedding::{HashingEmbedder, RetryingEmbedder},
    metrics::ScalarCsvSink,
    run_timestamp,
};
use crate::ml::evaluator::{run_alignment_evaluation, HitReport};
use crate::ml::trainer::{run_alignment_training, TrainingSummary};

pub const CONFIG_FILE: &str = "alignment_config.json";
const COMPONENT: &str = "alignment";

// ─── Alignment Configuration ──────────────────────────────────────────────────
// Everything one run needs; written next to its checkpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignmentConfig {
    pub train_records:  String,
    pub test_records:   String,
    pub vocab_path:     String,
    pub vocab_size:     usize,
    pub builds_dir:     String,
    pub logs_dir:       String,

    pub embedding_dim:        usize,
    pub hidden_dim:           usize,
    pub latent_dim:           usize,
    pub discriminator_hidden: usize,
    pub dropout:              f64,

    pub batch_size:       usize,
    pub epochs:           usize,
    pub lr:               f64,
    pub log_every:        usize,
    pub eval_every:       usize,
    pub limit_eval_steps: Option<usize>,

    pub noise_drop_probability:     f64,
    pub noise_max_shuffle_distance: usize,

    pub embed_attempts:   usize,
    pub embed_backoff_ms: u64,

    pub seed: Option<u64>,
}

impl Default for AlignmentConfig {
    fn default() -> Self {
        Self {
            train_records: "data/train_stories.bin".to_string(),
            test_records:  "data/test_stories.bin".to_string(),
            vocab_path:    "data/default.voc".to_string(),
            vocab_size:    20_000,
            builds_dir:    "builds".to_string(),
            logs_dir:      "logs".to_string(),

            embedding_dim:        512,
            hidden_dim:           512,
            latent_dim:           1024,
            discriminator_hidden: 256,
            dropout:              0.3,

            batch_size:       64,
            epochs:           10,
            lr:               1e-4,
            log_every:        10,
            eval_every:       100,
            limit_eval_steps: None,

            noise_drop_probability:     0.1,
            noise_max_shuffle_distance: 3,

            embed_attempts:   3,
            embed_backoff_ms: 200,

            seed: None,
        }
    }
}

impl AlignmentConfig {
    fn noise(&self) -> NoiseAugmenter {
        NoiseAugmenter::new(self.noise_drop_probability, self.noise_max_shuffle_distance)
    }

    fn embedder(&self) -> Arc<dyn EmbeddingProvider> {
        Arc::new(RetryingEmbedder::new(
            HashingEmbedder::new(self.embedding_dim),
            self.embed_attempts,
            Duration::from_millis(self.embed_backoff_ms),
        ))
    }

    fn vocabulary(&self) -> Result<Arc<VocabularyStore>> {
        let vocab = VocabularyStore::load(&self.vocab_path, self.vocab_size, SpecialTokens::default())?;
        tracing::info!("Vocabulary: {} tokens from '{}'", vocab.len(), self.vocab_path);
        Ok(Arc::new(vocab))
    }

    fn validate(&self) -> Result<()> {
        if self.batch_size == 0 || self.embedding_dim == 0 {
            bail!("batch_size and embedding_dim must be positive");
        }
        if !(0.0..=1.0).contains(&self.noise_drop_probability) {
            bail!("noise_drop_probability must lie in [0, 1], got {}", self.noise_drop_probability);
        }
        Ok(())
    }
}

// ─── AlignmentUseCase ─────────────────────────────────────────────────────────
pub struct AlignmentUseCase {
    config: AlignmentConfig,
}

impl AlignmentUseCase {
    pub fn new(config: AlignmentConfig) -> Self {
        Self { config }
    }

    pub fn train(&self) -> Result<TrainingSummary> {
        let cfg = &self.config;
        cfg.validate()?;

        // ── Steps 1–2: Vocabulary and embeddings ─────────────────────────────
        let vocab    = cfg.vocabulary()?;
        let embedder = cfg.embedder();

        // ── Step 3: Record stores ─────────────────────────────────────────────
        let train_store = RecordStore::load(&cfg.train_records, cfg.seed)?;
        let test_store  = RecordStore::load(&cfg.test_records, offset_seed(cfg.seed, 1))?;

        // ── Step 4: Generators ────────────────────────────────────────────────
        // Neither store is reshuffled between epochs, so every
        // evaluation pass sees the same windows.
        let mut train = BatchGenerator::new(
            train_store,
            AlignmentTransform::new(vocab.clone()),
            AlignmentShaper::new(cfg.noise(), embedder.clone(), rng_from_seed(cfg.seed)),
        );
        let mut test = BatchGenerator::new(
            test_store,
            AlignmentTransform::new(vocab),
            AlignmentEvalShaper::new(cfg.noise(), embedder, rng_from_seed(offset_seed(cfg.seed, 2))),
        );

        // ── Step 5: Run directory, config, scalar log ─────────────────────────
        let ts          = run_timestamp();
        let checkpoints = CheckpointManager::create(&cfg.builds_dir, &ts, COMPONENT)?;
        checkpoints.save_config(CONFIG_FILE, cfg)?;
        let sink = ScalarCsvSink::create(Path::new(&cfg.logs_dir).join(format!("{ts}-{COMPONENT}")))?;
        tracing::info!(
            "Run '{ts}': checkpoints in '{}', scalars in '{}'",
            checkpoints.dir().display(),
            sink.csv_path().display()
        );

        // ── Step 6: Train ─────────────────────────────────────────────────────
        run_alignment_training(cfg, &mut train, &mut test, checkpoints, sink)
    }

    /// Hit accuracy of a finished run on `test_records` (or the run's own test set).
    pub fn evaluate(run_dir: &Path, test_records: Option<String>) -> Result<HitReport> {
        let mut cfg: AlignmentConfig = load_config(run_dir, CONFIG_FILE)?;
        if let Some(path) = test_records {
            cfg.test_records = path;
        }
        cfg.validate()?;

        let mut test = BatchGenerator::new(
            RecordStore::load(&cfg.test_records, cfg.seed)?,
            AlignmentTransform::new(cfg.vocabulary()?),
            AlignmentEvalShaper::new(cfg.noise(), cfg.embedder(), rng_from_seed(cfg.seed)),
        );
        run_alignment_evaluation(&cfg, run_dir, &mut test)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::PipelineError;

    #[test]
    fn test_config_json_round_trip_and_partial_files() {
        let cfg  = AlignmentConfig { seed: Some(3), limit_eval_steps: Some(5), ..AlignmentConfig::default() };
        let json = serde_json::to_string(&cfg).unwrap();
        assert_eq!(serde_json::from_str::<AlignmentConfig>(&json).unwrap(), cfg);

        // Missing keys fall back to defaults
        let partial: AlignmentConfig = serde_json::from_str(r#"{ "epochs": 2 }"#).unwrap();
        assert_eq!(partial.epochs, 2);
        assert_eq!(partial.batch_size, AlignmentConfig::default().batch_size);
    }

    #[test]
    fn test_missing_vocabulary_stops_before_training() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = AlignmentConfig {
            vocab_path: dir.path().join("missing.voc").to_string_lossy().into_owned(),
            builds_dir: dir.path().join("builds").to_string_lossy().into_owned(),
            ..AlignmentConfig::default()
        };
        let err = AlignmentUseCase::new(cfg).train().unwrap_err();
        assert!(matches!(err.downcast_ref::<PipelineError>(), Some(PipelineError::VocabLoad(_))));
        assert!(!dir.path().join("builds").exists());
    }

    #[test]
    fn test_invalid_noise_is_rejected() {
        let cfg = AlignmentConfig { noise_drop_probability: 1.5, ..AlignmentConfig::default() };
        assert!(AlignmentUseCase::new(cfg).train().is_err());
    }

    #[test]
    fn test_evaluate_without_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(AlignmentUseCase::evaluate(dir.path(), None).is_err());
    }
}
