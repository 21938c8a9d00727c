// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the five subcommands and all their flags:
//
//   prepare          story CSV → record blob(s) + vocabulary
//   train-alignment  adversarial alignment training
//   eval-alignment   hit accuracy of a finished alignment run
//   train-scheduler  sentence-ordering training
//   train-entailment sentence-pair classifier, validated on
//                    story endings
//
// Each Args struct converts into its application-layer config
// with `From`, so the application layer never sees clap types.
//
// Reference: Rust Book §12 (Building a CLI Program)

use clap::{Args, Subcommand};

use crate::application::{
    alignment_use_case::AlignmentConfig,
    entailment_use_case::EntailmentConfig,
    prepare_use_case::PrepareConfig,
    scheduler_use_case::SchedulerConfig,
};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Turn a story-cloze CSV into record blobs and a vocabulary
    Prepare(PrepareArgs),

    /// Train the adversarial sentence-alignment model
    TrainAlignment(TrainAlignmentArgs),

    /// Score the best checkpoint of an alignment run
    EvalAlignment(EvalAlignmentArgs),

    /// Train the sentence-ordering scheduler
    TrainScheduler(TrainSchedulerArgs),

    /// Train the sentence-pair entailment classifier
    TrainEntailment(TrainEntailmentArgs),
}

// ─── prepare ──────────────────────────────────────────────────────────────────
#[derive(Args, Debug)]
pub struct PrepareArgs {
    /// Story-cloze CSV to read
    #[arg(long)]
    pub stories: String,

    /// Record blob to write
    #[arg(long)]
    pub output: String,

    /// Vocabulary file to write (skipped when absent)
    #[arg(long)]
    pub vocab_out: Option<String>,

    /// Maximum vocabulary size, special tokens included
    #[arg(long, default_value_t = 20_000)]
    pub vocab_size: usize,

    /// Share of stories to hold out for evaluation
    #[arg(long, default_value_t = 0.0)]
    pub holdout: f64,

    /// Record blob for the held-out stories
    #[arg(long)]
    pub holdout_output: Option<String>,

    /// Seed for the holdout shuffle
    #[arg(long)]
    pub seed: Option<u64>,
}

impl From<PrepareArgs> for PrepareConfig {
    fn from(a: PrepareArgs) -> Self {
        PrepareConfig {
            stories:        a.stories,
            output:         a.output,
            vocab_out:      a.vocab_out,
            vocab_size:     a.vocab_size,
            holdout:        a.holdout,
            holdout_output: a.holdout_output,
            seed:           a.seed,
        }
    }
}

// ─── Shared run paths ─────────────────────────────────────────────────────────
#[derive(Args, Debug)]
pub struct RunPaths {
    /// Training record blob (from `prepare`)
    #[arg(long, default_value = "data/train_stories.bin")]
    pub train_records: String,

    /// Test record blob (from `prepare --holdout-output`)
    #[arg(long, default_value = "data/test_stories.bin")]
    pub test_records: String,

    /// Vocabulary file
    #[arg(long, default_value = "data/default.voc")]
    pub vocab: String,

    /// Vocabulary ids kept, special tokens included
    #[arg(long, default_value_t = 20_000)]
    pub vocab_size: usize,

    /// Parent directory of per-run checkpoint directories
    #[arg(long, default_value = "builds")]
    pub builds_dir: String,

    /// Parent directory of per-run scalar logs
    #[arg(long, default_value = "logs")]
    pub logs_dir: String,

    /// Seed for shuffling, sampling and noise
    #[arg(long)]
    pub seed: Option<u64>,
}

// ─── train-alignment ──────────────────────────────────────────────────────────
#[derive(Args, Debug)]
pub struct TrainAlignmentArgs {
    #[command(flatten)]
    pub paths: RunPaths,

    /// Sentence embedding width
    #[arg(long, default_value_t = 512)]
    pub embedding_dim: usize,

    /// Hidden width of encoders and decoders
    #[arg(long, default_value_t = 512)]
    pub hidden_dim: usize,

    /// Width of the shared latent space
    #[arg(long, default_value_t = 1024)]
    pub latent_dim: usize,

    /// Hidden width of the discriminator
    #[arg(long, default_value_t = 256)]
    pub discriminator_hidden: usize,

    #[arg(long, default_value_t = 0.3)]
    pub dropout: f64,

    #[arg(long, default_value_t = 64)]
    pub batch_size: usize,

    #[arg(long, default_value_t = 10)]
    pub epochs: usize,

    #[arg(long, default_value_t = 1e-4)]
    pub lr: f64,

    /// Record training metrics every N steps
    #[arg(long, default_value_t = 10)]
    pub log_every: usize,

    /// Evaluate (and maybe checkpoint) every N steps
    #[arg(long, default_value_t = 100)]
    pub eval_every: usize,

    /// Cap on evaluation batches per pass
    #[arg(long)]
    pub limit_eval_steps: Option<usize>,

    /// Per-token drop probability of the noised views
    #[arg(long, default_value_t = 0.1)]
    pub noise_drop: f64,

    /// Maximum positions a token may move in the noised views
    #[arg(long, default_value_t = 3)]
    pub noise_shuffle: usize,

    /// Attempts per embedding call before giving up
    #[arg(long, default_value_t = 3)]
    pub embed_attempts: usize,
}

impl From<TrainAlignmentArgs> for AlignmentConfig {
    fn from(a: TrainAlignmentArgs) -> Self {
        AlignmentConfig {
            train_records:        a.paths.train_records,
            test_records:         a.paths.test_records,
            vocab_path:           a.paths.vocab,
            vocab_size:           a.paths.vocab_size,
            builds_dir:           a.paths.builds_dir,
            logs_dir:             a.paths.logs_dir,
            embedding_dim:        a.embedding_dim,
            hidden_dim:           a.hidden_dim,
            latent_dim:           a.latent_dim,
            discriminator_hidden: a.discriminator_hidden,
            dropout:              a.dropout,
            batch_size:           a.batch_size,
            epochs:               a.epochs,
            lr:                   a.lr,
            log_every:            a.log_every,
            eval_every:           a.eval_every,
            limit_eval_steps:     a.limit_eval_steps,
            noise_drop_probability:     a.noise_drop,
            noise_max_shuffle_distance: a.noise_shuffle,
            embed_attempts:       a.embed_attempts,
            seed:                 a.paths.seed,
            ..AlignmentConfig::default()
        }
    }
}

// ─── eval-alignment ───────────────────────────────────────────────────────────
#[derive(Args, Debug)]
pub struct EvalAlignmentArgs {
    /// Run directory, e.g. builds/2026-10-18_09-12-44-alignment
    #[arg(long)]
    pub run_dir: String,

    /// Evaluate on this blob instead of the run's test set
    #[arg(long)]
    pub test_records: Option<String>,
}

// ─── train-scheduler ──────────────────────────────────────────────────────────
#[derive(Args, Debug)]
pub struct TrainSchedulerArgs {
    #[command(flatten)]
    pub paths: RunPaths,

    /// Tokens kept per sentence
    #[arg(long, default_value_t = 20)]
    pub sentence_len: usize,

    #[arg(long, default_value_t = 100)]
    pub embedding_size: usize,

    #[arg(long, default_value_t = 256)]
    pub hidden_size: usize,

    #[arg(long, default_value_t = 0.2)]
    pub dropout: f64,

    #[arg(long, default_value_t = 32)]
    pub batch_size: usize,

    #[arg(long, default_value_t = 20)]
    pub epochs: usize,

    #[arg(long, default_value_t = 1e-3)]
    pub lr: f64,

    /// Measure ending accuracy every N epochs
    #[arg(long, default_value_t = 1)]
    pub test_every: usize,

    /// Save a checkpoint every N epochs
    #[arg(long, default_value_t = 5)]
    pub save_every: usize,
}

impl From<TrainSchedulerArgs> for SchedulerConfig {
    fn from(a: TrainSchedulerArgs) -> Self {
        SchedulerConfig {
            train_records:  a.paths.train_records,
            test_records:   a.paths.test_records,
            vocab_path:     a.paths.vocab,
            vocab_size:     a.paths.vocab_size,
            builds_dir:     a.paths.builds_dir,
            logs_dir:       a.paths.logs_dir,
            sentence_len:   a.sentence_len,
            embedding_size: a.embedding_size,
            hidden_size:    a.hidden_size,
            dropout:        a.dropout,
            batch_size:     a.batch_size,
            epochs:         a.epochs,
            lr:             a.lr,
            test_every:     a.test_every,
            save_every:     a.save_every,
            seed:           a.paths.seed,
        }
    }
}

// ─── train-entailment ─────────────────────────────────────────────────────────
#[derive(Args, Debug)]
pub struct TrainEntailmentArgs {
    /// SNLI training pairs (JSONL)
    #[arg(long, default_value = "data/snli_1.0/snli_1.0_train.jsonl")]
    pub snli: String,

    /// Story record blob used for validation
    #[arg(long, default_value = "data/test_stories.bin")]
    pub test_records: String,

    #[arg(long, default_value = "builds")]
    pub builds_dir: String,

    #[arg(long, default_value = "logs")]
    pub logs_dir: String,

    /// Sentence embedding width
    #[arg(long, default_value_t = 1024)]
    pub embedding_dim: usize,

    #[arg(long, default_value_t = 1000)]
    pub hidden1: usize,

    #[arg(long, default_value_t = 500)]
    pub hidden2: usize,

    #[arg(long, default_value_t = 0.2)]
    pub dropout: f64,

    #[arg(long, default_value_t = 32)]
    pub batch_size: usize,

    #[arg(long, default_value_t = 10)]
    pub epochs: usize,

    /// Optimiser steps between two validations
    #[arg(long, default_value_t = 300)]
    pub steps_per_epoch: usize,

    #[arg(long, default_value_t = 1e-3)]
    pub lr: f64,

    /// Record training metrics every N steps
    #[arg(long, default_value_t = 10)]
    pub log_every: usize,

    /// Attempts per embedding call before giving up
    #[arg(long, default_value_t = 3)]
    pub embed_attempts: usize,

    #[arg(long)]
    pub seed: Option<u64>,
}

impl From<TrainEntailmentArgs> for EntailmentConfig {
    fn from(a: TrainEntailmentArgs) -> Self {
        EntailmentConfig {
            snli_train:      a.snli,
            test_records:    a.test_records,
            builds_dir:      a.builds_dir,
            logs_dir:        a.logs_dir,
            embedding_dim:   a.embedding_dim,
            hidden1:         a.hidden1,
            hidden2:         a.hidden2,
            dropout:         a.dropout,
            batch_size:      a.batch_size,
            epochs:          a.epochs,
            steps_per_epoch: a.steps_per_epoch,
            lr:              a.lr,
            log_every:       a.log_every,
            embed_attempts:  a.embed_attempts,
            seed:            a.seed,
            ..EntailmentConfig::default()
        }
    }
}
