// ============================================================
// Layer 5 — Alignment Training Loop
// ============================================================
// Drives the adversarial game epoch by epoch:
//
//   Init
//    └─ for each epoch
//         phase = unfrozen on epoch 0, then strictly alternating
//         for each batch (pulled after the phase is set)
//           train_step on the phase's graph      → train_uf / train_f
//           every eval_every steps (step 0 too):
//             Evaluate   frozen graph over the eval stream,
//                        averaged, capped by limit_eval_steps → test
//             Checkpoint keep it only if test disrc_src_loss is
//                        strictly the lowest so far
//    └─ Done
//
// The global step is epoch * batches_per_epoch + batch_index.
//
// Key Burn 0.16 insight:
//   - Training uses TrainBackend (Autodiff<Wgpu>) for gradients
//   - model.valid() drops to the inner backend for evaluation,
//     which also switches dropout off
//   - The frozen graph's optimiser step only sees the
//     discriminator's gradients (GradientsParams::from_grads on
//     that sub-module), so the encoders stay put
//
// Reference: Burn Book §5, Kingma & Ba (2015) Adam,
//            Lample et al. (2018) Unsupervised MT (alternating
//            autoencoder / discriminator updates)

use anyhow::Result;
use burn::{optim::{AdamConfig, Optimizer}, tensor::backend::AutodiffBackend};
use std::path::{Path, PathBuf};

use crate::application::alignment_use_case::AlignmentConfig;
use crate::data::generator::BatchGenerator;
use crate::domain::bundle::TensorBundle;
use crate::domain::metrics::{Metrics, MetricsMean};
use crate::domain::phase::Phase;
use crate::domain::traits::{BatchShaper, GraphRunner, MetricSink, RecordTransform};
use crate::infra::checkpoint::{save_module, BestCheckpoint, CheckpointManager};
use crate::ml::assembly::{CompositeGraph, ModelAssembly};
use crate::ml::model::{AlignmentModel, AlignmentModelConfig};
use crate::ml::{train_device, TrainBackend};

/// Metric whose evaluation average decides which checkpoint is kept.
pub const CHECKPOINT_METRIC: &str = "disrc_src_loss";

// ─── Schedule ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrainingSchedule {
    pub epochs:           usize,
    pub batch_size:       usize,
    pub log_every:        usize,
    pub eval_every:       usize,
    /// Evaluation batches per pass; None runs the whole eval stream
    pub limit_eval_steps: Option<usize>,
}

impl From<&AlignmentConfig> for TrainingSchedule {
    fn from(cfg: &AlignmentConfig) -> Self {
        Self {
            epochs:           cfg.epochs,
            batch_size:       cfg.batch_size,
            log_every:        cfg.log_every,
            eval_every:       cfg.eval_every,
            limit_eval_steps: cfg.limit_eval_steps,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSummary {
    /// Phase each epoch ran in, in order
    pub phases: Vec<Phase>,
    pub steps:  usize,
    pub best:   Option<BestCheckpoint>,
}

// ─── Orchestrator ─────────────────────────────────────────────────────────────

pub struct TrainingOrchestrator<R, M> {
    runner:      R,
    sink:        M,
    checkpoints: CheckpointManager,
    schedule:    TrainingSchedule,
}

impl<R: GraphRunner, M: MetricSink> TrainingOrchestrator<R, M> {
    pub fn new(runner: R, sink: M, checkpoints: CheckpointManager, schedule: TrainingSchedule) -> Self {
        Self { runner, sink, checkpoints, schedule }
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    pub fn sink(&self) -> &M {
        &self.sink
    }

    pub fn run<T, S, ET, ES>(
        &mut self,
        train: &mut BatchGenerator<T, S>,
        eval:  &mut BatchGenerator<ET, ES>,
    ) -> Result<TrainingSummary>
    where
        T: RecordTransform,
        S: BatchShaper<T::Output>,
        ET: RecordTransform,
        ES: BatchShaper<ET::Output>,
    {
        let TrainingSchedule { epochs, batch_size, .. } = self.schedule;
        let per_epoch = train.batches_per_epoch(batch_size);
        if per_epoch == 0 {
            anyhow::bail!(
                "Training store has {} records, fewer than one batch of {batch_size}",
                train.store().len()
            );
        }
        tracing::info!("Training for {epochs} epochs × {per_epoch} batches (batch size {batch_size})");

        let mut phases = Vec::with_capacity(epochs);
        let mut stream = train.stream(batch_size, epochs);
        let mut step   = 0usize;

        for epoch in 0..epochs {
            let phase = Phase::for_epoch(epoch);
            stream.set_phase(phase);
            phases.push(phase);

            let mut epoch_mean = MetricsMean::default();
            let mut last_test  = None;

            for batch_index in 0..per_epoch {
                let Some(batch) = stream.next() else { break };
                let batch   = batch?;
                let metrics = self.runner.train_step(phase, &batch)?;
                epoch_mean.add(&metrics);

                if self.schedule.log_every > 0 && step % self.schedule.log_every == 0 {
                    self.sink.record_all(phase.metric_prefix(), &metrics, step)?;
                    tracing::debug!("step {step} ({}): {}", phase.metric_prefix(), format_metrics(&metrics));
                }

                if self.schedule.eval_every > 0 && step % self.schedule.eval_every == 0 {
                    let test = self.evaluate(eval, step)?;
                    self.checkpoint(&test, step)?;
                    last_test = Some(test);
                }

                debug_assert_eq!(step, epoch * per_epoch + batch_index);
                step += 1;
            }

            let test_line = last_test
                .map(|m| format!(" | test {}", format_metrics(&m)))
                .unwrap_or_default();
            println!(
                "Epoch {:>3}/{} | {} | {}{}",
                epoch + 1,
                epochs,
                phase.metric_prefix(),
                format_metrics(&epoch_mean.mean()),
                test_line,
            );
        }

        tracing::info!("Training complete after {step} steps");
        Ok(TrainingSummary {
            phases,
            steps: step,
            best:  self.checkpoints.best().cloned(),
        })
    }

    /// Averaged frozen-graph metrics over a fresh pass of the eval stream.
    fn evaluate<ET, ES>(&mut self, eval: &mut BatchGenerator<ET, ES>, step: usize) -> Result<Metrics>
    where
        ET: RecordTransform,
        ES: BatchShaper<ET::Output>,
    {
        let limit      = self.schedule.limit_eval_steps.unwrap_or(usize::MAX);
        let mut stream = eval.stream(self.schedule.batch_size, 1);
        stream.set_phase(Phase::Frozen);

        let mut mean = MetricsMean::default();
        for batch in stream.take(limit) {
            mean.add(&self.runner.eval_step(&batch?)?);
        }

        let test = mean.mean();
        if test.is_empty() {
            tracing::warn!("Evaluation at step {step} saw no full batch; nothing recorded");
        } else {
            self.sink.record_all("test", &test, step)?;
            tracing::info!("step {step} test ({} batches): {}", mean.count(), format_metrics(&test));
        }
        Ok(test)
    }

    fn checkpoint(&mut self, test: &Metrics, step: usize) -> Result<()> {
        let Some(loss) = test.get(CHECKPOINT_METRIC) else {
            return Ok(());
        };
        let runner = &self.runner;
        self.checkpoints.offer(loss, step, |stem| runner.save(stem))?;
        Ok(())
    }
}

fn format_metrics(m: &Metrics) -> String {
    m.iter()
        .map(|(name, value)| format!("{name}={value:.4}"))
        .collect::<Vec<_>>()
        .join(" ")
}

// ─── Burn-backed runner ───────────────────────────────────────────────────────

/// GraphRunner over a ModelAssembly: one optimiser, two graphs.
pub struct AlignmentRunner<B: AutodiffBackend, O> {
    assembly:  ModelAssembly<B>,
    trainable: CompositeGraph,
    frozen:    CompositeGraph,
    optim:     O,
    lr:        f64,
    device:    B::Device,
}

impl<B, O> AlignmentRunner<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<AlignmentModel<B>, B>,
{
    pub fn new(mut assembly: ModelAssembly<B>, optim: O, lr: f64, device: B::Device) -> Result<Self> {
        let trainable = assembly.build_trainable_graph()?;
        let frozen    = assembly.build_frozen_graph()?;
        Ok(Self { assembly, trainable, frozen, optim, lr, device })
    }
}

impl<B, O> GraphRunner for AlignmentRunner<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<AlignmentModel<B>, B>,
{
    fn train_step(&mut self, phase: Phase, batch: &TensorBundle) -> Result<Metrics> {
        let graph = match phase {
            Phase::Unfrozen => &self.trainable,
            Phase::Frozen   => &self.frozen,
        };
        self.assembly.train_step(graph, batch, &mut self.optim, self.lr, &self.device)
    }

    fn eval_step(&self, batch: &TensorBundle) -> Result<Metrics> {
        self.assembly.evaluate(&self.frozen, batch, &self.device)
    }

    fn save(&self, stem: &Path) -> Result<PathBuf> {
        save_module::<B, _>(self.assembly.model(), stem)
    }
}

/// Model shapes of a run, derived from its config.
pub fn alignment_model_config(cfg: &AlignmentConfig) -> AlignmentModelConfig {
    AlignmentModelConfig::new(cfg.embedding_dim)
        .with_hidden_dim(cfg.hidden_dim)
        .with_latent_dim(cfg.latent_dim)
        .with_discriminator_hidden(cfg.discriminator_hidden)
        .with_dropout(cfg.dropout)
}

/// Train an alignment model on the default GPU device.
pub fn run_alignment_training<T, S, ET, ES, M>(
    cfg:         &AlignmentConfig,
    train:       &mut BatchGenerator<T, S>,
    eval:        &mut BatchGenerator<ET, ES>,
    checkpoints: CheckpointManager,
    sink:        M,
) -> Result<TrainingSummary>
where
    T: RecordTransform,
    S: BatchShaper<T::Output>,
    ET: RecordTransform,
    ES: BatchShaper<ET::Output>,
    M: MetricSink,
{
    let device = train_device();
    tracing::info!("Using WGPU device: {:?}", device);
    train_alignment::<TrainBackend, _, _, _, _, _>(cfg, train, eval, checkpoints, sink, device)
}

/// Build the model and runner for `cfg` on `device`, then run the orchestrator.
pub fn train_alignment<B, T, S, ET, ES, M>(
    cfg:         &AlignmentConfig,
    train:       &mut BatchGenerator<T, S>,
    eval:        &mut BatchGenerator<ET, ES>,
    checkpoints: CheckpointManager,
    sink:        M,
    device:      B::Device,
) -> Result<TrainingSummary>
where
    B: AutodiffBackend,
    T: RecordTransform,
    S: BatchShaper<T::Output>,
    ET: RecordTransform,
    ES: BatchShaper<ET::Output>,
    M: MetricSink,
{
    let model_cfg = alignment_model_config(cfg);
    let assembly  = ModelAssembly::<B>::new(model_cfg, &device);
    tracing::info!(
        "Alignment model ready: embedding {}, latent {}, hidden {}",
        cfg.embedding_dim, cfg.latent_dim, cfg.hidden_dim
    );

    // m = β1*m + (1-β1)*g        (mean)
    // v = β2*v + (1-β2)*g²       (variance)
    // θ = θ - lr * m / (√v + ε)  (update)
    let optim  = AdamConfig::new().with_epsilon(1e-8).init();
    let runner = AlignmentRunner::new(assembly, optim, cfg.lr, device)?;

    TrainingOrchestrator::new(runner, sink, checkpoints, TrainingSchedule::from(cfg)).run(train, eval)
}
