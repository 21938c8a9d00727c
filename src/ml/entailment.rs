// ============================================================
// Layer 5 — Entailment Training Loop
// ============================================================
// Trains the sentence-pair classifier on inference pairs and
// validates it on story-cloze endings after every epoch.
//
//   for each epoch
//     steps_per_epoch batches from the pair stream
//       loss = BCE(p(entails), label), Adam step
//     validation: one pass over the story stream → val
//     checkpoint kept only if val loss is the lowest so far
//
// An "epoch" is a fixed number of steps, not a pass over the
// pair corpus. The pair stream is opened for as many passes as
// the whole run needs and simply continues across epochs.
//
// Reference: Bowman et al. (2015) A large annotated corpus for
//            learning natural language inference

use anyhow::Result;
use burn::{
    module::AutodiffModule,
    optim::{AdamConfig, GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};

use crate::application::entailment_use_case::EntailmentConfig;
use crate::data::entailment::{ENTAILS, SENTENCE1, SENTENCE2};
use crate::data::generator::BatchGenerator;
use crate::domain::bundle::{GraphSignature, TensorBundle};
use crate::domain::metrics::{Metrics, MetricsMean};
use crate::domain::traits::{BatchShaper, MetricSink, RecordTransform};
use crate::infra::checkpoint::{save_module, BestCheckpoint, CheckpointManager};
use crate::ml::assembly::{binary_accuracy, binary_cross_entropy, input, label, scalar};
use crate::ml::model::{EntailmentModel, EntailmentModelConfig};
use crate::ml::{train_device, TrainBackend};

/// Validation result of one epoch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochValidation {
    pub epoch:    usize,
    pub step:     usize,
    pub loss:     f64,
    pub accuracy: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntailmentSummary {
    pub validations: Vec<EpochValidation>,
    pub steps:       usize,
    pub best:        Option<BestCheckpoint>,
}

pub fn entailment_model_config(cfg: &EntailmentConfig) -> EntailmentModelConfig {
    EntailmentModelConfig::new(cfg.embedding_dim)
        .with_hidden1(cfg.hidden1)
        .with_hidden2(cfg.hidden2)
        .with_dropout(cfg.dropout)
}

/// Train the entailment classifier on the default GPU device.
pub fn run_entailment_training<T, S, R, ET, ES, M>(
    cfg:         &EntailmentConfig,
    train:       &mut BatchGenerator<T, S, R>,
    test:        &mut BatchGenerator<ET, ES>,
    checkpoints: &mut CheckpointManager,
    sink:        &mut M,
) -> Result<EntailmentSummary>
where
    T: RecordTransform<R>,
    S: BatchShaper<T::Output>,
    ET: RecordTransform,
    ES: BatchShaper<ET::Output>,
    M: MetricSink,
{
    let device = train_device();
    tracing::info!("Using WGPU device: {:?}", device);
    train_entailment::<TrainBackend, _, _, _, _, _, _>(cfg, train, test, checkpoints, sink, &device)
}

pub fn train_entailment<B, T, S, R, ET, ES, M>(
    cfg:         &EntailmentConfig,
    train:       &mut BatchGenerator<T, S, R>,
    test:        &mut BatchGenerator<ET, ES>,
    checkpoints: &mut CheckpointManager,
    sink:        &mut M,
    device:      &B::Device,
) -> Result<EntailmentSummary>
where
    B: AutodiffBackend,
    T: RecordTransform<R>,
    S: BatchShaper<T::Output>,
    ET: RecordTransform,
    ES: BatchShaper<ET::Output>,
    M: MetricSink,
{
    let per_pass = train.batches_per_epoch(cfg.batch_size);
    if per_pass == 0 {
        anyhow::bail!(
            "Pair store has {} pairs, fewer than one batch of {}",
            train.store().len(),
            cfg.batch_size
        );
    }
    if cfg.steps_per_epoch == 0 {
        anyhow::bail!("steps_per_epoch must be positive");
    }

    let passes    = (cfg.steps_per_epoch * cfg.epochs).div_ceil(per_pass);
    let d         = cfg.embedding_dim;
    let signature = GraphSignature::new(&[(SENTENCE1, d), (SENTENCE2, d)], &[(ENTAILS, 1)]);

    let mut model: EntailmentModel<B> = entailment_model_config(cfg).init(device);
    let mut optim = AdamConfig::new().init();
    tracing::info!(
        "Entailment classifier ready: embedding {d}, {} epochs × {} steps ({passes} passes over {} pairs)",
        cfg.epochs,
        cfg.steps_per_epoch,
        train.store().len()
    );

    let mut summary = EntailmentSummary { validations: Vec::new(), steps: 0, best: None };
    let mut stream  = train.stream(cfg.batch_size, passes);
    let mut step    = 0usize;

    for epoch in 0..cfg.epochs {
        let mut mean = MetricsMean::default();
        for _ in 0..cfg.steps_per_epoch {
            let Some(batch) = stream.next() else { break };
            let batch = batch?;
            signature.check(&batch)?;

            let (loss, metrics) = batch_loss(&model, &batch, device)?;
            let grads = loss.backward();
            let grads = GradientsParams::from_grads(grads, &model);
            model = optim.step(cfg.lr, model, grads);

            if cfg.log_every > 0 && step % cfg.log_every == 0 {
                sink.record_all("train", &metrics, step)?;
            }
            mean.add(&metrics);
            step += 1;
        }

        let val = validate(&model.valid(), test, &signature, cfg.batch_size, device)?;
        let val_line = match (val.get("loss"), val.get("acc")) {
            (Some(loss), Some(accuracy)) => {
                sink.record_all("val", &val, step)?;
                summary.validations.push(EpochValidation { epoch, step, loss, accuracy });
                checkpoints.offer(loss, step, |stem| save_module::<B, _>(&model, stem))?;
                format!("val_loss={loss:.4} val_acc={:.1}%", accuracy * 100.0)
            }
            _ => {
                tracing::warn!("Validation after epoch {epoch} saw no full batch; no checkpoint taken");
                "val=none".to_string()
            }
        };

        let train_mean = mean.mean();
        println!(
            "Epoch {:>3}/{} | train_loss={:.4} train_acc={:.1}% | {}",
            epoch + 1,
            cfg.epochs,
            train_mean.get("loss").unwrap_or(f64::NAN),
            train_mean.get("acc").unwrap_or(f64::NAN) * 100.0,
            val_line,
        );
    }

    summary.steps = step;
    summary.best  = checkpoints.best().cloned();
    Ok(summary)
}

/// BCE loss and accuracy of one bundle.
fn batch_loss<B: Backend>(
    model:  &EntailmentModel<B>,
    batch:  &TensorBundle,
    device: &B::Device,
) -> Result<(Tensor<B, 1>, Metrics)> {
    let p = model.forward(input(batch, SENTENCE1, device)?, input(batch, SENTENCE2, device)?);
    let y = label(batch, ENTAILS, device)?;

    let loss    = binary_cross_entropy(p.clone(), y.clone());
    let metrics = Metrics::new()
        .with("loss", scalar(loss.clone()))
        .with("acc", binary_accuracy(p, y));
    Ok((loss, metrics))
}

/// Mean loss and accuracy over one pass of the story stream.
fn validate<B, ET, ES>(
    model:      &EntailmentModel<B>,
    test:       &mut BatchGenerator<ET, ES>,
    signature:  &GraphSignature,
    batch_size: usize,
    device:     &B::Device,
) -> Result<Metrics>
where
    B: Backend,
    ET: RecordTransform,
    ES: BatchShaper<ET::Output>,
{
    let mut mean = MetricsMean::default();
    for batch in test.stream(batch_size, 1) {
        let batch = batch?;
        signature.check(&batch)?;
        mean.add(&batch_loss(model, &batch, device)?.1);
    }
    Ok(mean.mean())
}
