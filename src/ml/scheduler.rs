// ============================================================
// Layer 5 — Scheduler Training Loop
// ============================================================
// Trains the sentence-ordering model: given a shuffled five-
// sentence story, put probability mass on the order that was
// applied.
//
//   for each epoch
//     if epoch % test_every == 0 → ending-choice accuracy
//     for each batch (random windows)
//       loss = MSE(order probabilities, one-hot true order)
//       Adam step
//     store reshuffled by the generator
//     if epoch % save_every == 0 → checkpoint
//
// Ending-choice accuracy reuses the ordering model as a story
// cloze judge: both candidate stories are shuffled, and the one
// whose true order gets the higher probability is taken to be
// the story with the right ending.
//
// Reference: Burn Book §5, Chen et al. (2016) Neural Sentence
//            Ordering

use anyhow::Result;
use burn::{
    module::AutodiffModule,
    nn::loss::{MseLoss, Reduction},
    optim::{AdamConfig, GradientsParams, Optimizer},
    prelude::*,
    tensor::{backend::AutodiffBackend, TensorData},
};

use crate::application::scheduler_use_case::SchedulerConfig;
use crate::data::generator::BatchGenerator;
use crate::data::scheduler::{SchedulerSample, CORRECT, ORDER, ORDER1, ORDER2, X, X1, X2};
use crate::domain::bundle::TensorBundle;
use crate::domain::error::PipelineError;
use crate::domain::metrics::{Metrics, MetricsMean};
use crate::domain::traits::{BatchShaper, MetricSink, RecordTransform};
use crate::infra::checkpoint::{save_module, CheckpointManager};
use crate::ml::model::{SchedulerModel, SchedulerModelConfig};
use crate::ml::{train_device, TrainBackend};

#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerSummary {
    /// (epoch, accuracy) of every test pass
    pub accuracies: Vec<(usize, f64)>,
    pub saved:      Vec<std::path::PathBuf>,
}

pub fn scheduler_model_config(cfg: &SchedulerConfig, vocab_size: usize) -> SchedulerModelConfig {
    SchedulerModelConfig::new(vocab_size, cfg.sentence_len)
        .with_embedding_size(cfg.embedding_size)
        .with_hidden_size(cfg.hidden_size)
        .with_dropout(cfg.dropout)
}

/// Train the scheduler on the default GPU device.
pub fn run_scheduler_training<T, S, ET, ES, M>(
    cfg:         &SchedulerConfig,
    vocab_size:  usize,
    train:       &mut BatchGenerator<T, S>,
    test:        &mut BatchGenerator<ET, ES>,
    checkpoints: &CheckpointManager,
    sink:        &mut M,
) -> Result<SchedulerSummary>
where
    T: RecordTransform<Output = SchedulerSample>,
    S: BatchShaper<SchedulerSample>,
    ET: RecordTransform<Output = SchedulerSample>,
    ES: BatchShaper<SchedulerSample>,
    M: MetricSink,
{
    let device = train_device();
    tracing::info!("Using WGPU device: {:?}", device);
    train_scheduler::<TrainBackend, _, _, _, _, _>(cfg, vocab_size, train, test, checkpoints, sink, &device)
}

pub fn train_scheduler<B, T, S, ET, ES, M>(
    cfg:         &SchedulerConfig,
    vocab_size:  usize,
    train:       &mut BatchGenerator<T, S>,
    test:        &mut BatchGenerator<ET, ES>,
    checkpoints: &CheckpointManager,
    sink:        &mut M,
    device:      &B::Device,
) -> Result<SchedulerSummary>
where
    B: AutodiffBackend,
    T: RecordTransform<Output = SchedulerSample>,
    S: BatchShaper<SchedulerSample>,
    ET: RecordTransform<Output = SchedulerSample>,
    ES: BatchShaper<SchedulerSample>,
    M: MetricSink,
{
    let per_epoch = train.batches_per_epoch(cfg.batch_size);
    if per_epoch == 0 {
        anyhow::bail!(
            "Training store has {} records, fewer than one batch of {}",
            train.store().len(),
            cfg.batch_size
        );
    }

    let mut model: SchedulerModel<B> = scheduler_model_config(cfg, vocab_size).init(device);
    let mut optim = AdamConfig::new().init();
    let mut summary = SchedulerSummary { accuracies: Vec::new(), saved: Vec::new() };
    tracing::info!("Scheduler ready: vocab {vocab_size}, sentence length {}", cfg.sentence_len);

    let mut stream = train.stream(cfg.batch_size, cfg.epochs);
    for epoch in 0..cfg.epochs {
        if cfg.test_every > 0 && epoch % cfg.test_every == 0 {
            let accuracy = ending_accuracy(&model.valid(), test, cfg.batch_size, device)?;
            sink.record_scalar("test_accuracy", accuracy, epoch)?;
            summary.accuracies.push((epoch, accuracy));
        }

        let mut mean = MetricsMean::default();
        for batch_index in 0..per_epoch {
            let Some(batch) = stream.next() else { break };
            let batch = batch?;

            let loss = order_loss(&model, &batch, device)?;
            let mse  = loss.clone().into_scalar().elem::<f64>();

            let grads = loss.backward();
            let grads = GradientsParams::from_grads(grads, &model);
            model = optim.step(cfg.lr, model, grads);

            let metrics = Metrics::new().with("mse", mse);
            sink.record_all("train", &metrics, epoch * per_epoch + batch_index)?;
            mean.add(&metrics);
        }

        let last_acc = summary.accuracies.last().map(|(_, a)| *a * 100.0).unwrap_or(f64::NAN);
        println!(
            "Epoch {:>3}/{} | train_mse={:.5} | last_acc={:.1}%",
            epoch + 1,
            cfg.epochs,
            mean.mean().get("mse").unwrap_or(f64::NAN),
            last_acc,
        );

        if cfg.save_every > 0 && epoch % cfg.save_every == 0 {
            let path = save_module::<B, _>(&model, &checkpoints.stem_for(epoch))
                .map_err(|e| PipelineError::CheckpointIo(format!("{e:#}")))?;
            tracing::info!("Scheduler checkpoint for epoch {epoch}: '{}'", path.display());
            summary.saved.push(path);
        }
    }

    Ok(summary)
}

fn ids<B: Backend>(batch: &TensorBundle, name: &str, device: &B::Device) -> Result<Tensor<B, 2, Int>> {
    Ok(floats::<B>(batch, name, false, device)?.int())
}

fn floats<B: Backend>(batch: &TensorBundle, name: &str, label: bool, device: &B::Device) -> Result<Tensor<B, 2>> {
    let array = if label { batch.label(name) } else { batch.input(name) };
    let array = array.ok_or_else(|| PipelineError::ShapeMismatch(format!("bundle has no '{name}' array")))?;
    Ok(Tensor::from_data(TensorData::new(array.data.clone(), [array.rows, array.cols]), device))
}

fn order_loss<B: Backend>(model: &SchedulerModel<B>, batch: &TensorBundle, device: &B::Device) -> Result<Tensor<B, 1>> {
    let probs  = model.forward(ids(batch, X, device)?);
    let target = floats(batch, ORDER, true, device)?;
    Ok(MseLoss::new().forward(probs, target, Reduction::Mean))
}

/// Probability the model gives to each row's true order.
fn true_order_probability<B: Backend>(
    model:  &SchedulerModel<B>,
    batch:  &TensorBundle,
    x:      &str,
    order:  &str,
    device: &B::Device,
) -> Result<Vec<f32>> {
    let probs  = model.forward(ids(batch, x, device)?);
    let onehot = floats(batch, order, true, device)?;
    (probs * onehot)
        .sum_dim(1)
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| anyhow::anyhow!("Cannot read tensor data: {e:?}"))
}

/// Rows where the candidate with the more likely true order is the right one.
fn count_hits(p1: &[f32], p2: &[f32], correct: &[f32]) -> usize {
    p1.iter()
        .zip(p2)
        .zip(correct)
        .filter(|((a, b), &c)| if a > b { c == 0.0 } else { c == 1.0 })
        .count()
}

fn ending_accuracy<B, ET, ES>(
    model:      &SchedulerModel<B>,
    test:       &mut BatchGenerator<ET, ES>,
    batch_size: usize,
    device:     &B::Device,
) -> Result<f64>
where
    B: Backend,
    ET: RecordTransform<Output = SchedulerSample>,
    ES: BatchShaper<SchedulerSample>,
{
    let (mut hits, mut total) = (0usize, 0usize);
    for batch in test.stream(batch_size, 1) {
        let batch = batch?;
        let p1 = true_order_probability(model, &batch, X1, ORDER1, device)?;
        let p2 = true_order_probability(model, &batch, X2, ORDER2, device)?;
        let correct = &batch
            .label(CORRECT)
            .ok_or_else(|| PipelineError::ShapeMismatch(format!("bundle has no '{CORRECT}' array")))?
            .data;
        hits  += count_hits(&p1, &p2, correct);
        total += batch.batch_size();
    }
    if total == 0 {
        tracing::warn!("Scheduler test set holds no full batch of {batch_size}");
        return Ok(0.0);
    }
    let accuracy = hits as f64 / total as f64;
    tracing::info!("Scheduler ending accuracy: {hits}/{total} = {:.1}%", accuracy * 100.0);
    Ok(accuracy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::record_store::{RecordStore, Sampling};
    use crate::data::scheduler::{SchedulerEvalShaper, SchedulerShaper, SchedulerTransform};
    use crate::data::vocabulary::{SpecialTokens, VocabularyStore};
    use crate::domain::record::{sentence, Record};
    use burn::backend::{Autodiff, NdArray};
    use rand::{rngs::StdRng, SeedableRng};
    use std::sync::Arc;

    #[test]
    fn test_hit_rule() {
        // row 0: candidate 1 wins, ending 1 right  → hit
        // row 1: candidate 1 wins, ending 2 right  → miss
        // row 2: tie goes to candidate 2, right    → hit
        let hits = count_hits(&[0.9, 0.6, 0.3], &[0.1, 0.2, 0.3], &[0.0, 1.0, 1.0]);
        assert_eq!(hits, 2);
    }

    #[derive(Default)]
    struct MemorySink(Vec<(String, usize)>);

    impl MetricSink for MemorySink {
        fn record_scalar(&mut self, tag: &str, _: f64, step: usize) -> Result<()> {
            self.0.push((tag.to_string(), step));
            Ok(())
        }
    }

    fn records(n: usize) -> Vec<Record> {
        (0..n)
            .map(|i| {
                Record::new(
                    format!("s{i}"),
                    vec![sentence("tom went out"), sentence("it rained"), sentence("he ran"), sentence("he got home")],
                    [sentence("he was dry"), sentence("he was wet")],
                    (i % 2 + 1) as u8,
                )
            })
            .collect()
    }

    #[test]
    fn test_small_run_logs_tests_and_saves() {
        let dir   = tempfile::tempdir().unwrap();
        let vocab = Arc::new(VocabularyStore::build(&records(1), 50, SpecialTokens::default()).unwrap());
        let cfg   = SchedulerConfig {
            batch_size:     2,
            epochs:         2,
            sentence_len:   4,
            embedding_size: 8,
            hidden_size:    8,
            test_every:     1,
            save_every:     2,
            ..SchedulerConfig::default()
        };

        let mut train = BatchGenerator::new(
            RecordStore::new(records(4), Some(3)),
            SchedulerTransform::new(vocab.clone(), cfg.sentence_len),
            SchedulerShaper::new(StdRng::seed_from_u64(1)),
        )
        .with_sampling(Sampling::Random)
        .with_shuffle_between_epochs(true);
        let mut test = BatchGenerator::new(
            RecordStore::new(records(2), Some(4)),
            SchedulerTransform::new(vocab.clone(), cfg.sentence_len),
            SchedulerEvalShaper::new(StdRng::seed_from_u64(2)),
        );

        let ckpt     = CheckpointManager::create(dir.path(), "ts", "scheduler").unwrap();
        let mut sink = MemorySink::default();
        let device   = Default::default();
        let summary  = train_scheduler::<Autodiff<NdArray>, _, _, _, _, _>(
            &cfg, vocab.len(), &mut train, &mut test, &ckpt, &mut sink, &device,
        )
        .unwrap();

        assert_eq!(summary.accuracies.iter().map(|(e, _)| *e).collect::<Vec<_>>(), vec![0, 1]);
        assert!(summary.accuracies.iter().all(|(_, a)| (0.0..=1.0).contains(a)));
        assert_eq!(summary.saved.len(), 1);
        assert!(summary.saved[0].exists());

        let train_steps: Vec<usize> = sink.0.iter().filter(|(t, _)| t == "train_mse").map(|(_, s)| *s).collect();
        assert_eq!(train_steps, vec![0, 1, 2, 3]);
    }
}
