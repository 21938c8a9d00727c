// ============================================================
// Layer 5 — Alignment Evaluation
// ============================================================
// Scores a trained run on held-out stories.
//
//   1. Read best_checkpoint.json of the run directory
//   2. Rebuild the model from the run's saved config and load
//      the checkpoint weights into it
//   3. Wire the frozen graph and stream the evaluation set once
//   4. A story is a hit when the source discriminator agrees
//      with the label:
//
//        disc_src <  0.5 and label == 0   → hit
//        disc_src >= 0.5 and label == 1   → hit
//
// Evaluation runs on the plain (non-autodiff) backend, so
// dropout is inactive and no gradient tape is kept.

use anyhow::{Context, Result};
use burn::prelude::*;
use std::path::Path;

use crate::application::alignment_use_case::AlignmentConfig;
use crate::data::alignment::{AlignmentSample, DISC_SRC};
use crate::data::generator::BatchGenerator;
use crate::domain::error::PipelineError;
use crate::domain::phase::Phase;
use crate::domain::traits::{BatchShaper, RecordTransform};
use crate::infra::checkpoint::{load_best, load_module};
use crate::ml::assembly::ModelAssembly;
use crate::ml::model::AlignmentModel;
use crate::ml::trainer::alignment_model_config;
use crate::ml::{train_device, InferBackend};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HitReport {
    pub hits:  usize,
    pub total: usize,
}

impl HitReport {
    pub fn accuracy(&self) -> f64 {
        if self.total == 0 { 0.0 } else { self.hits as f64 / self.total as f64 }
    }
}

fn is_hit(disc_src: f32, label: f32) -> bool {
    (disc_src < 0.5 && label == 0.0) || (disc_src >= 0.5 && label == 1.0)
}

/// Evaluate the best checkpoint of `run_dir` on the default GPU device.
pub fn run_alignment_evaluation<T, S>(
    cfg:     &AlignmentConfig,
    run_dir: &Path,
    eval:    &mut BatchGenerator<T, S>,
) -> Result<HitReport>
where
    T: RecordTransform<Output = AlignmentSample>,
    S: BatchShaper<AlignmentSample>,
{
    let device = train_device();
    tracing::info!("Using WGPU device: {:?}", device);
    evaluate_run::<InferBackend, _, _>(cfg, run_dir, eval, &device)
}

pub fn evaluate_run<B, T, S>(
    cfg:     &AlignmentConfig,
    run_dir: &Path,
    eval:    &mut BatchGenerator<T, S>,
    device:  &B::Device,
) -> Result<HitReport>
where
    B: Backend,
    T: RecordTransform<Output = AlignmentSample>,
    S: BatchShaper<AlignmentSample>,
{
    let best = load_best(run_dir)
        .with_context(|| format!("No best checkpoint recorded in '{}'", run_dir.display()))?;
    tracing::info!("Loading step {} checkpoint (loss {:.4}): '{}'", best.step, best.loss, best.path.display());

    let model_cfg = alignment_model_config(cfg);
    let model: AlignmentModel<B> = load_module::<B, _>(model_cfg.init(device), &best.path, device)?;
    let mut assembly = ModelAssembly::from_model(model, model_cfg);

    count_hits(&mut assembly, eval, cfg.batch_size, device)
}

/// One pass over `eval` through the frozen graph.
pub fn count_hits<B, T, S>(
    assembly:   &mut ModelAssembly<B>,
    eval:       &mut BatchGenerator<T, S>,
    batch_size: usize,
    device:     &B::Device,
) -> Result<HitReport>
where
    B: Backend,
    T: RecordTransform<Output = AlignmentSample>,
    S: BatchShaper<AlignmentSample>,
{
    let graph      = assembly.build_frozen_graph()?;
    let mut report = HitReport::default();
    let mut stream = eval.stream(batch_size, 1);
    stream.set_phase(Phase::Frozen);

    for batch in stream {
        let batch         = batch?;
        let (disc_src, _) = assembly.predict(&graph, &batch, device)?;
        let labels        = &batch
            .label(DISC_SRC)
            .ok_or_else(|| PipelineError::ShapeMismatch(format!("bundle has no '{DISC_SRC}' array")))?
            .data;

        report.hits  += disc_src.iter().zip(labels).filter(|(&p, &y)| is_hit(p, y)).count();
        report.total += batch.batch_size();
    }

    tracing::info!(
        "Alignment accuracy: {}/{} = {:.1}%",
        report.hits,
        report.total,
        report.accuracy() * 100.0
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::alignment::{AlignmentEvalShaper, AlignmentTransform};
    use crate::data::noise::NoiseAugmenter;
    use crate::data::record_store::RecordStore;
    use crate::data::vocabulary::{SpecialTokens, VocabularyStore};
    use crate::domain::record::{sentence, Record};
    use crate::infra::checkpoint::{save_module, CheckpointManager};
    use crate::infra::embedding::HashingEmbedder;
    use burn::backend::NdArray;
    use rand::{rngs::StdRng, SeedableRng};
    use std::sync::Arc;

    type B = NdArray;

    #[test]
    fn test_hit_rule() {
        assert!(is_hit(0.2, 0.0));
        assert!(is_hit(0.5, 1.0));
        assert!(!is_hit(0.49, 1.0));
        assert!(!is_hit(0.9, 0.0));
    }

    fn config() -> AlignmentConfig {
        AlignmentConfig {
            embedding_dim:        6,
            hidden_dim:           8,
            latent_dim:           5,
            discriminator_hidden: 4,
            batch_size:           2,
            ..AlignmentConfig::default()
        }
    }

    fn records() -> Vec<Record> {
        (0..5)
            .map(|i| {
                Record::new(
                    format!("s{i}"),
                    vec![sentence("anna baked a cake"), sentence("her friends came over")],
                    [sentence("they ate it all"), sentence("nobody was hungry")],
                    (i % 2 + 1) as u8,
                )
            })
            .collect()
    }

    fn eval_generator(cfg: &AlignmentConfig) -> BatchGenerator<AlignmentTransform, AlignmentEvalShaper> {
        let vocab = VocabularyStore::build(&records(), 100, SpecialTokens::default()).unwrap();
        BatchGenerator::new(
            RecordStore::new(records(), Some(0)),
            AlignmentTransform::new(Arc::new(vocab)),
            AlignmentEvalShaper::new(
                NoiseAugmenter::new(0.1, 3),
                Arc::new(HashingEmbedder::new(cfg.embedding_dim)),
                StdRng::seed_from_u64(11),
            ),
        )
    }

    #[test]
    fn test_restored_checkpoint_predicts_like_the_saved_model() {
        let dir    = tempfile::tempdir().unwrap();
        let cfg    = config();
        let device = Default::default();

        let model: AlignmentModel<B> = alignment_model_config(&cfg).init(&device);
        let mut ckpt = CheckpointManager::create(dir.path(), "ts", "alignment").unwrap();
        ckpt.offer(0.7, 4, |stem| save_module::<B, _>(&model, stem)).unwrap();

        let best     = load_best(ckpt.dir()).unwrap();
        let restored = load_module::<B, _>(alignment_model_config(&cfg).init(&device), &best.path, &device).unwrap();

        let mut saved    = ModelAssembly::from_model(model, alignment_model_config(&cfg));
        let mut reloaded = ModelAssembly::<B>::from_model(restored, alignment_model_config(&cfg));
        let graph = saved.build_frozen_graph().unwrap();
        let _     = reloaded.build_frozen_graph().unwrap();

        let batch = eval_generator(&cfg).stream(2, 1).next().unwrap().unwrap();
        let (a, _) = saved.predict(&graph, &batch, &device).unwrap();
        let (b, _) = reloaded.predict(&graph, &batch, &device).unwrap();
        // CompactRecorder stores half precision
        for (x, y) in a.iter().zip(&b) {
            assert!((x - y).abs() < 1e-2, "{x} vs {y}");
        }
    }

    #[test]
    fn test_evaluation_counts_every_full_batch() {
        let dir    = tempfile::tempdir().unwrap();
        let cfg    = config();
        let device = Default::default();

        let model: AlignmentModel<B> = alignment_model_config(&cfg).init(&device);
        let mut ckpt = CheckpointManager::create(dir.path(), "ts", "alignment").unwrap();
        ckpt.offer(0.7, 4, |stem| save_module::<B, _>(&model, stem)).unwrap();

        let report = evaluate_run::<B, _, _>(&cfg, ckpt.dir(), &mut eval_generator(&cfg), &device).unwrap();
        // five records at batch size two → the fifth is dropped
        assert_eq!(report.total, 4);
        assert!(report.hits <= report.total);
    }

    #[test]
    fn test_run_without_checkpoint_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config();
        let err = evaluate_run::<B, _, _>(&cfg, dir.path(), &mut eval_generator(&cfg), &Default::default());
        assert!(err.is_err());
    }

    #[test]
    fn test_empty_report_accuracy_is_zero() {
        assert_eq!(HitReport::default().accuracy(), 0.0);
        assert_eq!(HitReport { hits: 3, total: 4 }.accuracy(), 0.75);
    }
}
