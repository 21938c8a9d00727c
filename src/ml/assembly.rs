// ============================================================
// Layer 5 — Model Assembly (Composite Graphs)
// ============================================================
// Owns the single AlignmentModel parameter store and wires two
// composite graphs over it:
//
//   trainable graph (unfrozen phase)
//     inputs  src_clean, src_noised, target_clean,
//             target_noised, history
//     outputs distances, disc_src, disc_target
//     updates all five sub-networks
//
//   frozen graph (frozen phase, evaluation)
//     inputs  src_noised, target_noised, history
//     outputs disc_src, disc_target
//     updates the discriminator only
//
// Both graphs call the same modules, so a step through one is
// visible to the other. "Freezing" is a gradient mask chosen per
// graph: after backward(), the frozen graph keeps only the
// discriminator's gradients, so the optimiser leaves the other
// four sub-networks untouched.
//
// Per-sub-network trainability flags are still tracked. They are
// only changed inside a FreezeScope while the frozen graph is
// being wired, and the scope puts them back when it is dropped,
// including on an early error return or a panic.
//
// Losses (per batch, averaged over rows):
//   distances_loss    = mean |distances − distance label|
//   disrc_*_loss      = binary cross-entropy on probabilities
//   loss              = sum of the above for the active graph
//   disrc_*_acc       = share of rows where p ≥ 0.5 matches label ≥ 0.5

use anyhow::Result;
use burn::{
    module::AutodiffModule,
    optim::{GradientsParams, Optimizer},
    prelude::*,
    tensor::{backend::AutodiffBackend, TensorData},
};

use crate::data::alignment::{
    DISC_SRC, DISC_TARGET, DISTANCE, HISTORY, SRC_CLEAN, SRC_NOISED, TARGET_CLEAN, TARGET_NOISED,
};
use crate::domain::bundle::{GraphSignature, TensorBundle};
use crate::domain::error::PipelineError;
use crate::domain::metrics::Metrics;
use crate::domain::phase::Phase;
use crate::ml::model::{AlignmentModel, AlignmentModelConfig};

const BCE_EPS: f64 = 1e-7;

// ─── Sub-networks and their trainability ─────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubNetworkId {
    EncoderSrc,
    EncoderTarget,
    DecoderSrc,
    DecoderTarget,
    Discriminator,
}

impl SubNetworkId {
    pub const ALL: [SubNetworkId; 5] = [
        SubNetworkId::EncoderSrc,
        SubNetworkId::EncoderTarget,
        SubNetworkId::DecoderSrc,
        SubNetworkId::DecoderTarget,
        SubNetworkId::Discriminator,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trainability([bool; 5]);

impl Default for Trainability {
    fn default() -> Self {
        Self([true; 5])
    }
}

impl Trainability {
    pub fn is_trainable(&self, net: SubNetworkId) -> bool {
        self.0[net.index()]
    }

    pub fn set(&mut self, net: SubNetworkId, trainable: bool) {
        self.0[net.index()] = trainable;
    }

    pub fn all_trainable(&self) -> bool {
        self.0.iter().all(|&t| t)
    }

    /// The optimiser mask these flags describe.
    fn mask(&self) -> Result<GradientMask, PipelineError> {
        let only_discriminator = SubNetworkId::ALL
            .iter()
            .all(|&n| self.is_trainable(n) == (n == SubNetworkId::Discriminator));
        if self.all_trainable() {
            Ok(GradientMask::Full)
        } else if only_discriminator {
            Ok(GradientMask::DiscriminatorOnly)
        } else {
            Err(PipelineError::UnsupportedFreeze(format!(
                "no gradient mask for trainability {:?}",
                self.0
            )))
        }
    }
}

/// Marks sub-networks untrainable for as long as it lives.
pub struct FreezeScope<'a> {
    flags: &'a mut Trainability,
    saved: Trainability,
}

impl<'a> FreezeScope<'a> {
    pub fn freeze(flags: &'a mut Trainability, nets: &[SubNetworkId]) -> Self {
        let saved = *flags;
        for &net in nets {
            flags.set(net, false);
        }
        Self { flags, saved }
    }

    pub fn flags(&self) -> &Trainability {
        self.flags
    }
}

impl Drop for FreezeScope<'_> {
    fn drop(&mut self) {
        *self.flags = self.saved;
    }
}

// ─── Composite graphs ─────────────────────────────────────────────────────────

/// Which parameters an optimiser step may touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GradientMask {
    Full,
    DiscriminatorOnly,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompositeGraph {
    pub phase:     Phase,
    pub signature: GraphSignature,
    pub mask:      GradientMask,
}

pub struct ModelAssembly<B: Backend> {
    model:        AlignmentModel<B>,
    config:       AlignmentModelConfig,
    trainability: Trainability,
}

impl<B: Backend> ModelAssembly<B> {
    pub fn new(config: AlignmentModelConfig, device: &B::Device) -> Self {
        Self::from_model(config.init(device), config)
    }

    /// Wrap an existing (e.g. checkpoint-restored) model.
    pub fn from_model(model: AlignmentModel<B>, config: AlignmentModelConfig) -> Self {
        Self { model, config, trainability: Trainability::default() }
    }

    pub fn model(&self) -> &AlignmentModel<B> {
        &self.model
    }

    pub fn trainability(&self) -> &Trainability {
        &self.trainability
    }

    /// Reconstruction, cross-domain and discriminator paths; everything learns.
    pub fn build_trainable_graph(&mut self) -> Result<CompositeGraph> {
        self.trainability = Trainability::default();
        check_wiring(&self.model, &self.config, &SubNetworkId::ALL)?;

        let d = self.config.embedding_dim;
        Ok(CompositeGraph {
            phase:     Phase::Unfrozen,
            signature: GraphSignature::new(
                &[(SRC_CLEAN, d), (SRC_NOISED, d), (TARGET_CLEAN, d), (TARGET_NOISED, d), (HISTORY, d)],
                &[(DISTANCE, 1), (DISC_SRC, 1), (DISC_TARGET, 1)],
            ),
            mask:      self.trainability.mask()?,
        })
    }

    /// Encoders into the discriminator; only the discriminator learns.
    pub fn build_frozen_graph(&mut self) -> Result<CompositeGraph> {
        let scope = FreezeScope::freeze(
            &mut self.trainability,
            &[
                SubNetworkId::EncoderSrc,
                SubNetworkId::EncoderTarget,
                SubNetworkId::DecoderSrc,
                SubNetworkId::DecoderTarget,
            ],
        );
        check_wiring(
            &self.model,
            &self.config,
            &[SubNetworkId::EncoderSrc, SubNetworkId::EncoderTarget, SubNetworkId::Discriminator],
        )?;

        let d = self.config.embedding_dim;
        Ok(CompositeGraph {
            phase:     Phase::Frozen,
            signature: GraphSignature::new(
                &[(SRC_NOISED, d), (TARGET_NOISED, d), (HISTORY, d)],
                &[(DISC_SRC, 1), (DISC_TARGET, 1)],
            ),
            mask:      scope.flags().mask()?,
        })
    }

    /// Forward-only frozen-graph pass; returns both discriminator probabilities.
    pub fn predict(&self, graph: &CompositeGraph, batch: &TensorBundle, device: &B::Device) -> Result<(Vec<f32>, Vec<f32>)> {
        graph.signature.check(batch)?;
        let out = self.model.forward_frozen(
            input(batch, SRC_NOISED, device)?,
            input(batch, TARGET_NOISED, device)?,
            input(batch, HISTORY, device)?,
        );
        Ok((to_vec(out.disc_src)?, to_vec(out.disc_target)?))
    }
}

impl<B: AutodiffBackend> ModelAssembly<B> {
    /// One optimiser update through `graph`, honouring its gradient mask.
    pub fn train_step<O>(
        &mut self,
        graph:  &CompositeGraph,
        batch:  &TensorBundle,
        optim:  &mut O,
        lr:     f64,
        device: &B::Device,
    ) -> Result<Metrics>
    where
        O: Optimizer<AlignmentModel<B>, B>,
    {
        graph.signature.check(batch)?;
        let (loss, metrics) = graph_loss(&self.model, graph.phase, batch, device)?;

        let grads = loss.backward();
        let grads = match graph.mask {
            GradientMask::Full              => GradientsParams::from_grads(grads, &self.model),
            GradientMask::DiscriminatorOnly => GradientsParams::from_grads(grads, &self.model.discriminator),
        };
        self.model = optim.step(lr, self.model.clone(), grads);
        Ok(metrics)
    }

    /// Loss and metrics of `graph` with dropout disabled and no gradient tape.
    pub fn evaluate(&self, graph: &CompositeGraph, batch: &TensorBundle, device: &B::Device) -> Result<Metrics> {
        graph.signature.check(batch)?;
        let (_, metrics) = graph_loss(&self.model.valid(), graph.phase, batch, device)?;
        Ok(metrics)
    }
}

/// Check that every sub-network wired into a graph agrees with the config.
fn check_wiring<B: Backend>(
    model:  &AlignmentModel<B>,
    config: &AlignmentModelConfig,
    nets:   &[SubNetworkId],
) -> Result<(), PipelineError> {
    let (d, src, z) = (config.embedding_dim, config.src_dim(), config.latent_dim);
    for &net in nets {
        let (name, actual, expected) = match net {
            SubNetworkId::EncoderSrc    => ("encoder_src", model.encoder_src.widths(), (src, z)),
            SubNetworkId::EncoderTarget => ("encoder_target", model.encoder_target.widths(), (d, z)),
            SubNetworkId::DecoderSrc    => ("decoder_src", model.decoder_src.widths(), (z, src)),
            SubNetworkId::DecoderTarget => ("decoder_target", model.decoder_target.widths(), (z, d)),
            SubNetworkId::Discriminator => ("discriminator", (model.discriminator.input_width(), 1), (z, 1)),
        };
        if actual != expected {
            return Err(PipelineError::ShapeMismatch(format!(
                "{name} maps {} → {}, graph needs {} → {}",
                actual.0, actual.1, expected.0, expected.1
            )));
        }
    }
    Ok(())
}

// ─── Bundle → tensors, losses ─────────────────────────────────────────────────

fn tensor<B: Backend>(
    array:  Option<&crate::domain::bundle::NumericArray>,
    name:   &str,
    device: &B::Device,
) -> Result<Tensor<B, 2>> {
    let array = array.ok_or_else(|| PipelineError::ShapeMismatch(format!("bundle has no '{name}' array")))?;
    Ok(Tensor::from_data(TensorData::new(array.data.clone(), [array.rows, array.cols]), device))
}

pub(crate) fn input<B: Backend>(batch: &TensorBundle, name: &str, device: &B::Device) -> Result<Tensor<B, 2>> {
    tensor(batch.input(name), name, device)
}

pub(crate) fn label<B: Backend>(batch: &TensorBundle, name: &str, device: &B::Device) -> Result<Tensor<B, 2>> {
    tensor(batch.label(name), name, device)
}

fn to_vec<B: Backend>(t: Tensor<B, 2>) -> Result<Vec<f32>> {
    t.into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| anyhow::anyhow!("Cannot read tensor data: {e:?}"))
}

pub(crate) fn scalar<B: Backend>(t: Tensor<B, 1>) -> f64 {
    t.into_scalar().elem::<f64>()
}

pub(crate) fn binary_cross_entropy<B: Backend>(p: Tensor<B, 2>, y: Tensor<B, 2>) -> Tensor<B, 1> {
    let p   = p.clamp(BCE_EPS, 1.0 - BCE_EPS);
    let pos = y.clone() * p.clone().log();
    let neg = (y.neg() + 1.0_f64) * (p.neg() + 1.0_f64).log();
    (pos + neg).mean().neg()
}

pub(crate) fn binary_accuracy<B: Backend>(p: Tensor<B, 2>, y: Tensor<B, 2>) -> f64 {
    let rows  = p.dims()[0].max(1) as f64;
    let pred  = p.greater_equal_elem(0.5).float();
    let truth = y.greater_equal_elem(0.5).float();
    1.0 - scalar((pred - truth).abs().sum()) / rows
}

/// Composite loss of the graph active in `phase`, plus its reported metrics.
fn graph_loss<B: Backend>(
    model:  &AlignmentModel<B>,
    phase:  Phase,
    batch:  &TensorBundle,
    device: &B::Device,
) -> Result<(Tensor<B, 1>, Metrics)> {
    let (disc_src, disc_target, distances_loss) = match phase {
        Phase::Unfrozen => {
            let out = model.forward_unfrozen(
                input(batch, SRC_CLEAN, device)?,
                input(batch, SRC_NOISED, device)?,
                input(batch, TARGET_CLEAN, device)?,
                input(batch, TARGET_NOISED, device)?,
                input(batch, HISTORY, device)?,
            );
            let dist = (out.distances - label(batch, DISTANCE, device)?).abs().mean();
            (out.disc_src, out.disc_target, Some(dist))
        }
        Phase::Frozen => {
            let out = model.forward_frozen(
                input(batch, SRC_NOISED, device)?,
                input(batch, TARGET_NOISED, device)?,
                input(batch, HISTORY, device)?,
            );
            (out.disc_src, out.disc_target, None)
        }
    };

    let y_src    = label(batch, DISC_SRC, device)?;
    let y_target = label(batch, DISC_TARGET, device)?;

    let src_loss    = binary_cross_entropy(disc_src.clone(), y_src.clone());
    let target_loss = binary_cross_entropy(disc_target.clone(), y_target.clone());
    let src_acc     = binary_accuracy(disc_src, y_src);
    let target_acc  = binary_accuracy(disc_target, y_target);

    let disc_loss = src_loss.clone() + target_loss.clone();
    let loss = match &distances_loss {
        Some(dist) => disc_loss + dist.clone(),
        None       => disc_loss,
    };

    let mut metrics = Metrics::new().with("loss", scalar(loss.clone()));
    if let Some(dist) = distances_loss {
        metrics.push("distances_loss", scalar(dist));
    }
    metrics.push("disrc_src_loss", scalar(src_loss));
    metrics.push("disrc_target_loss", scalar(target_loss));
    metrics.push("disrc_src_acc", src_acc);
    metrics.push("disrc_target_acc", target_acc);

    Ok((loss, metrics))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::bundle::NumericArray;
    use burn::backend::{Autodiff, NdArray};
    use burn::optim::AdamConfig;

    type B = Autodiff<NdArray>;

    const D: usize = 3;

    fn config() -> AlignmentModelConfig {
        config_for(D)
    }

    fn config_for(embedding_dim: usize) -> AlignmentModelConfig {
        AlignmentModelConfig::new(embedding_dim)
            .with_hidden_dim(8)
            .with_latent_dim(6)
            .with_discriminator_hidden(4)
    }

    fn array(name: &str, rows: usize, cols: usize, seed: f32) -> NumericArray {
        let data: Vec<Vec<f32>> = (0..rows)
            .map(|r| (0..cols).map(|c| ((r * cols + c) as f32 * 0.37 + seed).sin()).collect())
            .collect();
        NumericArray::from_rows(name, &data).unwrap()
    }

    fn unfrozen_batch(rows: usize) -> TensorBundle {
        TensorBundle::new(
            vec![
                array(SRC_CLEAN, rows, D, 0.1),
                array(SRC_NOISED, rows, D, 0.2),
                array(TARGET_CLEAN, rows, D, 0.3),
                array(TARGET_NOISED, rows, D, 0.4),
                array(HISTORY, rows, D, 0.5),
            ],
            vec![
                NumericArray::filled(DISTANCE, rows, 0.0),
                NumericArray::filled(DISC_SRC, rows, 0.0),
                NumericArray::filled(DISC_TARGET, rows, 0.0),
            ],
        )
    }

    fn frozen_batch(rows: usize) -> TensorBundle {
        TensorBundle::new(
            vec![
                array(SRC_NOISED, rows, D, 0.2),
                array(TARGET_NOISED, rows, D, 0.4),
                array(HISTORY, rows, D, 0.5),
            ],
            vec![
                NumericArray::filled(DISC_SRC, rows, 1.0),
                NumericArray::filled(DISC_TARGET, rows, 1.0),
            ],
        )
    }

    fn weights(t: Tensor<B, 2>) -> Vec<f32> {
        t.into_data().convert::<f32>().to_vec().unwrap()
    }

    #[test]
    fn test_freeze_scope_restores_on_drop() {
        let mut flags = Trainability::default();
        {
            let scope = FreezeScope::freeze(&mut flags, &[SubNetworkId::EncoderSrc]);
            assert!(!scope.flags().is_trainable(SubNetworkId::EncoderSrc));
            assert!(scope.flags().is_trainable(SubNetworkId::Discriminator));
        }
        assert!(flags.all_trainable());
    }

    #[test]
    fn test_partial_freeze_has_no_mask() {
        let mut flags = Trainability::default();
        flags.set(SubNetworkId::DecoderSrc, false);
        assert!(matches!(flags.mask(), Err(PipelineError::UnsupportedFreeze(_))));

        for net in SubNetworkId::ALL {
            flags.set(net, net == SubNetworkId::Discriminator);
        }
        assert_eq!(flags.mask().unwrap(), GradientMask::DiscriminatorOnly);
    }

    #[test]
    fn test_total_loss_is_reported_first_and_sums_the_parts() {
        let device = Default::default();
        let model: AlignmentModel<NdArray> = config().init(&device);
        let (loss, metrics) = graph_loss(&model, Phase::Frozen, &frozen_batch(3), &device).unwrap();

        let names: Vec<_> = metrics.iter().map(|(n, _)| n.to_string()).collect();
        assert_eq!(names[0], "loss");
        let parts = metrics.get("disrc_src_loss").unwrap() + metrics.get("disrc_target_loss").unwrap();
        assert!((metrics.get("loss").unwrap() - parts).abs() < 1e-5);
        assert!((scalar(loss) - parts).abs() < 1e-5);
    }

    #[test]
    fn test_failed_frozen_build_leaves_every_flag_trainable() {
        let device = Default::default();
        let model: AlignmentModel<B> = config().init(&device);
        // Wiring check fails: the weights were built for D, the config claims D + 1
        let mut assembly = ModelAssembly::from_model(model, config_for(D + 1));

        let err = assembly.build_frozen_graph().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::ShapeMismatch(_))
        ));
        for net in SubNetworkId::ALL {
            assert!(assembly.trainability().is_trainable(net), "{net:?} left frozen");
        }
    }

    #[test]
    fn test_graph_masks_and_signatures() {
        let device = Default::default();
        let mut assembly = ModelAssembly::<B>::new(config(), &device);

        let trainable = assembly.build_trainable_graph().unwrap();
        let frozen    = assembly.build_frozen_graph().unwrap();
        assert_eq!(trainable.mask, GradientMask::Full);
        assert_eq!(frozen.mask, GradientMask::DiscriminatorOnly);
        assert_eq!(trainable.signature.inputs.len(), 5);
        assert_eq!(frozen.signature.labels.len(), 2);
        assert!(assembly.trainability().all_trainable());
    }

    #[test]
    fn test_frozen_step_only_moves_the_discriminator() {
        let device = Default::default();
        let mut assembly = ModelAssembly::<B>::new(config(), &device);
        let frozen       = assembly.build_frozen_graph().unwrap();
        let mut optim    = AdamConfig::new().init();

        let enc_before  = weights(assembly.model().encoder_src.input.weight.val());
        let disc_before = weights(assembly.model().discriminator.layer1.weight.val());

        let metrics = assembly
            .train_step(&frozen, &frozen_batch(4), &mut optim, 1e-2, &device)
            .unwrap();
        assert!(metrics.get("distances_loss").is_none());
        assert!(metrics.get("disrc_src_loss").unwrap().is_finite());

        assert_eq!(weights(assembly.model().encoder_src.input.weight.val()), enc_before);
        assert_ne!(weights(assembly.model().discriminator.layer1.weight.val()), disc_before);
    }

    #[test]
    fn test_trainable_step_moves_the_encoders() {
        let device = Default::default();
        let mut assembly = ModelAssembly::<B>::new(config(), &device);
        let trainable    = assembly.build_trainable_graph().unwrap();
        let mut optim    = AdamConfig::new().init();

        let before  = weights(assembly.model().encoder_target.input.weight.val());
        let metrics = assembly
            .train_step(&trainable, &unfrozen_batch(4), &mut optim, 1e-2, &device)
            .unwrap();

        let names: Vec<_> = metrics.iter().map(|(n, _)| n.to_string()).collect();
        assert_eq!(
            names,
            vec![
                "loss",
                "distances_loss",
                "disrc_src_loss",
                "disrc_target_loss",
                "disrc_src_acc",
                "disrc_target_acc"
            ]
        );
        assert_ne!(weights(assembly.model().encoder_target.input.weight.val()), before);
    }

    #[test]
    fn test_wrong_bundle_for_graph_is_shape_mismatch() {
        let device = Default::default();
        let mut assembly = ModelAssembly::<B>::new(config(), &device);
        let frozen       = assembly.build_frozen_graph().unwrap();

        let err = assembly.evaluate(&frozen, &unfrozen_batch(2), &device).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn test_bce_and_accuracy() {
        let device = Default::default();
        let p = Tensor::<NdArray, 2>::from_data(TensorData::new(vec![0.9f32, 0.2, 0.6], [3, 1]), &device);
        let y = Tensor::<NdArray, 2>::from_data(TensorData::new(vec![1.0f32, 0.0, 0.0], [3, 1]), &device);

        let acc = binary_accuracy(p.clone(), y.clone());
        assert!((acc - 2.0 / 3.0).abs() < 1e-6);

        let expected = -((0.9f64).ln() + (0.8f64).ln() + (0.4f64).ln()) / 3.0;
        let bce = scalar(binary_cross_entropy(p, y));
        assert!((bce - expected).abs() < 1e-4);
    }
}
