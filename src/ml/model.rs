// ============================================================
// Layer 5 — Model Architectures
// ============================================================
// Alignment model: an adversarial autoencoder over sentence
// embeddings, built from five sub-networks.
//
//                  ┌──────────────┐  src_aligned   ┌──────────────┐
//   src ⊕ history ─► encoder_src  ├───────┬────────► decoder_src  ├─► ≈ src ⊕ history
//                  └──────────────┘       │        └──────────────┘
//                                         ├──────► decoder_target ──► ≈ target
//                                         └──────► discriminator ───► p(src side)
//
//                  ┌────────────────┐ target_aligned
//   target ────────► encoder_target ├──► decoder_target, decoder_src,
//                  └────────────────┘    discriminator (same weights)
//
// Encoder / decoder sub-network:
//   Linear → LeakyReLU → Dropout → LayerNorm → Linear → ReLU
//
// Discriminator:
//   Linear → LeakyReLU → Dropout → LayerNorm
//   Linear → LeakyReLU → Dropout → LayerNorm
//   Linear → Sigmoid
//
// Scheduler model: token embedding, masked mean pooling per
// sentence, one hidden layer and a softmax over the 120 orders
// of a five-sentence story.
//
// Entailment model: a plain classifier over a pair of sentence
// embeddings.
//
//   [a ⊕ b] → Linear → ReLU → Dropout → Linear → ReLU → Dropout
//           → Linear → Sigmoid   ≈ p(b follows from a)
//
// Reference: Lample et al. (2018) Unsupervised Machine
//            Translation Using Monolingual Corpora Only

use burn::{
    nn::{
        Dropout, DropoutConfig,
        Embedding, EmbeddingConfig,
        LayerNorm, LayerNormConfig,
        Linear, LinearConfig,
    },
    prelude::*,
    tensor::activation::{leaky_relu, relu, sigmoid, softmax},
};

use crate::data::scheduler::{ORDER_COUNT, STORY_LEN};

const LEAKY_SLOPE: f64 = 0.01;

// ─── Encoder / decoder ────────────────────────────────────────────────────────

#[derive(Module, Debug)]
pub struct SubNetwork<B: Backend> {
    pub input:   Linear<B>,
    pub dropout: Dropout,
    pub norm:    LayerNorm<B>,
    pub output:  Linear<B>,
}

impl<B: Backend> SubNetwork<B> {
    fn new(d_input: usize, d_hidden: usize, d_output: usize, dropout: f64, device: &B::Device) -> Self {
        Self {
            input:   LinearConfig::new(d_input, d_hidden).init(device),
            dropout: DropoutConfig::new(dropout).init(),
            norm:    LayerNormConfig::new(d_hidden).init(device),
            output:  LinearConfig::new(d_hidden, d_output).init(device),
        }
    }

    /// [batch, d_input] → [batch, d_output]
    pub fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        let h = leaky_relu(self.input.forward(x), LEAKY_SLOPE);
        let h = self.norm.forward(self.dropout.forward(h));
        relu(self.output.forward(h))
    }

    /// Input and output widths as stored in the weights.
    pub fn widths(&self) -> (usize, usize) {
        let [d_input, _]  = self.input.weight.val().dims();
        let [_, d_output] = self.output.weight.val().dims();
        (d_input, d_output)
    }
}

// ─── Discriminator ────────────────────────────────────────────────────────────

#[derive(Module, Debug)]
pub struct Discriminator<B: Backend> {
    pub layer1:  Linear<B>,
    pub norm1:   LayerNorm<B>,
    pub layer2:  Linear<B>,
    pub norm2:   LayerNorm<B>,
    pub head:    Linear<B>,
    pub dropout: Dropout,
}

impl<B: Backend> Discriminator<B> {
    /// [batch, latent] → probability [batch, 1]
    pub fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        let h = leaky_relu(self.layer1.forward(x), LEAKY_SLOPE);
        let h = self.norm1.forward(self.dropout.forward(h));
        let h = leaky_relu(self.layer2.forward(h), LEAKY_SLOPE);
        let h = self.norm2.forward(self.dropout.forward(h));
        sigmoid(self.head.forward(h))
    }

    pub fn input_width(&self) -> usize {
        self.layer1.weight.val().dims()[0]
    }
}

// ─── Alignment model ──────────────────────────────────────────────────────────

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize
#[derive(Config, Debug)]
pub struct AlignmentModelConfig {
    /// Width of one sentence embedding
    pub embedding_dim: usize,
    #[config(default = 512)]
    pub hidden_dim: usize,
    #[config(default = 1024)]
    pub latent_dim: usize,
    #[config(default = 256)]
    pub discriminator_hidden: usize,
    #[config(default = 0.3)]
    pub dropout: f64,
}

impl AlignmentModelConfig {
    /// Source-side width: a sentence embedding concatenated with its history.
    pub fn src_dim(&self) -> usize {
        2 * self.embedding_dim
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> AlignmentModel<B> {
        let (d, src, h, z) = (self.embedding_dim, self.src_dim(), self.hidden_dim, self.latent_dim);
        let disc_h = self.discriminator_hidden;
        AlignmentModel {
            encoder_src:    SubNetwork::new(src, h, z, self.dropout, device),
            encoder_target: SubNetwork::new(d, h, z, self.dropout, device),
            decoder_src:    SubNetwork::new(z, h, src, self.dropout, device),
            decoder_target: SubNetwork::new(z, h, d, self.dropout, device),
            discriminator:  Discriminator {
                layer1:  LinearConfig::new(z, disc_h).init(device),
                norm1:   LayerNormConfig::new(disc_h).init(device),
                layer2:  LinearConfig::new(disc_h, (disc_h / 2).max(1)).init(device),
                norm2:   LayerNormConfig::new((disc_h / 2).max(1)).init(device),
                head:    LinearConfig::new((disc_h / 2).max(1), 1).init(device),
                dropout: DropoutConfig::new(self.dropout).init(),
            },
        }
    }
}

/// The five sub-networks. Both composite graphs call into this one
/// parameter store, so an update through either is seen by both.
#[derive(Module, Debug)]
pub struct AlignmentModel<B: Backend> {
    pub encoder_src:    SubNetwork<B>,
    pub encoder_target: SubNetwork<B>,
    pub decoder_src:    SubNetwork<B>,
    pub decoder_target: SubNetwork<B>,
    pub discriminator:  Discriminator<B>,
}

/// Trainable-graph outputs, each [batch, 1].
pub struct UnfrozenOutput<B: Backend> {
    pub distances:   Tensor<B, 2>,
    pub disc_src:    Tensor<B, 2>,
    pub disc_target: Tensor<B, 2>,
}

/// Frozen-graph outputs, each [batch, 1].
pub struct FrozenOutput<B: Backend> {
    pub disc_src:    Tensor<B, 2>,
    pub disc_target: Tensor<B, 2>,
}

fn squared_distance<B: Backend>(a: Tensor<B, 2>, b: Tensor<B, 2>) -> Tensor<B, 2> {
    let diff = a - b;
    (diff.clone() * diff).sum_dim(1)
}

impl<B: Backend> AlignmentModel<B> {
    /// Reconstruction and cross-domain paths plus both discriminator taps.
    /// The summed distance covers src→src, target→target, src→target
    /// and target→src reconstructions.
    pub fn forward_unfrozen(
        &self,
        src_clean:     Tensor<B, 2>,
        src_noised:    Tensor<B, 2>,
        target_clean:  Tensor<B, 2>,
        target_noised: Tensor<B, 2>,
        history:       Tensor<B, 2>,
    ) -> UnfrozenOutput<B> {
        let input_src       = Tensor::cat(vec![src_clean, history.clone()], 1);
        let input_src_noise = Tensor::cat(vec![src_noised, history], 1);

        let src_aligned         = self.encoder_src.forward(input_src_noise);
        let out_src             = self.decoder_src.forward(src_aligned.clone());
        let out_target_from_src = self.decoder_target.forward(src_aligned.clone());

        let target_aligned      = self.encoder_target.forward(target_noised);
        let out_target          = self.decoder_target.forward(target_aligned.clone());
        let out_src_from_target = self.decoder_src.forward(target_aligned.clone());

        let distances = squared_distance(out_src, input_src.clone())
            + squared_distance(out_target, target_clean.clone())
            + squared_distance(out_target_from_src, target_clean)
            + squared_distance(out_src_from_target, input_src);

        UnfrozenOutput {
            distances,
            disc_src:    self.discriminator.forward(src_aligned),
            disc_target: self.discriminator.forward(target_aligned),
        }
    }

    /// Encoders straight into the discriminator.
    pub fn forward_frozen(
        &self,
        src_noised:    Tensor<B, 2>,
        target_noised: Tensor<B, 2>,
        history:       Tensor<B, 2>,
    ) -> FrozenOutput<B> {
        let input_src_noise = Tensor::cat(vec![src_noised, history], 1);
        let src_aligned     = self.encoder_src.forward(input_src_noise);
        let target_aligned  = self.encoder_target.forward(target_noised);

        FrozenOutput {
            disc_src:    self.discriminator.forward(src_aligned),
            disc_target: self.discriminator.forward(target_aligned),
        }
    }
}

// ─── Scheduler model ──────────────────────────────────────────────────────────

#[derive(Config, Debug)]
pub struct SchedulerModelConfig {
    pub vocab_size:   usize,
    pub sentence_len: usize,
    #[config(default = 100)]
    pub embedding_size: usize,
    #[config(default = 256)]
    pub hidden_size: usize,
    #[config(default = 0.2)]
    pub dropout: f64,
}

impl SchedulerModelConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> SchedulerModel<B> {
        SchedulerModel {
            word_embeddings: EmbeddingConfig::new(self.vocab_size, self.embedding_size).init(device),
            hidden:          LinearConfig::new(STORY_LEN * self.embedding_size, self.hidden_size).init(device),
            output:          LinearConfig::new(self.hidden_size, ORDER_COUNT).init(device),
            dropout:         DropoutConfig::new(self.dropout).init(),
            sentence_len:    self.sentence_len,
        }
    }
}

#[derive(Module, Debug)]
pub struct SchedulerModel<B: Backend> {
    pub word_embeddings: Embedding<B>,
    pub hidden:          Linear<B>,
    pub output:          Linear<B>,
    pub dropout:         Dropout,
    pub sentence_len:    usize,
}

impl<B: Backend> SchedulerModel<B> {
    /// ids: [batch, 5 * sentence_len], padding id 0 → order probabilities [batch, 120]
    pub fn forward(&self, ids: Tensor<B, 2, Int>) -> Tensor<B, 2> {
        let [batch, _] = ids.dims();
        let len        = self.sentence_len;

        let emb = self.word_embeddings.forward(ids.clone());
        let [_, _, width] = emb.dims();
        let emb = emb.reshape([batch, STORY_LEN, len, width]);

        // Average only over real tokens of each sentence
        let mask   = ids.greater_elem(0).float().reshape([batch, STORY_LEN, len, 1]);
        let summed = (emb * mask.clone()).sum_dim(2);
        let counts = mask.sum_dim(2).clamp_min(1.0);
        let pooled = (summed / counts).reshape([batch, STORY_LEN * width]);

        let h = leaky_relu(self.hidden.forward(pooled), LEAKY_SLOPE);
        let h = self.dropout.forward(h);
        softmax(self.output.forward(h), 1)
    }
}

// ─── Entailment model ─────────────────────────────────────────────────────────

#[derive(Config, Debug)]
pub struct EntailmentModelConfig {
    /// Width of each of the two sentence embeddings
    pub embedding_dim: usize,
    #[config(default = 1000)]
    pub hidden1: usize,
    #[config(default = 500)]
    pub hidden2: usize,
    #[config(default = 0.2)]
    pub dropout: f64,
}

impl EntailmentModelConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> EntailmentModel<B> {
        EntailmentModel {
            layer1:  LinearConfig::new(2 * self.embedding_dim, self.hidden1).init(device),
            layer2:  LinearConfig::new(self.hidden1, self.hidden2).init(device),
            output:  LinearConfig::new(self.hidden2, 1).init(device),
            dropout: DropoutConfig::new(self.dropout).init(),
        }
    }
}

#[derive(Module, Debug)]
pub struct EntailmentModel<B: Backend> {
    pub layer1:  Linear<B>,
    pub layer2:  Linear<B>,
    pub output:  Linear<B>,
    pub dropout: Dropout,
}

impl<B: Backend> EntailmentModel<B> {
    /// [batch, D] × [batch, D] → [batch, 1]
    pub fn forward(&self, first: Tensor<B, 2>, second: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = Tensor::cat(vec![first, second], 1);
        let h = self.dropout.forward(relu(self.layer1.forward(x)));
        let h = self.dropout.forward(relu(self.layer2.forward(h)));
        sigmoid(self.output.forward(h))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::TensorData;

    type B = NdArray;

    fn small() -> AlignmentModelConfig {
        AlignmentModelConfig::new(4)
            .with_hidden_dim(8)
            .with_latent_dim(6)
            .with_discriminator_hidden(4)
    }

    #[test]
    fn test_alignment_output_shapes() {
        let device = Default::default();
        let model: AlignmentModel<B> = small().init(&device);
        let x = || Tensor::<B, 2>::ones([3, 4], &device);

        let out = model.forward_unfrozen(x(), x(), x(), x(), x());
        assert_eq!(out.distances.dims(), [3, 1]);
        assert_eq!(out.disc_src.dims(), [3, 1]);

        let out = model.forward_frozen(x(), x(), x());
        assert_eq!(out.disc_target.dims(), [3, 1]);
        let p: Vec<f32> = out.disc_src.into_data().to_vec().unwrap();
        assert!(p.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn test_widths_follow_config() {
        let device = Default::default();
        let model: AlignmentModel<B> = small().init(&device);
        assert_eq!(model.encoder_src.widths(), (8, 6));
        assert_eq!(model.encoder_target.widths(), (4, 6));
        assert_eq!(model.decoder_src.widths(), (6, 8));
        assert_eq!(model.decoder_target.widths(), (6, 4));
        assert_eq!(model.discriminator.input_width(), 6);
    }

    #[test]
    fn test_entailment_reads_both_sentences() {
        let device = Default::default();
        let model: EntailmentModel<B> = EntailmentModelConfig::new(3)
            .with_hidden1(6)
            .with_hidden2(4)
            .init(&device);
        assert_eq!(model.layer1.weight.val().dims(), [6, 6]);

        let p = model.forward(Tensor::ones([5, 3], &device), Tensor::zeros([5, 3], &device));
        assert_eq!(p.dims(), [5, 1]);
        let p: Vec<f32> = p.into_data().to_vec().unwrap();
        assert!(p.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn test_scheduler_outputs_a_distribution() {
        let device = Default::default();
        let model: SchedulerModel<B> = SchedulerModelConfig::new(20, 3)
            .with_embedding_size(5)
            .with_hidden_size(7)
            .init(&device);
        let ids = Tensor::<B, 2, Int>::from_data(
            TensorData::new((0..30).map(|i| (i % 20) as i64).collect::<Vec<_>>(), [2, 15]),
            &device,
        );
        let p = model.forward(ids);
        assert_eq!(p.dims(), [2, ORDER_COUNT]);
        let sums: Vec<f32> = p.sum_dim(1).into_data().to_vec().unwrap();
        assert!(sums.iter().all(|s| (s - 1.0).abs() < 1e-4));
    }
}
