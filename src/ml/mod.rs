// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// This layer contains ALL Burn framework specific code.
// No other layer imports from burn directly — only this one
// (plus the checkpoint helpers in infra, which only see
// `Module` and a recorder).
//
// What's in this layer:
//
//   model.rs     — Network definitions
//                  • SubNetwork: Linear → LeakyReLU → Dropout →
//                    LayerNorm → Linear → ReLU
//                  • Discriminator: 3-layer MLP, sigmoid output
//                  • AlignmentModel: 2 encoders, 2 decoders and
//                    the discriminator in one parameter store
//                  • SchedulerModel: order classifier over 120
//                    permutations
//                  • EntailmentModel: two-sentence MLP with a
//                    sigmoid output
//
//   assembly.rs  — Trainable and frozen composite graphs over
//                  the shared AlignmentModel, gradient masks,
//                  scoped trainability flags, losses and metrics
//
//   trainer.rs   — Alignment training orchestrator: phase
//                  alternation, logging, evaluation and best-
//                  checkpoint retention
//
//   scheduler.rs — Scheduler training loop and ending accuracy
//
//   evaluator.rs — Loads a run's best checkpoint and reports
//                  alignment hit accuracy
//
//   entailment.rs — Fixed-step epochs on sentence pairs,
//                   validated on story endings
//
// Reference: Burn Book §3 (Building Blocks)
//            Burn Book §5 (Training)
//            Makhzani et al. (2016) Adversarial Autoencoders

/// Alignment, scheduler and entailment network definitions
pub mod model;

/// Composite graphs over the shared alignment model
pub mod assembly;

/// Alignment training loop with evaluation and checkpointing
pub mod trainer;

/// Sentence-ordering scheduler training loop
pub mod scheduler;

/// Hit-accuracy evaluation of a trained alignment run
pub mod evaluator;

/// Sentence-pair entailment training loop
pub mod entailment;

/// Backend used for training: WGPU with autodiff.
pub type TrainBackend = burn::backend::Autodiff<burn::backend::Wgpu>;

/// Backend used for evaluation: plain WGPU.
pub type InferBackend = burn::backend::Wgpu;

pub fn train_device() -> burn::backend::wgpu::WgpuDevice {
    burn::backend::wgpu::WgpuDevice::default()
}
