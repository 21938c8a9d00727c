// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// This layer orchestrates all the other layers to accomplish
// a specific goal (preparing data, training or evaluating).
//
// Rules for this layer:
//   - No ML math or model code here
//   - No UI or printing here (that's Layer 1)
//   - No direct file parsing (that's Layer 4 and 6)
//   - Only workflow coordination and run configuration
//
// Reference: Clean Architecture pattern
//            Rust Book §7 (Module System)

// Story CSV → record blobs + vocabulary
pub mod prepare_use_case;

// Adversarial alignment training and evaluation
pub mod alignment_use_case;

// Sentence-ordering scheduler training
pub mod scheduler_use_case;

// Sentence-pair entailment classifier training
pub mod entailment_use_case;
