// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust structs, enums and traits that describe the
// training system: what a story record is, what a batch of
// numbers handed to a graph looks like, which phase the
// adversarial game is in, and which errors can stop a run.
//
// Rules for this layer:
//   - NO Burn framework types allowed here
//   - NO file I/O or network calls
//   - Only plain Rust structs, enums, and traits
//
// Everything that touches tensors, files or embeddings lives
// in `data`, `ml` or `infra` and implements the traits below.

// One parsed story unit (body sentences + two endings + label)
pub mod record;

// Named numeric arrays produced per batch, and graph signatures
pub mod bundle;

// Frozen/unfrozen phase and the context handed to batch shapers
pub mod phase;

// Named scalars reported per step
pub mod metrics;

// Typed error kinds that callers can downcast to
pub mod error;

// Seams implemented by other layers
pub mod traits;
