// ============================================================
// Layer 3 — Tensor Bundles and Graph Signatures
// ============================================================
// A TensorBundle is what the batch generator hands to a graph
// for one training or evaluation step:
//
//   inputs: [src_noised [B, D], target_noised [B, D], history [B, D]]
//   labels: [disc_src [B, 1], disc_target [B, 1]]
//
// Arrays are plain row-major f32 buffers, so this layer stays
// free of any tensor framework. The ML layer converts them to
// Burn tensors only after the bundle has been checked against
// the receiving graph's GraphSignature.
//
// A mismatch is never padded or truncated: it is reported as
// PipelineError::ShapeMismatch and the step fails.

use crate::domain::error::PipelineError;

/// One named 2-D array, stored row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct NumericArray {
    pub name: String,
    pub rows: usize,
    pub cols: usize,
    pub data: Vec<f32>,
}

impl NumericArray {
    /// Build an array from per-row vectors. Rows must share one width.
    pub fn from_rows(name: impl Into<String>, rows: &[Vec<f32>]) -> Result<Self, PipelineError> {
        let name = name.into();
        let cols = rows.first().map_or(0, Vec::len);
        let mut data = Vec::with_capacity(rows.len() * cols);
        for (i, row) in rows.iter().enumerate() {
            if row.len() != cols {
                return Err(PipelineError::ShapeMismatch(format!(
                    "array '{name}': row {i} has width {}, expected {cols}",
                    row.len()
                )));
            }
            data.extend_from_slice(row);
        }
        Ok(Self { name, rows: rows.len(), cols, data })
    }

    /// A single-column array, one scalar per row.
    pub fn column(name: impl Into<String>, values: Vec<f32>) -> Self {
        Self { name: name.into(), rows: values.len(), cols: 1, data: values }
    }

    /// A single-column array filled with `value`.
    pub fn filled(name: impl Into<String>, rows: usize, value: f32) -> Self {
        Self::column(name, vec![value; rows])
    }

    pub fn shape(&self) -> [usize; 2] {
        [self.rows, self.cols]
    }

    pub fn row(&self, index: usize) -> &[f32] {
        &self.data[index * self.cols..(index + 1) * self.cols]
    }
}

/// The (inputs, labels) pair produced for one batch.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TensorBundle {
    pub inputs: Vec<NumericArray>,
    pub labels: Vec<NumericArray>,
}

impl TensorBundle {
    pub fn new(inputs: Vec<NumericArray>, labels: Vec<NumericArray>) -> Self {
        Self { inputs, labels }
    }

    /// Leading dimension shared by every array (0 for an empty bundle).
    pub fn batch_size(&self) -> usize {
        self.inputs.first().map_or(0, |a| a.rows)
    }

    pub fn input(&self, name: &str) -> Option<&NumericArray> {
        self.inputs.iter().find(|a| a.name == name)
    }

    pub fn label(&self, name: &str) -> Option<&NumericArray> {
        self.labels.iter().find(|a| a.name == name)
    }
}

/// Declared input/output layout of a composite graph:
/// ordered (name, width) pairs. Row count is free but shared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphSignature {
    pub inputs: Vec<(String, usize)>,
    pub labels: Vec<(String, usize)>,
}

impl GraphSignature {
    pub fn new(inputs: &[(&str, usize)], labels: &[(&str, usize)]) -> Self {
        let own = |v: &[(&str, usize)]| v.iter().map(|(n, w)| (n.to_string(), *w)).collect();
        Self { inputs: own(inputs), labels: own(labels) }
    }

    /// Check a bundle against this signature exactly.
    pub fn check(&self, bundle: &TensorBundle) -> Result<(), PipelineError> {
        let rows = bundle.batch_size();
        check_arrays("input", &self.inputs, &bundle.inputs, rows)?;
        check_arrays("label", &self.labels, &bundle.labels, rows)
    }
}

fn check_arrays(
    kind:     &str,
    expected: &[(String, usize)],
    actual:   &[NumericArray],
    rows:     usize,
) -> Result<(), PipelineError> {
    if expected.len() != actual.len() {
        return Err(PipelineError::ShapeMismatch(format!(
            "expected {} {kind} arrays, got {}",
            expected.len(),
            actual.len()
        )));
    }
    for ((name, width), array) in expected.iter().zip(actual) {
        if &array.name != name {
            return Err(PipelineError::ShapeMismatch(format!(
                "{kind} '{}' found where '{name}' was declared",
                array.name
            )));
        }
        if array.cols != *width || array.rows != rows || array.data.len() != rows * width {
            return Err(PipelineError::ShapeMismatch(format!(
                "{kind} '{name}': shape {:?}, declared [{rows}, {width}]",
                array.shape()
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bundle(width: usize) -> TensorBundle {
        let x = NumericArray::from_rows("x", &[vec![0.0; width], vec![1.0; width]]).unwrap();
        TensorBundle::new(vec![x], vec![NumericArray::filled("y", 2, 0.0)])
    }

    #[test]
    fn test_signature_accepts_matching_bundle() {
        let sig = GraphSignature::new(&[("x", 3)], &[("y", 1)]);
        assert!(sig.check(&bundle(3)).is_ok());
    }

    #[test]
    fn test_signature_rejects_wrong_width() {
        let sig = GraphSignature::new(&[("x", 4)], &[("y", 1)]);
        let err = sig.check(&bundle(3)).unwrap_err();
        assert!(matches!(err, PipelineError::ShapeMismatch(_)));
    }

    #[test]
    fn test_signature_rejects_wrong_name_and_count() {
        let sig = GraphSignature::new(&[("z", 3)], &[("y", 1)]);
        assert!(sig.check(&bundle(3)).is_err());

        let sig = GraphSignature::new(&[("x", 3)], &[("y", 1), ("w", 1)]);
        assert!(sig.check(&bundle(3)).is_err());
    }

    #[test]
    fn test_signature_rejects_ragged_rows() {
        let mut b = bundle(3);
        b.labels[0] = NumericArray::filled("y", 3, 0.0);
        let sig = GraphSignature::new(&[("x", 3)], &[("y", 1)]);
        assert!(sig.check(&b).is_err());
    }

    #[test]
    fn test_from_rows_rejects_uneven_rows() {
        let err = NumericArray::from_rows("x", &[vec![1.0, 2.0], vec![3.0]]);
        assert!(err.is_err());
    }

    #[test]
    fn test_row_access() {
        let a = NumericArray::from_rows("x", &[vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        assert_eq!(a.row(1), &[3.0, 4.0]);
        assert_eq!(a.shape(), [2, 2]);
    }
}
