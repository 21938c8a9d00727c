// ============================================================
// Layer 6 — Scalar Metrics Log
// ============================================================
// Append-only (step, tag, value) log, one CSV file per run:
//
//   logs/2026-10-18_09-12-44-alignment/scalars.csv
//
//   step,tag,value
//   0,train_uf_loss,2.734100
//   0,test_disrc_src_loss,0.693500
//   10,train_uf_loss,2.105300
//   ...
//
// Tags are `<prefix>_<metric>`, where the prefix tells which
// graph produced the value: train_uf (trainable graph),
// train_f (frozen graph) or test (evaluation pass).
//
// The long format keeps the file valid however many distinct
// tags a run produces; pivot it when plotting.

use anyhow::{Context, Result};
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use crate::domain::traits::MetricSink;

pub struct ScalarCsvSink {
    csv_path: PathBuf,
}

impl ScalarCsvSink {
    /// Open `<dir>/scalars.csv`, writing the header if the file is new.
    pub fn create(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)
            .with_context(|| format!("Cannot create log directory '{}'", dir.display()))?;

        let csv_path = dir.join("scalars.csv");
        if !csv_path.exists() {
            let mut f = fs::File::create(&csv_path)?;
            writeln!(f, "step,tag,value")?;
            tracing::debug!("Created scalar log '{}'", csv_path.display());
        }
        Ok(Self { csv_path })
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }
}

impl MetricSink for ScalarCsvSink {
    fn record_scalar(&mut self, tag: &str, value: f64, step: usize) -> Result<()> {
        let mut f = OpenOptions::new()
            .append(true)
            .open(&self.csv_path)
            .with_context(|| format!("Cannot append to '{}'", self.csv_path.display()))?;
        writeln!(f, "{step},{tag},{value:.6}")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::metrics::Metrics;

    #[test]
    fn test_header_written_once_and_rows_appended() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut sink = ScalarCsvSink::create(dir.path()).unwrap();
            sink.record_scalar("train_uf_loss", 1.5, 0).unwrap();
        }
        let mut sink = ScalarCsvSink::create(dir.path()).unwrap();
        let metrics  = Metrics::new().with("loss", 0.25).with("disrc_src_acc", 1.0);
        sink.record_all("test", &metrics, 10).unwrap();

        let text = fs::read_to_string(sink.csv_path()).unwrap();
        assert_eq!(
            text,
            "step,tag,value\n\
             0,train_uf_loss,1.500000\n\
             10,test_loss,0.250000\n\
             10,test_disrc_src_acc,1.000000\n"
        );
    }
}
