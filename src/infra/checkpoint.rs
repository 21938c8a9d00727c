// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Keeps the single best checkpoint of a training run on disk,
// plus the JSON side files needed to reload it.
//
// Run directory layout:
//   builds/
//     2026-10-18_09-12-44-alignment/
//       2026-10-18_09-12-44-alignment-model_checkpoint_step-120.mpk
//       best_checkpoint.json   ← path, step and loss of that file
//       alignment_config.json  ← hyper-parameters of the run
//
// Retention policy:
//   A new checkpoint is written only when its evaluation loss is
//   strictly lower than the best seen so far in this run (or no
//   checkpoint exists yet). NaN and infinite losses are skipped
//   with a warning. The new weights are written first, then the
//   pointer, and only then is the previous best file deleted.
//   Failing to write either is fatal (PipelineError::CheckpointIo);
//   failing to delete the old file is only logged.
//
// Weights are written with Burn's CompactRecorder, which picks
// the file extension itself, so callers pass an extension-less
// stem and get back the path that was actually written.
//
// Reference: Burn Book §5 (Records and Checkpointing)

use anyhow::{Context, Result};
use burn::{
    module::Module,
    tensor::backend::Backend,
    record::{CompactRecorder, FileRecorder, Recorder},
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::domain::error::PipelineError;

const BEST_POINTER: &str = "best_checkpoint.json";

/// Where the best checkpoint of a run lives and what it scored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestCheckpoint {
    pub path: PathBuf,
    pub step: usize,
    pub loss: f64,
}

pub struct CheckpointManager {
    dir:    PathBuf,
    prefix: String,
    best:   Option<BestCheckpoint>,
}

impl CheckpointManager {
    /// Open (creating if needed) the run directory `<builds>/<run_ts>-<component>`.
    pub fn create(builds: impl AsRef<Path>, run_ts: &str, component: &str) -> Result<Self> {
        let prefix = format!("{run_ts}-{component}");
        let dir    = builds.as_ref().join(&prefix);
        fs::create_dir_all(&dir)
            .map_err(|e| PipelineError::CheckpointIo(format!("cannot create '{}': {e}", dir.display())))?;
        Ok(Self { dir, prefix, best: None })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn best(&self) -> Option<&BestCheckpoint> {
        self.best.as_ref()
    }

    /// Extension-less file stem for a checkpoint taken at `step`.
    pub fn stem_for(&self, step: usize) -> PathBuf {
        self.dir.join(format!("{}-model_checkpoint_step-{step}", self.prefix))
    }

    /// Whether `loss` would replace the current best. Non-finite losses never do.
    pub fn is_improvement(&self, loss: f64) -> bool {
        if !loss.is_finite() {
            return false;
        }
        match &self.best {
            None       => true,
            Some(best) => loss < best.loss,
        }
    }

    /// Save through `save` if `loss` beats the best so far.
    /// Returns true when a new checkpoint was written.
    ///
    /// The pointer file is rewritten before the superseded checkpoint is
    /// deleted, so on any error the pointer, `best()` and the files on
    /// disk still describe the previous best.
    pub fn offer<F>(&mut self, loss: f64, step: usize, save: F) -> Result<bool>
    where
        F: FnOnce(&Path) -> Result<PathBuf>,
    {
        if !loss.is_finite() {
            tracing::warn!("Evaluation loss at step {step} is {loss}; no checkpoint taken");
            return Ok(false);
        }
        if !self.is_improvement(loss) {
            return Ok(false);
        }

        let stem    = self.stem_for(step);
        let written = save(&stem).map_err(|e| {
            PipelineError::CheckpointIo(format!("cannot write '{}': {e:#}", stem.display()))
        })?;

        let best = BestCheckpoint { path: written, step, loss };
        if let Err(e) = self.write_json(BEST_POINTER, &best) {
            if self.best.as_ref().map(|b| &b.path) != Some(&best.path) {
                remove_quietly(&best.path);
            }
            return Err(e);
        }

        tracing::info!(
            "New best checkpoint at step {step} (loss {loss:.4}): '{}'",
            best.path.display()
        );
        let current = best.path.clone();
        if let Some(previous) = self.best.replace(best) {
            if previous.path != current {
                remove_quietly(&previous.path);
            }
        }
        Ok(true)
    }

    /// Write a run-level config next to the checkpoints.
    pub fn save_config<C: Serialize>(&self, file_name: &str, cfg: &C) -> Result<()> {
        self.write_json(file_name, cfg)
    }

    fn write_json<T: Serialize>(&self, file_name: &str, value: &T) -> Result<()> {
        let path = self.dir.join(file_name);
        let json = serde_json::to_string_pretty(value)?;
        fs::write(&path, json)
            .map_err(|e| PipelineError::CheckpointIo(format!("cannot write '{}': {e}", path.display())))?;
        tracing::debug!("Wrote '{}'", path.display());
        Ok(())
    }
}

fn remove_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        tracing::warn!("Could not delete checkpoint '{}': {e}", path.display());
    }
}

/// Read a config written by `save_config`.
pub fn load_config<C: DeserializeOwned>(run_dir: impl AsRef<Path>, file_name: &str) -> Result<C> {
    let path = run_dir.as_ref().join(file_name);
    let json = fs::read_to_string(&path).with_context(|| {
        format!("Cannot read config '{}'. Has this run been trained?", path.display())
    })?;
    serde_json::from_str(&json).with_context(|| format!("Malformed config '{}'", path.display()))
}

/// Read the best-checkpoint pointer of a run directory.
pub fn load_best(run_dir: impl AsRef<Path>) -> Result<BestCheckpoint> {
    load_config(run_dir, BEST_POINTER)
}

/// Serialise a module's parameters with CompactRecorder.
pub fn save_module<B, M>(module: &M, stem: &Path) -> Result<PathBuf>
where
    B: Backend,
    M: Module<B>,
{
    CompactRecorder::new()
        .record(module.clone().into_record(), stem.to_path_buf())
        .map_err(|e| anyhow::anyhow!("CompactRecorder failed for '{}': {e:?}", stem.display()))?;
    Ok(stem.with_extension(<CompactRecorder as FileRecorder<B>>::file_extension()))
}

/// Restore parameters written by `save_module` into `module`.
pub fn load_module<B, M>(module: M, path: &Path, device: &B::Device) -> Result<M>
where
    B: Backend,
    M: Module<B>,
{
    let record = CompactRecorder::new()
        .load(path.to_path_buf(), device)
        .map_err(|e| anyhow::anyhow!("Cannot load checkpoint '{}': {e:?}", path.display()))?;
    Ok(module.load_record(record))
}
