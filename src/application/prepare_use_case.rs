// ============================================================
// Layer 2 — PrepareUseCase
// ============================================================
// Turns a raw story-cloze CSV into the files training reads:
//
//   Step 1: Load, clean and tokenise stories  (Layer 4 - data)
//   Step 2: Optionally hold out a test share  (Layer 4 - data)
//   Step 3: Write the record blob(s)          (Layer 4 - data)
//   Step 4: Build + write the vocabulary      (Layer 4 - data)
//
// The vocabulary is counted on the kept records only, so the
// held-out set never leaks into it.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::data::{
    record_store::RecordStore,
    splitter::split_holdout,
    stories::StoryCsvSource,
    vocabulary::{SpecialTokens, VocabularyStore},
};
use crate::domain::traits::StorySource;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrepareConfig {
    pub stories:        String,
    pub output:         String,
    pub vocab_out:      Option<String>,
    pub vocab_size:     usize,
    /// Share of stories moved to `holdout_output`; 0 keeps everything
    pub holdout:        f64,
    pub holdout_output: Option<String>,
    pub seed:           Option<u64>,
}

impl Default for PrepareConfig {
    fn default() -> Self {
        Self {
            stories:        "data/stories.csv".to_string(),
            output:         "data/train_stories.bin".to_string(),
            vocab_out:      Some("data/default.voc".to_string()),
            vocab_size:     20_000,
            holdout:        0.0,
            holdout_output: None,
            seed:           None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrepareReport {
    pub kept:       usize,
    pub held_out:   usize,
    pub vocab_size: Option<usize>,
}

pub struct PrepareUseCase {
    config: PrepareConfig,
}

impl PrepareUseCase {
    pub fn new(config: PrepareConfig) -> Self {
        Self { config }
    }

    pub fn execute(&self) -> Result<PrepareReport> {
        let cfg = &self.config;
        if cfg.holdout > 0.0 && cfg.holdout_output.is_none() {
            bail!("--holdout needs --holdout-output to say where the held-out stories go");
        }

        // ── Step 1: Stories → Records ─────────────────────────────────────────
        tracing::info!("Reading stories from '{}'", cfg.stories);
        let records = StoryCsvSource::new(&cfg.stories).load_all()?;
        if records.is_empty() {
            bail!("No usable stories in '{}'", cfg.stories);
        }

        // ── Step 2: Holdout split ─────────────────────────────────────────────
        let (kept, held_out) = match &cfg.holdout_output {
            Some(_) if cfg.holdout > 0.0 => split_holdout(records, cfg.holdout, cfg.seed),
            _                            => (records, Vec::new()),
        };

        // ── Step 3: Record blobs ──────────────────────────────────────────────
        RecordStore::save(&cfg.output, &kept)?;
        tracing::info!("Wrote {} records to '{}'", kept.len(), cfg.output);
        if let Some(path) = cfg.holdout_output.as_ref().filter(|_| !held_out.is_empty()) {
            RecordStore::save(path, &held_out)?;
            tracing::info!("Wrote {} held-out records to '{}'", held_out.len(), path);
        }

        // ── Step 4: Vocabulary ────────────────────────────────────────────────
        let vocab_size = match &cfg.vocab_out {
            Some(path) => {
                let vocab = VocabularyStore::build(&kept, cfg.vocab_size, SpecialTokens::default())?;
                vocab.save(path)?;
                tracing::info!("Wrote vocabulary of {} tokens to '{}'", vocab.len(), path);
                Some(vocab.len())
            }
            None => None,
        };

        Ok(PrepareReport { kept: kept.len(), held_out: held_out.len(), vocab_size })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const CSV: &str = "\
InputStoryid,InputSentence1,InputSentence2,InputSentence3,InputSentence4,RandomFifthSentenceQuiz1,RandomFifthSentenceQuiz2,AnswerRightEnding
a1,Tom was hungry.,He went to the store.,It was closed.,He went home.,Tom ate at home.,Tom flew to Mars.,1
a2,Ann had a test.,She studied hard.,She slept well.,She felt ready.,Ann failed badly.,Ann did great.,2
a3,Sam got a dog.,The dog was loud.,Sam trained it.,It learned fast.,The dog was calm.,Sam sold the car.,1
a4,Lee lost a key.,He searched all day.,He checked his coat.,It was there.,Lee gave up.,Lee was relieved.,2
";

    fn config(dir: &std::path::Path) -> PrepareConfig {
        let stories = dir.join("stories.csv");
        fs::write(&stories, CSV).unwrap();
        PrepareConfig {
            stories:   stories.to_string_lossy().into_owned(),
            output:    dir.join("train.bin").to_string_lossy().into_owned(),
            vocab_out: Some(dir.join("default.voc").to_string_lossy().into_owned()),
            seed:      Some(7),
            ..PrepareConfig::default()
        }
    }

    #[test]
    fn test_prepare_writes_loadable_blob_and_vocab() {
        let dir    = tempfile::tempdir().unwrap();
        let cfg    = config(dir.path());
        let report = PrepareUseCase::new(cfg.clone()).execute().unwrap();

        assert_eq!(report.kept, 4);
        assert_eq!(report.held_out, 0);
        let store = RecordStore::load(&cfg.output, None).unwrap();
        assert_eq!(store.len(), 4);

        let vocab = VocabularyStore::load(cfg.vocab_out.unwrap(), 1000, SpecialTokens::default()).unwrap();
        assert!(vocab.contains("tom"));
        assert_eq!(Some(vocab.len()), report.vocab_size);
    }

    #[test]
    fn test_holdout_goes_to_its_own_blob() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.holdout        = 0.25;
        cfg.holdout_output = Some(dir.path().join("test.bin").to_string_lossy().into_owned());

        let report = PrepareUseCase::new(cfg.clone()).execute().unwrap();
        assert_eq!((report.kept, report.held_out), (3, 1));
        assert_eq!(RecordStore::load(cfg.holdout_output.unwrap(), None).unwrap().len(), 1);
    }

    #[test]
    fn test_holdout_without_destination_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.holdout = 0.5;
        assert!(PrepareUseCase::new(cfg).execute().is_err());
    }
}
