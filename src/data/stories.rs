// ============================================================
// Layer 4 — Story-Cloze CSV Loader
// ============================================================
// Reads the story-cloze test/validation CSV export:
//
//   InputStoryid,InputSentence1,...,InputSentence4,
//   RandomFifthSentenceQuiz1,RandomFifthSentenceQuiz2,
//   AnswerRightEnding
//
// Each row becomes one Record: four tokenised body sentences,
// the two candidate endings and the right-ending label.
//
// A row that cannot be decoded, has an empty ending or a label
// outside {1, 2} is skipped with a warning. One bad row should
// not throw away an otherwise usable corpus.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::data::tokenize::WordTokenizer;
use crate::domain::record::Record;
use crate::domain::traits::StorySource;

#[derive(Debug, Deserialize)]
struct StoryRow {
    #[serde(rename = "InputStoryid")]
    story_id:  String,
    #[serde(rename = "InputSentence1")]
    sentence1: String,
    #[serde(rename = "InputSentence2")]
    sentence2: String,
    #[serde(rename = "InputSentence3")]
    sentence3: String,
    #[serde(rename = "InputSentence4")]
    sentence4: String,
    #[serde(rename = "RandomFifthSentenceQuiz1")]
    ending1:   String,
    #[serde(rename = "RandomFifthSentenceQuiz2")]
    ending2:   String,
    #[serde(rename = "AnswerRightEnding")]
    answer:    u8,
}

/// Loads every well-formed story of one CSV file.
/// Implements StorySource so the prepare use case stays format-agnostic.
pub struct StoryCsvSource {
    path:      PathBuf,
    tokenizer: WordTokenizer,
}

impl StoryCsvSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), tokenizer: WordTokenizer::new() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn to_record(&self, row: StoryRow) -> Result<Record> {
        let body = [&row.sentence1, &row.sentence2, &row.sentence3, &row.sentence4]
            .into_iter()
            .map(|s| self.tokenizer.tokenize(s))
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .filter(|s| !s.is_empty())
            .collect();
        let endings = [
            self.tokenizer.tokenize(&row.ending1)?,
            self.tokenizer.tokenize(&row.ending2)?,
        ];

        let record = Record::new(row.story_id, body, endings, row.answer);
        match record.shape_violation() {
            Some(problem) => anyhow::bail!(problem),
            None          => Ok(record),
        }
    }
}

impl StorySource for StoryCsvSource {
    fn load_all(&self) -> Result<Vec<Record>> {
        let mut reader = csv::Reader::from_path(&self.path)
            .with_context(|| format!("Cannot open stories '{}'", self.path.display()))?;

        let mut records = Vec::new();
        let mut skipped = 0usize;

        for (n, row) in reader.deserialize::<StoryRow>().enumerate() {
            // Header is line 1
            let line = n + 2;
            let parsed = row
                .map_err(anyhow::Error::from)
                .and_then(|row| self.to_record(row));
            match parsed {
                Ok(record) => records.push(record),
                Err(e) => {
                    tracing::warn!("Skipping '{}' line {line}: {e}", self.path.display());
                    skipped += 1;
                }
            }
        }

        tracing::info!(
            "Loaded {} stories from '{}' ({} skipped)",
            records.len(),
            self.path.display(),
            skipped
        );
        Ok(records)
    }
}
