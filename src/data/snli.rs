// ============================================================
// Layer 4 — SNLI JSONL Loader
// ============================================================
// Reads the sentence pairs the entailment classifier trains on.
// One JSON object per line:
//
//   {"gold_label": "neutral",
//    "sentence1": "A person on a horse jumps over a plane.",
//    "sentence2": "A person is training his horse.", ...}
//
// Labels collapse to two classes:
//
//   contradiction         → entails = false
//   anything else         → entails = true
//                           (entailment, neutral, and "-" rows
//                            without annotator agreement)
//
// Both sentences go through the same WordTokenizer as story
// text. Lines that do not decode or leave a sentence empty are
// skipped with a warning; the count is logged at the end.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
};

use crate::data::tokenize::WordTokenizer;
use crate::domain::record::SentencePair;

const CONTRADICTION: &str = "contradiction";

#[derive(Debug, Deserialize)]
struct SnliLine {
    gold_label: String,
    sentence1:  String,
    sentence2:  String,
}

pub struct SnliSource {
    path:      PathBuf,
    tokenizer: WordTokenizer,
}

impl SnliSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), tokenizer: WordTokenizer::new() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn to_pair(&self, line: &str) -> Result<SentencePair> {
        let row: SnliLine = serde_json::from_str(line)?;
        let premise       = self.tokenizer.tokenize(&row.sentence1)?;
        let hypothesis    = self.tokenizer.tokenize(&row.sentence2)?;
        if premise.is_empty() || hypothesis.is_empty() {
            anyhow::bail!("empty sentence");
        }
        Ok(SentencePair { premise, hypothesis, entails: row.gold_label != CONTRADICTION })
    }

    /// Every usable pair of the file, in file order.
    pub fn load_all(&self) -> Result<Vec<SentencePair>> {
        let file = File::open(&self.path)
            .with_context(|| format!("Cannot open SNLI file '{}'", self.path.display()))?;

        let mut pairs   = Vec::new();
        let mut skipped = 0usize;
        for (n, line) in BufReader::new(file).lines().enumerate() {
            let line = line.with_context(|| format!("Cannot read '{}'", self.path.display()))?;
            if line.trim().is_empty() {
                continue;
            }
            match self.to_pair(&line) {
                Ok(pair) => pairs.push(pair),
                Err(e) => {
                    tracing::warn!("Skipping '{}' line {}: {e}", self.path.display(), n + 1);
                    skipped += 1;
                }
            }
        }

        let entailing = pairs.iter().filter(|p| p.entails).count();
        tracing::info!(
            "Loaded {} sentence pairs from '{}' ({} entailing, {} skipped)",
            pairs.len(),
            self.path.display(),
            entailing,
            skipped
        );
        Ok(pairs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_jsonl(body: &str) -> (tempfile::TempDir, PathBuf) {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("snli.jsonl");
        fs::write(&path, body).unwrap();
        (dir, path)
    }

    #[test]
    fn test_labels_collapse_to_contradiction_or_not() {
        let (_dir, path) = write_jsonl(concat!(
            r#"{"gold_label": "entailment", "sentence1": "A man sleeps.", "sentence2": "A person rests.", "pairID": "1"}"#, "\n",
            r#"{"gold_label": "neutral", "sentence1": "A dog runs.", "sentence2": "The dog is happy."}"#, "\n",
            r#"{"gold_label": "contradiction", "sentence1": "A cat sits.", "sentence2": "No animal is there."}"#, "\n",
            r#"{"gold_label": "-", "sentence1": "Kids play.", "sentence2": "Children are outside."}"#, "\n",
        ));
        let pairs = SnliSource::new(&path).load_all().unwrap();

        assert_eq!(pairs.iter().map(|p| p.entails).collect::<Vec<_>>(), vec![true, true, false, true]);
        assert_eq!(pairs[0].premise, vec!["a", "man", "sleeps", "."]);
        assert_eq!(pairs[2].hypothesis, vec!["no", "animal", "is", "there", "."]);
    }

    #[test]
    fn test_bad_lines_are_skipped() {
        let (_dir, path) = write_jsonl(concat!(
            "not json\n",
            r#"{"gold_label": "neutral", "sentence1": "", "sentence2": "Something."}"#, "\n",
            "\n",
            r#"{"gold_label": "neutral", "sentence1": "One.", "sentence2": "Two."}"#, "\n",
            r#"{"sentence1": "No label."}"#, "\n",
        ));
        let pairs = SnliSource::new(&path).load_all().unwrap();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].hypothesis, vec!["two", "."]);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(SnliSource::new("/nonexistent/snli.jsonl").load_all().is_err());
    }
}
