// ============================================================
// Layer 4 — Vocabulary Store
// ============================================================
// Fixed-size token table shared by the training and evaluation
// generators, so both see the same ids.
//
// File format (one entry per line, most frequent first):
//
//   the	48211
//   .	45102
//   was	21877
//   ...
//
// The count column is optional. Special tokens are reserved
// first, so `<pad>` is always id 0 and `<unk>` id 1; file
// tokens follow in rank order until `max_size` ids are taken.
//
// Lookups never fail: anything outside the table maps to the
// unknown-token id.

use anyhow::{Context, Result};
use std::{
    collections::HashMap,
    fs::{self, File},
    io::{BufWriter, Write},
    path::Path,
};

use crate::domain::error::PipelineError;
use crate::domain::record::Record;

/// Reserved tokens, in id order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecialTokens {
    pub pad: String,
    pub unk: String,
}

impl Default for SpecialTokens {
    fn default() -> Self {
        Self { pad: "<pad>".to_string(), unk: "<unk>".to_string() }
    }
}

#[derive(Debug, Clone)]
pub struct VocabularyStore {
    ids:      HashMap<String, u32>,
    tokens:   Vec<String>,
    counts:   Vec<Option<u64>>,
    specials: SpecialTokens,
}

impl VocabularyStore {
    /// Read a ranked token table and cap it at `max_size` ids.
    pub fn load(path: impl AsRef<Path>, max_size: usize, specials: SpecialTokens) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            PipelineError::VocabLoad(format!("cannot read '{}': {e}", path.display()))
        })?;

        let mut ranked = Vec::new();
        for (n, line) in text.lines().enumerate() {
            if line.is_empty() {
                continue;
            }
            let mut cols = line.split('\t');
            let token = cols.next().unwrap_or_default().trim();
            if token.is_empty() {
                return Err(PipelineError::VocabLoad(format!(
                    "'{}' line {}: blank token",
                    path.display(),
                    n + 1
                ))
                .into());
            }
            let count = match cols.next() {
                Some(c) => Some(c.trim().parse::<u64>().map_err(|_| {
                    PipelineError::VocabLoad(format!(
                        "'{}' line {}: count '{c}' is not an integer",
                        path.display(),
                        n + 1
                    ))
                })?),
                None => None,
            };
            ranked.push((token.to_string(), count));
        }

        let vocab = Self::from_ranked(ranked, max_size, specials)?;
        tracing::info!("Vocabulary loaded: {} ids from '{}'", vocab.len(), path.display());
        Ok(vocab)
    }

    /// Count token frequencies over every sentence of `records`
    /// and keep the most frequent ones.
    pub fn build(records: &[Record], max_size: usize, specials: SpecialTokens) -> Result<Self> {
        let mut freq: HashMap<&str, u64> = HashMap::new();
        for record in records {
            for sentence in record.body.iter().chain(record.endings.iter()) {
                for token in sentence {
                    *freq.entry(token.as_str()).or_insert(0) += 1;
                }
            }
        }

        // Descending count; ties broken alphabetically so builds are reproducible
        let mut ranked: Vec<(&str, u64)> = freq.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

        Self::from_ranked(
            ranked.into_iter().map(|(t, c)| (t.to_string(), Some(c))),
            max_size,
            specials,
        )
    }

    fn from_ranked(
        ranked:   impl IntoIterator<Item = (String, Option<u64>)>,
        max_size: usize,
        specials: SpecialTokens,
    ) -> Result<Self> {
        if specials.pad == specials.unk {
            return Err(PipelineError::VocabLoad("pad and unknown tokens must differ".into()).into());
        }
        if max_size < 2 {
            return Err(PipelineError::VocabLoad(format!(
                "vocabulary size {max_size} leaves no room for the special tokens"
            ))
            .into());
        }

        let mut vocab = Self {
            ids:      HashMap::new(),
            tokens:   Vec::new(),
            counts:   Vec::new(),
            specials: specials.clone(),
        };
        vocab.insert(specials.pad, None);
        vocab.insert(specials.unk, None);

        for (token, count) in ranked {
            if vocab.tokens.len() >= max_size {
                break;
            }
            if !vocab.ids.contains_key(&token) {
                vocab.insert(token, count);
            }
        }
        Ok(vocab)
    }

    fn insert(&mut self, token: String, count: Option<u64>) {
        let id = self.tokens.len() as u32;
        self.ids.insert(token.clone(), id);
        self.tokens.push(token);
        self.counts.push(count);
    }

    /// Write the table (without special tokens) in the format `load` reads.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = BufWriter::new(
            File::create(path).with_context(|| format!("Cannot create '{}'", path.display()))?,
        );
        for (token, count) in self.tokens.iter().zip(&self.counts).skip(2) {
            match count {
                Some(c) => writeln!(out, "{token}\t{c}")?,
                None    => writeln!(out, "{token}")?,
            }
        }
        out.flush()?;
        tracing::info!("Vocabulary of {} ids saved to '{}'", self.len(), path.display());
        Ok(())
    }

    pub fn token_to_id(&self, token: &str) -> u32 {
        self.ids.get(token).copied().unwrap_or_else(|| self.unk_id())
    }

    pub fn id_to_token(&self, id: u32) -> Option<&str> {
        self.tokens.get(id as usize).map(String::as_str)
    }

    pub fn contains(&self, token: &str) -> bool {
        self.ids.contains_key(token)
    }

    /// The token itself when known, the unknown token otherwise.
    pub fn normalize<'a>(&'a self, token: &'a str) -> &'a str {
        if self.contains(token) { token } else { &self.specials.unk }
    }

    pub fn pad_id(&self) -> u32 {
        0
    }

    pub fn unk_id(&self) -> u32 {
        1
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}
