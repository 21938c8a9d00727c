// ============================================================
// Layer 4 — Sentence Cleaning and Word Tokenisation
// ============================================================
// Turns one raw story sentence into the lower-cased word tokens
// stored in a Record.
//
//   "Karen was  assigned a roommate\u{00A0}her first year."
//        │ clean
//        ▼
//   "Karen was assigned a roommate her first year."
//        │ BERT pre-tokenizer (whitespace + punctuation split)
//        ▼
//   ["karen", "was", "assigned", ..., "year", "."]
//
// The CSV exports the corpus comes in carry the usual copy-paste
// debris: non-breaking and zero-width spaces, byte order marks,
// stray control characters and runs of spaces. None of it should
// become a token.
//
// Reference: tokenizers crate (pre_tokenizers::bert)

use anyhow::Result;
use tokenizers::pre_tokenizers::bert::BertPreTokenizer;
use tokenizers::{OffsetReferential, OffsetType, PreTokenizedString, PreTokenizer};

use crate::domain::record::Sentence;

/// Whitespace and control-character normalisation for one sentence.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextCleaner;

impl TextCleaner {
    pub fn new() -> Self {
        Self
    }

    /// Single-line, single-spaced, trimmed copy of `text`.
    pub fn clean(&self, text: &str) -> String {
        let mut out        = String::with_capacity(text.len());
        let mut last_space = true;

        for c in text.chars() {
            let c = match c {
                '\u{00A0}' | '\u{200B}' | '\u{FEFF}' => ' ',
                c if c.is_whitespace() || c.is_control() => ' ',
                c => c,
            };
            if c == ' ' {
                if !last_space {
                    out.push(' ');
                }
                last_space = true;
            } else {
                out.push(c);
                last_space = false;
            }
        }

        out.truncate(out.trim_end().len());
        out
    }
}

/// Cleaner followed by the BERT pre-tokenizer and lower-casing.
pub struct WordTokenizer {
    cleaner:  TextCleaner,
    splitter: BertPreTokenizer,
}

impl Default for WordTokenizer {
    fn default() -> Self {
        Self::new()
    }
}

impl WordTokenizer {
    pub fn new() -> Self {
        Self { cleaner: TextCleaner, splitter: BertPreTokenizer }
    }

    pub fn tokenize(&self, text: &str) -> Result<Sentence> {
        let cleaned = self.cleaner.clean(text);
        if cleaned.is_empty() {
            return Ok(Vec::new());
        }

        let mut pre = PreTokenizedString::from(cleaned.as_str());
        self.splitter
            .pre_tokenize(&mut pre)
            .map_err(|e| anyhow::anyhow!("Cannot split '{cleaned}': {e}"))?;

        Ok(pre
            .get_splits(OffsetReferential::Original, OffsetType::Char)
            .into_iter()
            .map(|(word, _, _)| word.to_lowercase())
            .collect())
    }
}
