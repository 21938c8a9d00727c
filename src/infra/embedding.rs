// ============================================================
// Layer 6 — Sentence Embedding Providers
// ============================================================
// Sentence → fixed-width vector, behind the EmbeddingProvider
// trait so the shapers never know which backend they talk to.
//
// HashingEmbedder
//   Local, deterministic feature hashing. Each lower-cased word
//   adds ±1 to one of `dim` buckets, chosen by its hash; the
//   sign comes from another bit of the same hash so collisions
//   tend to cancel rather than pile up. The vector is then
//   L2-normalised. An empty sentence embeds to all zeros.
//
//   The hash is 64-bit FNV-1a over the word's UTF-8 bytes with a
//   fixed offset basis, so a checkpoint trained with one build
//   sees the same vectors when evaluated with another.
//
//     "the cat ."  →  [0, 0.58, 0, −0.58, 0, ..., 0.58, 0]
//
//   Nothing is loaded per call, so it can be hit once per
//   stream per batch without cost.
//
// RetryingEmbedder
//   Wraps a remote-style provider and retries transient
//   failures a bounded number of times with linear backoff.
//   Fatal failures are returned at once.
//
// Reference: Weinberger et al. (2009) Feature Hashing for
//            Large Scale Multitask Learning

use std::{thread, time::Duration};

use crate::domain::error::EmbeddingError;
use crate::domain::traits::EmbeddingProvider;

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET_BASIS, |hash, &b| {
        (hash ^ u64::from(b)).wrapping_mul(FNV_PRIME)
    })
}

#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dim: usize,
}

impl HashingEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }

    fn embed_one(&self, sentence: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dim];
        for word in sentence.split_whitespace() {
            let h      = fnv1a(word.to_lowercase().as_bytes());
            let bucket = (h % self.dim as u64) as usize;
            let sign   = if h >> 63 == 0 { 1.0 } else { -1.0 };
            v[bucket] += sign;
        }

        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            v.iter_mut().for_each(|x| *x /= norm);
        }
        v
    }
}

impl EmbeddingProvider for HashingEmbedder {
    fn dim(&self) -> usize {
        self.dim
    }

    fn embed(&self, sentences: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if self.dim == 0 {
            return Err(EmbeddingError::Fatal("embedding width must be positive".into()));
        }
        Ok(sentences.iter().map(|s| self.embed_one(s)).collect())
    }
}

pub struct RetryingEmbedder<P> {
    inner:        P,
    max_attempts: usize,
    backoff:      Duration,
}

impl<P: EmbeddingProvider> RetryingEmbedder<P> {
    /// `max_attempts` counts the first call; values below 1 are treated as 1.
    pub fn new(inner: P, max_attempts: usize, backoff: Duration) -> Self {
        Self { inner, max_attempts: max_attempts.max(1), backoff }
    }
}

impl<P: EmbeddingProvider> EmbeddingProvider for RetryingEmbedder<P> {
    fn dim(&self) -> usize {
        self.inner.dim()
    }

    fn embed(&self, sentences: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut attempt = 1;
        loop {
            match self.inner.embed(sentences) {
                Err(EmbeddingError::Transient(msg)) if attempt < self.max_attempts => {
                    tracing::warn!(
                        "Embedding attempt {attempt}/{} failed: {msg}; retrying",
                        self.max_attempts
                    );
                    thread::sleep(self.backoff * attempt as u32);
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}
