// ============================================================
// Layer 4 — Record Store
// ============================================================
// Loads a persisted table of tokenised story records and serves
// windows of it to the batch generator.
//
// Blob layout:
//   bytes 0..4   magic  b"STRY"
//   bytes 4..8   format version, u32 little-endian
//   bytes 8..    bincode payload: Vec<Record>
//
// Anything that does not decode, or decodes into records that
// break the record shape (label outside {1, 2}, more than four
// body sentences, empty ending), is rejected as CorruptData
// before training starts.

use anyhow::{Context, Result};
use rand::{rngs::StdRng, seq::index, seq::SliceRandom};
use std::{fs, path::Path};

use crate::data::rng_from_seed;
use crate::domain::error::PipelineError;
use crate::domain::record::Record;

const MAGIC: &[u8; 4] = b"STRY";
const FORMAT_VERSION: u32 = 1;
const HEADER_LEN: usize = 8;

/// How a window of records is picked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Sampling {
    /// `count` consecutive records starting at the offset
    #[default]
    Sequential,
    /// `count` distinct records drawn at random; the offset is ignored.
    /// Draws are independent across calls.
    Random,
}

/// In-memory table of items with its own shuffle generator.
/// Story records are the usual item; sentence pairs for the
/// entailment classifier use the same windowing.
pub struct RecordStore<R = Record> {
    records: Vec<R>,
    rng:     StdRng,
}

impl<R> RecordStore<R> {
    pub fn new(records: Vec<R>, seed: Option<u64>) -> Self {
        Self { records, rng: rng_from_seed(seed) }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[R] {
        &self.records
    }

    /// New random permutation of the record order, in place.
    pub fn shuffle(&mut self) {
        self.records.shuffle(&mut self.rng);
    }

    /// Up to `count` records, picked according to `sampling`.
    /// Sequential windows are clipped at the end of the store.
    pub fn get_range(&mut self, offset: usize, count: usize, sampling: Sampling) -> Vec<&R> {
        match sampling {
            Sampling::Sequential => {
                let start = offset.min(self.records.len());
                let end   = offset.saturating_add(count).min(self.records.len());
                self.records[start..end].iter().collect()
            }
            Sampling::Random => {
                let amount  = count.min(self.records.len());
                let indices = index::sample(&mut self.rng, self.records.len(), amount);
                indices.iter().map(|i| &self.records[i]).collect()
            }
        }
    }
}

impl RecordStore<Record> {
    /// Read and validate a record blob.
    pub fn load(path: impl AsRef<Path>, seed: Option<u64>) -> Result<Self> {
        let path  = path.as_ref();
        let bytes = fs::read(path)
            .with_context(|| format!("Cannot read record blob '{}'", path.display()))?;

        let records = decode(&bytes)
            .with_context(|| format!("Rejected record blob '{}'", path.display()))?;

        tracing::info!("Loaded {} records from '{}'", records.len(), path.display());
        Ok(Self::new(records, seed))
    }

    /// Write records in the blob format `load` reads.
    pub fn save(path: impl AsRef<Path>, records: &[Record]) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut bytes = Vec::with_capacity(HEADER_LEN);
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        bincode::serialize_into(&mut bytes, records)
            .context("Cannot encode records")?;

        fs::write(path, bytes)
            .with_context(|| format!("Cannot write record blob '{}'", path.display()))?;
        tracing::debug!("Saved {} records to '{}'", records.len(), path.display());
        Ok(())
    }
}

fn decode(bytes: &[u8]) -> Result<Vec<Record>, PipelineError> {
    if bytes.len() < HEADER_LEN || &bytes[..4] != MAGIC {
        return Err(PipelineError::CorruptData("missing STRY header".into()));
    }

    let mut version = [0u8; 4];
    version.copy_from_slice(&bytes[4..HEADER_LEN]);
    let version = u32::from_le_bytes(version);
    if version != FORMAT_VERSION {
        return Err(PipelineError::CorruptData(format!(
            "unsupported format version {version}, expected {FORMAT_VERSION}"
        )));
    }

    let records: Vec<Record> = bincode::deserialize(&bytes[HEADER_LEN..])
        .map_err(|e| PipelineError::CorruptData(format!("undecodable payload: {e}")))?;

    if let Some(problem) = records.iter().find_map(Record::shape_violation) {
        return Err(PipelineError::CorruptData(problem));
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::record::sentence;

    fn records(n: usize) -> Vec<Record> {
        (0..n)
            .map(|i| {
                Record::new(
                    format!("story-{i}"),
                    vec![sentence("a b ."), sentence("c d .")],
                    [sentence("good end ."), sentence("bad end .")],
                    1 + (i % 2) as u8,
                )
            })
            .collect()
    }

    fn corrupt_kind(err: &anyhow::Error) -> bool {
        matches!(err.downcast_ref::<PipelineError>(), Some(PipelineError::CorruptData(_)))
    }

    #[test]
    fn test_save_then_load() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("train.bin");
        RecordStore::save(&path, &records(7)).unwrap();

        let store = RecordStore::load(&path, Some(1)).unwrap();
        assert_eq!(store.len(), 7);
        assert_eq!(store.records()[3].story_id, "story-3");
    }

    #[test]
    fn test_bad_magic_is_corrupt() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.bin");
        fs::write(&path, b"NOPE\x01\x00\x00\x00rest").unwrap();
        let err = RecordStore::load(&path, None).err().unwrap();
        assert!(corrupt_kind(&err));
    }

    #[test]
    fn test_truncated_payload_is_corrupt() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("cut.bin");
        RecordStore::save(&path, &records(4)).unwrap();
        let bytes = fs::read(&path).unwrap();
        fs::write(&path, &bytes[..bytes.len() / 2]).unwrap();
        let err = RecordStore::load(&path, None).err().unwrap();
        assert!(corrupt_kind(&err));
    }

    #[test]
    fn test_bad_label_is_corrupt() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("label.bin");
        let mut rs = records(2);
        rs[1].correct_ending = 0;
        RecordStore::save(&path, &rs).unwrap();
        let err = RecordStore::load(&path, None).err().unwrap();
        assert!(corrupt_kind(&err));
    }

    #[test]
    fn test_sequential_range_is_clipped() {
        let mut store = RecordStore::new(records(10), Some(0));
        let ids: Vec<_> = store
            .get_range(8, 4, Sampling::Sequential)
            .iter()
            .map(|r| r.story_id.clone())
            .collect();
        assert_eq!(ids, vec!["story-8", "story-9"]);
        assert!(store.get_range(12, 4, Sampling::Sequential).is_empty());
    }

    #[test]
    fn test_random_range_has_no_repeats_within_a_window() {
        let mut store = RecordStore::new(records(6), Some(3));
        for _ in 0..20 {
            let mut ids: Vec<_> = store
                .get_range(0, 5, Sampling::Random)
                .iter()
                .map(|r| r.story_id.clone())
                .collect();
            ids.sort();
            ids.dedup();
            assert_eq!(ids.len(), 5);
        }
    }

    #[test]
    fn test_shuffle_keeps_every_record() {
        let mut store = RecordStore::new(records(20), Some(9));
        store.shuffle();
        let mut ids: Vec<_> = store.records().iter().map(|r| r.story_id.clone()).collect();
        ids.sort();
        let mut expected: Vec<_> = records(20).into_iter().map(|r| r.story_id).collect();
        expected.sort();
        assert_eq!(ids, expected);
    }
}
