// ============================================================
// Layer 4 — Batch Generator
// ============================================================
// Turns a RecordStore into a lazy stream of TensorBundles.
//
// For each epoch the store is walked in batch-sized windows:
//
//   records:  r0 r1 r2 r3 | r4 r5 r6 r7 | r8 r9
//             └ batch 0 ┘   └ batch 1 ┘   └ dropped
//
// The trailing window smaller than the batch size is dropped,
// never padded, so every bundle has the same leading dimension.
// A stream over E epochs therefore yields E * floor(N / B)
// bundles.
//
// Per batch:
//   window → RecordTransform::apply (per record)
//          → BatchShaper::shape (whole window + ShapeContext)
//          → TensorBundle
//
// Generation is pull-based: nothing happens until the consumer
// asks for the next bundle, and the phase in ShapeContext is
// whatever the consumer last set when that bundle is produced.
//
// Between epochs the store is reshuffled only if the caller
// opted in; evaluation sets usually keep a fixed order.

use anyhow::Result;

use crate::data::record_store::{RecordStore, Sampling};
use crate::domain::bundle::TensorBundle;
use crate::domain::phase::{Phase, ShapeContext};
use crate::domain::record::Record;
use crate::domain::traits::{BatchShaper, RecordTransform};

pub struct BatchGenerator<T, S, R = Record> {
    store:          RecordStore<R>,
    transform:      T,
    shaper:         S,
    shuffle_epochs: bool,
    sampling:       Sampling,
}

impl<T, S, R> BatchGenerator<T, S, R>
where
    T: RecordTransform<R>,
    S: BatchShaper<T::Output>,
{
    /// The transform and shaper are fixed for the generator's lifetime.
    pub fn new(store: RecordStore<R>, transform: T, shaper: S) -> Self {
        Self {
            store,
            transform,
            shaper,
            shuffle_epochs: false,
            sampling:       Sampling::Sequential,
        }
    }

    /// Reshuffle the store at every epoch boundary.
    pub fn with_shuffle_between_epochs(mut self, shuffle: bool) -> Self {
        self.shuffle_epochs = shuffle;
        self
    }

    /// Sequential windows (default) or independently resampled ones.
    pub fn with_sampling(mut self, sampling: Sampling) -> Self {
        self.sampling = sampling;
        self
    }

    pub fn batches_per_epoch(&self, batch_size: usize) -> usize {
        if batch_size == 0 { 0 } else { self.store.len() / batch_size }
    }

    pub fn store(&self) -> &RecordStore<R> {
        &self.store
    }

    /// A fresh pass of `epoch_count` epochs over the store.
    pub fn stream(&mut self, batch_size: usize, epoch_count: usize) -> BatchStream<'_, T, S, R> {
        BatchStream {
            generator:   self,
            batch_size,
            epoch_count,
            epoch:       0,
            batch_index: 0,
            phase:       Phase::initial(),
        }
    }

    fn produce(&mut self, offset: usize, batch_size: usize, ctx: &ShapeContext) -> Result<TensorBundle> {
        let window = self.store.get_range(offset, batch_size, self.sampling);
        let items = window
            .into_iter()
            .map(|record| self.transform.apply(record))
            .collect::<Result<Vec<_>>>()?;
        self.shaper.shape(&items, ctx)
    }
}

/// Lazy iterator over the bundles of one `stream` call.
pub struct BatchStream<'a, T, S, R = Record> {
    generator:   &'a mut BatchGenerator<T, S, R>,
    batch_size:  usize,
    epoch_count: usize,
    epoch:       usize,
    batch_index: usize,
    phase:       Phase,
}

impl<T, S, R> BatchStream<'_, T, S, R> {
    /// Phase handed to the shaper for every bundle produced from now on.
    pub fn set_phase(&mut self, phase: Phase) {
        self.phase = phase;
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Epoch the next bundle will belong to.
    pub fn epoch(&self) -> usize {
        self.epoch
    }
}

impl<T, S, R> Iterator for BatchStream<'_, T, S, R>
where
    T: RecordTransform<R>,
    S: BatchShaper<T::Output>,
{
    type Item = Result<TensorBundle>;

    fn next(&mut self) -> Option<Self::Item> {
        let per_epoch = self.generator.batches_per_epoch(self.batch_size);
        if per_epoch == 0 {
            return None;
        }

        if self.batch_index == per_epoch {
            self.epoch      += 1;
            self.batch_index = 0;
            if self.epoch < self.epoch_count && self.generator.shuffle_epochs {
                self.generator.store.shuffle();
                tracing::debug!("Store reshuffled for epoch {}", self.epoch);
            }
        }
        if self.epoch >= self.epoch_count {
            return None;
        }

        let ctx = ShapeContext {
            phase:       self.phase,
            epoch:       self.epoch,
            batch_index: self.batch_index,
        };
        let offset = self.batch_index * self.batch_size;
        self.batch_index += 1;

        Some(self.generator.produce(offset, self.batch_size, &ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::bundle::NumericArray;
    use crate::domain::record::sentence;

    /// Story index parsed from the id, as a float.
    struct IdTransform;

    impl RecordTransform for IdTransform {
        type Output = f32;

        fn apply(&self, record: &Record) -> Result<f32> {
            Ok(record.story_id.trim_start_matches("s").parse::<f32>()?)
        }
    }

    /// Puts the ids in one column and remembers every context it saw.
    #[derive(Default)]
    struct ColumnShaper {
        seen: Vec<ShapeContext>,
    }

    impl BatchShaper<f32> for ColumnShaper {
        fn shape(&mut self, window: &[f32], ctx: &ShapeContext) -> Result<TensorBundle> {
            self.seen.push(*ctx);
            Ok(TensorBundle::new(
                vec![NumericArray::column("id", window.to_vec())],
                vec![NumericArray::filled("y", window.len(), 0.0)],
            ))
        }
    }

    struct FailingShaper;

    impl BatchShaper<f32> for FailingShaper {
        fn shape(&mut self, _: &[f32], _: &ShapeContext) -> Result<TensorBundle> {
            anyhow::bail!("caller-supplied failure")
        }
    }

    fn store(n: usize) -> RecordStore {
        let records = (0..n)
            .map(|i| Record::new(format!("s{i}"), vec![], [sentence("a ."), sentence("b .")], 1))
            .collect();
        RecordStore::new(records, Some(42))
    }

    fn generator(n: usize) -> BatchGenerator<IdTransform, ColumnShaper> {
        BatchGenerator::new(store(n), IdTransform, ColumnShaper::default())
    }

    #[test]
    fn test_ten_records_batch_four_yields_two_batches() {
        let mut gen = generator(10);
        let bundles: Vec<_> = gen.stream(4, 1).collect::<Result<_>>().unwrap();
        assert_eq!(bundles.len(), 2);
        for b in &bundles {
            assert_eq!(b.batch_size(), 4);
            assert!(b.inputs.iter().all(|a| a.rows == 4));
        }
        let ids: Vec<f32> = bundles.iter().flat_map(|b| b.inputs[0].data.clone()).collect();
        assert_eq!(ids, vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);
    }

    #[test]
    fn test_batch_count_is_epochs_times_full_windows() {
        for (n, b, e) in [(10, 4, 3), (8, 4, 2), (3, 4, 5), (17, 1, 2), (0, 2, 2), (9, 3, 0)] {
            let mut gen = generator(n);
            assert_eq!(gen.stream(b, e).count(), e * (n / b), "n={n} b={b} e={e}");
        }
    }

    #[test]
    fn test_restreaming_starts_a_fresh_pass() {
        let mut gen = generator(6);
        assert_eq!(gen.stream(2, 1).count(), 3);
        assert_eq!(gen.stream(2, 1).count(), 3);
    }

    #[test]
    fn test_shuffle_only_when_opted_in() {
        let mut fixed = generator(12);
        let first: Vec<f32> = fixed
            .stream(3, 2)
            .flat_map(|b| b.unwrap().inputs[0].data.clone())
            .collect();
        assert_eq!(&first[..12], &first[12..]);

        let mut shuffled = generator(12).with_shuffle_between_epochs(true);
        let both: Vec<f32> = shuffled
            .stream(3, 2)
            .flat_map(|b| b.unwrap().inputs[0].data.clone())
            .collect();
        let (a, b) = both.split_at(12);
        let mut sorted = b.to_vec();
        sorted.sort_by(f32::total_cmp);
        assert_eq!(sorted, a.to_vec());
        assert_ne!(a, b);
    }

    #[test]
    fn test_phase_is_read_when_the_batch_is_produced() {
        let mut gen = generator(4);
        {
            let mut stream = gen.stream(2, 2);
            stream.next();
            stream.set_phase(Phase::Frozen);
            stream.next();
            stream.next();
        }
        let phases: Vec<_> = gen.shaper.seen.iter().map(|c| (c.epoch, c.phase)).collect();
        assert_eq!(
            phases,
            vec![(0, Phase::Unfrozen), (0, Phase::Frozen), (1, Phase::Frozen)]
        );
    }

    #[test]
    fn test_random_sampling_keeps_batch_count() {
        let mut gen = generator(10).with_sampling(Sampling::Random);
        let bundles: Vec<_> = gen.stream(3, 2).collect::<Result<_>>().unwrap();
        assert_eq!(bundles.len(), 6);
        for b in bundles {
            let mut ids = b.inputs[0].data.clone();
            ids.sort_by(f32::total_cmp);
            ids.dedup();
            assert_eq!(ids.len(), 3);
        }
    }

    #[test]
    fn test_shaper_errors_propagate() {
        let mut gen = BatchGenerator::new(store(4), IdTransform, FailingShaper);
        let first = gen.stream(2, 1).next().unwrap();
        assert!(first.is_err());
    }
}
