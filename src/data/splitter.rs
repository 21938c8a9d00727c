// ============================================================
// Layer 4 — Holdout Splitter
// ============================================================
// Randomly shuffles prepared records and carves off a held-out
// set for the evaluation generator:
//
//   all records ──shuffle──► [ kept ........ | held out ]
//                                            ▲
//                         len − round(len × holdout_fraction)
//
// Story-cloze files are sorted by story id, which loosely
// follows collection batches, so a contiguous tail would not
// be representative. Shuffling first avoids that.
//
// With a seed the split is reproducible, so `prepare` can be
// rerun without leaking stories between the two sets.
//
// Uses Fisher-Yates shuffle via rand::seq::SliceRandom.

use rand::seq::SliceRandom;

use crate::data::rng_from_seed;

/// Shuffle `samples` and split them into (kept, held_out).
///
/// # Arguments
/// * `samples`          - All available samples (consumed)
/// * `holdout_fraction` - Share moved to the held-out set, clamped to [0, 1]
/// * `seed`             - Fixed shuffle when set
///
/// # Example
/// ```ignore
/// let (train, test) = split_holdout(records, 0.1, Some(42));
/// ```
pub fn split_holdout<T>(
    mut samples:      Vec<T>,
    holdout_fraction: f64,
    seed:             Option<u64>,
) -> (Vec<T>, Vec<T>) {
    let mut rng = rng_from_seed(seed);
    samples.shuffle(&mut rng);

    let total    = samples.len();
    let held     = ((total as f64) * holdout_fraction.clamp(0.0, 1.0)).round() as usize;
    let split_at = total - held.min(total);

    // split_off(n) leaves [0..n) in place and returns [n..total)
    let held_out = samples.split_off(split_at);

    tracing::debug!(
        "Holdout split: {} kept, {} held out ({}% / {}%)",
        samples.len(),
        held_out.len(),
        (samples.len()  * 100) / total.max(1),
        (held_out.len() * 100) / total.max(1),
    );

    (samples, held_out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_correct_split_sizes() {
        let items: Vec<usize> = (0..100).collect();
        let (kept, held)      = split_holdout(items, 0.2, Some(1));
        assert_eq!(kept.len(), 80);
        assert_eq!(held.len(), 20);
    }

    #[test]
    fn test_all_items_preserved() {
        let items: Vec<usize> = (0..50).collect();
        let (kept, held)      = split_holdout(items, 0.3, None);
        let mut all: Vec<_>   = kept.into_iter().chain(held).collect();
        all.sort();
        assert_eq!(all, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn test_seed_makes_split_reproducible() {
        let a = split_holdout((0..40).collect::<Vec<usize>>(), 0.25, Some(7));
        let b = split_holdout((0..40).collect::<Vec<usize>>(), 0.25, Some(7));
        assert_eq!(a, b);
    }

    #[test]
    fn test_edges() {
        let (kept, held) = split_holdout(Vec::<usize>::new(), 0.5, None);
        assert!(kept.is_empty() && held.is_empty());

        let (kept, held) = split_holdout((0..10).collect::<Vec<usize>>(), 0.0, None);
        assert_eq!((kept.len(), held.len()), (10, 0));

        let (kept, held) = split_holdout((0..10).collect::<Vec<usize>>(), 1.5, None);
        assert_eq!((kept.len(), held.len()), (0, 10));
    }
}
