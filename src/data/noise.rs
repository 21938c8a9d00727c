// ============================================================
// Layer 4 — Noise Augmenter
// ============================================================
// Produces a corrupted view of a clean sentence for the
// adversarial autoencoder:
//
//   clean:   [the, cat, sat, on, the, mat, .]
//   noised:  [cat, the, sat, the, on, mat, .]
//
// Steps:
//   1. Split off the final token (end-of-sentence marker).
//      It is never dropped and never moved.
//   2. Drop each body token independently with probability
//      `drop_probability` (one uniform draw per original token).
//   3. Reorder the survivors by the key
//        position + uniform(0, max_shuffle_distance + 1)
//      with a stable ascending sort, where `position` is the
//      survivor's index after dropping. No token ends up more
//      than `max_shuffle_distance` places from where it started.
//   4. Re-attach the final token.
//
// Reference: Lample et al. (2018) Unsupervised Machine
//            Translation Using Monolingual Corpora Only

use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoiseAugmenter {
    pub drop_probability:     f64,
    pub max_shuffle_distance: usize,
}

impl Default for NoiseAugmenter {
    fn default() -> Self {
        Self { drop_probability: 0.1, max_shuffle_distance: 3 }
    }
}

impl NoiseAugmenter {
    pub fn new(drop_probability: f64, max_shuffle_distance: usize) -> Self {
        Self { drop_probability, max_shuffle_distance }
    }

    /// Perturb one tokenised sentence. Pure apart from `rng`.
    pub fn perturb<T: Clone, R: Rng>(&self, tokens: &[T], rng: &mut R) -> Vec<T> {
        let Some((tail, body)) = tokens.split_last() else {
            return Vec::new();
        };

        let kept: Vec<&T> = body
            .iter()
            .filter(|_| rng.gen::<f64>() >= self.drop_probability)
            .collect();

        let spread = (self.max_shuffle_distance + 1) as f64;
        let mut keyed: Vec<(f64, &T)> = kept
            .into_iter()
            .enumerate()
            .map(|(pos, tok)| (pos as f64 + spread * rng.gen::<f64>(), tok))
            .collect();
        keyed.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut out: Vec<T> = keyed.into_iter().map(|(_, t)| t.clone()).collect();
        out.push(tail.clone());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    fn words(n: usize) -> Vec<String> {
        let mut v: Vec<String> = (0..n).map(|i| format!("w{i}")).collect();
        v.push(".".to_string());
        v
    }

    #[test]
    fn test_tail_is_never_touched() {
        let mut rng = StdRng::seed_from_u64(7);
        let noise   = NoiseAugmenter::new(0.5, 4);
        for _ in 0..200 {
            let out = noise.perturb(&words(12), &mut rng);
            assert_eq!(out.last().map(String::as_str), Some("."));
            assert!(out.len() <= 13);
        }
    }

    #[test]
    fn test_no_drop_is_a_permutation() {
        let mut rng  = StdRng::seed_from_u64(11);
        let noise    = NoiseAugmenter::new(0.0, 3);
        let input    = words(15);
        let out      = noise.perturb(&input, &mut rng);
        let mut a    = out.clone();
        let mut b    = input.clone();
        a.sort();
        b.sort();
        assert_eq!(a, b);
        assert_eq!(out.last(), input.last());
    }

    #[test]
    fn test_displacement_is_bounded() {
        let mut rng = StdRng::seed_from_u64(3);
        let noise   = NoiseAugmenter::new(0.0, 2);
        let input: Vec<usize> = (0..30).collect();
        for _ in 0..100 {
            let out = noise.perturb(&input, &mut rng);
            for (pos, &orig) in out.iter().enumerate() {
                assert!((pos as i64 - orig as i64).abs() <= 2);
            }
        }
    }

    #[test]
    fn test_zero_distance_keeps_order() {
        let mut rng = StdRng::seed_from_u64(5);
        let noise   = NoiseAugmenter::new(0.0, 0);
        let input   = words(10);
        assert_eq!(noise.perturb(&input, &mut rng), input);
    }

    #[test]
    fn test_full_drop_leaves_only_the_tail() {
        let mut rng = StdRng::seed_from_u64(1);
        let noise   = NoiseAugmenter::new(1.0, 3);
        assert_eq!(noise.perturb(&words(6), &mut rng), vec![".".to_string()]);
    }

    #[test]
    fn test_short_inputs() {
        let mut rng = StdRng::seed_from_u64(1);
        let noise   = NoiseAugmenter::default();
        assert!(noise.perturb::<String, _>(&[], &mut rng).is_empty());
        assert_eq!(noise.perturb(&["x"], &mut rng), vec!["x"]);
    }
}
