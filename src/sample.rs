//! Proportional reviewer sampling.
//!
//! Given the candidate pool for a pull request, this picks roughly
//! `proportion` of it at random. The expected size is `n * proportion`; the
//! fractional part is resolved by adding a uniform `[0, 1)` term before
//! truncating, so `n * proportion = 2.4` yields 3 reviewers 40% of the time
//! instead of always rounding down.

use rand::Rng;
use rand::seq::SliceRandom;

/// Chooses a random subset of `candidates` using the thread-local RNG.
///
/// See [`sample_with`].
pub fn sample(candidates: &[String], proportion: f64) -> Vec<String> {
    sample_with(&mut rand::thread_rng(), candidates, proportion)
}

/// Chooses a random subset of `candidates` with the given RNG.
///
/// Returns nothing when `candidates` is empty or `proportion` is not
/// positive. Otherwise at least one and at most `candidates.len()` distinct
/// entries are returned. The input slice is never reordered.
pub fn sample_with<R: Rng + ?Sized>(
    rng: &mut R,
    candidates: &[String],
    proportion: f64,
) -> Vec<String> {
    if candidates.is_empty() || proportion.is_nan() || proportion <= 0.0 {
        return Vec::new();
    }

    let n = candidates.len();
    // `as usize` saturates, which covers infinite and very large proportions.
    let k = (n as f64 * proportion + rng.r#gen::<f64>()) as usize;
    let k = k.clamp(1, n);

    let mut chosen = candidates.to_vec();
    chosen.shuffle(rng);
    chosen.truncate(k);
    chosen
}
