use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Shuffle `0..n` with a fixed seed and cut off `ceil(n * test_fraction)`
/// indices for the test split. Returns `(train, test)`.
///
/// The train split always keeps at least one index when `n > 0`.
pub fn train_test_split(n: usize, test_fraction: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let n_test = ((n as f64) * test_fraction.clamp(0.0, 1.0)).ceil() as usize;
    let n_test = n_test.min(n.saturating_sub(1));
    let test = indices.split_off(n - n_test);
    (indices, test)
}
