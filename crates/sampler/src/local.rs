//! Local numeric sampling for expressions the engine cannot sample reliably.

use fpbench_core::Sample;

/// Draws `n` doubles uniformly over their bit representation, skipping NaNs.
pub fn sample_repr(rng: &mut fastrand::Rng, n: usize) -> Vec<f64> {
    (0..n)
        .map(|_| loop {
            let value = f64::from_bits(rng.u64(..));
            if !value.is_nan() {
                break value;
            }
        })
        .collect()
}

/// `argc` independent sequences of `n` points. Local samples carry no
/// ground truth.
pub fn sample_local(argc: usize, n: usize, seed: Option<u64>) -> Sample {
    let mut rng = seed.map(fastrand::Rng::with_seed).unwrap_or_default();
    let points = (0..argc).map(|_| sample_repr(&mut rng, n)).collect();
    Sample::new(points, Vec::new())
}

/// Mixes a run seed with an expression key so every expression gets its
/// own reproducible stream regardless of batch position.
pub fn derive_seed(seed: u64, key: &str) -> u64 {
    const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;
    key.bytes()
        .fold(seed ^ 0xcbf2_9ce4_8422_2325, |hash, byte| {
            (hash ^ byte as u64).wrapping_mul(FNV_PRIME)
        })
}
