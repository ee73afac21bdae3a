//! Laplace mechanism
//!
//! Inverse-CDF sampling of Laplace(0, scale) noise for differentially
//! private counts. All released counts have sensitivity 1, so the scale
//! is simply `1 / epsilon`.

use rand::Rng;

/// Draw one sample from Laplace(0, `scale`)
pub fn laplace(rng: &mut impl Rng, scale: f64) -> f64 {
    // u in [-0.5, 0.5); the max() keeps ln() off exact zero
    let u: f64 = rng.gen::<f64>() - 0.5;
    let magnitude = (1.0 - 2.0 * u.abs()).max(f64::MIN_POSITIVE).ln();
    -scale * u.signum() * magnitude
}

/// A count released under epsilon-DP
///
/// Negative noised values clamp to zero; the release is rounded to an
/// integer so callers cannot recover the noise fraction.
pub fn noisy_count(rng: &mut impl Rng, true_count: u64, epsilon: f64) -> u64 {
    let noised = true_count as f64 + laplace(rng, 1.0 / epsilon.max(f64::EPSILON));
    noised.round().max(0.0) as u64
}

/// A non-negative real value released under epsilon-DP
pub fn noisy_value(rng: &mut impl Rng, true_value: f64, epsilon: f64) -> f64 {
    (true_value + laplace(rng, 1.0 / epsilon.max(f64::EPSILON))).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_noise_is_roughly_centered() {
        let mut rng = StdRng::seed_from_u64(7);
        let n = 20_000;
        let sum: f64 = (0..n).map(|_| laplace(&mut rng, 1.0)).sum();
        let mean = sum / n as f64;
        // Laplace(0, 1) has variance 2; the sample mean should sit well
        // inside a tenth of a unit at this sample size.
        assert!(mean.abs() < 0.1, "mean drifted to {mean}");
    }

    #[test]
    fn test_seeded_noise_is_deterministic() {
        let mut a = StdRng::seed_from_u64(42);
        let mut b = StdRng::seed_from_u64(42);
        for _ in 0..100 {
            assert_eq!(laplace(&mut a, 2.0), laplace(&mut b, 2.0));
        }
    }

    #[test]
    fn test_noisy_count_never_goes_negative() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..1_000 {
            let released = noisy_count(&mut rng, 0, 0.25);
            assert!(released < 100, "released {released}");
        }
    }

    #[test]
    fn test_higher_epsilon_means_tighter_noise() {
        let mut rng = StdRng::seed_from_u64(11);
        let spread = |rng: &mut StdRng, eps: f64| -> f64 {
            (0..5_000)
                .map(|_| (noisy_count(rng, 1_000, eps) as f64 - 1_000.0).abs())
                .sum::<f64>()
                / 5_000.0
        };
        let tight = spread(&mut rng, 1.0);
        let loose = spread(&mut rng, 0.25);
        assert!(tight < loose, "expected {tight} < {loose}");
    }
}
