//! Property-based tests for the differential privacy engine
//!
//! Tests for:
//! - Boundedness: output always inside the clamping bounds
//! - Convergence: the mean of many draws approaches the clamped input

use super::{noise_clamped, Mechanism, PrivacyConfig};
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

fn mechanism() -> impl Strategy<Value = Mechanism> {
    prop_oneof![Just(Mechanism::Laplace), Just(Mechanism::Gaussian)]
}

proptest! {
    /// Property: output never leaves [lower, upper], for any input and any epsilon > 0
    #[test]
    fn prop_output_within_bounds(
        value in -1e12f64..1e12,
        epsilon in 0.001f64..10.0,
        lower in -1000f64..0.0,
        width in 0.5f64..1000.0,
        mechanism in mechanism(),
        seed in any::<u64>(),
    ) {
        let config = PrivacyConfig {
            epsilon,
            lower,
            upper: lower + width,
            mechanism,
            ..Default::default()
        };
        let mut rng = StdRng::seed_from_u64(seed);
        for _ in 0..50 {
            let noised = noise_clamped(&config, value, &mut rng);
            prop_assert!(noised >= config.lower && noised <= config.upper);
        }
    }

    /// Property: far from the bounds, Laplace noise is unbiased
    #[test]
    fn prop_mean_converges_to_input(
        value in 20f64..80.0,
        epsilon in 0.5f64..5.0,
        seed in any::<u64>(),
    ) {
        let config = PrivacyConfig {
            epsilon,
            ..Default::default()
        };
        let mut rng = StdRng::seed_from_u64(seed);
        let n = 5_000;
        let mean = (0..n)
            .map(|_| noise_clamped(&config, value, &mut rng))
            .sum::<f64>() / n as f64;
        prop_assert!((mean - value).abs() < 0.5, "mean {} vs value {}", mean, value);
    }
}
