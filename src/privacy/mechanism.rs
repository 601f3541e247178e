//! Noise mechanisms.

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Noise distribution used to protect a released scalar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mechanism {
    Laplace,
    Gaussian,
}

impl Mechanism {
    pub fn name(&self) -> &'static str {
        match self {
            Mechanism::Laplace => "laplace",
            Mechanism::Gaussian => "gaussian",
        }
    }
}

/// Draw Laplace noise with the given scale.
///
/// `noise = -scale * sign(u) * ln(1 - 2|u|)` with `u` uniform on (-0.5, 0.5).
pub fn laplace_noise<R: Rng + ?Sized>(scale: f64, rng: &mut R) -> f64 {
    let u = open_uniform(rng);
    -scale * u.signum() * (1.0 - 2.0 * u.abs()).ln()
}

/// Draw Gaussian noise calibrated for (epsilon, delta).
///
/// Box-Muller standard normal scaled by `sqrt(2 ln(1.25/delta)) * sensitivity / epsilon`.
pub fn gaussian_noise<R: Rng + ?Sized>(
    epsilon: f64,
    delta: f64,
    sensitivity: f64,
    rng: &mut R,
) -> f64 {
    let sigma = (2.0 * (1.25 / delta).ln()).sqrt() * sensitivity / epsilon;
    // u1 in (0, 1] keeps ln finite.
    let u1: f64 = 1.0 - rng.gen::<f64>();
    let u2: f64 = rng.gen::<f64>();
    let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
    z * sigma
}

/// Uniform sample strictly inside (-0.5, 0.5).
fn open_uniform<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    loop {
        let u: f64 = rng.gen::<f64>() - 0.5;
        if u > -0.5 && u < 0.5 {
            return u;
        }
    }
}
