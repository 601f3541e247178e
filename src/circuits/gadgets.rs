//! Arithmetic gadgets over `FpVar`
//!
//! Field subtraction and division wrap silently, so every subtraction and
//! division in the circuits goes through a gadget here that pins the result
//! to a small integer range:
//!
//! - `enforce_bits`: x < 2^n via an explicit bit decomposition
//! - `safe_sub`: a - b with a proof that no underflow happened
//! - `safe_div`: quotient and remainder with r < d, which also forces d ≠ 0
//! - `is_le`, `is_nonzero`: comparison results as booleans

use ark_ff::{BigInteger, One, PrimeField, Zero};
use ark_r1cs_std::prelude::*;
use ark_r1cs_std::fields::fp::FpVar;
use ark_relations::r1cs::SynthesisError;

/// Integer value of a field element below 2^128.
fn to_u128<F: PrimeField>(value: F) -> u128 {
    let bigint = value.into_bigint();
    let limbs = bigint.as_ref();
    limbs[0] as u128 | ((limbs.get(1).copied().unwrap_or(0) as u128) << 64)
}

fn from_u128<F: PrimeField>(value: u128) -> F {
    F::from(value)
}

/// Constrain `x < 2^n`, returning its little-endian bits.
pub fn enforce_bits<F: PrimeField>(x: &FpVar<F>, n: usize) -> Result<Vec<Boolean<F>>, SynthesisError> {
    debug_assert!(n < F::MODULUS_BIT_SIZE as usize - 1);
    if x.is_constant() {
        let value = x.value()?.into_bigint();
        if value.num_bits() as usize > n {
            return Err(SynthesisError::Unsatisfiable);
        }
        return Ok((0..n).map(|i| Boolean::constant(value.get_bit(i))).collect());
    }

    let cs = x.cs();
    let mut bits = Vec::with_capacity(n);
    let mut acc = FpVar::zero();
    let mut coeff = F::one();
    for i in 0..n {
        let bit = Boolean::new_witness(cs.clone(), || x.value().map(|v| v.into_bigint().get_bit(i)))?;
        acc += FpVar::from(bit.clone()) * coeff;
        coeff = coeff + coeff;
        bits.push(bit);
    }
    acc.enforce_equal(x)?;
    Ok(bits)
}

/// Constrain `lo <= x <= hi` for constant bounds, with `hi - lo < 2^n`.
pub fn enforce_in_range<F: PrimeField>(x: &FpVar<F>, lo: u64, hi: u64, n: usize) -> Result<(), SynthesisError> {
    enforce_bits(&(x - F::from(lo)), n)?;
    enforce_bits(&(FpVar::constant(F::from(hi)) - x), n)?;
    Ok(())
}

/// `a - b`, constrained to be a non-negative integer below 2^n.
pub fn safe_sub<F: PrimeField>(a: &FpVar<F>, b: &FpVar<F>, n: usize) -> Result<FpVar<F>, SynthesisError> {
    let diff = a - b;
    enforce_bits(&diff, n)?;
    Ok(diff)
}

/// Integer division `a = q·d + r` with `0 <= r < d`.
///
/// `d - r - 1` is range checked, so a zero divisor is unsatisfiable.
pub fn safe_div<F: PrimeField>(
    a: &FpVar<F>,
    d: &FpVar<F>,
    n: usize,
) -> Result<(FpVar<F>, FpVar<F>), SynthesisError> {
    let cs = a.cs().or(d.cs());
    let (q, r) = if cs.is_none() {
        let (a, d) = (to_u128(a.value()?), to_u128(d.value()?));
        if d == 0 {
            return Err(SynthesisError::DivisionByZero);
        }
        (FpVar::constant(from_u128(a / d)), FpVar::constant(from_u128(a % d)))
    } else {
        let divide = || -> Result<(u128, u128), SynthesisError> {
            let (a, d) = (to_u128(a.value()?), to_u128(d.value()?));
            Ok(if d == 0 { (0, a) } else { (a / d, a % d) })
        };
        (
            FpVar::new_witness(cs.clone(), || divide().map(|(q, _)| from_u128::<F>(q)))?,
            FpVar::new_witness(cs.clone(), || divide().map(|(_, r)| from_u128::<F>(r)))?,
        )
    };
    enforce_bits(&q, n)?;
    enforce_bits(&r, n)?;
    (&q * d + &r).enforce_equal(a)?;
    safe_sub(&(d - &r), &FpVar::one(), n)?;
    Ok((q, r))
}

/// `a <= b`, for operands already known to be below 2^n.
pub fn is_le<F: PrimeField>(a: &FpVar<F>, b: &FpVar<F>, n: usize) -> Result<Boolean<F>, SynthesisError> {
    let shifted = b - a + F::from(2u64).pow([n as u64]);
    let bits = enforce_bits(&shifted, n + 1)?;
    Ok(bits[n].clone())
}

/// `x != 0` as a boolean.
pub fn is_nonzero<F: PrimeField>(x: &FpVar<F>) -> Result<Boolean<F>, SynthesisError> {
    if x.is_constant() {
        return Ok(Boolean::constant(!x.value()?.is_zero()));
    }
    let cs = x.cs();
    let flag = Boolean::new_witness(cs.clone(), || x.value().map(|v| !v.is_zero()))?;
    let inverse = FpVar::new_witness(cs, || {
        x.value().map(|v| v.inverse().unwrap_or_else(F::zero))
    })?;
    let flag_fp = FpVar::from(flag.clone());
    // x · x⁻¹ = flag, and x · (1 - flag) = 0
    x.mul_equals(&inverse, &flag_fp)?;
    x.mul_equals(&(FpVar::one() - &flag_fp), &FpVar::zero())?;
    Ok(flag)
}

/// Sum of booleans as a field element.
pub fn count<F: PrimeField>(flags: &[Boolean<F>]) -> FpVar<F> {
    flags
        .iter()
        .fold(FpVar::zero(), |acc, b| acc + FpVar::from(b.clone()))
}
