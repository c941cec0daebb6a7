//! Q96 fixed-point arithmetic and interest compounding.
//!
//! Every coefficient, price, leverage and growth factor in the pool is an
//! unsigned 256-bit integer scaled by 2^96. Products go through a 512-bit
//! intermediate so `a * b / c` never overflows before the division. All
//! operations round toward zero.

use primitive_types::{U256, U512};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const RESOLUTION: usize = 96;

/// Number of binomial terms (after the leading 1) in [`Fp96::pow_taylor`].
pub const TAYLOR_STEPS: u64 = 3;

/// 365.25 days. per-second rates are annual rates divided by this.
pub const SECONDS_IN_YEAR: u64 = 31_557_600;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MathError {
    #[error("fixed-point overflow")]
    Overflow,

    #[error("fixed-point underflow")]
    Underflow,

    #[error("division by zero")]
    DivisionByZero,

    #[error("growth rate must be below 100% per step")]
    RateTooHigh,

    #[error("negative value where unsigned expected")]
    Negative,
}

pub fn q96() -> U256 {
    U256::one() << RESOLUTION
}

/// `a * b / denominator` with a 512-bit intermediate product.
pub fn mul_div(a: U256, b: U256, denominator: U256) -> Result<U256, MathError> {
    if denominator.is_zero() {
        return Err(MathError::DivisionByZero);
    }
    let quotient = a.full_mul(b) / U512::from(denominator);
    narrow(quotient)
}

/// `a * b / denominator`, rounded up.
pub fn mul_div_up(a: U256, b: U256, denominator: U256) -> Result<U256, MathError> {
    if denominator.is_zero() {
        return Err(MathError::DivisionByZero);
    }
    let product = a.full_mul(b);
    let den = U512::from(denominator);
    let mut quotient = product / den;
    if !(product % den).is_zero() {
        quotient += U512::one();
    }
    narrow(quotient)
}

/// `amount * fraction`, rounded down, exact for any decimal fraction.
pub fn mul_fraction(amount: u128, fraction: Decimal) -> Result<u128, MathError> {
    if fraction.is_sign_negative() && !fraction.is_zero() {
        return Err(MathError::Negative);
    }
    let mantissa = U256::from(fraction.mantissa().unsigned_abs());
    let scale = U256::from(10u64).pow(U256::from(fraction.scale()));
    to_u128(mul_div(U256::from(amount), mantissa, scale)?)
}

fn narrow(value: U512) -> Result<U256, MathError> {
    let limbs = value.0;
    if limbs[4..].iter().any(|limb| *limb != 0) {
        return Err(MathError::Overflow);
    }
    Ok(U256([limbs[0], limbs[1], limbs[2], limbs[3]]))
}

pub fn to_u128(value: U256) -> Result<u128, MathError> {
    if value > U256::from(u128::MAX) {
        return Err(MathError::Overflow);
    }
    Ok(value.low_u128())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Fp96(U256);

impl Fp96 {
    pub fn zero() -> Self {
        Self(U256::zero())
    }

    pub fn one() -> Self {
        Self(q96())
    }

    /// Stands in for an unbounded value (leverage of a position with no equity).
    pub fn max_value() -> Self {
        Self(U256::MAX)
    }

    pub fn from_inner(inner: U256) -> Self {
        Self(inner)
    }

    pub fn inner(&self) -> U256 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn from_int(value: u128) -> Self {
        Self(U256::from(value) << RESOLUTION)
    }

    pub fn from_ratio(numerator: u128, denominator: u128) -> Result<Self, MathError> {
        Self::from_ratio_wide(U256::from(numerator), U256::from(denominator))
    }

    pub fn from_ratio_wide(numerator: U256, denominator: U256) -> Result<Self, MathError> {
        mul_div(numerator, q96(), denominator).map(Self)
    }

    /// Exact conversion of a non-negative decimal (up to Q96 resolution).
    pub fn from_decimal(value: Decimal) -> Result<Self, MathError> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(MathError::Negative);
        }
        let mantissa = U256::from(value.mantissa().unsigned_abs());
        let scale = U256::from(10u64).pow(U256::from(value.scale()));
        mul_div(mantissa, q96(), scale).map(Self)
    }

    /// Lossy conversion for reporting, rounded to 18 places. Saturates at `Decimal::MAX`.
    pub fn to_decimal(&self) -> Decimal {
        let integer = self.0 >> RESOLUTION;
        let fraction = self.0 - (integer << RESOLUTION);
        // nearest at 18 places so 0.95 does not print as 0.949999...
        let half = U256::one() << (RESOLUTION - 1);
        let fraction_e18 = (fraction * U256::from(10u64.pow(18)) + half) >> RESOLUTION;
        if integer > U256::from(u64::MAX) {
            return Decimal::MAX;
        }
        let scaled = integer.low_u128() as i128 * 1_000_000_000_000_000_000i128
            + fraction_e18.low_u128() as i128;
        Decimal::try_from_i128_with_scale(scaled, 18).unwrap_or(Decimal::MAX)
    }

    pub fn add(self, other: Fp96) -> Result<Self, MathError> {
        self.0.checked_add(other.0).map(Self).ok_or(MathError::Overflow)
    }

    pub fn sub(self, other: Fp96) -> Result<Self, MathError> {
        self.0.checked_sub(other.0).map(Self).ok_or(MathError::Underflow)
    }

    pub fn saturating_sub(self, other: Fp96) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    pub fn mul(self, other: Fp96) -> Result<Self, MathError> {
        mul_div(self.0, other.0, q96()).map(Self)
    }

    pub fn div(self, other: Fp96) -> Result<Self, MathError> {
        mul_div(self.0, q96(), other.0).map(Self)
    }

    /// `self * amount`, rounded down.
    pub fn mul_amount(self, amount: u128) -> Result<u128, MathError> {
        to_u128(mul_div(self.0, U256::from(amount), q96())?)
    }

    pub fn mul_amount_up(self, amount: u128) -> Result<u128, MathError> {
        to_u128(mul_div_up(self.0, U256::from(amount), q96())?)
    }

    /// `amount / self`, rounded down.
    pub fn recip_mul(self, amount: u128) -> Result<u128, MathError> {
        to_u128(mul_div(U256::from(amount), q96(), self.0)?)
    }

    /// `amount / self`, rounded up.
    pub fn recip_mul_up(self, amount: u128) -> Result<u128, MathError> {
        to_u128(mul_div_up(U256::from(amount), q96(), self.0)?)
    }

    /// Exact integer power by repeated squaring.
    pub fn pow(self, mut exponent: u64) -> Result<Self, MathError> {
        let mut result = Self::one();
        let mut base = self;
        while exponent != 0 {
            if exponent & 1 == 1 {
                result = result.mul(base)?;
            }
            exponent >>= 1;
            if exponent != 0 {
                base = base.mul(base)?;
            }
        }
        Ok(result)
    }

    /// `(1 + x)^n` truncated after the cubic binomial term.
    ///
    /// `self` is the per-step growth factor `1 + x`. The series is
    /// `1 + n·x + n(n-1)/2·x² + n(n-1)(n-2)/6·x³`; each term is derived from
    /// the previous one so no factorials or large powers are formed. For the
    /// per-second rates this pool uses (`x` around 1e-9) and elapsed times up
    /// to a year, the omitted quartic term is below 1e-7 relative, and the
    /// truncation always underestimates `pow`.
    ///
    /// Fails with [`MathError::RateTooHigh`] when `x >= 1`, where the series
    /// stops converging. Returns exactly one when `n == 0`.
    pub fn pow_taylor(self, exponent: u64) -> Result<Self, MathError> {
        let q = q96();
        let x = self.0.checked_sub(q).ok_or(MathError::Underflow)?;
        if x >= q {
            return Err(MathError::RateTooHigh);
        }

        let mut result = q;
        let mut term = q;
        let steps = exponent.min(TAYLOR_STEPS);
        for i in 0..steps {
            let multiplier = U256::from(exponent - i)
                .checked_mul(x)
                .ok_or(MathError::Overflow)?
                / U256::from(i + 1);
            term = mul_div(term, multiplier, q)?;
            result = result.checked_add(term).ok_or(MathError::Overflow)?;
        }
        Ok(Self(result))
    }
}

impl fmt::Display for Fp96 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_decimal().normalize())
    }
}
