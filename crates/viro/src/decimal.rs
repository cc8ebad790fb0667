//! Arbitrary-precision decimal arithmetic.
//!
//! A [`Decimal`] is a `BigInt` mantissa and a base-10 scale: the value is
//! `mantissa / 10^scale`. All results are normalized (no trailing zero
//! digits in the fractional part), so equality of normalized forms is
//! mantissa + scale equality. Division rounds half-away-from-zero at
//! [`DIV_EXTRA_SCALE`] extra fractional digits before normalizing.

use std::{cmp::Ordering, fmt};

use num_bigint::BigInt;
use num_integer::Integer;
use num_traits::{Pow as _, Signed, Zero};

/// Extra fractional digits carried by division before normalization.
const DIV_EXTRA_SCALE: u32 = 20;

/// An arbitrary-precision decimal number.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Decimal {
    mantissa: BigInt,
    scale: u32,
}

impl Decimal {
    /// Builds a decimal from a raw mantissa and scale, normalizing.
    pub fn new(mantissa: BigInt, scale: u32) -> Self {
        let mut d = Self { mantissa, scale };
        d.normalize();
        d
    }

    pub fn from_int(value: i64) -> Self {
        Self {
            mantissa: BigInt::from(value),
            scale: 0,
        }
    }

    /// Parses decimal literal text: optional sign, digits, `.`, digits.
    pub fn parse(text: &str) -> Option<Self> {
        let (sign, digits) = match text.strip_prefix('-') {
            Some(rest) => (-1, rest),
            None => (1, text.strip_prefix('+').unwrap_or(text)),
        };
        let (int_part, frac_part) = digits.split_once('.')?;
        if int_part.is_empty() && frac_part.is_empty() {
            return None;
        }
        if !int_part.chars().all(|c| c.is_ascii_digit()) || !frac_part.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        let combined = format!("{int_part}{frac_part}");
        let mantissa: BigInt = combined.parse().ok()?;
        let scale = u32::try_from(frac_part.len()).ok()?;
        Some(Self::new(mantissa * sign, scale))
    }

    pub fn is_zero(&self) -> bool {
        self.mantissa.is_zero()
    }

    fn normalize(&mut self) {
        let ten = BigInt::from(10);
        while self.scale > 0 && (&self.mantissa % &ten).is_zero() {
            self.mantissa /= &ten;
            self.scale -= 1;
        }
    }

    /// Returns the mantissa scaled up to `scale` fractional digits.
    fn mantissa_at_scale(&self, scale: u32) -> BigInt {
        debug_assert!(scale >= self.scale);
        &self.mantissa * BigInt::from(10).pow(scale - self.scale)
    }

    pub fn add(&self, other: &Self) -> Self {
        let scale = self.scale.max(other.scale);
        Self::new(self.mantissa_at_scale(scale) + other.mantissa_at_scale(scale), scale)
    }

    pub fn sub(&self, other: &Self) -> Self {
        let scale = self.scale.max(other.scale);
        Self::new(self.mantissa_at_scale(scale) - other.mantissa_at_scale(scale), scale)
    }

    pub fn mul(&self, other: &Self) -> Self {
        Self::new(&self.mantissa * &other.mantissa, self.scale + other.scale)
    }

    /// Divides, returning `None` when `other` is zero.
    pub fn div(&self, other: &Self) -> Option<Self> {
        if other.is_zero() {
            return None;
        }
        // Scale the dividend so the quotient carries DIV_EXTRA_SCALE extra
        // fractional digits, then round half-away-from-zero.
        let result_scale = self.scale.max(other.scale) + DIV_EXTRA_SCALE;
        let shift = result_scale + other.scale - self.scale;
        let scaled = &self.mantissa * BigInt::from(10).pow(shift);
        let (mut quotient, remainder) = scaled.div_rem(&other.mantissa);
        if remainder.abs() * 2 >= other.mantissa.abs() {
            // div_rem truncates toward zero; nudge away from zero on a
            // half-or-more remainder, in the direction of the true quotient.
            if scaled.sign() == other.mantissa.sign() {
                quotient += 1;
            } else {
                quotient -= 1;
            }
        }
        Some(Self::new(quotient, result_scale))
    }

    pub fn compare(&self, other: &Self) -> Ordering {
        let scale = self.scale.max(other.scale);
        self.mantissa_at_scale(scale).cmp(&other.mantissa_at_scale(scale))
    }
}

impl PartialEq for Decimal {
    fn eq(&self, other: &Self) -> bool {
        self.compare(other) == Ordering::Equal
    }
}

impl Eq for Decimal {}

impl PartialOrd for Decimal {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.compare(other))
    }
}

impl Ord for Decimal {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare(other)
    }
}

impl fmt::Display for Decimal {
    /// Writes the literal form. A whole-valued decimal keeps one fractional
    /// digit (`1.0`) so the text round-trips to a decimal, not an integer.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.mantissa.is_negative() {
            write!(f, "-")?;
        }
        let digits = self.mantissa.abs().to_string();
        let scale = self.scale as usize;
        if scale == 0 {
            return write!(f, "{digits}.0");
        }
        if digits.len() > scale {
            let (int_part, frac_part) = digits.split_at(digits.len() - scale);
            write!(f, "{int_part}.{frac_part}")
        } else {
            write!(f, "0.{zeros}{digits}", zeros = "0".repeat(scale - digits.len()))
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn dec(text: &str) -> Decimal {
        Decimal::parse(text).expect("valid decimal literal")
    }

    /// Parsing and display round-trip for representative literals.
    #[test]
    fn parse_display_round_trip() {
        assert_eq!(dec("12.5").to_string(), "12.5");
        assert_eq!(dec("-0.75").to_string(), "-0.75");
        assert_eq!(dec("1.0").to_string(), "1.0");
        assert_eq!(dec("0.001").to_string(), "0.001");
    }

    /// Normalization strips trailing fractional zeros: 1.50 equals 1.5.
    #[test]
    fn normalized_equality() {
        assert_eq!(dec("1.50"), dec("1.5"));
        assert_eq!(dec("2.0"), Decimal::from_int(2));
    }

    /// Addition aligns scales.
    #[test]
    fn add_aligns_scales() {
        assert_eq!(dec("0.1").add(&dec("0.02")).to_string(), "0.12");
        assert_eq!(dec("1.5").add(&Decimal::from_int(2)).to_string(), "3.5");
    }

    /// Multiplication sums scales and renormalizes.
    #[test]
    fn mul_and_normalize() {
        assert_eq!(dec("0.5").mul(&dec("4.0")).to_string(), "2.0");
        assert_eq!(dec("1.5").mul(&dec("1.5")).to_string(), "2.25");
    }

    /// Division is exact when the quotient terminates, rounded otherwise.
    #[test]
    fn div_exact_and_rounded() {
        assert_eq!(dec("1.0").div(&Decimal::from_int(4)).unwrap().to_string(), "0.25");
        let third = Decimal::from_int(1).div(&Decimal::from_int(3)).unwrap();
        assert_eq!(third.to_string(), "0.33333333333333333333");
        assert!(Decimal::from_int(1).div(&Decimal::from_int(0)).is_none());
    }

    /// Comparison is numeric, not textual.
    #[test]
    fn ordering() {
        assert!(dec("0.5") < dec("0.75"));
        assert!(dec("-1.5") < Decimal::from_int(0));
        assert_eq!(Decimal::from_int(1).compare(&dec("1.0")), Ordering::Equal);
    }
}
