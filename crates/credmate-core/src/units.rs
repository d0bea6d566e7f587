//! # Credit Units
//!
//! Fixed-point quantities for compliance arithmetic.
//!
//! - [`CreditHours`] counts hundredths of a credit hour. Boards award credit
//!   in quarter- or half-hour increments, so two decimal places is exact for
//!   every real certificate.
//! - [`Weight`] is an equivalence factor in basis points (`10000` = 1.0),
//!   used when a jurisdiction counts one credit type at a discount.
//!
//! Both serialize as decimal strings (`"12.50"`, `"0.5"`) and accept either
//! strings or JSON/YAML numbers on input. Amounts are unsigned: a shortfall
//! is computed with saturating subtraction and can never go negative.

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ValidationError;

const HUNDREDTHS_PER_HOUR: u64 = 100;
const BASIS_POINTS_PER_UNIT: u64 = 10_000;

/// Parse a non-negative decimal string into an integer scaled by
/// `10^max_places`. Rejects signs, exponents and excess precision.
fn parse_scaled(s: &str, max_places: u32) -> Result<u64, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty value".into());
    }
    let (whole, frac) = match s.split_once('.') {
        Some((w, f)) => (w, f),
        None => (s, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return Err("no digits".into());
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit()) {
        return Err("expected a non-negative decimal number".into());
    }
    let frac_trimmed = frac.trim_end_matches('0');
    if frac_trimmed.len() > max_places as usize {
        return Err(format!("at most {max_places} decimal places are allowed"));
    }
    let scale = 10u64.pow(max_places);
    let whole_value: u64 = if whole.is_empty() {
        0
    } else {
        whole.parse().map_err(|_| "value too large".to_string())?
    };
    let mut frac_value: u64 = 0;
    for (i, c) in frac_trimmed.chars().enumerate() {
        let digit = u64::from(c as u8 - b'0');
        frac_value += digit * 10u64.pow(max_places - 1 - i as u32);
    }
    whole_value
        .checked_mul(scale)
        .and_then(|v| v.checked_add(frac_value))
        .ok_or_else(|| "value too large".to_string())
}

// ---------------------------------------------------------------------------
// CreditHours
// ---------------------------------------------------------------------------

/// A non-negative quantity of credit hours with two decimal places.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct CreditHours(u64);

impl CreditHours {
    /// Zero hours.
    pub const ZERO: Self = Self(0);

    /// Construct from a count of hundredths of an hour.
    pub const fn from_hundredths(hundredths: u64) -> Self {
        Self(hundredths)
    }

    /// Construct from whole hours.
    pub const fn from_whole(hours: u64) -> Self {
        Self(hours * HUNDREDTHS_PER_HOUR)
    }

    /// Parse a decimal string such as `"1.25"` or `"40"`.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidCreditHours`] for negative values,
    /// non-numeric input, or more than two decimal places.
    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        parse_scaled(value, 2)
            .map(Self)
            .map_err(|reason| ValidationError::InvalidCreditHours {
                value: value.to_string(),
                reason,
            })
    }

    /// The amount in hundredths of an hour.
    pub const fn hundredths(self) -> u64 {
        self.0
    }

    /// Whether the amount is zero.
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Saturating addition.
    pub const fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    /// Subtraction floored at zero.
    pub const fn saturating_sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    /// Apply an equivalence weight, rounding down to the hundredth.
    ///
    /// Rounding down means a discounted credit type can never round up into
    /// more credit than the certificate supports.
    pub fn weighted(self, weight: Weight) -> Self {
        let product = u128::from(self.0) * u128::from(weight.basis_points());
        let scaled = product / u128::from(BASIS_POINTS_PER_UNIT);
        Self(u64::try_from(scaled).unwrap_or(u64::MAX))
    }

    /// Scale by `numerator / denominator` and round UP to a whole hour.
    ///
    /// Used for partial-cycle proration: `ceil(total × remaining / length)`.
    /// A zero denominator yields the amount unchanged.
    pub fn prorate_ceil_whole(self, numerator: u32, denominator: u32) -> Self {
        if denominator == 0 {
            return self;
        }
        let scaled = u128::from(self.0) * u128::from(numerator);
        let divisor = u128::from(denominator) * u128::from(HUNDREDTHS_PER_HOUR);
        let whole_hours = scaled.div_ceil(divisor);
        let hundredths = whole_hours * u128::from(HUNDREDTHS_PER_HOUR);
        Self(u64::try_from(hundredths).unwrap_or(u64::MAX))
    }
}

impl std::fmt::Display for CreditHours {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}.{:02}",
            self.0 / HUNDREDTHS_PER_HOUR,
            self.0 % HUNDREDTHS_PER_HOUR
        )
    }
}

impl std::ops::Add for CreditHours {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        self.saturating_add(rhs)
    }
}

impl std::ops::AddAssign for CreditHours {
    fn add_assign(&mut self, rhs: Self) {
        *self = self.saturating_add(rhs);
    }
}

impl std::iter::Sum for CreditHours {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, |acc, h| acc + h)
    }
}

impl Serialize for CreditHours {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

struct CreditHoursVisitor;

impl<'de> Visitor<'de> for CreditHoursVisitor {
    type Value = CreditHours;

    fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("a non-negative decimal amount of credit hours")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<CreditHours, E> {
        CreditHours::parse(v).map_err(E::custom)
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<CreditHours, E> {
        v.checked_mul(HUNDREDTHS_PER_HOUR)
            .map(CreditHours)
            .ok_or_else(|| E::custom("credit hours out of range"))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<CreditHours, E> {
        u64::try_from(v)
            .map_err(|_| E::custom("credit hours must not be negative"))
            .and_then(|u| self.visit_u64(u))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<CreditHours, E> {
        // Numbers from YAML/JSON go through their shortest decimal form so
        // 0.1 parses as exactly ten hundredths.
        CreditHours::parse(&v.to_string()).map_err(E::custom)
    }
}

impl<'de> Deserialize<'de> for CreditHours {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(CreditHoursVisitor)
    }
}

// ---------------------------------------------------------------------------
// Weight
// ---------------------------------------------------------------------------

/// An equivalence weight in basis points. `Weight::ONE` counts credit at
/// face value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Weight(u32);

impl Weight {
    /// Face value (1.0).
    pub const ONE: Self = Self(10_000);

    /// Construct from basis points.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidWeight`] for zero or for weights
    /// above 10.0, which no board uses and would indicate a data-entry error.
    pub fn from_basis_points(bp: u32) -> Result<Self, ValidationError> {
        if bp == 0 || bp > 100_000 {
            return Err(ValidationError::InvalidWeight {
                value: bp.to_string(),
                reason: "weight must be in (0, 10] (1..=100000 basis points)".into(),
            });
        }
        Ok(Self(bp))
    }

    /// Parse a decimal weight such as `"0.5"` or `"1"`.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidWeight`] if unparseable, more
    /// precise than four decimal places, or out of range.
    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        let bp = parse_scaled(value, 4).map_err(|reason| ValidationError::InvalidWeight {
            value: value.to_string(),
            reason,
        })?;
        let bp = u32::try_from(bp).map_err(|_| ValidationError::InvalidWeight {
            value: value.to_string(),
            reason: "value too large".into(),
        })?;
        Self::from_basis_points(bp)
    }

    /// The weight in basis points.
    pub const fn basis_points(self) -> u32 {
        self.0
    }
}

impl Default for Weight {
    fn default() -> Self {
        Self::ONE
    }
}

impl std::fmt::Display for Weight {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let whole = self.0 / 10_000;
        let frac = self.0 % 10_000;
        if frac == 0 {
            write!(f, "{whole}")
        } else {
            let digits = format!("{frac:04}");
            write!(f, "{whole}.{}", digits.trim_end_matches('0'))
        }
    }
}

impl Serialize for Weight {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

struct WeightVisitor;

impl<'de> Visitor<'de> for WeightVisitor {
    type Value = Weight;

    fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("a positive decimal weight")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Weight, E> {
        Weight::parse(v).map_err(E::custom)
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Weight, E> {
        Weight::parse(&v.to_string()).map_err(E::custom)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Weight, E> {
        Weight::parse(&v.to_string()).map_err(E::custom)
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Weight, E> {
        Weight::parse(&v.to_string()).map_err(E::custom)
    }
}

impl<'de> Deserialize<'de> for Weight {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(WeightVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parse_and_display_hours() {
        assert_eq!(CreditHours::parse("1.25").unwrap().hundredths(), 125);
        assert_eq!(CreditHours::parse("40").unwrap(), CreditHours::from_whole(40));
        assert_eq!(CreditHours::parse(".5").unwrap().hundredths(), 50);
        assert_eq!(CreditHours::from_hundredths(1850).to_string(), "18.50");
        assert_eq!(CreditHours::from_whole(18).to_string(), "18.00");
    }

    #[test]
    fn parse_rejects_bad_hours() {
        assert!(CreditHours::parse("-1").is_err());
        assert!(CreditHours::parse("1.255").is_err());
        assert!(CreditHours::parse("abc").is_err());
        assert!(CreditHours::parse(".").is_err());
        assert!(CreditHours::parse("").is_err());
    }

    #[test]
    fn trailing_zero_precision_is_accepted() {
        assert_eq!(CreditHours::parse("2.500").unwrap().hundredths(), 250);
    }

    #[test]
    fn hours_deserialize_from_number_or_string() {
        let a: CreditHours = serde_json::from_str("\"2.5\"").unwrap();
        let b: CreditHours = serde_json::from_str("2.5").unwrap();
        let c: CreditHours = serde_json::from_str("2").unwrap();
        assert_eq!(a, b);
        assert_eq!(c, CreditHours::from_whole(2));
        assert!(serde_json::from_str::<CreditHours>("-2").is_err());
    }

    #[test]
    fn hours_serialize_as_string() {
        let json = serde_json::to_string(&CreditHours::from_hundredths(75)).unwrap();
        assert_eq!(json, "\"0.75\"");
    }

    #[test]
    fn saturating_sub_never_negative() {
        let a = CreditHours::from_whole(5);
        let b = CreditHours::from_whole(7);
        assert_eq!(a.saturating_sub(b), CreditHours::ZERO);
        assert_eq!(b.saturating_sub(a), CreditHours::from_whole(2));
    }

    #[test]
    fn weighted_rounds_down() {
        let half = Weight::parse("0.5").unwrap();
        assert_eq!(CreditHours::from_hundredths(125).weighted(half).hundredths(), 62);
        assert_eq!(CreditHours::from_whole(4).weighted(Weight::ONE), CreditHours::from_whole(4));
    }

    #[test]
    fn prorate_rounds_up_to_whole_hour() {
        let total = CreditHours::from_whole(40);
        assert_eq!(total.prorate_ceil_whole(7, 24), CreditHours::from_whole(12));
        assert_eq!(total.prorate_ceil_whole(24, 24), total);
        assert_eq!(total.prorate_ceil_whole(0, 24), CreditHours::ZERO);
    }

    #[test]
    fn weight_display_and_parse() {
        assert_eq!(Weight::parse("0.5").unwrap().basis_points(), 5_000);
        assert_eq!(Weight::parse("1").unwrap(), Weight::ONE);
        assert_eq!(Weight::ONE.to_string(), "1");
        assert_eq!(Weight::from_basis_points(2_500).unwrap().to_string(), "0.25");
        assert!(Weight::parse("0").is_err());
        assert!(Weight::parse("11").is_err());
    }

    #[test]
    fn weight_deserializes_from_yaml_number_shape() {
        let w: Weight = serde_json::from_str("0.75").unwrap();
        assert_eq!(w.basis_points(), 7_500);
    }

    proptest! {
        #[test]
        fn display_parse_roundtrip(h in 0u64..10_000_000) {
            let hours = CreditHours::from_hundredths(h);
            prop_assert_eq!(CreditHours::parse(&hours.to_string()).unwrap(), hours);
        }

        #[test]
        fn proration_never_exceeds_whole_rounded_total(h in 0u64..100_000, m in 0u32..=48, len in 1u32..=48) {
            let m = m.min(len);
            let total = CreditHours::from_hundredths(h);
            let prorated = total.prorate_ceil_whole(m, len);
            let total_rounded_up = total.prorate_ceil_whole(len, len);
            prop_assert!(prorated <= total_rounded_up);
        }
    }
}
