use std::fmt;
use std::iter::Sum;

/// Fixed-point decimal with 4 decimal places, stored as a scaled integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
pub struct Amount(i64);

impl Amount {
    const SCALE: i64 = 10_000;

    pub const ZERO: Amount = Amount(0);

    /// Largest whole-unit value an `Amount` can hold.
    pub const MAX_UNITS: u64 = (i64::MAX / Self::SCALE) as u64;

    /// Whole currency units, e.g. a tier value. Saturates at [`Self::MAX_UNITS`].
    pub fn from_units(units: u64) -> Self {
        Self::checked_from_units(units.min(Self::MAX_UNITS)).unwrap_or(Amount(i64::MAX))
    }

    /// Whole currency units, or `None` when out of range.
    pub fn checked_from_units(units: u64) -> Option<Self> {
        i64::try_from(units)
            .ok()?
            .checked_mul(Self::SCALE)
            .map(Amount)
    }

    pub fn from_scaled(value: i64) -> Self {
        Amount(value)
    }

    /// Parse a decimal string such as `"12"` or `"12.5"`.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        let (negative, digits) = match value.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, value),
        };
        let (whole, frac) = digits.split_once('.').unwrap_or((digits, ""));
        if whole.is_empty() || frac.len() > 4 || !frac.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let whole: i64 = whole.parse().ok()?;
        let frac: i64 = if frac.is_empty() {
            0
        } else {
            format!("{frac:0<4}").parse().ok()?
        };
        let scaled = whole.checked_mul(Self::SCALE)?.checked_add(frac)?;
        Some(Amount(if negative { -scaled } else { scaled }))
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.abs();
        let whole = abs / Self::SCALE;
        let frac = abs % Self::SCALE;
        write!(f, "{sign}{whole}.{frac:04}")
    }
}

impl std::ops::Add for Amount {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Amount(self.0 + rhs.0)
    }
}

impl std::ops::Sub for Amount {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Amount(self.0 - rhs.0)
    }
}

impl std::ops::AddAssign for Amount {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl std::ops::SubAssign for Amount {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

impl Sum for Amount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Amount::ZERO, |acc, a| acc + a)
    }
}
