use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Fixed-point decimal with 4 decimal places, stored as a scaled integer.
///
/// The gateway is agnostic of the currency minor unit: the host always sees
/// the amount multiplied by 100 (see [`format_iso`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
pub struct Amount(i64);

/// Width of the ISO amount field (field 4).
const ISO_WIDTH: usize = 12;

impl Amount {
    const SCALE: i64 = 10_000;
    const DECIMALS: usize = 4;
    /// Ratio between the internal scale and the two-digit minor unit.
    const MINOR_RATIO: i64 = Self::SCALE / 100;

    pub fn from_scaled(value: i64) -> Self {
        Amount(value)
    }

    /// Build an amount from two-digit minor units (`1234` is `12.34`).
    pub fn from_minor_units(units: i64) -> Self {
        Amount(units.saturating_mul(Self::MINOR_RATIO))
    }

    /// Amount multiplied by 100 and truncated toward zero.
    pub fn to_minor_units(self) -> i64 {
        self.0 / Self::MINOR_RATIO
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }
}

/// Format an amount as the 12-digit zero-padded ISO amount field.
///
/// A missing amount encodes as twelve zeros.
pub fn format_iso(amount: Option<Amount>) -> String {
    let units = amount.map_or(0, Amount::to_minor_units);
    format!("{units:0ISO_WIDTH$}")
}

/// Parse an ISO amount field back into an amount, dividing by 100.
pub fn parse_iso(field: &str) -> Option<Amount> {
    let trimmed = field.trim();
    if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    trimmed.parse::<i64>().ok().map(Amount::from_minor_units)
}

/// Error returned when a decimal string cannot be read as an [`Amount`].
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid amount '{0}'")]
pub struct ParseAmountError(String);

impl FromStr for Amount {
    type Err = ParseAmountError;

    /// Parse a plain decimal string. Digits past the fourth decimal place are
    /// truncated.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseAmountError(s.to_string());
        let trimmed = s.trim();
        let (negative, digits) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed),
        };
        let (whole, frac) = digits.split_once('.').unwrap_or((digits, ""));
        if whole.is_empty() && frac.is_empty() {
            return Err(err());
        }
        if !whole.bytes().chain(frac.bytes()).all(|b| b.is_ascii_digit()) {
            return Err(err());
        }

        let whole: i64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| err())?
        };
        let mut frac: String = frac.chars().take(Self::DECIMALS).collect();
        while frac.len() < Self::DECIMALS {
            frac.push('0');
        }
        let frac: i64 = frac.parse().map_err(|_| err())?;

        let scaled = whole
            .checked_mul(Self::SCALE)
            .and_then(|v| v.checked_add(frac))
            .ok_or_else(err)?;
        Ok(Amount(if negative { -scaled } else { scaled }))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.abs();
        let whole = abs / Self::SCALE;
        let frac = abs % Self::SCALE;
        // cents-only amounts print the usual two decimals
        if frac % Self::MINOR_RATIO == 0 {
            write!(f, "{sign}{whole}.{:02}", frac / Self::MINOR_RATIO)
        } else {
            write!(f, "{sign}{whole}.{frac:04}")
        }
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
