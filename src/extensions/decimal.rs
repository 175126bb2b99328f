//! The `decimal` extension type: a fixed-point number with exactly four
//! fractional digits. Only construction from text and comparison are
//! exposed; arithmetic on decimals is not part of the language.

use std::cmp::Ordering;
use std::fmt::Display;

use crate::err::{ErrExtensionArgument, EvaluationError};

const DECIMAL_DIGITS: u32 = 4;
const SCALE: i64 = 10_i64.pow(DECIMAL_DIGITS);

/// A fixed-point decimal number, stored as an integer scaled by 10^4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Decimal(i64);

impl Decimal {
    /// Parse a decimal literal like `"1.2345"` or `"-10.0"`. The fractional
    /// part must have at most four digits.
    pub fn parse(s: &str) -> Result<Self, EvaluationError> {
        let invalid = || {
            ErrExtensionArgument {
                name: "decimal".into(),
                msg: format!("`{s}` is not a valid decimal literal"),
            }
            .into()
        };

        let (sign, rest) = match s.strip_prefix('-') {
            Some(rest) => (-1_i64, rest),
            None => (1_i64, s),
        };
        let mut parts = rest.splitn(2, '.');
        let int_part = parts.next().ok_or_else(invalid)?;
        let frac_part = parts.next().unwrap_or("0");
        if parts.next().is_some() || int_part.is_empty() || frac_part.is_empty() {
            return Err(invalid());
        }
        if frac_part.len() > DECIMAL_DIGITS as usize || !frac_part.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(invalid());
        }
        let int_val: i64 = int_part.parse().map_err(|_| invalid())?;
        let mut frac_val: i64 = frac_part.parse().map_err(|_| invalid())?;
        for _ in frac_part.len()..DECIMAL_DIGITS as usize {
            frac_val *= 10;
        }
        let magnitude = int_val
            .checked_mul(SCALE)
            .and_then(|v| v.checked_add(frac_val))
            .ok_or_else(invalid)?;
        Ok(Self(sign * magnitude))
    }

    pub fn cmp_value(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl Display for Decimal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let magnitude = self.0.unsigned_abs();
        let int_part = magnitude / SCALE as u64;
        let frac_part = magnitude % SCALE as u64;
        write!(f, "{sign}{int_part}.{frac_part:0width$}", width = DECIMAL_DIGITS as usize)
    }
}
