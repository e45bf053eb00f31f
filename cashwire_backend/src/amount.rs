//! Fixed-point GBP amounts.
//!
//! All money in the system is `Pence`: a scale-2 decimal stored as `i64`
//! minor units. Balance arithmetic never touches binary floating point;
//! every operation is checked and overflow surfaces as `None`.

use candid::{CandidType, Deserialize};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// System-wide currency code. Single-currency system.
pub const CURRENCY: &str = "GBP";

const MINOR_PER_UNIT: i64 = 100;

/// A GBP amount with two fractional digits, stored as whole pence.
#[derive(
    CandidType, Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub struct Pence(i64);

impl Pence {
    pub const ZERO: Pence = Pence(0);

    pub const fn from_minor(minor: i64) -> Self {
        Pence(minor)
    }

    /// Whole pounds, no fractional part.
    pub const fn from_pounds(pounds: i64) -> Self {
        Pence(pounds * MINOR_PER_UNIT)
    }

    pub const fn minor_units(self) -> i64 {
        self.0
    }

    pub fn checked_add(self, other: Pence) -> Option<Pence> {
        self.0.checked_add(other.0).map(Pence)
    }

    pub fn checked_sub(self, other: Pence) -> Option<Pence> {
        self.0.checked_sub(other.0).map(Pence)
    }

    pub fn checked_neg(self) -> Option<Pence> {
        self.0.checked_neg().map(Pence)
    }

    pub fn checked_sum<I: IntoIterator<Item = Pence>>(amounts: I) -> Option<Pence> {
        amounts
            .into_iter()
            .try_fold(Pence::ZERO, |acc, a| acc.checked_add(a))
    }

    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn abs(self) -> Pence {
        Pence(self.0.abs())
    }

    /// Integer percentage of `self` relative to `target`, capped at 100.
    /// Used for pool progress; both sides must be positive.
    pub fn percentage_of(self, target: Pence) -> Option<u32> {
        if target.0 <= 0 || self.0 < 0 {
            return None;
        }
        let pct = (self.0 as i128 * 100) / target.0 as i128;
        Some(pct.min(100) as u32)
    }
}

impl fmt::Display for Pence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

/// Error produced when a decimal string is not a valid scale-2 amount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseAmountError;

impl fmt::Display for ParseAmountError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "not a valid decimal amount with at most two fractional digits")
    }
}

impl FromStr for Pence {
    type Err = ParseAmountError;

    /// Accepts `123`, `-123`, `123.4`, `123.45`. Rejects empty parts,
    /// more than two fractional digits, and any non-digit characters.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (negative, rest) = match s.strip_prefix('-') {
            Some(r) => (true, r),
            None => (false, s),
        };

        let (int_part, frac_part) = match rest.split_once('.') {
            Some((i, f)) => (i, f),
            None => (rest, ""),
        };

        if int_part.is_empty() || !int_part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ParseAmountError);
        }
        if frac_part.len() > 2 || !frac_part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ParseAmountError);
        }
        if rest.contains('.') && frac_part.is_empty() {
            return Err(ParseAmountError);
        }

        let pounds: i64 = int_part.parse().map_err(|_| ParseAmountError)?;
        let frac: i64 = if frac_part.is_empty() {
            0
        } else if frac_part.len() == 1 {
            frac_part.parse::<i64>().map_err(|_| ParseAmountError)? * 10
        } else {
            frac_part.parse().map_err(|_| ParseAmountError)?
        };

        let minor = pounds
            .checked_mul(MINOR_PER_UNIT)
            .and_then(|p| p.checked_add(frac))
            .ok_or(ParseAmountError)?;

        Ok(Pence(if negative { -minor } else { minor }))
    }
}
