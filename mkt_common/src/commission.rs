use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::Money;

const BPS_PER_PERCENT: i64 = 100;
const MAX_BPS: i64 = 100 * BPS_PER_PERCENT;

/// The platform's default commission: 20%.
pub const DEFAULT_COMMISSION_RATE: CommissionRate = CommissionRate(20 * BPS_PER_PERCENT);

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Invalid commission rate: {0}. Rates must lie between 0% and 100%")]
pub struct CommissionRateError(String);

/// A commission percentage, held in basis points (1/100th of a percent) so that rates such as 12.5% are exact.
#[derive(Debug, Clone, Copy, Type, Ord, PartialOrd, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(try_from = "i64", into = "i64")]
pub struct CommissionRate(i64);

impl Default for CommissionRate {
    fn default() -> Self {
        DEFAULT_COMMISSION_RATE
    }
}

impl CommissionRate {
    pub fn from_bps(bps: i64) -> Result<Self, CommissionRateError> {
        if (0..=MAX_BPS).contains(&bps) {
            Ok(Self(bps))
        } else {
            Err(CommissionRateError(format!("{bps} bps")))
        }
    }

    pub fn from_percent(percent: i64) -> Result<Self, CommissionRateError> {
        percent
            .checked_mul(BPS_PER_PERCENT)
            .ok_or_else(|| CommissionRateError(format!("{percent}%")))
            .and_then(Self::from_bps)
    }

    pub fn bps(&self) -> i64 {
        self.0
    }

    /// Applies the rate to `amount`, rounding half away from zero to the nearest minor unit.
    pub fn apply(&self, amount: Money) -> Money {
        let scaled = i128::from(amount.value()) * i128::from(self.0);
        let half = i128::from(MAX_BPS / 2);
        let rounded = if scaled >= 0 { (scaled + half) / i128::from(MAX_BPS) } else { (scaled - half) / i128::from(MAX_BPS) };
        #[allow(clippy::cast_possible_truncation)]
        Money::from(rounded as i64)
    }
}

impl TryFrom<i64> for CommissionRate {
    type Error = CommissionRateError;

    fn try_from(bps: i64) -> Result<Self, Self::Error> {
        Self::from_bps(bps)
    }
}

impl From<CommissionRate> for i64 {
    fn from(rate: CommissionRate) -> Self {
        rate.0
    }
}

impl Display for CommissionRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let whole = self.0 / BPS_PER_PERCENT;
        let frac = self.0 % BPS_PER_PERCENT;
        if frac == 0 {
            write!(f, "{whole}%")
        } else {
            let frac = format!("{frac:02}");
            write!(f, "{whole}.{}%", frac.trim_end_matches('0'))
        }
    }
}

/// Parses `"20"`, `"20%"` or `"12.5%"`.
impl FromStr for CommissionRate {
    type Err = CommissionRateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().trim_end_matches('%');
        let err = || CommissionRateError(s.to_string());
        let (whole, frac) = trimmed.split_once('.').unwrap_or((trimmed, ""));
        if frac.len() > 2 {
            return Err(err());
        }
        let whole = whole.parse::<i64>().map_err(|_| err())?;
        let frac = match frac.len() {
            0 => 0,
            1 => frac.parse::<i64>().map_err(|_| err())? * 10,
            _ => frac.parse::<i64>().map_err(|_| err())?,
        };
        whole.checked_mul(BPS_PER_PERCENT).and_then(|b| b.checked_add(frac)).ok_or_else(err).and_then(Self::from_bps)
    }
}
