//! Currency conversion abstractions
//!
//! Every rate is expressed as the RON value of one unit of a currency. A rate set
//! is fetched once per operation and passed explicitly to every conversion.

use crate::core::error::{Result, TrackerError};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Display;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Sub};
use std::str::FromStr;

pub const BASE_CURRENCY: &str = "RON";

/// The closed set of currencies every value is reported in.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReportingCurrency {
    #[default]
    Ron,
    Eur,
    Usd,
}

impl ReportingCurrency {
    pub const ALL: [ReportingCurrency; 3] = [
        ReportingCurrency::Ron,
        ReportingCurrency::Eur,
        ReportingCurrency::Usd,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            ReportingCurrency::Ron => "RON",
            ReportingCurrency::Eur => "EUR",
            ReportingCurrency::Usd => "USD",
        }
    }
}

impl Display for ReportingCurrency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl FromStr for ReportingCurrency {
    type Err = TrackerError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "RON" => Ok(ReportingCurrency::Ron),
            "EUR" => Ok(ReportingCurrency::Eur),
            "USD" => Ok(ReportingCurrency::Usd),
            _ => Err(TrackerError::UnsupportedCurrency(s.to_string())),
        }
    }
}

/// One atomically fetched set of RON multipliers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FxRateSet {
    pub as_of: DateTime<Utc>,
    pub rates: BTreeMap<String, f64>,
}

impl FxRateSet {
    /// Builds a set from the EUR and USD quotes against RON.
    pub fn new(as_of: DateTime<Utc>, eur_ron: f64, usd_ron: f64) -> Self {
        let rates = BTreeMap::from([
            (BASE_CURRENCY.to_string(), 1.0),
            ("EUR".to_string(), eur_ron),
            ("USD".to_string(), usd_ron),
        ]);
        FxRateSet { as_of, rates }
    }

    /// RON value of one unit of `currency`.
    pub fn ron_multiplier(&self, currency: &str) -> Result<f64> {
        let code = currency.to_uppercase();
        if code == BASE_CURRENCY {
            return Ok(1.0);
        }
        match self.rates.get(&code) {
            Some(rate) if *rate > 0.0 && rate.is_finite() => Ok(*rate),
            _ => Err(TrackerError::UnsupportedCurrency(currency.to_string())),
        }
    }
}

/// Converts `amount` from one currency to another through RON.
pub fn convert(amount: f64, from: &str, to: &str, rates: &FxRateSet) -> Result<f64> {
    if from.eq_ignore_ascii_case(to) {
        // Still reject codes the rate set cannot resolve.
        rates.ron_multiplier(from)?;
        return Ok(amount);
    }
    let in_ron = amount * rates.ron_multiplier(from)?;
    Ok(in_ron / rates.ron_multiplier(to)?)
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// A figure expressed once per reporting currency.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CurrencyValues {
    pub ron: f64,
    pub eur: f64,
    pub usd: f64,
}

impl CurrencyValues {
    pub const ZERO: CurrencyValues = CurrencyValues {
        ron: 0.0,
        eur: 0.0,
        usd: 0.0,
    };

    /// Converts a native amount into all reporting currencies with one rate set.
    pub fn from_native(amount: f64, currency: &str, rates: &FxRateSet) -> Result<Self> {
        Ok(CurrencyValues {
            ron: convert(amount, currency, "RON", rates)?,
            eur: convert(amount, currency, "EUR", rates)?,
            usd: convert(amount, currency, "USD", rates)?,
        })
    }

    pub fn get(&self, currency: ReportingCurrency) -> f64 {
        match currency {
            ReportingCurrency::Ron => self.ron,
            ReportingCurrency::Eur => self.eur,
            ReportingCurrency::Usd => self.usd,
        }
    }

    pub fn map(self, f: impl Fn(f64) -> f64) -> Self {
        CurrencyValues {
            ron: f(self.ron),
            eur: f(self.eur),
            usd: f(self.usd),
        }
    }

    /// Combines two records field by field; `None` as soon as one field yields `None`.
    pub fn try_zip(self, other: Self, f: impl Fn(f64, f64) -> Option<f64>) -> Option<Self> {
        Some(CurrencyValues {
            ron: f(self.ron, other.ron)?,
            eur: f(self.eur, other.eur)?,
            usd: f(self.usd, other.usd)?,
        })
    }

    pub fn rounded(self) -> Self {
        self.map(round2)
    }
}

impl Add for CurrencyValues {
    type Output = CurrencyValues;

    fn add(self, rhs: Self) -> Self::Output {
        CurrencyValues {
            ron: self.ron + rhs.ron,
            eur: self.eur + rhs.eur,
            usd: self.usd + rhs.usd,
        }
    }
}

impl AddAssign for CurrencyValues {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sub for CurrencyValues {
    type Output = CurrencyValues;

    fn sub(self, rhs: Self) -> Self::Output {
        CurrencyValues {
            ron: self.ron - rhs.ron,
            eur: self.eur - rhs.eur,
            usd: self.usd - rhs.usd,
        }
    }
}

impl Sum for CurrencyValues {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(CurrencyValues::ZERO, |acc, v| acc + v)
    }
}

#[async_trait]
pub trait FxRateProvider: Send + Sync {
    /// Latest rates, fetched together.
    async fn latest_rates(&self) -> Result<FxRateSet>;

    /// Rates prevailing on `date`.
    async fn rates_on(&self, date: NaiveDate) -> Result<FxRateSet>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rates() -> FxRateSet {
        FxRateSet::new(Utc::now(), 4.97, 4.55)
    }

    #[test]
    fn test_identity_conversion() {
        let rates = rates();
        assert_eq!(convert(123.45, "RON", "RON", &rates).unwrap(), 123.45);
        assert_eq!(convert(10.0, "eur", "EUR", &rates).unwrap(), 10.0);
    }

    #[test]
    fn test_conversion_to_and_from_ron() {
        let rates = rates();
        assert!((convert(10.0, "EUR", "RON", &rates).unwrap() - 49.7).abs() < 1e-9);
        assert!((convert(45.5, "RON", "USD", &rates).unwrap() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_cross_conversion_goes_through_ron() {
        let rates = rates();
        let usd = convert(100.0, "EUR", "USD", &rates).unwrap();
        assert!((usd - 100.0 * 4.97 / 4.55).abs() < 1e-9);
    }

    #[test]
    fn test_round_trip_for_all_pairs() {
        let rates = rates();
        for from in ReportingCurrency::ALL {
            for to in ReportingCurrency::ALL {
                for amount in [0.0, 0.01, 1.0, 1234.56, -250.0] {
                    let there = convert(amount, from.code(), to.code(), &rates).unwrap();
                    let back = convert(there, to.code(), from.code(), &rates).unwrap();
                    assert!(
                        (back - amount).abs() < 1e-6,
                        "{amount} {from}->{to}->{from} gave {back}"
                    );
                }
            }
        }
    }

    #[test]
    fn test_unsupported_currency() {
        let rates = rates();
        assert_eq!(
            convert(1.0, "GBP", "RON", &rates),
            Err(TrackerError::UnsupportedCurrency("GBP".to_string()))
        );
        assert!(convert(1.0, "RON", "JPY", &rates).is_err());
        assert!(convert(1.0, "CHF", "CHF", &rates).is_err());
    }

    #[test]
    fn test_from_native_fans_out_once() {
        let rates = rates();
        let values = CurrencyValues::from_native(100.0, "USD", &rates).unwrap();
        assert!((values.ron - 455.0).abs() < 1e-9);
        assert!((values.eur - 455.0 / 4.97).abs() < 1e-9);
        assert_eq!(values.usd, 100.0);
        assert_eq!(values.get(ReportingCurrency::Ron), values.ron);
    }

    #[test]
    fn test_reporting_currency_parse() {
        assert_eq!(
            "eur".parse::<ReportingCurrency>().unwrap(),
            ReportingCurrency::Eur
        );
        assert!("GBP".parse::<ReportingCurrency>().is_err());
        assert_eq!(ReportingCurrency::Usd.to_string(), "USD");
    }

    #[test]
    fn test_values_arithmetic_and_rounding() {
        let a = CurrencyValues {
            ron: 1.005,
            eur: 2.0,
            usd: 3.333,
        };
        let total: CurrencyValues = vec![a, a].into_iter().sum();
        assert_eq!(total.eur, 4.0);
        assert_eq!((total - a).usd, 3.333);
        assert_eq!(a.rounded().usd, 3.33);
    }
}
