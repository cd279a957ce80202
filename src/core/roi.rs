//! Cash-flow adjusted returns over snapshot history.
//!
//! The simple return subtracts every external flow between the first and last
//! snapshot from the value change and divides by the starting value. The
//! Modified Dietz figure weights each flow by the share of the window it was
//! invested for, and the annualized figure compounds the simple gain over the
//! window length.

use crate::core::currency::{CurrencyValues, round2};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::{Decimal, prelude::*};
use rust_finprim::rate::cagr;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;
use tracing::debug;

const SECONDS_PER_YEAR: f64 = 365.0 * 86_400.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoiRange {
    ThreeMonths,
    SixMonths,
    OneYear,
    #[default]
    All,
}

impl Display for RoiRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                RoiRange::ThreeMonths => "3m",
                RoiRange::SixMonths => "6m",
                RoiRange::OneYear => "1y",
                RoiRange::All => "all",
            }
        )
    }
}

impl FromStr for RoiRange {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "3m" => Ok(RoiRange::ThreeMonths),
            "6m" => Ok(RoiRange::SixMonths),
            "1y" => Ok(RoiRange::OneYear),
            "all" => Ok(RoiRange::All),
            _ => Err(anyhow::anyhow!("Invalid range: {} (expected 3m, 6m, 1y or all)", s)),
        }
    }
}

impl RoiRange {
    pub fn to_duration(&self) -> Option<Duration> {
        match self {
            RoiRange::ThreeMonths => Some(Duration::days(90)),
            RoiRange::SixMonths => Some(Duration::days(180)),
            RoiRange::OneYear => Some(Duration::days(365)),
            RoiRange::All => None,
        }
    }

    /// Whether a snapshot taken at `taken_at` falls in the range ending `now`.
    pub fn contains(&self, taken_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        match self.to_duration() {
            Some(duration) => taken_at >= now - duration,
            None => true,
        }
    }
}

/// Portfolio totals at one snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValuePoint {
    pub taken_at: DateTime<Utc>,
    pub totals: CurrencyValues,
}

/// External money moved in (positive) or out (negative), converted with the
/// rates of its own date.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CashFlow {
    pub at: DateTime<Utc>,
    pub amount: CurrencyValues,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoiStatus {
    Computed,
    InsufficientSnapshotData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoiResult {
    pub range: RoiRange,
    pub status: RoiStatus,
    pub snapshot_count: usize,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub start_value: Option<CurrencyValues>,
    pub end_value: Option<CurrencyValues>,
    pub net_cash_flow: Option<CurrencyValues>,
    pub absolute_gain: Option<CurrencyValues>,
    pub roi_percent: Option<CurrencyValues>,
    pub dietz_percent: Option<CurrencyValues>,
    pub annualized_percent: Option<CurrencyValues>,
}

impl RoiResult {
    fn insufficient(range: RoiRange, snapshot_count: usize) -> Self {
        RoiResult {
            range,
            status: RoiStatus::InsufficientSnapshotData,
            snapshot_count,
            start_date: None,
            end_date: None,
            start_value: None,
            end_value: None,
            net_cash_flow: None,
            absolute_gain: None,
            roi_percent: None,
            dietz_percent: None,
            annualized_percent: None,
        }
    }

    pub fn rounded(self) -> Self {
        let round = |v: Option<CurrencyValues>| v.map(CurrencyValues::rounded);
        RoiResult {
            start_value: round(self.start_value),
            end_value: round(self.end_value),
            net_cash_flow: round(self.net_cash_flow),
            absolute_gain: round(self.absolute_gain),
            roi_percent: round(self.roi_percent),
            dietz_percent: round(self.dietz_percent),
            annualized_percent: round(self.annualized_percent),
            ..self
        }
    }
}

/// Computes the return between the earliest and latest of `points`.
///
/// Only flows strictly between the two snapshots count; a flow at or before the
/// first snapshot is already in its value, and one at or after the last is not
/// yet reflected anywhere.
pub fn compute_roi(range: RoiRange, points: &[ValuePoint], flows: &[CashFlow]) -> RoiResult {
    if points.len() < 2 {
        debug!("Only {} snapshots in range {range}", points.len());
        return RoiResult::insufficient(range, points.len());
    }

    let (Some(start), Some(end)) = (
        points.iter().min_by_key(|p| p.taken_at),
        points.iter().max_by_key(|p| p.taken_at),
    ) else {
        return RoiResult::insufficient(range, points.len());
    };

    let in_window: Vec<&CashFlow> = flows
        .iter()
        .filter(|f| f.at > start.taken_at && f.at < end.taken_at)
        .collect();
    let net_cash_flow: CurrencyValues = in_window.iter().map(|f| f.amount).sum();
    let absolute_gain = (end.totals - start.totals) - net_cash_flow;
    debug!(
        "ROI {range}: {} flows in window, net {:.2} RON, gain {:.2} RON",
        in_window.len(),
        net_cash_flow.ron,
        absolute_gain.ron
    );

    let roi_percent = start
        .totals
        .try_zip(absolute_gain, |s, g| (s != 0.0).then(|| g / s * 100.0));

    RoiResult {
        range,
        status: RoiStatus::Computed,
        snapshot_count: points.len(),
        start_date: Some(start.taken_at),
        end_date: Some(end.taken_at),
        start_value: Some(start.totals),
        end_value: Some(end.totals),
        net_cash_flow: Some(net_cash_flow),
        absolute_gain: Some(absolute_gain),
        roi_percent,
        dietz_percent: modified_dietz(start, end, &in_window, absolute_gain),
        annualized_percent: annualized(start, end, absolute_gain),
    }
}

/// Gain over the start value plus time-weighted flows.
fn modified_dietz(
    start: &ValuePoint,
    end: &ValuePoint,
    flows: &[&CashFlow],
    gain: CurrencyValues,
) -> Option<CurrencyValues> {
    let window = (end.taken_at - start.taken_at).num_seconds() as f64;
    if window <= 0.0 {
        return None;
    }
    let weighted: CurrencyValues = flows
        .iter()
        .map(|f| {
            let weight = (end.taken_at - f.at).num_seconds() as f64 / window;
            f.amount.map(|a| a * weight)
        })
        .sum();
    let denominator = start.totals + weighted;
    denominator.try_zip(gain, |d, g| (d != 0.0).then(|| g / d * 100.0))
}

/// Compound annual growth; `None` for a currency whose rate does not fit a `Decimal`.
fn annualized(
    start: &ValuePoint,
    end: &ValuePoint,
    gain: CurrencyValues,
) -> Option<CurrencyValues> {
    let window = end.taken_at - start.taken_at;
    if window < Duration::days(1) {
        return None;
    }
    let years = Decimal::from_f64(window.num_seconds() as f64 / SECONDS_PER_YEAR)?;
    let exponent = Decimal::ONE.checked_div(years)?;
    let grown = start.totals + gain;
    start.totals.try_zip(grown, |begin, finish| {
        if begin <= 0.0 || finish <= 0.0 {
            return None;
        }
        let (begin, finish) = (Decimal::from_f64(begin)?, Decimal::from_f64(finish)?);
        // cagr panics when the growth factor overflows
        finish.checked_div(begin)?.checked_powd(exponent)?;
        let rate = cagr(begin, finish, years);
        rate.checked_mul(Decimal::from(100))?.to_f64()
    })
}

/// One point on the value-over-time chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartPoint {
    pub date: DateTime<Utc>,
    pub total_ron: f64,
    pub total_eur: f64,
    pub total_usd: f64,
    /// Cash-flow adjusted RON return since the first point.
    pub roi_percent: Option<f64>,
}

/// Points in chronological order; the first point has no return.
pub fn chart_points(points: &[ValuePoint], flows: &[CashFlow]) -> Vec<ChartPoint> {
    let mut sorted = points.to_vec();
    sorted.sort_by_key(|p| p.taken_at);

    sorted
        .iter()
        .enumerate()
        .map(|(i, point)| {
            let roi_percent = if i == 0 {
                None
            } else {
                compute_roi(RoiRange::All, &sorted[..=i], flows)
                    .roi_percent
                    .map(|r| round2(r.ron))
            };
            ChartPoint {
                date: point.taken_at,
                total_ron: round2(point.totals.ron),
                total_eur: round2(point.totals.eur),
                total_usd: round2(point.totals.usd),
                roi_percent,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, day, 12, 0, 0).unwrap()
    }

    fn ron(value: f64) -> CurrencyValues {
        // EUR at 5 RON, USD at 4 RON.
        CurrencyValues {
            ron: value,
            eur: value / 5.0,
            usd: value / 4.0,
        }
    }

    fn point(day: u32, value: f64) -> ValuePoint {
        ValuePoint {
            taken_at: at(day),
            totals: ron(value),
        }
    }

    fn flow(day: u32, value: f64) -> CashFlow {
        CashFlow {
            at: at(day),
            amount: ron(value),
        }
    }

    #[test]
    fn test_gain_net_of_cash_flow() {
        let result = compute_roi(
            RoiRange::All,
            &[point(1, 1000.0), point(20, 1800.0)],
            &[flow(10, 500.0)],
        );

        assert_eq!(result.status, RoiStatus::Computed);
        assert_eq!(result.snapshot_count, 2);
        assert_eq!(result.net_cash_flow.unwrap().ron, 500.0);
        assert_eq!(result.absolute_gain.unwrap().ron, 300.0);
        assert!((result.roi_percent.unwrap().ron - 30.0).abs() < 1e-9);
        assert!((result.roi_percent.unwrap().eur - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_single_snapshot_is_insufficient() {
        let result = compute_roi(RoiRange::OneYear, &[point(1, 1000.0)], &[flow(2, 10.0)]);
        assert_eq!(result.status, RoiStatus::InsufficientSnapshotData);
        assert_eq!(result.snapshot_count, 1);
        assert_eq!(result.start_value, None);
        assert_eq!(result.end_value, None);
        assert_eq!(result.net_cash_flow, None);
        assert_eq!(result.absolute_gain, None);
        assert_eq!(result.roi_percent, None);

        let empty = compute_roi(RoiRange::All, &[], &[]);
        assert_eq!(empty.snapshot_count, 0);
    }

    #[test]
    fn test_flows_on_window_edges_are_excluded() {
        let result = compute_roi(
            RoiRange::All,
            &[point(1, 1000.0), point(20, 1100.0)],
            &[flow(1, 400.0), flow(20, 250.0), flow(25, 50.0)],
        );
        assert_eq!(result.net_cash_flow.unwrap(), CurrencyValues::ZERO);
        assert!((result.roi_percent.unwrap().ron - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_unordered_points_use_earliest_and_latest() {
        let result = compute_roi(
            RoiRange::All,
            &[point(15, 1500.0), point(20, 1200.0), point(1, 1000.0)],
            &[],
        );
        assert_eq!(result.start_value.unwrap().ron, 1000.0);
        assert_eq!(result.end_value.unwrap().ron, 1200.0);
        assert_eq!(result.snapshot_count, 3);
    }

    #[test]
    fn test_zero_start_value_has_no_percentage() {
        let result = compute_roi(
            RoiRange::All,
            &[point(1, 0.0), point(20, 600.0)],
            &[flow(5, 500.0)],
        );
        assert_eq!(result.absolute_gain.unwrap().ron, 100.0);
        assert_eq!(result.roi_percent, None);
        assert!(result.dietz_percent.is_some());
        assert_eq!(result.annualized_percent, None);
    }

    #[test]
    fn test_modified_dietz_weights_flows_by_time_invested() {
        // Flow lands exactly half way through the window.
        let start = ValuePoint {
            taken_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            totals: ron(1000.0),
        };
        let end = ValuePoint {
            taken_at: Utc.with_ymd_and_hms(2025, 1, 11, 0, 0, 0).unwrap(),
            totals: ron(1800.0),
        };
        let mid = CashFlow {
            at: Utc.with_ymd_and_hms(2025, 1, 6, 0, 0, 0).unwrap(),
            amount: ron(500.0),
        };
        let result = compute_roi(RoiRange::All, &[start, end], &[mid]);
        assert!((result.dietz_percent.unwrap().ron - 300.0 / 1250.0 * 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_annualized_over_one_year() {
        let start = ValuePoint {
            taken_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            totals: ron(1000.0),
        };
        let end = ValuePoint {
            taken_at: start.taken_at + Duration::days(365),
            totals: ron(1100.0),
        };
        let result = compute_roi(RoiRange::All, &[start, end], &[]);
        assert!((result.annualized_percent.unwrap().ron - 10.0).abs() < 0.01);
    }

    #[test]
    fn test_short_window_is_not_annualized() {
        let start = point(1, 1000.0);
        let end = ValuePoint {
            taken_at: start.taken_at + Duration::hours(3),
            totals: ron(1010.0),
        };
        let result = compute_roi(RoiRange::All, &[start, end], &[]);
        assert_eq!(result.annualized_percent, None);
        assert!((result.roi_percent.unwrap().ron - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_annualized_skipped_when_growth_overflows() {
        let start = ValuePoint {
            taken_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            totals: ron(10.0),
        };
        let end = ValuePoint {
            taken_at: Utc.with_ymd_and_hms(2025, 1, 3, 0, 0, 0).unwrap(),
            totals: ron(10_000.0),
        };
        let result = compute_roi(RoiRange::All, &[start, end], &[]);
        assert_eq!(result.status, RoiStatus::Computed);
        assert_eq!(result.annualized_percent, None);
        assert!((result.roi_percent.unwrap().ron - 99_900.0).abs() < 1e-6);

        let points = chart_points(&[start, end], &[]);
        assert_eq!(points[1].roi_percent, Some(99_900.0));
    }

    #[test]
    fn test_range_parse_and_contains() {
        assert_eq!("3M".parse::<RoiRange>().unwrap(), RoiRange::ThreeMonths);
        assert_eq!("all".parse::<RoiRange>().unwrap(), RoiRange::All);
        assert!("2w".parse::<RoiRange>().is_err());
        assert_eq!(RoiRange::SixMonths.to_string(), "6m");

        let now = at(31) + Duration::days(200);
        assert!(RoiRange::All.contains(at(1), now));
        assert!(RoiRange::OneYear.contains(at(1), now));
        assert!(!RoiRange::SixMonths.contains(at(1), now));
        assert!(RoiRange::SixMonths.contains(now - Duration::days(180), now));
    }

    #[test]
    fn test_chart_points() {
        let points = chart_points(
            &[point(20, 1800.0), point(1, 1000.0), point(15, 1600.0)],
            &[flow(10, 500.0)],
        );
        assert_eq!(points.len(), 3);
        assert_eq!(points[0].date, at(1));
        assert_eq!(points[0].roi_percent, None);
        assert_eq!(points[1].roi_percent, Some(10.0));
        assert_eq!(points[2].roi_percent, Some(30.0));
        assert_eq!(points[2].total_eur, 360.0);
    }
}
