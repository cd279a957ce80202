//! Target allocation groups and rebalancing analysis.

use crate::core::currency::{FxRateSet, ReportingCurrency, round2};
use crate::core::error::{Result, TrackerError};
use crate::core::holding::HoldingRef;
use crate::core::valuation::PortfolioValuation;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

/// Tolerance on the sum of target percentages.
const TARGET_SUM_TOLERANCE: f64 = 0.1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationMember {
    pub holding: HoldingRef,
    pub target_percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationGroup {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub members: Vec<AllocationMember>,
}

impl AllocationGroup {
    /// Replaces the group's members after checking their targets.
    pub fn assign(&mut self, members: Vec<AllocationMember>) -> Result<()> {
        validate_targets(&members)?;
        self.members = members;
        Ok(())
    }
}

/// Each target lies in (0, 100], no holding repeats, and targets sum to 100 ± 0.1.
pub fn validate_targets(members: &[AllocationMember]) -> Result<()> {
    if members.is_empty() {
        return Ok(());
    }

    let mut seen = HashSet::new();
    for member in members {
        if !(member.target_percentage > 0.0 && member.target_percentage <= 100.0) {
            return Err(TrackerError::InvalidAllocation(format!(
                "target for {} must be in (0, 100], got {}",
                member.holding, member.target_percentage
            )));
        }
        if !seen.insert(member.holding) {
            return Err(TrackerError::InvalidAllocation(format!(
                "{} is listed more than once",
                member.holding
            )));
        }
    }

    let total: f64 = members.iter().map(|m| m.target_percentage).sum();
    if (total - 100.0).abs() > TARGET_SUM_TOLERANCE {
        return Err(TrackerError::InvalidAllocation(format!(
            "targets must sum to 100%, got {total:.2}%"
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationRow {
    pub holding: HoldingRef,
    pub name: String,
    pub ticker: Option<String>,
    pub native_currency: String,
    pub current_value: f64,
    pub current_percentage: f64,
    pub target_percentage: f64,
    pub target_value: f64,
    /// Target minus current, in percentage points.
    pub difference: f64,
    /// Amount to buy (positive) or sell (negative) to reach the target.
    pub suggestion_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationAnalysis {
    pub group_id: u64,
    pub group_name: String,
    pub group_color: Option<String>,
    pub currency: ReportingCurrency,
    pub total_value: f64,
    pub total_value_ron: f64,
    pub rows: Vec<AllocationRow>,
    pub rates: FxRateSet,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AllocationReport {
    /// The group has no valued members, or they are all worth nothing.
    Empty {
        group_id: u64,
        group_name: String,
        currency: ReportingCurrency,
    },
    Analysis(AllocationAnalysis),
}

impl AllocationReport {
    pub fn empty(group: &AllocationGroup, currency: ReportingCurrency) -> Self {
        AllocationReport::Empty {
            group_id: group.id,
            group_name: group.name.clone(),
            currency,
        }
    }

    pub fn rounded(self) -> Self {
        match self {
            AllocationReport::Analysis(a) => AllocationReport::Analysis(AllocationAnalysis {
                total_value: round2(a.total_value),
                total_value_ron: round2(a.total_value_ron),
                rows: a
                    .rows
                    .into_iter()
                    .map(|r| AllocationRow {
                        current_value: round2(r.current_value),
                        current_percentage: round2(r.current_percentage),
                        target_value: round2(r.target_value),
                        difference: round2(r.difference),
                        suggestion_value: round2(r.suggestion_value),
                        ..r
                    })
                    .collect(),
                ..a
            }),
            empty => empty,
        }
    }
}

/// Compares current and target weights of the group members present in
/// `valuation`. Members whose holding no longer exists are skipped.
pub fn analyze(
    group: &AllocationGroup,
    valuation: &PortfolioValuation,
    currency: ReportingCurrency,
) -> AllocationReport {
    let members: Vec<_> = group
        .members
        .iter()
        .filter_map(|m| valuation.find(m.holding).map(|h| (m, h)))
        .collect();

    let total_value: f64 = members.iter().map(|(_, h)| h.values.get(currency)).sum();
    let total_value_ron: f64 = members.iter().map(|(_, h)| h.values.ron).sum();

    if members.is_empty() || total_value <= 0.0 {
        debug!("Allocation group {} has nothing to analyze", group.id);
        return AllocationReport::empty(group, currency);
    }

    let rows = members
        .into_iter()
        .map(|(member, holding)| {
            let current_value = holding.values.get(currency);
            let current_percentage = current_value / total_value * 100.0;
            let difference = member.target_percentage - current_percentage;
            AllocationRow {
                holding: member.holding,
                name: holding.name.clone(),
                ticker: holding.ticker.clone(),
                native_currency: holding.native_currency.clone(),
                current_value,
                current_percentage,
                target_percentage: member.target_percentage,
                target_value: member.target_percentage / 100.0 * total_value,
                difference,
                suggestion_value: difference / 100.0 * total_value,
            }
        })
        .collect();

    AllocationReport::Analysis(AllocationAnalysis {
        group_id: group.id,
        group_name: group.name.clone(),
        group_color: group.color.clone(),
        currency,
        total_value,
        total_value_ron,
        rows,
        rates: valuation.rates.clone(),
    })
}
