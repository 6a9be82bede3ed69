use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::debug;

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::tax::income_tax::{calculate_full_tax, marginal_rate, TaxDeductions};
use crate::tax::schedule::TaxSchedule;
use crate::types::{with_decimal_metadata, ComputationOutput, Money, Rate};
use crate::EngineResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Remaining SSF/RMF room for the year and the tax it would save.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SsfRmfRecommendation {
    pub ssf_current: Money,
    pub ssf_max_allowed: Money,
    pub ssf_recommended: Money,
    pub ssf_tax_saving: Money,

    pub rmf_current: Money,
    pub rmf_max_allowed: Money,
    pub rmf_recommended: Money,
    pub rmf_tax_saving: Money,

    /// SSF + RMF + provident fund already contributed.
    pub combined_current: Money,
    pub combined_max: Money,
    pub combined_remaining: Money,

    pub total_tax_saving: Money,
    pub marginal_rate: Rate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimalContribution {
    pub ssf_optimal: Money,
    pub rmf_optimal: Money,
    pub total_optimal: Money,
    pub room_used: Money,
    pub room_remaining: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContributionInput {
    pub gross_income: Money,
    #[serde(default)]
    pub deductions: TaxDeductions,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// SSF room is filled first; RMF gets what is left of the combined room.
///
/// Savings are priced at the marginal rate of the current net income.
pub fn calculate_contribution_recommendation(
    gross_income: Money,
    deductions: &TaxDeductions,
    schedule: &TaxSchedule,
) -> EngineResult<SsfRmfRecommendation> {
    let current = calculate_full_tax(gross_income, deductions, schedule)?;
    let rate = marginal_rate(current.net_income, &schedule.brackets);
    let limits = &schedule.contributions;

    let ssf_max_allowed = (gross_income * limits.ssf_pct).min(limits.ssf_cap);
    let rmf_max_allowed = (gross_income * limits.rmf_pct).min(limits.rmf_cap);

    let combined_current =
        deductions.ssf_current + deductions.rmf_current + deductions.provident_fund;
    let combined_remaining = (limits.combined_cap - combined_current).max(Decimal::ZERO);

    let ssf_recommended = (ssf_max_allowed - deductions.ssf_current)
        .min(combined_remaining)
        .max(Decimal::ZERO);
    let rmf_recommended = (rmf_max_allowed - deductions.rmf_current)
        .min(combined_remaining - ssf_recommended)
        .max(Decimal::ZERO);

    let ssf_tax_saving = ssf_recommended * rate;
    let rmf_tax_saving = rmf_recommended * rate;

    debug!(
        %ssf_recommended,
        %rmf_recommended,
        %combined_remaining,
        "contribution room computed"
    );

    Ok(SsfRmfRecommendation {
        ssf_current: deductions.ssf_current,
        ssf_max_allowed,
        ssf_recommended,
        ssf_tax_saving,
        rmf_current: deductions.rmf_current,
        rmf_max_allowed,
        rmf_recommended,
        rmf_tax_saving,
        combined_current,
        combined_max: limits.combined_cap,
        combined_remaining,
        total_tax_saving: ssf_tax_saving + rmf_tax_saving,
        marginal_rate: rate,
    })
}

/// Room split without a tax computation.
pub fn calculate_optimal_allocation(
    gross_income: Money,
    provident_fund: Money,
    existing_ssf: Money,
    existing_rmf: Money,
    schedule: &TaxSchedule,
) -> EngineResult<OptimalContribution> {
    for (field, value) in [
        ("gross_income", gross_income),
        ("provident_fund", provident_fund),
        ("existing_ssf", existing_ssf),
        ("existing_rmf", existing_rmf),
    ] {
        if value < Decimal::ZERO {
            return Err(EngineError::InvalidParameter {
                field: field.into(),
                reason: format!("must be >= 0, got {}", value),
            });
        }
    }
    let limits = &schedule.contributions;
    let room = (limits.combined_cap - provident_fund - existing_ssf - existing_rmf)
        .max(Decimal::ZERO);

    let ssf_limit = (gross_income * limits.ssf_pct).min(limits.ssf_cap);
    let ssf_optimal = (ssf_limit - existing_ssf).max(Decimal::ZERO).min(room);

    let room_after_ssf = (room - ssf_optimal).max(Decimal::ZERO);
    let rmf_limit = (gross_income * limits.rmf_pct).min(limits.rmf_cap);
    let rmf_optimal = (rmf_limit - existing_rmf)
        .max(Decimal::ZERO)
        .min(room_after_ssf);

    let total = ssf_optimal + rmf_optimal;
    Ok(OptimalContribution {
        ssf_optimal,
        rmf_optimal,
        total_optimal: total,
        room_used: total,
        room_remaining: room - total,
    })
}

pub fn run_contribution(
    input: &ContributionInput,
    config: &EngineConfig,
) -> EngineResult<ComputationOutput<SsfRmfRecommendation>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();
    let schedule = &config.tax;

    let rec = calculate_contribution_recommendation(input.gross_income, &input.deductions, schedule)?;

    if rec.combined_remaining.is_zero() {
        warnings.push("Combined retirement room is used up".into());
    }
    if rec.marginal_rate.is_zero() && rec.ssf_recommended + rec.rmf_recommended > Decimal::ZERO {
        warnings.push("Net income is in the 0% bracket: contributions save no tax".into());
    }

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_decimal_metadata(
        "SSF/RMF contribution room at the marginal rate (SSF first)",
        &serde_json::json!({
            "schedule": schedule.name,
            "ssf_cap": schedule.contributions.ssf_cap.to_string(),
            "rmf_cap": schedule.contributions.rmf_cap.to_string(),
            "combined_cap": schedule.contributions.combined_cap.to_string(),
        }),
        warnings,
        elapsed,
        rec,
    ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
