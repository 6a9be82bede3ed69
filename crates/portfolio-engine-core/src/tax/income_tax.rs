use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::debug;

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::tax::schedule::{rate_label, ExpenseRule, TaxBracket, TaxSchedule};
use crate::types::{with_decimal_metadata, ComputationOutput, Money, Rate};
use crate::EngineResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Claimed deductions for one tax year. Amounts are what the taxpayer paid or
/// claims; caps are applied by [`calculate_total_deductions`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaxDeductions {
    /// Personal allowance; `None` uses the schedule's amount.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub personal: Option<Money>,
    pub spouse: Money,
    pub children: u32,
    pub parents: u32,
    pub life_insurance: Money,
    pub health_insurance: Money,
    pub social_security: Money,
    pub provident_fund: Money,
    pub ssf_current: Money,
    pub rmf_current: Money,
    /// Uncapped.
    pub other_deductions: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxResult {
    pub gross_income: Money,
    pub expense_deduction: Money,
    pub total_deductions: Money,
    pub net_income: Money,
    pub tax: Money,
    /// tax / gross income, as a fraction.
    pub effective_rate: Rate,
    pub marginal_rate: Rate,
    /// Highest bracket rate actually applied, e.g. "10%".
    pub tax_bracket: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxInput {
    pub gross_income: Money,
    #[serde(default)]
    pub deductions: TaxDeductions,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Progressive tax on `net_income` and the label of the top bracket used.
pub fn calculate_tax(net_income: Money, brackets: &[TaxBracket]) -> (Money, String) {
    if net_income <= Decimal::ZERO {
        return (Decimal::ZERO, "0%".into());
    }
    let mut tax = Decimal::ZERO;
    let mut remaining = net_income;
    let mut prev = Decimal::ZERO;
    let mut label = String::from("0%");

    for b in brackets {
        let width = match b.upper_bound {
            Some(upper) => upper - prev,
            None => remaining,
        };
        let taxable = remaining.min(width);
        if taxable > Decimal::ZERO {
            tax += taxable * b.rate;
            label = rate_label(b.rate);
        }
        remaining -= taxable;
        if let Some(upper) = b.upper_bound {
            prev = upper;
        }
        if remaining <= Decimal::ZERO {
            break;
        }
    }
    (tax, label)
}

/// Rate of the first bracket whose inclusive upper bound covers `net_income`.
pub fn marginal_rate(net_income: Money, brackets: &[TaxBracket]) -> Rate {
    brackets
        .iter()
        .find(|b| b.upper_bound.map_or(true, |upper| net_income <= upper))
        .or(brackets.last())
        .map_or(Decimal::ZERO, |b| b.rate)
}

/// `min(income * rate, cap)`, never negative.
pub fn calculate_expense_deduction(income: Money, rule: &ExpenseRule) -> Money {
    (income * rule.rate).min(rule.cap).max(Decimal::ZERO)
}

/// Sum of all deductions after per-category caps.
pub fn calculate_total_deductions(
    deductions: &TaxDeductions,
    income: Money,
    schedule: &TaxSchedule,
) -> EngineResult<Money> {
    validate_deductions(deductions)?;
    let caps = &schedule.deductions;
    let limits = &schedule.contributions;

    let provident_cap = (income * caps.provident_fund_pct).min(caps.provident_fund_cap);
    let ssf_cap = (income * limits.ssf_pct).min(limits.ssf_cap);
    let rmf_cap = (income * limits.rmf_pct).min(limits.rmf_cap);

    let total = deductions.personal.unwrap_or(caps.personal)
        + deductions.spouse.min(caps.spouse)
        + Decimal::from(deductions.children) * caps.per_child
        + Decimal::from(deductions.parents.min(caps.max_parents)) * caps.per_parent
        + deductions.life_insurance.min(caps.life_insurance)
        + deductions.health_insurance.min(caps.health_insurance)
        + deductions.social_security.min(caps.social_security)
        + deductions.provident_fund.min(provident_cap.max(Decimal::ZERO))
        + deductions.ssf_current.min(ssf_cap.max(Decimal::ZERO))
        + deductions.rmf_current.min(rmf_cap.max(Decimal::ZERO))
        + deductions.other_deductions;
    Ok(total)
}

/// Expense deduction, capped deductions, net income and progressive tax.
pub fn calculate_full_tax(
    gross_income: Money,
    deductions: &TaxDeductions,
    schedule: &TaxSchedule,
) -> EngineResult<TaxResult> {
    if gross_income < Decimal::ZERO {
        return Err(EngineError::InvalidParameter {
            field: "gross_income".into(),
            reason: format!("must be >= 0, got {}", gross_income),
        });
    }
    let expense_deduction = calculate_expense_deduction(gross_income, &schedule.expense);
    let total_deductions = calculate_total_deductions(deductions, gross_income, schedule)?;
    let net_income = (gross_income - expense_deduction - total_deductions).max(Decimal::ZERO);

    let (tax, tax_bracket) = calculate_tax(net_income, &schedule.brackets);
    let effective_rate = if gross_income > Decimal::ZERO {
        tax / gross_income
    } else {
        Decimal::ZERO
    };
    let marginal = marginal_rate(net_income, &schedule.brackets);

    debug!(%gross_income, %net_income, %tax, "income tax computed");

    Ok(TaxResult {
        gross_income,
        expense_deduction,
        total_deductions,
        net_income,
        tax,
        effective_rate,
        marginal_rate: marginal,
        tax_bracket,
    })
}

pub fn run_income_tax(
    input: &TaxInput,
    config: &EngineConfig,
) -> EngineResult<ComputationOutput<TaxResult>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();
    let schedule = &config.tax;

    let result = calculate_full_tax(input.gross_income, &input.deductions, schedule)?;

    if input.deductions.parents > schedule.deductions.max_parents {
        warnings.push(format!(
            "Only {} parents can be claimed; {} given",
            schedule.deductions.max_parents, input.deductions.parents
        ));
    }

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_decimal_metadata(
        "Progressive personal income tax with capped deductions",
        &serde_json::json!({
            "schedule": schedule.name,
            "expense_rate": schedule.expense.rate.to_string(),
            "expense_cap": schedule.expense.cap.to_string(),
            "brackets": schedule.brackets.len(),
        }),
        warnings,
        elapsed,
        result,
    ))
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate_deductions(d: &TaxDeductions) -> EngineResult<()> {
    let fields = [
        ("deductions.personal", d.personal.unwrap_or(Decimal::ZERO)),
        ("deductions.spouse", d.spouse),
        ("deductions.life_insurance", d.life_insurance),
        ("deductions.health_insurance", d.health_insurance),
        ("deductions.social_security", d.social_security),
        ("deductions.provident_fund", d.provident_fund),
        ("deductions.ssf_current", d.ssf_current),
        ("deductions.rmf_current", d.rmf_current),
        ("deductions.other_deductions", d.other_deductions),
    ];
    for (field, value) in fields {
        if value < Decimal::ZERO {
            return Err(EngineError::InvalidParameter {
                field: field.into(),
                reason: format!("must be >= 0, got {}", value),
            });
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
