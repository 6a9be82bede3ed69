use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::types::{Money, Rate};
use crate::EngineResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One progressive bracket. `upper_bound` is inclusive; `None` is unbounded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxBracket {
    pub upper_bound: Option<Money>,
    pub rate: Rate,
}

/// Lump-sum expense deduction: `min(income * rate, cap)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpenseRule {
    pub rate: Rate,
    pub cap: Money,
}

/// Allowance amounts and caps for personal deductions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeductionCaps {
    pub personal: Money,
    pub spouse: Money,
    pub per_child: Money,
    pub per_parent: Money,
    pub max_parents: u32,
    pub life_insurance: Money,
    pub health_insurance: Money,
    pub social_security: Money,
    pub provident_fund_pct: Rate,
    pub provident_fund_cap: Money,
}

/// Retirement-fund contribution limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContributionCaps {
    pub ssf_pct: Rate,
    pub ssf_cap: Money,
    pub rmf_pct: Rate,
    pub rmf_cap: Money,
    /// SSF + RMF + provident fund together.
    pub combined_cap: Money,
}

/// A complete personal income tax regime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaxSchedule {
    pub name: String,
    pub brackets: Vec<TaxBracket>,
    pub expense: ExpenseRule,
    pub deductions: DeductionCaps,
    pub contributions: ContributionCaps,
}

/// Display row for a bracket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BracketRow {
    pub lower: Money,
    pub upper: Option<Money>,
    pub rate: Rate,
    pub label: String,
}

// ---------------------------------------------------------------------------
// Presets
// ---------------------------------------------------------------------------

impl Default for DeductionCaps {
    fn default() -> Self {
        Self {
            personal: dec!(60000),
            spouse: dec!(60000),
            per_child: dec!(30000),
            per_parent: dec!(30000),
            max_parents: 4,
            life_insurance: dec!(100000),
            health_insurance: dec!(25000),
            social_security: dec!(9000),
            provident_fund_pct: dec!(0.15),
            provident_fund_cap: dec!(500000),
        }
    }
}

impl Default for ContributionCaps {
    fn default() -> Self {
        Self {
            ssf_pct: dec!(0.30),
            ssf_cap: dec!(200000),
            rmf_pct: dec!(0.30),
            rmf_cap: dec!(500000),
            combined_cap: dec!(500000),
        }
    }
}

impl Default for ExpenseRule {
    fn default() -> Self {
        Self {
            rate: dec!(0.50),
            cap: dec!(100000),
        }
    }
}

impl Default for TaxSchedule {
    fn default() -> Self {
        Self::thailand_2024()
    }
}

impl TaxSchedule {
    /// Thai personal income tax, tax year 2024 (B.E. 2567).
    pub fn thailand_2024() -> Self {
        let bracket = |upper: Option<Decimal>, rate: Decimal| TaxBracket {
            upper_bound: upper,
            rate,
        };
        Self {
            name: "thailand_2024".into(),
            brackets: vec![
                bracket(Some(dec!(150000)), dec!(0.00)),
                bracket(Some(dec!(300000)), dec!(0.05)),
                bracket(Some(dec!(500000)), dec!(0.10)),
                bracket(Some(dec!(750000)), dec!(0.15)),
                bracket(Some(dec!(1000000)), dec!(0.20)),
                bracket(Some(dec!(2000000)), dec!(0.25)),
                bracket(Some(dec!(5000000)), dec!(0.30)),
                bracket(None, dec!(0.35)),
            ],
            expense: ExpenseRule::default(),
            deductions: DeductionCaps::default(),
            contributions: ContributionCaps::default(),
        }
    }

    /// Brackets must ascend strictly, end unbounded, and carry rates in [0, 1].
    pub fn validate(&self) -> EngineResult<()> {
        if self.brackets.is_empty() {
            return Err(invalid("tax.brackets", "at least one bracket required"));
        }
        let last = self.brackets.len() - 1;
        let mut prev = Decimal::ZERO;
        for (i, b) in self.brackets.iter().enumerate() {
            if b.rate < Decimal::ZERO || b.rate > Decimal::ONE {
                return Err(invalid(
                    &format!("tax.brackets[{}].rate", i),
                    "must be in [0, 1]",
                ));
            }
            match b.upper_bound {
                Some(upper) if i == last => {
                    return Err(invalid(
                        "tax.brackets",
                        &format!("last bracket must be unbounded, got {}", upper),
                    ));
                }
                Some(upper) => {
                    if upper <= prev {
                        return Err(invalid(
                            &format!("tax.brackets[{}].upper_bound", i),
                            "bounds must be strictly ascending and positive",
                        ));
                    }
                    prev = upper;
                }
                None if i != last => {
                    return Err(invalid(
                        &format!("tax.brackets[{}].upper_bound", i),
                        "only the last bracket may be unbounded",
                    ));
                }
                None => {}
            }
        }

        let e = &self.expense;
        if e.rate < Decimal::ZERO || e.cap < Decimal::ZERO {
            return Err(invalid("tax.expense", "rate and cap must be >= 0"));
        }
        let c = &self.contributions;
        if [c.ssf_pct, c.ssf_cap, c.rmf_pct, c.rmf_cap, c.combined_cap]
            .iter()
            .any(|v| *v < Decimal::ZERO)
        {
            return Err(invalid("tax.contributions", "limits must be >= 0"));
        }
        Ok(())
    }

    /// Lower/upper/rate rows for display.
    pub fn bracket_table(&self) -> Vec<BracketRow> {
        let mut lower = Decimal::ZERO;
        self.brackets
            .iter()
            .map(|b| {
                let row = BracketRow {
                    lower,
                    upper: b.upper_bound,
                    rate: b.rate,
                    label: rate_label(b.rate),
                };
                if let Some(upper) = b.upper_bound {
                    lower = upper;
                }
                row
            })
            .collect()
    }
}

/// `0.05` -> `"5%"`.
pub fn rate_label(rate: Rate) -> String {
    format!("{}%", (rate * dec!(100)).round_dp(0).normalize())
}

fn invalid(field: &str, reason: &str) -> EngineError {
    EngineError::InvalidParameter {
        field: field.into(),
        reason: reason.into(),
    }
}
