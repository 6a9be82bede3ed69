use clap::Args;
use serde_json::Value;

use portfolio_engine_core::config::EngineConfig;
use portfolio_engine_core::tax::contribution::{self, ContributionInput};
use portfolio_engine_core::tax::income_tax::{self, TaxInput};

use crate::commands::read_input;

#[derive(Args)]
pub struct TaxArgs {
    #[arg(long)]
    pub input: Option<String>,
}

#[derive(Args)]
pub struct SsfRmfArgs {
    #[arg(long)]
    pub input: Option<String>,

    /// Split the remaining room only, without pricing the tax saving
    #[arg(long)]
    pub simple: bool,
}

pub fn run_tax(args: TaxArgs, config: &EngineConfig) -> Result<Value, Box<dyn std::error::Error>> {
    let tax_input: TaxInput = read_input(args.input.as_deref(), "income tax")?;
    let result = income_tax::run_income_tax(&tax_input, config)?;
    Ok(serde_json::to_value(result)?)
}

pub fn run_ssf_rmf(
    args: SsfRmfArgs,
    config: &EngineConfig,
) -> Result<Value, Box<dyn std::error::Error>> {
    let c_input: ContributionInput = read_input(args.input.as_deref(), "SSF/RMF planning")?;
    if args.simple {
        let d = &c_input.deductions;
        let result = contribution::calculate_optimal_allocation(
            c_input.gross_income,
            d.provident_fund,
            d.ssf_current,
            d.rmf_current,
            &config.tax,
        )?;
        return Ok(serde_json::to_value(result)?);
    }
    let result = contribution::run_contribution(&c_input, config)?;
    Ok(serde_json::to_value(result)?)
}

pub fn run_tax_brackets(config: &EngineConfig) -> Result<Value, Box<dyn std::error::Error>> {
    Ok(serde_json::to_value(config.tax.bracket_table())?)
}
