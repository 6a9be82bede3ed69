use clap::Args;
use serde_json::Value;

use portfolio_engine_core::config::EngineConfig;
use portfolio_engine_core::portfolio_optimization::black_litterman::{self, BlackLittermanInput};
use portfolio_engine_core::portfolio_optimization::equilibrium::{self, EquilibriumInput};
use portfolio_engine_core::portfolio_optimization::mean_variance::{self, MeanVarianceInput};

use crate::commands::read_input;

#[derive(Args)]
pub struct EquilibriumArgs {
    #[arg(long)]
    pub input: Option<String>,
}

#[derive(Args)]
pub struct BlackLittermanArgs {
    #[arg(long)]
    pub input: Option<String>,

    /// Fail instead of falling back to equal weights when the optimiser stalls
    #[arg(long)]
    pub strict: bool,
}

#[derive(Args)]
pub struct OptimizeArgs {
    #[arg(long)]
    pub input: Option<String>,

    #[arg(long)]
    pub strict: bool,
}

pub fn run_equilibrium(
    args: EquilibriumArgs,
    config: &EngineConfig,
) -> Result<Value, Box<dyn std::error::Error>> {
    let eq_input: EquilibriumInput = read_input(args.input.as_deref(), "equilibrium returns")?;
    let result = equilibrium::run_equilibrium(&eq_input, config)?;
    Ok(serde_json::to_value(result)?)
}

pub fn run_black_litterman(
    args: BlackLittermanArgs,
    config: &EngineConfig,
) -> Result<Value, Box<dyn std::error::Error>> {
    let bl_input: BlackLittermanInput = read_input(args.input.as_deref(), "Black-Litterman")?;
    let result = black_litterman::run_black_litterman(&bl_input, &strict_config(config, args.strict))?;
    Ok(serde_json::to_value(result)?)
}

pub fn run_optimize(
    args: OptimizeArgs,
    config: &EngineConfig,
) -> Result<Value, Box<dyn std::error::Error>> {
    let mv_input: MeanVarianceInput =
        read_input(args.input.as_deref(), "mean-variance optimization")?;
    let result = mean_variance::run_mean_variance(&mv_input, &strict_config(config, args.strict))?;
    Ok(serde_json::to_value(result)?)
}

fn strict_config(config: &EngineConfig, strict: bool) -> EngineConfig {
    let mut config = config.clone();
    if strict {
        config.optimizer.fail_on_non_convergence = true;
    }
    config
}
