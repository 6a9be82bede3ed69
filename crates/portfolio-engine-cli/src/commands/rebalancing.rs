use clap::Args;
use serde_json::Value;

use portfolio_engine_core::config::EngineConfig;
use portfolio_engine_core::rebalancing::action_plan::{self, RebalanceInput};
use portfolio_engine_core::rebalancing::drift::{self, DriftInput};

use crate::commands::read_input;

#[derive(Args)]
pub struct DriftArgs {
    #[arg(long)]
    pub input: Option<String>,
}

#[derive(Args)]
pub struct RebalanceArgs {
    #[arg(long)]
    pub input: Option<String>,

    /// Minimum |drift| that triggers a trade
    #[arg(long)]
    pub threshold: Option<f64>,
}

pub fn run_drift(args: DriftArgs, config: &EngineConfig) -> Result<Value, Box<dyn std::error::Error>> {
    let drift_input: DriftInput = read_input(args.input.as_deref(), "drift analysis")?;
    let result = drift::run_drift(&drift_input, config)?;
    Ok(serde_json::to_value(result)?)
}

pub fn run_rebalance(
    args: RebalanceArgs,
    config: &EngineConfig,
) -> Result<Value, Box<dyn std::error::Error>> {
    let mut rb_input: RebalanceInput = read_input(args.input.as_deref(), "rebalancing")?;
    if args.threshold.is_some() {
        rb_input.drift_threshold = args.threshold;
    }
    let result = action_plan::run_rebalance(&rb_input, config)?;
    Ok(serde_json::to_value(result)?)
}
