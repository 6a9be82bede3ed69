use clap::Args;
use serde_json::Value;

use portfolio_engine_core::config::EngineConfig;
use portfolio_engine_core::monte_carlo::projection::{self, ProjectionRequest};

use crate::commands::read_input;

#[derive(Args)]
pub struct MonteCarloArgs {
    #[arg(long)]
    pub input: Option<String>,

    /// Override the seed in the input and config
    #[arg(long)]
    pub seed: Option<u64>,

    /// Include every simulated path in the output
    #[arg(long)]
    pub include_paths: bool,
}

pub fn run_monte_carlo(
    args: MonteCarloArgs,
    config: &EngineConfig,
) -> Result<Value, Box<dyn std::error::Error>> {
    let mut request: ProjectionRequest =
        read_input(args.input.as_deref(), "Monte Carlo projection")?;
    if args.seed.is_some() {
        request.seed = args.seed;
    }
    request.include_paths |= args.include_paths;
    let result = projection::run_projection(&request, config)?;
    Ok(serde_json::to_value(result)?)
}
