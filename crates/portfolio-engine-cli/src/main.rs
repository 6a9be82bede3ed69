mod commands;
mod input;
mod output;

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;
use tracing_subscriber::EnvFilter;

use commands::allocation::{BlackLittermanArgs, EquilibriumArgs, OptimizeArgs};
use commands::projection::MonteCarloArgs;
use commands::rebalancing::{DriftArgs, RebalanceArgs};
use commands::statistics::StatisticsArgs;
use commands::tax::{SsfRmfArgs, TaxArgs};

/// Personal portfolio allocation, projection, rebalancing and tax planning
#[derive(Parser)]
#[command(
    name = "pfe",
    version,
    about = "Personal portfolio allocation, projection, rebalancing and tax planning",
    long_about = "A CLI for market-implied and view-adjusted asset allocation \
                  (Black-Litterman), long-only mean-variance optimisation, \
                  Monte Carlo wealth projection, drift-based rebalancing and \
                  Thai personal income tax / SSF / RMF planning."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,

    /// Engine settings (JSON, or YAML by .yaml/.yml extension)
    #[arg(long, global = true)]
    config: Option<String>,

    /// Log engine diagnostics to stderr (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Annualised expected returns and covariance from a price history
    Statistics(StatisticsArgs),
    /// Market-implied equilibrium returns
    Equilibrium(EquilibriumArgs),
    /// Blend equilibrium returns with views and optimise
    BlackLitterman(BlackLittermanArgs),
    /// Long-only mean-variance optimisation
    Optimize(OptimizeArgs),
    /// Monte Carlo wealth projection with monthly contributions
    MonteCarlo(MonteCarloArgs),
    /// Allocation drift against a target
    Drift(DriftArgs),
    /// Trade list to bring a portfolio back to target
    Rebalance(RebalanceArgs),
    /// Personal income tax with deductions
    Tax(TaxArgs),
    /// SSF/RMF contribution room and tax saving
    SsfRmf(SsfRmfArgs),
    /// Print the configured tax brackets
    TaxBrackets,
    /// Print version information
    Version,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Csv,
    Minimal,
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "portfolio_engine_core=warn",
        1 => "portfolio_engine_core=debug,pfe=debug",
        _ => "portfolio_engine_core=trace,pfe=trace",
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match input::config::load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    };

    let result: Result<serde_json::Value, Box<dyn std::error::Error>> = match cli.command {
        Commands::Statistics(args) => commands::statistics::run_statistics(args, &config),
        Commands::Equilibrium(args) => commands::allocation::run_equilibrium(args, &config),
        Commands::BlackLitterman(args) => commands::allocation::run_black_litterman(args, &config),
        Commands::Optimize(args) => commands::allocation::run_optimize(args, &config),
        Commands::MonteCarlo(args) => commands::projection::run_monte_carlo(args, &config),
        Commands::Drift(args) => commands::rebalancing::run_drift(args, &config),
        Commands::Rebalance(args) => commands::rebalancing::run_rebalance(args, &config),
        Commands::Tax(args) => commands::tax::run_tax(args, &config),
        Commands::SsfRmf(args) => commands::tax::run_ssf_rmf(args, &config),
        Commands::TaxBrackets => commands::tax::run_tax_brackets(&config),
        Commands::Version => {
            println!("pfe {}", env!("CARGO_PKG_VERSION"));
            return;
        }
    };

    match result {
        Ok(value) => {
            output::format_output(&cli.output, &value);
            process::exit(0);
        }
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    }
}
