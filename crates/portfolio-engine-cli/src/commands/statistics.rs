use clap::Args;
use serde_json::Value;

use portfolio_engine_core::config::EngineConfig;
use portfolio_engine_core::statistics::{self, StatisticsInput};
use portfolio_engine_core::ReturnFrequency;

use crate::commands::input_source;
use crate::input::file::{self, DocFormat};
use crate::input::prices::parse_price_csv;

#[derive(Args)]
pub struct StatisticsArgs {
    /// JSON/YAML file with a `prices` table, or a price CSV; stdin when omitted
    #[arg(long, conflicts_with = "prices")]
    pub input: Option<String>,

    /// CSV price history (header of asset names, optional leading `date` column)
    #[arg(long)]
    pub prices: Option<String>,

    /// Observations per year, overriding the configured frequency
    #[arg(long)]
    pub periods_per_year: Option<f64>,
}

pub fn run_statistics(
    args: StatisticsArgs,
    config: &EngineConfig,
) -> Result<Value, Box<dyn std::error::Error>> {
    let source = match args.prices {
        Some(ref path) => file::open(path)?,
        None => input_source(args.input.as_deref(), "return statistics")?,
    };
    // A CSV anywhere is taken as the bare price table
    let mut stats_input: StatisticsInput = if source.format == DocFormat::Csv {
        StatisticsInput {
            prices: parse_price_csv(&source)?,
            frequency: None,
        }
    } else {
        source.parse()?
    };
    if let Some(ppy) = args.periods_per_year {
        stats_input.frequency = Some(ReturnFrequency::Custom(ppy));
    }
    let result = statistics::run_statistics(&stats_input, config)?;
    Ok(serde_json::to_value(result)?)
}
