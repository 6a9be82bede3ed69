use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::debug;

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::types::{
    with_metadata, AssetReturn, AssetSet, ComputationOutput, CovarianceMatrix, ReturnFrequency,
};
use crate::EngineResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Price history: one row per observation, one column per asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceTable {
    pub assets: Vec<String>,
    /// Observation dates, if known. Must match the row count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dates: Option<Vec<NaiveDate>>,
    pub prices: Vec<Vec<f64>>,
}

/// Annualised estimates derived from a price history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketStatistics {
    pub expected_returns: Vec<AssetReturn>,
    pub covariance: CovarianceMatrix,
    /// Number of log-return observations used.
    pub observations: usize,
    pub periods_per_year: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
}

/// Input to [`run_statistics`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatisticsInput {
    pub prices: PriceTable,
    /// Overrides the configured sampling frequency.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency: Option<ReturnFrequency>,
}

// ---------------------------------------------------------------------------
// Core
// ---------------------------------------------------------------------------

/// Estimate annualised expected log returns and covariance from prices.
///
/// Returns are `ln(P_t / P_{t-1})`; the mean and the sample covariance
/// (n - 1 denominator) are both scaled by `periods_per_year`. With a single
/// return observation the covariance is reported as zero.
pub fn estimate_statistics(
    prices: &PriceTable,
    periods_per_year: f64,
) -> EngineResult<MarketStatistics> {
    if !(periods_per_year.is_finite() && periods_per_year > 0.0) {
        return Err(EngineError::InvalidParameter {
            field: "periods_per_year".into(),
            reason: "must be positive".into(),
        });
    }
    let assets = AssetSet::new(prices.assets.clone())?;
    let n = assets.len();

    if prices.prices.len() < 2 {
        return Err(EngineError::InsufficientData(format!(
            "At least 2 price rows required, got {}",
            prices.prices.len()
        )));
    }
    if let Some(dates) = &prices.dates {
        if dates.len() != prices.prices.len() {
            return Err(EngineError::AssetMismatch(format!(
                "{} dates for {} price rows",
                dates.len(),
                prices.prices.len()
            )));
        }
    }
    for (row_idx, row) in prices.prices.iter().enumerate() {
        if row.len() != n {
            return Err(EngineError::AssetMismatch(format!(
                "Price row {} has {} columns, expected {}",
                row_idx,
                row.len(),
                n
            )));
        }
        for (col, price) in row.iter().enumerate() {
            if !price.is_finite() || *price <= 0.0 {
                return Err(EngineError::InvalidPrice {
                    asset: prices.assets[col].clone(),
                    row: row_idx,
                    price: *price,
                });
            }
        }
    }

    let returns = log_returns(&prices.prices);
    let t = returns.len();

    let mut means = vec![0.0; n];
    for row in &returns {
        for (m, r) in means.iter_mut().zip(row.iter()) {
            *m += r;
        }
    }
    for m in means.iter_mut() {
        *m /= t as f64;
    }

    let mut cov = vec![vec![0.0; n]; n];
    if t > 1 {
        for i in 0..n {
            for j in i..n {
                let s: f64 = returns
                    .iter()
                    .map(|row| (row[i] - means[i]) * (row[j] - means[j]))
                    .sum();
                let c = s / (t - 1) as f64 * periods_per_year;
                cov[i][j] = c;
                cov[j][i] = c;
            }
        }
    }

    let annual_means: Vec<f64> = means.iter().map(|m| m * periods_per_year).collect();
    debug!(assets = n, observations = t, "estimated market statistics");

    let (start_date, end_date) = match &prices.dates {
        Some(d) => (d.first().copied(), d.last().copied()),
        None => (None, None),
    };

    Ok(MarketStatistics {
        expected_returns: assets.label_returns(&annual_means),
        covariance: CovarianceMatrix::new(assets, cov)?,
        observations: t,
        periods_per_year,
        start_date,
        end_date,
    })
}

/// Log returns between consecutive rows; the first (undefined) row is dropped.
fn log_returns(prices: &[Vec<f64>]) -> Vec<Vec<f64>> {
    prices
        .windows(2)
        .map(|w| {
            w[1].iter()
                .zip(w[0].iter())
                .map(|(curr, prev)| (curr / prev).ln())
                .collect()
        })
        .collect()
}

/// Estimate statistics and wrap them in the standard output envelope.
pub fn run_statistics(
    input: &StatisticsInput,
    config: &EngineConfig,
) -> EngineResult<ComputationOutput<MarketStatistics>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let frequency = input.frequency.unwrap_or(config.market.frequency);
    let stats = estimate_statistics(&input.prices, frequency.periods_per_year())?;

    if stats.observations == 1 {
        warnings.push(
            "Only one return observation: covariance is undefined and reported as zero".into(),
        );
    }

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Annualised log-return mean and sample covariance",
        &serde_json::json!({
            "frequency": frequency,
            "periods_per_year": frequency.periods_per_year(),
            "rows": input.prices.prices.len(),
        }),
        warnings,
        elapsed,
        stats,
    ))
}
