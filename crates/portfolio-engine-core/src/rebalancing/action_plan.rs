use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Instant;
use tracing::debug;

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::rebalancing::drift::{calculate_drift, DriftRow};
use crate::rebalancing::WeightPairs;
use crate::types::{with_metadata, AssetWeight, ComputationOutput};
use crate::EngineResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeSide {
    Buy,
    Sell,
}

/// A single trade that moves one asset back towards its target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RebalanceAction {
    pub asset: String,
    pub action: TradeSide,
    pub current_weight: f64,
    pub target_weight: f64,
    pub drift: f64,
    /// |drift| * portfolio value
    pub trade_amount: f64,
    /// Whole units at the unit price, rounded down.
    pub trade_units: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebalanceInput {
    pub current_weights: Vec<AssetWeight>,
    pub target_weights: Vec<AssetWeight>,
    pub portfolio_value: f64,
    /// Unit price per asset; missing assets use the configured default
    /// price table, then the default unit price.
    #[serde(default)]
    pub prices: HashMap<String, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drift_threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_unit_price: Option<f64>,
}

/// Trade list together with the dashboard drift table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebalancePlan {
    pub actions: Vec<RebalanceAction>,
    pub drift: Vec<DriftRow>,
    pub total_buy_amount: f64,
    pub total_sell_amount: f64,
    /// Sells minus buys; positive frees cash.
    pub net_cash_flow: f64,
}

impl RebalancePlan {
    pub fn has_actions(&self) -> bool {
        !self.actions.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Trades for every asset whose |drift| exceeds `threshold`, largest first.
///
/// Positive drift sells, negative drift buys. Assets missing from either
/// allocation count as weight 0 on that side. Ties in trade amount keep the
/// allocation order.
pub fn generate_action_plan(
    current: &[AssetWeight],
    target: &[AssetWeight],
    portfolio_value: f64,
    prices: Option<&HashMap<String, f64>>,
    threshold: f64,
    default_unit_price: f64,
) -> EngineResult<Vec<RebalanceAction>> {
    if !(portfolio_value.is_finite() && portfolio_value >= 0.0) {
        return Err(EngineError::InvalidParameter {
            field: "portfolio_value".into(),
            reason: "must be finite and >= 0".into(),
        });
    }
    if !(threshold.is_finite() && threshold >= 0.0) {
        return Err(EngineError::InvalidParameter {
            field: "drift_threshold".into(),
            reason: "must be finite and >= 0".into(),
        });
    }
    check_price("default_unit_price", default_unit_price)?;
    if let Some(prices) = prices {
        for (asset, price) in prices {
            check_price(&format!("prices.{}", asset), *price)?;
        }
    }

    let pairs = WeightPairs::build(current, target)?;
    let mut actions: Vec<RebalanceAction> = pairs
        .rows
        .into_iter()
        .filter_map(|(asset, current_weight, target_weight)| {
            let drift = current_weight - target_weight;
            if drift.abs() <= threshold {
                return None;
            }
            let trade_amount = drift.abs() * portfolio_value;
            let price = prices
                .and_then(|p| p.get(&asset).copied())
                .unwrap_or(default_unit_price);
            Some(RebalanceAction {
                action: if drift > 0.0 {
                    TradeSide::Sell
                } else {
                    TradeSide::Buy
                },
                trade_units: (trade_amount / price).floor() as u64,
                asset,
                current_weight,
                target_weight,
                drift,
                trade_amount,
            })
        })
        .collect();
    actions.sort_by(|a, b| b.trade_amount.total_cmp(&a.trade_amount));

    debug!(actions = actions.len(), threshold, "action plan generated");
    Ok(actions)
}

/// Build the trade list and drift table, wrapped in the output envelope.
pub fn run_rebalance(
    input: &RebalanceInput,
    config: &EngineConfig,
) -> EngineResult<ComputationOutput<RebalancePlan>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let threshold = input
        .drift_threshold
        .unwrap_or(config.rebalance.drift_threshold);
    let default_price = input
        .default_unit_price
        .unwrap_or(config.rebalance.default_unit_price);

    let prices = config.rebalance.resolve_prices(&input.prices);

    let actions = generate_action_plan(
        &input.current_weights,
        &input.target_weights,
        input.portfolio_value,
        Some(&prices),
        threshold,
        default_price,
    )?;
    let drift = calculate_drift(
        &input.current_weights,
        &input.target_weights,
        &config.rebalance.bands,
    )?;

    for a in &actions {
        if !prices.contains_key(&a.asset) {
            warnings.push(format!(
                "No unit price for '{}': assumed {}",
                a.asset, default_price
            ));
        }
        if a.trade_units == 0 {
            warnings.push(format!(
                "Trade in '{}' is smaller than one unit",
                a.asset
            ));
        }
    }

    let total_buy_amount: f64 = actions
        .iter()
        .filter(|a| a.action == TradeSide::Buy)
        .map(|a| a.trade_amount)
        .sum();
    let total_sell_amount: f64 = actions
        .iter()
        .filter(|a| a.action == TradeSide::Sell)
        .map(|a| a.trade_amount)
        .sum();

    let plan = RebalancePlan {
        actions,
        drift,
        total_buy_amount,
        total_sell_amount,
        net_cash_flow: total_sell_amount - total_buy_amount,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Threshold drift rebalancing",
        &serde_json::json!({
            "portfolio_value": input.portfolio_value,
            "drift_threshold": threshold,
            "default_unit_price": default_price,
        }),
        warnings,
        elapsed,
        plan,
    ))
}

fn check_price(field: &str, price: f64) -> EngineResult<()> {
    if !(price.is_finite() && price > 0.0) {
        return Err(EngineError::InvalidParameter {
            field: field.into(),
            reason: format!("Unit price must be positive, got {}", price),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
