use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::EngineError;
use crate::types::ReturnFrequency;
use crate::EngineResult;

#[cfg(feature = "tax")]
use crate::tax::schedule::TaxSchedule;

/// Engine-wide defaults. Every field has a documented default so a partial
/// JSON/YAML document (or none at all) yields a usable configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub market: MarketSettings,
    pub optimizer: OptimizerSettings,
    pub rebalance: RebalanceSettings,
    pub simulation: SimulationSettings,
    #[cfg(feature = "tax")]
    pub tax: TaxSchedule,
}

impl EngineConfig {
    pub fn from_json_str(s: &str) -> EngineResult<Self> {
        let config: EngineConfig = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that no computation could use.
    pub fn validate(&self) -> EngineResult<()> {
        let m = &self.market;
        if !(m.risk_aversion.is_finite() && m.risk_aversion >= 0.0) {
            return Err(invalid("market.risk_aversion", "must be finite and >= 0"));
        }
        if !m.risk_free_rate.is_finite() {
            return Err(invalid("market.risk_free_rate", "must be finite"));
        }
        if !(m.tau.is_finite() && m.tau > 0.0) {
            return Err(invalid("market.tau", "must be positive"));
        }
        let ppy = m.frequency.periods_per_year();
        if !(ppy.is_finite() && ppy > 0.0) {
            return Err(invalid("market.frequency", "periods per year must be positive"));
        }
        self.optimizer.validate()?;
        let r = &self.rebalance;
        if r.bands.on_target < 0.0 || r.bands.rebalance < r.bands.on_target {
            return Err(invalid(
                "rebalance.bands",
                "need 0 <= on_target <= rebalance",
            ));
        }
        if r.drift_threshold < 0.0 {
            return Err(invalid("rebalance.drift_threshold", "must be >= 0"));
        }
        if !(r.default_unit_price > 0.0) {
            return Err(invalid("rebalance.default_unit_price", "must be positive"));
        }
        if r.default_prices.values().any(|p| !(p.is_finite() && *p > 0.0)) {
            return Err(invalid("rebalance.default_prices", "prices must be positive"));
        }
        if m.risk_ratings.values().any(|r| !(1..=10).contains(r)) {
            return Err(invalid("market.risk_ratings", "ratings must be in 1..=10"));
        }
        if self.simulation.num_simulations == 0 {
            return Err(invalid("simulation.num_simulations", "must be >= 1"));
        }
        #[cfg(feature = "tax")]
        self.tax.validate()?;
        Ok(())
    }
}

fn invalid(field: &str, reason: &str) -> EngineError {
    EngineError::InvalidParameter {
        field: field.into(),
        reason: reason.into(),
    }
}

/// What to do with a view on an asset outside the covariance index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownViewPolicy {
    /// Drop the view (zero pick-matrix row) and report it as a warning.
    #[default]
    Ignore,
    /// Fail with `AssetMismatch`.
    Reject,
}

/// Market model defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketSettings {
    /// Risk aversion coefficient (delta).
    pub risk_aversion: f64,
    /// Annual risk-free rate.
    pub risk_free_rate: f64,
    /// Uncertainty scaling of the equilibrium prior (tau).
    pub tau: f64,
    /// Sampling interval of price histories.
    pub frequency: ReturnFrequency,
    pub unknown_view_policy: UnknownViewPolicy,
    /// 1-10 rating per asset for the portfolio risk score.
    pub risk_ratings: HashMap<String, u8>,
}

impl Default for MarketSettings {
    fn default() -> Self {
        Self {
            risk_aversion: 2.5,
            risk_free_rate: 0.02,
            tau: 0.05,
            frequency: ReturnFrequency::Daily,
            unknown_view_policy: UnknownViewPolicy::Ignore,
            risk_ratings: HashMap::from([
                ("Thai Stock".to_string(), 7),
                ("US Tech".to_string(), 8),
                ("Gold".to_string(), 5),
                ("Bonds".to_string(), 2),
            ]),
        }
    }
}

/// Mean-variance solver settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerSettings {
    pub max_iterations: u32,
    /// Stop once the projected-gradient residual `max |w - P(w - grad/L)|`
    /// is at most this.
    pub tolerance: f64,
    /// Weights below this are zeroed before renormalising.
    pub min_weight: f64,
    /// Return `SolverNonConvergence` instead of the equal-weight fallback.
    pub fail_on_non_convergence: bool,
}

impl Default for OptimizerSettings {
    fn default() -> Self {
        Self {
            max_iterations: 10_000,
            tolerance: 1e-10,
            min_weight: 0.01,
            fail_on_non_convergence: false,
        }
    }
}

impl OptimizerSettings {
    pub fn validate(&self) -> EngineResult<()> {
        if self.max_iterations == 0 {
            return Err(invalid("optimizer.max_iterations", "must be >= 1"));
        }
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(invalid("optimizer.tolerance", "must be positive"));
        }
        if !(0.0..1.0).contains(&self.min_weight) {
            return Err(invalid("optimizer.min_weight", "must be in [0, 1)"));
        }
        Ok(())
    }
}

/// Drift bands used for the dashboard status column.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct DriftBands {
    /// |drift| at or below this is on target.
    pub on_target: f64,
    /// |drift| above this needs rebalancing; between the two is "monitor".
    pub rebalance: f64,
}

impl Default for DriftBands {
    fn default() -> Self {
        Self {
            on_target: 0.02,
            rebalance: 0.05,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RebalanceSettings {
    /// Minimum |drift| that produces a trade.
    pub drift_threshold: f64,
    pub bands: DriftBands,
    /// Unit prices used when a request quotes none for an asset.
    pub default_prices: HashMap<String, f64>,
    /// Unit price for assets in neither the request nor `default_prices`.
    pub default_unit_price: f64,
}

impl Default for RebalanceSettings {
    fn default() -> Self {
        Self {
            drift_threshold: 0.05,
            bands: DriftBands::default(),
            default_prices: HashMap::from([
                ("Thai Stock".to_string(), 100.0),
                ("US Tech".to_string(), 450.0),
                ("Gold".to_string(), 180.0),
                ("Bonds".to_string(), 100.0),
            ]),
            default_unit_price: 100.0,
        }
    }
}

impl RebalanceSettings {
    /// Request prices layered over `default_prices`; the request wins.
    pub fn resolve_prices(&self, quoted: &HashMap<String, f64>) -> HashMap<String, f64> {
        let mut prices = self.default_prices.clone();
        prices.extend(quoted.iter().map(|(k, v)| (k.clone(), *v)));
        prices
    }
}

/// Defaults for retirement projections.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationSettings {
    pub num_simulations: u32,
    pub annual_return: f64,
    pub annual_volatility: f64,
    pub seed: u64,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            num_simulations: 1_000,
            annual_return: 0.07,
            annual_volatility: 0.15,
            seed: 42,
        }
    }
}
