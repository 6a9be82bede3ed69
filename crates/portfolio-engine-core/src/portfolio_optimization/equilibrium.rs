use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::linalg::mat_vec_multiply;
use crate::types::{with_metadata, AssetReturn, AssetWeight, ComputationOutput, CovarianceMatrix};
use crate::EngineResult;

/// Input to [`run_equilibrium`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EquilibriumInput {
    pub covariance: CovarianceMatrix,
    pub market_weights: Vec<AssetWeight>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_aversion: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_free_rate: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EquilibriumOutput {
    pub equilibrium_returns: Vec<AssetReturn>,
    /// Equilibrium return of the market portfolio itself (w' pi).
    pub market_return: f64,
}

/// Implied equilibrium returns `pi = delta * Sigma * w + r_f`.
///
/// Market weights are matched to the covariance by asset name. No sum check
/// is applied here; any finite weight vector is accepted. The result is in the
/// covariance's asset order.
pub fn compute_equilibrium(
    covariance: &CovarianceMatrix,
    market_weights: &[AssetWeight],
    risk_aversion: f64,
    risk_free_rate: f64,
) -> EngineResult<Vec<AssetReturn>> {
    if !(risk_aversion.is_finite() && risk_aversion >= 0.0) {
        return Err(EngineError::InvalidParameter {
            field: "risk_aversion".into(),
            reason: "must be finite and >= 0".into(),
        });
    }
    if !risk_free_rate.is_finite() {
        return Err(EngineError::InvalidParameter {
            field: "risk_free_rate".into(),
            reason: "must be finite".into(),
        });
    }
    let w = covariance
        .assets()
        .align_weights(market_weights, "market_weights")?;
    if w.iter().any(|x| !x.is_finite()) {
        return Err(EngineError::InvalidParameter {
            field: "market_weights".into(),
            reason: "must be finite".into(),
        });
    }
    let pi = equilibrium_vector(covariance.values(), &w, risk_aversion, risk_free_rate);
    Ok(covariance.assets().label_returns(&pi))
}

/// Index-aligned form used by the Black-Litterman blender.
pub(crate) fn equilibrium_vector(
    sigma: &[Vec<f64>],
    w: &[f64],
    risk_aversion: f64,
    risk_free_rate: f64,
) -> Vec<f64> {
    mat_vec_multiply(sigma, w)
        .into_iter()
        .map(|s| risk_aversion * s + risk_free_rate)
        .collect()
}

pub fn run_equilibrium(
    input: &EquilibriumInput,
    config: &EngineConfig,
) -> EngineResult<ComputationOutput<EquilibriumOutput>> {
    let start = Instant::now();
    let delta = input.risk_aversion.unwrap_or(config.market.risk_aversion);
    let rf = input.risk_free_rate.unwrap_or(config.market.risk_free_rate);

    let equilibrium_returns = compute_equilibrium(&input.covariance, &input.market_weights, delta, rf)?;
    let market_return = equilibrium_returns
        .iter()
        .map(|r| {
            let w = input
                .market_weights
                .iter()
                .find(|m| m.name == r.name)
                .map_or(0.0, |m| m.weight);
            w * r.expected_return
        })
        .sum();

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Reverse-optimised CAPM equilibrium returns",
        &serde_json::json!({
            "risk_aversion": delta,
            "risk_free_rate": rf,
            "n_assets": input.covariance.len(),
        }),
        Vec::new(),
        elapsed,
        EquilibriumOutput {
            equilibrium_returns,
            market_return,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn two_asset_cov() -> CovarianceMatrix {
        CovarianceMatrix::from_names(&["X", "Y"], vec![vec![0.04, 0.01], vec![0.01, 0.09]]).unwrap()
    }

    fn weights(pairs: &[(&str, f64)]) -> Vec<AssetWeight> {
        pairs
            .iter()
            .map(|(n, w)| AssetWeight {
                name: n.to_string(),
                weight: *w,
            })
            .collect()
    }

    #[test]
    fn test_two_asset_equilibrium() {
        let pi = compute_equilibrium(&two_asset_cov(), &weights(&[("X", 0.6), ("Y", 0.4)]), 2.5, 0.02)
            .unwrap();
        assert_eq!(pi[0].name, "X");
        assert!((pi[0].expected_return - 0.09).abs() < 1e-12);
        assert!((pi[1].expected_return - 0.125).abs() < 1e-12);
    }

    #[test]
    fn test_zero_risk_aversion_gives_risk_free() {
        let pi = compute_equilibrium(&two_asset_cov(), &weights(&[("X", 0.6), ("Y", 0.4)]), 0.0, 0.03)
            .unwrap();
        for r in &pi {
            assert_eq!(r.expected_return, 0.03);
        }
    }

    #[test]
    fn test_zero_covariance_gives_risk_free() {
        let cov = CovarianceMatrix::from_names(&["X", "Y"], vec![vec![0.0; 2]; 2]).unwrap();
        let pi = compute_equilibrium(&cov, &weights(&[("X", 0.6), ("Y", 0.4)]), 2.5, 0.025)
            .unwrap();
        for r in &pi {
            assert_eq!(r.expected_return, 0.025);
        }
    }

    #[test]
    fn test_weights_matched_by_name() {
        let a = compute_equilibrium(&two_asset_cov(), &weights(&[("Y", 0.4), ("X", 0.6)]), 2.5, 0.02)
            .unwrap();
        let b = compute_equilibrium(&two_asset_cov(), &weights(&[("X", 0.6), ("Y", 0.4)]), 2.5, 0.02)
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_mismatched_assets_rejected() {
        let res = compute_equilibrium(&two_asset_cov(), &weights(&[("X", 0.6), ("Z", 0.4)]), 2.5, 0.02);
        assert!(matches!(res, Err(EngineError::AssetMismatch(_))));
    }

    #[test]
    fn test_negative_risk_aversion_rejected() {
        let res = compute_equilibrium(&two_asset_cov(), &weights(&[("X", 0.6), ("Y", 0.4)]), -0.5, 0.02);
        assert!(matches!(res, Err(EngineError::InvalidParameter { .. })));
    }

    #[test]
    fn test_run_reports_market_return() {
        let input = EquilibriumInput {
            covariance: two_asset_cov(),
            market_weights: weights(&[("X", 0.6), ("Y", 0.4)]),
            risk_aversion: None,
            risk_free_rate: None,
        };
        let out = run_equilibrium(&input, &EngineConfig::default()).unwrap();
        // 0.6 * 0.09 + 0.4 * 0.125
        assert!((out.result.market_return - 0.104).abs() < 1e-12);
    }
}
