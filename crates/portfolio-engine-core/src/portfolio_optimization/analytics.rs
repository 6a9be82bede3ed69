//! Descriptive statistics for an existing allocation.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::EngineError;
use crate::linalg::quadratic_form;
use crate::types::{AssetReturn, AssetWeight, CovarianceMatrix};
use crate::EngineResult;

/// Rating used for assets without an explicit risk rating.
pub const DEFAULT_RISK_RATING: u8 = 5;

/// One row of a market-vs-optimised allocation table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationComparison {
    pub asset: String,
    pub market_weight: f64,
    pub optimal_weight: f64,
    /// optimal - market
    pub difference: f64,
}

/// `sum(w_i * r_i)`. Weights on assets without a return contribute nothing.
pub fn portfolio_expected_return(weights: &[AssetWeight], returns: &[AssetReturn]) -> f64 {
    let lookup: HashMap<&str, f64> = returns
        .iter()
        .map(|r| (r.name.as_str(), r.expected_return))
        .collect();
    weights
        .iter()
        .filter_map(|w| lookup.get(w.name.as_str()).map(|r| w.weight * r))
        .sum()
}

/// `sqrt(w' Sigma w)`. Covariance assets absent from `weights` get zero
/// weight; a weight on an asset outside the covariance is an error.
pub fn portfolio_volatility(
    weights: &[AssetWeight],
    covariance: &CovarianceMatrix,
) -> EngineResult<f64> {
    let mut w = vec![0.0; covariance.len()];
    for aw in weights {
        let idx = covariance.assets().index_of(&aw.name).ok_or_else(|| {
            EngineError::AssetMismatch(format!(
                "weights reference asset '{}' missing from the covariance",
                aw.name
            ))
        })?;
        w[idx] += aw.weight;
    }
    Ok(quadratic_form(covariance.values(), &w).max(0.0).sqrt())
}

/// `(E[R] - r_f) / vol`, or 0 for a riskless portfolio.
pub fn sharpe_ratio(
    weights: &[AssetWeight],
    returns: &[AssetReturn],
    covariance: &CovarianceMatrix,
    risk_free_rate: f64,
) -> EngineResult<f64> {
    let vol = portfolio_volatility(weights, covariance)?;
    if vol == 0.0 {
        return Ok(0.0);
    }
    Ok((portfolio_expected_return(weights, returns) - risk_free_rate) / vol)
}

/// Weight-averaged 1-10 risk rating, rounded half to even.
///
/// Unrated assets use [`DEFAULT_RISK_RATING`]; an allocation with no weight
/// scores the default.
pub fn risk_score(weights: &[AssetWeight], ratings: &HashMap<String, u8>) -> u8 {
    let total: f64 = weights.iter().map(|w| w.weight).sum();
    if total <= 0.0 {
        return DEFAULT_RISK_RATING;
    }
    let weighted: f64 = weights
        .iter()
        .map(|w| {
            let rating = ratings.get(&w.name).copied().unwrap_or(DEFAULT_RISK_RATING);
            w.weight * f64::from(rating)
        })
        .sum();
    (weighted / total).round_ties_even().clamp(0.0, 255.0) as u8
}

/// Side-by-side market and optimised weights, in the optimised order.
pub fn allocation_comparison(
    market: &[AssetWeight],
    optimal: &[AssetWeight],
) -> Vec<AllocationComparison> {
    optimal
        .iter()
        .map(|o| {
            let market_weight = market
                .iter()
                .find(|m| m.name == o.name)
                .map_or(0.0, |m| m.weight);
            AllocationComparison {
                asset: o.name.clone(),
                market_weight,
                optimal_weight: o.weight,
                difference: o.weight - market_weight,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weights(pairs: &[(&str, f64)]) -> Vec<AssetWeight> {
        pairs
            .iter()
            .map(|(n, w)| AssetWeight {
                name: n.to_string(),
                weight: *w,
            })
            .collect()
    }

    fn cov() -> CovarianceMatrix {
        CovarianceMatrix::from_names(&["X", "Y"], vec![vec![0.04, 0.01], vec![0.01, 0.09]]).unwrap()
    }

    #[test]
    fn test_expected_return_ignores_unknown() {
        let r = vec![AssetReturn {
            name: "X".into(),
            expected_return: 0.10,
        }];
        let er = portfolio_expected_return(&weights(&[("X", 0.5), ("Q", 0.5)]), &r);
        assert!((er - 0.05).abs() < 1e-15);
    }

    #[test]
    fn test_volatility() {
        let vol = portfolio_volatility(&weights(&[("X", 0.6), ("Y", 0.4)]), &cov()).unwrap();
        assert!((vol - 0.0336_f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_volatility_unknown_asset() {
        assert!(portfolio_volatility(&weights(&[("Q", 1.0)]), &cov()).is_err());
    }

    #[test]
    fn test_sharpe_zero_vol() {
        let zero = CovarianceMatrix::from_names(&["X"], vec![vec![0.0]]).unwrap();
        let r = vec![AssetReturn {
            name: "X".into(),
            expected_return: 0.05,
        }];
        assert_eq!(sharpe_ratio(&weights(&[("X", 1.0)]), &r, &zero, 0.02).unwrap(), 0.0);
    }

    #[test]
    fn test_risk_score_default_and_weighted() {
        let mut ratings = HashMap::new();
        ratings.insert("X".to_string(), 8);
        ratings.insert("Y".to_string(), 2);
        // 0.75 * 8 + 0.25 * 2 = 6.5 -> 6
        assert_eq!(risk_score(&weights(&[("X", 0.75), ("Y", 0.25)]), &ratings), 6);
        // Unrated asset scores 5: 0.5 * 8 + 0.5 * 5 = 6.5 -> 6
        assert_eq!(risk_score(&weights(&[("X", 0.5), ("Z", 0.5)]), &ratings), 6);
        assert_eq!(risk_score(&[], &ratings), DEFAULT_RISK_RATING);
    }

    #[test]
    fn test_allocation_comparison() {
        let rows = allocation_comparison(
            &weights(&[("X", 0.6), ("Y", 0.4)]),
            &weights(&[("X", 0.7), ("Y", 0.2), ("Z", 0.1)]),
        );
        assert_eq!(rows.len(), 3);
        assert!((rows[0].difference - 0.1).abs() < 1e-12);
        assert_eq!(rows[2].market_weight, 0.0);
    }
}
