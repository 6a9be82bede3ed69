use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, warn};

use crate::config::{EngineConfig, MarketSettings, OptimizerSettings, UnknownViewPolicy};
use crate::error::EngineError;
use crate::linalg::{mat_add, mat_inverse, mat_multiply, mat_scale, mat_transpose, mat_vec_multiply};
use crate::portfolio_optimization::analytics::{allocation_comparison, AllocationComparison};
use crate::portfolio_optimization::equilibrium::equilibrium_vector;
use crate::portfolio_optimization::mean_variance::{optimize_aligned, OptimizedPortfolio};
use crate::types::{
    validate_allocation, with_metadata, AssetReturn, AssetWeight, ComputationOutput,
    CovarianceMatrix,
};
use crate::EngineResult;

/// Confidence assumed for a view that does not state one.
pub const DEFAULT_VIEW_CONFIDENCE: f64 = 0.5;

/// Confidence floor applied when scaling view uncertainty.
const MIN_CONFIDENCE: f64 = 0.1;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// An absolute view: "asset will return `expected_return`".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct View {
    pub asset: String,
    pub expected_return: f64,
    /// In (0, 1]. Higher means the view pulls the posterior harder.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

/// Qualitative outlook on an asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outlook {
    Bullish,
    Bearish,
    Neutral,
}

impl View {
    /// `+magnitude` for bullish, `-magnitude` for bearish, no view for neutral.
    pub fn from_outlook(asset: &str, outlook: Outlook, magnitude: f64) -> Option<View> {
        let expected_return = match outlook {
            Outlook::Bullish => magnitude,
            Outlook::Bearish => -magnitude,
            Outlook::Neutral => return None,
        };
        Some(View {
            asset: asset.to_string(),
            expected_return,
            confidence: None,
        })
    }

    fn effective_confidence(&self) -> f64 {
        self.confidence.unwrap_or(DEFAULT_VIEW_CONFIDENCE)
    }
}

/// Outlook form of a view, as entered on a questionnaire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutlookView {
    pub asset: String,
    pub outlook: Outlook,
    /// Size of the expected move, as a fraction.
    pub magnitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl OutlookView {
    pub fn to_view(&self) -> Option<View> {
        View::from_outlook(&self.asset, self.outlook, self.magnitude).map(|v| View {
            confidence: self.confidence,
            ..v
        })
    }
}

/// Merge view lists; a later view on the same asset replaces the earlier one
/// but keeps its position.
pub fn combine_views(groups: &[Vec<View>]) -> Vec<View> {
    let mut combined: Vec<View> = Vec::new();
    for view in groups.iter().flatten() {
        match combined.iter_mut().find(|v| v.asset == view.asset) {
            Some(existing) => *existing = view.clone(),
            None => combined.push(view.clone()),
        }
    }
    combined
}

/// Scalars of the blend.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BlackLittermanParams {
    pub tau: f64,
    pub risk_aversion: f64,
    pub risk_free_rate: f64,
    pub unknown_view_policy: UnknownViewPolicy,
}

impl Default for BlackLittermanParams {
    fn default() -> Self {
        Self::from_market(&MarketSettings::default())
    }
}

impl BlackLittermanParams {
    pub fn from_market(market: &MarketSettings) -> Self {
        Self {
            tau: market.tau,
            risk_aversion: market.risk_aversion,
            risk_free_rate: market.risk_free_rate,
            unknown_view_policy: market.unknown_view_policy,
        }
    }
}

/// Per-asset movement from the prior to the posterior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnShift {
    pub asset: String,
    pub equilibrium_return: f64,
    pub posterior_return: f64,
    pub shift: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlackLittermanResult {
    pub equilibrium_returns: Vec<AssetReturn>,
    pub posterior_returns: Vec<AssetReturn>,
    pub return_shifts: Vec<ReturnShift>,
    pub portfolio: OptimizedPortfolio,
    pub allocation: Vec<AllocationComparison>,
    /// Assets named by views that were ignored because they are not in the
    /// covariance.
    pub dropped_views: Vec<String>,
}

/// Input to [`run_black_litterman`]. Unset scalars come from the config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlackLittermanInput {
    pub covariance: CovarianceMatrix,
    pub market_weights: Vec<AssetWeight>,
    #[serde(default)]
    pub views: Vec<View>,
    /// Converted to views; an explicit view on the same asset wins.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outlooks: Vec<OutlookView>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tau: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_aversion: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_free_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unknown_view_policy: Option<UnknownViewPolicy>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Blend equilibrium returns with investor views and optimise on the result.
///
/// ```text
/// pi    = delta * Sigma * w_mkt + r_f
/// Omega = diag(P tau Sigma P')_ii / max(c_i, 0.1)
/// E[R]  = [(tau Sigma)^-1 + P' Omega^-1 P]^-1 [(tau Sigma)^-1 pi + P' Omega^-1 Q]
/// ```
///
/// With no usable views the posterior is the equilibrium itself.
pub fn black_litterman(
    covariance: &CovarianceMatrix,
    market_weights: &[AssetWeight],
    views: &[View],
    params: &BlackLittermanParams,
    settings: &OptimizerSettings,
) -> EngineResult<BlackLittermanResult> {
    validate_params(params)?;
    validate_allocation(market_weights, "market_weights")?;
    let assets = covariance.assets();
    let w_mkt = assets.align_weights(market_weights, "market_weights")?;
    let sigma = covariance.values();
    let n = assets.len();

    let pi = equilibrium_vector(sigma, &w_mkt, params.risk_aversion, params.risk_free_rate);

    // Resolve views against the asset index
    let mut picks: Vec<(usize, f64, f64)> = Vec::with_capacity(views.len());
    let mut dropped_views: Vec<String> = Vec::new();
    for (i, view) in views.iter().enumerate() {
        validate_view(view, i)?;
        match assets.index_of(&view.asset) {
            Some(idx) => picks.push((idx, view.expected_return, view.effective_confidence())),
            None => match params.unknown_view_policy {
                UnknownViewPolicy::Reject => {
                    return Err(EngineError::AssetMismatch(format!(
                        "View on '{}' which is not in the covariance",
                        view.asset
                    )));
                }
                UnknownViewPolicy::Ignore => {
                    warn!(asset = %view.asset, "ignoring view on unknown asset");
                    dropped_views.push(view.asset.clone());
                }
            },
        }
    }

    let posterior = if picks.is_empty() {
        pi.clone()
    } else {
        posterior_returns(sigma, &pi, &picks, params.tau)?
    };
    debug!(
        assets = n,
        views = picks.len(),
        dropped = dropped_views.len(),
        "black-litterman posterior computed"
    );

    let portfolio = optimize_aligned(&posterior, covariance, params.risk_aversion, settings)?;

    let return_shifts = assets
        .iter()
        .zip(pi.iter().zip(posterior.iter()))
        .map(|(name, (prior, post))| ReturnShift {
            asset: name.to_string(),
            equilibrium_return: *prior,
            posterior_return: *post,
            shift: post - prior,
        })
        .collect();
    let allocation = allocation_comparison(market_weights, &portfolio.weights);

    Ok(BlackLittermanResult {
        equilibrium_returns: assets.label_returns(&pi),
        posterior_returns: assets.label_returns(&posterior),
        return_shifts,
        portfolio,
        allocation,
        dropped_views,
    })
}

/// Blend using config defaults for every unset scalar, wrapped in the output
/// envelope.
pub fn run_black_litterman(
    input: &BlackLittermanInput,
    config: &EngineConfig,
) -> EngineResult<ComputationOutput<BlackLittermanResult>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let mut params = BlackLittermanParams::from_market(&config.market);
    if let Some(tau) = input.tau {
        params.tau = tau;
    }
    if let Some(delta) = input.risk_aversion {
        params.risk_aversion = delta;
    }
    if let Some(rf) = input.risk_free_rate {
        params.risk_free_rate = rf;
    }
    if let Some(policy) = input.unknown_view_policy {
        params.unknown_view_policy = policy;
    }

    let outlook_views: Vec<View> = input.outlooks.iter().filter_map(OutlookView::to_view).collect();
    let views = combine_views(&[outlook_views, input.views.clone()]);

    let result = black_litterman(
        &input.covariance,
        &input.market_weights,
        &views,
        &params,
        &config.optimizer,
    )?;

    for asset in &result.dropped_views {
        warnings.push(format!(
            "View on '{}' ignored: asset is not in the covariance",
            asset
        ));
    }
    if let Some(w) = result.portfolio.fallback_warning() {
        warnings.push(w);
    }

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Black-Litterman posterior returns with long-only mean-variance weights",
        &serde_json::json!({
            "n_assets": input.covariance.len(),
            "n_views": views.len(),
            "tau": params.tau,
            "risk_aversion": params.risk_aversion,
            "risk_free_rate": params.risk_free_rate,
            "default_confidence": DEFAULT_VIEW_CONFIDENCE,
            "unknown_view_policy": params.unknown_view_policy,
        }),
        warnings,
        elapsed,
        result,
    ))
}

// ---------------------------------------------------------------------------
// Posterior
// ---------------------------------------------------------------------------

/// `picks` holds `(asset index, view return, confidence)` per view.
fn posterior_returns(
    sigma: &[Vec<f64>],
    pi: &[f64],
    picks: &[(usize, f64, f64)],
    tau: f64,
) -> EngineResult<Vec<f64>> {
    let n = pi.len();
    let k = picks.len();

    let mut p_mat = vec![vec![0.0; n]; k];
    let mut q_vec = vec![0.0; k];
    for (row, (idx, q, _)) in picks.iter().enumerate() {
        p_mat[row][*idx] = 1.0;
        q_vec[row] = *q;
    }

    let tau_sigma = mat_scale(sigma, tau);
    let pt = mat_transpose(&p_mat);
    let p_tau_sigma_pt = mat_multiply(&mat_multiply(&p_mat, &tau_sigma), &pt);

    let mut omega = vec![vec![0.0; k]; k];
    for (i, (_, _, conf)) in picks.iter().enumerate() {
        omega[i][i] = p_tau_sigma_pt[i][i] / conf.max(MIN_CONFIDENCE);
    }

    let tau_sigma_inv = mat_inverse(&tau_sigma, "tau * covariance")?;
    let omega_inv = mat_inverse(&omega, "view uncertainty (omega)")?;

    let pt_omega_inv = mat_multiply(&pt, &omega_inv);
    let precision = mat_add(&tau_sigma_inv, &mat_multiply(&pt_omega_inv, &p_mat));
    let precision_inv = mat_inverse(&precision, "posterior precision")?;

    let rhs: Vec<f64> = mat_vec_multiply(&tau_sigma_inv, pi)
        .iter()
        .zip(mat_vec_multiply(&pt_omega_inv, &q_vec).iter())
        .map(|(a, b)| a + b)
        .collect();

    let posterior = mat_vec_multiply(&precision_inv, &rhs);
    if posterior.iter().any(|v| !v.is_finite()) {
        return Err(EngineError::SingularMatrix {
            context: "posterior precision".into(),
        });
    }
    Ok(posterior)
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate_params(params: &BlackLittermanParams) -> EngineResult<()> {
    if !(params.tau.is_finite() && params.tau > 0.0) {
        return Err(EngineError::InvalidParameter {
            field: "tau".into(),
            reason: format!("Must be positive, got {}", params.tau),
        });
    }
    if !(params.risk_aversion.is_finite() && params.risk_aversion >= 0.0) {
        return Err(EngineError::InvalidParameter {
            field: "risk_aversion".into(),
            reason: format!("Must be finite and >= 0, got {}", params.risk_aversion),
        });
    }
    if !params.risk_free_rate.is_finite() {
        return Err(EngineError::InvalidParameter {
            field: "risk_free_rate".into(),
            reason: "Must be finite".into(),
        });
    }
    Ok(())
}

fn validate_view(view: &View, i: usize) -> EngineResult<()> {
    if !view.expected_return.is_finite() {
        return Err(EngineError::InvalidParameter {
            field: format!("views[{}].expected_return", i),
            reason: "Must be finite".into(),
        });
    }
    if let Some(c) = view.confidence {
        if !(c > 0.0 && c <= 1.0) {
            return Err(EngineError::InvalidParameter {
                field: format!("views[{}].confidence", i),
                reason: format!("Confidence must be in (0, 1], got {}", c),
            });
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn cov() -> CovarianceMatrix {
        CovarianceMatrix::from_names(&["X", "Y"], vec![vec![0.04, 0.01], vec![0.01, 0.09]]).unwrap()
    }

    fn market() -> Vec<AssetWeight> {
        vec![
            AssetWeight {
                name: "X".into(),
                weight: 0.6,
            },
            AssetWeight {
                name: "Y".into(),
                weight: 0.4,
            },
        ]
    }

    fn view(asset: &str, r: f64, c: Option<f64>) -> View {
        View {
            asset: asset.into(),
            expected_return: r,
            confidence: c,
        }
    }

    fn blend(views: &[View]) -> EngineResult<BlackLittermanResult> {
        black_litterman(
            &cov(),
            &market(),
            views,
            &BlackLittermanParams::default(),
            &OptimizerSettings::default(),
        )
    }

    // -- 1. No views: posterior is the equilibrium and weights recover the market --

    #[test]
    fn test_no_views_returns_equilibrium() {
        let res = blend(&[]).unwrap();
        assert_eq!(res.posterior_returns, res.equilibrium_returns);
        assert!((res.equilibrium_returns[0].expected_return - 0.09).abs() < 1e-12);
        assert!((res.equilibrium_returns[1].expected_return - 0.125).abs() < 1e-12);
        assert!(res.portfolio.converged);
        assert!((res.portfolio.weights[0].weight - 0.6).abs() < 1e-6);
        assert!((res.portfolio.weights[1].weight - 0.4).abs() < 1e-6);
        for s in &res.return_shifts {
            assert_eq!(s.shift, 0.0);
        }
    }

    // -- 2. A bullish view raises that asset's posterior --

    #[test]
    fn test_view_moves_posterior_towards_view() {
        let res = blend(&[view("X", 0.20, Some(0.8))]).unwrap();
        let post = res.posterior_returns[0].expected_return;
        assert!(post > 0.09 && post < 0.20);
        assert!(res.portfolio.weights[0].weight > 0.6);
    }

    // -- 3. More confidence means a larger shift --

    #[test]
    fn test_confidence_monotonic() {
        let low = blend(&[view("X", 0.20, Some(0.1))]).unwrap();
        let mid = blend(&[view("X", 0.20, None)]).unwrap();
        let high = blend(&[view("X", 0.20, Some(1.0))]).unwrap();
        let shift = |r: &BlackLittermanResult| r.return_shifts[0].shift;
        assert!(shift(&low) < shift(&mid));
        assert!(shift(&mid) < shift(&high));
    }

    // -- 4. Confidence below the floor behaves like the floor --

    #[test]
    fn test_confidence_floor() {
        let floor = blend(&[view("X", 0.20, Some(0.1))]).unwrap();
        let below = blend(&[view("X", 0.20, Some(0.01))]).unwrap();
        assert_eq!(floor.posterior_returns, below.posterior_returns);
    }

    // -- 5. Unknown-asset view is dropped under the default policy --

    #[test]
    fn test_unknown_view_ignored() {
        let res = blend(&[view("Z", 0.30, None)]).unwrap();
        let baseline = blend(&[]).unwrap();
        assert_eq!(res.dropped_views, vec!["Z".to_string()]);
        assert_eq!(res.posterior_returns, baseline.posterior_returns);
        assert_eq!(res.portfolio, baseline.portfolio);
    }

    #[test]
    fn test_unknown_view_mixed_with_known() {
        let mixed = blend(&[view("Z", 0.30, None), view("Y", 0.05, None)]).unwrap();
        let known = blend(&[view("Y", 0.05, None)]).unwrap();
        assert_eq!(mixed.posterior_returns, known.posterior_returns);
        assert_eq!(mixed.dropped_views.len(), 1);
    }

    #[test]
    fn test_unknown_view_rejected_when_strict() {
        let params = BlackLittermanParams {
            unknown_view_policy: UnknownViewPolicy::Reject,
            ..BlackLittermanParams::default()
        };
        let res = black_litterman(
            &cov(),
            &market(),
            &[view("Z", 0.30, None)],
            &params,
            &OptimizerSettings::default(),
        );
        assert!(matches!(res, Err(EngineError::AssetMismatch(_))));
    }

    // -- 6. Validation --

    #[test]
    fn test_invalid_confidence_rejected() {
        assert!(blend(&[view("X", 0.2, Some(0.0))]).is_err());
        assert!(blend(&[view("X", 0.2, Some(1.5))]).is_err());
    }

    #[test]
    fn test_invalid_tau_rejected() {
        let params = BlackLittermanParams {
            tau: 0.0,
            ..BlackLittermanParams::default()
        };
        let res = black_litterman(&cov(), &market(), &[], &params, &OptimizerSettings::default());
        assert!(matches!(res, Err(EngineError::InvalidParameter { .. })));
    }

    #[test]
    fn test_market_weights_must_sum_to_one() {
        let mut w = market();
        w[1].weight = 0.5;
        let res = black_litterman(
            &cov(),
            &w,
            &[],
            &BlackLittermanParams::default(),
            &OptimizerSettings::default(),
        );
        assert!(matches!(res, Err(EngineError::InvalidAllocation { .. })));
    }

    #[test]
    fn test_singular_covariance_with_views() {
        let singular =
            CovarianceMatrix::from_names(&["X", "Y"], vec![vec![0.04, 0.04], vec![0.04, 0.04]])
                .unwrap();
        let res = black_litterman(
            &singular,
            &market(),
            &[view("X", 0.2, None)],
            &BlackLittermanParams::default(),
            &OptimizerSettings::default(),
        );
        assert!(matches!(res, Err(EngineError::SingularMatrix { .. })));
    }

    // -- 7. Outlook helpers --

    #[test]
    fn test_view_from_outlook() {
        assert_eq!(
            View::from_outlook("X", Outlook::Bearish, 0.05).unwrap().expected_return,
            -0.05
        );
        assert_eq!(
            View::from_outlook("X", Outlook::Bullish, 0.05).unwrap().expected_return,
            0.05
        );
        assert!(View::from_outlook("X", Outlook::Neutral, 0.05).is_none());
    }

    #[test]
    fn test_combine_views_later_wins() {
        let combined = combine_views(&[
            vec![view("X", 0.05, None), view("Y", 0.02, None)],
            vec![view("X", -0.03, Some(0.9))],
        ]);
        assert_eq!(combined.len(), 2);
        assert_eq!(combined[0], view("X", -0.03, Some(0.9)));
        assert_eq!(combined[1].asset, "Y");
    }

    #[test]
    fn test_run_reports_dropped_view_warning() {
        let input = BlackLittermanInput {
            covariance: cov(),
            market_weights: market(),
            views: vec![view("Z", 0.1, None)],
            outlooks: Vec::new(),
            tau: None,
            risk_aversion: None,
            risk_free_rate: None,
            unknown_view_policy: None,
        };
        let out = run_black_litterman(&input, &EngineConfig::default()).unwrap();
        assert_eq!(out.warnings.len(), 1);
        assert!(out.warnings[0].contains("'Z'"));
    }

    #[test]
    fn test_run_merges_outlooks_with_views() {
        let input = BlackLittermanInput {
            covariance: cov(),
            market_weights: market(),
            views: vec![view("X", 0.12, Some(0.6))],
            outlooks: vec![
                OutlookView {
                    asset: "X".into(),
                    outlook: Outlook::Bearish,
                    magnitude: 0.05,
                    confidence: None,
                },
                OutlookView {
                    asset: "Y".into(),
                    outlook: Outlook::Neutral,
                    magnitude: 0.05,
                    confidence: None,
                },
            ],
            tau: None,
            risk_aversion: None,
            risk_free_rate: None,
            unknown_view_policy: None,
        };
        let out = run_black_litterman(&input, &EngineConfig::default()).unwrap();
        // The explicit bullish view on X replaces the bearish outlook; neutral adds nothing
        assert_eq!(out.assumptions["n_views"], 1);
        assert!(out.result.return_shifts[0].shift > 0.0);
    }
}
