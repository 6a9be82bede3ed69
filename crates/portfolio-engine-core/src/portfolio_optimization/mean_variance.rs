use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, warn};

use crate::config::{EngineConfig, OptimizerSettings};
use crate::error::EngineError;
use crate::linalg::{mat_inverse, mat_vec_multiply, quadratic_form, vec_dot};
use crate::portfolio_optimization::analytics::{risk_score, sharpe_ratio};
use crate::types::{with_metadata, AssetReturn, AssetWeight, ComputationOutput, CovarianceMatrix};
use crate::EngineResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Long-only, fully-invested portfolio maximising quadratic utility.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizedPortfolio {
    /// Final weights after small-weight pruning, ordered like the covariance.
    pub weights: Vec<AssetWeight>,
    /// False when the solver ran out of iterations and equal weights were used.
    pub converged: bool,
    /// Solver iterations. On fallback this and `last_delta` describe the
    /// discarded iterate, not the equal weights.
    pub iterations: u32,
    /// Projected-gradient residual of the solver's answer.
    pub last_delta: f64,
    /// w' mu
    pub expected_return: f64,
    /// sqrt(w' Sigma w)
    pub volatility: f64,
    /// w' mu - (delta / 2) w' Sigma w
    pub utility: f64,
    /// Utility of the best discarded iterate; set only on fallback, so
    /// `iterate_utility - utility` is what the fallback gave up.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iterate_utility: Option<f64>,
}

impl OptimizedPortfolio {
    /// Warning text for a degraded (fallback) solve.
    pub fn fallback_warning(&self) -> Option<String> {
        if self.converged {
            None
        } else {
            Some(format!(
                "{}; equal weights used",
                non_convergence_error(self.iterations, self.last_delta)
            ))
        }
    }

    pub fn weight_vector(&self) -> Vec<f64> {
        self.weights.iter().map(|w| w.weight).collect()
    }
}

/// Input to [`run_mean_variance`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeanVarianceInput {
    pub expected_returns: Vec<AssetReturn>,
    pub covariance: CovarianceMatrix,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_aversion: Option<f64>,
    /// Used only for the reported Sharpe ratio.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_free_rate: Option<f64>,
    /// 1-10 rating per asset; the configured table is used when empty.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub risk_ratings: HashMap<String, u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeanVarianceOutput {
    #[serde(flatten)]
    pub portfolio: OptimizedPortfolio,
    pub sharpe_ratio: f64,
    /// Weight-averaged 1-10 risk rating.
    pub risk_score: u8,
}

/// Solver diagnostics, before pruning.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SolveReport {
    pub converged: bool,
    pub iterations: u32,
    pub last_delta: f64,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Maximise `mu'w - (delta/2) w'Sigma w` subject to `sum(w) = 1`, `0 <= w <= 1`.
///
/// Starts from equal weights. Weights below `settings.min_weight` are zeroed
/// and the rest renormalised. If the solver does not converge the result falls
/// back to equal weights with `converged = false`, unless
/// `settings.fail_on_non_convergence` is set.
pub fn optimize_portfolio(
    expected_returns: &[AssetReturn],
    covariance: &CovarianceMatrix,
    risk_aversion: f64,
    settings: &OptimizerSettings,
) -> EngineResult<OptimizedPortfolio> {
    let mu = covariance
        .assets()
        .align_returns(expected_returns, "expected_returns")?;
    if mu.iter().any(|m| !m.is_finite()) {
        return Err(EngineError::InvalidParameter {
            field: "expected_returns".into(),
            reason: "must be finite".into(),
        });
    }
    optimize_aligned(&mu, covariance, risk_aversion, settings)
}

/// Optimise an expected-return vector already ordered like `covariance`.
pub(crate) fn optimize_aligned(
    mu: &[f64],
    covariance: &CovarianceMatrix,
    risk_aversion: f64,
    settings: &OptimizerSettings,
) -> EngineResult<OptimizedPortfolio> {
    if !(risk_aversion.is_finite() && risk_aversion >= 0.0) {
        return Err(EngineError::InvalidParameter {
            field: "risk_aversion".into(),
            reason: "must be finite and >= 0".into(),
        });
    }
    settings.validate()?;

    let sigma = covariance.values();
    let n = mu.len();
    let (raw, report) = solve_long_only(mu, sigma, risk_aversion, settings);
    let mut iterate_utility = None;

    let weights = if report.converged {
        debug!(
            iterations = report.iterations,
            last_delta = report.last_delta,
            "mean-variance solve converged"
        );
        raw
    } else if settings.fail_on_non_convergence {
        return Err(non_convergence_error(report.iterations, report.last_delta));
    } else {
        warn!(
            iterations = report.iterations,
            last_delta = report.last_delta,
            "mean-variance solve did not converge, falling back to equal weights"
        );
        iterate_utility = Some(utility_of(mu, sigma, risk_aversion, &raw));
        equal_weights(n)
    };
    let weights = prune_small_weights(&weights, settings.min_weight);

    let expected_return = vec_dot(&weights, mu);
    let variance = quadratic_form(sigma, &weights).max(0.0);
    let utility = utility_of(mu, sigma, risk_aversion, &weights);

    Ok(OptimizedPortfolio {
        weights: covariance.assets().label_weights(&weights),
        converged: report.converged,
        iterations: report.iterations,
        last_delta: report.last_delta,
        expected_return,
        volatility: variance.sqrt(),
        utility,
        iterate_utility,
    })
}

/// Optimise and wrap the result in the standard output envelope.
pub fn run_mean_variance(
    input: &MeanVarianceInput,
    config: &EngineConfig,
) -> EngineResult<ComputationOutput<MeanVarianceOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let delta = input.risk_aversion.unwrap_or(config.market.risk_aversion);
    let rf = input.risk_free_rate.unwrap_or(config.market.risk_free_rate);

    let portfolio = optimize_portfolio(
        &input.expected_returns,
        &input.covariance,
        delta,
        &config.optimizer,
    )?;
    if let Some(w) = portfolio.fallback_warning() {
        warnings.push(w);
    }

    let sharpe = sharpe_ratio(
        &portfolio.weights,
        &input.expected_returns,
        &input.covariance,
        rf,
    )?;
    let ratings = if input.risk_ratings.is_empty() {
        &config.market.risk_ratings
    } else {
        &input.risk_ratings
    };
    let score = risk_score(&portfolio.weights, ratings);

    let output = MeanVarianceOutput {
        portfolio,
        sharpe_ratio: sharpe,
        risk_score: score,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Long-only mean-variance optimisation (quadratic utility)",
        &serde_json::json!({
            "n_assets": input.covariance.len(),
            "risk_aversion": delta,
            "risk_free_rate": rf,
            "min_weight": config.optimizer.min_weight,
            "tolerance": config.optimizer.tolerance,
        }),
        warnings,
        elapsed,
        output,
    ))
}

// ---------------------------------------------------------------------------
// Solver
// ---------------------------------------------------------------------------

/// Accelerated projected gradient (FISTA) on `f(w) = -mu'w + (delta/2) w'Sigma w`.
///
/// The step is `1/L` with `L = delta * max_i sum_j |Sigma_ij|`, an upper
/// bound on the largest eigenvalue of the Hessian `delta * Sigma`. Momentum
/// restarts whenever it points uphill. Convergence is measured by the
/// projected-gradient residual `max |w - P(w - grad f(w) / L)|`, which is zero
/// exactly at a KKT point of the simplex-constrained problem.
///
/// Once the residual is below `sqrt(tolerance)` the current support is solved
/// exactly from its KKT system; the exact point is accepted if its own
/// residual meets the tolerance. Without convergence the best iterate seen is
/// returned.
pub(crate) fn solve_long_only(
    mu: &[f64],
    sigma: &[Vec<f64>],
    delta: f64,
    settings: &OptimizerSettings,
) -> (Vec<f64>, SolveReport) {
    let n = mu.len();
    let lipschitz = sigma
        .iter()
        .map(|row| row.iter().map(|v| v.abs()).sum::<f64>())
        .fold(0.0_f64, f64::max)
        * delta;
    let step = 1.0 / lipschitz.max(1e-12);
    let polish_gate = settings.tolerance.sqrt();

    let mut w = equal_weights(n);
    let mut w_prev = w.clone();
    let mut t = 1.0_f64;
    let mut residual = f64::INFINITY;

    let mut best = w.clone();
    let mut best_objective = objective(mu, sigma, delta, &w);

    for iter in 1..=settings.max_iterations {
        let t_next = (1.0 + (1.0 + 4.0 * t * t).sqrt()) / 2.0;
        let beta = (t - 1.0) / t_next;
        let y: Vec<f64> = (0..n).map(|i| w[i] + beta * (w[i] - w_prev[i])).collect();
        let w_new = gradient_step(mu, sigma, delta, step, &y);

        // Restart when the momentum step works against the update
        let uphill: f64 = (0..n).map(|i| (y[i] - w_new[i]) * (w_new[i] - w[i])).sum();
        t = if uphill > 0.0 { 1.0 } else { t_next };

        w_prev = std::mem::replace(&mut w, w_new);
        residual = stationarity_residual(mu, sigma, delta, step, &w);
        if !residual.is_finite() {
            break;
        }

        let f = objective(mu, sigma, delta, &w);
        if f < best_objective {
            best_objective = f;
            best.clone_from(&w);
        }

        if residual <= settings.tolerance {
            return (w, converged(iter, residual));
        }
        if residual <= polish_gate {
            if let Some(exact) = solve_on_support(mu, sigma, delta, &w) {
                let exact_residual = stationarity_residual(mu, sigma, delta, step, &exact);
                if exact_residual <= settings.tolerance {
                    return (exact, converged(iter, exact_residual));
                }
            }
        }
    }

    (
        best,
        SolveReport {
            converged: false,
            iterations: settings.max_iterations,
            last_delta: residual,
        },
    )
}

fn converged(iterations: u32, residual: f64) -> SolveReport {
    SolveReport {
        converged: true,
        iterations,
        last_delta: residual,
    }
}

/// `mu'w - (delta/2) w'Sigma w`
fn utility_of(mu: &[f64], sigma: &[Vec<f64>], delta: f64, w: &[f64]) -> f64 {
    vec_dot(mu, w) - delta / 2.0 * quadratic_form(sigma, w).max(0.0)
}

fn objective(mu: &[f64], sigma: &[Vec<f64>], delta: f64, w: &[f64]) -> f64 {
    -vec_dot(mu, w) + delta / 2.0 * quadratic_form(sigma, w)
}

/// One projected gradient step from `x`.
fn gradient_step(mu: &[f64], sigma: &[Vec<f64>], delta: f64, step: f64, x: &[f64]) -> Vec<f64> {
    let sigma_x = mat_vec_multiply(sigma, x);
    let moved: Vec<f64> = (0..x.len())
        .map(|i| x[i] + step * (mu[i] - delta * sigma_x[i]))
        .collect();
    project_onto_simplex(&moved)
}

fn stationarity_residual(
    mu: &[f64],
    sigma: &[Vec<f64>],
    delta: f64,
    step: f64,
    w: &[f64],
) -> f64 {
    gradient_step(mu, sigma, delta, step, w)
        .iter()
        .zip(w.iter())
        .map(|(a, b)| (a - b).abs())
        .fold(0.0_f64, f64::max)
}

/// Solve the equality-constrained problem on the assets with positive weight:
/// `delta Sigma_SS w_S = mu_S - lambda 1`, `sum(w_S) = 1`.
///
/// Returns `None` when the support matrix is singular or the solution leaves
/// the simplex.
fn solve_on_support(mu: &[f64], sigma: &[Vec<f64>], delta: f64, w: &[f64]) -> Option<Vec<f64>> {
    if delta <= 0.0 {
        return None;
    }
    let support: Vec<usize> = (0..w.len()).filter(|&i| w[i] > 0.0).collect();
    if support.is_empty() {
        return None;
    }
    let block: Vec<Vec<f64>> = support
        .iter()
        .map(|&i| support.iter().map(|&j| delta * sigma[i][j]).collect())
        .collect();
    let inverse = mat_inverse(&block, "mean-variance support").ok()?;

    let mu_s: Vec<f64> = support.iter().map(|&i| mu[i]).collect();
    let a = mat_vec_multiply(&inverse, &mu_s);
    let b: Vec<f64> = inverse.iter().map(|row| row.iter().sum()).collect();
    let b_sum: f64 = b.iter().sum();
    if !(b_sum.is_finite() && b_sum.abs() > f64::EPSILON) {
        return None;
    }
    let lambda = (a.iter().sum::<f64>() - 1.0) / b_sum;

    let mut exact = vec![0.0; w.len()];
    for (k, &i) in support.iter().enumerate() {
        let x = a[k] - lambda * b[k];
        if !x.is_finite() || x < -1e-12 {
            return None;
        }
        exact[i] = x.max(0.0);
    }
    let total: f64 = exact.iter().sum();
    if total <= 0.0 {
        return None;
    }
    Some(exact.iter().map(|x| x / total).collect())
}

/// Euclidean projection onto `{w : sum(w) = 1, w >= 0}` (sort-based).
pub(crate) fn project_onto_simplex(v: &[f64]) -> Vec<f64> {
    let mut sorted = v.to_vec();
    sorted.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));

    let mut cumsum = 0.0;
    let mut theta = 0.0;
    for (j, u) in sorted.iter().enumerate() {
        cumsum += u;
        let t = (cumsum - 1.0) / (j + 1) as f64;
        if u - t > 0.0 {
            theta = t;
        }
    }
    v.iter().map(|x| (x - theta).max(0.0)).collect()
}

/// Zero weights below `min_weight`, then renormalise to sum to 1.
///
/// If pruning would remove everything the input is returned renormalised.
pub(crate) fn prune_small_weights(w: &[f64], min_weight: f64) -> Vec<f64> {
    let pruned: Vec<f64> = w
        .iter()
        .map(|x| if *x < min_weight { 0.0 } else { *x })
        .collect();
    let total: f64 = pruned.iter().sum();
    if total > 0.0 {
        pruned.iter().map(|x| x / total).collect()
    } else {
        let total: f64 = w.iter().sum();
        if total > 0.0 {
            w.iter().map(|x| x / total).collect()
        } else {
            equal_weights(w.len())
        }
    }
}

/// Equal weights for n assets.
fn equal_weights(n: usize) -> Vec<f64> {
    vec![1.0 / n as f64; n]
}

fn non_convergence_error(iterations: u32, last_delta: f64) -> EngineError {
    EngineError::SolverNonConvergence {
        function: "mean_variance".into(),
        iterations,
        last_delta,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn returns(pairs: &[(&str, f64)]) -> Vec<AssetReturn> {
        pairs
            .iter()
            .map(|(n, r)| AssetReturn {
                name: n.to_string(),
                expected_return: *r,
            })
            .collect()
    }

    fn diag_cov(names: &[&str], vars: &[f64]) -> CovarianceMatrix {
        let n = vars.len();
        let mut values = vec![vec![0.0; n]; n];
        for i in 0..n {
            values[i][i] = vars[i];
        }
        CovarianceMatrix::from_names(names, values).unwrap()
    }

    fn weight_sum(p: &OptimizedPortfolio) -> f64 {
        p.weights.iter().map(|w| w.weight).sum()
    }

    // -- 1. Interior solution matches the Lagrangian closed form --

    #[test]
    fn test_interior_closed_form() {
        let cov = diag_cov(&["A", "B"], &[0.04, 0.09]);
        let mu = returns(&[("A", 0.08), ("B", 0.10)]);
        let delta = 2.5;
        let p = optimize_portfolio(&mu, &cov, delta, &OptimizerSettings::default()).unwrap();
        assert!(p.converged);

        // w_i = (mu_i - lambda) / (delta * s_i), sum w = 1
        let a1 = 1.0 / (delta * 0.04);
        let a2 = 1.0 / (delta * 0.09);
        let lambda = (0.08 * a1 + 0.10 * a2 - 1.0) / (a1 + a2);
        let w1 = (0.08 - lambda) * a1;
        let w2 = (0.10 - lambda) * a2;
        assert!((p.weights[0].weight - w1).abs() < 1e-6);
        assert!((p.weights[1].weight - w2).abs() < 1e-6);
    }

    // -- 2. Corner solution: dominated asset gets zero --

    #[test]
    fn test_corner_solution() {
        let cov = diag_cov(&["A", "B"], &[0.01, 0.01]);
        let mu = returns(&[("A", 0.50), ("B", 0.01)]);
        let p = optimize_portfolio(&mu, &cov, 1.0, &OptimizerSettings::default()).unwrap();
        assert!(p.converged);
        assert!((p.weights[0].weight - 1.0).abs() < 1e-9);
        assert_eq!(p.weights[1].weight, 0.0);
    }

    // -- 3. Sub-1% weights are pruned and the rest renormalised --

    #[test]
    fn test_small_weight_pruned() {
        // Unpruned optimum is (0.4975, 0.4975, 0.005)
        let cov = diag_cov(&["A", "B", "C"], &[0.04, 0.04, 0.04]);
        let mu = returns(&[("A", 0.10), ("B", 0.10), ("C", 0.05075)]);
        let p = optimize_portfolio(&mu, &cov, 2.5, &OptimizerSettings::default()).unwrap();
        assert_eq!(p.weights[2].weight, 0.0);
        assert!((p.weights[0].weight - 0.5).abs() < 1e-6);
        assert!((p.weights[1].weight - 0.5).abs() < 1e-6);
    }

    // -- 4. Output always a long-only budget allocation --

    #[test]
    fn test_weights_valid_allocation() {
        let cov = CovarianceMatrix::from_names(
            &["E", "B", "C"],
            vec![
                vec![0.0225, 0.003, 0.006],
                vec![0.003, 0.0016, 0.001],
                vec![0.006, 0.001, 0.04],
            ],
        )
        .unwrap();
        for (d, r) in [(0.5, 0.12), (2.5, 0.05), (10.0, -0.02)] {
            let mu = returns(&[("E", r), ("B", 0.03), ("C", 0.06)]);
            let p = optimize_portfolio(&mu, &cov, d, &OptimizerSettings::default()).unwrap();
            assert!((weight_sum(&p) - 1.0).abs() < 1e-6);
            for w in &p.weights {
                assert!((0.0..=1.0).contains(&w.weight));
            }
        }
    }

    // -- 5. Zero risk aversion puts everything in the best asset --

    #[test]
    fn test_zero_risk_aversion_linear() {
        let cov = diag_cov(&["A", "B", "C"], &[0.04, 0.09, 0.01]);
        let mu = returns(&[("A", 0.05), ("B", 0.09), ("C", 0.02)]);
        let p = optimize_portfolio(&mu, &cov, 0.0, &OptimizerSettings::default()).unwrap();
        assert!(p.converged);
        assert!((p.weights[1].weight - 1.0).abs() < 1e-9);
    }

    // -- 6. Non-convergence falls back to equal weights and is reported --

    #[test]
    fn test_non_convergence_fallback() {
        let cov = diag_cov(&["A", "B"], &[0.04, 0.09]);
        let mu = returns(&[("A", 0.08), ("B", 0.10)]);
        let settings = OptimizerSettings {
            max_iterations: 1,
            ..OptimizerSettings::default()
        };
        let p = optimize_portfolio(&mu, &cov, 2.5, &settings).unwrap();
        assert!(!p.converged);
        assert_eq!(p.weights[0].weight, 0.5);
        assert_eq!(p.weights[1].weight, 0.5);
        let warning = p.fallback_warning().unwrap();
        assert!(warning.contains("did not converge"));
        // The discarded iterate is reported and is no worse than equal weights
        let given_up = p.iterate_utility.unwrap();
        assert!(given_up >= p.utility - 1e-12);
    }

    // -- 7. Strict mode surfaces the error --

    #[test]
    fn test_non_convergence_strict() {
        let cov = diag_cov(&["A", "B"], &[0.04, 0.09]);
        let mu = returns(&[("A", 0.08), ("B", 0.10)]);
        let settings = OptimizerSettings {
            max_iterations: 1,
            fail_on_non_convergence: true,
            ..OptimizerSettings::default()
        };
        let err = optimize_portfolio(&mu, &cov, 2.5, &settings).unwrap_err();
        assert!(matches!(err, EngineError::SolverNonConvergence { iterations: 1, .. }));
    }

    // -- 8. Returns are aligned by name, not by position --

    #[test]
    fn test_returns_aligned_by_name() {
        let cov = diag_cov(&["A", "B"], &[0.01, 0.01]);
        let mu = returns(&[("B", 0.50), ("A", 0.01)]);
        let p = optimize_portfolio(&mu, &cov, 1.0, &OptimizerSettings::default()).unwrap();
        assert_eq!(p.weights[0].name, "A");
        assert_eq!(p.weights[0].weight, 0.0);
        assert!((p.weights[1].weight - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_return_asset_rejected() {
        let cov = diag_cov(&["A", "B"], &[0.01, 0.01]);
        let mu = returns(&[("A", 0.05), ("Z", 0.05)]);
        assert!(matches!(
            optimize_portfolio(&mu, &cov, 1.0, &OptimizerSettings::default()),
            Err(EngineError::AssetMismatch(_))
        ));
    }

    #[test]
    fn test_negative_risk_aversion_rejected() {
        let cov = diag_cov(&["A"], &[0.01]);
        let mu = returns(&[("A", 0.05)]);
        assert!(optimize_portfolio(&mu, &cov, -1.0, &OptimizerSettings::default()).is_err());
    }

    // -- 9. Highly correlated funds: market-implied returns give back the market --

    #[test]
    fn test_correlated_funds_recover_implied_weights() {
        let names = ["F0", "F1", "F2", "F3", "F4", "F5", "F6", "F7", "F8", "F9"];
        let vols: Vec<f64> = (0..10).map(|i| 0.12 + 0.01 * i as f64).collect();
        let mut values = vec![vec![0.0; 10]; 10];
        for i in 0..10 {
            for j in 0..10 {
                let rho = if i == j { 1.0 } else { 0.97 };
                values[i][j] = rho * vols[i] * vols[j];
            }
        }
        let cov = CovarianceMatrix::from_names(&names, values.clone()).unwrap();
        let mut market = vec![0.08; 10];
        market[0] = 0.28;

        // mu = delta * Sigma * w_mkt + r_f
        let delta = 2.5;
        let mu: Vec<AssetReturn> = names
            .iter()
            .enumerate()
            .map(|(i, n)| AssetReturn {
                name: n.to_string(),
                expected_return: delta * vec_dot(&values[i], &market) + 0.02,
            })
            .collect();

        let p = optimize_portfolio(&mu, &cov, delta, &OptimizerSettings::default()).unwrap();
        assert!(p.converged);
        assert!(p.iterations < OptimizerSettings::default().max_iterations);
        assert!(p.iterate_utility.is_none());
        for (w, m) in p.weights.iter().zip(market.iter()) {
            assert!((w.weight - m).abs() < 1e-6, "{} = {}", w.name, w.weight);
        }
    }

    // -- 10. Exact support solve agrees with the iterative answer --

    #[test]
    fn test_support_solve_matches_closed_form() {
        let mu = [0.08, 0.10];
        let sigma = vec![vec![0.04, 0.0], vec![0.0, 0.09]];
        let exact = solve_on_support(&mu, &sigma, 2.5, &[0.5, 0.5]).unwrap();
        let a1 = 1.0 / (2.5 * 0.04);
        let a2 = 1.0 / (2.5 * 0.09);
        let lambda = (0.08 * a1 + 0.10 * a2 - 1.0) / (a1 + a2);
        assert!((exact[0] - (0.08 - lambda) * a1).abs() < 1e-12);
        assert!((exact[1] - (0.10 - lambda) * a2).abs() < 1e-12);
        // Linear problems have no support system
        assert!(solve_on_support(&mu, &sigma, 0.0, &[0.5, 0.5]).is_none());
    }

    #[test]
    fn test_projection_onto_simplex() {
        let p = project_onto_simplex(&[0.5, 0.5]);
        assert_eq!(p, vec![0.5, 0.5]);
        let p = project_onto_simplex(&[2.0, 0.0]);
        assert_eq!(p, vec![1.0, 0.0]);
        let p = project_onto_simplex(&[0.4, 0.4, 0.4]);
        for x in &p {
            assert!((x - 1.0 / 3.0).abs() < 1e-12);
        }
        let p = project_onto_simplex(&[-1.0, 0.3, 0.9]);
        assert_eq!(p[0], 0.0);
        assert!((p[1] + p[2] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_run_envelope_reports_sharpe() {
        let input = MeanVarianceInput {
            expected_returns: returns(&[("A", 0.08), ("B", 0.10)]),
            covariance: diag_cov(&["A", "B"], &[0.04, 0.09]),
            risk_aversion: None,
            risk_free_rate: Some(0.02),
            risk_ratings: HashMap::from([("A".to_string(), 4), ("B".to_string(), 8)]),
        };
        let out = run_mean_variance(&input, &EngineConfig::default()).unwrap();
        let p = &out.result.portfolio;
        let expected = (p.expected_return - 0.02) / p.volatility;
        assert!((out.result.sharpe_ratio - expected).abs() < 1e-12);
        let score = out.result.risk_score;
        assert!((4..=8).contains(&score));
        assert!(out.warnings.is_empty());
        assert_eq!(out.metadata.precision, "ieee754_f64");
    }
}
