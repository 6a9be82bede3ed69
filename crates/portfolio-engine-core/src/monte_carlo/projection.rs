use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use statrs::distribution::Normal;
use std::time::Instant;
use tracing::debug;

use crate::config::{EngineConfig, SimulationSettings};
use crate::error::EngineError;
use crate::types::{with_metadata, ComputationOutput};
use crate::EngineResult;

const MONTHS_PER_YEAR: u32 = 12;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Fully resolved projection parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectionInput {
    pub current_wealth: f64,
    /// Added at the end of every month, after growth.
    pub monthly_contribution: f64,
    pub years: u32,
    pub annual_return: f64,
    pub annual_volatility: f64,
    pub num_simulations: u32,
    /// Success threshold on final wealth.
    pub goal: Option<f64>,
    pub seed: u64,
}

/// Wealth paths stored row-major: one row of `num_steps` values per path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawPathMatrix")]
pub struct PathMatrix {
    num_paths: usize,
    num_steps: usize,
    values: Vec<f64>,
}

#[derive(Deserialize)]
struct RawPathMatrix {
    num_paths: usize,
    num_steps: usize,
    values: Vec<f64>,
}

impl TryFrom<RawPathMatrix> for PathMatrix {
    type Error = EngineError;

    fn try_from(raw: RawPathMatrix) -> Result<Self, Self::Error> {
        let expected = raw.num_paths.checked_mul(raw.num_steps);
        if expected != Some(raw.values.len()) {
            return Err(EngineError::InvalidParameter {
                field: "paths".into(),
                reason: format!(
                    "{} values do not fill {} paths of {} steps",
                    raw.values.len(),
                    raw.num_paths,
                    raw.num_steps
                ),
            });
        }
        Ok(Self {
            num_paths: raw.num_paths,
            num_steps: raw.num_steps,
            values: raw.values,
        })
    }
}

impl PathMatrix {
    pub fn num_paths(&self) -> usize {
        self.num_paths
    }

    /// Time points per path, including t = 0.
    pub fn num_steps(&self) -> usize {
        self.num_steps
    }

    pub fn path(&self, i: usize) -> &[f64] {
        &self.values[i * self.num_steps..(i + 1) * self.num_steps]
    }

    pub fn value(&self, i: usize, t: usize) -> f64 {
        self.values[i * self.num_steps + t]
    }

    /// Cross-section of every path at time step `t`.
    pub fn column(&self, t: usize) -> Vec<f64> {
        (0..self.num_paths).map(|i| self.value(i, t)).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectionResult {
    /// Time axis in years (month / 12).
    pub years: Vec<f64>,
    pub paths: PathMatrix,
    pub percentile_10: Vec<f64>,
    pub percentile_50: Vec<f64>,
    pub percentile_90: Vec<f64>,
    pub final_values: Vec<f64>,
    /// Share of final values at or above the goal; 1.0 without a goal.
    pub success_probability: f64,
    /// False when no goal was given.
    pub goal_evaluated: bool,
}

/// Headline numbers of a projection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationSummary {
    pub initial_wealth: f64,
    pub years: f64,
    pub median_final_value: f64,
    pub percentile_10: f64,
    pub percentile_90: f64,
    pub mean_final_value: f64,
    /// Population standard deviation of final values.
    pub std_dev: f64,
    pub success_probability: f64,
}

/// Request form of [`ProjectionInput`]; unset fields come from the config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectionRequest {
    pub current_wealth: f64,
    #[serde(default)]
    pub monthly_contribution: f64,
    pub years: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annual_return: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annual_volatility: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_simulations: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    /// Include every path and final value in the output.
    #[serde(default)]
    pub include_paths: bool,
}

impl ProjectionRequest {
    pub fn resolve(&self, defaults: &SimulationSettings) -> ProjectionInput {
        ProjectionInput {
            current_wealth: self.current_wealth,
            monthly_contribution: self.monthly_contribution,
            years: self.years,
            annual_return: self.annual_return.unwrap_or(defaults.annual_return),
            annual_volatility: self.annual_volatility.unwrap_or(defaults.annual_volatility),
            num_simulations: self.num_simulations.unwrap_or(defaults.num_simulations),
            goal: self.goal,
            seed: self.seed.unwrap_or(defaults.seed),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectionOutput {
    pub summary: SimulationSummary,
    pub years: Vec<f64>,
    pub percentile_10: Vec<f64>,
    pub percentile_50: Vec<f64>,
    pub percentile_90: Vec<f64>,
    pub goal_evaluated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paths: Option<PathMatrix>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_values: Option<Vec<f64>>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Simulate monthly geometric Brownian motion wealth paths.
///
/// `S_{t+1} = S_t * exp((mu - sigma^2/2)/12 + sigma/sqrt(12) * Z) + contribution`
///
/// Path `i` draws from its own generator seeded from `(seed, i)`, so the
/// output is identical whatever the thread count.
pub fn run_monte_carlo(input: &ProjectionInput) -> EngineResult<ProjectionResult> {
    validate_input(input)?;

    let n_paths = input.num_simulations as usize;
    let n_periods = total_months(input.years)? as usize;
    let n_steps = n_periods + 1;

    let drift = (input.annual_return - 0.5 * input.annual_volatility.powi(2))
        / f64::from(MONTHS_PER_YEAR);
    let monthly_vol = input.annual_volatility / f64::from(MONTHS_PER_YEAR).sqrt();

    let standard_normal = Normal::new(0.0, 1.0).map_err(|e| EngineError::InvalidParameter {
        field: "distribution".into(),
        reason: format!("Invalid Normal parameters: {e}"),
    })?;

    let mut values = vec![0.0; n_paths * n_steps];
    values
        .par_chunks_mut(n_steps)
        .enumerate()
        .for_each(|(i, row)| {
            let mut rng = StdRng::seed_from_u64(path_seed(input.seed, i as u64));
            row[0] = input.current_wealth;
            for t in 1..n_steps {
                let z: f64 = rng.sample(standard_normal);
                let growth = (drift + monthly_vol * z).exp();
                row[t] = row[t - 1] * growth + input.monthly_contribution;
            }
        });

    let paths = PathMatrix {
        num_paths: n_paths,
        num_steps: n_steps,
        values,
    };

    let bands: Vec<(f64, f64, f64)> = (0..n_steps)
        .into_par_iter()
        .map(|t| {
            let mut col = paths.column(t);
            col.sort_by(|a, b| a.total_cmp(b));
            (
                percentile_sorted(&col, 10.0),
                percentile_sorted(&col, 50.0),
                percentile_sorted(&col, 90.0),
            )
        })
        .collect();

    let final_values = paths.column(n_periods);
    let (success_probability, goal_evaluated) = match input.goal {
        Some(goal) => {
            let hits = final_values.iter().filter(|v| **v >= goal).count();
            (hits as f64 / n_paths as f64, true)
        }
        None => (1.0, false),
    };

    debug!(
        paths = n_paths,
        periods = n_periods,
        success_probability,
        "monte carlo projection complete"
    );

    Ok(ProjectionResult {
        years: (0..n_steps)
            .map(|t| t as f64 / f64::from(MONTHS_PER_YEAR))
            .collect(),
        percentile_10: bands.iter().map(|b| b.0).collect(),
        percentile_50: bands.iter().map(|b| b.1).collect(),
        percentile_90: bands.iter().map(|b| b.2).collect(),
        paths,
        final_values,
        success_probability,
        goal_evaluated,
    })
}

/// Summary statistics of the final-value distribution.
pub fn summarize_simulation(result: &ProjectionResult) -> SimulationSummary {
    let mut sorted = result.final_values.clone();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let n = sorted.len().max(1) as f64;
    let mean = sorted.iter().sum::<f64>() / n;
    let variance = sorted.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;

    SimulationSummary {
        initial_wealth: if result.paths.num_paths() > 0 {
            result.paths.value(0, 0)
        } else {
            0.0
        },
        years: result.years.last().copied().unwrap_or(0.0),
        median_final_value: percentile_sorted(&sorted, 50.0),
        percentile_10: percentile_sorted(&sorted, 10.0),
        percentile_90: percentile_sorted(&sorted, 90.0),
        mean_final_value: mean,
        std_dev: variance.sqrt(),
        success_probability: result.success_probability,
    }
}

/// Resolve defaults, simulate and wrap in the output envelope.
pub fn run_projection(
    request: &ProjectionRequest,
    config: &EngineConfig,
) -> EngineResult<ComputationOutput<ProjectionOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let input = request.resolve(&config.simulation);
    let result = run_monte_carlo(&input)?;
    let summary = summarize_simulation(&result);

    if !result.goal_evaluated {
        warnings.push("No goal given: success probability reported as 1.0".into());
    } else if result.success_probability < 0.5 {
        warnings.push(format!(
            "Goal reached in only {:.1}% of simulations",
            result.success_probability * 100.0
        ));
    }
    if input.num_simulations < 100 {
        warnings.push(format!(
            "Only {} simulations: percentile bands will be noisy",
            input.num_simulations
        ));
    }

    let (paths, final_values) = if request.include_paths {
        (Some(result.paths), Some(result.final_values))
    } else {
        (None, None)
    };
    let output = ProjectionOutput {
        summary,
        years: result.years,
        percentile_10: result.percentile_10,
        percentile_50: result.percentile_50,
        percentile_90: result.percentile_90,
        goal_evaluated: result.goal_evaluated,
        paths,
        final_values,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Monte Carlo GBM wealth projection with monthly contributions",
        &serde_json::json!({
            "annual_return": input.annual_return,
            "annual_volatility": input.annual_volatility,
            "num_simulations": input.num_simulations,
            "months": input.years * MONTHS_PER_YEAR,
            "seed": input.seed,
        }),
        warnings,
        elapsed,
        output,
    ))
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn total_months(years: u32) -> EngineResult<u32> {
    years
        .checked_mul(MONTHS_PER_YEAR)
        .ok_or_else(|| EngineError::InvalidParameter {
            field: "years".into(),
            reason: format!("{} years is too long to simulate monthly", years),
        })
}

fn validate_input(input: &ProjectionInput) -> EngineResult<()> {
    if !(input.current_wealth.is_finite() && input.current_wealth >= 0.0) {
        return Err(EngineError::InvalidParameter {
            field: "current_wealth".into(),
            reason: "must be finite and >= 0".into(),
        });
    }
    if !input.monthly_contribution.is_finite() {
        return Err(EngineError::InvalidParameter {
            field: "monthly_contribution".into(),
            reason: "must be finite".into(),
        });
    }
    if input.years == 0 {
        return Err(EngineError::InvalidParameter {
            field: "years".into(),
            reason: "must be >= 1".into(),
        });
    }
    if !input.annual_return.is_finite() {
        return Err(EngineError::InvalidParameter {
            field: "annual_return".into(),
            reason: "must be finite".into(),
        });
    }
    if !(input.annual_volatility.is_finite() && input.annual_volatility >= 0.0) {
        return Err(EngineError::InvalidParameter {
            field: "annual_volatility".into(),
            reason: "must be finite and >= 0".into(),
        });
    }
    if input.num_simulations == 0 {
        return Err(EngineError::InvalidParameter {
            field: "num_simulations".into(),
            reason: "must be >= 1".into(),
        });
    }
    let steps = total_months(input.years)? as usize + 1;
    if (input.num_simulations as usize).checked_mul(steps).is_none() {
        return Err(EngineError::InvalidParameter {
            field: "num_simulations".into(),
            reason: format!("{} paths of {} steps overflow", input.num_simulations, steps),
        });
    }
    if let Some(goal) = input.goal {
        if !goal.is_finite() {
            return Err(EngineError::InvalidParameter {
                field: "goal".into(),
                reason: "must be finite".into(),
            });
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// SplitMix64 finaliser over the call seed and path index.
fn path_seed(seed: u64, path: u64) -> u64 {
    let mut z = seed.wrapping_add(path.wrapping_add(1).wrapping_mul(0x9e3779b97f4a7c15));
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58476d1ce4e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d049bb133111eb);
    z ^ (z >> 31)
}

/// Linear interpolation between order statistics. `sorted` must be ascending.
fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    if sorted.len() == 1 {
        return sorted[0];
    }
    let rank = p / 100.0 * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        sorted[lower]
    } else {
        let frac = rank - lower as f64;
        sorted[lower] * (1.0 - frac) + sorted[upper] * frac
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn base_input() -> ProjectionInput {
        ProjectionInput {
            current_wealth: 100_000.0,
            monthly_contribution: 1_000.0,
            years: 5,
            annual_return: 0.07,
            annual_volatility: 0.15,
            num_simulations: 200,
            goal: None,
            seed: 42,
        }
    }

    // -- 1. Shape of the output --

    #[test]
    fn test_output_shape() {
        let res = run_monte_carlo(&base_input()).unwrap();
        assert_eq!(res.years.len(), 61);
        assert_eq!(res.paths.num_paths(), 200);
        assert_eq!(res.paths.num_steps(), 61);
        assert_eq!(res.final_values.len(), 200);
        assert_eq!(res.years[12], 1.0);
        for i in 0..200 {
            assert_eq!(res.paths.value(i, 0), 100_000.0);
        }
    }

    // -- 2. Same seed, same paths --

    #[test]
    fn test_deterministic_for_seed() {
        let a = run_monte_carlo(&base_input()).unwrap();
        let b = run_monte_carlo(&base_input()).unwrap();
        assert_eq!(a.paths, b.paths);

        let mut other = base_input();
        other.seed = 43;
        let c = run_monte_carlo(&other).unwrap();
        assert_ne!(a.paths, c.paths);
    }

    // -- 3. Thread count does not change the result --

    #[test]
    fn test_independent_of_thread_count() {
        let single = rayon::ThreadPoolBuilder::new()
            .num_threads(1)
            .build()
            .unwrap()
            .install(|| run_monte_carlo(&base_input()).unwrap());
        let multi = rayon::ThreadPoolBuilder::new()
            .num_threads(4)
            .build()
            .unwrap()
            .install(|| run_monte_carlo(&base_input()).unwrap());
        assert_eq!(single.paths, multi.paths);
        assert_eq!(single.percentile_50, multi.percentile_50);
    }

    // -- 4. Zero volatility reduces to the deterministic recursion --

    #[test]
    fn test_zero_volatility_deterministic() {
        let mut input = base_input();
        input.annual_volatility = 0.0;
        let res = run_monte_carlo(&input).unwrap();

        let growth = (0.07 / 12.0_f64).exp();
        let mut s = 100_000.0;
        for t in 1..=60 {
            s = s * growth + 1_000.0;
            assert_eq!(res.paths.value(0, t), s);
            assert_eq!(res.percentile_10[t], s);
            assert_eq!(res.percentile_90[t], s);
        }
    }

    // -- 5. Percentile bands are ordered --

    #[test]
    fn test_percentiles_ordered() {
        let res = run_monte_carlo(&base_input()).unwrap();
        for t in 0..res.years.len() {
            assert!(res.percentile_10[t] <= res.percentile_50[t]);
            assert!(res.percentile_50[t] <= res.percentile_90[t]);
        }
    }

    // -- 6. Median of final wealth tracks the lognormal median --

    #[test]
    fn test_median_converges() {
        let expected = 100.0 * ((0.07 - 0.5 * 0.15 * 0.15) * 10.0_f64).exp();
        for seed in [1, 7, 42, 2024, 987_654_321] {
            let input = ProjectionInput {
                current_wealth: 100.0,
                monthly_contribution: 0.0,
                years: 10,
                annual_return: 0.07,
                annual_volatility: 0.15,
                num_simulations: 2_000,
                goal: None,
                seed,
            };
            let res = run_monte_carlo(&input).unwrap();
            let median = res.percentile_50[120];
            assert!(
                (median / expected - 1.0).abs() < 0.05,
                "seed {seed}: median {median} vs {expected}"
            );
        }
    }

    #[test]
    fn test_oversized_horizon_rejected() {
        let mut input = base_input();
        input.years = u32::MAX / 6;
        assert!(matches!(
            run_monte_carlo(&input),
            Err(EngineError::InvalidParameter { ref field, .. }) if field == "years"
        ));
    }

    #[test]
    fn test_path_matrix_shape_checked_on_deserialize() {
        let ok: PathMatrix =
            serde_json::from_str(r#"{"num_paths": 2, "num_steps": 2, "values": [1, 2, 3, 4]}"#)
                .unwrap();
        assert_eq!(ok.path(1), &[3.0, 4.0]);
        let short = serde_json::from_str::<PathMatrix>(
            r#"{"num_paths": 2, "num_steps": 3, "values": [1, 2, 3, 4]}"#,
        );
        assert!(short.is_err());
    }

    // -- 7. Goal handling --

    #[test]
    fn test_goal_probability_bounds() {
        let mut input = base_input();
        input.goal = Some(0.0);
        let res = run_monte_carlo(&input).unwrap();
        assert!(res.goal_evaluated);
        assert_eq!(res.success_probability, 1.0);

        input.goal = Some(1e12);
        assert_eq!(run_monte_carlo(&input).unwrap().success_probability, 0.0);

        input.goal = Some(180_000.0);
        let p = run_monte_carlo(&input).unwrap().success_probability;
        assert!((0.0..=1.0).contains(&p));
    }

    #[test]
    fn test_no_goal_reports_one() {
        let res = run_monte_carlo(&base_input()).unwrap();
        assert!(!res.goal_evaluated);
        assert_eq!(res.success_probability, 1.0);
    }

    // -- 8. Validation --

    #[test]
    fn test_invalid_inputs_rejected() {
        let mut input = base_input();
        input.years = 0;
        assert!(run_monte_carlo(&input).is_err());

        let mut input = base_input();
        input.num_simulations = 0;
        assert!(run_monte_carlo(&input).is_err());

        let mut input = base_input();
        input.annual_volatility = -0.1;
        assert!(run_monte_carlo(&input).is_err());

        let mut input = base_input();
        input.current_wealth = -1.0;
        assert!(run_monte_carlo(&input).is_err());
    }

    // -- 9. Summary --

    #[test]
    fn test_summary_single_path() {
        let mut input = base_input();
        input.num_simulations = 1;
        let res = run_monte_carlo(&input).unwrap();
        let summary = summarize_simulation(&res);
        assert_eq!(summary.initial_wealth, 100_000.0);
        assert_eq!(summary.years, 5.0);
        assert_eq!(summary.median_final_value, res.final_values[0]);
        assert_eq!(summary.std_dev, 0.0);
    }

    #[test]
    fn test_percentile_interpolation() {
        let v = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(percentile_sorted(&v, 50.0), 3.0);
        // rank 0.4
        assert!((percentile_sorted(&v, 10.0) - 1.4).abs() < 1e-12);
        assert!((percentile_sorted(&v, 90.0) - 4.6).abs() < 1e-12);
    }

    #[test]
    fn test_run_projection_omits_paths_by_default() {
        let request = ProjectionRequest {
            current_wealth: 50_000.0,
            monthly_contribution: 500.0,
            years: 2,
            annual_return: None,
            annual_volatility: None,
            num_simulations: Some(50),
            goal: None,
            seed: None,
            include_paths: false,
        };
        let out = run_projection(&request, &EngineConfig::default()).unwrap();
        assert!(out.result.paths.is_none());
        assert_eq!(out.result.years.len(), 25);
        assert_eq!(out.warnings.len(), 2);

        let with_paths = ProjectionRequest {
            include_paths: true,
            ..request
        };
        let out = run_projection(&with_paths, &EngineConfig::default()).unwrap();
        assert_eq!(out.result.paths.unwrap().num_paths(), 50);
    }
}
