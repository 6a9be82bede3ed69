use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::debug;

use crate::config::{DriftBands, EngineConfig};
use crate::rebalancing::WeightPairs;
use crate::types::{with_metadata, AssetWeight, ComputationOutput};
use crate::EngineResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DriftStatus {
    OnTarget,
    Monitor,
    RebalanceNeeded,
}

impl DriftStatus {
    pub fn classify(drift: f64, bands: &DriftBands) -> Self {
        let abs = drift.abs();
        if abs > bands.rebalance {
            DriftStatus::RebalanceNeeded
        } else if abs > bands.on_target {
            DriftStatus::Monitor
        } else {
            DriftStatus::OnTarget
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftRow {
    pub asset: String,
    pub current_weight: f64,
    pub target_weight: f64,
    /// current - target; positive means over-allocated.
    pub drift: f64,
    pub status: DriftStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftInput {
    pub current_weights: Vec<AssetWeight>,
    pub target_weights: Vec<AssetWeight>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bands: Option<DriftBands>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftReport {
    pub rows: Vec<DriftRow>,
    pub max_abs_drift: f64,
    pub rebalance_needed: bool,
}

/// Drift of every asset in either allocation, sorted by drift descending.
pub fn calculate_drift(
    current: &[AssetWeight],
    target: &[AssetWeight],
    bands: &DriftBands,
) -> EngineResult<Vec<DriftRow>> {
    let pairs = WeightPairs::build(current, target)?;
    let mut rows: Vec<DriftRow> = pairs
        .rows
        .into_iter()
        .map(|(asset, current_weight, target_weight)| {
            let drift = current_weight - target_weight;
            DriftRow {
                asset,
                current_weight,
                target_weight,
                drift,
                status: DriftStatus::classify(drift, bands),
            }
        })
        .collect();
    rows.sort_by(|a, b| b.drift.total_cmp(&a.drift));
    debug!(assets = rows.len(), "drift table computed");
    Ok(rows)
}

pub fn run_drift(
    input: &DriftInput,
    config: &EngineConfig,
) -> EngineResult<ComputationOutput<DriftReport>> {
    let start = Instant::now();
    let bands = input.bands.unwrap_or(config.rebalance.bands);

    let rows = calculate_drift(&input.current_weights, &input.target_weights, &bands)?;
    let max_abs_drift = rows.iter().map(|r| r.drift.abs()).fold(0.0_f64, f64::max);
    let rebalance_needed = rows
        .iter()
        .any(|r| r.status == DriftStatus::RebalanceNeeded);

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Allocation drift against target with status bands",
        &serde_json::json!({
            "on_target_band": bands.on_target,
            "rebalance_band": bands.rebalance,
        }),
        Vec::new(),
        elapsed,
        DriftReport {
            rows,
            max_abs_drift,
            rebalance_needed,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

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
    fn test_ten_percent_drift_both_rebalance() {
        let rows = calculate_drift(
            &weights(&[("A", 0.6), ("B", 0.4)]),
            &weights(&[("A", 0.5), ("B", 0.5)]),
            &DriftBands::default(),
        )
        .unwrap();
        assert_eq!(rows[0].asset, "A");
        assert!((rows[0].drift - 0.10).abs() < 1e-12);
        assert_eq!(rows[0].status, DriftStatus::RebalanceNeeded);
        assert_eq!(rows[1].asset, "B");
        assert!((rows[1].drift + 0.10).abs() < 1e-12);
        assert_eq!(rows[1].status, DriftStatus::RebalanceNeeded);
    }

    #[test]
    fn test_status_bands() {
        let bands = DriftBands::default();
        assert_eq!(DriftStatus::classify(0.02, &bands), DriftStatus::OnTarget);
        assert_eq!(DriftStatus::classify(-0.03, &bands), DriftStatus::Monitor);
        assert_eq!(DriftStatus::classify(0.05, &bands), DriftStatus::Monitor);
        assert_eq!(DriftStatus::classify(0.051, &bands), DriftStatus::RebalanceNeeded);
    }

    #[test]
    fn test_union_of_assets() {
        let rows = calculate_drift(
            &weights(&[("A", 0.7), ("B", 0.3)]),
            &weights(&[("A", 0.7), ("C", 0.3)]),
            &DriftBands::default(),
        )
        .unwrap();
        assert_eq!(rows.len(), 3);
        let b = rows.iter().find(|r| r.asset == "B").unwrap();
        assert_eq!(b.target_weight, 0.0);
        let c = rows.iter().find(|r| r.asset == "C").unwrap();
        assert_eq!(c.current_weight, 0.0);
        assert_eq!(c.drift, -0.3);
        // Sorted by drift, descending
        assert_eq!(rows[0].asset, "B");
        assert_eq!(rows[2].asset, "C");
    }

    #[test]
    fn test_negative_weight_rejected() {
        let res = calculate_drift(
            &weights(&[("A", -0.1)]),
            &weights(&[("A", 1.0)]),
            &DriftBands::default(),
        );
        assert!(matches!(
            res,
            Err(crate::error::EngineError::InvalidAllocation { .. })
        ));
    }

    #[test]
    fn test_status_serializes_screaming() {
        let json = serde_json::to_string(&DriftStatus::RebalanceNeeded).unwrap();
        assert_eq!(json, "\"REBALANCE_NEEDED\"");
    }

    #[test]
    fn test_run_drift_summary() {
        let input = DriftInput {
            current_weights: weights(&[("A", 0.51), ("B", 0.49)]),
            target_weights: weights(&[("A", 0.5), ("B", 0.5)]),
            bands: None,
        };
        let out = run_drift(&input, &EngineConfig::default()).unwrap();
        assert!(!out.result.rebalance_needed);
        assert!((out.result.max_abs_drift - 0.01).abs() < 1e-12);
    }
}
