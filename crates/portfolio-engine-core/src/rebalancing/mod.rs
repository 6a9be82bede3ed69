pub mod action_plan;
pub mod drift;

use std::collections::{HashMap, HashSet};

use crate::error::EngineError;
use crate::types::AssetWeight;
use crate::EngineResult;

/// Current and target weight for every asset in either allocation.
///
/// Order is the current allocation's order followed by target-only assets.
/// An asset absent from one side has weight 0 there.
pub(crate) struct WeightPairs {
    pub rows: Vec<(String, f64, f64)>,
}

impl WeightPairs {
    pub fn build(current: &[AssetWeight], target: &[AssetWeight]) -> EngineResult<Self> {
        check_weights(current, "current_weights")?;
        check_weights(target, "target_weights")?;

        let target_lookup: HashMap<&str, f64> =
            target.iter().map(|w| (w.name.as_str(), w.weight)).collect();
        let mut rows: Vec<(String, f64, f64)> = current
            .iter()
            .map(|c| {
                let t = target_lookup.get(c.name.as_str()).copied().unwrap_or(0.0);
                (c.name.clone(), c.weight, t)
            })
            .collect();

        let current_lookup: HashMap<&str, f64> =
            current.iter().map(|w| (w.name.as_str(), w.weight)).collect();
        for t in target {
            if !current_lookup.contains_key(t.name.as_str()) {
                rows.push((t.name.clone(), 0.0, t.weight));
            }
        }
        Ok(Self { rows })
    }
}

/// Weights must be finite, non-negative and name each asset once. They need
/// not sum to one.
fn check_weights(weights: &[AssetWeight], field: &str) -> EngineResult<()> {
    let mut seen: HashSet<&str> = HashSet::with_capacity(weights.len());
    for w in weights {
        if !w.weight.is_finite() || w.weight < 0.0 {
            return Err(EngineError::InvalidAllocation {
                field: field.into(),
                reason: format!("{} has invalid weight {}", w.name, w.weight),
            });
        }
        if !seen.insert(w.name.as_str()) {
            return Err(EngineError::AssetMismatch(format!(
                "{} lists asset '{}' more than once",
                field, w.name
            )));
        }
    }
    Ok(())
}
