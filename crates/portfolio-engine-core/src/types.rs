use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::EngineError;
use crate::EngineResult;

/// All monetary values in the tax helper. Wraps Decimal to prevent accidental f64 usage.
pub type Money = Decimal;

/// Rates expressed as decimals (0.05 = 5%). Never as percentages.
pub type Rate = Decimal;

/// Absolute tolerance for "weights sum to one" checks.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-4;

/// Absolute tolerance for covariance symmetry.
pub const SYMMETRY_TOLERANCE: f64 = 1e-8;

/// Observation frequency of a price history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnFrequency {
    #[default]
    Daily,
    Weekly,
    Monthly,
    Quarterly,
    Annual,
    /// Any other sampling interval, given as periods per year.
    Custom(f64),
}

impl ReturnFrequency {
    /// Number of periods in a year for annualisation
    pub fn periods_per_year(&self) -> f64 {
        match self {
            ReturnFrequency::Daily => 252.0,
            ReturnFrequency::Weekly => 52.0,
            ReturnFrequency::Monthly => 12.0,
            ReturnFrequency::Quarterly => 4.0,
            ReturnFrequency::Annual => 1.0,
            ReturnFrequency::Custom(p) => *p,
        }
    }
}

// ---------------------------------------------------------------------------
// Asset-indexed values
// ---------------------------------------------------------------------------

/// An asset with a portfolio weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetWeight {
    pub name: String,
    pub weight: f64,
}

/// A named expected return for one asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetReturn {
    pub name: String,
    pub expected_return: f64,
}

/// Ordered, duplicate-free list of asset identifiers.
///
/// Every vector and matrix handed to the numeric routines is indexed by one
/// of these. Name-keyed inputs are aligned against it exactly once, at the
/// API boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct AssetSet {
    names: Vec<String>,
    index: HashMap<String, usize>,
}

impl AssetSet {
    pub fn new(names: Vec<String>) -> EngineResult<Self> {
        if names.is_empty() {
            return Err(EngineError::InsufficientData(
                "At least one asset required".into(),
            ));
        }
        let mut index = HashMap::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            if index.insert(name.clone(), i).is_some() {
                return Err(EngineError::AssetMismatch(format!(
                    "Duplicate asset identifier '{}'",
                    name
                )));
            }
        }
        Ok(Self { names, index })
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Convert name-keyed weights into a vector ordered by this set.
    ///
    /// The weight names must be exactly this set (any order, no duplicates).
    pub fn align_weights(&self, weights: &[AssetWeight], field: &str) -> EngineResult<Vec<f64>> {
        let pairs: Vec<(&str, f64)> = weights.iter().map(|w| (w.name.as_str(), w.weight)).collect();
        self.align(&pairs, field)
    }

    /// Convert name-keyed returns into a vector ordered by this set.
    pub fn align_returns(&self, returns: &[AssetReturn], field: &str) -> EngineResult<Vec<f64>> {
        let pairs: Vec<(&str, f64)> = returns
            .iter()
            .map(|r| (r.name.as_str(), r.expected_return))
            .collect();
        self.align(&pairs, field)
    }

    fn align(&self, pairs: &[(&str, f64)], field: &str) -> EngineResult<Vec<f64>> {
        if pairs.len() != self.len() {
            return Err(EngineError::AssetMismatch(format!(
                "{} has {} entries but the asset set has {}",
                field,
                pairs.len(),
                self.len()
            )));
        }
        let mut out = vec![0.0; self.len()];
        let mut seen = vec![false; self.len()];
        for (name, value) in pairs {
            let idx = self.index_of(name).ok_or_else(|| {
                EngineError::AssetMismatch(format!("{} references unknown asset '{}'", field, name))
            })?;
            if seen[idx] {
                return Err(EngineError::AssetMismatch(format!(
                    "{} lists asset '{}' more than once",
                    field, name
                )));
            }
            seen[idx] = true;
            out[idx] = *value;
        }
        Ok(out)
    }

    pub fn label_weights(&self, values: &[f64]) -> Vec<AssetWeight> {
        self.names
            .iter()
            .zip(values.iter())
            .map(|(name, w)| AssetWeight {
                name: name.clone(),
                weight: *w,
            })
            .collect()
    }

    pub fn label_returns(&self, values: &[f64]) -> Vec<AssetReturn> {
        self.names
            .iter()
            .zip(values.iter())
            .map(|(name, r)| AssetReturn {
                name: name.clone(),
                expected_return: *r,
            })
            .collect()
    }
}

impl TryFrom<Vec<String>> for AssetSet {
    type Error = EngineError;

    fn try_from(names: Vec<String>) -> Result<Self, Self::Error> {
        AssetSet::new(names)
    }
}

impl From<AssetSet> for Vec<String> {
    fn from(set: AssetSet) -> Self {
        set.names
    }
}

/// Annualised covariance matrix indexed by an [`AssetSet`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawCovariance")]
pub struct CovarianceMatrix {
    assets: AssetSet,
    values: Vec<Vec<f64>>,
}

#[derive(Deserialize)]
struct RawCovariance {
    assets: Vec<String>,
    values: Vec<Vec<f64>>,
}

impl TryFrom<RawCovariance> for CovarianceMatrix {
    type Error = EngineError;

    fn try_from(raw: RawCovariance) -> Result<Self, Self::Error> {
        CovarianceMatrix::new(AssetSet::new(raw.assets)?, raw.values)
    }
}

impl CovarianceMatrix {
    /// Build a covariance matrix, checking shape, finiteness and symmetry.
    pub fn new(assets: AssetSet, values: Vec<Vec<f64>>) -> EngineResult<Self> {
        let n = assets.len();
        if values.len() != n {
            return Err(EngineError::AssetMismatch(format!(
                "Covariance has {} rows but {} assets",
                values.len(),
                n
            )));
        }
        for (i, row) in values.iter().enumerate() {
            if row.len() != n {
                return Err(EngineError::AssetMismatch(format!(
                    "Covariance row {} has {} columns, expected {}",
                    i,
                    row.len(),
                    n
                )));
            }
            if row.iter().any(|v| !v.is_finite()) {
                return Err(EngineError::InvalidParameter {
                    field: "covariance".into(),
                    reason: format!("Row {} contains a non-finite value", i),
                });
            }
            if row[i] < 0.0 {
                return Err(EngineError::InvalidParameter {
                    field: "covariance".into(),
                    reason: format!("Negative variance on the diagonal at {}", i),
                });
            }
        }
        for i in 0..n {
            for j in (i + 1)..n {
                if (values[i][j] - values[j][i]).abs() > SYMMETRY_TOLERANCE {
                    return Err(EngineError::InvalidParameter {
                        field: "covariance".into(),
                        reason: format!(
                            "Not symmetric: [{},{}]={} != [{},{}]={}",
                            i, j, values[i][j], j, i, values[j][i]
                        ),
                    });
                }
            }
        }
        Ok(Self { assets, values })
    }

    /// Convenience constructor from plain names.
    pub fn from_names(names: &[&str], values: Vec<Vec<f64>>) -> EngineResult<Self> {
        let assets = AssetSet::new(names.iter().map(|s| s.to_string()).collect())?;
        Self::new(assets, values)
    }

    pub fn assets(&self) -> &AssetSet {
        &self.assets
    }

    pub fn values(&self) -> &[Vec<f64>] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }
}

/// Check that a weight vector is a valid long-only allocation.
pub fn validate_allocation(weights: &[AssetWeight], field: &str) -> EngineResult<()> {
    for w in weights {
        if !w.weight.is_finite() || w.weight < 0.0 {
            return Err(EngineError::InvalidAllocation {
                field: field.into(),
                reason: format!("{} has invalid weight {}", w.name, w.weight),
            });
        }
    }
    let sum: f64 = weights.iter().map(|w| w.weight).sum();
    if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
        return Err(EngineError::InvalidAllocation {
            field: field.into(),
            reason: format!("Weights must sum to 1.0 (got {})", sum),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Output envelope
// ---------------------------------------------------------------------------

/// Standard computation output envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationOutput<T: Serialize> {
    pub result: T,
    pub methodology: String,
    pub assumptions: serde_json::Value,
    pub warnings: Vec<String>,
    pub metadata: ComputationMetadata,
}

/// Metadata for every computation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationMetadata {
    pub version: String,
    pub computation_time_us: u64,
    pub precision: String,
}

fn envelope<T: Serialize>(
    methodology: &str,
    assumptions: &impl Serialize,
    warnings: Vec<String>,
    elapsed_us: u64,
    precision: &str,
    result: T,
) -> ComputationOutput<T> {
    ComputationOutput {
        result,
        methodology: methodology.to_string(),
        assumptions: serde_json::to_value(assumptions).unwrap_or_default(),
        warnings,
        metadata: ComputationMetadata {
            version: env!("CARGO_PKG_VERSION").to_string(),
            computation_time_us: elapsed_us,
            precision: precision.to_string(),
        },
    }
}

/// Wrap a floating-point computation result with metadata.
pub fn with_metadata<T: Serialize>(
    methodology: &str,
    assumptions: &impl Serialize,
    warnings: Vec<String>,
    elapsed_us: u64,
    result: T,
) -> ComputationOutput<T> {
    envelope(methodology, assumptions, warnings, elapsed_us, "ieee754_f64", result)
}

/// Wrap a decimal (money) computation result with metadata.
pub fn with_decimal_metadata<T: Serialize>(
    methodology: &str,
    assumptions: &impl Serialize,
    warnings: Vec<String>,
    elapsed_us: u64,
    result: T,
) -> ComputationOutput<T> {
    envelope(
        methodology,
        assumptions,
        warnings,
        elapsed_us,
        "rust_decimal_128bit",
        result,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_asset_set_rejects_duplicates() {
        let err = AssetSet::new(names(&["A", "B", "A"])).unwrap_err();
        assert!(matches!(err, EngineError::AssetMismatch(_)));
    }

    #[test]
    fn test_asset_set_rejects_empty() {
        assert!(AssetSet::new(vec![]).is_err());
    }

    #[test]
    fn test_align_reorders_to_set_order() {
        let set = AssetSet::new(names(&["X", "Y", "Z"])).unwrap();
        let weights = vec![
            AssetWeight { name: "Z".into(), weight: 0.3 },
            AssetWeight { name: "X".into(), weight: 0.5 },
            AssetWeight { name: "Y".into(), weight: 0.2 },
        ];
        let aligned = set.align_weights(&weights, "weights").unwrap();
        assert_eq!(aligned, vec![0.5, 0.2, 0.3]);
    }

    #[test]
    fn test_align_unknown_asset() {
        let set = AssetSet::new(names(&["X", "Y"])).unwrap();
        let weights = vec![
            AssetWeight { name: "X".into(), weight: 0.5 },
            AssetWeight { name: "Q".into(), weight: 0.5 },
        ];
        assert!(matches!(
            set.align_weights(&weights, "weights"),
            Err(EngineError::AssetMismatch(_))
        ));
    }

    #[test]
    fn test_align_missing_asset() {
        let set = AssetSet::new(names(&["X", "Y"])).unwrap();
        let weights = vec![AssetWeight { name: "X".into(), weight: 1.0 }];
        assert!(set.align_weights(&weights, "weights").is_err());
    }

    #[test]
    fn test_covariance_asymmetric_rejected() {
        let res = CovarianceMatrix::from_names(&["A", "B"], vec![vec![0.04, 0.01], vec![0.02, 0.09]]);
        assert!(res.is_err());
    }

    #[test]
    fn test_covariance_non_square_rejected() {
        let res = CovarianceMatrix::from_names(&["A", "B"], vec![vec![0.04, 0.01]]);
        assert!(matches!(res, Err(EngineError::AssetMismatch(_))));
    }

    #[test]
    fn test_covariance_deserialize_validates() {
        let json = r#"{"assets":["A","B"],"values":[[0.04,0.01],[0.01,0.09]]}"#;
        let cov: CovarianceMatrix = serde_json::from_str(json).unwrap();
        assert_eq!(cov.len(), 2);
        assert_eq!(cov.assets().index_of("B"), Some(1));

        let bad = r#"{"assets":["A","A"],"values":[[0.04,0.01],[0.01,0.09]]}"#;
        assert!(serde_json::from_str::<CovarianceMatrix>(bad).is_err());
    }

    #[test]
    fn test_validate_allocation() {
        let ok = vec![
            AssetWeight { name: "A".into(), weight: 0.6 },
            AssetWeight { name: "B".into(), weight: 0.4 },
        ];
        assert!(validate_allocation(&ok, "w").is_ok());

        let negative = vec![
            AssetWeight { name: "A".into(), weight: 1.2 },
            AssetWeight { name: "B".into(), weight: -0.2 },
        ];
        assert!(matches!(
            validate_allocation(&negative, "w"),
            Err(EngineError::InvalidAllocation { .. })
        ));

        let short = vec![AssetWeight { name: "A".into(), weight: 0.7 }];
        assert!(validate_allocation(&short, "w").is_err());
    }

    #[test]
    fn test_return_frequency_periods() {
        assert_eq!(ReturnFrequency::Daily.periods_per_year(), 252.0);
        assert_eq!(ReturnFrequency::Monthly.periods_per_year(), 12.0);
        assert_eq!(ReturnFrequency::Custom(365.0).periods_per_year(), 365.0);
    }
}
