use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid parameter: {field}: {reason}")]
    InvalidParameter { field: String, reason: String },

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Invalid price for {asset} at row {row}: {price} (prices must be positive)")]
    InvalidPrice { asset: String, row: usize, price: f64 },

    #[error("Asset mismatch: {0}")]
    AssetMismatch(String),

    #[error("Singular matrix in {context}: inverse is undefined")]
    SingularMatrix { context: String },

    #[error("Invalid allocation: {field}: {reason}")]
    InvalidAllocation { field: String, reason: String },

    #[error("Solver non-convergence: {function} did not converge after {iterations} iterations (residual: {last_delta:e})")]
    SolverNonConvergence {
        function: String,
        iterations: u32,
        last_delta: f64,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::Serialization(e.to_string())
    }
}
