pub mod config;
pub mod error;
pub mod linalg;
pub mod statistics;
pub mod types;

#[cfg(feature = "portfolio_optimization")]
pub mod portfolio_optimization;

#[cfg(feature = "monte_carlo")]
pub mod monte_carlo;

#[cfg(feature = "rebalancing")]
pub mod rebalancing;

#[cfg(feature = "tax")]
pub mod tax;

pub use error::EngineError;
pub use types::*;

/// Standard result type for all engine operations
pub type EngineResult<T> = Result<T, EngineError>;
