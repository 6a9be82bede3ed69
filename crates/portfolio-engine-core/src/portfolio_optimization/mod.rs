pub mod analytics;
pub mod black_litterman;
pub mod equilibrium;
pub mod mean_variance;
