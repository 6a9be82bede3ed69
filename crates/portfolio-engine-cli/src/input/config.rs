use portfolio_engine_core::config::EngineConfig;

use crate::input::file;

/// Load engine settings from a JSON or YAML file; defaults when no path is given.
pub fn load_config(path: Option<&str>) -> Result<EngineConfig, Box<dyn std::error::Error>> {
    let Some(path) = path else {
        return Ok(EngineConfig::default());
    };
    let source = file::open(path)?;
    let config: EngineConfig = source.parse()?;
    config.validate()?;
    tracing::debug!(origin = %source.origin, "config loaded");
    Ok(config)
}
