pub mod allocation;
pub mod projection;
pub mod rebalancing;
pub mod statistics;
pub mod tax;

use serde::de::DeserializeOwned;

use crate::input::file::{self, Source};
use crate::input::stdin;

/// The command input from `--input <file>` or piped stdin.
pub fn input_source(path: Option<&str>, what: &str) -> Result<Source, Box<dyn std::error::Error>> {
    if let Some(path) = path {
        return file::open(path);
    }
    stdin::read_piped()?
        .ok_or_else(|| format!("--input <file> or piped stdin required for {}", what).into())
}

/// Deserialise the command input (JSON or YAML) from a file or stdin.
pub fn read_input<T: DeserializeOwned>(
    path: Option<&str>,
    what: &str,
) -> Result<T, Box<dyn std::error::Error>> {
    input_source(path, what)?.parse()
}
