use std::io::{self, Read};

use crate::input::file::Source;

/// Piped stdin as a [`Source`]; `None` on an interactive terminal or an empty
/// pipe.
pub fn read_piped() -> Result<Option<Source>, Box<dyn std::error::Error>> {
    if atty::is(atty::Stream::Stdin) {
        return Ok(None);
    }
    let mut text = String::new();
    io::stdin().read_to_string(&mut text)?;
    if text.trim().is_empty() {
        return Ok(None);
    }
    tracing::debug!(bytes = text.len(), "read input from stdin");
    Ok(Some(Source::from_text("stdin", text)))
}
