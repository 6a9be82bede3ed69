use serde::de::DeserializeOwned;
use std::fs;
use std::path::Path;

/// Encoding of an input document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocFormat {
    Json,
    Yaml,
    Csv,
}

impl DocFormat {
    fn from_extension(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "json" => Some(Self::Json),
            "yaml" | "yml" => Some(Self::Yaml),
            "csv" => Some(Self::Csv),
            _ => None,
        }
    }

    /// Guess from the content: a JSON document opens with a brace or bracket,
    /// a price CSV has a comma-separated header line.
    pub fn sniff(text: &str) -> Self {
        let trimmed = text.trim_start();
        if trimmed.starts_with('{') || trimmed.starts_with('[') {
            return Self::Json;
        }
        let header = trimmed.lines().next().unwrap_or_default();
        if header.contains(',') && !header.contains(':') {
            Self::Csv
        } else {
            Self::Yaml
        }
    }
}

/// An input document and where it came from, for error messages.
#[derive(Debug)]
pub struct Source {
    pub origin: String,
    pub format: DocFormat,
    pub text: String,
}

impl Source {
    pub fn from_text(origin: impl Into<String>, text: String) -> Self {
        Self {
            origin: origin.into(),
            format: DocFormat::sniff(&text),
            text,
        }
    }

    /// Deserialise a JSON or YAML document.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, Box<dyn std::error::Error>> {
        let parsed = match self.format {
            DocFormat::Json => serde_json::from_str(&self.text).map_err(|e| e.to_string()),
            DocFormat::Yaml => serde_yaml::from_str(&self.text).map_err(|e| e.to_string()),
            DocFormat::Csv => Err("CSV is only accepted as a price history".to_string()),
        };
        parsed.map_err(|e| format!("Failed to parse {}: {}", self.origin, e).into())
    }
}

/// Read a file into a [`Source`]. The format follows the extension and falls
/// back to the content when the extension is unknown.
pub fn open(path: &str) -> Result<Source, Box<dyn std::error::Error>> {
    let p = Path::new(path);
    let resolved = if p.is_absolute() {
        p.to_path_buf()
    } else {
        std::env::current_dir()?.join(p)
    };
    if !resolved.is_file() {
        return Err(format!("Not a readable file: {}", resolved.display()).into());
    }

    let text = fs::read_to_string(&resolved)
        .map_err(|e| format!("Failed to read '{}': {}", resolved.display(), e))?;
    let origin = format!("'{}'", resolved.display());
    Ok(match DocFormat::from_extension(&resolved) {
        Some(format) => Source {
            origin,
            format,
            text,
        },
        None => Source::from_text(origin, text),
    })
}
