//! `.env` file parsing.
//!
//! Lines are `KEY=VALUE`. Blank lines and lines starting with `#` are
//! skipped, the first `=` separates key from value, and one pair of outer
//! single or double quotes is stripped from the value.

use std::collections::BTreeMap;
use std::path::Path;

use rack_common::error::LoadError;

/// Parses the contents of an environment file.
///
/// Later assignments of the same key win.
///
/// # Errors
///
/// Returns [`LoadError::EnvFile`] for a line without `=` or with an empty
/// or whitespace-containing key.
pub fn parse(content: &str, path: &Path) -> Result<BTreeMap<String, String>, LoadError> {
    let mut vars = BTreeMap::new();

    for (idx, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let err = |message: &str| LoadError::EnvFile {
            path: path.to_path_buf(),
            line: idx + 1,
            message: message.to_string(),
        };

        let (key, value) = line.split_once('=').ok_or_else(|| err("expected KEY=VALUE"))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(err("empty variable name"));
        }
        if key.chars().any(char::is_whitespace) {
            return Err(err("variable name contains whitespace"));
        }

        let _ = vars.insert(key.to_string(), unquote(value.trim()).to_string());
    }

    Ok(vars)
}

/// Reads and parses an environment file.
///
/// # Errors
///
/// Returns [`LoadError::Io`] if the file cannot be read, or any error
/// from [`parse`].
pub fn read(path: &Path) -> Result<BTreeMap<String, String>, LoadError> {
    let content = std::fs::read_to_string(path).map_err(|e| LoadError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    let vars = parse(&content, path)?;
    tracing::debug!(path = %path.display(), count = vars.len(), "loaded environment file");
    Ok(vars)
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}
