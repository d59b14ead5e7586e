//! Environment snapshot
//!
//! The process environment is read exactly once, overlaid with the values of
//! a `.env` secrets file, and frozen. Components receive the snapshot by
//! reference and never call `std::env` themselves.

use std::collections::HashMap;
use std::path::Path;
use tokio::fs;

use crate::core::error::PublishError;

/// Immutable view of the environment for one run
#[derive(Debug, Clone, Default)]
pub struct EnvSnapshot {
    vars: HashMap<String, String>,
}

impl EnvSnapshot {
    /// Capture the current process environment
    pub fn from_process() -> Self {
        Self {
            vars: std::env::vars().collect(),
        }
    }

    /// Build a snapshot from explicit pairs
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Overlay the values of a `.env` file; file values win
    pub async fn overlay_file(&mut self, path: &Path) -> Result<usize, PublishError> {
        let content = fs::read_to_string(path).await.map_err(|e| {
            PublishError::config(format!("failed to read {}: {}", path.display(), e))
        })?;

        let pairs = parse_env_file(&content);
        let count = pairs.len();
        self.vars.extend(pairs);
        Ok(count)
    }

    /// Non-empty value of a variable
    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }
}

/// Parse `KEY=VALUE` lines
///
/// Blank lines and `#` comments are skipped, an `export ` prefix is
/// tolerated, and one pair of matching surrounding quotes is stripped.
pub fn parse_env_file(content: &str) -> Vec<(String, String)> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let line = line.strip_prefix("export ").unwrap_or(line);
            let (key, value) = line.split_once('=')?;
            let key = key.trim();
            if key.is_empty() {
                return None;
            }
            Some((key.to_string(), unquote(value.trim()).to_string()))
        })
        .collect()
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_env_file() {
        let content = r#"
# registry tokens
CARGO_REGISTRY_TOKEN=cio_abc123
export NPM_TOKEN="npm_secret"
PYPI_API_TOKEN = 'pypi-AgEI'
URL=https://example.com/?a=b
=novalue
not a pair
"#;

        let pairs = parse_env_file(content);

        assert_eq!(
            pairs,
            vec![
                ("CARGO_REGISTRY_TOKEN".to_string(), "cio_abc123".to_string()),
                ("NPM_TOKEN".to_string(), "npm_secret".to_string()),
                ("PYPI_API_TOKEN".to_string(), "pypi-AgEI".to_string()),
                ("URL".to_string(), "https://example.com/?a=b".to_string()),
            ]
        );
    }

    #[test]
    fn test_unquote_keeps_unmatched_quotes() {
        assert_eq!(unquote("\"abc"), "\"abc");
        assert_eq!(unquote("\""), "\"");
        assert_eq!(unquote("'x'"), "x");
    }

    #[test]
    fn test_empty_value_is_absent() {
        let env = EnvSnapshot::from_pairs([("NPM_TOKEN", ""), ("PYPI_API_TOKEN", "x")]);

        assert!(env.get("NPM_TOKEN").is_none());
        assert!(!env.contains("NPM_TOKEN"));
        assert_eq!(env.get("PYPI_API_TOKEN"), Some("x"));
    }

    #[tokio::test]
    async fn test_overlay_file_overrides_existing_values() {
        let temp_dir = TempDir::new().unwrap();
        let env_file = temp_dir.path().join(".env");
        std::fs::write(&env_file, "NPM_TOKEN=from-file\nPYTHON_PATH=/opt/py\n").unwrap();

        let mut env = EnvSnapshot::from_pairs([("NPM_TOKEN", "from-process")]);
        let count = env.overlay_file(&env_file).await.unwrap();

        assert_eq!(count, 2);
        assert_eq!(env.get("NPM_TOKEN"), Some("from-file"));
        assert_eq!(env.get("PYTHON_PATH"), Some("/opt/py"));
    }

    #[tokio::test]
    async fn test_overlay_missing_file_is_config_error() {
        let temp_dir = TempDir::new().unwrap();
        let mut env = EnvSnapshot::default();

        let err = env
            .overlay_file(&temp_dir.path().join("missing.env"))
            .await
            .unwrap_err();

        assert_eq!(err.code(), "CONFIG_ERROR");
    }
}
