//! Effective configuration with provenance
//!
//! The merged document plus where each layer came from. Secrets stay in
//! the merged value so the client can use them; [`EffectiveConfig::redacted`]
//! is what gets printed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

use super::defaults::BuiltinDefaults;
use super::merge::merge_layers;
use super::settings::ConsoleSettings;
use crate::sync::PollRate;

/// Schema identifier written with `dromio-console config`
pub const SCHEMA_ID: &str = "dromio-console/effective_config@1";

/// Which layer a source fed
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ConfigOrigin {
    Builtin,
    User,
    File,
    Cli,
}

/// One layer of the merge and where it came from
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSource {
    pub origin: ConfigOrigin,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// SHA-256 of the file bytes, hex
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

impl ConfigSource {
    fn inline(origin: ConfigOrigin) -> Self {
        Self {
            origin,
            path: None,
            digest: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectiveConfig {
    pub schema_id: String,

    pub created_at: DateTime<Utc>,

    /// Merged document, secrets included
    pub config: Value,

    /// Lowest precedence first
    pub sources: Vec<ConfigSource>,
}

/// Key fragments that mark a value as secret
const SECRET_KEYS: &[&str] = &["password", "token", "secret", "cookie", "credential"];

const REDACTED: &str = "[REDACTED]";

impl EffectiveConfig {
    /// Merge builtin defaults, the user file, an explicit `--config` file and
    /// command-line overrides, later layers winning.
    ///
    /// A missing user file is skipped; a missing explicit file is an error.
    pub fn build(
        user_file: Option<&Path>,
        explicit_file: Option<&Path>,
        cli_overrides: Option<Value>,
    ) -> Result<Self, ConfigError> {
        let mut layers = vec![BuiltinDefaults::default().to_value()];
        let mut sources = vec![ConfigSource::inline(ConfigOrigin::Builtin)];

        let files = [
            (ConfigOrigin::User, user_file.filter(|p| p.exists())),
            (ConfigOrigin::File, explicit_file),
        ];
        for (origin, path) in files {
            if let Some(path) = path {
                let (layer, source) = read_layer(origin, path)?;
                layers.push(layer);
                sources.push(source);
            }
        }

        if let Some(overrides) = cli_overrides {
            layers.push(overrides);
            sources.push(ConfigSource::inline(ConfigOrigin::Cli));
        }

        let config = merge_layers(layers);
        check_ranges(&config)?;
        tracing::debug!(layers = sources.len(), "Console config merged");

        Ok(Self {
            schema_id: SCHEMA_ID.to_string(),
            created_at: Utc::now(),
            config,
            sources,
        })
    }

    /// `~/.config/dromio/console.toml`, when `HOME` is set.
    pub fn default_user_path() -> Option<PathBuf> {
        std::env::var_os("HOME").map(|home| {
            PathBuf::from(home)
                .join(".config")
                .join("dromio")
                .join("console.toml")
        })
    }

    /// Typed settings for the client and the engine.
    pub fn settings(&self) -> Result<ConsoleSettings, ConfigError> {
        ConsoleSettings::from_effective(self)
    }

    /// Copy with secret values replaced, plus the redacted key paths.
    pub fn redacted(&self) -> (Self, Vec<String>) {
        let mut copy = self.clone();
        let mut redactions = Vec::new();
        redact_recursive(&mut copy.config, String::new(), &mut redactions);
        (copy, redactions)
    }

    /// Pretty JSON of the redacted config
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.redacted().0)
    }

    /// Value at a dotted path such as `poll.runs_ms`.
    pub fn get(&self, path: &str) -> Option<&Value> {
        path.split('.').try_fold(&self.config, |node, key| node.get(key))
    }

    pub fn get_u64(&self, path: &str) -> Option<u64> {
        self.get(path).and_then(Value::as_u64)
    }

    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(Value::as_str)
    }
}

/// One TOML file as a JSON layer, with its provenance.
fn read_layer(origin: ConfigOrigin, path: &Path) -> Result<(Value, ConfigSource), ConfigError> {
    let bytes =
        fs::read(path).map_err(|e| ConfigError::IoError(format!("{}: {}", path.display(), e)))?;
    let source = ConfigSource {
        origin,
        path: Some(path.display().to_string()),
        digest: Some(hex::encode(Sha256::digest(&bytes))),
    };

    let text = std::str::from_utf8(&bytes)
        .map_err(|e| ConfigError::ParseError(format!("{} is not UTF-8: {}", path.display(), e)))?;
    let table: toml::Value = toml::from_str(text)
        .map_err(|e| ConfigError::ParseError(format!("{}: {}", path.display(), e)))?;
    Ok((toml_to_json(table), source))
}

/// Range checks the typed conversion cannot express.
fn check_ranges(config: &Value) -> Result<(), ConfigError> {
    let number = |section: &str, key: &str| {
        config.get(section).and_then(|s| s.get(key)).and_then(Value::as_u64)
    };
    let invalid = |msg: String| Err(ConfigError::ValidationError(msg));

    if matches!(number("api", "timeout_seconds"), None | Some(0)) {
        return invalid("api.timeout_seconds must be a positive integer".to_string());
    }
    if let Some(ms) = number("poll", "runs_ms") {
        if PollRate::from_millis(ms).is_none() {
            return invalid(format!(
                "poll.runs_ms must be one of 0, 200, 1000, 2000, 10000 (got {})",
                ms
            ));
        }
    }
    if number("runs", "limit") == Some(0) {
        return invalid("runs.limit must be at least 1".to_string());
    }
    if number("workers", "liveness_threshold_ms") == Some(0) {
        return invalid("workers.liveness_threshold_ms must be positive".to_string());
    }
    Ok(())
}

fn toml_to_json(toml: toml::Value) -> Value {
    match toml {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::Number(i.into()),
        toml::Value::Float(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(arr) => Value::Array(arr.into_iter().map(toml_to_json).collect()),
        toml::Value::Table(table) => Value::Object(
            table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect(),
        ),
    }
}

fn redact_recursive(value: &mut Value, path: String, redactions: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            for (key, val) in map.iter_mut() {
                let current_path = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", path, key)
                };
                let key_lower = key.to_lowercase();
                let is_secret = SECRET_KEYS.iter().any(|s| key_lower.contains(s));

                if is_secret && !val.is_object() && !val.is_array() {
                    *val = Value::String(REDACTED.to_string());
                    redactions.push(current_path);
                } else {
                    redact_recursive(val, current_path, redactions);
                }
            }
        }
        Value::Array(arr) => {
            for (i, val) in arr.iter_mut().enumerate() {
                redact_recursive(val, format!("{}[{}]", path, i), redactions);
            }
        }
        _ => {}
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot read config: {0}")]
    IoError(String),

    #[error("Cannot parse config: {0}")]
    ParseError(String),

    #[error("Invalid config: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_builtin_layer_alone() {
        let config = EffectiveConfig::build(None, None, None).unwrap();

        assert_eq!(config.get_u64("poll.jobs_ms"), Some(3000));
        assert_eq!(config.get_str("api.base_url"), Some("http://localhost:8080"));
        assert_eq!(config.sources.len(), 1);
        assert_eq!(config.sources[0].origin, ConfigOrigin::Builtin);
        assert!(config.sources[0].digest.is_none());
    }

    #[test]
    fn test_missing_user_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("console.toml");
        let config = EffectiveConfig::build(Some(&missing), None, None).unwrap();
        assert_eq!(config.sources.len(), 1);
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        let err = EffectiveConfig::build(None, Some(&missing), None).unwrap_err();
        assert!(matches!(err, ConfigError::IoError(_)));
    }

    #[test]
    fn test_file_layers_and_digest() {
        let mut user = NamedTempFile::new().unwrap();
        writeln!(user, "[poll]").unwrap();
        writeln!(user, "jobs_ms = 1000").unwrap();
        writeln!(user, "runs_ms = 200").unwrap();

        let mut explicit = NamedTempFile::new().unwrap();
        writeln!(explicit, "[poll]").unwrap();
        writeln!(explicit, "runs_ms = 10000").unwrap();

        let config =
            EffectiveConfig::build(Some(user.path()), Some(explicit.path()), None).unwrap();

        assert_eq!(config.get_u64("poll.jobs_ms"), Some(1000));
        assert_eq!(config.get_u64("poll.runs_ms"), Some(10000));
        assert_eq!(config.sources.len(), 3);
        assert_eq!(config.sources[1].origin, ConfigOrigin::User);
        assert_eq!(config.sources[2].origin, ConfigOrigin::File);
        assert_eq!(config.sources[1].digest.as_ref().map(|d| d.len()), Some(64));
    }

    #[test]
    fn test_cli_wins() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[api]").unwrap();
        writeln!(file, "timeout_seconds = 10").unwrap();

        let cli = json!({"api": {"timeout_seconds": 5}});
        let config = EffectiveConfig::build(None, Some(file.path()), Some(cli)).unwrap();
        assert_eq!(config.get_u64("api.timeout_seconds"), Some(5));
    }

    #[test]
    fn test_rejects_unselectable_runs_rate() {
        let cli = json!({"poll": {"runs_ms": 1500}});
        let err = EffectiveConfig::build(None, None, Some(cli)).unwrap_err();
        assert!(err.to_string().contains("poll.runs_ms"));
    }

    #[test]
    fn test_rejects_zero_timeout() {
        let cli = json!({"api": {"timeout_seconds": 0}});
        let err = EffectiveConfig::build(None, None, Some(cli)).unwrap_err();
        assert!(err.to_string().contains("api.timeout_seconds"));
    }

    #[test]
    fn test_bad_toml_is_parse_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[poll").unwrap();
        let err = EffectiveConfig::build(None, Some(file.path()), None).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_redaction_is_display_only() {
        let cli = json!({"auth": {"password": "hunter2", "username": "ops"}});
        let config = EffectiveConfig::build(None, None, Some(cli)).unwrap();

        assert_eq!(config.get_str("auth.password"), Some("hunter2"));

        let (shown, redactions) = config.redacted();
        assert_eq!(shown.get_str("auth.password"), Some(REDACTED));
        assert_eq!(shown.get_str("auth.username"), Some("ops"));
        assert_eq!(redactions, vec!["auth.password".to_string()]);
        assert!(!config.to_json().unwrap().contains("hunter2"));
    }
}
