//! Layered configuration loading.
//!
//! Sources, highest precedence first:
//!
//! 1. an explicitly supplied file
//! 2. `extractor.config.yaml` in the project root
//! 3. `extractor.config.json` in the project root
//! 4. the `extractorConfig` field of `package.json`
//! 5. built-in defaults
//!
//! Present sources are right-folded onto the defaults with [`deep_merge`].

use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::{validate, ExtractorConfig};
use crate::error::ConfigError;

pub const YAML_CONFIG_FILE: &str = "extractor.config.yaml";
pub const JSON_CONFIG_FILE: &str = "extractor.config.json";
pub const PACKAGE_CONFIG_FIELD: &str = "extractorConfig";

/// Builder for loading configuration for one project.
pub struct ConfigLoader {
    root: PathBuf,
    explicit: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            explicit: None,
        }
    }

    /// Use an explicit config file as the highest-precedence source.
    pub fn explicit(mut self, path: Option<&Path>) -> Self {
        self.explicit = path.map(Path::to_path_buf);
        self
    }

    /// Collect every present source, highest precedence first.
    fn collect_layers(&self) -> Result<Vec<(PathBuf, Value)>, ConfigError> {
        let mut layers = Vec::new();

        if let Some(path) = &self.explicit {
            let path = if path.is_absolute() {
                path.clone()
            } else {
                self.root.join(path)
            };
            match read_config_file(&path)? {
                Some(value) => layers.push((path, value)),
                None => warn!(path = %path.display(), "explicit config file not found, skipping"),
            }
        }

        let yaml_path = self.root.join(YAML_CONFIG_FILE);
        if let Some(value) = read_config_file(&yaml_path)? {
            layers.push((yaml_path, value));
        }

        let json_path = self.root.join(JSON_CONFIG_FILE);
        if let Some(value) = read_config_file(&json_path)? {
            layers.push((json_path, value));
        }

        let package_path = self.root.join("package.json");
        if let Some(value) = read_package_field(&package_path)? {
            layers.push((package_path, value));
        }

        Ok(layers)
    }

    /// Load, merge and validate the configuration.
    pub fn load(&self) -> Result<ExtractorConfig, ConfigError> {
        let layers = self.collect_layers()?;
        let defaults = serde_json::to_value(ExtractorConfig::default())
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        let merged = layers
            .into_iter()
            .rev()
            .fold(defaults, |acc, (path, layer)| {
                debug!(path = %path.display(), "merging config layer");
                deep_merge(acc, layer)
            });

        let config: ExtractorConfig =
            serde_json::from_value(merged).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        validate(&config)?;
        Ok(config)
    }
}

/// Load configuration for `root`, optionally with an explicit file on top.
pub fn load(root: &Path, explicit: Option<&Path>) -> Result<ExtractorConfig, ConfigError> {
    ConfigLoader::new(root).explicit(explicit).load()
}

/// Recursively merge `overlay` onto `base`.
///
/// Objects merge key by key. Any other overlay value replaces the base
/// value outright, arrays included. A `null` overlay keeps the base value.
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                let merged = match base_map.remove(&key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => overlay_value,
                };
                base_map.insert(key, merged);
            }
            Value::Object(base_map)
        }
        (base, Value::Null) => base,
        (_, overlay) => overlay,
    }
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    )
}

/// Read a config file; `Ok(None)` if it does not exist or is empty.
fn read_config_file(path: &Path) -> Result<Option<Value>, ConfigError> {
    if !path.is_file() {
        return Ok(None);
    }

    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let value: Value = if is_yaml(path) {
        serde_yaml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?
    } else {
        serde_json::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?
    };

    match value {
        Value::Null => Ok(None),
        Value::Object(_) => Ok(Some(value)),
        _ => Err(ConfigError::Parse {
            path: path.to_path_buf(),
            message: "top-level value must be a mapping".to_string(),
        }),
    }
}

fn read_package_field(path: &Path) -> Result<Option<Value>, ConfigError> {
    let Some(package) = read_config_file(path)? else {
        return Ok(None);
    };

    match package.get(PACKAGE_CONFIG_FIELD) {
        Some(value @ Value::Object(_)) => Ok(Some(value.clone())),
        Some(Value::Null) | None => Ok(None),
        Some(_) => Err(ConfigError::Parse {
            path: path.to_path_buf(),
            message: format!("'{}' must be an object", PACKAGE_CONFIG_FIELD),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OutputFormat;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_deep_merge_recurses_and_replaces_arrays() {
        let base = json!({"a": {"x": 1, "list": [1, 2, 3]}, "b": true});
        let overlay = json!({"a": {"list": [9]}, "c": "new"});
        let merged = deep_merge(base, overlay);
        assert_eq!(merged, json!({"a": {"x": 1, "list": [9]}, "b": true, "c": "new"}));
    }

    #[test]
    fn test_deep_merge_null_keeps_base() {
        let merged = deep_merge(json!({"a": 1}), json!({"a": null}));
        assert_eq!(merged, json!({"a": 1}));
    }

    #[test]
    fn test_load_without_files_returns_defaults() {
        let dir = TempDir::new().unwrap();
        let config = load(dir.path(), None).unwrap();
        assert_eq!(config, ExtractorConfig::default());
    }

    #[test]
    fn test_auth_guards_override_keeps_public_decorators() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(YAML_CONFIG_FILE),
            "nestjs:\n  auth:\n    authGuards: [MyGuard]\n    excludeGuards: [OnlyThis]\n",
        )
        .unwrap();

        let config = load(dir.path(), None).unwrap();
        assert_eq!(config.nestjs.auth.auth_guards, vec!["MyGuard"]);
        assert_eq!(config.nestjs.auth.exclude_guards, vec!["OnlyThis"]);
        assert_eq!(
            config.nestjs.auth.public_decorators,
            ExtractorConfig::default().nestjs.auth.public_decorators
        );
    }

    #[test]
    fn test_precedence_order() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("package.json"),
            r#"{"name": "app", "extractorConfig": {"common": {"responseDepth": 5, "extractResponses": true}}}"#,
        )
        .unwrap();
        fs::write(
            dir.path().join(JSON_CONFIG_FILE),
            r#"{"common": {"responseDepth": 4, "outputFormat": "json"}}"#,
        )
        .unwrap();
        fs::write(dir.path().join(YAML_CONFIG_FILE), "common:\n  responseDepth: 3\n").unwrap();
        let explicit = dir.path().join("custom.json");
        fs::write(&explicit, r#"{"common": {"outputFormat": "yaml"}}"#).unwrap();

        let config = load(dir.path(), Some(&explicit)).unwrap();
        assert_eq!(config.common.response_depth, 3);
        assert_eq!(config.common.output_format, OutputFormat::Yaml);
        assert!(config.common.extract_responses);
    }

    #[test]
    fn test_missing_explicit_file_is_skipped() {
        let dir = TempDir::new().unwrap();
        let config = load(dir.path(), Some(Path::new("nope.yaml"))).unwrap();
        assert_eq!(config, ExtractorConfig::default());
    }

    #[test]
    fn test_malformed_file_is_parse_error() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(JSON_CONFIG_FILE), "{ not json").unwrap();
        let err = load(dir.path(), None).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_wrong_shape_is_invalid() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(YAML_CONFIG_FILE),
            "common:\n  responseDepth: deep\n",
        )
        .unwrap();
        let err = load(dir.path(), None).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_package_json_without_field_is_ignored() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("package.json"), r#"{"name": "app"}"#).unwrap();
        assert_eq!(load(dir.path(), None).unwrap(), ExtractorConfig::default());
    }
}
