//! Framework detection from `package.json` dependencies.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use crate::error::{ExtractError, Result};
use crate::model::Framework;

/// Dependencies that identify each framework, checked in priority order.
///
/// NestJS comes first because Nest projects commonly also depend on
/// `express` or `fastify` as their HTTP platform.
const FRAMEWORK_DEPENDENCIES: &[(Framework, &[&str])] = &[
    (Framework::NestJs, &["@nestjs/core", "@nestjs/common"]),
    (Framework::Fastify, &["fastify"]),
    (Framework::Express, &["express"]),
];

/// Outcome of inspecting a project's manifest.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub framework: Option<Framework>,
    /// Fraction of the framework's marker dependencies that were found.
    pub confidence: f64,
    /// Marker dependencies that matched.
    pub matched: Vec<String>,
}

impl Detection {
    fn none() -> Self {
        Self {
            framework: None,
            confidence: 0.0,
            matched: Vec::new(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PackageManifest {
    #[serde(default)]
    dependencies: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    dev_dependencies: BTreeMap<String, serde_json::Value>,
}

/// Detect the framework of the project at `root`.
///
/// A missing `package.json` yields no framework; a malformed one is an error.
pub fn detect_framework(root: &Path) -> Result<Detection> {
    let path = root.join("package.json");
    let content = match fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no package.json");
            return Ok(Detection::none());
        }
        Err(e) => return Err(ExtractError::Io(e)),
    };

    let manifest: PackageManifest =
        serde_json::from_str(&content).map_err(|e| ExtractError::Parse {
            path: path.clone(),
            message: e.to_string(),
        })?;

    Ok(detect_from_manifest(&manifest))
}

fn detect_from_manifest(manifest: &PackageManifest) -> Detection {
    let has = |dep: &str| {
        manifest.dependencies.contains_key(dep) || manifest.dev_dependencies.contains_key(dep)
    };

    for (framework, markers) in FRAMEWORK_DEPENDENCIES {
        let matched: Vec<String> = markers
            .iter()
            .filter(|m| has(m))
            .map(|m| m.to_string())
            .collect();
        if !matched.is_empty() {
            return Detection {
                framework: Some(*framework),
                confidence: matched.len() as f64 / markers.len() as f64,
                matched,
            };
        }
    }

    Detection::none()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_manifest(dir: &TempDir, json: &str) {
        fs::write(dir.path().join("package.json"), json).unwrap();
    }

    #[test]
    fn test_nestjs_wins_over_platform() {
        let dir = TempDir::new().unwrap();
        write_manifest(
            &dir,
            r#"{"dependencies": {"@nestjs/common": "^10", "@nestjs/core": "^10", "express": "^4"}}"#,
        );
        let detection = detect_framework(dir.path()).unwrap();
        assert_eq!(detection.framework, Some(Framework::NestJs));
        assert_eq!(detection.confidence, 1.0);
    }

    #[test]
    fn test_partial_match_confidence() {
        let dir = TempDir::new().unwrap();
        write_manifest(&dir, r#"{"devDependencies": {"@nestjs/common": "^10"}}"#);
        let detection = detect_framework(dir.path()).unwrap();
        assert_eq!(detection.framework, Some(Framework::NestJs));
        assert_eq!(detection.confidence, 0.5);
        assert_eq!(detection.matched, vec!["@nestjs/common".to_string()]);
    }

    #[test]
    fn test_fastify_and_express() {
        let dir = TempDir::new().unwrap();
        write_manifest(&dir, r#"{"dependencies": {"fastify": "^4", "pino": "^8"}}"#);
        assert_eq!(
            detect_framework(dir.path()).unwrap().framework,
            Some(Framework::Fastify)
        );

        write_manifest(&dir, r#"{"dependencies": {"express": "^4"}}"#);
        assert_eq!(
            detect_framework(dir.path()).unwrap().framework,
            Some(Framework::Express)
        );
    }

    #[test]
    fn test_missing_and_malformed_manifest() {
        let dir = TempDir::new().unwrap();
        assert_eq!(detect_framework(dir.path()).unwrap().framework, None);

        write_manifest(&dir, "{ not json");
        assert!(matches!(
            detect_framework(dir.path()),
            Err(ExtractError::Parse { .. })
        ));
    }
}
