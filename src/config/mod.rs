//! Extractor configuration schema.
//!
//! Configuration is layered (see [`loader`]) and becomes read-only once the
//! merge is done. Every field has a default so a project can override a
//! single key and keep the rest.

pub mod loader;

pub use loader::{deep_merge, load, ConfigLoader};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Fastify lifecycle hooks that can carry auth middleware.
pub const FASTIFY_AUTH_HOOKS: &[&str] = &["preHandler", "onRequest", "preValidation"];

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct ExtractorConfig {
    pub common: CommonConfig,
    pub nestjs: NestJsConfig,
    pub fastify: FastifyConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Yaml,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "yaml" | "yml" => Ok(OutputFormat::Yaml),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("invalid format {:?}, must be 'yaml' or 'json'", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CommonConfig {
    pub output_format: OutputFormat,
    pub extract_responses: bool,
    /// Nesting cap when rendering object shapes.
    pub response_depth: usize,
    /// Glob patterns for files kept out of the source index.
    pub exclude_paths: Vec<String>,
}

impl Default for CommonConfig {
    fn default() -> Self {
        Self {
            output_format: OutputFormat::Yaml,
            extract_responses: false,
            response_depth: 2,
            exclude_paths: strings(&[
                "**/node_modules/**",
                "**/dist/**",
                "**/*.d.ts",
                "**/*.spec.ts",
                "**/*.test.ts",
            ]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NestJsConfig {
    /// Root module, relative to the project root.
    pub entry: String,
    pub auth: NestAuthConfig,
    pub params: NestParamsConfig,
}

impl Default for NestJsConfig {
    fn default() -> Self {
        Self {
            entry: "src/app.module.ts".to_string(),
            auth: NestAuthConfig::default(),
            params: NestParamsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NestAuthConfig {
    /// Regexes matched (unanchored) against guard class names.
    pub guard_patterns: Vec<String>,
    /// Guard names that are always auth guards.
    pub auth_guards: Vec<String>,
    /// Guard names that are never auth guards.
    pub exclude_guards: Vec<String>,
    pub public_decorators: Vec<String>,
    pub public_metadata_keys: Vec<String>,
    /// Base classes (or base-class factories) that make a subclass an auth guard.
    pub auth_base_classes: Vec<String>,
}

impl Default for NestAuthConfig {
    fn default() -> Self {
        Self {
            guard_patterns: strings(&[
                ".*AuthGuard$",
                ".*JwtGuard$",
                ".*SessionGuard$",
                ".*TokenGuard$",
            ]),
            auth_guards: Vec::new(),
            exclude_guards: strings(&["ThrottlerGuard", "RateLimitGuard"]),
            public_decorators: strings(&["Public", "SkipAuth", "AllowAnonymous"]),
            public_metadata_keys: strings(&["isPublic", "IS_PUBLIC_KEY", "skipAuth"]),
            auth_base_classes: strings(&["AuthGuard"]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct NestParamsConfig {
    pub custom_decorators: Vec<CustomDecoratorConfig>,
}

/// A project-specific parameter decorator, e.g. `@CurrentUser()`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CustomDecoratorConfig {
    pub name: String,
    #[serde(rename = "type", default = "default_custom_type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

fn default_custom_type() -> String {
    "custom".to_string()
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FastifyConfig {
    /// File holding the `register(...)` calls, relative to the project root.
    pub entry: String,
    pub auth: FastifyAuthConfig,
}

impl Default for FastifyConfig {
    fn default() -> Self {
        Self {
            entry: "src/build.ts".to_string(),
            auth: FastifyAuthConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FastifyAuthConfig {
    /// Matched case-insensitively as substrings of hook identifiers.
    pub middleware_names: Vec<String>,
    /// Hooks inspected for auth middleware, in priority order.
    pub hook_points: Vec<String>,
}

impl Default for FastifyAuthConfig {
    fn default() -> Self {
        Self {
            middleware_names: strings(&[
                "tokenVerification",
                "authGuard",
                "authenticate",
                "requireAuth",
                "verifyToken",
                "isAuthenticated",
                "authMiddleware",
                "jwtVerify",
                "verifyJWT",
            ]),
            hook_points: strings(&["preHandler", "onRequest"]),
        }
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

/// Validate a merged configuration.
pub fn validate(config: &ExtractorConfig) -> Result<(), ConfigError> {
    for pattern in &config.nestjs.auth.guard_patterns {
        regex::Regex::new(pattern).map_err(|e| {
            ConfigError::Invalid(format!("invalid guard pattern {:?}: {}", pattern, e))
        })?;
    }

    for hook in &config.fastify.auth.hook_points {
        if !FASTIFY_AUTH_HOOKS.contains(&hook.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "unknown hook point {:?}, must be one of {}",
                hook,
                FASTIFY_AUTH_HOOKS.join(", ")
            )));
        }
    }

    if config
        .fastify
        .auth
        .middleware_names
        .iter()
        .any(|name| name.trim().is_empty())
    {
        return Err(ConfigError::Invalid(
            "blank entry in fastify.auth.middlewareNames".to_string(),
        ));
    }

    for pattern in &config.common.exclude_paths {
        globset::Glob::new(pattern).map_err(|e| {
            ConfigError::Invalid(format!("invalid excludePaths pattern {:?}: {}", pattern, e))
        })?;
    }

    for decorator in &config.nestjs.params.custom_decorators {
        if decorator.name.is_empty() {
            return Err(ConfigError::Invalid(
                "custom decorator with empty name".to_string(),
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = ExtractorConfig::default();
        assert_eq!(config.common.output_format, OutputFormat::Yaml);
        assert!(!config.common.extract_responses);
        assert_eq!(config.common.response_depth, 2);
        assert_eq!(config.nestjs.entry, "src/app.module.ts");
        assert_eq!(config.fastify.entry, "src/build.ts");
        assert_eq!(
            config.nestjs.auth.exclude_guards,
            vec!["ThrottlerGuard", "RateLimitGuard"]
        );
        assert_eq!(config.fastify.auth.hook_points, vec!["preHandler", "onRequest"]);
    }

    #[test]
    fn test_partial_yaml_keeps_sibling_defaults() {
        let yaml = r#"
nestjs:
  auth:
    authGuards: [CustomGuard]
"#;
        let config: ExtractorConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.nestjs.auth.auth_guards, vec!["CustomGuard"]);
        assert_eq!(
            config.nestjs.auth.public_decorators,
            vec!["Public", "SkipAuth", "AllowAnonymous"]
        );
    }

    #[test]
    fn test_custom_decorator_defaults_type() {
        let yaml = r#"
nestjs:
  params:
    customDecorators:
      - name: CurrentUser
        description: Authenticated user
"#;
        let config: ExtractorConfig = serde_yaml::from_str(yaml).unwrap();
        let decorator = &config.nestjs.params.custom_decorators[0];
        assert_eq!(decorator.name, "CurrentUser");
        assert_eq!(decorator.kind, "custom");
    }

    #[test]
    fn test_validate_rejects_bad_pattern() {
        let mut config = ExtractorConfig::default();
        config.nestjs.auth.guard_patterns = vec!["(unclosed".to_string()];
        assert!(matches!(validate(&config), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_rejects_unknown_hook() {
        let mut config = ExtractorConfig::default();
        config.fastify.auth.hook_points = vec!["onSend".to_string()];
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("onSend"));
    }

    #[test]
    fn test_validate_rejects_blank_middleware_name() {
        let mut config = ExtractorConfig::default();
        config.fastify.auth.middleware_names = vec!["authenticate".to_string(), " ".to_string()];
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("middlewareNames"));

        config.fastify.auth.middleware_names.clear();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_validate_accepts_defaults() {
        assert!(validate(&ExtractorConfig::default()).is_ok());
    }
}
