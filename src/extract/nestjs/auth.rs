//! Decorator-convention auth detection.
//!
//! A public marker on the method or controller wins outright. Otherwise the
//! endpoint's guards (global, class and method) are classified and the
//! endpoint requires auth when any of them is an auth guard.

use std::collections::HashSet;

use super::guards::GuardAnalyzer;
use crate::analysis::{AnalysisContext, Decorator};
use crate::config::NestAuthConfig;
use crate::error::ConfigError;
use crate::model::{AuthRequirement, Confidence, DetectedGuard, Diagnostic, GuardAuth, GuardLevel, GuardReason};

const USE_GUARDS: &str = "UseGuards";
const SET_METADATA: &str = "SetMetadata";

/// Metadata key a decorator stores under.
///
/// `@SetMetadata('key', v)` names it directly; the well-known helpers map to
/// their conventional keys and anything else uses its lowercased name.
pub fn metadata_key(decorator: &Decorator) -> String {
    if decorator.name == SET_METADATA {
        if let Some(key) = decorator.first_string() {
            return key.to_string();
        }
    }
    match decorator.name.as_str() {
        "Public" => "isPublic".to_string(),
        "SkipAuth" => "skipAuth".to_string(),
        "Roles" => "roles".to_string(),
        "Permissions" => "permissions".to_string(),
        other => other.to_lowercase(),
    }
}

/// Guard names listed by `@UseGuards(...)` decorators, in order.
///
/// Both `UseGuards(JwtGuard)` and `UseGuards(AuthGuard('jwt'))` yield a
/// name; the latter yields the factory.
pub fn guard_names(decorators: &[Decorator]) -> Vec<String> {
    decorators
        .iter()
        .filter(|d| d.name == USE_GUARDS)
        .flat_map(|d| d.arguments.iter())
        .filter_map(|arg| arg.referenced_name())
        .map(String::from)
        .collect()
}

pub struct GuardAuthDetector<'a> {
    analyzer: GuardAnalyzer<'a>,
    public_decorators: HashSet<String>,
    public_metadata_keys: HashSet<String>,
}

impl<'a> GuardAuthDetector<'a> {
    pub fn new(context: &'a AnalysisContext, config: &NestAuthConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            analyzer: GuardAnalyzer::new(context, config)?,
            public_decorators: config.public_decorators.iter().cloned().collect(),
            public_metadata_keys: config.public_metadata_keys.iter().cloned().collect(),
        })
    }

    /// Classify one endpoint from its controller and method decorators.
    pub fn detect(
        &mut self,
        global_guards: &[String],
        class_decorators: &[Decorator],
        method_decorators: &[Decorator],
    ) -> GuardAuth {
        if self.is_public(method_decorators) || self.is_public(class_decorators) {
            return GuardAuth {
                required: AuthRequirement::Public,
                confidence: Confidence::High,
                guards: Vec::new(),
            };
        }

        let mut guards = Vec::new();
        let levels = [
            (GuardLevel::Global, global_guards.to_vec()),
            (GuardLevel::Class, guard_names(class_decorators)),
            (GuardLevel::Method, guard_names(method_decorators)),
        ];
        for (level, names) in levels {
            for name in names {
                let result = self.analyzer.is_auth_guard(&name);
                guards.push(DetectedGuard {
                    name,
                    level,
                    is_auth_guard: result.is_auth,
                    reason: result.reason,
                });
            }
        }

        let required = if guards.iter().any(|g| g.is_auth_guard) {
            AuthRequirement::Required
        } else if guards.is_empty() {
            AuthRequirement::Unknown
        } else {
            AuthRequirement::Public
        };

        GuardAuth {
            required,
            confidence: confidence(&guards),
            guards,
        }
    }

    pub fn is_public(&self, decorators: &[Decorator]) -> bool {
        decorators.iter().any(|d| {
            self.public_decorators.contains(&d.name)
                || self.public_metadata_keys.contains(&metadata_key(d))
        })
    }

    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        self.analyzer.take_diagnostics()
    }
}

fn confidence(guards: &[DetectedGuard]) -> Confidence {
    if guards.is_empty() {
        return Confidence::Low;
    }
    let all_high = guards.iter().all(|g| {
        matches!(
            g.reason,
            GuardReason::Config | GuardReason::Inheritance | GuardReason::Excluded
        )
    });
    if all_high {
        Confidence::High
    } else if guards.iter().any(|g| g.reason == GuardReason::Unknown) {
        Confidence::Low
    } else {
        Confidence::Medium
    }
}
