//! Guard classification.
//!
//! A guard name is checked against, in order: the exclude list, the
//! configured auth guards, its inheritance chain and the name patterns.
//! The first rule that applies decides.

use std::collections::{HashMap, HashSet};

use regex::Regex;
use tracing::{debug, warn};

use crate::analysis::{AnalysisContext, BaseClause, ClassDecl};
use crate::config::NestAuthConfig;
use crate::error::ConfigError;
use crate::model::{AuthGuardResult, Confidence, Diagnostic, DiagnosticKind, GuardReason};

/// Classifies guard class names, memoizing inheritance lookups.
///
/// One analyzer is created per extraction run.
pub struct GuardAnalyzer<'a> {
    context: &'a AnalysisContext,
    auth_guards: HashSet<String>,
    exclude_guards: HashSet<String>,
    auth_base_classes: HashSet<String>,
    patterns: Vec<Regex>,
    /// Class name -> whether it inherits from an auth base.
    cache: HashMap<String, bool>,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> GuardAnalyzer<'a> {
    pub fn new(context: &'a AnalysisContext, config: &NestAuthConfig) -> Result<Self, ConfigError> {
        let patterns = config
            .guard_patterns
            .iter()
            .map(|p| {
                Regex::new(p).map_err(|e| {
                    ConfigError::Invalid(format!("invalid guard pattern '{}': {}", p, e))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            context,
            auth_guards: config.auth_guards.iter().cloned().collect(),
            exclude_guards: config.exclude_guards.iter().cloned().collect(),
            auth_base_classes: config.auth_base_classes.iter().cloned().collect(),
            patterns,
            cache: HashMap::new(),
            diagnostics: Vec::new(),
        })
    }

    pub fn is_auth_guard(&mut self, name: &str) -> AuthGuardResult {
        let result = if self.exclude_guards.contains(name) {
            verdict(false, Confidence::High, GuardReason::Excluded)
        } else if self.auth_guards.contains(name) {
            verdict(true, Confidence::High, GuardReason::Config)
        } else if self.inherits_auth(name) {
            verdict(true, Confidence::High, GuardReason::Inheritance)
        } else if self.patterns.iter().any(|p| p.is_match(name)) {
            verdict(true, Confidence::Medium, GuardReason::Pattern)
        } else {
            verdict(false, Confidence::Low, GuardReason::Unknown)
        };
        debug!(guard = name, reason = ?result.reason, is_auth = result.is_auth, "classified guard");
        result
    }

    /// Whether the class `name` extends an auth base, directly or through
    /// other project classes.
    ///
    /// When several classes share the name, all of them must agree.
    pub fn inherits_auth(&mut self, name: &str) -> bool {
        if let Some(&cached) = self.cache.get(name) {
            return cached;
        }
        // Seeded before recursing so a cycle reads `false` and stops.
        self.cache.insert(name.to_string(), false);

        let context = self.context;
        let candidates = context.find_classes(name);
        if candidates.len() > 1 {
            self.report_ambiguity(name, &candidates);
        }

        let result = !candidates.is_empty()
            && candidates
                .iter()
                .map(|class| self.class_extends_auth(class))
                .collect::<Vec<_>>()
                .into_iter()
                .all(|r| r);

        self.cache.insert(name.to_string(), result);
        result
    }

    fn class_extends_auth(&mut self, class: &ClassDecl) -> bool {
        match &class.extends {
            Some(BaseClause::Call { callee }) => self.auth_base_classes.contains(callee),
            Some(BaseClause::Name(base)) => {
                self.auth_base_classes.contains(base) || self.inherits_auth(base)
            }
            Some(BaseClause::Other(_)) | None => false,
        }
    }

    fn report_ambiguity(&mut self, name: &str, candidates: &[&ClassDecl]) {
        let files: Vec<String> = candidates
            .iter()
            .map(|c| self.context.relative_path(&c.file))
            .collect();
        warn!(class = name, files = ?files, "guard class declared in several files");
        self.diagnostics.push(Diagnostic::new(
            DiagnosticKind::AmbiguousDeclaration,
            files.join(", "),
            format!("class '{}' is declared {} times", name, candidates.len()),
        ));
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }
}

fn verdict(is_auth: bool, confidence: Confidence, reason: GuardReason) -> AuthGuardResult {
    AuthGuardResult {
        is_auth,
        confidence,
        reason,
    }
}
