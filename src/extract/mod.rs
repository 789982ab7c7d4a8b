//! Endpoint extraction pipeline.
//!
//! One [`EndpointExtractor`] per supported framework. Each run builds a
//! fresh [`AnalysisContext`] (every project file parsed once), walks the
//! framework's registration graph from its entry file and assembles an
//! [`ExtractedEndpoints`] report.
//!
//! ```text
//! config ──▶ detect ──▶ registration walk ──▶ route parsing ──▶ auth
//!                          (per framework)     (shape resolver)   detection
//! ```

pub mod detect;
pub mod fastify;
pub mod nestjs;

use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, info};

use crate::analysis::AnalysisContext;
use crate::config::ExtractorConfig;
use crate::error::{ExtractError, Result};
use crate::model::{Diagnostic, Endpoint, ExtractedEndpoints, Framework, ParamInfo, RouteGroup};

pub use detect::{detect_framework, Detection};
pub use fastify::FastifyExtractor;
pub use nestjs::NestJsExtractor;

lazy_static! {
    /// `:name` placeholders in a route path.
    static ref PATH_PARAM: Regex = Regex::new(r":(\w+)").unwrap();
}

/// Inputs for one extraction run.
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    pub project_root: PathBuf,
    /// Entry file override; relative paths are taken from the project root.
    pub entry: Option<PathBuf>,
    pub config: ExtractorConfig,
}

impl ExtractOptions {
    pub fn new<P: Into<PathBuf>>(project_root: P, config: ExtractorConfig) -> Self {
        Self {
            project_root: project_root.into(),
            entry: None,
            config,
        }
    }

    pub fn with_entry(mut self, entry: Option<PathBuf>) -> Self {
        self.entry = entry;
        self
    }

    /// The entry file to start from, falling back to `default`.
    pub fn entry_path(&self, default: &str) -> PathBuf {
        let entry = self
            .entry
            .clone()
            .unwrap_or_else(|| PathBuf::from(default));
        if entry.is_absolute() {
            entry
        } else {
            self.project_root.join(entry)
        }
    }
}

/// Framework-specific endpoint discovery.
pub trait EndpointExtractor {
    fn framework(&self) -> Framework;

    /// Whether the project at `root` declares this framework as a dependency.
    fn can_handle(&self, root: &Path) -> bool {
        matches!(
            detect_framework(root),
            Ok(Detection { framework: Some(f), .. }) if f == self.framework()
        )
    }

    fn extract(&self, options: &ExtractOptions) -> Result<ExtractedEndpoints>;
}

/// Extractor for `framework`. Express is recognized but not supported.
pub fn extractor_for(framework: Framework) -> Result<Box<dyn EndpointExtractor>> {
    match framework {
        Framework::Fastify => Ok(Box::new(FastifyExtractor)),
        Framework::NestJs => Ok(Box::new(NestJsExtractor)),
        Framework::Express => Err(ExtractError::UnsupportedFramework(
            framework.as_str().to_string(),
        )),
    }
}

/// Run extraction, detecting the framework from `package.json` when none is
/// given.
pub fn run(options: &ExtractOptions, framework: Option<Framework>) -> Result<ExtractedEndpoints> {
    let framework = match framework {
        Some(f) => f,
        None => {
            let detection = detect_framework(&options.project_root)?;
            match detection.framework {
                Some(f) => {
                    info!(
                        framework = f.as_str(),
                        confidence = detection.confidence,
                        "framework detected"
                    );
                    f
                }
                None => {
                    return Err(ExtractError::FrameworkNotDetected(
                        options.project_root.clone(),
                    ))
                }
            }
        }
    };

    extractor_for(framework)?.extract(options)
}

/// Index the project and make sure the entry file is part of the index.
pub(crate) fn build_context(options: &ExtractOptions, entry: &Path) -> Result<AnalysisContext> {
    if !entry.is_file() {
        return Err(ExtractError::EntryNotFound(entry.to_path_buf()));
    }

    let mut context =
        AnalysisContext::build(&options.project_root, &options.config.common.exclude_paths)?;
    if context.file(entry).is_none() {
        debug!(path = %entry.display(), "entry excluded from index, loading explicitly");
        context
            .load_file(entry)
            .map_err(|e| ExtractError::Parse {
                path: entry.to_path_buf(),
                message: e.to_string(),
            })?;
    }
    Ok(context)
}

/// Append endpoints to the group for `prefix`, creating it on first use.
pub(crate) fn push_group(groups: &mut Vec<RouteGroup>, prefix: &str, endpoints: Vec<Endpoint>) {
    if endpoints.is_empty() {
        return;
    }
    match groups.iter_mut().find(|g| g.prefix == prefix) {
        Some(group) => group.endpoints.extend(endpoints),
        None => groups.push(RouteGroup {
            prefix: prefix.to_string(),
            endpoints,
        }),
    }
}

/// Assemble the final report for a run.
pub(crate) fn assemble(
    framework: Framework,
    options: &ExtractOptions,
    routes: Vec<RouteGroup>,
    diagnostics: Vec<Diagnostic>,
) -> ExtractedEndpoints {
    let result = ExtractedEndpoints {
        framework,
        project_root: options.project_root.display().to_string(),
        extracted_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        routes,
        diagnostics,
    };
    info!(
        framework = framework.as_str(),
        endpoints = result.total_endpoints(),
        auth_required = result.auth_required_count(),
        public = result.public_count(),
        unknown = result.unknown_count(),
        "extraction finished"
    );
    result
}

/// Join URL segments, collapsing repeated separators. The result always
/// starts with `/` and never ends with one (except the root itself).
pub fn join_paths(parts: &[&str]) -> String {
    let segments: Vec<&str> = parts
        .iter()
        .flat_map(|p| p.split('/'))
        .filter(|s| !s.is_empty())
        .collect();
    format!("/{}", segments.join("/"))
}

/// Required `string` params for every `:name` placeholder in `path`.
pub fn path_params_from_path(path: &str) -> Vec<ParamInfo> {
    PATH_PARAM
        .captures_iter(path)
        .map(|c| ParamInfo::new(&c[1], "string", true))
        .collect()
}
