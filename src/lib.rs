//! endpoint-extractor - static HTTP endpoint and auth inventory.
//!
//! Reads a TypeScript web service without running it and lists every HTTP
//! endpoint it exposes: method, full path, path/query/body parameters,
//! whether the endpoint requires authentication, and where it is declared.
//! Two conventions are understood: Fastify hook-style routing and NestJS
//! decorator-style controllers.
//!
//! # Architecture
//!
//! - `analysis`: tree-sitter front end producing per-file facts and a
//!   project-wide name index
//! - `shape`: type resolution and rendering of parameter and response shapes
//! - `extract`: framework detection and the Fastify / NestJS extractors
//! - `config`: layered configuration (file, package.json, defaults)
//! - `report`: YAML/JSON report and terminal summary
//! - `model`: endpoint, auth and diagnostic types shared by all of the above
//!
//! # Adding a Framework
//!
//! Implement [`EndpointExtractor`] and register it in
//! `extract::extractor_for`.

pub mod analysis;
pub mod cli;
pub mod config;
pub mod error;
pub mod extract;
pub mod model;
pub mod report;
pub mod shape;

pub use analysis::{AnalysisContext, FileFacts, LanguageAnalyzer, TypeScriptAnalyzer};
pub use config::{ExtractorConfig, OutputFormat};
pub use error::{ConfigError, ExtractError, Result};
pub use extract::{
    detect_framework, run, Detection, EndpointExtractor, ExtractOptions, FastifyExtractor,
    NestJsExtractor,
};
pub use model::{
    AuthRequirement, Confidence, Diagnostic, DiagnosticKind, Endpoint, EndpointAuth,
    ExtractedEndpoints, Framework, HttpMethod, ParamInfo, RouteGroup,
};
