//! Core types for extracted endpoints.

use serde::{Deserialize, Serialize};

/// Web frameworks the extractor knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Framework {
    Fastify,
    #[serde(rename = "nestjs")]
    NestJs,
    Express,
}

impl Framework {
    pub fn as_str(&self) -> &'static str {
        match self {
            Framework::Fastify => "fastify",
            Framework::NestJs => "nestjs",
            Framework::Express => "express",
        }
    }
}

impl std::fmt::Display for Framework {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Framework {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fastify" => Ok(Framework::Fastify),
            "nestjs" | "nest" => Ok(Framework::NestJs),
            "express" => Ok(Framework::Express),
            _ => Err(format!("unknown framework: {}", s)),
        }
    }
}

/// HTTP methods a route can be bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Options,
    Head,
    All,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Options => "OPTIONS",
            HttpMethod::Head => "HEAD",
            HttpMethod::All => "ALL",
        }
    }

    /// Map a call-site member name (`get`, `post`, ...) to a method.
    ///
    /// `all` is deliberately absent: it is only meaningful as a decorator.
    pub fn from_call_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "get" => Some(HttpMethod::Get),
            "post" => Some(HttpMethod::Post),
            "put" => Some(HttpMethod::Put),
            "delete" => Some(HttpMethod::Delete),
            "patch" => Some(HttpMethod::Patch),
            "options" => Some(HttpMethod::Options),
            "head" => Some(HttpMethod::Head),
            _ => None,
        }
    }

    /// Map a route decorator name (`Get`, `Post`, ...) to a method.
    pub fn from_decorator(name: &str) -> Option<Self> {
        match name {
            "Get" => Some(HttpMethod::Get),
            "Post" => Some(HttpMethod::Post),
            "Put" => Some(HttpMethod::Put),
            "Delete" => Some(HttpMethod::Delete),
            "Patch" => Some(HttpMethod::Patch),
            "Options" => Some(HttpMethod::Options),
            "Head" => Some(HttpMethod::Head),
            "All" => Some(HttpMethod::All),
            _ => None,
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One named, typed field of a parameter group or response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamInfo {
    pub name: String,
    /// Rendered structural type, e.g. `string`, `'admin' | 'user'`, `{ id: number; }`.
    #[serde(rename = "type")]
    pub type_text: String,
    pub required: bool,
}

impl ParamInfo {
    pub fn new(name: impl Into<String>, type_text: impl Into<String>, required: bool) -> Self {
        Self {
            name: name.into(),
            type_text: type_text.into(),
            required,
        }
    }
}

// =============================================================================
// Authentication
// =============================================================================

/// Tri-state authentication requirement.
///
/// `Unknown` is kept distinct from `Public` all the way to the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthRequirement {
    Required,
    Public,
    Unknown,
}

impl AuthRequirement {
    pub fn from_bool(required: bool) -> Self {
        if required {
            AuthRequirement::Required
        } else {
            AuthRequirement::Public
        }
    }
}

impl Serialize for AuthRequirement {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            AuthRequirement::Required => serializer.serialize_bool(true),
            AuthRequirement::Public => serializer.serialize_bool(false),
            AuthRequirement::Unknown => serializer.serialize_str("unknown"),
        }
    }
}

impl std::fmt::Display for AuthRequirement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthRequirement::Required => write!(f, "true"),
            AuthRequirement::Public => write!(f, "false"),
            AuthRequirement::Unknown => write!(f, "unknown"),
        }
    }
}

/// How directly the evidence supports a classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::High => "high",
            Confidence::Medium => "medium",
            Confidence::Low => "low",
        }
    }
}

/// Where a guard was attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GuardLevel {
    Global,
    Class,
    Method,
}

/// Why a guard was (or was not) classified as an auth guard.
///
/// Variants are listed in evaluation precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GuardReason {
    Excluded,
    Config,
    Inheritance,
    Pattern,
    Unknown,
}

/// Classification of a single guard name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AuthGuardResult {
    pub is_auth: bool,
    pub confidence: Confidence,
    pub reason: GuardReason,
}

/// A guard referenced by an endpoint, with its classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectedGuard {
    pub name: String,
    pub level: GuardLevel,
    pub is_auth_guard: bool,
    pub reason: GuardReason,
}

/// Auth result from the hook-array convention.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HookAuth {
    pub required: bool,
    pub middlewares: Vec<String>,
    pub hook_point: Option<String>,
}

impl HookAuth {
    pub fn public() -> Self {
        Self {
            required: false,
            middlewares: Vec::new(),
            hook_point: None,
        }
    }
}

/// Auth result from the guard/decorator convention.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GuardAuth {
    pub required: AuthRequirement,
    pub confidence: Confidence,
    pub guards: Vec<DetectedGuard>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum EndpointAuth {
    Hook(HookAuth),
    Guard(GuardAuth),
}

impl EndpointAuth {
    pub fn requirement(&self) -> AuthRequirement {
        match self {
            EndpointAuth::Hook(h) => AuthRequirement::from_bool(h.required),
            EndpointAuth::Guard(g) => g.required,
        }
    }

    /// Names of the middlewares or auth guards that support the classification.
    pub fn signals(&self) -> Vec<String> {
        match self {
            EndpointAuth::Hook(h) => h.middlewares.clone(),
            EndpointAuth::Guard(g) => g
                .guards
                .iter()
                .filter(|guard| guard.is_auth_guard)
                .map(|guard| guard.name.clone())
                .collect(),
        }
    }

    pub fn confidence(&self) -> Option<Confidence> {
        match self {
            EndpointAuth::Hook(_) => None,
            EndpointAuth::Guard(g) => Some(g.confidence),
        }
    }

    pub fn hook_point(&self) -> Option<&str> {
        match self {
            EndpointAuth::Hook(h) => h.hook_point.as_deref(),
            EndpointAuth::Guard(_) => None,
        }
    }
}

// =============================================================================
// Responses
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseSource {
    #[serde(rename = "return")]
    Return,
    #[serde(rename = "reply.send")]
    ReplySend,
    #[serde(rename = "reply.code")]
    ReplyCode,
    #[serde(rename = "declared")]
    Declared,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseInfo {
    pub code: u16,
    pub data_type: Vec<ParamInfo>,
    pub type_name: Option<String>,
    pub source: ResponseSource,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponseInfo {
    pub code: u16,
    pub message: String,
    pub data_type: Vec<ParamInfo>,
    pub line: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EndpointResponses {
    pub success: Vec<ResponseInfo>,
    pub errors: Vec<ErrorResponseInfo>,
}

impl EndpointResponses {
    pub fn is_empty(&self) -> bool {
        self.success.is_empty() && self.errors.is_empty()
    }
}

// =============================================================================
// Endpoints
// =============================================================================

/// One HTTP method + path combination.
///
/// Identity is `(source_file, line_number)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    pub path: String,
    pub method: HttpMethod,
    pub path_params: Vec<ParamInfo>,
    pub query_params: Vec<ParamInfo>,
    pub body_params: Vec<ParamInfo>,
    pub auth: EndpointAuth,
    /// Path relative to the project root, `/`-separated.
    pub source_file: String,
    /// 1-based line of the route declaration.
    pub line_number: usize,
    pub responses: Option<EndpointResponses>,
}

/// Endpoints registered under one prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteGroup {
    pub prefix: String,
    pub endpoints: Vec<Endpoint>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    MissingFile,
    ParseFailure,
    AmbiguousDeclaration,
    SkippedRoute,
}

impl DiagnosticKind {
    /// Whether this kind means part of the project was not analyzed.
    pub fn makes_partial(&self) -> bool {
        matches!(self, DiagnosticKind::MissingFile | DiagnosticKind::ParseFailure)
    }
}

/// A non-fatal problem encountered during extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub path: String,
    pub message: String,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Complete result of one extraction run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedEndpoints {
    pub framework: Framework,
    pub project_root: String,
    pub extracted_at: String,
    pub routes: Vec<RouteGroup>,
    pub diagnostics: Vec<Diagnostic>,
}

impl ExtractedEndpoints {
    pub fn endpoints(&self) -> impl Iterator<Item = &Endpoint> {
        self.routes.iter().flat_map(|r| r.endpoints.iter())
    }

    pub fn total_endpoints(&self) -> usize {
        self.routes.iter().map(|r| r.endpoints.len()).sum()
    }

    pub fn count_by(&self, requirement: AuthRequirement) -> usize {
        self.endpoints()
            .filter(|e| e.auth.requirement() == requirement)
            .count()
    }

    pub fn auth_required_count(&self) -> usize {
        self.count_by(AuthRequirement::Required)
    }

    pub fn public_count(&self) -> usize {
        self.count_by(AuthRequirement::Public)
    }

    pub fn unknown_count(&self) -> usize {
        self.count_by(AuthRequirement::Unknown)
    }

    pub fn is_partial(&self) -> bool {
        self.diagnostics.iter().any(|d| d.kind.makes_partial())
    }
}
