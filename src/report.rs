//! Output formatting for extraction results.
//!
//! Supports two document formats plus a terminal summary:
//! - YAML: the default inventory document
//! - JSON: the same document for programmatic consumption
//! - Summary: colored counts and the list of endpoints without auth
//!
//! Group keys and path keys are sorted. Endpoints sharing a path keep source
//! order, and parameters keep declaration order.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use colored::*;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

use crate::config::OutputFormat;
use crate::model::{
    AuthRequirement, Confidence, Diagnostic, Endpoint, EndpointResponses, ExtractedEndpoints,
    Framework, HttpMethod, ParamInfo,
};

// =============================================================================
// Document structure
// =============================================================================

/// The full inventory document: `_meta` followed by one entry per prefix.
pub struct Report {
    pub meta: ReportMeta,
    pub groups: BTreeMap<String, ReportGroup>,
}

impl Serialize for Report {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.groups.len() + 1))?;
        map.serialize_entry("_meta", &self.meta)?;
        for (prefix, group) in &self.groups {
            map.serialize_entry(prefix, group)?;
        }
        map.end()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportMeta {
    pub framework: Framework,
    pub project_root: String,
    pub extracted_at: String,
    pub total_endpoints: usize,
    pub auth_required_count: usize,
    pub public_count: usize,
    pub unknown_count: usize,
    pub partial: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Default, Serialize)]
pub struct ReportGroup {
    pub endpoints: BTreeMap<String, Vec<ReportEndpoint>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportEndpoint {
    #[serde(rename = "METHOD")]
    pub method: HttpMethod,
    #[serde(skip_serializing_if = "ParamMap::is_empty")]
    pub path_params: ParamMap,
    #[serde(skip_serializing_if = "ParamMap::is_empty")]
    pub query_params: ParamMap,
    #[serde(skip_serializing_if = "ParamMap::is_empty")]
    pub body_params: ParamMap,
    pub requires_auth: AuthRequirement,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_confidence: Option<Confidence>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub auth_signals: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_hook_point: Option<String>,
    pub source_file: String,
    pub line: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub responses: Option<ReportResponses>,
}

#[derive(Debug, Serialize)]
pub struct ReportResponses {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success: Option<ReportSuccess>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ReportError>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSuccess {
    pub code: u16,
    pub data_type: ParamMap,
}

#[derive(Debug, Serialize)]
pub struct ReportError {
    pub code: u16,
    pub message: String,
}

/// `{name: type}` in declaration order. Optional params render as
/// `type | undefined`.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ParamMap(Vec<(String, String)>);

impl ParamMap {
    pub fn from_params(params: &[ParamInfo]) -> Self {
        ParamMap(
            params
                .iter()
                .map(|p| {
                    let type_text = if p.required {
                        p.type_text.clone()
                    } else {
                        format!("{} | undefined", p.type_text)
                    };
                    (p.name.clone(), type_text)
                })
                .collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, t)| t.as_str())
    }
}

impl Serialize for ParamMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, type_text) in &self.0 {
            map.serialize_entry(name, type_text)?;
        }
        map.end()
    }
}

// =============================================================================
// Building
// =============================================================================

/// Build the report document for an extraction result.
pub fn build_report(result: &ExtractedEndpoints) -> Report {
    let meta = ReportMeta {
        framework: result.framework,
        project_root: result.project_root.clone(),
        extracted_at: result.extracted_at.clone(),
        total_endpoints: result.total_endpoints(),
        auth_required_count: result.auth_required_count(),
        public_count: result.public_count(),
        unknown_count: result.unknown_count(),
        partial: result.is_partial(),
        diagnostics: result.diagnostics.clone(),
    };

    let mut groups: BTreeMap<String, ReportGroup> = BTreeMap::new();
    for route in &result.routes {
        let group = groups.entry(route.prefix.clone()).or_default();
        for endpoint in &route.endpoints {
            group
                .endpoints
                .entry(endpoint.path.clone())
                .or_default()
                .push(report_endpoint(endpoint));
        }
    }

    Report { meta, groups }
}

fn report_endpoint(endpoint: &Endpoint) -> ReportEndpoint {
    ReportEndpoint {
        method: endpoint.method,
        path_params: ParamMap::from_params(&endpoint.path_params),
        query_params: ParamMap::from_params(&endpoint.query_params),
        body_params: ParamMap::from_params(&endpoint.body_params),
        requires_auth: endpoint.auth.requirement(),
        auth_confidence: endpoint.auth.confidence(),
        auth_signals: endpoint.auth.signals(),
        auth_hook_point: endpoint.auth.hook_point().map(String::from),
        source_file: endpoint.source_file.clone(),
        line: endpoint.line_number,
        responses: endpoint.responses.as_ref().and_then(report_responses),
    }
}

/// First success entry and every error, or nothing when both are empty.
fn report_responses(responses: &EndpointResponses) -> Option<ReportResponses> {
    if responses.is_empty() {
        return None;
    }
    Some(ReportResponses {
        success: responses.success.first().map(|s| ReportSuccess {
            code: s.code,
            data_type: ParamMap::from_params(&s.data_type),
        }),
        errors: responses
            .errors
            .iter()
            .map(|e| ReportError {
                code: e.code,
                message: e.message.clone(),
            })
            .collect(),
    })
}

// =============================================================================
// Serialization
// =============================================================================

pub fn to_yaml_string(result: &ExtractedEndpoints) -> anyhow::Result<String> {
    Ok(serde_yaml::to_string(&build_report(result))?)
}

pub fn to_json_string(result: &ExtractedEndpoints) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(&build_report(result))?)
}

pub fn render(result: &ExtractedEndpoints, format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Yaml => to_yaml_string(result),
        OutputFormat::Json => to_json_string(result),
    }
}

/// Render `result` and write it to `path`, creating parent directories.
pub fn write_report(
    result: &ExtractedEndpoints,
    format: OutputFormat,
    path: &Path,
) -> anyhow::Result<()> {
    let rendered = render(result, format)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, rendered)?;
    Ok(())
}

// =============================================================================
// Terminal summary
// =============================================================================

/// Colored multi-line summary of a run.
pub fn summary(result: &ExtractedEndpoints) -> String {
    let mut out = String::new();
    out.push('\n');
    out.push_str(&format!(
        "  {} {}\n\n",
        "endpoint-extractor".cyan().bold(),
        format!("({})", result.framework).dimmed()
    ));

    out.push_str(&format!(
        "  Endpoints: {}  Auth: {}  Public: {}  Unknown: {}\n",
        result.total_endpoints().to_string().bold(),
        result.auth_required_count().to_string().green(),
        result.public_count().to_string().yellow(),
        result.unknown_count().to_string().red(),
    ));

    if result.is_partial() {
        out.push_str(&format!(
            "  {}\n",
            "Partial result: some files could not be analyzed".yellow()
        ));
    }

    let unauthenticated: Vec<&Endpoint> = result
        .endpoints()
        .filter(|e| e.auth.requirement() != AuthRequirement::Required)
        .collect();
    if !unauthenticated.is_empty() {
        out.push('\n');
        out.push_str(&format!(
            "  {} ({}):\n",
            "Endpoints without auth".bold(),
            unauthenticated.len()
        ));
        for endpoint in unauthenticated {
            let tag = match endpoint.auth.requirement() {
                AuthRequirement::Unknown => "UNKNOWN".red(),
                _ => "PUBLIC ".yellow(),
            };
            out.push_str(&format!(
                "    {} {:<7} {:<40} {}\n",
                tag,
                endpoint.method.as_str(),
                endpoint.path,
                format!("{}:{}", endpoint.source_file, endpoint.line_number).dimmed()
            ));
        }
    }

    if !result.diagnostics.is_empty() {
        out.push('\n');
        out.push_str(&format!("  {} ({}):\n", "Diagnostics".bold(), result.diagnostics.len()));
        for diagnostic in &result.diagnostics {
            out.push_str(&format!(
                "    {} {}\n",
                diagnostic.path.blue(),
                diagnostic.message.dimmed()
            ));
        }
    }

    out
}
