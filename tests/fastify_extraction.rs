//! End-to-end extraction against the Fastify fixture project.

use std::path::PathBuf;

use endpoint_extractor::model::{AuthRequirement, HttpMethod, ParamInfo};
use endpoint_extractor::report;
use endpoint_extractor::{
    detect_framework, run, ExtractOptions, ExtractedEndpoints, ExtractorConfig, Framework,
    OutputFormat,
};

fn fixture_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("testdata")
        .join("fastify-app")
}

fn extract() -> ExtractedEndpoints {
    let options = ExtractOptions::new(fixture_root(), ExtractorConfig::default());
    run(&options, None).expect("extraction should succeed")
}

#[test]
fn test_detects_fastify() {
    let detection = detect_framework(&fixture_root()).expect("should read package.json");
    assert_eq!(detection.framework, Some(Framework::Fastify));
    assert_eq!(detection.matched, vec!["fastify".to_string()]);
}

#[test]
fn test_groups_follow_registration_order() {
    let result = extract();

    assert_eq!(result.framework, Framework::Fastify);
    let prefixes: Vec<_> = result.routes.iter().map(|g| g.prefix.as_str()).collect();
    assert_eq!(prefixes, vec!["/", "/users", "/admin"]);
    assert_eq!(result.total_endpoints(), 5);
    assert!(
        !result.is_partial(),
        "fixture should resolve cleanly: {:?}",
        result.diagnostics
    );
}

#[test]
fn test_user_routes() {
    let result = extract();
    let users = &result.routes[1];

    let get = &users.endpoints[0];
    assert_eq!((get.method, get.path.as_str()), (HttpMethod::Get, "/:id"));
    assert_eq!(get.path_params, vec![ParamInfo::new("id", "string", true)]);
    assert_eq!(get.auth.requirement(), AuthRequirement::Required);
    assert_eq!(get.auth.signals(), vec!["tokenVerification".to_string()]);
    assert_eq!(get.auth.hook_point(), Some("preHandler"));
    assert_eq!(get.source_file, "src/routes/users.ts");
    assert_eq!(get.line_number, 6);

    // An empty preHandler array is explicitly public.
    let list = &users.endpoints[1];
    assert_eq!(list.auth.requirement(), AuthRequirement::Public);
    assert_eq!(
        list.query_params,
        vec![
            ParamInfo::new("page", "number", false),
            ParamInfo::new("search", "string", false),
        ]
    );

    let create = &users.endpoints[2];
    assert_eq!(create.method, HttpMethod::Post);
    assert_eq!(
        create.body_params,
        vec![
            ParamInfo::new("name", "string", true),
            ParamInfo::new("email", "string", true),
            ParamInfo::new("age", "number", false),
        ]
    );
    assert_eq!(create.auth.requirement(), AuthRequirement::Required);
}

#[test]
fn test_entry_and_admin_routes() {
    let result = extract();

    let health = &result.routes[0].endpoints[0];
    assert_eq!(health.path, "/health");
    assert_eq!(health.source_file, "src/build.ts");
    assert_eq!(health.line_number, 13);
    assert_eq!(health.auth.requirement(), AuthRequirement::Public);

    let delete = &result.routes[2].endpoints[0];
    assert_eq!(delete.method, HttpMethod::Delete);
    assert_eq!(delete.path, "/users/:userId");
    assert_eq!(delete.path_params, vec![ParamInfo::new("userId", "number", true)]);
    assert_eq!(delete.auth.hook_point(), Some("onRequest"));
    assert_eq!(delete.auth.signals(), vec!["authenticate".to_string()]);
}

#[test]
fn test_yaml_report_layout() {
    let result = extract();
    let yaml = report::render(&result, OutputFormat::Yaml).unwrap();
    let doc: serde_yaml::Value = serde_yaml::from_str(&yaml).unwrap();

    let meta = &doc["_meta"];
    assert_eq!(meta["framework"].as_str(), Some("fastify"));
    assert_eq!(meta["totalEndpoints"].as_u64(), Some(5));
    assert_eq!(meta["authRequiredCount"].as_u64(), Some(3));
    assert_eq!(meta["publicCount"].as_u64(), Some(2));
    assert_eq!(meta["partial"].as_bool(), Some(false));

    let get = &doc["/users"]["endpoints"]["/:id"][0];
    assert_eq!(get["METHOD"].as_str(), Some("GET"));
    assert_eq!(get["requiresAuth"].as_bool(), Some(true));
    assert_eq!(get["pathParams"]["id"].as_str(), Some("string"));
    assert_eq!(get["authHookPoint"].as_str(), Some("preHandler"));

    // GET and POST share the "/" key within the group.
    let root_routes = doc["/users"]["endpoints"]["/"].as_sequence().unwrap();
    assert_eq!(root_routes.len(), 2);
    assert_eq!(
        root_routes[0]["queryParams"]["page"].as_str(),
        Some("number | undefined")
    );
    assert_eq!(root_routes[1]["METHOD"].as_str(), Some("POST"));
}

#[test]
fn test_runs_are_identical_except_timestamp() {
    let strip = |result: &ExtractedEndpoints| {
        let json = report::render(result, OutputFormat::Json).unwrap();
        let mut value: serde_json::Value = serde_json::from_str(&json).unwrap();
        value["_meta"]
            .as_object_mut()
            .expect("_meta should be an object")
            .remove("extractedAt");
        value
    };

    assert_eq!(strip(&extract()), strip(&extract()));
}

#[test]
fn test_responses_are_opt_in() {
    assert!(extract().endpoints().all(|e| e.responses.is_none()));

    let mut config = ExtractorConfig::default();
    config.common.extract_responses = true;
    let options = ExtractOptions::new(fixture_root(), config);
    let result = run(&options, Some(Framework::Fastify)).unwrap();

    let create = &result.routes[1].endpoints[2];
    let responses = create.responses.as_ref().expect("responses should be extracted");
    assert_eq!(responses.success[0].code, 201);
}
