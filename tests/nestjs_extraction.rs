//! End-to-end extraction against the NestJS fixture project.

use std::path::PathBuf;

use endpoint_extractor::model::{AuthRequirement, Confidence, HttpMethod, ParamInfo};
use endpoint_extractor::report;
use endpoint_extractor::{
    detect_framework, run, EndpointExtractor, ExtractOptions, ExtractedEndpoints,
    ExtractorConfig, Framework, NestJsExtractor, OutputFormat,
};

fn fixture_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("testdata")
        .join("nestjs-app")
}

fn extract() -> ExtractedEndpoints {
    let options = ExtractOptions::new(fixture_root(), ExtractorConfig::default());
    run(&options, None).expect("extraction should succeed")
}

#[test]
fn test_nestjs_detected_over_express() {
    let detection = detect_framework(&fixture_root()).unwrap();
    assert_eq!(detection.framework, Some(Framework::NestJs));
    assert_eq!(detection.confidence, 1.0);
    assert!(NestJsExtractor.can_handle(&fixture_root()));
}

#[test]
fn test_controllers_reached_through_modules() {
    let result = extract();

    assert_eq!(result.framework, Framework::NestJs);
    let prefixes: Vec<_> = result.routes.iter().map(|g| g.prefix.as_str()).collect();
    assert_eq!(prefixes, vec!["/", "/users", "/admin"]);

    let routes: Vec<_> = result
        .endpoints()
        .map(|e| (e.method, e.path.as_str()))
        .collect();
    assert_eq!(
        routes,
        vec![
            (HttpMethod::Get, "/health"),
            (HttpMethod::Get, "/users/:id"),
            (HttpMethod::Get, "/users"),
            (HttpMethod::Post, "/users"),
            (HttpMethod::Get, "/admin/reports"),
        ]
    );
    assert!(
        !result.is_partial(),
        "fixture should resolve cleanly: {:?}",
        result.diagnostics
    );
}

#[test]
fn test_guard_classification() {
    let result = extract();
    let endpoints: Vec<_> = result.endpoints().collect();

    // Only the excluded global ThrottlerGuard applies.
    let health = endpoints[0];
    assert_eq!(health.auth.requirement(), AuthRequirement::Public);
    assert_eq!(health.auth.confidence(), Some(Confidence::High));

    // JwtAuthGuard extends AuthGuard('jwt').
    let find_one = endpoints[1];
    assert_eq!(find_one.auth.requirement(), AuthRequirement::Required);
    assert_eq!(find_one.auth.confidence(), Some(Confidence::High));
    assert_eq!(find_one.auth.signals(), vec!["JwtAuthGuard".to_string()]);
    assert_eq!(find_one.line_number, 9);

    let find_all = endpoints[2];
    assert_eq!(find_all.auth.requirement(), AuthRequirement::Public);
    assert!(find_all.auth.signals().is_empty());
    assert_eq!(find_all.line_number, 14);

    assert_eq!(endpoints[3].auth.requirement(), AuthRequirement::Required);

    // AGuard and BGuard extend each other; neither is an auth guard.
    let reports = endpoints[4];
    assert_eq!(reports.auth.requirement(), AuthRequirement::Public);
    assert_eq!(reports.auth.confidence(), Some(Confidence::Low));
    assert_eq!(reports.source_file, "src/admin/admin.controller.ts");
}

#[test]
fn test_dto_params_are_expanded() {
    let result = extract();
    let endpoints: Vec<_> = result.endpoints().collect();

    assert_eq!(endpoints[1].path_params, vec![ParamInfo::new("id", "string", true)]);
    assert_eq!(
        endpoints[2].query_params,
        vec![
            ParamInfo::new("page", "number", false),
            ParamInfo::new("limit", "number", false),
        ]
    );
    assert_eq!(
        endpoints[3].body_params,
        vec![
            ParamInfo::new("name", "string", true),
            ParamInfo::new("email", "string", true),
            ParamInfo::new("nickname", "string", false),
        ]
    );
}

#[test]
fn test_json_report() {
    let result = extract();
    let json = report::render(&result, OutputFormat::Json).unwrap();
    let doc: serde_json::Value = serde_json::from_str(&json).unwrap();

    assert_eq!(doc["_meta"]["framework"], "nestjs");
    assert_eq!(doc["_meta"]["totalEndpoints"], 5);
    assert_eq!(doc["_meta"]["authRequiredCount"], 2);
    assert_eq!(doc["_meta"]["publicCount"], 3);
    assert_eq!(doc["_meta"]["unknownCount"], 0);

    let users = &doc["/users"]["endpoints"]["/users"];
    assert_eq!(users[0]["METHOD"], "GET");
    assert_eq!(users[0]["requiresAuth"], false);
    assert_eq!(users[1]["METHOD"], "POST");
    assert_eq!(users[1]["requiresAuth"], true);
    assert_eq!(users[1]["authConfidence"], "high");
    assert_eq!(users[1]["bodyParams"]["nickname"], "string | undefined");
}

#[test]
fn test_entry_override() {
    let options = ExtractOptions::new(fixture_root(), ExtractorConfig::default())
        .with_entry(Some(PathBuf::from("src/users/users.module.ts")));
    let result = run(&options, Some(Framework::NestJs)).unwrap();

    // Global guards come only from the entry module.
    assert_eq!(result.total_endpoints(), 3);
    assert_eq!(result.routes[0].prefix, "/users");
}
