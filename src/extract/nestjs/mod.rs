//! NestJS (decorator-style) extraction.
//!
//! Controllers are reached only through the `@Module` graph rooted at the
//! entry module. Each route method is classified by [`GuardAuthDetector`]
//! using the entry module's `APP_GUARD` providers plus the controller's and
//! method's own decorators.

mod auth;
mod controller;
mod guards;
mod modules;

pub use auth::{guard_names, metadata_key, GuardAuthDetector};
pub use controller::{ControllerParser, ParsedController, RouteMethod};
pub use guards::GuardAnalyzer;
pub use modules::{walk_modules, ControllerRef, ModuleGraph};

use tracing::debug;

use super::{assemble, build_context, push_group, EndpointExtractor, ExtractOptions};
use crate::error::Result;
use crate::model::{Endpoint, EndpointAuth, ExtractedEndpoints, Framework};

#[derive(Debug, Clone, Copy, Default)]
pub struct NestJsExtractor;

impl EndpointExtractor for NestJsExtractor {
    fn framework(&self) -> Framework {
        Framework::NestJs
    }

    fn extract(&self, options: &ExtractOptions) -> Result<ExtractedEndpoints> {
        let entry = options.entry_path(&options.config.nestjs.entry);
        debug!(entry = %entry.display(), "starting nestjs extraction");

        let context = build_context(options, &entry)?;
        let graph = walk_modules(&context, &entry)?;
        let parser = ControllerParser::new(&context, &options.config);
        let mut detector = GuardAuthDetector::new(&context, &options.config.nestjs.auth)?;

        let mut diagnostics = context.diagnostics().to_vec();
        diagnostics.extend(graph.diagnostics.iter().cloned());

        let mut groups = Vec::new();
        for controller_ref in &graph.controllers {
            let Some(controller) = parser.parse(controller_ref) else {
                continue;
            };

            let endpoints: Vec<Endpoint> = controller
                .routes
                .into_iter()
                .map(|route| {
                    let auth = detector.detect(
                        &graph.global_guards,
                        &controller.decorators,
                        &route.decorators,
                    );
                    Endpoint {
                        path: route.path,
                        method: route.method,
                        path_params: route.path_params,
                        query_params: route.query_params,
                        body_params: route.body_params,
                        auth: EndpointAuth::Guard(auth),
                        source_file: controller.source_file.clone(),
                        line_number: route.line,
                        responses: route.responses,
                    }
                })
                .collect();
            push_group(&mut groups, &controller.prefix, endpoints);
        }

        diagnostics.extend(detector.take_diagnostics());
        Ok(assemble(Framework::NestJs, options, groups, diagnostics))
    }
}
