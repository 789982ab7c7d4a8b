//! Route file parsing: `app.<verb>(path, [options], handler)` calls.

use tracing::debug;
use tree_sitter::Node;

use super::auth::HookAuthDetector;
use super::registration::scoped_calls;
use super::responses::ResponseExtractor;
use crate::analysis::syntax::{self, named_children};
use crate::analysis::{AnalysisContext, SourceFile};
use crate::config::ExtractorConfig;
use crate::extract::path_params_from_path;
use crate::model::{Diagnostic, DiagnosticKind, Endpoint, EndpointAuth, HttpMethod, ParamInfo};
use crate::shape::{ShapeRenderer, TypeResolver, TypeShape};

/// Parameters split out of a route's generic type argument.
#[derive(Debug, Default, PartialEq)]
struct RouteParams {
    path: Option<Vec<ParamInfo>>,
    query: Vec<ParamInfo>,
    body: Vec<ParamInfo>,
}

/// Route paths are absolute, empty (the plugin prefix itself) or a wildcard.
/// This keeps `map.get('key', fallback)` and similar out.
fn is_route_path(path: &str) -> bool {
    path.is_empty() || path.starts_with('/') || path.starts_with('*')
}

/// Parses verb calls in route files.
pub struct RouteFileParser<'a> {
    context: &'a AnalysisContext,
    auth: HookAuthDetector,
    renderer: ShapeRenderer,
    extract_responses: bool,
}

impl<'a> RouteFileParser<'a> {
    pub fn new(context: &'a AnalysisContext, config: &ExtractorConfig) -> Self {
        Self {
            context,
            auth: HookAuthDetector::new(&config.fastify.auth),
            renderer: ShapeRenderer::new(config.common.response_depth),
            extract_responses: config.common.extract_responses,
        }
    }

    /// Endpoints declared at the top level of `file`, in source order.
    pub fn parse(&self, file: &'a SourceFile, diagnostics: &mut Vec<Diagnostic>) -> Vec<Endpoint> {
        self.parse_in(file, file.parsed.tree.root_node(), diagnostics)
    }

    /// Endpoints declared inside `scope`, excluding inline plugins nested
    /// below it.
    ///
    /// Calls that look like routes but whose path is not a string literal
    /// are skipped and reported in `diagnostics`.
    pub fn parse_in(
        &self,
        file: &'a SourceFile,
        scope: Node<'a>,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Vec<Endpoint> {
        let source = &file.parsed.source[..];
        let resolver = TypeResolver::new(self.context);
        let mut responses = self
            .extract_responses
            .then(|| ResponseExtractor::new(self.context, file, self.renderer.clone()));

        let mut endpoints = Vec::new();
        for call in scoped_calls(scope, source) {
            let Some(function) = call.child_by_field_name("function") else {
                continue;
            };
            if function.kind() != "member_expression" {
                continue;
            }
            let Some(method) =
                syntax::callee_name(function, source).and_then(HttpMethod::from_call_name)
            else {
                continue;
            };

            let args = syntax::call_arguments(call);
            if args.len() < 2 {
                continue;
            }
            let handler = args.last().copied().filter(|a| syntax::is_function(*a));

            let Some(path) = syntax::string_value(args[0], source) else {
                if handler.is_some() {
                    let line = syntax::line_of(call);
                    debug!(file = %file.rel_path, line, "skipping route with non-literal path");
                    diagnostics.push(Diagnostic::new(
                        DiagnosticKind::SkippedRoute,
                        format!("{}:{}", file.rel_path, line),
                        "route path is not a string literal",
                    ));
                }
                continue;
            };
            if !is_route_path(&path) {
                continue;
            }

            let params = call
                .child_by_field_name("type_arguments")
                .and_then(|targs| named_children(targs).into_iter().next())
                .map(|targ| self.route_params(&resolver, file, targ))
                .unwrap_or_default();
            let path_params = params
                .path
                .unwrap_or_else(|| path_params_from_path(&path));

            let auth = self.auth.detect(&args, source);
            let responses = match (responses.as_mut(), handler) {
                (Some(extractor), Some(handler)) => Some(extractor.extract_from_handler(handler)),
                _ => None,
            };

            endpoints.push(Endpoint {
                path,
                method,
                path_params,
                query_params: params.query,
                body_params: params.body,
                auth: EndpointAuth::Hook(auth),
                source_file: file.rel_path.clone(),
                line_number: syntax::line_of(call),
                responses,
            });
        }

        debug!(file = %file.rel_path, endpoints = endpoints.len(), "parsed route file");
        endpoints
    }

    /// Split `{ Params, Querystring, Body }` into parameter buckets.
    fn route_params(&self, resolver: &TypeResolver, file: &SourceFile, targ: Node) -> RouteParams {
        let shape = resolver.resolve_type_node(file, targ);
        let TypeShape::Object { members, .. } = shape else {
            return RouteParams::default();
        };

        let mut params = RouteParams::default();
        for member in members {
            let extracted = self.renderer.extract_properties(&member.shape);
            match member.name.as_str() {
                "Params" => params.path = Some(extracted),
                "Querystring" => params.query = extracted,
                "Body" => params.body = extracted,
                _ => {}
            }
        }
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AuthRequirement;

    fn parse(code: &str, config: &ExtractorConfig) -> (Vec<Endpoint>, Vec<Diagnostic>) {
        let mut ctx = AnalysisContext::new("/app");
        ctx.add_source("src/routes/users.ts", code).unwrap();
        let file = ctx.file("src/routes/users.ts").unwrap();
        let parser = RouteFileParser::new(&ctx, config);
        let mut diagnostics = Vec::new();
        let endpoints = parser.parse(file, &mut diagnostics);
        (endpoints, diagnostics)
    }

    #[test]
    fn test_routes_with_type_arguments() {
        let code = r#"
import { FastifyInstance } from 'fastify';

interface CreateUserBody {
  name: string;
  email?: string;
}

export default async function userRoutes(app: FastifyInstance) {
  app.get('/:id', { preHandler: [tokenVerification] }, async (request, reply) => {
    return { id: request.params.id };
  });

  app.post<{ Body: CreateUserBody; Querystring: { dryRun?: boolean } }>('/', async (request) => {
    return { ok: true };
  });

  app.delete<{ Params: { userId: number } }>('/:id', async () => ({}));
}
"#;
        let (endpoints, diagnostics) = parse(code, &ExtractorConfig::default());
        assert!(diagnostics.is_empty());
        assert_eq!(endpoints.len(), 3);

        let get = &endpoints[0];
        assert_eq!(get.method, HttpMethod::Get);
        assert_eq!(get.path, "/:id");
        assert_eq!(get.path_params, vec![ParamInfo::new("id", "string", true)]);
        assert_eq!(get.auth.requirement(), AuthRequirement::Required);
        assert_eq!(get.line_number, 10);
        assert!(get.responses.is_none());

        let post = &endpoints[1];
        assert_eq!(
            post.body_params,
            vec![
                ParamInfo::new("name", "string", true),
                ParamInfo::new("email", "string", false),
            ]
        );
        assert_eq!(post.query_params, vec![ParamInfo::new("dryRun", "boolean", false)]);
        assert_eq!(post.auth.requirement(), AuthRequirement::Public);

        // An explicit Params bucket replaces placeholder inference.
        let delete = &endpoints[2];
        assert_eq!(delete.path_params, vec![ParamInfo::new("userId", "number", true)]);
    }

    #[test]
    fn test_non_literal_path_is_skipped() {
        let code = r#"
const base = '/x';
app.get(base + '/y', async () => 1);
map.get('key');
"#;
        let (endpoints, diagnostics) = parse(code, &ExtractorConfig::default());
        assert!(endpoints.is_empty());
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].kind, DiagnosticKind::SkippedRoute);
        assert_eq!(diagnostics[0].path, "src/routes/users.ts:3");
    }

    #[test]
    fn test_inline_plugin_routes_stay_out_of_file_scope() {
        let code = r#"
app.get('/health', async () => 'ok');
app.register(async (inst) => {
  inst.get('/inline/:x', async () => ({}));
}, { prefix: '/v1' });
"#;
        let mut ctx = AnalysisContext::new("/app");
        ctx.add_source("src/build.ts", code).unwrap();
        let file = ctx.file("src/build.ts").unwrap();
        let parser = RouteFileParser::new(&ctx, &ExtractorConfig::default());
        let mut diagnostics = Vec::new();

        let top = parser.parse(file, &mut diagnostics);
        let paths: Vec<_> = top.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["/health"]);

        let body = syntax::descendants(file.parsed.tree.root_node(), "arrow_function")
            .into_iter()
            .find(|f| syntax::text(*f, &file.parsed.source).starts_with("async (inst)"))
            .unwrap();
        let inline = parser.parse_in(file, body, &mut diagnostics);
        assert_eq!(inline.len(), 1);
        assert_eq!(inline[0].path, "/inline/:x");
        assert_eq!(inline[0].path_params, vec![ParamInfo::new("x", "string", true)]);
        assert_eq!(inline[0].line_number, 4);
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_responses_when_enabled() {
        let mut config = ExtractorConfig::default();
        config.common.extract_responses = true;
        let (endpoints, _) = parse(
            "app.get('/ping', async (request, reply) => { reply.send({ pong: true }); });",
            &config,
        );
        let responses = endpoints[0].responses.as_ref().unwrap();
        assert_eq!(responses.success.len(), 1);
        assert_eq!(responses.success[0].code, 200);
    }
}
