//! Controller classes: route methods, parameter decorators and responses.

use std::collections::HashSet;

use tracing::debug;
use tree_sitter::Node;

use super::modules::ControllerRef;
use crate::analysis::syntax::{self, named_children, text};
use crate::analysis::{AnalysisContext, ClassDecl, Decorator, DecoratorArg, SourceFile};
use crate::config::ExtractorConfig;
use crate::extract::{join_paths, path_params_from_path};
use crate::model::{
    EndpointResponses, ErrorResponseInfo, HttpMethod, ParamInfo, ResponseInfo, ResponseSource,
};
use crate::shape::{ExpressionTyper, ShapeRenderer, TypeResolver, TypeShape};

const CONTROLLER: &str = "Controller";
const HTTP_CODE: &str = "HttpCode";
const HTTP_EXCEPTION: &str = "HttpException";

/// Parameter decorators that bind request parts which are not reported.
const UNREPORTED_PARAM_DECORATORS: &[&str] = &["Headers", "Req", "Request", "Res", "Response"];

/// Built-in exceptions: class name, status, default message.
const NEST_EXCEPTIONS: &[(&str, u16, &str)] = &[
    ("BadRequestException", 400, "Bad Request"),
    ("UnauthorizedException", 401, "Unauthorized"),
    ("ForbiddenException", 403, "Forbidden"),
    ("NotFoundException", 404, "Not Found"),
    ("MethodNotAllowedException", 405, "Method Not Allowed"),
    ("NotAcceptableException", 406, "Not Acceptable"),
    ("RequestTimeoutException", 408, "Request Timeout"),
    ("ConflictException", 409, "Conflict"),
    ("GoneException", 410, "Gone"),
    ("PayloadTooLargeException", 413, "Payload Too Large"),
    ("UnsupportedMediaTypeException", 415, "Unsupported Media Type"),
    ("UnprocessableEntityException", 422, "Unprocessable Entity"),
    ("InternalServerErrorException", 500, "Internal Server Error"),
    ("NotImplementedException", 501, "Not Implemented"),
    ("BadGatewayException", 502, "Bad Gateway"),
    ("ServiceUnavailableException", 503, "Service Unavailable"),
    ("GatewayTimeoutException", 504, "Gateway Timeout"),
];

/// `HttpStatus.*` members commonly passed to `HttpException`.
const HTTP_STATUS: &[(&str, u16)] = &[
    ("OK", 200),
    ("CREATED", 201),
    ("ACCEPTED", 202),
    ("NO_CONTENT", 204),
    ("BAD_REQUEST", 400),
    ("UNAUTHORIZED", 401),
    ("PAYMENT_REQUIRED", 402),
    ("FORBIDDEN", 403),
    ("NOT_FOUND", 404),
    ("METHOD_NOT_ALLOWED", 405),
    ("CONFLICT", 409),
    ("GONE", 410),
    ("UNPROCESSABLE_ENTITY", 422),
    ("TOO_MANY_REQUESTS", 429),
    ("INTERNAL_SERVER_ERROR", 500),
    ("NOT_IMPLEMENTED", 501),
    ("BAD_GATEWAY", 502),
    ("SERVICE_UNAVAILABLE", 503),
    ("GATEWAY_TIMEOUT", 504),
];

/// Which request part a parameter decorator binds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParamSource {
    Path,
    Query,
    Body,
}

impl ParamSource {
    fn from_decorator(name: &str) -> Option<Self> {
        match name {
            "Param" => Some(ParamSource::Path),
            "Query" => Some(ParamSource::Query),
            "Body" => Some(ParamSource::Body),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct MethodParams {
    path: Vec<ParamInfo>,
    query: Vec<ParamInfo>,
    body: Vec<ParamInfo>,
}

impl MethodParams {
    fn bucket(&mut self, source: ParamSource) -> &mut Vec<ParamInfo> {
        match source {
            ParamSource::Path => &mut self.path,
            ParamSource::Query => &mut self.query,
            ParamSource::Body => &mut self.body,
        }
    }
}

/// One route method of a controller.
#[derive(Debug, Clone)]
pub struct RouteMethod {
    pub method: HttpMethod,
    /// Controller prefix and method path joined.
    pub path: String,
    pub decorators: Vec<Decorator>,
    pub path_params: Vec<ParamInfo>,
    pub query_params: Vec<ParamInfo>,
    pub body_params: Vec<ParamInfo>,
    pub line: usize,
    pub responses: Option<EndpointResponses>,
}

#[derive(Debug, Clone)]
pub struct ParsedController {
    pub name: String,
    /// Normalized controller prefix, `/` when empty.
    pub prefix: String,
    pub decorators: Vec<Decorator>,
    pub source_file: String,
    pub routes: Vec<RouteMethod>,
}

pub struct ControllerParser<'a> {
    context: &'a AnalysisContext,
    resolver: TypeResolver<'a>,
    renderer: ShapeRenderer,
    unreported: HashSet<String>,
    extract_responses: bool,
}

impl<'a> ControllerParser<'a> {
    pub fn new(context: &'a AnalysisContext, config: &ExtractorConfig) -> Self {
        let unreported = UNREPORTED_PARAM_DECORATORS
            .iter()
            .map(|s| s.to_string())
            .chain(
                config
                    .nestjs
                    .params
                    .custom_decorators
                    .iter()
                    .map(|d| d.name.clone()),
            )
            .collect();
        Self {
            context,
            resolver: TypeResolver::new(context),
            renderer: ShapeRenderer::new(config.common.response_depth),
            unreported,
            extract_responses: config.common.extract_responses,
        }
    }

    /// Parse the controller a module listed.
    ///
    /// Returns `None` when the class is missing or not a `@Controller`.
    pub fn parse(&self, controller: &ControllerRef) -> Option<ParsedController> {
        let context = self.context;
        let file = context.file(&controller.file)?;
        let Some(class) = find_controller_class(file, controller) else {
            debug!(
                controller = %controller.name,
                file = %file.rel_path,
                "listed controller has no @Controller class"
            );
            return None;
        };
        let decorator = class.decorator(CONTROLLER)?;
        let prefix = join_paths(&[&controller_prefix(decorator)]);

        let node = file
            .parsed
            .node_at(class.span.start_byte, class.span.end_byte, "class_declaration")
            .or_else(|| {
                file.parsed.node_at(
                    class.span.start_byte,
                    class.span.end_byte,
                    "abstract_class_declaration",
                )
            })?;

        let source = &file.parsed.source[..];
        let mut typer = self
            .extract_responses
            .then(|| ExpressionTyper::new(context, file));

        let mut routes = Vec::new();
        for method in syntax::class_methods(node) {
            let decorators = syntax::decorators(method, source);
            let Some((http_method, route_decorator)) = decorators
                .iter()
                .find_map(|d| HttpMethod::from_decorator(&d.name).map(|m| (m, d)))
            else {
                continue;
            };

            let path = join_paths(&[&prefix, &route_path(route_decorator)]);
            let mut params = self.method_params(file, method);
            for placeholder in path_params_from_path(&path) {
                if !params.path.iter().any(|p| p.name == placeholder.name) {
                    params.path.push(placeholder);
                }
            }

            let method_line = syntax::line_of(method);
            let line = decorators
                .iter()
                .map(|d| d.line)
                .min()
                .map_or(method_line, |l| l.min(method_line));

            let responses = typer
                .as_mut()
                .map(|t| self.responses(t, method, http_method, &decorators));

            routes.push(RouteMethod {
                method: http_method,
                path,
                decorators,
                path_params: params.path,
                query_params: params.query,
                body_params: params.body,
                line,
                responses,
            });
        }

        debug!(
            controller = %class.name,
            prefix = %prefix,
            routes = routes.len(),
            "parsed controller"
        );
        Some(ParsedController {
            name: class.name.clone(),
            prefix,
            decorators: class.decorators.clone(),
            source_file: file.rel_path.clone(),
            routes,
        })
    }

    fn method_params(&self, file: &SourceFile, method: Node) -> MethodParams {
        let source = &file.parsed.source[..];
        let mut params = MethodParams::default();
        let Some(list) = method.child_by_field_name("parameters") else {
            return params;
        };

        for param in named_children(list) {
            if !matches!(param.kind(), "required_parameter" | "optional_parameter") {
                continue;
            }
            let decorators = syntax::decorators(param, source);
            let Some(decorator) = decorators.iter().find(|d| {
                ParamSource::from_decorator(&d.name).is_some() || self.unreported.contains(&d.name)
            }) else {
                continue;
            };
            let Some(kind) = ParamSource::from_decorator(&decorator.name) else {
                continue;
            };

            let binding = param
                .child_by_field_name("pattern")
                .map(|p| text(p, source).to_string())
                .unwrap_or_default();
            let type_node = syntax::declared_type(param);
            let required =
                !syntax::has_question_token(param) && param.child_by_field_name("value").is_none();

            let bucket = params.bucket(kind);
            match decorator.first_string() {
                Some(name) => {
                    let type_text = type_node
                        .map(|t| collapse_whitespace(text(t, source)))
                        .unwrap_or_else(|| "any".to_string());
                    bucket.push(ParamInfo::new(name, type_text, required));
                }
                None => bucket.extend(self.expand_binding(file, &binding, type_node, required)),
            }
        }
        params
    }

    /// Fields of an unnamed binding such as `@Body() dto: CreateUserDto`.
    fn expand_binding(
        &self,
        file: &SourceFile,
        binding: &str,
        type_node: Option<Node>,
        required: bool,
    ) -> Vec<ParamInfo> {
        let Some(type_node) = type_node else {
            return vec![ParamInfo::new(binding, "any", required)];
        };
        let shape = self.resolver.resolve_type_node(file, type_node);
        let fields = self.renderer.extract_properties(&shape);
        if !fields.is_empty() || matches!(shape, TypeShape::Object { .. }) {
            return fields;
        }
        vec![ParamInfo::new(binding, self.renderer.format(&shape), required)]
    }

    fn responses(
        &self,
        typer: &mut ExpressionTyper<'a>,
        method: Node<'a>,
        http_method: HttpMethod,
        decorators: &[Decorator],
    ) -> EndpointResponses {
        let source = &typer.file().parsed.source[..];
        let code = decorators
            .iter()
            .find(|d| d.name == HTTP_CODE)
            .and_then(|d| d.argument(0))
            .and_then(DecoratorArg::as_number)
            .and_then(status_code)
            .unwrap_or(if http_method == HttpMethod::Post { 201 } else { 200 });

        let mut returns = Vec::new();
        let mut throws = Vec::new();
        if let Some(body) = method.child_by_field_name("body") {
            syntax::visit(body, &mut |node| {
                if syntax::is_function(node) {
                    return false;
                }
                match node.kind() {
                    "return_statement" => returns.push(node),
                    "throw_statement" => throws.push(node),
                    _ => {}
                }
                true
            });
        }

        let mut responses = EndpointResponses::default();
        if let Some(declared) = syntax::return_type(method) {
            let shape = typer.resolve_type(declared).unwrap_async();
            responses.success.push(ResponseInfo {
                code,
                data_type: self.renderer.extract_properties(&shape),
                type_name: shape.name().map(String::from),
                source: ResponseSource::Declared,
                line: syntax::line_of(declared),
            });
        } else {
            for ret in returns {
                let Some(expr) = named_children(ret).into_iter().next() else {
                    continue;
                };
                let shape = typer.infer_response(expr);
                responses.success.push(ResponseInfo {
                    code,
                    data_type: self.renderer.extract_properties(&shape),
                    type_name: shape.name().map(String::from),
                    source: ResponseSource::Return,
                    line: syntax::line_of(ret),
                });
            }
        }

        for throw in throws {
            if let Some(error) = thrown_exception(throw, source) {
                responses.errors.push(error);
            }
        }

        let mut seen = HashSet::new();
        responses.success.retain(|r| seen.insert((r.code, r.line)));
        let mut seen = HashSet::new();
        responses.errors.retain(|r| seen.insert((r.code, r.line)));
        responses
    }
}

fn find_controller_class<'f>(file: &'f SourceFile, controller: &ControllerRef) -> Option<&'f ClassDecl> {
    let named = file
        .facts
        .class(&controller.name)
        .filter(|c| c.decorator(CONTROLLER).is_some());
    match named {
        Some(class) => Some(class),
        None if controller.default_import => file
            .facts
            .classes
            .iter()
            .find(|c| c.decorator(CONTROLLER).is_some()),
        None => None,
    }
}

/// `@Controller('users')`, `@Controller({ path: 'users' })` or
/// `@Controller(['users', 'people'])` (first entry).
fn controller_prefix(decorator: &Decorator) -> String {
    decorator.argument(0).map(first_path).unwrap_or_default()
}

/// `@Get(':id')`, `@Get([':id', 'by-id/:id'])` (first entry) or `@Get()`.
fn route_path(decorator: &Decorator) -> String {
    decorator.argument(0).map(first_path).unwrap_or_default()
}

fn first_path(arg: &DecoratorArg) -> String {
    match arg {
        DecoratorArg::Str(s) => s.clone(),
        DecoratorArg::Array(items) => items.first().map(first_path).unwrap_or_default(),
        DecoratorArg::Object(_) => arg.get("path").map(first_path).unwrap_or_default(),
        _ => String::new(),
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// An error entry for `throw new NotFoundException('...')` and friends.
fn thrown_exception(throw: Node, source: &[u8]) -> Option<ErrorResponseInfo> {
    let expr = syntax::unwrap_expression(named_children(throw).into_iter().next()?);
    if expr.kind() != "new_expression" {
        return None;
    }
    let class = text(expr.child_by_field_name("constructor")?, source);
    let args = syntax::call_arguments(expr);

    let (code, default_message) = if class == HTTP_EXCEPTION {
        (http_status(*args.get(1)?, source)?, "string")
    } else {
        NEST_EXCEPTIONS
            .iter()
            .find(|(name, _, _)| *name == class)
            .map(|(_, code, message)| (*code, *message))?
    };

    let message = args
        .first()
        .and_then(|arg| exception_message(*arg, source))
        .unwrap_or_else(|| default_message.to_string());

    Some(ErrorResponseInfo {
        code,
        message,
        data_type: Vec::new(),
        line: syntax::line_of(throw),
    })
}

fn exception_message(arg: Node, source: &[u8]) -> Option<String> {
    let arg = syntax::unwrap_expression(arg);
    match arg.kind() {
        "object" => syntax::object_property(arg, "message", source)
            .and_then(|v| syntax::string_value(v, source)),
        _ => syntax::string_value(arg, source),
    }
}

fn http_status(node: Node, source: &[u8]) -> Option<u16> {
    let node = syntax::unwrap_expression(node);
    match node.kind() {
        "number" => text(node, source).parse().ok(),
        "member_expression" => {
            let property = text(node.child_by_field_name("property")?, source);
            HTTP_STATUS
                .iter()
                .find(|(name, _)| *name == property)
                .map(|(_, code)| *code)
        }
        _ => None,
    }
}

/// An HTTP status from a numeric literal; `None` outside 100..=599.
fn status_code(n: f64) -> Option<u16> {
    if n.fract() != 0.0 {
        return None;
    }
    u16::try_from(n as i64)
        .ok()
        .filter(|code| (100..=599).contains(code))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const USERS_CONTROLLER: &str = r#"
import { Controller, Get, Post, Param, Body, Query, Headers, HttpCode } from '@nestjs/common';
import { NotFoundException, HttpException, HttpStatus } from '@nestjs/common';

interface CreateUserDto {
  name: string;
  email?: string;
}

interface UserView {
  id: number;
  name: string;
}

@Controller('users')
export class UsersController {
  @Get(':id')
  async findOne(@Param('id') id: string, @Headers('x-trace') trace: string): Promise<UserView> {
    const user = null;
    if (!user) {
      throw new NotFoundException('User not found');
    }
    throw new HttpException({ message: 'Gone for good' }, HttpStatus.GONE);
  }

  @Post()
  @HttpCode(202)
  create(@Body() dto: CreateUserDto, @CurrentUser() user: User) {
    return { ok: true };
  }

  @Get('search')
  search(@Query('name') name: string, @Query('age') age?: number, @Query('page') page = 1) {
    return [];
  }

  @Get(':orgId/members/:memberId')
  members(@Param('memberId') memberId: number) {}

  helper() {}
}
"#;

    fn parse(config: &ExtractorConfig) -> ParsedController {
        let mut ctx = AnalysisContext::new("/app");
        ctx.add_source("src/users/users.controller.ts", USERS_CONTROLLER)
            .unwrap();
        let parser = ControllerParser::new(&ctx, config);
        parser
            .parse(&ControllerRef {
                name: "UsersController".to_string(),
                file: PathBuf::from("/app/src/users/users.controller.ts"),
                default_import: false,
                module: "UsersModule".to_string(),
            })
            .unwrap()
    }

    fn custom_config() -> ExtractorConfig {
        let mut config = ExtractorConfig::default();
        config
            .nestjs
            .params
            .custom_decorators
            .push(crate::config::CustomDecoratorConfig {
                name: "CurrentUser".to_string(),
                kind: "custom".to_string(),
                description: None,
            });
        config
    }

    #[test]
    fn test_routes_and_paths() {
        let controller = parse(&custom_config());
        assert_eq!(controller.prefix, "/users");
        assert_eq!(controller.source_file, "src/users/users.controller.ts");

        let routes: Vec<_> = controller
            .routes
            .iter()
            .map(|r| (r.method, r.path.as_str()))
            .collect();
        assert_eq!(
            routes,
            vec![
                (HttpMethod::Get, "/users/:id"),
                (HttpMethod::Post, "/users"),
                (HttpMethod::Get, "/users/search"),
                (HttpMethod::Get, "/users/:orgId/members/:memberId"),
            ]
        );
        assert_eq!(controller.routes[0].line, 17);
    }

    #[test]
    fn test_param_decorators() {
        let controller = parse(&custom_config());

        let find_one = &controller.routes[0];
        assert_eq!(find_one.path_params, vec![ParamInfo::new("id", "string", true)]);
        assert!(find_one.query_params.is_empty());

        let create = &controller.routes[1];
        assert_eq!(
            create.body_params,
            vec![
                ParamInfo::new("name", "string", true),
                ParamInfo::new("email", "string", false),
            ]
        );

        let search = &controller.routes[2];
        assert_eq!(
            search.query_params,
            vec![
                ParamInfo::new("name", "string", true),
                ParamInfo::new("age", "number", false),
                ParamInfo::new("page", "any", false),
            ]
        );
    }

    #[test]
    fn test_unbound_placeholders_are_strings() {
        let controller = parse(&custom_config());
        assert_eq!(
            controller.routes[3].path_params,
            vec![
                ParamInfo::new("memberId", "number", true),
                ParamInfo::new("orgId", "string", true),
            ]
        );
    }

    #[test]
    fn test_responses() {
        let mut config = custom_config();
        config.common.extract_responses = true;
        let controller = parse(&config);

        let find_one = controller.routes[0].responses.as_ref().unwrap();
        assert_eq!(find_one.success.len(), 1);
        assert_eq!(find_one.success[0].code, 200);
        assert_eq!(find_one.success[0].source, ResponseSource::Declared);
        assert_eq!(find_one.success[0].type_name.as_deref(), Some("UserView"));
        assert_eq!(
            find_one.success[0].data_type,
            vec![
                ParamInfo::new("id", "number", true),
                ParamInfo::new("name", "string", true),
            ]
        );
        let errors: Vec<_> = find_one
            .errors
            .iter()
            .map(|e| (e.code, e.message.as_str()))
            .collect();
        assert_eq!(errors, vec![(404, "User not found"), (410, "Gone for good")]);

        let create = controller.routes[1].responses.as_ref().unwrap();
        assert_eq!(create.success[0].code, 202);
        assert_eq!(create.success[0].source, ResponseSource::Return);
        assert_eq!(
            create.success[0].data_type,
            vec![ParamInfo::new("ok", "boolean", true)]
        );
    }

    #[test]
    fn test_out_of_range_http_code_falls_back() {
        let mut ctx = AnalysisContext::new("/app");
        ctx.add_source(
            "src/status.controller.ts",
            r#"
@Controller('status')
export class StatusController {
  @Post()
  @HttpCode(70000)
  create() {
    return { ok: true };
  }

  @Get()
  @HttpCode(-1)
  read() {
    return { ok: true };
  }
}
"#,
        )
        .unwrap();
        let mut config = ExtractorConfig::default();
        config.common.extract_responses = true;
        let controller = ControllerParser::new(&ctx, &config)
            .parse(&ControllerRef {
                name: "StatusController".to_string(),
                file: PathBuf::from("/app/src/status.controller.ts"),
                default_import: false,
                module: "AppModule".to_string(),
            })
            .unwrap();

        let codes: Vec<_> = controller
            .routes
            .iter()
            .map(|r| r.responses.as_ref().unwrap().success[0].code)
            .collect();
        assert_eq!(codes, vec![201, 200]);

        assert_eq!(status_code(204.0), Some(204));
        assert_eq!(status_code(70000.0), None);
        assert_eq!(status_code(99.0), None);
        assert_eq!(status_code(200.5), None);
    }

    #[test]
    fn test_responses_off_by_default() {
        let controller = parse(&custom_config());
        assert!(controller.routes.iter().all(|r| r.responses.is_none()));
    }

    #[test]
    fn test_controller_prefix_forms() {
        let object = Decorator {
            name: CONTROLLER.into(),
            arguments: vec![DecoratorArg::Object(vec![(
                "path".into(),
                DecoratorArg::Str("admin".into()),
            )])],
            line: 1,
        };
        assert_eq!(controller_prefix(&object), "admin");

        let array = Decorator {
            name: CONTROLLER.into(),
            arguments: vec![DecoratorArg::Array(vec![
                DecoratorArg::Str("v1/cats".into()),
                DecoratorArg::Str("cats".into()),
            ])],
            line: 1,
        };
        assert_eq!(controller_prefix(&array), "v1/cats");

        let bare = Decorator {
            name: CONTROLLER.into(),
            arguments: Vec::new(),
            line: 1,
        };
        assert_eq!(join_paths(&[&controller_prefix(&bare)]), "/");
    }
}
