//! Response shapes of hook-style handlers.
//!
//! Recognized forms inside a handler body (nested functions excluded):
//! - `return value` (200)
//! - `reply.send(value)` (200)
//! - `reply.code(n).send(value)` / `reply.status(n).send(value)`
//!
//! Codes of 400 and above become error entries.

use std::collections::HashSet;

use tree_sitter::Node;

use crate::analysis::syntax::{self, named_children, text, LocalBinding};
use crate::analysis::{AnalysisContext, SourceFile};
use crate::model::{EndpointResponses, ErrorResponseInfo, ParamInfo, ResponseInfo, ResponseSource};
use crate::shape::{ExpressionTyper, ShapeRenderer};

const DEFAULT_REPLY_NAME: &str = "reply";

/// A `send` call decoded into its status code and payload.
struct SendCall<'t> {
    code: u16,
    payload: Option<Node<'t>>,
    source: ResponseSource,
    line: usize,
}

/// Extracts responses from handlers in one file.
pub struct ResponseExtractor<'a> {
    typer: ExpressionTyper<'a>,
    renderer: ShapeRenderer,
}

impl<'a> ResponseExtractor<'a> {
    pub fn new(context: &'a AnalysisContext, file: &'a SourceFile, renderer: ShapeRenderer) -> Self {
        Self {
            typer: ExpressionTyper::new(context, file),
            renderer,
        }
    }

    pub fn extract_from_handler(&mut self, handler: Node<'a>) -> EndpointResponses {
        let source = &self.typer.file().parsed.source[..];
        let reply = reply_name(handler, source);

        let mut returns = Vec::new();
        let mut calls = Vec::new();
        if let Some(body) = handler.child_by_field_name("body") {
            if body.kind() == "statement_block" {
                syntax::visit(body, &mut |node| {
                    if node != handler && syntax::is_function(node) {
                        return false;
                    }
                    match node.kind() {
                        "return_statement" => returns.push(node),
                        "call_expression" => calls.push(node),
                        _ => {}
                    }
                    true
                });
            } else {
                // Concise arrow body: `async () => ({ ... })`
                returns.push(body);
                syntax::visit(body, &mut |node| {
                    if syntax::is_function(node) {
                        return false;
                    }
                    if node.kind() == "call_expression" {
                        calls.push(node);
                    }
                    true
                });
            }
        }

        let mut responses = EndpointResponses::default();
        for ret in returns {
            let expr = if ret.kind() == "return_statement" {
                named_children(ret).into_iter().next()
            } else {
                Some(ret)
            };
            let Some(expr) = expr else { continue };
            if is_reply_expression(expr, &reply, source) {
                continue;
            }
            let (data_type, type_name) = self.payload(Some(expr));
            responses.success.push(ResponseInfo {
                code: 200,
                data_type,
                type_name,
                source: ResponseSource::Return,
                line: syntax::line_of(ret),
            });
        }

        for call in calls {
            let Some(send) = parse_send(call, &reply, source) else {
                continue;
            };
            let (data_type, type_name) = self.payload(send.payload);
            if send.code >= 400 {
                let message = send
                    .payload
                    .and_then(|p| message_from_node(p, source, 0))
                    .unwrap_or_else(|| message_from_type(&data_type));
                responses.errors.push(ErrorResponseInfo {
                    code: send.code,
                    message,
                    data_type: data_type
                        .into_iter()
                        .filter(|p| p.name != "error" && p.name != "message")
                        .collect(),
                    line: send.line,
                });
            } else {
                responses.success.push(ResponseInfo {
                    code: send.code,
                    data_type,
                    type_name,
                    source: send.source,
                    line: send.line,
                });
            }
        }

        let mut seen = HashSet::new();
        responses.success.retain(|r| seen.insert((r.code, r.line)));
        let mut seen = HashSet::new();
        responses.errors.retain(|r| seen.insert((r.code, r.line)));
        responses
    }

    fn payload(&mut self, node: Option<Node<'a>>) -> (Vec<ParamInfo>, Option<String>) {
        match node {
            Some(node) => {
                let shape = self.typer.infer_response(node);
                (
                    self.renderer.extract_properties(&shape),
                    shape.name().map(String::from),
                )
            }
            None => (Vec::new(), None),
        }
    }
}

/// Name of the handler's second parameter, `reply` by default.
fn reply_name(handler: Node, source: &[u8]) -> String {
    handler
        .child_by_field_name("parameters")
        .and_then(|params| named_children(params).into_iter().nth(1))
        .and_then(|p| p.child_by_field_name("pattern"))
        .filter(|p| p.kind() == "identifier")
        .map(|p| text(p, source).to_string())
        .unwrap_or_else(|| DEFAULT_REPLY_NAME.to_string())
}

/// Whether `expr` is the reply object or a call chain rooted at it.
fn is_reply_expression(expr: Node, reply: &str, source: &[u8]) -> bool {
    let mut node = syntax::unwrap_expression(expr);
    if node.kind() == "await_expression" {
        match named_children(node).into_iter().next() {
            Some(inner) => node = syntax::unwrap_expression(inner),
            None => return false,
        }
    }
    loop {
        match node.kind() {
            "identifier" => return text(node, source) == reply,
            "call_expression" => match node.child_by_field_name("function") {
                Some(f) => node = f,
                None => return false,
            },
            "member_expression" => match node.child_by_field_name("object") {
                Some(o) => node = o,
                None => return false,
            },
            _ => return false,
        }
    }
}

fn parse_send<'t>(call: Node<'t>, reply: &str, source: &[u8]) -> Option<SendCall<'t>> {
    let function = call.child_by_field_name("function")?;
    if function.kind() != "member_expression" || syntax::callee_name(function, source) != Some("send") {
        return None;
    }
    let payload = syntax::call_arguments(call).into_iter().next();
    let object = syntax::unwrap_expression(function.child_by_field_name("object")?);
    let line = syntax::line_of(call);

    match object.kind() {
        "identifier" if text(object, source) == reply => Some(SendCall {
            code: 200,
            payload,
            source: ResponseSource::ReplySend,
            line,
        }),
        "call_expression" => {
            let code_fn = object.child_by_field_name("function")?;
            if code_fn.kind() != "member_expression"
                || !matches!(syntax::callee_name(code_fn, source), Some("code" | "status"))
            {
                return None;
            }
            let code_arg = syntax::call_arguments(object).into_iter().next()?;
            Some(SendCall {
                code: status_code(code_arg, source)?,
                payload,
                source: ResponseSource::ReplyCode,
                line,
            })
        }
        _ => None,
    }
}

/// A numeric literal, or a `const` whose initializer is one.
fn status_code(node: Node, source: &[u8]) -> Option<u16> {
    let node = syntax::unwrap_expression(node);
    match node.kind() {
        "number" => text(node, source).parse().ok(),
        "identifier" => match syntax::resolve_local(node, text(node, source), source)? {
            LocalBinding::Variable(declarator) => {
                let value = syntax::unwrap_expression(declarator.child_by_field_name("value")?);
                (value.kind() == "number")
                    .then(|| text(value, source).parse().ok())
                    .flatten()
            }
            _ => None,
        },
        _ => None,
    }
}

/// The `message` string of an object payload, following identifiers.
fn message_from_node(node: Node, source: &[u8], depth: usize) -> Option<String> {
    if depth > 4 {
        return None;
    }
    let node = syntax::unwrap_expression(node);
    match node.kind() {
        "identifier" | "shorthand_property_identifier" => {
            match syntax::resolve_local(node, text(node, source), source)? {
                LocalBinding::Variable(declarator) => {
                    message_from_node(declarator.child_by_field_name("value")?, source, depth + 1)
                }
                _ => None,
            }
        }
        "object" => {
            let value = syntax::object_property(node, "message", source)?;
            syntax::string_value(value, source)
                .or_else(|| message_from_node(value, source, depth + 1))
        }
        "string" | "template_string" if depth > 0 => syntax::string_value(node, source),
        _ => None,
    }
}

/// Fallback message from the rendered `message` member.
fn message_from_type(data_type: &[ParamInfo]) -> String {
    match data_type.iter().find(|p| p.name == "message") {
        Some(param) => param
            .type_text
            .strip_prefix('\'')
            .and_then(|t| t.strip_suffix('\''))
            .unwrap_or(&param.type_text)
            .to_string(),
        None => "string".to_string(),
    }
}
