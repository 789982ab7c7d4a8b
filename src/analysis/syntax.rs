//! Helpers over tree-sitter TypeScript nodes.
//!
//! These functions hide grammar details (field names, wrapper nodes,
//! where decorators attach) from the extractors.

use tree_sitter::Node;

use super::facts::{BaseClause, Decorator, DecoratorArg};

/// Text of a node, or `""` if the bytes are not valid UTF-8.
pub fn text<'a>(node: Node, source: &'a [u8]) -> &'a str {
    node.utf8_text(source).unwrap_or("")
}

/// 1-based start line of a node.
pub fn line_of(node: Node) -> usize {
    node.start_position().row + 1
}

/// Named children, skipping comments.
pub fn named_children<'t>(node: Node<'t>) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor)
        .filter(|c| c.kind() != "comment")
        .collect()
}

/// Unquoted value of a string literal, or of a template string without
/// substitutions.
pub fn string_value(node: Node, source: &[u8]) -> Option<String> {
    match node.kind() {
        "string" => {
            let raw = text(node, source);
            Some(strip_delimiters(raw).to_string())
        }
        "template_string" => {
            let has_substitution = named_children(node)
                .iter()
                .any(|c| c.kind() == "template_substitution");
            if has_substitution {
                None
            } else {
                Some(strip_delimiters(text(node, source)).to_string())
            }
        }
        _ => None,
    }
}

fn strip_delimiters(raw: &str) -> &str {
    if raw.len() >= 2 {
        &raw[1..raw.len() - 1]
    } else {
        ""
    }
}

/// Argument expressions of a call or `new` expression.
pub fn call_arguments<'t>(call: Node<'t>) -> Vec<Node<'t>> {
    call.child_by_field_name("arguments")
        .map(named_children)
        .unwrap_or_default()
}

/// Name of a callee: the identifier itself, or the property of a member
/// expression (`app.get` -> `get`).
pub fn callee_name<'a>(node: Node, source: &'a [u8]) -> Option<&'a str> {
    match node.kind() {
        "identifier" | "property_identifier" | "type_identifier" => Some(text(node, source)),
        "member_expression" => node
            .child_by_field_name("property")
            .map(|p| text(p, source)),
        _ => None,
    }
}

/// Key of an object `pair`, unquoting string keys.
pub fn property_key(pair: Node, source: &[u8]) -> Option<String> {
    let key = pair.child_by_field_name("key")?;
    match key.kind() {
        "property_identifier" | "identifier" => Some(text(key, source).to_string()),
        "string" => string_value(key, source),
        "number" => Some(text(key, source).to_string()),
        _ => None,
    }
}

/// The node holding `key` in an object literal.
///
/// For `{ key: value }` this is `value`; for the shorthand `{ key }` it is
/// the shorthand identifier itself.
pub fn object_property<'t>(object: Node<'t>, key: &str, source: &[u8]) -> Option<Node<'t>> {
    for child in named_children(object) {
        match child.kind() {
            "pair" => {
                if property_key(child, source).as_deref() == Some(key) {
                    return child.child_by_field_name("value");
                }
            }
            "shorthand_property_identifier" => {
                if text(child, source) == key {
                    return Some(child);
                }
            }
            _ => {}
        }
    }
    None
}

/// Strip parentheses and TypeScript-only wrappers from an expression.
pub fn unwrap_expression(mut node: Node) -> Node {
    loop {
        match node.kind() {
            "parenthesized_expression" | "non_null_expression" => {
                match named_children(node).first() {
                    Some(inner) => node = *inner,
                    None => return node,
                }
            }
            _ => return node,
        }
    }
}

pub fn is_function(node: Node) -> bool {
    matches!(
        node.kind(),
        "arrow_function" | "function_expression" | "function" | "function_declaration"
            | "method_definition"
    )
}

/// Pre-order walk. `f` returns whether to descend into the node's children.
pub fn visit<'t, F>(node: Node<'t>, f: &mut F)
where
    F: FnMut(Node<'t>) -> bool,
{
    if !f(node) {
        return;
    }
    let mut cursor = node.walk();
    let children: Vec<Node<'t>> = node.named_children(&mut cursor).collect();
    for child in children {
        visit(child, f);
    }
}

/// All named descendants of `node` (inclusive) with the given kind, in
/// source order.
pub fn descendants<'t>(node: Node<'t>, kind: &str) -> Vec<Node<'t>> {
    let mut found = Vec::new();
    visit(node, &mut |n| {
        if n.kind() == kind {
            found.push(n);
        }
        true
    });
    found
}

// =============================================================================
// Decorators
// =============================================================================

/// Decorator nodes attached to a class, method, field or parameter.
///
/// Depending on grammar position decorators are children of the declaration
/// or preceding siblings (inside an `export_statement` or a class body).
pub fn decorator_nodes<'t>(node: Node<'t>) -> Vec<Node<'t>> {
    let mut decorators = Vec::new();

    let mut preceding = Vec::new();
    let mut sibling = node.prev_named_sibling();
    while let Some(s) = sibling {
        if s.kind() != "decorator" {
            break;
        }
        preceding.push(s);
        sibling = s.prev_named_sibling();
    }
    preceding.reverse();
    decorators.extend(preceding);

    decorators.extend(
        named_children(node)
            .into_iter()
            .filter(|c| c.kind() == "decorator"),
    );

    decorators
}

/// Convert a `decorator` node into a `{name, arguments}` record.
pub fn decorator_record(node: Node, source: &[u8]) -> Option<Decorator> {
    let expr = named_children(node).into_iter().next()?;
    let line = line_of(node);
    match expr.kind() {
        "call_expression" => {
            let function = expr.child_by_field_name("function")?;
            let name = callee_name(function, source)?.to_string();
            let arguments = call_arguments(expr)
                .into_iter()
                .map(|arg| decorator_arg(arg, source))
                .collect();
            Some(Decorator {
                name,
                arguments,
                line,
            })
        }
        "identifier" | "member_expression" => Some(Decorator {
            name: callee_name(expr, source)?.to_string(),
            arguments: Vec::new(),
            line,
        }),
        _ => None,
    }
}

/// All decorator records attached to a declaration node.
pub fn decorators(node: Node, source: &[u8]) -> Vec<Decorator> {
    decorator_nodes(node)
        .into_iter()
        .filter_map(|d| decorator_record(d, source))
        .collect()
}

/// Convert an expression node into a [`DecoratorArg`].
pub fn decorator_arg(node: Node, source: &[u8]) -> DecoratorArg {
    let node = unwrap_expression(node);
    match node.kind() {
        "string" | "template_string" => match string_value(node, source) {
            Some(s) => DecoratorArg::Str(s),
            None => DecoratorArg::Other(text(node, source).to_string()),
        },
        "number" => match text(node, source).replace('_', "").parse::<f64>() {
            Ok(n) => DecoratorArg::Number(n),
            Err(_) => DecoratorArg::Other(text(node, source).to_string()),
        },
        "true" => DecoratorArg::Bool(true),
        "false" => DecoratorArg::Bool(false),
        "identifier" => DecoratorArg::Ident(text(node, source).to_string()),
        "member_expression" => DecoratorArg::Ident(text(node, source).to_string()),
        "call_expression" => {
            let callee = node
                .child_by_field_name("function")
                .map(|f| call_target(f, source))
                .unwrap_or_default();
            DecoratorArg::Call {
                callee,
                arguments: call_arguments(node)
                    .into_iter()
                    .map(|a| decorator_arg(a, source))
                    .collect(),
            }
        }
        "new_expression" => {
            let class = node
                .child_by_field_name("constructor")
                .map(|c| text(c, source).to_string())
                .unwrap_or_default();
            DecoratorArg::New {
                class,
                arguments: call_arguments(node)
                    .into_iter()
                    .map(|a| decorator_arg(a, source))
                    .collect(),
            }
        }
        "array" => DecoratorArg::Array(
            named_children(node)
                .into_iter()
                .map(|c| decorator_arg(c, source))
                .collect(),
        ),
        "object" => {
            let mut entries = Vec::new();
            for child in named_children(node) {
                match child.kind() {
                    "pair" => {
                        if let (Some(key), Some(value)) =
                            (property_key(child, source), child.child_by_field_name("value"))
                        {
                            entries.push((key, decorator_arg(value, source)));
                        }
                    }
                    "shorthand_property_identifier" => {
                        let name = text(child, source).to_string();
                        entries.push((name.clone(), DecoratorArg::Ident(name)));
                    }
                    _ => {}
                }
            }
            DecoratorArg::Object(entries)
        }
        "arrow_function" => match node.child_by_field_name("body") {
            Some(body) if body.kind() != "statement_block" => {
                DecoratorArg::Arrow(Box::new(decorator_arg(body, source)))
            }
            _ => DecoratorArg::Other(text(node, source).to_string()),
        },
        _ => DecoratorArg::Other(text(node, source).to_string()),
    }
}

/// Callee of a call used as a value: `AuthGuard('jwt')` -> `AuthGuard`,
/// `ConfigModule.forRoot()` -> `ConfigModule.forRoot`.
fn call_target(function: Node, source: &[u8]) -> String {
    text(function, source).to_string()
}

// =============================================================================
// Local bindings
// =============================================================================

/// Declaration a local identifier refers to.
#[derive(Debug, Clone, Copy)]
pub enum LocalBinding<'t> {
    /// A `variable_declarator` (`const x: T = value`).
    Variable(Node<'t>),
    /// A function parameter (`required_parameter` / `optional_parameter`).
    Parameter(Node<'t>),
    /// A `function_declaration`.
    Function(Node<'t>),
}

/// Resolve `name` as seen from `at` by walking enclosing scopes outwards.
///
/// Only declarations that appear before `at` in their block are considered.
pub fn resolve_local<'t>(at: Node<'t>, name: &str, source: &[u8]) -> Option<LocalBinding<'t>> {
    let mut scope = at.parent();
    while let Some(node) = scope {
        if is_function(node) {
            if let Some(param) = find_parameter(node, name, source) {
                return Some(LocalBinding::Parameter(param));
            }
        }
        if matches!(node.kind(), "statement_block" | "program" | "class_body") {
            if let Some(binding) = find_in_block(node, at, name, source) {
                return Some(binding);
            }
        }
        scope = node.parent();
    }
    None
}

fn find_parameter<'t>(function: Node<'t>, name: &str, source: &[u8]) -> Option<Node<'t>> {
    let params = function.child_by_field_name("parameters")?;
    named_children(params).into_iter().find(|p| {
        matches!(p.kind(), "required_parameter" | "optional_parameter")
            && p.child_by_field_name("pattern")
                .map(|pat| text(pat, source) == name)
                .unwrap_or(false)
    })
}

fn find_in_block<'t>(
    block: Node<'t>,
    at: Node<'t>,
    name: &str,
    source: &[u8],
) -> Option<LocalBinding<'t>> {
    let mut found = None;
    for statement in named_children(block) {
        if statement.start_byte() > at.start_byte() {
            break;
        }
        let statement = if statement.kind() == "export_statement" {
            match statement.child_by_field_name("declaration") {
                Some(decl) => decl,
                None => continue,
            }
        } else {
            statement
        };
        match statement.kind() {
            "lexical_declaration" | "variable_declaration" => {
                for declarator in named_children(statement)
                    .into_iter()
                    .filter(|c| c.kind() == "variable_declarator")
                {
                    let matches = declarator
                        .child_by_field_name("name")
                        .map(|n| n.kind() == "identifier" && text(n, source) == name)
                        .unwrap_or(false);
                    if matches {
                        found = Some(LocalBinding::Variable(declarator));
                    }
                }
            }
            "function_declaration" => {
                let matches = statement
                    .child_by_field_name("name")
                    .map(|n| text(n, source) == name)
                    .unwrap_or(false);
                if matches {
                    found = Some(LocalBinding::Function(statement));
                }
            }
            _ => {}
        }
    }
    found
}

/// Type annotation node (the type itself, not the `: T` wrapper) of a
/// declarator, parameter, field or property signature.
pub fn declared_type(node: Node) -> Option<Node> {
    let annotation = node.child_by_field_name("type")?;
    if annotation.kind() == "type_annotation" {
        named_children(annotation).into_iter().next()
    } else {
        Some(annotation)
    }
}

/// Return type node of a function-like declaration.
pub fn return_type(function: Node) -> Option<Node> {
    let annotation = function.child_by_field_name("return_type")?;
    if annotation.kind() == "type_annotation" {
        named_children(annotation).into_iter().next()
    } else {
        Some(annotation)
    }
}

/// Whether a declaration node carries a `?` optionality marker.
pub fn has_question_token(node: Node) -> bool {
    let mut cursor = node.walk();
    let found = node.children(&mut cursor).any(|c| c.kind() == "?");
    found || node.kind() == "optional_parameter"
}

// =============================================================================
// Classes
// =============================================================================

/// Base-class expression of a class declaration, if any.
pub fn base_clause(class: Node, source: &[u8]) -> Option<BaseClause> {
    let heritage = named_children(class)
        .into_iter()
        .find(|c| c.kind() == "class_heritage")?;
    let extends = named_children(heritage)
        .into_iter()
        .find(|c| c.kind() == "extends_clause")?;
    let value = extends
        .child_by_field_name("value")
        .or_else(|| named_children(extends).into_iter().next())?;

    Some(match value.kind() {
        "identifier" => BaseClause::Name(text(value, source).to_string()),
        "call_expression" => match value.child_by_field_name("function") {
            Some(f) if f.kind() == "identifier" => BaseClause::Call {
                callee: text(f, source).to_string(),
            },
            _ => BaseClause::Other(text(value, source).to_string()),
        },
        _ => BaseClause::Other(text(value, source).to_string()),
    })
}

/// Methods declared directly in a class body.
pub fn class_methods<'t>(class: Node<'t>) -> Vec<Node<'t>> {
    class
        .child_by_field_name("body")
        .map(|body| {
            named_children(body)
                .into_iter()
                .filter(|c| c.kind() == "method_definition")
                .collect()
        })
        .unwrap_or_default()
}

pub fn is_class(node: Node) -> bool {
    matches!(
        node.kind(),
        "class_declaration" | "abstract_class_declaration" | "class"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::parse_typescript;

    fn first_of_kind<'t>(node: Node<'t>, kind: &str) -> Option<Node<'t>> {
        if node.kind() == kind {
            return Some(node);
        }
        let mut cursor = node.walk();
        let children: Vec<_> = node.children(&mut cursor).collect();
        children.into_iter().find_map(|c| first_of_kind(c, kind))
    }

    #[test]
    fn test_string_value_strips_quotes() {
        let parsed = parse_typescript("const a = 'hello'; const b = `x`;").unwrap();
        let root = parsed.tree.root_node();
        let s = first_of_kind(root, "string").unwrap();
        assert_eq!(string_value(s, &parsed.source).as_deref(), Some("hello"));
        let t = first_of_kind(root, "template_string").unwrap();
        assert_eq!(string_value(t, &parsed.source).as_deref(), Some("x"));
    }

    #[test]
    fn test_exported_class_decorators() {
        let src = r#"
@Controller('users')
@UseGuards(JwtAuthGuard, AuthGuard('jwt'))
export class UsersController extends Base {}
"#;
        let parsed = parse_typescript(src).unwrap();
        let class = first_of_kind(parsed.tree.root_node(), "class_declaration").unwrap();
        let decs = decorators(class, &parsed.source);
        let names: Vec<_> = decs.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["Controller", "UseGuards"]);
        assert_eq!(decs[0].first_string(), Some("users"));
        let guards: Vec<_> = decs[1]
            .arguments
            .iter()
            .filter_map(DecoratorArg::referenced_name)
            .collect();
        assert_eq!(guards, vec!["JwtAuthGuard", "AuthGuard"]);
        assert_eq!(
            base_clause(class, &parsed.source),
            Some(BaseClause::Name("Base".into()))
        );
    }

    #[test]
    fn test_method_decorators() {
        let src = r#"
class C {
  @Get(':id')
  @Public()
  findOne(@Param('id') id: string) {}

  @Post()
  create() {}
}
"#;
        let parsed = parse_typescript(src).unwrap();
        let class = first_of_kind(parsed.tree.root_node(), "class_declaration").unwrap();
        let methods = class_methods(class);
        assert_eq!(methods.len(), 2);
        let first: Vec<_> = decorators(methods[0], &parsed.source)
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(first, vec!["Get", "Public"]);
        let second: Vec<_> = decorators(methods[1], &parsed.source)
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(second, vec!["Post"]);
    }

    #[test]
    fn test_base_clause_factory_call() {
        let parsed = parse_typescript("class J extends AuthGuard('jwt') {}").unwrap();
        let class = first_of_kind(parsed.tree.root_node(), "class_declaration").unwrap();
        assert_eq!(
            base_clause(class, &parsed.source),
            Some(BaseClause::Call {
                callee: "AuthGuard".into()
            })
        );
    }

    #[test]
    fn test_object_property_lookup() {
        let parsed =
            parse_typescript("x({ prefix: '/users', preHandler })").unwrap();
        let obj = first_of_kind(parsed.tree.root_node(), "object").unwrap();
        let prefix = object_property(obj, "prefix", &parsed.source).unwrap();
        assert_eq!(string_value(prefix, &parsed.source).as_deref(), Some("/users"));
        let shorthand = object_property(obj, "preHandler", &parsed.source).unwrap();
        assert_eq!(shorthand.kind(), "shorthand_property_identifier");
        assert!(object_property(obj, "missing", &parsed.source).is_none());
    }
}
