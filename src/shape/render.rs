//! Render shapes as parameter lists and type strings.
//!
//! The rendered grammar is closed: `primitive | 'literal' | T[] | A | B |
//! { field: T; }`. Transport-layer types and members are filtered so that
//! request/reply plumbing never shows up as user data.

use lazy_static::lazy_static;
use std::collections::HashSet;

use super::{Member, TypeShape};
use crate::model::ParamInfo;

/// Substrings identifying framework transport types by name.
const FRAMEWORK_TYPE_PATTERNS: &[&str] = &[
    "Fastify",
    "Raw",
    "RouteGeneric",
    "ContextConfig",
    "FastifyReply",
    "FastifyRequest",
    "FastifyInstance",
    "FastifySchema",
    "RouteGenericInterface",
    "RawServerDefault",
    "RawRequestDefaultExpression",
    "RawReplyDefaultExpression",
    "ContextConfigDefault",
];

/// Module specifiers whose types are framework internals.
const FRAMEWORK_MODULES: &[&str] = &["fastify", "@fastify/"];

/// Names whose members are never enumerated.
const BUILTIN_TYPES: &[&str] = &[
    "Promise", "Date", "RegExp", "Error", "Map", "Set", "WeakMap", "WeakSet",
];

lazy_static! {
    /// Members of request/reply/instance objects. Common data names such as
    /// `id`, `body`, `url` or `type` are deliberately absent.
    static ref FRAMEWORK_MEMBERS: HashSet<&'static str> = [
        // reply
        "context", "log", "request", "server", "raw", "res", "req", "sent", "hijacked",
        "statusCode", "getHeaders", "hasHeader", "removeHeader", "getHeader", "redirect",
        "callNotFound", "serialize", "compileSerializationSchema", "getSerializationFunction",
        "serializeInput", "elapsedTime", "trailer", "hasTrailer", "removeTrailer", "then",
        // request
        "routerPath", "routerMethod", "is404", "socket", "ips", "routeOptions", "routeConfig",
        "routeSchema", "connection", "getValidationFunction", "compileValidationSchema",
        "validateInput",
        // instance
        "prefix", "listeningOrigin", "addresses", "pluginName", "setNotFoundHandler",
        "setErrorHandler", "addHook", "decorateRequest", "decorateReply", "decorate",
        "hasDecorator", "hasRequestDecorator", "hasReplyDecorator", "inject", "listen", "route",
        "close", "ready", "register", "after", "setValidatorCompiler", "setSerializerCompiler",
        // logger
        "child", "fatal", "warn", "info", "debug", "trace", "silent",
    ]
    .into_iter()
    .collect();

    static ref ARRAY_METHODS: HashSet<&'static str> = [
        "length", "toString", "toLocaleString", "pop", "push", "concat", "join", "reverse",
        "shift", "slice", "sort", "splice", "unshift", "indexOf", "lastIndexOf", "every",
        "some", "forEach", "map", "filter", "reduce", "reduceRight", "find", "findIndex",
        "fill", "copyWithin", "entries", "keys", "values", "includes", "flatMap", "flat", "at",
        "findLast", "findLastIndex", "toReversed", "toSorted", "toSpliced", "with",
    ]
    .into_iter()
    .collect();
}

pub fn is_framework_type(name: &str) -> bool {
    FRAMEWORK_TYPE_PATTERNS.iter().any(|p| name.contains(p))
}

pub fn is_framework_module(module: &str) -> bool {
    FRAMEWORK_MODULES
        .iter()
        .any(|m| module == m.trim_end_matches('/') || module.starts_with(m))
        || module.contains("node_modules/fastify")
        || module.contains("node_modules/@fastify")
}

fn is_container_member(name: &str) -> bool {
    name.starts_with("__@") || ARRAY_METHODS.contains(name)
}

/// Renders shapes with a nesting cap.
#[derive(Debug, Clone)]
pub struct ShapeRenderer {
    depth_limit: usize,
}

impl ShapeRenderer {
    pub fn new(depth_limit: usize) -> Self {
        Self {
            depth_limit: depth_limit.max(1),
        }
    }

    fn is_suppressed(&self, name: &str) -> bool {
        is_container_member(name) || FRAMEWORK_MEMBERS.contains(name)
    }

    fn is_elided(&self, shape: &TypeShape) -> bool {
        match shape {
            TypeShape::Named { name, module, .. } => {
                BUILTIN_TYPES.contains(&name.as_str())
                    || is_framework_type(name)
                    || module.as_deref().map(is_framework_module).unwrap_or(false)
            }
            TypeShape::Object {
                name: Some(name), ..
            } => is_framework_type(name),
            _ => false,
        }
    }

    fn visible_members<'s>(
        &'s self,
        members: &'s [Member],
    ) -> impl Iterator<Item = &'s Member> + 's {
        members.iter().filter(move |m| !self.is_suppressed(&m.name))
    }

    /// Flatten a shape into named fields.
    pub fn extract_properties(&self, shape: &TypeShape) -> Vec<ParamInfo> {
        match shape {
            TypeShape::Primitive(_) | TypeShape::Literal(_) => Vec::new(),
            TypeShape::Array(element) => {
                vec![ParamInfo::new("items", self.format_array(element, 1), true)]
            }
            TypeShape::Named { .. } => Vec::new(),
            TypeShape::Union(variants) => {
                let mut concrete = variants.iter().filter(|v| !v.is_nullish());
                match (concrete.next(), concrete.next()) {
                    (Some(only), None) => self.extract_properties(only),
                    _ => Vec::new(),
                }
            }
            TypeShape::Object { .. } if self.is_elided(shape) => Vec::new(),
            TypeShape::Object { members, .. } => self
                .visible_members(members)
                .map(|m| ParamInfo::new(m.name.clone(), self.format_at(&m.shape, 1), !m.optional))
                .collect(),
        }
    }

    /// Render a shape as a type string.
    pub fn format(&self, shape: &TypeShape) -> String {
        self.format_at(shape, 0)
    }

    fn format_at(&self, shape: &TypeShape, depth: usize) -> String {
        match shape {
            TypeShape::Primitive(name) | TypeShape::Literal(name) => name.clone(),
            TypeShape::Named { name, args, .. } => {
                if args.is_empty() || is_framework_type(name) {
                    name.clone()
                } else {
                    let rendered: Vec<String> =
                        args.iter().map(|a| self.format_at(a, depth + 1)).collect();
                    format!("{}<{}>", name, rendered.join(", "))
                }
            }
            TypeShape::Array(element) => self.format_array(element, depth),
            TypeShape::Union(variants) => {
                join_variants(variants.iter().map(|v| self.format_at(v, depth)))
            }
            TypeShape::Object { name, members } => {
                if self.is_elided(shape) {
                    return name.clone().unwrap_or_else(|| "object".to_string());
                }
                if depth >= self.depth_limit {
                    return name.clone().unwrap_or_else(|| "object".to_string());
                }
                let fields: Vec<String> = self
                    .visible_members(members)
                    .map(|m| format!("{}: {}", m.name, self.format_at(&m.shape, depth + 1)))
                    .collect();
                if fields.is_empty() {
                    return name.clone().unwrap_or_else(|| "{}".to_string());
                }
                format!("{{ {}; }}", fields.join("; "))
            }
        }
    }

    /// `T[]`; an array of a union distributes as `A[] | B[]`.
    fn format_array(&self, element: &TypeShape, depth: usize) -> String {
        match element {
            TypeShape::Union(variants) => join_variants(
                variants
                    .iter()
                    .map(|v| format!("{}[]", self.format_at(v, depth))),
            ),
            _ => format!("{}[]", self.format_at(element, depth)),
        }
    }
}

/// `A | B`, dropping repeated renderings.
fn join_variants(rendered: impl Iterator<Item = String>) -> String {
    let mut seen: Vec<String> = Vec::new();
    for variant in rendered {
        if !seen.contains(&variant) {
            seen.push(variant);
        }
    }
    seen.join(" | ")
}

impl Default for ShapeRenderer {
    fn default() -> Self {
        Self::new(2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object(name: Option<&str>, members: Vec<Member>) -> TypeShape {
        TypeShape::Object {
            name: name.map(String::from),
            members,
        }
    }

    #[test]
    fn test_primitives_have_no_properties() {
        let renderer = ShapeRenderer::default();
        assert!(renderer.extract_properties(&TypeShape::primitive("string")).is_empty());
        assert!(renderer.extract_properties(&TypeShape::primitive("null")).is_empty());
        assert_eq!(renderer.format(&TypeShape::primitive("undefined")), "undefined");
    }

    #[test]
    fn test_array_becomes_items() {
        let renderer = ShapeRenderer::default();
        let shape = TypeShape::Array(Box::new(object(
            Some("User"),
            vec![Member::new("id", TypeShape::primitive("number"), false)],
        )));
        assert_eq!(
            renderer.extract_properties(&shape),
            vec![ParamInfo::new("items", "{ id: number; }[]", true)]
        );
    }

    #[test]
    fn test_object_members_and_optionality() {
        let renderer = ShapeRenderer::default();
        let shape = object(
            Some("CreateUser"),
            vec![
                Member::new("name", TypeShape::primitive("string"), false),
                Member::new(
                    "role",
                    TypeShape::Union(vec![
                        TypeShape::Literal("'admin'".into()),
                        TypeShape::Literal("'user'".into()),
                    ]),
                    true,
                ),
            ],
        );
        assert_eq!(
            renderer.extract_properties(&shape),
            vec![
                ParamInfo::new("name", "string", true),
                ParamInfo::new("role", "'admin' | 'user'", false),
            ]
        );
    }

    #[test]
    fn test_framework_types_are_elided() {
        let renderer = ShapeRenderer::default();
        let by_name = TypeShape::named("FastifyRequest");
        assert!(renderer.extract_properties(&by_name).is_empty());

        let by_module = TypeShape::Named {
            name: "RouteShorthandOptions".into(),
            module: Some("fastify".into()),
            args: Vec::new(),
        };
        assert!(renderer.extract_properties(&by_module).is_empty());
        assert_eq!(renderer.format(&by_module), "RouteShorthandOptions");

        let plugin = TypeShape::Named {
            name: "Cookie".into(),
            module: Some("@fastify/cookie".into()),
            args: Vec::new(),
        };
        assert!(renderer.is_elided(&plugin));
    }

    #[test]
    fn test_internal_and_container_members_filtered() {
        let renderer = ShapeRenderer::default();
        let shape = object(
            None,
            vec![
                Member::new("id", TypeShape::primitive("number"), false),
                Member::new("log", TypeShape::named("Logger"), false),
                Member::new("length", TypeShape::primitive("number"), false),
                Member::new("__@iterator", TypeShape::unknown(), false),
            ],
        );
        let names: Vec<_> = renderer
            .extract_properties(&shape)
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["id"]);
    }

    #[test]
    fn test_depth_limit_stops_nesting() {
        let renderer = ShapeRenderer::new(2);
        let innermost = object(
            Some("Geo"),
            vec![Member::new("lat", TypeShape::primitive("number"), false)],
        );
        let address = object(
            Some("Address"),
            vec![
                Member::new("city", TypeShape::primitive("string"), false),
                Member::new("geo", innermost, false),
            ],
        );
        let user = object(None, vec![Member::new("address", address, false)]);
        assert_eq!(
            renderer.extract_properties(&user),
            vec![ParamInfo::new("address", "{ city: string; geo: Geo; }", true)]
        );
    }

    #[test]
    fn test_array_of_union_distributes() {
        let renderer = ShapeRenderer::default();
        let shape = TypeShape::Array(Box::new(TypeShape::Union(vec![
            TypeShape::primitive("string"),
            TypeShape::primitive("number"),
            TypeShape::primitive("string"),
        ])));
        assert_eq!(renderer.format(&shape), "string[] | number[]");
        assert_eq!(
            renderer.extract_properties(&shape),
            vec![ParamInfo::new("items", "string[] | number[]", true)]
        );
    }

    #[test]
    fn test_nullable_object_unwraps() {
        let renderer = ShapeRenderer::default();
        let shape = TypeShape::Union(vec![
            object(None, vec![Member::new("ok", TypeShape::primitive("boolean"), false)]),
            TypeShape::primitive("null"),
        ]);
        assert_eq!(
            renderer.extract_properties(&shape),
            vec![ParamInfo::new("ok", "boolean", true)]
        );
    }
}
