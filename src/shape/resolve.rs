//! Resolve TypeScript type syntax into [`TypeShape`]s.

use tree_sitter::Node;

use super::{Member, TypeShape};
use crate::analysis::syntax::{self, named_children, text};
use crate::analysis::{AnalysisContext, DeclarationKind, SourceFile, TypeDeclRef, TypeLookup};

/// Hard cap on nested reference expansion.
const MAX_RESOLVE_DEPTH: usize = 12;

const PRIMITIVES: &[&str] = &[
    "string", "number", "boolean", "null", "undefined", "any", "unknown", "void", "never",
    "object", "bigint", "symbol",
];

/// Names that are never expanded into members.
const OPAQUE_BUILTINS: &[&str] = &[
    "Promise", "Observable", "Date", "RegExp", "Error", "Map", "Set", "WeakMap", "WeakSet",
    "Record", "Pick", "Omit", "Buffer", "Function", "Object",
];

/// Turns type syntax into shapes using the project-wide declaration index.
pub struct TypeResolver<'a> {
    context: &'a AnalysisContext,
}

impl<'a> TypeResolver<'a> {
    pub fn new(context: &'a AnalysisContext) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &'a AnalysisContext {
        self.context
    }

    /// Resolve a type node written in `file`.
    ///
    /// `node` may be a `type_annotation` wrapper or the type itself.
    pub fn resolve_type_node(&self, file: &SourceFile, node: Node) -> TypeShape {
        let mut stack = Vec::new();
        self.type_node(file, node, &mut stack, 0)
    }

    /// Resolve a type name as written in `file`.
    pub fn resolve_name(&self, file: &SourceFile, name: &str) -> TypeShape {
        let mut stack = Vec::new();
        self.reference(file, name, Vec::new(), &mut stack, 0)
    }

    fn type_node(
        &self,
        file: &SourceFile,
        node: Node,
        stack: &mut Vec<String>,
        depth: usize,
    ) -> TypeShape {
        let source = &file.parsed.source[..];
        if depth > MAX_RESOLVE_DEPTH {
            return TypeShape::named(text(node, source));
        }

        match node.kind() {
            "type_annotation" | "parenthesized_type" | "readonly_type" => {
                match named_children(node).into_iter().last() {
                    Some(inner) => self.type_node(file, inner, stack, depth),
                    None => TypeShape::unknown(),
                }
            }
            "predefined_type" => TypeShape::primitive(text(node, source)),
            "literal_type" => literal(node, source),
            "type_identifier" | "identifier" => {
                self.reference(file, text(node, source), Vec::new(), stack, depth)
            }
            "nested_type_identifier" => TypeShape::named(text(node, source)),
            "generic_type" => {
                let name = node
                    .child_by_field_name("name")
                    .map(|n| text(n, source).to_string())
                    .unwrap_or_default();
                let args: Vec<Node> = named_children(node)
                    .into_iter()
                    .find(|c| c.kind() == "type_arguments")
                    .map(named_children)
                    .unwrap_or_default();
                let args = args
                    .into_iter()
                    .map(|a| self.type_node(file, a, stack, depth + 1))
                    .collect();
                self.reference(file, &name, args, stack, depth)
            }
            "array_type" => match named_children(node).into_iter().next() {
                Some(element) => {
                    TypeShape::Array(Box::new(self.type_node(file, element, stack, depth + 1)))
                }
                None => TypeShape::Array(Box::new(TypeShape::unknown())),
            },
            "union_type" => TypeShape::union(
                named_children(node)
                    .into_iter()
                    .map(|c| self.type_node(file, c, stack, depth))
                    .collect(),
            ),
            "intersection_type" => {
                let parts: Vec<TypeShape> = named_children(node)
                    .into_iter()
                    .map(|c| self.type_node(file, c, stack, depth))
                    .collect();
                merge_objects(parts).unwrap_or_else(|| TypeShape::named(text(node, source)))
            }
            "object_type" | "interface_body" => TypeShape::Object {
                name: None,
                members: self.signature_members(file, node, stack, depth),
            },
            _ => {
                let raw = text(node, source);
                if PRIMITIVES.contains(&raw) {
                    TypeShape::primitive(raw)
                } else {
                    TypeShape::named(raw)
                }
            }
        }
    }

    fn reference(
        &self,
        file: &SourceFile,
        name: &str,
        mut args: Vec<TypeShape>,
        stack: &mut Vec<String>,
        depth: usize,
    ) -> TypeShape {
        if PRIMITIVES.contains(&name) {
            return TypeShape::primitive(name);
        }

        match name {
            "Array" | "ReadonlyArray" if args.len() == 1 => {
                return TypeShape::Array(Box::new(args.remove(0)));
            }
            "Partial" | "Required" | "Readonly" if args.len() == 1 => {
                return match (name, args.remove(0)) {
                    ("Partial", TypeShape::Object { name: declared, members }) => {
                        TypeShape::Object {
                            name: declared,
                            members: members
                                .into_iter()
                                .map(|m| Member { optional: true, ..m })
                                .collect(),
                        }
                    }
                    ("Required", TypeShape::Object { name: declared, members }) => {
                        TypeShape::Object {
                            name: declared,
                            members: members
                                .into_iter()
                                .map(|m| Member { optional: false, ..m })
                                .collect(),
                        }
                    }
                    (_, other) => other,
                };
            }
            _ => {}
        }

        if OPAQUE_BUILTINS.contains(&name) {
            return TypeShape::Named {
                name: name.to_string(),
                module: None,
                args,
            };
        }

        if stack.iter().any(|s| s == name) || depth > MAX_RESOLVE_DEPTH {
            return TypeShape::named(name);
        }

        match self.context.resolve_type(&file.parsed.path, name) {
            TypeLookup::Found(decl) => {
                stack.push(name.to_string());
                let shape = self.declaration(decl, name, stack, depth + 1);
                stack.pop();
                shape
            }
            TypeLookup::Package(module) => TypeShape::Named {
                name: name.to_string(),
                module: Some(module),
                args,
            },
            TypeLookup::NotFound => TypeShape::Named {
                name: name.to_string(),
                module: None,
                args,
            },
        }
    }

    fn declaration(
        &self,
        decl: TypeDeclRef<'a>,
        name: &str,
        stack: &mut Vec<String>,
        depth: usize,
    ) -> TypeShape {
        let Some(node) = decl.node() else {
            return TypeShape::named(name);
        };
        let file = decl.file;

        match decl.kind {
            DeclarationKind::Interface => {
                let mut members = Vec::new();
                for base in interface_bases(node) {
                    if let TypeShape::Object { members: inherited, .. } =
                        self.type_node(file, base, stack, depth)
                    {
                        members.extend(inherited);
                    }
                }
                if let Some(body) = node.child_by_field_name("body") {
                    for member in self.signature_members(file, body, stack, depth) {
                        members.retain(|m: &Member| m.name != member.name);
                        members.push(member);
                    }
                }
                TypeShape::Object {
                    name: Some(name.to_string()),
                    members,
                }
            }
            DeclarationKind::TypeAlias => match node.child_by_field_name("value") {
                Some(value) => match self.type_node(file, value, stack, depth) {
                    TypeShape::Object { name: None, members } => TypeShape::Object {
                        name: Some(name.to_string()),
                        members,
                    },
                    other => other,
                },
                None => TypeShape::named(name),
            },
            DeclarationKind::Class => TypeShape::Object {
                name: Some(name.to_string()),
                members: self.class_fields(file, node, stack, depth),
            },
            DeclarationKind::Enum | DeclarationKind::Function => TypeShape::named(name),
        }
    }

    /// Members of an `object_type` / `interface_body`.
    fn signature_members(
        &self,
        file: &SourceFile,
        body: Node,
        stack: &mut Vec<String>,
        depth: usize,
    ) -> Vec<Member> {
        let source = &file.parsed.source[..];
        let mut members = Vec::new();
        for child in named_children(body) {
            if child.kind() != "property_signature" {
                continue;
            }
            let Some(name) = member_name(child, source) else {
                continue;
            };
            let shape = match syntax::declared_type(child) {
                Some(ty) => self.type_node(file, ty, stack, depth + 1),
                None => TypeShape::primitive("any"),
            };
            members.push(Member::new(name, shape, syntax::has_question_token(child)));
        }
        members
    }

    /// Public instance fields of a class, e.g. a request DTO.
    fn class_fields(
        &self,
        file: &SourceFile,
        class: Node,
        stack: &mut Vec<String>,
        depth: usize,
    ) -> Vec<Member> {
        let source = &file.parsed.source[..];
        let Some(body) = class.child_by_field_name("body") else {
            return Vec::new();
        };

        let mut members = Vec::new();
        for field in named_children(body)
            .into_iter()
            .filter(|c| c.kind() == "public_field_definition")
        {
            if is_hidden_field(field, source) {
                continue;
            }
            let Some(name) = member_name(field, source) else {
                continue;
            };
            let shape = match syntax::declared_type(field) {
                Some(ty) => self.type_node(file, ty, stack, depth + 1),
                None => field
                    .child_by_field_name("value")
                    .map(|v| literal_value_shape(v))
                    .unwrap_or_else(|| TypeShape::primitive("any")),
            };
            members.push(Member::new(name, shape, syntax::has_question_token(field)));
        }
        members
    }
}

fn literal(node: Node, source: &[u8]) -> TypeShape {
    let Some(inner) = named_children(node).into_iter().next() else {
        return TypeShape::primitive(text(node, source));
    };
    match inner.kind() {
        "string" => match syntax::string_value(inner, source) {
            Some(value) => TypeShape::Literal(format!("'{}'", value)),
            None => TypeShape::primitive("string"),
        },
        "null" => TypeShape::primitive("null"),
        "undefined" => TypeShape::primitive("undefined"),
        _ => TypeShape::Literal(text(inner, source).to_string()),
    }
}

/// Widened shape of an initializer literal (`= 'x'` -> `string`).
fn literal_value_shape(value: Node) -> TypeShape {
    match value.kind() {
        "string" | "template_string" => TypeShape::primitive("string"),
        "number" => TypeShape::primitive("number"),
        "true" | "false" => TypeShape::primitive("boolean"),
        "array" => TypeShape::Array(Box::new(TypeShape::unknown())),
        _ => TypeShape::primitive("any"),
    }
}

fn member_name(node: Node, source: &[u8]) -> Option<String> {
    let name = node.child_by_field_name("name")?;
    match name.kind() {
        "property_identifier" | "private_property_identifier" | "identifier" => {
            Some(text(name, source).to_string())
        }
        "string" => syntax::string_value(name, source),
        "number" => Some(text(name, source).to_string()),
        _ => None,
    }
}

fn is_hidden_field(field: Node, source: &[u8]) -> bool {
    let mut cursor = field.walk();
    let hidden = field.children(&mut cursor).any(|c| match c.kind() {
        "accessibility_modifier" => matches!(text(c, source), "private" | "protected"),
        "static" => true,
        _ => false,
    });
    hidden
        || field
            .child_by_field_name("name")
            .map(|n| n.kind() == "private_property_identifier")
            .unwrap_or(false)
}

fn interface_bases(interface: Node) -> Vec<Node> {
    named_children(interface)
        .into_iter()
        .filter(|c| c.kind() == "extends_type_clause")
        .flat_map(named_children)
        .collect()
}

fn merge_objects(parts: Vec<TypeShape>) -> Option<TypeShape> {
    let mut members: Vec<Member> = Vec::new();
    for part in parts {
        match part {
            TypeShape::Object { members: more, .. } => {
                for member in more {
                    members.retain(|m| m.name != member.name);
                    members.push(member);
                }
            }
            _ => return None,
        }
    }
    Some(TypeShape::Object {
        name: None,
        members,
    })
}
