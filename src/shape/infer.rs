//! Shapes of value expressions (handler returns, `reply.send(x)` payloads).

use std::collections::HashMap;

use tree_sitter::Node;

use super::{Member, TypeResolver, TypeShape};
use crate::analysis::syntax::{self, named_children, text, LocalBinding};
use crate::analysis::{AnalysisContext, DeclarationKind, ModuleTarget, SourceFile};

/// Depth cap for nested expression inference.
const MAX_INFER_DEPTH: usize = 8;

/// Infers expression shapes within one file.
///
/// Results are memoized per node for the lifetime of the typer, so repeated
/// lookups of the same identifier or call are resolved once.
pub struct ExpressionTyper<'a> {
    resolver: TypeResolver<'a>,
    file: &'a SourceFile,
    cache: HashMap<usize, TypeShape>,
}

impl<'a> ExpressionTyper<'a> {
    pub fn new(context: &'a AnalysisContext, file: &'a SourceFile) -> Self {
        Self {
            resolver: TypeResolver::new(context),
            file,
            cache: HashMap::new(),
        }
    }

    pub fn file(&self) -> &'a SourceFile {
        self.file
    }

    /// Shape of `node`, with `Promise<T>` unwrapped as an `async` handler
    /// would deliver it.
    pub fn infer_response(&mut self, node: Node<'a>) -> TypeShape {
        self.infer(node).unwrap_async()
    }

    pub fn infer(&mut self, node: Node<'a>) -> TypeShape {
        self.infer_at(node, 0)
    }

    /// Resolve a type annotation node written in this file.
    pub fn resolve_type(&self, node: Node<'a>) -> TypeShape {
        self.resolver.resolve_type_node(self.file, node)
    }

    fn infer_at(&mut self, node: Node<'a>, depth: usize) -> TypeShape {
        let node = syntax::unwrap_expression(node);
        if depth > MAX_INFER_DEPTH {
            return TypeShape::unknown();
        }
        if let Some(cached) = self.cache.get(&node.id()) {
            return cached.clone();
        }
        let shape = self.compute(node, depth);
        self.cache.insert(node.id(), shape.clone());
        shape
    }

    fn compute(&mut self, node: Node<'a>, depth: usize) -> TypeShape {
        let file = self.file;
        let source = &file.parsed.source[..];
        match node.kind() {
            "object" => self.object_literal(node, depth),
            "array" => {
                let elements: Vec<TypeShape> = named_children(node)
                    .into_iter()
                    .filter(|c| c.kind() != "spread_element")
                    .map(|c| self.infer_at(c, depth + 1))
                    .collect();
                TypeShape::Array(Box::new(TypeShape::union(elements)))
            }
            "string" | "template_string" => TypeShape::primitive("string"),
            "number" => TypeShape::primitive("number"),
            "true" | "false" => TypeShape::primitive("boolean"),
            "null" => TypeShape::primitive("null"),
            "undefined" => TypeShape::primitive("undefined"),
            "identifier" | "shorthand_property_identifier" => self.identifier(node, depth),
            "await_expression" => match named_children(node).into_iter().next() {
                Some(inner) => self.infer_at(inner, depth + 1).unwrap_async(),
                None => TypeShape::unknown(),
            },
            "as_expression" => {
                let parts = named_children(node);
                match parts.get(1) {
                    Some(ty) => self.resolve_type(*ty),
                    None => self.first_child(node, depth),
                }
            }
            "satisfies_expression" => self.first_child(node, depth),
            "call_expression" => self.call(node),
            "new_expression" => match node.child_by_field_name("constructor") {
                Some(ctor) if ctor.kind() == "identifier" => {
                    self.resolver.resolve_name(self.file, text(ctor, source))
                }
                _ => TypeShape::unknown(),
            },
            "ternary_expression" => {
                let branches = ["consequence", "alternative"]
                    .iter()
                    .filter_map(|f| node.child_by_field_name(f))
                    .map(|b| self.infer_at(b, depth + 1))
                    .collect();
                TypeShape::union(branches)
            }
            "binary_expression" => self.binary(node, depth),
            "unary_expression" => match node.child_by_field_name("operator").map(|o| text(o, source)) {
                Some("!") => TypeShape::primitive("boolean"),
                Some("typeof") => TypeShape::primitive("string"),
                Some("void") => TypeShape::primitive("undefined"),
                _ => TypeShape::primitive("number"),
            },
            "member_expression" => {
                let (Some(object), Some(property)) = (
                    node.child_by_field_name("object"),
                    node.child_by_field_name("property"),
                ) else {
                    return TypeShape::unknown();
                };
                let owner = self.infer_at(object, depth + 1);
                match owner.member(text(property, source)) {
                    Some(member) => member.shape.clone(),
                    None if text(property, source) == "length" => TypeShape::primitive("number"),
                    None => TypeShape::unknown(),
                }
            }
            kind if syntax::is_function(node) || kind == "class" => TypeShape::named("Function"),
            _ => TypeShape::unknown(),
        }
    }

    fn first_child(&mut self, node: Node<'a>, depth: usize) -> TypeShape {
        match named_children(node).into_iter().next() {
            Some(expr) => self.infer_at(expr, depth + 1),
            None => TypeShape::unknown(),
        }
    }

    fn object_literal(&mut self, node: Node<'a>, depth: usize) -> TypeShape {
        let file = self.file;
        let source = &file.parsed.source[..];
        let mut members: Vec<Member> = Vec::new();

        for child in named_children(node) {
            match child.kind() {
                "pair" => {
                    let (Some(key), Some(value)) =
                        (syntax::property_key(child, source), child.child_by_field_name("value"))
                    else {
                        continue;
                    };
                    let shape = self.infer_at(value, depth + 1);
                    upsert(&mut members, Member::new(key, shape, false));
                }
                "shorthand_property_identifier" => {
                    let name = text(child, source).to_string();
                    let shape = self.infer_at(child, depth + 1);
                    upsert(&mut members, Member::new(name, shape, false));
                }
                "spread_element" => {
                    if let Some(inner) = named_children(child).into_iter().next() {
                        if let TypeShape::Object { members: spread, .. } =
                            self.infer_at(inner, depth + 1)
                        {
                            for member in spread {
                                upsert(&mut members, member);
                            }
                        }
                    }
                }
                _ => {}
            }
        }

        TypeShape::Object {
            name: None,
            members,
        }
    }

    fn identifier(&mut self, node: Node<'a>, depth: usize) -> TypeShape {
        let file = self.file;
        let source = &file.parsed.source[..];
        let name = text(node, source);
        if name == "undefined" {
            return TypeShape::primitive("undefined");
        }

        match syntax::resolve_local(node, name, source) {
            Some(LocalBinding::Variable(declarator)) => {
                if let Some(ty) = syntax::declared_type(declarator) {
                    return self.resolve_type(ty);
                }
                match declarator.child_by_field_name("value") {
                    Some(value) => self.infer_at(value, depth + 1),
                    None => TypeShape::unknown(),
                }
            }
            Some(LocalBinding::Parameter(param)) => match syntax::declared_type(param) {
                Some(ty) => self.resolve_type(ty),
                None => TypeShape::primitive("any"),
            },
            Some(LocalBinding::Function(_)) => TypeShape::named("Function"),
            None => TypeShape::unknown(),
        }
    }

    /// Call to a function whose declaration carries a return type.
    fn call(&mut self, node: Node<'a>) -> TypeShape {
        let file = self.file;
        let source = &file.parsed.source[..];
        let Some(function) = node.child_by_field_name("function") else {
            return TypeShape::unknown();
        };
        if function.kind() != "identifier" {
            return TypeShape::unknown();
        }
        let name = text(function, source);

        match syntax::resolve_local(node, name, source) {
            Some(LocalBinding::Function(decl)) => self.returned(self.file, decl),
            Some(LocalBinding::Variable(declarator)) => {
                match declarator.child_by_field_name("value") {
                    Some(value) if syntax::is_function(value) => self.returned(self.file, value),
                    _ => TypeShape::unknown(),
                }
            }
            Some(LocalBinding::Parameter(_)) => TypeShape::unknown(),
            None => self.imported_call(name),
        }
    }

    fn imported_call(&self, name: &str) -> TypeShape {
        let Some(binding) = self.file.facts.import(name) else {
            return TypeShape::unknown();
        };
        let context = self.resolver.context();
        let ModuleTarget::File(target) =
            context.resolve_module(&self.file.parsed.path, &binding.source)
        else {
            return TypeShape::unknown();
        };
        let Some(target) = context.file(&target) else {
            return TypeShape::unknown();
        };
        let Some(decl) = target
            .facts
            .declaration(binding.exported_name(), false)
            .filter(|d| d.kind == DeclarationKind::Function)
        else {
            return TypeShape::unknown();
        };
        match target.parsed.node_at(
            decl.span.start_byte,
            decl.span.end_byte,
            "function_declaration",
        ) {
            Some(function) => self.returned(target, function),
            None => TypeShape::unknown(),
        }
    }

    fn returned(&self, file: &'a SourceFile, function: Node) -> TypeShape {
        match syntax::return_type(function) {
            Some(ty) => self.resolver.resolve_type_node(file, ty),
            None => TypeShape::unknown(),
        }
    }

    fn binary(&mut self, node: Node<'a>, depth: usize) -> TypeShape {
        let file = self.file;
        let source = &file.parsed.source[..];
        let operator = node
            .child_by_field_name("operator")
            .map(|o| text(o, source))
            .unwrap_or("");
        let (Some(left), Some(right)) = (
            node.child_by_field_name("left"),
            node.child_by_field_name("right"),
        ) else {
            return TypeShape::unknown();
        };

        match operator {
            "==" | "===" | "!=" | "!==" | "<" | ">" | "<=" | ">=" | "instanceof" | "in" => {
                TypeShape::primitive("boolean")
            }
            "-" | "*" | "/" | "%" | "**" | "&" | "|" | "^" | "<<" | ">>" | ">>>" => {
                TypeShape::primitive("number")
            }
            "+" => {
                let l = self.infer_at(left, depth + 1);
                let r = self.infer_at(right, depth + 1);
                let string = TypeShape::primitive("string");
                if l == string || r == string {
                    string
                } else {
                    TypeShape::primitive("number")
                }
            }
            "??" | "||" => {
                let l = match self.infer_at(left, depth + 1) {
                    TypeShape::Union(variants) => TypeShape::union(
                        variants.into_iter().filter(|v| !v.is_nullish()).collect(),
                    ),
                    other => other,
                };
                let r = self.infer_at(right, depth + 1);
                TypeShape::union(vec![l, r])
            }
            "&&" => self.infer_at(right, depth + 1),
            _ => TypeShape::unknown(),
        }
    }
}

fn upsert(members: &mut Vec<Member>, member: Member) {
    members.retain(|m| m.name != member.name);
    members.push(member);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::ShapeRenderer;

    fn find<'t>(node: Node<'t>, kind: &str, nth: usize) -> Option<Node<'t>> {
        let mut found = Vec::new();
        collect(node, kind, &mut found);
        found.into_iter().nth(nth)
    }

    fn collect<'t>(node: Node<'t>, kind: &str, out: &mut Vec<Node<'t>>) {
        if node.kind() == kind {
            out.push(node);
        }
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            collect(child, kind, out);
        }
    }

    fn returned_shape(context: &AnalysisContext, path: &str) -> TypeShape {
        let file = context.file(path).unwrap();
        let ret = find(file.parsed.tree.root_node(), "return_statement", 0).unwrap();
        let expr = named_children(ret).into_iter().next().unwrap();
        let mut typer = ExpressionTyper::new(context, file);
        typer.infer_response(expr)
    }

    #[test]
    fn test_object_literal_with_identifiers() {
        let mut ctx = AnalysisContext::new("/app");
        ctx.add_source(
            "src/a.ts",
            r#"
interface User { id: number; name: string }
async function handler(req: any) {
  const user: User = await load();
  const total = 3;
  return { user, total, ok: true, tags: ['a', 'b'] };
}
"#,
        )
        .unwrap();

        let shape = returned_shape(&ctx, "src/a.ts");
        let props = ShapeRenderer::new(2).extract_properties(&shape);
        let rendered: Vec<_> = props.iter().map(|p| (p.name.as_str(), p.type_text.as_str())).collect();
        assert_eq!(
            rendered,
            vec![
                ("user", "{ id: number; name: string; }"),
                ("total", "number"),
                ("ok", "boolean"),
                ("tags", "string[]"),
            ]
        );
    }

    #[test]
    fn test_imported_function_return_type() {
        let mut ctx = AnalysisContext::new("/app");
        ctx.add_source(
            "src/service.ts",
            "export interface Item { sku: string }\nexport async function listItems(): Promise<Item[]> { return []; }\n",
        )
        .unwrap();
        ctx.add_source(
            "src/route.ts",
            "import { listItems } from './service';\nasync function h() { return await listItems(); }\n",
        )
        .unwrap();

        let file = ctx.file("src/route.ts").unwrap();
        let ret = find(file.parsed.tree.root_node(), "return_statement", 0).unwrap();
        let expr = named_children(ret).into_iter().next().unwrap();
        let mut typer = ExpressionTyper::new(&ctx, file);
        let shape = typer.infer_response(expr);
        assert_eq!(
            ShapeRenderer::default().format(&shape),
            "{ sku: string; }[]"
        );
    }

    #[test]
    fn test_spread_and_ternary() {
        let mut ctx = AnalysisContext::new("/app");
        ctx.add_source(
            "src/b.ts",
            r#"
function h(flag: boolean) {
  const base = { id: 1 };
  return { ...base, status: flag ? 'on' : null };
}
"#,
        )
        .unwrap();

        let shape = returned_shape(&ctx, "src/b.ts");
        assert_eq!(
            ShapeRenderer::default().format(&shape),
            "{ id: number; status: string | null; }"
        );
    }
}
