//! Parameter and response shape resolution.
//!
//! - `resolve`: TypeScript type syntax -> [`TypeShape`], following
//!   interfaces, aliases and DTO classes across files
//! - `infer`: expression -> [`TypeShape`] for handler return values
//! - `render`: [`TypeShape`] -> `Vec<ParamInfo>` and type strings, with
//!   framework plumbing filtered out

mod infer;
mod render;
mod resolve;

pub use infer::ExpressionTyper;
pub use render::{is_framework_module, is_framework_type, ShapeRenderer};
pub use resolve::TypeResolver;

/// Structural description of a type, independent of the syntax it came from.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeShape {
    /// `string`, `number`, `boolean`, `null`, `undefined`, `any`, ...
    Primitive(String),
    /// A literal type, already rendered: `'admin'`, `42`, `true`.
    Literal(String),
    Array(Box<TypeShape>),
    Union(Vec<TypeShape>),
    Object {
        /// Declared name (interface, alias or class), if any.
        name: Option<String>,
        members: Vec<Member>,
    },
    /// A type that is not expanded: built-ins, package types, unresolved
    /// names, and references cut off by cycle or depth limits.
    Named {
        name: String,
        /// Declaring module for types imported from packages.
        module: Option<String>,
        args: Vec<TypeShape>,
    },
}

/// One member of an object shape.
#[derive(Debug, Clone, PartialEq)]
pub struct Member {
    pub name: String,
    pub shape: TypeShape,
    pub optional: bool,
}

impl Member {
    pub fn new(name: impl Into<String>, shape: TypeShape, optional: bool) -> Self {
        Self {
            name: name.into(),
            shape,
            optional,
        }
    }
}

impl TypeShape {
    pub fn primitive(name: &str) -> Self {
        TypeShape::Primitive(name.to_string())
    }

    pub fn unknown() -> Self {
        TypeShape::primitive("unknown")
    }

    pub fn named(name: impl Into<String>) -> Self {
        TypeShape::Named {
            name: name.into(),
            module: None,
            args: Vec::new(),
        }
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, TypeShape::Primitive(p) if p == "null" || p == "undefined")
    }

    /// Declared or referenced name, if the shape has one.
    pub fn name(&self) -> Option<&str> {
        match self {
            TypeShape::Object { name, .. } => name.as_deref(),
            TypeShape::Named { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Build a union, flattening nested unions and dropping duplicates.
    pub fn union(variants: Vec<TypeShape>) -> TypeShape {
        let mut flat: Vec<TypeShape> = Vec::new();
        for variant in variants {
            match variant {
                TypeShape::Union(inner) => {
                    for v in inner {
                        if !flat.contains(&v) {
                            flat.push(v);
                        }
                    }
                }
                other => {
                    if !flat.contains(&other) {
                        flat.push(other);
                    }
                }
            }
        }
        match flat.len() {
            0 => TypeShape::unknown(),
            1 => flat.remove(0),
            _ => TypeShape::Union(flat),
        }
    }

    /// `Promise<T>` / `Observable<T>` -> `T`; anything else unchanged.
    pub fn unwrap_async(self) -> TypeShape {
        match self {
            TypeShape::Named { name, mut args, .. }
                if (name == "Promise" || name == "Observable") && args.len() == 1 =>
            {
                args.remove(0).unwrap_async()
            }
            other => other,
        }
    }

    /// Look up a member of an object shape.
    pub fn member(&self, name: &str) -> Option<&Member> {
        match self {
            TypeShape::Object { members, .. } => members.iter().find(|m| m.name == name),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_union_flattens_and_dedupes() {
        let shape = TypeShape::union(vec![
            TypeShape::primitive("string"),
            TypeShape::Union(vec![TypeShape::primitive("number"), TypeShape::primitive("string")]),
        ]);
        assert_eq!(
            shape,
            TypeShape::Union(vec![TypeShape::primitive("string"), TypeShape::primitive("number")])
        );
        assert_eq!(
            TypeShape::union(vec![TypeShape::primitive("string")]),
            TypeShape::primitive("string")
        );
    }

    #[test]
    fn test_unwrap_async() {
        let shape = TypeShape::Named {
            name: "Promise".into(),
            module: None,
            args: vec![TypeShape::named("User")],
        };
        assert_eq!(shape.unwrap_async(), TypeShape::named("User"));
        assert_eq!(
            TypeShape::primitive("string").unwrap_async(),
            TypeShape::primitive("string")
        );
    }
}
