//! Fact structures extracted from TypeScript sources.
//!
//! Facts are owned values, independent of the tree-sitter tree they came
//! from, so they can be indexed project-wide and queried after parsing.

use std::fmt;
use std::path::PathBuf;

/// Source location span with byte offsets and line/column positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Span {
    /// Start byte offset (0-indexed).
    pub start_byte: usize,
    /// End byte offset (0-indexed, exclusive).
    pub end_byte: usize,
    /// Start line (1-indexed).
    pub start_line: usize,
    /// Start column (1-indexed).
    pub start_col: usize,
}

impl Span {
    /// Create a span from a tree-sitter node.
    pub fn from_node(node: tree_sitter::Node) -> Self {
        let start = node.start_position();
        Self {
            start_byte: node.start_byte(),
            end_byte: node.end_byte(),
            start_line: start.row + 1, // tree-sitter is 0-indexed
            start_col: start.column + 1,
        }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.start_line, self.start_col)
    }
}

/// A literal-ish decorator argument.
///
/// Only the shapes that matter for route and auth analysis are modelled;
/// everything else is kept as raw text.
#[derive(Debug, Clone, PartialEq)]
pub enum DecoratorArg {
    Str(String),
    Number(f64),
    Bool(bool),
    Ident(String),
    Call {
        callee: String,
        arguments: Vec<DecoratorArg>,
    },
    New {
        class: String,
        arguments: Vec<DecoratorArg>,
    },
    Array(Vec<DecoratorArg>),
    Object(Vec<(String, DecoratorArg)>),
    /// Arrow function with an expression body, e.g. `() => UsersModule`.
    Arrow(Box<DecoratorArg>),
    Other(String),
}

impl DecoratorArg {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            DecoratorArg::Str(s) => Some(s),
            _ => None,
        }
    }

    /// The referenced name: identifier, call callee or constructed class.
    pub fn referenced_name(&self) -> Option<&str> {
        match self {
            DecoratorArg::Ident(name) => Some(name),
            DecoratorArg::Call { callee, .. } => Some(callee),
            DecoratorArg::New { class, .. } => Some(class),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&DecoratorArg> {
        match self {
            DecoratorArg::Object(entries) => {
                entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
            }
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[DecoratorArg]> {
        match self {
            DecoratorArg::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            DecoratorArg::Number(n) => Some(*n),
            _ => None,
        }
    }
}

/// A decorator attached to a declaration, as a plain `{name, arguments}` record.
#[derive(Debug, Clone, PartialEq)]
pub struct Decorator {
    pub name: String,
    pub arguments: Vec<DecoratorArg>,
    pub line: usize,
}

impl Decorator {
    pub fn first_string(&self) -> Option<&str> {
        self.arguments.first().and_then(DecoratorArg::as_str)
    }

    pub fn argument(&self, index: usize) -> Option<&DecoratorArg> {
        self.arguments.get(index)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportKind {
    Default,
    Named,
    Namespace,
}

/// One local name bound by an `import` statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportBinding {
    /// Name visible in the importing file (alias if renamed).
    pub local: String,
    /// Exported name in the source module; `None` for default/namespace.
    pub imported: Option<String>,
    /// Module specifier as written.
    pub source: String,
    pub kind: ImportKind,
}

impl ImportBinding {
    pub fn is_relative(&self) -> bool {
        self.source.starts_with('.')
    }

    /// Name to look up in the target module.
    pub fn exported_name(&self) -> &str {
        self.imported.as_deref().unwrap_or(&self.local)
    }
}

/// Base-class expression of a class declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BaseClause {
    /// `extends Factory(...)`
    Call { callee: String },
    /// `extends SomeClass`
    Name(String),
    /// Anything else, kept as source text.
    Other(String),
}

/// Kind of an indexed declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeclarationKind {
    Class,
    Interface,
    TypeAlias,
    Enum,
    Function,
}

impl DeclarationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeclarationKind::Class => "class",
            DeclarationKind::Interface => "interface",
            DeclarationKind::TypeAlias => "type",
            DeclarationKind::Enum => "enum",
            DeclarationKind::Function => "function",
        }
    }

    /// Whether declarations of this kind can be used in type position.
    pub fn is_type(&self) -> bool {
        !matches!(self, DeclarationKind::Function)
    }
}

impl fmt::Display for DeclarationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A named top-level declaration, pointing back into its file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub name: String,
    pub kind: DeclarationKind,
    pub file: PathBuf,
    pub span: Span,
}

/// A class declaration with the facts needed for guard and module analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassDecl {
    pub name: String,
    pub file: PathBuf,
    pub span: Span,
    pub extends: Option<BaseClause>,
    pub decorators: Vec<Decorator>,
}

impl ClassDecl {
    pub fn decorator(&self, name: &str) -> Option<&Decorator> {
        self.decorators.iter().find(|d| d.name == name)
    }
}

/// All facts extracted from a single file.
#[derive(Debug, Clone, Default)]
pub struct FileFacts {
    pub imports: Vec<ImportBinding>,
    pub classes: Vec<ClassDecl>,
    pub declarations: Vec<Declaration>,
}

impl FileFacts {
    pub fn import(&self, local: &str) -> Option<&ImportBinding> {
        self.imports.iter().find(|i| i.local == local)
    }

    pub fn class(&self, name: &str) -> Option<&ClassDecl> {
        self.classes.iter().find(|c| c.name == name)
    }

    pub fn declaration(&self, name: &str, want_type: bool) -> Option<&Declaration> {
        self.declarations
            .iter()
            .find(|d| d.name == name && (!want_type || d.kind.is_type()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_referenced_name() {
        assert_eq!(
            DecoratorArg::Ident("JwtGuard".into()).referenced_name(),
            Some("JwtGuard")
        );
        let call = DecoratorArg::Call {
            callee: "AuthGuard".into(),
            arguments: vec![DecoratorArg::Str("jwt".into())],
        };
        assert_eq!(call.referenced_name(), Some("AuthGuard"));
        assert_eq!(DecoratorArg::Str("x".into()).referenced_name(), None);
    }

    #[test]
    fn test_object_lookup() {
        let obj = DecoratorArg::Object(vec![
            ("provide".into(), DecoratorArg::Ident("APP_GUARD".into())),
            ("useClass".into(), DecoratorArg::Ident("JwtAuthGuard".into())),
        ]);
        assert_eq!(
            obj.get("useClass").and_then(DecoratorArg::referenced_name),
            Some("JwtAuthGuard")
        );
        assert!(obj.get("useValue").is_none());
    }
}
