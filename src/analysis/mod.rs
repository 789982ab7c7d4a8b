//! Tree-sitter front end for TypeScript projects.
//!
//! This module turns source files into "facts" the extractors consume:
//! - Imports (default, named, namespace)
//! - Classes with their decorators and base-class expression
//! - Named declarations (interfaces, type aliases, enums, functions)
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌──────────────┐     ┌───────────────┐
//! │ Source Files    │────▶│ TypeScript   │────▶│ FileFacts     │
//! └─────────────────┘     │ Analyzer     │     │ (Classes,     │
//!                         └──────────────┘     │  Imports, etc)│
//!                                              └───────────────┘
//!                                                      │
//!                                                      ▼
//!                         ┌──────────────┐     ┌───────────────┐
//!                         │ Extractors   │◀────│AnalysisContext│
//!                         │ (per framework)    │ (Name Index)  │
//!                         └──────────────┘     └───────────────┘
//! ```
//!
//! Decorators are exposed as plain `{name, arguments}` records so the route
//! and auth logic never touches grammar details.

mod context;
mod facts;
mod languages;
pub mod syntax;
mod traits;

pub use context::{
    normalize_path, AnalysisContext, ModuleTarget, SourceFile, TypeDeclRef, TypeLookup,
};
pub use facts::{
    BaseClause, ClassDecl, Declaration, DeclarationKind, Decorator, DecoratorArg, FileFacts,
    ImportBinding, ImportKind, Span,
};
pub use languages::{get_analyzer, TypeScriptAnalyzer};
pub use traits::{LanguageAnalyzer, ParsedFile};

/// Parse a TypeScript snippet that has no file on disk.
pub fn parse_typescript(source: &str) -> anyhow::Result<ParsedFile> {
    let analyzer = get_analyzer("ts")
        .ok_or_else(|| anyhow::anyhow!("typescript analyzer unavailable"))?;
    analyzer.parse(std::path::Path::new("snippet.ts"), source.as_bytes())
}
