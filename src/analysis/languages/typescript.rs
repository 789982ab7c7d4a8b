//! TypeScript language analyzer using tree-sitter.

use std::path::Path;

use streaming_iterator::StreamingIterator;
use tree_sitter::{Language, Node, Parser, Query, QueryCursor};

use crate::analysis::facts::ImportKind;
use crate::analysis::syntax;
use crate::analysis::{
    ClassDecl, Declaration, DeclarationKind, FileFacts, ImportBinding, LanguageAnalyzer,
    ParsedFile, Span,
};

const CLASS_QUERY: &str = r#"
(class_declaration
  name: (type_identifier) @class_name
) @class

(abstract_class_declaration
  name: (type_identifier) @class_name
) @class
"#;

const DECLARATION_QUERY: &str = r#"
; Interface declarations
(interface_declaration
  name: (type_identifier) @interface_name
) @interface

; Type alias declarations
(type_alias_declaration
  name: (type_identifier) @type_alias_name
) @type_alias

; Enum declarations
(enum_declaration
  name: (identifier) @enum_name
) @enum

; Function declarations
(function_declaration
  name: (identifier) @func_name
) @function
"#;

/// Tree-sitter query for extracting imports.
const IMPORT_QUERY: &str = r#"
(import_statement
  (import_clause) @clause
  source: (string) @source
) @import
"#;

pub struct TypeScriptAnalyzer {
    typescript: Language,
    tsx: Language,
}

impl TypeScriptAnalyzer {
    pub fn new() -> Self {
        Self {
            typescript: tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            tsx: tree_sitter_typescript::LANGUAGE_TSX.into(),
        }
    }

    fn language_for(&self, path: &Path) -> &Language {
        match path.extension().and_then(|e| e.to_str()) {
            Some("tsx") => &self.tsx,
            _ => &self.typescript,
        }
    }

    fn create_parser(&self, language: &Language) -> anyhow::Result<Parser> {
        let mut parser = Parser::new();
        parser.set_language(language)?;
        Ok(parser)
    }

    fn extract_classes(&self, parsed: &ParsedFile) -> anyhow::Result<Vec<ClassDecl>> {
        let language = self.language_for(&parsed.path);
        let query = Query::new(language, CLASS_QUERY)?;
        let mut cursor = QueryCursor::new();
        let mut matches = cursor.matches(&query, parsed.tree.root_node(), &parsed.source[..]);

        let mut classes = Vec::new();
        while let Some(m) = matches.next() {
            let mut name = None;
            let mut class_node = None;
            for capture in m.captures {
                match query.capture_names()[capture.index as usize] {
                    "class_name" => name = Some(parsed.node_text(capture.node).to_string()),
                    "class" => class_node = Some(capture.node),
                    _ => {}
                }
            }

            if let (Some(name), Some(node)) = (name, class_node) {
                classes.push(ClassDecl {
                    name,
                    file: parsed.path.clone(),
                    span: Span::from_node(node),
                    extends: syntax::base_clause(node, &parsed.source),
                    decorators: syntax::decorators(node, &parsed.source),
                });
            }
        }

        classes.sort_by_key(|c| c.span.start_byte);
        Ok(classes)
    }

    fn extract_declarations(&self, parsed: &ParsedFile) -> anyhow::Result<Vec<Declaration>> {
        let language = self.language_for(&parsed.path);
        let query = Query::new(language, DECLARATION_QUERY)?;
        let mut cursor = QueryCursor::new();
        let mut matches = cursor.matches(&query, parsed.tree.root_node(), &parsed.source[..]);

        let mut declarations = Vec::new();
        while let Some(m) = matches.next() {
            let mut name = String::new();
            let mut kind = DeclarationKind::Interface;
            let mut decl_node = None;

            for capture in m.captures {
                match query.capture_names()[capture.index as usize] {
                    "interface_name" => {
                        name = parsed.node_text(capture.node).to_string();
                        kind = DeclarationKind::Interface;
                    }
                    "type_alias_name" => {
                        name = parsed.node_text(capture.node).to_string();
                        kind = DeclarationKind::TypeAlias;
                    }
                    "enum_name" => {
                        name = parsed.node_text(capture.node).to_string();
                        kind = DeclarationKind::Enum;
                    }
                    "func_name" => {
                        name = parsed.node_text(capture.node).to_string();
                        kind = DeclarationKind::Function;
                    }
                    "interface" | "type_alias" | "enum" | "function" => {
                        decl_node = Some(capture.node)
                    }
                    _ => {}
                }
            }

            if let Some(node) = decl_node {
                if !name.is_empty() && is_module_level(node) {
                    declarations.push(Declaration {
                        name,
                        kind,
                        file: parsed.path.clone(),
                        span: Span::from_node(node),
                    });
                }
            }
        }

        declarations.sort_by_key(|d| d.span.start_byte);
        Ok(declarations)
    }

    fn extract_imports(&self, parsed: &ParsedFile) -> anyhow::Result<Vec<ImportBinding>> {
        let language = self.language_for(&parsed.path);
        let query = Query::new(language, IMPORT_QUERY)?;
        let mut cursor = QueryCursor::new();
        let mut matches = cursor.matches(&query, parsed.tree.root_node(), &parsed.source[..]);

        let mut imports = Vec::new();
        while let Some(m) = matches.next() {
            let mut clause = None;
            let mut source = None;
            for capture in m.captures {
                match query.capture_names()[capture.index as usize] {
                    "clause" => clause = Some(capture.node),
                    "source" => source = syntax::string_value(capture.node, &parsed.source),
                    _ => {}
                }
            }

            if let (Some(clause), Some(source)) = (clause, source) {
                collect_clause_bindings(clause, &source, &parsed.source, &mut imports);
            }
        }

        Ok(imports)
    }
}

impl Default for TypeScriptAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether a declaration sits at module scope (possibly behind `export`).
fn is_module_level(node: Node) -> bool {
    match node.parent() {
        Some(parent) if parent.kind() == "program" => true,
        Some(parent) if parent.kind() == "export_statement" => parent
            .parent()
            .map(|p| p.kind() == "program")
            .unwrap_or(false),
        _ => false,
    }
}

fn collect_clause_bindings(
    clause: Node,
    module: &str,
    source: &[u8],
    out: &mut Vec<ImportBinding>,
) {
    for child in syntax::named_children(clause) {
        match child.kind() {
            "identifier" => out.push(ImportBinding {
                local: syntax::text(child, source).to_string(),
                imported: None,
                source: module.to_string(),
                kind: ImportKind::Default,
            }),
            "namespace_import" => {
                if let Some(ident) = syntax::named_children(child)
                    .into_iter()
                    .find(|c| c.kind() == "identifier")
                {
                    out.push(ImportBinding {
                        local: syntax::text(ident, source).to_string(),
                        imported: None,
                        source: module.to_string(),
                        kind: ImportKind::Namespace,
                    });
                }
            }
            "named_imports" => {
                for spec in syntax::named_children(child)
                    .into_iter()
                    .filter(|c| c.kind() == "import_specifier")
                {
                    let Some(name) = spec.child_by_field_name("name") else {
                        continue;
                    };
                    let imported = syntax::text(name, source).to_string();
                    let local = spec
                        .child_by_field_name("alias")
                        .map(|a| syntax::text(a, source).to_string())
                        .unwrap_or_else(|| imported.clone());
                    out.push(ImportBinding {
                        local,
                        imported: Some(imported),
                        source: module.to_string(),
                        kind: ImportKind::Named,
                    });
                }
            }
            _ => {}
        }
    }
}

impl LanguageAnalyzer for TypeScriptAnalyzer {
    fn language_id(&self) -> &'static str {
        "typescript"
    }

    fn file_extensions(&self) -> &'static [&'static str] {
        &["ts", "tsx", "mts", "cts"]
    }

    fn parse(&self, path: &Path, source: &[u8]) -> anyhow::Result<ParsedFile> {
        let mut parser = self.create_parser(self.language_for(path))?;
        let tree = parser
            .parse(source, None)
            .ok_or_else(|| anyhow::anyhow!("failed to parse {}", path.display()))?;

        Ok(ParsedFile {
            tree,
            source: source.to_vec(),
            path: path.to_path_buf(),
        })
    }

    fn extract_facts(&self, parsed: &ParsedFile) -> anyhow::Result<FileFacts> {
        Ok(FileFacts {
            imports: self.extract_imports(parsed)?,
            classes: self.extract_classes(parsed)?,
            declarations: self.extract_declarations(parsed)?,
        })
    }
}
