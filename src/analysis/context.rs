//! Project-wide analysis context.
//!
//! The AnalysisContext provides:
//! - One parse per source file for the whole run
//! - Extracted facts per file
//! - Name -> declaration lookup across all known files
//! - Module specifier resolution (`./users` -> `src/users.ts`)

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Component, Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::analysis::{get_analyzer, ClassDecl, DeclarationKind, FileFacts, ParsedFile, Span};
use crate::error::ConfigError;
use crate::model::{Diagnostic, DiagnosticKind};

/// A parsed file together with its facts.
pub struct SourceFile {
    pub parsed: ParsedFile,
    pub facts: FileFacts,
    /// Path relative to the project root, `/`-separated.
    pub rel_path: String,
}

/// Where a module specifier points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleTarget {
    /// A project file that was indexed.
    File(PathBuf),
    /// A relative specifier with no matching file; carries the best guess.
    Missing(PathBuf),
    /// A bare package specifier such as `fastify` or `@nestjs/common`.
    Package(String),
}

/// A named type-position declaration.
#[derive(Clone, Copy)]
pub struct TypeDeclRef<'a> {
    pub file: &'a SourceFile,
    pub kind: DeclarationKind,
    pub span: Span,
}

/// Outcome of looking up a type name from a file.
pub enum TypeLookup<'a> {
    Found(TypeDeclRef<'a>),
    /// Imported from a package; carries the module specifier.
    Package(String),
    NotFound,
}

impl<'a> TypeDeclRef<'a> {
    /// The declaration node in its file's tree.
    pub fn node(&self) -> Option<tree_sitter::Node<'a>> {
        let kind = match self.kind {
            DeclarationKind::Class => "class_declaration",
            DeclarationKind::Interface => "interface_declaration",
            DeclarationKind::TypeAlias => "type_alias_declaration",
            DeclarationKind::Enum => "enum_declaration",
            DeclarationKind::Function => "function_declaration",
        };
        self.file
            .parsed
            .node_at(self.span.start_byte, self.span.end_byte, kind)
            .or_else(|| {
                self.file.parsed.node_at(
                    self.span.start_byte,
                    self.span.end_byte,
                    "abstract_class_declaration",
                )
            })
    }
}

/// Analysis context for one project.
///
/// Built once per run; all lookups afterwards are in-memory.
pub struct AnalysisContext {
    /// Base directory for relative path resolution.
    base_dir: PathBuf,
    /// Parsed files keyed by normalized absolute path.
    files: BTreeMap<PathBuf, SourceFile>,
    /// Class name -> files declaring it, in path order.
    classes: HashMap<String, Vec<PathBuf>>,
    /// Problems encountered while indexing.
    diagnostics: Vec<Diagnostic>,
}

impl AnalysisContext {
    /// Create an empty context.
    pub fn new<P: AsRef<Path>>(base_dir: P) -> Self {
        Self {
            base_dir: normalize_path(base_dir.as_ref()),
            files: BTreeMap::new(),
            classes: HashMap::new(),
            diagnostics: Vec::new(),
        }
    }

    /// Index every supported source file under `base_dir`.
    ///
    /// Files matching `exclude` globs (relative to the base directory) are
    /// skipped. A file that fails to read or parse is recorded as a
    /// diagnostic and does not stop indexing of its siblings.
    pub fn build<P: AsRef<Path>>(base_dir: P, exclude: &[String]) -> Result<Self, ConfigError> {
        let mut context = Self::new(base_dir);
        let excludes = compile_excludes(exclude)?;

        for path in collect_files(&context.base_dir) {
            let rel = context.relative_path(&path);
            if excludes.is_match(&rel) {
                debug!(path = %rel, "excluded from index");
                continue;
            }
            if let Err(e) = context.load_file(&path) {
                warn!(path = %rel, error = %e, "failed to index file");
                context.diagnostics.push(Diagnostic::new(
                    DiagnosticKind::ParseFailure,
                    rel,
                    e.to_string(),
                ));
            }
        }

        debug!(files = context.files.len(), "source index built");
        Ok(context)
    }

    /// Get the base directory.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Read, parse and index one file from disk.
    pub fn load_file<P: AsRef<Path>>(&mut self, path: P) -> anyhow::Result<()> {
        let path = self.absolute(path.as_ref());
        let source = fs::read_to_string(&path)?;
        self.add_source(&path, &source)
    }

    /// Parse and index in-memory source as if it lived at `path`.
    pub fn add_source<P: AsRef<Path>>(&mut self, path: P, source: &str) -> anyhow::Result<()> {
        let path = self.absolute(path.as_ref());
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        let analyzer = get_analyzer(ext)
            .ok_or_else(|| anyhow::anyhow!("unsupported file type: {}", path.display()))?;

        let parsed = analyzer.parse(&path, source.as_bytes())?;
        let facts = analyzer.extract_facts(&parsed)?;
        let rel_path = self.relative_path(&path);

        for class in &facts.classes {
            let entry = self.classes.entry(class.name.clone()).or_default();
            if !entry.contains(&path) {
                entry.push(path.clone());
                entry.sort();
            }
        }

        self.files.insert(
            path,
            SourceFile {
                parsed,
                facts,
                rel_path,
            },
        );
        Ok(())
    }

    fn absolute(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            normalize_path(path)
        } else {
            normalize_path(&self.base_dir.join(path))
        }
    }

    /// Path relative to the base directory, `/`-separated.
    pub fn relative_path(&self, path: &Path) -> String {
        let path = self.absolute(path);
        let rel = path.strip_prefix(&self.base_dir).unwrap_or(&path);
        rel.components()
            .map(|c| c.as_os_str().to_string_lossy().to_string())
            .collect::<Vec<_>>()
            .join("/")
    }

    pub fn file<P: AsRef<Path>>(&self, path: P) -> Option<&SourceFile> {
        self.files.get(&self.absolute(path.as_ref()))
    }

    pub fn files(&self) -> impl Iterator<Item = &SourceFile> {
        self.files.values()
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// All classes with this name, in path order.
    pub fn find_classes(&self, name: &str) -> Vec<&ClassDecl> {
        self.classes
            .get(name)
            .map(|paths| {
                paths
                    .iter()
                    .filter_map(|p| self.files.get(p))
                    .flat_map(|f| f.facts.classes.iter().filter(|c| c.name == name))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Resolve a module specifier written in `from`.
    pub fn resolve_module(&self, from: &Path, specifier: &str) -> ModuleTarget {
        if !specifier.starts_with('.') {
            return ModuleTarget::Package(specifier.to_string());
        }

        let from = self.absolute(from);
        let dir = from.parent().unwrap_or(&self.base_dir);
        let base = normalize_path(&dir.join(specifier));

        let candidates = module_candidates(&base);
        for candidate in &candidates {
            if self.files.contains_key(candidate) {
                return ModuleTarget::File(candidate.clone());
            }
        }

        let guess = candidates.into_iter().next().unwrap_or(base);
        ModuleTarget::Missing(guess)
    }

    /// Find a type-position declaration named `name` visible from `from`.
    ///
    /// Local declarations win, then imports, then a unique project-wide
    /// match (for names reached through re-exports or ambient globals).
    pub fn resolve_type(&self, from: &Path, name: &str) -> TypeLookup<'_> {
        let Some(file) = self.file(from) else {
            return TypeLookup::NotFound;
        };

        if let Some(found) = type_decl_in(file, name) {
            return TypeLookup::Found(found);
        }

        if let Some(binding) = file.facts.import(name) {
            return match self.resolve_module(&file.parsed.path, &binding.source) {
                ModuleTarget::File(target) => self
                    .files
                    .get(&target)
                    .and_then(|f| type_decl_in(f, binding.exported_name()))
                    .map(TypeLookup::Found)
                    .unwrap_or(TypeLookup::NotFound),
                ModuleTarget::Package(package) => TypeLookup::Package(package),
                ModuleTarget::Missing(_) => TypeLookup::NotFound,
            };
        }

        let mut matches = self.files.values().filter_map(|f| type_decl_in(f, name));
        match (matches.next(), matches.next()) {
            (Some(only), None) => TypeLookup::Found(only),
            _ => TypeLookup::NotFound,
        }
    }
}

fn type_decl_in<'a>(file: &'a SourceFile, name: &str) -> Option<TypeDeclRef<'a>> {
    if let Some(decl) = file.facts.declaration(name, true) {
        return Some(TypeDeclRef {
            file,
            kind: decl.kind,
            span: decl.span,
        });
    }
    file.facts.class(name).map(|class| TypeDeclRef {
        file,
        kind: DeclarationKind::Class,
        span: class.span,
    })
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut s = path.as_os_str().to_os_string();
    s.push(suffix);
    PathBuf::from(s)
}

/// Files a relative specifier may refer to, most likely first.
fn module_candidates(base: &Path) -> Vec<PathBuf> {
    match base.extension().and_then(|e| e.to_str()) {
        Some("ts") | Some("tsx") => return vec![base.to_path_buf()],
        Some("js") | Some("mjs") | Some("cjs") => {
            return vec![base.with_extension("ts"), base.with_extension("tsx")];
        }
        _ => {}
    }

    vec![
        with_suffix(base, ".ts"),
        with_suffix(base, ".tsx"),
        base.join("index.ts"),
        base.join("index.tsx"),
    ]
}

/// Lexically normalize a path, resolving `.` and `..` without touching the
/// file system.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn compile_excludes(patterns: &[String]) -> Result<GlobSet, ConfigError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| {
            ConfigError::Invalid(format!("invalid excludePaths pattern {:?}: {}", pattern, e))
        })?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| ConfigError::Invalid(e.to_string()))
}

/// Collect supported source files in deterministic order.
fn collect_files(root: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            let name = e.file_name().to_string_lossy();
            // Skip hidden directories and installed packages
            if e.depth() > 0 && e.file_type().is_dir() {
                return !name.starts_with('.') && name != "node_modules";
            }
            true
        })
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        if get_analyzer(ext).is_some() {
            files.push(path.to_path_buf());
        }
    }

    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_normalize_path() {
        assert_eq!(
            normalize_path(Path::new("/app/src/routes/../build.ts")),
            PathBuf::from("/app/src/build.ts")
        );
        assert_eq!(
            normalize_path(Path::new("/app/./src/x.ts")),
            PathBuf::from("/app/src/x.ts")
        );
    }

    #[test]
    fn test_resolve_module_variants() {
        let mut ctx = AnalysisContext::new("/app");
        ctx.add_source("src/build.ts", "").unwrap();
        ctx.add_source("src/routes/users.ts", "").unwrap();
        ctx.add_source("src/auth/index.ts", "").unwrap();

        let from = Path::new("/app/src/build.ts");
        assert_eq!(
            ctx.resolve_module(from, "./routes/users"),
            ModuleTarget::File(PathBuf::from("/app/src/routes/users.ts"))
        );
        assert_eq!(
            ctx.resolve_module(from, "./routes/users.js"),
            ModuleTarget::File(PathBuf::from("/app/src/routes/users.ts"))
        );
        assert_eq!(
            ctx.resolve_module(from, "./auth"),
            ModuleTarget::File(PathBuf::from("/app/src/auth/index.ts"))
        );
        assert_eq!(
            ctx.resolve_module(from, "./missing"),
            ModuleTarget::Missing(PathBuf::from("/app/src/missing.ts"))
        );
        assert_eq!(
            ctx.resolve_module(from, "fastify"),
            ModuleTarget::Package("fastify".into())
        );
    }

    #[test]
    fn test_find_classes_reports_every_declaration() {
        let mut ctx = AnalysisContext::new("/app");
        ctx.add_source("src/b.ts", "export class Dup {}").unwrap();
        ctx.add_source("src/a.ts", "export class Dup {}\nclass Other {}")
            .unwrap();

        let found = ctx.find_classes("Dup");
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].file, PathBuf::from("/app/src/a.ts"));
        assert_eq!(ctx.find_classes("Other").len(), 1);
        assert!(ctx.find_classes("Nope").is_empty());
    }

    #[test]
    fn test_resolve_type_through_import() {
        let mut ctx = AnalysisContext::new("/app");
        ctx.add_source(
            "src/types.ts",
            "export interface User { id: number }",
        )
        .unwrap();
        ctx.add_source(
            "src/routes.ts",
            "import { User as U } from './types';\nimport { FastifyRequest } from 'fastify';",
        )
        .unwrap();

        let from = Path::new("/app/src/routes.ts");
        match ctx.resolve_type(from, "U") {
            TypeLookup::Found(found) => {
                assert_eq!(found.kind, DeclarationKind::Interface);
                assert_eq!(found.file.rel_path, "src/types.ts");
                assert!(found.node().is_some());
            }
            _ => panic!("expected User to resolve through the import"),
        }

        match ctx.resolve_type(from, "FastifyRequest") {
            TypeLookup::Package(module) => assert_eq!(module, "fastify"),
            _ => panic!("expected a package lookup"),
        }
        assert!(matches!(ctx.resolve_type(from, "Missing"), TypeLookup::NotFound));
    }

    #[test]
    fn test_build_skips_excluded_and_records_failures() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src");
        fs::create_dir_all(src.join("nested")).unwrap();
        fs::create_dir_all(dir.path().join("node_modules/fastify")).unwrap();
        fs::write(src.join("app.ts"), "export class App {}").unwrap();
        fs::write(src.join("nested/util.ts"), "export class Util {}").unwrap();
        fs::write(src.join("app.spec.ts"), "class Spec {}").unwrap();
        fs::write(dir.path().join("node_modules/fastify/index.ts"), "class F {}").unwrap();

        let ctx = AnalysisContext::build(dir.path(), &["**/*.spec.ts".to_string()]).unwrap();
        assert_eq!(ctx.file_count(), 2);
        assert!(ctx.file(src.join("app.ts")).is_some());
        assert!(ctx.find_classes("Spec").is_empty());
        assert!(ctx.find_classes("F").is_empty());
        assert!(ctx.diagnostics().is_empty());
    }
}
