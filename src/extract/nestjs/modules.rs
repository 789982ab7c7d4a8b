//! `@Module({...})` graph walk.
//!
//! Starting from the entry module, every module's `controllers` are collected
//! and its `imports` are followed. Only modules that live in the project are
//! walked; package modules (`TypeOrmModule.forRoot()`) are skipped.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::analysis::{AnalysisContext, DecoratorArg, ImportKind, ModuleTarget, SourceFile};
use crate::error::{ExtractError, Result};
use crate::model::{Diagnostic, DiagnosticKind};

const MODULE_DECORATOR: &str = "Module";
const APP_GUARD: &str = "APP_GUARD";
const FORWARD_REF: &str = "forwardRef";

/// A controller class listed by some module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerRef {
    /// Class name in the file that declares it.
    pub name: String,
    pub file: PathBuf,
    /// Set for `import X from './x.controller'`, where the local name may
    /// differ from the declared one.
    pub default_import: bool,
    /// Module that listed the controller.
    pub module: String,
}

/// Everything the walk learned about the application.
#[derive(Debug, Default)]
pub struct ModuleGraph {
    /// Module class names in visit order.
    pub modules: Vec<String>,
    pub controllers: Vec<ControllerRef>,
    /// `APP_GUARD` providers of the entry module.
    pub global_guards: Vec<String>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Where a class name used in a file is declared.
enum ClassLocation {
    Found {
        path: PathBuf,
        name: String,
        default_import: bool,
    },
    Missing {
        guess: PathBuf,
        specifier: String,
    },
    External,
}

/// Walk the module graph from `entry`.
///
/// The entry module itself must exist; anything it references that cannot
/// be found becomes a diagnostic.
pub fn walk_modules(context: &AnalysisContext, entry: &Path) -> Result<ModuleGraph> {
    if context.file(entry).is_none() {
        return Err(ExtractError::EntryNotFound(entry.to_path_buf()));
    }

    let mut walk = ModuleWalk {
        context,
        visited: HashSet::new(),
        seen_controllers: HashSet::new(),
        graph: ModuleGraph::default(),
    };
    walk.visit(entry, true);

    debug!(
        modules = walk.graph.modules.len(),
        controllers = walk.graph.controllers.len(),
        "walked module graph"
    );
    Ok(walk.graph)
}

struct ModuleWalk<'a> {
    context: &'a AnalysisContext,
    visited: HashSet<PathBuf>,
    seen_controllers: HashSet<(PathBuf, String)>,
    graph: ModuleGraph,
}

impl<'a> ModuleWalk<'a> {
    fn visit(&mut self, path: &Path, is_entry: bool) {
        if !self.visited.insert(path.to_path_buf()) {
            return;
        }
        let context = self.context;
        let Some(file) = context.file(path) else {
            return;
        };

        for class in &file.facts.classes {
            let Some(decorator) = class.decorator(MODULE_DECORATOR) else {
                continue;
            };
            debug!(module = %class.name, file = %file.rel_path, "visiting module");
            self.graph.modules.push(class.name.clone());

            let Some(metadata) = decorator.argument(0) else {
                continue;
            };

            for item in array_items(metadata, "controllers") {
                let Some(name) = item.referenced_name() else {
                    continue;
                };
                match locate_class(context, file, name) {
                    ClassLocation::Found {
                        path,
                        name,
                        default_import,
                    } => {
                        if self.seen_controllers.insert((path.clone(), name.clone())) {
                            self.graph.controllers.push(ControllerRef {
                                name,
                                file: path,
                                default_import,
                                module: class.name.clone(),
                            });
                        }
                    }
                    ClassLocation::Missing { guess, specifier } => {
                        self.missing("controller", name, &specifier, &guess)
                    }
                    ClassLocation::External => {
                        debug!(controller = name, "controller not declared in project")
                    }
                }
            }

            if is_entry {
                for provider in array_items(metadata, "providers") {
                    let provides_guard = provider
                        .get("provide")
                        .and_then(DecoratorArg::referenced_name)
                        == Some(APP_GUARD);
                    if let Some(guard) = provider
                        .get("useClass")
                        .and_then(DecoratorArg::referenced_name)
                        .filter(|_| provides_guard)
                    {
                        self.graph.global_guards.push(guard.to_string());
                    }
                }
            }

            for item in array_items(metadata, "imports") {
                let Some(name) = imported_module_name(item) else {
                    continue;
                };
                match locate_class(context, file, &name) {
                    ClassLocation::Found { path, .. } => self.visit(&path, false),
                    ClassLocation::Missing { guess, specifier } => {
                        self.missing("module", &name, &specifier, &guess)
                    }
                    ClassLocation::External => {}
                }
            }
        }
    }

    fn missing(&mut self, what: &str, name: &str, specifier: &str, guess: &Path) {
        let rel = self.context.relative_path(guess);
        warn!(name, path = %rel, "{} file not found", what);
        self.graph.diagnostics.push(Diagnostic::new(
            DiagnosticKind::MissingFile,
            rel,
            format!("{} '{}' imported from '{}' could not be resolved", what, name, specifier),
        ));
    }
}

fn array_items<'d>(metadata: &'d DecoratorArg, key: &str) -> &'d [DecoratorArg] {
    metadata
        .get(key)
        .and_then(DecoratorArg::as_array)
        .unwrap_or(&[])
}

/// Module class named by an `imports` entry.
///
/// `UsersModule`, `forwardRef(() => UsersModule)` and
/// `ConfigModule.forRoot({...})` all name a module.
fn imported_module_name(item: &DecoratorArg) -> Option<String> {
    match item {
        DecoratorArg::Ident(name) => Some(name.clone()),
        DecoratorArg::Call { callee, arguments } if callee == FORWARD_REF => {
            match arguments.first()? {
                DecoratorArg::Arrow(inner) => inner.referenced_name().map(String::from),
                other => other.referenced_name().map(String::from),
            }
        }
        DecoratorArg::Call { callee, .. } => {
            let (object, _method) = callee.split_once('.')?;
            Some(object.to_string())
        }
        _ => None,
    }
}

fn locate_class(context: &AnalysisContext, file: &SourceFile, name: &str) -> ClassLocation {
    if file.facts.class(name).is_some() {
        return ClassLocation::Found {
            path: file.parsed.path.clone(),
            name: name.to_string(),
            default_import: false,
        };
    }

    let Some(binding) = file.facts.import(name).filter(|b| b.is_relative()) else {
        return ClassLocation::External;
    };
    match context.resolve_module(&file.parsed.path, &binding.source) {
        ModuleTarget::File(path) => ClassLocation::Found {
            path,
            name: binding.exported_name().to_string(),
            default_import: binding.kind == ImportKind::Default,
        },
        ModuleTarget::Missing(guess) => ClassLocation::Missing {
            guess,
            specifier: binding.source.clone(),
        },
        ModuleTarget::Package(_) => ClassLocation::External,
    }
}
