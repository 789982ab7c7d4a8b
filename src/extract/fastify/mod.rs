//! Fastify (hook-style) extraction.
//!
//! The entry file's `register(plugin, { prefix })` calls name the route
//! files; each route file's verb calls become endpoints under that prefix.
//! Plugins that register further plugins are followed, with prefixes joined.
//! A function literal passed to `register` is parsed in place as its own
//! plugin.

mod auth;
mod registration;
mod responses;
mod routes;

pub use auth::HookAuthDetector;
pub use registration::{parse_registrations, parse_registrations_in, Plugin, RouteRegistration};
pub use responses::ResponseExtractor;
pub use routes::RouteFileParser;

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use tree_sitter::Node;

use super::{assemble, build_context, join_paths, push_group, EndpointExtractor, ExtractOptions};
use crate::analysis::{AnalysisContext, ModuleTarget, SourceFile};
use crate::error::{ExtractError, Result};
use crate::model::{Diagnostic, DiagnosticKind, ExtractedEndpoints, Framework, RouteGroup};

#[derive(Debug, Clone, Copy, Default)]
pub struct FastifyExtractor;

impl EndpointExtractor for FastifyExtractor {
    fn framework(&self) -> Framework {
        Framework::Fastify
    }

    fn extract(&self, options: &ExtractOptions) -> Result<ExtractedEndpoints> {
        let entry = options.entry_path(&options.config.fastify.entry);
        debug!(entry = %entry.display(), "starting fastify extraction");

        let context = build_context(options, &entry)?;
        let parser = RouteFileParser::new(&context, &options.config);
        let mut walk = RegistrationWalk {
            context: &context,
            parser: &parser,
            groups: Vec::new(),
            diagnostics: context.diagnostics().to_vec(),
            active: HashSet::new(),
        };

        let entry_file = context
            .file(&entry)
            .ok_or_else(|| ExtractError::EntryNotFound(entry.clone()))?;
        let direct = parser.parse(entry_file, &mut walk.diagnostics);
        push_group(&mut walk.groups, "/", direct);
        walk.follow(&entry, None);

        Ok(assemble(
            Framework::Fastify,
            options,
            walk.groups,
            walk.diagnostics,
        ))
    }
}

struct RegistrationWalk<'a> {
    context: &'a AnalysisContext,
    parser: &'a RouteFileParser<'a>,
    groups: Vec<RouteGroup>,
    diagnostics: Vec<Diagnostic>,
    /// Files on the current registration path, to stop plugin cycles.
    active: HashSet<PathBuf>,
}

impl<'a> RegistrationWalk<'a> {
    /// Parse every plugin registered from `path`.
    ///
    /// `parent_prefix` is `None` for the entry file, whose prefixes are used
    /// verbatim.
    fn follow(&mut self, path: &Path, parent_prefix: Option<&str>) {
        let context = self.context;
        let Some(file) = context.file(path) else {
            return;
        };
        self.active.insert(path.to_path_buf());
        self.follow_scope(file, file.parsed.tree.root_node(), parent_prefix);
        self.active.remove(path);
    }

    fn follow_scope(&mut self, file: &'a SourceFile, scope: Node<'a>, parent_prefix: Option<&str>) {
        let context = self.context;

        for registration in parse_registrations_in(context, file, scope) {
            let prefix = match parent_prefix {
                None => registration.prefix.clone(),
                Some(parent) => join_paths(&[parent, &registration.prefix]),
            };

            let (name, specifier, target) = match registration.plugin {
                Plugin::Inline(body) => {
                    debug!(
                        prefix = %prefix,
                        file = %file.rel_path,
                        line = registration.line,
                        "parsing inline plugin"
                    );
                    let endpoints = self.parser.parse_in(file, body, &mut self.diagnostics);
                    push_group(&mut self.groups, &prefix, endpoints);
                    self.follow_scope(file, body, Some(&prefix));
                    continue;
                }
                Plugin::Imported {
                    name,
                    specifier,
                    target,
                } => (name, specifier, target),
            };

            match target {
                ModuleTarget::File(target) => {
                    if self.active.contains(&target) {
                        debug!(path = %target.display(), "plugin cycle, not following");
                        continue;
                    }
                    let Some(route_file) = context.file(&target) else {
                        continue;
                    };
                    debug!(prefix = %prefix, file = %route_file.rel_path, "parsing route file");
                    let endpoints = self.parser.parse(route_file, &mut self.diagnostics);
                    push_group(&mut self.groups, &prefix, endpoints);
                    self.follow(&target, Some(&prefix));
                }
                ModuleTarget::Missing(guess) => {
                    let rel = context.relative_path(&guess);
                    warn!(plugin = %name, path = %rel, "registered route file not found");
                    self.diagnostics.push(Diagnostic::new(
                        DiagnosticKind::MissingFile,
                        rel,
                        format!("'{}' imported from '{}' could not be resolved", name, specifier),
                    ));
                }
                ModuleTarget::Package(_) => {}
            }
        }
    }
}
