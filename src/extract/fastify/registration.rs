//! `app.register(plugin, { prefix })` discovery.

use tracing::debug;
use tree_sitter::Node;

use crate::analysis::syntax::{self, text};
use crate::analysis::{AnalysisContext, ImportKind, ModuleTarget, SourceFile};

/// The plugin half of a registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Plugin<'t> {
    /// Bound by a default or named import of a relative module.
    Imported {
        name: String,
        specifier: String,
        target: ModuleTarget,
    },
    /// A function literal passed straight to `register`.
    Inline(Node<'t>),
}

/// One plugin registration found in a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteRegistration<'t> {
    pub plugin: Plugin<'t>,
    /// URL prefix from `opts.prefix`, `/` when absent or not a literal.
    pub prefix: String,
    pub line: usize,
}

/// Find every `X.register(plugin, opts?)` call at the top level of `file`.
pub fn parse_registrations<'t>(
    context: &AnalysisContext,
    file: &'t SourceFile,
) -> Vec<RouteRegistration<'t>> {
    parse_registrations_in(context, file, file.parsed.tree.root_node())
}

/// Registrations made directly inside `scope`.
///
/// Calls nested in an inline plugin below `scope` belong to that plugin and
/// are left out. Package plugins (`@fastify/cors`) and namespace imports are
/// not route files and are ignored.
pub fn parse_registrations_in<'t>(
    context: &AnalysisContext,
    file: &'t SourceFile,
    scope: Node<'t>,
) -> Vec<RouteRegistration<'t>> {
    let source = &file.parsed.source[..];
    let mut registrations = Vec::new();

    for call in scoped_calls(scope, source) {
        if !is_register_call(call, source) {
            continue;
        }

        let args = syntax::call_arguments(call);
        let Some(plugin) = args.first().map(|a| syntax::unwrap_expression(*a)) else {
            continue;
        };
        let prefix = args
            .get(1)
            .map(|opts| syntax::unwrap_expression(*opts))
            .filter(|opts| opts.kind() == "object")
            .and_then(|opts| syntax::object_property(opts, "prefix", source))
            .and_then(|value| syntax::string_value(value, source))
            .unwrap_or_else(|| "/".to_string());
        let line = syntax::line_of(call);

        if syntax::is_function(plugin) {
            registrations.push(RouteRegistration {
                plugin: Plugin::Inline(plugin),
                prefix,
                line,
            });
            continue;
        }
        if plugin.kind() != "identifier" {
            continue;
        }

        let name = text(plugin, source);
        let Some(binding) = file
            .facts
            .import(name)
            .filter(|b| b.kind != ImportKind::Namespace && b.is_relative())
        else {
            debug!(plugin = name, file = %file.rel_path, "skipping non-route plugin");
            continue;
        };

        registrations.push(RouteRegistration {
            plugin: Plugin::Imported {
                name: name.to_string(),
                specifier: binding.source.clone(),
                target: context.resolve_module(&file.parsed.path, &binding.source),
            },
            prefix,
            line,
        });
    }

    registrations
}

/// Every call expression under `scope`, without entering inline plugins
/// other than `scope` itself.
pub fn scoped_calls<'t>(scope: Node<'t>, source: &[u8]) -> Vec<Node<'t>> {
    let mut calls = Vec::new();
    syntax::visit(scope, &mut |node| {
        if node != scope && is_inline_plugin(node, source) {
            return false;
        }
        if node.kind() == "call_expression" {
            calls.push(node);
        }
        true
    });
    calls
}

fn is_register_call(call: Node, source: &[u8]) -> bool {
    call.child_by_field_name("function")
        .filter(|f| f.kind() == "member_expression")
        .and_then(|f| syntax::callee_name(f, source))
        == Some("register")
}

/// Whether `node` is a function literal given as the plugin of a
/// `register` call.
fn is_inline_plugin(node: Node, source: &[u8]) -> bool {
    if !syntax::is_function(node) {
        return false;
    }
    let mut outer = node;
    while let Some(parent) = outer
        .parent()
        .filter(|p| p.kind() == "parenthesized_expression")
    {
        outer = parent;
    }
    let Some(call) = outer
        .parent()
        .filter(|p| p.kind() == "arguments")
        .and_then(|args| args.parent())
        .filter(|c| c.kind() == "call_expression")
    else {
        return false;
    };
    is_register_call(call, source) && syntax::call_arguments(call).first() == Some(&outer)
}
