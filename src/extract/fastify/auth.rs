//! Hook-convention auth detection.
//!
//! A route is authenticated when one of its lifecycle hooks (in configured
//! order) references a known auth middleware:
//!
//! ```typescript
//! app.get('/me', { preHandler: [app.authenticate] }, handler)
//! ```

use tree_sitter::Node;

use crate::analysis::syntax::{self, text};
use crate::config::FastifyAuthConfig;
use crate::model::HookAuth;

/// Lifecycle hook names; never treated as middleware.
const HOOK_NAMES: &[&str] = &[
    "preHandler",
    "onRequest",
    "preValidation",
    "preParsing",
    "preSerialization",
    "onSend",
    "onResponse",
    "onError",
    "onTimeout",
];

const RESERVED_WORDS: &[&str] = &["async", "await", "function", "const", "let", "var"];

/// Detects auth middleware in route option objects.
#[derive(Debug, Clone)]
pub struct HookAuthDetector {
    middleware_names: Vec<String>,
    hook_points: Vec<String>,
}

impl HookAuthDetector {
    pub fn new(config: &FastifyAuthConfig) -> Self {
        Self {
            middleware_names: config
                .middleware_names
                .iter()
                .map(|n| n.trim().to_lowercase())
                .filter(|n| !n.is_empty())
                .collect(),
            hook_points: config.hook_points.clone(),
        }
    }

    /// Classify a route from its call arguments.
    ///
    /// Only the first object-literal argument is inspected.
    pub fn detect(&self, args: &[Node], source: &[u8]) -> HookAuth {
        let Some(options) = args
            .iter()
            .map(|a| syntax::unwrap_expression(*a))
            .find(|a| a.kind() == "object")
        else {
            return HookAuth::public();
        };

        for hook in &self.hook_points {
            let Some(value) = syntax::object_property(options, hook, source) else {
                continue;
            };
            let middlewares: Vec<String> = referenced_names(value, source)
                .into_iter()
                .filter(|name| self.is_auth_middleware(name))
                .collect();
            if !middlewares.is_empty() {
                return HookAuth {
                    required: true,
                    middlewares,
                    hook_point: Some(hook.clone()),
                };
            }
        }

        HookAuth::public()
    }

    /// Case-insensitive containment of any configured middleware name.
    pub fn is_auth_middleware(&self, name: &str) -> bool {
        let lower = name.to_lowercase();
        self.middleware_names.iter().any(|m| lower.contains(m.as_str()))
    }
}

/// Every identifier in a hook value, in source order.
///
/// For a shorthand `{ preHandler }` the key itself is the value and is
/// skipped as a hook name.
fn referenced_names(value: Node, source: &[u8]) -> Vec<String> {
    let mut names = Vec::new();
    syntax::visit(value, &mut |node| {
        if matches!(
            node.kind(),
            "identifier" | "property_identifier" | "shorthand_property_identifier"
        ) {
            let name = text(node, source);
            if !HOOK_NAMES.contains(&name) && !RESERVED_WORDS.contains(&name) {
                names.push(name.to_string());
            }
        }
        true
    });
    names
}
