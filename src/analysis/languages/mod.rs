//! Language-specific analyzer implementations.

mod typescript;

pub use typescript::TypeScriptAnalyzer;

use super::LanguageAnalyzer;
use once_cell::sync::OnceCell;

/// Static storage for TypeScript analyzer.
static TYPESCRIPT_ANALYZER: OnceCell<TypeScriptAnalyzer> = OnceCell::new();

fn typescript() -> &'static TypeScriptAnalyzer {
    TYPESCRIPT_ANALYZER.get_or_init(TypeScriptAnalyzer::new)
}

/// Get an analyzer for the given file extension.
pub fn get_analyzer(ext: &str) -> Option<&'static dyn LanguageAnalyzer> {
    let analyzer = typescript();
    if analyzer.handles_extension(ext) {
        Some(analyzer as &dyn LanguageAnalyzer)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_analyzer() {
        assert!(get_analyzer("ts").is_some());
        assert!(get_analyzer("tsx").is_some());
        assert_eq!(get_analyzer("ts").map(|a| a.language_id()), Some("typescript"));
        assert!(get_analyzer("rs").is_none());
        assert!(get_analyzer("js").is_none());
    }
}
