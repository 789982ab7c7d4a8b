//! Core traits for source analysis.

use std::path::{Path, PathBuf};

use super::FileFacts;

/// Holds a parsed tree-sitter tree and associated metadata.
///
/// This is kept separate from FileFacts so the tree can be walked again by
/// the extractors after the project-wide index is built.
pub struct ParsedFile {
    /// The tree-sitter parse tree.
    pub tree: tree_sitter::Tree,
    /// The original source code (kept for node text extraction).
    pub source: Vec<u8>,
    /// The file path.
    pub path: PathBuf,
}

impl ParsedFile {
    /// Get the source code as a string slice.
    pub fn source_str(&self) -> &str {
        std::str::from_utf8(&self.source).unwrap_or("")
    }

    /// Get text for a tree-sitter node.
    pub fn node_text(&self, node: tree_sitter::Node) -> &str {
        node.utf8_text(&self.source).unwrap_or("")
    }

    /// The node spanning exactly `[start, end)` with the given kind, if any.
    pub fn node_at(&self, start: usize, end: usize, kind: &str) -> Option<tree_sitter::Node<'_>> {
        let mut node = self
            .tree
            .root_node()
            .descendant_for_byte_range(start, end)?;
        loop {
            if node.kind() == kind && node.start_byte() == start && node.end_byte() == end {
                return Some(node);
            }
            node = node.parent()?;
            if node.start_byte() != start || node.end_byte() != end {
                return None;
            }
        }
    }
}

/// Language-specific analyzer trait.
///
/// # Thread Safety
///
/// Note: tree_sitter::Parser is not Sync, so implementations should
/// create parsers as needed.
pub trait LanguageAnalyzer: Send + Sync {
    /// Returns the language identifier (e.g., "typescript").
    fn language_id(&self) -> &'static str;

    /// Returns file extensions this analyzer handles (without dot).
    fn file_extensions(&self) -> &'static [&'static str];

    /// Parse a source file into a tree-sitter tree.
    ///
    /// Partial parse errors are still returned as a valid tree with ERROR nodes.
    fn parse(&self, path: &Path, source: &[u8]) -> anyhow::Result<ParsedFile>;

    /// Extract imports, classes and named declarations from a parsed file.
    fn extract_facts(&self, parsed: &ParsedFile) -> anyhow::Result<FileFacts>;

    /// Check if this analyzer handles the given file extension.
    fn handles_extension(&self, ext: &str) -> bool {
        self.file_extensions().contains(&ext)
    }
}
