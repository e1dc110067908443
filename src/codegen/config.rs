//! Compile options
//!
//! Everything a single compilation reads besides the document. Options are
//! plain values; file and environment loading lives in [`crate::config`].

use crate::registry::PreRegistry;
use crate::schema::{ParseOptions, DEFAULT_EXAMPLES_KEY, DEFAULT_MAX_DEPTH};

/// Options for one compilation
#[derive(Debug, Clone, PartialEq)]
pub struct CompileOptions {
    /// Emit route schemas and the `Request`/`Response` tables
    pub include_routes: bool,
    /// Nesting limit shared by parsing, dependency extraction and conversion
    pub max_depth: usize,
    /// Lines placed verbatim after the zod import (caller validator imports)
    pub import_lines: Vec<String>,
    /// Vendor key carrying example literals
    pub examples_key: String,
    /// Validators the caller already owns
    pub pre_registry: PreRegistry,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            include_routes: true,
            max_depth: DEFAULT_MAX_DEPTH,
            import_lines: Vec::new(),
            examples_key: DEFAULT_EXAMPLES_KEY.to_string(),
            pre_registry: PreRegistry::new(),
        }
    }
}

impl CompileOptions {
    pub fn parse_options(&self) -> ParseOptions {
        ParseOptions {
            examples_key: self.examples_key.clone(),
            max_depth: self.max_depth,
        }
    }

    pub fn without_routes(mut self) -> Self {
        self.include_routes = false;
        self
    }

    pub fn with_pre_registry(mut self, pre_registry: PreRegistry) -> Self {
        self.pre_registry = pre_registry;
        self
    }

    pub fn with_import_line(mut self, line: impl Into<String>) -> Self {
        self.import_lines.push(line.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = CompileOptions::default();
        assert!(options.include_routes);
        assert_eq!(options.max_depth, 64);
        assert_eq!(options.examples_key, "x-contract-examples");
        assert!(options.pre_registry.is_empty());
    }

    #[test]
    fn test_parse_options_follow_compile_options() {
        let options = CompileOptions {
            max_depth: 8,
            examples_key: "x-samples".into(),
            ..Default::default()
        };
        let parse = options.parse_options();
        assert_eq!(parse.max_depth, 8);
        assert_eq!(parse.examples_key, "x-samples");
    }
}
