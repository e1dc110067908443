//! Configuration management for the contracts compiler
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (contracts.toml)
//! - Environment variables (CONTRACTS__*)
//!
//! ## Example config file (contracts.toml):
//! ```toml
//! [compile]
//! include_routes = true
//! max_depth = 64
//! examples_key = "x-contract-examples"
//!
//! [output]
//! path = "src/contracts.ts"
//! self_test = true
//! imports = ['import { money } from "./money";']
//!
//! [[pre_registered]]
//! name = "isoDateSchema"
//! schema = '{ "type": "string", "format": "date" }'
//! output_type = "Date"
//! import = 'import { isoDateSchema } from "./dates";'
//! ```

use config_crate::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

use crate::codegen::CompileOptions;
use crate::error::ConfigError;
use crate::registry::PreRegistry;
use crate::schema::{NodeParser, DEFAULT_EXAMPLES_KEY, DEFAULT_MAX_DEPTH};

/// Main configuration for the compiler binary
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompilerConfig {
    /// Compile settings
    #[serde(default)]
    pub compile: CompileConfig,

    /// Output settings
    #[serde(default)]
    pub output: OutputConfig,

    /// Validators the generated module reuses instead of declaring
    #[serde(default)]
    pub pre_registered: Vec<PreRegisteredConfig>,
}

/// Compile configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompileConfig {
    /// Emit route schemas and the Request/Response tables
    #[serde(default = "default_true")]
    pub include_routes: bool,

    /// Nesting limit for schema trees
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// Vendor key carrying example literals
    #[serde(default = "default_examples_key")]
    pub examples_key: String,
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Generated module path
    #[serde(default = "default_output_path")]
    pub path: PathBuf,

    /// Also write a vitest self-test module next to the output
    #[serde(default)]
    pub self_test: bool,

    /// Extra import lines placed after the zod import
    #[serde(default)]
    pub imports: Vec<String>,
}

/// A caller validator, as written in the config file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreRegisteredConfig {
    /// Identifier of the validator (e.g. `isoDateSchema`)
    pub name: String,

    /// The schema it validates: a JSON string or an inline table
    pub schema: Value,

    /// Output type when the validator transforms its input
    #[serde(default)]
    pub output_type: Option<String>,

    /// Import line bringing the validator into scope
    #[serde(default)]
    pub import: Option<String>,
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_max_depth() -> usize {
    DEFAULT_MAX_DEPTH
}

fn default_examples_key() -> String {
    DEFAULT_EXAMPLES_KEY.to_string()
}

fn default_output_path() -> PathBuf {
    PathBuf::from("contracts.ts")
}

impl Default for CompileConfig {
    fn default() -> Self {
        Self {
            include_routes: true,
            max_depth: default_max_depth(),
            examples_key: default_examples_key(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: default_output_path(),
            self_test: false,
            imports: Vec::new(),
        }
    }
}

impl PreRegisteredConfig {
    /// The schema as JSON, parsing it when it was given as a string
    pub fn schema_json(&self) -> Result<Value, ConfigError> {
        match &self.schema {
            Value::String(text) => Ok(serde_json::from_str(text)?),
            other => Ok(other.clone()),
        }
    }
}

impl CompilerConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration, adding an explicit file when given
    pub fn load_from(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        // Load from default locations
        let config_locations = ["contracts.toml", ".contracts.toml", "config/contracts.toml"];

        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        // Load from XDG config directory
        if let Some(config_dir) = directories::ProjectDirs::from("dev", "zod-contracts", "zod-contracts") {
            let xdg_config = config_dir.config_dir().join("contracts.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        // Load from specified path
        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // Load from environment variables (CONTRACTS__*)
        builder = builder.add_source(
            Environment::with_prefix("CONTRACTS")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        Ok(config.try_deserialize()?)
    }

    /// Save configuration to a file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Build compile options, parsing and fingerprinting every
    /// pre-registered schema
    pub fn to_compile_options(&self) -> Result<CompileOptions, ConfigError> {
        let mut options = CompileOptions {
            include_routes: self.compile.include_routes,
            max_depth: self.compile.max_depth,
            import_lines: Vec::new(),
            examples_key: self.compile.examples_key.clone(),
            pre_registry: PreRegistry::new(),
        };
        let parse_options = options.parse_options();

        for entry in &self.pre_registered {
            let schema = NodeParser::new(&entry.name, &parse_options).parse(&entry.schema_json()?)?;
            options
                .pre_registry
                .pre_register_schema(entry.name.clone(), &schema, entry.output_type.clone())?;
            tracing::debug!(name = %entry.name, "pre-registered validator loaded");
        }

        let imports = self
            .output
            .imports
            .iter()
            .chain(self.pre_registered.iter().filter_map(|entry| entry.import.as_ref()));
        for line in imports {
            if !options.import_lines.contains(line) {
                options.import_lines.push(line.clone());
            }
        }
        Ok(options)
    }

    /// Path of the self-test module for the configured output
    /// (`contracts.ts` → `contracts.test.ts`)
    pub fn self_test_path(&self) -> PathBuf {
        self_test_path_for(&self.output.path)
    }
}

/// `dir/contracts.ts` → `dir/contracts.test.ts`
pub fn self_test_path_for(output: &Path) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "contracts".to_string());
    output.with_file_name(format!("{}.test.ts", stem))
}
