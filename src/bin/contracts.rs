//! Contracts compiler CLI
//!
//! Compiles a local API description into a zod contracts module and offers
//! a few inspection commands (dependency graph, fingerprints).

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use zod_contracts::config::self_test_path_for;
use zod_contracts::graph::{compute_scc_analysis, SchemaGraph};
use zod_contracts::{compile, compute_fingerprint, render_self_tests, CompileError, CompilerConfig, ConfigError, Document};

#[derive(Parser)]
#[command(name = "zod-contracts")]
#[command(about = "Compile API descriptions into zod validators and route contracts")]
struct Cli {
    /// Config file (defaults: contracts.toml, .contracts.toml, config/contracts.toml)
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate the contracts module
    Generate {
        /// API description (JSON)
        input: PathBuf,
        /// Output file (overrides config)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Skip route schemas and the Request/Response tables
        #[arg(long)]
        no_routes: bool,
        /// Also write a vitest self-test module
        #[arg(long)]
        self_test: bool,
        /// Extra import line after the zod import (repeatable)
        #[arg(long = "import")]
        imports: Vec<String>,
        /// Print to stdout instead of writing files
        #[arg(long)]
        stdout: bool,
    },

    /// Export the component dependency graph as GraphViz DOT
    Graph {
        /// API description (JSON)
        input: PathBuf,
        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the structural fingerprint of each component
    Fingerprint {
        /// API description (JSON)
        input: PathBuf,
        /// Only this component
        #[arg(short = 'n', long)]
        component: Option<String>,
    },

    /// Write a config file with default values
    InitConfig {
        #[arg(default_value = "contracts.toml")]
        path: PathBuf,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(exit_code(&e));
    }
}

fn exit_code(error: &anyhow::Error) -> i32 {
    if let Some(e) = error.downcast_ref::<CompileError>() {
        return e.exit_code();
    }
    if let Some(e) = error.downcast_ref::<ConfigError>() {
        return e.exit_code();
    }
    if error.downcast_ref::<serde_json::Error>().is_some() {
        return 2;
    }
    if error.downcast_ref::<std::io::Error>().is_some() {
        return 3;
    }
    1
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = CompilerConfig::load_from(cli.config.as_deref())?;

    match cli.command {
        Commands::Generate {
            input,
            output,
            no_routes,
            self_test,
            imports,
            stdout,
        } => {
            let document = read_document(&input)?;
            let mut options = config.to_compile_options()?;
            if no_routes {
                options.include_routes = false;
            }
            for line in imports {
                if !options.import_lines.contains(&line) {
                    options.import_lines.push(line);
                }
            }

            let compiled = compile(&document, &options)?;
            let output_path = output.unwrap_or_else(|| config.output.path.clone());

            if stdout {
                print!("{}", compiled.code);
                return Ok(());
            }

            write_file(&output_path, &compiled.code)?;
            println!(
                "✅ {} ({} declarations, {} aliases)",
                output_path.display(),
                compiled.canonical_declarations().count(),
                compiled.aliases().count()
            );

            if self_test || config.output.self_test {
                let test_path = self_test_path_for(&output_path);
                match render_self_tests(&compiled, &module_specifier(&output_path)) {
                    Some(tests) => {
                        write_file(&test_path, &tests)?;
                        println!("✅ {}", test_path.display());
                    }
                    None => println!("ℹ️  No component carries examples, self-tests skipped"),
                }
            }
            Ok(())
        }

        Commands::Graph { input, output } => {
            let document = read_document(&input)?;
            let options = config.to_compile_options()?;
            let doc = Document::parse(&document, &options.parse_options(), false)?;
            let graph = SchemaGraph::build(&doc.components, options.max_depth)?;
            let analysis = compute_scc_analysis(&graph);
            let dot = graph.to_dot(&analysis);

            match output {
                Some(path) => {
                    write_file(&path, &dot)?;
                    println!(
                        "✅ {} ({} schemas, {} references, {} cycle groups)",
                        path.display(),
                        graph.schema_count(),
                        graph.edge_count(),
                        analysis.groups.len()
                    );
                }
                None => print!("{}", dot),
            }
            Ok(())
        }

        Commands::Fingerprint { input, component } => {
            let document = read_document(&input)?;
            let options = config.to_compile_options()?;
            let doc = Document::parse(&document, &options.parse_options(), false)?;

            let mut found = false;
            for (name, node) in &doc.components {
                if component.as_deref().is_some_and(|wanted| wanted != name) {
                    continue;
                }
                found = true;
                println!("{}  {}", compute_fingerprint(node), name);
            }
            if let Some(wanted) = component.filter(|_| !found) {
                anyhow::bail!("component '{}' not found", wanted);
            }
            Ok(())
        }

        Commands::InitConfig { path } => {
            if path.exists() {
                anyhow::bail!("{} already exists", path.display());
            }
            CompilerConfig::default().save(&path)?;
            println!("✅ Wrote {}", path.display());
            Ok(())
        }
    }
}

fn read_document(path: &Path) -> anyhow::Result<Value> {
    let content = std::fs::read_to_string(path)?;
    serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))
}

fn write_file(path: &Path, content: &str) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;
    Ok(())
}

/// Import specifier of the generated module as seen from its self-test file
fn module_specifier(output: &Path) -> String {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "contracts".to_string());
    format!("./{}", stem)
}
