use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use finpipe_core::Category;
use finpipe_runner::{Config, JsonFormatter, Pipeline, PipelineOptions, ReportFormatter, TextFormatter};

#[derive(Parser)]
#[command(name = "finpipe", version, about = "Financial warehouse pipeline and validation")]
struct Cli {
    /// Config file (default: .finpipe/finpipe.toml under the current directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write the default config to .finpipe/finpipe.toml
    Init {
        /// Overwrite an existing config
        #[arg(long)]
        force: bool,
    },

    /// List the registered checks
    Checks {
        #[arg(long)]
        category: Option<Category>,
        /// Also print each rendered query
        #[arg(long)]
        sql: bool,
    },

    /// Run the validation engine against the warehouse
    Validate {
        #[arg(long)]
        json: bool,
    },

    /// Extract/load, transform, test, validate and notify
    Pipeline {
        /// Rebuild incremental models from scratch
        #[arg(long)]
        full_refresh: bool,
        #[arg(long)]
        skip_extract_load: bool,
        /// Skip the transformation project's own tests
        #[arg(long)]
        skip_tests: bool,
        #[arg(long)]
        generate_docs: bool,
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let root = std::env::current_dir()?;
    let code = match cli.cmd {
        Command::Init { force } => {
            let path = cli.config.unwrap_or_else(|| Config::config_path(&root));
            if path.exists() && !force {
                return Err(anyhow!("{} already exists (use --force to overwrite)", path.display()));
            }
            let name = root.file_name().and_then(|s| s.to_str()).unwrap_or("finpipe");
            Config::default_for_project(name).save_to(&path)?;
            println!("Wrote {}", path.display());
            0
        }
        Command::Checks { category, sql } => {
            let cfg = load_config(&root, cli.config.as_deref())?;
            let registry = cfg.registry()?;
            let params = finpipe_checks::QueryParams::for_schema(cfg.warehouse.schema.clone());
            let categories: Vec<Category> = match category {
                Some(c) => vec![c],
                None => Category::ALL.to_vec(),
            };
            for category in categories {
                let defs = registry.checks_for(category);
                let kind = if category.is_critical() { "critical" } else { "advisory" };
                println!("{category} ({} checks, {kind})", defs.len());
                for def in defs {
                    println!("  {}: {} {}", def.name, def.rule.field, def.rule.expectation());
                    if sql {
                        println!("    {}", registry.render(def, &params));
                    }
                }
            }
            0
        }
        Command::Validate { json } => {
            let cfg = load_config(&root, cli.config.as_deref())?;
            let report = cfg.validator(&root)?.run_all();
            let formatter: Box<dyn ReportFormatter> = if json {
                Box::new(JsonFormatter { pretty: true })
            } else {
                Box::new(TextFormatter)
            };
            print!("{}", formatter.format(&report)?);
            report.exit_code()
        }
        Command::Pipeline {
            full_refresh,
            skip_extract_load,
            skip_tests,
            generate_docs,
            json,
        } => {
            let cfg = load_config(&root, cli.config.as_deref())?;
            let pipeline = Pipeline::from_config(&cfg, &root)?;
            let outcome = pipeline.run(&PipelineOptions {
                full_refresh,
                skip_extract_load,
                skip_tests,
                generate_docs,
            });
            if json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                if let Some(report) = &outcome.validation {
                    print!("{}", TextFormatter.format(report)?);
                }
                match &outcome.error {
                    None => println!("Pipeline succeeded in {:.2}s", outcome.duration_ms as f64 / 1000.0),
                    Some(e) => println!("Pipeline failed after {:.2}s: {e}", outcome.duration_ms as f64 / 1000.0),
                }
            }
            outcome.exit_code()
        }
    };

    std::process::exit(code)
}

fn load_config(root: &Path, explicit: Option<&Path>) -> Result<Config> {
    match explicit {
        Some(path) => Config::load_from(path),
        None => Config::load_or_default(root),
    }
}
