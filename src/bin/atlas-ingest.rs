//! Atlas Ingest CLI: batch ingestion of articles into the knowledge graph.
//!
//! Usage:
//!   atlas-ingest run --config atlas.yaml [--prefix wiki/] [--report out.json]
//!   atlas-ingest categories [--config atlas.yaml]
//!   atlas-ingest report <path>

use atlas_ingest::config::Config;
use atlas_ingest::pipeline::{build_runner, CancellationToken, Components, RunReport};
use atlas_ingest::schema::{CategoryDocs, NodeSubtype};
use atlas_ingest::PipelineError;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const EXIT_CANCELLED: i32 = 130;

#[derive(Parser)]
#[command(
    name = "atlas-ingest",
    version,
    about = "LLM-driven ingestion of articles into a typed knowledge graph"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a batch over the configured document source
    Run {
        /// Path to the YAML configuration file
        #[arg(long)]
        config: PathBuf,
        /// Only process documents under this prefix
        #[arg(long)]
        prefix: Option<String>,
        /// Where to write the run report
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Show the categories and their documentation
    Categories {
        /// Path to the YAML configuration file
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Summarize a persisted run report
    Report {
        /// Path to the report JSON
        path: PathBuf,
    },
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "atlas_ingest=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr),
        )
        .init();
}

fn cmd_run(config_path: &Path, prefix: Option<String>, report: Option<PathBuf>) -> i32 {
    let mut config = match Config::load(config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    if let Some(path) = report {
        config.report.path = path;
    }
    let prefix = prefix.unwrap_or_else(|| config.documents.prefix.clone());

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to create tokio runtime: {}", e);
            return 1;
        }
    };

    rt.block_on(async {
        let runner = match Components::from_config(&config)
            .and_then(|components| build_runner(&config, components))
        {
            Ok(runner) => runner,
            Err(e) => {
                eprintln!("Error: {}", e);
                return 1;
            }
        };

        let cancel = CancellationToken::new();
        let on_signal = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, finishing in-flight documents");
                on_signal.cancel();
            }
        });

        match runner.run(&prefix, &cancel).await {
            Ok(report) => {
                print!("{}", report.summary());
                if report.persist_error.is_some() {
                    1
                } else if report.cancelled {
                    EXIT_CANCELLED
                } else {
                    0
                }
            }
            Err(PipelineError::Configuration(e)) => {
                eprintln!("Error: {}", e);
                1
            }
            Err(e) => {
                eprintln!("Error: run failed: {}", e);
                1
            }
        }
    })
}

fn cmd_categories(config_path: Option<&Path>) -> i32 {
    let docs_dir = match config_path.map(Config::load).transpose() {
        Ok(config) => config.and_then(|c| c.categories.docs_dir),
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    let docs = match docs_dir {
        Some(dir) => match CategoryDocs::load(&dir) {
            Ok(docs) => docs,
            Err(e) => {
                eprintln!("Error: {}", e);
                return 1;
            }
        },
        None => CategoryDocs::builtin(),
    };

    for category in NodeSubtype::CATEGORIES {
        let first_line = docs
            .subcategory_docs(category)
            .ok()
            .and_then(|text| text.lines().next())
            .unwrap_or("");
        println!("{:<12} {}", category.label(), first_line);
    }
    0
}

fn cmd_report(path: &Path) -> i32 {
    match RunReport::load(path) {
        Ok(report) => {
            print!("{}", report.summary());
            0
        }
        Err(e) => {
            eprintln!("Error: cannot read report '{}': {}", path.display(), e);
            1
        }
    }
}

fn main() {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let code = match cli.command {
        Commands::Run {
            config,
            prefix,
            report,
        } => {
            info!(config = %config.display(), "starting run");
            cmd_run(&config, prefix, report)
        }
        Commands::Categories { config } => cmd_categories(config.as_deref()),
        Commands::Report { path } => cmd_report(&path),
    };
    std::process::exit(code);
}
