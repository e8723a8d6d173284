use anyhow::Result;
use audit_protocol::Corpus;
use clap::{Parser, Subcommand};
use config::AuditConfig;
use std::path::PathBuf;

mod app;
mod commands;
mod config;
mod fixture;
mod http;

#[derive(Parser)]
#[command(name = "manual-audit")]
#[command(about = "Audit maintenance manuals against regulations and guidance", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to ./manual-audit.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory for the store and index (overrides config and AUDIT_DATA_DIR)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors (stdout is reserved for JSON)
    #[arg(long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Chunk a UTF-8 text/markdown file and add it to the store and index
    Ingest {
        /// manual | regulation | guidance (amc, gm) | evidence (litigation)
        #[arg(long)]
        corpus: Corpus,

        file: PathBuf,

        /// Document id (default: file stem plus timestamp)
        #[arg(long)]
        id: Option<String>,

        #[arg(long)]
        title: Option<String>,
    },

    /// Print the chunks of a file without storing them
    Chunk {
        #[arg(long, default_value = "manual")]
        corpus: Corpus,

        file: PathBuf,
    },

    /// List stored documents
    Documents {
        #[arg(long)]
        corpus: Option<Corpus>,
    },

    /// Audit a stored manual; Ctrl-C cancels after chunks in flight
    Audit {
        document_id: String,

        /// Replay verdicts from a fixture file instead of calling the classifier
        #[arg(long)]
        fixture: Option<PathBuf>,

        /// Override the configured worker count
        #[arg(long)]
        workers: Option<usize>,
    },

    /// Show the status and chunk errors of an audit run
    Status { run_id: String },

    /// List audit runs
    Runs,

    /// Generate the final report of a finished run
    Report {
        run_id: String,

        /// Write JSON to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();

    let mut config = AuditConfig::load(cli.config.as_deref())?;
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }

    match cli.command {
        Commands::Chunk { corpus, file } => {
            config.validate()?;
            commands::chunk(&config, corpus, file)
        }
        Commands::Ingest {
            corpus,
            file,
            id,
            title,
        } => {
            let app = app::App::open(config).await?;
            commands::ingest(&app, corpus, file, id, title).await
        }
        Commands::Documents { corpus } => {
            let app = app::App::open(config).await?;
            commands::documents(&app, corpus).await
        }
        Commands::Audit {
            document_id,
            fixture,
            workers,
        } => {
            if let Some(path) = fixture {
                config.classifier.kind = config::ClassifierKind::Fixture;
                config.classifier.fixture = Some(path);
            }
            if let Some(workers) = workers {
                config.engine.max_workers = workers;
            }
            let app = app::App::open(config).await?;
            commands::audit(&app, &document_id).await
        }
        Commands::Status { run_id } => {
            let app = app::App::open(config).await?;
            commands::status(&app, &run_id).await
        }
        Commands::Runs => {
            let app = app::App::open(config).await?;
            commands::runs(&app).await
        }
        Commands::Report { run_id, output } => {
            let app = app::App::open(config).await?;
            commands::report(&app, &run_id, output).await
        }
    }
}
