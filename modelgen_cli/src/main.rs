//! `modelgen`: load and resolve a model tree, optionally keep it live under a file watch.
//!
//! Run from repo root: `cargo run -p modelgen-cli -- --config modelgen.yaml --watch`

use clap::Parser;
use modelgen::{
    ChangeSet, ModelError, ModelLoader, ModelState, ModelSubscriber, ToolConfig, WatchEngine,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "modelgen")]
#[command(about = "Load, validate and resolve a model tree", long_about = None)]
struct Cli {
    /// Tool configuration file (YAML)
    #[arg(long, env = "MODELGEN_CONFIG", default_value = "modelgen.yaml")]
    config: PathBuf,
    /// Keep running and re-resolve on every change under the model root
    #[arg(long)]
    watch: bool,
}

/// Logs every published change set.
struct LogSubscriber;

impl ModelSubscriber for LogSubscriber {
    fn on_files_changed(&self, changes: &ChangeSet<'_>) {
        for file in changes.model_files() {
            tracing::info!(file = %file.id, classes = file.classes.len(), "model file ready");
        }
        for file in changes.domain_files() {
            tracing::info!(file = %file.id, domains = file.domains.len(), "domain file ready");
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("modelgen=info")),
        )
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{}", err);
            ExitCode::from(err.exit_code() as u8)
        }
    }
}

async fn run(cli: Cli) -> Result<(), ModelError> {
    let config = ToolConfig::load(&cli.config)?;
    let loader = ModelLoader::new(&config)?;
    let graph = loader.load()?;
    let state = ModelState::new(graph);

    let mut engine = WatchEngine::new(loader, state, config.debounce());
    engine.subscribe(Arc::new(LogSubscriber));
    engine.publish_all()?;

    if !cli.watch {
        return Ok(());
    }
    tokio::select! {
        res = engine.run() => res,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupted, stopping watch");
            Ok(())
        }
    }
}
