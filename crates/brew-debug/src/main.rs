use std::io::{self, BufReader};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use brew_debug::{DebugAdapter, DebugServer, DEFAULT_PORT};
use brew_host::engine::trace::SOURCE_EXTENSION;
use brew_host::{EngineRegistry, TraceEngine, DEFAULT_DIRECTORY_EXTENSION};
use clap::Parser;
use tracing::info;

/// brew debug adapter.
///
/// Serves the Debug Adapter Protocol over TCP, one session per connection,
/// or over stdio with `--stdio`.
#[derive(Debug, Parser)]
#[command(name = "brew-debug", version, about)]
struct Cli {
    /// TCP port to listen on.
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Address to bind.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Serve a single session on stdin/stdout instead of TCP.
    #[arg(long)]
    stdio: bool,

    /// Engine extension used for directory targets.
    #[arg(long, default_value = DEFAULT_DIRECTORY_EXTENSION)]
    directory_extension: String,

    /// Files or directories whose trace code is never stopped in.
    #[arg(long = "internal", value_name = "PATH")]
    internal: Vec<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let registry = Arc::new(build_registry(&cli));

    if cli.stdio {
        info!("Starting brew-debug on stdio");
        let mut adapter = DebugAdapter::new(registry);
        adapter
            .run(BufReader::new(io::stdin()), io::stdout())
            .context("stdio session failed")?;
        return Ok(());
    }

    let server = DebugServer::bind((cli.host.as_str(), cli.port), registry)
        .with_context(|| format!("cannot listen on {}:{}", cli.host, cli.port))?;
    server.serve().context("server stopped")?;
    Ok(())
}

/// The trace engine serves its own extension and the directory extension.
fn build_registry(cli: &Cli) -> EngineRegistry {
    let engine: Arc<TraceEngine> = Arc::new(
        cli.internal
            .iter()
            .fold(TraceEngine::new(), |engine, path| engine.with_internal_path(path)),
    );
    let mut registry =
        EngineRegistry::new().with_directory_extension(cli.directory_extension.as_str());
    registry.register(SOURCE_EXTENSION, engine.clone());
    if cli.directory_extension != SOURCE_EXTENSION {
        registry.register(cli.directory_extension.as_str(), engine);
    }
    registry
}
