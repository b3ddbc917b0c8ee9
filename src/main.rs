use anyhow::Context;
use clap::Parser;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use creative_studio::access::MODEL_TIERS;
use creative_studio::api;
use creative_studio::app::{AppConfig, AppState};
use creative_studio::client::StudioClient;
use creative_studio::generation::{
    GenerationTask, ProgressCurve, ProgressPhase, TaskAwaiter, TaskHandle, TaskKind,
};
use creative_studio::storage::Storage;

mod cli;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.debug { "creative_studio=debug" } else { "creative_studio=info" };
    let (writer, _guard) = tracing_appender::non_blocking(std::io::stdout());
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(writer)
        .init();

    let config = AppConfig::load(Some(cli.config.as_path())).context("failed to load configuration")?;

    match cli.command.unwrap_or_default() {
        Commands::Serve { bind } => serve(config, bind).await,
        Commands::Migrate => migrate(&config).await,
        Commands::Tiers => {
            for (model, tier) in MODEL_TIERS {
                println!("{:<20} {}", model, tier);
            }
            Ok(())
        }
        Commands::Config => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
        Commands::Await { server, kind, user, task_id } => {
            await_task(&config, &server, kind, user, &task_id).await
        }
    }
}

async fn serve(mut config: AppConfig, bind: Option<String>) -> anyhow::Result<()> {
    if let Some(bind) = bind {
        config.server.bind_addr = bind;
    }
    let bind_addr = config.server.bind_addr.clone();

    info!("Starting creative-studio {}", env!("CARGO_PKG_VERSION"));
    let state = AppState::new(config).await.context("failed to initialize state")?;
    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;
    info!("Server running on http://{}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

async fn migrate(config: &AppConfig) -> anyhow::Result<()> {
    let storage = Storage::from_config(&config.database)
        .await?
        .context("no database configured (set database.url or DATABASE_URL)")?;
    let applied = storage.database.run_migrations().await?;
    let version = storage.database.get_database_version().await?;
    info!("Applied {} migrations, schema at version {}", applied, version);
    storage.database.close().await;
    Ok(())
}

async fn await_task(
    config: &AppConfig,
    server: &str,
    kind: TaskKind,
    user: Option<String>,
    task_id: &str,
) -> anyhow::Result<()> {
    let handle = TaskHandle::parse(task_id, kind)?;
    let policy = config.polling.policy(kind);
    let client = StudioClient::new(server, user, Duration::from_secs(30))?;
    let awaiter = TaskAwaiter::new(client, policy);

    let curve = ProgressCurve::default();
    let mut phase = ProgressPhase::Starting;
    let mut phase_started = Instant::now();
    let observer = |task: &GenerationTask| {
        let next = ProgressPhase::from_status(task.status, phase);
        if next != phase {
            phase = next;
            phase_started = Instant::now();
        }
        info!(
            "{} {}: {} ({:.0}%)",
            kind,
            task.id,
            task.status,
            curve.project(phase, phase_started.elapsed())
        );
    };

    let output = awaiter.await_completion(&handle, observer).await?;
    for url in output {
        println!("{}", url);
    }
    Ok(())
}
