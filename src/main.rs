use std::sync::Arc;

use clap::{Parser, Subcommand};
use qubic_radar::{
    config::AppConfig,
    engine::{pipeline::EventPipeline, rule_engine::RuleEngine},
    http_client::HttpClientPool,
    http_server::{ApiState, run_server},
    notification::{NotificationRouter, batcher::NotificationBatcher},
    persistence::sqlite::SqliteRepository,
};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file, without extension.
    #[arg(long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Runs the webhook ingestion server and the notification batcher.
    Serve,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let subscriber =
        FmtSubscriber::builder().with_env_filter(EnvFilter::from_default_env()).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve => serve(cli.config.as_deref()).await?,
    }

    Ok(())
}

async fn serve(config_path: Option<&str>) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing::debug!("Loading application configuration...");
    let config = AppConfig::new(config_path)?;
    tracing::debug!(
        database_url = %config.database_url,
        listen_address = %config.server.listen_address,
        "Configuration loaded."
    );

    let repo = Arc::new(SqliteRepository::new(&config.database_url).await?);
    repo.run_migrations().await?;
    tracing::info!("Database migrations completed.");

    let http_pool = Arc::new(HttpClientPool::new());
    let router = Arc::new(NotificationRouter::new(
        repo.clone(),
        http_pool,
        config.notifications.clone(),
    ));

    // The repository doubles as the key-value store backing batch queues.
    let batcher = Arc::new(NotificationBatcher::new(
        repo.clone(),
        repo.clone(),
        router.clone(),
        config.notifications.batcher.clone(),
    ));

    let rule_engine = RuleEngine::new(
        repo.clone(),
        config.rule_evaluation_enabled,
        config.deduplication_enabled,
    );

    // The external analysis model is wired in behind the DetectionAnalyzer
    // trait; without one, the pipeline runs the rule path only.
    let pipeline = Arc::new(EventPipeline::new(
        repo.clone(),
        rule_engine,
        None,
        router,
        batcher.clone(),
    ));

    let batcher_task = batcher.clone();
    tokio::spawn(async move {
        batcher_task.run().await;
    });
    tracing::info!("Notification batcher started.");

    let state = ApiState {
        repo,
        pipeline,
        webhook_secret: Arc::new(config.webhook_secret.clone()),
    };
    run_server(&config.server.listen_address, state).await
}
