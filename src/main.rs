use std::path::Path;
use std::sync::Arc;

use cloudsploit_worker::clients::http::HttpServiceClient;
use cloudsploit_worker::config::AppConfig;
use cloudsploit_worker::queue::{self, HttpQueue};
use cloudsploit_worker::services::catalog::SettingCatalog;
use cloudsploit_worker::services::dispatcher::{DispatchOptions, ScanDispatcher};
use cloudsploit_worker::services::executor::PluginExecutor;
use cloudsploit_worker::services::handler::ScanHandler;
use mimalloc::MiMalloc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cloudsploit_worker=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let config = AppConfig::from_env().expect("Failed to load configuration");
    let catalog = Arc::new(SettingCatalog::load(Path::new(
        &config.cloudsploit_setting_path,
    ))?);
    tracing::info!(
        setting_path = %config.cloudsploit_setting_path,
        plugins = catalog.plugin_keys().count(),
        "Starting CloudSploit scan worker"
    );

    let executor = PluginExecutor::new(
        &config.cloud_sploit_command,
        std::env::temp_dir(),
        config.max_mem_size_mb,
    )
    .with_credentials(
        &config.google_service_account_email,
        &config.google_service_account_private_key,
    );
    let dispatcher = ScanDispatcher::new(executor, catalog, DispatchOptions::from_config(&config));
    let handler = ScanHandler::new(
        dispatcher,
        HttpServiceClient::new(&config.datasource_svc_url)?,
        HttpServiceClient::new(&config.finding_svc_url)?,
        HttpServiceClient::new(&config.alert_svc_url)?,
    );
    let queue_source = HttpQueue::new(&config.queue_url)?;

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("interrupt received, shutting down");
                shutdown.cancel();
            }
        });
    }

    queue::run(&queue_source, &handler, &shutdown).await;
    Ok(())
}
