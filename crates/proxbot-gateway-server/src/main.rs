use std::sync::Arc;

use proxbot_common::Hypervisor;
use proxbot_gateway_server::{
    alerts::WebhookAlertSink, config::GatewayConfig, create_app, renderer::HttpMetricsRenderer,
    AppState,
};
use proxbot_orchestrator::{
    AlertSink, CallBridge, Dispatcher, DispatcherConfig, HypervisorHandle, JsonFileWatchlist,
    LogAlertSink, Monitor, Watchlist,
};
use proxbot_sdk::{ApiToken, HypervisorClient};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> color_eyre::Result<()> {
    dotenvy::dotenv().ok();
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,proxbot=debug")),
        )
        .init();

    let config = GatewayConfig::from_env()?;

    // The blocking client owns its own runtime, so it is created and finally
    // dropped outside of ours.
    let client: Arc<dyn Hypervisor> = Arc::new(HypervisorClient::new(
        &config.proxmox_host,
        ApiToken::new(
            &config.proxmox_user,
            &config.proxmox_token_name,
            &config.proxmox_token_value,
        ),
    )?);
    info!(host = %config.proxmox_host, "Hypervisor client ready");

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .max_blocking_threads(config.max_blocking_calls.max(1))
        .build()?;
    runtime.block_on(serve(config, client.clone()))?;
    drop(runtime);
    drop(client);

    info!("proxbot stopped");
    Ok(())
}

async fn serve(config: GatewayConfig, client: Arc<dyn Hypervisor>) -> color_eyre::Result<()> {
    let hypervisor = HypervisorHandle::new(client, CallBridge::new(config.max_blocking_calls));

    let storage = JsonFileWatchlist::new(config.watchlist_path.clone(), config.monitor_seed.clone());
    let watchlist = Arc::new(Watchlist::new(Arc::new(storage)));

    let mut dispatcher_config = DispatcherConfig::new(config.admin_category_id);
    dispatcher_config.default_node = config.default_node.clone();
    let mut dispatcher = Dispatcher::new(dispatcher_config, hypervisor.clone(), watchlist.clone());
    match &config.renderer_url {
        Some(url) => {
            dispatcher = dispatcher.with_renderer(Arc::new(HttpMetricsRenderer::new(url.as_str())?));
        }
        None => warn!("PROXBOT_RENDERER_URL not set, /graph is disabled"),
    }

    let sink: Arc<dyn AlertSink> = match &config.alert_webhook_url {
        Some(url) => Arc::new(WebhookAlertSink::new(url.as_str(), config.alert_channel_id)?),
        None => {
            warn!("PROXBOT_ALERT_WEBHOOK_URL not set, alerts are only logged");
            Arc::new(LogAlertSink)
        }
    };

    let (ready_tx, ready_rx) = watch::channel(false);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let monitor = Monitor::new(hypervisor, watchlist, sink);
    let monitor_task = tokio::spawn(monitor.run(ready_rx.clone(), shutdown_rx));

    let app = create_app(AppState::new(Arc::new(dispatcher), ready_rx));
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    info!("🚀 proxbot listening on {}", config.listen_addr);
    ready_tx.send_replace(true);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    shutdown_tx.send_replace(true);
    if let Err(e) = monitor_task.await {
        warn!(error = %e, "Monitor task ended abnormally");
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}
