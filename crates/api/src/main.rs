use anyhow::Context;

use tallybook_api::config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("invalid configuration")?;
    tallybook_observability::init(config.log_format);

    let store = tallybook_api::app::services::open_store(&config)
        .await
        .context("failed to open the accounting store")?;
    let (app, services) = tallybook_api::app::build_app_with_store(&config, store)
        .context("failed to start background workers")?;

    let addr = config.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!(app = %config.app_name, "listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("server error")?;

    services.shutdown();
    Ok(())
}
