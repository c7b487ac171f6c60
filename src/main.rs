//! Popup engine service — binary entrypoint.
//! Boots the Axum HTTP server with the popup routes and `/metrics`.

use std::sync::Arc;

use anyhow::Context;
use popup_engine::api::{self, AppState};
use popup_engine::config::PopupConfig;
use popup_engine::metrics::Metrics;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    popup_engine::init_tracing();

    let cfg = PopupConfig::load_default().context("loading popup config")?;
    let metrics = Metrics::init(cfg.suppression_ttl_secs)?;
    let engine = popup_engine::build_engine(&cfg)?;

    let app = api::router(AppState {
        engine: Arc::new(engine),
    })
    .merge(metrics.router());

    let listener = tokio::net::TcpListener::bind(&cfg.listen_addr)
        .await
        .with_context(|| format!("binding {}", cfg.listen_addr))?;
    info!(
        target: "popup",
        addr = %cfg.listen_addr,
        api = %cfg.api_base_url,
        persistent = cfg.store_dir.is_some(),
        "popup engine listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("serving http")?;
    Ok(())
}
