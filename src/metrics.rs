use anyhow::{Context, Result};
use axum::{extract::State, routing::get, Router};
use metrics::gauge;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder and publish the configured suppression window.
    /// Fails if a global recorder is already installed.
    pub fn init(suppression_ttl_secs: i64) -> Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;

        gauge!("popup_suppression_ttl_secs").set(suppression_ttl_secs as f64);

        Ok(Self { handle })
    }

    /// `/metrics` scrape endpoint, merged into the popup router by the server.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/metrics", get(scrape))
            .with_state(self.handle.clone())
    }
}

async fn scrape(State(handle): State<PrometheusHandle>) -> String {
    handle.render()
}
