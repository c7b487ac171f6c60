// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod api;
pub mod candidate;
pub mod categorize;
pub mod config;
pub mod content;
pub mod metrics;
pub mod orchestrator;
pub mod resolver;
pub mod storage;
pub mod suppression;
pub mod validate;

pub use crate::api::router;
pub use crate::candidate::{CandidateKind, PopupCandidate};
pub use crate::orchestrator::{Evaluation, PopupEngine, PopupHandle, PopupState};

use std::sync::Arc;

use anyhow::Result;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::PopupConfig;
use crate::content::http::HttpContentSource;
use crate::storage::{FileKv, KvStore, MemoryKv};
use crate::suppression::SuppressionStore;

/// Suppression store backed by `store_dir` when configured, memory otherwise.
pub fn build_store(cfg: &PopupConfig) -> Result<SuppressionStore> {
    let kv: Arc<dyn KvStore> = match &cfg.store_dir {
        Some(dir) => Arc::new(FileKv::new(dir)?),
        None => Arc::new(MemoryKv::new()),
    };
    Ok(SuppressionStore::new(kv, cfg.suppression_ttl_secs))
}

/// Engine wired to the HTTP content API described by `cfg`.
pub fn build_engine(cfg: &PopupConfig) -> Result<PopupEngine> {
    let source = HttpContentSource::new(&cfg.api_base_url, cfg.request_timeout())?;
    let store = build_store(cfg)?;
    Ok(PopupEngine::from_config(cfg, Arc::new(source), store))
}

/// Install the global tracing subscriber.
/// Filter comes from `RUST_LOG`, defaulting to `popup=info,warn`;
/// `POPUP_LOG_JSON=1` switches to JSON lines.
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("popup=info,warn"));
    let json = std::env::var("POPUP_LOG_JSON")
        .ok()
        .is_some_and(|v| v == "1");

    let registry = tracing_subscriber::registry().with(filter);
    let res = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
    if res.is_err() {
        // a subscriber is already installed (tests, embedding host)
        tracing::debug!("tracing already initialized");
    }
}
