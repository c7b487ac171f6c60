// src/bin/popup_once.rs
// One full popup cycle (settle delay included) against the configured API; prints the outcome.

use std::sync::Arc;

use popup_engine::config::PopupConfig;
use popup_engine::PopupState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    popup_engine::init_tracing();

    let cfg = PopupConfig::load_default()?;
    let engine = Arc::new(popup_engine::build_engine(&cfg)?);

    let handle = engine.start();
    let out = match handle.settled().await {
        PopupState::Resolved(Some(c)) => serde_json::json!({ "show": true, "candidate": c }),
        PopupState::Resolved(None) => serde_json::json!({ "show": false, "candidate": null }),
        other => serde_json::json!({ "show": false, "state": format!("{other:?}") }),
    };
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}
