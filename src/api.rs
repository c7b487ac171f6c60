use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::cookie::CookieJar;
use chrono::{DateTime, Utc};
use tower_http::cors::CorsLayer;

use crate::candidate::CandidateKind;
use crate::orchestrator::{ensure_metrics_described, Evaluation, PopupEngine};
use crate::storage::CookieKv;
use crate::suppression::SuppressionStore;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<PopupEngine>,
}

impl AppState {
    /// Suppression record kept in the requesting visitor's `popup_seen` cookie.
    fn visitor_store(
        &self,
        jar: CookieJar,
        now: DateTime<Utc>,
    ) -> (Arc<CookieKv>, SuppressionStore) {
        let kv = Arc::new(CookieKv::new(jar, now));
        let ttl = self.engine.store().ttl().num_seconds();
        (kv.clone(), SuppressionStore::new(kv, ttl))
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/popup", get(popup))
        .route("/popup/dismiss", post(dismiss))
        .route(
            "/popup/suppression",
            get(suppression).delete(clear_suppression),
        )
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

async fn popup(State(state): State<AppState>, jar: CookieJar) -> Json<Evaluation> {
    let (_, store) = state.visitor_store(jar, state.engine.now());
    Json(state.engine.evaluate_with(&store).await)
}

#[derive(serde::Deserialize)]
struct DismissReq {
    id: String,
    kind: CandidateKind,
}

async fn dismiss(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(body): Json<DismissReq>,
) -> Result<(StatusCode, CookieJar), (StatusCode, String)> {
    let now = state.engine.now();
    let (kv, store) = state.visitor_store(jar, now);
    store.write(&body.id, body.kind, now).map_err(internal)?;
    ensure_metrics_described();
    metrics::counter!("popup_dismissals_total").increment(1);
    Ok((StatusCode::NO_CONTENT, kv.take_jar()))
}

#[derive(serde::Serialize)]
struct SuppressionOut {
    id: String,
    #[serde(rename = "type")]
    kind: CandidateKind,
    shown_at: String,
    expires_at: String,
}

async fn suppression(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Json<Option<SuppressionOut>> {
    let now = state.engine.now();
    let (_, store) = state.visitor_store(jar, now);
    let rec = store.read(now);
    Json(rec.map(|r| SuppressionOut {
        id: r.id,
        kind: r.kind,
        shown_at: r.shown_at.to_rfc3339(),
        expires_at: (r.shown_at + store.ttl()).to_rfc3339(),
    }))
}

async fn clear_suppression(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<(StatusCode, CookieJar), (StatusCode, String)> {
    let (kv, store) = state.visitor_store(jar, state.engine.now());
    store.clear().map_err(internal)?;
    Ok((StatusCode::NO_CONTENT, kv.take_jar()))
}

fn internal(e: anyhow::Error) -> (StatusCode, String) {
    tracing::error!(target: "popup", error = ?e, "request failed");
    (StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}"))
}
