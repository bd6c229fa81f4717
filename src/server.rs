//! ==============================================================================
//! server.rs - http api, static pages, and the shared ingest path
//! ==============================================================================
//!
//! routes:
//!     POST /api/measurements                 -> ingest for the blütezelt
//!     POST /api/measurements/sensor2         -> ingest for the aufzuchtszelt
//!     GET  /api/measurements/bluetezelt      -> full blütezelt history
//!     GET  /api/measurements/aufzuchtszelt   -> full aufzuchtszelt history
//!     GET  /ws                               -> live channel (channel.rs)
//!     everything else                        -> html pages from the page root
//!
//! ingest order:
//!     append -> broadcast raw payload -> persist all zones, all under the
//!     store lock. the http caller gets {"success": true} even if the save
//!     failed; that failure only shows up in the log.
//!
//! ==============================================================================

use std::future::{Future, IntoFuture};
use std::path::Path;

use axum::{
    body::Bytes,
    extract::State,
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::{json, Map, Value};
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::channel;
use crate::domain::{Reading, Zone};
use crate::error::ApiError;
use crate::hub::BroadcastHub;
use crate::store::SharedStore;

/// frames a viewer may fall behind before it starts skipping
pub const HUB_CAPACITY: usize = 256;

/// page routes that do not map 1:1 onto a file name
const PAGE_ROUTES: &[(&str, &str)] = &[
    ("/", "index.html"),
    ("/vpd", "vpd.html"),
    ("/measurements", "measurements.html"),
    ("/dashboard", "data/dashboard.html"),
];

#[derive(Clone)]
pub struct AppState {
    pub store: SharedStore,
    pub hub: BroadcastHub,
    /// log each ingested reading at info (otherwise debug)
    pub show_readings: bool,
}

impl AppState {
    pub fn new(store: SharedStore, hub: BroadcastHub) -> Self {
        Self { store, hub, show_readings: true }
    }
}

pub fn router(state: AppState, pages_root: &Path) -> Router {
    let mut pages = Router::new();
    for (route, file) in PAGE_ROUTES {
        pages = pages.route_service(route, ServeFile::new(pages_root.join(file)));
    }

    Router::new()
        .route("/api/measurements", post(ingest_bluetezelt))
        .route("/api/measurements/sensor2", post(ingest_aufzuchtszelt))
        .route("/api/measurements/bluetezelt", get(history_bluetezelt))
        .route("/api/measurements/aufzuchtszelt", get(history_aufzuchtszelt))
        .route("/ws", get(channel::upgrade))
        .merge(pages)
        .fallback_service(ServeDir::new(pages_root))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// append, broadcast, and persist one reading
///
/// shared by the http and websocket paths. viewers get the payload exactly
/// as submitted, not the stamped copy.
pub async fn ingest(state: &AppState, zone: Zone, payload: Value) -> Reading {
    let mut store = state.store.lock().await;
    let stored = store.append(zone, &payload).clone();
    let (temperature, humidity) = (stored.temperature(), stored.humidity());
    if state.show_readings {
        info!(zone = zone.display_name(), ?temperature, ?humidity, data = %payload, "reading received");
    } else {
        debug!(zone = zone.display_name(), ?temperature, ?humidity, data = %payload, "reading received");
    }

    let viewers = state.hub.publish(zone.outbound_event(), payload);
    debug!(event = zone.outbound_event(), viewers, "broadcast reading");

    store.persist_async().await;
    stored
}

async fn ingest_bluetezelt(State(state): State<AppState>, body: Bytes) -> Result<Json<Value>, ApiError> {
    ingest_http(&state, Zone::Bluetezelt, &body).await
}

async fn ingest_aufzuchtszelt(State(state): State<AppState>, body: Bytes) -> Result<Json<Value>, ApiError> {
    ingest_http(&state, Zone::Aufzuchtszelt, &body).await
}

async fn ingest_http(state: &AppState, zone: Zone, body: &[u8]) -> Result<Json<Value>, ApiError> {
    let payload = parse_body(body)?;
    ingest(state, zone, payload).await;
    Ok(Json(json!({ "success": true })))
}

/// blank bodies count as `{}`; anything else must be json
fn parse_body(body: &[u8]) -> Result<Value, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Object(Map::new()));
    }
    serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(format!("invalid json body: {}", e)))
}

async fn history_bluetezelt(State(state): State<AppState>) -> Json<Vec<Reading>> {
    history(&state, Zone::Bluetezelt).await
}

async fn history_aufzuchtszelt(State(state): State<AppState>) -> Json<Vec<Reading>> {
    history(&state, Zone::Aufzuchtszelt).await
}

async fn history(state: &AppState, zone: Zone) -> Json<Vec<Reading>> {
    Json(state.store.lock().await.snapshot(zone))
}

/// serve `app` until `shutdown` resolves, then save every zone once more
///
/// open websockets are not waited for; the final save runs as soon as the
/// signal arrives.
pub async fn serve_until<F>(listener: TcpListener, app: Router, store: SharedStore, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()>,
{
    tokio::select! {
        result = axum::serve(listener, app).into_future() => result,
        _ = shutdown => {
            info!("shutting down, saving data");
            let summary = store.lock().await.persist_async().await;
            if !summary.all_ok() {
                warn!("final save was incomplete");
            }
            Ok(())
        }
    }
}

/// resolves on ctrl-c, or SIGTERM on unix
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_body_is_an_empty_reading() {
        assert_eq!(parse_body(b"").unwrap(), json!({}));
        assert_eq!(parse_body(b" \n").unwrap(), json!({}));
    }

    #[test]
    fn invalid_json_is_rejected() {
        assert!(matches!(parse_body(b"{temperature:"), Err(ApiError::BadRequest(_))));
    }

    #[test]
    fn any_json_value_is_accepted() {
        assert_eq!(parse_body(b"[1,2]").unwrap(), json!([1, 2]));
        assert_eq!(parse_body(br#"{"humidity": "n/a"}"#).unwrap(), json!({"humidity": "n/a"}));
    }
}
