//! ==============================================================================
//! channel.rs - websocket channel for sensors and live viewers
//! ==============================================================================
//!
//! purpose:
//!     every socket is both a viewer and a possible sensor:
//!     - outbound: each hub frame is sent as `{"event": ..., "data": ...}` text
//!     - inbound: `humidityData` / `humidityDataSensor2` frames are ingested
//!       exactly like the http endpoints, with no acknowledgement
//!
//! errors:
//!     unknown events and unparseable frames are logged and dropped.
//!
//! ==============================================================================

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use serde_json::{Map, Value};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::domain::Zone;
use crate::hub::ChannelFrame;
use crate::server::{ingest, AppState};

pub async fn upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| client_loop(socket, state))
}

async fn client_loop(mut socket: WebSocket, state: AppState) {
    let mut frames = state.hub.subscribe();
    info!(viewers = state.hub.viewer_count(), "new client connected");

    loop {
        tokio::select! {
            frame = frames.recv() => {
                let frame = match frame {
                    Ok(frame) => frame,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "client lagged behind; dropping frames");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };

                let Ok(text) = serde_json::to_string(&frame) else {
                    warn!("failed to serialise channel frame");
                    continue;
                };

                if socket.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            message = socket.recv() => {
                let Some(Ok(message)) = message else {
                    break;
                };

                match message {
                    Message::Text(text) => handle_text(&state, &text).await,
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        }
    }

    info!("client disconnected");
}

async fn handle_text(state: &AppState, text: &str) {
    let frame = match serde_json::from_str::<ChannelFrame>(text) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(error = %e, "invalid channel frame");
            return;
        }
    };

    match Zone::from_inbound_event(&frame.event) {
        Some(zone) => {
            // a frame without data is an empty reading, same as a blank http body
            let data = match frame.data {
                Value::Null => Value::Object(Map::new()),
                data => data,
            };
            ingest(state, zone, data).await;
        }
        None => debug!(event = %frame.event, "ignoring unknown channel event"),
    }
}
