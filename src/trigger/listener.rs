//! HTTP trigger listener
//!
//! Serves `POST /` on its own thread with a single-threaded tokio runtime.
//! The request body must be a JSON object. The `Instancename` request header
//! is copied into the payload's `headers` before the payload is queued
//! through a [`TriggerHandle`]. Replies:
//!
//! - `202 {"status": "queued"}`
//! - `400 {"status": "error", "error": ...}` for a body that is not a JSON object
//! - `503 {"status": "closed"}` once the simulation has finished

use std::io;
use std::net::SocketAddr;
use std::thread::{self, JoinHandle};

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use serde_json::{json, Map, Value};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::trigger::TriggerHandle;

/// Request header naming the instance a trigger is meant for
pub const INSTANCE_HEADER: &str = "Instancename";

/// Background HTTP server feeding external triggers into a simulation
#[derive(Debug)]
pub struct TriggerListener {
    addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl TriggerListener {
    /// Bind `addr` and start serving on a background thread
    pub fn spawn(addr: &str, trigger: TriggerHandle) -> io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let listener = runtime.block_on(tokio::net::TcpListener::bind(addr))?;
        let addr = listener.local_addr()?;
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let app = router(trigger);

        let thread = thread::Builder::new()
            .name("trigger-listener".into())
            .spawn(move || {
                let served = runtime.block_on(async move {
                    axum::serve(listener, app)
                        .with_graceful_shutdown(async move {
                            let _ = shutdown_rx.await;
                        })
                        .await
                });
                if let Err(e) = served {
                    warn!(error = %e, "Trigger listener failed");
                }
                debug!("Trigger listener stopped");
            })?;

        info!(%addr, "Listening for external triggers");
        Ok(Self { addr, shutdown_tx: Some(shutdown_tx), thread: Some(thread) })
    }

    /// Address actually bound
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop serving and wait for the listener thread
    pub fn shutdown(mut self) {
        self.halt();
    }

    fn halt(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Trigger listener thread panicked");
            }
        }
    }
}

impl Drop for TriggerListener {
    fn drop(&mut self) {
        self.halt();
    }
}

fn router(trigger: TriggerHandle) -> Router {
    Router::new().route("/", post(trigger_handler)).with_state(trigger)
}

async fn trigger_handler(
    State(trigger): State<TriggerHandle>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<Value>) {
    let payload = match trigger_payload(&headers, &body) {
        Ok(payload) => payload,
        Err(reason) => {
            debug!(%reason, "Rejected trigger request");
            return (StatusCode::BAD_REQUEST, Json(json!({"status": "error", "error": reason})));
        }
    };
    if trigger.on_external_event(payload) {
        (StatusCode::ACCEPTED, Json(json!({"status": "queued"})))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(json!({"status": "closed"})))
    }
}

/// Build the trigger payload from a request
///
/// The body's own `headers` field is replaced by the request headers the
/// lifecycle filter looks at.
pub fn trigger_payload(headers: &HeaderMap, body: &[u8]) -> Result<Value, String> {
    let mut payload = match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => map,
        Ok(_) => return Err("expected a JSON object".to_string()),
        Err(e) => return Err(e.to_string()),
    };

    let mut forwarded = Map::new();
    if let Some(name) = headers.get(INSTANCE_HEADER).and_then(|v| v.to_str().ok()) {
        forwarded.insert(INSTANCE_HEADER.to_string(), Value::from(name));
    }
    payload.insert("headers".to_string(), Value::Object(forwarded));
    Ok(Value::Object(payload))
}
