//! Bridge socket handler
//!
//! One thread per sandbox connection, up to a fixed number of concurrent
//! connections; extra peers are closed on accept. Each frame is decoded into a
//! [`BridgeRequest`] and forwarded to the core loop, which owns the store;
//! the reply comes back over a oneshot channel and is written to the peer.

use anyhow::Result;
use serde_json::Value;
use std::os::unix::net::UnixStream;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, info, warn};

use crate::app::CoreEvent;
use crate::constants::ipc::MAX_BRIDGE_CLIENTS;
use crate::ipc::{self, BridgeRequest, BridgeResponse, IpcServer};

/// Spawn the accept loop for sandbox bridge connections
pub fn spawn_bridge_listener(
    server: IpcServer,
    events: Sender<CoreEvent>,
    running: Arc<AtomicBool>,
) -> Result<JoinHandle<()>> {
    spawn_limited(server, events, running, MAX_BRIDGE_CLIENTS)
}

fn spawn_limited(
    server: IpcServer,
    events: Sender<CoreEvent>,
    running: Arc<AtomicBool>,
    max_clients: usize,
) -> Result<JoinHandle<()>> {
    let active = Arc::new(AtomicUsize::new(0));
    ipc::spawn_accept_loop(server, running, move |stream| {
        let Some(slot) = ClientSlot::claim(&active, max_clients) else {
            warn!(max_clients, "Too many bridge connections, closing new peer");
            return;
        };
        info!("Sandbox connected to bridge");
        let events = events.clone();
        std::thread::spawn(move || {
            let _slot = slot;
            serve_client(stream, events);
        });
    })
}

/// One counted bridge connection; released on drop
struct ClientSlot(Arc<AtomicUsize>);

impl ClientSlot {
    fn claim(active: &Arc<AtomicUsize>, max: usize) -> Option<Self> {
        active
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| (n < max).then_some(n + 1))
            .ok()
            .map(|_| Self(active.clone()))
    }
}

impl Drop for ClientSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn serve_client(mut stream: UnixStream, events: Sender<CoreEvent>) {
    loop {
        let frame: Value = match ipc::read_message(&mut stream) {
            Ok(frame) => frame,
            Err(e) => {
                debug!(error = %format!("{e:#}"), "Bridge connection closed");
                return;
            }
        };

        let response = dispatch(frame, &events);
        if let Err(e) = ipc::write_message(&mut stream, &response) {
            warn!(error = %format!("{e:#}"), "Failed to write bridge reply");
            return;
        }
    }
}

/// Decode one frame and wait for the core's reply
fn dispatch(frame: Value, events: &Sender<CoreEvent>) -> BridgeResponse {
    let request: BridgeRequest = match serde_json::from_value(frame) {
        Ok(request) => request,
        Err(e) => {
            warn!(error = %e, "Rejected bridge request");
            return BridgeResponse::Error {
                error: format!("invalid request: {e}"),
            };
        }
    };

    let (reply_tx, reply_rx) = mpsc::channel();
    if events.send(CoreEvent::Bridge { request, reply: reply_tx }).is_err() {
        return BridgeResponse::Error {
            error: "core is shutting down".to_string(),
        };
    }

    reply_rx.recv().unwrap_or_else(|_| BridgeResponse::Error {
        error: "core dropped the request".to_string(),
    })
}
