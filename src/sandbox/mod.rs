//! Sandboxed side of the bridge
//!
//! What untrusted page context gets to hold: a [`BridgeTransport`] speaking
//! the closed command set, the tiny [`SandboxApi`] and the sidebar overlay.
//! Nothing here can reach the store or the filesystem directly.

pub mod sidebar;

use anyhow::{anyhow, Result};
use serde_json::Value;
use std::path::Path;
use tracing::{debug, warn};

use crate::config::Configuration;
use crate::constants::brand;
use crate::ipc::{BridgeRequest, BridgeResponse, IpcClient};

pub use sidebar::{SidebarDom, SidebarInjector, Toggle};

/// Request/response channel to the privileged bridge
pub trait BridgeTransport {
    fn invoke(&mut self, request: &BridgeRequest) -> Result<BridgeResponse>;

    fn get_config(&mut self) -> Result<Configuration> {
        match self.invoke(&BridgeRequest::GetConfig)? {
            BridgeResponse::Snapshot { config } => Ok(config),
            other => Err(unexpected(other)),
        }
    }

    /// Sidebar `(html, css)`
    fn sidebar_assets(&mut self) -> Result<(String, String)> {
        match self.invoke(&BridgeRequest::InjectSidebar)? {
            BridgeResponse::Sidebar { html, css } => Ok((html, css)),
            other => Err(unexpected(other)),
        }
    }

    /// Run a `set-*` request; an `Err` also covers a rejected value
    fn update(&mut self, request: &BridgeRequest) -> Result<Configuration> {
        match self.invoke(request)? {
            BridgeResponse::Updated { success: true, config } => Ok(config),
            BridgeResponse::Updated { success: false, .. } => Err(anyhow!("{} rejected its payload", request.name())),
            other => Err(unexpected(other)),
        }
    }
}

fn unexpected(response: BridgeResponse) -> anyhow::Error {
    match response {
        BridgeResponse::Error { error } => anyhow!("Bridge error: {error}"),
        other => anyhow!("Unexpected bridge response: {other:?}"),
    }
}

/// Bridge transport over the bridge socket
pub struct BridgeClient {
    ipc: IpcClient,
}

impl BridgeClient {
    pub fn connect(socket_path: &Path) -> Result<Self> {
        Ok(Self {
            ipc: IpcClient::connect_to(socket_path)?,
        })
    }
}

impl BridgeTransport for BridgeClient {
    fn invoke(&mut self, request: &BridgeRequest) -> Result<BridgeResponse> {
        debug!(command = request.name(), "Bridge call");
        self.ipc.request(request)
    }
}

/// Capability object exposed to page script: a version and external links
pub struct SandboxApi<B: BridgeTransport> {
    bridge: B,
}

impl<B: BridgeTransport> SandboxApi<B> {
    pub fn new(bridge: B) -> Self {
        Self { bridge }
    }

    pub fn version(&self) -> &'static str {
        brand::VERSION
    }

    /// Ask the privileged side to open `url` in the system browser
    pub fn open_external(&mut self, url: &str) -> bool {
        match self.bridge.invoke(&BridgeRequest::OpenExternal(Value::String(url.to_string()))) {
            Ok(BridgeResponse::Opened(opened)) => opened,
            Ok(other) => {
                warn!(error = %unexpected(other), "open-external failed");
                false
            }
            Err(e) => {
                warn!(error = %format!("{e:#}"), "open-external failed");
                false
            }
        }
    }
}
