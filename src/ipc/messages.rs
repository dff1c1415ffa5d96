//! IPC message types
//!
//! Bridge: sandboxed context ↔ privileged core (request/response).
//! Shell: host shell → core events, core → host shell commands.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::Configuration;

/// Commands the sandboxed context may send. The set is closed: unknown
/// command names fail to deserialize. Payloads stay untyped JSON on purpose,
/// the store does the type checking.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "command", content = "payload", rename_all = "kebab-case")]
pub enum BridgeRequest {
    SetAutomute(Value),
    SetAutofocus(Value),
    SetIdleguard(Value),
    SetUseragent(Value),
    SetPresence(Value),
    GetConfig,
    OpenExternal(Value),
    InjectSidebar,
}

impl BridgeRequest {
    /// Wire name of the command, for logging
    pub fn name(&self) -> &'static str {
        match self {
            BridgeRequest::SetAutomute(_) => "set-automute",
            BridgeRequest::SetAutofocus(_) => "set-autofocus",
            BridgeRequest::SetIdleguard(_) => "set-idleguard",
            BridgeRequest::SetUseragent(_) => "set-useragent",
            BridgeRequest::SetPresence(_) => "set-presence",
            BridgeRequest::GetConfig => "get-config",
            BridgeRequest::OpenExternal(_) => "open-external",
            BridgeRequest::InjectSidebar => "inject-sidebar",
        }
    }
}

/// Replies from the privileged side. Variant order matters for the
/// untagged decode on the client.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum BridgeResponse {
    /// Reply to a `set-*` command
    Updated { success: bool, config: Configuration },
    /// Reply to `get-config`
    Snapshot { config: Configuration },
    /// Reply to `inject-sidebar`
    Sidebar { html: String, css: String },
    /// Reply to `open-external`
    Opened(bool),
    /// The request could not be decoded or the core is gone
    Error { error: String },
}

/// Events the host shell reports
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ShellEvent {
    /// Shell window exists and accepts commands
    Ready,
    FocusLost,
    FocusGained,
    /// Page title changed; the shell has held back its own rewrite
    TitleChanged { title: String },
    /// A network request matching the shell's observation filter
    RequestObserved { url: String },
    ShortcutPressed { accelerator: String },
    ShortcutFailed { accelerator: String, reason: String },
}

/// Side effects the core asks the host shell to perform
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum ShellCommand {
    SetAudioMuted { muted: bool },
    Focus,
    Maximize,
    SetAlwaysOnTop { on_top: bool },
    SendKey { key: String, down: bool },
    SetTitle { title: String },
    OpenExternal { url: String },
    SetUserAgent { user_agent: Option<String> },
    ToggleSidebar,
    RegisterShortcut { accelerator: String },
    UnregisterAllShortcuts,
}
