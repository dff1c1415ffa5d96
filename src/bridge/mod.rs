//! Privileged side of the sandbox bridge
//!
//! [`ConfigBridge`] maps each whitelisted [`BridgeRequest`] onto a
//! [`ConfigStore`] operation or onto the shell's external-open capability.
//! Nothing else on the privileged side is reachable from the sandbox.

pub mod listener;

use anyhow::Result;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::config::{ConfigField, ConfigStore};
use crate::constants::external::ALLOWED_SCHEMES;
use crate::ipc::{BridgeRequest, BridgeResponse};

/// Host capability to open a URL outside the shell (system browser)
pub trait ExternalOpener {
    fn open_external(&mut self, url: &str) -> Result<()>;
}

/// Sidebar overlay markup handed to the sandbox on `inject-sidebar`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SidebarAssets {
    pub html: String,
    pub css: String,
}

impl SidebarAssets {
    /// Assets compiled into the binary
    pub fn embedded() -> Self {
        Self {
            html: include_str!("../../assets/sidebar/sidebar.html").to_string(),
            css: include_str!("../../assets/sidebar/sidebar.css").to_string(),
        }
    }
}

/// Whitelisted command surface exposed to the sandboxed context
pub struct ConfigBridge {
    sidebar: SidebarAssets,
}

impl ConfigBridge {
    pub fn new(sidebar: SidebarAssets) -> Self {
        Self { sidebar }
    }

    /// Execute one bridge command. Never panics and never returns an error:
    /// failures become a `false`/`success: false` reply.
    pub fn handle(
        &self,
        request: BridgeRequest,
        store: &mut ConfigStore,
        opener: &mut impl ExternalOpener,
    ) -> BridgeResponse {
        debug!(command = request.name(), "Bridge request");
        match request {
            BridgeRequest::SetAutomute(v) => Self::set(store, ConfigField::Automute, &v),
            BridgeRequest::SetAutofocus(v) => Self::set(store, ConfigField::Autofocus, &v),
            BridgeRequest::SetIdleguard(v) => Self::set(store, ConfigField::Idleguard, &v),
            BridgeRequest::SetUseragent(v) => Self::set(store, ConfigField::UserAgent, &v),
            BridgeRequest::SetPresence(v) => Self::set(store, ConfigField::PresenceEnabled, &v),
            BridgeRequest::GetConfig => BridgeResponse::Snapshot {
                config: store.current().clone(),
            },
            BridgeRequest::OpenExternal(url) => BridgeResponse::Opened(open_external(&url, opener)),
            BridgeRequest::InjectSidebar => BridgeResponse::Sidebar {
                html: self.sidebar.html.clone(),
                css: self.sidebar.css.clone(),
            },
        }
    }

    fn set(store: &mut ConfigStore, field: ConfigField, value: &Value) -> BridgeResponse {
        match store.update(field, value) {
            Ok(config) => BridgeResponse::Updated { success: true, config },
            Err(_) => BridgeResponse::Updated {
                success: false,
                config: store.current().clone(),
            },
        }
    }
}

/// Scheme of an absolute URL with an authority (`scheme://host...`)
fn url_scheme(url: &str) -> Option<String> {
    let (scheme, rest) = url.split_once(':')?;
    let mut chars = scheme.chars();
    let valid = chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    let authority = rest.strip_prefix("//")?;
    if !valid || authority.is_empty() || authority.starts_with('/') {
        return None;
    }
    Some(scheme.to_ascii_lowercase())
}

fn open_external(url: &Value, opener: &mut impl ExternalOpener) -> bool {
    let Some(url) = url.as_str() else {
        warn!(payload = %url, "Rejected open-external with non-string payload");
        return false;
    };

    match url_scheme(url) {
        Some(scheme) if ALLOWED_SCHEMES.contains(&scheme.as_str()) => {}
        _ => {
            warn!(url = %url, "Rejected non-http URL");
            return false;
        }
    }

    match opener.open_external(url) {
        Ok(()) => {
            info!(url = %url, "Opened external URL");
            true
        }
        Err(e) => {
            error!(url = %url, error = ?e, "Failed to open external URL");
            false
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use anyhow::anyhow;
    use serde_json::json;

    #[derive(Default)]
    pub(crate) struct RecordingOpener {
        pub opened: Vec<String>,
        pub fail: bool,
    }

    impl ExternalOpener for RecordingOpener {
        fn open_external(&mut self, url: &str) -> Result<()> {
            if self.fail {
                return Err(anyhow!("no browser"));
            }
            self.opened.push(url.to_string());
            Ok(())
        }
    }

    fn setup() -> (tempfile::TempDir, ConfigStore, ConfigBridge, RecordingOpener) {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::open(dir.path().join("settings.json"));
        let bridge = ConfigBridge::new(SidebarAssets {
            html: "<aside id=\"eternity-sidebar\"></aside>".to_string(),
            css: "#eternity-sidebar{}".to_string(),
        });
        (dir, store, bridge, RecordingOpener::default())
    }

    #[test]
    fn test_set_commands_update_store_and_return_snapshot() {
        let (_dir, mut store, bridge, mut opener) = setup();

        let res = bridge.handle(BridgeRequest::SetAutomute(json!(true)), &mut store, &mut opener);
        let BridgeResponse::Updated { success, config } = res else {
            panic!("unexpected response");
        };
        assert!(success);
        assert!(config.automute);

        bridge.handle(BridgeRequest::SetAutofocus(json!(true)), &mut store, &mut opener);
        bridge.handle(BridgeRequest::SetIdleguard(json!(true)), &mut store, &mut opener);
        bridge.handle(BridgeRequest::SetPresence(json!(true)), &mut store, &mut opener);
        bridge.handle(BridgeRequest::SetUseragent(json!("UA")), &mut store, &mut opener);

        let current = store.load();
        assert!(current.automute && current.autofocus && current.idleguard && current.presence_enabled);
        assert_eq!(current.user_agent, "UA");
        assert!(opener.opened.is_empty());
    }

    #[test]
    fn test_set_with_wrong_payload_type_reports_failure() {
        let (_dir, mut store, bridge, mut opener) = setup();

        let res = bridge.handle(BridgeRequest::SetAutomute(json!({"x": 1})), &mut store, &mut opener);
        assert_eq!(
            res,
            BridgeResponse::Updated { success: false, config: Default::default() }
        );
    }

    #[test]
    fn test_get_config_returns_current() {
        let (_dir, mut store, bridge, mut opener) = setup();
        bridge.handle(BridgeRequest::SetIdleguard(json!(true)), &mut store, &mut opener);

        let res = bridge.handle(BridgeRequest::GetConfig, &mut store, &mut opener);
        assert_eq!(res, BridgeResponse::Snapshot { config: store.current().clone() });
    }

    #[test]
    fn test_open_external_rejects_non_http_schemes() {
        let (_dir, mut store, bridge, mut opener) = setup();

        for url in [
            json!("javascript:alert(1)"),
            json!("file:///etc/passwd"),
            json!("data:text/html,hi"),
            json!("httpx://example.com"),
            json!("not a url"),
            json!(42),
        ] {
            let res = bridge.handle(BridgeRequest::OpenExternal(url), &mut store, &mut opener);
            assert_eq!(res, BridgeResponse::Opened(false));
        }
        assert!(opener.opened.is_empty());
    }

    #[test]
    fn test_open_external_forwards_https_once() {
        let (_dir, mut store, bridge, mut opener) = setup();

        let res = bridge.handle(
            BridgeRequest::OpenExternal(json!("https://example.com")),
            &mut store,
            &mut opener,
        );
        assert_eq!(res, BridgeResponse::Opened(true));
        assert_eq!(opener.opened, vec!["https://example.com".to_string()]);

        bridge.handle(BridgeRequest::OpenExternal(json!("HTTP://example.org/a")), &mut store, &mut opener);
        assert_eq!(opener.opened.len(), 2);
    }

    #[test]
    fn test_open_external_failure_returns_false() {
        let (_dir, mut store, bridge, _) = setup();
        let mut opener = RecordingOpener { fail: true, ..Default::default() };

        let res = bridge.handle(BridgeRequest::OpenExternal(json!("https://example.com")), &mut store, &mut opener);
        assert_eq!(res, BridgeResponse::Opened(false));
    }

    #[test]
    fn test_inject_sidebar_returns_assets() {
        let (_dir, mut store, bridge, mut opener) = setup();
        let res = bridge.handle(BridgeRequest::InjectSidebar, &mut store, &mut opener);
        let BridgeResponse::Sidebar { html, css } = res else {
            panic!("unexpected response");
        };
        assert!(html.contains("eternity-sidebar"));
        assert!(!css.is_empty());
    }

    #[test]
    fn test_embedded_assets_carry_every_toggle() {
        let assets = SidebarAssets::embedded();
        for id in [
            "eternity-sidebar",
            "toggle-automute",
            "toggle-autofocus",
            "toggle-idleguard",
            "toggle-presence",
            "select-useragent",
        ] {
            assert!(assets.html.contains(id), "missing {id}");
        }
        assert!(assets.css.contains("#eternity-sidebar"));
    }

    #[test]
    fn test_url_scheme() {
        assert_eq!(url_scheme("https://example.com").as_deref(), Some("https"));
        assert_eq!(url_scheme("javascript:alert(1)"), None);
        assert_eq!(url_scheme("http:///nohost"), None);
        assert_eq!(url_scheme("1http://x"), None);
    }
}
