//! Settings sidebar overlay
//!
//! Injected at most once per page lifetime. Toggles update their own visual
//! state before the bridge call resolves; a failed call is logged and the
//! control keeps the state the user picked.

use anyhow::Result;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::BridgeTransport;
use crate::config::Configuration;
use crate::ipc::BridgeRequest;

pub const USER_AGENT_SELECT_ID: &str = "select-useragent";

/// The page the overlay is injected into
pub trait SidebarDom {
    /// Append the stylesheet and markup to the document
    fn inject(&mut self, html: &str, css: &str) -> Result<()>;
    fn set_pressed(&mut self, element_id: &str, pressed: bool);
    fn set_value(&mut self, element_id: &str, value: &str);
    fn set_open(&mut self, open: bool);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggle {
    Autofocus,
    Automute,
    Idleguard,
    Presence,
}

impl Toggle {
    pub const ALL: [Toggle; 4] = [Toggle::Autofocus, Toggle::Automute, Toggle::Idleguard, Toggle::Presence];

    pub fn element_id(self) -> &'static str {
        match self {
            Toggle::Autofocus => "toggle-autofocus",
            Toggle::Automute => "toggle-automute",
            Toggle::Idleguard => "toggle-idleguard",
            Toggle::Presence => "toggle-presence",
        }
    }

    fn value_in(self, config: &Configuration) -> bool {
        match self {
            Toggle::Autofocus => config.autofocus,
            Toggle::Automute => config.automute,
            Toggle::Idleguard => config.idleguard,
            Toggle::Presence => config.presence_enabled,
        }
    }

    fn set_in(self, config: &mut Configuration, on: bool) {
        match self {
            Toggle::Autofocus => config.autofocus = on,
            Toggle::Automute => config.automute = on,
            Toggle::Idleguard => config.idleguard = on,
            Toggle::Presence => config.presence_enabled = on,
        }
    }

    fn request(self, on: bool) -> BridgeRequest {
        let value = Value::Bool(on);
        match self {
            Toggle::Autofocus => BridgeRequest::SetAutofocus(value),
            Toggle::Automute => BridgeRequest::SetAutomute(value),
            Toggle::Idleguard => BridgeRequest::SetIdleguard(value),
            Toggle::Presence => BridgeRequest::SetPresence(value),
        }
    }
}

pub struct SidebarInjector<B: BridgeTransport, D: SidebarDom> {
    bridge: B,
    dom: D,
    injected: bool,
    /// What the controls currently show
    view: Option<Configuration>,
}

impl<B: BridgeTransport, D: SidebarDom> SidebarInjector<B, D> {
    pub fn new(bridge: B, dom: D) -> Self {
        Self {
            bridge,
            dom,
            injected: false,
            view: None,
        }
    }

    pub fn is_injected(&self) -> bool {
        self.view.is_some()
    }

    /// Fetch assets and config and render the overlay. Only the first call
    /// does anything, whether or not it succeeds.
    pub fn inject(&mut self) -> bool {
        if self.injected {
            debug!("Sidebar already injected");
            return false;
        }
        self.injected = true;

        match self.try_inject() {
            Ok(rendered) => rendered,
            Err(e) => {
                warn!(error = %format!("{e:#}"), "Failed to inject sidebar");
                false
            }
        }
    }

    fn try_inject(&mut self) -> Result<bool> {
        let (html, css) = self.bridge.sidebar_assets()?;
        let config = self.bridge.get_config()?;

        if html.is_empty() || css.is_empty() {
            warn!("Sidebar assets not available");
            return Ok(false);
        }

        self.dom.inject(&html, &css)?;
        for toggle in Toggle::ALL {
            self.dom.set_pressed(toggle.element_id(), toggle.value_in(&config));
        }
        if !config.user_agent.is_empty() {
            self.dom.set_value(USER_AGENT_SELECT_ID, &config.user_agent);
        }

        info!(?config, "Sidebar injected");
        self.view = Some(config);
        Ok(true)
    }

    /// Flip a toggle; returns its new state, or `None` before injection
    pub fn toggle(&mut self, toggle: Toggle) -> Option<bool> {
        let view = self.view.as_mut()?;
        let on = !toggle.value_in(view);
        toggle.set_in(view, on);
        self.dom.set_pressed(toggle.element_id(), on);

        debug!(?toggle, on, "Sidebar toggle");
        if let Err(e) = self.bridge.update(&toggle.request(on)) {
            warn!(error = %format!("{e:#}"), ?toggle, "Failed to persist toggle");
        }
        Some(on)
    }

    /// Pick a user agent; empty means the platform default
    pub fn select_user_agent(&mut self, user_agent: &str) {
        let Some(view) = self.view.as_mut() else {
            return;
        };
        view.user_agent = user_agent.to_string();

        let request = BridgeRequest::SetUseragent(Value::String(user_agent.to_string()));
        if let Err(e) = self.bridge.update(&request) {
            warn!(error = %format!("{e:#}"), "Failed to persist user agent");
        }
    }

    pub fn close(&mut self) {
        if self.is_injected() {
            self.dom.set_open(false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::SidebarAssets;
    use crate::sandbox::tests::LocalBridge;
    use serde_json::json;
    use std::collections::HashMap;

    #[derive(Default)]
    struct FakeDom {
        injections: u32,
        pressed: HashMap<String, bool>,
        values: HashMap<String, String>,
        open: Option<bool>,
    }

    impl SidebarDom for FakeDom {
        fn inject(&mut self, html: &str, _css: &str) -> Result<()> {
            assert!(html.contains("eternity-sidebar"));
            self.injections += 1;
            Ok(())
        }

        fn set_pressed(&mut self, element_id: &str, pressed: bool) {
            self.pressed.insert(element_id.to_string(), pressed);
        }

        fn set_value(&mut self, element_id: &str, value: &str) {
            self.values.insert(element_id.to_string(), value.to_string());
        }

        fn set_open(&mut self, open: bool) {
            self.open = Some(open);
        }
    }

    fn injector() -> SidebarInjector<LocalBridge, FakeDom> {
        SidebarInjector::new(LocalBridge::new(SidebarAssets::embedded()), FakeDom::default())
    }

    #[test]
    fn test_repeated_inject_renders_once() {
        let mut sidebar = injector();
        assert!(sidebar.inject());
        assert!(!sidebar.inject());
        assert!(!sidebar.inject());
        assert_eq!(sidebar.dom.injections, 1);
    }

    #[test]
    fn test_initial_state_reflects_config() {
        let mut bridge = LocalBridge::new(SidebarAssets::embedded());
        bridge.store.update(crate::config::ConfigField::Automute, &json!(true)).unwrap();
        bridge.store.update(crate::config::ConfigField::UserAgent, &json!("UA/1.0")).unwrap();
        let mut sidebar = SidebarInjector::new(bridge, FakeDom::default());

        assert!(sidebar.inject());
        assert_eq!(sidebar.dom.pressed["toggle-automute"], true);
        assert_eq!(sidebar.dom.pressed["toggle-autofocus"], false);
        assert_eq!(sidebar.dom.pressed.len(), 4);
        assert_eq!(sidebar.dom.values[USER_AGENT_SELECT_ID], "UA/1.0");
    }

    #[test]
    fn test_empty_assets_skip_injection() {
        let assets = SidebarAssets { html: String::new(), css: "x{}".to_string() };
        let mut sidebar = SidebarInjector::new(LocalBridge::new(assets), FakeDom::default());
        assert!(!sidebar.inject());
        assert!(!sidebar.inject());
        assert_eq!(sidebar.dom.injections, 0);
        assert_eq!(sidebar.toggle(Toggle::Automute), None);
    }

    #[test]
    fn test_toggle_persists_through_bridge() {
        let mut sidebar = injector();
        sidebar.inject();

        assert_eq!(sidebar.toggle(Toggle::Idleguard), Some(true));
        assert_eq!(sidebar.dom.pressed["toggle-idleguard"], true);
        assert!(sidebar.bridge.store.load().idleguard);

        assert_eq!(sidebar.toggle(Toggle::Idleguard), Some(false));
        assert!(!sidebar.bridge.store.load().idleguard);
    }

    #[test]
    fn test_toggle_is_optimistic_when_bridge_fails() {
        let mut sidebar = injector();
        sidebar.inject();
        sidebar.bridge.offline = true;

        assert_eq!(sidebar.toggle(Toggle::Presence), Some(true));
        assert_eq!(sidebar.dom.pressed["toggle-presence"], true);
        assert!(!sidebar.bridge.store.current().presence_enabled);
    }

    #[test]
    fn test_select_user_agent_and_close() {
        let mut sidebar = injector();
        sidebar.inject();
        sidebar.select_user_agent("Mozilla/5.0 Firefox");
        assert_eq!(sidebar.bridge.store.current().user_agent, "Mozilla/5.0 Firefox");
        assert!(matches!(sidebar.bridge.calls.last(), Some(BridgeRequest::SetUseragent(_))));

        sidebar.close();
        assert_eq!(sidebar.dom.open, Some(false));
    }
}
