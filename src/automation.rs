//! Shell-event automation
//!
//! Turns focus, title and network-request events into shell side effects,
//! reading the live configuration at event time. The controller is pure:
//! it returns [`Effect`]s and the core loop applies them.

use regex::Regex;
use std::time::Duration;
use tracing::debug;

use crate::config::Configuration;
use crate::constants::automation::{ALWAYS_ON_TOP_CLEAR_DELAY, IDLE_GUARD_KEY};
use crate::constants::hosted::SESSION_START_MARKERS;
use crate::title::parse_title;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    SetAudioMuted(bool),
    /// Key down followed by key up
    PressKey(&'static str),
    Maximize,
    Focus,
    SetAlwaysOnTop(bool),
    /// Post a clear of always-on-top back to the loop after the delay
    ClearAlwaysOnTopAfter(Duration),
    SetTitle(String),
}

pub struct AutomationController {
    idle_warning: Regex,
}

impl AutomationController {
    /// `idle_warning` matches titles that show the hosted app's idle countdown
    pub fn new(idle_warning: Regex) -> Self {
        Self { idle_warning }
    }

    pub fn on_focus_lost(&self, config: &Configuration) -> Vec<Effect> {
        if !config.automute {
            return vec![];
        }
        debug!("Window unfocused, muting audio");
        vec![Effect::SetAudioMuted(true)]
    }

    pub fn on_focus_gained(&self, config: &Configuration) -> Vec<Effect> {
        if !config.automute {
            return vec![];
        }
        debug!("Window focused, unmuting audio");
        vec![Effect::SetAudioMuted(false)]
    }

    /// Idle guard first, then the branded title rewrite
    pub fn on_title_changed(&self, title: &str, config: &Configuration) -> Vec<Effect> {
        let mut effects = Vec::with_capacity(2);

        if config.idleguard && self.idle_warning.is_match(title) {
            debug!(title = %title, "Idle warning detected, nudging session");
            effects.push(Effect::PressKey(IDLE_GUARD_KEY));
        }

        effects.push(Effect::SetTitle(parse_title(title).branded_title()));
        effects
    }

    pub fn on_request_observed(&self, url: &str, config: &Configuration) -> Vec<Effect> {
        if !is_session_start(url) {
            return vec![];
        }
        debug!(url = %url, "Session start detected");
        if !config.autofocus {
            return vec![];
        }

        vec![
            Effect::Maximize,
            Effect::Focus,
            Effect::SetAlwaysOnTop(true),
            Effect::ClearAlwaysOnTopAfter(ALWAYS_ON_TOP_CLEAR_DELAY),
        ]
    }
}

/// Cloud-match websocket upgrade that precedes a game session
pub fn is_session_start(url: &str) -> bool {
    SESSION_START_MARKERS.iter().all(|marker| url.contains(marker))
}
