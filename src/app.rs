//! Core event loop
//!
//! [`App`] owns every piece of mutable state: the config store, the presence
//! client and the shell handle. Producer threads never touch them; they post
//! [`CoreEvent`]s and the loop handles one at a time.

use std::ops::ControlFlow;
use std::sync::mpsc::{Receiver, Sender};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::automation::{AutomationController, Effect};
use crate::bridge::ConfigBridge;
use crate::config::ConfigStore;
use crate::constants::automation::SIDEBAR_SHORTCUT;
use crate::ipc::{BridgeRequest, BridgeResponse, ShellEvent};
use crate::presence::{scheduler, PresenceClient, PresenceScheduler, PresenceTransport};
use crate::shell::ShellWindow;

/// Everything the core loop reacts to
#[derive(Debug)]
pub enum CoreEvent {
    /// Sandbox request; the reply goes back to the waiting connection
    Bridge {
        request: BridgeRequest,
        reply: Sender<BridgeResponse>,
    },
    Shell(ShellEvent),
    PresenceTick,
    /// Delayed end of the session-start always-on-top
    ClearAlwaysOnTop,
    Shutdown,
}

pub struct App<S: ShellWindow, T: PresenceTransport> {
    store: ConfigStore,
    bridge: ConfigBridge,
    presence: PresenceClient<T>,
    scheduler: PresenceScheduler,
    automation: AutomationController,
    shell: S,
    events: Sender<CoreEvent>,
}

impl<S: ShellWindow, T: PresenceTransport> App<S, T> {
    pub fn new(
        store: ConfigStore,
        bridge: ConfigBridge,
        presence: PresenceClient<T>,
        scheduler: PresenceScheduler,
        automation: AutomationController,
        shell: S,
        events: Sender<CoreEvent>,
    ) -> Self {
        Self {
            store,
            bridge,
            presence,
            scheduler,
            automation,
            shell,
            events,
        }
    }

    /// Connect presence once and start polling
    pub fn start_presence(&mut self) {
        self.presence.connect();
        self.scheduler.start(self.events.clone());
    }

    /// Handle events until `Shutdown`, then tear down
    pub fn run(mut self, events: Receiver<CoreEvent>) {
        info!(config = %self.store.path().display(), "Core loop started");
        for event in events.iter() {
            if self.handle(event).is_break() {
                break;
            }
        }
        self.shutdown();
    }

    pub fn handle(&mut self, event: CoreEvent) -> ControlFlow<()> {
        match event {
            CoreEvent::Bridge { request, reply } => {
                let pushes_user_agent = matches!(request, BridgeRequest::SetUseragent(_));
                let response = self.bridge.handle(request, &mut self.store, &mut self.shell);
                if pushes_user_agent && matches!(response, BridgeResponse::Updated { success: true, .. }) {
                    self.push_user_agent();
                }
                if reply.send(response).is_err() {
                    debug!("Bridge client went away before the reply");
                }
            }
            CoreEvent::Shell(event) => self.handle_shell_event(event),
            CoreEvent::PresenceTick => {
                scheduler::poll_once(&self.shell, &mut self.presence, self.store.current());
            }
            CoreEvent::ClearAlwaysOnTop => {
                if let Err(e) = self.shell.set_always_on_top(false) {
                    warn!(error = %format!("{e:#}"), "Failed to clear always-on-top");
                }
            }
            CoreEvent::Shutdown => {
                info!("Shutdown requested");
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    fn handle_shell_event(&mut self, event: ShellEvent) {
        let config = self.store.current();
        let effects = match event {
            ShellEvent::FocusLost => self.automation.on_focus_lost(config),
            ShellEvent::FocusGained => self.automation.on_focus_gained(config),
            ShellEvent::TitleChanged { title } => self.automation.on_title_changed(&title, config),
            ShellEvent::RequestObserved { url } => self.automation.on_request_observed(&url, config),
            ShellEvent::Ready => {
                info!("Shell ready");
                self.push_user_agent();
                if let Err(e) = self.shell.register_shortcut(SIDEBAR_SHORTCUT) {
                    warn!(error = %format!("{e:#}"), shortcut = SIDEBAR_SHORTCUT, "Failed to register shortcut");
                }
                return;
            }
            ShellEvent::ShortcutPressed { accelerator } => {
                debug!(%accelerator, "Shortcut pressed");
                if accelerator == SIDEBAR_SHORTCUT {
                    if let Err(e) = self.shell.toggle_sidebar() {
                        warn!(error = %format!("{e:#}"), "Failed to toggle sidebar");
                    }
                }
                return;
            }
            ShellEvent::ShortcutFailed { accelerator, reason } => {
                warn!(%accelerator, %reason, "Shortcut unavailable for this session");
                return;
            }
        };

        for effect in effects {
            self.apply(effect);
        }
    }

    fn push_user_agent(&mut self) {
        let user_agent = self.store.current().user_agent_override().map(str::to_string);
        if let Err(e) = self.shell.set_user_agent(user_agent.as_deref()) {
            warn!(error = %format!("{e:#}"), "Failed to set user agent");
        }
    }

    fn apply(&mut self, effect: Effect) {
        debug!(?effect, "Applying effect");
        let result = match &effect {
            Effect::SetAudioMuted(muted) => self.shell.set_audio_muted(*muted),
            Effect::PressKey(key) => self
                .shell
                .send_key(key, true)
                .and_then(|()| self.shell.send_key(key, false)),
            Effect::Maximize => self.shell.maximize(),
            Effect::Focus => self.shell.focus(),
            Effect::SetAlwaysOnTop(on_top) => self.shell.set_always_on_top(*on_top),
            Effect::ClearAlwaysOnTopAfter(delay) => {
                self.schedule(*delay, CoreEvent::ClearAlwaysOnTop);
                Ok(())
            }
            Effect::SetTitle(title) => self.shell.set_title(title),
        };

        if let Err(e) = result {
            warn!(error = %format!("{e:#}"), ?effect, "Shell side effect failed");
        }
    }

    /// Post `event` back into the loop after `delay`
    fn schedule(&self, delay: Duration, event: CoreEvent) {
        let events = self.events.clone();
        std::thread::spawn(move || {
            std::thread::sleep(delay);
            let _ = events.send(event);
        });
    }

    /// Stop the interval, drop shortcuts and close presence
    pub fn shutdown(&mut self) {
        self.scheduler.stop();
        if let Err(e) = self.shell.unregister_all_shortcuts() {
            warn!(error = %format!("{e:#}"), "Failed to unregister shortcuts");
        }
        self.presence.disconnect();
        info!("Core loop stopped");
    }
}
