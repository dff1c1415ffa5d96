//! Rich presence reporting
//!
//! [`PresenceClient`] is the Disconnected → Connecting → Connected state
//! machine in front of a [`PresenceTransport`]. Reports are gated on the live
//! configuration and on the connection state; neither a missing service nor
//! a failed send ever reaches the caller as an error.

pub mod discord;
pub mod scheduler;

use anyhow::Result;
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

use crate::config::Configuration;
use crate::constants::presence as text;

pub use discord::DiscordTransport;
pub use scheduler::PresenceScheduler;

/// Status payload sent to the presence service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityPayload {
    pub details: String,
    pub state: String,
    pub large_image_key: String,
    pub large_image_text: String,
    /// Unix seconds
    pub start_timestamp: u64,
    pub instance: bool,
}

impl ActivityPayload {
    pub fn idle(start_timestamp: u64) -> Self {
        Self {
            details: text::IDLE_DETAILS.to_string(),
            state: text::IDLE_STATE.to_string(),
            large_image_key: text::LARGE_IMAGE_KEY.to_string(),
            large_image_text: text::IDLE_IMAGE_TEXT.to_string(),
            start_timestamp,
            instance: true,
        }
    }

    pub fn playing(game: &str, start_timestamp: u64) -> Self {
        Self {
            details: format!("{}{}", text::PLAYING_DETAILS_PREFIX, game),
            state: text::PLAYING_STATE.to_string(),
            large_image_key: text::LARGE_IMAGE_KEY.to_string(),
            large_image_text: text::PLAYING_IMAGE_TEXT.to_string(),
            start_timestamp,
            instance: true,
        }
    }
}

/// Connection to an external presence service
pub trait PresenceTransport {
    fn connect(&mut self) -> Result<()>;
    fn set_activity(&mut self, activity: &ActivityPayload) -> Result<()>;
    fn close(&mut self) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Derived presence bookkeeping, never persisted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceState {
    pub connected: bool,
    pub last_reported_game: Option<String>,
    /// Session start sent with the last report (unix seconds)
    pub session_start: Option<u64>,
    pub last_report_at: Option<Instant>,
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

pub struct PresenceClient<T: PresenceTransport> {
    transport: T,
    connection: ConnectionState,
    last_reported_game: Option<String>,
    session_start: Option<u64>,
    last_report_at: Option<Instant>,
    clock: fn() -> u64,
}

impl<T: PresenceTransport> PresenceClient<T> {
    pub fn new(transport: T) -> Self {
        Self::with_clock(transport, unix_now)
    }

    pub fn with_clock(transport: T, clock: fn() -> u64) -> Self {
        Self {
            transport,
            connection: ConnectionState::Disconnected,
            last_reported_game: None,
            session_start: None,
            last_report_at: None,
            clock,
        }
    }

    pub fn connection(&self) -> ConnectionState {
        self.connection
    }

    pub fn state(&self) -> PresenceState {
        PresenceState {
            connected: self.connection == ConnectionState::Connected,
            last_reported_game: self.last_reported_game.clone(),
            session_start: self.session_start,
            last_report_at: self.last_report_at,
        }
    }

    /// Connect once; a failure is logged and leaves the client Disconnected
    pub fn connect(&mut self) {
        if self.connection == ConnectionState::Connected {
            return;
        }

        self.connection = ConnectionState::Connecting;
        match self.transport.connect() {
            Ok(()) => {
                info!("Presence connected");
                self.connection = ConnectionState::Connected;
            }
            Err(e) => {
                warn!(error = %format!("{e:#}"), "Failed to connect to presence service");
                self.connection = ConnectionState::Disconnected;
            }
        }
    }

    /// Session start to send for `game`, resetting only on a new distinct
    /// game. Nothing is committed until the report goes through.
    fn session_start_for(&self, game: Option<&str>) -> u64 {
        let now = (self.clock)();
        match (self.session_start, game) {
            (None, _) => now,
            (Some(prev), Some(game)) if self.last_reported_game.as_deref() != Some(game) => now.max(prev),
            (Some(prev), _) => prev,
        }
    }

    /// Report the current activity. Returns whether anything was sent.
    ///
    /// No-op unless presence is enabled in `config` and the client is
    /// Connected. A failed send drops the client to Disconnected.
    pub fn report_activity(&mut self, game: Option<&str>, config: &Configuration) -> bool {
        if !config.presence_enabled {
            debug!("Presence disabled in config");
            return false;
        }
        if self.connection != ConnectionState::Connected {
            debug!(state = ?self.connection, "Presence not connected, skipping report");
            return false;
        }

        let start = self.session_start_for(game);
        let payload = match game {
            Some(game) => ActivityPayload::playing(game, start),
            None => ActivityPayload::idle(start),
        };

        match self.transport.set_activity(&payload) {
            Ok(()) => {
                debug!(?payload, "Presence updated");
                self.session_start = Some(start);
                self.last_reported_game = game.map(str::to_string);
                self.last_report_at = Some(Instant::now());
                true
            }
            Err(e) => {
                warn!(error = %format!("{e:#}"), "Failed to update presence, disconnecting");
                self.connection = ConnectionState::Disconnected;
                false
            }
        }
    }

    /// Close the connection; safe to call in any state
    pub fn disconnect(&mut self) {
        if self.connection == ConnectionState::Disconnected {
            return;
        }
        if let Err(e) = self.transport.close() {
            warn!(error = %format!("{e:#}"), "Failed to close presence connection");
        }
        self.connection = ConnectionState::Disconnected;
        info!("Presence disconnected");
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::cell::Cell;
    use std::rc::Rc;

    /// Records every payload; can be told to fail connect or send
    #[derive(Default, Clone)]
    pub(crate) struct FakeTransport {
        pub sent: Rc<std::cell::RefCell<Vec<ActivityPayload>>>,
        pub connects: Rc<Cell<u32>>,
        pub closes: Rc<Cell<u32>>,
        pub fail_connect: bool,
        pub fail_send: Rc<Cell<bool>>,
    }

    impl PresenceTransport for FakeTransport {
        fn connect(&mut self) -> Result<()> {
            self.connects.set(self.connects.get() + 1);
            if self.fail_connect {
                return Err(anyhow!("connection refused"));
            }
            Ok(())
        }

        fn set_activity(&mut self, activity: &ActivityPayload) -> Result<()> {
            if self.fail_send.get() {
                return Err(anyhow!("broken pipe"));
            }
            self.sent.borrow_mut().push(activity.clone());
            Ok(())
        }

        fn close(&mut self) -> Result<()> {
            self.closes.set(self.closes.get() + 1);
            Ok(())
        }
    }

    thread_local! {
        static NOW: Cell<u64> = const { Cell::new(1_000) };
    }

    fn fake_now() -> u64 {
        NOW.with(|n| n.get())
    }

    fn set_now(t: u64) {
        NOW.with(|n| n.set(t));
    }

    fn enabled() -> Configuration {
        Configuration { presence_enabled: true, ..Default::default() }
    }

    fn connected() -> (PresenceClient<FakeTransport>, FakeTransport) {
        let transport = FakeTransport::default();
        let mut client = PresenceClient::with_clock(transport.clone(), fake_now);
        client.connect();
        (client, transport)
    }

    #[test]
    fn test_connect_is_idempotent() {
        let (mut client, transport) = connected();
        client.connect();
        assert_eq!(client.connection(), ConnectionState::Connected);
        assert_eq!(transport.connects.get(), 1);
    }

    #[test]
    fn test_connect_failure_stays_disconnected() {
        let transport = FakeTransport { fail_connect: true, ..Default::default() };
        let mut client = PresenceClient::with_clock(transport.clone(), fake_now);
        client.connect();
        assert_eq!(client.connection(), ConnectionState::Disconnected);

        assert!(!client.report_activity(Some("Game"), &enabled()));
        assert!(transport.sent.borrow().is_empty());
    }

    #[test]
    fn test_report_is_noop_when_disabled_in_any_state() {
        let disabled = Configuration::default();

        let (mut client, transport) = connected();
        assert!(!client.report_activity(Some("Game"), &disabled));
        assert!(!client.report_activity(None, &disabled));

        client.disconnect();
        assert!(!client.report_activity(Some("Game"), &disabled));
        assert!(transport.sent.borrow().is_empty());
    }

    #[test]
    fn test_gate_is_read_on_every_call() {
        let (mut client, transport) = connected();
        assert!(client.report_activity(None, &enabled()));
        assert!(!client.report_activity(None, &Configuration::default()));
        assert!(client.report_activity(None, &enabled()));
        assert_eq!(transport.sent.borrow().len(), 2);
    }

    #[test]
    fn test_payload_text() {
        let (mut client, transport) = connected();
        set_now(5_000);
        client.report_activity(None, &enabled());
        client.report_activity(Some("Elden Ring"), &enabled());

        let sent = transport.sent.borrow();
        assert_eq!(sent[0], ActivityPayload::idle(5_000));
        assert_eq!(sent[0].details, "Browsing the library");
        assert_eq!(sent[1].details, "Playing: Elden Ring");
        assert_eq!(sent[1].large_image_text, "GeForce Now");
        assert!(sent[1].instance);
    }

    #[test]
    fn test_session_start_is_stable_and_resets_on_new_game() {
        let (mut client, transport) = connected();

        set_now(100);
        client.report_activity(None, &enabled());
        set_now(115);
        client.report_activity(None, &enabled());
        set_now(130);
        client.report_activity(Some("Portal"), &enabled());
        set_now(145);
        client.report_activity(Some("Portal"), &enabled());
        set_now(160);
        client.report_activity(Some("Celeste"), &enabled());

        let starts: Vec<u64> = transport.sent.borrow().iter().map(|p| p.start_timestamp).collect();
        assert_eq!(starts, vec![100, 100, 130, 130, 160]);
        assert_eq!(client.state().last_reported_game.as_deref(), Some("Celeste"));
    }

    #[test]
    fn test_session_start_never_decreases() {
        let (mut client, transport) = connected();
        set_now(500);
        client.report_activity(Some("A"), &enabled());
        // Wall clock stepped backwards
        set_now(400);
        client.report_activity(Some("B"), &enabled());

        let starts: Vec<u64> = transport.sent.borrow().iter().map(|p| p.start_timestamp).collect();
        assert_eq!(starts, vec![500, 500]);
    }

    #[test]
    fn test_send_failure_disconnects_and_suppresses() {
        let (mut client, transport) = connected();
        transport.fail_send.set(true);
        assert!(!client.report_activity(Some("Game"), &enabled()));
        assert_eq!(client.connection(), ConnectionState::Disconnected);

        transport.fail_send.set(false);
        assert!(!client.report_activity(Some("Game"), &enabled()));
        assert!(transport.sent.borrow().is_empty());

        client.connect();
        assert!(client.report_activity(Some("Game"), &enabled()));
    }

    #[test]
    fn test_failed_send_keeps_session_start() {
        let (mut client, transport) = connected();
        set_now(100);
        client.report_activity(Some("A"), &enabled());

        set_now(200);
        transport.fail_send.set(true);
        assert!(!client.report_activity(Some("B"), &enabled()));
        assert_eq!(client.state().session_start, Some(100));

        transport.fail_send.set(false);
        client.connect();
        set_now(300);
        assert!(client.report_activity(Some("A"), &enabled()));

        let starts: Vec<u64> = transport.sent.borrow().iter().map(|p| p.start_timestamp).collect();
        assert_eq!(starts, vec![100, 100]);
    }

    #[test]
    fn test_disconnect_is_idempotent() {
        let (mut client, transport) = connected();
        client.disconnect();
        client.disconnect();
        assert_eq!(transport.closes.get(), 1);
        assert!(!client.state().connected);
    }
}
