//! Presence polling
//!
//! The scheduler owns a timer thread that posts [`CoreEvent::PresenceTick`]
//! into the core loop at a fixed interval. The loop answers each tick with
//! [`poll_once`]. Stopping is explicit and joins the thread.

use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{PresenceClient, PresenceTransport};
use crate::app::CoreEvent;
use crate::config::Configuration;
use crate::shell::ShellWindow;
use crate::title::parse_title;

pub struct PresenceScheduler {
    interval: Duration,
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl PresenceScheduler {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            stop_tx: None,
            handle: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Start ticking into `events`; a second call is a no-op
    pub fn start(&mut self, events: Sender<CoreEvent>) {
        if self.is_running() {
            return;
        }

        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let interval = self.interval;
        let handle = std::thread::spawn(move || {
            loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        if events.send(CoreEvent::PresenceTick).is_err() {
                            debug!("Core loop gone, presence scheduler exiting");
                            break;
                        }
                    }
                    // Explicit stop or the scheduler was dropped
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            }
        });

        info!(interval_secs = interval.as_secs_f32(), "Presence scheduler started");
        self.stop_tx = Some(stop_tx);
        self.handle = Some(handle);
    }

    /// Stop ticking and wait for the timer thread
    pub fn stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Presence scheduler thread panicked");
            }
            info!("Presence scheduler stopped");
        }
    }
}

impl Drop for PresenceScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

/// One polling step: read the shell title, parse it, report it.
/// A failed title read skips this tick.
pub fn poll_once<S, T>(shell: &S, client: &mut PresenceClient<T>, config: &Configuration) -> bool
where
    S: ShellWindow + ?Sized,
    T: PresenceTransport,
{
    let title = match shell.title() {
        Ok(title) => title,
        Err(e) => {
            debug!(error = %format!("{e:#}"), "Could not read shell title for presence");
            return false;
        }
    };

    let activity = parse_title(&title);
    debug!(title = %title, ?activity, "Presence poll");
    client.report_activity(activity.game(), config)
}
