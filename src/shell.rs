//! Host shell link
//!
//! The host shell (window, web view, audio, input) is an external process.
//! It connects to the shell socket, streams [`ShellEvent`]s in and executes
//! the [`ShellCommand`]s the core writes back. The core only sees the
//! [`ShellWindow`] trait.

use anyhow::{anyhow, Result};
use std::os::unix::net::UnixStream;
use std::sync::atomic::AtomicBool;
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::app::CoreEvent;
use crate::bridge::ExternalOpener;
use crate::constants::{brand, ipc::SHELL_WRITE_TIMEOUT};
use crate::ipc::{self, IpcServer, ShellCommand, ShellEvent};

/// Window-level capabilities the core drives
pub trait ShellWindow: ExternalOpener {
    /// Title currently displayed by the shell
    fn title(&self) -> Result<String>;
    fn set_title(&mut self, title: &str) -> Result<()>;
    fn set_audio_muted(&mut self, muted: bool) -> Result<()>;
    fn focus(&mut self) -> Result<()>;
    fn maximize(&mut self) -> Result<()>;
    fn set_always_on_top(&mut self, on_top: bool) -> Result<()>;
    fn send_key(&mut self, key: &str, down: bool) -> Result<()>;
    fn set_user_agent(&mut self, user_agent: Option<&str>) -> Result<()>;
    fn toggle_sidebar(&mut self) -> Result<()>;
    fn register_shortcut(&mut self, accelerator: &str) -> Result<()>;
    fn unregister_all_shortcuts(&mut self) -> Result<()>;
}

#[derive(Debug, Default)]
struct LinkState {
    stream: Option<UnixStream>,
    generation: u64,
    title: String,
}

/// [`ShellWindow`] over the shell socket. Cloning shares the connection.
#[derive(Clone)]
pub struct ShellLink {
    inner: Arc<Mutex<LinkState>>,
    write_timeout: Duration,
}

impl Default for ShellLink {
    fn default() -> Self {
        Self::with_write_timeout(SHELL_WRITE_TIMEOUT)
    }
}

impl ShellLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A shell that blocks a write for longer than `write_timeout` is dropped
    pub fn with_write_timeout(write_timeout: Duration) -> Self {
        Self {
            inner: Arc::default(),
            write_timeout,
        }
    }

    fn lock(&self) -> MutexGuard<'_, LinkState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn is_attached(&self) -> bool {
        self.lock().stream.is_some()
    }

    /// Replace the current shell connection; returns its generation
    fn attach(&self, stream: UnixStream) -> u64 {
        if let Err(e) = stream.set_write_timeout(Some(self.write_timeout)) {
            warn!(error = ?e, "Failed to set shell write timeout");
        }
        let mut state = self.lock();
        if state.stream.is_some() {
            warn!("New shell connection replaces the previous one");
        }
        state.stream = Some(stream);
        state.generation += 1;
        state.title = brand::TITLE.to_string();
        state.generation
    }

    /// Drop the connection if it is still the one from `generation`
    fn detach(&self, generation: u64) {
        let mut state = self.lock();
        if state.generation == generation && state.stream.take().is_some() {
            info!("Shell detached");
        }
    }

    fn send(&self, command: ShellCommand) -> Result<()> {
        let mut state = self.lock();
        let Some(stream) = state.stream.as_mut() else {
            debug!(?command, "No shell attached, dropping command");
            return Ok(());
        };

        if let Err(e) = ipc::write_message(stream, &command) {
            warn!(error = %format!("{e:#}"), "Shell write failed, detaching");
            state.stream = None;
            return Err(e.context("Shell connection lost"));
        }
        Ok(())
    }
}

impl ExternalOpener for ShellLink {
    fn open_external(&mut self, url: &str) -> Result<()> {
        if !self.is_attached() {
            return Err(anyhow!("No shell attached to open {url}"));
        }
        self.send(ShellCommand::OpenExternal { url: url.to_string() })
    }
}

impl ShellWindow for ShellLink {
    fn title(&self) -> Result<String> {
        let state = self.lock();
        if state.stream.is_none() {
            return Err(anyhow!("No shell attached"));
        }
        Ok(state.title.clone())
    }

    fn set_title(&mut self, title: &str) -> Result<()> {
        self.send(ShellCommand::SetTitle { title: title.to_string() })?;
        self.lock().title = title.to_string();
        Ok(())
    }

    fn set_audio_muted(&mut self, muted: bool) -> Result<()> {
        self.send(ShellCommand::SetAudioMuted { muted })
    }

    fn focus(&mut self) -> Result<()> {
        self.send(ShellCommand::Focus)
    }

    fn maximize(&mut self) -> Result<()> {
        self.send(ShellCommand::Maximize)
    }

    fn set_always_on_top(&mut self, on_top: bool) -> Result<()> {
        self.send(ShellCommand::SetAlwaysOnTop { on_top })
    }

    fn send_key(&mut self, key: &str, down: bool) -> Result<()> {
        self.send(ShellCommand::SendKey { key: key.to_string(), down })
    }

    fn set_user_agent(&mut self, user_agent: Option<&str>) -> Result<()> {
        self.send(ShellCommand::SetUserAgent {
            user_agent: user_agent.map(str::to_string),
        })
    }

    fn toggle_sidebar(&mut self) -> Result<()> {
        self.send(ShellCommand::ToggleSidebar)
    }

    fn register_shortcut(&mut self, accelerator: &str) -> Result<()> {
        self.send(ShellCommand::RegisterShortcut { accelerator: accelerator.to_string() })
    }

    fn unregister_all_shortcuts(&mut self) -> Result<()> {
        self.send(ShellCommand::UnregisterAllShortcuts)
    }
}

/// Forward events from one shell connection into the core loop
fn read_shell_events(mut stream: UnixStream, link: ShellLink, generation: u64, events: Sender<CoreEvent>) {
    loop {
        match ipc::read_message::<_, ShellEvent>(&mut stream) {
            Ok(event) => {
                debug!(?event, "Shell event");
                if events.send(CoreEvent::Shell(event)).is_err() {
                    break;
                }
            }
            Err(e) => {
                debug!(error = %format!("{e:#}"), "Shell connection closed");
                break;
            }
        }
    }
    link.detach(generation);
}

/// Spawn the accept loop for host shell connections
pub fn spawn_shell_listener(
    server: IpcServer,
    link: ShellLink,
    events: Sender<CoreEvent>,
    running: Arc<AtomicBool>,
) -> Result<JoinHandle<()>> {
    ipc::spawn_accept_loop(server, running, move |stream| {
        let reader = match stream.try_clone() {
            Ok(reader) => reader,
            Err(e) => {
                warn!(error = ?e, "Failed to clone shell stream");
                return;
            }
        };
        let generation = link.attach(stream);
        info!(generation, "Shell attached");

        let link = link.clone();
        let events = events.clone();
        std::thread::spawn(move || read_shell_events(reader, link, generation, events));
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    /// In-memory shell that records every command
    #[derive(Default)]
    pub(crate) struct RecordingShell {
        pub current_title: Option<String>,
        pub commands: Vec<ShellCommand>,
        pub fail_shortcuts: bool,
    }

    impl ExternalOpener for RecordingShell {
        fn open_external(&mut self, url: &str) -> Result<()> {
            self.commands.push(ShellCommand::OpenExternal { url: url.to_string() });
            Ok(())
        }
    }

    impl ShellWindow for RecordingShell {
        fn title(&self) -> Result<String> {
            self.current_title.clone().ok_or_else(|| anyhow!("no window"))
        }

        fn set_title(&mut self, title: &str) -> Result<()> {
            self.current_title = Some(title.to_string());
            self.commands.push(ShellCommand::SetTitle { title: title.to_string() });
            Ok(())
        }

        fn set_audio_muted(&mut self, muted: bool) -> Result<()> {
            self.commands.push(ShellCommand::SetAudioMuted { muted });
            Ok(())
        }

        fn focus(&mut self) -> Result<()> {
            self.commands.push(ShellCommand::Focus);
            Ok(())
        }

        fn maximize(&mut self) -> Result<()> {
            self.commands.push(ShellCommand::Maximize);
            Ok(())
        }

        fn set_always_on_top(&mut self, on_top: bool) -> Result<()> {
            self.commands.push(ShellCommand::SetAlwaysOnTop { on_top });
            Ok(())
        }

        fn send_key(&mut self, key: &str, down: bool) -> Result<()> {
            self.commands.push(ShellCommand::SendKey { key: key.to_string(), down });
            Ok(())
        }

        fn set_user_agent(&mut self, user_agent: Option<&str>) -> Result<()> {
            self.commands.push(ShellCommand::SetUserAgent {
                user_agent: user_agent.map(str::to_string),
            });
            Ok(())
        }

        fn toggle_sidebar(&mut self) -> Result<()> {
            self.commands.push(ShellCommand::ToggleSidebar);
            Ok(())
        }

        fn register_shortcut(&mut self, accelerator: &str) -> Result<()> {
            if self.fail_shortcuts {
                return Err(anyhow!("accelerator taken"));
            }
            self.commands.push(ShellCommand::RegisterShortcut { accelerator: accelerator.to_string() });
            Ok(())
        }

        fn unregister_all_shortcuts(&mut self) -> Result<()> {
            self.commands.push(ShellCommand::UnregisterAllShortcuts);
            Ok(())
        }
    }

    #[test]
    fn test_detached_link_drops_commands_and_has_no_title() {
        let mut link = ShellLink::new();
        assert!(!link.is_attached());
        assert!(link.title().is_err());
        assert!(link.set_audio_muted(true).is_ok());
        assert!(link.open_external("https://example.com").is_err());
    }

    #[test]
    fn test_attached_link_writes_commands_and_tracks_title() {
        let (ours, mut theirs) = UnixStream::pair().unwrap();
        let mut link = ShellLink::new();
        let generation = link.attach(ours);

        assert_eq!(link.title().unwrap(), "GeForce Eternity");
        link.set_title("GeForce Eternity | Doom").unwrap();
        link.send_key("F15", true).unwrap();
        assert_eq!(link.title().unwrap(), "GeForce Eternity | Doom");

        let first: ShellCommand = ipc::read_message(&mut theirs).unwrap();
        let second: ShellCommand = ipc::read_message(&mut theirs).unwrap();
        assert_eq!(first, ShellCommand::SetTitle { title: "GeForce Eternity | Doom".to_string() });
        assert_eq!(second, ShellCommand::SendKey { key: "F15".to_string(), down: true });

        // A stale reader must not detach a newer connection
        let (newer, _keep) = UnixStream::pair().unwrap();
        link.attach(newer);
        link.detach(generation);
        assert!(link.is_attached());
    }

    #[test]
    fn test_stalled_shell_times_out_and_detaches() {
        let (ours, _stalled) = UnixStream::pair().unwrap();
        let mut link = ShellLink::with_write_timeout(Duration::from_millis(50));
        link.attach(ours);

        let title = "x".repeat(64 * 1024);
        let started = std::time::Instant::now();
        let mut failed = false;
        for _ in 0..1000 {
            if link.set_title(&title).is_err() {
                failed = true;
                break;
            }
        }

        assert!(failed);
        assert!(!link.is_attached());
        assert!(started.elapsed() < Duration::from_secs(5));
        // Later commands are dropped rather than blocking again
        assert!(link.focus().is_ok());
    }

    #[test]
    fn test_shell_listener_forwards_events_and_detaches_on_close() {
        let dir = tempfile::tempdir().unwrap();
        let server = IpcServer::bind_to(dir.path().join("shell.sock")).unwrap();
        let path = server.path().to_path_buf();
        let link = ShellLink::new();
        let running = Arc::new(AtomicBool::new(true));
        let (tx, rx) = std::sync::mpsc::channel();

        let handle = spawn_shell_listener(server, link.clone(), tx, running.clone()).unwrap();

        let mut host = ipc::IpcClient::connect_to(&path).unwrap();
        host.send(&ShellEvent::FocusLost).unwrap();
        let event = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(matches!(event, CoreEvent::Shell(ShellEvent::FocusLost)));
        assert!(link.is_attached());

        drop(host);
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while link.is_attached() && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(!link.is_attached());

        running.store(false, Ordering::SeqCst);
        handle.join().unwrap();
    }
}
