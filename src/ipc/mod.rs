//! IPC (Inter-Process Communication) via Unix sockets
//!
//! Two sockets share one framing: the bridge socket used by the sandboxed
//! context and the shell socket used by the host shell. Messages are
//! length-prefixed JSON.

use anyhow::{anyhow, bail, Context, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::io::{Read, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

pub mod messages;
pub use messages::{BridgeRequest, BridgeResponse, ShellCommand, ShellEvent};

use crate::constants::ipc::{BRIDGE_SOCKET, MAX_MESSAGE_SIZE, RUNTIME_DIR, SHELL_SOCKET};

/// Get default socket directory (XDG_RUNTIME_DIR with fallback to cache)
pub fn default_socket_dir() -> Result<PathBuf> {
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        return Ok(PathBuf::from(runtime_dir).join(RUNTIME_DIR));
    }

    let cache = dirs::cache_dir()
        .context("Failed to determine cache directory (no XDG_RUNTIME_DIR or HOME)")?;
    Ok(cache.join(RUNTIME_DIR))
}

pub fn bridge_socket_path(dir: &Path) -> PathBuf {
    dir.join(BRIDGE_SOCKET)
}

pub fn shell_socket_path(dir: &Path) -> PathBuf {
    dir.join(SHELL_SOCKET)
}

/// Client side of a socket (sandbox bridge client or host shell)
pub struct IpcClient {
    pub(crate) stream: UnixStream,
}

impl IpcClient {
    pub fn connect_to(path: &Path) -> Result<Self> {
        let stream = UnixStream::connect(path)
            .context(format!("Failed to connect to {}", path.display()))?;
        Ok(Self { stream })
    }

    pub fn send<T: Serialize>(&mut self, msg: &T) -> Result<()> {
        write_message(&mut self.stream, msg)
    }

    pub fn recv<T: DeserializeOwned>(&mut self) -> Result<T> {
        read_message(&mut self.stream)
    }

    /// Send a message and wait for exactly one reply
    pub fn request<T: Serialize, R: DeserializeOwned>(&mut self, msg: &T) -> Result<R> {
        self.send(msg)?;
        self.recv()
    }
}

/// Listening socket owned by the privileged process
pub struct IpcServer {
    listener: UnixListener,
    socket_path: PathBuf,
}

impl IpcServer {
    /// Bind to `socket_path`, refusing if another live process owns it
    pub fn bind_to(socket_path: PathBuf) -> Result<Self> {
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent)
                .context(format!("Failed to create socket directory: {}", parent.display()))?;
        }

        if socket_path.exists() {
            if UnixStream::connect(&socket_path).is_ok() {
                bail!("Another instance is already listening on {}", socket_path.display());
            }
            warn!(path = %socket_path.display(), "Removing stale socket");
            std::fs::remove_file(&socket_path)
                .context(format!("Failed to remove stale socket: {}", socket_path.display()))?;
        }

        let listener = UnixListener::bind(&socket_path)
            .context(format!("Failed to bind socket at {}", socket_path.display()))?;

        // Owner only
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&socket_path, std::fs::Permissions::from_mode(0o700))
                .context("Failed to set socket permissions")?;
        }

        info!(path = %socket_path.display(), "IPC socket bound");
        Ok(Self {
            listener,
            socket_path,
        })
    }

    /// Accept incoming connection (blocking)
    pub fn accept(&self) -> Result<UnixStream> {
        let (stream, _addr) = self.listener.accept()
            .context("Failed to accept IPC connection")?;
        Ok(stream)
    }

    pub fn path(&self) -> &Path {
        &self.socket_path
    }
}

/// How often a polling accept loop re-checks its running flag
const ACCEPT_POLL: Duration = Duration::from_millis(100);

/// Run `on_client` for every connection until `running` turns false.
///
/// The listener is switched to non-blocking so shutdown never waits on a
/// peer; accepted streams are blocking again. The server (and its socket
/// file) is dropped when the loop ends.
pub fn spawn_accept_loop<F>(server: IpcServer, running: Arc<AtomicBool>, mut on_client: F) -> Result<JoinHandle<()>>
where
    F: FnMut(UnixStream) + Send + 'static,
{
    server
        .listener
        .set_nonblocking(true)
        .context("Failed to set listener as non-blocking")?;

    Ok(std::thread::spawn(move || {
        info!(socket = %server.path().display(), "IPC listener started");
        while running.load(Ordering::SeqCst) {
            match server.listener.accept() {
                Ok((stream, _)) => {
                    if let Err(e) = stream.set_nonblocking(false) {
                        warn!(error = ?e, "Failed to make IPC stream blocking");
                        continue;
                    }
                    on_client(stream);
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => std::thread::sleep(ACCEPT_POLL),
                Err(e) => {
                    warn!(error = ?e, "IPC accept error");
                    std::thread::sleep(ACCEPT_POLL);
                }
            }
        }
        debug!(socket = %server.path().display(), "IPC listener stopped");
    }))
}

impl Drop for IpcServer {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.socket_path);
    }
}

/// Write length-prefixed message to stream
pub fn write_message<W: Write, T: Serialize>(stream: &mut W, msg: &T) -> Result<()> {
    let json = serde_json::to_vec(msg).context("Failed to serialize message to JSON")?;
    if json.len() > MAX_MESSAGE_SIZE {
        return Err(anyhow!("Message too large: {} bytes (max: {})", json.len(), MAX_MESSAGE_SIZE));
    }

    let len = json.len() as u32;
    stream
        .write_all(&len.to_le_bytes())
        .context("Failed to write message length")?;
    stream
        .write_all(&json)
        .context("Failed to write message payload")?;
    stream.flush().context("Failed to flush stream")?;

    Ok(())
}

/// Read length-prefixed message from stream
pub fn read_message<R: Read, T: DeserializeOwned>(stream: &mut R) -> Result<T> {
    let mut len_buf = [0u8; 4];
    stream
        .read_exact(&mut len_buf)
        .context("Failed to read message length")?;
    let len = u32::from_le_bytes(len_buf) as usize;

    if len > MAX_MESSAGE_SIZE {
        return Err(anyhow!("Message too large: {} bytes (max: {})", len, MAX_MESSAGE_SIZE));
    }

    let mut json_buf = vec![0u8; len];
    stream
        .read_exact(&mut json_buf)
        .context("Failed to read message payload")?;

    serde_json::from_slice(&json_buf).context("Failed to deserialize message from JSON")
}
