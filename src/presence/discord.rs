//! Discord local RPC transport
//!
//! Frames are `opcode: u32 LE`, `length: u32 LE`, then JSON. The client
//! handshakes once, then sends `SET_ACTIVITY` commands and waits for the
//! matching reply. Every socket operation has a timeout.

use anyhow::{anyhow, bail, Context, Result};
use serde::Serialize;
use serde_json::{json, Value};
use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{ActivityPayload, PresenceTransport};
use crate::constants::ipc::MAX_MESSAGE_SIZE;
use crate::constants::presence::{CLIENT_ID, IO_TIMEOUT, PROTOCOL_VERSION, SOCKET_PREFIX, SOCKET_SLOTS};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
enum Opcode {
    Handshake = 0,
    Frame = 1,
    Close = 2,
    Ping = 3,
    Pong = 4,
}

impl Opcode {
    fn from_u32(op: u32) -> Option<Self> {
        Some(match op {
            0 => Opcode::Handshake,
            1 => Opcode::Frame,
            2 => Opcode::Close,
            3 => Opcode::Ping,
            4 => Opcode::Pong,
            _ => return None,
        })
    }
}

fn write_frame<W: Write>(stream: &mut W, op: Opcode, payload: &Value) -> Result<()> {
    let json = serde_json::to_vec(payload).context("Failed to serialize presence frame")?;
    let mut buf = Vec::with_capacity(8 + json.len());
    buf.extend_from_slice(&(op as u32).to_le_bytes());
    buf.extend_from_slice(&(json.len() as u32).to_le_bytes());
    buf.extend_from_slice(&json);
    stream.write_all(&buf).context("Failed to write presence frame")?;
    stream.flush().context("Failed to flush presence socket")?;
    Ok(())
}

fn read_frame<R: Read>(stream: &mut R) -> Result<(Opcode, Value)> {
    let mut header = [0u8; 8];
    stream
        .read_exact(&mut header)
        .context("Failed to read presence frame header")?;
    let op = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
    let len = u32::from_le_bytes([header[4], header[5], header[6], header[7]]) as usize;

    let op = Opcode::from_u32(op).ok_or_else(|| anyhow!("Unknown presence opcode {op}"))?;
    if len > MAX_MESSAGE_SIZE {
        bail!("Presence frame too large: {len} bytes");
    }

    let mut payload = vec![0u8; len];
    stream
        .read_exact(&mut payload)
        .context("Failed to read presence frame payload")?;
    let value = serde_json::from_slice(&payload).context("Failed to parse presence frame")?;
    Ok((op, value))
}

/// Directories that may hold the presence service's sockets
fn default_socket_dirs() -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = ["XDG_RUNTIME_DIR", "TMPDIR", "TMP", "TEMP"]
        .iter()
        .filter_map(|var| std::env::var_os(var).map(PathBuf::from))
        .collect();
    dirs.push(PathBuf::from("/tmp"));

    // Sandboxed desktop clients put the socket one level down
    let mut with_sandboxes = Vec::new();
    for dir in dirs {
        with_sandboxes.push(dir.join("app/com.discordapp.Discord"));
        with_sandboxes.push(dir.join("snap.discord"));
        with_sandboxes.push(dir);
    }
    with_sandboxes
}

#[derive(Serialize)]
struct WireActivity<'a> {
    details: &'a str,
    state: &'a str,
    timestamps: WireTimestamps,
    assets: WireAssets<'a>,
    instance: bool,
}

#[derive(Serialize)]
struct WireTimestamps {
    start: u64,
}

#[derive(Serialize)]
struct WireAssets<'a> {
    large_image: &'a str,
    large_text: &'a str,
}

impl<'a> From<&'a ActivityPayload> for WireActivity<'a> {
    fn from(p: &'a ActivityPayload) -> Self {
        Self {
            details: &p.details,
            state: &p.state,
            timestamps: WireTimestamps { start: p.start_timestamp },
            assets: WireAssets {
                large_image: &p.large_image_key,
                large_text: &p.large_image_text,
            },
            instance: p.instance,
        }
    }
}

/// Presence transport over the Discord desktop client's local socket
pub struct DiscordTransport {
    client_id: String,
    socket_dirs: Vec<PathBuf>,
    stream: Option<UnixStream>,
}

impl Default for DiscordTransport {
    fn default() -> Self {
        Self::new(CLIENT_ID, default_socket_dirs())
    }
}

impl DiscordTransport {
    pub fn new(client_id: impl Into<String>, socket_dirs: Vec<PathBuf>) -> Self {
        Self {
            client_id: client_id.into(),
            socket_dirs,
            stream: None,
        }
    }

    fn open_socket(&self) -> Result<(PathBuf, UnixStream)> {
        for dir in &self.socket_dirs {
            for slot in 0..SOCKET_SLOTS {
                let path = dir.join(format!("{SOCKET_PREFIX}{slot}"));
                if let Ok(stream) = UnixStream::connect(&path) {
                    return Ok((path, stream));
                }
            }
        }
        bail!("No presence socket found (is Discord running?)")
    }

    /// Read until a non-ping frame arrives, answering pings on the way
    fn read_reply(stream: &mut UnixStream) -> Result<Value> {
        loop {
            match read_frame(stream)? {
                (Opcode::Ping, payload) => write_frame(stream, Opcode::Pong, &payload)?,
                (Opcode::Close, payload) => {
                    let message = payload["message"].as_str().unwrap_or("closed by peer");
                    bail!("Presence service closed the connection: {message}");
                }
                (Opcode::Frame, payload) => return Ok(payload),
                (op, _) => debug!(?op, "Ignoring presence frame"),
            }
        }
    }

    fn handshake(&self, stream: &mut UnixStream) -> Result<()> {
        write_frame(
            stream,
            Opcode::Handshake,
            &json!({ "v": PROTOCOL_VERSION, "client_id": self.client_id }),
        )?;
        let reply = Self::read_reply(stream)?;
        if reply["evt"] != "READY" {
            bail!("Unexpected handshake reply: {reply}");
        }
        Ok(())
    }
}

impl PresenceTransport for DiscordTransport {
    fn connect(&mut self) -> Result<()> {
        let (path, mut stream) = self.open_socket()?;
        stream.set_read_timeout(Some(IO_TIMEOUT)).context("Failed to set read timeout")?;
        stream.set_write_timeout(Some(IO_TIMEOUT)).context("Failed to set write timeout")?;
        self.handshake(&mut stream)
            .context(format!("Presence handshake failed on {}", path.display()))?;
        info!(path = %path.display(), "Presence socket connected");
        self.stream = Some(stream);
        Ok(())
    }

    fn set_activity(&mut self, activity: &ActivityPayload) -> Result<()> {
        let stream = self.stream.as_mut().context("Presence socket not connected")?;
        let nonce = Uuid::new_v4().to_string();
        let command = json!({
            "cmd": "SET_ACTIVITY",
            "args": {
                "pid": std::process::id(),
                "activity": WireActivity::from(activity),
            },
            "nonce": nonce,
        });

        let result = write_frame(stream, Opcode::Frame, &command).and_then(|_| Self::read_reply(stream));
        let reply = match result {
            Ok(reply) => reply,
            Err(e) => {
                self.stream = None;
                return Err(e);
            }
        };

        if reply["evt"] == "ERROR" {
            let message = reply["data"]["message"].as_str().unwrap_or("unknown error");
            bail!("Presence service rejected activity: {message}");
        }
        if reply["nonce"] != nonce.as_str() {
            warn!(expected = %nonce, reply = %reply, "Presence reply nonce mismatch");
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(mut stream) = self.stream.take() {
            write_frame(&mut stream, Opcode::Close, &json!({}))?;
            let _ = stream.shutdown(std::net::Shutdown::Both);
        }
        Ok(())
    }
}
