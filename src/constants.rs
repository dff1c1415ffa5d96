//! Application-wide constants
//!
//! Branding strings, title conventions of the hosted application, presence
//! payload text and timing values live here so the rest of the crate never
//! carries string literals of its own.

/// Shell branding
pub mod brand {
    /// Title the shell shows when nothing is running
    pub const TITLE: &str = "GeForce Eternity";

    /// Separator between brand and game in a rewritten title
    pub const SEPARATOR: &str = " | ";

    /// Version reported to the sandboxed context
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");
}

/// Title conventions of the hosted application
pub mod hosted {
    /// Bare title of the hosted application (library / mall view)
    pub const BARE_TITLE: &str = "GeForce NOW";

    /// Prefix the hosted app puts before a game name
    pub const TITLE_PREFIX: &str = "GeForce NOW - ";

    /// Suffix the hosted app puts after a game name
    pub const TITLE_SUFFIX: &str = " on GeForce NOW";

    /// Default idle-warning marker (the countdown shown before a session times out)
    pub const IDLE_WARNING_PATTERN: &str = "60";

    /// Substrings that together identify the session-start WebSocket upgrade
    pub const SESSION_START_MARKERS: [&str; 3] = ["nvidiagrid.net", "/sign_in", "peer_id"];
}

/// Settings file location
pub mod config {
    /// Directory under the platform config dir
    pub const APP_DIR: &str = "gfn-eternity";

    /// Settings filename
    pub const FILENAME: &str = "settings.json";
}

/// IPC sockets
pub mod ipc {
    use std::time::Duration;

    /// Directory under XDG_RUNTIME_DIR (or the cache dir)
    pub const RUNTIME_DIR: &str = "gfn-eternity";

    /// Socket the sandboxed context talks to
    pub const BRIDGE_SOCKET: &str = "bridge.sock";

    /// Socket the host shell connects to
    pub const SHELL_SOCKET: &str = "shell.sock";

    /// Maximum message size (10 MB) to prevent DoS via memory exhaustion
    pub const MAX_MESSAGE_SIZE: usize = 10 * 1024 * 1024;

    /// A shell that stops reading for this long is dropped
    pub const SHELL_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

    /// Concurrent sandbox connections served by the bridge
    pub const MAX_BRIDGE_CLIENTS: usize = 8;
}

/// Rich presence service
pub mod presence {
    use std::time::Duration;

    /// Application identifier registered with the presence service
    pub const CLIENT_ID: &str = "1460053673546748125";

    /// Socket name prefix, suffixed with 0..=9
    pub const SOCKET_PREFIX: &str = "discord-ipc-";

    /// Number of socket slots probed on connect
    pub const SOCKET_SLOTS: u8 = 10;

    /// Protocol version sent in the handshake
    pub const PROTOCOL_VERSION: u32 = 1;

    /// Read/write timeout on the presence socket
    pub const IO_TIMEOUT: Duration = Duration::from_secs(5);

    /// Default polling cadence of the presence scheduler
    pub const DEFAULT_INTERVAL_SECS: u64 = 15;

    pub const LARGE_IMAGE_KEY: &str = "gfn";

    pub const IDLE_DETAILS: &str = "Browsing the library";
    pub const IDLE_STATE: &str = "Browsing games";
    pub const IDLE_IMAGE_TEXT: &str = "GeForce Eternity";

    pub const PLAYING_DETAILS_PREFIX: &str = "Playing: ";
    pub const PLAYING_STATE: &str = "Gaming";
    pub const PLAYING_IMAGE_TEXT: &str = "GeForce Now";
}

/// Automation timing and input
pub mod automation {
    use std::time::Duration;

    /// How long the window stays always-on-top after a session start
    pub const ALWAYS_ON_TOP_CLEAR_DELAY: Duration = Duration::from_millis(500);

    /// Harmless key used to reset the hosted app's idle timer
    pub const IDLE_GUARD_KEY: &str = "F15";

    /// Global shortcut that toggles the sidebar
    pub const SIDEBAR_SHORTCUT: &str = "CommandOrControl+I";
}

/// URL schemes the bridge will hand to the external opener
pub mod external {
    pub const ALLOWED_SCHEMES: [&str; 2] = ["http", "https"];
}
