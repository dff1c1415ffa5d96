#![forbid(unsafe_code)]

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use regex::Regex;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn, Level as TraceLevel};
use tracing_subscriber::FmtSubscriber;

use gfn_eternity::app::{App, CoreEvent};
use gfn_eternity::automation::AutomationController;
use gfn_eternity::bridge::{listener::spawn_bridge_listener, ConfigBridge, SidebarAssets};
use gfn_eternity::config::ConfigStore;
use gfn_eternity::constants;
use gfn_eternity::ipc::{self, BridgeRequest, IpcServer};
use gfn_eternity::presence::{DiscordTransport, PresenceClient, PresenceScheduler};
use gfn_eternity::sandbox::{BridgeClient, BridgeTransport};
use gfn_eternity::shell::{spawn_shell_listener, ShellLink};

#[derive(Debug, Parser)]
#[command(name = "gfn-eternity", version, about = "GeForce Eternity core: settings, presence and shell automation")]
struct Cli {
    /// trace, debug, info, warn or error (overrides LOG_LEVEL)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the core (default)
    Run(RunArgs),
    /// Send one bridge command to a running core and print the reply
    Bridge {
        /// e.g. get-config, set-automute, open-external
        command: String,
        /// JSON value; anything that is not valid JSON is sent as a string
        payload: Option<String>,
        #[arg(long)]
        socket_dir: Option<PathBuf>,
    },
}

#[derive(Debug, Args)]
struct RunArgs {
    /// Settings file (defaults to the per-user config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory for the bridge and shell sockets
    #[arg(long)]
    socket_dir: Option<PathBuf>,

    /// Seconds between presence updates
    #[arg(long, default_value_t = constants::presence::DEFAULT_INTERVAL_SECS)]
    presence_interval: u64,

    /// Regex matched against titles to detect the idle countdown
    #[arg(long, default_value = constants::hosted::IDLE_WARNING_PATTERN)]
    idle_warning_pattern: String,

    /// Do not connect to the presence service
    #[arg(long)]
    no_presence: bool,
}

impl Default for RunArgs {
    fn default() -> Self {
        Self {
            config: None,
            socket_dir: None,
            presence_interval: constants::presence::DEFAULT_INTERVAL_SECS,
            idle_warning_pattern: constants::hosted::IDLE_WARNING_PATTERN.to_string(),
            no_presence: false,
        }
    }
}

fn init_logging(cli_level: Option<&str>) -> Result<()> {
    let level = cli_level
        .map(str::to_string)
        .or_else(|| std::env::var("LOG_LEVEL").ok())
        .unwrap_or_else(|| "info".to_string());

    let log_level = match level.to_lowercase().as_str() {
        "trace" => TraceLevel::TRACE,
        "debug" => TraceLevel::DEBUG,
        "warn" => TraceLevel::WARN,
        "error" => TraceLevel::ERROR,
        _ => TraceLevel::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .finish();

    tracing::subscriber::set_global_default(subscriber).context("Failed to install log subscriber")
}

/// SIGINT/SIGTERM become a `Shutdown` event
fn spawn_signal_watcher(events: Sender<CoreEvent>) -> Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM]).context("Failed to register signal handlers")?;
    std::thread::spawn(move || {
        if let Some(signal) = signals.forever().next() {
            info!(signal, "Received termination signal");
            let _ = events.send(CoreEvent::Shutdown);
        }
    });
    Ok(())
}

fn run(args: RunArgs) -> Result<()> {
    let socket_dir = match args.socket_dir {
        Some(dir) => dir,
        None => ipc::default_socket_dir()?,
    };
    let idle_warning = Regex::new(&args.idle_warning_pattern)
        .context(format!("Invalid idle warning pattern: {}", args.idle_warning_pattern))?;

    // Bridge first: a live socket means another instance owns this session
    let bridge_server = IpcServer::bind_to(ipc::bridge_socket_path(&socket_dir))?;
    let shell_server = IpcServer::bind_to(ipc::shell_socket_path(&socket_dir))?;

    let store = ConfigStore::open(args.config.unwrap_or_else(ConfigStore::default_path));
    info!(path = %store.path().display(), config = ?store.current(), "Loaded configuration");

    let (tx, rx) = mpsc::channel();
    let running = Arc::new(AtomicBool::new(true));
    let link = ShellLink::new();

    let bridge_thread = spawn_bridge_listener(bridge_server, tx.clone(), running.clone())?;
    let shell_thread = spawn_shell_listener(shell_server, link.clone(), tx.clone(), running.clone())?;
    spawn_signal_watcher(tx.clone())?;

    let mut app = App::new(
        store,
        ConfigBridge::new(SidebarAssets::embedded()),
        PresenceClient::new(DiscordTransport::default()),
        PresenceScheduler::new(Duration::from_secs(args.presence_interval.max(1))),
        AutomationController::new(idle_warning),
        link,
        tx,
    );

    if args.no_presence {
        info!("Presence disabled on the command line");
    } else {
        app.start_presence();
    }

    app.run(rx);

    running.store(false, Ordering::SeqCst);
    for (name, handle) in [("bridge", bridge_thread), ("shell", shell_thread)] {
        if handle.join().is_err() {
            warn!(listener = name, "Listener thread panicked");
        }
    }
    info!("Shutdown complete");
    Ok(())
}

/// Bare words are sent as JSON strings so `bridge set-useragent Foo` works
fn parse_payload(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn bridge_command(command: String, payload: Option<String>, socket_dir: Option<PathBuf>) -> Result<()> {
    let socket_dir = match socket_dir {
        Some(dir) => dir,
        None => ipc::default_socket_dir()?,
    };

    let mut frame = json!({ "command": &command });
    if let Some(raw) = payload {
        frame["payload"] = parse_payload(&raw);
    }
    let request: BridgeRequest = serde_json::from_value(frame)
        .context(format!("Unknown bridge command or missing payload: {command}"))?;

    let mut client = BridgeClient::connect(&ipc::bridge_socket_path(&socket_dir))?;
    let response = client.invoke(&request)?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref())?;

    match cli.command.unwrap_or(Command::Run(RunArgs::default())) {
        Command::Run(args) => run(args),
        Command::Bridge { command, payload, socket_dir } => bridge_command(command, payload, socket_dir),
    }
}
