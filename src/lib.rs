//! GeForce Eternity core
//!
//! Settings store, the sandbox bridge, window-title parsing, rich presence
//! and shell automation. The binary wires these to the bridge and shell
//! sockets; the sandbox module is the client half used by page glue.

#![forbid(unsafe_code)]

pub mod app;
pub mod automation;
pub mod bridge;
pub mod config;
pub mod constants;
pub mod ipc;
pub mod presence;
pub mod sandbox;
pub mod shell;
pub mod title;
