//! A small TCP harness around `tally_engine`: clients stream delimited
//! record lines to a server that listens on several ports, and once every
//! session has ended the server aggregates everything it received.
//!
//! Configuration for both ends is read from YAML. See [`ServerConfig`] and
//! [`ClientConfig`].

pub mod client;
pub mod config;
pub mod error;
pub mod protocol;
pub mod server;

pub use client::Client;
pub use config::{ClientConfig, ServerConfig};
pub use error::{Result, WireError};
pub use server::{Server, SessionEnd};

use tracing_subscriber::EnvFilter;

/// Installs a `fmt` subscriber filtered by `RUST_LOG`, defaulting to `info`.
///
/// Meant for binaries; does nothing if a global subscriber already exists.
pub fn init_tracing() {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
  let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
