//! tcptune - measure how Nagle's algorithm and delayed ACKs shape a small-chunk transfer
//!
//! A client pushes a file over TCP in small fixed-size chunks while a server
//! drains the connection, and both sides report what they saw. Each pass runs
//! under one [`TransferConfiguration`]: Nagle on or off, delayed ACKs on or off,
//! and optionally a pause before every chunk on the sending side.
//!
//! # Features
//!
//! - Blocking, single-connection sender and receiver loops
//! - `TCP_NODELAY` and (on Linux) `TCP_QUICKACK` applied per pass
//! - Per-pass statistics: bytes, packets, largest read, elapsed time, throughput
//! - Sweep mode running every menu configuration over one connection
//! - Text or JSON reports, with kernel `TCP_INFO` counters where available

pub mod client;
pub mod config;
pub mod error;
pub mod measurements;
pub mod menu;
pub mod progress;
pub mod receiver;
pub mod report;
pub mod sender;
pub mod server;
pub mod socket_opts;

pub use client::Client;
pub use config::{Config, Mode, Role, TransferConfiguration};
pub use error::{Error, Result};
pub use measurements::{TcpStats, TransferStatistics};
pub use progress::{ProgressCallback, ProgressEvent};
pub use receiver::{ReceivedPass, Receiver};
pub use report::{PassOutcome, PassReport};
pub use sender::Sender;
pub use server::Server;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
