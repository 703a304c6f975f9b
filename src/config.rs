use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::{Error, Result};

/// Default chunk size in bytes used by both the sender and the receiver.
pub const DEFAULT_CHUNK_SIZE: usize = 40;

/// Default TCP port shared by client and server.
pub const DEFAULT_PORT: u16 = 5050;

/// Default number of bytes the server expects per pass when sweeping.
pub const DEFAULT_PASS_BYTES: u64 = 4096;

/// Default pause between chunks when the inter-chunk delay is enabled.
pub const DEFAULT_SEND_DELAY: Duration = Duration::from_millis(1000);

/// Default number of packets between receiver progress lines.
pub const DEFAULT_PROGRESS_EVERY: u64 = 10;

pub const DEFAULT_INPUT_FILE: &str = "file.txt";
pub const DEFAULT_OUTPUT_FILE: &str = "received.bin";

/// The socket-option combination used for one transfer pass.
///
/// Immutable once chosen. `nagle_enabled == false` maps to `TCP_NODELAY`,
/// `delayed_ack_enabled == false` maps to `TCP_QUICKACK` on the receiver.
///
/// # Examples
///
/// ```
/// use tcptune::TransferConfiguration;
/// use std::time::Duration;
///
/// let cfg = TransferConfiguration::new(false, true)
///     .with_inter_chunk_delay(Duration::from_millis(250));
///
/// assert!(!cfg.nagle_enabled);
/// assert!(cfg.has_delay());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferConfiguration {
    pub nagle_enabled: bool,
    pub delayed_ack_enabled: bool,
    #[serde(with = "crate::measurements::duration_ms", rename = "inter_chunk_delay_ms")]
    pub inter_chunk_delay: Duration,
}

impl TransferConfiguration {
    pub const fn new(nagle_enabled: bool, delayed_ack_enabled: bool) -> Self {
        Self {
            nagle_enabled,
            delayed_ack_enabled,
            inter_chunk_delay: Duration::ZERO,
        }
    }

    pub const fn with_inter_chunk_delay(mut self, delay: Duration) -> Self {
        self.inter_chunk_delay = delay;
        self
    }

    pub fn has_delay(&self) -> bool {
        !self.inter_chunk_delay.is_zero()
    }
}

impl Default for TransferConfiguration {
    /// Operating-system defaults: Nagle on, delayed ACK on, no pause.
    fn default() -> Self {
        Self::new(true, true)
    }
}

fn on_off(flag: bool) -> &'static str {
    if flag {
        "ON"
    } else {
        "OFF"
    }
}

impl fmt::Display for TransferConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Nagle {} | Delayed-ACK {}",
            on_off(self.nagle_enabled),
            on_off(self.delayed_ack_enabled)
        )?;
        if self.has_delay() {
            write!(f, " | Delay {}ms", self.inter_chunk_delay.as_millis())?;
        }
        Ok(())
    }
}

/// Which side of the connection a pass runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Pushes chunks into the connection (the client).
    Sender,
    /// Pulls bytes off the connection and measures them (the server).
    Receiver,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Sender => f.write_str("sender"),
            Role::Receiver => f.write_str("receiver"),
        }
    }
}

/// Test mode: client or server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    /// Server mode - accepts connections and receives
    Server,
    /// Client mode - connects and sends a file
    Client,
}

/// Configuration shared by the client and server session runners.
///
/// Every endpoint and size that a fixed build of this tool would compile in
/// lives here instead, so the transfer loops can be driven against any
/// address or against in-memory streams.
///
/// # Examples
///
/// ## Client
///
/// ```
/// use tcptune::Config;
///
/// let config = Config::client("192.168.1.17".to_string(), 5050)
///     .with_chunk_size(40)
///     .with_input_path("file.txt");
/// assert!(config.validate().is_ok());
/// ```
///
/// ## Server
///
/// ```
/// use tcptune::Config;
///
/// let config = Config::server(5050).with_pass_bytes(Some(4096));
/// assert_eq!(config.pass_bytes, Some(4096));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server mode or client mode
    pub mode: Mode,

    /// Port number to connect to or listen on
    pub port: u16,

    /// Server address (for client mode)
    pub server_addr: Option<String>,

    /// Bind address (for server mode)
    pub bind_addr: Option<IpAddr>,

    /// Size of the reusable chunk buffer in bytes
    pub chunk_size: usize,

    /// File the sender reads from
    pub input_path: PathBuf,

    /// File the receiver writes to; `None` disables persistence
    pub output_path: Option<PathBuf>,

    /// Bytes the receiver expects per pass before it stops reading.
    /// `None` reads until the peer half-closes.
    pub pass_bytes: Option<u64>,

    /// Upper bound on bytes the sender pushes per pass
    pub byte_limit: Option<u64>,

    /// Pause used by configurations that enable the inter-chunk delay
    pub send_delay: Duration,

    /// Packets between receiver progress events (0 disables them)
    pub progress_every: u64,

    /// Output in JSON format
    pub json: bool,

    /// Stop the looping server after this many clients
    pub max_clients: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: Mode::Client,
            port: DEFAULT_PORT,
            server_addr: None,
            bind_addr: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
            input_path: PathBuf::from(DEFAULT_INPUT_FILE),
            output_path: None,
            pass_bytes: None,
            byte_limit: None,
            send_delay: DEFAULT_SEND_DELAY,
            progress_every: DEFAULT_PROGRESS_EVERY,
            json: false,
            max_clients: None,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a server configuration listening on `port`.
    ///
    /// Received bytes are written to [`DEFAULT_OUTPUT_FILE`] unless
    /// [`Config::with_output_path`] says otherwise.
    pub fn server(port: u16) -> Self {
        Self {
            mode: Mode::Server,
            port,
            output_path: Some(PathBuf::from(DEFAULT_OUTPUT_FILE)),
            ..Default::default()
        }
    }

    /// Creates a client configuration that connects to `server_addr:port`.
    pub fn client(server_addr: String, port: u16) -> Self {
        Self {
            mode: Mode::Client,
            server_addr: Some(server_addr),
            port,
            ..Default::default()
        }
    }

    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size;
        self
    }

    pub fn with_input_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.input_path = path.into();
        self
    }

    pub fn with_output_path(mut self, path: Option<PathBuf>) -> Self {
        self.output_path = path;
        self
    }

    pub fn with_pass_bytes(mut self, bytes: Option<u64>) -> Self {
        self.pass_bytes = bytes;
        self
    }

    pub fn with_byte_limit(mut self, limit: Option<u64>) -> Self {
        self.byte_limit = limit;
        self
    }

    pub fn with_send_delay(mut self, delay: Duration) -> Self {
        self.send_delay = delay;
        self
    }

    pub fn with_progress_every(mut self, packets: u64) -> Self {
        self.progress_every = packets;
        self
    }

    pub fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }

    pub fn with_bind_addr(mut self, addr: Option<IpAddr>) -> Self {
        self.bind_addr = addr;
        self
    }

    pub fn with_max_clients(mut self, max: Option<usize>) -> Self {
        self.max_clients = max;
        self
    }

    /// Address string the client connects to.
    pub fn connect_addr(&self) -> Result<String> {
        let host = self.server_addr.as_deref().ok_or_else(|| {
            Error::Config("Server address is required for client mode".to_string())
        })?;
        Ok(format!("{}:{}", host, self.port))
    }

    /// Address string the server binds to (all interfaces by default).
    pub fn listen_addr(&self) -> String {
        let ip = self
            .bind_addr
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        SocketAddr::new(ip, self.port).to_string()
    }

    /// Checks the invariants the transfer loops rely on.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::Config("chunk size must be positive".to_string()));
        }
        if self.mode == Mode::Client {
            self.connect_addr()?;
        }
        Ok(())
    }
}
