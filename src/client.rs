use crate::config::{Config, Role, TransferConfiguration};
use crate::measurements::{tcp_info, StatsAccumulator};
use crate::menu;
use crate::progress::{notify, CallbackRef, ProgressCallback, ProgressEvent};
use crate::report::PassReport;
use crate::sender::Sender;
use crate::socket_opts::configure_socket;
use crate::{Error, Result};
use log::{debug, error, info};
use std::net::{Shutdown, TcpStream};
use std::sync::Arc;

/// Sending side of a session.
///
/// Connects once, then runs one sender pass per configuration over the same
/// connection, reopening the input file for every pass. When all passes are
/// done the write half is shut down so the server sees end-of-stream.
///
/// # Examples
///
/// ```no_run
/// use tcptune::{Client, Config};
/// use std::time::Duration;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = Config::client("192.168.1.17".to_string(), 5050)
///     .with_input_path("file.txt");
///
/// let client = Client::new(config.with_send_delay(Duration::from_millis(500)))?
///     .with_callback(|event| println!("{:?}", event));
/// let reports = client.run(&[client.selection(3)])?;
///
/// for report in &reports {
///     println!("{}", report.render_text());
/// }
/// # Ok(())
/// # }
/// ```
pub struct Client {
    config: Config,
    callback: Option<CallbackRef>,
}

impl Client {
    /// Creates a new client.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the configuration has no server address
    /// or a zero chunk size.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            callback: None,
        })
    }

    pub fn with_callback<C: ProgressCallback + 'static>(mut self, callback: C) -> Self {
        self.callback = Some(Arc::new(callback));
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Menu option `option` with this client's `send_delay` as the pause.
    pub fn selection(&self, option: u32) -> TransferConfiguration {
        menu::client_selection(option, self.config.send_delay)
    }

    /// All four menu configurations with this client's `send_delay`.
    pub fn sweep(&self) -> Vec<TransferConfiguration> {
        menu::client_sweep(self.config.send_delay)
    }

    /// Opens the connection. Failure here ends the whole session.
    pub fn connect(&self) -> Result<TcpStream> {
        let addr = self.config.connect_addr()?;
        info!("Connecting to {}", addr);

        let stream = TcpStream::connect(&addr)
            .map_err(|e| Error::Connection(format!("Connection to {} failed: {}", addr, e)))?;
        info!("Connected to server successfully!");
        Ok(stream)
    }

    /// Connects, runs every pass in order, then half-closes.
    ///
    /// Individual passes can fail (missing input file, broken connection)
    /// without failing the session; their reports are marked aborted.
    pub fn run(&self, passes: &[TransferConfiguration]) -> Result<Vec<PassReport>> {
        let mut stream = self.connect()?;
        let reports = self.run_passes(&mut stream, passes);

        if let Err(e) = stream.shutdown(Shutdown::Write) {
            debug!("Half-close failed (peer may already be gone): {}", e);
        }
        Ok(reports)
    }

    /// Runs the passes on an already connected stream without closing it.
    pub fn run_passes(
        &self,
        stream: &mut TcpStream,
        passes: &[TransferConfiguration],
    ) -> Vec<PassReport> {
        passes
            .iter()
            .enumerate()
            .map(|(index, cfg)| self.run_pass(stream, index, cfg))
            .collect()
    }

    fn run_pass(
        &self,
        stream: &mut TcpStream,
        pass_index: usize,
        cfg: &TransferConfiguration,
    ) -> PassReport {
        notify(
            &self.callback,
            ProgressEvent::PassStarted {
                role: Role::Sender,
                pass_index,
                configuration: *cfg,
            },
        );
        info!("Pass {}: {}", pass_index + 1, cfg);

        let report = match configure_socket(stream, cfg, Role::Sender) {
            Err(e) => {
                error!("Failed to apply socket options: {}", e);
                let empty = StatsAccumulator::start().finish();
                PassReport::new(Role::Sender, pass_index, *cfg, empty)
                    .aborted(format!("socket options: {}", e))
            }
            Ok(()) => {
                let sender =
                    Sender::from_config(&self.config).with_callback_ref(self.callback.clone());
                match sender.send_file(&self.config.input_path, stream, cfg) {
                    Ok(stats) => PassReport::new(Role::Sender, pass_index, *cfg, stats),
                    Err(e) => {
                        error!("Pass {} failed: {}", pass_index + 1, e);
                        notify(&self.callback, ProgressEvent::Error(e.to_string()));
                        let stats = e
                            .partial_statistics()
                            .unwrap_or_else(|| StatsAccumulator::start().finish());
                        PassReport::new(Role::Sender, pass_index, *cfg, stats)
                            .aborted(e.to_string())
                    }
                }
            }
        };

        let report = report.with_tcp_stats(tcp_info(stream).ok());
        notify(
            &self.callback,
            ProgressEvent::PassCompleted(Box::new(report.clone())),
        );
        report
    }
}
