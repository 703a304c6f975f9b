use crate::config::{Config, Role, TransferConfiguration, DEFAULT_PASS_BYTES};
use crate::measurements::{tcp_info, StatsAccumulator};
use crate::progress::{notify, CallbackRef, ProgressCallback, ProgressEvent};
use crate::receiver::Receiver;
use crate::report::PassReport;
use crate::socket_opts::{configure_socket, QuickAckReader};
use crate::{Error, Result};
use log::{error, info, warn};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// First pause after a failed `accept`; doubles per consecutive failure.
const ACCEPT_RETRY_BASE: Duration = Duration::from_millis(10);
const ACCEPT_RETRY_MAX: Duration = Duration::from_secs(1);

/// Receiving side of a session.
///
/// Serves one client at a time and never spawns threads. Two modes:
///
/// - [`Server::run_sweep`] accepts a single client and measures several
///   configurations back to back on that socket, each pass ending after
///   `pass_bytes` bytes (4096 unless configured). With more than one pass
///   each pass gets its own output file, see [`pass_output_path`].
/// - [`Server::run_loop`] accepts clients one after another, picks a
///   configuration per client, measures one pass until end-of-stream and
///   closes the socket before accepting the next.
///
/// # Examples
///
/// ```no_run
/// use tcptune::{menu, Config, Server};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let server = Server::new(Config::server(5050))?;
/// let listener = server.bind()?;
///
/// for report in server.run_sweep(&listener, &menu::server_sweep())? {
///     println!("{}", report.render_text());
/// }
/// # Ok(())
/// # }
/// ```
pub struct Server {
    config: Config,
    callback: Option<CallbackRef>,
}

impl Server {
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

    /// Binds the listening socket.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] if the address cannot be bound.
    pub fn bind(&self) -> Result<TcpListener> {
        let addr = self.config.listen_addr();
        let listener = TcpListener::bind(&addr)
            .map_err(|e| Error::Connection(format!("Cannot listen on {}: {}", addr, e)))?;
        info!("Listening on {}...", listener.local_addr()?);
        Ok(listener)
    }

    /// Accepts one client and runs every configuration on its socket.
    ///
    /// An accept failure is fatal in this mode.
    pub fn run_sweep(
        &self,
        listener: &TcpListener,
        passes: &[TransferConfiguration],
    ) -> Result<Vec<PassReport>> {
        let (mut stream, addr) = listener
            .accept()
            .map_err(|e| Error::Connection(format!("Accept failed: {}", e)))?;
        info!("Client connected: {}", addr);

        let target = Some(self.config.pass_bytes.unwrap_or(DEFAULT_PASS_BYTES));
        let reports = passes
            .iter()
            .enumerate()
            .map(|(index, cfg)| {
                let output = match self.config.output_path.as_deref() {
                    Some(path) if passes.len() > 1 => Some(pass_output_path(path, index)),
                    other => other.map(Path::to_path_buf),
                };
                self.receive_pass(&mut stream, index, cfg, target, output.as_deref())
            })
            .collect();

        info!("Closing connection to {}", addr);
        Ok(reports)
    }

    /// Serves clients one at a time until `max_clients` have been served,
    /// or forever when it is unset.
    ///
    /// `selector` picks the configuration for each accepted peer. Accept
    /// errors are logged and retried after a growing pause. Reports are delivered
    /// through the progress callback; the return value is the number of
    /// clients served.
    pub fn run_loop<F>(&self, listener: &TcpListener, mut selector: F) -> Result<usize>
    where
        F: FnMut(SocketAddr) -> TransferConfiguration,
    {
        let mut served = 0usize;
        let mut failures = 0u32;

        loop {
            if let Some(max) = self.config.max_clients {
                if served >= max {
                    info!("Served {} clients, stopping", served);
                    return Ok(served);
                }
            }

            match listener.accept() {
                Ok((mut stream, addr)) => {
                    failures = 0;
                    info!("New connection from {}", addr);
                    let cfg = selector(addr);
                    let output = self.config.output_path.as_deref();
                    self.receive_pass(&mut stream, served, &cfg, self.config.pass_bytes, output);
                    served += 1;
                    info!("Closing connection to {}", addr);
                }
                Err(e) => {
                    let pause = accept_backoff(failures);
                    failures = failures.saturating_add(1);
                    error!("Error accepting connection: {} (retrying in {:?})", e, pause);
                    thread::sleep(pause);
                }
            }
        }
    }

    fn receive_pass(
        &self,
        stream: &mut TcpStream,
        pass_index: usize,
        cfg: &TransferConfiguration,
        target: Option<u64>,
        output: Option<&Path>,
    ) -> PassReport {
        notify(
            &self.callback,
            ProgressEvent::PassStarted {
                role: Role::Receiver,
                pass_index,
                configuration: *cfg,
            },
        );
        info!("Pass {}: {}", pass_index + 1, cfg);

        if let Err(e) = configure_socket(stream, cfg, Role::Receiver) {
            error!("Failed to apply socket options: {}", e);
            let report = PassReport::new(
                Role::Receiver,
                pass_index,
                *cfg,
                StatsAccumulator::start().finish(),
            )
            .aborted(format!("socket options: {}", e));
            notify(
                &self.callback,
                ProgressEvent::PassCompleted(Box::new(report.clone())),
            );
            return report;
        }

        let receiver = Receiver::from_config(&self.config)
            .with_byte_target(target)
            .with_callback_ref(self.callback.clone());
        let pass = if cfg.delayed_ack_enabled {
            receiver.receive_to_file(stream, output)
        } else {
            receiver.receive_to_file(&mut QuickAckReader::new(stream), output)
        };

        if output.is_some() && !pass.persisted {
            warn!("Received data for pass {} was not fully saved", pass_index + 1);
        }

        let mut report = PassReport::new(Role::Receiver, pass_index, *cfg, pass.statistics)
            .with_tcp_stats(tcp_info(stream).ok());
        if let Some(e) = &pass.error {
            report = report.aborted(e.to_string());
        }

        notify(
            &self.callback,
            ProgressEvent::PassCompleted(Box::new(report.clone())),
        );
        report
    }
}

/// Output file for pass `pass_index` of a sweep: `received.bin` becomes
/// `received.pass1.bin`, `received.pass2.bin` and so on.
///
/// # Examples
///
/// ```
/// use tcptune::server::pass_output_path;
/// use std::path::Path;
///
/// assert_eq!(
///     pass_output_path(Path::new("out/received.bin"), 0),
///     Path::new("out/received.pass1.bin")
/// );
/// ```
pub fn pass_output_path(path: &Path, pass_index: usize) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{}.pass{}.{}", stem, pass_index + 1, ext.to_string_lossy()),
        None => format!("{}.pass{}", stem, pass_index + 1),
    };
    path.with_file_name(name)
}

fn accept_backoff(consecutive_failures: u32) -> Duration {
    ACCEPT_RETRY_BASE
        .saturating_mul(1u32 << consecutive_failures.min(16))
        .min(ACCEPT_RETRY_MAX)
}
