//! Transfer-pull and measurement loop.
//!
//! Reads the connection one chunk at a time until the peer half-closes or a
//! byte target is met, counting every read that returned data. Received
//! bytes can be mirrored into a sink; losing the sink never stops the
//! counting.

use log::{debug, error, info, warn};
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;
use std::sync::Arc;

use crate::config::Config;
use crate::measurements::{StatsAccumulator, TransferStatistics};
use crate::progress::{notify, CallbackRef, ProgressCallback, ProgressEvent};

/// What one receive pass observed.
#[derive(Debug)]
pub struct ReceivedPass {
    pub statistics: TransferStatistics,
    /// Read error that ended the pass early, if any
    pub error: Option<io::Error>,
    /// Whether every received byte reached the sink
    pub persisted: bool,
}

impl ReceivedPass {
    /// True when the loop stopped at end-of-stream or at the byte target.
    pub fn is_clean(&self) -> bool {
        self.error.is_none()
    }
}

pub struct Receiver {
    chunk_size: usize,
    byte_target: Option<u64>,
    progress_every: u64,
    callback: Option<CallbackRef>,
}

impl Receiver {
    /// # Panics
    ///
    /// Panics if `chunk_size` is zero.
    pub fn new(chunk_size: usize) -> Self {
        assert!(chunk_size > 0, "chunk size must be positive");
        Self {
            chunk_size,
            byte_target: None,
            progress_every: crate::config::DEFAULT_PROGRESS_EVERY,
            callback: None,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.chunk_size)
            .with_byte_target(config.pass_bytes)
            .with_progress_every(config.progress_every)
    }

    /// Stops the pass once this many bytes have arrived. Reads are capped so
    /// no byte past the target is consumed.
    pub fn with_byte_target(mut self, target: Option<u64>) -> Self {
        self.byte_target = target;
        self
    }

    pub fn with_progress_every(mut self, packets: u64) -> Self {
        self.progress_every = packets;
        self
    }

    pub fn with_callback<C: ProgressCallback + 'static>(mut self, callback: C) -> Self {
        self.callback = Some(Arc::new(callback));
        self
    }

    pub(crate) fn with_callback_ref(mut self, callback: Option<CallbackRef>) -> Self {
        self.callback = callback;
        self
    }

    /// Receives one pass, writing into the file at `output` when given.
    ///
    /// The file is created (truncated) before the first read. If it cannot be
    /// created the pass runs without persistence.
    pub fn receive_to_file<R: Read>(&self, stream: &mut R, output: Option<&Path>) -> ReceivedPass {
        let mut file = output.and_then(|path| match File::create(path) {
            Ok(f) => Some(f),
            Err(e) => {
                warn!(
                    "Cannot create output file {}: {}; continuing without persistence",
                    path.display(),
                    e
                );
                None
            }
        });
        let opened = output.is_none() || file.is_some();

        let mut pass = self.receive_pass(
            stream,
            file.as_mut().map(|f| f as &mut dyn Write),
        );
        pass.persisted &= opened;
        pass
    }

    /// Reads from `stream` until end-of-stream, the byte target, or an error.
    pub fn receive_pass<R: Read>(
        &self,
        stream: &mut R,
        mut sink: Option<&mut dyn Write>,
    ) -> ReceivedPass {
        let mut buffer = vec![0u8; self.chunk_size];
        let mut persisted = true;
        let mut failure = None;

        let mut stats = StatsAccumulator::start();

        loop {
            let want = match self.byte_target {
                Some(target) => {
                    let remaining = target.saturating_sub(stats.total_bytes());
                    self.chunk_size.min(remaining.min(usize::MAX as u64) as usize)
                }
                None => self.chunk_size,
            };
            if want == 0 {
                break;
            }

            let n = match stream.read(&mut buffer[..want]) {
                Ok(0) => {
                    debug!("Peer closed after {} bytes", stats.total_bytes());
                    break;
                }
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    error!("Error receiving data: {}", e);
                    notify(&self.callback, ProgressEvent::Error(e.to_string()));
                    failure = Some(e);
                    break;
                }
            };

            stats.record(n);

            let write_failed = match sink.as_mut() {
                Some(out) => out.write_all(&buffer[..n]).err(),
                None => None,
            };
            if let Some(e) = write_failed {
                warn!("Writing received data failed: {}; dropping output", e);
                sink = None;
                persisted = false;
            }

            if self.progress_every > 0 && stats.packet_count() % self.progress_every == 0 {
                debug!(
                    "Received {} packets, {} bytes",
                    stats.packet_count(),
                    stats.total_bytes()
                );
                notify(
                    &self.callback,
                    ProgressEvent::Progress {
                        packets: stats.packet_count(),
                        total_bytes: stats.total_bytes(),
                    },
                );
            }
        }

        let statistics = stats.finish();

        if let Some(out) = sink.as_mut() {
            if let Err(e) = out.flush() {
                warn!("Flushing received data failed: {}", e);
                persisted = false;
            }
        }

        info!(
            "Pass received {} bytes in {} packets ({} ms)",
            statistics.total_bytes,
            statistics.packet_count,
            statistics.elapsed_ms()
        );

        ReceivedPass {
            statistics,
            error: failure,
            persisted,
        }
    }
}
