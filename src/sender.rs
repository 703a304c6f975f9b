//! Transfer-push loop.
//!
//! Reads a byte source in fixed-size chunks and writes each chunk to the
//! connection with one blocking send, optionally sleeping before every send.

use log::{debug, error, info};
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;
use std::sync::Arc;
use std::thread;

use crate::config::{Config, TransferConfiguration};
use crate::measurements::{StatsAccumulator, TransferStatistics};
use crate::progress::{notify, CallbackRef, ProgressCallback, ProgressEvent};
use crate::{Error, Result};

/// Pushes a byte source into a connection in `chunk_size` pieces.
///
/// Every chunk except the last is exactly `chunk_size` bytes, so a source of
/// `L` bytes is sent with `ceil(L / chunk_size)` writes.
///
/// # Examples
///
/// ```
/// use tcptune::{Sender, TransferConfiguration};
///
/// let sender = Sender::new(40);
/// let mut source = std::io::Cursor::new(vec![7u8; 100]);
/// let mut wire = Vec::new();
///
/// let stats = sender
///     .send_pass(&mut source, &mut wire, &TransferConfiguration::default())
///     .unwrap();
/// assert_eq!(stats.packet_count, 3);
/// assert_eq!(wire.len(), 100);
/// ```
pub struct Sender {
    chunk_size: usize,
    byte_limit: Option<u64>,
    callback: Option<CallbackRef>,
}

impl Sender {
    /// # Panics
    ///
    /// Panics if `chunk_size` is zero.
    pub fn new(chunk_size: usize) -> Self {
        assert!(chunk_size > 0, "chunk size must be positive");
        Self {
            chunk_size,
            byte_limit: None,
            callback: None,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.chunk_size).with_byte_limit(config.byte_limit)
    }

    /// Caps the bytes pushed per pass; the source may hold more.
    pub fn with_byte_limit(mut self, limit: Option<u64>) -> Self {
        self.byte_limit = limit;
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

    /// Opens `path` and sends its contents.
    ///
    /// Fails with [`Error::Source`] before anything is written if the file
    /// cannot be opened.
    pub fn send_file<W: Write>(
        &self,
        path: &Path,
        sink: &mut W,
        cfg: &TransferConfiguration,
    ) -> Result<TransferStatistics> {
        let mut file = File::open(path).map_err(|source| Error::Source {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Sending {} ({})", path.display(), cfg);
        self.send_pass(&mut file, sink, cfg)
    }

    /// Runs one pass from `source` into `sink`.
    ///
    /// A failed write ends the pass with [`Error::Transfer`], carrying the
    /// bytes already sent. Nothing is retried.
    pub fn send_pass<R: Read, W: Write>(
        &self,
        source: &mut R,
        sink: &mut W,
        cfg: &TransferConfiguration,
    ) -> Result<TransferStatistics> {
        let mut buffer = vec![0u8; self.chunk_size];
        let mut stats = StatsAccumulator::start();

        loop {
            let want = match self.byte_limit {
                Some(limit) => {
                    let remaining = limit.saturating_sub(stats.total_bytes());
                    self.chunk_size.min(remaining.min(usize::MAX as u64) as usize)
                }
                None => self.chunk_size,
            };
            if want == 0 {
                debug!("Byte limit reached after {} bytes", stats.total_bytes());
                break;
            }

            let n = match read_chunk(source, &mut buffer[..want]) {
                Ok(n) => n,
                Err(source) => {
                    return Err(Error::Transfer {
                        partial: stats.finish(),
                        source,
                    })
                }
            };
            if n == 0 {
                break;
            }

            if cfg.has_delay() {
                notify(
                    &self.callback,
                    ProgressEvent::Delaying {
                        delay: cfg.inter_chunk_delay,
                    },
                );
                thread::sleep(cfg.inter_chunk_delay);
            }

            if let Err(source) = sink.write_all(&buffer[..n]) {
                error!("Error sending data: {}", source);
                return Err(Error::Transfer {
                    partial: stats.finish(),
                    source,
                });
            }
            stats.record(n);

            debug!("Sent {} bytes. Total: {} bytes.", n, stats.total_bytes());
            notify(
                &self.callback,
                ProgressEvent::ChunkSent {
                    bytes: n,
                    total: stats.total_bytes(),
                },
            );
        }

        let flushed = sink.flush();
        let stats = stats.finish();
        if let Err(source) = flushed {
            return Err(Error::Transfer {
                partial: stats,
                source,
            });
        }

        info!(
            "Pass sent {} bytes in {} ms ({:.2} bytes/sec)",
            stats.total_bytes,
            stats.elapsed_ms(),
            stats.throughput
        );
        Ok(stats)
    }
}

/// Fills `buf` from `source`, stopping early only at end of input.
fn read_chunk<R: Read>(source: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match source.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::Mutex;
    use std::time::{Duration, Instant};

    /// Records the size of every write call.
    #[derive(Default)]
    struct RecordingSink {
        data: Vec<u8>,
        writes: Vec<usize>,
    }

    impl Write for RecordingSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.data.extend_from_slice(buf);
            self.writes.push(buf.len());
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Source that hands out at most `step` bytes per read.
    struct Trickle {
        data: Cursor<Vec<u8>>,
        step: usize,
    }

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = buf.len().min(self.step);
            self.data.read(&mut buf[..n])
        }
    }

    fn payload(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn test_4096_bytes_in_40_byte_chunks() {
        let data = payload(4096);
        let mut sink = RecordingSink::default();

        let stats = Sender::new(40)
            .send_pass(
                &mut Cursor::new(data.clone()),
                &mut sink,
                &TransferConfiguration::default(),
            )
            .unwrap();

        assert_eq!(sink.writes.len(), 103);
        assert!(sink.writes[..102].iter().all(|&n| n == 40));
        assert_eq!(sink.writes[102], 16);
        assert_eq!(sink.data, data);
        assert_eq!(stats.total_bytes, 4096);
        assert_eq!(stats.packet_count, 103);
        assert_eq!(stats.max_packet_size, 40);
    }

    #[test]
    fn test_short_reads_still_align_chunks() {
        let data = payload(100);
        let mut source = Trickle {
            data: Cursor::new(data.clone()),
            step: 7,
        };
        let mut sink = RecordingSink::default();

        Sender::new(40)
            .send_pass(&mut source, &mut sink, &TransferConfiguration::default())
            .unwrap();

        assert_eq!(sink.writes, vec![40, 40, 20]);
        assert_eq!(sink.data, data);
    }

    #[test]
    fn test_empty_source_sends_nothing() {
        let mut sink = RecordingSink::default();
        let stats = Sender::new(40)
            .send_pass(
                &mut Cursor::new(Vec::<u8>::new()),
                &mut sink,
                &TransferConfiguration::default(),
            )
            .unwrap();

        assert!(sink.writes.is_empty());
        assert_eq!(stats.total_bytes, 0);
        assert_eq!(stats.throughput, 0.0);
    }

    #[test]
    fn test_byte_limit_caps_pass() {
        let mut sink = RecordingSink::default();
        let stats = Sender::new(40)
            .with_byte_limit(Some(90))
            .send_pass(
                &mut Cursor::new(payload(400)),
                &mut sink,
                &TransferConfiguration::default(),
            )
            .unwrap();

        assert_eq!(sink.writes, vec![40, 40, 10]);
        assert_eq!(stats.total_bytes, 90);
    }

    /// Accepts `budget` writes, then fails like a reset connection.
    struct FailingSink {
        budget: usize,
    }

    impl Write for FailingSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.budget == 0 {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "peer gone"));
            }
            self.budget -= 1;
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_send_failure_aborts_with_partial_counts() {
        let mut sink = FailingSink { budget: 2 };
        let err = Sender::new(40)
            .send_pass(
                &mut Cursor::new(payload(400)),
                &mut sink,
                &TransferConfiguration::default(),
            )
            .unwrap_err();

        let partial = err.partial_statistics().expect("transfer error");
        assert_eq!(partial.total_bytes, 80);
        assert_eq!(partial.packet_count, 2);
        assert!(err.to_string().starts_with("Transfer aborted after 80 bytes"));
    }

    #[test]
    fn test_missing_file_is_source_error() {
        let mut sink = RecordingSink::default();
        let err = Sender::new(40)
            .send_file(
                Path::new("/nonexistent/definitely/missing.txt"),
                &mut sink,
                &TransferConfiguration::default(),
            )
            .unwrap_err();

        assert!(matches!(err, Error::Source { .. }));
        assert!(sink.writes.is_empty());
    }

    #[test]
    fn test_delay_applied_before_each_chunk() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let events_ref = events.clone();
        let sender = Sender::new(10).with_callback(move |e: ProgressEvent| {
            events_ref.lock().unwrap().push(e);
        });
        let cfg = TransferConfiguration::new(true, true)
            .with_inter_chunk_delay(Duration::from_millis(20));

        let start = Instant::now();
        sender
            .send_pass(
                &mut Cursor::new(payload(25)),
                &mut RecordingSink::default(),
                &cfg,
            )
            .unwrap();
        assert!(start.elapsed() >= Duration::from_millis(60));

        let events = events.lock().unwrap();
        let kinds: Vec<&str> = events
            .iter()
            .map(|e| match e {
                ProgressEvent::Delaying { .. } => "delay",
                ProgressEvent::ChunkSent { .. } => "sent",
                _ => "other",
            })
            .collect();
        assert_eq!(kinds, vec!["delay", "sent", "delay", "sent", "delay", "sent"]);
        assert!(matches!(events[5], ProgressEvent::ChunkSent { bytes: 5, total: 25 }));
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Property: L bytes in chunks of C take ceil(L / C) writes and
            /// only the last one may be short
            #[test]
            fn prop_write_count_is_ceiling(len in 0usize..5000, chunk in 1usize..200) {
                let data = payload(len);
                let mut sink = RecordingSink::default();

                let stats = Sender::new(chunk)
                    .send_pass(
                        &mut Cursor::new(data.clone()),
                        &mut sink,
                        &TransferConfiguration::default(),
                    )
                    .unwrap();

                prop_assert_eq!(sink.writes.len(), len.div_ceil(chunk));
                if let Some((&last, full)) = sink.writes.split_last() {
                    prop_assert!(full.iter().all(|&n| n == chunk));
                    let expected_last = if len % chunk == 0 { chunk } else { len % chunk };
                    prop_assert_eq!(last, expected_last);
                }
                prop_assert_eq!(stats.total_bytes, len as u64);
                prop_assert_eq!(stats.packet_count, sink.writes.len() as u64);
                prop_assert_eq!(sink.data, data);
            }
        }
    }
}
