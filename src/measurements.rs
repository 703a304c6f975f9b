use serde::{Deserialize, Serialize};
use std::net::TcpStream;
use std::time::{Duration, Instant};

/// Serializes a `Duration` as whole milliseconds.
pub(crate) mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

/// Average throughput in bytes per second: `total_bytes * 1000 / elapsed_ms`.
///
/// Returns exactly `0.0` when less than a millisecond has elapsed instead of
/// dividing by zero.
///
/// # Examples
///
/// ```
/// use tcptune::measurements::throughput;
/// use std::time::Duration;
///
/// assert_eq!(throughput(4096, Duration::from_millis(2)), 2_048_000.0);
/// assert_eq!(throughput(4096, Duration::ZERO), 0.0);
/// ```
pub fn throughput(total_bytes: u64, elapsed: Duration) -> f64 {
    let elapsed_ms = elapsed.as_millis();
    if elapsed_ms == 0 {
        0.0
    } else {
        (total_bytes as f64 * 1000.0) / elapsed_ms as f64
    }
}

/// Finalized statistics for one pass.
///
/// Produced only by [`StatsAccumulator::finish`], so a snapshot can never
/// pick up counts from another pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransferStatistics {
    pub total_bytes: u64,
    /// Number of send or receive calls that moved a positive byte count
    pub packet_count: u64,
    pub max_packet_size: u64,
    #[serde(with = "duration_ms", rename = "elapsed_ms")]
    pub elapsed: Duration,
    /// Bytes per second, see [`throughput`]
    pub throughput: f64,
}

impl TransferStatistics {
    pub fn average_packet_size(&self) -> f64 {
        if self.packet_count > 0 {
            self.total_bytes as f64 / self.packet_count as f64
        } else {
            0.0
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed.as_millis() as u64
    }
}

/// Mutable counters owned by a single transfer loop.
#[derive(Debug)]
pub struct StatsAccumulator {
    started: Instant,
    total_bytes: u64,
    packet_count: u64,
    max_packet_size: u64,
}

impl StatsAccumulator {
    /// Starts the pass clock.
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
            total_bytes: 0,
            packet_count: 0,
            max_packet_size: 0,
        }
    }

    /// Records one I/O call that moved `bytes`. Zero-length calls are ignored.
    pub fn record(&mut self, bytes: usize) {
        if bytes == 0 {
            return;
        }
        let bytes = bytes as u64;
        self.total_bytes += bytes;
        self.packet_count += 1;
        self.max_packet_size = self.max_packet_size.max(bytes);
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn packet_count(&self) -> u64 {
        self.packet_count
    }

    /// Stops the clock and freezes the counters.
    pub fn finish(self) -> TransferStatistics {
        let elapsed = self.started.elapsed();
        self.finish_with_elapsed(elapsed)
    }

    /// Freezes the counters against an externally measured duration.
    pub fn finish_with_elapsed(self, elapsed: Duration) -> TransferStatistics {
        TransferStatistics {
            total_bytes: self.total_bytes,
            packet_count: self.packet_count,
            max_packet_size: self.max_packet_size,
            elapsed,
            throughput: throughput(self.total_bytes, elapsed),
        }
    }
}

/// Kernel-side TCP counters for a connection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TcpStats {
    pub retransmits: u64,
    pub rtt_us: Option<u64>,
    pub snd_mss: Option<u64>,
    pub rcv_mss: Option<u64>,
}

/// Get TCP statistics from a socket (Linux only)
#[cfg(target_os = "linux")]
pub fn tcp_info(stream: &TcpStream) -> std::io::Result<TcpStats> {
    use std::mem;
    use std::os::unix::io::AsRawFd;

    // Leading fields of `struct tcp_info` from <linux/tcp.h>
    #[repr(C)]
    struct TcpInfo {
        state: u8,
        ca_state: u8,
        retransmits: u8,
        probes: u8,
        backoff: u8,
        options: u8,
        snd_wscale: u8,
        rcv_wscale: u8,

        rto: u32,
        ato: u32,
        snd_mss: u32,
        rcv_mss: u32,

        unacked: u32,
        sacked: u32,
        lost: u32,
        retrans: u32,
        fackets: u32,

        last_data_sent: u32,
        last_ack_sent: u32,
        last_data_recv: u32,
        last_ack_recv: u32,

        pmtu: u32,
        rcv_ssthresh: u32,
        rtt: u32,
        rttvar: u32,
        snd_ssthresh: u32,
        snd_cwnd: u32,
        advmss: u32,
        reordering: u32,

        rcv_rtt: u32,
        rcv_space: u32,

        total_retrans: u32,
    }

    let fd = stream.as_raw_fd();
    let mut info: TcpInfo = unsafe { mem::zeroed() };
    let mut len = mem::size_of::<TcpInfo>() as libc::socklen_t;

    let result = unsafe {
        libc::getsockopt(
            fd,
            libc::IPPROTO_TCP,
            libc::TCP_INFO,
            &mut info as *mut _ as *mut libc::c_void,
            &mut len,
        )
    };

    if result == 0 {
        Ok(TcpStats {
            retransmits: info.total_retrans as u64,
            rtt_us: Some(info.rtt as u64),
            snd_mss: Some(info.snd_mss as u64),
            rcv_mss: Some(info.rcv_mss as u64),
        })
    } else {
        Err(std::io::Error::last_os_error())
    }
}

#[cfg(not(target_os = "linux"))]
pub fn tcp_info(_stream: &TcpStream) -> std::io::Result<TcpStats> {
    Ok(TcpStats::default())
}
