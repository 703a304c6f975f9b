//! Applies a [`TransferConfiguration`] to a connected socket.
//!
//! Nagle's algorithm is controlled through `TCP_NODELAY` on both sides.
//! Delayed acknowledgements are controlled through `TCP_QUICKACK`, which
//! only exists on Linux and is only meaningful on the receiving side.

use log::{debug, warn};
use std::io::{self, Read};
use std::net::TcpStream;

use crate::config::{Role, TransferConfiguration};

/// Requests the options for `cfg` on `stream` before a pass starts.
pub fn configure_socket(
    stream: &TcpStream,
    cfg: &TransferConfiguration,
    role: Role,
) -> io::Result<()> {
    stream.set_nodelay(!cfg.nagle_enabled)?;
    debug!("TCP_NODELAY={} ({})", !cfg.nagle_enabled, role);

    if role == Role::Receiver {
        match set_quickack(stream, !cfg.delayed_ack_enabled) {
            Ok(()) => debug!("TCP_QUICKACK={}", !cfg.delayed_ack_enabled),
            Err(e) if e.kind() == io::ErrorKind::Unsupported => {
                warn!("TCP_QUICKACK unavailable on this platform; delayed-ACK left at OS default")
            }
            Err(e) => return Err(e),
        }
    }

    Ok(())
}

/// Sets `TCP_QUICKACK`. The kernel may clear it again on its own, so callers
/// that care re-apply it before reading.
#[cfg(target_os = "linux")]
pub fn set_quickack(stream: &TcpStream, enabled: bool) -> io::Result<()> {
    use std::mem;
    use std::os::unix::io::AsRawFd;

    let flag: libc::c_int = enabled as libc::c_int;
    let result = unsafe {
        libc::setsockopt(
            stream.as_raw_fd(),
            libc::IPPROTO_TCP,
            libc::TCP_QUICKACK,
            &flag as *const _ as *const libc::c_void,
            mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };

    if result == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(not(target_os = "linux"))]
pub fn set_quickack(_stream: &TcpStream, _enabled: bool) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "TCP_QUICKACK is Linux-only",
    ))
}

/// Reader that re-requests `TCP_QUICKACK` before every read.
///
/// Linux drops back into delayed-ACK mode on its own, so a pass measuring
/// quick acknowledgements has to keep asking for them.
pub struct QuickAckReader<'a> {
    stream: &'a TcpStream,
}

impl<'a> QuickAckReader<'a> {
    pub fn new(stream: &'a TcpStream) -> Self {
        Self { stream }
    }
}

impl Read for QuickAckReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if let Err(e) = set_quickack(self.stream, true) {
            debug!("Re-arming TCP_QUICKACK failed: {}", e);
        }
        let mut stream = self.stream;
        stream.read(buf)
    }
}

/// Reads back `TCP_QUICKACK`.
#[cfg(target_os = "linux")]
pub fn quickack(stream: &TcpStream) -> io::Result<bool> {
    use std::mem;
    use std::os::unix::io::AsRawFd;

    let mut flag: libc::c_int = 0;
    let mut len = mem::size_of::<libc::c_int>() as libc::socklen_t;
    let result = unsafe {
        libc::getsockopt(
            stream.as_raw_fd(),
            libc::IPPROTO_TCP,
            libc::TCP_QUICKACK,
            &mut flag as *mut _ as *mut libc::c_void,
            &mut len,
        )
    };

    if result == 0 {
        Ok(flag != 0)
    } else {
        Err(io::Error::last_os_error())
    }
}
