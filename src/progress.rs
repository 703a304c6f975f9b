use std::sync::Arc;
use std::time::Duration;

use crate::config::{Role, TransferConfiguration};
use crate::report::PassReport;

/// Progress event types reported while passes run.
///
/// The transfer loops never print; everything an operator sees flows
/// through these events so the binary decides how to render them.
///
/// # Examples
///
/// ```
/// use tcptune::{ProgressCallback, ProgressEvent};
///
/// let callback = |event: ProgressEvent| {
///     if let ProgressEvent::ChunkSent { bytes, total } = event {
///         println!("Sent {} bytes. Total: {} bytes.", bytes, total);
///     }
/// };
/// callback.on_progress(ProgressEvent::ChunkSent { bytes: 40, total: 40 });
/// ```
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// A pass is about to start under `configuration`.
    PassStarted {
        role: Role,
        pass_index: usize,
        configuration: TransferConfiguration,
    },
    /// The sender is pausing before its next chunk.
    Delaying { delay: Duration },
    /// One chunk was written to the socket.
    ChunkSent { bytes: usize, total: u64 },
    /// Periodic receiver update, every `progress_every` packets.
    Progress { packets: u64, total_bytes: u64 },
    /// A pass finished, successfully or not.
    PassCompleted(Box<PassReport>),
    /// Something went wrong; the current pass has ended.
    Error(String),
}

/// Callback trait for receiving progress updates.
///
/// Implemented automatically for closures taking a [`ProgressEvent`].
pub trait ProgressCallback: Send + Sync {
    fn on_progress(&self, event: ProgressEvent);
}

impl<F> ProgressCallback for F
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    fn on_progress(&self, event: ProgressEvent) {
        self(event)
    }
}

pub(crate) type CallbackRef = Arc<dyn ProgressCallback>;

pub(crate) fn notify(callback: &Option<CallbackRef>, event: ProgressEvent) {
    if let Some(cb) = callback {
        cb.on_progress(event);
    }
}
