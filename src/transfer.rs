//! Capacity-aware bulk writes of a whole file.
use crate::channel::{SerialChannel, Transport};
use crate::config::TransferParameters;
use crate::error::{Error, Result};
use crate::listener::{self, SharedSink, READ_BUFFER_SIZE};
use log::{debug, info, trace, warn};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

#[derive(Clone)]
pub struct TransferOptions {
    /// Pause between capacity queries while the transport has no room.
    pub stall_retry: Duration,
    /// Longest run without progress tolerated before giving up.
    pub stall_timeout: Duration,
    /// Device output read while the transfer holds the channel goes here.
    pub inbound: Option<SharedSink>,
}

impl TransferOptions {
    pub fn forward_inbound_to(mut self, sink: SharedSink) -> Self {
        self.inbound = Some(sink);
        self
    }
}

impl Default for TransferOptions {
    fn default() -> Self {
        TransferOptions::from(&TransferParameters::default())
    }
}

impl From<&TransferParameters> for TransferOptions {
    fn from(parameters: &TransferParameters) -> Self {
        TransferOptions {
            stall_retry: Duration::from_millis(parameters.stall_retry_msec),
            stall_timeout: Duration::from_millis(parameters.stall_timeout_msec),
            inbound: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReport {
    pub bytes_written: usize,
    pub chunks: usize,
    /// Zero-capacity answers plus writes that timed out waiting for room.
    pub stalls: usize,
}

/// A file loaded into memory, ready to be pushed to the device.
#[derive(Debug)]
pub struct TransferRequest {
    path: PathBuf,
    data: Vec<u8>,
}

impl TransferRequest {
    pub fn load(path: &Path) -> Result<TransferRequest> {
        if !path.is_file() {
            return Err(Error::FileNotFound(path.to_path_buf()));
        }
        let data = fs::read(path)?;
        debug!("Loaded {} bytes from {}", data.len(), path.display());
        Ok(TransferRequest {
            path: path.to_path_buf(),
            data,
        })
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn send<T: Transport>(
        self,
        channel: &SerialChannel<T>,
        options: &TransferOptions,
    ) -> Result<TransferReport> {
        info!(
            "Sending {} ({} bytes) to {}",
            self.path.display(),
            self.data.len(),
            channel.device()
        );
        send_bytes(channel, &self.data, options)
    }
}

/// Writes all of `data` to the channel, in order and exactly once.
///
/// The channel guard is held for the whole transfer so keystrokes cannot land
/// between chunks. Each chunk is sized by the capacity the transport reports
/// at that moment, and the offset advances by what the transport actually
/// accepted. A full transmit queue (zero capacity, or a write that timed out
/// waiting for room) is waited out for up to `stall_timeout`. Bytes the
/// device sends meanwhile are read under the same guard and passed to
/// `options.inbound`.
pub fn send_bytes<T: Transport>(
    channel: &SerialChannel<T>,
    data: &[u8],
    options: &TransferOptions,
) -> Result<TransferReport> {
    let mut guard = channel.lock()?;
    let mut report = TransferReport {
        bytes_written: 0,
        chunks: 0,
        stalls: 0,
    };
    if data.is_empty() {
        warn!("Nothing to send, the file is empty");
        return Ok(report);
    }

    let mut inbound = [0u8; READ_BUFFER_SIZE];
    let mut offset = 0;
    let mut stalled_since: Option<Instant> = None;
    while offset < data.len() {
        let transport = guard
            .transport()
            .map_err(|_| aborted(offset, io::ErrorKind::BrokenPipe, "serial port was closed"))?;

        if let Some(sink) = &options.inbound {
            forward_inbound(transport, sink, &mut inbound);
        }

        let capacity = transport
            .write_capacity()
            .map_err(|source| Error::Transfer {
                written: offset,
                source,
            })?;
        if capacity == 0 {
            wait_out_stall(&mut stalled_since, &mut report, offset, options)?;
            continue;
        }

        let end = offset + capacity.min(data.len() - offset);
        match transport.write(&data[offset..end]) {
            Ok(0) => {
                return Err(aborted(
                    offset,
                    io::ErrorKind::WriteZero,
                    "transport accepted no bytes",
                ))
            }
            Ok(n) => {
                if n < end - offset {
                    trace!("Short write: {} of {} bytes", n, end - offset);
                }
                offset += n;
                report.chunks += 1;
                stalled_since = None;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) if e.kind() == io::ErrorKind::TimedOut => {
                trace!("Write timed out at offset {}, queue still full", offset);
                wait_out_stall(&mut stalled_since, &mut report, offset, options)?;
            }
            Err(source) => {
                return Err(Error::Transfer {
                    written: offset,
                    source,
                })
            }
        }
    }

    if let Some(sink) = &options.inbound {
        if let Ok(transport) = guard.transport() {
            forward_inbound(transport, sink, &mut inbound);
        }
    }
    report.bytes_written = offset;
    debug!(
        "Sent {} bytes in {} chunks ({} stalls)",
        report.bytes_written, report.chunks, report.stalls
    );
    Ok(report)
}

fn wait_out_stall(
    stalled_since: &mut Option<Instant>,
    report: &mut TransferReport,
    written: usize,
    options: &TransferOptions,
) -> Result<()> {
    report.stalls += 1;
    let since = *stalled_since.get_or_insert_with(Instant::now);
    if since.elapsed() >= options.stall_timeout {
        return Err(aborted(
            written,
            io::ErrorKind::TimedOut,
            "transmit queue stayed full",
        ));
    }
    thread::sleep(options.stall_retry);
    Ok(())
}

// Device output is best effort here; a failed read must not abort the transfer.
fn forward_inbound<T: Transport>(transport: &mut T, sink: &SharedSink, buffer: &mut [u8]) {
    match listener::read_available(transport, buffer) {
        Ok(0) => {}
        Ok(n) => {
            if let Err(e) = listener::display(sink, &buffer[..n]) {
                warn!("Failed to display {} received bytes: {}", n, e);
            }
        }
        Err(e) if e.kind() == io::ErrorKind::TimedOut => {}
        Err(e) => warn!("Failed reading from the device during a transfer: {}", e),
    }
}

fn aborted(written: usize, kind: io::ErrorKind, message: &str) -> Error {
    Error::Transfer {
        written,
        source: io::Error::new(kind, message.to_string()),
    }
}
