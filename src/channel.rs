//! Exclusive ownership of the serial connection.
//!
//! Every access to the device (echoed keystrokes, bulk transfers, inbound reads
//! and close) goes through the mutex held by [`SerialChannel`], so reads and
//! writes never interleave at the byte level.
pub mod fake;
pub mod system;

use crate::config::PortParameters;
use crate::error::{Error, Result};
use log::{debug, info, trace};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

pub use system::SystemPort;

/// The byte-stream primitives the channel needs from a device.
pub trait Transport: Send {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Hands bytes to the device. May accept fewer than offered.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// How many bytes the transport can take right now. Changes over time and
    /// may be zero while the transmit queue drains.
    fn write_capacity(&mut self) -> io::Result<usize>;

    /// Bytes received and waiting to be read.
    fn bytes_available(&mut self) -> io::Result<usize>;
}

pub struct SerialChannel<T> {
    device: String,
    baud_rate: u32,
    open: AtomicBool,
    transport: Mutex<Option<T>>,
}

/// Held while a caller has exclusive use of the transport.
pub struct ChannelGuard<'a, T> {
    transport: MutexGuard<'a, Option<T>>,
    open: &'a AtomicBool,
}

impl<T> ChannelGuard<'_, T> {
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst) && self.transport.is_some()
    }

    pub fn transport(&mut self) -> Result<&mut T> {
        if !self.open.load(Ordering::SeqCst) {
            return Err(Error::ChannelClosed);
        }
        self.transport.as_mut().ok_or(Error::ChannelClosed)
    }
}

impl SerialChannel<SystemPort> {
    /// Opens `device` at `baud_rate`, 8-N-1 without flow control.
    pub fn open(device: &str, baud_rate: u32, parameters: &PortParameters) -> Result<Self> {
        info!("Opening {} at {} baud", device, baud_rate);
        let port =
            SystemPort::open(device, baud_rate, parameters).map_err(|source| Error::Connection {
                device: device.to_string(),
                source,
            })?;
        Ok(Self::new(device, baud_rate, port))
    }
}

impl<T: Transport> SerialChannel<T> {
    pub fn new(device: &str, baud_rate: u32, transport: T) -> Self {
        SerialChannel {
            device: device.to_string(),
            baud_rate,
            open: AtomicBool::new(true),
            transport: Mutex::new(Some(transport)),
        }
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Takes exclusive use of the transport. Blocks while another caller holds it.
    pub fn lock(&self) -> Result<ChannelGuard<'_, T>> {
        if !self.is_open() {
            return Err(Error::ChannelClosed);
        }
        let transport = self
            .transport
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let guard = ChannelGuard {
            transport,
            open: &self.open,
        };
        if !guard.is_open() {
            return Err(Error::ChannelClosed);
        }
        Ok(guard)
    }

    /// Writes all of `bytes` while holding the guard.
    pub fn write_exclusive(&self, bytes: &[u8]) -> Result<usize> {
        let mut guard = self.lock()?;
        write_all(guard.transport()?, bytes)?;
        trace!("Wrote {} bytes to {}", bytes.len(), self.device);
        Ok(bytes.len())
    }

    /// Releases the device. Safe to call repeatedly and from any thread; an
    /// operation in flight fails with a transport error instead of blocking it.
    pub fn close(&self) {
        if self.open.swap(false, Ordering::SeqCst) {
            debug!("Closing {}", self.device);
        }
        // Waits for the current holder, which gives up once it sees the flag.
        let mut transport = self
            .transport
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if transport.take().is_some() {
            info!("Closed {}", self.device);
        }
    }
}

pub(crate) fn write_all<T: Transport>(transport: &mut T, mut bytes: &[u8]) -> io::Result<()> {
    while !bytes.is_empty() {
        match transport.write(bytes) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "transport accepted no bytes",
                ))
            }
            Ok(n) => bytes = &bytes[n..],
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
