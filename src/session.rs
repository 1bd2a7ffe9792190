//! The foreground loop: keystrokes go to the device, the trigger chord sends
//! the binary.
use crate::channel::{SerialChannel, Transport};
use crate::console::{KeyEvent, KeySource};
use crate::error::{Error, Result};
use crate::listener::{self, SharedSink};
use crate::transfer::{TransferOptions, TransferReport, TransferRequest};
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Transferring,
}

pub struct Session<T, K> {
    channel: Arc<SerialChannel<T>>,
    keys: K,
    display: SharedSink,
    binary: PathBuf,
    options: TransferOptions,
    state: LoopState,
}

impl<T: Transport, K: KeySource> Session<T, K> {
    pub fn new(
        channel: Arc<SerialChannel<T>>,
        keys: K,
        display: SharedSink,
        binary: PathBuf,
        options: TransferOptions,
    ) -> Self {
        // Device output keeps reaching the operator while a transfer holds the port.
        let options = options.forward_inbound_to(Arc::clone(&display));
        Session {
            channel,
            keys,
            display,
            binary,
            options,
            state: LoopState::Idle,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Runs until the operator interrupts. Transfer and echo failures are
    /// reported and the loop carries on.
    pub fn run(&mut self) -> Result<()> {
        loop {
            let key = self.keys.next_key()?;
            if !self.handle_key(key)? {
                return Ok(());
            }
        }
    }

    /// Handles one key. Returns `false` once the loop should stop.
    pub fn handle_key(&mut self, key: KeyEvent) -> Result<bool> {
        match key {
            KeyEvent::Interrupt => {
                info!("Interrupted by the operator");
                self.channel.close();
                Ok(false)
            }
            KeyEvent::Trigger => {
                self.transfer();
                Ok(true)
            }
            KeyEvent::Char(c) => {
                let mut buf = [0u8; 4];
                self.echo(c.encode_utf8(&mut buf).as_bytes())
            }
            KeyEvent::Control(byte) => self.echo(&[byte]),
            KeyEvent::Ignored => Ok(true),
        }
    }

    fn echo(&mut self, bytes: &[u8]) -> Result<bool> {
        match self.channel.write_exclusive(bytes) {
            Ok(_) => Ok(true),
            Err(Error::ChannelClosed) => {
                self.say("[ERR] Serial port is closed!");
                Err(Error::ChannelClosed)
            }
            Err(e) => {
                error!("Failed to send keystroke: {}", e);
                self.say(&format!("[ERR] {}", e));
                Ok(true)
            }
        }
    }

    fn transfer(&mut self) {
        self.state = LoopState::Transferring;
        self.say("[VF2] Writing elf bytes to the serial port.");
        let started = Instant::now();
        match send_file(&self.channel, &self.binary, &self.options) {
            Ok(report) => {
                info!("Transfer finished: {:?}", report);
                self.say(&format!(
                    "[VF2] Write finished. {} bytes in {} chunks, {:.2?}.",
                    report.bytes_written,
                    report.chunks,
                    started.elapsed()
                ));
            }
            Err(e) => {
                error!("Transfer of {} failed: {}", self.binary.display(), e);
                self.say(&format!("[ERR] {}", e));
            }
        }
        self.state = LoopState::Idle;
    }

    fn say(&self, message: &str) {
        // Raw mode: no newline translation.
        let line = format!("{}\r\n", message);
        if let Err(e) = listener::display(&self.display, line.as_bytes()) {
            warn!("Failed to print {:?}: {}", message, e);
        }
    }
}

fn send_file<T: Transport>(
    channel: &SerialChannel<T>,
    binary: &Path,
    options: &TransferOptions,
) -> Result<TransferReport> {
    if !channel.is_open() {
        return Err(Error::ChannelClosed);
    }
    TransferRequest::load(binary)?.send(channel, options)
}
