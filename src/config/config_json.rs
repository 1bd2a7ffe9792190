use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use std::time::Duration;

fn default_tx_buffer_size() -> usize {
    4096
}
fn default_timeout_msec() -> u64 {
    30_000
}
fn default_poll_interval_msec() -> u64 {
    1
}
fn default_stall_retry_msec() -> u64 {
    1
}
fn default_stall_timeout_msec() -> u64 {
    30_000
}
fn default_trigger_key() -> char {
    'x'
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PortParameters {
    /// Size of the driver's transmit queue. Write capacity is this minus the
    /// bytes still waiting in the queue.
    #[serde(default = "default_tx_buffer_size")]
    pub tx_buffer_size: usize,
    /// The port has one timeout for reads and writes. Reads only happen when
    /// bytes are waiting, so this bounds how long one write may wait for room.
    #[serde(default = "default_timeout_msec")]
    pub timeout_msec: u64,
}

impl Default for PortParameters {
    fn default() -> Self {
        PortParameters {
            tx_buffer_size: default_tx_buffer_size(),
            timeout_msec: default_timeout_msec(),
        }
    }
}

impl PortParameters {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_msec)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TransferParameters {
    #[serde(default = "default_stall_retry_msec")]
    pub stall_retry_msec: u64,
    #[serde(default = "default_stall_timeout_msec")]
    pub stall_timeout_msec: u64,
}

impl Default for TransferParameters {
    fn default() -> Self {
        TransferParameters {
            stall_retry_msec: default_stall_retry_msec(),
            stall_timeout_msec: default_stall_timeout_msec(),
        }
    }
}

// Ctrl+C stays reserved for quitting.
fn trigger_key<'de, D: Deserializer<'de>>(deserializer: D) -> Result<char, D::Error> {
    let key = char::deserialize(deserializer)?;
    if !key.is_ascii_alphabetic() || key.eq_ignore_ascii_case(&'c') {
        return Err(D::Error::custom(format!(
            "trigger_key must be an ASCII letter other than 'c', got {:?}",
            key
        )));
    }
    Ok(key.to_ascii_lowercase())
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ConsoleParameters {
    /// Letter that, pressed together with Control, starts the transfer.
    #[serde(default = "default_trigger_key", deserialize_with = "trigger_key")]
    pub trigger_key: char,
    #[serde(default = "default_poll_interval_msec")]
    pub poll_interval_msec: u64,
}

impl Default for ConsoleParameters {
    fn default() -> Self {
        ConsoleParameters {
            trigger_key: default_trigger_key(),
            poll_interval_msec: default_poll_interval_msec(),
        }
    }
}

impl ConsoleParameters {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_msec)
    }
}

// The root configuration structure.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct RunnerConfig {
    #[serde(default)]
    pub port: PortParameters,
    #[serde(default)]
    pub transfer: TransferParameters,
    #[serde(default)]
    pub console: ConsoleParameters,
}
