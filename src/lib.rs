//! Serial terminal for boards that boot from an image pushed over their UART.
//!
//! Keystrokes are forwarded to the device, device output is printed, and a
//! control chord streams a local binary to the device in chunks sized by the
//! port's current write capacity.
pub mod channel;
pub mod config;
pub mod console;
pub mod error;
pub mod listener;
pub mod session;
pub mod transfer;

pub use error::{Error, Result};

/// VisionFive 2 bootloaders talk at 115200 baud, 8-N-1.
pub const BAUD_RATE: u32 = 115_200;
