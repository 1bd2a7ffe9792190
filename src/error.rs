use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The serial device could not be opened. Fatal at startup.
    #[error("failed to open {device}: {source}")]
    Connection {
        device: String,
        #[source]
        source: serialport::Error,
    },

    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("serial port is closed")]
    ChannelClosed,

    /// A bulk transfer stopped part way. `written` bytes reached the transport.
    #[error("transfer aborted after {written} bytes: {source}")]
    Transfer {
        written: usize,
        #[source]
        source: io::Error,
    },

    #[error("failed to read configuration {}: {source}", path.display())]
    Config {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    /// Bytes handed to the transport before the failure, for transfer errors.
    pub fn bytes_written(&self) -> Option<usize> {
        match self {
            Error::Transfer { written, .. } => Some(*written),
            _ => None,
        }
    }
}
