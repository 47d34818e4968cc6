//! Error types shared by the scan pipeline.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::device::DeviceError;

/// Result type for scan operations
pub type ScanResult<T> = Result<T, ScanError>;

/// Everything that can stop a scan run.
///
/// All variants are terminal for the current run: nothing is retried.
#[derive(Error, Debug)]
pub enum ScanError {
    /// Empty range list, malformed range, or an invalid numeric parameter
    #[error("configuration error: {0}")]
    Config(String),

    /// Open, tune, or read failure on the receiver
    #[error("device error: {0}")]
    Device(#[from] DeviceError),

    /// Recorder could not persist a capture
    #[error("recording error at {}: {source}", path.display())]
    Recording {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ScanError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        ScanError::Config(msg.into())
    }

    /// Whether this error came from the receiver
    pub fn is_device(&self) -> bool {
        matches!(self, ScanError::Device(_))
    }
}
