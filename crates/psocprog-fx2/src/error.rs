//! Error types for the FX2 probe backend

use std::fmt;

/// Result type for probe operations
pub type Result<T> = std::result::Result<T, ProbeError>;

/// Errors raised while finding, configuring or opening the probe
#[derive(Debug)]
pub enum ProbeError {
    /// Neither the configured nor the unconfigured VID:PID was found
    NotFound,
    /// Failed to open the USB device
    OpenFailed(String),
    /// Failed to claim the probe interface
    ClaimFailed(String),
    /// A USB transfer failed
    TransferFailed(String),
    /// Firmware upload or re-enumeration failed
    ConfigureFailed(String),
    /// The FX2 firmware image could not be used
    Firmware(String),
    /// Core library error
    Core(psocprog_core::Error),
}

impl fmt::Display for ProbeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeError::NotFound => write!(f, "programmer probe not found"),
            ProbeError::OpenFailed(msg) => write!(f, "failed to open probe: {}", msg),
            ProbeError::ClaimFailed(msg) => write!(f, "failed to claim interface: {}", msg),
            ProbeError::TransferFailed(msg) => write!(f, "USB transfer failed: {}", msg),
            ProbeError::ConfigureFailed(msg) => {
                write!(f, "probe configuration failed: {}", msg)
            }
            ProbeError::Firmware(msg) => write!(f, "FX2 firmware image error: {}", msg),
            ProbeError::Core(e) => write!(f, "core error: {}", e),
        }
    }
}

impl std::error::Error for ProbeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ProbeError::Core(e) => Some(e),
            _ => None,
        }
    }
}

impl From<psocprog_core::Error> for ProbeError {
    fn from(e: psocprog_core::Error) -> Self {
        ProbeError::Core(e)
    }
}

impl From<nusb::Error> for ProbeError {
    fn from(e: nusb::Error) -> Self {
        ProbeError::TransferFailed(e.to_string())
    }
}
