//! Error types for psocprog-core

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using the core Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the hex data model, the probe transport framing and the
/// programming engine.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed hex record or bad record checksum
    #[error("hex parse error at line {line}: {reason}")]
    HexParse {
        /// 1-based line number in the input file
        line: usize,
        /// What was wrong with the record
        reason: String,
    },

    /// Record type outside 0..=5
    #[error("unknown record type 0x{record_type:02X} at line {line}")]
    UnknownRecordType {
        /// 1-based line number in the input file
        line: usize,
        /// The offending type byte
        record_type: u8,
    },

    /// File open/read/write failure
    #[error("{}: {source}", .path.display())]
    Io {
        /// Path of the file being accessed
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Underlying USB transfer failure
    #[error("USB transfer failed on endpoint 0x{endpoint:02X}: {reason}")]
    Usb {
        /// Endpoint address (0x02 bulk OUT, 0x84 bulk IN, 0x00 control)
        endpoint: u8,
        /// Transfer error description from the USB layer
        reason: String,
    },

    /// A non-OK status byte in the reply stream
    #[error("SWD fault (reply status 0x{0:02X})")]
    SwdFault(u8),

    /// SPC status polling budget exceeded
    #[error("SPC timeout (last status 0x{0:02X})")]
    SpcTimeout(u8),

    /// Payload too large for a row, a record or a request buffer
    #[error("{what}: length {len} exceeds maximum {max}")]
    Range {
        /// What was being sized
        what: &'static str,
        /// Requested length
        len: usize,
        /// Maximum permitted length
        max: usize,
    },

    /// A reply ran out of bytes while a consumer still expected data
    #[error("reply truncated: needed {expected} more byte(s), {remaining} left")]
    ReplyTruncated {
        /// Bytes the consumer asked for
        expected: usize,
        /// Bytes actually left in the reply
        remaining: usize,
    },

    /// DeviceGeometry failed validation
    #[error("invalid device geometry: {0}")]
    GeometryInvalid(&'static str),

    /// Refusing to program a file built for a different device
    #[error("device id mismatch (file 0x{file:08X}, device 0x{device:08X})")]
    DeviceIdMismatch {
        /// Device id stored in the hex file metadata
        file: u32,
        /// JTAG id read from the target
        device: u32,
    },

    /// Missing or unusable configuration value
    #[error("configuration error: {0}")]
    Config(String),
}
