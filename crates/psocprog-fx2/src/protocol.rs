//! Probe USB identifiers and FX2 chip constants

use std::time::Duration;

// USB device identifiers
pub const VID_CYPRESS: u16 = 0x04B4;
/// DVKProg5 probe before firmware upload
pub const PID_DVK5_UNCONFIGURED: u16 = 0xF131;
/// DVKProg5 probe running the bridge firmware
pub const PID_DVK5_CONFIGURED: u16 = 0xF132;

/// Default FX2 firmware hex file name (looked up in the config directory)
pub const DEFAULT_FX2_FIRMWARE: &str = "fx2_config.hex";

// FX2 vendor requests (EZ-USB TRM 001-13670)
/// Read/write 8051 RAM; wValue carries the RAM address
pub const REQ_FX2_RW_RAM: u8 = 0xA0;

/// FX2 CPU control/status register
pub const REG_FX2_CPUCS: u16 = 0xE600;
/// CPUCS bit 0: hold the 8051 in reset
pub const CPUCS_HOLD_RESET: u8 = 0x01;
/// CPUCS value releasing the 8051
pub const CPUCS_RUN: u8 = 0x00;

/// Largest firmware block uploaded in one control transfer
pub const MAX_FIRMWARE_CHUNK: usize = 2048;

/// Per-transfer timeout
pub const TRANSFER_TIMEOUT: Duration = Duration::from_secs(5);
/// How long the probe takes to re-enumerate after firmware release
pub const CONFIGURE_SETTLE: Duration = Duration::from_secs(3);
