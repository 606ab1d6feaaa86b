//! Virtual address map of the PSoC hex file format
//!
//! A PSoC application hex file partitions one 32-bit address space into
//! regions for the different non-volatile memories. The flash code lives at
//! the bottom; everything else is parked at high addresses that no real
//! memory occupies. Reference: Cypress 001-81290, Appendix A.1.1.

/// Hex file format version stored in the metadata region
pub const HEX_FILE_VERSION: u16 = 0x0001;

/// Main program flash
pub const FLASH_CODE_ADDRESS: u32 = 0x0000_0000;
/// Maximum extent of the code region
pub const FLASH_CODE_MAX_SIZE: u32 = 0x8000_0000;

/// ECC / configuration flash lane
pub const CONFIG_ADDRESS: u32 = 0x8000_0000;
/// Maximum extent of the config region
pub const CONFIG_MAX_SIZE: u32 = 0x1000_0000;

/// Device configuration latch value (4 bytes, little-endian)
pub const DEVCONFIG_ADDRESS: u32 = 0x9000_0000;
/// Size of the device configuration value
pub const DEVCONFIG_SIZE: u32 = 4;

/// Write-once latch value (4 bytes, big-endian)
pub const WOL_ADDRESS: u32 = 0x9010_0000;
/// Size of the write-once latch value
pub const WOL_SIZE: u32 = 4;

/// Byte-addressable EEPROM
pub const EEPROM_ADDRESS: u32 = 0x9020_0000;
/// Maximum extent of the EEPROM region
pub const EEPROM_MAX_SIZE: u32 = 0x0010_0000;

/// Stored program checksum (2 bytes, big-endian)
pub const CHECKSUM_ADDRESS: u32 = 0x9030_0000;
/// Size of the stored checksum
pub const CHECKSUM_SIZE: u32 = 2;

/// Per-row protection bits
pub const PROTECTION_ADDRESS: u32 = 0x9040_0000;
/// Maximum extent of the protection region
pub const PROTECTION_MAX_SIZE: u32 = 0x0010_0000;

/// File metadata block
pub const METADATA_ADDRESS: u32 = 0x9050_0000;
/// Size of the metadata block
pub const METADATA_SIZE: u32 = 12;

/// Metadata: format version (2 bytes, big-endian)
pub const VERSION_ADDRESS: u32 = METADATA_ADDRESS;
/// Metadata: device JTAG id (4 bytes, big-endian)
pub const DEVICE_ID_ADDRESS: u32 = METADATA_ADDRESS + 2;
/// Metadata: silicon revision (1 = ES1/TM, 2 = ES2/LP)
pub const SILICON_REV_ADDRESS: u32 = METADATA_ADDRESS + 6;
/// Metadata: debug enabled in the application (advisory)
pub const DEBUG_ENABLE_ADDRESS: u32 = METADATA_ADDRESS + 7;
/// Metadata: reserved for programmer-internal use (4 bytes)
pub const METADATA_RESERVED_ADDRESS: u32 = METADATA_ADDRESS + 8;

/// DEVCONFIG bit 27: ECC enable. When clear, the ECC lane is available as
/// extra configuration flash and is programmed alongside code rows.
pub const DEVCONFIG_ECC_ENABLE: u32 = 1 << 27;
