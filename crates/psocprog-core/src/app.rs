//! Region-partitioned application image
//!
//! An [`AppImage`] is a complete picture of what a PSoC part should contain:
//! code and config flash, EEPROM and protection bits as sparse sub-images,
//! plus the scalar values (device configuration latch, write-once latch,
//! stored checksum, file metadata) that the hex format parks at fixed high
//! addresses. It is populated either from a hex file or by reading the
//! device, and owns its four sub-images outright; reloading replaces them
//! wholesale.

use std::path::Path;

use crate::error::{Error, Result};
use crate::format;
use crate::hex::{Endian, HexImage, RecordType};

/// Default record width when writing application hex files
const HEX_WRITE_WIDTH: usize = 32;

/// Everything that goes into (or comes out of) one device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppImage {
    /// Main program flash
    pub code: HexImage,
    /// Config/ECC flash lane
    pub config: HexImage,
    /// Per-row protection bits
    pub protection: HexImage,
    /// EEPROM contents
    pub eeprom: HexImage,

    /// Device configuration latch value
    pub device_config: u32,
    /// Write-once latch value
    pub security_wol: u32,
    /// Program checksum; only the low 16 bits are stored in the file
    pub checksum: u32,

    /// Hex file format version
    pub hex_file_version: u16,
    /// JTAG id of the part the image was built for
    pub device_id: u32,
    /// Silicon revision (1 = ES1/TM, 2 = ES2/LP)
    pub silicon_revision: u8,
    /// Whether the application enables debugging (advisory)
    pub debug_enable: u8,
    /// Reserved metadata word
    pub reserved: u32,
}

impl Default for AppImage {
    fn default() -> Self {
        Self {
            code: HexImage::new(),
            config: HexImage::new(),
            protection: HexImage::new(),
            eeprom: HexImage::new(),
            device_config: 0,
            security_wol: 0,
            checksum: 0,
            hex_file_version: format::HEX_FILE_VERSION,
            device_id: 0,
            silicon_revision: 0,
            debug_enable: 0,
            reserved: 0,
        }
    }
}

impl AppImage {
    /// An empty image.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from hex file text, canonicalizing and splitting by region.
    ///
    /// `default_base` is forwarded to the parser for snippet files whose
    /// leading data records carry no extended address record. Scalars whose
    /// region is absent default to 0.
    pub fn parse_str(text: &str, default_base: u32) -> Result<Self> {
        let raw = HexImage::parse_str(text, default_base)?;
        let canon = raw.canonicalize();

        let image = Self {
            code: canon.extract(format::FLASH_CODE_ADDRESS, format::FLASH_CODE_MAX_SIZE),
            config: canon.extract(format::CONFIG_ADDRESS, format::CONFIG_MAX_SIZE),
            protection: canon.extract(format::PROTECTION_ADDRESS, format::PROTECTION_MAX_SIZE),
            eeprom: canon.extract(format::EEPROM_ADDRESS, format::EEPROM_MAX_SIZE),

            checksum: canon.uint_at(format::CHECKSUM_ADDRESS, 2, Endian::Big),
            device_config: canon.uint_at(format::DEVCONFIG_ADDRESS, 4, Endian::Little),
            // the WOL is stored big-endian, unlike its DEVCONFIG neighbour
            security_wol: canon.uint_at(format::WOL_ADDRESS, 4, Endian::Big),

            hex_file_version: canon.uint_at(format::VERSION_ADDRESS, 2, Endian::Big) as u16,
            device_id: canon.uint_at(format::DEVICE_ID_ADDRESS, 4, Endian::Big),
            silicon_revision: canon.uint_at(format::SILICON_REV_ADDRESS, 1, Endian::Big) as u8,
            debug_enable: canon.uint_at(format::DEBUG_ENABLE_ADDRESS, 1, Endian::Big) as u8,
            reserved: canon.uint_at(format::METADATA_RESERVED_ADDRESS, 4, Endian::Big),
        };

        log::debug!(
            "loaded app image: code {}, config {}, eeprom {}, protection {}",
            image.code,
            image.config,
            image.eeprom,
            image.protection
        );

        Ok(image)
    }

    /// Load from a hex file on disk.
    pub fn read_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse_str(&text, 0)
    }

    /// Emit the image as hex file text, regions in ascending virtual address
    /// order, ending with an end record.
    ///
    /// The stored checksum is written as-is; callers are responsible for
    /// setting it (see [`AppImage::calc_checksum`]).
    pub fn to_hex(&self) -> Result<String> {
        let mut out = String::new();
        let mut high_address = 0u32;

        self.code.emit_data(&mut out, HEX_WRITE_WIDTH, &mut high_address)?;
        self.config.emit_data(&mut out, HEX_WRITE_WIDTH, &mut high_address)?;

        crate::hex::emit_record(
            &mut out,
            format::DEVCONFIG_ADDRESS,
            RecordType::Data,
            &self.device_config.to_le_bytes(),
            &mut high_address,
        )?;
        crate::hex::emit_record(
            &mut out,
            format::WOL_ADDRESS,
            RecordType::Data,
            &self.security_wol.to_be_bytes(),
            &mut high_address,
        )?;

        self.eeprom.emit_data(&mut out, HEX_WRITE_WIDTH, &mut high_address)?;

        crate::hex::emit_record(
            &mut out,
            format::CHECKSUM_ADDRESS,
            RecordType::Data,
            &(self.checksum as u16).to_be_bytes(),
            &mut high_address,
        )?;

        self.protection.emit_data(&mut out, HEX_WRITE_WIDTH, &mut high_address)?;

        crate::hex::emit_record(
            &mut out,
            format::METADATA_ADDRESS,
            RecordType::Data,
            &self.metadata(),
            &mut high_address,
        )?;

        out.push_str(&crate::hex::HexRecord::end().encode());
        out.push('\n');
        Ok(out)
    }

    /// Write the image to a hex file on disk.
    pub fn write_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let text = self.to_hex()?;
        std::fs::write(path, text).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// The 12-byte metadata block, big-endian fields.
    pub fn metadata(&self) -> [u8; 12] {
        let mut meta = [0u8; 12];
        meta[0..2].copy_from_slice(&self.hex_file_version.to_be_bytes());
        meta[2..6].copy_from_slice(&self.device_id.to_be_bytes());
        meta[6] = self.silicon_revision;
        meta[7] = self.debug_enable;
        meta[8..12].copy_from_slice(&self.reserved.to_be_bytes());
        meta
    }

    /// Whole-program summation checksum over code and config bytes.
    ///
    /// `truncate` masks to the 16 bits actually stored in hex files.
    pub fn calc_checksum(&self, truncate: bool) -> u32 {
        let mut sum = 0u32;
        for image in [&self.code, &self.config] {
            for block in image.blocks() {
                for &b in &block.data {
                    sum = sum.wrapping_add(b as u32);
                }
            }
        }
        if truncate {
            sum &= 0xFFFF;
        }
        sum
    }

    /// Whether the ECC lane is repurposed as extra configuration flash
    /// (DEVCONFIG bit 27 clear) and must be programmed alongside code rows.
    pub fn extra_flash_used_for_config(&self) -> bool {
        self.device_config & format::DEVCONFIG_ECC_ENABLE == 0
    }
}
