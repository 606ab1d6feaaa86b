//! Target-specific memory geometry
//!
//! Every numeric parameter the programming flows need about a particular
//! part: how flash is cut into arrays and rows, where the memory-mapped
//! regions sit, how protection bits map onto rows. Values come from the
//! device section of `devices.dat` and are validated before any wire
//! traffic happens.

use crate::error::{Error, Result};

/// Numeric description of one device's non-volatile memories
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceGeometry {
    /// Total flash size in bytes
    pub flash_size: u32,
    /// Rows in each flash array
    pub rows_per_array: u32,
    /// Number of flash arrays
    pub num_arrays: u32,
    /// Rows covered by one protection byte
    pub rows_per_protection_byte: u32,
    /// Code bytes programmed per row
    pub code_bytes_per_row: u32,
    /// Memory-mapped base of code flash
    pub code_base_address: u32,
    /// Config/ECC bytes programmed per row
    pub config_bytes_per_row: u32,
    /// Base of the config/ECC lane as seen by the SPC
    pub config_base_address: u32,
    /// Total EEPROM size in bytes
    pub eeprom_size: u32,
    /// EEPROM bytes per row
    pub eeprom_bytes_per_row: u32,
    /// Memory-mapped base of the EEPROM
    pub eeprom_base_address: u32,
}

impl DeviceGeometry {
    /// Basic sanity checks before the geometry drives row arithmetic.
    pub fn validate(&self) -> Result<()> {
        if self.flash_size == 0 {
            return Err(Error::GeometryInvalid("flash_size is zero"));
        }
        if self.rows_per_array == 0 {
            return Err(Error::GeometryInvalid("flash_rows_per_array is zero"));
        }
        if self.num_arrays == 0 {
            return Err(Error::GeometryInvalid("flash_num_arrays is zero"));
        }
        if self.rows_per_protection_byte == 0 {
            return Err(Error::GeometryInvalid("flash_rows_per_protection_byte is zero"));
        }
        if self.code_bytes_per_row == 0 {
            return Err(Error::GeometryInvalid("flash_code_bytes_per_row is zero"));
        }
        if self.config_bytes_per_row == 0 {
            return Err(Error::GeometryInvalid("flash_config_bytes_per_row is zero"));
        }
        if self.eeprom_size == 0 {
            return Err(Error::GeometryInvalid("eeprom_size is zero"));
        }
        if self.eeprom_bytes_per_row == 0 {
            return Err(Error::GeometryInvalid("eeprom_bytes_per_row is zero"));
        }
        if self.code_base_address == self.config_base_address {
            return Err(Error::GeometryInvalid(
                "code and config base addresses coincide",
            ));
        }
        if self.eeprom_base_address == 0 {
            return Err(Error::GeometryInvalid("eeprom_base_address is zero"));
        }
        Ok(())
    }

    /// Rows across all arrays.
    pub fn total_rows(&self) -> u32 {
        self.rows_per_array * self.num_arrays
    }

    /// Code bytes held by one array.
    pub fn code_bytes_per_array(&self) -> u32 {
        self.rows_per_array * self.code_bytes_per_row
    }

    /// Config lane bytes held by one array.
    pub fn config_bytes_per_array(&self) -> u32 {
        self.rows_per_array * self.config_bytes_per_row
    }

    /// Largest code image the part can hold.
    pub fn code_max_size(&self) -> u32 {
        self.total_rows() * self.code_bytes_per_row
    }

    /// Largest config image the part can hold.
    pub fn config_max_size(&self) -> u32 {
        self.total_rows() * self.config_bytes_per_row
    }

    /// Meaningful protection bytes per array; the rest of a hidden row read
    /// is padding.
    pub fn protection_bytes_per_array(&self) -> u32 {
        self.rows_per_array / self.rows_per_protection_byte
    }

    /// Number of EEPROM rows.
    pub fn eeprom_rows(&self) -> u32 {
        self.eeprom_size / self.eeprom_bytes_per_row
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DeviceGeometry {
        DeviceGeometry {
            flash_size: 256 * 1024,
            rows_per_array: 256,
            num_arrays: 4,
            rows_per_protection_byte: 8,
            code_bytes_per_row: 256,
            code_base_address: 0x0000_0000,
            config_bytes_per_row: 32,
            config_base_address: 0x0080_0000,
            eeprom_size: 2048,
            eeprom_bytes_per_row: 16,
            eeprom_base_address: 0x4000_8000,
        }
    }

    #[test]
    fn test_valid_geometry() {
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn test_derived_values() {
        let g = sample();
        assert_eq!(g.total_rows(), 1024);
        assert_eq!(g.code_bytes_per_array(), 65536);
        assert_eq!(g.code_max_size(), 256 * 1024);
        assert_eq!(g.config_max_size(), 32 * 1024);
        assert_eq!(g.protection_bytes_per_array(), 32);
        assert_eq!(g.eeprom_rows(), 128);
    }

    #[test]
    fn test_rejects_zero_counts() {
        let mut g = sample();
        g.num_arrays = 0;
        assert!(matches!(g.validate(), Err(Error::GeometryInvalid(_))));

        let mut g = sample();
        g.code_bytes_per_row = 0;
        assert!(g.validate().is_err());
    }

    #[test]
    fn test_rejects_colliding_bases() {
        let mut g = sample();
        g.config_base_address = g.code_base_address;
        assert!(g.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_eeprom_base() {
        let mut g = sample();
        g.eeprom_base_address = 0;
        assert!(g.validate().is_err());
    }
}
