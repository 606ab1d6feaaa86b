//! Configuration loading
//!
//! Two hierarchical INI files live in the config directory: `config.ini`
//! names the probe (`[Programmer]` section), `devices.dat` holds one section
//! per supported part with its geometry. Lookup walks dotted sections
//! upward: `[a.b.c].name` falls back to `[a.b].name`, `[a].name` and
//! finally the unnamed top-level section.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use psocprog_core::error::{Error, Result};
use psocprog_core::geometry::DeviceGeometry;
use psocprog_fx2::ProbeConfig;

/// Probe configuration file name
pub const CONFIG_FILE: &str = "config.ini";
/// Device geometry file name
pub const DEVICE_FILE: &str = "devices.dat";

/// A parsed INI file with hierarchical section lookup
#[derive(Debug, Default)]
pub struct IniFile {
    values: HashMap<(String, String), String>,
}

impl IniFile {
    /// Parse INI text. Lines are `name=value` under `[section]` headers;
    /// blank lines and lines starting with `;` or `#` are ignored.
    pub fn parse_str(text: &str) -> Result<Self> {
        let mut values = HashMap::new();
        let mut section = String::new();

        for (idx, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }

            if let Some(name) = line.strip_prefix('[') {
                let name = name.strip_suffix(']').ok_or_else(|| {
                    Error::Config(format!("line {}: unterminated section header", idx + 1))
                })?;
                section = name.trim().to_lowercase();
                continue;
            }

            let (name, value) = line.split_once('=').ok_or_else(|| {
                Error::Config(format!("line {}: expected name=value", idx + 1))
            })?;
            values.insert(
                (section.clone(), name.trim().to_lowercase()),
                value.trim().to_string(),
            );
        }

        Ok(Self { values })
    }

    /// Read and parse an INI file from disk.
    pub fn read_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse_str(&text)
    }

    /// Hierarchical lookup: the dotted section falls back to each of its
    /// ancestors and finally to the unnamed top-level section.
    pub fn get(&self, section: &str, name: &str) -> Option<&str> {
        let name = name.to_lowercase();
        let mut section = section.to_lowercase();

        loop {
            if let Some(value) = self.values.get(&(section.clone(), name.clone())) {
                return Some(value);
            }
            if section.is_empty() {
                return None;
            }
            section = match section.rfind('.') {
                Some(pos) => section[..pos].to_string(),
                None => String::new(),
            };
        }
    }

    /// Like [`IniFile::get`], parsing decimal or `0x`-prefixed hex.
    pub fn get_u32(&self, section: &str, name: &str) -> Option<u32> {
        let value = self.get(section, name)?;
        parse_u32(value)
    }
}

fn parse_u32(value: &str) -> Option<u32> {
    if let Some(hex) = value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).ok()
    } else {
        value.parse().ok()
    }
}

/// Load the probe configuration from `config.ini`. Missing keys keep the
/// built-in DVKProg5 defaults; the firmware path is resolved relative to the
/// config directory.
pub fn load_probe_config(config_dir: &Path) -> Result<ProbeConfig> {
    let ini = IniFile::read_file(config_dir.join(CONFIG_FILE))?;
    Ok(probe_config_from(&ini, config_dir))
}

fn probe_config_from(ini: &IniFile, config_dir: &Path) -> ProbeConfig {
    let mut config = ProbeConfig::default();
    let section = "programmer";

    if let Some(vid) = ini.get_u32(section, "VID_unconfigured") {
        config.vid_unconfigured = vid as u16;
    }
    if let Some(pid) = ini.get_u32(section, "PID_unconfigured") {
        config.pid_unconfigured = pid as u16;
    }
    if let Some(vid) = ini.get_u32(section, "VID") {
        config.vid = vid as u16;
    }
    if let Some(pid) = ini.get_u32(section, "PID") {
        config.pid = pid as u16;
    }

    let firmware: PathBuf = ini
        .get(section, "fx2_config_file")
        .map(PathBuf::from)
        .unwrap_or_else(|| config.fx2_firmware.clone());
    config.fx2_firmware = if firmware.is_absolute() {
        firmware
    } else {
        config_dir.join(firmware)
    };

    config
}

/// Load one device's geometry from `devices.dat` and validate it.
pub fn load_geometry(config_dir: &Path, device: &str) -> Result<DeviceGeometry> {
    let ini = IniFile::read_file(config_dir.join(DEVICE_FILE))?;
    geometry_from(&ini, device)
}

fn geometry_from(ini: &IniFile, device: &str) -> Result<DeviceGeometry> {
    let key = |name: &str| ini.get_u32(device, name).unwrap_or(0);

    let geom = DeviceGeometry {
        flash_size: key("flash_size"),
        rows_per_array: key("flash_rows_per_array"),
        num_arrays: key("flash_num_arrays"),
        rows_per_protection_byte: key("flash_rows_per_protection_byte"),
        code_bytes_per_row: key("flash_code_bytes_per_row"),
        code_base_address: key("flash_code_base_address"),
        config_bytes_per_row: key("flash_config_bytes_per_row"),
        config_base_address: key("flash_config_base_address"),
        eeprom_size: key("eeprom_size"),
        eeprom_bytes_per_row: key("eeprom_bytes_per_row"),
        eeprom_base_address: key("eeprom_base_address"),
    };
    geom.validate()?;
    Ok(geom)
}
