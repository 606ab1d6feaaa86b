//! Region-level programming flows
//!
//! Free functions over a [`TargetSession`] and a [`DeviceGeometry`]: read
//! the whole device into an [`AppImage`], write an image back row by row,
//! verify, erase, checksum. The session must already be in programming mode
//! (see [`TargetSession::enter_programming_mode`]).

use bitflags::bitflags;

use crate::app::AppImage;
use crate::error::{Error, Result};
use crate::format;
use crate::geometry::DeviceGeometry;
use crate::spc::{array_id, SpcCommand};
use crate::swd::TargetSession;
use crate::transport::ProbeTransport;

bitflags! {
    /// What to trim out of a freshly read device image
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ReadFlags: u32 {
        /// Drop all-zero code and config rows
        const TRIM_FLASH = 0x01;
        /// Drop all-zero EEPROM rows
        const TRIM_EEPROM = 0x02;
    }
}

bitflags! {
    /// Per-region verify outcome; empty means the device matches the file
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct VerifyReport: u32 {
        /// Code flash differs (checksum-level)
        const CODE = 0x01;
        /// Config flash differs (checksum-level)
        const CONFIG = 0x02;
        /// Protection bytes differ
        const PROTECTION = 0x04;
        /// EEPROM contents differ
        const EEPROM = 0x08;
        /// Write-once latch differs
        const WOL = 0x10;
        /// Device configuration latch differs
        const DEVCONFIG = 0x20;
        /// JTAG id differs
        const JTAG_ID = 0x40;
        /// The file carries no data to verify against
        const MISSING_FILE_DATA = 0x1000;
        /// The device could not be read at all
        const DEVICE_READ_FAILED = 0x2000;
    }
}

/// Knobs for [`write_device`]
#[derive(Debug, Clone, Copy, Default)]
pub struct WriteOptions {
    /// Commit NVL values that differ from the device. The latches tolerate
    /// only ~100 writes, so this is opt-in; without it a differing value is
    /// logged and skipped.
    pub force_nvl_write: bool,
}

/// Read the complete device state into a fresh image.
pub fn read_device<P: ProbeTransport>(
    session: &mut TargetSession<P>,
    geom: &DeviceGeometry,
    flags: ReadFlags,
) -> Result<AppImage> {
    let mut app = AppImage::new();

    app.device_id = session.read_jtag_id()?;
    app.security_wol = session.read_nvl_u32(array_id::NVL_WOL)?;
    app.device_config = session.read_nvl_u32(array_id::NVL_DEVCONFIG)?;

    let extra_config = app.extra_flash_used_for_config();
    let cbpr = geom.code_bytes_per_row;
    let cfbpr = geom.config_bytes_per_row;

    log::info!(
        "reading {} array(s) x {} row(s){}",
        geom.num_arrays,
        geom.rows_per_array,
        if extra_config { " with config lane" } else { "" }
    );

    for array in 0..geom.num_arrays {
        for row in 0..geom.rows_per_array {
            let mut data = vec![0u8; cbpr as usize];
            session.spc_read_multi(array as u8, geom.code_base_address + row * cbpr, &mut data)?;
            app.code.add(
                format::FLASH_CODE_ADDRESS + array * geom.code_bytes_per_array() + row * cbpr,
                data,
            );

            if extra_config {
                let mut data = vec![0u8; cfbpr as usize];
                session.spc_read_multi(
                    array as u8,
                    geom.config_base_address + row * cfbpr,
                    &mut data,
                )?;
                app.config.add(
                    format::CONFIG_ADDRESS + array * geom.config_bytes_per_array() + row * cfbpr,
                    data,
                );
            }
        }
    }

    app.checksum = checksum_all(session)?;

    // one hidden row per array; only the leading bytes carry protection bits
    let keep = geom.protection_bytes_per_array();
    for array in 0..geom.num_arrays {
        let mut row = [0u8; 256];
        session.spc_read(&SpcCommand::read_hidden_row(array as u8), &mut row)?;
        app.protection.add(
            format::PROTECTION_ADDRESS + array * keep,
            row[..keep as usize].to_vec(),
        );
    }

    // EEPROM is memory-mapped for reads; walk it through the AP in words
    let ebpr = geom.eeprom_bytes_per_row;
    for row in 0..geom.eeprom_rows() {
        let base = geom.eeprom_base_address + row * ebpr;
        let mut data = vec![0u8; ebpr as usize];
        for (i, chunk) in data.chunks_mut(4).enumerate() {
            let word = session.ap_register_read(base + 4 * i as u32)?;
            chunk.copy_from_slice(&word.to_le_bytes()[..chunk.len()]);
        }
        app.eeprom.add(format::EEPROM_ADDRESS + row * ebpr, data);
    }

    if flags.contains(ReadFlags::TRIM_FLASH) {
        app.code.trim();
        app.config.trim();
    }
    if flags.contains(ReadFlags::TRIM_EEPROM) {
        app.eeprom.trim();
    }

    Ok(app)
}

/// Program an image into the device: flash rows, then the NVLs.
pub fn write_device<P: ProbeTransport>(
    session: &mut TargetSession<P>,
    geom: &DeviceGeometry,
    app: &AppImage,
    options: &WriteOptions,
) -> Result<()> {
    write_flash(session, geom, app)?;

    if !app.protection.is_empty() {
        // protection commits are deliberately left to a dedicated flow; a
        // wrong protection row bricks further reprogramming
        log::warn!("protection data present in file; not written");
    }

    nvl_write(
        session,
        array_id::NVL_WOL,
        "WOL",
        app.security_wol,
        options.force_nvl_write,
    )?;

    let devconfig_diff = nvl_write(
        session,
        array_id::NVL_DEVCONFIG,
        "DEVCONFIG",
        app.device_config,
        options.force_nvl_write,
    )?;

    if let Some(diff) = devconfig_diff {
        if diff == format::DEVCONFIG_ECC_ENABLE {
            // the ECC setting only takes effect on the next acquire
            log::info!("ECC mode toggled; re-entering programming mode");
            session.enter_programming_mode()?;
        }
    }

    if !app.eeprom.is_empty() {
        log::warn!("EEPROM data present in file; not written");
    }

    Ok(())
}

/// Assemble and program every flash row the image touches.
fn write_flash<P: ProbeTransport>(
    session: &mut TargetSession<P>,
    geom: &DeviceGeometry,
    app: &AppImage,
) -> Result<()> {
    let cbpr = geom.code_bytes_per_row;
    let cfbpr = geom.config_bytes_per_row;
    let extra_config = app.extra_flash_used_for_config();

    let code_len = app
        .code
        .minmax_address(format::FLASH_CODE_ADDRESS, format::FLASH_CODE_MAX_SIZE)
        .map(|(_, end)| end - format::FLASH_CODE_ADDRESS)
        .unwrap_or(0);
    let config_len = if extra_config {
        app.config
            .minmax_address(format::CONFIG_ADDRESS, format::CONFIG_MAX_SIZE)
            .map(|(_, end)| end - format::CONFIG_ADDRESS)
            .unwrap_or(0)
    } else {
        0
    };

    // each lane is measured against its own row size
    let code_rows = code_len.div_ceil(cbpr);
    let config_rows = config_len.div_ceil(cfbpr);
    let num_rows = code_rows.max(config_rows);

    if num_rows == 0 {
        log::warn!("no flash data in image; nothing to program");
        return Ok(());
    }
    if num_rows > geom.total_rows() {
        return Err(Error::Range {
            what: "flash image rows",
            len: num_rows as usize,
            max: geom.total_rows() as usize,
        });
    }

    let temperature = session.read_die_temperature()?;
    let row_len = cbpr + if extra_config { cfbpr } else { 0 };

    log::info!(
        "programming {} row(s) of {} byte(s) at {}",
        num_rows,
        row_len,
        temperature
    );

    let mut data = vec![0u8; row_len as usize];
    for row in 0..num_rows {
        let array = row / geom.rows_per_array;
        let row_in_array = row % geom.rows_per_array;

        app.code
            .extract_bytes_into(format::FLASH_CODE_ADDRESS + row * cbpr, &mut data[..cbpr as usize]);
        if extra_config {
            app.config.extract_bytes_into(
                format::CONFIG_ADDRESS + row * cfbpr,
                &mut data[cbpr as usize..],
            );
        }

        session.spc_write_row(
            array as u8,
            row_in_array as u16,
            temperature,
            &data,
            true,
        )?;
        log::trace!("row {}/{} written", row + 1, num_rows);
    }

    Ok(())
}

/// Idempotent NVL update: read back, skip when identical, commit only when
/// forced. Returns the XOR of old and new when a commit happened.
fn nvl_write<P: ProbeTransport>(
    session: &mut TargetSession<P>,
    aid: u8,
    name: &str,
    value: u32,
    force: bool,
) -> Result<Option<u32>> {
    let current = session.read_nvl_u32(aid)?;
    if current == value {
        log::debug!("{} already 0x{:08X}; skipping NVL write", name, value);
        return Ok(None);
    }
    if !force {
        log::warn!(
            "{} differs (device 0x{:08X}, file 0x{:08X}) but NVL writes are not forced; skipping",
            name,
            current,
            value
        );
        return Ok(None);
    }

    log::info!("writing {} 0x{:08X} (was 0x{:08X})", name, value, current);
    session.write_nvl_u32(aid, value)?;

    let readback = session.read_nvl_u32(aid)?;
    if readback != value {
        log::warn!(
            "{} read-back 0x{:08X} does not match written 0x{:08X}",
            name,
            readback,
            value
        );
    }
    Ok(Some(current ^ value))
}

/// Read the device and compare it against a file image. Mismatches are a
/// result, not an error; the returned report is empty when everything
/// matches.
pub fn verify_device<P: ProbeTransport>(
    session: &mut TargetSession<P>,
    geom: &DeviceGeometry,
    file: &AppImage,
) -> Result<VerifyReport> {
    let mut report = VerifyReport::empty();

    if file.code.is_empty() {
        report |= VerifyReport::MISSING_FILE_DATA;
    }

    let device = match read_device(session, geom, ReadFlags::empty()) {
        Ok(device) => device,
        Err(e) => {
            log::warn!("device read failed during verify: {}", e);
            return Ok(report | VerifyReport::DEVICE_READ_FAILED);
        }
    };

    // flash is compared via the device's own checksum engine
    if (device.checksum ^ file.checksum) & 0xFFFF != 0 {
        report |= VerifyReport::CODE | VerifyReport::CONFIG;
    }
    if device.security_wol != file.security_wol {
        report |= VerifyReport::WOL;
    }
    if device.device_config != file.device_config {
        report |= VerifyReport::DEVCONFIG;
    }
    if device.device_id != file.device_id {
        report |= VerifyReport::JTAG_ID;
    }

    let ee_size = geom.eeprom_size as usize;
    if device.eeprom.extract_bytes(format::EEPROM_ADDRESS, ee_size)
        != file.eeprom.extract_bytes(format::EEPROM_ADDRESS, ee_size)
    {
        report |= VerifyReport::EEPROM;
    }

    let prot_size = (geom.num_arrays * geom.protection_bytes_per_array()) as usize;
    if device
        .protection
        .extract_bytes(format::PROTECTION_ADDRESS, prot_size)
        != file
            .protection
            .extract_bytes(format::PROTECTION_ADDRESS, prot_size)
    {
        report |= VerifyReport::PROTECTION;
    }

    Ok(report)
}

/// Erase all flash and protection rows.
pub fn erase_flash<P: ProbeTransport>(session: &mut TargetSession<P>) -> Result<()> {
    log::info!("erasing all flash");
    session.spc_command_idle(&SpcCommand::erase_all())
}

/// Erase one 64-row sector of a flash array.
pub fn erase_sector<P: ProbeTransport>(
    session: &mut TargetSession<P>,
    aid: u8,
    sector: u8,
) -> Result<()> {
    log::info!("erasing array 0x{:02X} sector {}", aid, sector);
    session.spc_command_idle(&SpcCommand::erase_sector(aid, sector))
}

/// Checksum the whole of flash through the device's checksum engine.
pub fn checksum_all<P: ProbeTransport>(session: &mut TargetSession<P>) -> Result<u32> {
    session.spc_checksum(array_id::FLASH_ALL, 0, 0)
}

/// Checksum a row range of one array.
pub fn checksum_rows<P: ProbeTransport>(
    session: &mut TargetSession<P>,
    aid: u8,
    start_row: u16,
    nrows: u16,
) -> Result<u32> {
    if nrows == 0 {
        return Err(Error::Range {
            what: "checksum row count",
            len: 0,
            max: u16::MAX as usize,
        });
    }
    session.spc_checksum(aid, start_row, nrows - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::swd::DeviceFamily;
    use crate::testutil::FakeProbe;

    fn session_with(probe: FakeProbe) -> TargetSession<FakeProbe> {
        let mut s = TargetSession::new(probe, DeviceFamily::Psoc5);
        s.switch_to_swd().unwrap();
        s.enter_programming_mode().unwrap();
        s
    }

    /// 1 array x 256 rows x 256 bytes, ECC lane separate.
    fn single_array_geom() -> DeviceGeometry {
        DeviceGeometry {
            flash_size: 256 * 256,
            rows_per_array: 256,
            num_arrays: 1,
            rows_per_protection_byte: 8,
            code_bytes_per_row: 256,
            code_base_address: 0x0000_0000,
            config_bytes_per_row: 32,
            config_base_address: 0x0080_0000,
            eeprom_size: 64,
            eeprom_bytes_per_row: 16,
            eeprom_base_address: 0x4000_8000,
        }
    }

    fn app_with_code(code: &[u8], device_config: u32) -> AppImage {
        let mut app = AppImage::new();
        app.code.add(format::FLASH_CODE_ADDRESS, code.to_vec());
        app.device_config = device_config;
        app.device_id = 0x2E12_3069;
        app.checksum = app.calc_checksum(true);
        app
    }

    #[test]
    fn test_write_512_bytes_is_two_rows() {
        let geom = single_array_geom();
        let mut probe = FakeProbe::new(geom.clone());
        // ECC on: rows are code-only
        probe.set_devconfig(format::DEVCONFIG_ECC_ENABLE);
        let mut s = session_with(probe);

        let code: Vec<u8> = (0..512u32).map(|i| i as u8).collect();
        let app = app_with_code(&code, format::DEVCONFIG_ECC_ENABLE);
        write_device(&mut s, &geom, &app, &WriteOptions::default()).unwrap();

        let probe = s.probe_mut();
        probe.assert_spc_gating();

        // expect LOAD_ROW/WRITE_ROW pairs for rows 0 and 1 of array 0
        let rows: Vec<(u8, Vec<u8>)> = probe
            .spc_ops
            .iter()
            .filter(|op| op.opcode == 0x05)
            .map(|op| (op.args[0], op.args[1..3].to_vec()))
            .collect();
        assert_eq!(rows, vec![(0, vec![0, 0]), (0, vec![0, 1])]);

        let loads = probe
            .spc_ops
            .iter()
            .filter(|op| op.opcode == 0x02)
            .count();
        assert_eq!(loads, 2);

        assert_eq!(&probe.code_bytes(0)[..512], &code[..]);
    }

    #[test]
    fn test_write_includes_config_lane_when_ecc_off() {
        let geom = single_array_geom();
        let probe = FakeProbe::new(geom.clone());
        let mut s = session_with(probe);

        let mut app = app_with_code(&[0xAA; 256], 0);
        app.config.add(format::CONFIG_ADDRESS, vec![0xBB; 32]);
        app.checksum = app.calc_checksum(true);
        write_device(&mut s, &geom, &app, &WriteOptions::default()).unwrap();

        // the loaded row carries code + config bytes
        let load = s
            .probe_mut()
            .spc_ops
            .iter()
            .find(|op| op.opcode == 0x02)
            .cloned()
            .unwrap();
        assert_eq!(load.args.len(), 1 + 256 + 32);
        assert!(load.args[1..257].iter().all(|&b| b == 0xAA));
        assert!(load.args[257..].iter().all(|&b| b == 0xBB));
    }

    #[test]
    fn test_write_rejects_oversized_image() {
        let geom = single_array_geom();
        let probe = FakeProbe::new(geom.clone());
        let mut s = session_with(probe);

        let mut app = AppImage::new();
        app.device_config = format::DEVCONFIG_ECC_ENABLE;
        // one byte beyond the last row
        app.code.add(format::FLASH_CODE_ADDRESS + 256 * 256, vec![1]);
        let err = write_device(&mut s, &geom, &app, &WriteOptions::default()).unwrap_err();
        assert!(matches!(err, Error::Range { .. }));
    }

    #[test]
    fn test_read_device_round_trips_written_state() {
        let geom = single_array_geom();
        let mut probe = FakeProbe::new(geom.clone());
        probe.set_devconfig(format::DEVCONFIG_ECC_ENABLE);
        probe.set_eeprom(0, &[0x5A; 16]);
        probe.set_protection(0, &[0xC3; 32]);
        let mut s = session_with(probe);

        let code: Vec<u8> = (0..300u32).map(|i| (i * 7) as u8).collect();
        let app = app_with_code(&code, format::DEVCONFIG_ECC_ENABLE);
        write_device(&mut s, &geom, &app, &WriteOptions::default()).unwrap();

        let device = read_device(&mut s, &geom, ReadFlags::empty()).unwrap();
        assert_eq!(device.device_id, 0x2E12_3069);
        assert_eq!(device.device_config, format::DEVCONFIG_ECC_ENABLE);
        assert_eq!(
            device.code.extract_bytes(format::FLASH_CODE_ADDRESS, 300),
            code
        );
        assert_eq!(
            device.eeprom.extract_bytes(format::EEPROM_ADDRESS, 16),
            vec![0x5A; 16]
        );
        assert_eq!(
            device
                .protection
                .extract_bytes(format::PROTECTION_ADDRESS, 32),
            vec![0xC3; 32]
        );
        assert_eq!(device.checksum & 0xFFFF, app.checksum);
        s.probe_mut().assert_spc_gating();
    }

    #[test]
    fn test_read_device_trim() {
        let geom = single_array_geom();
        let mut probe = FakeProbe::new(geom.clone());
        probe.set_devconfig(format::DEVCONFIG_ECC_ENABLE);
        probe.set_code(0, 0, &[0x11; 256]);
        let mut s = session_with(probe);

        let full = read_device(&mut s, &geom, ReadFlags::empty()).unwrap();
        assert_eq!(full.code.blocks().len(), 256);

        let trimmed = read_device(&mut s, &geom, ReadFlags::all()).unwrap();
        // only the one non-zero row survives
        assert_eq!(trimmed.code.blocks().len(), 1);
        assert!(trimmed.eeprom.is_empty());
    }

    #[test]
    fn test_verify_clean_device_matches_read() {
        let geom = single_array_geom();
        let mut probe = FakeProbe::new(geom.clone());
        probe.set_devconfig(format::DEVCONFIG_ECC_ENABLE);
        probe.set_code(0, 0, &[0x77; 300]);
        probe.set_eeprom(0, &[9; 8]);
        let mut s = session_with(probe);

        // what we read back from the device must verify clean against it
        let mut snapshot = read_device(&mut s, &geom, ReadFlags::empty()).unwrap();
        snapshot.checksum &= 0xFFFF;
        let report = verify_device(&mut s, &geom, &snapshot).unwrap();
        assert_eq!(report, VerifyReport::empty());
    }

    #[test]
    fn test_verify_reports_mismatches() {
        let geom = single_array_geom();
        let mut probe = FakeProbe::new(geom.clone());
        probe.set_devconfig(format::DEVCONFIG_ECC_ENABLE);
        probe.set_code(0, 0, &[0x77; 256]);
        let mut s = session_with(probe);

        let mut file = read_device(&mut s, &geom, ReadFlags::empty()).unwrap();
        file.checksum = (file.checksum ^ 1) & 0xFFFF;
        file.security_wol ^= 0xFF;
        file.device_id ^= 1;

        let report = verify_device(&mut s, &geom, &file).unwrap();
        assert!(report.contains(VerifyReport::CODE | VerifyReport::CONFIG));
        assert!(report.contains(VerifyReport::WOL));
        assert!(report.contains(VerifyReport::JTAG_ID));
        assert!(!report.contains(VerifyReport::EEPROM));
    }

    #[test]
    fn test_verify_missing_file_data() {
        let geom = single_array_geom();
        let mut probe = FakeProbe::new(geom.clone());
        probe.set_devconfig(format::DEVCONFIG_ECC_ENABLE);
        let mut s = session_with(probe);

        let mut file = AppImage::new();
        file.device_config = format::DEVCONFIG_ECC_ENABLE;
        file.device_id = 0x2E12_3069;
        let report = verify_device(&mut s, &geom, &file).unwrap();
        assert!(report.contains(VerifyReport::MISSING_FILE_DATA));
    }

    #[test]
    fn test_nvl_write_skips_identical_value() {
        let geom = single_array_geom();
        let mut probe = FakeProbe::new(geom.clone());
        probe.set_devconfig(format::DEVCONFIG_ECC_ENABLE);
        let mut s = session_with(probe);

        let app = app_with_code(&[1; 16], format::DEVCONFIG_ECC_ENABLE);
        write_device(&mut s, &geom, &app, &WriteOptions::default()).unwrap();

        // no WRITE_NVL command may appear
        assert!(!s.probe_mut().spc_ops.iter().any(|op| op.opcode == 0x06));
    }

    #[test]
    fn test_nvl_write_requires_force() {
        let geom = single_array_geom();
        let mut probe = FakeProbe::new(geom.clone());
        probe.set_devconfig(format::DEVCONFIG_ECC_ENABLE);
        let mut s = session_with(probe);

        let mut app = app_with_code(&[1; 16], format::DEVCONFIG_ECC_ENABLE);
        app.security_wol = 0x1234_5678;

        write_device(&mut s, &geom, &app, &WriteOptions::default()).unwrap();
        assert_eq!(s.probe_mut().wol(), 0);

        write_device(
            &mut s,
            &geom,
            &app,
            &WriteOptions {
                force_nvl_write: true,
            },
        )
        .unwrap();
        assert_eq!(s.probe_mut().wol(), 0x1234_5678);
    }

    #[test]
    fn test_ecc_toggle_reenters_programming_mode() {
        let geom = single_array_geom();
        let probe = FakeProbe::new(geom.clone());
        // device has ECC off, file turns it on: diff is exactly bit 27
        let mut s = session_with(probe);

        let mut app = AppImage::new();
        app.device_config = format::DEVCONFIG_ECC_ENABLE;
        write_device(
            &mut s,
            &geom,
            &app,
            &WriteOptions {
                force_nvl_write: true,
            },
        )
        .unwrap();

        assert_eq!(s.probe_mut().devconfig(), format::DEVCONFIG_ECC_ENABLE);
        assert!(s.is_programming());
    }

    #[test]
    fn test_erase_flash() {
        let geom = single_array_geom();
        let mut probe = FakeProbe::new(geom.clone());
        probe.set_devconfig(format::DEVCONFIG_ECC_ENABLE);
        probe.set_code(0, 0, &[0xEE; 1024]);
        let mut s = session_with(probe);

        erase_flash(&mut s).unwrap();
        assert!(s.probe_mut().code_bytes(0).iter().all(|&b| b == 0));
        assert_eq!(checksum_all(&mut s).unwrap(), 0);
    }

    #[test]
    fn test_erase_sector_clears_only_its_rows() {
        // geometry with two 64-row sectors per array
        let geom = DeviceGeometry {
            rows_per_array: 128,
            flash_size: 128 * 256,
            ..single_array_geom()
        };
        let mut probe = FakeProbe::new(geom.clone());
        probe.set_devconfig(format::DEVCONFIG_ECC_ENABLE);
        probe.set_code(0, 0, &[0xAA; 64 * 256]);
        probe.set_code(0, 64 * 256, &[0xBB; 64 * 256]);
        let mut s = session_with(probe);

        erase_sector(&mut s, 0, 0).unwrap();
        let probe = s.probe_mut();
        assert!(probe.code_bytes(0)[..64 * 256].iter().all(|&b| b == 0));
        assert!(probe.code_bytes(0)[64 * 256..].iter().all(|&b| b == 0xBB));
    }

    #[test]
    fn test_checksum_rows_range() {
        let geom = single_array_geom();
        let mut probe = FakeProbe::new(geom.clone());
        probe.set_devconfig(format::DEVCONFIG_ECC_ENABLE);
        probe.set_code(0, 0, &[1; 256]); // row 0 sums to 256
        probe.set_code(0, 256, &[2; 256]); // row 1 sums to 512
        let mut s = session_with(probe);

        assert_eq!(checksum_rows(&mut s, 0, 0, 1).unwrap(), 256);
        assert_eq!(checksum_rows(&mut s, 0, 0, 2).unwrap(), 768);
        assert_eq!(checksum_rows(&mut s, 0, 1, 1).unwrap(), 512);
        assert!(checksum_rows(&mut s, 0, 0, 0).is_err());
    }
}
