//! Command implementations
//!
//! Each function owns one CLI verb end to end: load configuration, open the
//! probe, acquire the target, do the work, report. Probe-touching commands
//! return the session's probe handle to the OS on drop.

use std::path::Path;

use psocprog_core::app::AppImage;
use psocprog_core::error::Error;
use psocprog_core::ops::{self, ReadFlags, VerifyReport, WriteOptions};
use psocprog_core::swd::{DeviceFamily, TargetSession};
use psocprog_fx2::Fx2Probe;

use crate::config;

pub type CmdResult = Result<(), Box<dyn std::error::Error>>;

/// Open the probe (bootstrapping if needed) and acquire the target.
fn open_session(config_dir: &Path) -> Result<TargetSession<Fx2Probe>, Box<dyn std::error::Error>> {
    let probe_config = config::load_probe_config(config_dir)?;
    let probe = Fx2Probe::open(&probe_config)?;
    let mut session = TargetSession::new(probe, DeviceFamily::Psoc5);
    session.switch_to_swd()?;
    Ok(session)
}

fn require_device(device: Option<&str>) -> Result<&str, Box<dyn std::error::Error>> {
    device.ok_or_else(|| "device name not specified (use -d)".into())
}

pub fn run_program(
    config_dir: &Path,
    device: Option<&str>,
    file: &Path,
    force_nvl_write: bool,
) -> CmdResult {
    // read and check the file before touching the hardware
    let app = AppImage::read_file(file)?;
    let geom = config::load_geometry(config_dir, require_device(device)?)?;

    let mut session = open_session(config_dir)?;
    session.enter_programming_mode()?;

    let id = session.read_jtag_id()?;
    println!("Silicon ID: 0x{:08X}", id);
    if app.device_id != id {
        return Err(Error::DeviceIdMismatch {
            file: app.device_id,
            device: id,
        }
        .into());
    }

    ops::write_device(&mut session, &geom, &app, &WriteOptions { force_nvl_write })?;
    session.exit_programming_mode()?;

    println!("Programmed {}", file.display());
    Ok(())
}

pub fn run_upload(config_dir: &Path, device: Option<&str>, file: &Path, no_trim: bool) -> CmdResult {
    let geom = config::load_geometry(config_dir, require_device(device)?)?;

    let mut session = open_session(config_dir)?;
    session.enter_programming_mode()?;

    let flags = if no_trim {
        ReadFlags::empty()
    } else {
        ReadFlags::TRIM_FLASH | ReadFlags::TRIM_EEPROM
    };
    let mut app = ops::read_device(&mut session, &geom, flags)?;
    app.checksum &= 0xFFFF;
    app.write_file(file)?;

    println!("Uploaded device contents to {}", file.display());
    Ok(())
}

pub fn run_verify(config_dir: &Path, device: Option<&str>, file: &Path) -> CmdResult {
    let app = AppImage::read_file(file)?;
    let geom = config::load_geometry(config_dir, require_device(device)?)?;

    let mut session = open_session(config_dir)?;
    session.enter_programming_mode()?;

    let report = ops::verify_device(&mut session, &geom, &app)?;
    if report.is_empty() {
        println!("Verify OK");
        return Ok(());
    }

    for (flag, what) in [
        (VerifyReport::CODE, "code flash"),
        (VerifyReport::CONFIG, "config flash"),
        (VerifyReport::PROTECTION, "protection"),
        (VerifyReport::EEPROM, "EEPROM"),
        (VerifyReport::WOL, "write-once latch"),
        (VerifyReport::DEVCONFIG, "device configuration"),
        (VerifyReport::JTAG_ID, "JTAG id"),
        (VerifyReport::MISSING_FILE_DATA, "file carries no data"),
        (VerifyReport::DEVICE_READ_FAILED, "device read failed"),
    ] {
        if report.contains(flag) {
            println!("MISMATCH: {}", what);
        }
    }
    Err(format!("verification failed (0x{:04X})", report.bits()).into())
}

pub fn run_info(file: &Path) -> CmdResult {
    let app = AppImage::read_file(file)?;

    println!("File: {}", file.display());
    print_region("Code", &app.code);
    print_region("Config", &app.config);
    print_region("EEPROM", &app.eeprom);
    print_region("Protection", &app.protection);

    let dc = app.device_config;
    println!("Device config: 0x{:08X}", dc);
    println!("  DIG_PHS_DLY: 0x{:X}", (dc >> 28) & 0xF);
    println!(
        "  ECCEN: {} (extra config flash: {})",
        (dc >> 27) & 1,
        app.extra_flash_used_for_config()
    );
    println!("  DPS: {}", (dc >> 25) & 0x3);
    println!("  CFGSPEED: {}", (dc >> 24) & 1);
    println!(
        "  XRESMEN: P1[2] is {}",
        if dc & 0x0080_0000 != 0 { "XRES" } else { "GPIO" }
    );

    println!("WOL: 0x{:08X}", app.security_wol);

    let calculated = app.calc_checksum(true);
    println!("Checksum: stored 0x{:04X}, calculated 0x{:04X}", app.checksum, calculated);
    if app.checksum != calculated {
        println!("  WARNING: checksum mismatch");
    }

    println!("Device id: 0x{:08X}", app.device_id);
    println!("Format version: 0x{:04X}", app.hex_file_version);
    println!("Silicon revision: {}", app.silicon_revision);
    println!("Debug enable: {}", app.debug_enable);
    Ok(())
}

fn print_region(name: &str, image: &psocprog_core::hex::HexImage) {
    match image.minmax_address(0, u32::MAX) {
        Some((min, max)) => println!(
            "{}: {} ({} bytes, 0x{:08X}..0x{:08X})",
            name,
            image,
            max - min,
            min,
            max
        ),
        None => println!("{}: empty", name),
    }
}

pub fn run_reset(config_dir: &Path) -> CmdResult {
    let mut session = open_session(config_dir)?;
    session.reset_cpu()?;
    println!("Target reset");
    Ok(())
}

pub fn run_erase(config_dir: &Path) -> CmdResult {
    let mut session = open_session(config_dir)?;
    session.enter_programming_mode()?;
    ops::erase_flash(&mut session)?;
    println!("Flash erased");
    Ok(())
}

pub fn run_id(config_dir: &Path) -> CmdResult {
    let mut session = open_session(config_dir)?;
    session.enter_programming_mode()?;
    let id = session.read_jtag_id()?;
    println!("Silicon ID: 0x{:08X}", id);
    Ok(())
}

pub fn run_usb_clear(config_dir: &Path) -> CmdResult {
    let probe_config = config::load_probe_config(config_dir)?;
    let mut probe = Fx2Probe::open(&probe_config)?;
    probe.clear_stall_both()?;
    println!("Endpoint stalls cleared");
    Ok(())
}
