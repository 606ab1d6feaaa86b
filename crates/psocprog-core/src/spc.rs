//! System Performance Controller command engine
//!
//! The SPC is the on-chip mediator for all non-volatile memory access: a
//! byte-wide register machine fed through one data register, with a status
//! register exposing IDLE and DATA_READY bits. Every command is unlocked by
//! two key bytes and follows the same state walk:
//!
//! `IDLE --cmd--> BUSY --(optional)--> DATA_READY --reads--> IDLE`
//!
//! The engine observes IDLE before issuing any command and DATA_READY before
//! consuming any result byte; polling is bounded by [`SPC_POLL_TIMEOUT`]
//! status reads.

use crate::error::{Error, Result};
use crate::transport::{ProbeTransport, Request};

/// SPC data register fed one byte per 32-bit write
pub const REG_SPC_CPU_DATA: u32 = 0x4000_4720;
/// SPC status register
pub const REG_SPC_STATUS: u32 = 0x4000_4722;

/// First key byte unlocking a command
pub const SPC_KEY1: u8 = 0xB6;
/// Base of the second key byte; the command code is added mod 256
pub const SPC_KEY2_BASE: u8 = 0xD3;

/// Status bit: result byte available
pub const SPC_STATUS_DATA_READY: u8 = 0x01;
/// Status bit: ready for the next command
pub const SPC_STATUS_IDLE: u8 = 0x02;

/// Maximum status reads per wait before giving up
pub const SPC_POLL_TIMEOUT: u32 = 8404;

/// On-chip averaging count for temperature reads (1..=5)
const TEMPERATURE_SAMPLES: u8 = 3;

/// Array-ID selectors for SPC commands
pub mod array_id {
    /// First individual flash array
    pub const FLASH_FIRST: u8 = 0x00;
    /// Last individual flash array
    pub const FLASH_LAST: u8 = 0x3E;
    /// All flash arrays at once
    pub const FLASH_ALL: u8 = 0x3F;
    /// The EEPROM array
    pub const EEPROM: u8 = 0x40;
    /// Device configuration non-volatile latch
    pub const NVL_DEVCONFIG: u8 = 0x80;
    /// Write-once latch
    pub const NVL_WOL: u8 = 0xF8;
}

/// SPC command codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SpcOpcode {
    /// Load one byte into a latch region
    LoadByte = 0x00,
    /// Reserved
    LoadMultiByte = 0x01,
    /// Fill the row write latches
    LoadRow = 0x02,
    /// Read one byte
    ReadByte = 0x03,
    /// Read up to 256 bytes from a 24-bit address
    ReadMultiByte = 0x04,
    /// Erase and program a flash/EEPROM row
    WriteRow = 0x05,
    /// Commit the latched byte lane to an NVL
    WriteNvl = 0x06,
    /// Program a row without erasing first
    ProgRow = 0x07,
    /// Erase a 64-row sector
    EraseSector = 0x08,
    /// Erase all flash and protection rows
    EraseAll = 0x09,
    /// Read the 256-byte protection hidden row
    ReadHiddenRow = 0x0A,
    /// Commit loaded protection bits
    Protect = 0x0B,
    /// Checksum a row range
    GetChecksum = 0x0C,
    /// Read the die temperature sensor
    GetTemperature = 0x0E,
    /// Read a volatile NVL byte
    ReadNvlVolByte = 0x10,
}

/// One SPC command: code plus its argument tail (row payloads included)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpcCommand {
    opcode: SpcOpcode,
    args: Vec<u8>,
}

impl SpcCommand {
    /// A command with a raw argument tail.
    pub fn new(opcode: SpcOpcode, args: impl Into<Vec<u8>>) -> Self {
        Self {
            opcode,
            args: args.into(),
        }
    }

    /// The command code.
    pub fn opcode(&self) -> SpcOpcode {
        self.opcode
    }

    /// Second key byte for this command.
    pub fn key2(&self) -> u8 {
        SPC_KEY2_BASE.wrapping_add(self.opcode as u8)
    }

    /// Load one byte into an NVL byte lane.
    pub fn load_byte(aid: u8, index: u8, value: u8) -> Self {
        Self::new(SpcOpcode::LoadByte, vec![aid, index, value])
    }

    /// Fill the row write latches of an array.
    pub fn load_row(aid: u8, row: &[u8]) -> Self {
        let mut args = Vec::with_capacity(1 + row.len());
        args.push(aid);
        args.extend_from_slice(row);
        Self::new(SpcOpcode::LoadRow, args)
    }

    /// Read one byte by array and index.
    pub fn read_byte(aid: u8, index: u8) -> Self {
        Self::new(SpcOpcode::ReadByte, vec![aid, index])
    }

    /// Read `count` bytes (1..=256) starting at a 24-bit array address.
    pub fn read_multi_byte(aid: u8, address: u32, count: usize) -> Result<Self> {
        if count == 0 || count > 256 {
            return Err(Error::Range {
                what: "SPC multi-byte read",
                len: count,
                max: 256,
            });
        }
        Ok(Self::new(
            SpcOpcode::ReadMultiByte,
            vec![
                aid,
                (address >> 16) as u8,
                (address >> 8) as u8,
                address as u8,
                (count - 1) as u8,
            ],
        ))
    }

    /// Erase and program the latched row.
    pub fn write_row(aid: u8, row: u16, temperature: DieTemperature) -> Self {
        Self::new(
            SpcOpcode::WriteRow,
            vec![
                aid,
                (row >> 8) as u8,
                row as u8,
                temperature.sign,
                temperature.magnitude,
            ],
        )
    }

    /// Program the latched row without erasing.
    pub fn prog_row(aid: u8, row: u16, temperature: DieTemperature) -> Self {
        Self::new(
            SpcOpcode::ProgRow,
            vec![
                aid,
                (row >> 8) as u8,
                row as u8,
                temperature.sign,
                temperature.magnitude,
            ],
        )
    }

    /// Commit the latched byte lane to an NVL.
    pub fn write_nvl(aid: u8) -> Self {
        Self::new(SpcOpcode::WriteNvl, vec![aid])
    }

    /// Erase one 64-row sector.
    pub fn erase_sector(aid: u8, sector: u8) -> Self {
        Self::new(SpcOpcode::EraseSector, vec![aid, sector])
    }

    /// Erase all flash and protection rows.
    pub fn erase_all() -> Self {
        Self::new(SpcOpcode::EraseAll, Vec::new())
    }

    /// Read an array's protection hidden row.
    pub fn read_hidden_row(aid: u8) -> Self {
        Self::new(SpcOpcode::ReadHiddenRow, vec![aid, 0])
    }

    /// Commit loaded protection bits.
    pub fn protect(aid: u8) -> Self {
        Self::new(SpcOpcode::Protect, vec![aid, 0])
    }

    /// Checksum rows. `count_minus_one` follows the wire encoding; 0 with
    /// `start_row` 0 on [`array_id::FLASH_ALL`] sums the whole device.
    pub fn get_checksum(aid: u8, start_row: u16, count_minus_one: u16) -> Self {
        Self::new(
            SpcOpcode::GetChecksum,
            vec![
                aid,
                (start_row >> 8) as u8,
                start_row as u8,
                (count_minus_one >> 8) as u8,
                count_minus_one as u8,
            ],
        )
    }

    /// Read the die temperature sensor.
    pub fn get_temperature(samples: u8) -> Self {
        Self::new(SpcOpcode::GetTemperature, vec![samples, 0])
    }

    /// Read a volatile NVL byte.
    pub fn read_nvl_vol_byte(aid: u8, index: u8) -> Self {
        Self::new(SpcOpcode::ReadNvlVolByte, vec![aid, index])
    }
}

/// Signed-magnitude die temperature as the SPC reports and consumes it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DieTemperature {
    /// 0 for positive, non-zero for negative
    pub sign: u8,
    /// Degrees Celsius, unsigned
    pub magnitude: u8,
}

impl std::fmt::Display for DieTemperature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.sign != 0 { "-" } else { "" };
        write!(f, "{}{} degC", sign, self.magnitude)
    }
}

impl<P: ProbeTransport> crate::swd::TargetSession<P> {
    /// Read the SPC status byte (family-dependent lane of the 32-bit read).
    pub fn spc_status(&mut self) -> Result<u8> {
        let value = self.ap_register_read(REG_SPC_STATUS)?;
        let lane = self.family().spc_status_lane();
        Ok((value >> (8 * lane)) as u8)
    }

    fn spc_wait_for(&mut self, mask: u8) -> Result<()> {
        let mut status = 0;
        for _ in 0..SPC_POLL_TIMEOUT {
            status = self.spc_status()?;
            if status & mask != 0 {
                return Ok(());
            }
        }
        log::warn!(
            "SPC did not reach status 0x{:02X} within {} polls (last 0x{:02X})",
            mask,
            SPC_POLL_TIMEOUT,
            status
        );
        Err(Error::SpcTimeout(status))
    }

    /// Poll until the SPC is idle.
    pub fn spc_wait_idle(&mut self) -> Result<()> {
        self.spc_wait_for(SPC_STATUS_IDLE)
    }

    /// Poll until a result byte is available.
    pub fn spc_wait_data_ready(&mut self) -> Result<()> {
        self.spc_wait_for(SPC_STATUS_DATA_READY)
    }

    /// Issue one command: wait for IDLE, then feed keys, code and argument
    /// tail through the data register in a single request batch.
    pub fn spc_command(&mut self, cmd: &SpcCommand) -> Result<()> {
        self.spc_wait_idle()?;

        log::trace!(
            "SPC cmd {:?} ({} arg bytes)",
            cmd.opcode,
            cmd.args.len()
        );

        let mut req = Request::new();
        req.ap_addr_write(REG_SPC_CPU_DATA)?;
        req.ap_data_write(SPC_KEY1 as u32)?;
        req.ap_data_write(cmd.key2() as u32)?;
        req.ap_data_write(cmd.opcode as u8 as u32)?;
        for &arg in &cmd.args {
            req.ap_data_write(arg as u32)?;
        }

        let mut reply = self.send_receive(&req)?;
        reply.pop_ok_remaining()
    }

    /// Issue a command and wait until the SPC is idle again. For commands
    /// that produce no data (row writes, erases, NVL commits).
    pub fn spc_command_idle(&mut self, cmd: &SpcCommand) -> Result<()> {
        self.spc_command(cmd)?;
        self.spc_wait_idle()
    }

    /// Issue a data-producing command and collect `out.len()` result bytes,
    /// then wait for the machine to return to idle.
    pub fn spc_read(&mut self, cmd: &SpcCommand, out: &mut [u8]) -> Result<()> {
        self.spc_command(cmd)?;
        self.spc_wait_data_ready()?;

        let mut req = Request::new();
        req.ap_addr_write(REG_SPC_CPU_DATA)?;
        for _ in 0..out.len() {
            req.ap_data_read()?;
        }
        let mut reply = self.send_receive(&req)?;
        reply.pop_ok(1)?;
        reply.pop_nb0_ok(out)?;

        self.spc_wait_idle()
    }

    /// Load the row latches and program one row.
    pub fn spc_write_row(
        &mut self,
        aid: u8,
        row: u16,
        temperature: DieTemperature,
        data: &[u8],
        erase_first: bool,
    ) -> Result<()> {
        self.spc_command(&SpcCommand::load_row(aid, data))?;
        let write = if erase_first {
            SpcCommand::write_row(aid, row, temperature)
        } else {
            SpcCommand::prog_row(aid, row, temperature)
        };
        self.spc_command_idle(&write)
    }

    /// Read `out.len()` bytes from a 24-bit array address, splitting into
    /// 256-byte SPC reads.
    pub fn spc_read_multi(&mut self, aid: u8, address: u32, out: &mut [u8]) -> Result<()> {
        let mut offset = 0usize;
        while offset < out.len() {
            let chunk = (out.len() - offset).min(256);
            let cmd = SpcCommand::read_multi_byte(aid, address + offset as u32, chunk)?;
            self.spc_read(&cmd, &mut out[offset..offset + chunk])?;
            offset += chunk;
        }
        Ok(())
    }

    /// Read one NVL as a little-endian 32-bit value (byte 0 = bits 0..8).
    pub fn read_nvl_u32(&mut self, aid: u8) -> Result<u32> {
        let mut bytes = [0u8; 4];
        for (i, slot) in bytes.iter_mut().enumerate() {
            let mut one = [0u8; 1];
            self.spc_read(&SpcCommand::read_nvl_vol_byte(aid, i as u8), &mut one)?;
            *slot = one[0];
        }
        Ok(u32::from_le_bytes(bytes))
    }

    /// Latch four bytes and commit them to an NVL. The latches tolerate on
    /// the order of 100 writes; callers gate this behind read-back checks.
    pub fn write_nvl_u32(&mut self, aid: u8, value: u32) -> Result<()> {
        for (i, byte) in value.to_le_bytes().into_iter().enumerate() {
            self.spc_command_idle(&SpcCommand::load_byte(aid, i as u8, byte))?;
        }
        self.spc_command_idle(&SpcCommand::write_nvl(aid))
    }

    /// Read the die temperature used to parameterize row programming.
    ///
    /// The first reading after reset is unreliable and discarded; the
    /// second is returned. On this family the sensor reports a fixed
    /// nominal value.
    pub fn read_die_temperature(&mut self) -> Result<DieTemperature> {
        let mut raw = [0u8; 2];
        self.spc_read(&SpcCommand::get_temperature(TEMPERATURE_SAMPLES), &mut raw)?;
        self.spc_read(&SpcCommand::get_temperature(TEMPERATURE_SAMPLES), &mut raw)?;
        let temperature = DieTemperature {
            sign: raw[0],
            magnitude: raw[1],
        };
        log::debug!("die temperature: {}", temperature);
        Ok(temperature)
    }

    /// Checksum a row range; the device returns 4 bytes MSB-first.
    pub fn spc_checksum(&mut self, aid: u8, start_row: u16, count_minus_one: u16) -> Result<u32> {
        let mut raw = [0u8; 4];
        self.spc_read(
            &SpcCommand::get_checksum(aid, start_row, count_minus_one),
            &mut raw,
        )?;
        Ok(u32::from_be_bytes(raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::swd::{DeviceFamily, TargetSession};
    use crate::testutil::FakeProbe;

    fn session() -> TargetSession<FakeProbe> {
        let mut probe = FakeProbe::default_geometry();
        // ECC on: rows carry code bytes only
        probe.set_devconfig(crate::format::DEVCONFIG_ECC_ENABLE);
        let mut s = TargetSession::new(probe, DeviceFamily::Psoc5);
        s.switch_to_swd().unwrap();
        s.enter_programming_mode().unwrap();
        s
    }

    #[test]
    fn test_key2_wraps() {
        assert_eq!(SpcCommand::erase_all().key2(), 0xD3 + 0x09);
        assert_eq!(
            SpcCommand::read_nvl_vol_byte(0x80, 0).key2(),
            0xD3u8.wrapping_add(0x10)
        );
    }

    #[test]
    fn test_read_multi_byte_bounds() {
        assert!(SpcCommand::read_multi_byte(0, 0, 0).is_err());
        assert!(SpcCommand::read_multi_byte(0, 0, 257).is_err());
        let cmd = SpcCommand::read_multi_byte(0x3F, 0x012345, 256).unwrap();
        assert_eq!(cmd.args, [0x3F, 0x01, 0x23, 0x45, 0xFF]);
    }

    #[test]
    fn test_write_then_read_row() {
        let mut s = session();
        let temperature = s.read_die_temperature().unwrap();
        let data = vec![0x5A; 256];
        s.spc_write_row(0, 3, temperature, &data, true).unwrap();

        let mut back = vec![0u8; 256];
        s.spc_read_multi(0, 3 * 256, &mut back).unwrap();
        assert_eq!(back, data);

        s.probe_mut().assert_spc_gating();
    }

    #[test]
    fn test_nvl_roundtrip() {
        let mut s = session();
        s.write_nvl_u32(array_id::NVL_WOL, 0x1122_3344).unwrap();
        assert_eq!(s.read_nvl_u32(array_id::NVL_WOL).unwrap(), 0x1122_3344);
        s.probe_mut().assert_spc_gating();
    }

    #[test]
    fn test_erase_all_clears_flash() {
        let mut s = session();
        let temperature = s.read_die_temperature().unwrap();
        s.spc_write_row(0, 0, temperature, &[0xFF; 256], true).unwrap();
        s.spc_command_idle(&SpcCommand::erase_all()).unwrap();

        let mut back = vec![0u8; 256];
        s.spc_read_multi(0, 0, &mut back).unwrap();
        assert!(back.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_checksum_matches_contents() {
        let mut s = session();
        let temperature = s.read_die_temperature().unwrap();
        s.spc_write_row(0, 0, temperature, &[1u8; 256], true).unwrap();
        let sum = s.spc_checksum(array_id::FLASH_ALL, 0, 0).unwrap();
        assert_eq!(sum, 256);
    }

    #[test]
    fn test_temperature_double_read() {
        let mut s = session();
        let t = s.read_die_temperature().unwrap();
        // nominal fixed reading on this family
        assert_eq!(t.sign, 0);
        assert!(t.magnitude > 0);
        assert_eq!(s.probe_mut().temperature_reads, 2);
    }

    #[test]
    fn test_spc_gating_invariant() {
        // every command preceded by IDLE, every data pop by DATA_READY
        let mut s = session();
        let mut out = [0u8; 1];
        s.spc_read(&SpcCommand::read_nvl_vol_byte(array_id::NVL_DEVCONFIG, 0), &mut out)
            .unwrap();
        s.spc_command_idle(&SpcCommand::erase_all()).unwrap();
        s.probe_mut().assert_spc_gating();
    }
}
