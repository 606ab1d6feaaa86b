//! In-memory fake probe + target for engine tests
//!
//! [`FakeProbe`] implements [`ProbeTransport`] by interpreting request
//! batches against a simulated target: AP-visible registers, the SPC
//! byte-machine with its IDLE/DATA_READY walk, flash arrays, the config
//! lane, protection rows, EEPROM and the two NVLs. It also records enough
//! of what happened (command log, gating observations) for tests to assert
//! on the protocol, not just the data.

use std::collections::{HashMap, VecDeque};

use crate::error::{Error, Result};
use crate::geometry::DeviceGeometry;
use crate::spc::{
    array_id, REG_SPC_CPU_DATA, REG_SPC_STATUS, SPC_KEY1, SPC_KEY2_BASE, SPC_STATUS_DATA_READY,
    SPC_STATUS_IDLE,
};
use crate::swd::{REG_TEST_MODE_KEY, TEST_MODE_KEY};
use crate::transport::{
    ProbeTransport, Reply, Request, REPLY_FAULT, REPLY_JTAGID_MATCHED, REPLY_OK, REQ_TARGET_RESET,
    REQ_WARMUP,
};

/// One executed SPC command, as seen by the fake target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpcOp {
    /// Command code
    pub opcode: u8,
    /// Raw argument tail (row payloads included)
    pub args: Vec<u8>,
}

#[derive(Debug)]
enum Phase {
    Idle,
    WaitKey2,
    WaitOpcode { key2: u8 },
    Args { opcode: u8, args: Vec<u8> },
    Ready { queue: VecDeque<u8> },
}

/// Scripted probe + target double
pub struct FakeProbe {
    geom: DeviceGeometry,
    /// IDCODE handed out once acquired
    pub jtag_id: u32,

    ap_addr: u32,
    regs: HashMap<u32, u32>,

    code: Vec<Vec<u8>>,
    config: Vec<Vec<u8>>,
    protection: Vec<Vec<u8>>,
    eeprom: Vec<u8>,
    nvl_devconfig: [u8; 4],
    nvl_wol: [u8; 4],
    nvl_latch: [u8; 4],
    row_latch: Vec<u8>,

    phase: Phase,
    busy_polls: u8,
    saw_idle: bool,
    saw_ready: bool,

    acquired: bool,
    idcode_faults_remaining: u32,

    /// Executed SPC commands in order
    pub spc_ops: Vec<SpcOp>,
    /// Target reset pulses observed
    pub reset_pulses: u32,
    /// GET_TEMPERATURE commands observed
    pub temperature_reads: u32,
    /// Endpoints whose stall was cleared
    pub stalls_cleared: Vec<u8>,
    /// Vendor OUT transfers observed (request, value, index, data)
    pub control_writes: Vec<(u8, u16, u16, Vec<u8>)>,

    violations: Vec<String>,
}

impl FakeProbe {
    /// A fake target with the given geometry, all memories zeroed.
    pub fn new(geom: DeviceGeometry) -> Self {
        let arrays = geom.num_arrays as usize;
        Self {
            code: vec![vec![0; geom.code_bytes_per_array() as usize]; arrays],
            config: vec![vec![0; geom.config_bytes_per_array() as usize]; arrays],
            protection: vec![vec![0; geom.protection_bytes_per_array() as usize]; arrays],
            eeprom: vec![0; geom.eeprom_size as usize],
            geom,
            jtag_id: 0x2E12_3069,
            ap_addr: 0,
            regs: HashMap::new(),
            nvl_devconfig: [0; 4],
            nvl_wol: [0; 4],
            nvl_latch: [0; 4],
            row_latch: Vec::new(),
            phase: Phase::Idle,
            busy_polls: 0,
            saw_idle: false,
            saw_ready: false,
            acquired: false,
            idcode_faults_remaining: 2,
            spc_ops: Vec::new(),
            reset_pulses: 0,
            temperature_reads: 0,
            stalls_cleared: Vec::new(),
            control_writes: Vec::new(),
            violations: Vec::new(),
        }
    }

    /// A small two-array part, quick to exercise.
    pub fn default_geometry() -> Self {
        Self::new(DeviceGeometry {
            flash_size: 2 * 8 * 256,
            rows_per_array: 8,
            num_arrays: 2,
            rows_per_protection_byte: 4,
            code_bytes_per_row: 256,
            code_base_address: 0x0000_0000,
            config_bytes_per_row: 32,
            config_base_address: 0x0080_0000,
            eeprom_size: 64,
            eeprom_bytes_per_row: 16,
            eeprom_base_address: 0x4000_8000,
        })
    }

    /// Preset the device configuration latch (e.g. to enable ECC).
    pub fn set_devconfig(&mut self, value: u32) {
        self.nvl_devconfig = value.to_le_bytes();
    }

    /// Current device configuration latch.
    pub fn devconfig(&self) -> u32 {
        u32::from_le_bytes(self.nvl_devconfig)
    }

    /// Current write-once latch.
    pub fn wol(&self) -> u32 {
        u32::from_le_bytes(self.nvl_wol)
    }

    /// Seed flash contents directly.
    pub fn set_code(&mut self, array: usize, offset: usize, data: &[u8]) {
        self.code[array][offset..offset + data.len()].copy_from_slice(data);
    }

    /// Seed EEPROM contents directly.
    pub fn set_eeprom(&mut self, offset: usize, data: &[u8]) {
        self.eeprom[offset..offset + data.len()].copy_from_slice(data);
    }

    /// Seed protection bytes directly.
    pub fn set_protection(&mut self, array: usize, data: &[u8]) {
        self.protection[array][..data.len()].copy_from_slice(data);
    }

    /// Raw code bytes of one array.
    pub fn code_bytes(&self, array: usize) -> &[u8] {
        &self.code[array]
    }

    /// A memory-mapped register value previously written.
    pub fn reg(&self, address: u32) -> u32 {
        self.regs.get(&address).copied().unwrap_or(0)
    }

    /// Whether the test-mode key was written.
    pub fn test_mode_key_written(&self) -> bool {
        self.acquired
    }

    /// Fail the test if any SPC gating rule was broken: commands issued
    /// without an observed IDLE, data popped without an observed DATA_READY.
    pub fn assert_spc_gating(&self) {
        assert!(
            self.violations.is_empty(),
            "SPC gating violations: {:?}",
            self.violations
        );
    }

    fn ecc_disabled(&self) -> bool {
        self.devconfig() & crate::format::DEVCONFIG_ECC_ENABLE == 0
    }

    fn flash_row_len(&self, aid: u8) -> usize {
        if aid == array_id::EEPROM {
            self.geom.eeprom_bytes_per_row as usize
        } else {
            let mut len = self.geom.code_bytes_per_row as usize;
            if self.ecc_disabled() {
                len += self.geom.config_bytes_per_row as usize;
            }
            len
        }
    }

    fn args_needed(&self, opcode: u8, args: &[u8]) -> Option<usize> {
        Some(match opcode {
            0x00 => 3,                                     // LOAD_BYTE
            0x02 => {
                // LOAD_ROW: aid then one full row
                let aid = *args.first()?;
                1 + self.flash_row_len(aid)
            }
            0x03 => 2,                                     // READ_BYTE
            0x04 | 0x05 | 0x07 | 0x0C => 5,                // addr/row + params
            0x06 => 1,                                     // WRITE_NVL
            0x08 | 0x0A | 0x0B | 0x0E | 0x10 => 2,
            0x09 => 0,                                     // ERASE_ALL
            _ => {
                // unknown command; swallow nothing further
                0
            }
        })
    }

    fn feed_spc_byte(&mut self, byte: u8) {
        match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Idle => {
                if byte == SPC_KEY1 {
                    if !self.saw_idle {
                        self.violations
                            .push("command issued without observing IDLE".into());
                    }
                    self.phase = Phase::WaitKey2;
                } else {
                    self.violations
                        .push(format!("unexpected SPC byte 0x{:02X} while idle", byte));
                }
            }
            Phase::WaitKey2 => {
                self.phase = Phase::WaitOpcode { key2: byte };
            }
            Phase::WaitOpcode { key2 } => {
                if key2 != SPC_KEY2_BASE.wrapping_add(byte) {
                    self.violations.push(format!(
                        "bad key2 0x{:02X} for opcode 0x{:02X}",
                        key2, byte
                    ));
                }
                if self.args_needed(byte, &[]) == Some(0) {
                    self.execute(byte, Vec::new());
                } else {
                    self.phase = Phase::Args {
                        opcode: byte,
                        args: Vec::new(),
                    };
                }
            }
            Phase::Args { opcode, mut args } => {
                args.push(byte);
                match self.args_needed(opcode, &args) {
                    Some(needed) if args.len() >= needed => self.execute(opcode, args),
                    _ => self.phase = Phase::Args { opcode, args },
                }
            }
            Phase::Ready { queue } => {
                self.violations
                    .push("command fed while result data pending".into());
                self.phase = Phase::Ready { queue };
            }
        }
    }

    fn execute(&mut self, opcode: u8, args: Vec<u8>) {
        self.spc_ops.push(SpcOp {
            opcode,
            args: args.clone(),
        });

        let geom = self.geom.clone();
        let cbpr = geom.code_bytes_per_row as usize;
        let cfbpr = geom.config_bytes_per_row as usize;
        let mut queue = VecDeque::new();

        match opcode {
            0x00 => {
                // LOAD_BYTE aid, index, value
                self.nvl_latch[args[1] as usize & 3] = args[2];
            }
            0x02 => {
                // LOAD_ROW aid, payload
                self.row_latch = args[1..].to_vec();
            }
            0x03 => {
                // READ_BYTE aid, index
                let aid = args[0];
                let idx = args[1] as usize;
                let byte = if aid == array_id::EEPROM {
                    self.eeprom[idx]
                } else {
                    self.code[aid as usize][idx]
                };
                queue.push_back(byte);
            }
            0x04 => {
                // READ_MULTI_BYTE aid, addr[3], n-1
                let aid = args[0];
                let addr =
                    (args[1] as usize) << 16 | (args[2] as usize) << 8 | args[3] as usize;
                let n = args[4] as usize + 1;
                let config_base = (geom.config_base_address & 0x00FF_FFFF) as usize;
                for i in 0..n {
                    let a = addr + i;
                    let byte = if aid == array_id::EEPROM {
                        self.eeprom[a]
                    } else if a >= config_base {
                        self.config[aid as usize][a - config_base]
                    } else {
                        self.code[aid as usize][a]
                    };
                    queue.push_back(byte);
                }
            }
            0x05 | 0x07 => {
                // WRITE_ROW / PROG_ROW aid, row_hi, row_lo, tsign, tmag
                let aid = args[0];
                let row = (args[1] as usize) << 8 | args[2] as usize;
                let latch = std::mem::take(&mut self.row_latch);
                if aid == array_id::EEPROM {
                    let ebpr = geom.eeprom_bytes_per_row as usize;
                    self.eeprom[row * ebpr..row * ebpr + latch.len()]
                        .copy_from_slice(&latch);
                } else {
                    let code_part = latch.len().min(cbpr);
                    self.code[aid as usize][row * cbpr..row * cbpr + code_part]
                        .copy_from_slice(&latch[..code_part]);
                    if latch.len() > cbpr {
                        let cfg = &latch[cbpr..];
                        self.config[aid as usize][row * cfbpr..row * cfbpr + cfg.len()]
                            .copy_from_slice(cfg);
                    }
                }
            }
            0x06 => {
                // WRITE_NVL aid
                match args[0] {
                    array_id::NVL_DEVCONFIG => self.nvl_devconfig = self.nvl_latch,
                    array_id::NVL_WOL => self.nvl_wol = self.nvl_latch,
                    other => self
                        .violations
                        .push(format!("WRITE_NVL to unknown aid 0x{:02X}", other)),
                }
            }
            0x08 => {
                // ERASE_SECTOR aid, sector (64 rows)
                let aid = args[0] as usize;
                let start = args[1] as usize * 64;
                let end = (start + 64).min(geom.rows_per_array as usize);
                for row in start..end {
                    self.code[aid][row * cbpr..(row + 1) * cbpr].fill(0);
                    self.config[aid][row * cfbpr..(row + 1) * cfbpr].fill(0);
                }
            }
            0x09 => {
                // ERASE_ALL
                for array in &mut self.code {
                    array.fill(0);
                }
                for array in &mut self.config {
                    array.fill(0);
                }
                for array in &mut self.protection {
                    array.fill(0);
                }
            }
            0x0A => {
                // READ_HIDDEN_ROW: protection bytes padded to a full row
                let aid = args[0] as usize;
                for i in 0..256 {
                    queue.push_back(self.protection[aid].get(i).copied().unwrap_or(0));
                }
            }
            0x0B => {
                // PROTECT
                let aid = args[0] as usize;
                let n = self.protection[aid].len().min(self.row_latch.len());
                let latch = std::mem::take(&mut self.row_latch);
                self.protection[aid][..n].copy_from_slice(&latch[..n]);
            }
            0x0C => {
                // GET_CHECKSUM
                let aid = args[0];
                let start = (args[1] as usize) << 8 | args[2] as usize;
                let count = ((args[3] as usize) << 8 | args[4] as usize) + 1;
                let sum = if aid == array_id::FLASH_ALL {
                    self.checksum_whole_device()
                } else {
                    self.checksum_rows(aid as usize, start, count)
                };
                queue.extend(sum.to_be_bytes());
            }
            0x0E => {
                // GET_TEMPERATURE: fixed nominal reading on this family
                self.temperature_reads += 1;
                queue.push_back(0);
                queue.push_back(25);
            }
            0x10 => {
                // READ_NVL_VOL_BYTE aid, index
                let bytes = match args[0] {
                    array_id::NVL_DEVCONFIG => &self.nvl_devconfig,
                    _ => &self.nvl_wol,
                };
                queue.push_back(bytes[args[1] as usize & 3]);
            }
            other => {
                self.violations
                    .push(format!("unimplemented SPC opcode 0x{:02X}", other));
            }
        }

        self.saw_idle = false;
        self.saw_ready = false;
        self.busy_polls = 1;
        self.phase = if queue.is_empty() {
            Phase::Idle
        } else {
            Phase::Ready { queue }
        };
    }

    fn checksum_whole_device(&self) -> u32 {
        let mut sum = 0u32;
        for array in &self.code {
            sum = array.iter().fold(sum, |s, &b| s.wrapping_add(b as u32));
        }
        if self.ecc_disabled() {
            for array in &self.config {
                sum = array.iter().fold(sum, |s, &b| s.wrapping_add(b as u32));
            }
        }
        sum
    }

    fn checksum_rows(&self, aid: usize, start: usize, count: usize) -> u32 {
        let cbpr = self.geom.code_bytes_per_row as usize;
        let cfbpr = self.geom.config_bytes_per_row as usize;
        let mut sum = 0u32;
        for row in start..start + count {
            sum = self.code[aid][row * cbpr..(row + 1) * cbpr]
                .iter()
                .fold(sum, |s, &b| s.wrapping_add(b as u32));
            if self.ecc_disabled() {
                sum = self.config[aid][row * cfbpr..(row + 1) * cfbpr]
                    .iter()
                    .fold(sum, |s, &b| s.wrapping_add(b as u32));
            }
        }
        sum
    }

    fn spc_status_value(&mut self) -> u8 {
        if self.busy_polls > 0 {
            self.busy_polls -= 1;
            return 0;
        }
        let has_data = matches!(&self.phase, Phase::Ready { queue } if !queue.is_empty());
        if has_data {
            self.saw_ready = true;
            SPC_STATUS_DATA_READY
        } else {
            self.saw_idle = true;
            SPC_STATUS_IDLE
        }
    }

    fn pop_spc_data(&mut self) -> u8 {
        let (popped, now_empty, in_ready) = match &mut self.phase {
            Phase::Ready { queue } => {
                let popped = queue.pop_front();
                (popped, queue.is_empty(), true)
            }
            _ => (None, false, false),
        };

        if !in_ready {
            self.violations
                .push("data popped with no result pending".into());
            return 0;
        }
        if !self.saw_ready {
            self.violations
                .push("data popped without observing DATA_READY".into());
        }
        if popped.is_none() {
            self.violations.push("data popped past end of result".into());
        }
        if now_empty {
            self.phase = Phase::Idle;
        }
        popped.unwrap_or(0)
    }

    fn mem_write(&mut self, address: u32, value: u32) {
        if address == REG_SPC_CPU_DATA {
            self.feed_spc_byte(value as u8);
        } else {
            if address == REG_TEST_MODE_KEY && value == TEST_MODE_KEY {
                self.acquired = true;
            }
            self.regs.insert(address, value);
        }
    }

    fn mem_read(&mut self, address: u32) -> u32 {
        if address == REG_SPC_STATUS {
            return (self.spc_status_value() as u32) << 16;
        }
        if address == REG_SPC_CPU_DATA {
            return self.pop_spc_data() as u32;
        }
        let ee_base = self.geom.eeprom_base_address;
        if address >= ee_base && address < ee_base + self.geom.eeprom_size {
            let off = (address - ee_base) as usize;
            let mut word = [0u8; 4];
            for (i, slot) in word.iter_mut().enumerate() {
                *slot = self.eeprom.get(off + i).copied().unwrap_or(0);
            }
            return u32::from_le_bytes(word);
        }
        self.reg(address)
    }
}

impl ProbeTransport for FakeProbe {
    fn send_receive(&mut self, request: &Request) -> Result<Reply> {
        let bytes = request.as_bytes();
        let mut reply = Vec::new();
        let mut i = 0;

        while i < bytes.len() {
            match bytes[i] {
                0x8B => {
                    self.ap_addr =
                        u32::from_le_bytes(bytes[i + 1..i + 5].try_into().unwrap());
                    reply.push(REPLY_OK);
                    i += 5;
                }
                0xBB => {
                    let value =
                        u32::from_le_bytes(bytes[i + 1..i + 5].try_into().unwrap());
                    self.mem_write(self.ap_addr, value);
                    reply.push(REPLY_OK);
                    i += 5;
                }
                0xA3 | 0xA9 | 0xB1 => {
                    reply.push(REPLY_OK);
                    i += 5;
                }
                0x9F => {
                    let value = self.mem_read(self.ap_addr);
                    reply.extend(value.to_le_bytes());
                    reply.push(REPLY_OK);
                    i += 1;
                }
                0xA5 => {
                    if self.idcode_faults_remaining > 0 || !self.acquired {
                        self.idcode_faults_remaining =
                            self.idcode_faults_remaining.saturating_sub(1);
                        reply.extend(0u32.to_le_bytes());
                        reply.push(REPLY_FAULT);
                    } else {
                        reply.extend(self.jtag_id.to_le_bytes());
                        reply.push(REPLY_JTAGID_MATCHED);
                    }
                    i += 1;
                }
                other => {
                    return Err(Error::Usb {
                        endpoint: crate::transport::EP_BULK_OUT,
                        reason: format!("fake probe: unknown opcode 0x{:02X}", other),
                    });
                }
            }
        }

        Reply::new(reply)
    }

    fn control_out(&mut self, request: u8, value: u16, index: u16, data: &[u8]) -> Result<()> {
        self.control_writes.push((request, value, index, data.to_vec()));
        Ok(())
    }

    fn control_in(&mut self, request: u8, value: u16, _index: u16, len: usize) -> Result<Vec<u8>> {
        match request {
            REQ_WARMUP => Ok(vec![0]),
            REQ_TARGET_RESET => {
                if value == 1 {
                    self.reset_pulses += 1;
                }
                Ok(vec![0])
            }
            _ => Ok(vec![0; len]),
        }
    }

    fn clear_stall(&mut self, endpoint: u8) -> Result<()> {
        self.stalls_cleared.push(endpoint);
        Ok(())
    }

    fn delay(&mut self, _duration: std::time::Duration) {}
}
