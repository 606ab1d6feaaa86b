//! SWD target session
//!
//! [`TargetSession`] owns a probe transport and drives the target's Serial
//! Wire Debug port through it: port acquisition after reset, programming
//! mode entry, AP/DP register primitives and CPU reset. The SPC command
//! engine in [`crate::spc`] and the region flows in [`crate::ops`] build on
//! these primitives.

use std::time::Duration;

use crate::error::{Error, Result};
use crate::transport::{ProbeTransport, Request, REQ_TARGET_RESET, REQ_WARMUP};

/// Test-mode key register; writing the key holds the part in test mode so
/// the debug port stays up after reset
pub const REG_TEST_MODE_KEY: u32 = 0x4005_0210;
/// The test-mode key value
pub const TEST_MODE_KEY: u32 = 0xEA7E_30A9;

/// Cortex-M3 debug halting control and status register
pub const REG_CM3_DHCSR: u32 = 0xE000_EDF0;
/// DHCSR write: debug key, halt and enable debug
pub const DHCSR_KEY_HALT_DEBUG: u32 = 0xA05F_0003;

/// Releases the Cortex-M3 from reset
pub const REG_CM3_RESET_CTL: u32 = 0x4008_000C;
/// Power manager active-mode configuration (subsystem enables)
pub const REG_PM_ACT_CFG0: u32 = 0x4000_43A0;
/// Internal main oscillator control
pub const REG_FASTCLK_IMO_CR: u32 = 0x4000_4200;

/// DP CTRL/STAT: request system and debug power-up
const DP_CTRL_POWERUP: u32 = 0x5000_0000;
/// AP CSW: 32-bit transfer size, master debug
const AP_CSW_WORD_ACCESS: u32 = 0x2200_0002;

/// How many IDCODE reads to attempt while the target comes out of the
/// first-after-boot timing window
const ACQUIRE_RETRIES: usize = 100;

/// SPC status byte lane and any other family-dependent wrinkles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceFamily {
    /// PSoC 5 (CY8C55xx)
    Psoc5,
}

impl DeviceFamily {
    /// Which byte of the 32-bit SPC status read carries the status flags.
    pub fn spc_status_lane(self) -> usize {
        match self {
            // 3rd least significant byte on this family
            DeviceFamily::Psoc5 => 2,
        }
    }
}

/// A live SWD connection to one target through one probe
pub struct TargetSession<P: ProbeTransport> {
    probe: P,
    family: DeviceFamily,
    programming: bool,
}

impl<P: ProbeTransport> TargetSession<P> {
    /// Wrap an open probe. The target is not touched until
    /// [`TargetSession::switch_to_swd`].
    pub fn new(probe: P, family: DeviceFamily) -> Self {
        Self {
            probe,
            family,
            programming: false,
        }
    }

    /// The device family this session was opened for.
    pub fn family(&self) -> DeviceFamily {
        self.family
    }

    /// Whether programming mode has been entered.
    pub fn is_programming(&self) -> bool {
        self.programming
    }

    /// Direct access to the probe, e.g. for endpoint stall clearing.
    pub fn probe_mut(&mut self) -> &mut P {
        &mut self.probe
    }

    /// Give the probe back, ending the session.
    pub fn into_probe(self) -> P {
        self.probe
    }

    /// Switch the target's debug port from JTAG to SWD and acquire it.
    ///
    /// The probe firmware emits the line-reset / JTAG-to-SWD selection
    /// sequence (line high 51 cycles, 0x9E 0xE7 LSB-first, line high again,
    /// then dummy clocks) on the wire. Host-side we warm the firmware up
    /// with a dummy vendor request, write the test-mode key so the part
    /// stays acquirable after reset, then retry the IDCODE read until a
    /// non-fault status arrives.
    pub fn switch_to_swd(&mut self) -> Result<()> {
        // the first vendor request after probe power-up can be swallowed
        let _ = self.probe.control_in(REQ_WARMUP, 0, 0, 1);

        let mut req = Request::new();
        req.ap_addr_write(REG_TEST_MODE_KEY)?;
        req.ap_data_write(TEST_MODE_KEY)?;
        // statuses are unreliable until the port is acquired
        if let Ok(mut reply) = self.probe.send_receive(&req) {
            let _ = reply.pop_ok_remaining();
        }

        let mut last_err = Error::SwdFault(0);
        for attempt in 0..ACQUIRE_RETRIES {
            match self.try_read_idcode() {
                Ok(idcode) => {
                    log::debug!(
                        "SWD port acquired after {} attempt(s), idcode 0x{:08X}",
                        attempt + 1,
                        idcode
                    );
                    return Ok(());
                }
                Err(e @ Error::SwdFault(_)) => {
                    last_err = e;
                    self.probe.delay(Duration::from_millis(1));
                }
                Err(e) => return Err(e),
            }
        }
        log::warn!("target did not leave the boot window: {}", last_err);
        Err(last_err)
    }

    fn try_read_idcode(&mut self) -> Result<u32> {
        let mut req = Request::new();
        req.dp_idcode_read()?;
        let mut reply = self.probe.send_receive(&req)?;
        let data = reply.pop_b4_ok()?;
        Ok(u32::from_le_bytes(data))
    }

    /// Read the DP IDCODE (JTAG id) of the acquired target.
    pub fn read_jtag_id(&mut self) -> Result<u32> {
        let id = self.try_read_idcode()?;
        log::debug!("JTAG id: 0x{:08X}", id);
        Ok(id)
    }

    /// Power the debug port, halt the CPU and bring up the subsystems the
    /// SPC needs. All statuses must come back OK.
    pub fn enter_programming_mode(&mut self) -> Result<()> {
        let mut req = Request::new();
        req.dp_ctrl_write(DP_CTRL_POWERUP)?;
        req.dp_select_write(0)?;
        req.ap_ctrl_write(AP_CSW_WORD_ACCESS)?;

        // halt the CPU and enable debug
        push_mem_write(&mut req, REG_CM3_DHCSR, DHCSR_KEY_HALT_DEBUG)?;
        // release the Cortex reset
        push_mem_write(&mut req, REG_CM3_RESET_CTL, 0x0000_0002)?;
        // power the analog/digital subsystems in active mode
        push_mem_write(&mut req, REG_PM_ACT_CFG0, 0x0000_00BF)?;
        // IMO to 24 MHz for SPC timing
        push_mem_write(&mut req, REG_FASTCLK_IMO_CR, 0x0000_0002)?;

        let mut reply = self.probe.send_receive(&req)?;
        reply.pop_ok_remaining()?;

        self.programming = true;
        log::info!("programming mode entered");
        Ok(())
    }

    /// Leave programming mode and let the application run.
    pub fn exit_programming_mode(&mut self) -> Result<()> {
        self.programming = false;
        self.reset_cpu()
    }

    /// Read a 32-bit value through the AP.
    ///
    /// The AP read pipeline lags by one transaction, so a dummy read is
    /// issued first and discarded.
    pub fn ap_register_read(&mut self, address: u32) -> Result<u32> {
        self.ap_register_read_with(address, true)
    }

    /// AP read with explicit control over the pipeline-flush dummy read.
    pub fn ap_register_read_with(&mut self, address: u32, dummy_preread: bool) -> Result<u32> {
        let mut req = Request::new();
        req.ap_addr_write(address)?;
        if dummy_preread {
            req.ap_data_read()?;
        }
        req.ap_data_read()?;

        let mut reply = self.probe.send_receive(&req)?;
        reply.pop_ok(1)?;
        if dummy_preread {
            let _ = reply.pop_b4_ok()?;
        }
        let data = reply.pop_b4_ok()?;
        Ok(u32::from_le_bytes(data))
    }

    /// Write a 32-bit value through the AP.
    pub fn ap_register_write(&mut self, address: u32, value: u32) -> Result<()> {
        let mut req = Request::new();
        req.ap_addr_write(address)?;
        req.ap_data_write(value)?;

        let mut reply = self.probe.send_receive(&req)?;
        reply.pop_ok(2)
    }

    /// Pulse the target reset line via the probe.
    pub fn reset_cpu(&mut self) -> Result<()> {
        log::info!("resetting target CPU");
        let _ = self.probe.control_in(REQ_TARGET_RESET, 1, 0, 1)?;
        self.probe.delay(Duration::from_millis(50));
        let _ = self.probe.control_in(REQ_TARGET_RESET, 0, 0, 1)?;
        Ok(())
    }

    /// Send a prepared request and hand back the reply.
    pub(crate) fn send_receive(&mut self, request: &Request) -> Result<crate::transport::Reply> {
        self.probe.send_receive(request)
    }
}

/// Queue a memory-mapped register write (AP address + data).
fn push_mem_write(req: &mut Request, address: u32, value: u32) -> Result<()> {
    req.ap_addr_write(address)?;
    req.ap_data_write(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::FakeProbe;

    #[test]
    fn test_switch_to_swd_retries_boot_window() {
        // the fake faults the first IDCODE reads until the key is written
        // and a couple of polls have gone by
        let probe = FakeProbe::default_geometry();
        let mut session = TargetSession::new(probe, DeviceFamily::Psoc5);
        session.switch_to_swd().unwrap();
        assert!(session.probe_mut().test_mode_key_written());
    }

    #[test]
    fn test_read_jtag_id() {
        let mut probe = FakeProbe::default_geometry();
        probe.jtag_id = 0x2E12_3069;
        let mut session = TargetSession::new(probe, DeviceFamily::Psoc5);
        session.switch_to_swd().unwrap();
        assert_eq!(session.read_jtag_id().unwrap(), 0x2E12_3069);
    }

    #[test]
    fn test_enter_programming_mode_writes_registers() {
        let probe = FakeProbe::default_geometry();
        let mut session = TargetSession::new(probe, DeviceFamily::Psoc5);
        session.switch_to_swd().unwrap();
        session.enter_programming_mode().unwrap();
        assert!(session.is_programming());

        let probe = session.probe_mut();
        assert_eq!(probe.reg(REG_CM3_DHCSR), DHCSR_KEY_HALT_DEBUG);
        assert_eq!(probe.reg(REG_CM3_RESET_CTL), 2);
        assert_eq!(probe.reg(REG_PM_ACT_CFG0), 0xBF);
        assert_eq!(probe.reg(REG_FASTCLK_IMO_CR), 2);
    }

    #[test]
    fn test_ap_register_roundtrip() {
        let probe = FakeProbe::default_geometry();
        let mut session = TargetSession::new(probe, DeviceFamily::Psoc5);
        session.switch_to_swd().unwrap();
        session.ap_register_write(0x1234_0000, 0xCAFE_F00D).unwrap();
        assert_eq!(session.ap_register_read(0x1234_0000).unwrap(), 0xCAFE_F00D);
    }

    #[test]
    fn test_reset_cpu_pulses_reset_request() {
        let probe = FakeProbe::default_geometry();
        let mut session = TargetSession::new(probe, DeviceFamily::Psoc5);
        session.reset_cpu().unwrap();
        assert_eq!(session.probe_mut().reset_pulses, 1);
    }
}
