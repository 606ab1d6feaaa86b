//! Probe request/reply framing and the transport seam
//!
//! The FX2 probe speaks a simple batched protocol over a paired bulk
//! endpoint set: the host concatenates SWD packet-header opcodes (each
//! usually followed by 4 little-endian data bytes) into one OUT transfer,
//! and the probe answers with one IN transfer carrying, per command, the
//! data it produced followed by a status byte.
//!
//! [`Request`] builds such a batch with typed verbs; [`Reply`] walks the
//! answer with typed consumers so that reading data a command never queued
//! fails structurally instead of silently misparsing. [`ProbeTransport`] is
//! the seam a USB backend (or an in-memory fake) implements.

use std::time::Duration;

use crate::error::{Error, Result};

/// Bulk OUT endpoint carrying requests
pub const EP_BULK_OUT: u8 = 0x02;
/// Bulk IN endpoint carrying replies
pub const EP_BULK_IN: u8 = 0x84;

/// Fixed capacity of a request buffer. The longest batch loads a 288-byte
/// flash row at 5 wire bytes per data write, well under this.
pub const REQUEST_MAX_LEN: usize = 2048;
/// Fixed capacity of a reply buffer
pub const REPLY_MAX_LEN: usize = 2048;

// SWD packet headers understood by the probe firmware
const AP_ADDR_WRITE: u8 = 0x8B;
const AP_DATA_READ: u8 = 0x9F;
const AP_CTRLSTAT_WRITE: u8 = 0xA3;
const AP_DATA_WRITE: u8 = 0xBB;
const DP_IDCODE_READ: u8 = 0xA5;
const DP_CTRLSTAT_WRITE: u8 = 0xA9;
const DP_SELECT_WRITE: u8 = 0xB1;

/// Status byte: command acknowledged
pub const REPLY_OK: u8 = 0x21;
/// Status byte: IDCODE read matched the probe's expectation
pub const REPLY_JTAGID_MATCHED: u8 = 0x31;
/// Status byte: IDCODE read did not match
pub const REPLY_JTAGID_NOMATCH: u8 = 0x27;
/// Status byte: SWD fault acknowledge (or acquire timeout)
pub const REPLY_FAULT: u8 = 0x24;

/// Vendor control request: probe warm-up dummy (first request after power-up
/// may be swallowed by the firmware)
pub const REQ_WARMUP: u8 = 95;
/// Vendor control request: pulse the target reset line
pub const REQ_TARGET_RESET: u8 = 100;

fn status_is_ok(status: u8) -> bool {
    status == REPLY_OK || status == REPLY_JTAGID_MATCHED
}

/// A request batch under construction
#[derive(Debug, Default)]
pub struct Request {
    buf: Vec<u8>,
}

impl Request {
    /// An empty request.
    pub fn new() -> Self {
        Self {
            buf: Vec::with_capacity(REQUEST_MAX_LEN),
        }
    }

    fn push(&mut self, bytes: &[u8]) -> Result<()> {
        if self.buf.len() + bytes.len() > REQUEST_MAX_LEN {
            return Err(Error::Range {
                what: "probe request",
                len: self.buf.len() + bytes.len(),
                max: REQUEST_MAX_LEN,
            });
        }
        self.buf.extend_from_slice(bytes);
        Ok(())
    }

    fn push_cmd_u32(&mut self, opcode: u8, value: u32) -> Result<()> {
        let v = value.to_le_bytes();
        self.push(&[opcode, v[0], v[1], v[2], v[3]])
    }

    /// Set the AP address for subsequent data accesses.
    pub fn ap_addr_write(&mut self, address: u32) -> Result<()> {
        self.push_cmd_u32(AP_ADDR_WRITE, address)
    }

    /// Write 32 bits through the AP at the current address.
    pub fn ap_data_write(&mut self, value: u32) -> Result<()> {
        self.push_cmd_u32(AP_DATA_WRITE, value)
    }

    /// Queue one AP data read; the reply carries 4 data bytes + status.
    pub fn ap_data_read(&mut self) -> Result<()> {
        self.push(&[AP_DATA_READ])
    }

    /// Write the AP CTRL/STAT (CSW) register.
    pub fn ap_ctrl_write(&mut self, value: u32) -> Result<()> {
        self.push_cmd_u32(AP_CTRLSTAT_WRITE, value)
    }

    /// Write the DP CTRL/STAT register.
    pub fn dp_ctrl_write(&mut self, value: u32) -> Result<()> {
        self.push_cmd_u32(DP_CTRLSTAT_WRITE, value)
    }

    /// Write the DP SELECT register.
    pub fn dp_select_write(&mut self, value: u32) -> Result<()> {
        self.push_cmd_u32(DP_SELECT_WRITE, value)
    }

    /// Queue a DP IDCODE read; the reply carries 4 data bytes + status.
    pub fn dp_idcode_read(&mut self) -> Result<()> {
        self.push(&[DP_IDCODE_READ])
    }

    /// The assembled wire bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Number of bytes queued so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether nothing has been queued.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

/// A received reply with a head cursor
#[derive(Debug)]
pub struct Reply {
    buf: Vec<u8>,
    pos: usize,
}

impl Reply {
    /// Wrap received bytes. Oversized replies are rejected outright.
    pub fn new(buf: Vec<u8>) -> Result<Self> {
        if buf.len() > REPLY_MAX_LEN {
            return Err(Error::Range {
                what: "probe reply",
                len: buf.len(),
                max: REPLY_MAX_LEN,
            });
        }
        Ok(Self { buf, pos: 0 })
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn pop_bytes(&mut self, n: usize) -> Result<&[u8]> {
        if self.remaining() < n {
            return Err(Error::ReplyTruncated {
                expected: n,
                remaining: self.remaining(),
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    /// Consume `n` status bytes, requiring each to be OK.
    pub fn pop_ok(&mut self, n: usize) -> Result<()> {
        for _ in 0..n {
            let status = self.pop_bytes(1)?[0];
            if !status_is_ok(status) {
                return Err(Error::SwdFault(status));
            }
        }
        Ok(())
    }

    /// Consume every remaining byte as a status byte.
    pub fn pop_ok_remaining(&mut self) -> Result<()> {
        let n = self.remaining();
        self.pop_ok(n)
    }

    /// Consume 4 data bytes (wire order preserved) followed by one status
    /// byte.
    pub fn pop_b4_ok(&mut self) -> Result<[u8; 4]> {
        let mut data = [0u8; 4];
        data.copy_from_slice(self.pop_bytes(4)?);
        self.pop_ok(1)?;
        Ok(data)
    }

    /// Consume `out.len()` groups of 4 data bytes + status, keeping only
    /// byte 0 of each group. This is the shape of repeated reads from a
    /// byte-wide register.
    pub fn pop_nb0_ok(&mut self, out: &mut [u8]) -> Result<()> {
        for slot in out.iter_mut() {
            let data = self.pop_b4_ok()?;
            *slot = data[0];
        }
        Ok(())
    }
}

/// The seam between the programming engine and a physical (or fake) probe.
///
/// All operations block until the underlying transfer completes; transfers
/// on one probe handle are strictly ordered.
pub trait ProbeTransport {
    /// Transmit one request batch and receive one reply.
    fn send_receive(&mut self, request: &Request) -> Result<Reply>;

    /// Vendor control transfer, host to device.
    fn control_out(&mut self, request: u8, value: u16, index: u16, data: &[u8]) -> Result<()>;

    /// Vendor control transfer, device to host.
    fn control_in(&mut self, request: u8, value: u16, index: u16, len: usize) -> Result<Vec<u8>>;

    /// Clear a halted bulk endpoint.
    fn clear_stall(&mut self, endpoint: u8) -> Result<()>;

    /// Wall-clock delay between operations. Overridable so tests don't sleep.
    fn delay(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_encoding() {
        let mut req = Request::new();
        req.ap_addr_write(0x4000_4720).unwrap();
        req.ap_data_write(0x0000_00B6).unwrap();
        req.ap_data_read().unwrap();
        req.dp_idcode_read().unwrap();

        assert_eq!(
            req.as_bytes(),
            [
                0x8B, 0x20, 0x47, 0x00, 0x40, // addr write, LE
                0xBB, 0xB6, 0x00, 0x00, 0x00, // data write, LE
                0x9F, // data read
                0xA5, // idcode read
            ]
        );
    }

    #[test]
    fn test_request_capacity() {
        let mut req = Request::new();
        for _ in 0..REQUEST_MAX_LEN / 5 {
            req.ap_data_write(0).unwrap();
        }
        assert!(matches!(
            req.ap_data_write(0),
            Err(Error::Range { .. })
        ));
    }

    #[test]
    fn test_reply_pop_ok() {
        let mut reply = Reply::new(vec![REPLY_OK, REPLY_JTAGID_MATCHED, REPLY_OK]).unwrap();
        reply.pop_ok(2).unwrap();
        reply.pop_ok_remaining().unwrap();
        assert_eq!(reply.remaining(), 0);
    }

    #[test]
    fn test_reply_fault() {
        let mut reply = Reply::new(vec![REPLY_OK, REPLY_FAULT]).unwrap();
        reply.pop_ok(1).unwrap();
        assert!(matches!(reply.pop_ok(1), Err(Error::SwdFault(0x24))));

        let mut reply = Reply::new(vec![REPLY_JTAGID_NOMATCH]).unwrap();
        assert!(matches!(reply.pop_ok(1), Err(Error::SwdFault(0x27))));
    }

    #[test]
    fn test_reply_pop_b4_ok() {
        let mut reply = Reply::new(vec![0x78, 0x56, 0x34, 0x12, REPLY_OK]).unwrap();
        let data = reply.pop_b4_ok().unwrap();
        assert_eq!(data, [0x78, 0x56, 0x34, 0x12]);
        assert_eq!(u32::from_le_bytes(data), 0x1234_5678);
    }

    #[test]
    fn test_reply_pop_nb0_ok() {
        let mut reply = Reply::new(vec![
            0xAA, 0, 0, 0, REPLY_OK, //
            0xBB, 0, 0, 0, REPLY_OK, //
            0xCC, 0, 0, 0, REPLY_OK,
        ])
        .unwrap();
        let mut out = [0u8; 3];
        reply.pop_nb0_ok(&mut out).unwrap();
        assert_eq!(out, [0xAA, 0xBB, 0xCC]);
    }

    #[test]
    fn test_reply_truncation_is_structural() {
        // consuming data a command never queued must fail, not misparse
        let mut reply = Reply::new(vec![REPLY_OK]).unwrap();
        assert!(matches!(
            reply.pop_b4_ok(),
            Err(Error::ReplyTruncated { .. })
        ));
    }
}
