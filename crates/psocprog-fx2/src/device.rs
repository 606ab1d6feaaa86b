//! FX2 probe device: USB open/claim, bulk and control transfers
//!
//! [`Fx2Probe`] owns the claimed USB interface and implements
//! [`ProbeTransport`] over the paired bulk endpoints. Opening first tries
//! the configured VID:PID; on a miss the bootstrap path uploads the bridge
//! firmware into the unconfigured probe and re-opens.

use std::path::PathBuf;

use nusb::transfer::{Buffer, Bulk, ControlIn, ControlOut, ControlType, In, Out, Recipient};
use nusb::{Endpoint, Interface, MaybeFuture};
use psocprog_core::error::{Error as CoreError, Result as CoreResult};
use psocprog_core::transport::{
    ProbeTransport, Reply, Request, EP_BULK_IN, EP_BULK_OUT, REPLY_MAX_LEN,
};

use crate::bootstrap;
use crate::error::{ProbeError, Result};
use crate::protocol::*;

/// How to find and, if needed, bootstrap the probe
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// VID of the probe before firmware upload
    pub vid_unconfigured: u16,
    /// PID of the probe before firmware upload
    pub pid_unconfigured: u16,
    /// VID of the configured probe
    pub vid: u16,
    /// PID of the configured probe
    pub pid: u16,
    /// FX2 bridge firmware hex file
    pub fx2_firmware: PathBuf,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            vid_unconfigured: VID_CYPRESS,
            pid_unconfigured: PID_DVK5_UNCONFIGURED,
            vid: VID_CYPRESS,
            pid: PID_DVK5_CONFIGURED,
            fx2_firmware: PathBuf::from(DEFAULT_FX2_FIRMWARE),
        }
    }
}

/// An open, configured probe
pub struct Fx2Probe {
    interface: Interface,
}

impl Fx2Probe {
    /// Open the probe, bootstrapping its firmware first when necessary.
    pub fn open(config: &ProbeConfig) -> Result<Self> {
        if let Some(probe) = Self::open_vid_pid(config.vid, config.pid)? {
            log::info!(
                "opened configured probe {:04X}:{:04X}",
                config.vid,
                config.pid
            );
            return Ok(probe);
        }

        log::info!(
            "configured probe {:04X}:{:04X} not found; bootstrapping",
            config.vid,
            config.pid
        );
        bootstrap::configure(config)?;

        match Self::open_vid_pid(config.vid, config.pid)? {
            Some(probe) => {
                log::info!("probe configured and re-opened");
                Ok(probe)
            }
            None => Err(ProbeError::ConfigureFailed(
                "probe did not re-enumerate after firmware upload".to_string(),
            )),
        }
    }

    /// Open a specific VID:PID, returning `None` when absent.
    pub(crate) fn open_vid_pid(vid: u16, pid: u16) -> Result<Option<Self>> {
        let info = nusb::list_devices()
            .wait()
            .map_err(|e| ProbeError::OpenFailed(e.to_string()))?
            .find(|d| d.vendor_id() == vid && d.product_id() == pid);

        let Some(info) = info else {
            return Ok(None);
        };

        log::debug!(
            "opening {:04X}:{:04X} at bus {} address {}",
            vid,
            pid,
            info.busnum(),
            info.device_address()
        );

        let device = info
            .open()
            .wait()
            .map_err(|e| ProbeError::OpenFailed(e.to_string()))?;
        let interface = device
            .claim_interface(0)
            .wait()
            .map_err(|e| ProbeError::ClaimFailed(e.to_string()))?;

        Ok(Some(Self { interface }))
    }

    /// Clear stalls on both bulk endpoints.
    pub fn clear_stall_both(&mut self) -> CoreResult<()> {
        self.clear_stall(EP_BULK_OUT)?;
        self.clear_stall(EP_BULK_IN)
    }

    fn bulk_out(&mut self, data: &[u8]) -> CoreResult<()> {
        let mut ep: Endpoint<Bulk, Out> = self
            .interface
            .endpoint(EP_BULK_OUT)
            .map_err(|e| usb_error(EP_BULK_OUT, e))?;

        let mut buf = Buffer::new(data.len());
        buf.extend_from_slice(data);

        let completion = ep.transfer_blocking(buf, TRANSFER_TIMEOUT);
        completion
            .into_result()
            .map_err(|e| usb_error(EP_BULK_OUT, e))?;
        Ok(())
    }

    fn bulk_in(&mut self) -> CoreResult<Vec<u8>> {
        let mut ep: Endpoint<Bulk, In> = self
            .interface
            .endpoint(EP_BULK_IN)
            .map_err(|e| usb_error(EP_BULK_IN, e))?;

        let max_packet_size = ep.max_packet_size();
        let request_len = REPLY_MAX_LEN.div_ceil(max_packet_size) * max_packet_size;
        let mut buf = Buffer::new(request_len);
        buf.set_requested_len(request_len);

        let completion = ep.transfer_blocking(buf, TRANSFER_TIMEOUT);
        let data = completion
            .into_result()
            .map_err(|e| usb_error(EP_BULK_IN, e))?;
        Ok(data[..].to_vec())
    }
}

impl ProbeTransport for Fx2Probe {
    fn send_receive(&mut self, request: &Request) -> CoreResult<Reply> {
        log::trace!("request: {} byte(s)", request.len());
        self.bulk_out(request.as_bytes())?;
        let data = self.bulk_in()?;
        log::trace!("reply: {} byte(s)", data.len());
        Reply::new(data)
    }

    fn control_out(&mut self, request: u8, value: u16, index: u16, data: &[u8]) -> CoreResult<()> {
        self.interface
            .control_out(
                ControlOut {
                    control_type: ControlType::Vendor,
                    recipient: Recipient::Device,
                    request,
                    value,
                    index,
                    data,
                },
                TRANSFER_TIMEOUT,
            )
            .wait()
            .map_err(|e| usb_error(0, e))
    }

    fn control_in(&mut self, request: u8, value: u16, index: u16, len: usize) -> CoreResult<Vec<u8>> {
        let data = self
            .interface
            .control_in(
                ControlIn {
                    control_type: ControlType::Vendor,
                    recipient: Recipient::Device,
                    request,
                    value,
                    index,
                    length: len as u16,
                },
                TRANSFER_TIMEOUT,
            )
            .wait()
            .map_err(|e| usb_error(0, e))?;
        Ok(data[..].to_vec())
    }

    fn clear_stall(&mut self, endpoint: u8) -> CoreResult<()> {
        log::debug!("clearing stall on endpoint 0x{:02X}", endpoint);
        if endpoint & 0x80 != 0 {
            let mut ep: Endpoint<Bulk, In> = self
                .interface
                .endpoint(endpoint)
                .map_err(|e| usb_error(endpoint, e))?;
            ep.clear_halt().wait().map_err(|e| usb_error(endpoint, e))
        } else {
            let mut ep: Endpoint<Bulk, Out> = self
                .interface
                .endpoint(endpoint)
                .map_err(|e| usb_error(endpoint, e))?;
            ep.clear_halt().wait().map_err(|e| usb_error(endpoint, e))
        }
    }
}

fn usb_error(endpoint: u8, e: impl std::fmt::Display) -> CoreError {
    CoreError::Usb {
        endpoint,
        reason: e.to_string(),
    }
}
