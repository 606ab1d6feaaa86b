//! FX2 firmware bootstrap
//!
//! An unconfigured probe is a bare FX2: hold the 8051 in reset via CPUCS,
//! stream the firmware hex image into RAM with RW_RAM control transfers,
//! release the CPU and give the device time to drop off the bus and come
//! back under the configured VID:PID.

use psocprog_core::hex::HexImage;
use psocprog_core::transport::ProbeTransport;

use crate::device::{Fx2Probe, ProbeConfig};
use crate::error::{ProbeError, Result};
use crate::protocol::*;

/// Upload the bridge firmware into an unconfigured probe.
pub fn configure(config: &ProbeConfig) -> Result<()> {
    let mut probe = Fx2Probe::open_vid_pid(config.vid_unconfigured, config.pid_unconfigured)?
        .ok_or(ProbeError::NotFound)?;

    log::info!(
        "loading FX2 firmware from {}",
        config.fx2_firmware.display()
    );
    let image = HexImage::read_file(&config.fx2_firmware, 0)?;
    let blocks = prepare_firmware(&image)?;

    // hold the 8051 while its RAM is rewritten
    probe
        .control_out(REQ_FX2_RW_RAM, REG_FX2_CPUCS, 0, &[CPUCS_HOLD_RESET])
        .map_err(|e| ProbeError::ConfigureFailed(e.to_string()))?;

    for (address, data) in &blocks {
        log::debug!("RW_RAM 0x{:04X}, {} byte(s)", address, data.len());
        probe
            .control_out(REQ_FX2_RW_RAM, *address, 0, data)
            .map_err(|e| ProbeError::ConfigureFailed(e.to_string()))?;
    }

    probe
        .control_out(REQ_FX2_RW_RAM, REG_FX2_CPUCS, 0, &[CPUCS_RUN])
        .map_err(|e| ProbeError::ConfigureFailed(e.to_string()))?;
    drop(probe);

    log::info!("firmware released; waiting for re-enumeration");
    std::thread::sleep(CONFIGURE_SETTLE);
    Ok(())
}

/// Coalesce and chunk the firmware image into RW_RAM-sized writes, checking
/// every block fits the FX2's 16-bit RAM address space.
fn prepare_firmware(image: &HexImage) -> Result<Vec<(u16, Vec<u8>)>> {
    let shaped = image.canonicalize().reshape(MAX_FIRMWARE_CHUNK);

    shaped
        .blocks()
        .iter()
        .map(|block| {
            if block.end_address() > 0x1_0000 {
                return Err(ProbeError::Firmware(format!(
                    "block at 0x{:08X} is outside FX2 RAM",
                    block.base_address
                )));
            }
            Ok((block.base_address as u16, block.data.clone()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepare_firmware_chunks_and_merges() {
        let mut image = HexImage::new();
        // records as a hex file would deliver them: small and contiguous
        for i in 0..200u32 {
            image.add(i * 16, vec![i as u8; 16]);
        }
        let blocks = prepare_firmware(&image).unwrap();
        // 3200 contiguous bytes -> one 2048 chunk + remainder
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].0, 0);
        assert_eq!(blocks[0].1.len(), MAX_FIRMWARE_CHUNK);
        assert_eq!(blocks[1].0, MAX_FIRMWARE_CHUNK as u16);
        assert_eq!(blocks[1].1.len(), 3200 - MAX_FIRMWARE_CHUNK);
    }

    #[test]
    fn test_prepare_firmware_rejects_high_addresses() {
        let mut image = HexImage::new();
        image.add(0x2_0000, vec![1, 2, 3]);
        assert!(matches!(
            prepare_firmware(&image),
            Err(ProbeError::Firmware(_))
        ));
    }
}
