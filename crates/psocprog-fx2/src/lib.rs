//! psocprog-fx2 - FX2-based USB debug probe support
//!
//! The programmer hardware is a Cypress FX2 bridge between host USB and the
//! target's SWD pins. A factory-fresh probe enumerates as an unconfigured
//! FX2 (no firmware in RAM); this crate uploads the bridge firmware over
//! vendor control transfers, waits for re-enumeration and then talks the
//! request/reply protocol over one bulk OUT / bulk IN endpoint pair.
//!
//! # Example
//!
//! ```no_run
//! use psocprog_fx2::{Fx2Probe, ProbeConfig};
//!
//! let probe = Fx2Probe::open(&ProbeConfig::default())?;
//! // hand the probe to a psocprog_core::swd::TargetSession
//! # Ok::<(), psocprog_fx2::ProbeError>(())
//! ```

mod bootstrap;
mod device;
mod error;
mod protocol;

pub use device::{Fx2Probe, ProbeConfig};
pub use error::{ProbeError, Result};
