//! CLI argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "psocprog")]
#[command(author, version, about = "PSoC 5 programmer for the FX2-based debug probe", long_about = None)]
pub struct Cli {
    /// Configuration directory (config.ini, devices.dat, FX2 firmware)
    #[arg(short = 'C', long, default_value = "config", global = true)]
    pub config_dir: PathBuf,

    /// Device name (section in devices.dat)
    #[arg(short = 'd', long, global = true)]
    pub device: Option<String>,

    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Program a hex file into the device
    Program {
        /// Application hex file
        file: PathBuf,

        /// Commit WOL/DEVCONFIG latches that differ from the device.
        /// The latches endure only ~100 writes; off by default.
        #[arg(long)]
        force_nvl_write: bool,
    },

    /// Read the device and save it as a hex file
    Upload {
        /// Output hex file
        file: PathBuf,

        /// Keep all-zero flash and EEPROM rows in the output
        #[arg(long)]
        no_trim: bool,
    },

    /// Verify the device against a hex file
    Verify {
        /// Application hex file
        file: PathBuf,
    },

    /// Print a summary of a hex file without touching the device
    Info {
        /// Application hex file
        file: PathBuf,
    },

    /// Reset the target CPU
    Reset,

    /// Erase all flash
    Erase,

    /// Read and print the JTAG id
    Id,

    /// Clear stalled USB endpoints on the probe
    #[command(name = "usb_clear")]
    UsbClear,
}
