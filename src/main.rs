//! psocprog - PSoC 5 programmer for the FX2-based USB debug probe
//!
//! Flashes firmware, configuration, protection, EEPROM and the non-volatile
//! latches of PSoC 5 parts through a Cypress DVKProg-style probe.

mod cli;
mod commands;
mod config;

use clap::Parser;
use cli::{Cli, Commands};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.verbose {
        0 => {} // default (info)
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    let device = cli.device.as_deref();
    let config_dir = cli.config_dir.as_path();

    let result = match &cli.command {
        Commands::Program {
            file,
            force_nvl_write,
        } => commands::run_program(config_dir, device, file, *force_nvl_write),
        Commands::Upload { file, no_trim } => {
            commands::run_upload(config_dir, device, file, *no_trim)
        }
        Commands::Verify { file } => commands::run_verify(config_dir, device, file),
        Commands::Info { file } => commands::run_info(file),
        Commands::Reset => commands::run_reset(config_dir),
        Commands::Erase => commands::run_erase(config_dir),
        Commands::Id => commands::run_id(config_dir),
        Commands::UsbClear => commands::run_usb_clear(config_dir),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
