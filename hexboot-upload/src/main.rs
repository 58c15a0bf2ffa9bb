// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Intel HEX upload tool for the hexboot agent via USB CDC.
//!
//! Usage:
//!   hexboot-upload --port /dev/ttyACM0 version
//!   hexboot-upload --port /dev/ttyACM0 upload firmware.hex
//!   hexboot-upload upload firmware.hex --no-jump
//!   hexboot-upload soak -n 50 --file firmware.hex --log-csv soak.csv

mod cli;
mod commands;
mod hexfile;
mod transport;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() -> Result<()> {
    let args = cli::Cli::parse();

    let default_level = if args.verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    cli::run(args)
}
