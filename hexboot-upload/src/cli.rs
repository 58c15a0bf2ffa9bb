// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Command-line interface definitions.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::commands::{self, AfterUpload, SoakOptions, UploadMode, UploadOptions, DEFAULT_MAX_ERRORS};
use crate::transport::{PortSelector, DEFAULT_TIMEOUT_MS};

/// Command-line arguments.
#[derive(Parser)]
#[command(name = "hexboot-upload", version)]
#[command(about = "Intel HEX upload tool for the hexboot USB CDC agent")]
pub struct Cli {
    /// Serial port (e.g., /dev/ttyACM0). Auto-detected when omitted.
    #[arg(short, long, env = "HEXBOOT_PORT", global = true)]
    pub port: Option<String>,

    /// Reply timeout for ordinary commands
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_MS, global = true)]
    pub timeout_ms: u64,

    /// Show protocol traffic
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Subcommand)]
pub enum Commands {
    /// Print the agent version and diagnostics
    Version,

    /// Erase, upload and verify an Intel HEX image
    Upload {
        /// Intel HEX file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Skip the verify step after upload
        #[arg(long)]
        no_verify: bool,

        /// Stay in the agent after upload
        #[arg(long, conflicts_with = "reset")]
        no_jump: bool,

        /// Reset the device instead of jumping to the application
        #[arg(long)]
        reset: bool,

        /// Abort once more than this many records were rejected
        #[arg(long, default_value_t = DEFAULT_MAX_ERRORS)]
        max_errors: usize,
    },

    /// Start the application
    Jump,

    /// Reset the device
    Reset,

    /// List serial ports
    Ports,

    /// Repeat version, optional upload, jump, version and log the outcome
    Soak {
        /// Number of iterations
        #[arg(short = 'n', long, default_value_t = 10)]
        iterations: u32,

        /// Image to upload; without it every iteration only jumps
        #[arg(long, value_name = "FILE")]
        file: Option<PathBuf>,

        /// Upload on the first iteration only, or on each one
        #[arg(long, value_enum, default_value_t = UploadMode::Once)]
        upload_mode: UploadMode,

        /// Skip the verify step after each upload
        #[arg(long)]
        no_verify: bool,

        /// Abort an upload once more than this many records were rejected
        #[arg(long, default_value_t = DEFAULT_MAX_ERRORS)]
        max_errors: usize,

        /// Wait after the jump before probing the version
        #[arg(long, default_value_t = 500)]
        after_jump_delay_ms: u64,

        /// Wait between iterations
        #[arg(long, default_value_t = 500)]
        between_delay_ms: u64,

        /// Append one CSV row per iteration to this file
        #[arg(long, value_name = "PATH")]
        log_csv: Option<PathBuf>,
    },
}

/// Execute the parsed CLI command.
pub fn run(cli: Cli) -> Result<()> {
    let selector = PortSelector {
        port: cli.port,
        timeout_ms: cli.timeout_ms,
    };

    match cli.command {
        Commands::Version => commands::version(&selector),
        Commands::Upload {
            file,
            no_verify,
            no_jump,
            reset,
            max_errors,
        } => {
            let after = if reset {
                AfterUpload::Reset
            } else if no_jump {
                AfterUpload::Stay
            } else {
                AfterUpload::Jump
            };
            commands::upload(
                &selector,
                &file,
                UploadOptions {
                    verify: !no_verify,
                    after,
                    max_errors,
                },
            )
        }
        Commands::Jump => commands::jump(&selector),
        Commands::Reset => commands::reset(&selector),
        Commands::Ports => commands::ports(),
        Commands::Soak {
            iterations,
            file,
            upload_mode,
            no_verify,
            max_errors,
            after_jump_delay_ms,
            between_delay_ms,
            log_csv,
        } => commands::soak(
            &selector,
            &SoakOptions {
                iterations,
                image: file,
                upload_mode,
                verify: !no_verify,
                max_errors,
                after_jump_delay: Duration::from_millis(after_jump_delay_ms),
                between_iter_delay: Duration::from_millis(between_delay_ms),
                csv_log: log_csv,
            },
        ),
    }
}
