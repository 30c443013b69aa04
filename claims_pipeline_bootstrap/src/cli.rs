// /////////////////////////////////////////////////////////////////////////////
// Claims Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Command-Line Interface
//!
//! Bootstrap-layer CLI for the ingestion pipeline binary.
//!
//! ## Commands
//!
//! ```bash
//! # Run the ingestion service (fetch adapters per configured source mode)
//! claims_pipeline serve
//!
//! # Push one local XML file through the pipeline and exit
//! claims_pipeline ingest-file path/to/submission.xml
//!
//! # Re-encrypt facility credentials whose key id is not the active one
//! claims_pipeline rotate-keys
//!
//! # Load and validate configuration, print the effective settings
//! claims_pipeline validate-config
//! ```
//!
//! Paths given to `ingest-file` are validated here (existence, `.xml`-ish
//! plausibility) so the application layer can assume sane inputs.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Parse errors surfaced by CLI validation.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("input file {0} does not exist or is not a file")]
    MissingInput(PathBuf),
}

#[derive(Debug, Parser)]
#[command(name = "claims_pipeline", version, about = "Healthcare claim XML ingestion pipeline")]
pub struct Cli {
    /// Path to a configuration file (defaults to claims_pipeline.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug-level logging (RUST_LOG overrides this).
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the ingestion service until interrupted.
    Serve,
    /// Ingest one local XML file and exit.
    IngestFile {
        /// Path to the submission or remittance XML document.
        input: PathBuf,
    },
    /// Re-encrypt facility credentials under the active key id.
    RotateKeys,
    /// Load, validate, and print the effective configuration.
    ValidateConfig,
}

/// Parses and validates CLI arguments.
pub fn parse_and_validate() -> Result<Cli, CliError> {
    let cli = Cli::parse();
    validate(&cli)?;
    Ok(cli)
}

fn validate(cli: &Cli) -> Result<(), CliError> {
    if let Command::IngestFile { input } = &cli.command {
        if !input.is_file() {
            return Err(CliError::MissingInput(input.clone()));
        }
    }
    Ok(())
}
