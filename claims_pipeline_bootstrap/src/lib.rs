// /////////////////////////////////////////////////////////////////////////////
// Claims Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Bootstrap Module
//!
//! The bootstrap module sits **outside** the enterprise application layers
//! (domain, application, infrastructure) and provides the entry-point
//! plumbing the binary needs before any business code runs:
//!
//! - **Argument parsing** - clap-based CLI with validation
//! - **Logging init** - tracing-subscriber with `RUST_LOG`/`EnvFilter`
//! - **Signal handling** - SIGTERM/SIGINT start the draining phase
//! - **Phased shutdown** - Running → Draining → Stopped, so fetch stops
//!   before the work queue is emptied
//!
//! Enterprise layers never depend on bootstrap types except through the
//! [`shutdown::ShutdownSignal`], which is deliberately free of any domain
//! coupling.
//!
//! ## Module Structure
//!
//! - `cli` - command-line interface definition and parsing
//! - `logger` - bootstrap-phase logging abstraction
//! - `shutdown` - phased shutdown (controller + observer signals)
//! - `signals` - OS signal handling

pub mod cli;
pub mod logger;
pub mod shutdown;
pub mod signals;

use tracing_subscriber::EnvFilter;

/// Initializes the global tracing subscriber.
///
/// Filter precedence: `RUST_LOG` when set, otherwise `info` (or `debug`
/// with `--verbose`). Safe to call once per process; later calls are
/// ignored so tests can initialize freely.
pub fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
