// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # gatehouse-bin
//!
//! The `gatehouse` command-line entry point.
//!
//! ## Usage
//!
//! ```bash
//! # Start the server (default command)
//! gatehouse -c /etc/gatehouse/gatehouse.yaml
//!
//! # Check a configuration before deploying it
//! gatehouse validate --strict
//!
//! # Mint a token for a directory user, then decode it
//! gatehouse token issue -u alice
//! gatehouse token inspect <TOKEN>
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod cli;
pub mod commands;
pub mod error;
pub mod logging;
pub mod runtime;
pub mod shutdown;

pub use cli::{Cli, Commands};
pub use error::{BinError, BinResult};
pub use logging::init_logging;
pub use runtime::{RuntimeBuilder, ServiceRuntime};
pub use shutdown::ShutdownCoordinator;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
