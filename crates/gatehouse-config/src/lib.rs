// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # gatehouse-config
//!
//! Configuration schema and loader for the gatehouse service.
//!
//! - **Multi-Format Support**: YAML, TOML and JSON, chosen by extension
//! - **Placeholders**: `${VAR}` and `${VAR:default}` in the raw file
//! - **Environment Overrides**: `GATEHOUSE_*` variables win over the file
//!
//! ## Quick Start
//!
//! ```no_run
//! use gatehouse_config::load_config;
//!
//! let config = load_config("gatehouse.yaml").unwrap();
//! println!("Users: {}", config.directory.users.len());
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod error;
pub mod loader;
pub mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{load_config, load_config_str, ConfigFormat, ConfigLoader, ConfigLoaderBuilder};
pub use schema::{GatehouseConfig, LogFormat, LogLevel, LoggingConfig};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
