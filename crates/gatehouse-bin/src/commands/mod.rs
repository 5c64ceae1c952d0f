// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! CLI command implementations.

mod run;
mod token;
mod validate;
mod version;

pub use run::run;
pub use token::{inspect_token, issue_token, parse_claim, token, Inspection, IssuedToken};
pub use validate::validate;
pub use version::version;

use gatehouse_config::{ConfigLoader, GatehouseConfig};

use crate::cli::{Cli, Commands};
use crate::error::{BinError, BinResult};

/// Executes the appropriate command based on CLI arguments.
pub async fn execute(cli: Cli) -> BinResult<()> {
    match cli.effective_command() {
        Commands::Run(args) => run::run(&cli, args).await,
        Commands::Validate(args) => validate::validate(&cli, args),
        Commands::Token(command) => token::token(&cli, command),
        Commands::Version => version::version(&cli),
    }
}

/// Loads the configuration named on the command line, or defaults plus
/// environment when there is none.
pub(crate) fn load_config(loader: ConfigLoader, cli: &Cli) -> BinResult<GatehouseConfig> {
    match cli.config_path() {
        Some(path) => loader
            .load(&path)
            .map_err(|e| BinError::from(e).with_context(format!("Loading {}", path.display()))),
        None => Ok(loader.load_defaults()?),
    }
}
