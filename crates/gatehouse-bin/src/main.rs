// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Gatehouse binary entry point.

use gatehouse_bin::error::report_error_and_exit;
use gatehouse_bin::{commands, init_logging, Cli};
use gatehouse_config::ConfigLoader;

#[tokio::main]
async fn main() {
    let cli = Cli::parse_args();

    // Logging settings may live in the file; a failed read is reported by
    // the command itself.
    let file_logging = cli.config_path().and_then(|path| {
        ConfigLoader::new()
            .with_validation(false)
            .load(path)
            .ok()
            .map(|c| c.logging)
    });

    let level = cli.effective_log_level(file_logging.as_ref());
    let format = cli.effective_log_format(file_logging.as_ref());
    if let Err(e) = init_logging(&level, format) {
        report_error_and_exit(e);
    }

    if let Err(e) = commands::execute(cli).await {
        report_error_and_exit(e);
    }
}
