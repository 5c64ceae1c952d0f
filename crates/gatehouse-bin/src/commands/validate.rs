// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Implementation of the `validate` command.

use gatehouse_config::{ConfigLoader, GatehouseConfig};

use crate::cli::{Cli, OutputFormat, ValidateArgs};
use crate::error::{BinError, BinResult};

/// Loads and checks the configuration without starting the server.
pub fn validate(cli: &Cli, args: ValidateArgs) -> BinResult<()> {
    let source = cli
        .config_path()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "(defaults and environment)".to_string());

    let config = super::load_config(ConfigLoader::new(), cli)?;
    let warnings = config.warnings();

    match args.format {
        OutputFormat::Text => print_text(&source, &config, &warnings, args.show_config),
        OutputFormat::Json => {
            let output = serde_json::json!({
                "valid": true,
                "source": source,
                "summary": summary(&config),
                "warnings": warnings,
                "config": if args.show_config { Some(&config) } else { None },
            });
            println!("{}", to_pretty(&output));
        }
    }

    if args.strict && !warnings.is_empty() {
        return Err(BinError::usage(format!(
            "Strict mode: {} warning(s) found",
            warnings.len()
        )));
    }

    Ok(())
}

fn summary(config: &GatehouseConfig) -> serde_json::Value {
    let api = &config.api;
    serde_json::json!({
        "listen": api.socket_addr().to_string(),
        "base_path": api.normalized_base_path(),
        "users": config.directory.users.len(),
        "roles": config.directory.roles.len(),
        "operations": api.operations.operations(),
        "rate_limit_enabled": api.rate_limit.enabled,
        "rbac_ttl": format!("{:?}", api.rbac.ttl),
    })
}

fn print_text(source: &str, config: &GatehouseConfig, warnings: &[String], show_config: bool) {
    let api = &config.api;
    println!("Configuration is valid: {}", source);
    println!();
    println!("Summary:");
    println!("  Listen:      {}", api.socket_addr());
    println!("  Base path:   {}", api.normalized_base_path());
    println!("  Users:       {}", config.directory.users.len());
    println!("  Roles:       {}", config.directory.roles.len());
    println!("  Operations:  {}", api.operations.operations().join(", "));
    println!(
        "  Rate limit:  {}",
        if api.rate_limit.enabled { "enabled" } else { "disabled" }
    );

    if !warnings.is_empty() {
        println!();
        println!("Warnings:");
        for warning in warnings {
            println!("  - {}", warning);
        }
    }

    if show_config {
        println!();
        println!("Parsed configuration:");
        println!("{}", to_pretty(config));
    }
}

fn to_pretty<T: serde::Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "(serialization error)".to_string())
}
