// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Service runtime orchestration.
//!
//! Builds the API server from a loaded [`GatehouseConfig`], serves until a
//! shutdown signal arrives, then gives in-flight requests up to
//! `api.shutdown_timeout` to finish.

use std::path::{Path, PathBuf};

use gatehouse_api::ApiServerBuilder;
use gatehouse_config::{ConfigLoader, GatehouseConfig};
use tracing::{info, warn};

use crate::error::{BinError, BinResult};
use crate::shutdown::ShutdownCoordinator;

// =============================================================================
// ServiceRuntime
// =============================================================================

/// Runs the gatehouse server.
pub struct ServiceRuntime {
    config: GatehouseConfig,
    shutdown: ShutdownCoordinator,
}

impl ServiceRuntime {
    /// Creates a runtime for a loaded configuration.
    pub fn new(config: GatehouseConfig) -> Self {
        Self {
            config,
            shutdown: ShutdownCoordinator::new(),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &GatehouseConfig {
        &self.config
    }

    /// Returns a handle that can stop the runtime.
    pub fn shutdown_handle(&self) -> ShutdownCoordinator {
        self.shutdown.clone()
    }

    /// Runs the server until shutdown is signaled.
    pub async fn run(self) -> BinResult<()> {
        let api = self.config.api.clone();
        let drain = api.shutdown_timeout;

        let server = ApiServerBuilder::new()
            .config(api)
            .seed(self.config.directory.clone())
            .build()
            .map_err(|e| BinError::startup(e.to_string()))?;

        info!(
            version = gatehouse_api::VERSION,
            addr = %server.addr(),
            users = self.config.directory.users.len(),
            "Starting gatehouse"
        );

        let mut serving = tokio::spawn(server.run_with_shutdown(self.shutdown.shutdown_signal()));

        tokio::select! {
            joined = &mut serving => {
                // The server stopped on its own, usually a bind failure.
                return flatten(joined);
            }
            _ = self.shutdown.wait_for_shutdown() => {}
        }

        info!(timeout = ?drain, "Draining in-flight requests");
        match tokio::time::timeout(drain, &mut serving).await {
            Ok(joined) => flatten(joined)?,
            Err(_) => {
                warn!("Shutdown timeout elapsed; aborting open connections");
                serving.abort();
            }
        }

        info!("Gatehouse shutdown complete");
        Ok(())
    }
}

fn flatten(
    joined: Result<gatehouse_api::ApiResult<()>, tokio::task::JoinError>,
) -> BinResult<()> {
    match joined {
        Ok(result) => result.map_err(BinError::from),
        Err(e) => Err(BinError::server(format!("Server task failed: {}", e))),
    }
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for constructing the service runtime.
#[derive(Default)]
pub struct RuntimeBuilder {
    config_path: Option<PathBuf>,
    config: Option<GatehouseConfig>,
    port: Option<u16>,
}

impl RuntimeBuilder {
    /// Creates a new runtime builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the configuration file path.
    pub fn config_path(mut self, path: Option<impl AsRef<Path>>) -> Self {
        self.config_path = path.map(|p| p.as_ref().to_path_buf());
        self
    }

    /// Sets the configuration directly.
    pub fn config(mut self, config: GatehouseConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Overrides the listen port.
    pub fn port(mut self, port: Option<u16>) -> Self {
        self.port = port;
        self
    }

    /// Builds the runtime.
    ///
    /// Without a file, the configuration comes from defaults and `GATEHOUSE_*`
    /// variables alone.
    pub fn build(self) -> BinResult<ServiceRuntime> {
        let mut config = match (self.config, self.config_path) {
            (Some(config), _) => config,
            (None, Some(path)) => ConfigLoader::new()
                .load(&path)
                .map_err(|e| BinError::from(e).with_context(format!("Loading {}", path.display())))?,
            (None, None) => {
                info!("No configuration file; using defaults and environment");
                ConfigLoader::new().load_defaults()?
            }
        };

        if let Some(port) = self.port {
            config.api.port = port;
        }

        Ok(ServiceRuntime::new(config))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use gatehouse_api::auth::TokenConfig;
    use std::time::Duration;

    fn test_config() -> GatehouseConfig {
        let mut config = GatehouseConfig::default();
        config.api = config
            .api
            .with_host("127.0.0.1".parse().unwrap())
            .with_port(0)
            .with_token(TokenConfig::new("runtime-test-secret-long-enough!!!"));
        config.api.shutdown_timeout = Duration::from_secs(1);
        config
    }

    #[test]
    fn test_builder_port_override() {
        let runtime = RuntimeBuilder::new()
            .config(test_config())
            .port(Some(9999))
            .build()
            .unwrap();
        assert_eq!(runtime.config().api.port, 9999);
    }

    #[test]
    fn test_builder_missing_file() {
        let result = RuntimeBuilder::new()
            .config_path(Some("/nonexistent/gatehouse.yaml"))
            .build();
        assert_eq!(result.err().map(|e| e.exit_code()), Some(1));
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let runtime = RuntimeBuilder::new().config(test_config()).build().unwrap();
        let handle = runtime.shutdown_handle();

        let task = tokio::spawn(runtime.run());
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.initiate_shutdown();

        let result = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("runtime should stop")
            .unwrap();
        assert!(result.is_ok());
    }
}
