// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Errors of the `gatehouse` binary and their process exit codes.
//!
//! | code | meaning                                 |
//! |------|-----------------------------------------|
//! | 1    | bad configuration or command-line input |
//! | 2    | startup failed (logging, state, bind)   |
//! | 3    | the server stopped abnormally           |
//! | 4    | I/O                                     |
//! | 5    | token rejected or not issuable          |
//! | 6    | API layer                               |

use gatehouse_api::auth::TokenError;
use gatehouse_api::ApiError;
use gatehouse_config::ConfigError;
use thiserror::Error;

/// Result type alias for the binary.
pub type BinResult<T> = Result<T, BinError>;

/// Errors surfaced to the operator.
#[derive(Debug, Error)]
pub enum BinError {
    /// Input the operator has to fix: flags, claims, strict validation.
    #[error("{0}")]
    Usage(String),

    /// The configuration file could not be loaded or is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Something needed before serving could not be set up.
    #[error("Startup failed: {0}")]
    Startup(String),

    /// The server task ended abnormally.
    #[error("Server failed: {0}")]
    Server(String),

    /// Reading stdin or another stream failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Issue or verification of a token failed.
    #[error("Token error: {0}")]
    Token(#[from] TokenError),

    /// The API layer refused to build or serve.
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// Another error with a note on what was being done.
    #[error("{context}: {source}")]
    Context {
        /// What was being done.
        context: String,
        /// The underlying error.
        #[source]
        source: Box<BinError>,
    },
}

impl BinError {
    /// Creates a usage error.
    pub fn usage(msg: impl Into<String>) -> Self {
        Self::Usage(msg.into())
    }

    /// Creates a startup error.
    pub fn startup(msg: impl Into<String>) -> Self {
        Self::Startup(msg.into())
    }

    /// Creates a server error.
    pub fn server(msg: impl Into<String>) -> Self {
        Self::Server(msg.into())
    }

    /// Wraps the error with what was being done.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Process exit code, see the module table.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Usage(_) | Self::Config(_) => 1,
            Self::Startup(_) => 2,
            Self::Server(_) => 3,
            Self::Io(_) => 4,
            Self::Token(_) => 5,
            Self::Api(_) => 6,
            Self::Context { source, .. } => source.exit_code(),
        }
    }
}

/// Prints the error and every cause to stderr.
pub fn report_error(error: &BinError) {
    eprintln!("error: {}", error);

    let mut cause = std::error::Error::source(error);
    while let Some(inner) = cause {
        eprintln!("  caused by: {}", inner);
        cause = inner.source();
    }
}

/// Reports the error and exits with its code.
pub fn report_error_and_exit(error: BinError) -> ! {
    report_error(&error);
    std::process::exit(error.exit_code())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_keeps_exit_code() {
        let err = BinError::from(ConfigError::file_not_found("gatehouse.yaml"))
            .with_context("Loading gatehouse.yaml");
        assert!(err.to_string().starts_with("Loading gatehouse.yaml: "));
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(BinError::usage("x").exit_code(), 1);
        assert_eq!(BinError::startup("x").exit_code(), 2);
        assert_eq!(BinError::server("x").exit_code(), 3);
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "stdin");
        assert_eq!(BinError::from(io).exit_code(), 4);
        assert_eq!(BinError::from(TokenError::Expired).exit_code(), 5);
        assert_eq!(BinError::from(ApiError::internal("bind")).exit_code(), 6);
    }
}
