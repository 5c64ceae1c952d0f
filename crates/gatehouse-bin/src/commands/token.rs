// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Implementation of the `token` commands.

use std::io::Read;

use chrono::{DateTime, Utc};
use gatehouse_api::auth::{
    StaticDirectory, TokenClaims, TokenKind, TokenService, UserId, ROLE_CLAIM,
};
use gatehouse_config::{ConfigLoader, GatehouseConfig};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::cli::{Cli, InspectArgs, IssueArgs, OutputFormat, TokenCommand};
use crate::error::{BinError, BinResult};

/// Dispatches `token issue` and `token inspect`.
pub fn token(cli: &Cli, command: TokenCommand) -> BinResult<()> {
    let config = super::load_config(ConfigLoader::new(), cli)?;

    match command {
        TokenCommand::Issue(args) => {
            let format = args.format;
            let issued = issue_token(&config, &args, Utc::now())?;
            match format {
                OutputFormat::Text => println!("{}", issued.token),
                OutputFormat::Json => println!("{}", to_pretty(&issued)),
            }
        }
        TokenCommand::Inspect(args) => {
            let raw = read_token(&args)?;
            let inspection = inspect_token(&config, &raw, Utc::now())?;
            match args.format {
                OutputFormat::Text => print_inspection(&inspection),
                OutputFormat::Json => println!("{}", to_pretty(&inspection)),
            }
        }
    }

    Ok(())
}

// =============================================================================
// Issue
// =============================================================================

/// A freshly signed token.
#[derive(Debug, Serialize)]
pub struct IssuedToken {
    /// The encoded token.
    pub token: String,
    /// `access` or `refresh`.
    pub kind: TokenKind,
    /// User id in the `uid` claim.
    pub user_id: UserId,
    /// Expiry instant.
    pub expires_at: DateTime<Utc>,
}

/// Signs a token with the configured secret.
///
/// Without `--user-id` the user is looked up by name in the configured
/// directory, which also supplies the default role.
pub fn issue_token(
    config: &GatehouseConfig,
    args: &IssueArgs,
    now: DateTime<Utc>,
) -> BinResult<IssuedToken> {
    let service = TokenService::new(config.api.token.clone())?;
    let directory = StaticDirectory::from_seed(config.directory.clone());
    let known = directory.find_user(&args.username);

    let user_id = match (args.user_id, known) {
        (Some(id), _) => id,
        (None, Some(user)) => user.id,
        (None, None) => {
            return Err(BinError::usage(format!(
                "user '{}' is not in the directory; pass --user-id",
                args.username
            )))
        }
    };

    let mut extra = Map::new();
    for raw in &args.claims {
        let (key, value) = parse_claim(raw)?;
        extra.insert(key, value);
    }

    let role = args
        .role
        .clone()
        .or_else(|| known.and_then(|u| u.primary_role()).map(str::to_string));
    if let Some(role) = role {
        extra.insert(ROLE_CLAIM.to_string(), Value::String(role));
    }

    let kind = if args.refresh {
        TokenKind::Refresh
    } else {
        TokenKind::Access
    };
    let token = service.issue_at(kind, user_id, &args.username, extra, now)?;
    let expires_at = now + chrono::Duration::seconds(config.api.token.ttl_secs(kind));

    Ok(IssuedToken {
        token,
        kind,
        user_id,
        expires_at,
    })
}

/// Parses `key=value`. The value is read as JSON when it parses, otherwise it
/// is kept as a string, so `level=3` yields a number and `tenant=acme` a
/// string.
pub fn parse_claim(raw: &str) -> BinResult<(String, Value)> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| BinError::usage(format!("claim '{}' is not key=value", raw)))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(BinError::usage(format!("claim '{}' has an empty key", raw)));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

// =============================================================================
// Inspect
// =============================================================================

/// A verified token and its timing.
#[derive(Debug, Serialize)]
pub struct Inspection {
    /// Decoded claims.
    pub claims: TokenClaims,
    /// Issue instant.
    pub issued_at: DateTime<Utc>,
    /// Expiry instant.
    pub expires_at: DateTime<Utc>,
    /// Seconds until expiry.
    pub remaining_secs: u64,
    /// Whether a client should refresh now.
    pub expiring_soon: bool,
}

/// Verifies a token against the configured secret and issuer.
pub fn inspect_token(
    config: &GatehouseConfig,
    raw: &str,
    now: DateTime<Utc>,
) -> BinResult<Inspection> {
    let service = TokenService::new(config.api.token.clone())?;
    let claims = service.validate_at(raw.trim(), now)?;

    Ok(Inspection {
        issued_at: claims.issued_at(),
        expires_at: claims.expires_at(),
        remaining_secs: claims.remaining_at(now).as_secs(),
        expiring_soon: service.is_expiring_soon_at(&claims, now),
        claims,
    })
}

fn read_token(args: &InspectArgs) -> BinResult<String> {
    match (&args.token, args.stdin) {
        (Some(token), false) => Ok(token.clone()),
        _ => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            Ok(buf.trim().to_string())
        }
    }
}

fn print_inspection(inspection: &Inspection) {
    let claims = &inspection.claims;
    println!("Token is valid");
    println!();
    println!("  Subject:     {}", claims.sub);
    println!("  User id:     {}", claims.uid);
    println!("  Kind:        {}", claims.kind.as_str());
    println!("  Role:        {}", claims.role().unwrap_or("-"));
    println!("  Issuer:      {}", claims.iss);
    println!("  Issued at:   {}", inspection.issued_at.to_rfc3339());
    println!("  Expires at:  {}", inspection.expires_at.to_rfc3339());
    println!(
        "  Remaining:   {}s{}",
        inspection.remaining_secs,
        if inspection.expiring_soon { " (expiring soon)" } else { "" }
    );
    for (key, value) in claims.extra.iter().filter(|(k, _)| *k != ROLE_CLAIM) {
        println!("  {:<12} {}", format!("{}:", key), value);
    }
}

fn to_pretty<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "(serialization error)".to_string())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use gatehouse_api::auth::{TokenConfig, TokenError, UserRecord};

    fn config() -> GatehouseConfig {
        let mut config = GatehouseConfig::default();
        config.api = config
            .api
            .with_token(TokenConfig::new("cli-token-test-secret-long-enough!!"));
        config.directory.users.push(UserRecord {
            id: 7,
            username: "alice".to_string(),
            roles: vec!["analyst".to_string(), "viewer".to_string()],
        });
        config
    }

    fn issue_args(username: &str) -> IssueArgs {
        IssueArgs {
            username: username.to_string(),
            user_id: None,
            role: None,
            refresh: false,
            claims: Vec::new(),
            format: OutputFormat::Text,
        }
    }

    #[test]
    fn test_issue_from_directory() {
        let config = config();
        let now = DateTime::from_timestamp(Utc::now().timestamp(), 0).unwrap();
        let issued = issue_token(&config, &issue_args("alice"), now).unwrap();
        assert_eq!(issued.user_id, 7);
        assert_eq!(issued.kind, TokenKind::Access);

        let inspection = inspect_token(&config, &issued.token, now).unwrap();
        assert_eq!(inspection.claims.sub, "alice");
        assert_eq!(inspection.claims.role(), Some("analyst"));
        assert_eq!(inspection.remaining_secs, 2 * 3600);
        assert!(!inspection.expiring_soon);
    }

    #[test]
    fn test_issue_unknown_user_needs_id() {
        let config = config();
        assert!(issue_token(&config, &issue_args("mallory"), Utc::now()).is_err());

        let mut args = issue_args("mallory");
        args.user_id = Some(99);
        args.role = Some("auditor".to_string());
        args.claims = vec!["tenant=acme".to_string(), "level=3".to_string()];
        args.refresh = true;

        let now = Utc::now();
        let issued = issue_token(&config, &args, now).unwrap();
        let claims = inspect_token(&config, &issued.token, now).unwrap().claims;
        assert_eq!(claims.uid, 99);
        assert_eq!(claims.kind, TokenKind::Refresh);
        assert_eq!(claims.role(), Some("auditor"));
        assert_eq!(claims.claim("tenant"), Some(&Value::from("acme")));
        assert_eq!(claims.claim("level"), Some(&Value::from(3)));
    }

    #[test]
    fn test_reserved_claim_rejected() {
        let mut args = issue_args("alice");
        args.claims = vec!["exp=1".to_string()];
        let err = issue_token(&config(), &args, Utc::now()).unwrap_err();
        assert_eq!(err.exit_code(), 5);
    }

    #[test]
    fn test_inspect_expired() {
        let config = config();
        let then = Utc::now() - chrono::Duration::days(1);
        let issued = issue_token(&config, &issue_args("alice"), then).unwrap();
        let err = inspect_token(&config, &issued.token, Utc::now()).unwrap_err();
        assert!(matches!(err, BinError::Token(TokenError::Expired)));
    }

    #[test]
    fn test_parse_claim() {
        assert_eq!(
            parse_claim("tenant=acme").unwrap(),
            ("tenant".to_string(), Value::from("acme"))
        );
        assert_eq!(
            parse_claim("flags=[1,2]").unwrap().1,
            serde_json::json!([1, 2])
        );
        assert!(parse_claim("novalue").is_err());
        assert!(parse_claim("=x").is_err());
    }
}
