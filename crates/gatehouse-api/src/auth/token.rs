// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Bearer token issuing and validation.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

use super::{TokenClaims, TokenKind, UserId, RESERVED_CLAIMS};

// =============================================================================
// TokenError
// =============================================================================

/// Reasons a token could not be issued or accepted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    /// Issue was called with unusable input.
    #[error("invalid token input: {0}")]
    InvalidInput(String),

    /// The token could not be decoded.
    #[error("malformed token: {0}")]
    Malformed(String),

    /// The token decoded but its signature does not verify.
    #[error("token signature mismatch")]
    SignatureMismatch,

    /// The token verified but `now` is at or past its expiry.
    #[error("token expired")]
    Expired,

    /// The signer rejected the claim set.
    #[error("token encoding failed: {0}")]
    Encoding(String),
}

impl TokenError {
    /// Short tag for structured logs.
    pub fn reason(&self) -> &'static str {
        match self {
            TokenError::InvalidInput(_) => "invalid_input",
            TokenError::Malformed(_) => "malformed",
            TokenError::SignatureMismatch => "signature_mismatch",
            TokenError::Expired => "expired",
            TokenError::Encoding(_) => "encoding",
        }
    }
}

// =============================================================================
// TokenConfig
// =============================================================================

/// Longest accepted token lifetime.
pub const MAX_TTL_SECS: i64 = 10 * 365 * 86400;

/// Whole seconds of `d`, saturating at `i64::MAX`.
fn whole_secs(d: Duration) -> i64 {
    i64::try_from(d.as_secs()).unwrap_or(i64::MAX)
}

/// Token configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenConfig {
    /// Secret key for signing tokens.
    #[serde(skip_serializing)]
    pub secret: String,
    /// Token issuer, checked on validation.
    pub issuer: String,
    /// Access token lifetime in seconds.
    pub access_ttl_secs: i64,
    /// Refresh token lifetime in seconds.
    pub refresh_ttl_secs: i64,
    /// Remaining lifetime under which callers are advised to refresh.
    pub refresh_threshold_secs: i64,
    /// Algorithm to use for signing.
    #[serde(with = "algorithm_serde")]
    pub algorithm: Algorithm,
    /// Clock skew tolerance added to the expiry check.
    pub leeway_secs: u64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            secret: String::new(), // Must be set by user
            issuer: "gatehouse".to_string(),
            access_ttl_secs: 2 * 3600,
            refresh_ttl_secs: 7 * 86400,
            refresh_threshold_secs: 600,
            algorithm: Algorithm::HS256,
            leeway_secs: 0,
        }
    }
}

impl TokenConfig {
    /// Creates a new configuration with the given secret.
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            ..Default::default()
        }
    }

    /// Sets the issuer.
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = issuer.into();
        self
    }

    /// Sets the access token lifetime.
    pub fn with_access_ttl(mut self, ttl: Duration) -> Self {
        self.access_ttl_secs = whole_secs(ttl);
        self
    }

    /// Sets the refresh token lifetime.
    pub fn with_refresh_ttl(mut self, ttl: Duration) -> Self {
        self.refresh_ttl_secs = whole_secs(ttl);
        self
    }

    /// Sets the "expiring soon" threshold.
    pub fn with_refresh_threshold(mut self, threshold: Duration) -> Self {
        self.refresh_threshold_secs = whole_secs(threshold);
        self
    }

    /// Returns the lifetime in seconds for a token kind.
    pub fn ttl_secs(&self, kind: TokenKind) -> i64 {
        match kind {
            TokenKind::Access => self.access_ttl_secs,
            TokenKind::Refresh => self.refresh_ttl_secs,
        }
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), TokenError> {
        if self.secret.is_empty() {
            return Err(TokenError::InvalidInput(
                "token secret is not configured".to_string(),
            ));
        }
        if self.secret.len() < 32 {
            tracing::warn!("Token secret is shorter than recommended (32 bytes)");
        }
        if self.access_ttl_secs <= 0 || self.refresh_ttl_secs <= 0 {
            return Err(TokenError::InvalidInput(
                "token lifetimes must be positive".to_string(),
            ));
        }
        if self.access_ttl_secs > MAX_TTL_SECS || self.refresh_ttl_secs > MAX_TTL_SECS {
            return Err(TokenError::InvalidInput(
                "token lifetimes must not exceed ten years".to_string(),
            ));
        }
        if self.refresh_threshold_secs < 0 {
            return Err(TokenError::InvalidInput(
                "refresh threshold must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// TokenService
// =============================================================================

/// Issues and validates bearer tokens.
///
/// Validation is a pure function of the token and the current time; the
/// `*_at` variants take the time explicitly.
#[derive(Clone)]
pub struct TokenService {
    config: Arc<TokenConfig>,
    encoding_key: Arc<EncodingKey>,
    decoding_key: Arc<DecodingKey>,
    validation: Arc<Validation>,
}

impl TokenService {
    /// Creates a new token service with the given configuration.
    pub fn new(config: TokenConfig) -> Result<Self, TokenError> {
        config.validate()?;

        let encoding_key = EncodingKey::from_secret(config.secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.secret.as_bytes());

        // Expiry is checked against an explicit clock in `validate_at`.
        let mut validation = Validation::new(config.algorithm);
        validation.set_issuer(&[&config.issuer]);
        validation.set_required_spec_claims(&["exp", "sub", "iss"]);
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.leeway = 0;

        Ok(Self {
            config: Arc::new(config),
            encoding_key: Arc::new(encoding_key),
            decoding_key: Arc::new(decoding_key),
            validation: Arc::new(validation),
        })
    }

    /// Issues a token of `kind` for a user.
    pub fn issue(
        &self,
        kind: TokenKind,
        user_id: UserId,
        username: &str,
        extra: Map<String, Value>,
    ) -> Result<String, TokenError> {
        self.issue_at(kind, user_id, username, extra, Utc::now())
    }

    /// Issues a token as if the current time were `now`.
    pub fn issue_at(
        &self,
        kind: TokenKind,
        user_id: UserId,
        username: &str,
        extra: Map<String, Value>,
        now: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        if username.trim().is_empty() {
            return Err(TokenError::InvalidInput("username is empty".to_string()));
        }
        if user_id < 0 {
            return Err(TokenError::InvalidInput(format!(
                "user id must not be negative, got {}",
                user_id
            )));
        }
        if let Some(key) = extra.keys().find(|k| RESERVED_CLAIMS.contains(&k.as_str())) {
            return Err(TokenError::InvalidInput(format!(
                "extra claim `{}` shadows a reserved claim",
                key
            )));
        }

        let iat = now.timestamp();
        let claims = TokenClaims {
            sub: username.to_string(),
            uid: user_id,
            kind,
            iat,
            exp: iat.saturating_add(self.config.ttl_secs(kind)),
            iss: self.config.issuer.clone(),
            jti: Uuid::now_v7().to_string(),
            extra,
        };

        encode(&Header::new(self.config.algorithm), &claims, &self.encoding_key)
            .map_err(|e| TokenError::Encoding(e.to_string()))
    }

    /// Validates a token against the current time.
    pub fn validate(&self, token: &str) -> Result<TokenClaims, TokenError> {
        self.validate_at(token, Utc::now())
    }

    /// Validates a token against `now`.
    ///
    /// Rejects as expired when `now` is at or past `exp` (plus leeway).
    pub fn validate_at(&self, token: &str, now: DateTime<Utc>) -> Result<TokenClaims, TokenError> {
        let claims = self.verify(token)?;
        if claims.is_expired_at(now, self.leeway()) {
            return Err(TokenError::Expired);
        }
        Ok(claims)
    }

    /// Time until the token expires, clamped to zero.
    pub fn remaining_lifetime(&self, token: &str) -> Result<Duration, TokenError> {
        self.remaining_lifetime_at(token, Utc::now())
    }

    /// Time until the token expires at `now`, clamped to zero.
    pub fn remaining_lifetime_at(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Duration, TokenError> {
        Ok(self.verify(token)?.remaining_at(now))
    }

    /// Returns the kind of a token with a valid signature, expired or not.
    pub fn kind_of(&self, token: &str) -> Result<TokenKind, TokenError> {
        Ok(self.verify(token)?.kind)
    }

    /// Returns `true` when the claims expire within the refresh threshold.
    pub fn is_expiring_soon(&self, claims: &TokenClaims) -> bool {
        self.is_expiring_soon_at(claims, Utc::now())
    }

    /// Same as [`is_expiring_soon`](Self::is_expiring_soon) at `now`.
    pub fn is_expiring_soon_at(&self, claims: &TokenClaims, now: DateTime<Utc>) -> bool {
        claims.remaining_at(now) < self.refresh_threshold()
    }

    /// Lifetime of access tokens.
    pub fn access_ttl(&self) -> Duration {
        Duration::from_secs(self.config.access_ttl_secs.max(0) as u64)
    }

    /// Threshold under which a caller should refresh.
    pub fn refresh_threshold(&self) -> Duration {
        Duration::from_secs(self.config.refresh_threshold_secs.max(0) as u64)
    }

    fn leeway(&self) -> Duration {
        Duration::from_secs(self.config.leeway_secs)
    }

    /// Decodes and verifies the signature, issuer and claim shape.
    fn verify(&self, token: &str) -> Result<TokenClaims, TokenError> {
        let data = decode::<TokenClaims>(token, &self.decoding_key, &self.validation).map_err(
            |e| match e.kind() {
                ErrorKind::InvalidSignature => TokenError::SignatureMismatch,
                ErrorKind::ExpiredSignature => TokenError::Expired,
                ErrorKind::InvalidIssuer => TokenError::Malformed("unexpected issuer".to_string()),
                ErrorKind::InvalidAlgorithm => {
                    TokenError::Malformed("unexpected algorithm".to_string())
                }
                ErrorKind::MissingRequiredClaim(claim) => {
                    TokenError::Malformed(format!("missing claim `{}`", claim))
                }
                _ => TokenError::Malformed(e.to_string()),
            },
        )?;

        let claims = data.claims;
        if claims.exp <= claims.iat || DateTime::from_timestamp(claims.exp, 0).is_none() {
            return Err(TokenError::Malformed(
                "expiry is not after issue time".to_string(),
            ));
        }
        Ok(claims)
    }
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("issuer", &self.config.issuer)
            .field("algorithm", &self.config.algorithm)
            .field("access_ttl_secs", &self.config.access_ttl_secs)
            .field("refresh_ttl_secs", &self.config.refresh_ttl_secs)
            .finish()
    }
}

// =============================================================================
// Algorithm Serialization
// =============================================================================

mod algorithm_serde {
    use jsonwebtoken::Algorithm;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(algorithm: &Algorithm, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = match algorithm {
            Algorithm::HS256 => "HS256",
            Algorithm::HS384 => "HS384",
            Algorithm::HS512 => "HS512",
            other => return Err(serde::ser::Error::custom(format!(
                "unsupported algorithm: {:?}",
                other
            ))),
        };
        s.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Algorithm, D::Error>
    where
        D: Deserializer<'de>,
    {
        // Shared-secret signing only; key-pair algorithms need key files.
        let s = String::deserialize(deserializer)?;
        match s.to_ascii_uppercase().as_str() {
            "HS256" => Ok(Algorithm::HS256),
            "HS384" => Ok(Algorithm::HS384),
            "HS512" => Ok(Algorithm::HS512),
            _ => Err(serde::de::Error::custom(format!(
                "Unsupported algorithm: {}",
                s
            ))),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
