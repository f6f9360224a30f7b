//! HS256 access and refresh tokens.
//!
//! Both token kinds carry the same claim set and are told apart by
//! `token_type`. Refresh tokens are revocable through the blacklist table;
//! access tokens are short-lived and are never checked against it.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use vf_core::config::AuthConfig;
use vf_core::{Error, Result, TokenRejection, UserId};
use vf_db::queries::token_blacklist;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub token_type: TokenType,
    pub user_id: i64,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    pub fn user_id(&self) -> UserId {
        UserId::from(self.user_id)
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.exp, 0).unwrap_or_else(Utc::now)
    }
}

/// A freshly minted access/refresh pair.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

/// Signs and verifies tokens with a shared HS256 secret.
pub struct JwtService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl std::fmt::Debug for JwtService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtService")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish_non_exhaustive()
    }
}

impl JwtService {
    pub fn new(auth: &AuthConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        Self {
            encoding: EncodingKey::from_secret(auth.jwt_secret.as_bytes()),
            decoding: DecodingKey::from_secret(auth.jwt_secret.as_bytes()),
            validation,
            access_ttl: Duration::seconds(auth.access_token_lifetime_secs as i64),
            refresh_ttl: Duration::seconds(auth.refresh_token_lifetime_secs as i64),
        }
    }

    pub fn access_lifetime_secs(&self) -> i64 {
        self.access_ttl.num_seconds()
    }

    pub fn refresh_lifetime_secs(&self) -> i64 {
        self.refresh_ttl.num_seconds()
    }

    /// Sign a token of `token_type` for `user_id`.
    pub fn issue(&self, user_id: UserId, token_type: TokenType) -> Result<String> {
        let now = Utc::now();
        let ttl = match token_type {
            TokenType::Access => self.access_ttl,
            TokenType::Refresh => self.refresh_ttl,
        };
        let claims = Claims {
            token_type,
            user_id: user_id.get(),
            jti: Uuid::new_v4().simple().to_string(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| Error::Internal(format!("failed to sign token: {e}")))
    }

    pub fn issue_pair(&self, user_id: UserId) -> Result<TokenPair> {
        Ok(TokenPair {
            access: self.issue(user_id, TokenType::Access)?,
            refresh: self.issue(user_id, TokenType::Refresh)?,
        })
    }

    /// Verify signature, expiry and token type.
    pub fn verify(&self, token: &str, expected: TokenType) -> Result<Claims> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation).map_err(|e| {
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    Error::Token(TokenRejection::Expired)
                }
                _ => Error::Token(TokenRejection::Malformed),
            }
        })?;

        if data.claims.token_type != expected {
            return Err(Error::Token(TokenRejection::WrongType));
        }
        Ok(data.claims)
    }

    /// Verify a refresh token and reject it if it was blacklisted.
    pub fn verify_refresh(&self, conn: &Connection, token: &str) -> Result<Claims> {
        let claims = self.verify(token, TokenType::Refresh)?;
        if token_blacklist::is_blacklisted(conn, &claims.jti)? {
            return Err(Error::Token(TokenRejection::Revoked));
        }
        Ok(claims)
    }

    /// Mint a new access token from a valid refresh token.
    pub fn refresh_access(&self, conn: &Connection, refresh: &str) -> Result<String> {
        let claims = self.verify_refresh(conn, refresh)?;
        self.issue(claims.user_id(), TokenType::Access)
    }

    /// Revoke a refresh token until it would have expired.
    pub fn blacklist(&self, conn: &Connection, refresh: &str) -> Result<()> {
        let claims = self.verify(refresh, TokenType::Refresh)?;
        token_blacklist::blacklist_token(conn, &claims.jti, claims.user_id(), claims.expires_at())
    }
}
