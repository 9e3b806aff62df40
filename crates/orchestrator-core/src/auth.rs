//! Server-side half of the bearer-token contract in spec §4.7/§6.1: issues
//! and verifies the JWTs the Worker Auth Client (C7) logs in for. There is
//! a single service-principal account (spec §6.4's `auth {email, password}`),
//! not a general user-account system — see Non-goals.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::SecurityConfig;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    Access,
    Refresh,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtClaims {
    pub sub: Uuid,
    pub email: String,
    pub token_type: TokenType,
    pub is_admin: bool,
    pub exp: i64,
    pub iat: i64,
}

#[derive(Clone)]
pub struct AuthService {
    config: SecurityConfig,
}

impl AuthService {
    pub fn new(config: SecurityConfig) -> Self {
        Self { config }
    }

    /// Check the configured service-principal credentials and issue a
    /// fresh access + refresh token pair.
    pub fn login(&self, email: &str, password: &str) -> Result<(String, String)> {
        let principal = &self.config.principal;
        if email != principal.email || password != principal.password {
            return Err(Error::unauthorized("invalid credentials"));
        }

        Ok((
            self.issue(principal.user_id, email, TokenType::Access, self.config.jwt.access_expiry_secs)?,
            self.issue(principal.user_id, email, TokenType::Refresh, self.config.jwt.refresh_expiry_secs)?,
        ))
    }

    /// Exchange a valid, non-expired refresh token for a fresh pair.
    pub fn refresh(&self, refresh_token: &str) -> Result<(String, String)> {
        let claims = self.verify(refresh_token)?;
        if claims.token_type != TokenType::Refresh {
            return Err(Error::invalid_refresh("not a refresh token"));
        }

        Ok((
            self.issue(claims.sub, &claims.email, TokenType::Access, self.config.jwt.access_expiry_secs)?,
            self.issue(claims.sub, &claims.email, TokenType::Refresh, self.config.jwt.refresh_expiry_secs)?,
        ))
    }

    /// Verify a bearer access token, rejecting anything but `Access` tokens.
    pub fn verify_access(&self, token: &str) -> Result<JwtClaims> {
        let claims = self.verify(token)?;
        if claims.token_type != TokenType::Access {
            return Err(Error::unauthorized("not an access token"));
        }
        Ok(claims)
    }

    fn verify(&self, token: &str) -> Result<JwtClaims> {
        let decoding_key = DecodingKey::from_secret(self.config.jwt.secret.as_bytes());
        let validation = Validation::new(jsonwebtoken::Algorithm::HS256);

        decode::<JwtClaims>(token, &decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    Error::unauthorized("token has expired")
                }
                _ => Error::unauthorized(format!("invalid token: {}", e)),
            })
    }

    fn issue(&self, sub: Uuid, email: &str, token_type: TokenType, expiry_secs: i64) -> Result<String> {
        let now = Utc::now();
        let claims = JwtClaims {
            sub,
            email: email.to_string(),
            token_type,
            is_admin: sub == self.config.principal.user_id,
            iat: now.timestamp(),
            exp: (now + Duration::seconds(expiry_secs)).timestamp(),
        };

        let encoding_key = EncodingKey::from_secret(self.config.jwt.secret.as_bytes());
        encode(&Header::new(jsonwebtoken::Algorithm::HS256), &claims, &encoding_key)
            .map_err(|e| Error::other(format!("failed to sign token: {}", e)))
    }

    /// `Authorization: Bearer <token>` → `<token>`.
    pub fn extract_bearer_token(header: &str) -> Option<&str> {
        header.strip_prefix("Bearer ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{JwtConfig, ServicePrincipalConfig};

    fn auth() -> AuthService {
        AuthService::new(SecurityConfig {
            jwt: JwtConfig {
                secret: "test-secret".to_string(),
                access_expiry_secs: 900,
                refresh_expiry_secs: 86_400,
            },
            principal: ServicePrincipalConfig {
                email: "manager@orchestrator.invalid".to_string(),
                password: "hunter2".to_string(),
                user_id: Uuid::nil(),
            },
        })
    }

    #[test]
    fn login_with_correct_credentials_issues_a_verifiable_pair() {
        let auth = auth();
        let (access, refresh) = auth.login("manager@orchestrator.invalid", "hunter2").unwrap();
        let claims = auth.verify_access(&access).unwrap();
        assert!(claims.is_admin);
        assert!(auth.verify_access(&refresh).is_err());
    }

    #[test]
    fn login_with_wrong_password_is_unauthorized() {
        let auth = auth();
        assert!(auth.login("manager@orchestrator.invalid", "wrong").is_err());
    }

    #[test]
    fn refresh_rejects_an_access_token() {
        let auth = auth();
        let (access, _) = auth.login("manager@orchestrator.invalid", "hunter2").unwrap();
        assert!(auth.refresh(&access).is_err());
    }

    #[test]
    fn refresh_issues_a_new_pair_from_a_valid_refresh_token() {
        let auth = auth();
        let (_, refresh) = auth.login("manager@orchestrator.invalid", "hunter2").unwrap();
        let (new_access, _) = auth.refresh(&refresh).unwrap();
        assert!(auth.verify_access(&new_access).is_ok());
    }

    #[test]
    fn extract_bearer_token_strips_the_prefix() {
        assert_eq!(AuthService::extract_bearer_token("Bearer abc"), Some("abc"));
        assert_eq!(AuthService::extract_bearer_token("abc"), None);
    }
}
