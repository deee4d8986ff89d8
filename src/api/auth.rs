//! Bearer token authentication.
//!
//! Tokens are issued elsewhere; this server only knows their SHA-256 digests
//! (`auth.tokens` in the configuration) and the caller each one maps to.

use std::collections::HashMap;

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use sha2::{Digest, Sha256};

use super::error::ApiError;
use super::AppState;
use crate::config::TokenGrant;

/// The authenticated user on whose behalf a request runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub user_id: i64,
    pub organisation_id: i64,
}

/// Lowercase hex SHA-256 digest of a bearer token.
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Resolves bearer tokens to callers.
#[derive(Debug, Clone, Default)]
pub struct TokenAuthenticator {
    grants: HashMap<String, Caller>,
}

impl TokenAuthenticator {
    pub fn new(grants: &[TokenGrant]) -> Self {
        let grants = grants
            .iter()
            .map(|grant| {
                (
                    grant.token_sha256.to_ascii_lowercase(),
                    Caller {
                        user_id: grant.user_id,
                        organisation_id: grant.organisation_id,
                    },
                )
            })
            .collect();
        Self { grants }
    }

    pub fn authenticate(&self, token: &str) -> Option<Caller> {
        self.grants.get(&hash_token(token)).copied()
    }
}

#[async_trait]
impl FromRequestParts<AppState> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or_else(|| ApiError::unauthorized("No token provided"))?;

        state
            .auth
            .authenticate(token)
            .ok_or_else(|| ApiError::unauthorized("Invalid token"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_token() {
        assert_eq!(
            hash_token("test"),
            "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08"
        );
    }

    #[test]
    fn test_authenticate() {
        let auth = TokenAuthenticator::new(&[TokenGrant {
            token_sha256: hash_token("alice-token"),
            user_id: 7,
            organisation_id: 3,
        }]);

        assert_eq!(
            auth.authenticate("alice-token"),
            Some(Caller {
                user_id: 7,
                organisation_id: 3
            })
        );
        assert_eq!(auth.authenticate("mallory-token"), None);
        assert_eq!(TokenAuthenticator::default().authenticate("alice-token"), None);
    }
}
