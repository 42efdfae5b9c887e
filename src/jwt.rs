//! HS256 JWT issuance and validation for access tokens.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::db::UserRole;

/// Access token claims, per §4.7.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    pub iss: String,
    pub aud: String,
    pub sub: String,
    pub role: UserRole,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub aal: String,
    pub session_id: String,
    pub app_metadata: serde_json::Value,
    pub user_metadata: serde_json::Value,
    pub is_anonymous: bool,
    pub iat: u64,
    pub exp: u64,
}

#[derive(Clone)]
pub struct JwtConfig {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    pub token_duration_secs: u64,
    pub issuer: String,
}

impl JwtConfig {
    pub fn new(secret: &[u8], issuer: impl Into<String>) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            token_duration_secs: 3600,
            issuer: issuer.into(),
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn issue_access_token(
        &self,
        user_id: &str,
        role: UserRole,
        email: Option<&str>,
        session_id: &str,
        app_metadata: &serde_json::Value,
        user_metadata: &serde_json::Value,
        is_anonymous: bool,
    ) -> Result<String, JwtError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|_| JwtError::TimeError)?
            .as_secs();

        let claims = AccessClaims {
            iss: self.issuer.clone(),
            aud: "authenticated".to_string(),
            sub: user_id.to_string(),
            role,
            email: email.map(str::to_string),
            phone: None,
            aal: "aal1".to_string(),
            session_id: session_id.to_string(),
            app_metadata: app_metadata.clone(),
            user_metadata: user_metadata.clone(),
            is_anonymous,
            iat: now,
            exp: now + self.token_duration_secs,
        };

        jsonwebtoken::encode(&Header::default(), &claims, &self.encoding_key).map_err(JwtError::Encoding)
    }

    pub fn validate_access_token(&self, token: &str) -> Result<AccessClaims, JwtError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&["authenticated", "anon", "service_role"]);
        validation.leeway = 0;

        let token_data =
            jsonwebtoken::decode::<AccessClaims>(token, &self.decoding_key, &validation)
                .map_err(JwtError::Decoding)?;
        Ok(token_data.claims)
    }

    /// Issue an ambient API key (`anon` or `service_role`) derived from the
    /// JWT secret itself, per §4.7 — these are long-lived, non-expiring
    /// tokens identifying the calling application rather than a user.
    pub fn issue_api_key(&self, role: UserRole) -> Result<String, JwtError> {
        #[derive(Serialize)]
        struct ApiKeyClaims<'a> {
            iss: &'a str,
            role: UserRole,
            iat: u64,
        }

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|_| JwtError::TimeError)?
            .as_secs();

        jsonwebtoken::encode(
            &Header::default(),
            &ApiKeyClaims {
                iss: &self.issuer,
                role,
                iat: now,
            },
            &self.encoding_key,
        )
        .map_err(JwtError::Encoding)
    }

    pub fn validate_api_key(&self, token: &str) -> Result<UserRole, JwtError> {
        #[derive(Deserialize)]
        struct ApiKeyClaims {
            role: UserRole,
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        let token_data =
            jsonwebtoken::decode::<ApiKeyClaims>(token, &self.decoding_key, &validation)
                .map_err(JwtError::Decoding)?;
        Ok(token_data.claims.role)
    }
}

#[derive(Debug)]
pub enum JwtError {
    Encoding(jsonwebtoken::errors::Error),
    Decoding(jsonwebtoken::errors::Error),
    TimeError,
}

impl std::fmt::Display for JwtError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JwtError::Encoding(e) => write!(f, "failed to encode token: {e}"),
            JwtError::Decoding(e) => write!(f, "failed to decode token: {e}"),
            JwtError::TimeError => write!(f, "system time error"),
        }
    }
}

impl std::error::Error for JwtError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_claims() {
        let config = JwtConfig::new(b"test-secret-key-for-testing-only", "sblite");
        let token = config
            .issue_access_token(
                "user-1",
                UserRole::Authenticated,
                Some("a@b.co"),
                "session-1",
                &serde_json::json!({}),
                &serde_json::json!({}),
                false,
            )
            .unwrap();

        let claims = config.validate_access_token(&token).unwrap();
        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.role, UserRole::Authenticated);
        assert_eq!(claims.email.as_deref(), Some("a@b.co"));
    }

    #[test]
    fn wrong_secret_fails() {
        let config1 = JwtConfig::new(b"secret-one-padded-to-32-bytes!!", "sblite");
        let config2 = JwtConfig::new(b"secret-two-padded-to-32-bytes!!", "sblite");

        let token = config1
            .issue_access_token(
                "user-1",
                UserRole::Authenticated,
                None,
                "s1",
                &serde_json::json!({}),
                &serde_json::json!({}),
                false,
            )
            .unwrap();

        assert!(config2.validate_access_token(&token).is_err());
    }

    #[test]
    fn api_key_round_trips() {
        let config = JwtConfig::new(b"test-secret-key-for-testing-only", "sblite");
        let key = config.issue_api_key(UserRole::ServiceRole).unwrap();
        assert_eq!(config.validate_api_key(&key).unwrap(), UserRole::ServiceRole);
    }
}
