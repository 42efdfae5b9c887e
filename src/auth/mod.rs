//! Auth Core: users, sessions, refresh tokens, verification tokens, bcrypt
//! password hashing, and HS256 JWT issuance — §4.7.

pub mod password;

use crate::db::{Database, RefreshToken, Session, User, UserRole, VerificationToken, VerificationTokenType};
use crate::error::{Error, Result};
use crate::jwt::JwtConfig;
use base64::Engine;
use rand::RngCore;

/// Issued credential pair returned by signup/login/refresh.
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: u64,
    pub user: User,
}

#[derive(Clone)]
pub struct AuthCore {
    db: Database,
    jwt: JwtConfig,
}

impl AuthCore {
    pub fn new(db: Database, jwt: JwtConfig) -> Self {
        Self { db, jwt }
    }

    fn new_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    /// `v1.<base64url(32 random bytes)>`, per §4.7.
    fn new_refresh_token() -> String {
        let mut bytes = [0u8; 32];
        rand::rng().fill_bytes(&mut bytes);
        format!(
            "v1.{}",
            base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
        )
    }

    /// Lowercases and trims the email, rejects if a non-deleted user with
    /// that email already exists, stores a bcrypt hash.
    pub async fn create_user(
        &self,
        email: &str,
        password: &str,
        metadata: Option<serde_json::Value>,
    ) -> Result<User> {
        let email = email.trim().to_lowercase();
        if email.is_empty() || !email.contains('@') {
            return Err(Error::Validation("invalid email address".into()));
        }
        password::validate_strength(password)?;

        if self.db.users().get_by_email(&email).await?.is_some() {
            return Err(Error::Conflict("a user with this email already exists".into()));
        }

        let id = Self::new_id();
        let hashed = password::hash(password)?;
        let app_metadata = serde_json::json!({"provider": "email", "providers": ["email"]});
        let user_metadata = metadata.unwrap_or_else(|| serde_json::json!({}));

        self.db
            .users()
            .create(&id, Some(&email), Some(&hashed), None, &app_metadata, &user_metadata, false)
            .await?;

        Ok(self.db.users().get_by_id(&id).await?.expect("just inserted"))
    }

    pub async fn create_anonymous_user(&self, metadata: Option<serde_json::Value>) -> Result<User> {
        let id = Self::new_id();
        let app_metadata = serde_json::json!({"provider": "anonymous", "providers": ["anonymous"]});
        let user_metadata = metadata.unwrap_or_else(|| serde_json::json!({}));

        self.db
            .users()
            .create(&id, None, None, None, &app_metadata, &user_metadata, true)
            .await?;

        Ok(self.db.users().get_by_id(&id).await?.expect("just inserted"))
    }

    pub async fn validate_password(&self, user: &User, password: &str) -> Result<bool> {
        match &user.encrypted_password {
            Some(hash) => password::verify(password, hash),
            None => Ok(false),
        }
    }

    /// Allocates a session and its first refresh token, then issues an
    /// access token for it.
    pub async fn create_session(&self, user: &User) -> Result<TokenPair> {
        let session_id = Self::new_id();
        let refresh_token = Self::new_refresh_token();

        self.db
            .sessions()
            .create(&session_id, &user.id, &refresh_token)
            .await?;
        self.db.users().set_last_sign_in(&user.id).await?;

        let access_token = self.issue_access_token(user, &session_id)?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            expires_in: self.jwt.token_duration_secs,
            user: user.clone(),
        })
    }

    fn issue_access_token(&self, user: &User, session_id: &str) -> Result<String> {
        self.jwt
            .issue_access_token(
                &user.id,
                user.role,
                user.email.as_deref(),
                session_id,
                &user.app_metadata,
                &user.user_metadata,
                user.is_anonymous,
            )
            .map_err(Error::internal)
    }

    /// Validates the refresh token (exists, not revoked), rotates it and
    /// returns a new access token. Rotation is atomic: at most one
    /// non-revoked successor per predecessor.
    pub async fn refresh_session(&self, refresh_token: &str) -> Result<TokenPair> {
        let token = self
            .db
            .sessions()
            .get_refresh_token(refresh_token)
            .await?
            .ok_or(Error::Authentication)?;

        if token.revoked {
            return Err(Error::Authentication);
        }

        let user = self
            .db
            .users()
            .get_by_id(&token.user_id)
            .await?
            .ok_or(Error::Authentication)?;

        let new_refresh_token = Self::new_refresh_token();
        self.db
            .sessions()
            .rotate_refresh_token(refresh_token, &new_refresh_token, &token.user_id, &token.session_id)
            .await
            .map_err(|e| match e {
                sqlx::Error::RowNotFound => Error::Authentication,
                other => other.into(),
            })?;

        let access_token = self.issue_access_token(&user, &token.session_id)?;

        Ok(TokenPair {
            access_token,
            refresh_token: new_refresh_token,
            expires_in: self.jwt.token_duration_secs,
            user,
        })
    }

    pub async fn logout(&self, session_id: &str) -> Result<()> {
        self.db.sessions().delete(session_id).await?;
        Ok(())
    }

    pub async fn get_session(&self, session_id: &str) -> Result<Option<Session>> {
        Ok(self.db.sessions().get(session_id).await?)
    }

    pub async fn get_refresh_token(&self, token: &str) -> Result<Option<RefreshToken>> {
        Ok(self.db.sessions().get_refresh_token(token).await?)
    }

    pub fn validate_access_token(&self, token: &str) -> Result<crate::jwt::AccessClaims> {
        self.jwt.validate_access_token(token).map_err(|_| Error::Authentication)
    }

    pub fn validate_api_key(&self, key: &str) -> Result<UserRole> {
        self.jwt.validate_api_key(key).map_err(|_| Error::Authentication)
    }

    pub fn issue_api_key(&self, role: UserRole) -> Result<String> {
        self.jwt.issue_api_key(role).map_err(Error::internal)
    }

    /// One-shot, time-boxed token for confirm/recover/magiclink/email-change/invite flows.
    pub async fn create_verification_token(
        &self,
        user_id: &str,
        token_type: VerificationTokenType,
        email: &str,
    ) -> Result<String> {
        let id = Self::new_id();
        self.db
            .verification_tokens()
            .create(&id, user_id, token_type, email)
            .await?;
        Ok(id)
    }

    /// Validates a verification token: exists, unused, unexpired, type matches.
    pub async fn consume_verification_token(
        &self,
        token_id: &str,
        expected_type: VerificationTokenType,
    ) -> Result<VerificationToken> {
        let token = self
            .db
            .verification_tokens()
            .get(token_id)
            .await?
            .ok_or_else(|| Error::NotFound("verification token not found".into()))?;

        if token.used_at.is_some() {
            return Err(Error::Validation("verification token already used".into()));
        }
        if token.token_type != expected_type {
            return Err(Error::Validation("verification token type mismatch".into()));
        }

        let expires_at = chrono::DateTime::parse_from_rfc3339(&token.expires_at)
            .map_err(Error::internal)?
            .with_timezone(&chrono::Utc);
        if chrono::Utc::now() > expires_at {
            return Err(Error::Validation("verification token expired".into()));
        }

        self.db.verification_tokens().mark_used(token_id).await?;
        Ok(token)
    }

    pub fn db(&self) -> &Database {
        &self.db
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jwt() -> JwtConfig {
        JwtConfig::new(b"test-secret-key-for-testing-only", "sblite")
    }

    #[tokio::test]
    async fn create_user_then_get_by_email() {
        let db = Database::open(":memory:").await.unwrap();
        let core = AuthCore::new(db, jwt());

        let user = core.create_user("A@B.co", "password123", None).await.unwrap();
        assert_eq!(user.email.as_deref(), Some("a@b.co"));
        assert!(core.validate_password(&user, "password123").await.unwrap());
        assert!(!core.validate_password(&user, "wrong").await.unwrap());
    }

    #[tokio::test]
    async fn duplicate_email_is_conflict() {
        let db = Database::open(":memory:").await.unwrap();
        let core = AuthCore::new(db, jwt());

        core.create_user("dup@x.io", "password123", None).await.unwrap();
        let result = core.create_user("dup@x.io", "password123", None).await;
        assert!(matches!(result, Err(Error::Conflict(_))));
    }

    #[tokio::test]
    async fn refresh_token_rotation_is_single_use() {
        let db = Database::open(":memory:").await.unwrap();
        let core = AuthCore::new(db, jwt());

        let user = core.create_user("a@b.co", "password123", None).await.unwrap();
        let pair1 = core.create_session(&user).await.unwrap();

        let pair2 = core.refresh_session(&pair1.refresh_token).await.unwrap();
        assert_ne!(pair1.refresh_token, pair2.refresh_token);

        // Reusing the predecessor must fail.
        let result = core.refresh_session(&pair1.refresh_token).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn access_token_round_trips_principal() {
        let db = Database::open(":memory:").await.unwrap();
        let core = AuthCore::new(db, jwt());

        let user = core.create_user("a@b.co", "password123", None).await.unwrap();
        let pair = core.create_session(&user).await.unwrap();

        let claims = core.validate_access_token(&pair.access_token).unwrap();
        assert_eq!(claims.sub, user.id);
        assert_eq!(claims.role, user.role);
    }
}
