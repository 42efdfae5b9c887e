//! The request principal RLS policies are evaluated against — derived by
//! the pipeline from the validated API key / access token.

use crate::db::UserRole;

#[derive(Debug, Clone)]
pub struct Principal {
    pub user_id: Option<String>,
    pub role: UserRole,
    /// The decoded access-token claims, for `auth.jwt()->>'claim'`. Empty
    /// object for the ambient anon/service_role API-key principals.
    pub claims: serde_json::Value,
}

impl Principal {
    pub fn anon() -> Self {
        Self {
            user_id: None,
            role: UserRole::Anon,
            claims: serde_json::json!({}),
        }
    }

    pub fn service_role() -> Self {
        Self {
            user_id: None,
            role: UserRole::ServiceRole,
            claims: serde_json::json!({}),
        }
    }

    pub fn is_service_role(&self) -> bool {
        self.role == UserRole::ServiceRole
    }

    pub fn role_str(&self) -> &'static str {
        match self.role {
            UserRole::Authenticated => "authenticated",
            UserRole::Anon => "anon",
            UserRole::ServiceRole => "service_role",
        }
    }
}
