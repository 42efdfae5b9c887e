use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePool;

/// User role, drawn from the closed set in the data model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Authenticated,
    ServiceRole,
    Anon,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Authenticated => "authenticated",
            UserRole::ServiceRole => "service_role",
            UserRole::Anon => "anon",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "service_role" => UserRole::ServiceRole,
            "anon" => UserRole::Anon,
            _ => UserRole::Authenticated,
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct User {
    pub id: String,
    pub email: Option<String>,
    #[serde(skip)]
    pub encrypted_password: Option<String>,
    pub email_confirmed_at: Option<String>,
    pub last_sign_in_at: Option<String>,
    pub app_metadata: serde_json::Value,
    pub user_metadata: serde_json::Value,
    pub role: UserRole,
    pub is_anonymous: bool,
    pub is_super_admin: bool,
    pub created_at: String,
    pub updated_at: String,
    pub deleted_at: Option<String>,
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: String,
    email: Option<String>,
    encrypted_password: Option<String>,
    email_confirmed_at: Option<String>,
    last_sign_in_at: Option<String>,
    app_metadata: String,
    user_metadata: String,
    role: String,
    is_anonymous: i64,
    is_super_admin: i64,
    created_at: String,
    updated_at: String,
    deleted_at: Option<String>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            email: row.email,
            encrypted_password: row.encrypted_password,
            email_confirmed_at: row.email_confirmed_at,
            last_sign_in_at: row.last_sign_in_at,
            app_metadata: serde_json::from_str(&row.app_metadata).unwrap_or_default(),
            user_metadata: serde_json::from_str(&row.user_metadata).unwrap_or_default(),
            role: UserRole::from_str(&row.role),
            is_anonymous: row.is_anonymous != 0,
            is_super_admin: row.is_super_admin != 0,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
        }
    }
}

const USER_COLUMNS: &str = "id, email, encrypted_password, email_confirmed_at, last_sign_in_at, \
     app_metadata, user_metadata, role, is_anonymous, is_super_admin, created_at, updated_at, deleted_at";

#[derive(Clone)]
pub struct UserStore {
    pool: SqlitePool,
}

impl UserStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn create(
        &self,
        id: &str,
        email: Option<&str>,
        encrypted_password: Option<&str>,
        email_confirmed_at: Option<DateTime<Utc>>,
        app_metadata: &serde_json::Value,
        user_metadata: &serde_json::Value,
        is_anonymous: bool,
    ) -> Result<(), sqlx::Error> {
        let role = if is_anonymous { "anon" } else { "authenticated" };
        sqlx::query(
            "INSERT INTO users (id, email, encrypted_password, email_confirmed_at, app_metadata, user_metadata, role, is_anonymous)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(email)
        .bind(encrypted_password)
        .bind(email_confirmed_at.map(|d| d.to_rfc3339()))
        .bind(app_metadata.to_string())
        .bind(user_metadata.to_string())
        .bind(role)
        .bind(is_anonymous as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_by_id(&self, id: &str) -> Result<Option<User>, sqlx::Error> {
        let row: Option<UserRow> = sqlx::query_as(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = ? AND deleted_at IS NULL"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(User::from))
    }

    pub async fn get_by_email(&self, email: &str) -> Result<Option<User>, sqlx::Error> {
        let normalized = email.trim().to_lowercase();
        let row: Option<UserRow> = sqlx::query_as(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = ? AND deleted_at IS NULL"
        ))
        .bind(normalized)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(User::from))
    }

    pub async fn list(&self) -> Result<Vec<User>, sqlx::Error> {
        let rows: Vec<UserRow> = sqlx::query_as(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE deleted_at IS NULL ORDER BY created_at"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(User::from).collect())
    }

    pub async fn set_email_confirmed(&self, id: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE users SET email_confirmed_at = strftime('%Y-%m-%dT%H:%M:%fZ','now'), updated_at = strftime('%Y-%m-%dT%H:%M:%fZ','now') WHERE id = ?",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn set_last_sign_in(&self, id: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE users SET last_sign_in_at = strftime('%Y-%m-%dT%H:%M:%fZ','now') WHERE id = ?",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn set_password(&self, id: &str, encrypted_password: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE users SET encrypted_password = ?, updated_at = strftime('%Y-%m-%dT%H:%M:%fZ','now') WHERE id = ?",
        )
        .bind(encrypted_password)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn set_email(&self, id: &str, email: &str) -> Result<(), sqlx::Error> {
        let normalized = email.trim().to_lowercase();
        sqlx::query(
            "UPDATE users SET email = ?, updated_at = strftime('%Y-%m-%dT%H:%M:%fZ','now') WHERE id = ?",
        )
        .bind(normalized)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn set_metadata(
        &self,
        id: &str,
        app_metadata: &serde_json::Value,
        user_metadata: &serde_json::Value,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE users SET app_metadata = ?, user_metadata = ?, updated_at = strftime('%Y-%m-%dT%H:%M:%fZ','now') WHERE id = ?",
        )
        .bind(app_metadata.to_string())
        .bind(user_metadata.to_string())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn set_anonymous(&self, id: &str, is_anonymous: bool) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE users SET is_anonymous = ? WHERE id = ?")
            .bind(is_anonymous as i64)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Soft-delete a user. Cascading hard-deletes of sessions/tokens/identities
    /// rely on foreign keys, so the row itself is kept for audit purposes.
    pub async fn soft_delete(&self, id: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE users SET deleted_at = strftime('%Y-%m-%dT%H:%M:%fZ','now') WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    #[tokio::test]
    async fn create_and_get_by_email() {
        let db = Database::open(":memory:").await.unwrap();
        let id = uuid::Uuid::new_v4().to_string();
        db.users()
            .create(
                &id,
                Some("A@B.co"),
                Some("hash"),
                None,
                &serde_json::json!({}),
                &serde_json::json!({}),
                false,
            )
            .await
            .unwrap();

        let user = db.users().get_by_email("a@b.co").await.unwrap().unwrap();
        assert_eq!(user.id, id);
        assert_eq!(user.email.as_deref(), Some("a@b.co"));
    }

    #[tokio::test]
    async fn duplicate_email_rejected() {
        let db = Database::open(":memory:").await.unwrap();
        db.users()
            .create(
                "u1",
                Some("dup@x.io"),
                Some("h"),
                None,
                &serde_json::json!({}),
                &serde_json::json!({}),
                false,
            )
            .await
            .unwrap();

        let result = db
            .users()
            .create(
                "u2",
                Some("dup@x.io"),
                Some("h"),
                None,
                &serde_json::json!({}),
                &serde_json::json!({}),
                false,
            )
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn set_email_updates_and_normalizes() {
        let db = Database::open(":memory:").await.unwrap();
        db.users()
            .create(
                "u1",
                Some("old@x.io"),
                Some("h"),
                None,
                &serde_json::json!({}),
                &serde_json::json!({}),
                false,
            )
            .await
            .unwrap();

        db.users().set_email("u1", "New@X.io").await.unwrap();
        let user = db.users().get_by_id("u1").await.unwrap().unwrap();
        assert_eq!(user.email.as_deref(), Some("new@x.io"));
    }

    #[tokio::test]
    async fn soft_delete_hides_user() {
        let db = Database::open(":memory:").await.unwrap();
        db.users()
            .create(
                "u1",
                Some("x@x.io"),
                Some("h"),
                None,
                &serde_json::json!({}),
                &serde_json::json!({}),
                false,
            )
            .await
            .unwrap();

        assert!(db.users().soft_delete("u1").await.unwrap());
        assert!(db.users().get_by_id("u1").await.unwrap().is_none());
    }
}
