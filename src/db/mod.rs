mod columns;
mod email;
mod flow_state;
mod identity;
mod rls;
mod session;
mod template;
mod user;

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::Executor;

pub use columns::ColumnStore;
pub use email::{Email, EmailStore};
pub use flow_state::{FlowState, FlowStateStore};
pub use identity::{Identity, IdentityStore};
pub use rls::{RlsPolicy, RlsStore};
pub use session::{
    RefreshToken, Session, SessionStore, VerificationToken, VerificationTokenStore,
    VerificationTokenType,
};
pub use template::{Template, TemplateStore};
pub use user::{User, UserRole, UserStore};

/// Thin wrapper over the embedded SQL engine. Requires WAL-equivalent
/// concurrent-reader mode and foreign-key enforcement; all mutating
/// operations serialize at the engine level, readers do not block writers.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open or create a database at the given path. Use ":memory:" for an
    /// in-memory database.
    pub async fn open(path: &str) -> Result<Self, sqlx::Error> {
        let url = if path == ":memory:" {
            "sqlite::memory:".to_string()
        } else {
            format!("sqlite:{}?mode=rwc", path)
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .after_connect(|conn, _meta| {
                Box::pin(async move {
                    conn.execute("PRAGMA journal_mode=WAL").await?;
                    conn.execute("PRAGMA foreign_keys=ON").await?;
                    Ok(())
                })
            })
            .connect(&url)
            .await?;

        let db = Self { pool };
        db.bootstrap().await?;
        Ok(db)
    }

    /// Apply the internal bootstrap schema. Always runs before any user
    /// migration from `migrator::push`. Idempotent via `IF NOT EXISTS`.
    async fn bootstrap(&self) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        for stmt in BOOTSTRAP_SCHEMA {
            sqlx::query(stmt).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn begin(&self) -> Result<sqlx::Transaction<'_, sqlx::Sqlite>, sqlx::Error> {
        self.pool.begin().await
    }

    pub fn users(&self) -> UserStore {
        UserStore::new(self.pool.clone())
    }

    pub fn sessions(&self) -> SessionStore {
        SessionStore::new(self.pool.clone())
    }

    pub fn verification_tokens(&self) -> VerificationTokenStore {
        VerificationTokenStore::new(self.pool.clone())
    }

    pub fn identities(&self) -> IdentityStore {
        IdentityStore::new(self.pool.clone())
    }

    pub fn flow_states(&self) -> FlowStateStore {
        FlowStateStore::new(self.pool.clone())
    }

    pub fn columns(&self) -> ColumnStore {
        ColumnStore::new(self.pool.clone())
    }

    pub fn rls(&self) -> RlsStore {
        RlsStore::new(self.pool.clone())
    }

    pub fn emails(&self) -> EmailStore {
        EmailStore::new(self.pool.clone())
    }

    pub fn templates(&self) -> TemplateStore {
        TemplateStore::new(self.pool.clone())
    }
}

/// Internal tables the core needs regardless of user migrations: the
/// migration ledger itself, principal/session/token tables, the type
/// catalog, RLS registry, and mail artifacts.
const BOOTSTRAP_SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS schema_migrations (
        id TEXT PRIMARY KEY,
        applied_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now'))
    )",
    "CREATE TABLE IF NOT EXISTS users (
        id TEXT PRIMARY KEY,
        email TEXT UNIQUE COLLATE NOCASE,
        encrypted_password TEXT,
        email_confirmed_at TEXT,
        last_sign_in_at TEXT,
        app_metadata TEXT NOT NULL DEFAULT '{}',
        user_metadata TEXT NOT NULL DEFAULT '{}',
        role TEXT NOT NULL DEFAULT 'authenticated',
        is_anonymous INTEGER NOT NULL DEFAULT 0,
        is_super_admin INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now')),
        updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now')),
        deleted_at TEXT
    )",
    "CREATE INDEX IF NOT EXISTS idx_users_email ON users(email)",
    "CREATE TABLE IF NOT EXISTS sessions (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        aal TEXT NOT NULL DEFAULT 'aal1',
        created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now')),
        not_after TEXT
    )",
    "CREATE INDEX IF NOT EXISTS idx_sessions_user_id ON sessions(user_id)",
    "CREATE TABLE IF NOT EXISTS refresh_tokens (
        token TEXT PRIMARY KEY,
        user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
        revoked INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now'))
    )",
    "CREATE INDEX IF NOT EXISTS idx_refresh_tokens_session ON refresh_tokens(session_id)",
    "CREATE TABLE IF NOT EXISTS verification_tokens (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        type TEXT NOT NULL,
        email TEXT NOT NULL,
        expires_at TEXT NOT NULL,
        used_at TEXT,
        created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now'))
    )",
    "CREATE INDEX IF NOT EXISTS idx_verification_tokens_user ON verification_tokens(user_id)",
    "CREATE TABLE IF NOT EXISTS identities (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        provider TEXT NOT NULL,
        provider_id TEXT NOT NULL,
        identity_data TEXT NOT NULL DEFAULT '{}',
        last_sign_in_at TEXT,
        created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now')),
        updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now')),
        UNIQUE (provider, provider_id)
    )",
    "CREATE INDEX IF NOT EXISTS idx_identities_user ON identities(user_id)",
    "CREATE TABLE IF NOT EXISTS flow_states (
        state TEXT PRIMARY KEY,
        provider TEXT NOT NULL,
        code_verifier TEXT NOT NULL,
        redirect_to TEXT NOT NULL,
        created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now')),
        expires_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS _columns (
        table_name TEXT NOT NULL,
        column_name TEXT NOT NULL,
        pg_type TEXT NOT NULL,
        is_nullable INTEGER NOT NULL DEFAULT 1,
        default_value TEXT,
        is_primary INTEGER NOT NULL DEFAULT 0,
        PRIMARY KEY (table_name, column_name)
    )",
    "CREATE TABLE IF NOT EXISTS rls_tables (
        table_name TEXT PRIMARY KEY,
        enabled INTEGER NOT NULL DEFAULT 0
    )",
    "CREATE TABLE IF NOT EXISTS rls_policies (
        table_name TEXT NOT NULL,
        policy_name TEXT NOT NULL,
        command TEXT NOT NULL,
        using_expr TEXT,
        check_expr TEXT,
        roles TEXT,
        PRIMARY KEY (table_name, policy_name)
    )",
    "CREATE TABLE IF NOT EXISTS emails (
        id TEXT PRIMARY KEY,
        to_addr TEXT NOT NULL,
        from_addr TEXT NOT NULL,
        subject TEXT NOT NULL,
        body_html TEXT,
        body_text TEXT,
        type TEXT NOT NULL,
        user_id TEXT,
        metadata TEXT NOT NULL DEFAULT '{}',
        created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now'))
    )",
    "CREATE TABLE IF NOT EXISTS templates (
        type TEXT PRIMARY KEY,
        subject TEXT NOT NULL,
        body_html TEXT NOT NULL,
        body_text TEXT,
        updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now'))
    )",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bootstrap_is_idempotent() {
        let db = Database::open(":memory:").await.unwrap();
        db.bootstrap().await.unwrap();
    }
}
