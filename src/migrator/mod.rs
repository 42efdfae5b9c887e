//! Migrator (§4.2): schema bootstrap (handled by `db::Database::open`) plus
//! the user migration ledger — `push`/`list`/`new <name>`/`export`.
//!
//! Migration files are UTF-8 SQL, named `<YYYYMMDDHHMMSS>_<slug>.sql`,
//! lexicographically ordered (§6). Applied IDs are persisted in
//! `schema_migrations`. Bootstrap tables are always present before any user
//! migration runs, since `Database::open` applies them first.

use crate::db::Database;
use crate::error::{Error, Result};
use sqlx::Executor;
use std::path::{Path, PathBuf};

/// One migration file on disk.
#[derive(Debug, Clone)]
pub struct MigrationFile {
    pub id: String,
    pub path: PathBuf,
}

/// A migration's ledger status for `list`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct MigrationStatus {
    pub id: String,
    pub applied: bool,
}

fn migration_id(path: &Path) -> Option<String> {
    path.file_stem().and_then(|s| s.to_str()).map(str::to_string)
}

/// Read all `*.sql` files under `dir`, sorted lexicographically by filename
/// (the timestamp prefix makes this chronological).
fn discover(dir: &Path) -> Result<Vec<MigrationFile>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(Error::internal)? {
        let entry = entry.map_err(Error::internal)?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("sql") {
            continue;
        }
        let Some(id) = migration_id(&path) else { continue };
        files.push(MigrationFile { id, path });
    }
    files.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(files)
}

async fn applied_ids(db: &Database) -> Result<Vec<String>> {
    let rows: Vec<(String,)> = sqlx::query_as("SELECT id FROM schema_migrations ORDER BY id")
        .fetch_all(db.pool())
        .await?;
    Ok(rows.into_iter().map(|r| r.0).collect())
}

/// Apply every pending migration file under `dir`, each in its own
/// transaction, in lexicographic order. Stops and returns the error of the
/// first file that fails, leaving later files un-applied. A no-op when
/// nothing is pending.
pub async fn push(db: &Database, dir: &Path) -> Result<Vec<String>> {
    let files = discover(dir)?;
    let applied = applied_ids(db).await?;

    let mut newly_applied = Vec::new();
    for file in files {
        if applied.contains(&file.id) {
            continue;
        }

        let sql = std::fs::read_to_string(&file.path).map_err(Error::internal)?;
        let mut tx = db.begin().await?;
        (&mut *tx).execute(sql.as_str()).await?;
        sqlx::query("INSERT INTO schema_migrations (id) VALUES (?)")
            .bind(&file.id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        newly_applied.push(file.id);
    }

    Ok(newly_applied)
}

/// Report every migration under `dir` with its applied/pending status, in
/// lexicographic order.
pub async fn list(db: &Database, dir: &Path) -> Result<Vec<MigrationStatus>> {
    let files = discover(dir)?;
    let applied = applied_ids(db).await?;

    Ok(files
        .into_iter()
        .map(|f| {
            let applied = applied.contains(&f.id);
            MigrationStatus { id: f.id, applied }
        })
        .collect())
}

/// Scaffold a new, empty migration file timestamped `now`.
pub fn new_migration(dir: &Path, name: &str, now: chrono::DateTime<chrono::Utc>) -> Result<PathBuf> {
    std::fs::create_dir_all(dir).map_err(Error::internal)?;

    let slug: String = name
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    if slug.is_empty() {
        return Err(Error::Validation("migration name must not be empty".into()));
    }

    let filename = format!("{}_{}.sql", now.format("%Y%m%d%H%M%S"), slug);
    let path = dir.join(filename);
    std::fs::write(&path, "-- write your migration SQL here\n").map_err(Error::internal)?;
    Ok(path)
}

/// Concatenate `CREATE TABLE` DDL for every table in the `_columns`
/// catalog, in the order `ColumnStore::list_tables` reports them.
pub async fn export(db: &Database) -> Result<String> {
    let columns = db.columns();
    let tables = columns.list_tables().await?;

    let mut statements = Vec::with_capacity(tables.len());
    for table in tables {
        let cols = columns.columns_for_table(&table).await?;
        statements.push(crate::types::export_table_ddl(&table, &cols));
    }

    Ok(statements.join("\n\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile_shim::TempDir;

    /// Minimal `tempfile`-free scratch directory, since the teacher's
    /// dependency stack does not include `tempfile`.
    mod tempfile_shim {
        use std::path::{Path, PathBuf};

        pub struct TempDir(PathBuf);

        impl TempDir {
            pub fn new(label: &str) -> Self {
                let mut path = std::env::temp_dir();
                path.push(format!("sblite-migrator-test-{label}-{}", uuid::Uuid::new_v4()));
                std::fs::create_dir_all(&path).unwrap();
                Self(path)
            }

            pub fn path(&self) -> &Path {
                &self.0
            }
        }

        impl Drop for TempDir {
            fn drop(&mut self) {
                let _ = std::fs::remove_dir_all(&self.0);
            }
        }
    }

    #[tokio::test]
    async fn push_is_idempotent() {
        let db = Database::open(":memory:").await.unwrap();
        let dir = TempDir::new("push");
        new_migration(dir.path(), "create widgets", chrono::Utc::now()).unwrap();

        let first = push(&db, dir.path()).await.unwrap();
        assert_eq!(first.len(), 1);

        let second = push(&db, dir.path()).await.unwrap();
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn list_reports_applied_and_pending() {
        let db = Database::open(":memory:").await.unwrap();
        let dir = TempDir::new("list");
        new_migration(dir.path(), "one", chrono::Utc::now()).unwrap();
        push(&db, dir.path()).await.unwrap();
        new_migration(dir.path(), "two", chrono::Utc::now() + chrono::Duration::seconds(1)).unwrap();

        let statuses = list(&db, dir.path()).await.unwrap();
        assert_eq!(statuses.len(), 2);
        assert!(statuses[0].applied);
        assert!(!statuses[1].applied);
    }
}
