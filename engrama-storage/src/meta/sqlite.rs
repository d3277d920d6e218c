//! SQLite metadata store
//!
//! Authoritative record of tenants, projects, API keys, and memory
//! fragments. Connections come from an r2d2 pool and every statement runs
//! on the blocking thread pool; WAL mode keeps readers off the writers'
//! backs.
//!
//! Startup runs an idempotent schema creation plus an online migration for
//! the legacy `api_keys` layout that predates the `(key_id, key_hash)`
//! shape.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use tracing::{info, warn};

use engrama_core::{
    ApiKey, ApiKeyListing, EngramaError, MemoryFragment, MemoryScope, MemoryType, Project, Result,
    Role, Tenant,
};

use super::{FragmentPatch, MetaStore, UserStats};

const SCHEMA_SQL: &str = "
    CREATE TABLE IF NOT EXISTS tenants (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        created_at TEXT NOT NULL
    );

    CREATE UNIQUE INDEX IF NOT EXISTS idx_tenants_name ON tenants(name);

    CREATE TABLE IF NOT EXISTS projects (
        id TEXT PRIMARY KEY,
        tenant_id TEXT NOT NULL,
        name TEXT NOT NULL,
        created_at TEXT NOT NULL,
        FOREIGN KEY (tenant_id) REFERENCES tenants(id)
    );

    CREATE INDEX IF NOT EXISTS idx_projects_tenant ON projects(tenant_id);
    CREATE UNIQUE INDEX IF NOT EXISTS idx_projects_tenant_name ON projects(tenant_id, name);

    CREATE TABLE IF NOT EXISTS api_keys (
        key_id TEXT PRIMARY KEY,
        key_hash TEXT NOT NULL UNIQUE,
        tenant_id TEXT NOT NULL,
        project_id TEXT NOT NULL,
        user_id TEXT DEFAULT NULL,
        created_at TEXT NOT NULL,
        is_active INTEGER NOT NULL DEFAULT 1,
        FOREIGN KEY (tenant_id) REFERENCES tenants(id),
        FOREIGN KEY (project_id) REFERENCES projects(id)
    );

    CREATE INDEX IF NOT EXISTS idx_api_keys_tenant ON api_keys(tenant_id);
    CREATE INDEX IF NOT EXISTS idx_api_keys_project ON api_keys(project_id);
    CREATE INDEX IF NOT EXISTS idx_api_keys_hash ON api_keys(key_hash);

    CREATE TABLE IF NOT EXISTS memory_fragments (
        id TEXT PRIMARY KEY,
        tenant_id TEXT NOT NULL,
        project_id TEXT NOT NULL,
        user_id TEXT NOT NULL,
        memory_type TEXT NOT NULL,
        content TEXT NOT NULL,
        role TEXT,
        session_id TEXT,
        tags TEXT,
        importance REAL NOT NULL DEFAULT 0.0,
        hit_count INTEGER NOT NULL DEFAULT 0,
        metadata TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_memory_fragments_user
        ON memory_fragments(tenant_id, project_id, user_id);
    CREATE INDEX IF NOT EXISTS idx_memory_fragments_session
        ON memory_fragments(session_id);
";

/// SQLite-backed [`MetaStore`]
#[derive(Clone)]
pub struct SqliteMetaStore {
    pool: r2d2::Pool<SqliteConnectionManager>,
}

impl SqliteMetaStore {
    /// Open (or create) the database at `path`, run schema setup and the
    /// legacy key migration, and build the connection pool.
    ///
    /// # Errors
    ///
    /// Returns [`EngramaError::Storage`] when the database cannot be
    /// opened or initialized.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| EngramaError::Storage(format!("create data dir: {e}")))?;
        }

        let manager = SqliteConnectionManager::file(path).with_init(|conn| {
            conn.execute_batch(
                "PRAGMA journal_mode=WAL;
                 PRAGMA foreign_keys=ON;
                 PRAGMA busy_timeout=5000;",
            )
        });
        let pool = r2d2::Pool::builder()
            .max_size(8)
            .build(manager)
            .map_err(|e| EngramaError::Storage(format!("connection pool: {e}")))?;

        let store = Self { pool };
        store.init_schema()?;
        info!(path = %path.display(), "metadata store ready");
        Ok(store)
    }

    /// In-memory database sharing one pool slot, for tests.
    ///
    /// # Errors
    ///
    /// Returns [`EngramaError::Storage`] on initialization failure.
    pub fn new_in_memory() -> Result<Self> {
        let manager = SqliteConnectionManager::memory().with_init(|conn| {
            conn.execute_batch("PRAGMA foreign_keys=ON; PRAGMA busy_timeout=5000;")
        });
        let pool = r2d2::Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e| EngramaError::Storage(format!("connection pool: {e}")))?;
        let store = Self { pool };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self
            .pool
            .get()
            .map_err(|e| EngramaError::Storage(format!("connection pool: {e}")))?;

        // Relax referential checks while tables are created or migrated.
        conn.execute_batch("PRAGMA foreign_keys=OFF")
            .map_err(storage_err)?;

        migrate_legacy_api_keys(&conn)?;
        conn.execute_batch(SCHEMA_SQL).map_err(storage_err)?;

        conn.execute_batch("PRAGMA foreign_keys=ON")
            .map_err(storage_err)?;
        Ok(())
    }

    async fn run_blocking<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|e| EngramaError::Storage(format!("connection pool: {e}")))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| EngramaError::Internal(format!("blocking task failed: {e}")))?
    }
}

/// Online migration: a legacy `api_keys` table without the `key_hash`
/// column gains it, backfilled from whatever secret material the old
/// layout held.
fn migrate_legacy_api_keys(conn: &Connection) -> Result<()> {
    let table_exists: Option<String> = conn
        .query_row(
            "SELECT name FROM sqlite_master WHERE type='table' AND name='api_keys'",
            [],
            |row| row.get(0),
        )
        .optional()
        .map_err(storage_err)?;
    if table_exists.is_none() {
        return Ok(());
    }

    let mut columns: Vec<String> = Vec::new();
    {
        let mut stmt = conn
            .prepare("PRAGMA table_info(api_keys)")
            .map_err(storage_err)?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(1))
            .map_err(storage_err)?;
        for name in rows {
            columns.push(name.map_err(storage_err)?);
        }
    }
    if columns.iter().any(|c| c == "key_hash") {
        return Ok(());
    }

    warn!("migrating legacy api_keys table to the (key_id, key_hash) layout");
    conn.execute("ALTER TABLE api_keys ADD COLUMN key_hash TEXT", [])
        .map_err(storage_err)?;
    if columns.iter().any(|c| c == "full_key") {
        conn.execute("UPDATE api_keys SET key_hash = full_key", [])
            .map_err(storage_err)?;
    } else if columns.iter().any(|c| c == "key_id") {
        conn.execute("UPDATE api_keys SET key_hash = key_id || '_hash'", [])
            .map_err(storage_err)?;
    } else {
        conn.execute(
            "UPDATE api_keys SET key_hash = 'unknown_hash_' || hex(randomblob(8))",
            [],
        )
        .map_err(storage_err)?;
    }
    Ok(())
}

fn storage_err(e: rusqlite::Error) -> EngramaError {
    match &e {
        rusqlite::Error::SqliteFailure(f, _)
            if f.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            EngramaError::BadRequest(format!("constraint violation: {e}"))
        }
        _ => EngramaError::Storage(e.to_string()),
    }
}

fn parse_ts(s: &str) -> std::result::Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s).map(|d| d.with_timezone(&Utc))
}

fn conversion_err(
    idx: usize,
    e: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
}

fn tenant_from_row(row: &Row<'_>) -> rusqlite::Result<Tenant> {
    let created_raw: String = row.get(2)?;
    Ok(Tenant {
        id: row.get(0)?,
        name: row.get(1)?,
        created_at: parse_ts(&created_raw).map_err(|e| conversion_err(2, e))?,
    })
}

fn project_from_row(row: &Row<'_>) -> rusqlite::Result<Project> {
    let created_raw: String = row.get(3)?;
    Ok(Project {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        name: row.get(2)?,
        created_at: parse_ts(&created_raw).map_err(|e| conversion_err(3, e))?,
    })
}

fn api_key_from_row(row: &Row<'_>) -> rusqlite::Result<ApiKey> {
    let created_raw: String = row.get(5)?;
    Ok(ApiKey {
        key_id: row.get(0)?,
        key_hash: row.get(1)?,
        tenant_id: row.get(2)?,
        project_id: row.get(3)?,
        user_id: row.get(4)?,
        created_at: parse_ts(&created_raw).map_err(|e| conversion_err(5, e))?,
        is_active: row.get::<_, i64>(6)? != 0,
    })
}

fn fragment_from_row(row: &Row<'_>) -> rusqlite::Result<MemoryFragment> {
    let memory_type_raw: String = row.get(4)?;
    let role_raw: Option<String> = row.get(6)?;
    let tags_raw: Option<String> = row.get(8)?;
    let metadata_raw: Option<String> = row.get(11)?;
    let created_raw: String = row.get(12)?;
    let updated_raw: String = row.get(13)?;

    let role = role_raw
        .map(|r| Role::parse(&r))
        .transpose()
        .map_err(|e| conversion_err(6, e))?;
    let tags = tags_raw
        .map(|t| serde_json::from_str(&t))
        .transpose()
        .map_err(|e| conversion_err(8, e))?
        .unwrap_or_default();
    let metadata = metadata_raw
        .map(|m| serde_json::from_str(&m))
        .transpose()
        .map_err(|e| conversion_err(11, e))?;

    Ok(MemoryFragment {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        project_id: row.get(2)?,
        user_id: row.get(3)?,
        memory_type: MemoryType::parse(&memory_type_raw).map_err(|e| conversion_err(4, e))?,
        content: row.get(5)?,
        role,
        session_id: row.get(7)?,
        tags,
        importance: row.get(9)?,
        hit_count: u64::try_from(row.get::<_, i64>(10)?).unwrap_or(0),
        metadata,
        created_at: parse_ts(&created_raw).map_err(|e| conversion_err(12, e))?,
        updated_at: parse_ts(&updated_raw).map_err(|e| conversion_err(13, e))?,
    })
}

const FRAGMENT_COLUMNS: &str = "id, tenant_id, project_id, user_id, memory_type, content, role, \
                                session_id, tags, importance, hit_count, metadata, created_at, \
                                updated_at";

#[async_trait::async_trait]
impl MetaStore for SqliteMetaStore {
    async fn create_tenant(&self, tenant: Tenant) -> Result<()> {
        self.run_blocking(move |conn| {
            conn.execute(
                "INSERT INTO tenants (id, name, created_at) VALUES (?1, ?2, ?3)",
                params![tenant.id, tenant.name, tenant.created_at.to_rfc3339()],
            )
            .map_err(storage_err)?;
            Ok(())
        })
        .await
    }

    async fn get_tenant(&self, tenant_id: &str) -> Result<Option<Tenant>> {
        let tenant_id = tenant_id.to_string();
        self.run_blocking(move |conn| {
            conn.query_row(
                "SELECT id, name, created_at FROM tenants WHERE id = ?1",
                params![tenant_id],
                tenant_from_row,
            )
            .optional()
            .map_err(storage_err)
        })
        .await
    }

    async fn find_tenant_by_name(&self, name: &str) -> Result<Option<Tenant>> {
        let name = name.to_string();
        self.run_blocking(move |conn| {
            conn.query_row(
                "SELECT id, name, created_at FROM tenants WHERE name = ?1",
                params![name],
                tenant_from_row,
            )
            .optional()
            .map_err(storage_err)
        })
        .await
    }

    async fn list_tenants(&self) -> Result<Vec<Tenant>> {
        self.run_blocking(move |conn| {
            let mut stmt = conn
                .prepare("SELECT id, name, created_at FROM tenants ORDER BY created_at DESC")
                .map_err(storage_err)?;
            let rows = stmt.query_map([], tenant_from_row).map_err(storage_err)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .map_err(storage_err)
        })
        .await
    }

    async fn delete_tenant(&self, tenant_id: &str) -> Result<bool> {
        let tenant_id = tenant_id.to_string();
        self.run_blocking(move |conn| {
            let tx = conn.transaction().map_err(storage_err)?;
            let exists: Option<String> = tx
                .query_row(
                    "SELECT id FROM tenants WHERE id = ?1",
                    params![tenant_id],
                    |row| row.get(0),
                )
                .optional()
                .map_err(storage_err)?;
            if exists.is_none() {
                return Ok(false);
            }

            tx.execute(
                "UPDATE api_keys SET is_active = 0 WHERE tenant_id = ?1",
                params![tenant_id],
            )
            .map_err(storage_err)?;
            tx.execute(
                "DELETE FROM projects WHERE tenant_id = ?1",
                params![tenant_id],
            )
            .map_err(storage_err)?;
            let deleted = tx
                .execute("DELETE FROM tenants WHERE id = ?1", params![tenant_id])
                .map_err(storage_err)?;
            tx.commit().map_err(storage_err)?;
            Ok(deleted > 0)
        })
        .await
    }

    async fn create_project(&self, project: Project) -> Result<()> {
        self.run_blocking(move |conn| {
            conn.execute(
                "INSERT INTO projects (id, tenant_id, name, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![
                    project.id,
                    project.tenant_id,
                    project.name,
                    project.created_at.to_rfc3339()
                ],
            )
            .map_err(storage_err)?;
            Ok(())
        })
        .await
    }

    async fn get_project(&self, project_id: &str) -> Result<Option<Project>> {
        let project_id = project_id.to_string();
        self.run_blocking(move |conn| {
            conn.query_row(
                "SELECT id, tenant_id, name, created_at FROM projects WHERE id = ?1",
                params![project_id],
                project_from_row,
            )
            .optional()
            .map_err(storage_err)
        })
        .await
    }

    async fn find_project_by_name(&self, tenant_id: &str, name: &str) -> Result<Option<Project>> {
        let tenant_id = tenant_id.to_string();
        let name = name.to_string();
        self.run_blocking(move |conn| {
            conn.query_row(
                "SELECT id, tenant_id, name, created_at FROM projects
                 WHERE tenant_id = ?1 AND name = ?2",
                params![tenant_id, name],
                project_from_row,
            )
            .optional()
            .map_err(storage_err)
        })
        .await
    }

    async fn list_projects(&self, tenant_id: &str) -> Result<Vec<Project>> {
        let tenant_id = tenant_id.to_string();
        self.run_blocking(move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, tenant_id, name, created_at FROM projects
                     WHERE tenant_id = ?1 ORDER BY created_at DESC",
                )
                .map_err(storage_err)?;
            let rows = stmt
                .query_map(params![tenant_id], project_from_row)
                .map_err(storage_err)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .map_err(storage_err)
        })
        .await
    }

    async fn delete_project(&self, project_id: &str, tenant_id: &str) -> Result<bool> {
        let project_id = project_id.to_string();
        let tenant_id = tenant_id.to_string();
        self.run_blocking(move |conn| {
            let tx = conn.transaction().map_err(storage_err)?;
            let owner: Option<String> = tx
                .query_row(
                    "SELECT tenant_id FROM projects WHERE id = ?1",
                    params![project_id],
                    |row| row.get(0),
                )
                .optional()
                .map_err(storage_err)?;
            match owner {
                Some(owner) if owner == tenant_id => {}
                _ => return Ok(false),
            }

            tx.execute(
                "UPDATE api_keys SET is_active = 0 WHERE project_id = ?1",
                params![project_id],
            )
            .map_err(storage_err)?;
            let deleted = tx
                .execute("DELETE FROM projects WHERE id = ?1", params![project_id])
                .map_err(storage_err)?;
            tx.commit().map_err(storage_err)?;
            Ok(deleted > 0)
        })
        .await
    }

    async fn insert_api_key(&self, key: ApiKey) -> Result<()> {
        self.run_blocking(move |conn| {
            conn.execute(
                "INSERT INTO api_keys
                 (key_id, key_hash, tenant_id, project_id, user_id, created_at, is_active)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    key.key_id,
                    key.key_hash,
                    key.tenant_id,
                    key.project_id,
                    key.user_id,
                    key.created_at.to_rfc3339(),
                    i64::from(key.is_active)
                ],
            )
            .map_err(storage_err)?;
            Ok(())
        })
        .await
    }

    async fn find_api_key_by_hash(&self, key_hash: &str) -> Result<Option<ApiKey>> {
        let key_hash = key_hash.to_string();
        self.run_blocking(move |conn| {
            conn.query_row(
                "SELECT key_id, key_hash, tenant_id, project_id, user_id, created_at, is_active
                 FROM api_keys WHERE key_hash = ?1 AND is_active = 1",
                params![key_hash],
                api_key_from_row,
            )
            .optional()
            .map_err(storage_err)
        })
        .await
    }

    async fn revoke_api_key(&self, key_id: &str) -> Result<bool> {
        let key_id = key_id.to_string();
        self.run_blocking(move |conn| {
            let changed = conn
                .execute(
                    "UPDATE api_keys SET is_active = 0 WHERE key_id = ?1 AND is_active = 1",
                    params![key_id],
                )
                .map_err(storage_err)?;
            Ok(changed > 0)
        })
        .await
    }

    async fn list_api_keys(&self, project_id: &str) -> Result<Vec<ApiKeyListing>> {
        let project_id = project_id.to_string();
        self.run_blocking(move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT key_id, tenant_id, project_id, user_id, created_at, is_active
                     FROM api_keys WHERE project_id = ?1 ORDER BY created_at DESC",
                )
                .map_err(storage_err)?;
            let rows = stmt
                .query_map(params![project_id], |row| {
                    let created_raw: String = row.get(4)?;
                    Ok(ApiKeyListing {
                        key_id: row.get(0)?,
                        tenant_id: row.get(1)?,
                        project_id: row.get(2)?,
                        user_id: row.get(3)?,
                        created_at: parse_ts(&created_raw).map_err(|e| conversion_err(4, e))?,
                        is_active: row.get::<_, i64>(5)? != 0,
                    })
                })
                .map_err(storage_err)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .map_err(storage_err)
        })
        .await
    }

    async fn insert_fragment(&self, fragment: MemoryFragment) -> Result<()> {
        let tags_json = if fragment.tags.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&fragment.tags)?)
        };
        let metadata_json = fragment
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        self.run_blocking(move |conn| {
            conn.execute(
                "INSERT INTO memory_fragments
                 (id, tenant_id, project_id, user_id, memory_type, content, role, session_id,
                  tags, importance, hit_count, metadata, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                params![
                    fragment.id,
                    fragment.tenant_id,
                    fragment.project_id,
                    fragment.user_id,
                    fragment.memory_type.as_str(),
                    fragment.content,
                    fragment.role.map(Role::as_str),
                    fragment.session_id,
                    tags_json,
                    fragment.importance,
                    i64::try_from(fragment.hit_count).unwrap_or(i64::MAX),
                    metadata_json,
                    fragment.created_at.to_rfc3339(),
                    fragment.updated_at.to_rfc3339()
                ],
            )
            .map_err(storage_err)?;
            Ok(())
        })
        .await
    }

    async fn get_fragment(&self, fragment_id: &str) -> Result<Option<MemoryFragment>> {
        let fragment_id = fragment_id.to_string();
        self.run_blocking(move |conn| {
            conn.query_row(
                &format!("SELECT {FRAGMENT_COLUMNS} FROM memory_fragments WHERE id = ?1"),
                params![fragment_id],
                fragment_from_row,
            )
            .optional()
            .map_err(storage_err)
        })
        .await
    }

    async fn get_fragments(&self, fragment_ids: &[String]) -> Result<Vec<MemoryFragment>> {
        if fragment_ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids = fragment_ids.to_vec();
        self.run_blocking(move |conn| {
            let placeholders = vec!["?"; ids.len()].join(",");
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {FRAGMENT_COLUMNS} FROM memory_fragments WHERE id IN ({placeholders})"
                ))
                .map_err(storage_err)?;
            let rows = stmt
                .query_map(params_from_iter(ids.iter()), fragment_from_row)
                .map_err(storage_err)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .map_err(storage_err)
        })
        .await
    }

    async fn update_fragment(&self, fragment_id: &str, patch: FragmentPatch) -> Result<bool> {
        let fragment_id = fragment_id.to_string();
        let tags_json = patch.tags.map(|t| serde_json::to_string(&t)).transpose()?;
        let metadata_json = patch
            .metadata
            .map(|m| serde_json::to_string(&m))
            .transpose()?;
        let content = patch.content;
        let importance = patch.importance;
        self.run_blocking(move |conn| {
            // The SET list is assembled from a fixed field whitelist; no
            // request-supplied names ever reach the statement text.
            let mut sets: Vec<&str> = Vec::new();
            let mut values: Vec<Box<dyn rusqlite::ToSql + Send>> = Vec::new();
            if let Some(content) = content {
                sets.push("content = ?");
                values.push(Box::new(content));
            }
            if let Some(tags) = tags_json {
                sets.push("tags = ?");
                values.push(Box::new(tags));
            }
            if let Some(importance) = importance {
                sets.push("importance = ?");
                values.push(Box::new(importance));
            }
            if let Some(metadata) = metadata_json {
                sets.push("metadata = ?");
                values.push(Box::new(metadata));
            }
            sets.push("updated_at = ?");
            values.push(Box::new(Utc::now().to_rfc3339()));
            values.push(Box::new(fragment_id));

            let sql = format!(
                "UPDATE memory_fragments SET {} WHERE id = ?",
                sets.join(", ")
            );
            let changed = conn
                .execute(&sql, params_from_iter(values.iter().map(|v| v.as_ref())))
                .map_err(storage_err)?;
            Ok(changed > 0)
        })
        .await
    }

    async fn delete_fragment(&self, fragment_id: &str) -> Result<bool> {
        let fragment_id = fragment_id.to_string();
        self.run_blocking(move |conn| {
            let deleted = conn
                .execute(
                    "DELETE FROM memory_fragments WHERE id = ?1",
                    params![fragment_id],
                )
                .map_err(storage_err)?;
            Ok(deleted > 0)
        })
        .await
    }

    async fn increment_hit_counts(&self, fragment_ids: &[String]) -> Result<()> {
        if fragment_ids.is_empty() {
            return Ok(());
        }
        let ids = fragment_ids.to_vec();
        self.run_blocking(move |conn| {
            let placeholders = vec!["?"; ids.len()].join(",");
            conn.execute(
                &format!(
                    "UPDATE memory_fragments SET hit_count = hit_count + 1
                     WHERE id IN ({placeholders})"
                ),
                params_from_iter(ids.iter()),
            )
            .map_err(storage_err)?;
            Ok(())
        })
        .await
    }

    async fn user_stats(&self, scope: &MemoryScope) -> Result<UserStats> {
        let scope = scope.clone();
        self.run_blocking(move |conn| {
            let total: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM memory_fragments
                     WHERE tenant_id = ?1 AND project_id = ?2 AND user_id = ?3",
                    params![scope.tenant_id, scope.project_id, scope.user_id],
                    |row| row.get(0),
                )
                .map_err(storage_err)?;

            let mut by_type = BTreeMap::new();
            let mut stmt = conn
                .prepare(
                    "SELECT memory_type, COUNT(*) FROM memory_fragments
                     WHERE tenant_id = ?1 AND project_id = ?2 AND user_id = ?3
                     GROUP BY memory_type",
                )
                .map_err(storage_err)?;
            let rows = stmt
                .query_map(
                    params![scope.tenant_id, scope.project_id, scope.user_id],
                    |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
                )
                .map_err(storage_err)?;
            for row in rows {
                let (memory_type, count) = row.map_err(storage_err)?;
                by_type.insert(memory_type, u64::try_from(count).unwrap_or(0));
            }

            Ok(UserStats {
                total: u64::try_from(total).unwrap_or(0),
                by_type,
            })
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engrama_core::types::generate_id;

    fn fragment(scope: &MemoryScope, content: &str, memory_type: MemoryType) -> MemoryFragment {
        let now = Utc::now();
        MemoryFragment {
            id: generate_id(),
            tenant_id: scope.tenant_id.clone(),
            project_id: scope.project_id.clone(),
            user_id: scope.user_id.clone(),
            memory_type,
            content: content.to_string(),
            role: None,
            session_id: None,
            tags: vec![],
            importance: 0.0,
            hit_count: 0,
            metadata: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn tenant_crud_and_name_uniqueness() {
        let store = SqliteMetaStore::new_in_memory().unwrap();

        let tenant = Tenant::new("acme");
        store.create_tenant(tenant.clone()).await.unwrap();
        let loaded = store.get_tenant(&tenant.id).await.unwrap().unwrap();
        assert_eq!(loaded.name, "acme");

        let dup = Tenant::new("acme");
        let err = store.create_tenant(dup).await.unwrap_err();
        assert_eq!(err.kind(), "bad_request");

        assert!(store.delete_tenant(&tenant.id).await.unwrap());
        assert!(!store.delete_tenant(&tenant.id).await.unwrap());
        assert!(store.get_tenant(&tenant.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn project_cascade_soft_revokes_keys() {
        let store = SqliteMetaStore::new_in_memory().unwrap();
        let tenant = Tenant::new("acme");
        store.create_tenant(tenant.clone()).await.unwrap();
        let project = Project::new(&tenant.id, "bot");
        store.create_project(project.clone()).await.unwrap();

        let key = ApiKey {
            key_id: "eng_abcd1234".to_string(),
            key_hash: "deadbeef".to_string(),
            tenant_id: tenant.id.clone(),
            project_id: project.id.clone(),
            user_id: None,
            created_at: Utc::now(),
            is_active: true,
        };
        store.insert_api_key(key.clone()).await.unwrap();
        assert!(store
            .find_api_key_by_hash("deadbeef")
            .await
            .unwrap()
            .is_some());

        // Wrong tenant never deletes
        assert!(!store.delete_project(&project.id, "other").await.unwrap());

        assert!(store
            .delete_project(&project.id, &tenant.id)
            .await
            .unwrap());
        assert!(store.get_project(&project.id).await.unwrap().is_none());
        // Key row survives but no longer authenticates
        assert!(store
            .find_api_key_by_hash("deadbeef")
            .await
            .unwrap()
            .is_none());
        let listed = store.list_api_keys(&project.id).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert!(!listed[0].is_active);
    }

    #[tokio::test]
    async fn revoke_is_idempotent() {
        let store = SqliteMetaStore::new_in_memory().unwrap();
        let tenant = Tenant::new("t");
        store.create_tenant(tenant.clone()).await.unwrap();
        let project = Project::new(&tenant.id, "p");
        store.create_project(project.clone()).await.unwrap();
        let key = ApiKey {
            key_id: "eng_xyz".to_string(),
            key_hash: "hash1".to_string(),
            tenant_id: tenant.id,
            project_id: project.id,
            user_id: Some("alice".to_string()),
            created_at: Utc::now(),
            is_active: true,
        };
        store.insert_api_key(key).await.unwrap();

        assert!(store.revoke_api_key("eng_xyz").await.unwrap());
        assert!(!store.revoke_api_key("eng_xyz").await.unwrap());
        assert!(store.find_api_key_by_hash("hash1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn fragment_crud_update_and_stats() {
        let store = SqliteMetaStore::new_in_memory().unwrap();
        let scope = MemoryScope::new("t1", "p1", "u1");

        let f = fragment(&scope, "likes tea", MemoryType::Preference);
        store.insert_fragment(f.clone()).await.unwrap();

        let loaded = store.get_fragment(&f.id).await.unwrap().unwrap();
        assert_eq!(loaded.content, "likes tea");
        assert_eq!(loaded.hit_count, 0);

        let patch = FragmentPatch {
            content: Some("likes green tea".to_string()),
            tags: Some(vec!["drink".to_string()]),
            ..FragmentPatch::default()
        };
        assert!(store.update_fragment(&f.id, patch).await.unwrap());
        let updated = store.get_fragment(&f.id).await.unwrap().unwrap();
        assert_eq!(updated.content, "likes green tea");
        assert_eq!(updated.tags, vec!["drink".to_string()]);
        assert!(updated.updated_at > loaded.updated_at);
        // Unmentioned fields stay put
        assert_eq!(updated.importance, loaded.importance);
        assert_eq!(updated.metadata, loaded.metadata);

        store
            .insert_fragment(fragment(&scope, "born in march", MemoryType::Factual))
            .await
            .unwrap();

        let stats = store.user_stats(&scope).await.unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.by_type.get("preference"), Some(&1));
        assert_eq!(stats.by_type.get("factual"), Some(&1));

        assert!(store.delete_fragment(&f.id).await.unwrap());
        assert!(!store.delete_fragment(&f.id).await.unwrap());
        let stats = store.user_stats(&scope).await.unwrap();
        assert_eq!(stats.total, 1);
    }

    #[tokio::test]
    async fn batch_hit_counts() {
        let store = SqliteMetaStore::new_in_memory().unwrap();
        let scope = MemoryScope::new("t1", "p1", "u1");
        let a = fragment(&scope, "a", MemoryType::Factual);
        let b = fragment(&scope, "b", MemoryType::Factual);
        store.insert_fragment(a.clone()).await.unwrap();
        store.insert_fragment(b.clone()).await.unwrap();

        store
            .increment_hit_counts(&[a.id.clone(), b.id.clone()])
            .await
            .unwrap();
        store.increment_hit_counts(&[a.id.clone()]).await.unwrap();

        assert_eq!(store.get_fragment(&a.id).await.unwrap().unwrap().hit_count, 2);
        assert_eq!(store.get_fragment(&b.id).await.unwrap().unwrap().hit_count, 1);
    }

    #[tokio::test]
    async fn bulk_hydration_skips_missing_ids() {
        let store = SqliteMetaStore::new_in_memory().unwrap();
        let scope = MemoryScope::new("t1", "p1", "u1");
        let a = fragment(&scope, "a", MemoryType::Factual);
        store.insert_fragment(a.clone()).await.unwrap();

        let loaded = store
            .get_fragments(&[a.id.clone(), "missing".to_string()])
            .await
            .unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, a.id);
    }

    #[tokio::test]
    async fn legacy_api_keys_table_is_migrated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("legacy.db");
        {
            let conn = rusqlite::Connection::open(&path).unwrap();
            conn.execute_batch(
                "CREATE TABLE api_keys (
                    key_id TEXT PRIMARY KEY,
                    tenant_id TEXT NOT NULL,
                    project_id TEXT NOT NULL,
                    user_id TEXT,
                    created_at TEXT NOT NULL,
                    is_active INTEGER NOT NULL DEFAULT 1
                );
                INSERT INTO api_keys (key_id, tenant_id, project_id, created_at)
                VALUES ('eng_legacy01', 't', 'p', '2024-01-01T00:00:00+00:00');",
            )
            .unwrap();
        }

        let store = SqliteMetaStore::new(&path).unwrap();
        // The legacy row gained a synthesized hash and remains active
        let found = store
            .find_api_key_by_hash("eng_legacy01_hash")
            .await
            .unwrap();
        assert!(found.is_some());
    }
}
