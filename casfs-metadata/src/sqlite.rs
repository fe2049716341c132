//! A `sqlx`-backed [`MetadataStore`], implementing the reference schema of
//! spec §6.1 (`fs_nodes`, `blobs`).
//!
//! Concurrent blob refcount mutations are serialized by SQLite's own
//! transactional semantics; `increment_blob_ref_count` uses `INSERT ... ON
//! CONFLICT DO UPDATE` per spec §5, and the `blobs.reference_count >= 0`
//! `CHECK` constraint is the backstop for spec §9's open question — a
//! constraint violation surfaces as [`CasfsError::Invariant`], never
//! swallowed.

use async_trait::async_trait;
use casfs_core::{CasfsError, CasfsResult, ContentHash, Path, TenantId};
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqlitePoolOptions, Row, SqlitePool};
use tracing::warn;

use crate::{DirectoryNode, FileNode, MetadataStore, Node};

/// Connection settings for [`SqliteMetadataStore`].
#[derive(Clone, Debug)]
pub struct SqliteMetadataConfig {
    /// A `sqlx` SQLite connection string, e.g. `sqlite::memory:` or
    /// `sqlite:///var/lib/casfs/metadata.db`.
    pub connection_string: String,
    pub max_connections: u32,
}

impl Default for SqliteMetadataConfig {
    fn default() -> Self {
        Self {
            connection_string: "sqlite::memory:".to_string(),
            max_connections: 5,
        }
    }
}

#[derive(Debug)]
pub struct SqliteMetadataStore {
    pool: SqlitePool,
}

impl SqliteMetadataStore {
    pub async fn connect(config: SqliteMetadataConfig) -> CasfsResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.connection_string)
            .await
            .map_err(|e| CasfsError::StoreUnavailable(e.into()))?;

        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    async fn ensure_schema(&self) -> CasfsResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS fs_nodes (
                tenant_id    TEXT    NOT NULL,
                path         TEXT    NOT NULL,
                node_type    TEXT    NOT NULL CHECK (node_type IN ('file', 'directory')),
                content_hash TEXT,
                size         INTEGER,
                mime_type    TEXT,
                created_at   TEXT    NOT NULL,
                modified_at  TEXT    NOT NULL,
                PRIMARY KEY (tenant_id, path)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| CasfsError::StoreUnavailable(e.into()))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS blobs (
                content_hash      TEXT    PRIMARY KEY,
                reference_count   INTEGER NOT NULL CHECK (reference_count >= 0),
                size              INTEGER NOT NULL,
                created_at        TEXT    NOT NULL,
                last_accessed_at  TEXT    NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| CasfsError::StoreUnavailable(e.into()))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_blobs_orphan ON blobs (last_accessed_at) WHERE reference_count = 0",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| CasfsError::StoreUnavailable(e.into()))?;

        Ok(())
    }
}

fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339()
}

fn parse_ts(s: &str) -> CasfsResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| CasfsError::Invariant(format!("corrupt timestamp '{s}': {e}")))
}

/// Escapes `%`, `_`, and `\` for use inside a `LIKE ... ESCAPE '\'` pattern.
fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

fn row_to_node(row: &sqlx::sqlite::SqliteRow) -> CasfsResult<Node> {
    let path = Path::parse(row.try_get::<String, _>("path").map_err(|e| {
        CasfsError::StoreUnavailable(e.into())
    })?)?;
    let node_type: String = row
        .try_get("node_type")
        .map_err(|e| CasfsError::StoreUnavailable(e.into()))?;
    let created_at = parse_ts(
        &row.try_get::<String, _>("created_at")
            .map_err(|e| CasfsError::StoreUnavailable(e.into()))?,
    )?;
    let modified_at = parse_ts(
        &row.try_get::<String, _>("modified_at")
            .map_err(|e| CasfsError::StoreUnavailable(e.into()))?,
    )?;

    match node_type.as_str() {
        "directory" => Ok(Node::Directory(DirectoryNode {
            path,
            created_at,
            modified_at,
        })),
        "file" => {
            let hash_str: String = row
                .try_get("content_hash")
                .map_err(|_| CasfsError::Invariant(format!("file row at {path} missing content_hash")))?;
            let hash = ContentHash::parse(&hash_str)?;
            let size: i64 = row
                .try_get("size")
                .map_err(|_| CasfsError::Invariant(format!("file row at {path} missing size")))?;
            let mime_type: String = row
                .try_get("mime_type")
                .map_err(|_| CasfsError::Invariant(format!("file row at {path} missing mime_type")))?;
            Ok(Node::File(FileNode {
                path,
                hash,
                size: size as u64,
                mime_type,
                created_at,
                modified_at,
            }))
        }
        other => Err(CasfsError::Invariant(format!("unknown node_type '{other}'"))),
    }
}

#[async_trait]
impl MetadataStore for SqliteMetadataStore {
    async fn create_node(&self, tenant: &TenantId, node: Node) -> CasfsResult<()> {
        let tenant_id = tenant.as_uuid().to_string();
        let result = match &node {
            Node::Directory(d) => sqlx::query(
                "INSERT INTO fs_nodes (tenant_id, path, node_type, created_at, modified_at)
                 VALUES (?1, ?2, 'directory', ?3, ?4)",
            )
            .bind(&tenant_id)
            .bind(d.path.as_str())
            .bind(format_ts(d.created_at))
            .bind(format_ts(d.modified_at))
            .execute(&self.pool)
            .await,
            Node::File(f) => sqlx::query(
                "INSERT INTO fs_nodes
                    (tenant_id, path, node_type, content_hash, size, mime_type, created_at, modified_at)
                 VALUES (?1, ?2, 'file', ?3, ?4, ?5, ?6, ?7)",
            )
            .bind(&tenant_id)
            .bind(f.path.as_str())
            .bind(f.hash.to_hex())
            .bind(f.size as i64)
            .bind(&f.mime_type)
            .bind(format_ts(f.created_at))
            .bind(format_ts(f.modified_at))
            .execute(&self.pool)
            .await,
        };

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => Err(
                CasfsError::Conflict(format!("node already exists at {}", node.path())),
            ),
            Err(e) => Err(CasfsError::StoreUnavailable(e.into())),
        }
    }

    async fn get_node_by_path(&self, tenant: &TenantId, path: &Path) -> CasfsResult<Option<Node>> {
        let row = sqlx::query("SELECT * FROM fs_nodes WHERE tenant_id = ?1 AND path = ?2")
            .bind(tenant.as_uuid().to_string())
            .bind(path.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| CasfsError::StoreUnavailable(e.into()))?;

        row.map(|r| row_to_node(&r)).transpose()
    }

    async fn update_node(&self, tenant: &TenantId, node: Node) -> CasfsResult<()> {
        let tenant_id = tenant.as_uuid().to_string();
        match &node {
            Node::Directory(d) => {
                sqlx::query(
                    "UPDATE fs_nodes SET modified_at = ?1 WHERE tenant_id = ?2 AND path = ?3",
                )
                .bind(format_ts(d.modified_at))
                .bind(&tenant_id)
                .bind(d.path.as_str())
                .execute(&self.pool)
                .await
            }
            Node::File(f) => {
                sqlx::query(
                    "UPDATE fs_nodes
                     SET content_hash = ?1, size = ?2, mime_type = ?3, modified_at = ?4
                     WHERE tenant_id = ?5 AND path = ?6",
                )
                .bind(f.hash.to_hex())
                .bind(f.size as i64)
                .bind(&f.mime_type)
                .bind(format_ts(f.modified_at))
                .bind(&tenant_id)
                .bind(f.path.as_str())
                .execute(&self.pool)
                .await
            }
        }
        .map_err(|e| CasfsError::StoreUnavailable(e.into()))?;
        Ok(())
    }

    async fn delete_node(&self, tenant: &TenantId, path: &Path) -> CasfsResult<()> {
        sqlx::query("DELETE FROM fs_nodes WHERE tenant_id = ?1 AND path = ?2")
            .bind(tenant.as_uuid().to_string())
            .bind(path.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| CasfsError::StoreUnavailable(e.into()))?;
        Ok(())
    }

    async fn list_children(&self, tenant: &TenantId, directory: &Path) -> CasfsResult<Vec<Node>> {
        let prefix = if directory.is_root() {
            "/".to_string()
        } else {
            format!("{}/", directory.as_str())
        };
        let like_pattern = format!("{}%", escape_like(&prefix));
        let prefix_len = prefix.len() as i64;

        let rows = sqlx::query(
            "SELECT * FROM fs_nodes
             WHERE tenant_id = ?1
               AND path LIKE ?2 ESCAPE '\\'
               AND path != ?3
               AND INSTR(SUBSTR(path, ?4 + 1), '/') = 0
             ORDER BY (node_type = 'file'), path ASC",
        )
        .bind(tenant.as_uuid().to_string())
        .bind(like_pattern)
        .bind(directory.as_str())
        .bind(prefix_len)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CasfsError::StoreUnavailable(e.into()))?;

        rows.iter().map(row_to_node).collect()
    }

    async fn increment_blob_ref_count(&self, hash: &ContentHash) -> CasfsResult<()> {
        let now = format_ts(Utc::now());
        sqlx::query(
            "INSERT INTO blobs (content_hash, reference_count, size, created_at, last_accessed_at)
             VALUES (?1, 1, 0, ?2, ?2)
             ON CONFLICT(content_hash) DO UPDATE SET
                reference_count = reference_count + 1,
                last_accessed_at = excluded.last_accessed_at",
        )
        .bind(hash.to_hex())
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| CasfsError::StoreUnavailable(e.into()))?;
        Ok(())
    }

    async fn decrement_blob_ref_count(&self, hash: &ContentHash) -> CasfsResult<u64> {
        let result = sqlx::query(
            "UPDATE blobs SET reference_count = reference_count - 1 WHERE content_hash = ?1",
        )
        .bind(hash.to_hex())
        .execute(&self.pool)
        .await;

        match result {
            Ok(outcome) => {
                if outcome.rows_affected() == 0 {
                    return Ok(0);
                }
                let count: i64 =
                    sqlx::query_scalar("SELECT reference_count FROM blobs WHERE content_hash = ?1")
                        .bind(hash.to_hex())
                        .fetch_one(&self.pool)
                        .await
                        .map_err(|e| CasfsError::StoreUnavailable(e.into()))?;
                Ok(count as u64)
            }
            Err(sqlx::Error::Database(db_err))
                if db_err
                    .message()
                    .to_lowercase()
                    .contains("check constraint failed") =>
            {
                warn!(%hash, "refcount CHECK constraint rejected a decrement below zero");
                Err(CasfsError::Invariant(format!(
                    "refcount for {hash} would go negative"
                )))
            }
            Err(e) => Err(CasfsError::StoreUnavailable(e.into())),
        }
    }

    async fn get_orphan_blobs(&self, limit: usize) -> CasfsResult<Vec<ContentHash>> {
        let rows: Vec<String> = sqlx::query_scalar(
            "SELECT content_hash FROM blobs WHERE reference_count = 0
             ORDER BY last_accessed_at ASC LIMIT ?1",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CasfsError::StoreUnavailable(e.into()))?;

        rows.iter()
            .map(|h| ContentHash::parse(h))
            .collect::<CasfsResult<Vec<_>>>()
    }

    async fn forget_blob(&self, hash: &ContentHash) -> CasfsResult<()> {
        sqlx::query("DELETE FROM blobs WHERE content_hash = ?1 AND reference_count = 0")
            .bind(hash.to_hex())
            .execute(&self.pool)
            .await
            .map_err(|e| CasfsError::StoreUnavailable(e.into()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use casfs_core::Path;
    use uuid::Uuid;

    async fn store() -> SqliteMetadataStore {
        SqliteMetadataStore::connect(SqliteMetadataConfig::default())
            .await
            .unwrap()
    }

    fn tenant() -> TenantId {
        TenantId::new(Uuid::new_v4())
    }

    fn root() -> Node {
        Node::Directory(DirectoryNode {
            path: Path::parse("/").unwrap(),
            created_at: Utc::now(),
            modified_at: Utc::now(),
        })
    }

    #[tokio::test]
    async fn create_and_get_round_trips() {
        let store = store().await;
        let t = tenant();
        store.create_node(&t, root()).await.unwrap();
        let got = store
            .get_node_by_path(&t, &Path::parse("/").unwrap())
            .await
            .unwrap();
        assert!(got.unwrap().is_directory());
    }

    #[tokio::test]
    async fn duplicate_create_is_conflict() {
        let store = store().await;
        let t = tenant();
        store.create_node(&t, root()).await.unwrap();
        let err = store.create_node(&t, root()).await.unwrap_err();
        assert!(matches!(err, CasfsError::Conflict(_)));
    }

    #[tokio::test]
    async fn refcount_goes_negative_is_invariant() {
        let store = store().await;
        let hash = ContentHash::of(b"x");
        let err = store.decrement_blob_ref_count(&hash).await;
        // Missing row: not an error, returns 0.
        assert_eq!(err.unwrap(), 0);

        store.increment_blob_ref_count(&hash).await.unwrap();
        store.decrement_blob_ref_count(&hash).await.unwrap();
        let err = store.decrement_blob_ref_count(&hash).await.unwrap_err();
        assert!(matches!(err, CasfsError::Invariant(_)));
    }

    #[tokio::test]
    async fn list_children_depth_filter_excludes_grandchildren() {
        let store = store().await;
        let t = tenant();
        store.create_node(&t, root()).await.unwrap();
        store
            .create_node(
                &t,
                Node::Directory(DirectoryNode {
                    path: Path::parse("/a").unwrap(),
                    created_at: Utc::now(),
                    modified_at: Utc::now(),
                }),
            )
            .await
            .unwrap();
        store
            .create_node(
                &t,
                Node::Directory(DirectoryNode {
                    path: Path::parse("/a/b").unwrap(),
                    created_at: Utc::now(),
                    modified_at: Utc::now(),
                }),
            )
            .await
            .unwrap();

        let children = store
            .list_children(&t, &Path::parse("/").unwrap())
            .await
            .unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].path().as_str(), "/a");
    }
}
