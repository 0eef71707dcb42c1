//! SqliteObjectStore: object store adapter backed by SQLite for metadata
//! and local disk for payloads sharded beneath `base_path/{shard}/{shard}/{key}`.

use crate::models::object::{ListedObject, ObjectBody, ObjectMetadata, ObjectPage, StoredObject};
use crate::services::object_store::{ObjectStore, StoreError, StoreResult, ensure_key_safe};
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

const SCHEMA: &str = include_str!("../../migrations/0001_init.sql");

#[derive(Debug, FromRow)]
struct ObjectRow {
    key: String,
    size_bytes: i64,
    uploaded_at: DateTime<Utc>,
}

impl From<ObjectRow> for ListedObject {
    fn from(row: ObjectRow) -> Self {
        Self {
            key: row.key,
            // a negative size is a corrupt row; report it as unknown
            size: u64::try_from(row.size_bytes).ok(),
            uploaded_at: row.uploaded_at,
        }
    }
}

#[derive(Clone)]
pub struct SqliteObjectStore {
    /// Shared SQLite connection pool used for metadata operations.
    pub db: Arc<SqlitePool>,

    /// Base directory on disk where object payloads are stored.
    pub base_path: PathBuf,

    page_size: usize,
}

impl SqliteObjectStore {
    pub fn new(db: Arc<SqlitePool>, base_path: impl Into<PathBuf>, page_size: usize) -> Self {
        Self {
            db,
            base_path: base_path.into(),
            page_size: page_size.clamp(1, 1000),
        }
    }

    /// Apply the embedded schema. Statements are idempotent.
    pub async fn migrate(&self) -> StoreResult<()> {
        let statements = SCHEMA
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();

        debug!("running {} schema statements", statements.len());
        for stmt in statements {
            sqlx::query(stmt).execute(&*self.db).await?;
        }
        Ok(())
    }

    /// Two-level shard directories from MD5(key), as lowercase hex (00–ff).
    fn object_shards(key: &str) -> (String, String) {
        let digest = md5::compute(key);
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    fn object_path(&self, key: &str) -> PathBuf {
        let (shard_a, shard_b) = Self::object_shards(key);
        let mut path = self.base_path.clone();
        path.push(shard_a);
        path.push(shard_b);
        path.push(key);
        path
    }

    fn encode_cursor(key: &str) -> String {
        general_purpose::URL_SAFE_NO_PAD.encode(key)
    }

    fn decode_cursor(cursor: &str) -> StoreResult<String> {
        general_purpose::URL_SAFE_NO_PAD
            .decode(cursor)
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .ok_or_else(|| StoreError::InvalidCursor(cursor.to_string()))
    }

    /// Write bytes to a temp file beside `file_path` and fsync it. The caller
    /// renames it into place once the metadata row is committed.
    async fn stage_payload(&self, file_path: &Path, bytes: &[u8]) -> StoreResult<PathBuf> {
        let parent = file_path.parent().map(Path::to_path_buf).ok_or_else(|| {
            StoreError::Io(io::Error::new(
                ErrorKind::Other,
                "object path missing parent directory",
            ))
        })?;
        fs::create_dir_all(&parent).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));

        let result = async {
            let mut file = File::create(&tmp_path).await?;
            file.write_all(bytes).await?;
            file.flush().await?;
            file.sync_all().await
        }
        .await;

        if let Err(err) = result {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StoreError::Io(err));
        }
        Ok(tmp_path)
    }

    /// Remove empty shard directories up to (not including) `base_path`.
    async fn prune_empty_dirs(&self, start: &Path) {
        let stop = self.base_path.as_path();
        let mut current = start.to_path_buf();
        while current.starts_with(stop) && current != stop {
            match fs::remove_dir(&current).await {
                Ok(_) => match current.parent() {
                    Some(parent) => current = parent.to_path_buf(),
                    None => break,
                },
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl ObjectStore for SqliteObjectStore {
    async fn list(&self, cursor: Option<&str>) -> StoreResult<ObjectPage> {
        let after = cursor.map(Self::decode_cursor).transpose()?;
        let fetch_limit = self.page_size + 1;

        let mut rows: Vec<ObjectRow> = sqlx::query_as(
            "SELECT key, size_bytes, uploaded_at FROM objects
             WHERE (?1 IS NULL OR key > ?1)
             ORDER BY key ASC LIMIT ?2",
        )
        .bind(after)
        .bind(fetch_limit as i64)
        .fetch_all(&*self.db)
        .await?;

        let next_cursor = if rows.len() == fetch_limit {
            rows.pop();
            rows.last().map(|last| Self::encode_cursor(&last.key))
        } else {
            None
        };

        Ok(ObjectPage {
            objects: rows.into_iter().map(ListedObject::from).collect(),
            next_cursor,
        })
    }

    async fn get(&self, key: &str) -> StoreResult<Option<ObjectBody>> {
        ensure_key_safe(key)?;
        let row: Option<(Option<String>,)> =
            sqlx::query_as("SELECT content_type FROM objects WHERE key = ?")
                .bind(key)
                .fetch_optional(&*self.db)
                .await?;
        let Some((content_type,)) = row else {
            return Ok(None);
        };

        match fs::read(self.object_path(key)).await {
            Ok(bytes) => Ok(Some(ObjectBody {
                content_type,
                bytes: Bytes::from(bytes),
            })),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("metadata for {} present but payload missing", key);
                Ok(None)
            }
            Err(err) => Err(StoreError::Io(err)),
        }
    }

    async fn put(
        &self,
        key: &str,
        bytes: Bytes,
        metadata: ObjectMetadata,
    ) -> StoreResult<StoredObject> {
        ensure_key_safe(key)?;
        let file_path = self.object_path(key);
        let tmp_path = self.stage_payload(&file_path, &bytes).await?;

        let filename = metadata
            .original_filename
            .unwrap_or_else(|| key.rsplit('/').next().unwrap_or(key).to_string());
        let etag = format!("{:x}", md5::compute(&bytes));
        let uploaded_at = Utc::now();
        let size = bytes.len() as u64;

        let insert = sqlx::query(
            r#"
            INSERT INTO objects (key, filename, content_type, size_bytes, etag, uploaded_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                filename = excluded.filename,
                content_type = excluded.content_type,
                size_bytes = excluded.size_bytes,
                etag = excluded.etag,
                uploaded_at = excluded.uploaded_at
            "#,
        )
        .bind(key)
        .bind(&filename)
        .bind(metadata.content_type)
        .bind(size as i64)
        .bind(&etag)
        .bind(uploaded_at)
        .execute(&*self.db)
        .await;

        // on failure any previous payload for this key stays untouched
        if let Err(err) = insert {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StoreError::Sqlx(err));
        }
        if let Err(err) = fs::rename(&tmp_path, &file_path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StoreError::Io(err));
        }

        Ok(StoredObject {
            key: key.to_string(),
            size,
            uploaded_at,
        })
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        ensure_key_safe(key)?;
        let result = sqlx::query("DELETE FROM objects WHERE key = ?")
            .bind(key)
            .execute(&*self.db)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(key.to_string()));
        }

        let file_path = self.object_path(key);
        match fs::remove_file(&file_path).await {
            Ok(_) => debug!("removed physical file {}", file_path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("file {} already missing", file_path.display());
            }
            Err(err) => return Err(StoreError::Io(err)),
        }

        if let Some(parent) = file_path.parent() {
            self.prune_empty_dirs(parent).await;
        }
        Ok(())
    }
}
