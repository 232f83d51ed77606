//! SQLite cache store.

use super::{CacheStore, CacheTransaction, StoreError};
use async_trait::async_trait;
use mxsync_types::{ResourceData, ResourceEntity, ResourceId, ResourceState};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{Sqlite, Transaction};
use std::path::Path;
use std::str::FromStr;

/// SQLite-based cache store.
///
/// Uses WAL mode. Transactions map directly onto SQLite transactions; an
/// sqlx transaction rolls back when dropped without commit.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("connections", &self.pool.size())
            .finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Open (or create) a cache database at the given path.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        let location = path.to_str().ok_or_else(|| {
            StoreError::Transaction(format!("non UTF-8 database path: {}", path.display()))
        })?;
        let options = SqliteConnectOptions::from_str(location)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(5));

        // A single writer connection serializes transactions.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.run_migrations().await?;
        tracing::debug!("Opened cache database at {}", path.display());
        Ok(store)
    }

    /// Create an in-memory SQLite store (for testing).
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(":memory:")?
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        // The database lives as long as its only connection.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Run database migrations.
    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS resources (
                owner_id TEXT NOT NULL,
                key TEXT NOT NULL,
                app_id TEXT NOT NULL,
                app_display_name TEXT,
                device_display_name TEXT,
                profile_tag TEXT,
                lang TEXT NOT NULL,
                data_url TEXT,
                data_format TEXT,
                state TEXT NOT NULL,
                PRIMARY KEY (owner_id, key, app_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_resources_state ON resources(state)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[async_trait]
impl CacheStore for SqliteStore {
    async fn begin(&self) -> Result<Box<dyn CacheTransaction>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(SqliteTransaction { tx }))
    }
}

struct SqliteTransaction {
    tx: Transaction<'static, Sqlite>,
}

#[async_trait]
impl CacheTransaction for SqliteTransaction {
    async fn find_resource(
        &mut self,
        id: &ResourceId,
    ) -> Result<Option<ResourceEntity>, StoreError> {
        let row = sqlx::query_as::<_, ResourceRow>(
            r#"
            SELECT owner_id, key, app_id, app_display_name, device_display_name,
                   profile_tag, lang, data_url, data_format, state
            FROM resources
            WHERE owner_id = ?1 AND key = ?2 AND app_id = ?3
            "#,
        )
        .bind(id.owner_id())
        .bind(id.key())
        .bind(id.app_id())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(ResourceRow::into_entity).transpose()
    }

    async fn resources_for_owner(
        &mut self,
        owner_id: &str,
    ) -> Result<Vec<ResourceEntity>, StoreError> {
        let rows = sqlx::query_as::<_, ResourceRow>(
            r#"
            SELECT owner_id, key, app_id, app_display_name, device_display_name,
                   profile_tag, lang, data_url, data_format, state
            FROM resources
            WHERE owner_id = ?1
            ORDER BY app_id ASC, key ASC
            "#,
        )
        .bind(owner_id)
        .fetch_all(&mut *self.tx)
        .await?;

        rows.into_iter().map(ResourceRow::into_entity).collect()
    }

    async fn put_resource(&mut self, entity: &ResourceEntity) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO resources (owner_id, key, app_id, app_display_name, device_display_name,
                                   profile_tag, lang, data_url, data_format, state)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(owner_id, key, app_id) DO UPDATE SET
                app_display_name = excluded.app_display_name,
                device_display_name = excluded.device_display_name,
                profile_tag = excluded.profile_tag,
                lang = excluded.lang,
                data_url = excluded.data_url,
                data_format = excluded.data_format,
                state = excluded.state
            "#,
        )
        .bind(entity.id.owner_id())
        .bind(entity.id.key())
        .bind(entity.id.app_id())
        .bind(entity.app_display_name.as_deref())
        .bind(entity.device_display_name.as_deref())
        .bind(entity.profile_tag.as_deref())
        .bind(&entity.lang)
        .bind(entity.data.url.as_deref())
        .bind(entity.data.format.as_deref())
        .bind(entity.state.as_str())
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn delete_resource(&mut self, id: &ResourceId) -> Result<bool, StoreError> {
        let result =
            sqlx::query("DELETE FROM resources WHERE owner_id = ?1 AND key = ?2 AND app_id = ?3")
                .bind(id.owner_id())
                .bind(id.key())
                .bind(id.app_id())
                .execute(&mut *self.tx)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }
}

/// Database row representation.
#[derive(sqlx::FromRow)]
struct ResourceRow {
    owner_id: String,
    key: String,
    app_id: String,
    app_display_name: Option<String>,
    device_display_name: Option<String>,
    profile_tag: Option<String>,
    lang: String,
    data_url: Option<String>,
    data_format: Option<String>,
    state: String,
}

impl ResourceRow {
    fn into_entity(self) -> Result<ResourceEntity, StoreError> {
        Ok(ResourceEntity {
            id: ResourceId::new(self.owner_id, self.key, self.app_id),
            app_display_name: self.app_display_name,
            device_display_name: self.device_display_name,
            profile_tag: self.profile_tag,
            lang: self.lang,
            data: ResourceData {
                url: self.data_url,
                format: self.data_format,
            },
            state: ResourceState::from_str(&self.state)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(key: &str) -> ResourceEntity {
        ResourceEntity::new(
            ResourceId::new("@alice:example.org", key, "im.app"),
            "en",
            ResourceState::Registered,
        )
        .with_app_display_name("App")
        .with_data(ResourceData {
            url: Some("https://push.example.org".into()),
            format: Some("event_id_only".into()),
        })
    }

    #[tokio::test]
    async fn put_and_find_roundtrip() {
        let store = SqliteStore::in_memory().await.unwrap();
        let e = entity("k1");

        let mut txn = store.begin().await.unwrap();
        txn.put_resource(&e).await.unwrap();
        txn.commit().await.unwrap();

        let mut txn = store.begin().await.unwrap();
        assert_eq!(txn.find_resource(&e.id).await.unwrap(), Some(e));
    }

    #[tokio::test]
    async fn put_replaces_existing_row() {
        let store = SqliteStore::in_memory().await.unwrap();
        let mut e = entity("k1");

        let mut txn = store.begin().await.unwrap();
        txn.put_resource(&e).await.unwrap();
        e.state = ResourceState::Unregistering;
        e.profile_tag = Some("work".into());
        txn.put_resource(&e).await.unwrap();
        txn.commit().await.unwrap();

        let mut txn = store.begin().await.unwrap();
        let found = txn.find_resource(&e.id).await.unwrap().unwrap();
        assert_eq!(found.state, ResourceState::Unregistering);
        assert_eq!(found.profile_tag.as_deref(), Some("work"));
    }

    #[tokio::test]
    async fn dropped_transaction_rolls_back() {
        let store = SqliteStore::in_memory().await.unwrap();
        let e = entity("k1");

        {
            let mut txn = store.begin().await.unwrap();
            txn.put_resource(&e).await.unwrap();
        }

        let mut txn = store.begin().await.unwrap();
        assert_eq!(txn.find_resource(&e.id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn delete_reports_whether_row_existed() {
        let store = SqliteStore::in_memory().await.unwrap();
        let e = entity("k1");

        let mut txn = store.begin().await.unwrap();
        txn.put_resource(&e).await.unwrap();
        assert!(txn.delete_resource(&e.id).await.unwrap());
        assert!(!txn.delete_resource(&e.id).await.unwrap());
        txn.commit().await.unwrap();
    }

    #[tokio::test]
    async fn resources_for_owner_is_ordered() {
        let store = SqliteStore::in_memory().await.unwrap();

        let mut txn = store.begin().await.unwrap();
        txn.put_resource(&entity("b")).await.unwrap();
        txn.put_resource(&entity("a")).await.unwrap();
        txn.commit().await.unwrap();

        let mut txn = store.begin().await.unwrap();
        let keys: Vec<String> = txn
            .resources_for_owner("@alice:example.org")
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.id.key().to_string())
            .collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert!(txn.resources_for_owner("@bob:example.org").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn file_database_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");
        let e = entity("k1");

        {
            let store = SqliteStore::open(&path).await.unwrap();
            let mut txn = store.begin().await.unwrap();
            txn.put_resource(&e).await.unwrap();
            txn.commit().await.unwrap();
        }

        let store = SqliteStore::open(&path).await.unwrap();
        let mut txn = store.begin().await.unwrap();
        assert_eq!(txn.find_resource(&e.id).await.unwrap(), Some(e));
    }
}
