//! `SQLite` implementation of [`AssetStore`].

use async_trait::async_trait;
use tracing::{debug, instrument};

use super::{AssetStore, ModuleId, NewFile, PersistedFile, PersistedModule, Result, StoreError};
use crate::db::Database;

/// Raw `files` row before its category label is validated.
#[derive(Debug, sqlx::FromRow)]
struct FileRow {
    id: i64,
    module_id: i64,
    category: String,
    url: String,
    extension: String,
}

impl TryFrom<FileRow> for PersistedFile {
    type Error = StoreError;

    fn try_from(row: FileRow) -> Result<Self> {
        let category = row
            .category
            .parse()
            .map_err(|_| StoreError::InvalidCategory {
                id: row.id,
                category: row.category.clone(),
            })?;
        Ok(Self {
            id: row.id,
            module_id: row.module_id,
            category,
            url: row.url,
            extension: row.extension,
        })
    }
}

/// Store backed by the `files` and `modules` tables.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    db: Database,
}

impl SqliteStore {
    /// Creates a store over an open database.
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl AssetStore for SqliteStore {
    #[instrument(skip(self))]
    async fn list_files_by_module(&self, module_id: ModuleId) -> Result<Vec<PersistedFile>> {
        let rows: Vec<FileRow> = sqlx::query_as(
            "SELECT id, module_id, category, url, extension FROM files WHERE module_id = ? ORDER BY url",
        )
        .bind(module_id)
        .fetch_all(self.db.pool())
        .await?;

        rows.into_iter().map(PersistedFile::try_from).collect()
    }

    #[instrument(skip(self))]
    async fn delete_files_by_module(&self, module_id: ModuleId) -> Result<u64> {
        let result = sqlx::query("DELETE FROM files WHERE module_id = ?")
            .bind(module_id)
            .execute(self.db.pool())
            .await?;

        debug!(deleted = result.rows_affected(), "deleted module files");
        Ok(result.rows_affected())
    }

    #[instrument(skip(self, files), fields(count = files.len()))]
    async fn batch_create_files(&self, files: &[NewFile]) -> Result<()> {
        if files.is_empty() {
            return Ok(());
        }

        let mut tx = self.db.pool().begin().await?;
        let mut inserted = 0u64;
        for file in files {
            let result = sqlx::query(
                "INSERT INTO files (module_id, category, url, extension) VALUES (?, ?, ?, ?)
                 ON CONFLICT(url) DO NOTHING",
            )
            .bind(file.module_id)
            .bind(file.category.as_str())
            .bind(&file.url)
            .bind(&file.extension)
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected();
        }
        tx.commit().await?;

        debug!(inserted, "created file rows");
        Ok(())
    }

    #[instrument(skip(self, module), fields(module_id = module.id))]
    async fn create_module(&self, module: &PersistedModule) -> Result<()> {
        sqlx::query(
            "INSERT INTO modules (id, name, epoch_time, version_number) VALUES (?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                epoch_time = excluded.epoch_time,
                version_number = excluded.version_number",
        )
        .bind(module.id)
        .bind(&module.name)
        .bind(module.epoch_time)
        .bind(&module.version_number)
        .execute(self.db.pool())
        .await?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_modules(&self) -> Result<Vec<PersistedModule>> {
        let modules = sqlx::query_as(
            "SELECT id, name, epoch_time, version_number FROM modules ORDER BY id",
        )
        .fetch_all(self.db.pool())
        .await?;
        Ok(modules)
    }

    #[instrument(skip(self))]
    async fn get_module(&self, module_id: ModuleId) -> Result<Option<PersistedModule>> {
        let module = sqlx::query_as(
            "SELECT id, name, epoch_time, version_number FROM modules WHERE id = ?",
        )
        .bind(module_id)
        .fetch_optional(self.db.pool())
        .await?;
        Ok(module)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::fileset::AssetCategory;

    async fn store() -> SqliteStore {
        SqliteStore::new(Database::new_in_memory().await.unwrap())
    }

    fn new_file(module_id: ModuleId, url: &str, extension: &str) -> NewFile {
        NewFile {
            module_id,
            category: AssetCategory::Image,
            url: url.to_string(),
            extension: extension.to_string(),
        }
    }

    #[tokio::test]
    async fn test_batch_create_and_list_by_module() {
        let store = store().await;
        store
            .batch_create_files(&[
                new_file(1, "http://x/b", ".png"),
                new_file(1, "http://x/a", ""),
                new_file(2, "http://x/c", ".jpg"),
            ])
            .await
            .unwrap();

        let rows = store.list_files_by_module(1).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].url, "http://x/a");
        assert_eq!(rows[0].extension, "");
        assert_eq!(rows[1].category, AssetCategory::Image);
    }

    #[tokio::test]
    async fn test_batch_create_ignores_duplicate_urls() {
        let store = store().await;
        store
            .batch_create_files(&[new_file(1, "http://x/a", ".png")])
            .await
            .unwrap();
        store
            .batch_create_files(&[new_file(2, "http://x/a", ".gif"), new_file(2, "http://x/z", "")])
            .await
            .unwrap();

        let first = store.list_files_by_module(1).await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].extension, ".png");
        assert_eq!(store.list_files_by_module(2).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_files_by_module_only_touches_that_module() {
        let store = store().await;
        store
            .batch_create_files(&[new_file(1, "http://x/a", ""), new_file(2, "http://x/b", "")])
            .await
            .unwrap();

        assert_eq!(store.delete_files_by_module(1).await.unwrap(), 1);
        assert!(store.list_files_by_module(1).await.unwrap().is_empty());
        assert_eq!(store.list_files_by_module(2).await.unwrap().len(), 1);
        assert_eq!(store.delete_files_by_module(99).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_create_module_upserts() {
        let store = store().await;
        let mut module = PersistedModule {
            id: 12345,
            name: "Demo".to_string(),
            epoch_time: 1_704_207_845,
            version_number: "0".to_string(),
        };
        store.create_module(&module).await.unwrap();

        module.version_number = "2".to_string();
        store.create_module(&module).await.unwrap();

        let modules = store.list_modules().await.unwrap();
        assert_eq!(modules.len(), 1);
        assert_eq!(store.get_module(12345).await.unwrap(), Some(module));
        assert_eq!(store.get_module(1).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_unknown_category_row_is_rejected() {
        let db = Database::new_in_memory().await.unwrap();
        // Bypass the CHECK constraint by rebuilding the table without it.
        sqlx::query("DROP TABLE files").execute(db.pool()).await.unwrap();
        sqlx::query(
            "CREATE TABLE files (id INTEGER PRIMARY KEY, module_id INTEGER NOT NULL, category TEXT NOT NULL,
             url TEXT NOT NULL UNIQUE, extension TEXT NOT NULL DEFAULT '')",
        )
        .execute(db.pool())
        .await
        .unwrap();
        sqlx::query("INSERT INTO files (module_id, category, url) VALUES (1, 'assets', 'http://x')")
            .execute(db.pool())
            .await
            .unwrap();

        let store = SqliteStore::new(db);
        let err = store.list_files_by_module(1).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidCategory { .. }));
    }
}
