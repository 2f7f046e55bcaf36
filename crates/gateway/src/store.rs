use {
    async_trait::async_trait,
    plusgate_oauth::{CredentialRecord, CredentialStore, StorageError},
    sqlx::{SqlitePool, sqlite::SqlitePoolOptions},
    tracing::debug,
};

// ── SQLite-backed credential records ─────────────────────────────────────────

/// One row per user identity; `record` holds the serialized token pair.
pub struct SqliteCredentialStore {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct RecordRow {
    identity: String,
    record: String,
    updated_at: i64,
}

impl TryFrom<RecordRow> for CredentialRecord {
    type Error = StorageError;

    fn try_from(r: RecordRow) -> Result<Self, Self::Error> {
        Ok(Self {
            identity: r.identity,
            tokens: serde_json::from_str(&r.record)?,
            updated_at: u64::try_from(r.updated_at).unwrap_or_default(),
        })
    }
}

fn backend(e: sqlx::Error) -> StorageError {
    StorageError::Backend(e.to_string())
}

impl SqliteCredentialStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open `database_url` and make sure the table exists.
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = SqlitePoolOptions::new().connect(database_url).await?;
        Self::init(&pool).await?;
        Ok(Self::new(pool))
    }

    /// Create the `credential_records` table if it doesn't exist.
    pub async fn init(pool: &SqlitePool) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS credential_records (
                identity   TEXT PRIMARY KEY,
                record     TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            )"#,
        )
        .execute(pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for SqliteCredentialStore {
    async fn load_record(&self, identity: &str) -> Result<Option<CredentialRecord>, StorageError> {
        let row = sqlx::query_as::<_, RecordRow>(
            "SELECT identity, record, updated_at FROM credential_records WHERE identity = ?",
        )
        .bind(identity)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        row.map(CredentialRecord::try_from).transpose()
    }

    async fn save_record(&self, record: &CredentialRecord) -> Result<(), StorageError> {
        let serialized = serde_json::to_string(&record.tokens)?;
        sqlx::query(
            r#"INSERT INTO credential_records (identity, record, updated_at)
               VALUES (?, ?, ?)
               ON CONFLICT(identity) DO UPDATE SET
                 record = excluded.record,
                 updated_at = excluded.updated_at"#,
        )
        .bind(&record.identity)
        .bind(&serialized)
        .bind(i64::try_from(record.updated_at).unwrap_or(i64::MAX))
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        debug!(identity = %record.identity, "saved credential record");
        Ok(())
    }

    async fn delete(&self, identity: &str) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM credential_records WHERE identity = ?")
            .bind(identity)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>, StorageError> {
        sqlx::query_scalar::<_, String>("SELECT identity FROM credential_records ORDER BY identity")
            .fetch_all(&self.pool)
            .await
            .map_err(backend)
    }
}

#[cfg(test)]
mod tests {
    use {super::*, plusgate_oauth::TokenPair};

    async fn sqlite_store() -> SqliteCredentialStore {
        // A single connection, so every query sees the same in-memory database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        SqliteCredentialStore::init(&pool).await.unwrap();
        SqliteCredentialStore::new(pool)
    }

    #[tokio::test]
    async fn test_sqlite_round_trip_and_replace() {
        let store = sqlite_store().await;
        assert!(store.load("u1").await.unwrap().is_none());

        let first = TokenPair::new("a1", "r1").with_expiry(5_000);
        store.save("u1", &first).await.unwrap();
        assert_eq!(store.load("u1").await.unwrap(), Some(first));

        let second = TokenPair::new("a2", "r2");
        store.save("u1", &second).await.unwrap();
        let loaded = store.load("u1").await.unwrap().unwrap();
        assert_eq!(loaded, second);
        assert_eq!(loaded.expires_at, None);
        assert_eq!(store.list().await.unwrap(), vec!["u1"]);
    }

    #[tokio::test]
    async fn test_sqlite_identities_are_separate() {
        let store = sqlite_store().await;
        store.save("u2", &TokenPair::new("b", "rb")).await.unwrap();
        store.save("u1", &TokenPair::new("a", "ra")).await.unwrap();

        assert_eq!(store.list().await.unwrap(), vec!["u1", "u2"]);
        store.delete("u1").await.unwrap();
        assert!(store.load("u1").await.unwrap().is_none());
        assert_eq!(
            store.load("u2").await.unwrap().map(|t| t.access_token),
            Some("b".to_string())
        );
    }

    #[tokio::test]
    async fn test_sqlite_corrupt_record_is_error() {
        let store = sqlite_store().await;
        sqlx::query("INSERT INTO credential_records VALUES ('u1', 'not json', 0)")
            .execute(&store.pool)
            .await
            .unwrap();
        assert!(matches!(
            store.load("u1").await.unwrap_err(),
            StorageError::Malformed(_)
        ));
    }
}
