use std::{
    collections::{BTreeMap, HashMap},
    path::PathBuf,
    sync::{
        RwLock,
        atomic::{AtomicUsize, Ordering},
    },
};

use {async_trait::async_trait, tokio::io::AsyncWriteExt, tracing::debug};

use crate::{
    cipher::TokenCipher,
    clock::{Clock, SystemClock},
    error::StorageError,
    types::{CredentialRecord, TokenPair},
};

/// Durable credential records keyed by identity.
///
/// Writes replace the whole record for an identity; there is no field merge
/// and no optimistic concurrency, so the last writer wins.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// `Ok(None)` means no record exists. Corrupt or unreadable storage is an error.
    async fn load_record(&self, identity: &str) -> Result<Option<CredentialRecord>, StorageError>;

    async fn save_record(&self, record: &CredentialRecord) -> Result<(), StorageError>;

    /// Removing a missing record is not an error.
    async fn delete(&self, identity: &str) -> Result<(), StorageError>;

    async fn list(&self) -> Result<Vec<String>, StorageError>;

    async fn load(&self, identity: &str) -> Result<Option<TokenPair>, StorageError> {
        Ok(self.load_record(identity).await?.map(|r| r.tokens))
    }

    async fn save(&self, identity: &str, tokens: &TokenPair) -> Result<(), StorageError> {
        self.save_record(&CredentialRecord {
            identity: identity.to_string(),
            tokens: tokens.clone(),
            updated_at: SystemClock.now(),
        })
        .await
    }
}

// ── Memory ───────────────────────────────────────────────────────────────────

/// Process-local store. Used by tests and by callers that want no persistence.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    records: RwLock<HashMap<String, CredentialRecord>>,
    saves: AtomicUsize,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of successful writes since creation.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

fn poisoned() -> StorageError {
    StorageError::Backend("credential map lock poisoned".into())
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn load_record(&self, identity: &str) -> Result<Option<CredentialRecord>, StorageError> {
        let records = self.records.read().map_err(|_| poisoned())?;
        Ok(records.get(identity).cloned())
    }

    async fn save_record(&self, record: &CredentialRecord) -> Result<(), StorageError> {
        let mut records = self.records.write().map_err(|_| poisoned())?;
        records.insert(record.identity.clone(), record.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete(&self, identity: &str) -> Result<(), StorageError> {
        let mut records = self.records.write().map_err(|_| poisoned())?;
        records.remove(identity);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>, StorageError> {
        let records = self.records.read().map_err(|_| poisoned())?;
        let mut ids: Vec<String> = records.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}

// ── File ─────────────────────────────────────────────────────────────────────

/// JSON file of identity → record, written atomically with 0600 permissions.
///
/// Plain text at rest unless a [`TokenCipher`] is attached.
#[derive(Debug)]
pub struct FileCredentialStore {
    path: PathBuf,
    cipher: Option<TokenCipher>,
    write_lock: tokio::sync::Mutex<()>,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cipher: None,
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Encrypt the file contents with `cipher`.
    #[must_use]
    pub fn with_cipher(mut self, cipher: TokenCipher) -> Self {
        self.cipher = Some(cipher);
        self
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    async fn read_all(&self) -> Result<BTreeMap<String, CredentialRecord>, StorageError> {
        let data = match tokio::fs::read(&self.path).await {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(e.into()),
        };
        let plain = match &self.cipher {
            Some(cipher) => cipher.open(&data)?,
            None => data,
        };
        Ok(serde_json::from_slice(&plain)?)
    }

    async fn write_all(
        &self,
        records: &BTreeMap<String, CredentialRecord>,
    ) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let plain = serde_json::to_vec_pretty(records)?;
        let data = match &self.cipher {
            Some(cipher) => cipher.seal(&plain)?,
            None => plain,
        };

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        // A leftover temp file would keep its old mode; start from scratch.
        match tokio::fs::remove_file(&tmp).await {
            Ok(()) => {},
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
            Err(e) => return Err(e.into()),
        }

        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        options.mode(0o600);
        let mut file = options.open(&tmp).await?;
        file.write_all(&data).await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn load_record(&self, identity: &str) -> Result<Option<CredentialRecord>, StorageError> {
        let mut records = self.read_all().await?;
        debug!(path = %self.path.display(), identity, "read credential file");
        Ok(records.remove(identity))
    }

    async fn save_record(&self, record: &CredentialRecord) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;
        let mut records = self.read_all().await?;
        records.insert(record.identity.clone(), record.clone());
        self.write_all(&records).await?;
        debug!(path = %self.path.display(), identity = %record.identity, "saved credentials");
        Ok(())
    }

    async fn delete(&self, identity: &str) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;
        let mut records = self.read_all().await?;
        if records.remove(identity).is_some() {
            self.write_all(&records).await?;
        }
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.read_all().await?.into_keys().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(access: &str) -> TokenPair {
        TokenPair::new(access, "refresh-1").with_expiry(5_000)
    }

    #[tokio::test]
    async fn memory_round_trip_and_replace() {
        let store = MemoryCredentialStore::new();
        assert!(store.load("u1").await.unwrap().is_none());

        store.save("u1", &pair("a1")).await.unwrap();
        assert_eq!(store.load("u1").await.unwrap(), Some(pair("a1")));

        let replacement = TokenPair::new("a2", "refresh-2");
        store.save("u1", &replacement).await.unwrap();
        let loaded = store.load("u1").await.unwrap().unwrap();
        assert_eq!(loaded, replacement);
        assert_eq!(loaded.expires_at, None);
        assert_eq!(store.len(), 1);
        assert_eq!(store.save_count(), 2);
    }

    #[tokio::test]
    async fn file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path().join("tokens.json"));

        store.save("local", &pair("a1")).await.unwrap();
        assert_eq!(store.load("local").await.unwrap(), Some(pair("a1")));

        // A fresh handle on the same file sees the same record.
        let reopened = FileCredentialStore::new(dir.path().join("tokens.json"));
        assert_eq!(reopened.load("local").await.unwrap(), Some(pair("a1")));
    }

    #[tokio::test]
    async fn file_identities_do_not_share_records() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path().join("tokens.json"));

        store.save("u1", &pair("a1")).await.unwrap();
        store.save("u2", &pair("a2")).await.unwrap();
        store.save("u1", &TokenPair::new("a3", "r3")).await.unwrap();

        assert_eq!(
            store.load("u1").await.unwrap(),
            Some(TokenPair::new("a3", "r3"))
        );
        assert_eq!(store.load("u2").await.unwrap(), Some(pair("a2")));
        assert_eq!(store.list().await.unwrap(), vec!["u1", "u2"]);
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path().join("absent.json"));
        assert!(store.load("local").await.unwrap().is_none());
        assert!(store.list().await.unwrap().is_empty());
        store.delete("local").await.unwrap();
    }

    #[tokio::test]
    async fn malformed_file_is_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        std::fs::write(&path, "{not json").unwrap();

        let store = FileCredentialStore::new(&path);
        let err = store.load("local").await.unwrap_err();
        assert!(matches!(err, StorageError::Malformed(_)));

        // Saving must not clobber the unreadable file.
        assert!(store.save("local", &pair("a1")).await.is_err());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{not json");
    }

    #[tokio::test]
    async fn delete_removes_only_that_identity() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path().join("tokens.json"));
        store.save("u1", &pair("a1")).await.unwrap();
        store.save("u2", &pair("a2")).await.unwrap();

        store.delete("u1").await.unwrap();
        assert!(store.load("u1").await.unwrap().is_none());
        assert!(store.load("u2").await.unwrap().is_some());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("tokens.json");
        let store = FileCredentialStore::new(&path);
        store.save("local", &pair("a1")).await.unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);

        // A stale, world-readable temp file from an interrupted write is not reused.
        let tmp = dir.path().join("nested").join("tokens.json.tmp");
        std::fs::write(&tmp, b"junk").unwrap();
        std::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o644)).unwrap();
        store.save("local", &pair("a2")).await.unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert!(!tmp.exists());
        assert_eq!(store.load("local").await.unwrap(), Some(pair("a2")));
    }

    #[tokio::test]
    async fn encrypted_file_hides_tokens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.enc");
        let store = FileCredentialStore::new(&path).with_cipher(TokenCipher::new([7u8; 32]));

        store.save("local", &pair("top-secret-access")).await.unwrap();
        let raw = std::fs::read(&path).unwrap();
        assert!(!String::from_utf8_lossy(&raw).contains("top-secret-access"));
        assert_eq!(
            store.load("local").await.unwrap(),
            Some(pair("top-secret-access"))
        );

        let wrong_key = FileCredentialStore::new(&path).with_cipher(TokenCipher::new([8u8; 32]));
        assert!(matches!(
            wrong_key.load("local").await.unwrap_err(),
            StorageError::Crypto
        ));
    }
}
