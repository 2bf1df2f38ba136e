//! Persistent storage for pairing rows
//!
//! Requests, approvals and credentials live in three tables keyed by ID.
//! Updates replace the whole row but only go through while the row's
//! forward link is still empty, which makes each link write-once even
//! under concurrent writers.
//!
//! [`PairingStorage`] keeps the tables in memory and, unless created with
//! [`PairingStorage::in_memory`], mirrors them to a JSON file
//! (default `~/.config/gamelink/pairings.json`).

use crate::model::{
    ApprovalId, ApprovalRecord, CredentialId, PairingApproval, PairingCredential, PairingRequest,
    RequestId, RequestRecord,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Row not found: {0}")]
    NotFound(String),
    #[error("Row already exists: {0}")]
    Duplicate(String),
    #[error("Row already linked: {0}")]
    Conflict(String),
    #[error("Configuration directory not found")]
    NoConfigDir,
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Data access for the three pairing tables. No policy lives here.
#[async_trait]
pub trait PairingStore: Send + Sync {
    async fn create_request(&self, request: PairingRequest) -> StorageResult<()>;

    /// Load a request and the approval it links to
    async fn get_request(&self, id: &RequestId) -> StorageResult<Option<RequestRecord>>;

    /// Replace a request row, only if its stored `approval_id` is still empty
    async fn update_request(&self, request: PairingRequest) -> StorageResult<()>;

    async fn create_approval(&self, approval: PairingApproval) -> StorageResult<()>;

    /// Load an approval and the credential it links to
    async fn get_approval(&self, id: &ApprovalId) -> StorageResult<Option<ApprovalRecord>>;

    /// Replace an approval row, only if its stored `credential_id` is still empty
    async fn update_approval(&self, approval: PairingApproval) -> StorageResult<()>;

    async fn create_credential(&self, credential: PairingCredential) -> StorageResult<()>;

    async fn get_credential(&self, id: &CredentialId) -> StorageResult<Option<PairingCredential>>;
}

/// Stored data structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoredData {
    #[serde(default)]
    requests: HashMap<String, PairingRequest>,
    #[serde(default)]
    approvals: HashMap<String, PairingApproval>,
    #[serde(default)]
    credentials: HashMap<String, PairingCredential>,
}

/// Pairing storage with optional file persistence
pub struct PairingStorage {
    /// Path to the storage file, `None` when memory-only
    path: Option<PathBuf>,
    /// In-memory tables
    data: RwLock<StoredData>,
}

impl PairingStorage {
    /// Create storage at the default location
    ///
    /// Loads existing data from disk if present.
    pub async fn new() -> StorageResult<Self> {
        let path = Self::default_path()?;
        Self::with_path(path).await
    }

    /// Create storage at a specific path
    pub async fn with_path(path: PathBuf) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let data = if tokio::fs::try_exists(&path).await? {
            let contents = tokio::fs::read_to_string(&path).await?;
            match serde_json::from_str(&contents) {
                Ok(data) => {
                    info!("Loaded pairing storage from {:?}", path);
                    data
                }
                Err(e) => {
                    warn!("Failed to parse pairing storage, starting fresh: {}", e);
                    StoredData::default()
                }
            }
        } else {
            debug!("No existing pairing storage, creating new");
            StoredData::default()
        };

        Ok(Self {
            path: Some(path),
            data: RwLock::new(data),
        })
    }

    /// Create storage that never touches the disk
    pub fn in_memory() -> Self {
        Self {
            path: None,
            data: RwLock::new(StoredData::default()),
        }
    }

    /// Get the default storage path (~/.config/gamelink/pairings.json)
    pub fn default_path() -> StorageResult<PathBuf> {
        let config_dir = dirs::config_dir().ok_or(StorageError::NoConfigDir)?;
        Ok(config_dir.join("gamelink").join("pairings.json"))
    }

    /// Backing file, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Apply `change` under the write lock and persist the result.
    ///
    /// With a backing file the change is made on a copy, and the in-memory
    /// tables only take it once the file write succeeded.
    async fn mutate<F>(&self, change: F) -> StorageResult<()>
    where
        F: FnOnce(&mut StoredData) -> StorageResult<()> + Send,
    {
        let mut data = self.data.write().await;
        if self.path.is_none() {
            return change(&mut *data);
        }

        let mut next = data.clone();
        change(&mut next)?;
        self.save(&next).await?;
        *data = next;
        Ok(())
    }

    /// Write the tables to disk. Called with the write lock held so saves
    /// land in mutation order.
    async fn save(&self, data: &StoredData) -> StorageResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let json = serde_json::to_string_pretty(data)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, path).await?;
        debug!("Saved pairing storage to {:?}", path);
        Ok(())
    }

    /// Number of rows per table: (requests, approvals, credentials)
    pub async fn counts(&self) -> (usize, usize, usize) {
        let data = self.data.read().await;
        (
            data.requests.len(),
            data.approvals.len(),
            data.credentials.len(),
        )
    }
}

#[async_trait]
impl PairingStore for PairingStorage {
    async fn create_request(&self, request: PairingRequest) -> StorageResult<()> {
        self.mutate(move |data| {
            let id = request.id.to_string();
            if data.requests.contains_key(&id) {
                return Err(StorageError::Duplicate(id));
            }
            data.requests.insert(id, request);
            Ok(())
        })
        .await
    }

    async fn get_request(&self, id: &RequestId) -> StorageResult<Option<RequestRecord>> {
        let data = self.data.read().await;
        let Some(request) = data.requests.get(&id.to_string()) else {
            return Ok(None);
        };
        let approval = request
            .approval_id
            .as_ref()
            .and_then(|approval_id| data.approvals.get(&approval_id.to_string()))
            .cloned();
        Ok(Some(RequestRecord {
            request: request.clone(),
            approval,
        }))
    }

    async fn update_request(&self, request: PairingRequest) -> StorageResult<()> {
        self.mutate(move |data| {
            let id = request.id.to_string();
            match data.requests.get(&id) {
                None => return Err(StorageError::NotFound(id)),
                Some(stored) if stored.approval_id.is_some() => {
                    return Err(StorageError::Conflict(id));
                }
                Some(_) => {}
            }
            data.requests.insert(id, request);
            Ok(())
        })
        .await
    }

    async fn create_approval(&self, approval: PairingApproval) -> StorageResult<()> {
        self.mutate(move |data| {
            let id = approval.id.to_string();
            if data.approvals.contains_key(&id) {
                return Err(StorageError::Duplicate(id));
            }
            data.approvals.insert(id, approval);
            Ok(())
        })
        .await
    }

    async fn get_approval(&self, id: &ApprovalId) -> StorageResult<Option<ApprovalRecord>> {
        let data = self.data.read().await;
        let Some(approval) = data.approvals.get(&id.to_string()) else {
            return Ok(None);
        };
        let credential = approval
            .credential_id
            .as_ref()
            .and_then(|credential_id| data.credentials.get(&credential_id.to_string()))
            .cloned();
        Ok(Some(ApprovalRecord {
            approval: approval.clone(),
            credential,
        }))
    }

    async fn update_approval(&self, approval: PairingApproval) -> StorageResult<()> {
        self.mutate(move |data| {
            let id = approval.id.to_string();
            match data.approvals.get(&id) {
                None => return Err(StorageError::NotFound(id)),
                Some(stored) if stored.credential_id.is_some() => {
                    return Err(StorageError::Conflict(id));
                }
                Some(_) => {}
            }
            data.approvals.insert(id, approval);
            Ok(())
        })
        .await
    }

    async fn create_credential(&self, credential: PairingCredential) -> StorageResult<()> {
        self.mutate(move |data| {
            let id = credential.id.to_string();
            if data.credentials.contains_key(&id) {
                return Err(StorageError::Duplicate(id));
            }
            data.credentials.insert(id, credential);
            Ok(())
        })
        .await
    }

    async fn get_credential(&self, id: &CredentialId) -> StorageResult<Option<PairingCredential>> {
        let data = self.data.read().await;
        Ok(data.credentials.get(&id.to_string()).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::User;
    use chrono::{Duration, Utc};
    use tempfile::tempdir;

    fn request() -> PairingRequest {
        let now = Utc::now();
        PairingRequest::new("request-hash".to_string(), now, now + Duration::minutes(5))
    }

    fn approval_for(request: &PairingRequest) -> PairingApproval {
        let now = Utc::now();
        PairingApproval::new(
            request.id.clone(),
            &User::new("u1", "alice"),
            now,
            now + Duration::minutes(5),
        )
    }

    #[tokio::test]
    async fn test_request_chain_resolves() {
        let storage = PairingStorage::in_memory();
        let request = request();
        storage.create_request(request.clone()).await.unwrap();

        let loaded = storage.get_request(&request.id).await.unwrap().unwrap();
        assert!(loaded.approval.is_none());

        let approval = approval_for(&request);
        storage.create_approval(approval.clone()).await.unwrap();
        let mut linked = request.clone();
        linked.approval_id = Some(approval.id.clone());
        storage.update_request(linked).await.unwrap();

        let loaded = storage.get_request(&request.id).await.unwrap().unwrap();
        let attached = loaded.approval.unwrap();
        assert_eq!(attached.id, approval.id);
        assert_eq!(attached.username, "alice");
    }

    #[tokio::test]
    async fn test_update_is_write_once() {
        let storage = PairingStorage::in_memory();
        let request = request();
        storage.create_request(request.clone()).await.unwrap();

        let first = approval_for(&request);
        let second = approval_for(&request);
        storage.create_approval(first.clone()).await.unwrap();
        storage.create_approval(second.clone()).await.unwrap();

        let mut update = request.clone();
        update.approval_id = Some(first.id.clone());
        storage.update_request(update).await.unwrap();

        let mut overwrite = request.clone();
        overwrite.approval_id = Some(second.id.clone());
        let result = storage.update_request(overwrite).await;
        assert!(matches!(result, Err(StorageError::Conflict(_))));

        let loaded = storage.get_request(&request.id).await.unwrap().unwrap();
        assert_eq!(loaded.approval.unwrap().id, first.id);
    }

    #[tokio::test]
    async fn test_approval_credential_link() {
        let storage = PairingStorage::in_memory();
        let request = request();
        let approval = approval_for(&request);
        storage.create_approval(approval.clone()).await.unwrap();

        let credential =
            PairingCredential::for_approval(&approval, "credential-hash".to_string(), Utc::now());
        storage.create_credential(credential.clone()).await.unwrap();

        let mut linked = approval.clone();
        linked.credential_id = Some(credential.id.clone());
        storage.update_approval(linked.clone()).await.unwrap();
        assert!(matches!(
            storage.update_approval(linked).await,
            Err(StorageError::Conflict(_))
        ));

        let record = storage.get_approval(&approval.id).await.unwrap().unwrap();
        assert_eq!(record.credential.unwrap().id, credential.id);
        assert!(storage.get_credential(&credential.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_missing_rows() {
        let storage = PairingStorage::in_memory();
        assert!(storage.get_request(&RequestId::new()).await.unwrap().is_none());
        assert!(storage.get_approval(&ApprovalId::new()).await.unwrap().is_none());
        assert!(storage
            .get_credential(&CredentialId::new())
            .await
            .unwrap()
            .is_none());
        assert!(matches!(
            storage.update_request(request()).await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_duplicate_create_rejected() {
        let storage = PairingStorage::in_memory();
        let request = request();
        storage.create_request(request.clone()).await.unwrap();
        assert!(matches!(
            storage.create_request(request).await,
            Err(StorageError::Duplicate(_))
        ));
    }

    #[tokio::test]
    async fn test_storage_persistence() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pairings.json");

        let request = request();
        let approval = approval_for(&request);
        {
            let storage = PairingStorage::with_path(path.clone()).await.unwrap();
            storage.create_request(request.clone()).await.unwrap();
            storage.create_approval(approval.clone()).await.unwrap();
            let mut linked = request.clone();
            linked.approval_id = Some(approval.id.clone());
            storage.update_request(linked).await.unwrap();
        }

        // Reload from disk
        let storage = PairingStorage::with_path(path).await.unwrap();
        let loaded = storage.get_request(&request.id).await.unwrap().unwrap();
        assert_eq!(loaded.request.secret_hash, "request-hash");
        assert_eq!(loaded.approval.unwrap().id, approval.id);
        assert_eq!(storage.counts().await, (1, 1, 0));
    }

    #[tokio::test]
    async fn test_failed_save_leaves_tables_unchanged() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pairings.json");
        let storage = PairingStorage::with_path(path.clone()).await.unwrap();

        let request = request();
        storage.create_request(request.clone()).await.unwrap();
        let approval = approval_for(&request);
        storage.create_approval(approval.clone()).await.unwrap();

        // A directory where the temp file goes makes every save fail
        let blocker = path.with_extension("json.tmp");
        std::fs::create_dir(&blocker).unwrap();

        let mut linked = request.clone();
        linked.approval_id = Some(approval.id.clone());
        assert!(matches!(
            storage.update_request(linked.clone()).await,
            Err(StorageError::Io(_))
        ));
        assert!(matches!(
            storage.create_request(self::request()).await,
            Err(StorageError::Io(_))
        ));

        let loaded = storage.get_request(&request.id).await.unwrap().unwrap();
        assert!(loaded.request.approval_id.is_none());
        assert!(loaded.approval.is_none());
        assert_eq!(storage.counts().await, (1, 1, 0));

        // Once the disk recovers the same write goes through
        std::fs::remove_dir(&blocker).unwrap();
        storage.update_request(linked).await.unwrap();
        let reloaded = PairingStorage::with_path(path).await.unwrap();
        let loaded = reloaded.get_request(&request.id).await.unwrap().unwrap();
        assert_eq!(loaded.approval.unwrap().id, approval.id);
    }

    #[tokio::test]
    async fn test_corrupt_file_starts_fresh() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pairings.json");
        std::fs::write(&path, "{not json").unwrap();

        let storage = PairingStorage::with_path(path).await.unwrap();
        assert_eq!(storage.counts().await, (0, 0, 0));
    }
}
