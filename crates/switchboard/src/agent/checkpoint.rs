//! Durable conversation checkpoints.
//!
//! The orchestrator writes a [`ConversationSnapshot`] after every mutation
//! through a [`CheckpointStore`]. Two backends are provided:
//!
//! - [`MemoryCheckpointStore`]: process-local, for tests and demos.
//! - [`FileCheckpointStore`]: one JSON file per conversation id, written
//!   atomically (synced temp file + rename) so a crash never leaves a torn
//!   snapshot.
//!
//! ```text
//! state_dir/
//!   conv-1.json
//!   user%40example.json
//!   .user%40example.lock     (only while a write is in progress)
//! ```
//!
//! Writes are compare-and-swap on [`ConversationSnapshot::revision`]: a put
//! succeeds only if it carries exactly the stored revision plus one. The
//! in-process orchestrator lock serializes turns; the revision check catches
//! writers in other processes sharing the same directory.

use super::state::{ConversationSnapshot, SNAPSHOT_VERSION};
use crate::error::OrchestratorError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// How long a writer waits for another process's per-id lock.
const LOCK_WAIT: Duration = Duration::from_secs(5);
/// Lock files older than this were left by a crashed writer.
const LOCK_STALE_AFTER: Duration = Duration::from_secs(30);

#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Replace the stored snapshot for `conversation_id`.
    ///
    /// `snapshot.revision` must be the stored revision plus one (1 for a new
    /// conversation). Otherwise nothing is written and the result is
    /// [`OrchestratorError::Conflict`].
    async fn put(
        &self,
        conversation_id: &str,
        snapshot: &ConversationSnapshot,
    ) -> Result<(), OrchestratorError>;

    /// The latest snapshot, or `None` for an unknown conversation.
    async fn get(
        &self,
        conversation_id: &str,
    ) -> Result<Option<ConversationSnapshot>, OrchestratorError>;
}

// ── MemoryCheckpointStore ──────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    snapshots: RwLock<HashMap<String, ConversationSnapshot>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.snapshots.read().await.len()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn put(
        &self,
        conversation_id: &str,
        snapshot: &ConversationSnapshot,
    ) -> Result<(), OrchestratorError> {
        let mut snapshots = self.snapshots.write().await;
        let stored = snapshots.get(conversation_id).map_or(0, |s| s.revision);
        check_revision(conversation_id, stored, snapshot.revision)?;
        snapshots.insert(conversation_id.to_string(), snapshot.clone());
        Ok(())
    }

    async fn get(
        &self,
        conversation_id: &str,
    ) -> Result<Option<ConversationSnapshot>, OrchestratorError> {
        Ok(self.snapshots.read().await.get(conversation_id).cloned())
    }
}

// ── FileCheckpointStore ────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    /// Create a store rooted at `dir`, creating the directory if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, OrchestratorError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| {
            OrchestratorError::Store(format!("failed to create {}: {e}", dir.display()))
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, conversation_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", encode_id(conversation_id)))
    }

    /// Take the cross-process write lock for one id. The lock is a file
    /// created with `create_new`, removed when the guard drops.
    async fn lock(&self, conversation_id: &str) -> Result<LockFile, OrchestratorError> {
        let path = self
            .dir
            .join(format!(".{}.lock", encode_id(conversation_id)));
        let deadline = tokio::time::Instant::now() + LOCK_WAIT;
        loop {
            match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(_) => return Ok(LockFile { path }),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if lock_is_stale(&path).await {
                        warn!("Removing stale checkpoint lock {}", path.display());
                        let _ = tokio::fs::remove_file(&path).await;
                        continue;
                    }
                    if tokio::time::Instant::now() >= deadline {
                        return Err(OrchestratorError::Store(format!(
                            "timed out waiting for lock {}",
                            path.display()
                        )));
                    }
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
                Err(e) => {
                    return Err(OrchestratorError::Store(format!(
                        "failed to create lock {}: {e}",
                        path.display()
                    )));
                }
            }
        }
    }

    async fn stored_revision(&self, path: &Path) -> Result<u64, OrchestratorError> {
        match read_snapshot(path).await? {
            Some(snapshot) => Ok(snapshot.revision),
            None => Ok(0),
        }
    }
}

struct LockFile {
    path: PathBuf,
}

impl Drop for LockFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!("Failed to release checkpoint lock {}: {e}", self.path.display());
        }
    }
}

async fn lock_is_stale(path: &Path) -> bool {
    let Ok(meta) = tokio::fs::metadata(path).await else {
        return false;
    };
    meta.modified()
        .ok()
        .and_then(|at| SystemTime::now().duration_since(at).ok())
        .is_some_and(|age| age > LOCK_STALE_AFTER)
}

fn check_revision(
    conversation_id: &str,
    stored: u64,
    incoming: u64,
) -> Result<(), OrchestratorError> {
    if incoming == stored + 1 {
        Ok(())
    } else {
        Err(OrchestratorError::Conflict {
            conversation_id: conversation_id.to_string(),
            expected: incoming.saturating_sub(1),
            found: stored,
        })
    }
}

async fn read_snapshot(path: &Path) -> Result<Option<ConversationSnapshot>, OrchestratorError> {
    let json = match tokio::fs::read_to_string(path).await {
        Ok(json) => json,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(OrchestratorError::Store(format!(
                "failed to read {}: {e}",
                path.display()
            )));
        }
    };
    let snapshot: ConversationSnapshot = serde_json::from_str(&json).map_err(|e| {
        OrchestratorError::Store(format!("failed to parse {}: {e}", path.display()))
    })?;
    if snapshot.version > SNAPSHOT_VERSION {
        warn!(
            "Snapshot {} has newer version {} (supported: {SNAPSHOT_VERSION})",
            path.display(),
            snapshot.version
        );
    }
    Ok(Some(snapshot))
}

/// Write `content` to `tmp_path`, sync it, rename it over `final_path`, and
/// sync the directory so the rename itself survives a host crash.
async fn write_durably(
    dir: &Path,
    tmp_path: &Path,
    final_path: &Path,
    content: &str,
) -> std::io::Result<()> {
    let mut file = tokio::fs::File::create(tmp_path).await?;
    file.write_all(content.as_bytes()).await?;
    file.flush().await?;
    file.sync_all().await?;
    drop(file);
    tokio::fs::rename(tmp_path, final_path).await?;
    #[cfg(unix)]
    tokio::fs::File::open(dir).await?.sync_all().await?;
    #[cfg(not(unix))]
    let _ = dir;
    Ok(())
}

/// Map a conversation id to a safe file stem. Bytes outside
/// `[A-Za-z0-9_-]` are percent-encoded, so distinct ids never collide.
fn encode_id(id: &str) -> String {
    let mut out = String::with_capacity(id.len());
    for byte in id.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn put(
        &self,
        conversation_id: &str,
        snapshot: &ConversationSnapshot,
    ) -> Result<(), OrchestratorError> {
        let final_path = self.path_for(conversation_id);
        let tmp_path = self
            .dir
            .join(format!(".{}.json.tmp", encode_id(conversation_id)));

        let json = serde_json::to_string_pretty(snapshot)
            .map_err(|e| OrchestratorError::Store(format!("failed to serialize snapshot: {e}")))?;

        let _lock = self.lock(conversation_id).await?;
        let stored = self.stored_revision(&final_path).await?;
        check_revision(conversation_id, stored, snapshot.revision)?;
        if let Err(e) = write_durably(&self.dir, &tmp_path, &final_path, &json).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(OrchestratorError::Store(format!(
                "failed to write {}: {e}",
                final_path.display()
            )));
        }

        debug!(
            "Checkpoint saved: {} (revision {})",
            final_path.display(),
            snapshot.revision
        );
        Ok(())
    }

    async fn get(
        &self,
        conversation_id: &str,
    ) -> Result<Option<ConversationSnapshot>, OrchestratorError> {
        read_snapshot(&self.path_for(conversation_id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Message;
    use crate::agent::state::ConversationState;

    fn snapshot(id: &str, text: &str, revision: u64) -> ConversationSnapshot {
        let mut state = ConversationState::new();
        state.append(Message::human(text));
        ConversationSnapshot::new(id, state).with_revision(revision)
    }

    #[test]
    fn encode_id_escapes_unsafe_bytes() {
        assert_eq!(encode_id("conv-1_a"), "conv-1_a");
        assert_eq!(encode_id("a/b"), "a%2Fb");
        assert_eq!(encode_id("../x"), "%2E%2E%2Fx");
        assert_ne!(encode_id("a b"), encode_id("a_b"));
    }

    #[tokio::test]
    async fn memory_store_put_get() {
        let store = MemoryCheckpointStore::new();
        assert!(store.get("c1").await.unwrap().is_none());
        store.put("c1", &snapshot("c1", "hi", 1)).await.unwrap();
        let got = store.get("c1").await.unwrap().unwrap();
        assert_eq!(got.state.messages[0].content, "hi");
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn file_store_round_trip_and_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path().join("state")).unwrap();

        store.put("user@x", &snapshot("user@x", "first", 1)).await.unwrap();
        store.put("user@x", &snapshot("user@x", "second", 2)).await.unwrap();

        let got = store.get("user@x").await.unwrap().unwrap();
        assert_eq!(got.conversation_id, "user@x");
        assert_eq!(got.state.messages[0].content, "second");
        assert!(dir.path().join("state/user%40x.json").exists());
        assert!(!dir.path().join("state/.user%40x.json.tmp").exists());
        assert!(!dir.path().join("state/.user%40x.lock").exists());
        assert_eq!(got.revision, 2);
    }

    #[tokio::test]
    async fn memory_store_rejects_stale_revision() {
        let store = MemoryCheckpointStore::new();
        store.put("c1", &snapshot("c1", "a", 1)).await.unwrap();
        store.put("c1", &snapshot("c1", "b", 2)).await.unwrap();

        let err = store.put("c1", &snapshot("c1", "stale", 2)).await.unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::Conflict {
                expected: 1,
                found: 2,
                ..
            }
        ));
        let got = store.get("c1").await.unwrap().unwrap();
        assert_eq!(got.state.messages[0].content, "b");
    }

    #[tokio::test]
    async fn file_stores_sharing_a_directory_detect_each_other() {
        let dir = tempfile::tempdir().unwrap();
        let a = FileCheckpointStore::new(dir.path()).unwrap();
        let b = FileCheckpointStore::new(dir.path()).unwrap();

        a.put("c1", &snapshot("c1", "from a", 1)).await.unwrap();
        let err = b.put("c1", &snapshot("c1", "from b", 1)).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Conflict { found: 1, .. }));

        b.put("c1", &snapshot("c1", "from b", 2)).await.unwrap();
        let got = a.get("c1").await.unwrap().unwrap();
        assert_eq!(got.state.messages[0].content, "from b");
    }

    #[tokio::test]
    async fn stale_lock_file_is_reclaimed() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path()).unwrap();
        let lock = dir.path().join(".c1.lock");
        let file = std::fs::File::create(&lock).unwrap();
        let old = SystemTime::now() - LOCK_STALE_AFTER - Duration::from_secs(5);
        file.set_modified(old).unwrap();
        drop(file);

        store.put("c1", &snapshot("c1", "hi", 1)).await.unwrap();
        assert!(!lock.exists());
    }

    #[tokio::test]
    async fn file_store_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path()).unwrap();
        assert!(store.get("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn file_store_corrupt_snapshot_is_store_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path()).unwrap();
        std::fs::write(dir.path().join("bad.json"), "{ nope").unwrap();
        let err = store.get("bad").await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Store(_)));
    }
}
