//! Credential Store — durable username → stored_credential mapping with
//! at-most-one entry per username.
//!
//! Backed by a single JSON file (`{"username": "96-hex-char-credential"}`)
//! rather than an embedded database — spec §4.1 allows either "an embedded
//! on-disk relational table or a flat serialized mapping". Guarded by a
//! `tokio::sync::RwLock` so concurrent lookups never block each other and a
//! concurrent insert can't race a lookup mid-write, matching the "never hold
//! a lock across network I/O" rule in spec §5 (writes only ever touch the
//! file, never a socket).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

/// Result of an `insert` attempt.
#[derive(Debug, PartialEq, Eq)]
pub enum InsertOutcome {
    Ok,
    Duplicate,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Users(HashMap<String, String>);

pub struct CredentialStore {
    path: PathBuf,
    users: RwLock<Users>,
}

impl CredentialStore {
    /// Open or create the store at `path`. A missing file is treated as an
    /// empty store — the file itself is created lazily on first insert,
    /// matching spec §4.1's `init()` idempotency requirement.
    pub async fn load(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let users = match tokio::fs::read_to_string(&path).await {
            Ok(content) => {
                serde_json::from_str(&content).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Users::default(),
            Err(e) => return Err(e),
        };
        Ok(Self {
            path,
            users: RwLock::new(users),
        })
    }

    /// Number of users currently in the store (for the admin `/status`
    /// endpoint).
    pub async fn len(&self) -> usize {
        self.users.read().await.0.len()
    }

    /// Insert a new user. Rejects duplicates without modifying the existing
    /// row.
    pub async fn insert(&self, username: &str, stored_credential: String) -> io::Result<InsertOutcome> {
        let mut users = self.users.write().await;
        if users.0.contains_key(username) {
            return Ok(InsertOutcome::Duplicate);
        }
        users.0.insert(username.to_string(), stored_credential);
        self.persist(&users).await?;
        Ok(InsertOutcome::Ok)
    }

    /// Look up a user's stored credential.
    pub async fn lookup(&self, username: &str) -> Option<String> {
        self.users.read().await.0.get(username).cloned()
    }

    async fn persist(&self, users: &Users) -> io::Result<()> {
        let content = serde_json::to_string_pretty(users).map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        // Write to a temp file and rename so a crash mid-write never leaves
        // a corrupt users.json behind.
        let tmp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, content).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }
}
