use std::{
    collections::HashMap,
    fs,
    io::ErrorKind,
    path::PathBuf,
    sync::Mutex,
};

use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::auth::dto::PublicUser;

pub const IDENTITY_KEY: &str = "user";
pub const SIDEBAR_PINNED_KEY: &str = "sidebarPinned";

/// Cached identity, plus the session token when the server issued one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: Uuid,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl Identity {
    pub fn new(user: PublicUser, token: Option<String>) -> Self {
        Self {
            id: user.id,
            email: user.email,
            token,
        }
    }
}

/// Persistent string key/value storage.
pub trait LocalStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> anyhow::Result<()>;
    fn remove(&self, key: &str) -> anyhow::Result<()>;
}

/// One file per key inside a directory.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, key: &str) -> anyhow::Result<PathBuf> {
        if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
            return Err(anyhow!("invalid store key {key:?}"));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

impl LocalStore for FileStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let path = self.path(key)?;
        match fs::read_to_string(&path) {
            Ok(v) => Ok(Some(v)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("read {}", path.display())),
        }
    }

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        let path = self.path(key)?;
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("create {}", self.dir.display()))?;
        fs::write(&path, value).with_context(|| format!("write {}", path.display()))
    }

    fn remove(&self, key: &str) -> anyhow::Result<()> {
        let path = self.path(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("remove {}", path.display())),
        }
    }
}

#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl LocalStore for MemoryStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let entries = self.entries.lock().map_err(|_| anyhow!("store lock poisoned"))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        let mut entries = self.entries.lock().map_err(|_| anyhow!("store lock poisoned"))?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> anyhow::Result<()> {
        let mut entries = self.entries.lock().map_err(|_| anyhow!("store lock poisoned"))?;
        entries.remove(key);
        Ok(())
    }
}

/// Client-side session cache: remembers the identity returned by `POST /auth`
/// and reads it back on start-up. Logging out only forgets the local entry.
pub struct ClientSession<S: LocalStore> {
    store: S,
}

impl<S: LocalStore> ClientSession<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Identity cached by an earlier login or register, if any.
    ///
    /// An unreadable entry is dropped and treated as logged out.
    pub fn restore_identity(&self) -> anyhow::Result<Option<Identity>> {
        let Some(raw) = self.store.get(IDENTITY_KEY)? else {
            return Ok(None);
        };
        match serde_json::from_str::<Identity>(&raw) {
            Ok(identity) => Ok(Some(identity)),
            Err(e) => {
                warn!(error = %e, "discarding corrupt cached identity");
                self.store.remove(IDENTITY_KEY)?;
                Ok(None)
            }
        }
    }

    /// Route guard: operations that act as a user need a cached identity.
    pub fn require_identity(&self) -> anyhow::Result<Identity> {
        self.restore_identity()?
            .ok_or_else(|| anyhow!("not logged in; run `picshare login` first"))
    }

    pub fn remember(&self, identity: &Identity) -> anyhow::Result<()> {
        let raw = serde_json::to_string(identity)?;
        self.store.set(IDENTITY_KEY, &raw)
    }

    pub fn logout(&self) -> anyhow::Result<()> {
        self.store.remove(IDENTITY_KEY)
    }

    pub fn sidebar_pinned(&self) -> anyhow::Result<bool> {
        Ok(self
            .store
            .get(SIDEBAR_PINNED_KEY)?
            .and_then(|v| serde_json::from_str::<bool>(&v).ok())
            .unwrap_or(false))
    }

    pub fn set_sidebar_pinned(&self, pinned: bool) -> anyhow::Result<()> {
        self.store.set(SIDEBAR_PINNED_KEY, &pinned.to_string())
    }
}
