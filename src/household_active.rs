use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Context;
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::household;
use crate::model::HouseholdId;
use crate::AppResult;

pub const ACTIVE_HOUSEHOLD_KEY: &str = "activeHouseholdId";

/// Per-session key/value storage. Writes become durable on `save`.
pub trait SessionStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
    fn remove(&self, key: &str);
    fn save(&self) -> anyhow::Result<()>;
}

#[derive(Default)]
pub struct MemoryStore {
    data: Mutex<HashMap<String, String>>,
}

impl SessionStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.data
            .lock()
            .map(|guard| guard.get(key).cloned())
            .unwrap_or_default()
    }

    fn set(&self, key: &str, value: &str) {
        if let Ok(mut guard) = self.data.lock() {
            guard.insert(key.to_string(), value.to_string());
        }
    }

    fn remove(&self, key: &str) {
        if let Ok(mut guard) = self.data.lock() {
            guard.remove(key);
        }
    }

    fn save(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// JSON object on disk, one file per session. A missing file is an empty session.
pub struct FileStore {
    path: PathBuf,
    data: Mutex<HashMap<String, String>>,
}

impl FileStore {
    pub fn open(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let data = match fs::read_to_string(&path) {
            Ok(raw) if raw.trim().is_empty() => HashMap::new(),
            Ok(raw) => serde_json::from_str(&raw)
                .with_context(|| format!("parse session file {}", path.display()))?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(err) => {
                return Err(err).with_context(|| format!("read session file {}", path.display()))
            }
        };
        Ok(Self {
            path,
            data: Mutex::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.data
            .lock()
            .map(|guard| guard.get(key).cloned())
            .unwrap_or_default()
    }

    fn set(&self, key: &str, value: &str) {
        if let Ok(mut guard) = self.data.lock() {
            guard.insert(key.to_string(), value.to_string());
        }
    }

    fn remove(&self, key: &str) {
        if let Ok(mut guard) = self.data.lock() {
            guard.remove(key);
        }
    }

    fn save(&self) -> anyhow::Result<()> {
        let snapshot = self
            .data
            .lock()
            .map(|guard| guard.clone())
            .map_err(|_| anyhow::anyhow!("session store lock poisoned"))?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("create session dir {}", parent.display()))?;
        }
        let body = serde_json::to_vec_pretty(&snapshot)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, body).with_context(|| format!("write {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("replace session file {}", self.path.display()))?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct StoreHandle {
    inner: Arc<dyn SessionStore>,
}

impl StoreHandle {
    pub fn new(store: impl SessionStore + 'static) -> Self {
        Self {
            inner: Arc::new(store),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(MemoryStore::default())
    }

    pub fn file(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        Ok(Self::new(FileStore::open(path)?))
    }

    pub fn snapshot(&self) -> Option<String> {
        self.inner.get(ACTIVE_HOUSEHOLD_KEY)
    }

    fn persist(&self) {
        if let Err(err) = self.inner.save() {
            warn!(
                target: "needful",
                event = "active_household_store_save_failed",
                error = %err
            );
        }
    }
}

/// The active-household pointer of one session.
#[derive(Clone)]
pub struct HouseholdContext {
    store: StoreHandle,
}

impl HouseholdContext {
    pub fn new(store: StoreHandle) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(StoreHandle::in_memory())
    }

    pub fn store(&self) -> &StoreHandle {
        &self.store
    }

    /// Parsed pointer, or `None` when absent or unparsable. Not validated.
    pub fn get_active(&self) -> Option<HouseholdId> {
        self.store
            .snapshot()
            .and_then(|raw| raw.trim().parse::<HouseholdId>().ok())
    }

    pub fn set_active(&self, id: HouseholdId) {
        self.store.inner.set(ACTIVE_HOUSEHOLD_KEY, &id.to_string());
        self.store.persist();
        info!(target: "needful", event = "active_household_set", household_id = id);
    }

    pub fn clear(&self) {
        self.store.inner.remove(ACTIVE_HOUSEHOLD_KEY);
        self.store.persist();
        info!(target: "needful", event = "active_household_cleared");
    }

    /// Clear the pointer only when it currently names `id`.
    pub fn clear_if(&self, id: HouseholdId) -> bool {
        if self.get_active() == Some(id) {
            self.clear();
            true
        } else {
            false
        }
    }

    /// The pointer, re-checked against storage. A stale pointer (household
    /// gone or membership revoked) is cleared and reads as `None`.
    pub async fn resolve_active(
        &self,
        pool: &SqlitePool,
        user_id: &str,
    ) -> AppResult<Option<HouseholdId>> {
        let raw = self.store.snapshot();
        let Some(candidate) = raw.as_deref().and_then(|r| r.trim().parse::<HouseholdId>().ok())
        else {
            if raw.is_some() {
                warn!(
                    target: "needful",
                    event = "active_household_fallback",
                    reason = "unparsable"
                );
                self.clear();
            }
            return Ok(None);
        };

        let reason = if !household::household_exists(pool, candidate).await? {
            "not_found"
        } else if !household::is_member(pool, user_id, candidate).await? {
            "not_member"
        } else {
            return Ok(Some(candidate));
        };

        warn!(
            target: "needful",
            event = "active_household_fallback",
            reason,
            household_id = candidate
        );
        self.clear();
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_and_garbage_read_as_none() {
        let ctx = HouseholdContext::in_memory();
        assert_eq!(ctx.get_active(), None);

        ctx.store().inner.set(ACTIVE_HOUSEHOLD_KEY, "not-a-number");
        assert_eq!(ctx.get_active(), None);
        assert_eq!(ctx.store().snapshot().as_deref(), Some("not-a-number"));
    }

    #[test]
    fn set_then_clear() {
        let ctx = HouseholdContext::in_memory();
        ctx.set_active(42);
        assert_eq!(ctx.get_active(), Some(42));
        assert_eq!(ctx.store().snapshot().as_deref(), Some("42"));

        assert!(!ctx.clear_if(7));
        assert_eq!(ctx.get_active(), Some(42));
        assert!(ctx.clear_if(42));
        assert_eq!(ctx.get_active(), None);
    }

    #[test]
    fn file_store_survives_reopen() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("sessions").join("alice.json");

        let ctx = HouseholdContext::new(StoreHandle::file(&path)?);
        ctx.set_active(9);
        assert!(path.exists());

        let reopened = HouseholdContext::new(StoreHandle::file(&path)?);
        assert_eq!(reopened.get_active(), Some(9));

        reopened.clear();
        let cleared = HouseholdContext::new(StoreHandle::file(&path)?);
        assert_eq!(cleared.get_active(), None);
        Ok(())
    }

    #[test]
    fn file_store_rejects_corrupt_json() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("bad.json");
        fs::write(&path, "{ nope")?;
        assert!(FileStore::open(&path).is_err());
        Ok(())
    }
}
