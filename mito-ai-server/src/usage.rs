//! Metered usage counting for completions served through the Mito server.
//!
//! The count lives in the user's `user.json` next to the identity fields the
//! Mito server expects. [`UsageCounter`] loads it lazily on first use and
//! persists every increment; increments are serialized by its mutex. Store
//! access runs on the blocking thread pool.

use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex as StdMutex};

use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

const NUM_USAGES_FIELD: &str = "mito_ai_num_usages";
const USER_EMAIL_FIELD: &str = "user_email";
const STATIC_USER_ID_FIELD: &str = "static_user_id";

#[derive(Debug, Error)]
pub enum UsageStoreError {
    #[error("failed to access usage store: {0}")]
    Io(#[from] std::io::Error),

    #[error("usage store is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("usage store task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Who is asking, as sent to the Mito server.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserIdentity {
    pub email: Option<String>,
    pub user_id: Option<String>,
}

pub trait UsageStore: Send + Sync {
    fn load_usages(&self) -> Result<u64, UsageStoreError>;

    fn save_usages(&self, usages: u64) -> Result<(), UsageStoreError>;

    fn identity(&self) -> UserIdentity {
        UserIdentity::default()
    }
}

/// Usage store backed by a JSON object file; unknown fields are preserved.
pub struct JsonFileUsageStore {
    path: PathBuf,
}

impl JsonFileUsageStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn read_fields(&self) -> Result<Map<String, Value>, UsageStoreError> {
        if !self.path.exists() {
            return Ok(Map::new());
        }
        let content = fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(Map::new());
        }
        match serde_json::from_str::<Value>(&content)? {
            Value::Object(fields) => Ok(fields),
            _ => Ok(Map::new()),
        }
    }

    fn string_field(&self, fields: &Map<String, Value>, name: &str) -> Option<String> {
        fields.get(name).and_then(Value::as_str).map(str::to_owned)
    }
}

impl UsageStore for JsonFileUsageStore {
    fn load_usages(&self) -> Result<u64, UsageStoreError> {
        let fields = self.read_fields()?;
        Ok(fields.get(NUM_USAGES_FIELD).and_then(Value::as_u64).unwrap_or(0))
    }

    /// Writes the count, keeping other fields. A file that no longer parses
    /// is replaced so the count survives a restart.
    fn save_usages(&self, usages: u64) -> Result<(), UsageStoreError> {
        let mut fields = match self.read_fields() {
            Ok(fields) => fields,
            Err(UsageStoreError::Json(e)) => {
                warn!("Replacing unreadable usage store {:?}: {}", self.path, e);
                Map::new()
            }
            Err(e) => return Err(e),
        };
        fields.insert(NUM_USAGES_FIELD.to_string(), Value::from(usages));
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(&Value::Object(fields))?)?;
        debug!("Saved {} metered usages to {:?}", usages, self.path);
        Ok(())
    }

    fn identity(&self) -> UserIdentity {
        match self.read_fields() {
            Ok(fields) => UserIdentity {
                email: self.string_field(&fields, USER_EMAIL_FIELD),
                user_id: self.string_field(&fields, STATIC_USER_ID_FIELD),
            },
            Err(e) => {
                warn!("Failed to read user identity: {}", e);
                UserIdentity::default()
            }
        }
    }
}

#[derive(Default)]
pub struct InMemoryUsageStore {
    usages: StdMutex<u64>,
    identity: UserIdentity,
}

impl InMemoryUsageStore {
    pub fn new(usages: u64) -> Self {
        Self {
            usages: StdMutex::new(usages),
            identity: UserIdentity::default(),
        }
    }

    pub fn with_identity(mut self, identity: UserIdentity) -> Self {
        self.identity = identity;
        self
    }
}

impl UsageStore for InMemoryUsageStore {
    fn load_usages(&self) -> Result<u64, UsageStoreError> {
        Ok(*self.usages.lock().unwrap_or_else(|e| e.into_inner()))
    }

    fn save_usages(&self, usages: u64) -> Result<(), UsageStoreError> {
        *self.usages.lock().unwrap_or_else(|e| e.into_inner()) = usages;
        Ok(())
    }

    fn identity(&self) -> UserIdentity {
        self.identity.clone()
    }
}

pub struct UsageCounter {
    store: Arc<dyn UsageStore>,
    count: Mutex<Option<u64>>,
}

impl UsageCounter {
    pub fn new(store: impl UsageStore + 'static) -> Self {
        Self {
            store: Arc::new(store),
            count: Mutex::new(None),
        }
    }

    pub async fn current(&self) -> u64 {
        let mut count = self.count.lock().await;
        match *count {
            Some(current) => current,
            None => {
                let loaded = self.load().await;
                *count = Some(loaded);
                loaded
            }
        }
    }

    /// Adds one usage, persists it and returns the new total. A failed save
    /// is logged; the in-memory count still advances.
    pub async fn increment(&self) -> u64 {
        let mut count = self.count.lock().await;
        let next = match *count {
            Some(current) => current,
            None => self.load().await,
        } + 1;
        *count = Some(next);
        if let Err(e) = self.blocking(move |store| store.save_usages(next)).await {
            warn!("Failed to persist metered usage count: {}", e);
        }
        next
    }

    pub async fn identity(&self) -> UserIdentity {
        self.blocking(|store| Ok(store.identity()))
            .await
            .unwrap_or_else(|e| {
                warn!("Failed to read user identity: {}", e);
                UserIdentity::default()
            })
    }

    async fn load(&self) -> u64 {
        self.blocking(|store| store.load_usages())
            .await
            .unwrap_or_else(|e| {
                warn!("Failed to load metered usage count, starting from 0: {}", e);
                0
            })
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T, UsageStoreError>
    where
        T: Send + 'static,
        F: FnOnce(&dyn UsageStore) -> Result<T, UsageStoreError> + Send + 'static,
    {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || f(store.as_ref())).await?
    }
}
