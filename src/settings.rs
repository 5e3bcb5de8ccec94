/*!
 # Settings persistence

 Key/value storage with JSON-encoded values and typed defaults.

 Reads never fail: a missing or undecodable value yields the caller's
 default. Writes never fail either; backend errors are logged and dropped.
*/

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, error, instrument, trace, warn};

use crate::schedule::{Schedule, ScheduleSet};

/// Default seconds between periodic refreshes while scheduling is enabled
pub const DEFAULT_REFRESH_INTERVAL: u64 = 10;

/// Keys under which the application persists its settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingKey {
    ChangeBasedOnTime,
    ScheduleEnabled,
    ScheduleRefreshInterval,
    ScheduleData,
    /// Session-scoped navigation stack
    AppHistory,
}

impl SettingKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            SettingKey::ChangeBasedOnTime => "changeBasedOnTime",
            SettingKey::ScheduleEnabled => "scheduleEnabled",
            SettingKey::ScheduleRefreshInterval => "scheduleRefreshInterval",
            SettingKey::ScheduleData => "scheduleData",
            SettingKey::AppHistory => "apphistory",
        }
    }
}

impl std::fmt::Display for SettingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw string storage behind a [`SettingsStore`]
pub trait KeyValueStore: Send + Sync {
    fn load(&self, key: &str) -> Option<String>;
    fn store(&self, key: &str, value: String);
}

/// Typed access to a [`KeyValueStore`]
#[derive(Clone)]
pub struct SettingsStore {
    backend: Arc<dyn KeyValueStore>,
}

impl SettingsStore {
    pub fn new<B: KeyValueStore + 'static>(backend: B) -> Self {
        Self {
            backend: Arc::new(backend),
        }
    }

    /// Fresh store backed by memory, as used for session storage
    pub fn in_memory() -> Self {
        Self::new(MemoryStore::default())
    }

    /// Decoded value for `key`, or `default` if absent or malformed
    pub fn get<T: DeserializeOwned>(&self, key: SettingKey, default: T) -> T {
        let Some(raw) = self.backend.load(key.as_str()) else {
            trace!("No stored value for {}, using default", key);
            return default;
        };
        match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(e) => {
                debug!("Stored value for {} is malformed ({}), using default", key, e);
                default
            }
        }
    }

    pub fn set<T: Serialize + ?Sized>(&self, key: SettingKey, value: &T) {
        match serde_json::to_string(value) {
            Ok(encoded) => {
                trace!("Storing {} = {}", key, encoded);
                self.backend.store(key.as_str(), encoded);
            }
            Err(e) => error!("Could not encode value for {}: {}", key, e),
        }
    }
}

impl std::fmt::Debug for SettingsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettingsStore").finish_non_exhaustive()
    }
}

/// Volatile store, cleared when dropped
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<String, String>>,
}

impl KeyValueStore for MemoryStore {
    fn load(&self, key: &str) -> Option<String> {
        self.values.read().get(key).cloned()
    }

    fn store(&self, key: &str, value: String) {
        self.values.write().insert(key.to_owned(), value);
    }
}

/// Store persisted as a single JSON object on disk, written through on every
/// change
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    values: RwLock<HashMap<String, String>>,
}

impl FileStore {
    /// Opens the store at `path`. A missing or unreadable file opens empty.
    #[instrument]
    pub fn open(path: impl AsRef<Path> + std::fmt::Debug) -> Self {
        let path = path.as_ref().to_path_buf();
        let values = match fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
                warn!("Settings file {} is malformed, starting empty: {}", path.display(), e);
                HashMap::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No settings file at {}, starting empty", path.display());
                HashMap::new()
            }
            Err(e) => {
                warn!("Could not read settings file {}: {}", path.display(), e);
                HashMap::new()
            }
        };
        Self {
            path,
            values: RwLock::new(values),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, values: &HashMap<String, String>) -> crate::Result<()> {
        let encoded = serde_json::to_string_pretty(values)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, encoded)?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn load(&self, key: &str) -> Option<String> {
        self.values.read().get(key).cloned()
    }

    fn store(&self, key: &str, value: String) {
        let mut values = self.values.write();
        values.insert(key.to_owned(), value);
        if let Err(e) = self.flush(&values) {
            error!("Could not write settings file {}: {}", self.path.display(), e);
        }
    }
}

/// Scalar settings governing schedule synchronisation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncConfig {
    /// Whether schedules govern the brightness
    pub schedule_enabled: bool,
    /// Seconds between periodic re-assertions to the executor
    pub refresh_interval: u64,
    /// UI preference, persisted but not interpreted here
    pub change_based_on_time_of_day: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            schedule_enabled: false,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            change_based_on_time_of_day: false,
        }
    }
}

impl SyncConfig {
    pub fn load(store: &SettingsStore) -> Self {
        let defaults = Self::default();
        Self {
            schedule_enabled: store.get(SettingKey::ScheduleEnabled, defaults.schedule_enabled),
            refresh_interval: store.get(
                SettingKey::ScheduleRefreshInterval,
                defaults.refresh_interval,
            ),
            change_based_on_time_of_day: store.get(
                SettingKey::ChangeBasedOnTime,
                defaults.change_based_on_time_of_day,
            ),
        }
    }

    pub fn persist(&self, store: &SettingsStore) {
        store.set(SettingKey::ChangeBasedOnTime, &self.change_based_on_time_of_day);
        store.set(SettingKey::ScheduleEnabled, &self.schedule_enabled);
        store.set(SettingKey::ScheduleRefreshInterval, &self.refresh_interval);
    }
}

/// Stored schedule set, or an empty one.
///
/// Entries are decoded one at a time; an entry that does not decode is
/// skipped without dropping the others.
pub fn load_schedules(store: &SettingsStore) -> ScheduleSet {
    let entries: Vec<serde_json::Value> = store.get(SettingKey::ScheduleData, Vec::new());
    let schedules = entries
        .into_iter()
        .enumerate()
        .filter_map(|(index, entry)| match serde_json::from_value::<Schedule>(entry) {
            Ok(schedule) => Some(schedule),
            Err(e) => {
                warn!("Skipping stored schedule {}: {}", index, e);
                None
            }
        })
        .collect();
    ScheduleSet::from_vec(schedules)
}

pub fn persist_schedules(store: &SettingsStore, schedules: &ScheduleSet) {
    store.set(SettingKey::ScheduleData, schedules.as_slice());
}
