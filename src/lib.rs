/*!
 # SmartScreen brightness schedule library

 A Rust library for keeping a small set of time-of-day brightness schedules
 consistent, persisted and synchronised with an executor that applies them.

 ## Features

 * Schedule editing with a hard cap of five entries
 * Ordering and half-open overlap validation
 * Debounced "set brightness now" dispatch
 * Periodic re-assertion while scheduling is enabled
 * JSON settings persistence with typed defaults
 * Single-entry session back stack for screen navigation

 ## Example

 ```rust,no_run
 use std::sync::Arc;
 use smartscreen::*;

 #[tokio::main]
 async fn main() -> Result<()> {
     let store = SettingsStore::new(FileStore::open("smartscreen-settings.json"));
     let executor = Arc::new(LocalExecutor::new());

     let mut controller = ScheduleSyncController::new(store, executor);
     controller.start_session().await;

     // Slider input is debounced before it reaches the executor
     controller.update_brightness(40);

     controller.set_schedule_enabled(true);
     controller.save_all_settings().await?;
     Ok(())
 }
 ```
*/

use thiserror::Error;

/// Custom error types for the SmartScreen library
#[derive(Error, Debug)]
pub enum Error {
    /// Attempted to add a schedule beyond the cap
    #[error("You cannot add more than {0} schedules")]
    LimitReached(usize),

    /// A schedule is missing its start or end time
    #[error("Schedule {0} is incomplete; both 'from' and 'to' times are required")]
    IncompleteSchedule(usize),

    /// A complete schedule does not start strictly before it ends
    #[error("Schedule {0} has a 'from' time greater than or equal to its 'to' time")]
    InvalidOrdering(usize),

    /// Two complete schedules overlap
    #[error("Schedules {0} and {1} overlap")]
    OverlapConflict(usize, usize),

    /// The executor rejected a request or could not be reached
    #[error("Executor unavailable: {0}")]
    ExecutorUnavailable(String),

    /// No schedule exists at the given position
    #[error("No schedule at index {0}")]
    IndexOutOfRange(usize),

    /// The path does not name a known screen
    #[error("Unknown route: {0}")]
    UnknownRoute(String),

    /// The application id is not in the registry
    #[error("Unknown application: {0}")]
    UnknownApp(String),

    /// Filesystem error from the settings file
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Encoding error from the settings file
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether this is one of the schedule validation failures that abort a
    /// commit without side effects
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::LimitReached(_)
                | Error::IncompleteSchedule(_)
                | Error::InvalidOrdering(_)
                | Error::OverlapConflict(_, _)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

pub mod debounce;
pub mod executor;
pub mod history;
pub mod refresh;
pub mod routes;
pub mod schedule;
pub mod settings;
pub mod sync;
pub mod validation;

#[cfg(test)]
pub(crate) mod test_utils;

// Re-export key types
pub use debounce::{DebounceState, Debouncer};
pub use executor::{Executor, ExecutorResponse, LocalExecutor};
pub use history::NavigationHistory;
pub use routes::{AppEntry, AppRegistry, Route, Router};
pub use schedule::{Schedule, ScheduleSet, MAX_SCHEDULES};
pub use settings::{FileStore, KeyValueStore, MemoryStore, SettingKey, SettingsStore, SyncConfig};
pub use sync::ScheduleSyncController;
pub use validation::Endpoint;
