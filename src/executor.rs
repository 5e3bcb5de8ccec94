/*!
 # Executor interface

 The executor is the backend that actually applies brightness values and
 enforces the active schedule set. Every request is asynchronous and answers
 with a `{success, message}` response; pushed brightness updates arrive on a
 separate broadcast channel.

 [`LocalExecutor`] is an in-process implementation that tracks the level
 in memory and runs the active schedules on a timer.
*/

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};
use uuid::Uuid;

use crate::refresh;
use crate::schedule::Schedule;
use crate::{Error, Result};

/// Answer to an executor request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorResponse {
    pub success: bool,
    pub message: String,
}

impl ExecutorResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }

    /// Turns an unsuccessful response into [`Error::ExecutorUnavailable`]
    pub fn into_result(self) -> Result<String> {
        if self.success {
            Ok(self.message)
        } else {
            Err(Error::ExecutorUnavailable(self.message))
        }
    }
}

/// Requests the controller can send to the backend
#[async_trait]
pub trait Executor: Send + Sync {
    /// Ask for the current brightness to be pushed on [`brightness_events`](Self::brightness_events)
    async fn subscribe_brightness(&self) -> Result<ExecutorResponse>;

    /// Apply a brightness percentage immediately
    async fn set_brightness(&self, percentage: u8) -> Result<ExecutorResponse>;

    /// Replace the active schedule set and refresh cadence (seconds)
    async fn update_schedules(
        &self,
        schedules: Vec<Schedule>,
        refresh_interval: u64,
    ) -> Result<ExecutorResponse>;

    /// Stop schedule-driven assertions
    async fn cancel_scheduler(&self) -> Result<ExecutorResponse>;

    /// Terminate the host process
    async fn close_app(&self) -> Result<ExecutorResponse>;

    /// Opaque identifier string
    async fn get_uuid_str(&self) -> Result<String>;

    /// Channel of pushed brightness values (0-100)
    fn brightness_events(&self) -> broadcast::Receiver<u8>;
}

/// Whether `now` falls in `[from, to)`, wrapping past midnight when `from > to`
pub fn in_time_range(now: NaiveTime, from: NaiveTime, to: NaiveTime) -> bool {
    if from <= to {
        now >= from && now < to
    } else {
        now >= from || now < to
    }
}

/// Brightness of the first complete schedule whose time-of-day window holds `now`
pub fn active_brightness(schedules: &[Schedule], now: NaiveTime) -> Option<u8> {
    schedules
        .iter()
        .filter_map(|s| s.bounds().map(|(from, to)| (from.time(), to.time(), s.brightness)))
        .find(|(from, to, _)| in_time_range(now, *from, *to))
        .map(|(_, _, brightness)| brightness)
}

/// Running schedule task and the token that stops it
struct Runner {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl Runner {
    fn stop(self) {
        self.token.cancel();
        self.handle.abort();
    }
}

/// In-process executor
pub struct LocalExecutor {
    level: Arc<Mutex<u8>>,
    events: broadcast::Sender<u8>,
    runner: Mutex<Option<Runner>>,
    shutdown: CancellationToken,
}

impl Default for LocalExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalExecutor {
    pub fn new() -> Self {
        Self::with_level(100)
    }

    pub fn with_level(level: u8) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            level: Arc::new(Mutex::new(level.min(100))),
            events,
            runner: Mutex::new(None),
            shutdown: CancellationToken::new(),
        }
    }

    /// Current brightness level
    pub fn level(&self) -> u8 {
        *self.level.lock()
    }

    /// Whether a schedule runner is active
    pub fn is_scheduling(&self) -> bool {
        self.runner
            .lock()
            .as_ref()
            .is_some_and(|runner| !runner.handle.is_finished())
    }

    /// Resolves once [`close_app`](Executor::close_app) has been requested
    pub async fn closed(&self) {
        self.shutdown.cancelled().await
    }

    fn apply(level: &Mutex<u8>, events: &broadcast::Sender<u8>, value: u8) {
        *level.lock() = value;
        // No receivers is fine
        let _ = events.send(value);
    }
}

impl Drop for LocalExecutor {
    fn drop(&mut self) {
        if let Some(runner) = self.runner.lock().take() {
            runner.stop();
        }
    }
}

#[async_trait]
impl Executor for LocalExecutor {
    #[instrument(skip(self))]
    async fn subscribe_brightness(&self) -> Result<ExecutorResponse> {
        let level = self.level();
        trace!("Reporting brightness {}%", level);
        let _ = self.events.send(level);
        Ok(ExecutorResponse::ok(format!("Brightness is {}", level)))
    }

    #[instrument(skip(self))]
    async fn set_brightness(&self, percentage: u8) -> Result<ExecutorResponse> {
        if percentage > 100 {
            warn!("Brightness value {} out of range (0-100)", percentage);
            return Ok(ExecutorResponse::failed("Error Setting Brightness"));
        }
        Self::apply(&self.level, &self.events, percentage);
        info!("Brightness set to {}%", percentage);
        Ok(ExecutorResponse::ok(format!("Brightness set to {}", percentage)))
    }

    #[instrument(skip(self, schedules), fields(count = schedules.len()))]
    async fn update_schedules(
        &self,
        schedules: Vec<Schedule>,
        refresh_interval: u64,
    ) -> Result<ExecutorResponse> {
        let period = refresh::clamp_period(Duration::from_secs(refresh_interval));
        let token = CancellationToken::new();
        let level = Arc::clone(&self.level);
        let events = self.events.clone();

        let task_token = token.clone();
        let handle = tokio::spawn(async move {
            let mut tick = time::interval(period);
            loop {
                tokio::select! {
                    _ = task_token.cancelled() => {
                        debug!("Brightness scheduling cancelled");
                        break;
                    }
                    _ = tick.tick() => {
                        let now = Utc::now().time();
                        if let Some(brightness) = active_brightness(&schedules, now) {
                            LocalExecutor::apply(&level, &events, brightness);
                            debug!("Brightness set to {}% for current schedule", brightness);
                        }
                    }
                }
            }
        });

        if let Some(previous) = self.runner.lock().replace(Runner { token, handle }) {
            debug!("Replacing running schedule");
            previous.stop();
        }
        info!("Schedules updated, refreshing every {:?}", period);
        Ok(ExecutorResponse::ok("Schedules updated"))
    }

    #[instrument(skip(self))]
    async fn cancel_scheduler(&self) -> Result<ExecutorResponse> {
        match self.runner.lock().take() {
            Some(runner) => {
                runner.stop();
                info!("Scheduler cancelled");
                Ok(ExecutorResponse::ok("Cancelled"))
            }
            None => Ok(ExecutorResponse::failed("No scheduler to cancel")),
        }
    }

    #[instrument(skip(self))]
    async fn close_app(&self) -> Result<ExecutorResponse> {
        info!("Close requested");
        self.shutdown.cancel();
        Ok(ExecutorResponse::ok("Closing"))
    }

    async fn get_uuid_str(&self) -> Result<String> {
        Ok(Uuid::new_v4().to_string())
    }

    fn brightness_events(&self) -> broadcast::Receiver<u8> {
        self.events.subscribe()
    }
}
