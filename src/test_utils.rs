//! Test helpers shared by the unit tests.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::executor::{Executor, ExecutorResponse};
use crate::schedule::Schedule;
use crate::{Error, Result};

/// One request seen by [`RecordingExecutor`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Subscribe,
    SetBrightness(u8),
    UpdateSchedules(Vec<Schedule>, u64),
    CancelScheduler,
    CloseApp,
    Uuid,
}

/// Executor that records every request instead of acting on it
pub struct RecordingExecutor {
    calls: Mutex<Vec<Call>>,
    fail: AtomicBool,
    events: broadcast::Sender<u8>,
}

impl Default for RecordingExecutor {
    fn default() -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            calls: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
            events,
        }
    }
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent request fail
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().iter().filter(|c| pred(c)).count()
    }

    /// Push a brightness value as the backend would
    pub fn push_brightness(&self, value: u8) {
        let _ = self.events.send(value);
    }

    fn record(&self, call: Call) -> Result<ExecutorResponse> {
        self.calls.lock().push(call);
        if self.fail.load(Ordering::SeqCst) {
            Err(Error::ExecutorUnavailable("backend offline".to_owned()))
        } else {
            Ok(ExecutorResponse::ok("ok"))
        }
    }
}

#[async_trait]
impl Executor for RecordingExecutor {
    async fn subscribe_brightness(&self) -> Result<ExecutorResponse> {
        self.record(Call::Subscribe)
    }

    async fn set_brightness(&self, percentage: u8) -> Result<ExecutorResponse> {
        self.record(Call::SetBrightness(percentage))
    }

    async fn update_schedules(
        &self,
        schedules: Vec<Schedule>,
        refresh_interval: u64,
    ) -> Result<ExecutorResponse> {
        self.record(Call::UpdateSchedules(schedules, refresh_interval))
    }

    async fn cancel_scheduler(&self) -> Result<ExecutorResponse> {
        self.record(Call::CancelScheduler)
    }

    async fn close_app(&self) -> Result<ExecutorResponse> {
        self.record(Call::CloseApp)
    }

    async fn get_uuid_str(&self) -> Result<String> {
        self.record(Call::Uuid)
            .map(|_| "00000000-0000-4000-8000-000000000000".to_owned())
    }

    fn brightness_events(&self) -> broadcast::Receiver<u8> {
        self.events.subscribe()
    }
}
