/*!
 # Schedule synchronisation

 [`ScheduleSyncController`] owns the authoritative in-memory schedule set for
 one UI session, persists it, and keeps the executor in step with it under
 two independent timing regimes:

 * live slider input is debounced and only the latest value is sent;
 * while scheduling is enabled the executor is re-primed periodically.

 Commits are all-or-nothing: the schedule set is fully validated before it
 is persisted and dispatched, so neither the store nor the executor ever sees
 a partially invalid set.
*/

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::debounce::{DebounceState, Debouncer};
use crate::executor::{Executor, ExecutorResponse};
use crate::refresh::RefreshTimer;
use crate::schedule::{Schedule, ScheduleSet};
use crate::settings::{self, SettingsStore, SyncConfig};
use crate::validation::{self, Endpoint};
use crate::{Error, Result};

/// Quiet period before a slider value is sent to the executor
pub const DEFAULT_QUIET_PERIOD: Duration = Duration::from_millis(1000);

/// Bridge between locally edited schedules and the executor
pub struct ScheduleSyncController {
    store: SettingsStore,
    executor: Arc<dyn Executor>,
    config: SyncConfig,
    schedules: ScheduleSet,
    quiet_period: Duration,
    session: CancellationToken,
    session_active: bool,
    slider: Option<Debouncer<u8>>,
    refresh: Option<RefreshTimer>,
    live: Arc<watch::Sender<u8>>,
    listener: Option<JoinHandle<()>>,
}

impl ScheduleSyncController {
    /// Loads configuration and schedules from `store`.
    ///
    /// The store is read once here; later writes by other readers are not
    /// observed.
    pub fn new(store: SettingsStore, executor: Arc<dyn Executor>) -> Self {
        let config = SyncConfig::load(&store);
        let schedules = settings::load_schedules(&store);
        debug!(
            "Loaded {} schedules, scheduling {}",
            schedules.len(),
            if config.schedule_enabled { "enabled" } else { "disabled" }
        );
        let (live, _) = watch::channel(0);
        Self {
            store,
            executor,
            config,
            schedules,
            quiet_period: DEFAULT_QUIET_PERIOD,
            session: CancellationToken::new(),
            session_active: false,
            slider: None,
            refresh: None,
            live: Arc::new(live),
            listener: None,
        }
    }

    /// Overrides the slider quiet period
    pub fn with_quiet_period(mut self, quiet_period: Duration) -> Self {
        self.quiet_period = quiet_period;
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn schedules(&self) -> &ScheduleSet {
        &self.schedules
    }

    pub fn set_schedule_enabled(&mut self, enabled: bool) {
        self.config.schedule_enabled = enabled;
    }

    pub fn set_refresh_interval(&mut self, seconds: u64) {
        self.config.refresh_interval = seconds;
    }

    pub fn set_change_based_on_time_of_day(&mut self, enabled: bool) {
        self.config.change_based_on_time_of_day = enabled;
    }

    /// The live slider is disabled while schedules drive the brightness
    pub fn slider_locked(&self) -> bool {
        self.config.schedule_enabled
    }

    /// Appends an empty schedule, or fails with [`Error::LimitReached`]
    pub fn add_schedule(&mut self) -> Result<usize> {
        self.schedules.add()
    }

    pub fn remove_schedule(&mut self, index: usize) -> Result<Schedule> {
        self.schedules.remove(index)
    }

    pub fn clear_schedules(&mut self) {
        self.schedules.clear();
    }

    pub fn set_schedule_brightness(&mut self, index: usize, brightness: u8) -> Result<()> {
        let schedule = self
            .schedules
            .get_mut(index)
            .ok_or(Error::IndexOutOfRange(index))?;
        schedule.brightness = brightness;
        Ok(())
    }

    /// Applies new endpoints to a schedule and checks it interactively.
    ///
    /// Reversed times are swapped in place. The edit stays applied even
    /// when it overlaps another schedule, so the user can correct it; the
    /// overlap is reported as [`Error::OverlapConflict`].
    pub fn edit_schedule(
        &mut self,
        index: usize,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let schedule = self
            .schedules
            .get_mut(index)
            .ok_or(Error::IndexOutOfRange(index))?;
        schedule.from = from;
        schedule.to = to;
        if !schedule.is_complete() {
            return Ok(());
        }
        if validation::normalize(schedule) {
            debug!("Swapped times for schedule at index {}", index);
        }
        if let Some(other) = validation::find_overlap(&self.schedules, index) {
            warn!("Schedule {} overlaps schedule {}", index, other);
            return Err(Error::OverlapConflict(index, other));
        }
        debug!("Schedule at index {} is valid", index);
        Ok(())
    }

    /// Hours a time picker should disable for one end of a schedule
    pub fn disabled_hours(&self, index: usize, endpoint: Endpoint) -> Vec<u32> {
        self.schedules
            .get(index)
            .map(|s| validation::disabled_hours(s, endpoint))
            .unwrap_or_default()
    }

    /// Minutes a time picker should disable within `hour`
    pub fn disabled_minutes(&self, index: usize, endpoint: Endpoint, hour: u32) -> Vec<u32> {
        self.schedules
            .get(index)
            .map(|s| validation::disabled_minutes(s, endpoint, hour))
            .unwrap_or_default()
    }

    /// Latest brightness reported by the executor
    pub fn live_brightness(&self) -> watch::Receiver<u8> {
        self.live.subscribe()
    }

    /// Raw slider input; dispatched once the quiet period passes.
    ///
    /// The first call spawns the debounce worker, so it must be made from
    /// within a tokio runtime.
    pub fn update_brightness(&mut self, value: u8) {
        if self.slider.is_none() {
            self.slider = Some(self.spawn_slider());
        }
        if let Some(slider) = &self.slider {
            slider.push(value);
        }
    }

    pub fn debounce_state(&self) -> DebounceState {
        self.slider
            .as_ref()
            .map(Debouncer::state)
            .unwrap_or(DebounceState::Idle)
    }

    pub fn is_refreshing(&self) -> bool {
        self.refresh.as_ref().is_some_and(RefreshTimer::is_running)
    }

    /// Brings the executor in line with the stored configuration at the
    /// start of a session.
    ///
    /// Mirrors pushed brightness values into [`live_brightness`](Self::live_brightness).
    /// With scheduling enabled the stored schedules are dispatched and the
    /// periodic refresh is armed; otherwise the executor is asked once for
    /// the current value and told to stop scheduling.
    #[instrument(skip(self))]
    pub async fn start_session(&mut self) {
        self.session_active = true;
        self.spawn_listener();

        if self.config.schedule_enabled {
            if let Err(e) = self.dispatch_schedules().await {
                error!("Failed to update schedules: {}", e);
            }
            self.activate_refresh();
        } else {
            self.deactivate_refresh();
            if let Err(e) = self
                .executor
                .subscribe_brightness()
                .await
                .and_then(ExecutorResponse::into_result)
            {
                warn!("Failed to request brightness: {}", e);
            }
            self.cancel_executor_schedule().await;
        }
    }

    /// Persists the settings and, when scheduling is enabled, validates,
    /// persists and dispatches the schedule set.
    ///
    /// The scalar settings are always persisted. Schedules are truncated to
    /// the minute before validation, so a schedule that only spans seconds
    /// is rejected. On a validation failure the schedule set is neither
    /// persisted nor dispatched and the error is returned.
    ///
    /// An executor failure is reported after the set has been persisted, so
    /// the store is then ahead of the executor until the next commit.
    #[instrument(skip(self))]
    pub async fn save_all_settings(&mut self) -> Result<()> {
        self.config.persist(&self.store);

        if !self.config.schedule_enabled {
            self.deactivate_refresh();
            self.cancel_executor_schedule().await;
            info!("Settings saved");
            return Ok(());
        }

        let mut committed = self.schedules.clone();
        for schedule in committed.iter_mut() {
            schedule.truncate_to_minute();
        }
        if let Err(e) = validation::validate_all(&committed) {
            warn!("Not saving schedules: {}", e);
            return Err(e);
        }
        self.schedules = committed;
        settings::persist_schedules(&self.store, &self.schedules);

        if let Err(e) = self.dispatch_schedules().await {
            error!("Failed to update schedules: {}", e);
            return Err(e);
        }
        if self.session_active {
            self.activate_refresh();
        }
        info!("Settings saved");
        Ok(())
    }

    /// Asks the executor to terminate the host process
    pub async fn close_app(&self) -> Result<()> {
        self.executor
            .close_app()
            .await
            .and_then(ExecutorResponse::into_result)
            .map(|_| ())
    }

    pub async fn uuid(&self) -> Result<String> {
        self.executor.get_uuid_str().await
    }

    /// Ends the session: pending slider input is dropped and the periodic
    /// refresh stops. A later [`start_session`](Self::start_session) begins
    /// a fresh one.
    pub fn shutdown(&mut self) {
        debug!("Shutting down session");
        self.session.cancel();
        self.session = CancellationToken::new();
        self.session_active = false;
        self.slider = None;
        self.refresh = None;
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
    }

    async fn dispatch_schedules(&self) -> Result<()> {
        let message = self
            .executor
            .update_schedules(self.schedules.to_vec(), self.config.refresh_interval)
            .await
            .and_then(ExecutorResponse::into_result)?;
        info!("{}", message);
        Ok(())
    }

    async fn cancel_executor_schedule(&self) {
        match self
            .executor
            .cancel_scheduler()
            .await
            .and_then(ExecutorResponse::into_result)
        {
            Ok(message) => info!("{}", message),
            Err(e) => warn!("Cancel scheduler: {}", e),
        }
    }

    fn activate_refresh(&mut self) {
        let period = Duration::from_secs(self.config.refresh_interval);
        self.refresh = Some(RefreshTimer::start(
            Arc::clone(&self.executor),
            period,
            self.session.child_token(),
        ));
    }

    fn deactivate_refresh(&mut self) {
        if let Some(timer) = self.refresh.take() {
            timer.stop();
            debug!("Periodic refresh deactivated");
        }
    }

    fn spawn_slider(&self) -> Debouncer<u8> {
        let executor = Arc::clone(&self.executor);
        Debouncer::spawn(
            self.quiet_period,
            self.session.child_token(),
            move |value: u8| {
                let executor = Arc::clone(&executor);
                async move { dispatch_brightness(executor.as_ref(), value).await }.boxed()
            },
        )
    }

    fn spawn_listener(&mut self) {
        if let Some(previous) = self.listener.take() {
            previous.abort();
        }
        let mut events = self.executor.brightness_events();
        let live = Arc::clone(&self.live);
        let token = self.session.child_token();
        self.listener = Some(tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    event = events.recv() => match event {
                        Ok(value) => {
                            live.send_replace(value.min(100));
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            debug!("Skipped {} brightness updates", skipped);
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
        }));
    }
}

impl Drop for ScheduleSyncController {
    fn drop(&mut self) {
        self.session.cancel();
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
    }
}

async fn dispatch_brightness(executor: &dyn Executor, value: u8) {
    match executor
        .set_brightness(value)
        .await
        .and_then(ExecutorResponse::into_result)
    {
        Ok(message) => info!("{}", message),
        Err(e) => warn!("Failed to set brightness to {}: {}", value, e),
    }
}
