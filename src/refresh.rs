/*!
 # Periodic refresh

 While scheduling is enabled the controller keeps asking the executor to
 re-report the brightness: once immediately on activation, then every
 refresh interval until the timer is stopped.
*/

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::executor::{Executor, ExecutorResponse};

/// Longest period between refreshes; larger intervals are capped to this
pub const MAX_REFRESH_PERIOD: Duration = Duration::from_secs(24 * 60 * 60);

/// Raises a zero period to one second and caps it at [`MAX_REFRESH_PERIOD`]
pub fn clamp_period(period: Duration) -> Duration {
    period.clamp(Duration::from_secs(1), MAX_REFRESH_PERIOD)
}

/// Repeating refresh task. Dropping it stops the task.
pub struct RefreshTimer {
    period: Duration,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl RefreshTimer {
    /// Requests one refresh right away, then one every `period`.
    ///
    /// The period is bounded by [`clamp_period`].
    pub fn start(executor: Arc<dyn Executor>, period: Duration, token: CancellationToken) -> Self {
        let period = clamp_period(period);
        let task_token = token.clone();
        let handle = tokio::spawn(async move {
            if task_token.is_cancelled() {
                return;
            }
            refresh(executor.as_ref()).await;

            let first = Instant::now().checked_add(period).unwrap_or_else(Instant::now);
            let mut tick = time::interval_at(first, period);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = task_token.cancelled() => {
                        debug!("Periodic refresh stopped");
                        break;
                    }
                    _ = tick.tick() => refresh(executor.as_ref()).await,
                }
            }
        });
        debug!("Periodic refresh armed every {:?}", period);
        Self {
            period,
            token,
            handle,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn is_running(&self) -> bool {
        !self.token.is_cancelled() && !self.handle.is_finished()
    }

    pub fn stop(&self) {
        self.token.cancel();
    }
}

impl Drop for RefreshTimer {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

async fn refresh(executor: &dyn Executor) {
    match executor
        .subscribe_brightness()
        .await
        .and_then(ExecutorResponse::into_result)
    {
        Ok(message) => trace!("Refresh: {}", message),
        Err(e) => warn!("Periodic refresh failed: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{Call, RecordingExecutor};
    use tokio::time::sleep;

    fn subscribes(executor: &RecordingExecutor) -> usize {
        executor.count(|c| *c == Call::Subscribe)
    }

    #[tokio::test(start_paused = true)]
    async fn refreshes_immediately_then_on_every_period() {
        let executor = Arc::new(RecordingExecutor::new());
        let timer = RefreshTimer::start(
            executor.clone(),
            Duration::from_secs(10),
            CancellationToken::new(),
        );

        sleep(Duration::from_millis(1)).await;
        assert_eq!(subscribes(&executor), 1);

        sleep(Duration::from_secs(10)).await;
        assert_eq!(subscribes(&executor), 2);

        sleep(Duration::from_secs(20)).await;
        assert_eq!(subscribes(&executor), 4);
        assert!(timer.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_halts_further_refreshes() {
        let executor = Arc::new(RecordingExecutor::new());
        let timer = RefreshTimer::start(
            executor.clone(),
            Duration::from_secs(5),
            CancellationToken::new(),
        );
        sleep(Duration::from_millis(1)).await;
        timer.stop();
        sleep(Duration::from_secs(60)).await;

        assert_eq!(subscribes(&executor), 1);
        assert!(!timer.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn failures_do_not_stop_the_timer() {
        let executor = Arc::new(RecordingExecutor::new());
        executor.set_failing(true);
        let _timer = RefreshTimer::start(
            executor.clone(),
            Duration::from_secs(5),
            CancellationToken::new(),
        );
        sleep(Duration::from_millis(10_001)).await;
        assert_eq!(subscribes(&executor), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_period_is_raised() {
        let timer = RefreshTimer::start(
            Arc::new(RecordingExecutor::new()),
            Duration::ZERO,
            CancellationToken::new(),
        );
        assert_eq!(timer.period(), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn huge_period_is_capped_and_keeps_running() {
        let executor = Arc::new(RecordingExecutor::new());
        let timer = RefreshTimer::start(
            executor.clone(),
            Duration::from_secs(u64::MAX),
            CancellationToken::new(),
        );
        assert_eq!(timer.period(), MAX_REFRESH_PERIOD);

        sleep(Duration::from_millis(50)).await;
        assert_eq!(subscribes(&executor), 1);
        assert!(timer.is_running());

        sleep(MAX_REFRESH_PERIOD).await;
        assert_eq!(subscribes(&executor), 2);
        assert!(timer.is_running());
    }
}
