/*!
 # Latest-value debouncing

 Raw input values are coalesced until a quiet period passes with no further
 input; only the most recent value is then dispatched, exactly once.
 Intermediate values are discarded. A dispatch that fails is not retried and
 does not block later input.

 The worker is a single background task per debouncer, so there is never
 more than one live timer. Cancelling the token while a value is pending
 drops it without dispatching.
*/

use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Where the debouncer is in its cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebounceState {
    /// No input waiting
    Idle,
    /// Input received, quiet period running
    Pending,
    /// Latest value handed to the dispatch callback
    Dispatching,
}

/// Handle to a running debounce worker
pub struct Debouncer<T> {
    input: watch::Sender<Option<T>>,
    state: watch::Receiver<DebounceState>,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl<T> Debouncer<T>
where
    T: Clone + Send + Sync + std::fmt::Debug + 'static,
{
    /// Spawns the worker. Must be called from within a tokio runtime.
    pub fn spawn<F>(quiet_period: Duration, token: CancellationToken, dispatch: F) -> Self
    where
        F: Fn(T) -> BoxFuture<'static, ()> + Send + Sync + 'static,
    {
        let (input, rx) = watch::channel(None);
        let (state_tx, state) = watch::channel(DebounceState::Idle);
        let handle = tokio::spawn(run(rx, state_tx, quiet_period, token.clone(), dispatch));
        Self {
            input,
            state,
            token,
            handle,
        }
    }

    /// Feeds a raw value, restarting the quiet period
    pub fn push(&self, value: T) {
        trace!("Debounce input {:?}", value);
        self.input.send_replace(Some(value));
    }

    pub fn state(&self) -> DebounceState {
        *self.state.borrow()
    }

    /// Stops the worker; a pending value is dropped
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl<T> Drop for Debouncer<T> {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

async fn run<T, F>(
    mut rx: watch::Receiver<Option<T>>,
    state: watch::Sender<DebounceState>,
    quiet_period: Duration,
    token: CancellationToken,
    dispatch: F,
) where
    T: Clone + Send + Sync + std::fmt::Debug + 'static,
    F: Fn(T) -> BoxFuture<'static, ()> + Send + Sync + 'static,
{
    'idle: loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
        state.send_replace(DebounceState::Pending);

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    debug!("Debounce cancelled with a pending value");
                    break 'idle;
                }
                changed = rx.changed() => {
                    if changed.is_err() {
                        break 'idle;
                    }
                    trace!("Quiet period restarted");
                }
                _ = time::sleep(quiet_period) => break,
            }
        }

        let latest = rx.borrow_and_update().clone();
        if let Some(value) = latest {
            state.send_replace(DebounceState::Dispatching);
            debug!("Dispatching debounced value {:?}", value);
            dispatch(value).await;
        }
        state.send_replace(DebounceState::Idle);
    }
    state.send_replace(DebounceState::Idle);
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use tokio::time::sleep;

    const QUIET: Duration = Duration::from_millis(1000);

    fn collector(token: CancellationToken) -> (Debouncer<u8>, Arc<Mutex<Vec<u8>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let debouncer = Debouncer::spawn(QUIET, token, move |value: u8| {
            let sink = Arc::clone(&sink);
            async move { sink.lock().push(value) }.boxed()
        });
        (debouncer, seen)
    }

    #[tokio::test(start_paused = true)]
    async fn burst_dispatches_only_the_last_value() {
        let (debouncer, seen) = collector(CancellationToken::new());
        for value in [10, 20, 30, 40] {
            debouncer.push(value);
            sleep(Duration::from_millis(300)).await;
        }
        assert_eq!(debouncer.state(), DebounceState::Pending);
        assert!(seen.lock().is_empty());

        sleep(Duration::from_millis(1500)).await;
        assert_eq!(*seen.lock(), vec![40]);
        assert_eq!(debouncer.state(), DebounceState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn separate_quiet_windows_dispatch_separately() {
        let (debouncer, seen) = collector(CancellationToken::new());
        debouncer.push(1);
        sleep(Duration::from_millis(1500)).await;
        debouncer.push(2);
        sleep(Duration::from_millis(1500)).await;
        assert_eq!(*seen.lock(), vec![1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_while_pending_drops_the_value() {
        let (debouncer, seen) = collector(CancellationToken::new());
        debouncer.push(70);
        sleep(Duration::from_millis(500)).await;
        debouncer.cancel();
        sleep(Duration::from_secs(5)).await;

        assert!(seen.lock().is_empty());
        assert!(debouncer.is_finished());
        assert_eq!(debouncer.state(), DebounceState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn parent_token_cancels_worker() {
        let parent = CancellationToken::new();
        let (debouncer, seen) = collector(parent.child_token());
        debouncer.push(5);
        parent.cancel();
        sleep(Duration::from_secs(2)).await;
        assert!(seen.lock().is_empty());
    }
}
