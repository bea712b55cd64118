use crate::store::StoreError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

#[async_trait]
pub trait Pollable: Send + Sync + 'static {
    /// Poller driving this store's background refresh.
    fn poller(&self) -> &Poller;

    /// Refresh hook invoked on every tick. `cancel` fires when the next tick
    /// supersedes this one or when polling stops; implementations must check
    /// it before committing state.
    async fn poll(&self, cancel: CancellationToken) -> Result<(), StoreError>;

    /// Must be called from within a tokio runtime.
    fn start_polling(self: &Arc<Self>, interval: Duration)
    where
        Self: Sized,
    {
        self.poller().start(Arc::downgrade(self), interval);
    }

    fn stop_polling(&self) {
        self.poller().stop();
    }

    fn is_polling(&self) -> bool {
        self.poller().is_polling()
    }
}

/// Shortest period a timer is armed with; a zero interval is raised to it.
pub const MIN_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Default)]
pub struct Poller {
    timer: Mutex<Option<CancellationToken>>,
}

impl Poller {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start<P: Pollable>(&self, target: Weak<P>, interval: Duration) {
        let mut timer = self.timer.lock();
        if let Some(previous) = timer.take() {
            previous.cancel();
        }
        let interval = interval.max(MIN_INTERVAL);
        let token = CancellationToken::new();
        let first_tick = Instant::now() + interval;
        debug!(interval_ms = interval.as_millis() as u64, "polling started");
        tokio::spawn(run_timer(target, first_tick, interval, token.clone()));
        *timer = Some(token);
    }

    pub fn stop(&self) {
        if let Some(token) = self.timer.lock().take() {
            token.cancel();
            debug!("polling stopped");
        }
    }

    pub fn is_polling(&self) -> bool {
        self.timer.lock().is_some()
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_timer<P: Pollable>(
    target: Weak<P>,
    first_tick: Instant,
    interval: Duration,
    timer: CancellationToken,
) {
    let mut ticks = tokio::time::interval_at(first_tick, interval);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut current: Option<CancellationToken> = None;

    loop {
        tokio::select! {
            biased;
            _ = timer.cancelled() => break,
            _ = ticks.tick() => {}
        }
        let Some(target) = target.upgrade() else {
            break;
        };

        if let Some(previous) = current.take() {
            previous.cancel();
        }
        // Child of the timer token so that stopping also cancels the tick.
        let token = timer.child_token();
        current = Some(token.clone());

        tokio::spawn(async move {
            match target.poll(token).await {
                Ok(()) => {}
                Err(err) if err.is_cancelled() => trace!("poll superseded"),
                Err(err) => warn!(error = %err, "poll failed; retrying on next tick"),
            }
        });
    }

    if let Some(last) = current {
        last.cancel();
    }
}
