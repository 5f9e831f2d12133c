use std::collections::BTreeSet;
use std::future::Future;
use std::mem;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use futures::{FutureExt, StreamExt, stream};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, instrument, warn};
use tracing_futures::Instrument;

use crate::error::{FetchError, PollerError, StoreError};
use crate::price_client::PriceSource;
use crate::price_store::PriceStore;
use crate::types::Observation;

#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub interval: Duration,
    pub fetch_timeout: Duration,
    pub store_timeout: Duration,
    /// Max symbols processed at once within a tick.
    pub concurrency: usize,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            fetch_timeout: Duration::from_secs(10),
            store_timeout: Duration::from_secs(5),
            concurrency: 8,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub recorded: usize,
    pub failed: usize,
}

#[derive(Debug, thiserror::Error)]
enum SymbolError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("store failed: {0}")]
    Store(#[from] StoreError),
    #[error("panicked while polling")]
    Panicked,
}

enum PollerState {
    Idle,
    Running {
        cancel: CancellationToken,
        handle: JoinHandle<()>,
    },
    Stopped,
}

struct Inner {
    source: Arc<dyn PriceSource>,
    store: Arc<dyn PriceStore>,
    tracked: RwLock<BTreeSet<String>>,
    config: PollerConfig,
    // Held for the whole of a tick, loop-driven or manual.
    tick_slot: tokio::sync::Mutex<()>,
}

/// Periodically fetches and records prices for a mutable set of symbols.
///
/// `track`/`untrack` may be called from any task while the loop runs; each
/// tick works on a snapshot of the set taken when it begins. The lifecycle is
/// one-shot: `Idle -> Running -> Stopped`. A stopped poller cannot be started
/// again, build a new one instead (which starts with an empty set).
pub struct Poller {
    inner: Arc<Inner>,
    state: Mutex<PollerState>,
}

impl Poller {
    pub fn new(
        source: Arc<dyn PriceSource>,
        store: Arc<dyn PriceStore>,
        config: PollerConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                source,
                store,
                tracked: RwLock::new(BTreeSet::new()),
                config,
                tick_slot: tokio::sync::Mutex::new(()),
            }),
            state: Mutex::new(PollerState::Idle),
        }
    }

    /// Start tracking a symbol
    /// Returns true if it was newly added
    pub fn track(&self, symbol: &str) -> bool {
        self.inner
            .tracked
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(symbol.to_string())
    }

    /// Stop tracking a symbol
    /// Returns true if it was tracked
    pub fn untrack(&self, symbol: &str) -> bool {
        self.inner
            .tracked
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(symbol)
    }

    /// Tracked symbols, sorted
    pub fn tracked(&self) -> Vec<String> {
        self.inner.snapshot()
    }

    pub fn config(&self) -> &PollerConfig {
        &self.inner.config
    }

    /// Spawn the polling loop on the current runtime. The loop also ends when
    /// `parent` is cancelled.
    pub fn start(&self, parent: &CancellationToken) -> Result<(), PollerError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match *state {
            PollerState::Idle => {}
            PollerState::Running { .. } => return Err(PollerError::AlreadyRunning),
            PollerState::Stopped => return Err(PollerError::Stopped),
        }
        if self.inner.config.interval.is_zero() {
            return Err(PollerError::InvalidInterval);
        }

        let cancel = parent.child_token();
        let handle = tokio::spawn(Arc::clone(&self.inner).run(cancel.clone()));
        *state = PollerState::Running { cancel, handle };

        info!(interval = ?self.inner.config.interval, "poller started");
        Ok(())
    }

    /// Signal the loop to stop and return without waiting for it.
    pub fn stop(&self) {
        drop(self.take_running());
    }

    /// Signal the loop to stop and wait until it has exited.
    pub async fn shutdown(&self) {
        if let Some(handle) = self.take_running() {
            if let Err(e) = handle.await {
                warn!(error = %e, "poller task ended abnormally");
            }
        }
    }

    /// False once stopped, or once the parent token has ended the loop.
    pub fn is_running(&self) -> bool {
        match &*self.state.lock().unwrap_or_else(PoisonError::into_inner) {
            PollerState::Running { handle, .. } => !handle.is_finished(),
            PollerState::Idle | PollerState::Stopped => false,
        }
    }

    /// Poll every tracked symbol once. The loop calls this on each interval.
    ///
    /// Only one tick runs at a time: if another tick is still in flight this
    /// returns an empty report without polling anything.
    pub async fn run_tick(&self) -> TickReport {
        self.inner.run_tick().await
    }

    fn take_running(&self) -> Option<JoinHandle<()>> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match mem::replace(&mut *state, PollerState::Stopped) {
            PollerState::Running { cancel, handle } => {
                cancel.cancel();
                info!("poller stop requested");
                Some(handle)
            }
            PollerState::Idle | PollerState::Stopped => None,
        }
    }
}

impl Inner {
    fn snapshot(&self) -> Vec<String> {
        self.tracked
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut ticker = interval(self.config.interval);
        // A slow tick swallows the firings it overlapped instead of queueing them.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("in-flight tick abandoned");
                    break;
                }
                _ = self.run_tick() => {}
            }
        }

        info!("poller stopped");
    }

    #[instrument(name = "tick", skip(self))]
    async fn run_tick(&self) -> TickReport {
        let Ok(_slot) = self.tick_slot.try_lock() else {
            debug!("previous tick still running, skipping");
            return TickReport::default();
        };

        let symbols = self.snapshot();
        if symbols.is_empty() {
            debug!("no tracked symbols");
            return TickReport::default();
        }

        info!(total_symbols = symbols.len(), "polling symbols");

        let mut tasks = stream::iter(symbols)
            .map(|symbol| {
                let span = info_span!("poll_symbol", symbol = %symbol);

                async move {
                    let res = AssertUnwindSafe(self.poll_symbol(&symbol))
                        .catch_unwind()
                        .await
                        .unwrap_or(Err(SymbolError::Panicked));

                    match res {
                        Ok(obs) => {
                            debug!(price = %obs.price, observed_at = obs.observed_at, "recorded");
                            true
                        }
                        Err(e) => {
                            warn!(error = %e, "symbol skipped this tick");
                            false
                        }
                    }
                }
                .instrument(span)
            })
            .buffer_unordered(self.config.concurrency.max(1));

        let mut report = TickReport::default();
        while let Some(ok) = tasks.next().await {
            if ok {
                report.recorded += 1;
            } else {
                report.failed += 1;
            }
        }

        info!(
            recorded = report.recorded,
            failed = report.failed,
            "completed tick"
        );
        report
    }

    async fn poll_symbol(&self, symbol: &str) -> Result<Observation, SymbolError> {
        let obs = timeout(self.config.fetch_timeout, self.source.fetch(symbol))
            .await
            .map_err(|_| FetchError::Timeout)??;

        let id = self.store_call(self.store.resolve_symbol(symbol)).await?;
        self.store_call(self.store.record_price(id, obs.price, obs.observed_at))
            .await?;

        Ok(obs)
    }

    async fn store_call<T>(
        &self,
        op: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        timeout(self.config.store_timeout, op)
            .await
            .map_err(|_| StoreError::Timeout)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_store::MemoryPriceStore;
    use crate::types::Price;
    use async_trait::async_trait;

    struct FixedSource;

    #[async_trait]
    impl PriceSource for FixedSource {
        async fn fetch(&self, _symbol: &str) -> Result<Observation, FetchError> {
            Ok(Observation {
                price: Price::from_cents(100),
                observed_at: 1,
            })
        }
    }

    fn poller() -> Poller {
        Poller::new(
            Arc::new(FixedSource),
            Arc::new(MemoryPriceStore::new()),
            PollerConfig::default(),
        )
    }

    #[test]
    fn track_is_idempotent() {
        let poller = poller();

        assert!(poller.track("BTC"));
        assert!(!poller.track("BTC"));
        assert_eq!(poller.tracked(), vec!["BTC".to_string()]);
    }

    #[test]
    fn untrack_unknown_is_noop() {
        let poller = poller();
        poller.track("ETH");

        assert!(!poller.untrack("BTC"));
        assert_eq!(poller.tracked(), vec!["ETH".to_string()]);

        assert!(poller.untrack("ETH"));
        assert!(poller.tracked().is_empty());
    }

    #[test]
    fn tracked_is_sorted_and_case_sensitive() {
        let poller = poller();
        poller.track("eth");
        poller.track("BTC");
        poller.track("ETH");

        assert_eq!(poller.tracked(), vec!["BTC", "ETH", "eth"]);
    }

    #[tokio::test]
    async fn empty_tick_does_nothing() {
        let poller = poller();
        assert_eq!(poller.run_tick().await, TickReport::default());
    }

    #[test]
    fn stop_before_start_prevents_start() {
        let poller = poller();
        poller.stop();

        let token = CancellationToken::new();
        assert_eq!(poller.start(&token), Err(PollerError::Stopped));
        assert!(!poller.is_running());
    }

    #[tokio::test]
    async fn zero_interval_is_rejected() {
        let poller = Poller::new(
            Arc::new(FixedSource),
            Arc::new(MemoryPriceStore::new()),
            PollerConfig {
                interval: Duration::ZERO,
                ..PollerConfig::default()
            },
        );

        let token = CancellationToken::new();
        assert_eq!(poller.start(&token), Err(PollerError::InvalidInterval));
        assert!(!poller.is_running());
    }
}
