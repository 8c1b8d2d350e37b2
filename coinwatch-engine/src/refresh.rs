//! Periodic quote refresh loop.
//!
//! A single spawned task drives the `Idle -> Running -> Idle` cycle: each tick reads the
//! cache's current id set, issues one batched [`QuoteSource`] fetch, and merges the
//! result back through the cache. At most one fetch is in flight; a tick that fires
//! during an outstanding fetch is coalesced (skipped), never queued. Suspending the loop
//! cancels any in-flight fetch immediately, so a late response can never write.

use crate::{
    bus::{NotificationBus, WatchlistEvent},
    cache::WatchlistCache,
    quote::QuoteSource,
};
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::{Notify, watch},
    time::MissedTickBehavior,
};
use tracing::{debug, info, warn};

/// Default refresh interval between quote fetches.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

/// Env var overriding the refresh interval, in seconds.
pub const REFRESH_INTERVAL_ENV: &str = "COINWATCH_REFRESH_INTERVAL_SECS";

#[derive(Debug, Clone)]
pub struct RefreshConfig {
    pub interval: Duration,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_REFRESH_INTERVAL,
        }
    }
}

impl RefreshConfig {
    /// Config with the interval taken from `COINWATCH_REFRESH_INTERVAL_SECS` when set.
    pub fn from_env() -> Self {
        let interval = std::env::var(REFRESH_INTERVAL_ENV)
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_REFRESH_INTERVAL);
        Self { interval }
    }
}

/// Observable state of the refresh loop.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum RefreshState {
    Idle,
    Running,
    Suspended,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum Command {
    Run,
    Suspend,
    Shutdown,
}

/// Control handle for a spawned [`RefreshLoop`].
///
/// Dropping the handle shuts the loop down (the command channel closes).
#[derive(Debug)]
pub struct RefreshHandle {
    cmd_tx: watch::Sender<Command>,
    state_rx: watch::Receiver<RefreshState>,
    refresh_now: Arc<Notify>,
}

impl RefreshHandle {
    /// Suspend ticking and cancel any in-flight fetch. Ticks are skipped until resumed.
    pub fn suspend(&self) {
        let _ = self.cmd_tx.send(Command::Suspend);
    }

    /// Resume ticking after a suspend.
    pub fn resume(&self) {
        let _ = self.cmd_tx.send(Command::Run);
    }

    /// Request an immediate refresh tick, subject to the same coalescing rules.
    pub fn refresh_now(&self) {
        self.refresh_now.notify_one();
    }

    /// Stop the loop permanently.
    pub fn shutdown(&self) {
        let _ = self.cmd_tx.send(Command::Shutdown);
    }

    /// Current loop state.
    pub fn state(&self) -> RefreshState {
        *self.state_rx.borrow()
    }

    /// Watch receiver for observing state transitions.
    pub fn state_rx(&self) -> watch::Receiver<RefreshState> {
        self.state_rx.clone()
    }
}

/// The periodic refresh worker.
pub struct RefreshLoop {
    cache: Arc<WatchlistCache>,
    source: Arc<dyn QuoteSource>,
    bus: NotificationBus,
    config: RefreshConfig,
}

impl RefreshLoop {
    /// Spawn the refresh task and return its control handle.
    pub fn spawn(
        cache: Arc<WatchlistCache>,
        source: Arc<dyn QuoteSource>,
        bus: NotificationBus,
        config: RefreshConfig,
    ) -> RefreshHandle {
        let (cmd_tx, cmd_rx) = watch::channel(Command::Run);
        let (state_tx, state_rx) = watch::channel(RefreshState::Idle);
        let refresh_now = Arc::new(Notify::new());

        let worker = Self {
            cache,
            source,
            bus,
            config,
        };
        tokio::spawn(worker.run(cmd_rx, state_tx, Arc::clone(&refresh_now)));

        RefreshHandle {
            cmd_tx,
            state_rx,
            refresh_now,
        }
    }

    async fn run(
        self,
        mut cmd_rx: watch::Receiver<Command>,
        state_tx: watch::Sender<RefreshState>,
        refresh_now: Arc<Notify>,
    ) {
        info!(interval = ?self.config.interval, "refresh loop started");

        let mut ticker = tokio::time::interval(self.config.interval);
        // Ticks that fire while a fetch is outstanding are coalesced, never queued.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = refresh_now.notified() => {}
                changed = cmd_rx.changed() => {
                    if changed.is_err() {
                        // Every handle dropped: shut down.
                        break;
                    }
                    match *cmd_rx.borrow_and_update() {
                        Command::Shutdown => break,
                        Command::Suspend => {
                            let _ = state_tx.send(RefreshState::Suspended);
                        }
                        Command::Run => {
                            let _ = state_tx.send(RefreshState::Idle);
                        }
                    }
                    continue;
                }
            }

            if *cmd_rx.borrow() != Command::Run {
                // Suspended: skip the tick entirely.
                continue;
            }

            let ids = self.cache.coin_ids();
            if ids.is_empty() {
                continue;
            }

            let _ = state_tx.send(RefreshState::Running);

            // Race the fetch against suspend/shutdown: dropping the fetch future is the
            // cancellation, so a cancelled fetch's response can never reach the cache.
            let outcome = tokio::select! {
                result = self.source.fetch(&ids) => Some(result),
                _ = interrupted(&mut cmd_rx) => None,
            };

            // A refresh-now request that arrived while this fetch was outstanding is
            // coalesced into it, never queued behind it.
            tokio::select! {
                biased;
                _ = refresh_now.notified() => {}
                _ = std::future::ready(()) => {}
            }

            match outcome {
                Some(Ok(updates)) => {
                    let changed = self.cache.replace_quotes(updates);
                    debug!(
                        requested = ids.len(),
                        changed = changed.len(),
                        "refresh tick complete"
                    );
                    if !changed.is_empty() {
                        self.bus
                            .publish(WatchlistEvent::QuotesChanged { affected: changed });
                    }
                }
                Some(Err(err)) => {
                    // Non-fatal: quote data is best-effort, the next tick retries.
                    warn!(%err, requested = ids.len(), "refresh tick failed");
                    self.bus.publish(WatchlistEvent::RefreshFailed {
                        reason: err.to_string(),
                    });
                }
                None => {
                    debug!("in-flight refresh fetch cancelled");
                }
            }

            match *cmd_rx.borrow() {
                Command::Shutdown => break,
                Command::Suspend => {
                    let _ = state_tx.send(RefreshState::Suspended);
                }
                Command::Run => {
                    let _ = state_tx.send(RefreshState::Idle);
                }
            }
        }

        let _ = state_tx.send(RefreshState::Idle);
        info!("refresh loop stopped");
    }
}

/// Resolves when a suspend or shutdown command arrives (or every handle is dropped).
async fn interrupted(cmd_rx: &mut watch::Receiver<Command>) {
    loop {
        if cmd_rx.changed().await.is_err() {
            return;
        }
        match *cmd_rx.borrow_and_update() {
            Command::Suspend | Command::Shutdown => return,
            Command::Run => continue,
        }
    }
}
