use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};

use super::poller::{PollOutcome, Poller, TickReport};
use crate::storage::FeedStore;

/// Source of poll ticks.
pub trait Ticker: Send + 'static {
    /// Resolves at the next tick, or `None` once no more ticks will come.
    fn tick(&mut self) -> impl Future<Output = Option<()>> + Send;
}

/// Fixed-interval ticker.
///
/// The first tick fires one full period after creation. Ticks missed while a
/// poll overran are dropped rather than fired in a burst.
pub struct IntervalTicker(Interval);

impl IntervalTicker {
    pub fn new(period: Duration) -> Self {
        let start = tokio::time::Instant::now() + period;
        let mut interval = tokio::time::interval_at(start, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Self(interval)
    }
}

impl Ticker for IntervalTicker {
    async fn tick(&mut self) -> Option<()> {
        self.0.tick().await;
        Some(())
    }
}

/// Ticker driven by hand through a [`ManualTrigger`].
pub struct ManualTicker(mpsc::Receiver<()>);

/// Fires ticks for a [`ManualTicker`].
#[derive(Clone)]
pub struct ManualTrigger(mpsc::Sender<()>);

impl ManualTicker {
    pub fn new() -> (ManualTrigger, Self) {
        let (tx, rx) = mpsc::channel(1);
        (ManualTrigger(tx), Self(rx))
    }
}

impl ManualTrigger {
    /// Queues a tick. Returns `false` once the scheduler has stopped.
    pub async fn fire(&self) -> bool {
        self.0.send(()).await.is_ok()
    }
}

impl Ticker for ManualTicker {
    async fn tick(&mut self) -> Option<()> {
        self.0.recv().await
    }
}

/// Drives [`Poller::poll_all`] from a [`Ticker`] on a background task.
///
/// Ticks are handled one after another on that task, so a tick can never
/// start while the previous one is still polling.
pub struct Scheduler;

impl Scheduler {
    /// Polls every `period` until shut down.
    pub fn spawn<S>(
        poller: Arc<Poller<S>>,
        period: Duration,
        reports: Option<mpsc::Sender<TickReport>>,
    ) -> SchedulerHandle
    where
        S: FeedStore + 'static,
    {
        Self::spawn_with(poller, IntervalTicker::new(period), reports)
    }

    /// Polls on every tick of `ticker` until shut down or the ticker ends.
    ///
    /// Each completed [`TickReport`] is sent on `reports` when given.
    pub fn spawn_with<S, T>(
        poller: Arc<Poller<S>>,
        mut ticker: T,
        reports: Option<mpsc::Sender<TickReport>>,
    ) -> SchedulerHandle
    where
        S: FeedStore + 'static,
        T: Ticker,
    {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => break,
                    tick = ticker.tick() => {
                        if tick.is_none() {
                            tracing::debug!("Ticker ended, stopping scheduler");
                            break;
                        }
                    }
                }

                match poller.poll_all().await {
                    Ok(PollOutcome::Completed(report)) => {
                        if let Some(tx) = &reports {
                            if tx.send(report).await.is_err() {
                                tracing::debug!("Tick report receiver dropped");
                            }
                        }
                    }
                    Ok(PollOutcome::Skipped) => {}
                    Err(e) => {
                        tracing::error!(error = %e, "Poll tick failed, retrying next tick");
                    }
                }
            }
            tracing::info!("Scheduler stopped");
        });

        SchedulerHandle {
            shutdown: shutdown_tx,
            task,
        }
    }
}

/// Cancellation handle for a running [`Scheduler`].
///
/// Dropping the handle also stops the scheduler at its next wait.
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Stops the scheduler after any tick in progress and waits for it.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "Scheduler task ended abnormally");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
