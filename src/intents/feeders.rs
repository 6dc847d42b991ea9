use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::db::{DbPool, queries};
use crate::error::Result;
use crate::models::PurchaseIntent;

use super::{FeedSource, IngestReport, IntentHub};

/// Default number of buffered changes before a slow listener starts lagging.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// A change to the intent table, as published on the push channel.
#[derive(Debug, Clone)]
pub enum IntentChange {
    Inserted(PurchaseIntent),
    Updated(PurchaseIntent),
    Deleted(String),
}

/// Push channel for intent changes. Writers publish after the row is stored.
#[derive(Clone)]
pub struct IntentEvents {
    tx: broadcast::Sender<IntentChange>,
}

impl Default for IntentEvents {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl IntentEvents {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn publish(&self, change: IntentChange) {
        // No listener is fine: the poller still picks the row up
        if self.tx.send(change).is_err() {
            tracing::debug!("Intent change published with no listener attached");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<IntentChange> {
        self.tx.subscribe()
    }
}

/// Default overlap re-read behind the poller's high-water mark.
pub const DEFAULT_POLL_OVERLAP: Duration = Duration::from_secs(5);

/// Poller settings.
#[derive(Debug, Clone, Copy)]
pub struct PollSettings {
    pub interval: Duration,
    /// How far behind the newest `created_at` seen so far each tick re-reads,
    /// to pick up rows committed late or with a slightly older timestamp
    pub overlap: Duration,
}

/// Where the poller has read up to.
///
/// The first read loads every intent. Later reads fetch only rows created at
/// or after the high-water mark minus the overlap, so a burst of any size is
/// eventually merged. Merge is idempotent, so re-reading the overlap is free
/// of side effects.
#[derive(Debug, Clone)]
pub struct PollCursor {
    high_water: Option<i64>,
    overlap_secs: i64,
}

impl Default for PollCursor {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_OVERLAP)
    }
}

impl PollCursor {
    pub fn new(overlap: Duration) -> Self {
        Self {
            high_water: None,
            overlap_secs: i64::try_from(overlap.as_secs()).unwrap_or(i64::MAX),
        }
    }

    /// Lower bound for the next read, or None before the first successful read.
    pub fn since(&self) -> Option<i64> {
        self.high_water
            .map(|high_water| high_water.saturating_sub(self.overlap_secs))
    }

    /// Read everything past the cursor and ingest it. The cursor only moves
    /// after a successful read, so a failed tick is retried in full.
    pub fn poll(&mut self, hub: &IntentHub, pool: &DbPool) -> Result<IngestReport> {
        let conn = pool.get()?;
        let intents = queries::list_purchase_intents_since(&conn, self.since())?;

        if let Some(newest) = intents.iter().map(|i| i.created_at).max() {
            self.high_water = Some(self.high_water.map_or(newest, |hw| hw.max(newest)));
        }
        Ok(hub.ingest(intents, FeedSource::Poll))
    }
}

/// Read every stored intent once and ingest it.
pub fn poll_once(hub: &IntentHub, pool: &DbPool) -> Result<IngestReport> {
    PollCursor::default().poll(hub, pool)
}

fn spawn_push_listener(
    hub: IntentHub,
    mut rx: broadcast::Receiver<IntentChange>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                // Also fires when the handle is dropped
                _ = shutdown.changed() => break,
                received = rx.recv() => match received {
                    Ok(change) => {
                        hub.apply_change(change);
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::warn!(
                            "Intent push listener lagged, skipped {} change(s); poller will catch up",
                            missed
                        );
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::info!("Intent push channel closed");
                        break;
                    }
                },
            }
        }
        tracing::debug!("Intent push listener stopped");
    })
}

fn spawn_poller(
    hub: IntentHub,
    pool: DbPool,
    settings: PollSettings,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut cursor = PollCursor::new(settings.overlap);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {
                    if let Err(e) = cursor.poll(&hub, &pool) {
                        tracing::warn!("Intent poll failed, retrying next tick: {}", e);
                    }
                }
            }
        }
        tracing::debug!("Intent poller stopped");
    })
}

/// Running feeders. Dropping the handle stops them as well, but without
/// waiting for the tasks to finish.
pub struct FeederHandle {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl FeederHandle {
    /// Start the push listener (when `events` is given) and the poller (when
    /// `poll` is given). Either one alone keeps the ledger consistent.
    pub fn spawn(
        hub: &IntentHub,
        pool: &DbPool,
        events: Option<&IntentEvents>,
        poll: Option<PollSettings>,
    ) -> Self {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let mut tasks = Vec::new();

        if let Some(events) = events {
            // Subscribe before spawning so nothing published after this call is missed
            let rx = events.subscribe();
            tasks.push(spawn_push_listener(hub.clone(), rx, shutdown_rx.clone()));
            tracing::info!("Intent push listener started");
        }

        if let Some(settings) = poll {
            tasks.push(spawn_poller(
                hub.clone(),
                pool.clone(),
                settings,
                shutdown_rx.clone(),
            ));
            tracing::info!(
                "Intent poller started (every {} ms, {} s overlap)",
                settings.interval.as_millis(),
                settings.overlap.as_secs()
            );
        }

        Self { shutdown, tasks }
    }

    /// Stop all feeders and wait for them to exit. Merge is idempotent, so a
    /// feeder stopped between ticks leaves nothing half-applied.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::warn!("Intent feeder task ended abnormally: {}", e);
            }
        }
    }
}
