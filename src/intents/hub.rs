use std::sync::{Arc, PoisonError, RwLock};

use chrono::Utc;
use serde::Serialize;
use strum::AsRefStr;

use crate::models::PurchaseIntent;

use super::{IntentAlertSink, IntentChange, IntentLedger, NotificationGate};

/// Which feeder delivered a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum FeedSource {
    Push,
    Poll,
}

/// What one `ingest` call did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Intents not seen before this call
    pub merged: usize,
    /// How many of those passed the freshness gate and were announced
    pub alerted: usize,
}

struct HubInner {
    ledger: IntentLedger,
    gate: NotificationGate,
    sinks: RwLock<Vec<Arc<dyn IntentAlertSink>>>,
}

/// One ledger, its notification gate, and the alert sinks. Cheap to clone;
/// clones share the same ledger.
#[derive(Clone)]
pub struct IntentHub {
    inner: Arc<HubInner>,
}

impl Default for IntentHub {
    fn default() -> Self {
        Self::new(NotificationGate::default())
    }
}

impl IntentHub {
    pub fn new(gate: NotificationGate) -> Self {
        Self {
            inner: Arc::new(HubInner {
                ledger: IntentLedger::new(),
                gate,
                sinks: RwLock::new(Vec::new()),
            }),
        }
    }

    pub fn ledger(&self) -> &IntentLedger {
        &self.inner.ledger
    }

    pub fn add_sink(&self, sink: Arc<dyn IntentAlertSink>) {
        self.inner
            .sinks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(sink);
    }

    /// Register a callback fired once per fresh, never-seen intent.
    pub fn on_new_intent<F>(&self, callback: F)
    where
        F: Fn(&PurchaseIntent) + Send + Sync + 'static,
    {
        self.add_sink(Arc::new(callback));
    }

    pub fn ingest(&self, batch: Vec<PurchaseIntent>, source: FeedSource) -> IngestReport {
        self.ingest_at(batch, source, Utc::now().timestamp())
    }

    /// Merge a batch and alert on whatever is both new and fresh at `now`.
    pub fn ingest_at(&self, batch: Vec<PurchaseIntent>, source: FeedSource, now: i64) -> IngestReport {
        if batch.is_empty() {
            return IngestReport::default();
        }

        let merged = self.inner.ledger.merge(batch);
        if merged.is_empty() {
            return IngestReport::default();
        }

        let fresh = self.inner.gate.select(&merged, now);
        if !fresh.is_empty() {
            let sinks = self
                .inner
                .sinks
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();
            for intent in &fresh {
                for sink in &sinks {
                    sink.notify(intent);
                }
            }
        }

        tracing::debug!(
            "Merged {} new intent(s) from {} feeder ({} alerted)",
            merged.len(),
            source.as_ref(),
            fresh.len()
        );

        IngestReport {
            merged: merged.len(),
            alerted: fresh.len(),
        }
    }

    /// Apply one change from the push channel.
    pub fn apply_change(&self, change: IntentChange) -> IngestReport {
        match change {
            IntentChange::Inserted(intent) => self.ingest(vec![intent], FeedSource::Push),
            IntentChange::Updated(intent) => {
                self.inner.ledger.apply_update(intent);
                IngestReport::default()
            }
            IntentChange::Deleted(id) => {
                self.inner.ledger.remove(&id);
                IngestReport::default()
            }
        }
    }
}
