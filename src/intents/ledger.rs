use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::models::PurchaseIntent;

#[derive(Debug, Default)]
struct LedgerState {
    /// Newest first
    intents: Vec<PurchaseIntent>,
    /// Every id ever merged, including ones since removed
    seen: HashSet<String>,
}

impl LedgerState {
    fn sort(&mut self) {
        self.intents.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
    }
}

/// Ordered, deduplicated list of purchase intents.
///
/// Each ledger owns its seen-id set; independent ledgers share nothing.
#[derive(Debug, Default)]
pub struct IntentLedger {
    state: Mutex<LedgerState>,
}

impl IntentLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every mutation leaves the state sorted and deduplicated before the
    /// lock is released, so a poisoned lock still guards a usable ledger.
    fn lock(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Merge a batch of candidate intents and return the ones not seen before.
    ///
    /// Already-seen ids (and repeats within the batch) are dropped. When
    /// nothing is new the ledger is left untouched and the result is empty.
    /// Otherwise the whole list is re-sorted newest first, since a feeder may
    /// deliver older intents after newer ones.
    pub fn merge(&self, incoming: Vec<PurchaseIntent>) -> Vec<PurchaseIntent> {
        let mut state = self.lock();

        let mut fresh = Vec::new();
        for intent in incoming {
            if state.seen.insert(intent.id.clone()) {
                fresh.push(intent);
            }
        }
        if fresh.is_empty() {
            return fresh;
        }

        state.intents.extend(fresh.iter().cloned());
        state.sort();
        fresh
    }

    /// Replace an existing intent in place. Unknown ids are ignored and never
    /// treated as new.
    pub fn apply_update(&self, intent: PurchaseIntent) -> bool {
        let mut state = self.lock();
        let Some(slot) = state.intents.iter_mut().find(|i| i.id == intent.id) else {
            return false;
        };
        *slot = intent;
        state.sort();
        true
    }

    /// Drop an intent from the list. Its id stays seen, so a later poll that
    /// still returns it cannot bring it back or alert on it again.
    pub fn remove(&self, id: &str) -> bool {
        let mut state = self.lock();
        let before = state.intents.len();
        state.intents.retain(|i| i.id != id);
        state.seen.insert(id.to_string());
        state.intents.len() != before
    }

    pub fn snapshot(&self) -> Vec<PurchaseIntent> {
        self.lock().intents.clone()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.lock().intents.iter().any(|i| i.id == id)
    }

    pub fn len(&self) -> usize {
        self.lock().intents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
