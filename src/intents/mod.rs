//! Purchase intent ingestion.
//!
//! Two feeders deliver candidate intents: a push listener on the in-process
//! change channel and a fixed-interval poller over the intent table. Both hand
//! their batches to one [`IntentHub`], whose ledger merge is idempotent, so the
//! same intent arriving twice (from either feeder, in any order) is recorded
//! and announced once.

mod alerts;
mod feeders;
mod gate;
mod hub;
mod ledger;

pub use alerts::*;
pub use feeders::*;
pub use gate::*;
pub use hub::*;
pub use ledger::*;
