//! Offline write queue and its background synchronizer.
//!
//! Writes that fail because the network is unreachable are persisted in
//! FIFO order. A reconnection signal drains the queue one entry at a time;
//! an entry is removed only after its replay succeeds, and the first failure
//! halts the drain until the next signal.

mod drain;
mod queue;

pub use drain::{DrainOutcome, Submitted, Synchronizer};
#[cfg(test)]
pub use queue::QueueEntry;
pub use queue::QueueStorage;
