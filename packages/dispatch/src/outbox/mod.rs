//! Transactional outbox: write-ahead storage, retry scheduling, replay, and
//! the background poller that drains pending events.

pub mod manager;
pub mod memory;
pub mod retry;
pub mod worker;

pub use manager::OutboxManager;
pub use memory::{InMemoryOutboxStorage, OutboxItem};
pub use retry::{plan_retry, RetryDecision};
pub use worker::{BackgroundRunnable, BackgroundWorker, OutboxPoller, OutboxTask};
