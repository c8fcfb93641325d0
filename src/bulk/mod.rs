//! # Bulk Operations Module
//!
//! Fan-out helpers over [`KvBackend`](crate::kv::KvBackend):
//!
//! - [`BatchReadAggregator`] - bounded multi-key reads
//! - [`BulkWriteOrchestrator`] - concurrent writes with rate-limit retry
//! - [`BulkDeleteAggregator`] - concurrent deletes, no retry
//!
//! Writes are the only sub-operations retried. Bulk deletes and single-key
//! writes surface a rate-limit rejection directly.

pub mod result;
pub mod retry;
pub mod write;
pub mod delete;
pub mod batch_read;

pub use result::{BulkResult, EntryOutcome};
pub use retry::{ManualSleeper, RetryPolicy, Sleeper, TokioSleeper};
pub use write::{BulkWriteOrchestrator, WriteEntry};
pub use delete::BulkDeleteAggregator;
pub use batch_read::BatchReadAggregator;
