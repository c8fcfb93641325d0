//! # KV Storage Module
//!
//! The storage capability shared by both backends:
//!
//! - [`RelationalBackend`] emulates key-value semantics on SQLite
//! - [`HostedBackend`] delegates to a hosted key-value namespace
//!
//! Both implement [`KvBackend`]; the variant is picked once at startup.

pub mod errors;
pub mod record;
pub mod validation;
pub mod cursor;
pub mod clock;
pub mod backend;
pub mod hosted;
pub mod relational;
pub mod sweeper;

pub use errors::{KvError, KvResult};
pub use record::{
    KeyInfo, ListOptions, ListResult, PutOptions, ReadOptions, ValueWithMetadata,
    DEFAULT_LIST_LIMIT,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use backend::KvBackend;
pub use hosted::{HostedBackend, HostedNamespace, MemoryNamespace, NativeError};
pub use relational::RelationalBackend;
pub use sweeper::ExpirySweeper;
