//! Persistence for Pressline.
//!
//! [`sqlite::SqliteNotificationStore`] is the canonical record store:
//! one table with a version column checked on every write. The
//! [`memory`] module holds in-memory implementations of the external
//! collaborators (content store, channel store, scheduler, index) used
//! by the engine test-suites and by local development.

pub mod memory;
pub mod sqlite;

pub use memory::{
    MemoryChannelStore, MemoryContentStore, MemoryNotificationStore, MemorySearchIndex,
    RecordingAlerts, RecordingScheduler,
};
pub use sqlite::SqliteNotificationStore;
