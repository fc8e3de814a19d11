//! # Pressline Engine
//!
//! The notification lifecycle engine: a pure state machine over
//! notification records, the schedule synchronizer that keeps delivery
//! jobs consistent with content and record lifecycles, and the
//! dispatcher that runs at fire time.
//!
//! ## Flow
//! ```text
//! content lifecycle event
//!   └── ScheduleSynchronizer (fan-out over bound records)
//!         └── NotificationService.update
//!               └── JobPlanner → JobScheduler (keyed, replace)
//! job fires
//!   └── Dispatcher.handle
//!         ├── stale?           → no-op
//!         ├── preconditions    → terminal result
//!         ├── NotifierRegistry → one delivery attempt
//!         └── classify: reschedule with backoff | mark sent | mark failed
//! ```

pub mod dispatch;
pub mod record;
pub mod runtime;
pub mod service;
pub mod sync;

pub use dispatch::{Dispatcher, DispatchOutcome};
pub use record::{mark_failed, mark_sent, prepare_create, prepare_delete, prepare_update};
pub use runtime::{recover_jobs, run_due, spawn_delivery_loop, TickScheduler};
pub use service::NotificationService;
pub use sync::{JobAction, JobPlanner, ScheduleSynchronizer};
