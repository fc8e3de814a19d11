//! # Pressline Core
//!
//! Shared data model and collaborator contracts for the Pressline
//! notification scheduling & delivery engine.
//!
//! ## Architecture
//! ```text
//! Content lifecycle event
//!   └── ScheduleSynchronizer ──► JobScheduler (keyed, replace-on-rekey)
//!         at fire time └── Dispatcher ──► NotifierRegistry
//!                             ├── push      (FCM-style HTTP)
//!                             ├── email     (SMTP)
//!                             ├── social    (webhook POST)
//!                             └── syndication (revisioned remote doc)
//! ```
//!
//! Everything here is persistence- and transport-agnostic: the concrete
//! stores, the scheduler substrate, and the provider backends live in the
//! sibling crates and plug in through the traits in [`traits`].

pub mod commands;
pub mod config;
pub mod error;
pub mod naming;
pub mod traits;
pub mod types;

pub use commands::{Command, ContentEvent, ContentTransition, NotificationEvent, SendNotification};
pub use config::PresslineConfig;
pub use error::{PresslineError, Result};
pub use naming::Naming;
pub use traits::{
    ChannelStore, ContentStore, JobScheduler, Notifier, NotificationStore, OperatorAlerts,
    SearchIndex,
};
pub use types::{
    Channel, ContentItem, ContentStatus, Notification, NotificationKind, NotificationQuery,
    NotifierResult, OutcomeCode, Page, SendStatus, SyncOperation,
};
