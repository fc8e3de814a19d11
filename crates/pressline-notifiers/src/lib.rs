//! Delivery backends for Pressline.
//!
//! Every backend follows the same shape: decrypt credentials from the
//! channel settings, build a provider payload from notification +
//! content, perform one short-timeout network call, and translate the
//! provider's answer into the outcome taxonomy. Backends never raise;
//! any internal error collapses into an `ok=false` result so the
//! dispatcher's state machine never sees an unhandled failure.

pub mod email;
pub mod push;
pub mod registry;
pub mod social;
pub mod syndication;

pub use email::EmailNotifier;
pub use push::PushNotifier;
pub use registry::NotifierRegistry;
pub use social::SocialNotifier;
pub use syndication::{HttpDocumentApi, RemoteDocumentApi, RemoteResponse, SyndicationNotifier};
