//! Direct messaging core: who may message whom, the two-party conversation
//! log, message mutation, and hand-off of message events to live delivery.
//!
//! [`MessagingService`] is the single entry point shared by the REST layer and
//! the WebSocket gateway. Its collaborators are capabilities passed in at
//! construction: a [`Directory`] of users, a [`ConversationStore`], and a
//! [`DeliverySink`] for best-effort live push.

pub mod contacts;
pub mod delivery;
pub mod directory;
pub mod error;
pub mod policy;
pub mod service;
pub mod sqlite;
pub mod store;

pub use delivery::{DeliverySink, NullSink};
pub use directory::{Directory, DirectoryUser, UserScan};
pub use error::{MessagingError, Result};
pub use service::{MessagingService, SendMessage, ServiceConfig};
pub use sqlite::{SqliteDirectory, SqliteStore};
pub use store::{ConversationStore, NewMessage, PageOptions, PairKey, StoredMessage};
