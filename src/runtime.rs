//! Runtime for processing chat turns
//!
//! The dispatcher owns turn ordering and effect execution; everything it
//! talks to sits behind the traits in [`traits`].

mod conversations;
mod dispatcher;
pub mod traits;
mod turns;

#[cfg(test)]
pub mod testing;

pub use conversations::InMemoryConversations;
pub use dispatcher::{DispatchError, Dispatcher};
pub use traits::*;

use crate::messenger::BroadcastMessenger;
use crate::report::QueueReportChannel;
use crate::store::SqliteStore;

/// Type alias for the production dispatcher with concrete implementations
pub type ProductionDispatcher = Dispatcher<SqliteStore, BroadcastMessenger, QueueReportChannel>;
