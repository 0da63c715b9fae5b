//! HTTP adapter
//!
//! Inbound chat messages arrive as JSON posts; outgoing messages are streamed
//! per user over Server-Sent Events.

mod handlers;
mod sse;
mod types;

pub use handlers::create_router;

use crate::messenger::BroadcastMessenger;
use crate::runtime::ProductionDispatcher;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<ProductionDispatcher>,
    pub messenger: BroadcastMessenger,
}

impl AppState {
    pub fn new(dispatcher: Arc<ProductionDispatcher>, messenger: BroadcastMessenger) -> Self {
        Self {
            dispatcher,
            messenger,
        }
    }
}
