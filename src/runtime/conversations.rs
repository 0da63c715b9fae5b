//! In-process conversation state store

use super::traits::ConversationStore;
use crate::state_machine::ConvState;
use crate::store::UserId;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// Pending states keyed by user; idle users have no entry
#[derive(Default)]
pub struct InMemoryConversations {
    states: Mutex<HashMap<UserId, ConvState>>,
}

impl InMemoryConversations {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConversationStore for InMemoryConversations {
    fn take(&self, user_id: UserId) -> ConvState {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&user_id)
            .unwrap_or_default()
    }

    fn put(&self, user_id: UserId, state: ConvState) {
        let mut states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
        if state.is_idle() {
            states.remove(&user_id);
        } else {
            states.insert(user_id, state);
        }
    }

    fn peek(&self, user_id: UserId) -> ConvState {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&user_id)
            .cloned()
            .unwrap_or_default()
    }
}
