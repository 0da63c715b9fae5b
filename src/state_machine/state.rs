//! Conversation state types

use serde::{Deserialize, Serialize};

/// What the bot expects from a user's next message
///
/// Exactly one value per user; `Idle` means nothing is pending.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConvState {
    #[default]
    Idle,
    /// A category was picked, an amount is expected
    AwaitingAmount { category: String },
    /// `/add_cat` was issued, a category name is expected
    AwaitingCategoryName,
    /// `/set_limit` was issued, a limit value is expected
    AwaitingLimit,
    /// `/add_tbl` was issued, a pasted table is expected
    AwaitingTable,
}

impl ConvState {
    pub fn is_idle(&self) -> bool {
        matches!(self, ConvState::Idle)
    }
}
