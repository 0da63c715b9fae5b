//! Trait abstractions for runtime I/O
//!
//! These traits enable testing the dispatcher with mock implementations.

use crate::messenger::{ButtonRow, SendError};
use crate::report::{ReportDispatchError, ReportRequest};
use crate::state_machine::ConvState;
use crate::store::{ExpenseRecord, InsertOutcome, ReportRow, StoreResult, UserId};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;

/// Persistent per-user data
#[async_trait]
pub trait UserDataStore: Send + Sync {
    /// Insert a record unless it pushes spending in `budget_month` over the user's limit
    async fn insert_record(
        &self,
        record: &ExpenseRecord,
        user_name: &str,
        budget_month: NaiveDate,
    ) -> StoreResult<InsertOutcome>;

    /// Per-category totals of records at or after `since`
    async fn report_rows(&self, user_id: UserId, since: DateTime<Utc>) -> StoreResult<Vec<ReportRow>>;

    /// Add a category; adding an existing one is a no-op
    async fn insert_category(&self, user_id: UserId, name: &str, user_name: &str) -> StoreResult<()>;

    /// Categories in creation order
    async fn categories(&self, user_id: UserId) -> StoreResult<Vec<String>>;

    async fn currency(&self, user_id: UserId) -> StoreResult<Option<String>>;

    async fn set_currency(&self, user_id: UserId, code: &str, user_name: &str) -> StoreResult<()>;

    /// Monthly limit in base currency, `None` when unlimited
    async fn limit(&self, user_id: UserId) -> StoreResult<Option<Decimal>>;

    async fn set_limit(
        &self,
        user_id: UserId,
        limit: Option<Decimal>,
        user_name: &str,
    ) -> StoreResult<()>;

    /// The user's display currency, or `default` if none was chosen
    async fn currency_or(&self, user_id: UserId, default: &str) -> StoreResult<String> {
        Ok(self
            .currency(user_id)
            .await?
            .filter(|code| !code.is_empty())
            .unwrap_or_else(|| default.to_string()))
    }
}

/// Outbound chat messages
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send_message(&self, user_id: UserId, text: &str) -> Result<(), SendError>;

    async fn show_buttons(
        &self,
        user_id: UserId,
        text: &str,
        rows: &[ButtonRow],
    ) -> Result<(), SendError>;
}

/// Fire-and-forget dispatch of report computations
///
/// Implementations must return as soon as the request is handed off; the
/// result comes back through the completion path, never through this call.
#[async_trait]
pub trait ReportChannel: Send + Sync {
    async fn dispatch(&self, request: ReportRequest) -> Result<(), ReportDispatchError>;

    /// Topic the requests are published to
    fn topic(&self) -> &str;
}

/// Per-user pending conversation state
///
/// Working memory only; never persisted.
pub trait ConversationStore: Send + Sync {
    /// Read the user's state and reset it to idle in one step
    fn take(&self, user_id: UserId) -> ConvState;

    /// Arm a state for the user's next message
    fn put(&self, user_id: UserId, state: ConvState);

    /// Current state without clearing it
    #[allow(dead_code)] // Used in tests
    fn peek(&self, user_id: UserId) -> ConvState;
}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

#[async_trait]
impl<T: UserDataStore + ?Sized> UserDataStore for Arc<T> {
    async fn insert_record(
        &self,
        record: &ExpenseRecord,
        user_name: &str,
        budget_month: NaiveDate,
    ) -> StoreResult<InsertOutcome> {
        (**self).insert_record(record, user_name, budget_month).await
    }

    async fn report_rows(&self, user_id: UserId, since: DateTime<Utc>) -> StoreResult<Vec<ReportRow>> {
        (**self).report_rows(user_id, since).await
    }

    async fn insert_category(&self, user_id: UserId, name: &str, user_name: &str) -> StoreResult<()> {
        (**self).insert_category(user_id, name, user_name).await
    }

    async fn categories(&self, user_id: UserId) -> StoreResult<Vec<String>> {
        (**self).categories(user_id).await
    }

    async fn currency(&self, user_id: UserId) -> StoreResult<Option<String>> {
        (**self).currency(user_id).await
    }

    async fn set_currency(&self, user_id: UserId, code: &str, user_name: &str) -> StoreResult<()> {
        (**self).set_currency(user_id, code, user_name).await
    }

    async fn limit(&self, user_id: UserId) -> StoreResult<Option<Decimal>> {
        (**self).limit(user_id).await
    }

    async fn set_limit(
        &self,
        user_id: UserId,
        limit: Option<Decimal>,
        user_name: &str,
    ) -> StoreResult<()> {
        (**self).set_limit(user_id, limit, user_name).await
    }
}

#[async_trait]
impl<T: Messenger + ?Sized> Messenger for Arc<T> {
    async fn send_message(&self, user_id: UserId, text: &str) -> Result<(), SendError> {
        (**self).send_message(user_id, text).await
    }

    async fn show_buttons(
        &self,
        user_id: UserId,
        text: &str,
        rows: &[ButtonRow],
    ) -> Result<(), SendError> {
        (**self).show_buttons(user_id, text, rows).await
    }
}

#[async_trait]
impl<T: ReportChannel + ?Sized> ReportChannel for Arc<T> {
    async fn dispatch(&self, request: ReportRequest) -> Result<(), ReportDispatchError> {
        (**self).dispatch(request).await
    }

    fn topic(&self) -> &str {
        (**self).topic()
    }
}
