//! Turn executor
//!
//! Serializes turns per user, reads and clears the pending state, runs the
//! pure transition and then the effect it selects. Every turn ends with
//! exactly one reply to the user, including failed ones.

use super::traits::{ConversationStore, Messenger, ReportChannel, UserDataStore};
use super::turns::TurnLocks;
use crate::currency::{CurrencyError, ExchangeRates};
use crate::messenger::{Reply, SendError};
use crate::parsing::{parse_amount, parse_expense_amount, parse_import_line, ParseError};
use crate::period::start_of_day;
use crate::report::ReportPipeline;
use crate::state_machine::{transition, Effect, IncomingMessage, TransitionResult};
use crate::store::{ExpenseRecord, InsertOutcome, StoreError, UserId};
use crate::texts;
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::Instrument;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Invalid input: {0}")]
    Parse(#[from] ParseError),
    #[error("Currency conversion failed: {0}")]
    Currency(#[from] CurrencyError),
    #[error("Storage failed: {0}")]
    Store(#[from] StoreError),
    #[error(transparent)]
    Send(#[from] SendError),
    #[error("Turn timed out after {0:?}")]
    Timeout(Duration),
}

impl DispatchError {
    /// Reply shown to the user when a turn fails
    pub fn user_message(&self) -> &'static str {
        match self {
            DispatchError::Parse(_) => texts::ERR_AMOUNT,
            DispatchError::Currency(_) => texts::ERR_CONVERSION,
            DispatchError::Store(_) => texts::ERR_STORAGE,
            DispatchError::Timeout(_) => texts::ERR_TIMEOUT,
            DispatchError::Send(_) => texts::ERR_GENERIC,
        }
    }
}

/// Why a single line of a bulk import was not saved
#[derive(Debug)]
enum LineFailure {
    Format(ParseError),
    Category(StoreError),
    Conversion(CurrencyError),
    OverLimit,
    Record(StoreError),
}

impl LineFailure {
    fn reason(&self) -> &'static str {
        match self {
            LineFailure::Format(_) => texts::LINE_ERR_FORMAT,
            LineFailure::Category(_) => texts::LINE_ERR_CATEGORY,
            LineFailure::Conversion(_) => texts::LINE_ERR_CONVERSION,
            LineFailure::OverLimit => texts::LINE_ERR_OVER_LIMIT,
            LineFailure::Record(_) => texts::LINE_ERR_RECORD,
        }
    }

    fn detail(&self) -> String {
        match self {
            LineFailure::Format(e) => e.to_string(),
            LineFailure::Category(e) => format!("category: {e}"),
            LineFailure::Conversion(e) => format!("conversion: {e}"),
            LineFailure::OverLimit => "over monthly limit".to_string(),
            LineFailure::Record(e) => format!("record: {e}"),
        }
    }
}

pub struct Dispatcher<S, M, C> {
    store: S,
    messenger: M,
    rates: Arc<dyn ExchangeRates>,
    conversations: Arc<dyn ConversationStore>,
    reports: Arc<ReportPipeline<S, M, C>>,
    turns: TurnLocks,
    turn_timeout: Duration,
}

impl<S, M, C> Dispatcher<S, M, C>
where
    S: UserDataStore,
    M: Messenger,
    C: ReportChannel,
{
    pub fn new(
        store: S,
        messenger: M,
        rates: Arc<dyn ExchangeRates>,
        conversations: Arc<dyn ConversationStore>,
        reports: Arc<ReportPipeline<S, M, C>>,
        turn_timeout: Duration,
    ) -> Self {
        Self {
            store,
            messenger,
            rates,
            conversations,
            reports,
            turns: TurnLocks::new(),
            turn_timeout,
        }
    }

    /// Handle one inbound message
    ///
    /// The user always receives exactly one reply; on failure it is the
    /// error's user-facing text and the error is also returned.
    pub async fn process_message(&self, msg: &IncomingMessage) -> Result<(), DispatchError> {
        let user_id = msg.user_id;
        let _turn = self.turns.acquire(user_id).await;

        let state = self.conversations.take(user_id);
        let TransitionResult { new_state, effect } = transition(&state, msg);
        let span = tracing::info_span!("turn", user_id = %user_id, command = effect.label());

        async move {
            let started = Instant::now();
            let outcome = match tokio::time::timeout(self.turn_timeout, self.execute(msg, effect)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(DispatchError::Timeout(self.turn_timeout)),
            };

            let result = match outcome {
                Ok(reply) => match reply.send(&self.messenger, user_id).await {
                    Ok(()) => {
                        if !new_state.is_idle() {
                            self.conversations.put(user_id, new_state);
                        }
                        Ok(())
                    }
                    Err(e) => Err(DispatchError::from(e)),
                },
                Err(e) => {
                    tracing::warn!(error = %e, "Turn failed");
                    if let Err(send_err) = self.messenger.send_message(user_id, e.user_message()).await {
                        tracing::error!(error = %send_err, "Failed to send error reply");
                    }
                    Err(e)
                }
            };

            #[allow(clippy::cast_possible_truncation)]
            let elapsed_ms = started.elapsed().as_millis() as u64;
            tracing::info!(elapsed_ms, ok = result.is_ok(), "Turn finished");
            result
        }
        .instrument(span)
        .await
    }

    #[allow(clippy::too_many_lines)]
    async fn execute(&self, msg: &IncomingMessage, effect: Effect) -> Result<Reply, DispatchError> {
        let user_id = msg.user_id;
        match effect {
            // ============================================================
            // Continuations
            // ============================================================
            Effect::RecordExpense {
                category,
                amount_text,
            } => self.record_expense(msg, category, &amount_text).await,

            Effect::SaveCategory { name } => {
                self.store
                    .insert_category(user_id, &name, &msg.user_name)
                    .await?;
                tracing::info!(category = %name, "Category saved");
                Ok(Reply::text(texts::CATEGORY_SAVED))
            }

            Effect::SetLimit { value_text } => {
                let value = parse_amount(&value_text)?;
                let currency = self.display_currency(user_id).await?;
                let base = self.rates.to_base(&currency, value)?;
                let limit = (!base.is_zero()).then_some(base);
                self.store.set_limit(user_id, limit, &msg.user_name).await?;
                tracing::info!(limit = ?limit, "Limit updated");
                Ok(Reply::text(texts::limit_set(&value_text)))
            }

            Effect::ImportTable { text } => self.import_table(msg, &text).await,

            Effect::Cancel => Ok(Reply::text(texts::CANCELLED)),

            // ============================================================
            // Button callbacks
            // ============================================================
            Effect::PromptAmount { category } => {
                let currency = self.display_currency(user_id).await?;
                Ok(Reply::text(texts::category_chosen(&category, &currency)))
            }

            Effect::ChangeCurrency { code } => Ok(self.change_currency(msg, &code).await),

            // ============================================================
            // Fixed commands
            // ============================================================
            Effect::Greet { name } => Ok(Reply::Buttons {
                text: texts::start(&name),
                rows: texts::start_menu(),
            }),

            Effect::ReportPrompt => Ok(Reply::text(texts::REPORT_PERIOD_PROMPT)),

            Effect::Help => Ok(Reply::text(texts::HELP)),

            Effect::PromptTable => {
                let currency = self.display_currency(user_id).await?;
                Ok(Reply::text(texts::table_prompt(&currency)))
            }

            Effect::Report(period) => Ok(Reply::Text(self.reports.get_report(user_id, period).await)),

            Effect::PromptCategoryName => Ok(Reply::text(texts::CATEGORY_PROMPT)),

            Effect::ChooseCategory => {
                let categories = self.store.categories(user_id).await?;
                if categories.is_empty() {
                    return Ok(Reply::text(texts::CATEGORY_EMPTY));
                }
                Ok(Reply::Buttons {
                    text: texts::CATEGORY_CHOOSE.to_string(),
                    rows: texts::category_buttons(&categories),
                })
            }

            Effect::ListCurrencies => {
                let current = self.display_currency(user_id).await?;
                Ok(Reply::Buttons {
                    text: texts::CURRENCY_CHOOSE.to_string(),
                    rows: texts::currency_buttons(&current, &self.rates.currencies()),
                })
            }

            Effect::PromptLimit => {
                let current = match self.store.limit(user_id).await? {
                    None => texts::LIMIT_UNLIMITED.to_string(),
                    Some(base) => {
                        let currency = self.display_currency(user_id).await?;
                        let shown = self.rates.from_base(&currency, base)?;
                        format!("{:.2} {currency}", shown.round_dp(2))
                    }
                };
                Ok(Reply::text(texts::limit_prompt(&current)))
            }

            Effect::Unknown => Ok(Reply::text(texts::UNKNOWN_COMMAND)),
        }
    }

    async fn display_currency(&self, user_id: UserId) -> Result<String, DispatchError> {
        Ok(self
            .store
            .currency_or(user_id, self.rates.main_currency())
            .await?)
    }

    async fn record_expense(
        &self,
        msg: &IncomingMessage,
        category: String,
        amount_text: &str,
    ) -> Result<Reply, DispatchError> {
        let amount = parse_expense_amount(amount_text)?;
        let currency = self.display_currency(msg.user_id).await?;
        let base = self.rates.to_base(&currency, amount)?;
        let now = Utc::now();
        let record = ExpenseRecord {
            user_id: msg.user_id,
            category,
            amount: base,
            period: now,
        };

        match self
            .store
            .insert_record(&record, &msg.user_name, now.date_naive())
            .await?
        {
            InsertOutcome::Saved => {
                self.reports.invalidate_user(msg.user_id);
                tracing::info!(category = %record.category, amount = %base, "Expense saved");
                Ok(Reply::text(texts::RECORD_SAVED))
            }
            InsertOutcome::OverLimit => {
                tracing::info!(category = %record.category, amount = %base, "Expense rejected, over limit");
                Ok(Reply::text(texts::RECORD_OVER_LIMIT))
            }
        }
    }

    /// Import every line independently; failures are reported per line
    async fn import_table(&self, msg: &IncomingMessage, text: &str) -> Result<Reply, DispatchError> {
        let currency = self.display_currency(msg.user_id).await?;
        let mut total = 0;
        let mut saved = 0;
        let mut errors = Vec::new();

        for (index, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            total += 1;
            let line_number = index + 1;
            match self.import_line(msg, &currency, line).await {
                Ok(()) => saved += 1,
                Err(failure) => {
                    tracing::debug!(line = line_number, error = %failure.detail(), "Import line rejected");
                    errors.push(texts::line_error(line_number, failure.reason()));
                }
            }
        }

        if saved > 0 {
            self.reports.invalidate_user(msg.user_id);
        }
        tracing::info!(saved, total, failed = errors.len(), "Table imported");

        let mut reply = texts::import_summary(saved, total);
        for error in errors {
            reply.push('\n');
            reply.push_str(&error);
        }
        Ok(Reply::Text(reply))
    }

    async fn import_line(
        &self,
        msg: &IncomingMessage,
        currency: &str,
        line: &str,
    ) -> Result<(), LineFailure> {
        let parsed = parse_import_line(line).map_err(LineFailure::Format)?;
        self.store
            .insert_category(msg.user_id, &parsed.category, &msg.user_name)
            .await
            .map_err(LineFailure::Category)?;
        let base = self
            .rates
            .to_base(currency, parsed.amount)
            .map_err(LineFailure::Conversion)?;
        let record = ExpenseRecord {
            user_id: msg.user_id,
            category: parsed.category,
            amount: base,
            period: start_of_day(parsed.date),
        };
        match self
            .store
            .insert_record(&record, &msg.user_name, parsed.date)
            .await
            .map_err(LineFailure::Record)?
        {
            InsertOutcome::Saved => Ok(()),
            InsertOutcome::OverLimit => Err(LineFailure::OverLimit),
        }
    }

    /// Currency failures are answered with a dedicated message, not an error
    async fn change_currency(&self, msg: &IncomingMessage, code: &str) -> Reply {
        let code = code.to_uppercase();
        if !self.rates.currencies().contains(&code) {
            tracing::warn!(currency = %code, "Unsupported currency selected");
            return Reply::text(texts::CURRENCY_SET_ERROR);
        }
        match self
            .store
            .set_currency(msg.user_id, &code, &msg.user_name)
            .await
        {
            Ok(()) => {
                // Cached reports were rendered in the previous currency
                self.reports.invalidate_user(msg.user_id);
                tracing::info!(currency = %code, "Currency changed");
                Reply::text(texts::currency_set(&code))
            }
            Err(e) => {
                tracing::warn!(currency = %code, error = %e, "Failed to save currency");
                Reply::text(texts::CURRENCY_SET_ERROR)
            }
        }
    }
}
