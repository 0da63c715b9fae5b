//! Mock implementations for testing
//!
//! These mocks enable integration testing without real I/O.

use super::traits::*;
use super::{DispatchError, Dispatcher, InMemoryConversations};
use crate::currency::RateTable;
use crate::messenger::{ButtonRow, Outgoing, SendError};
use crate::period::{month_start, next_month_start};
use crate::report::{ReportCache, ReportDispatchError, ReportPipeline, ReportRequest};
use crate::state_machine::IncomingMessage;
use crate::store::{ExpenseRecord, InsertOutcome, ReportRow, StoreError, StoreResult, UserId};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ============================================================================
// In-Memory User Data Store
// ============================================================================

/// User data store backed by plain maps, with failure and latency injection
#[derive(Default)]
pub struct InMemoryStore {
    records: Mutex<Vec<ExpenseRecord>>,
    categories: Mutex<HashMap<UserId, Vec<String>>>,
    currencies: Mutex<HashMap<UserId, String>>,
    limits: Mutex<HashMap<UserId, Decimal>>,
    /// Names of the write operations performed, in order
    pub writes: Mutex<Vec<&'static str>>,
    fail: AtomicBool,
    fail_currency: AtomicBool,
    fail_category_name: Mutex<Option<String>>,
    fail_record_category: Mutex<Option<String>>,
    delay: Mutex<Option<Duration>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation fail
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Make only `set_currency` fail
    pub fn set_fail_currency(&self, fail: bool) {
        self.fail_currency.store(fail, Ordering::SeqCst);
    }

    /// Make `insert_category` fail for one category name
    pub fn fail_category_named(&self, name: &str) {
        *self.fail_category_name.lock().unwrap() = Some(name.to_string());
    }

    /// Make `insert_record` fail for records of one category
    pub fn fail_records_in(&self, category: &str) {
        *self.fail_record_category.lock().unwrap() = Some(category.to_string());
    }

    /// Delay every operation
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn push_record(&self, record: ExpenseRecord) {
        self.records.lock().unwrap().push(record);
    }

    pub fn set_currency_direct(&self, user_id: UserId, code: &str) {
        self.currencies
            .lock()
            .unwrap()
            .insert(user_id, code.to_string());
    }

    pub fn set_limit_direct(&self, user_id: UserId, limit: Decimal) {
        self.limits.lock().unwrap().insert(user_id, limit);
    }

    pub fn add_category_direct(&self, user_id: UserId, name: &str) {
        self.categories
            .lock()
            .unwrap()
            .entry(user_id)
            .or_default()
            .push(name.to_string());
    }

    pub fn records(&self) -> Vec<ExpenseRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn categories_of(&self, user_id: UserId) -> Vec<String> {
        self.categories
            .lock()
            .unwrap()
            .get(&user_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn limit_of(&self, user_id: UserId) -> Option<Decimal> {
        self.limits.lock().unwrap().get(&user_id).copied()
    }

    pub fn recorded_writes(&self) -> Vec<&'static str> {
        self.writes.lock().unwrap().clone()
    }

    async fn enter(&self) -> StoreResult<()> {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(StoreError::Sqlite(rusqlite::Error::InvalidQuery));
        }
        Ok(())
    }

    fn write(&self, operation: &'static str) {
        self.writes.lock().unwrap().push(operation);
    }
}

#[async_trait]
impl UserDataStore for InMemoryStore {
    async fn insert_record(
        &self,
        record: &ExpenseRecord,
        _user_name: &str,
        budget_month: NaiveDate,
    ) -> StoreResult<InsertOutcome> {
        self.enter().await?;
        if self.fail_record_category.lock().unwrap().as_deref() == Some(record.category.as_str()) {
            return Err(StoreError::Sqlite(rusqlite::Error::InvalidQuery));
        }
        if let Some(limit) = self.limit_of(record.user_id) {
            let (start, end) = (month_start(budget_month), next_month_start(budget_month));
            let total = self
                .records
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.user_id == record.user_id)
                .filter(|r| {
                    let day = r.period.date_naive();
                    day >= start && day < end
                })
                .try_fold(record.amount, |sum, r| sum.checked_add(r.amount));
            if !matches!(total, Some(total) if total <= limit) {
                return Ok(InsertOutcome::OverLimit);
            }
        }
        self.write("insert_record");
        self.records.lock().unwrap().push(record.clone());
        Ok(InsertOutcome::Saved)
    }

    async fn report_rows(&self, user_id: UserId, since: DateTime<Utc>) -> StoreResult<Vec<ReportRow>> {
        self.enter().await?;
        let mut totals: BTreeMap<String, Decimal> = BTreeMap::new();
        for record in self.records.lock().unwrap().iter() {
            if record.user_id == user_id && record.period >= since {
                let total = totals.entry(record.category.clone()).or_default();
                *total = total
                    .checked_add(record.amount)
                    .ok_or(StoreError::Overflow { column: "amount" })?;
            }
        }
        Ok(totals
            .into_iter()
            .map(|(category, amount)| ReportRow::new(category, amount))
            .collect())
    }

    async fn insert_category(&self, user_id: UserId, name: &str, _user_name: &str) -> StoreResult<()> {
        self.enter().await?;
        if self.fail_category_name.lock().unwrap().as_deref() == Some(name) {
            return Err(StoreError::Sqlite(rusqlite::Error::InvalidQuery));
        }
        self.write("insert_category");
        let mut categories = self.categories.lock().unwrap();
        let list = categories.entry(user_id).or_default();
        if !list.iter().any(|c| c == name) {
            list.push(name.to_string());
        }
        Ok(())
    }

    async fn categories(&self, user_id: UserId) -> StoreResult<Vec<String>> {
        self.enter().await?;
        Ok(self.categories_of(user_id))
    }

    async fn currency(&self, user_id: UserId) -> StoreResult<Option<String>> {
        self.enter().await?;
        Ok(self.currencies.lock().unwrap().get(&user_id).cloned())
    }

    async fn set_currency(&self, user_id: UserId, code: &str, _user_name: &str) -> StoreResult<()> {
        self.enter().await?;
        if self.fail_currency.load(Ordering::SeqCst) {
            return Err(StoreError::Sqlite(rusqlite::Error::InvalidQuery));
        }
        self.write("set_currency");
        self.set_currency_direct(user_id, code);
        Ok(())
    }

    async fn limit(&self, user_id: UserId) -> StoreResult<Option<Decimal>> {
        self.enter().await?;
        Ok(self.limit_of(user_id))
    }

    async fn set_limit(
        &self,
        user_id: UserId,
        limit: Option<Decimal>,
        _user_name: &str,
    ) -> StoreResult<()> {
        self.enter().await?;
        self.write("set_limit");
        let mut limits = self.limits.lock().unwrap();
        match limit {
            Some(limit) => limits.insert(user_id, limit),
            None => limits.remove(&user_id),
        };
        Ok(())
    }
}

// ============================================================================
// Recording Messenger
// ============================================================================

/// Messenger that records everything it is asked to send
#[derive(Default)]
pub struct RecordingMessenger {
    sent: Mutex<Vec<Outgoing>>,
    fail: AtomicBool,
}

impl RecordingMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<Outgoing> {
        self.sent.lock().unwrap().clone()
    }

    pub fn texts_for(&self, user_id: UserId) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.user_id() == user_id)
            .map(|m| m.text().to_string())
            .collect()
    }

    /// Poll until at least `count` messages were sent
    pub async fn wait_for_messages(&self, count: usize) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while self.sent.lock().unwrap().len() < count {
            assert!(
                tokio::time::Instant::now() < deadline,
                "timed out waiting for {count} messages"
            );
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    fn record(&self, message: Outgoing) -> Result<(), SendError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(SendError {
                user_id: message.user_id(),
                reason: "injected failure".to_string(),
            });
        }
        self.sent.lock().unwrap().push(message);
        Ok(())
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn send_message(&self, user_id: UserId, text: &str) -> Result<(), SendError> {
        self.record(Outgoing::Text {
            user_id,
            text: text.to_string(),
        })
    }

    async fn show_buttons(
        &self,
        user_id: UserId,
        text: &str,
        rows: &[ButtonRow],
    ) -> Result<(), SendError> {
        self.record(Outgoing::Buttons {
            user_id,
            text: text.to_string(),
            rows: rows.to_vec(),
        })
    }
}

// ============================================================================
// Recording Report Channel
// ============================================================================

/// Report channel that records dispatched requests and never computes them
#[derive(Default)]
pub struct RecordingReportChannel {
    dispatched: Mutex<Vec<ReportRequest>>,
    fail: AtomicBool,
}

impl RecordingReportChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn dispatched(&self) -> Vec<ReportRequest> {
        self.dispatched.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReportChannel for RecordingReportChannel {
    async fn dispatch(&self, request: ReportRequest) -> Result<(), ReportDispatchError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ReportDispatchError::Closed);
        }
        self.dispatched.lock().unwrap().push(request);
        Ok(())
    }

    fn topic(&self) -> &str {
        "tgbot"
    }
}

// ============================================================================
// Test Bot Builder
// ============================================================================

pub type TestDispatcher =
    Dispatcher<Arc<InMemoryStore>, Arc<RecordingMessenger>, Arc<RecordingReportChannel>>;

pub type TestPipeline =
    ReportPipeline<Arc<InMemoryStore>, Arc<RecordingMessenger>, Arc<RecordingReportChannel>>;

/// The user every `TestBot` helper speaks as
pub const USER: UserId = UserId(100);

/// A real dispatcher wired to in-memory collaborators
pub struct TestBot {
    pub store: Arc<InMemoryStore>,
    pub messenger: Arc<RecordingMessenger>,
    pub channel: Arc<RecordingReportChannel>,
    pub conversations: Arc<InMemoryConversations>,
    pub rates: Arc<RateTable>,
    pub reports: Arc<TestPipeline>,
    pub dispatcher: TestDispatcher,
}

pub struct TestBotBuilder {
    turn_timeout: Duration,
    retry_after: Duration,
}

impl TestBotBuilder {
    pub fn new() -> Self {
        Self {
            turn_timeout: Duration::from_secs(5),
            retry_after: Duration::from_secs(60),
        }
    }

    pub fn turn_timeout(mut self, timeout: Duration) -> Self {
        self.turn_timeout = timeout;
        self
    }

    pub fn build(self) -> TestBot {
        let store = Arc::new(InMemoryStore::new());
        let messenger = Arc::new(RecordingMessenger::new());
        let channel = Arc::new(RecordingReportChannel::new());
        let conversations = Arc::new(InMemoryConversations::new());
        // 1 BYN = 0.5 USD = 0.25 EUR = 30 RUB
        let rates = Arc::new(RateTable::new(
            "BYN",
            ["USD", "EUR", "RUB", "BYN"].map(String::from).to_vec(),
            HashMap::from([
                ("USD".to_string(), dec("0.5")),
                ("EUR".to_string(), dec("0.25")),
                ("RUB".to_string(), dec("30")),
            ]),
        ));
        let reports = Arc::new(ReportPipeline::new(
            Arc::clone(&store),
            Arc::clone(&messenger),
            Arc::clone(&channel),
            rates.clone(),
            ReportCache::new(16),
            self.retry_after,
        ));
        let dispatcher = Dispatcher::new(
            Arc::clone(&store),
            Arc::clone(&messenger),
            rates.clone(),
            conversations.clone(),
            Arc::clone(&reports),
            self.turn_timeout,
        );
        TestBot {
            store,
            messenger,
            channel,
            conversations,
            rates,
            reports,
            dispatcher,
        }
    }
}

impl Default for TestBotBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestBot {
    pub fn new() -> Self {
        TestBotBuilder::new().build()
    }

    pub fn builder() -> TestBotBuilder {
        TestBotBuilder::new()
    }

    /// Type a message as `USER`
    pub async fn send(&self, text: &str) -> Result<(), DispatchError> {
        let msg = IncomingMessage::typed(USER, text).with_names("tester", "Tester");
        self.dispatcher.process_message(&msg).await
    }

    /// Press a button as `USER`
    pub async fn press(&self, payload: &str) -> Result<(), DispatchError> {
        let msg = IncomingMessage::callback(USER, payload).with_names("tester", "Tester");
        self.dispatcher.process_message(&msg).await
    }

    /// Text of the most recent message sent to `USER`
    pub fn last_reply(&self) -> String {
        self.messenger
            .texts_for(USER)
            .pop()
            .expect("no reply was sent")
    }

    pub fn reply_count(&self) -> usize {
        self.messenger.texts_for(USER).len()
    }
}

pub fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::period::Period;
    use crate::state_machine::ConvState;
    use crate::texts;

    // ------------------------------------------------------------------
    // Pending-state handshake
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn add_category_persists_once_and_clears_state() {
        let bot = TestBot::new();
        bot.send("/add_cat").await.unwrap();
        assert_eq!(bot.last_reply(), texts::CATEGORY_PROMPT);
        assert_eq!(bot.conversations.peek(USER), ConvState::AwaitingCategoryName);

        bot.send("Кафе и рестораны").await.unwrap();
        assert_eq!(bot.last_reply(), texts::CATEGORY_SAVED);
        assert_eq!(bot.store.categories_of(USER), vec!["Кафе и рестораны"]);
        assert_eq!(bot.store.recorded_writes(), vec!["insert_category"]);
        assert!(bot.conversations.peek(USER).is_idle());

        // The next message is routed afresh
        bot.send("Такси").await.unwrap();
        assert_eq!(bot.last_reply(), texts::UNKNOWN_COMMAND);
        assert_eq!(bot.store.categories_of(USER).len(), 1);
    }

    #[tokio::test]
    async fn dot_cancels_any_pending_state_without_writes() {
        let bot = TestBot::new();
        bot.store.add_category_direct(USER, "Еда");
        let armings: [(&str, bool); 4] = [
            ("/add_cat", false),
            ("/set_limit", false),
            ("/add_tbl", false),
            ("/cat Еда", true),
        ];
        for (trigger, is_button) in armings {
            if is_button {
                bot.press(trigger).await.unwrap();
            } else {
                bot.send(trigger).await.unwrap();
            }
            assert!(!bot.conversations.peek(USER).is_idle(), "{trigger} did not arm");

            bot.send(".").await.unwrap();
            assert_eq!(bot.last_reply(), texts::CANCELLED);
            assert!(bot.conversations.peek(USER).is_idle());
        }
        assert!(bot.store.recorded_writes().is_empty());
    }

    #[tokio::test]
    async fn every_turn_sends_exactly_one_reply() {
        let bot = TestBot::new();
        let inputs = ["/start", "/help", "/report", "hello", "/add_rec", "/set_limit", "-5"];
        for (i, input) in inputs.iter().enumerate() {
            let _ = bot.send(input).await;
            assert_eq!(bot.reply_count(), i + 1, "after {input}");
        }
    }

    // ------------------------------------------------------------------
    // Expenses
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn category_button_then_amount_records_in_base_currency() {
        let bot = TestBot::new();
        bot.store.add_category_direct(USER, "Еда");
        bot.store.set_currency_direct(USER, "USD");

        bot.send("/add_rec").await.unwrap();
        match bot.messenger.sent().last().unwrap() {
            Outgoing::Buttons { rows, .. } => assert_eq!(rows[0][0].payload, "/cat Еда"),
            other => panic!("expected buttons, got {other:?}"),
        }

        bot.press("/cat Еда").await.unwrap();
        assert_eq!(bot.last_reply(), texts::category_chosen("Еда", "USD"));

        bot.send("12,50").await.unwrap();
        assert_eq!(bot.last_reply(), texts::RECORD_SAVED);
        let records = bot.store.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].category, "Еда");
        assert_eq!(records[0].amount, dec("25"));
        assert!(bot.conversations.peek(USER).is_idle());
    }

    #[tokio::test]
    async fn add_record_without_categories_aborts() {
        let bot = TestBot::new();
        bot.send("/add_rec").await.unwrap();
        assert_eq!(bot.last_reply(), texts::CATEGORY_EMPTY);
        assert!(bot.conversations.peek(USER).is_idle());
    }

    #[tokio::test]
    async fn over_limit_record_is_not_saved() {
        let bot = TestBot::new();
        bot.store.set_limit_direct(USER, dec("100"));
        bot.press("/cat Еда").await.unwrap();
        bot.send("60").await.unwrap();
        assert_eq!(bot.last_reply(), texts::RECORD_SAVED);

        bot.press("/cat Еда").await.unwrap();
        bot.send("50").await.unwrap();
        assert_eq!(bot.last_reply(), texts::RECORD_OVER_LIMIT);
        assert_eq!(bot.store.records().len(), 1);
    }

    #[tokio::test]
    async fn unparsable_amount_surfaces_as_error() {
        let bot = TestBot::new();
        bot.press("/cat Еда").await.unwrap();
        let err = bot.send("двенадцать").await.unwrap_err();
        assert!(matches!(err, DispatchError::Parse(_)));
        assert_eq!(bot.last_reply(), texts::ERR_AMOUNT);
        assert!(bot.store.records().is_empty());
        assert!(bot.conversations.peek(USER).is_idle());
    }

    #[tokio::test]
    async fn empty_text_is_not_an_amount() {
        let bot = TestBot::new();
        bot.press("/cat Еда").await.unwrap();
        bot.send("").await.unwrap();
        assert_eq!(bot.last_reply(), texts::UNKNOWN_COMMAND);
        assert!(bot.store.records().is_empty());
    }

    // ------------------------------------------------------------------
    // Limit
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn set_limit_converts_and_echoes_input() {
        let bot = TestBot::new();
        bot.store.set_currency_direct(USER, "USD");
        bot.send("/set_limit").await.unwrap();
        assert_eq!(bot.last_reply(), texts::limit_prompt(texts::LIMIT_UNLIMITED));

        bot.send("150.5").await.unwrap();
        assert_eq!(bot.last_reply(), texts::limit_set("150.5"));
        assert_eq!(bot.store.limit_of(USER), Some(dec("301")));

        bot.send("/set_limit").await.unwrap();
        assert_eq!(bot.last_reply(), texts::limit_prompt("150.50 USD"));
    }

    #[tokio::test]
    async fn zero_limit_means_unlimited() {
        let bot = TestBot::new();
        bot.store.set_limit_direct(USER, dec("10"));
        bot.send("/set_limit").await.unwrap();
        bot.send("0").await.unwrap();
        assert_eq!(bot.store.limit_of(USER), None);
    }

    #[tokio::test]
    async fn negative_limit_is_rejected() {
        let bot = TestBot::new();
        bot.store.set_limit_direct(USER, dec("10"));
        bot.send("/set_limit").await.unwrap();
        let err = bot.send("-5").await.unwrap_err();
        assert!(matches!(err, DispatchError::Parse(_)));
        assert_eq!(bot.store.limit_of(USER), Some(dec("10")));
        assert!(bot.conversations.peek(USER).is_idle());
    }

    // ------------------------------------------------------------------
    // Bulk import
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn bulk_import_isolates_bad_lines() {
        let bot = TestBot::new();
        bot.send("/add_tbl").await.unwrap();
        bot.send("2024-03-01 15.50 Продукты\nвчера 7 Такси\n2024-03-02 7 Транспорт")
            .await
            .unwrap();

        let reply = bot.last_reply();
        let tagged: Vec<&str> = reply
            .lines()
            .filter(|line| line.contains("Ошибка"))
            .collect();
        assert_eq!(tagged, vec![texts::line_error(2, texts::LINE_ERR_FORMAT)]);
        assert!(reply.starts_with(&texts::import_summary(2, 3)));

        let records = bot.store.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].category, "Продукты");
        assert_eq!(records[1].category, "Транспорт");
        assert_eq!(
            records[0].period.date_naive(),
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
        );
        assert!(bot.conversations.peek(USER).is_idle());
    }

    #[tokio::test]
    async fn bulk_import_reports_over_limit_lines() {
        let bot = TestBot::new();
        bot.store.set_limit_direct(USER, dec("20"));
        bot.send("/add_tbl").await.unwrap();
        bot.send("2024-03-01 15 Еда\n\n2024-03-02 10 Еда\n2024-04-01 10 Еда")
            .await
            .unwrap();

        let reply = bot.last_reply();
        // Blank line 2 is skipped but keeps the numbering
        assert!(reply.contains(&texts::line_error(3, texts::LINE_ERR_OVER_LIMIT)));
        assert!(reply.starts_with(&texts::import_summary(2, 3)));
        assert_eq!(bot.store.records().len(), 2);
    }

    #[tokio::test]
    async fn bulk_import_uses_display_currency() {
        let bot = TestBot::new();
        bot.store.set_currency_direct(USER, "RUB");
        bot.send("/add_tbl").await.unwrap();
        assert_eq!(bot.last_reply(), texts::table_prompt("RUB"));
        bot.send("2024-03-01 300 Еда").await.unwrap();
        assert_eq!(bot.store.records()[0].amount, dec("10"));
    }

    #[tokio::test]
    async fn bulk_import_without_rate_fails_every_line() {
        let bot = TestBot::new();
        bot.store.set_currency_direct(USER, "RUB");
        bot.rates.update(HashMap::from([
            ("USD".to_string(), dec("0.5")),
            ("EUR".to_string(), dec("0.25")),
        ]));
        bot.send("/add_tbl").await.unwrap();
        bot.send("2024-03-01 300 Еда\n2024-03-02 60 Такси\n2024-03-03 90 Еда")
            .await
            .unwrap();

        let reply = bot.last_reply();
        assert!(reply.starts_with(&texts::import_summary(0, 3)));
        for line in 1..=3 {
            assert!(reply.contains(&texts::line_error(line, texts::LINE_ERR_CONVERSION)));
        }
        assert!(bot.store.records().is_empty());
    }

    #[tokio::test]
    async fn bulk_import_survives_per_line_store_failures() {
        let bot = TestBot::new();
        bot.store.fail_category_named("Сломано");
        bot.store.fail_records_in("Архив");
        bot.send("/add_tbl").await.unwrap();
        bot.send("2024-03-01 10 Еда\n2024-03-02 20 Сломано\n2024-03-03 30 Архив\n2024-03-04 40 Такси")
            .await
            .unwrap();

        let reply = bot.last_reply();
        assert!(reply.starts_with(&texts::import_summary(2, 4)));
        let tagged: Vec<&str> = reply
            .lines()
            .filter(|line| line.contains(texts::LINE_ERROR_TAG))
            .collect();
        assert_eq!(
            tagged,
            vec![
                texts::line_error(2, texts::LINE_ERR_CATEGORY),
                texts::line_error(3, texts::LINE_ERR_RECORD),
            ]
        );
        let saved: Vec<String> = bot.store.records().into_iter().map(|r| r.category).collect();
        assert_eq!(saved, vec!["Еда", "Такси"]);
    }

    #[tokio::test]
    async fn expense_without_rate_replies_conversion_error() {
        let bot = TestBot::new();
        bot.store.set_currency_direct(USER, "RUB");
        bot.rates.update(HashMap::from([("USD".to_string(), dec("0.5"))]));
        bot.press("/cat Еда").await.unwrap();
        let err = bot.send("10").await.unwrap_err();
        assert!(matches!(err, DispatchError::Currency(_)));
        assert_eq!(bot.last_reply(), texts::ERR_CONVERSION);
        assert!(bot.store.records().is_empty());
    }

    #[tokio::test]
    async fn huge_amount_is_rejected_with_a_reply() {
        let bot = TestBot::new();
        bot.press("/cat Еда").await.unwrap();
        let err = bot.send("50000000000000000000000000000").await.unwrap_err();
        assert!(matches!(err, DispatchError::Parse(_)));
        assert_eq!(bot.last_reply(), texts::ERR_AMOUNT);
        assert!(bot.store.records().is_empty());
    }

    // ------------------------------------------------------------------
    // Currency
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn currency_list_starts_with_current() {
        let bot = TestBot::new();
        bot.store.set_currency_direct(USER, "EUR");
        bot.send("/choice_currency").await.unwrap();
        match bot.messenger.sent().last().unwrap() {
            Outgoing::Buttons { text, rows, .. } => {
                assert_eq!(text, texts::CURRENCY_CHOOSE);
                assert_eq!(rows[0][0].payload, "/curr EUR");
            }
            other => panic!("expected buttons, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn currency_callback_persists_choice() {
        let bot = TestBot::new();
        bot.press("/curr USD").await.unwrap();
        assert_eq!(bot.last_reply(), texts::currency_set("USD"));
        assert_eq!(
            bot.store.currency(USER).await.unwrap(),
            Some("USD".to_string())
        );
    }

    #[tokio::test]
    async fn currency_failure_replies_set_error() {
        let bot = TestBot::new();
        bot.store.set_fail_currency(true);
        bot.press("/curr USD").await.unwrap();
        assert_eq!(bot.last_reply(), texts::CURRENCY_SET_ERROR);

        bot.store.set_fail_currency(false);
        bot.press("/curr XYZ").await.unwrap();
        assert_eq!(bot.last_reply(), texts::CURRENCY_SET_ERROR);
        assert!(bot.store.recorded_writes().is_empty());
    }

    // ------------------------------------------------------------------
    // Fixed commands
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn start_greets_with_menu() {
        let bot = TestBot::new();
        bot.send("/start").await.unwrap();
        match bot.messenger.sent().last().unwrap() {
            Outgoing::Buttons { text, rows, .. } => {
                assert_eq!(text, &texts::start("Tester"));
                assert_eq!(rows, &texts::start_menu());
            }
            other => panic!("expected buttons, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_and_case_mismatched_commands() {
        let bot = TestBot::new();
        bot.send("/Start").await.unwrap();
        assert_eq!(bot.last_reply(), texts::UNKNOWN_COMMAND);
        bot.send("/help").await.unwrap();
        assert_eq!(bot.last_reply(), texts::HELP);
        bot.send("/report").await.unwrap();
        assert_eq!(bot.last_reply(), texts::REPORT_PERIOD_PROMPT);
    }

    // ------------------------------------------------------------------
    // Reports
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn report_miss_dispatches_once() {
        let bot = TestBot::new();
        bot.send("/report_m").await.unwrap();
        bot.send("/report_m").await.unwrap();
        assert_eq!(bot.channel.dispatched().len(), 1);
        let request = &bot.channel.dispatched()[0];
        assert_eq!(request.key(), USER.to_string());
        assert_eq!(request.value(), "m");
        assert_eq!(
            bot.messenger.texts_for(USER),
            vec![texts::REPORT_PREPARING, texts::REPORT_PREPARING]
        );
    }

    #[tokio::test]
    async fn delivered_report_is_served_without_dispatch() {
        let bot = TestBot::new();
        bot.reports
            .deliver_report(vec![ReportRow::new("Еда", dec("10"))], USER, Period::Week)
            .await
            .unwrap();
        let delivered = bot.last_reply();

        bot.send("/report_w").await.unwrap();
        assert_eq!(bot.last_reply(), delivered);
        assert!(bot.channel.dispatched().is_empty());
    }

    #[tokio::test]
    async fn new_expense_invalidates_cached_reports() {
        let bot = TestBot::new();
        bot.reports
            .deliver_report(vec![ReportRow::new("Еда", dec("10"))], USER, Period::Month)
            .await
            .unwrap();

        bot.press("/cat Еда").await.unwrap();
        bot.send("5").await.unwrap();
        bot.send("/report_m").await.unwrap();
        assert_eq!(bot.last_reply(), texts::REPORT_PREPARING);
        assert_eq!(bot.channel.dispatched().len(), 1);
    }

    #[tokio::test]
    async fn report_dispatch_failure_degrades_to_message() {
        let bot = TestBot::new();
        bot.channel.set_fail(true);
        bot.send("/report_y").await.unwrap();
        assert_eq!(bot.last_reply(), texts::REPORT_FAILED);
    }

    // ------------------------------------------------------------------
    // Failures
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn storage_failure_replies_generic_message() {
        let bot = TestBot::new();
        bot.send("/add_cat").await.unwrap();
        bot.store.set_fail(true);
        let err = bot.send("Еда").await.unwrap_err();
        assert!(matches!(err, DispatchError::Store(_)));
        assert_eq!(bot.last_reply(), texts::ERR_STORAGE);
        assert!(bot.conversations.peek(USER).is_idle());
    }

    #[tokio::test]
    async fn slow_dependency_times_out() {
        let bot = TestBot::builder()
            .turn_timeout(Duration::from_millis(50))
            .build();
        bot.store.set_delay(Duration::from_millis(500));
        let err = bot.send("/add_rec").await.unwrap_err();
        assert!(matches!(err, DispatchError::Timeout(_)));
        assert_eq!(bot.last_reply(), texts::ERR_TIMEOUT);
    }

    #[tokio::test]
    async fn failed_send_does_not_arm_state() {
        let bot = TestBot::new();
        bot.messenger.set_fail(true);
        let err = bot.send("/add_cat").await.unwrap_err();
        assert!(matches!(err, DispatchError::Send(_)));
        assert!(bot.conversations.peek(USER).is_idle());
    }

    #[tokio::test]
    async fn users_do_not_share_pending_state() {
        let bot = TestBot::new();
        bot.send("/add_cat").await.unwrap();

        let other = IncomingMessage::typed(UserId(200), "Еда");
        bot.dispatcher.process_message(&other).await.unwrap();
        assert_eq!(bot.messenger.texts_for(UserId(200)), vec![texts::UNKNOWN_COMMAND]);
        assert_eq!(bot.conversations.peek(USER), ConvState::AwaitingCategoryName);
    }
}
