//! Incoming messages and the fixed command vocabulary

use crate::period::Period;
use crate::store::UserId;
use serde::{Deserialize, Serialize};

/// One inbound chat message or button press
///
/// For button presses `text` carries the button payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomingMessage {
    pub text: String,
    pub user_id: UserId,
    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub is_callback: bool,
    #[serde(default)]
    pub callback_id: Option<String>,
}

impl IncomingMessage {
    /// A typed message
    #[allow(dead_code)] // Used in tests
    pub fn typed(user_id: UserId, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            user_id,
            user_name: String::new(),
            display_name: String::new(),
            is_callback: false,
            callback_id: None,
        }
    }

    /// A button press carrying `payload`
    #[allow(dead_code)] // Used in tests
    pub fn callback(user_id: UserId, payload: impl Into<String>) -> Self {
        Self {
            is_callback: true,
            ..Self::typed(user_id, payload)
        }
    }

    #[allow(dead_code)] // Used in tests
    pub fn with_names(mut self, user_name: impl Into<String>, display_name: impl Into<String>) -> Self {
        self.user_name = user_name.into();
        self.display_name = display_name.into();
        self
    }

    /// Display name, falling back to the username
    pub fn greeting_name(&self) -> &str {
        if self.display_name.trim().is_empty() {
            &self.user_name
        } else {
            &self.display_name
        }
    }

    /// The literal `.` that cancels a pending action
    pub fn is_cancel(&self) -> bool {
        self.text.trim() == "."
    }
}

/// Top-level commands, matched case-sensitively on the whole text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Report,
    Help,
    AddTable,
    ReportFor(Period),
    AddCategory,
    AddRecord,
    ChooseCurrency,
    SetLimit,
}

impl Command {
    pub fn parse(text: &str) -> Option<Self> {
        let command = match text {
            "/start" => Command::Start,
            "/report" => Command::Report,
            "/help" => Command::Help,
            "/add_tbl" => Command::AddTable,
            "/report_w" => Command::ReportFor(Period::Week),
            "/report_m" => Command::ReportFor(Period::Month),
            "/report_y" => Command::ReportFor(Period::Year),
            "/add_cat" => Command::AddCategory,
            "/add_rec" => Command::AddRecord,
            "/choice_currency" => Command::ChooseCurrency,
            "/set_limit" => Command::SetLimit,
            _ => return None,
        };
        Some(command)
    }
}

/// Selector payloads carried by inline buttons
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Callback {
    Category(String),
    Currency(String),
}

impl Callback {
    pub fn parse(payload: &str) -> Option<Self> {
        if let Some(category) = payload.strip_prefix("/cat ") {
            return (!category.is_empty()).then(|| Callback::Category(category.to_string()));
        }
        if let Some(code) = payload.strip_prefix("/curr ") {
            let code = code.trim();
            return (!code.is_empty()).then(|| Callback::Currency(code.to_string()));
        }
        None
    }
}
