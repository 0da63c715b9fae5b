//! Effects produced by state transitions

use crate::period::Period;

/// The one action a turn performs
///
/// Executed by the runtime after the transition; each effect yields exactly
/// one reply to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    // Continuations of a pending action
    /// Parse, convert and persist an expense for `category`
    RecordExpense { category: String, amount_text: String },
    /// Persist a new category verbatim
    SaveCategory { name: String },
    /// Parse, convert and persist the monthly limit
    SetLimit { value_text: String },
    /// Import a pasted table, line by line
    ImportTable { text: String },
    /// Drop the pending action without touching storage
    Cancel,

    // Button callbacks
    /// Ask for an amount for the selected category
    PromptAmount { category: String },
    /// Persist a new display currency
    ChangeCurrency { code: String },

    // Fixed commands
    Greet { name: String },
    ReportPrompt,
    Help,
    PromptTable,
    Report(Period),
    PromptCategoryName,
    ChooseCategory,
    ListCurrencies,
    PromptLimit,

    Unknown,
}

impl Effect {
    /// Short name used in logs and spans
    pub fn label(&self) -> &'static str {
        match self {
            Effect::RecordExpense { .. } => "record_expense",
            Effect::SaveCategory { .. } => "save_category",
            Effect::SetLimit { .. } => "set_limit",
            Effect::ImportTable { .. } => "import_table",
            Effect::Cancel => "cancel",
            Effect::PromptAmount { .. } => "prompt_amount",
            Effect::ChangeCurrency { .. } => "change_currency",
            Effect::Greet { .. } => "start",
            Effect::ReportPrompt => "report",
            Effect::Help => "help",
            Effect::PromptTable => "add_tbl",
            Effect::Report(Period::Week) => "report_w",
            Effect::Report(Period::Month) => "report_m",
            Effect::Report(Period::Year) => "report_y",
            Effect::PromptCategoryName => "add_cat",
            Effect::ChooseCategory => "add_rec",
            Effect::ListCurrencies => "choice_currency",
            Effect::PromptLimit => "set_limit_prompt",
            Effect::Unknown => "unknown",
        }
    }

    /// Whether executing this effect may write to the user data store
    #[allow(dead_code)] // Used in tests
    pub fn persists(&self) -> bool {
        matches!(
            self,
            Effect::RecordExpense { .. }
                | Effect::SaveCategory { .. }
                | Effect::SetLimit { .. }
                | Effect::ImportTable { .. }
                | Effect::ChangeCurrency { .. }
        )
    }
}
