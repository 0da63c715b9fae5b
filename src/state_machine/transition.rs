//! Pure transition function
//!
//! Given the state read (and cleared) at the start of a turn and the incoming
//! message, decide the single effect to run and the state to arm once its
//! reply has been delivered. No I/O happens here.

use super::message::{Callback, Command, IncomingMessage};
use super::{ConvState, Effect};

/// Result of a state transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionResult {
    /// State to arm after the effect succeeds
    pub new_state: ConvState,
    pub effect: Effect,
}

impl TransitionResult {
    fn idle(effect: Effect) -> Self {
        Self {
            new_state: ConvState::Idle,
            effect,
        }
    }

    fn arming(new_state: ConvState, effect: Effect) -> Self {
        Self { new_state, effect }
    }
}

pub fn transition(state: &ConvState, msg: &IncomingMessage) -> TransitionResult {
    // ============================================================
    // Continuations of a pending action
    // ============================================================

    // Empty text never continues anything; route it as a fresh message
    if !state.is_idle() && !msg.text.trim().is_empty() {
        if msg.is_cancel() {
            return TransitionResult::idle(Effect::Cancel);
        }
        match state {
            ConvState::AwaitingAmount { category } => {
                return TransitionResult::idle(Effect::RecordExpense {
                    category: category.clone(),
                    amount_text: msg.text.clone(),
                });
            }
            ConvState::AwaitingCategoryName => {
                return TransitionResult::idle(Effect::SaveCategory {
                    name: msg.text.clone(),
                });
            }
            ConvState::AwaitingLimit => {
                return TransitionResult::idle(Effect::SetLimit {
                    value_text: msg.text.clone(),
                });
            }
            ConvState::AwaitingTable => {
                return TransitionResult::idle(Effect::ImportTable {
                    text: msg.text.clone(),
                });
            }
            ConvState::Idle => {}
        }
    }

    // ============================================================
    // Button callbacks
    // ============================================================

    if msg.is_callback {
        match Callback::parse(&msg.text) {
            Some(Callback::Category(category)) => {
                return TransitionResult::arming(
                    ConvState::AwaitingAmount {
                        category: category.clone(),
                    },
                    Effect::PromptAmount { category },
                );
            }
            Some(Callback::Currency(code)) => {
                return TransitionResult::idle(Effect::ChangeCurrency { code });
            }
            None => {}
        }
    }

    // ============================================================
    // Fixed command vocabulary
    // ============================================================

    let Some(command) = Command::parse(&msg.text) else {
        return TransitionResult::idle(Effect::Unknown);
    };
    match command {
        Command::Start => TransitionResult::idle(Effect::Greet {
            name: msg.greeting_name().to_string(),
        }),
        Command::Report => TransitionResult::idle(Effect::ReportPrompt),
        Command::Help => TransitionResult::idle(Effect::Help),
        Command::AddTable => TransitionResult::arming(ConvState::AwaitingTable, Effect::PromptTable),
        Command::ReportFor(period) => TransitionResult::idle(Effect::Report(period)),
        Command::AddCategory => {
            TransitionResult::arming(ConvState::AwaitingCategoryName, Effect::PromptCategoryName)
        }
        // The amount state is armed by the category button, not here
        Command::AddRecord => TransitionResult::idle(Effect::ChooseCategory),
        Command::ChooseCurrency => TransitionResult::idle(Effect::ListCurrencies),
        Command::SetLimit => TransitionResult::arming(ConvState::AwaitingLimit, Effect::PromptLimit),
    }
}
