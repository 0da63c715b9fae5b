//! Conversation state machine
//!
//! Each turn is a pure transition from the user's pending state and the
//! incoming message to one effect plus the state to arm next.

mod effect;
pub mod message;
pub mod state;
pub(crate) mod transition;


pub use effect::Effect;
pub use message::IncomingMessage;
pub use state::ConvState;
pub use transition::{transition, TransitionResult};
