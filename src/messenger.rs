//! Outbound messages and inline buttons

use crate::runtime::Messenger;
use crate::store::UserId;
use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::broadcast;

/// Inline button: visible label plus the payload sent back on press
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Button {
    pub label: String,
    pub payload: String,
}

impl Button {
    pub fn new(label: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            payload: payload.into(),
        }
    }
}

pub type ButtonRow = Vec<Button>;

#[derive(Debug, Error)]
#[error("Failed to deliver message to {user_id}: {reason}")]
pub struct SendError {
    pub user_id: UserId,
    pub reason: String,
}

/// The single response a turn produces
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Text(String),
    Buttons { text: String, rows: Vec<ButtonRow> },
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Reply::Text(text.into())
    }

    pub async fn send<M: Messenger + ?Sized>(
        &self,
        messenger: &M,
        user_id: UserId,
    ) -> Result<(), SendError> {
        match self {
            Reply::Text(text) => messenger.send_message(user_id, text).await,
            Reply::Buttons { text, rows } => messenger.show_buttons(user_id, text, rows).await,
        }
    }
}

/// Message leaving the bot, as published to stream subscribers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outgoing {
    Text {
        user_id: UserId,
        text: String,
    },
    Buttons {
        user_id: UserId,
        text: String,
        rows: Vec<ButtonRow>,
    },
}

impl Outgoing {
    pub fn user_id(&self) -> UserId {
        match self {
            Outgoing::Text { user_id, .. } | Outgoing::Buttons { user_id, .. } => *user_id,
        }
    }

    #[allow(dead_code)] // Used in tests
    pub fn text(&self) -> &str {
        match self {
            Outgoing::Text { text, .. } | Outgoing::Buttons { text, .. } => text,
        }
    }
}

/// Messenger that publishes to in-process subscribers (the HTTP event stream)
///
/// Messages for users with no open stream are dropped.
#[derive(Clone)]
pub struct BroadcastMessenger {
    tx: broadcast::Sender<Outgoing>,
}

impl BroadcastMessenger {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Outgoing> {
        self.tx.subscribe()
    }

    fn publish(&self, message: Outgoing) {
        let user_id = message.user_id();
        if self.tx.send(message).is_err() {
            tracing::debug!(user_id = %user_id, "No subscribers, outgoing message dropped");
        }
    }
}

#[async_trait]
impl Messenger for BroadcastMessenger {
    async fn send_message(&self, user_id: UserId, text: &str) -> Result<(), SendError> {
        self.publish(Outgoing::Text {
            user_id,
            text: text.to_string(),
        });
        Ok(())
    }

    async fn show_buttons(
        &self,
        user_id: UserId,
        text: &str,
        rows: &[ButtonRow],
    ) -> Result<(), SendError> {
        self.publish(Outgoing::Buttons {
            user_id,
            text: text.to_string(),
            rows: rows.to_vec(),
        });
        Ok(())
    }
}
