//! Report request channel and the compute worker behind it

use crate::period::Period;
use crate::runtime::{ReportChannel, UserDataStore};
use crate::store::{ReportRow, UserId};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Request to compute one report, keyed by user and period
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRequest {
    pub request_id: Uuid,
    pub topic: String,
    pub user_id: UserId,
    pub period: Period,
}

impl ReportRequest {
    pub fn new(topic: impl Into<String>, user_id: UserId, period: Period) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            topic: topic.into(),
            user_id,
            period,
        }
    }

    /// Message key: the user id
    pub fn key(&self) -> String {
        self.user_id.to_string()
    }

    /// Message value: the period tag
    pub fn value(&self) -> &'static str {
        self.period.tag()
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReportDispatchError {
    #[error("Report queue is full")]
    QueueFull,
    #[error("Report queue is closed")]
    Closed,
}

/// Outcome of a computation, fed back through the completion path
#[derive(Debug, Clone)]
pub struct ReportCompletion {
    pub user_id: UserId,
    pub period: Period,
    /// Aggregates in base currency, or the reason the computation failed
    pub outcome: Result<Vec<ReportRow>, String>,
}

/// Channel backed by a bounded in-process queue
///
/// `dispatch` never waits: a full queue is reported as an error.
pub struct QueueReportChannel {
    topic: String,
    tx: mpsc::Sender<ReportRequest>,
}

impl QueueReportChannel {
    pub fn new(topic: impl Into<String>, capacity: usize) -> (Self, mpsc::Receiver<ReportRequest>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                topic: topic.into(),
                tx,
            },
            rx,
        )
    }
}

#[async_trait]
impl ReportChannel for QueueReportChannel {
    async fn dispatch(&self, request: ReportRequest) -> Result<(), ReportDispatchError> {
        self.tx.try_send(request).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => ReportDispatchError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => ReportDispatchError::Closed,
        })
    }

    fn topic(&self) -> &str {
        &self.topic
    }
}

/// Computes aggregates for queued requests
///
/// Stands in for the external compute service: it owns no reply channel to
/// the requester and reports only through `ReportCompletion` messages.
pub struct ReportWorker<S> {
    store: S,
    requests: mpsc::Receiver<ReportRequest>,
    completions: mpsc::Sender<ReportCompletion>,
}

impl<S: UserDataStore> ReportWorker<S> {
    pub fn new(
        store: S,
        requests: mpsc::Receiver<ReportRequest>,
        completions: mpsc::Sender<ReportCompletion>,
    ) -> Self {
        Self {
            store,
            requests,
            completions,
        }
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        tracing::info!("Report worker started");
        loop {
            let request = tokio::select! {
                () = cancel.cancelled() => break,
                request = self.requests.recv() => match request {
                    Some(request) => request,
                    None => break,
                },
            };
            let completion = self.compute(&request).await;
            if self.completions.send(completion).await.is_err() {
                tracing::warn!("Completion receiver dropped, stopping report worker");
                break;
            }
        }
        tracing::info!("Report worker stopped");
    }

    async fn compute(&self, request: &ReportRequest) -> ReportCompletion {
        let since = request.period.window_start(Utc::now());
        let outcome = self
            .store
            .report_rows(request.user_id, since)
            .await
            .map_err(|e| e.to_string());
        match &outcome {
            Ok(rows) => tracing::debug!(
                request_id = %request.request_id,
                topic = %request.topic,
                key = %request.key(),
                value = request.value(),
                rows = rows.len(),
                "Report computed"
            ),
            Err(e) => tracing::error!(
                request_id = %request.request_id,
                key = %request.key(),
                value = request.value(),
                error = %e,
                "Report computation failed"
            ),
        }
        ReportCompletion {
            user_id: request.user_id,
            period: request.period,
            outcome,
        }
    }
}
