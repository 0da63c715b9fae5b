//! Cache-aside report retrieval with out-of-band fulfillment

use super::cache::ReportCache;
use super::channel::{ReportCompletion, ReportRequest};
use super::formatter::format_report;
use crate::currency::{CurrencyError, ExchangeRates};
use crate::messenger::SendError;
use crate::period::Period;
use crate::runtime::{Messenger, ReportChannel, UserDataStore};
use crate::store::{ReportRow, StoreError, UserId};
use crate::texts;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Failed to read report data: {0}")]
    Store(#[from] StoreError),
    #[error("Failed to convert report: {0}")]
    Currency(#[from] CurrencyError),
    #[error(transparent)]
    Send(#[from] SendError),
}

pub struct ReportPipeline<S, M, C> {
    store: S,
    messenger: M,
    channel: C,
    rates: Arc<dyn ExchangeRates>,
    cache: ReportCache,
    /// Cache keys with an outstanding request, and when it was dispatched
    in_flight: Mutex<HashMap<String, Instant>>,
    retry_after: Duration,
}

impl<S, M, C> ReportPipeline<S, M, C>
where
    S: UserDataStore,
    M: Messenger,
    C: ReportChannel,
{
    pub fn new(
        store: S,
        messenger: M,
        channel: C,
        rates: Arc<dyn ExchangeRates>,
        cache: ReportCache,
        retry_after: Duration,
    ) -> Self {
        Self {
            store,
            messenger,
            channel,
            rates,
            cache,
            in_flight: Mutex::new(HashMap::new()),
            retry_after,
        }
    }

    /// Text to answer a report command with
    ///
    /// A cached report is returned as is. Otherwise a computation request is
    /// dispatched (once per key until it completes or the retry window passes)
    /// and the "being prepared" placeholder is returned.
    pub async fn get_report(&self, user_id: UserId, period: Period) -> String {
        if let Some(text) = self.cache.get(user_id, period) {
            tracing::debug!(user_id = %user_id, period = period.tag(), "Report cache hit");
            return text;
        }

        let key = ReportCache::key(user_id, period);
        if !self.mark_in_flight(&key) {
            tracing::debug!(user_id = %user_id, period = period.tag(), "Report already requested");
            return texts::REPORT_PREPARING.to_string();
        }

        let request = ReportRequest::new(self.channel.topic(), user_id, period);
        let request_id = request.request_id;
        match self.channel.dispatch(request).await {
            Ok(()) => {
                tracing::info!(
                    user_id = %user_id,
                    period = period.tag(),
                    request_id = %request_id,
                    "Report requested"
                );
                texts::REPORT_PREPARING.to_string()
            }
            Err(e) => {
                self.clear_in_flight(&key);
                tracing::warn!(user_id = %user_id, period = period.tag(), error = %e, "Report dispatch failed");
                texts::REPORT_FAILED.to_string()
            }
        }
    }

    /// Completion path: render computed rows, cache them and send to the user
    pub async fn deliver_report(
        &self,
        rows: Vec<ReportRow>,
        user_id: UserId,
        period: Period,
    ) -> Result<(), ReportError> {
        self.clear_in_flight(&ReportCache::key(user_id, period));

        let currency = self
            .store
            .currency_or(user_id, self.rates.main_currency())
            .await?;
        let converted = rows
            .into_iter()
            .map(|row| {
                let amount = self.rates.from_base(&currency, row.amount)?;
                Ok(ReportRow::new(row.category, amount))
            })
            .collect::<Result<Vec<_>, CurrencyError>>()?;

        let text = format_report(&converted, &currency, period)?;
        self.cache.put(user_id, period, text.clone());
        tracing::info!(
            user_id = %user_id,
            period = period.tag(),
            rows = converted.len(),
            cached = self.cache.len(),
            "Report delivered"
        );
        self.messenger.send_message(user_id, &text).await?;
        Ok(())
    }

    /// Completion path for a failed computation
    pub async fn report_failed(
        &self,
        user_id: UserId,
        period: Period,
        reason: &str,
    ) -> Result<(), ReportError> {
        self.clear_in_flight(&ReportCache::key(user_id, period));
        tracing::warn!(user_id = %user_id, period = period.tag(), reason, "Report computation failed");
        self.messenger
            .send_message(user_id, texts::REPORT_FAILED)
            .await?;
        Ok(())
    }

    pub async fn handle_completion(&self, completion: ReportCompletion) {
        let ReportCompletion {
            user_id,
            period,
            outcome,
        } = completion;
        let result = match outcome {
            Ok(rows) => match self.deliver_report(rows, user_id, period).await {
                Err(ReportError::Send(e)) => Err(ReportError::Send(e)),
                Err(e) => {
                    tracing::error!(user_id = %user_id, error = %e, "Failed to render report");
                    self.report_failed(user_id, period, &e.to_string()).await
                }
                Ok(()) => Ok(()),
            },
            Err(reason) => self.report_failed(user_id, period, &reason).await,
        };
        if let Err(e) = result {
            tracing::error!(user_id = %user_id, period = period.tag(), error = %e, "Report completion not delivered");
        }
    }

    /// Drop the user's cached reports after their data changed
    pub fn invalidate_user(&self, user_id: UserId) {
        self.cache.invalidate_user(user_id);
    }

    /// Record a dispatch for `key`; false if one is already outstanding
    fn mark_in_flight(&self, key: &str) -> bool {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        if let Some(started) = in_flight.get(key) {
            if now.duration_since(*started) < self.retry_after {
                return false;
            }
        }
        in_flight.insert(key.to_string(), now);
        true
    }

    fn clear_in_flight(&self, key: &str) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }
}

/// Feed completions into the pipeline until cancelled or the sender is gone
pub async fn run_completion_loop<S, M, C>(
    pipeline: Arc<ReportPipeline<S, M, C>>,
    mut completions: mpsc::Receiver<ReportCompletion>,
    cancel: CancellationToken,
) where
    S: UserDataStore,
    M: Messenger,
    C: ReportChannel,
{
    tracing::info!("Report completion loop started");
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            completion = completions.recv() => match completion {
                Some(completion) => pipeline.handle_completion(completion).await,
                None => break,
            },
        }
    }
    tracing::info!("Report completion loop stopped");
}
