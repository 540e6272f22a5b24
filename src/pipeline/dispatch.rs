// src/pipeline/dispatch.rs

//! Fan-out of one delivery per pending notification.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};

use crate::error::{AppError, Result};
use crate::models::{DeliveryFailure, NotifierConfig, PendingNotification};
use crate::services::MailTransport;
use crate::storage::Repository;

/// Outcome of one dispatch call.
#[derive(Debug, Default)]
pub struct DispatchReport {
    /// Ids delivered and marked as sent
    pub delivered: Vec<u64>,
    pub failed: Vec<DeliveryFailure>,
}

/// Delivers pending notifications and marks the delivered ones as sent.
pub struct NotificationDispatcher {
    transport: Arc<dyn MailTransport>,
    repository: Arc<dyn Repository>,
    concurrency: usize,
    timeout: Duration,
}

impl NotificationDispatcher {
    pub fn new(
        transport: Arc<dyn MailTransport>,
        repository: Arc<dyn Repository>,
        config: &NotifierConfig,
    ) -> Self {
        Self {
            transport,
            repository,
            concurrency: config.max_concurrent.max(1),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    /// Attempt each message once. Failed messages stay unsent and are picked
    /// up again by the next cycle.
    pub async fn dispatch(&self, pending: Vec<PendingNotification>) -> DispatchReport {
        let mut report = DispatchReport::default();
        let mut deliveries = stream::iter(pending.into_iter().filter(|n| !n.sent))
            .map(|notification| async move {
                let result = self.deliver(&notification).await;
                (notification.id, result)
            })
            .buffer_unordered(self.concurrency);

        while let Some((id, result)) = deliveries.next().await {
            match result {
                Ok(()) => {
                    log::debug!("Delivered notification {}", id);
                    report.delivered.push(id);
                }
                Err(error) => {
                    log::warn!("Failed to deliver notification {}: {}", id, error);
                    report.failed.push(DeliveryFailure { id, error });
                }
            }
        }

        report
    }

    async fn deliver(&self, notification: &PendingNotification) -> Result<()> {
        tokio::time::timeout(self.timeout, self.transport.send(&notification.message))
            .await
            .map_err(|_| {
                AppError::timeout(
                    format!("delivery of notification {}", notification.id),
                    self.timeout,
                )
            })??;

        // A failed update leaves the message unsent; it may be delivered again.
        self.repository
            .mark_notification_sent(notification.id)
            .await
    }
}
