use crate::error::PushError;
use crate::push::{MulticastMessage, PushGateway};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Per-token outcome, `index` points into the token list that was sent
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenOutcome {
    pub index: usize,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MulticastReport {
    pub attempted: usize,
    #[serde(rename = "successCount")]
    pub succeeded: usize,
    #[serde(rename = "failureCount")]
    pub failed: usize,
    #[serde(rename = "responses")]
    pub outcomes: Vec<TokenOutcome>,
}

/// Result of one dispatch: either a report or the reason nothing was sent
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub report: Option<MulticastReport>,
}

impl DispatchResult {
    fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            report: None,
        }
    }

    pub fn success_count(&self) -> usize {
        self.report.as_ref().map(|r| r.succeeded).unwrap_or(0)
    }

    pub fn failure_count(&self) -> usize {
        self.report.as_ref().map(|r| r.failed).unwrap_or(0)
    }
}

/// Sends one multicast per call and folds the provider's answer into a `DispatchResult`
pub struct Dispatcher {
    gateway: Arc<dyn PushGateway>,
    timeout: Duration,
}

impl Dispatcher {
    pub fn new(gateway: Arc<dyn PushGateway>, timeout: Duration) -> Self {
        Self { gateway, timeout }
    }

    pub fn is_available(&self) -> bool {
        self.gateway.is_available()
    }

    pub async fn dispatch(
        &self,
        tokens: &[String],
        title: &str,
        body: &str,
        data: BTreeMap<String, String>,
    ) -> DispatchResult {
        if tokens.is_empty() {
            tracing::warn!("❌ No tokens provided for notification");
            return DispatchResult::failure("No tokens provided");
        }

        let message = MulticastMessage {
            title: title.to_string(),
            body: body.to_string(),
            data: with_timestamp(data),
            tokens: tokens.to_vec(),
        };

        tracing::info!("📤 Sending notification to {} devices", tokens.len());
        tracing::info!("📋 Title: {}", title);
        tracing::debug!("📋 Body: {}", body.chars().take(100).collect::<String>());

        let sent = tokio::time::timeout(self.timeout, self.gateway.send_multicast(&message))
            .await
            .unwrap_or_else(|_| Err(PushError::Timeout(self.timeout.as_secs())));

        let batch = match sent {
            Ok(batch) => batch,
            Err(e) => {
                tracing::error!("❌ Error sending notification: {}", e);
                return DispatchResult::failure(e.to_string());
            }
        };

        let outcomes: Vec<TokenOutcome> = batch
            .responses
            .into_iter()
            .enumerate()
            .map(|(index, r)| TokenOutcome {
                index,
                success: r.success,
                message_id: r.message_id,
                error: r.error,
            })
            .collect();
        let succeeded = outcomes.iter().filter(|o| o.success).count();
        let failed = outcomes.len() - succeeded;

        tracing::info!("📊 Success count: {}, failure count: {}", succeeded, failed);
        for outcome in outcomes.iter().filter(|o| !o.success) {
            tracing::warn!(
                "❌ Failed to send to token {}: {}",
                outcome.index,
                outcome.error.as_deref().unwrap_or("unknown error")
            );
        }

        DispatchResult {
            success: true,
            error: None,
            report: Some(MulticastReport {
                attempted: tokens.len(),
                succeeded,
                failed,
                outcomes,
            }),
        }
    }
}

/// Merge the send timestamp last so it always wins over a caller-supplied one
fn with_timestamp(mut data: BTreeMap<String, String>) -> BTreeMap<String, String> {
    data.insert(
        "timestamp".to_string(),
        chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
    );
    data
}
