use crate::error::PushError;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;

/// Notification envelope sent to every token of a multicast
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MulticastMessage {
    pub title: String,
    pub body: String,
    pub data: BTreeMap<String, String>,
    pub tokens: Vec<String>,
}

/// Outcome for one token of a multicast, aligned by index with `MulticastMessage::tokens`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SendResponse {
    pub fn delivered(message_id: impl Into<String>) -> Self {
        Self {
            success: true,
            message_id: Some(message_id.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message_id: None,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct BatchResponse {
    pub responses: Vec<SendResponse>,
}

impl BatchResponse {
    pub fn success_count(&self) -> usize {
        self.responses.iter().filter(|r| r.success).count()
    }

    pub fn failure_count(&self) -> usize {
        self.responses.len() - self.success_count()
    }
}

/// Push messaging provider
#[async_trait]
pub trait PushGateway: Send + Sync {
    /// Send one envelope to every token. `Err` means the provider rejected the whole call.
    async fn send_multicast(&self, message: &MulticastMessage) -> Result<BatchResponse, PushError>;

    /// Whether credentials were loaded at startup
    fn is_available(&self) -> bool {
        true
    }
}

/// Stand-in used when the service account could not be loaded
pub struct UnconfiguredGateway {
    reason: String,
}

impl UnconfiguredGateway {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl PushGateway for UnconfiguredGateway {
    async fn send_multicast(
        &self,
        _message: &MulticastMessage,
    ) -> Result<BatchResponse, PushError> {
        Err(PushError::NotConfigured(self.reason.clone()))
    }

    fn is_available(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_counts() {
        let batch = BatchResponse {
            responses: vec![
                SendResponse::delivered("projects/p/messages/1"),
                SendResponse::failed("UNREGISTERED"),
                SendResponse::delivered("projects/p/messages/2"),
            ],
        };
        assert_eq!(batch.success_count(), 2);
        assert_eq!(batch.failure_count(), 1);
    }

    #[tokio::test]
    async fn unconfigured_gateway_refuses_to_send() {
        let gateway = UnconfiguredGateway::new("FIREBASE_SERVICE_ACCOUNT_KEY not set");
        let message = MulticastMessage {
            title: "T".to_string(),
            body: "B".to_string(),
            data: BTreeMap::new(),
            tokens: vec!["tok".to_string()],
        };

        assert!(!gateway.is_available());
        let err = gateway.send_multicast(&message).await.unwrap_err();
        assert!(err.to_string().contains("not configured"));
    }
}
