use crate::error::PushError;
use crate::oauth::{build_assertion, ServiceAccountKey};
use crate::push::{BatchResponse, MulticastMessage, PushGateway, SendResponse};
use async_trait::async_trait;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::sync::Mutex;

const FCM_BASE_URL: &str = "https://fcm.googleapis.com";

// Refresh a cached access token this many seconds before it expires
const TOKEN_REFRESH_MARGIN_SECS: i64 = 60;

/// Upper bound on `messages:send` requests in flight for one multicast
pub const MAX_CONCURRENT_SENDS: usize = 100;

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: i64,
}

#[derive(Debug, Deserialize)]
struct GoogleTokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Serialize)]
struct FcmRequest<'a> {
    message: FcmMessage<'a>,
}

#[derive(Serialize)]
struct FcmMessage<'a> {
    token: &'a str,
    notification: FcmNotification<'a>,
    data: &'a BTreeMap<String, String>,
}

#[derive(Serialize)]
struct FcmNotification<'a> {
    title: &'a str,
    body: &'a str,
}

#[derive(Debug, Deserialize)]
struct FcmSendResponse {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FcmErrorEnvelope {
    error: FcmErrorBody,
}

#[derive(Debug, Deserialize)]
struct FcmErrorBody {
    status: Option<String>,
    message: Option<String>,
}

/// Firebase Cloud Messaging client (HTTP v1 API)
///
/// A multicast is one `messages:send` call per token, at most
/// `MAX_CONCURRENT_SENDS` in flight. The OAuth2 access token is minted from
/// the service account and cached until shortly before it expires.
pub struct FcmClient {
    credentials: ServiceAccountKey,
    base_url: String,
    http_client: reqwest::Client,
    concurrency: usize,
    token_cache: Mutex<Option<CachedToken>>,
}

impl FcmClient {
    pub fn new(credentials: ServiceAccountKey) -> Self {
        Self {
            credentials,
            base_url: FCM_BASE_URL.to_string(),
            http_client: reqwest::Client::new(),
            concurrency: MAX_CONCURRENT_SENDS,
            token_cache: Mutex::new(None),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn project_id(&self) -> &str {
        &self.credentials.project_id
    }

    async fn access_token(&self) -> Result<String, PushError> {
        let mut cache = self.token_cache.lock().await;
        let now = Utc::now().timestamp();

        if let Some(cached) = cache.as_ref() {
            if cached.expires_at > now + TOKEN_REFRESH_MARGIN_SECS {
                return Ok(cached.access_token.clone());
            }
        }

        let assertion = build_assertion(&self.credentials, now)?;
        let params = [
            ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
            ("assertion", assertion.as_str()),
        ];

        let response = self
            .http_client
            .post(&self.credentials.token_uri)
            .form(&params)
            .send()
            .await
            .map_err(|e| PushError::TokenRequest(e.to_string()))?;

        if !response.status().is_success() {
            return Err(PushError::TokenRejected(response.status().to_string()));
        }

        let token: GoogleTokenResponse = response
            .json()
            .await
            .map_err(|e| PushError::TokenParse(e.to_string()))?;

        tracing::debug!("Minted FCM access token, expires in {}s", token.expires_in);

        *cache = Some(CachedToken {
            access_token: token.access_token.clone(),
            expires_at: now + token.expires_in,
        });

        Ok(token.access_token)
    }

    /// Drop the cached access token if it is still `rejected`
    async fn invalidate_token(&self, rejected: &str) {
        let mut cache = self.token_cache.lock().await;
        if cache.as_ref().is_some_and(|c| c.access_token == rejected) {
            tracing::warn!("FCM rejected the cached access token, minting a new one next send");
            *cache = None;
        }
    }

    async fn send_one(
        &self,
        access_token: &str,
        token: &str,
        message: &MulticastMessage,
    ) -> SendResponse {
        let url = format!(
            "{}/v1/projects/{}/messages:send",
            self.base_url, self.credentials.project_id
        );
        let request = FcmRequest {
            message: FcmMessage {
                token,
                notification: FcmNotification {
                    title: &message.title,
                    body: &message.body,
                },
                data: &message.data,
            },
        };

        let response = match self
            .http_client
            .post(&url)
            .bearer_auth(access_token)
            .json(&request)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => return SendResponse::failed(format!("FCM send request failed: {}", e)),
        };

        let status = response.status();
        if status.is_success() {
            return match response.json::<FcmSendResponse>().await {
                Ok(body) => SendResponse::delivered(body.name.unwrap_or_default()),
                Err(e) => SendResponse::failed(format!("Failed to parse FCM response: {}", e)),
            };
        }

        if status == reqwest::StatusCode::UNAUTHORIZED {
            self.invalidate_token(access_token).await;
        }

        let text = response.text().await.unwrap_or_default();
        let detail = match serde_json::from_str::<FcmErrorEnvelope>(&text) {
            Ok(envelope) => format!(
                "{}: {}",
                envelope.error.status.unwrap_or_else(|| status.to_string()),
                envelope.error.message.unwrap_or_default()
            ),
            Err(_) => format!("FCM API error: {} - {}", status, text),
        };
        SendResponse::failed(detail)
    }
}

#[async_trait]
impl PushGateway for FcmClient {
    async fn send_multicast(&self, message: &MulticastMessage) -> Result<BatchResponse, PushError> {
        let access_token = self.access_token().await?;

        // buffered() yields in input order, so responses line up with tokens
        let sends: Vec<_> = message
            .tokens
            .iter()
            .map(|token| self.send_one(&access_token, token, message))
            .collect();
        let responses = stream::iter(sends)
            .buffered(self.concurrency)
            .collect::<Vec<_>>()
            .await;

        Ok(BatchResponse { responses })
    }
}
