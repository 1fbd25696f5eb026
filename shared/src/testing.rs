//! In-memory collaborators for tests.

use crate::error::{PushError, StoreError};
use crate::push::{BatchResponse, MulticastMessage, PushGateway, SendResponse};
use crate::types::{Role, UserRecord};
use crate::users::UserStore;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;

pub fn user(mobile: &str, role: Role, name: &str, token: Option<&str>) -> UserRecord {
    UserRecord {
        mobile_number: mobile.to_string(),
        role,
        name: name.to_string(),
        device_token: token.map(|t| t.to_string()),
        last_login_at: None,
    }
}

/// User store backed by a vector; iteration order is store order
#[derive(Default)]
pub struct InMemoryUserStore {
    users: Vec<UserRecord>,
    failing_roles: HashSet<Role>,
    failing_mobiles: HashSet<String>,
    delay: Option<Duration>,
    calls: Mutex<Vec<String>>,
}

impl InMemoryUserStore {
    pub fn new(users: Vec<UserRecord>) -> Self {
        Self {
            users,
            ..Default::default()
        }
    }

    pub fn failing_role(mut self, role: Role) -> Self {
        self.failing_roles.insert(role);
        self
    }

    pub fn failing_mobile(mut self, mobile: &str) -> Self {
        self.failing_mobiles.insert(mobile.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Calls made so far, e.g. `role:admin`, `roles:admin,employee`, `mobile:9000000001`
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock").clone()
    }

    async fn record(&self, call: String) {
        self.calls.lock().expect("calls lock").push(call);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn by_roles(&self, roles: &[Role]) -> Vec<UserRecord> {
        self.users
            .iter()
            .filter(|u| roles.contains(&u.role))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn users_with_role(&self, role: Role) -> Result<Vec<UserRecord>, StoreError> {
        self.record(format!("role:{}", role.as_str())).await;
        if self.failing_roles.contains(&role) {
            return Err(StoreError::Dynamo(format!("scan for {} failed", role.as_str())));
        }
        Ok(self.by_roles(&[role]))
    }

    async fn users_with_any_role(&self, roles: &[Role]) -> Result<Vec<UserRecord>, StoreError> {
        let names: Vec<&str> = roles.iter().map(|r| r.as_str()).collect();
        self.record(format!("roles:{}", names.join(","))).await;
        if roles.iter().any(|r| self.failing_roles.contains(r)) {
            return Err(StoreError::Dynamo("scan failed".to_string()));
        }
        Ok(self.by_roles(roles))
    }

    async fn user_by_mobile(&self, mobile: &str) -> Result<Option<UserRecord>, StoreError> {
        self.record(format!("mobile:{}", mobile)).await;
        if self.failing_mobiles.contains(mobile) {
            return Err(StoreError::Dynamo(format!("get_item for {} failed", mobile)));
        }
        Ok(self
            .users
            .iter()
            .find(|u| u.mobile_number == mobile)
            .cloned())
    }
}

enum GatewayBehaviour {
    Deliver { failing_tokens: HashSet<String> },
    Reject(String),
}

/// Push gateway that records every multicast it is asked to send
pub struct RecordingGateway {
    behaviour: GatewayBehaviour,
    delay: Option<Duration>,
    sent: Mutex<Vec<MulticastMessage>>,
}

impl RecordingGateway {
    /// Every token is delivered
    pub fn delivering() -> Self {
        Self {
            behaviour: GatewayBehaviour::Deliver {
                failing_tokens: HashSet::new(),
            },
            delay: None,
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Listed tokens fail individually, the rest are delivered
    pub fn failing_tokens(tokens: &[&str]) -> Self {
        Self {
            behaviour: GatewayBehaviour::Deliver {
                failing_tokens: tokens.iter().map(|t| t.to_string()).collect(),
            },
            ..Self::delivering()
        }
    }

    /// The whole call is rejected at provider level
    pub fn rejecting(reason: &str) -> Self {
        Self {
            behaviour: GatewayBehaviour::Reject(reason.to_string()),
            ..Self::delivering()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn sent(&self) -> Vec<MulticastMessage> {
        self.sent.lock().expect("sent lock").clone()
    }

    pub fn call_count(&self) -> usize {
        self.sent.lock().expect("sent lock").len()
    }
}

#[async_trait]
impl PushGateway for RecordingGateway {
    async fn send_multicast(&self, message: &MulticastMessage) -> Result<BatchResponse, PushError> {
        self.sent.lock().expect("sent lock").push(message.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match &self.behaviour {
            GatewayBehaviour::Reject(reason) => Err(PushError::TokenRejected(reason.clone())),
            GatewayBehaviour::Deliver { failing_tokens } => Ok(BatchResponse {
                responses: message
                    .tokens
                    .iter()
                    .enumerate()
                    .map(|(i, token)| {
                        if failing_tokens.contains(token) {
                            SendResponse::failed("messaging/registration-token-not-registered")
                        } else {
                            SendResponse::delivered(format!("projects/test/messages/{}", i))
                        }
                    })
                    .collect(),
            }),
        }
    }
}
