use thiserror::Error;

/// Failures talking to the user store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("DynamoDB request failed: {0}")]
    Dynamo(String),

    #[error("Malformed user record {key}: {reason}")]
    Malformed { key: String, reason: String },

    #[error("User store call timed out after {0}s")]
    Timeout(u64),
}

/// Provider-level push failures (per-token failures are reported in the batch response instead)
#[derive(Error, Debug)]
pub enum PushError {
    #[error("Push provider is not configured: {0}")]
    NotConfigured(String),

    #[error("Failed to sign OAuth assertion: {0}")]
    Signing(String),

    #[error("Failed to get access token: {0}")]
    TokenRequest(String),

    #[error("Token request failed with status: {0}")]
    TokenRejected(String),

    #[error("Failed to parse token response: {0}")]
    TokenParse(String),

    #[error("Push send timed out after {0}s")]
    Timeout(u64),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} not set")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}
