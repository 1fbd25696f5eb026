use crate::error::ConfigError;
use crate::oauth::ServiceAccountKey;
use std::env;
use std::time::Duration;

const TABLE_NAME: &str = "TABLE_NAME";
const SERVICE_ACCOUNT_KEY: &str = "FIREBASE_SERVICE_ACCOUNT_KEY";
const PROJECT_ID: &str = "FIREBASE_PROJECT_ID";
const DATABASE_URL: &str = "FIREBASE_DATABASE_URL";
const DOWNSTREAM_TIMEOUT_SECS: &str = "DOWNSTREAM_TIMEOUT_SECS";

const DEFAULT_TABLE_NAME: &str = "users";
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Process configuration, read once at startup
#[derive(Debug, Clone)]
pub struct Config {
    pub table_name: String,
    pub database_url: Option<String>,
    pub downstream_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let table_name = lookup(TABLE_NAME)
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_TABLE_NAME.to_string());

        let database_url = lookup(DATABASE_URL).filter(|s| !s.trim().is_empty());

        let timeout_secs = match lookup(DOWNSTREAM_TIMEOUT_SECS) {
            Some(raw) => {
                let secs = raw.trim().parse::<u64>().map_err(|e| ConfigError::Invalid {
                    name: DOWNSTREAM_TIMEOUT_SECS,
                    reason: e.to_string(),
                })?;
                if secs == 0 {
                    return Err(ConfigError::Invalid {
                        name: DOWNSTREAM_TIMEOUT_SECS,
                        reason: "must be greater than zero".to_string(),
                    });
                }
                secs
            }
            None => DEFAULT_TIMEOUT_SECS,
        };

        Ok(Self {
            table_name,
            database_url,
            downstream_timeout: Duration::from_secs(timeout_secs),
        })
    }
}

/// Parse the service account blob, honouring an explicit project id override
pub fn service_account_from_env() -> Result<ServiceAccountKey, ConfigError> {
    service_account_from_lookup(|name| env::var(name).ok())
}

pub fn service_account_from_lookup<F>(lookup: F) -> Result<ServiceAccountKey, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let blob = lookup(SERVICE_ACCOUNT_KEY)
        .filter(|s| !s.trim().is_empty())
        .ok_or(ConfigError::Missing(SERVICE_ACCOUNT_KEY))?;

    let mut key: ServiceAccountKey =
        serde_json::from_str(&blob).map_err(|e| ConfigError::Invalid {
            name: SERVICE_ACCOUNT_KEY,
            reason: e.to_string(),
        })?;

    if let Some(project_id) = lookup(PROJECT_ID).filter(|s| !s.trim().is_empty()) {
        key.project_id = project_id;
    }

    Ok(key)
}
