use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ========== USER ==========
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Employee,
    Customer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Employee => "employee",
            Role::Customer => "customer",
        }
    }

    pub fn parse(raw: &str) -> Option<Role> {
        match raw {
            "admin" => Some(Role::Admin),
            "employee" => Some(Role::Employee),
            "customer" => Some(Role::Customer),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User stored in the document store, keyed by mobile number
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub mobile_number: String,
    pub role: Role,
    pub name: String,
    pub device_token: Option<String>,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl UserRecord {
    /// Device token if present and not blank
    pub fn usable_token(&self) -> Option<&str> {
        self.device_token
            .as_deref()
            .filter(|token| !token.trim().is_empty())
    }
}

// ========== TOKEN CHECK ==========
#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct StaffTokenStatus {
    pub name: String,
    pub mobile: String,
    pub has_token: bool,
    pub last_login: String, // ISO-8601 or "Never"
}

impl From<&UserRecord> for StaffTokenStatus {
    fn from(user: &UserRecord) -> Self {
        Self {
            name: user.name.clone(),
            mobile: user.mobile_number.clone(),
            has_token: user.usable_token().is_some(),
            last_login: user
                .last_login_at
                .map(|at| at.to_rfc3339_opts(chrono::SecondsFormat::Millis, true))
                .unwrap_or_else(|| "Never".to_string()),
        }
    }
}

#[derive(Debug, Serialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct StaffTokenReport {
    pub admins: Vec<StaffTokenStatus>,
    pub employees: Vec<StaffTokenStatus>,
    pub total_with_tokens: usize,
    pub total_without_tokens: usize,
}

impl StaffTokenReport {
    pub fn new(admins: &[UserRecord], employees: &[UserRecord]) -> Self {
        let admins: Vec<StaffTokenStatus> = admins.iter().map(StaffTokenStatus::from).collect();
        let employees: Vec<StaffTokenStatus> =
            employees.iter().map(StaffTokenStatus::from).collect();
        let total_with_tokens = admins
            .iter()
            .chain(employees.iter())
            .filter(|s| s.has_token)
            .count();
        let total_without_tokens = admins.len() + employees.len() - total_with_tokens;

        Self {
            admins,
            employees,
            total_with_tokens,
            total_without_tokens,
        }
    }
}
