use crate::error::StoreError;
use crate::types::{Role, UserRecord};
use crate::users::UserStore;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

const SINGLE_MOBILE_LEN: usize = 10;

/// Who a custom notification is addressed to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Audience {
    AdminAndEmployees,
    AllStaff,
    AllCustomers,
    MobileList(Vec<String>),
    SingleMobile(String),
    /// Anything else; resolves to nobody without an error
    Unrecognized,
}

impl Audience {
    /// Interpret the `recipients` field of a request body
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::String(s) => match s.as_str() {
                "admin_and_employees" => Audience::AdminAndEmployees,
                "all_staff" => Audience::AllStaff,
                "all_customers" => Audience::AllCustomers,
                mobile if mobile.chars().count() == SINGLE_MOBILE_LEN => {
                    Audience::SingleMobile(mobile.to_string())
                }
                _ => Audience::Unrecognized,
            },
            Value::Array(items) => Audience::MobileList(
                items
                    .iter()
                    .filter_map(|item| match item.as_str() {
                        Some(mobile) => Some(mobile.to_string()),
                        None => {
                            tracing::warn!("Skipping non-string mobile number: {}", item);
                            None
                        }
                    })
                    .collect(),
            ),
            _ => Audience::Unrecognized,
        }
    }

    /// Value of `recipientInfo.type` in responses
    pub fn type_name(&self) -> Option<&'static str> {
        match self {
            Audience::AdminAndEmployees => Some("admin_and_employees"),
            Audience::AllStaff => Some("all_staff"),
            Audience::AllCustomers => Some("all_customers"),
            Audience::MobileList(_) => Some("specific_mobiles"),
            Audience::SingleMobile(_) => Some("single_mobile"),
            Audience::Unrecognized => None,
        }
    }
}

/// A device token and who it belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Recipient {
    pub token: String,
    pub label: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipientInfo {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub audience_type: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub employee_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_with_tokens: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    pub recipients: Vec<Recipient>,
    pub info: RecipientInfo,
}

impl Resolution {
    fn new(audience: &Audience, recipients: Vec<Recipient>) -> Self {
        let info = match audience {
            Audience::Unrecognized => RecipientInfo::default(),
            _ => RecipientInfo {
                audience_type: audience.type_name(),
                total_with_tokens: Some(recipients.len()),
                ..Default::default()
            },
        };
        Self { recipients, info }
    }

    pub fn is_empty(&self) -> bool {
        self.recipients.is_empty()
    }

    pub fn tokens(&self) -> Vec<String> {
        self.recipients.iter().map(|r| r.token.clone()).collect()
    }

    pub fn labels(&self) -> Vec<String> {
        self.recipients.iter().map(|r| r.label.clone()).collect()
    }
}

/// First 20 characters of a token, for logs
pub(crate) fn token_prefix(token: &str) -> String {
    token.chars().take(20).collect()
}

/// Turns an audience into device tokens using the user store
///
/// Store failures never escape: they are logged and the affected lookup
/// contributes no recipients.
pub struct Resolver {
    store: Arc<dyn UserStore>,
    timeout: Duration,
}

impl Resolver {
    pub fn new(store: Arc<dyn UserStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    pub async fn resolve(&self, audience: &Audience) -> Resolution {
        match audience {
            Audience::AdminAndEmployees => self.admin_and_employees().await,
            Audience::AllStaff => self.all_staff().await,
            Audience::AllCustomers => self.all_customers().await,
            Audience::MobileList(mobiles) => {
                let mut recipients = Vec::new();
                for mobile in mobiles {
                    if let Some(token) = self.customer_token(mobile).await {
                        recipients.push(Recipient {
                            token,
                            label: format!("Mobile: {}", mobile),
                        });
                    }
                }
                Resolution::new(audience, recipients)
            }
            Audience::SingleMobile(mobile) => {
                let recipients = self
                    .customer_token(mobile)
                    .await
                    .map(|token| Recipient {
                        token,
                        label: format!("Mobile: {}", mobile),
                    })
                    .into_iter()
                    .collect();
                Resolution::new(audience, recipients)
            }
            Audience::Unrecognized => {
                tracing::warn!("Unrecognized recipients descriptor, resolving to nobody");
                Resolution::new(audience, Vec::new())
            }
        }
    }

    /// Device token of the user registered under `mobile`, if any
    pub async fn customer_token(&self, mobile: &str) -> Option<String> {
        tracing::info!("🔍 Fetching token for mobile: {}", mobile);

        match self.bounded(self.store.user_by_mobile(mobile)).await {
            Ok(Some(user)) => match user.usable_token() {
                Some(token) => {
                    tracing::info!("📱 Found token: {}...", token_prefix(token));
                    Some(token.to_string())
                }
                None => {
                    tracing::info!("No device token for {}", mobile);
                    None
                }
            },
            Ok(None) => {
                tracing::info!("No user registered under {}", mobile);
                None
            }
            Err(e) => {
                tracing::error!("Error fetching token for {}: {}", mobile, e);
                None
            }
        }
    }

    async fn admin_and_employees(&self) -> Resolution {
        let (admins, employees) = tokio::join!(
            self.bounded(self.store.users_with_role(Role::Admin)),
            self.bounded(self.store.users_with_role(Role::Employee)),
        );

        let (admins, employees) = match (admins, employees) {
            (Ok(a), Ok(e)) => (a, e),
            (Err(e), _) | (_, Err(e)) => {
                tracing::error!("Error fetching admin/employee tokens: {}", e);
                return Resolution {
                    recipients: Vec::new(),
                    info: RecipientInfo {
                        audience_type: Audience::AdminAndEmployees.type_name(),
                        admin_count: Some(0),
                        employee_count: Some(0),
                        total_with_tokens: Some(0),
                    },
                };
            }
        };

        tracing::info!(
            "📋 Found {} admin and {} employee users",
            admins.len(),
            employees.len()
        );

        let mut recipients = collect_recipients(&admins, |u| {
            format!("Admin: {} ({})", u.name, u.mobile_number)
        });
        recipients.extend(collect_recipients(&employees, |u| {
            format!("Employee: {} ({})", u.name, u.mobile_number)
        }));

        tracing::info!("✅ Total admin/employee tokens collected: {}", recipients.len());

        Resolution {
            info: RecipientInfo {
                audience_type: Audience::AdminAndEmployees.type_name(),
                admin_count: Some(admins.len()),
                employee_count: Some(employees.len()),
                total_with_tokens: Some(recipients.len()),
            },
            recipients,
        }
    }

    async fn all_staff(&self) -> Resolution {
        let staff = match self
            .bounded(self.store.users_with_any_role(&[Role::Admin, Role::Employee]))
            .await
        {
            Ok(staff) => staff,
            Err(e) => {
                tracing::error!("Error fetching staff tokens: {}", e);
                Vec::new()
            }
        };

        let recipients = collect_recipients(&staff, |u| {
            format!("{}: {} ({})", u.role, u.name, u.mobile_number)
        });
        tracing::info!(
            "✅ Found {} valid staff tokens out of {} staff members",
            recipients.len(),
            staff.len()
        );

        Resolution::new(&Audience::AllStaff, recipients)
    }

    async fn all_customers(&self) -> Resolution {
        let customers = match self.bounded(self.store.users_with_role(Role::Customer)).await {
            Ok(customers) => customers,
            Err(e) => {
                tracing::error!("Error fetching customer tokens: {}", e);
                Vec::new()
            }
        };

        let recipients = collect_recipients(&customers, |u| {
            format!("Customer: {} ({})", u.name, u.mobile_number)
        });

        Resolution::new(&Audience::AllCustomers, recipients)
    }

    async fn bounded<T, F>(&self, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| StoreError::Timeout(self.timeout.as_secs()))?
    }
}

/// Users with a usable token, in input order; duplicate tokens are kept
fn collect_recipients<F>(users: &[UserRecord], label: F) -> Vec<Recipient>
where
    F: Fn(&UserRecord) -> String,
{
    users
        .iter()
        .filter_map(|user| match user.usable_token() {
            Some(token) => {
                tracing::info!("📱 ✅ {} -> {}...", label(user), token_prefix(token));
                Some(Recipient {
                    token: token.to_string(),
                    label: label(user),
                })
            }
            None => {
                tracing::info!("📱 ❌ No device token for {}", label(user));
                None
            }
        })
        .collect()
}
