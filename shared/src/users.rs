use crate::error::StoreError;
use crate::types::{Role, UserRecord};
use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client as DynamoClient;
use std::collections::HashMap;

/// Read-only view of the user collection
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Users whose role equals `role`, in store order
    async fn users_with_role(&self, role: Role) -> Result<Vec<UserRecord>, StoreError>;

    /// Users whose role is any of `roles`, in a single pass
    async fn users_with_any_role(&self, roles: &[Role]) -> Result<Vec<UserRecord>, StoreError>;

    /// Point lookup by mobile number
    async fn user_by_mobile(&self, mobile: &str) -> Result<Option<UserRecord>, StoreError>;
}

/// Users stored in DynamoDB with PK=USER#mobile, SK=USER#mobile
pub struct DynamoUserStore {
    client: DynamoClient,
    table_name: String,
}

impl DynamoUserStore {
    pub fn new(client: DynamoClient, table_name: impl Into<String>) -> Self {
        Self {
            client,
            table_name: table_name.into(),
        }
    }

    /// Paginated scan over user items matching `role_filter`
    async fn scan_users(
        &self,
        role_filter: &str,
        values: Vec<(String, AttributeValue)>,
    ) -> Result<Vec<UserRecord>, StoreError> {
        let filter = format!("entity_type = :entity AND {}", role_filter);
        let mut users = Vec::new();
        let mut start_key: Option<HashMap<String, AttributeValue>> = None;

        loop {
            let mut req = self
                .client
                .scan()
                .table_name(&self.table_name)
                .filter_expression(&filter)
                .expression_attribute_names("#role", "role")
                .expression_attribute_values(":entity", AttributeValue::S("user".to_string()));
            for (name, value) in &values {
                req = req.expression_attribute_values(name, value.clone());
            }
            if let Some(key) = start_key.take() {
                req = req.set_exclusive_start_key(Some(key));
            }

            let resp = req.send().await.map_err(|e| {
                tracing::error!("DynamoDB scan on {} failed: {}", self.table_name, e);
                StoreError::Dynamo(e.to_string())
            })?;

            for item in resp.items() {
                match user_from_item(item) {
                    Ok(user) => users.push(user),
                    Err(e) => tracing::warn!("Skipping user item: {}", e),
                }
            }

            match resp.last_evaluated_key() {
                Some(key) if !key.is_empty() => start_key = Some(key.clone()),
                _ => break,
            }
        }

        Ok(users)
    }
}

#[async_trait]
impl UserStore for DynamoUserStore {
    async fn users_with_role(&self, role: Role) -> Result<Vec<UserRecord>, StoreError> {
        self.scan_users(
            "#role = :role",
            vec![(":role".to_string(), AttributeValue::S(role.as_str().to_string()))],
        )
        .await
    }

    async fn users_with_any_role(&self, roles: &[Role]) -> Result<Vec<UserRecord>, StoreError> {
        if roles.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders: Vec<String> = (0..roles.len()).map(|i| format!(":role{}", i)).collect();
        let values = placeholders
            .iter()
            .zip(roles)
            .map(|(name, role)| (name.clone(), AttributeValue::S(role.as_str().to_string())))
            .collect();

        self.scan_users(&format!("#role IN ({})", placeholders.join(", ")), values)
            .await
    }

    async fn user_by_mobile(&self, mobile: &str) -> Result<Option<UserRecord>, StoreError> {
        let pk = format!("USER#{}", mobile);

        let result = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key("PK", AttributeValue::S(pk.clone()))
            .key("SK", AttributeValue::S(pk))
            .send()
            .await
            .map_err(|e| {
                tracing::error!("DynamoDB get_item for {} failed: {}", mobile, e);
                StoreError::Dynamo(e.to_string())
            })?;

        result.item().map(user_from_item).transpose()
    }
}

/// Map a DynamoDB item onto a user record
pub fn user_from_item(item: &HashMap<String, AttributeValue>) -> Result<UserRecord, StoreError> {
    let text = |name: &str| item.get(name).and_then(|v| v.as_s().ok()).map(|s| s.to_string());

    let mobile_number = text("mobileNumber")
        .or_else(|| text("PK").and_then(|pk| pk.strip_prefix("USER#").map(|s| s.to_string())))
        .ok_or_else(|| StoreError::Malformed {
            key: text("PK").unwrap_or_default(),
            reason: "missing mobileNumber".to_string(),
        })?;

    let last_login_at = text("lastLoginAt").and_then(|raw| {
        match chrono::DateTime::parse_from_rfc3339(&raw) {
            Ok(at) => Some(at.with_timezone(&chrono::Utc)),
            Err(e) => {
                tracing::warn!("Ignoring lastLoginAt {:?} for {}: {}", raw, mobile_number, e);
                None
            }
        }
    });

    // Role only partitions audiences; anything unrecognised gets the least reach
    let role = match text("role") {
        Some(raw) => Role::parse(&raw).unwrap_or_else(|| {
            tracing::warn!("Unknown role {:?} for {}, treating as customer", raw, mobile_number);
            Role::Customer
        }),
        None => Role::Customer,
    };

    Ok(UserRecord {
        role,
        name: text("name").unwrap_or_default(),
        device_token: text("deviceToken"),
        last_login_at,
        mobile_number,
    })
}
