use crate::recipients::{Audience, RecipientInfo};
use crate::responses::{error_response, json_response};
use crate::types::{Role, StaffTokenReport};
use crate::AppState;
use lambda_http::{http::StatusCode, Body, Error, Response};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

type Fields = Map<String, Value>;

/// Parse a JSON request body into its top-level fields; a non-object body has none
pub fn parse_fields(body: &[u8]) -> Result<Fields, serde_json::Error> {
    if body.iter().all(|b| b.is_ascii_whitespace()) {
        return Ok(Fields::new());
    }
    match serde_json::from_slice::<Value>(body)? {
        Value::Object(map) => Ok(map),
        _ => Ok(Fields::new()),
    }
}

/// Missing, null, false, 0 and "" all count as absent
fn is_present(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}

/// Display form of a field: strings verbatim, whole numbers without a
/// fractional part, everything else as JSON text
fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() < 1e15 => {
                format!("{}", f as i64)
            }
            _ => n.to_string(),
        },
        other => other.to_string(),
    }
}

/// Text of a present field
fn field(fields: &Fields, name: &str) -> Option<String> {
    let value = fields.get(name);
    if is_present(value) {
        value.map(as_text)
    } else {
        None
    }
}

/// Check required fields, yielding the 400 response when any is absent
fn require(fields: &Fields, names: &[&str]) -> Option<Result<Response<Body>, Error>> {
    if names.iter().all(|name| is_present(fields.get(*name))) {
        return None;
    }
    Some(error_response(
        StatusCode::BAD_REQUEST,
        &format!("Missing required fields: {}", names.join(", ")),
    ))
}

fn data_map(pairs: &[(&str, String)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

/// POST /send-order-notification: tell all staff about a new order
pub async fn send_order_notification(
    state: &AppState,
    fields: &Fields,
) -> Result<Response<Body>, Error> {
    tracing::info!("🔔 Received order notification request");

    if let Some(resp) = require(
        fields,
        &["customerName", "customerMobile", "orderTotal", "orderId"],
    ) {
        return resp;
    }
    let customer_name = field(fields, "customerName").unwrap_or_default();
    let customer_mobile = field(fields, "customerMobile").unwrap_or_default();
    let order_total = field(fields, "orderTotal").unwrap_or_default();
    let order_id = field(fields, "orderId").unwrap_or_default();

    let staff = state.resolver.resolve(&Audience::AllStaff).await;
    if staff.is_empty() {
        return error_response(
            StatusCode::NOT_FOUND,
            "No staff members found with valid device tokens",
        );
    }

    let title = "🛒 New Order Received!";
    let body = format!(
        "Order #{}\nCustomer: {}\nPhone: {}\nTotal: ₹{}",
        order_id, customer_name, customer_mobile, order_total
    );
    let data = data_map(&[
        ("type", "new_order".to_string()),
        ("orderId", order_id),
        ("customerName", customer_name),
        ("customerMobile", customer_mobile),
        ("orderTotal", order_total),
    ]);

    let result = state.dispatcher.dispatch(&staff.tokens(), title, &body, data).await;
    if !result.success {
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            result.error.as_deref().unwrap_or("Failed to send notification"),
        );
    }

    json_response(
        StatusCode::OK,
        &json!({
            "success": true,
            "message": format!(
                "Order notification sent to {} staff members",
                result.success_count()
            ),
            "recipients": staff.labels(),
            "details": result,
        }),
    )
}

/// POST /send-dispatch-notification: tell a customer their order has shipped
pub async fn send_dispatch_notification(
    state: &AppState,
    fields: &Fields,
) -> Result<Response<Body>, Error> {
    tracing::info!("🔔 Received dispatch notification request");

    if let Some(resp) = require(fields, &["customerMobile", "orderId"]) {
        return resp;
    }
    let customer_mobile = field(fields, "customerMobile").unwrap_or_default();
    let order_id = field(fields, "orderId").unwrap_or_default();
    let customer_name = field(fields, "customerName");

    let Some(token) = state.resolver.customer_token(&customer_mobile).await else {
        return error_response(StatusCode::NOT_FOUND, "Customer device token not found");
    };

    let title = "🚚 Order Dispatched!";
    let body = format!(
        "Great news {}! Your order #{} has been dispatched and is on its way.",
        customer_name.as_deref().unwrap_or("Customer"),
        order_id
    );
    let data = data_map(&[
        ("type", "order_dispatched".to_string()),
        ("orderId", order_id),
        ("customerMobile", customer_mobile.clone()),
    ]);

    let result = state.dispatcher.dispatch(&[token], title, &body, data).await;
    if !result.success {
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            result.error.as_deref().unwrap_or("Failed to send notification"),
        );
    }

    json_response(
        StatusCode::OK,
        &json!({
            "success": true,
            "message": format!(
                "Dispatch notification sent to {}",
                customer_name.unwrap_or(customer_mobile)
            ),
            "details": result,
        }),
    )
}

/// POST /send-dispatch-notification-with-details: shipped, with carrier and tracking number
pub async fn send_dispatch_notification_with_details(
    state: &AppState,
    fields: &Fields,
) -> Result<Response<Body>, Error> {
    tracing::info!("🔔 Received enhanced dispatch notification request");

    if let Some(resp) = require(
        fields,
        &["customerMobile", "orderId", "travelCompany", "trackingNumber"],
    ) {
        return resp;
    }
    let customer_mobile = field(fields, "customerMobile").unwrap_or_default();
    let order_id = field(fields, "orderId").unwrap_or_default();
    let travel_company = field(fields, "travelCompany").unwrap_or_default();
    let tracking_number = field(fields, "trackingNumber").unwrap_or_default();
    let customer_name = field(fields, "customerName");

    let Some(token) = state.resolver.customer_token(&customer_mobile).await else {
        tracing::warn!("❌ No device token found for customer: {}", customer_mobile);
        return json_response(
            StatusCode::NOT_FOUND,
            &json!({
                "success": false,
                "error": "Customer device token not found",
                "details": format!(
                    "No valid device token found for mobile number: {}",
                    customer_mobile
                ),
            }),
        );
    };

    let title = "📦 Order Dispatched!";
    let body = format!(
        "Great news {}! Your order #{} has been dispatched via {}.\n\n\
         Tracking Number: {}\n\n\
         You can track your package using this number.",
        customer_name.as_deref().unwrap_or("Customer"),
        order_id,
        travel_company,
        tracking_number
    );
    let data = data_map(&[
        ("type", "order_dispatched_with_details".to_string()),
        ("orderId", order_id.clone()),
        ("customerMobile", customer_mobile.clone()),
        ("travelCompany", travel_company.clone()),
        ("trackingNumber", tracking_number.clone()),
        ("shortOrderId", order_id),
    ]);

    tracing::info!(
        "📦 Dispatch via {} (tracking {}) for {}",
        travel_company,
        tracking_number,
        customer_mobile
    );

    let result = state.dispatcher.dispatch(&[token], title, &body, data).await;
    if !result.success {
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            result.error.as_deref().unwrap_or("Failed to send notification"),
        );
    }

    json_response(
        StatusCode::OK,
        &json!({
            "success": true,
            "message": format!(
                "Enhanced dispatch notification sent to {}",
                customer_name.unwrap_or(customer_mobile)
            ),
            "travelDetails": {
                "company": travel_company,
                "tracking": tracking_number,
            },
            "details": result,
        }),
    )
}

/// POST /send-cancellation-notification
pub async fn send_cancellation_notification(
    state: &AppState,
    fields: &Fields,
) -> Result<Response<Body>, Error> {
    tracing::info!("🔔 Received cancellation notification request");

    if let Some(resp) = require(fields, &["customerMobile", "orderId"]) {
        return resp;
    }
    let customer_mobile = field(fields, "customerMobile").unwrap_or_default();
    let order_id = field(fields, "orderId").unwrap_or_default();
    let customer_name = field(fields, "customerName");
    let reason = field(fields, "reason");

    let Some(token) = state.resolver.customer_token(&customer_mobile).await else {
        return error_response(StatusCode::NOT_FOUND, "Customer device token not found");
    };

    let title = "❌ Order Cancelled";
    let body = format!(
        "Sorry {}, your order #{} has been cancelled.{} Please contact us for assistance.",
        customer_name.as_deref().unwrap_or("Customer"),
        order_id,
        reason
            .as_deref()
            .map(|r| format!(" Reason: {}", r))
            .unwrap_or_default()
    );
    let data = data_map(&[
        ("type", "order_cancelled".to_string()),
        ("orderId", order_id),
        ("customerMobile", customer_mobile),
        ("reason", reason.unwrap_or_default()),
    ]);

    let result = state.dispatcher.dispatch(&[token], title, &body, data).await;
    if !result.success {
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            result.error.as_deref().unwrap_or("Failed to send notification"),
        );
    }

    json_response(
        StatusCode::OK,
        &json!({
            "success": true,
            "message": "Cancellation notification sent to customer",
            "details": result,
        }),
    )
}

/// POST /send-custom-notification: free-form title/body to a symbolic audience
pub async fn send_custom_notification(
    state: &AppState,
    fields: &Fields,
) -> Result<Response<Body>, Error> {
    tracing::info!("🔔 Received custom notification request");

    if let Some(resp) = require(fields, &["recipients", "title", "body"]) {
        return resp;
    }
    let recipients = fields.get("recipients").cloned().unwrap_or(Value::Null);
    let title = field(fields, "title").unwrap_or_default();
    let body = field(fields, "body").unwrap_or_default();
    let data: BTreeMap<String, String> = match fields.get("data") {
        Some(Value::Object(map)) => map.iter().map(|(k, v)| (k.clone(), as_text(v))).collect(),
        _ => BTreeMap::new(),
    };

    let audience = Audience::from_value(&recipients);
    tracing::info!("📋 Recipients type: {:?}", audience.type_name());

    let resolution = state.resolver.resolve(&audience).await;
    tracing::info!("📊 Total tokens collected: {}", resolution.recipients.len());

    if resolution.is_empty() {
        return json_response(
            StatusCode::NOT_FOUND,
            &json!({
                "success": false,
                "error": "No valid recipients found",
                "details": "No users found with valid device tokens for the specified recipient type",
                "searchedFor": recipients,
                "recipientInfo": resolution.info,
            }),
        );
    }

    let tokens = resolution.tokens();
    let result = state.dispatcher.dispatch(&tokens, &title, &body, data).await;
    if !result.success {
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            result.error.as_deref().unwrap_or("Failed to send notification"),
        );
    }

    let info: &RecipientInfo = &resolution.info;
    json_response(
        StatusCode::OK,
        &json!({
            "success": true,
            "message": format!("Custom notification sent to {} recipients", result.success_count()),
            "recipients": resolution.labels(),
            "recipientInfo": info,
            "details": {
                "successCount": result.success_count(),
                "failureCount": result.failure_count(),
                "totalTokens": tokens.len(),
            },
        }),
    )
}

/// GET /check-admin-employee-tokens: which staff can currently be reached
pub async fn check_admin_employee_tokens(state: &AppState) -> Result<Response<Body>, Error> {
    tracing::info!("🔍 Checking admin and employee tokens...");

    let timeout = state.config.downstream_timeout;
    let (admins, employees) = tokio::join!(
        tokio::time::timeout(timeout, state.store.users_with_role(Role::Admin)),
        tokio::time::timeout(timeout, state.store.users_with_role(Role::Employee)),
    );

    let lookup = |r: Result<_, tokio::time::error::Elapsed>| {
        r.unwrap_or_else(|_| Err(crate::error::StoreError::Timeout(timeout.as_secs())))
    };
    let report = match (lookup(admins), lookup(employees)) {
        (Ok(admins), Ok(employees)) => StaffTokenReport::new(&admins, &employees),
        (Err(e), _) | (_, Err(e)) => {
            tracing::error!("❌ Error checking tokens: {}", e);
            return json_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &json!({ "error": e.to_string() }),
            );
        }
    };

    tracing::info!(
        "📊 Token summary: {} with tokens, {} without",
        report.total_with_tokens,
        report.total_without_tokens
    );

    json_response(StatusCode::OK, &report)
}

/// GET /test
pub fn test_endpoint() -> Result<Response<Body>, Error> {
    json_response(
        StatusCode::OK,
        &json!({
            "message": "🚀 Notification server is running!",
            "timestamp": chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            "status": "healthy",
        }),
    )
}

/// GET /health
pub fn health(state: &AppState) -> Result<Response<Body>, Error> {
    let firebase = if state.dispatcher.is_available() {
        "connected"
    } else {
        "disconnected"
    };

    json_response(
        StatusCode::OK,
        &json!({
            "status": "healthy",
            "timestamp": chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            "firebase": firebase,
            "databaseUrl": state.config.database_url,
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presence_follows_truthiness() {
        assert!(!is_present(None));
        assert!(!is_present(Some(&json!(null))));
        assert!(!is_present(Some(&json!(""))));
        assert!(!is_present(Some(&json!(0))));
        assert!(!is_present(Some(&json!(0.0))));
        assert!(!is_present(Some(&json!(false))));
        assert!(is_present(Some(&json!("X1"))));
        assert!(is_present(Some(&json!(299.5))));
        assert!(is_present(Some(&json!([]))));
    }

    #[test]
    fn numbers_render_as_json_text() {
        assert_eq!(as_text(&json!(100)), "100");
        assert_eq!(as_text(&json!(299.5)), "299.5");
        assert_eq!(as_text(&json!(100.0)), "100");
        assert_eq!(as_text(&json!(-3.0)), "-3");
        assert_eq!(as_text(&json!(0.25)), "0.25");
        assert_eq!(as_text(&json!("9000000000")), "9000000000");
        assert_eq!(as_text(&json!(true)), "true");
    }

    #[test]
    fn parse_fields_tolerates_empty_and_non_object_bodies() {
        assert!(parse_fields(b"").unwrap().is_empty());
        assert!(parse_fields(b"  \n").unwrap().is_empty());
        assert!(parse_fields(b"[1,2]").unwrap().is_empty());
        assert!(parse_fields(b"{not json").is_err());
        assert_eq!(
            parse_fields(br#"{"orderId":"X1"}"#).unwrap().get("orderId"),
            Some(&json!("X1"))
        );
    }

    #[test]
    fn require_lists_every_field() {
        let fields = parse_fields(br#"{"customerMobile":"9000000000"}"#).unwrap();
        assert!(require(&fields, &["customerMobile"]).is_none());

        let resp = require(&fields, &["customerMobile", "orderId"]).unwrap().unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = serde_json::from_slice(resp.body()).unwrap();
        assert_eq!(body["error"], "Missing required fields: customerMobile, orderId");
        assert_eq!(body["success"], false);
    }
}
