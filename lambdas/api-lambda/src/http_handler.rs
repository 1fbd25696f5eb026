use lambda_http::{
    http::{Method, StatusCode},
    Body, Error, Request, Response,
};
use relay_shared::{notifications, responses, AppState};
use std::sync::Arc;

const POST_ROUTES: [&str; 5] = [
    "/send-order-notification",
    "/send-dispatch-notification",
    "/send-dispatch-notification-with-details",
    "/send-cancellation-notification",
    "/send-custom-notification",
];

/// Main Lambda handler - routes requests to the notification endpoints
pub(crate) async fn function_handler(
    event: Request,
    state: Arc<AppState>,
) -> Result<Response<Body>, Error> {
    let method = event.method().clone();
    let path = event.uri().path().to_string();
    tracing::info!("🚀 Relay Lambda invoked - Method: {} Path: {}", method, path);

    match route(&event, &method, &path, &state).await {
        Ok(resp) => Ok(resp),
        Err(e) => {
            tracing::error!("❌ Error in {} {}: {}", method, path, e);
            responses::error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &format!("Internal server error: {}", e),
            )
        }
    }
}

async fn route(
    event: &Request,
    method: &Method,
    path: &str,
    state: &AppState,
) -> Result<Response<Body>, Error> {
    // Handle CORS preflight
    if *method == Method::OPTIONS {
        return responses::preflight();
    }

    match (method, path) {
        (&Method::GET, "/test") => notifications::test_endpoint(),
        (&Method::GET, "/health") => notifications::health(state),
        (&Method::GET, "/check-admin-employee-tokens") => {
            notifications::check_admin_employee_tokens(state).await
        }
        (&Method::POST, _) if POST_ROUTES.contains(&path) => {
            let fields = match notifications::parse_fields(event.body()) {
                Ok(fields) => fields,
                Err(e) => {
                    tracing::warn!("Rejecting malformed body on {}: {}", path, e);
                    return responses::error_response(
                        StatusCode::BAD_REQUEST,
                        &format!("Invalid JSON body: {}", e),
                    );
                }
            };

            match path {
                "/send-order-notification" => {
                    notifications::send_order_notification(state, &fields).await
                }
                "/send-dispatch-notification" => {
                    notifications::send_dispatch_notification(state, &fields).await
                }
                "/send-dispatch-notification-with-details" => {
                    notifications::send_dispatch_notification_with_details(state, &fields).await
                }
                "/send-cancellation-notification" => {
                    notifications::send_cancellation_notification(state, &fields).await
                }
                "/send-custom-notification" => {
                    notifications::send_custom_notification(state, &fields).await
                }
                _ => responses::endpoint_not_found(),
            }
        }
        _ => responses::endpoint_not_found(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_shared::config::Config;
    use relay_shared::push::UnconfiguredGateway;
    use relay_shared::testing::{user, InMemoryUserStore, RecordingGateway};
    use relay_shared::types::Role;
    use serde_json::{json, Value};
    use std::time::Duration;

    fn config() -> Config {
        Config {
            table_name: "users".to_string(),
            database_url: None,
            downstream_timeout: Duration::from_secs(5),
        }
    }

    fn shop(staff_tokens: bool) -> InMemoryUserStore {
        let token = |t: &'static str| if staff_tokens { Some(t) } else { None };
        InMemoryUserStore::new(vec![
            user("9000000001", Role::Admin, "Asha", token("tok-asha")),
            user("9000000010", Role::Employee, "Ravi", token("tok-ravi")),
            user("9000000000", Role::Customer, "A", Some("tok-customer")),
            user("9000000099", Role::Customer, "Tokenless", None),
        ])
    }

    fn order_body(total: u32) -> Value {
        json!({
            "customerName": "A",
            "customerMobile": "9000000000",
            "orderTotal": total,
            "orderId": "X1"
        })
    }

    fn state_with(store: InMemoryUserStore, gateway: Arc<RecordingGateway>) -> Arc<AppState> {
        AppState::new(config(), Arc::new(store), gateway)
    }

    fn request(method: &str, path: &str, body: Value) -> Request {
        lambda_http::http::Request::builder()
            .method(method)
            .uri(path)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn call(state: &Arc<AppState>, req: Request) -> (StatusCode, Value) {
        let resp = function_handler(req, Arc::clone(state)).await.unwrap();
        let status = resp.status();
        let body = match resp.body() {
            Body::Empty => Value::Null,
            other => serde_json::from_slice(other).unwrap(),
        };
        (status, body)
    }

    #[tokio::test]
    async fn order_notification_reaches_all_staff() {
        let gateway = Arc::new(RecordingGateway::delivering());
        let state = state_with(shop(true), gateway.clone());

        let (status, body) = call(
            &state,
            request(
                "POST",
                "/send-order-notification",
                order_body(100),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["message"], "Order notification sent to 2 staff members");
        assert_eq!(
            body["recipients"],
            json!(["admin: Asha (9000000001)", "employee: Ravi (9000000010)"])
        );
        assert_eq!(body["details"]["successCount"], 2);

        let sent = gateway.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].tokens, vec!["tok-asha", "tok-ravi"]);
        assert_eq!(sent[0].title, "🛒 New Order Received!");
        assert_eq!(
            sent[0].body,
            "Order #X1\nCustomer: A\nPhone: 9000000000\nTotal: ₹100"
        );
        assert_eq!(sent[0].data["type"], "new_order");
        assert_eq!(sent[0].data["orderTotal"], "100");
    }

    #[tokio::test]
    async fn order_notification_without_staff_tokens_is_404() {
        let gateway = Arc::new(RecordingGateway::delivering());
        let state = state_with(shop(false), gateway.clone());

        let (status, body) = call(
            &state,
            request(
                "POST",
                "/send-order-notification",
                order_body(100),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(
            body,
            json!({"success": false, "error": "No staff members found with valid device tokens"})
        );
        assert_eq!(gateway.call_count(), 0);
    }

    #[tokio::test]
    async fn order_notification_validates_fields() {
        let state = state_with(shop(true), Arc::new(RecordingGateway::delivering()));

        let (status, body) = call(
            &state,
            request(
                "POST",
                "/send-order-notification",
                order_body(0),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body["error"],
            "Missing required fields: customerName, customerMobile, orderTotal, orderId"
        );
    }

    #[tokio::test]
    async fn provider_failure_is_500() {
        let state = state_with(
            shop(true),
            Arc::new(RecordingGateway::rejecting("401 Unauthorized")),
        );

        let (status, body) = call(
            &state,
            request(
                "POST",
                "/send-order-notification",
                order_body(100),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().contains("401 Unauthorized"));
    }

    #[tokio::test]
    async fn unconfigured_provider_is_500_and_reported_on_health() {
        let state = AppState::new(
            config(),
            Arc::new(shop(true)),
            Arc::new(UnconfiguredGateway::new("FIREBASE_SERVICE_ACCOUNT_KEY not set")),
        );

        let (status, _) = call(
            &state,
            request(
                "POST",
                "/send-cancellation-notification",
                json!({"customerMobile": "9000000000", "orderId": "X1"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

        let (status, body) = call(&state, request("GET", "/health", Value::Null)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["firebase"], "disconnected");
    }

    #[tokio::test]
    async fn dispatch_notification_goes_to_the_customer() {
        let gateway = Arc::new(RecordingGateway::delivering());
        let state = state_with(shop(true), gateway.clone());

        let (status, body) = call(
            &state,
            request(
                "POST",
                "/send-dispatch-notification",
                json!({"customerMobile": "9000000000", "orderId": "X1"}),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Dispatch notification sent to 9000000000");
        let sent = gateway.sent();
        assert_eq!(sent[0].tokens, vec!["tok-customer"]);
        assert!(sent[0].body.starts_with("Great news Customer! Your order #X1"));
        assert_eq!(sent[0].data["type"], "order_dispatched");
    }

    #[tokio::test]
    async fn dispatch_with_details_reports_travel_details() {
        let gateway = Arc::new(RecordingGateway::delivering());
        let state = state_with(shop(true), gateway.clone());

        let (status, body) = call(
            &state,
            request(
                "POST",
                "/send-dispatch-notification-with-details",
                json!({
                    "customerMobile": "9000000000",
                    "orderId": "X1",
                    "customerName": "A",
                    "travelCompany": "VRL",
                    "trackingNumber": "TRK-77"
                }),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Enhanced dispatch notification sent to A");
        assert_eq!(body["travelDetails"], json!({"company": "VRL", "tracking": "TRK-77"}));
        let data = &gateway.sent()[0].data;
        assert_eq!(data["shortOrderId"], "X1");
        assert_eq!(data["trackingNumber"], "TRK-77");
    }

    #[tokio::test]
    async fn dispatch_with_details_for_unknown_customer_is_404() {
        let state = state_with(shop(true), Arc::new(RecordingGateway::delivering()));

        let (status, body) = call(
            &state,
            request(
                "POST",
                "/send-dispatch-notification-with-details",
                json!({
                    "customerMobile": "9000000099",
                    "orderId": "X1",
                    "travelCompany": "VRL",
                    "trackingNumber": "TRK-77"
                }),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Customer device token not found");
        assert_eq!(
            body["details"],
            "No valid device token found for mobile number: 9000000099"
        );
    }

    #[tokio::test]
    async fn cancellation_includes_reason() {
        let gateway = Arc::new(RecordingGateway::delivering());
        let state = state_with(shop(true), gateway.clone());

        let (status, body) = call(
            &state,
            request(
                "POST",
                "/send-cancellation-notification",
                json!({
                    "customerMobile": "9000000000",
                    "orderId": "X1",
                    "reason": "Out of stock",
                    "customerName": "A"
                }),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Cancellation notification sent to customer");
        let sent = gateway.sent();
        assert_eq!(
            sent[0].body,
            "Sorry A, your order #X1 has been cancelled. \
             Reason: Out of stock Please contact us for assistance."
        );
        assert_eq!(sent[0].data["reason"], "Out of stock");
    }

    #[tokio::test]
    async fn custom_notification_passes_data_through() {
        let gateway = Arc::new(RecordingGateway::failing_tokens(&["tok-ravi"]));
        let state = state_with(shop(true), gateway.clone());

        let (status, body) = call(
            &state,
            request(
                "POST",
                "/send-custom-notification",
                json!({
                    "recipients": "admin_and_employees",
                    "title": "T",
                    "body": "B",
                    "data": {"foo": "bar", "n": 3}
                }),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Custom notification sent to 1 recipients");
        assert_eq!(
            body["recipientInfo"],
            json!({
                "type": "admin_and_employees",
                "adminCount": 1,
                "employeeCount": 1,
                "totalWithTokens": 2
            })
        );
        assert_eq!(
            body["details"],
            json!({"successCount": 1, "failureCount": 1, "totalTokens": 2})
        );

        let data = &gateway.sent()[0].data;
        assert_eq!(data["foo"], "bar");
        assert_eq!(data["n"], "3");
        assert!(data.contains_key("timestamp"));
    }

    #[tokio::test]
    async fn custom_notification_to_unknown_type_is_404() {
        let gateway = Arc::new(RecordingGateway::delivering());
        let state = state_with(shop(true), gateway.clone());

        let (status, body) = call(
            &state,
            request(
                "POST",
                "/send-custom-notification",
                json!({"recipients": "unknown_type", "title": "T", "body": "B"}),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "No valid recipients found");
        assert_eq!(body["searchedFor"], "unknown_type");
        assert_eq!(body["recipientInfo"], json!({}));
        assert_eq!(gateway.call_count(), 0);
    }

    #[tokio::test]
    async fn custom_notification_to_mobile_list() {
        let gateway = Arc::new(RecordingGateway::delivering());
        let state = state_with(shop(true), gateway.clone());

        let (status, body) = call(
            &state,
            request(
                "POST",
                "/send-custom-notification",
                json!({
                    "recipients": ["9000000010", "9000000099", "9000000000"],
                    "title": "T",
                    "body": "B"
                }),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["recipients"], json!(["Mobile: 9000000010", "Mobile: 9000000000"]));
        assert_eq!(gateway.sent()[0].tokens, vec!["tok-ravi", "tok-customer"]);
    }

    #[tokio::test]
    async fn check_tokens_reports_staff() {
        let state = state_with(shop(true), Arc::new(RecordingGateway::delivering()));

        let (status, body) = call(
            &state,
            request("GET", "/check-admin-employee-tokens", Value::Null),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["totalWithTokens"], 2);
        assert_eq!(body["totalWithoutTokens"], 0);
        assert_eq!(body["admins"][0]["name"], "Asha");
        assert_eq!(body["admins"][0]["lastLogin"], "Never");
    }

    #[tokio::test]
    async fn check_tokens_store_failure_is_500() {
        let state = state_with(
            shop(true).failing_role(Role::Employee),
            Arc::new(RecordingGateway::delivering()),
        );

        let (status, body) = call(
            &state,
            request("GET", "/check-admin-employee-tokens", Value::Null),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"].as_str().unwrap().contains("employee"));
    }

    #[tokio::test]
    async fn malformed_json_is_400() {
        let state = state_with(shop(true), Arc::new(RecordingGateway::delivering()));
        let req = lambda_http::http::Request::builder()
            .method("POST")
            .uri("/send-custom-notification")
            .body(Body::from("{\"recipients\":"))
            .unwrap();

        let (status, body) = call(&state, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn malformed_json_to_unknown_route_lists_endpoints() {
        let state = state_with(shop(true), Arc::new(RecordingGateway::delivering()));
        let req = lambda_http::http::Request::builder()
            .method("POST")
            .uri("/send-sms")
            .body(Body::from("{not json"))
            .unwrap();

        let (status, body) = call(&state, req).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Endpoint not found");
    }

    #[tokio::test]
    async fn unknown_route_lists_endpoints() {
        let state = state_with(shop(true), Arc::new(RecordingGateway::delivering()));

        let (status, body) = call(
            &state,
            request("GET", "/send-order-notification", Value::Null),
        )
        .await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Endpoint not found");
        assert_eq!(body["availableEndpoints"].as_array().unwrap().len(), 8);
    }

    #[tokio::test]
    async fn test_endpoint_and_preflight() {
        let state = state_with(shop(true), Arc::new(RecordingGateway::delivering()));

        let (status, body) = call(&state, request("GET", "/test", Value::Null)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");

        let preflight = request("OPTIONS", "/send-order-notification", Value::Null);
        let resp = function_handler(preflight, state).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()["Access-Control-Allow-Origin"], "*");
    }
}
