use lambda_http::{http::StatusCode, Body, Error, Response};
use serde::Serialize;

pub const AVAILABLE_ENDPOINTS: [&str; 8] = [
    "GET /test",
    "GET /health",
    "GET /check-admin-employee-tokens",
    "POST /send-order-notification",
    "POST /send-dispatch-notification",
    "POST /send-cancellation-notification",
    "POST /send-dispatch-notification-with-details",
    "POST /send-custom-notification",
];

/// JSON response with the CORS header every endpoint carries
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Result<Response<Body>, Error> {
    Ok(Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(serde_json::to_string(body)?.into())
        .map_err(Box::new)?)
}

/// `{success: false, error}` with the given status
pub fn error_response(status: StatusCode, error: &str) -> Result<Response<Body>, Error> {
    json_response(
        status,
        &serde_json::json!({
            "success": false,
            "error": error,
        }),
    )
}

pub fn preflight() -> Result<Response<Body>, Error> {
    Ok(Response::builder()
        .status(StatusCode::OK)
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Methods", "GET,POST,OPTIONS")
        .header("Access-Control-Allow-Headers", "Content-Type,Authorization")
        .body(Body::Empty)
        .map_err(Box::new)?)
}

pub fn endpoint_not_found() -> Result<Response<Body>, Error> {
    json_response(
        StatusCode::NOT_FOUND,
        &serde_json::json!({
            "success": false,
            "error": "Endpoint not found",
            "availableEndpoints": AVAILABLE_ENDPOINTS,
        }),
    )
}
