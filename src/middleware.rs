use axum::{extract::Request, http::HeaderValue, middleware::Next, response::Response};
use std::net::SocketAddr;
use tracing::{info, Instrument};
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Logging middleware for request/response tracking
///
/// Reuses an incoming `x-request-id` or mints one, and echoes it back.
pub async fn logging_middleware(
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let client_ip = get_client_ip(&request);
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let span = tracing::info_span!("request", request_id = %request_id);

    async move {
        info!(
            target: "keygate::middleware",
            method = %method,
            uri = %uri,
            client_ip = %client_ip,
            "Incoming request"
        );

        let mut response = next.run(request).await;

        let status = response.status();
        info!(
            target: "keygate::middleware",
            method = %method,
            uri = %uri,
            status = %status,
            "Request completed"
        );

        if let Ok(value) = HeaderValue::from_str(&request_id) {
            response.headers_mut().insert(REQUEST_ID_HEADER, value);
        }
        response
    }
    .instrument(span)
    .await
}

fn get_client_ip(request: &Request) -> String {
    // Try to get real IP from headers first
    if let Some(forwarded) = request.headers().get("x-forwarded-for") {
        if let Ok(forwarded_str) = forwarded.to_str() {
            if let Some(first_ip) = forwarded_str.split(',').next() {
                return first_ip.trim().to_string();
            }
        }
    }

    if let Some(real_ip) = request.headers().get("x-real-ip") {
        if let Ok(ip_str) = real_ip.to_str() {
            return ip_str.to_string();
        }
    }

    if let Some(addr) = request.extensions().get::<axum::extract::ConnectInfo<SocketAddr>>() {
        addr.0.ip().to_string()
    } else {
        "unknown".to_string()
    }
}
