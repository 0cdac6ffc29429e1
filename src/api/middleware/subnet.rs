//! Trusted-subnet check on the agent-reported address

use std::net::IpAddr;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use ipnet::IpNet;
use tracing::warn;

use crate::api::error::ApiError;
use crate::transport::REAL_IP_HEADER;

/// Reject requests whose `X-Real-IP` is missing, malformed or outside `subnet`.
pub async fn trusted_subnet(
    State(subnet): State<IpNet>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let ip = request
        .headers()
        .get(REAL_IP_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<IpAddr>().ok());

    match ip {
        Some(ip) if subnet.contains(&ip) => Ok(next.run(request).await),
        Some(ip) => {
            warn!("rejecting request from {ip}: outside trusted subnet {subnet}");
            Err(ApiError::Forbidden("address not trusted".to_string()))
        }
        None => {
            warn!("rejecting request without a valid {REAL_IP_HEADER} header");
            Err(ApiError::Forbidden("address not trusted".to_string()))
        }
    }
}
