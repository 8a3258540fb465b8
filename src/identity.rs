//! Client identity resolution.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::ConnectInfo;
use http::Request;

/// Function deriving the identity a request is counted under.
///
/// Returning `None` means no usable identity exists; the middleware
/// treats that as a configuration fault and rejects the request.
pub type IdentityFn = Arc<dyn Fn(&Request<Body>) -> Option<String> + Send + Sync>;

/// Identity from the connecting socket address.
///
/// Requires the host to expose connection info, e.g. via axum's
/// `Router::into_make_service_with_connect_info::<SocketAddr>()`.
pub fn client_address(request: &Request<Body>) -> Option<String> {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
}

/// Identity for deployments behind reverse proxies.
///
/// Prefers `x-real-ip`, then the first entry of `x-forwarded-for`, then
/// falls back to the connecting address. Only use this when a trusted
/// proxy sets those headers; clients can forge them otherwise.
pub fn forwarded_client_address(request: &Request<Body>) -> Option<String> {
    if let Some(real_ip) = header_value(request, "x-real-ip") {
        return Some(real_ip);
    }

    if let Some(forwarded) = header_value(request, "x-forwarded-for") {
        if let Some(first) = forwarded.split(',').map(str::trim).find(|s| !s.is_empty()) {
            return Some(first.to_string());
        }
    }

    client_address(request)
}

fn header_value(request: &Request<Body>, name: &str) -> Option<String> {
    request
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
