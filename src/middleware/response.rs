//! Response construction for allowed and rejected requests.

use axum::body::Body;
use axum::response::Response;
use http::header::{HeaderName, HeaderValue, CONTENT_TYPE, RETRY_AFTER};
use http::StatusCode;

use crate::config::ThrottleConfig;
use crate::error::{Result, ThrottleError};
use crate::ratelimit::RateLimitInfo;

/// Builds rejection responses and annotates allowed ones.
///
/// All configured header names and values are parsed once at
/// construction, so the per-request paths cannot fail.
#[derive(Debug)]
pub struct ResponseShaper {
    /// Informational header names, `None` when headers are disabled
    info_headers: Option<InfoHeaders>,
    /// Rejection body
    body: String,
    /// Rejection content type
    content_type: HeaderValue,
    /// Additional static rejection headers
    extra_headers: Vec<(HeaderName, HeaderValue)>,
}

#[derive(Debug)]
struct InfoHeaders {
    limit: HeaderName,
    remaining: HeaderName,
    reset: HeaderName,
}

impl ResponseShaper {
    /// Validate the configured names and values and build a shaper.
    pub fn from_config(config: &ThrottleConfig) -> Result<Self> {
        let info_headers = match config.headers.resolved() {
            Some(names) => Some(InfoHeaders {
                limit: parse_header_name(&names.limit)?,
                remaining: parse_header_name(&names.remaining)?,
                reset: parse_header_name(&names.reset)?,
            }),
            None => None,
        };

        let body = config
            .message
            .clone()
            .unwrap_or_else(|| config.response.body.clone());
        let content_type = parse_header_value(&config.response.content_type)?;

        let mut extra_headers = Vec::with_capacity(config.response.headers.len());
        for (name, value) in &config.response.headers {
            extra_headers.push((parse_header_name(name)?, parse_header_value(value)?));
        }
        extra_headers.sort_by(|a, b| a.0.as_str().cmp(b.0.as_str()));

        Ok(Self {
            info_headers,
            body,
            content_type,
            extra_headers,
        })
    }

    /// Build the 429 response for a rejected request.
    pub fn rejection(&self, info: &RateLimitInfo, now: u64) -> Response {
        let mut response = Response::new(Body::from(self.body.clone()));
        *response.status_mut() = StatusCode::TOO_MANY_REQUESTS;

        let headers = response.headers_mut();
        for (name, value) in &self.extra_headers {
            headers.insert(name.clone(), value.clone());
        }

        // The computed headers win over a configured extra of the same name.
        headers.insert(CONTENT_TYPE, self.content_type.clone());
        headers.insert(
            RETRY_AFTER,
            HeaderValue::from(info.reset_timestamp().saturating_sub(now)),
        );

        self.decorate(response, info)
    }

    /// Add the informational rate limit headers to a response.
    ///
    /// Passes the response through untouched when headers are disabled.
    pub fn decorate(&self, mut response: Response, info: &RateLimitInfo) -> Response {
        if let Some(ref names) = self.info_headers {
            let headers = response.headers_mut();
            headers.insert(names.limit.clone(), HeaderValue::from(info.limit()));
            headers.insert(names.remaining.clone(), HeaderValue::from(info.remaining()));
            headers.insert(names.reset.clone(), HeaderValue::from(info.reset_timestamp()));
        }
        response
    }
}

/// Empty 500 used when the middleware cannot make a safe decision.
pub(crate) fn internal_error() -> Response {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response
}

fn parse_header_name(name: &str) -> Result<HeaderName> {
    HeaderName::from_bytes(name.as_bytes())
        .map_err(|_| ThrottleError::Config(format!("Invalid header name: {}", name)))
}

fn parse_header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|_| ThrottleError::Config(format!("Invalid header value: {}", value)))
}
