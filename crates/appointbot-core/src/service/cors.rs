use axum::http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
    ORIGIN,
};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

/// Methods and headers advertised by one group of endpoints.
#[derive(Debug, Clone, Copy)]
pub struct CorsPolicy {
    pub methods: &'static str,
    pub headers: &'static str,
}

pub const CHAT_CORS: CorsPolicy = CorsPolicy {
    methods: "GET, POST, OPTIONS",
    headers: "Content-Type, api-key",
};

pub const DATABASE_CORS: CorsPolicy = CorsPolicy {
    methods: "GET, OPTIONS",
    headers: "Content-Type",
};

/// Policy for a request path: the keep-alive routes advertise the database set,
/// everything else the chat set.
pub fn policy_for_path(path: &str) -> &'static CorsPolicy {
    if path.starts_with("/api/httpTriggerDb") {
        &DATABASE_CORS
    } else {
        &CHAT_CORS
    }
}

/// Reflects the request origin when allow-listed, otherwise answers `*`.
#[derive(Debug, Clone)]
pub struct CorsGate {
    allowed_origins: Vec<String>,
}

impl CorsGate {
    pub fn new(allowed_origins: Vec<String>) -> Self {
        Self { allowed_origins }
    }

    pub fn is_allowed(&self, origin: &str) -> bool {
        self.allowed_origins.iter().any(|o| o == origin)
    }

    /// Value for `Access-Control-Allow-Origin` given the request's `Origin`.
    pub fn allow_origin<'a>(&self, origin: Option<&'a str>) -> &'a str {
        match origin {
            Some(o) if self.is_allowed(o) => o,
            _ => "*",
        }
    }

    /// The CORS header triple for a response to `request_headers`.
    pub fn headers(&self, request_headers: &HeaderMap, policy: &CorsPolicy) -> HeaderMap {
        let origin = request_headers.get(ORIGIN).and_then(|v| v.to_str().ok());
        let allow = HeaderValue::from_str(self.allow_origin(origin))
            .unwrap_or_else(|_| HeaderValue::from_static("*"));

        let mut headers = HeaderMap::new();
        headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, allow);
        headers.insert(
            ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(policy.methods),
        );
        headers.insert(
            ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static(policy.headers),
        );
        headers
    }

    /// Empty 204 answer to an `OPTIONS` pre-flight.
    pub fn preflight(&self, request_headers: &HeaderMap, policy: &CorsPolicy) -> Response {
        (StatusCode::NO_CONTENT, self.headers(request_headers, policy)).into_response()
    }
}
