//! Centralized error types for the gateway.

use std::net::AddrParseError;

use http::header::{CONTENT_TYPE, InvalidHeaderValue};
use http::{HeaderValue, Response, StatusCode};

use crate::body::{ProxyBody, full};
use crate::constants::JSON_CONTENT_TYPE;

#[derive(Debug)]
pub enum GateError {
    Configuration(String),
    HttpResponse(String),
    Hyper(String),
    InvalidBackendReply(String),
    Io(std::io::Error),
    Reqwest(String),
    SerdeJson(serde_json::Error),
    TooManyRedirects,
    Other(String),
}

impl std::fmt::Display for GateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GateError::Configuration(msg) => write!(f, "Configuration Error: {}", msg),
            GateError::HttpResponse(msg) => write!(f, "HTTP Response Error: {}", msg),
            GateError::Hyper(msg) => write!(f, "Hyper HTTP Error: {}", msg),
            GateError::InvalidBackendReply(msg) => write!(f, "Invalid Backend Reply: {}", msg),
            GateError::Io(e) => write!(f, "IO Error: {:?}", e),
            GateError::Reqwest(msg) => write!(f, "Reqwest HTTP Error: {}", msg),
            GateError::SerdeJson(e) => write!(f, "Serde-JSON Error: {}", e),
            GateError::TooManyRedirects => f.write_str("too many redirects"),
            GateError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for GateError {}

impl GateError {
    pub fn other(error: &impl ToString) -> Self {
        GateError::Other(error.to_string())
    }
}

impl From<std::io::Error> for GateError {
    fn from(err: std::io::Error) -> Self {
        GateError::Io(err)
    }
}

impl From<hyper::Error> for GateError {
    fn from(err: hyper::Error) -> Self {
        GateError::Hyper(err.to_string())
    }
}

impl From<http::Error> for GateError {
    fn from(err: http::Error) -> Self {
        GateError::HttpResponse(err.to_string())
    }
}

impl From<reqwest::Error> for GateError {
    fn from(err: reqwest::Error) -> Self {
        GateError::Reqwest(err.to_string())
    }
}

impl From<serde_json::Error> for GateError {
    fn from(err: serde_json::Error) -> Self {
        GateError::SerdeJson(err)
    }
}

impl From<InvalidHeaderValue> for GateError {
    fn from(err: InvalidHeaderValue) -> Self {
        GateError::Other(err.to_string())
    }
}

impl From<AddrParseError> for GateError {
    fn from(err: AddrParseError) -> Self {
        GateError::Other(err.to_string())
    }
}

/// Terminal rendering of an error as a JSON response. Redirect budget
/// exhaustion is a gateway-level failure; everything else is internal.
impl From<GateError> for Response<ProxyBody> {
    fn from(err: GateError) -> Response<ProxyBody> {
        let status = match err {
            GateError::TooManyRedirects => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = serde_json::json!({
            "code": status.as_u16(),
            "message": err.to_string(),
        })
        .to_string();

        let mut res = Response::new(full(body));
        *res.status_mut() = status;
        res.headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
        res
    }
}
