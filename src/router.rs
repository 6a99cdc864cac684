//! Request dispatch: CORS preflight vs. the download pipeline.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
    ACCESS_CONTROL_MAX_AGE, ACCESS_CONTROL_REQUEST_METHOD, ALLOW, ORIGIN,
};
use http::{HeaderMap, HeaderValue};
use hyper::body::Incoming;
use hyper::{Method, Request, Response};
use tracing::info;

use crate::body::{ProxyBody, empty};
use crate::constants::{ALLOWED_METHODS, PREFLIGHT_MAX_AGE, PREFLIGHT_METHODS};
use crate::resolver::DownloadResolver;

/// Dispatch an inbound request: OPTIONS gets the preflight responder,
/// everything else runs the download pipeline.
pub async fn route_request(
    req: Request<Incoming>,
    remote_addr: SocketAddr,
    resolver: Arc<DownloadResolver>,
) -> Result<Response<ProxyBody>, Infallible> {
    info!(
        method = %req.method(),
        path = %req.uri().path(),
        remote_addr = %remote_addr,
        "Incoming request"
    );

    if req.method() == Method::OPTIONS {
        return Ok(preflight_response(req.headers()));
    }

    Ok(resolver.handle_request(req).await)
}

/// Answer an OPTIONS request. A real CORS preflight (Origin plus
/// Access-Control-Request-Method) gets the full preflight header set with
/// the requested headers echoed back; anything else just learns which
/// methods exist.
pub(crate) fn preflight_response(headers: &HeaderMap) -> Response<ProxyBody> {
    let mut response = Response::new(empty());

    if headers.contains_key(ORIGIN) && headers.contains_key(ACCESS_CONTROL_REQUEST_METHOD) {
        let requested_headers = headers
            .get(http::header::ACCESS_CONTROL_REQUEST_HEADERS)
            .cloned()
            .unwrap_or_else(|| HeaderValue::from_static(""));

        let response_headers = response.headers_mut();
        response_headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
        response_headers.insert(
            ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(PREFLIGHT_METHODS),
        );
        response_headers.insert(
            ACCESS_CONTROL_MAX_AGE,
            HeaderValue::from_static(PREFLIGHT_MAX_AGE),
        );
        response_headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, requested_headers);
    } else {
        response
            .headers_mut()
            .insert(ALLOW, HeaderValue::from_static(ALLOWED_METHODS));
    }

    response
}
