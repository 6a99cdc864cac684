//! The download pipeline: verify the link token, resolve the path to a
//! direct object URL through the backend, chase redirects, and hand back a
//! sanitized response.

use std::sync::Arc;

use futures_util::future::BoxFuture;
use http::header::{
    ACCESS_CONTROL_ALLOW_ORIGIN, CONNECTION, CONTENT_LENGTH, CONTENT_TYPE, HOST, LAST_MODIFIED,
    LOCATION, ORIGIN, VARY,
};
use http::{HeaderMap, HeaderValue, Method, Response, StatusCode};
use hyper::Request;
use hyper::body::Incoming;
use percent_encoding::percent_decode_str;
use tracing::{debug, error, warn};
use url::Url;

use crate::backend::{BackendClient, FsGetData};
use crate::body::{ProxyBody, full, passthrough};
use crate::config::ProxyConfig;
use crate::constants::{JSON_CONTENT_TYPE, STRIPPED_RESPONSE_HEADERS};
use crate::error::GateError;
use crate::verify::{SignatureVerifier, VerifyError};

/// Per-request state threaded through the pipeline. The inbound method and
/// headers ride along so every redirect fetch replays them against the new
/// target, and a self-addressed redirect starts over with a fresh path and
/// token taken from the redirect location.
struct DownloadContext {
    method: Method,
    headers: HeaderMap,
    origin: HeaderValue,
    path: String,
    sign: String,
}

impl DownloadContext {
    fn from_request(req: &Request<Incoming>) -> Self {
        let origin = req
            .headers()
            .get(ORIGIN)
            .cloned()
            .unwrap_or_else(|| HeaderValue::from_static("*"));
        let path = percent_decode_str(req.uri().path())
            .decode_utf8_lossy()
            .into_owned();
        let sign = req
            .uri()
            .query()
            .and_then(|query| {
                form_urlencoded::parse(query.as_bytes())
                    .find(|(key, _)| key == "sign")
                    .map(|(_, value)| value.into_owned())
            })
            .unwrap_or_default();

        Self {
            method: req.method().clone(),
            headers: req.headers().clone(),
            origin,
            path,
            sign,
        }
    }

    /// The same caller, re-targeted at a redirect location that points back
    /// at this gateway.
    fn for_location(&self, location: &Url) -> Self {
        let path = percent_decode_str(location.path())
            .decode_utf8_lossy()
            .into_owned();
        let sign = location
            .query_pairs()
            .find(|(key, _)| key == "sign")
            .map(|(_, value)| value.into_owned())
            .unwrap_or_default();

        Self {
            method: self.method.clone(),
            headers: self.headers.clone(),
            origin: self.origin.clone(),
            path,
            sign,
        }
    }
}

pub struct DownloadResolver {
    config: Arc<ProxyConfig>,
    verifier: SignatureVerifier,
    backend: BackendClient,
    http: reqwest::Client,
}

impl DownloadResolver {
    pub fn new(config: Arc<ProxyConfig>) -> Result<Self, GateError> {
        let verifier = SignatureVerifier::new(config.token.clone());
        let backend = BackendClient::new(&config)?;
        // Redirects are chased by hand so self-addressed hops can re-enter
        // the pipeline instead of going back out over the network.
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            config,
            verifier,
            backend,
            http,
        })
    }

    /// Entry point for every non-OPTIONS request.
    pub async fn handle_request(&self, req: Request<Incoming>) -> Response<ProxyBody> {
        let ctx = DownloadContext::from_request(&req);
        debug!(method = %ctx.method, path = %ctx.path, "Download request");

        match self.download(ctx, self.config.max_redirects).await {
            Ok(response) => response,
            Err(err) => {
                error!(error = %err, "Download pipeline failed");
                err.into()
            }
        }
    }

    /// Run the verify-and-resolve pipeline for one download. Self-addressed
    /// redirects recurse into this same function with the location's path
    /// and token, so a chained link is verified exactly like an inbound
    /// request. `hops_left` is shared across external hops and re-entries.
    fn download(
        &self,
        ctx: DownloadContext,
        mut hops_left: usize,
    ) -> BoxFuture<'_, Result<Response<ProxyBody>, GateError>> {
        Box::pin(async move {
            if let Err(reason) = self.verifier.verify(&ctx.path, &ctx.sign) {
                debug!(path = %ctx.path, reason = %reason, "Rejected download link");
                return Ok(unauthorized_response(reason, &ctx.origin));
            }

            let lookup = self.backend.fs_get(&ctx.path).await?;
            if lookup.reply.code != 200 {
                debug!(
                    path = %ctx.path,
                    code = lookup.reply.code,
                    message = ?lookup.reply.message,
                    "Backend refused lookup, forwarding its reply"
                );
                // The embedded code is authoritative; the HTTP status stays
                // 200. Existing clients parse the body, not the status line.
                let mut response = Response::new(full(lookup.raw));
                response
                    .headers_mut()
                    .insert(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
                return Ok(response);
            }
            let Some(data) = lookup.reply.data else {
                return Err(GateError::InvalidBackendReply(
                    "lookup succeeded without file data".to_string(),
                ));
            };

            // Some storage drivers hand back scheme-less URLs.
            let raw_url = if data.raw_url.starts_with("http") {
                data.raw_url.clone()
            } else {
                format!("http:{}", data.raw_url)
            };
            let mut target = Url::parse(&raw_url).map_err(|err| {
                GateError::InvalidBackendReply(format!("bad raw_url '{raw_url}': {err}"))
            })?;

            debug!(path = %ctx.path, target = %target, "Fetching direct object");
            let mut response = self.fetch(&ctx, target.clone()).await?;

            while response.status().is_redirection() {
                let Some(location) = response.headers().get(LOCATION).cloned() else {
                    // A redirect with no destination is as final as it gets.
                    break;
                };
                let location = location.to_str().map_err(|err| {
                    GateError::InvalidBackendReply(format!("bad Location header: {err}"))
                })?;
                let next = target.join(location).map_err(|err| {
                    GateError::InvalidBackendReply(format!("bad Location '{location}': {err}"))
                })?;

                if hops_left == 0 {
                    warn!(path = %ctx.path, location = %next, "Redirect budget exhausted");
                    return Err(GateError::TooManyRedirects);
                }
                hops_left -= 1;

                if next
                    .as_str()
                    .starts_with(&format!("{}/", self.config.public_url))
                {
                    debug!(location = %next, "Self-addressed redirect, re-entering pipeline");
                    return self.download(ctx.for_location(&next), hops_left).await;
                }

                debug!(location = %next, "Following redirect");
                target = next;
                response = self.fetch(&ctx, target.clone()).await?;
            }

            self.sanitize(response, &data, &ctx.origin)
        })
    }

    /// Replay the caller's method and headers against a new target URL.
    async fn fetch(
        &self,
        ctx: &DownloadContext,
        url: Url,
    ) -> Result<reqwest::Response, GateError> {
        let mut headers = ctx.headers.clone();
        // Connection-scoped fields don't survive the rebuild.
        headers.remove(HOST);
        headers.remove(CONTENT_LENGTH);
        headers.remove(CONNECTION);

        Ok(self
            .http
            .request(ctx.method.clone(), url)
            .headers(headers)
            .send()
            .await?)
    }

    /// Rebuild the final upstream response for the caller: same status and
    /// body stream, backend-internal headers removed, CORS and Last-Modified
    /// appended.
    fn sanitize(
        &self,
        upstream: reqwest::Response,
        data: &FsGetData,
        origin: &HeaderValue,
    ) -> Result<Response<ProxyBody>, GateError> {
        let status = upstream.status();
        let mut headers = upstream.headers().clone();
        strip_backend_headers(&mut headers);
        headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin.clone());
        headers.append(VARY, HeaderValue::from_static("Origin"));
        headers.append(
            LAST_MODIFIED,
            HeaderValue::from_str(&data.last_modified_header())?,
        );

        let mut response = Response::new(passthrough(upstream));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }
}

/// Remove every denylisted backend-internal header. Headers not on the list
/// pass through untouched.
pub(crate) fn strip_backend_headers(headers: &mut HeaderMap) {
    for name in STRIPPED_RESPONSE_HEADERS {
        headers.remove(*name);
    }
}

/// The 401 rendering of a failed token check: JSON body carrying the reason,
/// CORS origin echoed so browsers surface the error to the page.
pub(crate) fn unauthorized_response(reason: VerifyError, origin: &HeaderValue) -> Response<ProxyBody> {
    let body = serde_json::json!({
        "code": 401,
        "message": reason.to_string(),
    })
    .to_string();

    let mut response = Response::new(full(body));
    *response.status_mut() = StatusCode::UNAUTHORIZED;
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin.clone());
    response
}
