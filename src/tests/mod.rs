
use std::convert::Infallible;
use std::sync::Arc;
use std::sync::atomic::{AtomicU16, Ordering};

use chrono::Utc;
use http::header::{AUTHORIZATION, CACHE_CONTROL, CONTENT_TYPE, LOCATION, SET_COOKIE};
use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::{Duration, sleep};

use crate::secret::Secret;
use crate::server::Server;
use crate::verify::SignatureVerifier;

pub(crate) const TEST_SECRET: &str = "correct-horse-battery-staple";

/// Fixed modification time handed out by the fake backend;
/// `Sat, 04 May 2024 10:00:00 GMT` as an HTTP-date.
pub(crate) const TEST_MODIFIED: &str = "2024-05-04T10:00:00Z";
pub(crate) const TEST_MODIFIED_HTTP_DATE: &str = "Sat, 04 May 2024 10:00:00 GMT";

pub(crate) fn sign_for(path: &str, expire: i64) -> String {
    SignatureVerifier::new(Secret::new(TEST_SECRET)).sign(path, expire)
}

pub(crate) fn future_expire() -> i64 {
    Utc::now().timestamp() + 600
}

/// The JSON the fake backend returns for an unknown object, byte-for-byte.
pub(crate) fn backend_not_found_json() -> String {
    json!({"code": 404, "message": "object not found", "data": null}).to_string()
}

/// A reqwest client that does not follow redirects, so tests observe the
/// gateway's response as sent.
pub(crate) fn test_client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .expect("Failed to build test client")
}

/// A fake backend standing in for both the file-listing API and the object
/// store it points at. Lookup behavior is keyed on the requested path:
///
/// - `/missing.bin`      -> backend error reply
/// - `/hop.bin`          -> object behind a 3-hop redirect chain
/// - `/loop.bin`         -> object behind a redirect that loops forever
/// - `/dead.bin`         -> object behind a redirect with no Location
/// - `/chained.bin`      -> redirect back to the gateway with a valid token
/// - `/chained-bad.bin`  -> redirect back to the gateway with a bogus token
/// - anything else       -> served directly with backend-internal headers
pub(crate) struct FakeBackend {
    pub port: u16,
    /// Set this once the gateway is up so self-addressed redirects know
    /// where to point.
    pub gateway_port: Arc<AtomicU16>,
    pub handle: JoinHandle<()>,
}

pub(crate) async fn spawn_fake_backend() -> FakeBackend {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind fake backend");
    let port = listener.local_addr().expect("No local addr").port();
    let gateway_port = Arc::new(AtomicU16::new(0));
    let gateway_port_for_server = gateway_port.clone();

    let handle = tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            let gateway_port = gateway_port_for_server.clone();
            tokio::spawn(async move {
                let _ = http1::Builder::new()
                    .serve_connection(
                        TokioIo::new(stream),
                        service_fn(move |req| {
                            let gateway_port = gateway_port.clone();
                            async move { backend_response(req, port, gateway_port).await }
                        }),
                    )
                    .await;
            });
        }
    });

    FakeBackend {
        port,
        gateway_port,
        handle,
    }
}

async fn backend_response(
    req: Request<Incoming>,
    own_port: u16,
    gateway_port: Arc<AtomicU16>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = match (method, path.as_str()) {
        (Method::POST, "/api/fs/get") => {
            let authorized = req
                .headers()
                .get(AUTHORIZATION)
                .map(|value| value == TEST_SECRET)
                .unwrap_or(false);
            let body = req
                .into_body()
                .collect()
                .await
                .expect("Failed to read lookup body")
                .to_bytes();
            let lookup: serde_json::Value =
                serde_json::from_slice(&body).expect("Lookup body was not JSON");
            let fs_path = lookup["path"].as_str().unwrap_or_default();

            if !authorized {
                json_reply(json!({"code": 401, "message": "unauthorized", "data": null}))
            } else {
                match fs_path {
                    "/missing.bin" => json_reply_raw(backend_not_found_json()),
                    "/hop.bin" => lookup_ok(format!("http://127.0.0.1:{own_port}/redir/1")),
                    "/loop.bin" => lookup_ok(format!("http://127.0.0.1:{own_port}/redir/loop")),
                    "/dead.bin" => lookup_ok(format!("http://127.0.0.1:{own_port}/redir/dead")),
                    "/chained.bin" => lookup_ok(format!("http://127.0.0.1:{own_port}/to-gateway")),
                    "/chained-bad.bin" => {
                        lookup_ok(format!("http://127.0.0.1:{own_port}/to-gateway-bad"))
                    }
                    other => lookup_ok(format!("http://127.0.0.1:{own_port}/direct{other}")),
                }
            }
        }
        (_, "/redir/1") => redirect(Some("/redir/2".to_string())),
        (_, "/redir/2") => redirect(Some("/redir/3".to_string())),
        (_, "/redir/3") => redirect(Some("/direct/plain.bin".to_string())),
        (_, "/redir/loop") => redirect(Some("/redir/loop".to_string())),
        (_, "/redir/dead") => redirect(None),
        (_, "/to-gateway") => {
            let gateway = gateway_port.load(Ordering::SeqCst);
            let sign = sign_for("/inner.bin", future_expire());
            redirect(Some(format!(
                "http://127.0.0.1:{gateway}/inner.bin?sign={sign}"
            )))
        }
        (_, "/to-gateway-bad") => {
            let gateway = gateway_port.load(Ordering::SeqCst);
            redirect(Some(format!(
                "http://127.0.0.1:{gateway}/inner.bin?sign=bogus:9999999999"
            )))
        }
        (_, direct) if direct.starts_with("/direct/") => {
            // An upstream object larded with headers the gateway must strip.
            Response::builder()
                .header(CONTENT_TYPE, "application/octet-stream")
                .header(SET_COOKIE, "session=abc123")
                .header(CACHE_CONTROL, "private")
                .header("x-powered-by", "FakeSharePoint")
                .header("x-msedge-ref", "ref-a")
                .body(Full::new(Bytes::from(format!("contents of {direct}"))))
                .expect("Failed to build object response")
        }
        _ => {
            let mut response = Response::new(Full::new(Bytes::from("not found")));
            *response.status_mut() = StatusCode::NOT_FOUND;
            response
        }
    };

    Ok(response)
}

fn json_reply(value: serde_json::Value) -> Response<Full<Bytes>> {
    json_reply_raw(value.to_string())
}

fn json_reply_raw(body: String) -> Response<Full<Bytes>> {
    Response::builder()
        .header(CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(body)))
        .expect("Failed to build JSON reply")
}

fn lookup_ok(raw_url: String) -> Response<Full<Bytes>> {
    json_reply(json!({
        "code": 200,
        "message": "success",
        "data": {"raw_url": raw_url, "modified": TEST_MODIFIED},
    }))
}

fn redirect(location: Option<String>) -> Response<Full<Bytes>> {
    let mut builder = Response::builder().status(StatusCode::FOUND);
    if let Some(location) = location {
        builder = builder.header(LOCATION, location);
    }
    builder
        .body(Full::new(Bytes::new()))
        .expect("Failed to build redirect")
}

/// Start the gateway in test mode against the given fake backend and wire
/// the backend's self-addressed redirects back to it.
pub(crate) async fn start_gateway(backend: &FakeBackend) -> (JoinHandle<()>, u16) {
    let (server, port) = Server::test_mode(
        format!("http://127.0.0.1:{}", backend.port),
        Secret::new(TEST_SECRET),
    )
    .await
    .expect("Failed to create test server");
    backend.gateway_port.store(port, Ordering::SeqCst);

    let handle = tokio::spawn(async move {
        if let Err(e) = server.run().await {
            eprintln!("Server error: {}", e);
        }
    });

    // Give the server time to start
    sleep(Duration::from_millis(100)).await;

    (handle, port)
}
