//! Response body plumbing between reqwest upstreams and hyper responses.

use futures_util::TryStreamExt;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Full, StreamBody};
use hyper::body::{Bytes, Frame};

/// Boxed response body used throughout the gateway. Small JSON replies are
/// buffered; proxied file bodies stream through without buffering.
pub type ProxyBody = UnsyncBoxBody<Bytes, std::io::Error>;

/// A fully-buffered body from in-memory bytes.
pub fn full(data: impl Into<Bytes>) -> ProxyBody {
    Full::new(data.into())
        .map_err(std::io::Error::other)
        .boxed_unsync()
}

pub fn empty() -> ProxyBody {
    full(Bytes::new())
}

/// Pass an upstream response body through frame by frame.
pub fn passthrough(upstream: reqwest::Response) -> ProxyBody {
    let frames = upstream
        .bytes_stream()
        .map_ok(Frame::data)
        .map_err(std::io::Error::other);
    StreamBody::new(frames).boxed_unsync()
}
