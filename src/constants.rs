/// Response headers stripped from every proxied response before it is
/// returned to the caller. These carry session state, caching policy or
/// diagnostics belonging to the upstream object store, not to this gateway.
pub(crate) const STRIPPED_RESPONSE_HEADERS: &[&str] = &[
    "set-cookie",
    "cache-control",
    "p3p",
    "x-networkstatistics",
    "x-sharepointhealthscore",
    "docid",
    "x-download-options",
    "ctag",
    "x-aspnet-version",
    "x-databoundary",
    "x-1dscollectorurl",
    "x-ariacollectorurl",
    "sprequestguid",
    "request-id",
    "ms-cv",
    "alt-svc",
    "strict-transport-security",
    "x-frame-options",
    "content-security-policy",
    "x-powered-by",
    "microsoftsharepointteamservices",
    "x-ms-invokeapp",
    "x-cache",
    "x-msedge-ref",
];

/// Methods advertised on a plain OPTIONS request.
pub(crate) const ALLOWED_METHODS: &str = "GET, HEAD, POST, OPTIONS";

/// Methods advertised in a CORS preflight response.
pub(crate) const PREFLIGHT_METHODS: &str = "GET,HEAD,POST,OPTIONS";

/// How long a client may cache a preflight response, in seconds.
pub(crate) const PREFLIGHT_MAX_AGE: &str = "86400";

pub(crate) const JSON_CONTENT_TYPE: &str = "application/json;charset=UTF-8";

/// Redirect hop budget for a single download unless overridden on the CLI.
pub(crate) const DEFAULT_MAX_REDIRECTS: usize = 10;

/// RFC 7231 HTTP-date, e.g. `Sat, 04 May 2024 10:00:00 GMT`.
pub(crate) const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";
