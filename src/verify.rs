//! HMAC signing and verification for download links.
//!
//! A link token has the form `<base64url-HMAC>:<expire>` where the digest is
//! HMAC-SHA256 over `"<path>:<expire>"` keyed with the shared secret. The
//! path must already be percent-decoded when it reaches this module, so
//! encoding differences between signer and verifier can never cause a
//! spurious mismatch.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE;
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::secret::Secret;

type HmacSha256 = Hmac<Sha256>;

/// Parsed expiry of a link token.
///
/// A non-positive timestamp means the link never expires. That escape hatch
/// is part of the signing contract (operators mint permanent links with
/// `expire = 0`), so it is a first-class variant rather than a sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    Never,
    At(i64),
}

impl Expiry {
    pub fn from_timestamp(ts: i64) -> Self {
        if ts > 0 { Expiry::At(ts) } else { Expiry::Never }
    }

    pub fn expired_at(&self, now: i64) -> bool {
        match self {
            Expiry::Never => false,
            Expiry::At(ts) => *ts < now,
        }
    }
}

/// Why a token failed verification. The `Display` output is the literal
/// reason string returned to the caller in the 401 body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyError {
    ExpireMissing,
    ExpireInvalid,
    ExpireExpired,
    SignMismatch,
}

impl std::fmt::Display for VerifyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VerifyError::ExpireMissing => f.write_str("expire missing"),
            VerifyError::ExpireInvalid => f.write_str("expire invalid"),
            VerifyError::ExpireExpired => f.write_str("expire expired"),
            VerifyError::SignMismatch => f.write_str("sign mismatch"),
        }
    }
}

impl std::error::Error for VerifyError {}

pub struct SignatureVerifier {
    secret: Secret,
}

impl SignatureVerifier {
    pub fn new(secret: Secret) -> Self {
        Self { secret }
    }

    /// Sign `path` for the given expiry timestamp, producing the full token
    /// `<base64url-digest>:<expire>`.
    pub fn sign(&self, path: &str, expire: i64) -> String {
        let mut mac = HmacSha256::new_from_slice(self.secret.value().as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(format!("{path}:{expire}").as_bytes());
        let digest = mac.finalize().into_bytes();
        format!("{}:{}", URL_SAFE.encode(digest), expire)
    }

    /// Check a token against the path it claims to authorize.
    ///
    /// The checks run in a fixed order so the caller always sees the most
    /// specific reason: missing expiry, unparseable expiry, expired, then
    /// digest mismatch. The recomputed token is compared in full, expire
    /// suffix included, so a tampered suffix also reads as a mismatch.
    pub fn verify(&self, path: &str, token: &str) -> Result<(), VerifyError> {
        let expire_segment = token.rsplit(':').next().unwrap_or_default();
        if expire_segment.is_empty() {
            return Err(VerifyError::ExpireMissing);
        }
        let expire: i64 = expire_segment
            .parse()
            .map_err(|_| VerifyError::ExpireInvalid)?;
        if Expiry::from_timestamp(expire).expired_at(Utc::now().timestamp()) {
            return Err(VerifyError::ExpireExpired);
        }
        if token != self.sign(path, expire) {
            return Err(VerifyError::SignMismatch);
        }
        Ok(())
    }
}
