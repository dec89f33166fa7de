//! AWS v4 request signing and per-host credential lookup.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::Method;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::warn;
use url::Url;

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";

const KEY_DIR_ENV: &str = "COCKPIT_S3_KEY_DIR";
const KEY_DIR_FALLBACK: &str = "cockpit-dev/s3-keys";

#[derive(Debug, Error)]
pub enum S3Error {
    #[error("URL has no hostname: {0}")]
    MissingHost(Url),

    #[error("header value cannot be signed: {0}")]
    OpaqueHeader(#[from] reqwest::header::ToStrError),

    #[error("invalid header name: {0}")]
    InvalidHeaderName(#[from] reqwest::header::InvalidHeaderName),

    #[error("invalid header value: {0}")]
    InvalidHeaderValue(#[from] reqwest::header::InvalidHeaderValue),
}

/// An access-id / secret pair for one storage host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Key {
    pub access: String,
    pub secret: String,
}

impl S3Key {
    /// Look up the credential for `hostname` in the configured key
    /// directory. Returns `None` when no key exists, in which case the
    /// request goes out unsigned.
    pub fn lookup(hostname: &str) -> Option<S3Key> {
        Self::lookup_in(&key_dir(), hostname)
    }

    /// Walk progressively shorter suffixes of `hostname` against per-host
    /// files in `dir`: `a.b.example.com`, then `b.example.com`, then
    /// `example.com`. Malformed files are skipped with a warning.
    pub fn lookup_in(dir: &Path, hostname: &str) -> Option<S3Key> {
        let mut host = hostname;
        while host.contains('.') {
            let path = dir.join(host);
            match fs::read_to_string(&path) {
                Ok(content) => {
                    let mut tokens = content.split_whitespace();
                    match (tokens.next(), tokens.next(), tokens.next()) {
                        (Some(access), Some(secret), None) => {
                            return Some(S3Key {
                                access: access.to_string(),
                                secret: secret.to_string(),
                            });
                        }
                        _ => warn!(path = %path.display(), "ignoring invalid credential file"),
                    }
                }
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => warn!(path = %path.display(), %err, "cannot read credential file"),
            }

            // Strip a leading hostname component and retry.
            let Some((_, rest)) = host.split_once('.') else {
                break;
            };
            host = rest;
        }
        None
    }
}

/// The credential for a request URL, resolved by hostname. `Ok(None)`
/// means no key is available and the request goes out unsigned.
pub fn key_for_url(url: &Url) -> Result<Option<S3Key>, S3Error> {
    key_for_url_in(&key_dir(), url)
}

/// Directory-parameterised form of [`key_for_url`].
pub fn key_for_url_in(dir: &Path, url: &Url) -> Result<Option<S3Key>, S3Error> {
    let host = url.host_str().ok_or_else(|| S3Error::MissingHost(url.clone()))?;
    Ok(S3Key::lookup_in(dir, host))
}

fn key_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(KEY_DIR_ENV) {
        return PathBuf::from(dir);
    }
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(KEY_DIR_FALLBACK)
}

/// Sign a request with the AWS4-HMAC-SHA256 algorithm.
///
/// Returns the full header set to send: the caller's headers (names
/// lowercased) plus `host`, `x-amz-content-sha256`, `x-amz-date` and the
/// `Authorization` header. `payload_sha256` is the hex digest of the body
/// that will be sent.
pub fn sign_request(
    url: &Url,
    method: &Method,
    headers: &HeaderMap,
    payload_sha256: &str,
    key: &S3Key,
) -> Result<HeaderMap, S3Error> {
    sign_request_at(url, method, headers, payload_sha256, key, Utc::now())
}

/// Deterministic form of [`sign_request`] for a fixed timestamp.
pub fn sign_request_at(
    url: &Url,
    method: &Method,
    headers: &HeaderMap,
    payload_sha256: &str,
    key: &S3Key,
    now: DateTime<Utc>,
) -> Result<HeaderMap, S3Error> {
    let host = url.host_str().ok_or_else(|| S3Error::MissingHost(url.clone()))?;
    let amzdate = now.format("%Y%m%dT%H%M%SZ").to_string();

    // Header canonicalisation demands all names in lowercase, sorted.
    // HeaderMap names are already lowercase; the BTreeMap sorts them.
    let mut signed: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        signed.insert(name.as_str().to_string(), value.to_str()?.to_string());
    }
    signed.insert("host".to_string(), host.to_string());
    signed.insert("x-amz-content-sha256".to_string(), payload_sha256.to_string());
    signed.insert("x-amz-date".to_string(), amzdate.clone());

    let headers_str: String = signed
        .iter()
        .map(|(name, value)| format!("{name}:{value}\n"))
        .collect();
    let headers_list = signed.keys().cloned().collect::<Vec<_>>().join(";");

    let credential_scope = format!("{}/any/s3/aws4_request", &amzdate[..8]);
    let mut signing_key = format!("AWS4{}", key.secret).into_bytes();
    for item in credential_scope.split('/') {
        signing_key = hmac_sha256(&signing_key, item.as_bytes());
    }

    let canonical_request = format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        method.as_str(),
        url.path(),
        url.query().unwrap_or(""),
        headers_str,
        headers_list,
        payload_sha256
    );
    let request_hash = hex::encode(Sha256::digest(canonical_request.as_bytes()));
    let string_to_sign = format!("{ALGORITHM}\n{amzdate}\n{credential_scope}\n{request_hash}");
    let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes()));

    let mut result = HeaderMap::with_capacity(signed.len() + 1);
    for (name, value) in &signed {
        result.insert(
            HeaderName::from_bytes(name.as_bytes())?,
            HeaderValue::from_str(value)?,
        );
    }
    let authorization = format!(
        "{ALGORITHM} Credential={}/{credential_scope},SignedHeaders={headers_list},Signature={signature}",
        key.access
    );
    result.insert(AUTHORIZATION, HeaderValue::from_str(&authorization)?);

    Ok(result)
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}
