//! Bearer-token JSON client with a conditional-GET response cache.
//!
//! POSTs are fire-and-forget through the request queue; GETs go out
//! immediately and memoize their reducer output against `ETag` /
//! `Last-Modified` validators.

use std::collections::HashMap;
use std::sync::Mutex;

use reqwest::header::{
    AUTHORIZATION, ETAG, HeaderMap, HeaderName, HeaderValue, IF_MODIFIED_SINCE, IF_NONE_MATCH,
    LAST_MODIFIED, USER_AGENT,
};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::cache::LruCache;
use crate::http::HttpHandle;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("invalid resource URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("invalid header value: {0}")]
    Header(#[from] reqwest::header::InvalidHeaderValue),

    #[error("reducer failed: {0}")]
    Reducer(String),
}

/// A named projection of a JSON response.
///
/// The name stands in for function identity in the cache key, so several
/// callers can cache independent views of the same resource. Keep one
/// `Reducer` value per projection and reuse it between calls.
#[derive(Debug, Clone, Copy)]
pub struct Reducer {
    pub name: &'static str,
    pub apply: fn(&Value) -> Result<Value, String>,
}

type CacheKey = (String, &'static str);

/// Validator headers to echo on the next conditional request, plus the
/// reducer output they guard.
#[derive(Debug, Clone, PartialEq)]
struct CacheEntry {
    validators: HashMap<HeaderName, String>,
    value: Value,
}

pub struct ApiClient {
    client: Client,
    queue: HttpHandle,
    base_url: String,
    headers: HeaderMap,
    cache: Mutex<LruCache<CacheKey, CacheEntry>>,
}

impl ApiClient {
    pub fn new(
        client: Client,
        queue: HttpHandle,
        base_url: impl Into<String>,
        user_agent: &str,
        token: &str,
    ) -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_str(user_agent)?);
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("token {token}"))?);
        Ok(ApiClient {
            client,
            queue,
            base_url: base_url.into(),
            headers,
            cache: Mutex::new(LruCache::default()),
        })
    }

    fn qualify(&self, resource: &str) -> Result<Url, ApiError> {
        Ok(Url::parse(&format!("{}{}", self.base_url, resource))?)
    }

    /// Enqueue a JSON POST to `resource`. Never suspends the caller.
    pub fn post(&self, resource: &str, body: &Value) -> Result<(), ApiError> {
        debug!(resource, "posting");
        self.queue.post(self.qualify(resource)?, body, &self.headers);
        Ok(())
    }

    /// Conditional GET of `resource`, returning the reducer's view of the
    /// response. Non-2xx, non-304 statuses yield `Ok(None)` and leave the
    /// cache untouched.
    pub async fn get(&self, resource: &str, reducer: Reducer) -> Result<Option<Value>, ApiError> {
        let key: CacheKey = (resource.to_string(), reducer.name);
        let cached = self.cache.lock().unwrap().get(&key).cloned();

        let mut headers = self.headers.clone();
        if let Some(entry) = &cached {
            for (name, value) in &entry.validators {
                headers.insert(name.clone(), HeaderValue::from_str(value)?);
            }
        }

        debug!(resource, reducer = reducer.name, cached = cached.is_some(), "get");
        let response = self
            .client
            .get(self.qualify(resource)?)
            .headers(headers)
            .send()
            .await?;
        let status = response.status();
        let validators = read_validators(response.headers());

        if status == StatusCode::NOT_MODIFIED {
            if let Some(entry) = cached {
                debug!("cache hit, returning cached value");
                let value = entry.value.clone();
                // Re-adding refreshes the entry's insertion position.
                self.cache.lock().unwrap().add(key, entry);
                return Ok(Some(value));
            }
        }

        if status.is_success() {
            let body: Value = response.json().await?;
            let value = (reducer.apply)(&body).map_err(ApiError::Reducer)?;
            debug!("cache miss, caching fresh value");
            self.cache.lock().unwrap().add(
                key,
                CacheEntry {
                    validators,
                    value: value.clone(),
                },
            );
            return Ok(Some(value));
        }

        Ok(None)
    }
}

/// Map response validators to the request headers that echo them.
fn read_validators(headers: &HeaderMap) -> HashMap<HeaderName, String> {
    let mut validators = HashMap::new();
    for (from, to) in [(ETAG, IF_NONE_MATCH), (LAST_MODIFIED, IF_MODIFIED_SINCE)] {
        if let Some(value) = headers.get(&from) {
            if let Ok(value) = value.to_str() {
                validators.insert(to, value.to_string());
            }
        }
    }
    validators
}
