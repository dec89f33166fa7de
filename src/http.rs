//! Serialized outbound HTTP: one consumer, on-the-fly signing, a
//! 1 request/second ceiling, and drain-before-exit.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::Bytes;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Client, Method};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use url::Url;

use crate::queue::AsyncQueue;
use crate::s3::{S3Error, S3Key, sign_request};

/// Pause after every request, giving a uniform pacing ceiling no matter
/// how bursty the producers are.
const PACING: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error(transparent)]
    Sign(#[from] S3Error),

    #[error("queue consumer failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

/// An outbound request, immutable once enqueued. Requests carrying an
/// [`S3Key`] are signed by the consumer just before they go out.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub s3_key: Option<S3Key>,
}

struct Shared {
    queue: AsyncQueue<HttpRequest>,
    loud: AtomicBool,
}

/// Producer side of the queue. Cheap to clone; none of its methods
/// suspend the caller.
#[derive(Clone)]
pub struct HttpHandle {
    shared: Arc<Shared>,
}

impl HttpHandle {
    pub fn request(&self, request: HttpRequest) {
        self.shared.queue.put(request);
    }

    /// Enqueue a JSON POST.
    pub fn post(&self, url: Url, body: &serde_json::Value, headers: &HeaderMap) {
        let mut headers = headers.clone();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let data = serde_json::to_vec(body).expect("a JSON value always serializes");
        self.request(HttpRequest {
            method: Method::POST,
            url,
            headers,
            body: Bytes::from(data),
            s3_key: None,
        });
    }

    /// Enqueue a signed object-store PUT.
    pub fn s3_put(&self, url: Url, body: Bytes, headers: &HeaderMap, key: S3Key) {
        self.request(HttpRequest {
            method: Method::PUT,
            url,
            headers: headers.clone(),
            body,
            s3_key: Some(key),
        });
    }

    /// Enqueue a signed object-store DELETE.
    pub fn s3_delete(&self, url: Url, key: S3Key) {
        self.request(HttpRequest {
            method: Method::DELETE,
            url,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            s3_key: Some(key),
        });
    }

    /// Requests not yet completed, including the one in flight.
    pub fn len(&self) -> usize {
        self.shared.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.queue.is_empty()
    }
}

/// Owner of the background consumer task.
///
/// Enqueued work survives until [`finish`](HttpQueue::finish) has drained
/// it; dropping the queue without calling `finish` abandons that
/// guarantee.
pub struct HttpQueue {
    handle: HttpHandle,
    worker: JoinHandle<Result<(), HttpError>>,
}

impl HttpQueue {
    /// Launch the single queue consumer on the current runtime.
    pub fn spawn(client: Client) -> Self {
        let shared = Arc::new(Shared {
            queue: AsyncQueue::new(),
            loud: AtomicBool::new(false),
        });
        let worker = tokio::spawn(run_queue(Arc::clone(&shared), client));
        HttpQueue {
            handle: HttpHandle { shared },
            worker,
        }
    }

    pub fn handle(&self) -> HttpHandle {
        self.handle.clone()
    }

    pub fn len(&self) -> usize {
        self.handle.len()
    }

    /// Stop accepting new requests and wait until every queued request
    /// has been issued. The first transport or signing failure aborts the
    /// drain and surfaces here.
    pub async fn finish(self) -> Result<(), HttpError> {
        let pending = self.handle.len();
        if pending > 0 {
            info!(pending, "waiting for queued HTTP requests to complete");
            // Make the rest of the output a bit louder.
            self.handle.shared.loud.store(true, Ordering::Relaxed);
        }
        self.handle.shared.queue.eof();
        self.worker.await?
    }
}

async fn run_queue(shared: Arc<Shared>, client: Client) -> Result<(), HttpError> {
    while let Some(request) = shared.queue.next().await {
        let mut headers = request.headers.clone();
        if let Some(key) = &request.s3_key {
            let checksum = hex::encode(Sha256::digest(&request.body));
            headers = sign_request(&request.url, &request.method, &headers, &checksum, key)?;
        }

        if shared.loud.load(Ordering::Relaxed) {
            info!("{} {}", request.method, request.url);
        } else {
            debug!("{} {}", request.method, request.url);
        }

        let response = client
            .request(request.method.clone(), request.url.clone())
            .headers(headers)
            .body(request.body.clone())
            .send()
            .await?;
        debug!(status = %response.status(), "response");

        tokio::time::sleep(PACING).await;
        // Pop only after the pacing sleep, so len() keeps covering the
        // request until its slot is really over.
        shared.queue.done(&request);
    }
    Ok(())
}
