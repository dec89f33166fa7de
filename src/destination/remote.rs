//! Destination backed by an S3-compatible object store.

use bytes::Bytes;
use reqwest::header::{CONTENT_ENCODING, CONTENT_TYPE, HeaderMap, HeaderValue};
use url::Url;

use super::{Destination, DestinationError};
use crate::http::HttpHandle;
use crate::s3::S3Key;

const DEFAULT_ACL: &str = "public-read";

/// Enqueues signed PUT / DELETE requests; the queue consumer signs and
/// paces them, so producers never block on the network.
///
/// `has` is deliberately unsupported: the store is write-only from here.
/// Compose with an [`Index`](crate::index::Index) to track what exists.
pub struct S3Destination {
    queue: HttpHandle,
    location: String,
    headers: HeaderMap,
    key: S3Key,
}

impl S3Destination {
    /// `url` is the bucket prefix every artifact name is appended to, so
    /// it normally ends with a slash.
    pub fn new(queue: HttpHandle, url: impl Into<String>, key: S3Key) -> Self {
        Self::with_acl(queue, url, key, DEFAULT_ACL)
    }

    pub fn with_acl(
        queue: HttpHandle,
        url: impl Into<String>,
        key: S3Key,
        acl: &'static str,
    ) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert("x-amz-acl", HeaderValue::from_static(acl));
        S3Destination {
            queue,
            location: url.into(),
            headers,
            key,
        }
    }

    fn url(&self, filename: &str) -> Result<Url, DestinationError> {
        Ok(Url::parse(&format!("{}{}", self.location, filename))?)
    }
}

impl Destination for S3Destination {
    fn location(&self) -> &str {
        &self.location
    }

    fn has(&self, _filename: &str) -> Result<bool, DestinationError> {
        Err(DestinationError::Unsupported("use an Index to track remote artifacts"))
    }

    fn write(&self, filename: &str, data: &[u8]) -> Result<(), DestinationError> {
        let mut headers = self.headers.clone();
        let (content_type, content_encoding) = guess_content(filename);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        if let Some(encoding) = content_encoding {
            headers.insert(CONTENT_ENCODING, HeaderValue::from_static(encoding));
        }

        self.queue.s3_put(
            self.url(filename)?,
            Bytes::copy_from_slice(data),
            &headers,
            self.key.clone(),
        );
        Ok(())
    }

    fn delete(&self, filenames: &[String]) -> Result<(), DestinationError> {
        // TODO: switch to the multi-object delete API to save requests.
        for filename in filenames {
            self.queue.s3_delete(self.url(filename)?, self.key.clone());
        }
        Ok(())
    }
}

/// Guess the content type and encoding the way the platform mimetype
/// table does: strip a known compression suffix first, then guess the
/// type of what remains.
fn guess_content(filename: &str) -> (&'static str, Option<&'static str>) {
    let (stem, encoding) = match filename.rsplit_once('.') {
        Some((stem, "gz")) => (stem, Some("gzip")),
        Some((stem, "bz2")) => (stem, Some("bzip2")),
        Some((stem, "xz")) => (stem, Some("xz")),
        Some((stem, "br")) => (stem, Some("br")),
        _ => (filename, None),
    };
    let content_type = mime_guess::from_path(stem).first_raw().unwrap_or("text/plain");
    (content_type, encoding)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpQueue;
    use crate::testutil::TestServer;
    use reqwest::Client;

    fn test_key() -> S3Key {
        S3Key {
            access: "AKID".to_string(),
            secret: "SECRET".to_string(),
        }
    }

    #[test]
    fn test_guess_content_plain_types() {
        assert_eq!(guess_content("index.html"), ("text/html", None));
        assert_eq!(guess_content("sizes.json"), ("application/json", None));
        assert_eq!(guess_content("final.png"), ("image/png", None));
    }

    #[test]
    fn test_guess_content_defaults_to_text() {
        assert_eq!(guess_content("run-log"), ("text/plain", None));
        assert_eq!(guess_content("run-log.0-1200"), ("text/plain", None));
    }

    #[test]
    fn test_guess_content_compression_suffix() {
        assert_eq!(guess_content("journal.txt.gz"), ("text/plain", Some("gzip")));
        assert_eq!(guess_content("core.xz"), ("text/plain", Some("xz")));
    }

    #[tokio::test]
    async fn test_write_enqueues_signed_put_with_headers() {
        let server = TestServer::spawn(Vec::new()).await;
        let queue = HttpQueue::spawn(Client::new());
        let destination = S3Destination::new(
            queue.handle(),
            format!("{}/", server.url("/bucket")),
            test_key(),
        );

        destination.write("journal.txt.gz", b"payload").unwrap();
        queue.finish().await.unwrap();

        let requests = server.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, "PUT");
        assert_eq!(requests[0].path, "/bucket/journal.txt.gz");
        assert_eq!(requests[0].headers.get("content-type").unwrap(), "text/plain");
        assert_eq!(requests[0].headers.get("content-encoding").unwrap(), "gzip");
        assert_eq!(requests[0].headers.get("x-amz-acl").unwrap(), "public-read");
        assert!(requests[0].headers.contains_key("authorization"));
        assert_eq!(requests[0].body, b"payload");
    }

    #[tokio::test]
    async fn test_delete_enqueues_one_request_per_name() {
        let server = TestServer::spawn(Vec::new()).await;
        let queue = HttpQueue::spawn(Client::new());
        let destination = S3Destination::new(
            queue.handle(),
            format!("{}/", server.url("/bucket")),
            test_key(),
        );

        destination
            .delete(&["log.chunks".to_string(), "log.0-5".to_string()])
            .unwrap();
        queue.finish().await.unwrap();

        let requests = server.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].method, "DELETE");
        assert_eq!(requests[0].path, "/bucket/log.chunks");
        assert_eq!(requests[1].path, "/bucket/log.0-5");
        assert!(requests[0].headers.contains_key("authorization"));
    }

    #[test]
    fn test_has_is_unsupported() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let _guard = runtime.enter();
        let queue = HttpQueue::spawn(Client::new());
        let destination = S3Destination::new(queue.handle(), "https://s.example.com/", test_key());

        assert!(matches!(
            destination.has("anything"),
            Err(DestinationError::Unsupported(_))
        ));
    }
}
