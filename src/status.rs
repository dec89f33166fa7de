//! Run status reporting.
//!
//! `Status` is a capability set with two variants: log-only for local
//! runs, and commit statuses posted through the request queue for runs
//! that report to a status service.

use std::sync::Arc;

use serde_json::json;
use tracing::{debug, info};

use crate::api::{ApiClient, ApiError};

pub trait Status: Send + Sync {
    fn post(&self, state: &str, description: &str) -> Result<(), ApiError>;
}

/// Logs state transitions instead of calling out.
pub struct LocalStatus;

impl LocalStatus {
    pub fn new(location: &str) -> Self {
        info!(location, "writing logs locally");
        LocalStatus
    }
}

impl Status for LocalStatus {
    fn post(&self, state: &str, description: &str) -> Result<(), ApiError> {
        info!("status [{state}] {description}");
        Ok(())
    }
}

/// Publishes commit statuses for one revision. Posts are enqueued, never
/// awaited, so reporting cannot stall the producer.
pub struct ServiceStatus {
    api: Arc<ApiClient>,
    resource: String,
    context: String,
    link: String,
}

impl ServiceStatus {
    pub fn new(
        api: Arc<ApiClient>,
        repo: &str,
        revision: &str,
        context: impl Into<String>,
        link: impl Into<String>,
    ) -> Self {
        let resource = format!("repos/{repo}/statuses/{revision}");
        debug!(%resource, "status target");
        ServiceStatus {
            api,
            resource,
            context: context.into(),
            link: link.into(),
        }
    }
}

impl Status for ServiceStatus {
    fn post(&self, state: &str, description: &str) -> Result<(), ApiError> {
        debug!(resource = %self.resource, state, description, "posting status");
        self.api.post(
            &self.resource,
            &json!({
                "context": self.context,
                "state": state,
                "description": description,
                "target_url": self.link,
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpQueue;
    use crate::testutil::TestServer;
    use reqwest::Client;
    use serde_json::Value;

    #[tokio::test]
    async fn test_service_status_posts_expected_body() {
        let server = TestServer::spawn(Vec::new()).await;
        let queue = HttpQueue::spawn(Client::new());
        let api = Arc::new(
            ApiClient::new(
                Client::new(),
                queue.handle(),
                format!("{}/", server.url("")),
                "logstream-test",
                "t0ken",
            )
            .unwrap(),
        );
        let status = ServiceStatus::new(
            api,
            "owner/repo",
            "deadbeef",
            "unit-tests",
            "https://logs.example.com/run/index.html",
        );

        status.post("pending", "tests are running").unwrap();
        queue.finish().await.unwrap();

        let requests = server.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].path, "/repos/owner/repo/statuses/deadbeef");
        let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["context"], "unit-tests");
        assert_eq!(body["state"], "pending");
        assert_eq!(body["description"], "tests are running");
        assert_eq!(body["target_url"], "https://logs.example.com/run/index.html");
    }

    #[test]
    fn test_local_status_never_fails() {
        let status = LocalStatus::new("/tmp/logs");

        status.post("success", "all green").unwrap();
    }
}
