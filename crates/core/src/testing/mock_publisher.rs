//! Mock publisher for testing.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::publisher::{PublishError, PublishRequest, Publisher};

/// Mock implementation of the Publisher trait.
///
/// Successful publishes return `https://youtu.be/mock<n>`, where `n` counts
/// successful calls from 1.
#[derive(Debug, Default)]
pub struct MockPublisher {
    requests: Arc<RwLock<Vec<PublishRequest>>>,
    published: Arc<RwLock<usize>>,
    errors: Arc<RwLock<VecDeque<PublishError>>>,
}

impl MockPublisher {
    /// Create a new mock publisher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next publish with this error.
    pub async fn queue_error(&self, error: PublishError) {
        self.errors.write().await.push_back(error);
    }

    /// Every request received, failed ones included.
    pub async fn recorded_requests(&self) -> Vec<PublishRequest> {
        self.requests.read().await.clone()
    }

    /// Number of publish calls.
    pub async fn publish_count(&self) -> usize {
        self.requests.read().await.len()
    }
}

#[async_trait]
impl Publisher for MockPublisher {
    fn name(&self) -> &str {
        "mock-publisher"
    }

    async fn publish(&self, request: &PublishRequest) -> Result<String, PublishError> {
        self.requests.write().await.push(request.clone());

        if let Some(error) = self.errors.write().await.pop_front() {
            return Err(error);
        }

        let mut published = self.published.write().await;
        *published += 1;
        Ok(format!("https://youtu.be/mock{}", *published))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn request() -> PublishRequest {
        PublishRequest {
            local_path: PathBuf::from("/tmp/video.mp4"),
            title: "Weekly sync".to_string(),
            description: "Uploaded via automation".to_string(),
            tags: vec!["zoom".to_string()],
        }
    }

    #[tokio::test]
    async fn test_queued_error_then_success() {
        let publisher = MockPublisher::new();
        publisher
            .queue_error(PublishError::Failed("quota exceeded".to_string()))
            .await;

        let err = publisher.publish(&request()).await.unwrap_err();
        assert_eq!(err.to_string(), "quota exceeded");

        let url = publisher.publish(&request()).await.unwrap();
        assert_eq!(url, "https://youtu.be/mock1");
        assert_eq!(publisher.publish_count().await, 2);
    }
}
