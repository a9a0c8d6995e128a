//! Seed directory client
//!
//! Used by nodes to register themselves and by wallets to find a node to
//! submit to. Registration retries with backoff since the seed may come up
//! after the node.

use crate::seed::{Assignment, SeedHealth, SeedResponse, SeedStatus};
use crate::utils::RetryPolicy;
use crate::{Error, NodeDescriptor, Result};
use reqwest::{Client, ClientBuilder, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, instrument};
use url::Url;

#[derive(Debug, Deserialize)]
struct SeedError {
    error: String,
}

pub struct SeedClient {
    client: Client,
    base_url: Url,
    retry: RetryPolicy,
}

impl SeedClient {
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self> {
        let client = ClientBuilder::new()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(Error::from)?;

        Ok(Self {
            client,
            base_url,
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| Error::config(format!("Failed to build seed URL for '{}': {}", path, e)))
    }

    /// Register `descriptor`, retrying transient failures
    #[instrument(skip(self), fields(seed = %self.base_url))]
    pub async fn register(&self, descriptor: &NodeDescriptor) -> Result<Assignment> {
        let url = self.endpoint("/")?;
        let assignment = self.retry.execute(|| self.register_once(&url, descriptor)).await?;

        match &assignment {
            Assignment::FirstNode => info!("Registered with seed as the first node"),
            Assignment::PeerAssigned(peer) => info!("Registered with seed, assigned peer {}", peer),
        }
        Ok(assignment)
    }

    async fn register_once(&self, url: &Url, descriptor: &NodeDescriptor) -> Result<Assignment> {
        let response = self.client.post(url.clone()).json(descriptor).send().await?;

        if response.status() == StatusCode::BAD_REQUEST {
            let body: SeedError = response.json().await?;
            return Err(Error::seed(format!("Registration rejected: {}", body.error)));
        }

        let body: SeedResponse = response.error_for_status()?.json().await?;
        match body.status {
            SeedStatus::FirstNode => Ok(Assignment::FirstNode),
            SeedStatus::PeerAssigned if !body.message.is_empty() => Ok(Assignment::PeerAssigned(body.message)),
            other => Err(Error::seed(format!("Unexpected registration status {:?}", other))),
        }
    }

    /// A node address for a wallet, or `None` when the seed knows no nodes
    #[instrument(skip(self), fields(seed = %self.base_url))]
    pub async fn send_only(&self) -> Result<Option<String>> {
        let url = self.endpoint("/sendonly")?;
        let response = self.client.get(url).send().await?;

        if response.status() == StatusCode::SERVICE_UNAVAILABLE {
            debug!("Seed has no nodes to offer");
            return Ok(None);
        }

        let body: SeedResponse = response.error_for_status()?.json().await?;
        match body.status {
            SeedStatus::NodeSelected if !body.message.is_empty() => Ok(Some(body.message)),
            SeedStatus::NoNodes => Ok(None),
            other => Err(Error::seed(format!("Unexpected node selection status {:?}", other))),
        }
    }

    #[instrument(skip(self), fields(seed = %self.base_url))]
    pub async fn health(&self) -> Result<SeedHealth> {
        let url = self.endpoint("/health")?;
        let response = self.client.get(url).send().await?;
        Ok(response.error_for_status()?.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seed::{router, PeerRegistry, SeedState};
    use assert_matches::assert_matches;
    use std::sync::Arc;

    async fn spawn_seed() -> (Arc<PeerRegistry>, Url) {
        let registry = Arc::new(PeerRegistry::new());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = router(SeedState::new(Arc::clone(&registry)));
        tokio::spawn(async move { axum::serve(listener, app).await });
        (registry, Url::parse(&format!("http://{}", addr)).unwrap())
    }

    fn client(url: Url) -> SeedClient {
        SeedClient::new(url, Duration::from_secs(2))
            .unwrap()
            .with_retry_policy(RetryPolicy::new(2, Duration::from_millis(10), Duration::from_millis(20)))
    }

    #[tokio::test]
    async fn test_register_and_send_only() {
        let (registry, url) = spawn_seed().await;
        let client = client(url);

        assert_eq!(client.send_only().await.unwrap(), None);

        let first = NodeDescriptor::new("127.0.0.1", 18081, Some(17001));
        let second = NodeDescriptor::new("127.0.0.1", 18082, Some(17002));
        assert_eq!(client.register(&first).await.unwrap(), Assignment::FirstNode);
        assert_eq!(
            client.register(&second).await.unwrap(),
            Assignment::PeerAssigned("127.0.0.1:17001".into())
        );
        assert_eq!(registry.len(), 2);

        let picked = client.send_only().await.unwrap().unwrap();
        assert!(picked == "127.0.0.1:17001" || picked == "127.0.0.1:17002");
        assert_eq!(client.health().await.unwrap().node_count, 2);
    }

    #[tokio::test]
    async fn test_rejected_registration_is_not_retried() {
        let (registry, url) = spawn_seed().await;
        let result = client(url).register(&NodeDescriptor::new("", 18081, None)).await;

        assert_matches!(result, Err(Error::Seed { .. }));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_seed() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = client(Url::parse(&format!("http://{}", addr)).unwrap());
        assert!(client.register(&NodeDescriptor::new("127.0.0.1", 18081, None)).await.is_err());
    }
}
