//! Outbound peer calls.
//!
//! [`PeerTransport`] is the contract the failure detector, gossiper,
//! replicator and controller use to talk to other nodes. It uses manually
//! desugared async methods (pinned boxed futures) so it stays object-safe
//! and can be shared as `Arc<dyn PeerTransport>`.
//!
//! [`HttpTransport`] is the production implementation on top of a single
//! `reqwest::Client` with a bounded per-request timeout.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tracing::debug;

use super::node::Node;
use super::replicator::ReplicatedWrite;
use crate::errors::ClusterError;

/// Boxed future returned by every transport call.
pub type TransportFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ClusterError>> + Send + 'a>>;

/// Health probe path served by every node.
pub const HEALTH_PATH: &str = "/health";
/// Join path served on the cluster listener.
pub const JOIN_PATH: &str = "/cluster/join";
/// Gossip path served on the cluster listener.
pub const GOSSIP_PATH: &str = "/cluster/gossip";
/// Replication path served on the cluster listener.
pub const REPLICATE_PATH: &str = "/data/replicate";

/// Client side of the peer protocol.
pub trait PeerTransport: Send + Sync + 'static {
    /// Liveness probe. `Ok` iff the peer answered 2xx within the timeout.
    fn probe<'a>(&'a self, node: &'a Node) -> TransportFuture<'a, ()>;

    /// Announce `me` to the seed at `host:port`. Returns the seed's
    /// active-node list (empty if the seed sent none).
    fn join<'a>(&'a self, seed: &'a str, me: &'a Node) -> TransportFuture<'a, Vec<Node>>;

    /// Push `members` to `node` and return the peer's own active list.
    fn gossip<'a>(&'a self, node: &'a Node, members: &'a [Node]) -> TransportFuture<'a, Vec<Node>>;

    /// Push a single write to `node`.
    fn replicate<'a>(&'a self, node: &'a Node, write: &'a ReplicatedWrite)
        -> TransportFuture<'a, ()>;
}

/// HTTP/JSON implementation of [`PeerTransport`].
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Build a transport whose every request gives up after `timeout`.
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {e}"))?;
        Ok(Self { client })
    }

    /// Turn a response into `Ok` on 2xx, `NetworkUnavailable` otherwise.
    fn check_status(peer: &str, resp: &reqwest::Response) -> Result<(), ClusterError> {
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(ClusterError::NetworkUnavailable {
                peer: peer.to_string(),
                reason: format!("HTTP {}", resp.status()),
            })
        }
    }

    async fn post_json<B: serde::Serialize + ?Sized>(
        &self,
        peer: &str,
        url: String,
        body: &B,
    ) -> Result<reqwest::Response, ClusterError> {
        let resp = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| unreachable(peer, e))?;
        Self::check_status(peer, &resp)?;
        Ok(resp)
    }
}

/// Normalize a seed given as `host:port` or a full URL into a base URL.
pub fn seed_base_url(seed: &str) -> String {
    let trimmed = seed.trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    }
}

fn unreachable(peer: &str, err: reqwest::Error) -> ClusterError {
    let reason = if err.is_timeout() {
        "request timed out".to_string()
    } else {
        err.to_string()
    };
    ClusterError::NetworkUnavailable {
        peer: peer.to_string(),
        reason,
    }
}

impl PeerTransport for HttpTransport {
    fn probe<'a>(&'a self, node: &'a Node) -> TransportFuture<'a, ()> {
        Box::pin(async move {
            let url = format!("{}{}", node.base_url(), HEALTH_PATH);
            let resp = self
                .client
                .get(&url)
                .send()
                .await
                .map_err(|e| unreachable(&node.id, e))?;
            Self::check_status(&node.id, &resp)
        })
    }

    fn join<'a>(&'a self, seed: &'a str, me: &'a Node) -> TransportFuture<'a, Vec<Node>> {
        Box::pin(async move {
            let url = format!("{}{}", seed_base_url(seed), JOIN_PATH);
            let resp = self
                .post_json(seed, url, me)
                .await
                .map_err(|e| ClusterError::JoinFailed {
                    seed: seed.to_string(),
                    reason: e.to_string(),
                })?;

            // A seed that accepts the join but sends no membership is fine.
            let body = resp.bytes().await.unwrap_or_default();
            match serde_json::from_slice::<Vec<Node>>(&body) {
                Ok(nodes) => Ok(nodes),
                Err(e) => {
                    debug!(seed, "join reply carried no membership list: {e}");
                    Ok(Vec::new())
                }
            }
        })
    }

    fn gossip<'a>(&'a self, node: &'a Node, members: &'a [Node]) -> TransportFuture<'a, Vec<Node>> {
        Box::pin(async move {
            let url = format!("{}{}", node.base_url(), GOSSIP_PATH);
            let resp = self.post_json(&node.id, url, members).await?;
            resp.json::<Vec<Node>>()
                .await
                .map_err(|e| ClusterError::NetworkUnavailable {
                    peer: node.id.clone(),
                    reason: format!("invalid gossip reply: {e}"),
                })
        })
    }

    fn replicate<'a>(
        &'a self,
        node: &'a Node,
        write: &'a ReplicatedWrite,
    ) -> TransportFuture<'a, ()> {
        Box::pin(async move {
            let url = format!("{}{}", node.base_url(), REPLICATE_PATH);
            self.post_json(&node.id, url, write).await.map(|_| ())
        })
    }
}
