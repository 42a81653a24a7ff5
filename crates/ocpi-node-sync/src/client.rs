//! Outbound calls to a peer's version endpoints.
//!
//! The handshake only needs two reads from a peer. Implementations may use
//! any HTTP stack; timeouts are enforced by the caller.

use std::sync::Arc;

use async_trait::async_trait;

use ocpi_node_core::{AccessToken, VersionDetails, VersionInformation};

use crate::error::ClientError;

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Client for a peer's `/versions` and `/versions/{id}` endpoints.
///
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait PeerClient: Send + Sync {
    /// `GET` the peer's version list, authenticating with `token`.
    async fn get_versions(&self, url: &str, token: &AccessToken) -> Result<Vec<VersionInformation>>;

    /// `GET` the endpoint list of one version.
    async fn get_version_details(&self, url: &str, token: &AccessToken) -> Result<VersionDetails>;
}

#[async_trait]
impl<T: PeerClient + ?Sized> PeerClient for Arc<T> {
    async fn get_versions(&self, url: &str, token: &AccessToken) -> Result<Vec<VersionInformation>> {
        (**self).get_versions(url, token).await
    }

    async fn get_version_details(&self, url: &str, token: &AccessToken) -> Result<VersionDetails> {
        (**self).get_version_details(url, token).await
    }
}

/// An in-memory set of fake peers for testing.
pub mod memory {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;

    use parking_lot::RwLock;

    use ocpi_node_core::{join_url, InterfaceRole, ModuleId, VersionEndpoint, VersionId};

    /// A scripted peer.
    #[derive(Debug, Clone)]
    pub struct FakePeer {
        pub versions_url: String,
        pub token: AccessToken,
        pub versions: Vec<VersionInformation>,
        pub details: HashMap<String, VersionDetails>,
        pub fail_versions: bool,
        pub fail_details: bool,
        pub delay: Option<Duration>,
    }

    impl FakePeer {
        /// A peer at `base` serving 2.2.1 with a credentials endpoint,
        /// accepting only `token`.
        pub fn standard(base: &str, token: AccessToken) -> Self {
            let version = VersionId::v2_2_1();
            let details_url = join_url(base, &[version.as_str()]);
            let credentials_url = join_url(&details_url, &["credentials"]);

            let details = VersionDetails {
                version: version.clone(),
                endpoints: vec![
                    VersionEndpoint {
                        identifier: ModuleId::Credentials,
                        role: InterfaceRole::Sender,
                        url: credentials_url.clone(),
                    },
                    VersionEndpoint {
                        identifier: ModuleId::Credentials,
                        role: InterfaceRole::Receiver,
                        url: credentials_url,
                    },
                ],
            };

            Self {
                versions_url: join_url(base, &["versions"]),
                token,
                versions: vec![VersionInformation {
                    version,
                    url: details_url.clone(),
                }],
                details: HashMap::from([(details_url, details)]),
                fail_versions: false,
                fail_details: false,
                delay: None,
            }
        }

        /// Replace the advertised versions.
        pub fn with_versions(mut self, versions: Vec<VersionInformation>) -> Self {
            self.versions = versions;
            self
        }

        /// Drop every endpoint of every version except those of `keep`.
        pub fn with_only_modules(mut self, keep: &[ModuleId]) -> Self {
            for details in self.details.values_mut() {
                details.endpoints.retain(|e| keep.contains(&e.identifier));
            }
            self
        }

        pub fn failing_versions(mut self) -> Self {
            self.fail_versions = true;
            self
        }

        pub fn failing_details(mut self) -> Self {
            self.fail_details = true;
            self
        }

        /// Answer every call after `delay`.
        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }
    }

    /// A network of fake peers addressed by URL.
    #[derive(Default)]
    pub struct MemoryPeerNetwork {
        peers: RwLock<Vec<FakePeer>>,
        calls: RwLock<Vec<String>>,
    }

    impl MemoryPeerNetwork {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub fn add_peer(&self, peer: FakePeer) {
            self.peers.write().push(peer);
        }

        /// Every URL requested so far, in order.
        pub fn calls(&self) -> Vec<String> {
            self.calls.read().clone()
        }

        fn find(&self, matches: impl Fn(&FakePeer) -> bool) -> Option<FakePeer> {
            self.peers.read().iter().find(|p| matches(p)).cloned()
        }

        async fn answer(&self, url: &str, token: &AccessToken, peer: Option<FakePeer>) -> Result<FakePeer> {
            self.calls.write().push(url.to_string());

            let peer = peer.ok_or_else(|| ClientError::Unreachable(url.to_string()))?;
            if let Some(delay) = peer.delay {
                tokio::time::sleep(delay).await;
            }
            if &peer.token != token {
                return Err(ClientError::Unauthorized);
            }
            Ok(peer)
        }
    }

    #[async_trait]
    impl PeerClient for MemoryPeerNetwork {
        async fn get_versions(&self, url: &str, token: &AccessToken) -> Result<Vec<VersionInformation>> {
            let peer = self.find(|p| p.versions_url == url);
            let peer = self.answer(url, token, peer).await?;
            if peer.fail_versions {
                return Err(ClientError::Status {
                    http_status: 500,
                    message: "versions unavailable".into(),
                });
            }
            Ok(peer.versions)
        }

        async fn get_version_details(&self, url: &str, token: &AccessToken) -> Result<VersionDetails> {
            let peer = self.find(|p| p.details.contains_key(url));
            let peer = self.answer(url, token, peer).await?;
            if peer.fail_details {
                return Err(ClientError::Status {
                    http_status: 500,
                    message: "version details unavailable".into(),
                });
            }
            peer.details
                .get(url)
                .cloned()
                .ok_or_else(|| ClientError::InvalidResponse(format!("no details at {}", url)))
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[tokio::test]
        async fn test_standard_peer_answers_with_its_token() {
            let network = MemoryPeerNetwork::new();
            let token = AccessToken::new("token-b");
            network.add_peer(FakePeer::standard("https://peer.example/ocpi", token.clone()));

            let versions = network
                .get_versions("https://peer.example/ocpi/versions", &token)
                .await
                .unwrap();
            assert_eq!(versions[0].url, "https://peer.example/ocpi/2.2.1");

            let details = network.get_version_details(&versions[0].url, &token).await.unwrap();
            assert!(details.has_module(ModuleId::Credentials));

            let wrong = network
                .get_versions("https://peer.example/ocpi/versions", &AccessToken::new("other"))
                .await;
            assert!(matches!(wrong, Err(ClientError::Unauthorized)));
            assert_eq!(network.calls().len(), 3);
        }

        #[tokio::test]
        async fn test_unknown_url_is_unreachable() {
            let network = MemoryPeerNetwork::new();
            let result = network
                .get_versions("https://nobody.example/versions", &AccessToken::new("x"))
                .await;
            assert!(matches!(result, Err(ClientError::Unreachable(_))));
        }
    }
}
