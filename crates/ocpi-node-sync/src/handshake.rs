//! The credential handshake.
//!
//! Registration runs as a short-circuiting chain:
//!
//! 1. Authenticate the presented token and check the registration state
//! 2. Probe the peer's versions and version details with its token B
//! 3. On re-registration, require the same set of roles
//! 4. Rotate our token and commit the new record with compare-and-swap
//!
//! Nothing is written before step 4. Dropping the future earlier leaves the
//! registry untouched; once the commit starts it runs to completion.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use ocpi_node_core::{
    AccessToken, Credentials, CredentialsRole, InterfaceRole, LocalAccessInfo, ModuleId,
    PartyStatus, RemoteAccessInfo, RemoteAccessStatus, RemoteParty, VersionDetails, VersionId,
};
use ocpi_node_perms::RemotePartyRegistry;
use ocpi_node_store::WriteContext;

use crate::client::PeerClient;
use crate::error::{ClientError, HandshakeError, Result};
use crate::publisher::VersionPublisher;

/// Configuration for outbound handshake calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandshakeConfig {
    /// Upper bound for each probe request, in milliseconds.
    pub request_timeout_ms: u64,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 10_000,
        }
    }
}

impl HandshakeConfig {
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// What the probe learned about the peer.
#[derive(Debug, Clone)]
struct Probe {
    supported: Vec<VersionId>,
    details: VersionDetails,
}

/// Runs credential requests against the registry.
pub struct CredentialExchange {
    registry: Arc<RemotePartyRegistry>,
    peers: Arc<dyn PeerClient>,
    publisher: Arc<VersionPublisher>,
    config: HandshakeConfig,
}

impl CredentialExchange {
    pub fn new(
        registry: Arc<RemotePartyRegistry>,
        peers: Arc<dyn PeerClient>,
        publisher: Arc<VersionPublisher>,
        config: HandshakeConfig,
    ) -> Self {
        Self {
            registry,
            peers,
            publisher,
            config,
        }
    }

    /// Resolve a presented token. Unknown and unusable tokens both fail with
    /// `InvalidToken`.
    pub fn authenticate(&self, token: Option<&AccessToken>) -> Result<(Arc<RemoteParty>, LocalAccessInfo)> {
        let token = token.ok_or(HandshakeError::MissingToken)?;
        let (party, access) = self
            .registry
            .try_get_local_access_info(token)
            .ok_or(HandshakeError::InvalidToken)?;

        if !access.is_usable_at(Utc::now()) {
            tracing::warn!(remote_party = %party.id, "credentials request with unusable token");
            return Err(HandshakeError::InvalidToken);
        }
        Ok((party, access))
    }

    fn check_version(&self, version: &VersionId) -> Result<()> {
        if self.publisher.supports(version) {
            Ok(())
        } else {
            Err(HandshakeError::UnsupportedVersion(version.clone()))
        }
    }

    /// `GET /{version}/credentials`: echo the caller's token with our roles.
    pub fn get(
        &self,
        version: &VersionId,
        token: Option<&AccessToken>,
        own_roles: Vec<CredentialsRole>,
    ) -> Result<Credentials> {
        self.check_version(version)?;
        let (_, access) = self.authenticate(token)?;
        Ok(Credentials {
            token: access.access_token,
            url: self.publisher.versions_url(),
            roles: own_roles,
        })
    }

    /// `POST /{version}/credentials`: first registration with token A.
    pub async fn register(
        &self,
        version: &VersionId,
        token: Option<&AccessToken>,
        credentials: Credentials,
        own_roles: Vec<CredentialsRole>,
        ctx: &WriteContext,
    ) -> Result<Credentials> {
        self.check_version(version)?;
        let (party, access) = self.authenticate(token)?;
        if access.is_registered() {
            return Err(HandshakeError::AlreadyRegistered);
        }
        credentials.validate()?;

        let probe = self.probe(version, &credentials).await?;
        self.rotate(party, &access.access_token, version, credentials, probe, own_roles, ctx)
            .await
    }

    /// `PUT /{version}/credentials`: re-registration with token C.
    pub async fn update(
        &self,
        version: &VersionId,
        token: Option<&AccessToken>,
        credentials: Credentials,
        own_roles: Vec<CredentialsRole>,
        ctx: &WriteContext,
    ) -> Result<Credentials> {
        self.check_version(version)?;
        let (party, access) = self.authenticate(token)?;
        if !access.is_registered() {
            return Err(HandshakeError::NotRegistered);
        }
        credentials.validate()?;

        let probe = self.probe(version, &credentials).await?;
        check_roles(&party, &credentials)?;
        self.rotate(party, &access.access_token, version, credentials, probe, own_roles, ctx)
            .await
    }

    /// `DELETE /{version}/credentials`: drop the caller's token.
    pub async fn unregister(
        &self,
        version: &VersionId,
        token: Option<&AccessToken>,
        ctx: &WriteContext,
    ) -> Result<()> {
        self.check_version(version)?;
        let (party, access) = self.authenticate(token)?;
        if !access.is_registered() {
            return Err(HandshakeError::NotRegistered);
        }

        let result = self
            .registry
            .remove_access_token(&access.access_token, ctx)
            .await?;
        if let Some(kind) = result.failure {
            return Err(HandshakeError::Rejected {
                kind,
                message: result.message.unwrap_or_default(),
            });
        }

        tracing::info!(remote_party = %party.id, "remote party unregistered");
        Ok(())
    }

    async fn bounded<T, F>(&self, call: F) -> std::result::Result<T, ClientError>
    where
        F: Future<Output = std::result::Result<T, ClientError>>,
    {
        let timeout = self.config.request_timeout();
        match tokio::time::timeout(timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(ClientError::Timeout(timeout.as_millis() as u64)),
        }
    }

    /// Check that the peer is reachable with its token and speaks `version`.
    async fn probe(&self, version: &VersionId, credentials: &Credentials) -> Result<Probe> {
        let versions = self
            .bounded(self.peers.get_versions(&credentials.url, &credentials.token))
            .await
            .map_err(|e| {
                tracing::warn!(url = %credentials.url, error = %e, "list versions probe failed");
                HandshakeError::ListVersions {
                    url: credentials.url.clone(),
                    reason: e.to_string(),
                }
            })?;

        let Some(common) = versions.iter().find(|v| &v.version == version) else {
            tracing::warn!(url = %credentials.url, version = %version, "no common version");
            return Err(HandshakeError::NoCommonVersion {
                url: credentials.url.clone(),
                version: version.clone(),
            });
        };

        let details = self
            .bounded(self.peers.get_version_details(&common.url, &credentials.token))
            .await
            .map_err(|e| {
                tracing::warn!(url = %common.url, error = %e, "version details probe failed");
                HandshakeError::VersionDetails {
                    url: common.url.clone(),
                    reason: e.to_string(),
                }
            })?;

        let has_credentials = details
            .endpoint(ModuleId::Credentials, InterfaceRole::Sender)
            .or_else(|| details.endpoint(ModuleId::Credentials, InterfaceRole::Receiver))
            .is_some();
        if !has_credentials {
            return Err(HandshakeError::VersionDetails {
                url: common.url.clone(),
                reason: "no credentials endpoint".to_string(),
            });
        }

        Ok(Probe {
            supported: versions.into_iter().map(|v| v.version).collect(),
            details,
        })
    }

    /// Swap the presented token for a fresh one and store the peer's side.
    #[allow(clippy::too_many_arguments)]
    async fn rotate(
        &self,
        party: Arc<RemoteParty>,
        presented: &AccessToken,
        version: &VersionId,
        credentials: Credentials,
        probe: Probe,
        own_roles: Vec<CredentialsRole>,
        ctx: &WriteContext,
    ) -> Result<Credentials> {
        let token_c = AccessToken::generate();

        let next = party
            .rotate_local_token(presented, token_c.clone(), &credentials.url)
            .ok_or(HandshakeError::InvalidToken)?
            .with_remote_access(RemoteAccessInfo {
                access_token: credentials.token,
                versions_url: credentials.url,
                supported_version_ids: probe.supported,
                selected_version_id: Some(probe.details.version),
                status: RemoteAccessStatus::Online,
                not_before: None,
                not_after: None,
            })
            .with_roles(credentials.roles)
            .with_status(PartyStatus::Enabled);

        let result = self.registry.replace_remote_party(&party, next, ctx).await?;
        if let Some(kind) = result.failure {
            tracing::warn!(remote_party = %party.id, failure = %kind, "credentials commit rejected");
            return Err(HandshakeError::Rejected {
                kind,
                message: result.message.unwrap_or_default(),
            });
        }

        tracing::info!(
            remote_party = %party.id,
            version = %version,
            event_tracking_id = %ctx.event_tracking_id,
            "credentials registered, token rotated"
        );

        Ok(Credentials {
            token: token_c,
            url: self.publisher.versions_url(),
            roles: own_roles,
        })
    }
}

/// On re-registration the peer must present exactly the roles it has.
fn check_roles(existing: &RemoteParty, credentials: &Credentials) -> Result<()> {
    let stored = Credentials {
        token: AccessToken::new(""),
        url: String::new(),
        roles: existing.roles.clone(),
    };

    if stored.roles.len() != credentials.roles.len() || stored.role_set()? != credentials.role_set()? {
        tracing::warn!(remote_party = %existing.id, "re-registration tried to change roles");
        return Err(HandshakeError::RoleMismatch);
    }
    Ok(())
}
