//! The Node: one OCPI participant with its registry, resource store and
//! audit log.
//!
//! Request handlers take a [`RequestContext`] and always return an
//! [`OcpiResponse`]; failures travel inside the envelope. Administrative
//! calls and lifecycle methods return [`Result`].

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::broadcast;

use ocpi_node_core::{
    AccessStatus, AccessToken, CommandResult, Credentials, CredentialsRole, DigestBuilder,
    HttpStatus, LocalParty, RemoteParty, RemotePartyId, Role, StateDigest, StatusCode,
    VersionDetails, VersionId, VersionInformation,
};
use ocpi_node_perms::RemotePartyRegistry;
use ocpi_node_store::{
    ArchiveLookup, AssetEvent, AssetStore, AuditLog, LogStream, WriteContext,
};
use ocpi_node_sync::{
    Caller, CredentialExchange, HandshakeError, OcpiResponse, PeerClient, VersionPublisher,
};

use crate::config::NodeConfig;
use crate::context::RequestContext;
use crate::error::{NodeError, Result};

/// A running OCPI node.
pub struct Node {
    config: NodeConfig,
    log: Arc<dyn AuditLog>,
    registry: Arc<RemotePartyRegistry>,
    assets: Arc<AssetStore>,
    publisher: Arc<VersionPublisher>,
    exchange: CredentialExchange,
}

impl Node {
    /// Open a node on `log`, rebuilding the registry and then the resource
    /// store from their audit streams.
    pub async fn open(
        config: NodeConfig,
        log: Arc<dyn AuditLog>,
        peers: Arc<dyn PeerClient>,
    ) -> Result<Self> {
        config.validate()?;

        let registry = Arc::new(RemotePartyRegistry::new(Arc::clone(&log)));
        let assets = Arc::new(AssetStore::new(Arc::clone(&log), config.assets.clone()));

        let entries = log.replay(LogStream::RemoteParties).await?;
        let registry_entries = registry.replay(&entries)?;
        let entries = log.replay(LogStream::Assets).await?;
        let asset_entries = assets.replay(&entries)?;

        let publisher = Arc::new(VersionPublisher::new(
            config.base_url.clone(),
            config.versions.clone(),
            config.open_data,
        ));
        let exchange = CredentialExchange::new(
            Arc::clone(&registry),
            peers,
            Arc::clone(&publisher),
            config.handshake.clone(),
        );

        tracing::info!(
            base_url = %config.base_url,
            registry_entries,
            asset_entries,
            remote_parties = registry.len(),
            "node opened"
        );

        Ok(Self {
            config,
            log,
            registry,
            assets,
            publisher,
            exchange,
        })
    }

    /// Inject slow storage consulted for Sessions and CDRs not held in memory.
    pub fn with_archive(self, archive: Arc<dyn ArchiveLookup>) -> Self {
        self.assets.set_archive(archive);
        self
    }

    /// Flush the audit log and shut down.
    pub async fn close(self) -> Result<()> {
        self.log.flush().await?;
        tracing::info!(base_url = %self.config.base_url, "node closed");
        Ok(())
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<RemotePartyRegistry> {
        &self.registry
    }

    pub fn assets(&self) -> &Arc<AssetStore> {
        &self.assets
    }

    /// Change notifications from the resource store.
    pub fn subscribe(&self) -> broadcast::Receiver<AssetEvent> {
        self.assets.subscribe()
    }

    /// Digest over every remote party and every stored resource.
    pub fn state_digest(&self) -> Result<StateDigest> {
        let mut digest = DigestBuilder::new();
        self.registry.digest_into(&mut digest)?;
        self.assets.digest_into(&mut digest)?;
        Ok(digest.finish())
    }

    /// The credentials roles this node presents: one per local party.
    pub fn own_roles(&self) -> Vec<CredentialsRole> {
        self.assets
            .parties()
            .iter()
            .map(LocalParty::credentials_role)
            .collect()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Versions
    // ─────────────────────────────────────────────────────────────────────────

    /// Resolve the caller of a versions request. Unknown and blocked tokens
    /// get the same answer.
    fn caller<T>(&self, ctx: &RequestContext) -> std::result::Result<Caller, OcpiResponse<T>> {
        let Some(token) = ctx.token() else {
            return Ok(Caller::Anonymous);
        };

        match self.registry.try_get_local_access_info(&token) {
            Some((party, access)) if access.is_usable_at(Utc::now()) => {
                Ok(Caller::Peer { party, access })
            }
            _ => {
                tracing::debug!(event_tracking_id = %ctx.event_tracking_id, "versions request refused");
                Err(HandshakeError::InvalidToken.into())
            }
        }
    }

    /// `GET /versions`
    pub fn get_versions(&self, ctx: &RequestContext) -> OcpiResponse<Vec<VersionInformation>> {
        match self.caller(ctx) {
            Ok(_) => OcpiResponse::ok(self.publisher.versions()),
            Err(response) => response,
        }
    }

    /// `GET /versions/{version}`
    pub fn get_version_details(
        &self,
        version: &VersionId,
        ctx: &RequestContext,
    ) -> OcpiResponse<VersionDetails> {
        let caller = match self.caller(ctx) {
            Ok(caller) => caller,
            Err(response) => return response,
        };

        let hosts_cpo = self.assets.has_local_role(Role::Cpo);
        match self.publisher.version_details(version, &caller, hosts_cpo) {
            Some(details) => OcpiResponse::ok(details),
            None => OcpiResponse::error(
                HttpStatus::NotFound,
                StatusCode::UnsupportedVersion,
                format!("unsupported version {}", version),
            ),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Credentials
    // ─────────────────────────────────────────────────────────────────────────

    /// `GET /{version}/credentials`
    pub fn get_credentials(&self, version: &VersionId, ctx: &RequestContext) -> OcpiResponse<Credentials> {
        let token = ctx.token();
        match self.exchange.get(version, token.as_ref(), self.own_roles()) {
            Ok(credentials) => OcpiResponse::ok(credentials),
            Err(e) => e.into(),
        }
    }

    /// `POST /{version}/credentials`
    pub async fn post_credentials(
        &self,
        version: &VersionId,
        credentials: Credentials,
        ctx: &RequestContext,
    ) -> OcpiResponse<Credentials> {
        let token = ctx.token();
        let result = self
            .exchange
            .register(version, token.as_ref(), credentials, self.own_roles(), &ctx.write_context())
            .await;
        match result {
            Ok(credentials) => OcpiResponse::ok(credentials),
            Err(e) => e.into(),
        }
    }

    /// `PUT /{version}/credentials`
    pub async fn put_credentials(
        &self,
        version: &VersionId,
        credentials: Credentials,
        ctx: &RequestContext,
    ) -> OcpiResponse<Credentials> {
        let token = ctx.token();
        let result = self
            .exchange
            .update(version, token.as_ref(), credentials, self.own_roles(), &ctx.write_context())
            .await;
        match result {
            Ok(credentials) => OcpiResponse::ok(credentials),
            Err(e) => e.into(),
        }
    }

    /// `DELETE /{version}/credentials`
    pub async fn delete_credentials(&self, version: &VersionId, ctx: &RequestContext) -> OcpiResponse<()> {
        let token = ctx.token();
        match self
            .exchange
            .unregister(version, token.as_ref(), &ctx.write_context())
            .await
        {
            Ok(()) => OcpiResponse::empty(),
            Err(e) => e.into(),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Administration
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a disabled remote party holding a fresh token A, to be handed
    /// to the peer out of band.
    pub async fn provision_remote_party(
        &self,
        roles: Vec<CredentialsRole>,
        ctx: &WriteContext,
    ) -> Result<AccessToken> {
        let token = AccessToken::generate();
        let party = RemoteParty::provisioned(RemotePartyId::generate(), roles, token.clone());
        let id = party.id.clone();

        let result = self.registry.add_remote_party(party, ctx).await?;
        if !result.is_success() {
            return Err(NodeError::Rejected {
                command: "provision_remote_party",
                message: result.message.unwrap_or_default(),
            });
        }

        tracing::info!(remote_party = %id, "remote party provisioned");
        Ok(token)
    }

    /// Block one of our tokens. The holder loses access immediately.
    pub async fn block_access_token(
        &self,
        token: &AccessToken,
        ctx: &WriteContext,
    ) -> Result<CommandResult<Arc<RemoteParty>>> {
        let result = self
            .registry
            .set_access_status(token, AccessStatus::Blocked, ctx)
            .await?;
        if result.is_success() {
            tracing::info!(event_tracking_id = %ctx.event_tracking_id, "access token blocked");
        }
        Ok(result)
    }

    /// Register a role this node plays.
    pub async fn add_local_party(
        &self,
        party: LocalParty,
        ctx: &WriteContext,
    ) -> Result<CommandResult<LocalParty>> {
        Ok(self.assets.add_party(party, ctx).await?)
    }
}
