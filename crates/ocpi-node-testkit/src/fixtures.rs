//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};

use ocpi_node::{Node, NodeConfig, RequestContext};
use ocpi_node_core::{
    join_url, AccessToken, BusinessDetails, Cdr, ChargingStation, Connector, Credentials,
    CredentialsRole, Evse, LocalParty, Location, PartyId, Role, Session, Tariff, TokenStatus,
    VersionId,
};
use ocpi_node_store::{MemoryAuditLog, WriteContext};
use ocpi_node_sync::{FakePeer, MemoryPeerNetwork, OcpiResponse};

/// A fixed instant, so tests can reason about ordering.
pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
}

/// `base_time()` shifted by `seconds`.
pub fn at(seconds: i64) -> DateTime<Utc> {
    base_time() + Duration::seconds(seconds)
}

pub fn cpo_id() -> PartyId {
    PartyId::new("DE", "ABC").unwrap()
}

pub fn emsp_id() -> PartyId {
    PartyId::new("NL", "XYZ").unwrap()
}

pub fn cpo_party() -> LocalParty {
    LocalParty::new(cpo_id(), Role::Cpo, BusinessDetails::named("ABC Charging"))
}

pub fn emsp_party() -> LocalParty {
    LocalParty::new(emsp_id(), Role::Emsp, BusinessDetails::named("XYZ Mobility"))
}

/// A location with one station, one EVSE and one connector, all stamped `at`.
pub fn sample_location(owner: &PartyId, id: &str, at: DateTime<Utc>) -> Location {
    let evse = Evse::new("EVSE-1", at).with_connector(Connector::new("1", at));
    let station = ChargingStation::new("CS-1", at).with_evse(evse);
    Location::new(owner, id, at).with_charging_station(station)
}

pub fn sample_tariff(owner: &PartyId, id: &str, at: DateTime<Utc>) -> Tariff {
    Tariff::new(owner, id, "EUR", at)
}

pub fn sample_session(owner: &PartyId, id: &str, at: DateTime<Utc>) -> Session {
    Session::new(owner, id, at)
}

pub fn sample_token_status(owner: &PartyId, uid: &str, at: DateTime<Utc>) -> TokenStatus {
    TokenStatus::new(owner, uid, true, at)
}

pub fn sample_cdr(owner: &PartyId, id: &str, at: DateTime<Utc>) -> Cdr {
    let mut cdr = Cdr::new(owner, id, at - Duration::hours(1), at, "EUR");
    cdr.last_updated = at;
    cdr
}

/// Credentials roles of a peer playing `roles` as `NL*XYZ`.
pub fn peer_roles(roles: &[Role]) -> Vec<CredentialsRole> {
    roles
        .iter()
        .map(|role| CredentialsRole::new(&emsp_id(), *role, BusinessDetails::named("XYZ Mobility")))
        .collect()
}

/// The body a peer at `base` sends to our credentials endpoint.
pub fn peer_credentials(base: &str, token_b: &AccessToken, roles: &[Role]) -> Credentials {
    Credentials {
        token: token_b.clone(),
        url: join_url(base, &["versions"]),
        roles: peer_roles(roles),
    }
}

/// Outcome of a scripted registration.
pub struct Registered {
    pub token_a: AccessToken,
    pub token_b: AccessToken,
    pub response: OcpiResponse<Credentials>,
}

impl Registered {
    /// The token C we handed out, if registration succeeded.
    pub fn token_c(&self) -> Option<&AccessToken> {
        self.response.data.as_ref().map(|c| &c.token)
    }
}

/// A node on an in-memory audit log and an in-memory peer network.
pub struct TestNode {
    pub node: Node,
    pub log: Arc<MemoryAuditLog>,
    pub network: Arc<MemoryPeerNetwork>,
}

impl TestNode {
    pub const BASE_URL: &'static str = "https://node.example/ocpi";

    pub fn config() -> NodeConfig {
        NodeConfig::new(Self::BASE_URL)
    }

    pub async fn start(config: NodeConfig) -> Self {
        let log = Arc::new(MemoryAuditLog::new());
        let network = MemoryPeerNetwork::new();
        let node = Node::open(config, log.clone(), network.clone())
            .await
            .expect("node opens on an empty log");
        Self { node, log, network }
    }

    /// A node hosting the `DE*ABC` CPO.
    pub async fn with_cpo() -> Self {
        let fixture = Self::start(Self::config()).await;
        fixture
            .node
            .add_local_party(cpo_party(), &WriteContext::default())
            .await
            .expect("audit log accepts the party");
        fixture
    }

    /// Open a second node on the same log and network.
    pub async fn reopen(&self) -> Node {
        Node::open(self.node.config().clone(), self.log.clone(), self.network.clone())
            .await
            .expect("node reopens from its log")
    }

    /// Provision a remote party and return its token A.
    pub async fn provision(&self) -> AccessToken {
        self.node
            .provision_remote_party(Vec::new(), &WriteContext::default())
            .await
            .expect("provisioning succeeds")
    }

    /// Provision a party, put a fake peer at `peer_base` and let it register
    /// with `roles`.
    pub async fn register_peer(&self, peer_base: &str, roles: &[Role]) -> Registered {
        let token_a = self.provision().await;
        let token_b = AccessToken::generate();
        self.network.add_peer(FakePeer::standard(peer_base, token_b.clone()));

        let response = self
            .node
            .post_credentials(
                &VersionId::v2_2_1(),
                peer_credentials(peer_base, &token_b, roles),
                &RequestContext::with_token(&token_a),
            )
            .await;

        Registered {
            token_a,
            token_b,
            response,
        }
    }
}
