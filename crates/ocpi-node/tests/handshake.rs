//! End-to-end credential exchange and version discovery through the node.

use std::time::Duration;

use ocpi_node::core::{
    BusinessDetails, HttpStatus, InterfaceRole, ModuleId, PartyId, PartyStatus,
    RemoteAccessStatus, StatusCode,
};
use ocpi_node::store::WriteContext;
use ocpi_node::sync::{FakePeer, HandshakeConfig};
use ocpi_node::{AccessToken, CredentialsRole, RequestContext, Role, VersionId};
use ocpi_node_testkit::fixtures::{peer_credentials, TestNode};

const PEER: &str = "https://peer.example/ocpi";

fn v() -> VersionId {
    VersionId::v2_2_1()
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

#[tokio::test]
async fn register_rotate_and_use_token_c() {
    init_tracing();
    let fixture = TestNode::with_cpo().await;
    let registered = fixture.register_peer(PEER, &[Role::Emsp]).await;

    assert!(registered.response.is_success(), "{:?}", registered.response.status_message);
    let credentials = registered.response.data.clone().unwrap();
    assert_eq!(credentials.url, "https://node.example/ocpi/versions");
    assert_eq!(credentials.roles, fixture.node.own_roles());
    assert_eq!(credentials.roles[0].role, Role::Cpo);

    let token_c = registered.token_c().unwrap().clone();
    assert_ne!(token_c, registered.token_a);

    // Token A is gone, token C works.
    let old = fixture
        .node
        .get_credentials(&v(), &RequestContext::with_token(&registered.token_a));
    assert_eq!(old.http_status, HttpStatus::Forbidden);

    let details = fixture
        .node
        .get_version_details(&v(), &RequestContext::with_token(&token_c));
    let details = details.data.unwrap();
    let tokens = details.endpoint(ModuleId::Tokens, InterfaceRole::Receiver).unwrap();
    assert_eq!(tokens.url, "https://node.example/ocpi/2.2.1/cpo/tokens");
    assert!(details.endpoint(ModuleId::Locations, InterfaceRole::Sender).is_some());

    let (party, access) = fixture
        .node
        .registry()
        .try_get_local_access_info(&token_c)
        .unwrap();
    assert_eq!(party.status, PartyStatus::Enabled);
    assert!(access.is_registered());
    assert_eq!(party.remote_access_infos[0].access_token, registered.token_b);
    assert_eq!(party.remote_access_infos[0].status, RemoteAccessStatus::Online);
}

#[tokio::test]
async fn unregistered_peer_sees_credentials_only() {
    let fixture = TestNode::with_cpo().await;
    let token_a = fixture.provision().await;

    let details = fixture
        .node
        .get_version_details(&v(), &RequestContext::with_token(&token_a))
        .data
        .unwrap();
    assert_eq!(details.endpoints.len(), 2);
    assert!(details.has_module(ModuleId::Credentials));
}

#[tokio::test]
async fn unknown_and_blocked_tokens_look_the_same_on_versions() {
    let fixture = TestNode::with_cpo().await;
    let token_a = fixture.provision().await;
    fixture
        .node
        .block_access_token(&token_a, &WriteContext::default())
        .await
        .unwrap();

    let blocked = fixture.node.get_versions(&RequestContext::with_token(&token_a));
    let unknown = fixture
        .node
        .get_versions(&RequestContext::with_token(&AccessToken::new("nobody")));

    assert_eq!(blocked.http_status, HttpStatus::Forbidden);
    assert_eq!(unknown.http_status, HttpStatus::Forbidden);
    assert_eq!(blocked.status_message, unknown.status_message);

    let anonymous = fixture.node.get_versions(&RequestContext::new());
    assert!(anonymous.is_success());
}

#[tokio::test]
async fn blocked_token_cannot_register() {
    let fixture = TestNode::with_cpo().await;
    let token_a = fixture.provision().await;
    let token_b = AccessToken::generate();
    fixture.network.add_peer(FakePeer::standard(PEER, token_b.clone()));
    fixture
        .node
        .block_access_token(&token_a, &WriteContext::default())
        .await
        .unwrap();

    let response = fixture
        .node
        .post_credentials(
            &v(),
            peer_credentials(PEER, &token_b, &[Role::Emsp]),
            &RequestContext::with_token(&token_a),
        )
        .await;
    assert_eq!(response.http_status, HttpStatus::Forbidden);
    assert!(fixture.network.calls().is_empty());
}

#[tokio::test]
async fn registration_state_is_enforced() {
    let fixture = TestNode::with_cpo().await;
    let registered = fixture.register_peer(PEER, &[Role::Emsp]).await;
    let token_c = registered.token_c().unwrap().clone();

    let again = fixture
        .node
        .post_credentials(
            &v(),
            peer_credentials(PEER, &registered.token_b, &[Role::Emsp]),
            &RequestContext::with_token(&token_c),
        )
        .await;
    assert_eq!(again.http_status, HttpStatus::MethodNotAllowed);
    assert_eq!(again.status_code, StatusCode::GenericClientError);

    let token_a = fixture.provision().await;
    let early_put = fixture
        .node
        .put_credentials(
            &v(),
            peer_credentials(PEER, &registered.token_b, &[Role::Emsp]),
            &RequestContext::with_token(&token_a),
        )
        .await;
    assert_eq!(early_put.http_status, HttpStatus::MethodNotAllowed);

    let early_delete = fixture
        .node
        .delete_credentials(&v(), &RequestContext::with_token(&token_a))
        .await;
    assert_eq!(early_delete.http_status, HttpStatus::MethodNotAllowed);
}

#[tokio::test]
async fn re_registration_keeps_roles() {
    let fixture = TestNode::with_cpo().await;
    let registered = fixture.register_peer(PEER, &[Role::Emsp]).await;
    let token_c = registered.token_c().unwrap().clone();
    let before = fixture.node.state_digest().unwrap();

    let widened = fixture
        .node
        .put_credentials(
            &v(),
            peer_credentials(PEER, &registered.token_b, &[Role::Emsp, Role::Cpo]),
            &RequestContext::with_token(&token_c),
        )
        .await;
    assert_eq!(widened.http_status, HttpStatus::BadRequest);
    assert_eq!(widened.status_code, StatusCode::GenericClientError);
    assert_eq!(fixture.node.state_digest().unwrap(), before);

    let renewed = fixture
        .node
        .put_credentials(
            &v(),
            peer_credentials(PEER, &registered.token_b, &[Role::Emsp]),
            &RequestContext::with_token(&token_c),
        )
        .await;
    assert!(renewed.is_success());
    let token_c2 = renewed.data.unwrap().token;
    assert_ne!(token_c2, token_c);
    assert!(fixture.node.registry().try_get_local_access_info(&token_c).is_none());
}

#[tokio::test]
async fn re_registration_cannot_repeat_a_role() {
    let fixture = TestNode::with_cpo().await;
    let registered = fixture.register_peer(PEER, &[Role::Emsp]).await;
    let token_c = registered.token_c().unwrap().clone();
    let before = fixture.node.state_digest().unwrap();

    let doubled = fixture
        .node
        .put_credentials(
            &v(),
            peer_credentials(PEER, &registered.token_b, &[Role::Emsp, Role::Emsp]),
            &RequestContext::with_token(&token_c),
        )
        .await;
    assert_eq!(doubled.http_status, HttpStatus::BadRequest);
    assert_eq!(doubled.status_code, StatusCode::GenericClientError);
    assert_eq!(fixture.node.state_digest().unwrap(), before);

    let (party, _) = fixture.node.registry().try_get_local_access_info(&token_c).unwrap();
    assert_eq!(party.roles.len(), 1);
}

#[tokio::test]
async fn re_registration_cannot_rename_the_party() {
    let fixture = TestNode::with_cpo().await;
    let registered = fixture.register_peer(PEER, &[Role::Emsp]).await;
    let token_c = registered.token_c().unwrap().clone();
    let before = fixture.node.state_digest().unwrap();

    let renamed = PartyId::new("NL", "QRS").unwrap();
    let mut body = peer_credentials(PEER, &registered.token_b, &[Role::Emsp]);
    body.roles = vec![CredentialsRole::new(&renamed, Role::Emsp, BusinessDetails::named("QRS Mobility"))];

    let response = fixture
        .node
        .put_credentials(&v(), body, &RequestContext::with_token(&token_c))
        .await;
    assert_eq!(response.http_status, HttpStatus::BadRequest);
    assert_eq!(fixture.node.state_digest().unwrap(), before);
    assert!(fixture
        .node
        .get_credentials(&v(), &RequestContext::with_token(&token_c))
        .is_success());
}

#[tokio::test]
async fn credentials_hide_whether_a_token_exists() {
    let fixture = TestNode::with_cpo().await;
    let token_a = fixture.provision().await;
    fixture
        .node
        .block_access_token(&token_a, &WriteContext::default())
        .await
        .unwrap();

    let blocked = fixture
        .node
        .get_credentials(&v(), &RequestContext::with_token(&token_a));
    let unknown = fixture
        .node
        .get_credentials(&v(), &RequestContext::with_token(&AccessToken::new("nobody")));

    assert_eq!(blocked.http_status, HttpStatus::Forbidden);
    assert_eq!(blocked.http_status, unknown.http_status);
    assert_eq!(blocked.status_code, unknown.status_code);
    assert_eq!(blocked.status_message, unknown.status_message);

    let versions = fixture.node.get_versions(&RequestContext::with_token(&token_a));
    assert_eq!(versions.status_message, blocked.status_message);

    let missing = fixture.node.get_credentials(&v(), &RequestContext::new());
    assert_eq!(missing.http_status, HttpStatus::BadRequest);
}

#[tokio::test]
async fn delete_drops_the_party() {
    let fixture = TestNode::with_cpo().await;
    let registered = fixture.register_peer(PEER, &[Role::Emsp]).await;
    let token_c = registered.token_c().unwrap().clone();

    let deleted = fixture
        .node
        .delete_credentials(&v(), &RequestContext::with_token(&token_c))
        .await;
    assert!(deleted.is_success());
    assert!(deleted.data.is_none());
    assert!(fixture.node.registry().is_empty());

    let after = fixture.node.get_credentials(&v(), &RequestContext::with_token(&token_c));
    assert_eq!(after.http_status, HttpStatus::Forbidden);
}

#[tokio::test]
async fn probe_failures_are_distinguishable() {
    init_tracing();
    let fixture = TestNode::start(
        TestNode::config()
            .with_handshake(HandshakeConfig::default().with_request_timeout(Duration::from_millis(100))),
    )
    .await;

    let cases = [
        ("https://a.example/ocpi", FakePeer::failing_versions as fn(FakePeer) -> FakePeer, 3001),
        ("https://b.example/ocpi", FakePeer::failing_details, 3003),
        ("https://c.example/ocpi", |p: FakePeer| p.with_delay(Duration::from_secs(2)), 3001),
    ];

    for (base, script, code) in cases {
        let token_a = fixture.provision().await;
        let token_b = AccessToken::generate();
        fixture
            .network
            .add_peer(script(FakePeer::standard(base, token_b.clone())));
        let before = fixture.node.state_digest().unwrap();

        let response = fixture
            .node
            .post_credentials(
                &v(),
                peer_credentials(base, &token_b, &[Role::Emsp]),
                &RequestContext::with_token(&token_a),
            )
            .await;

        assert_eq!(response.http_status, HttpStatus::MethodNotAllowed, "{}", base);
        assert_eq!(response.status_code.code(), code, "{}", base);
        assert!(response.status_message.unwrap().contains(base));
        assert_eq!(fixture.node.state_digest().unwrap(), before);
    }
}

#[tokio::test]
async fn unknown_peer_url_fails_list_versions() {
    let fixture = TestNode::with_cpo().await;
    let token_a = fixture.provision().await;

    let response = fixture
        .node
        .post_credentials(
            &v(),
            peer_credentials("https://nowhere.example/ocpi", &AccessToken::generate(), &[Role::Emsp]),
            &RequestContext::with_token(&token_a),
        )
        .await;
    assert_eq!(response.status_code, StatusCode::UnableToUseClientApi);
}

#[tokio::test]
async fn anonymous_caller_can_always_negotiate_credentials() {
    let fixture = TestNode::start(TestNode::config()).await;
    let details = fixture
        .node
        .get_version_details(&v(), &RequestContext::new())
        .data
        .unwrap();

    assert_eq!(details.endpoints.len(), 2);
    let credentials = details
        .endpoint(ModuleId::Credentials, InterfaceRole::Receiver)
        .unwrap();
    assert_eq!(credentials.url, "https://node.example/ocpi/2.2.1/credentials");
}

#[tokio::test]
async fn unsupported_version_is_not_found() {
    let fixture = TestNode::with_cpo().await;
    let response = fixture
        .node
        .get_version_details(&VersionId::new("2.1.1"), &RequestContext::new());
    assert_eq!(response.http_status, HttpStatus::NotFound);
    assert_eq!(response.status_code, StatusCode::UnsupportedVersion);
}

#[tokio::test]
async fn registrations_survive_reopen() {
    let fixture = TestNode::with_cpo().await;
    let registered = fixture.register_peer(PEER, &[Role::Emsp]).await;
    let token_c = registered.token_c().unwrap().clone();
    let digest = fixture.node.state_digest().unwrap();

    let reopened = fixture.reopen().await;
    assert_eq!(reopened.state_digest().unwrap(), digest);
    assert!(reopened
        .get_credentials(&v(), &RequestContext::with_token(&token_c))
        .is_success());
}
