//! Proptest generators for property-based testing.

use chrono::{DateTime, Duration, Utc};
use proptest::prelude::*;
use serde_json::{json, Map, Value};

use ocpi_node_core::{AccessToken, Location, PartyId, Role, Tariff};

use crate::fixtures::base_time;

/// Generate a valid `PartyId`.
pub fn party_id() -> impl Strategy<Value = PartyId> {
    ("[A-Z]{2}", "[A-Z0-9]{3}").prop_map(|(cc, pid)| PartyId::new(&cc, &pid).unwrap())
}

/// Generate any role.
pub fn role() -> impl Strategy<Value = Role> {
    prop_oneof![
        Just(Role::Cpo),
        Just(Role::Emsp),
        Just(Role::Hub),
        Just(Role::Nap),
        Just(Role::Nsp),
        Just(Role::Other),
        Just(Role::Scsp),
    ]
}

/// Generate a non-empty role list.
pub fn roles() -> impl Strategy<Value = Vec<Role>> {
    prop::collection::vec(role(), 1..4)
}

/// Generate a timestamp within a year of `base_time()`, millisecond precision.
pub fn timestamp() -> impl Strategy<Value = DateTime<Utc>> {
    (-31_536_000_000i64..31_536_000_000i64).prop_map(|ms| base_time() + Duration::milliseconds(ms))
}

/// Generate a resource id.
pub fn resource_id() -> impl Strategy<Value = String> {
    "[A-Z0-9]{1,12}".prop_map(String::from)
}

/// Generate an access token.
pub fn access_token() -> impl Strategy<Value = AccessToken> {
    "[a-zA-Z0-9-]{8,40}".prop_map(AccessToken::new)
}

/// Generate a bare location owned by `DE*ABC`.
pub fn location() -> impl Strategy<Value = Location> {
    (resource_id(), timestamp(), proptest::option::of("[a-zA-Z ]{1,20}")).prop_map(|(id, at, name)| {
        let mut location = Location::new(&crate::fixtures::cpo_id(), id, at);
        location.name = name;
        location
    })
}

/// Generate a tariff owned by `DE*ABC`.
pub fn tariff() -> impl Strategy<Value = Tariff> {
    (resource_id(), timestamp(), prop_oneof![Just("EUR"), Just("GBP"), Just("CHF")])
        .prop_map(|(id, at, currency)| Tariff::new(&crate::fixtures::cpo_id(), id, currency, at))
}

/// Generate a non-empty merge patch touching only mutable fields.
pub fn merge_patch() -> impl Strategy<Value = Value> {
    let field = prop_oneof![Just("name"), Just("publish"), Just("status"), Just("max_power")];
    let value = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<u16>().prop_map(|n| json!(n)),
        "[a-z]{0,8}".prop_map(Value::String),
    ];

    prop::collection::btree_map(field, value, 1..4).prop_map(|fields| {
        let map: Map<String, Value> = fields.into_iter().map(|(k, v)| (k.to_string(), v)).collect();
        Value::Object(map)
    })
}
