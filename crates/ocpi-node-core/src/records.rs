//! Flat resources: tariffs, sessions, token statuses and charge detail records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::resource::{Resource, ResourceKind};
use crate::types::PartyId;

/// Implements [`Resource`] for a struct with the standard envelope fields.
macro_rules! impl_resource {
    ($ty:ty, $kind:expr, $id:ident) => {
        impl Resource for $ty {
            const KIND: ResourceKind = $kind;

            fn id(&self) -> &str {
                &self.$id
            }

            fn owner(&self) -> PartyId {
                PartyId {
                    country_code: self.country_code.clone(),
                    party_id: self.party_id.clone(),
                }
            }

            fn last_updated(&self) -> DateTime<Utc> {
                self.last_updated
            }

            fn set_last_updated(&mut self, at: DateTime<Utc>) {
                self.last_updated = at;
            }

            fn version_id(&self) -> u64 {
                self.version_id
            }

            fn set_version_id(&mut self, version_id: u64) {
                self.version_id = version_id;
            }
        }
    };
}

/// A tariff published by a CPO.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tariff {
    pub country_code: String,
    pub party_id: String,
    pub id: String,
    pub currency: String,
    #[serde(default)]
    pub elements: Vec<Value>,
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub version_id: u64,
    #[serde(flatten)]
    pub properties: Map<String, Value>,
}

impl Tariff {
    pub fn new(
        owner: &PartyId,
        id: impl Into<String>,
        currency: impl Into<String>,
        last_updated: DateTime<Utc>,
    ) -> Self {
        Self {
            country_code: owner.country_code.clone(),
            party_id: owner.party_id.clone(),
            id: id.into(),
            currency: currency.into(),
            elements: Vec::new(),
            last_updated,
            version_id: 0,
            properties: Map::new(),
        }
    }
}

impl_resource!(Tariff, ResourceKind::Tariff, id);

/// A charging session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub country_code: String,
    pub party_id: String,
    pub id: String,
    pub start_date_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub kwh: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_id: Option<String>,
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub version_id: u64,
    #[serde(flatten)]
    pub properties: Map<String, Value>,
}

impl Session {
    pub fn new(owner: &PartyId, id: impl Into<String>, start: DateTime<Utc>) -> Self {
        Self {
            country_code: owner.country_code.clone(),
            party_id: owner.party_id.clone(),
            id: id.into(),
            start_date_time: start,
            end_date_time: None,
            kwh: 0.0,
            status: None,
            location_id: None,
            last_updated: start,
            version_id: 0,
            properties: Map::new(),
        }
    }
}

impl_resource!(Session, ResourceKind::Session, id);

/// Authorization state of a charging token issued by an EMSP.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenStatus {
    pub country_code: String,
    pub party_id: String,
    pub uid: String,
    #[serde(rename = "type", default = "default_token_type")]
    pub token_type: String,
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub whitelist: Option<String>,
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub version_id: u64,
    #[serde(flatten)]
    pub properties: Map<String, Value>,
}

fn default_token_type() -> String {
    "RFID".to_string()
}

impl TokenStatus {
    pub fn new(owner: &PartyId, uid: impl Into<String>, valid: bool, last_updated: DateTime<Utc>) -> Self {
        Self {
            country_code: owner.country_code.clone(),
            party_id: owner.party_id.clone(),
            uid: uid.into(),
            token_type: default_token_type(),
            valid,
            whitelist: None,
            last_updated,
            version_id: 0,
            properties: Map::new(),
        }
    }
}

impl_resource!(TokenStatus, ResourceKind::TokenStatus, uid);

/// A charge detail record: the billable outcome of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cdr {
    pub country_code: String,
    pub party_id: String,
    pub id: String,
    pub start_date_time: DateTime<Utc>,
    pub end_date_time: DateTime<Utc>,
    pub currency: String,
    #[serde(default)]
    pub total_energy: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub version_id: u64,
    #[serde(flatten)]
    pub properties: Map<String, Value>,
}

impl Cdr {
    pub fn new(
        owner: &PartyId,
        id: impl Into<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            country_code: owner.country_code.clone(),
            party_id: owner.party_id.clone(),
            id: id.into(),
            start_date_time: start,
            end_date_time: end,
            currency: currency.into(),
            total_energy: 0.0,
            session_id: None,
            last_updated: end,
            version_id: 0,
            properties: Map::new(),
        }
    }
}

impl_resource!(Cdr, ResourceKind::Cdr, id);
