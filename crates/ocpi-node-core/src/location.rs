//! Locations and their nested charging stations, EVSEs and connectors.
//!
//! Nested entities are never mutated in place: every `with_*`/`without_*`
//! helper returns a rebuilt parent so the store can swap the whole
//! Location in a single compare-and-swap.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::resource::{Resource, ResourceKind};
use crate::types::PartyId;

/// A site with one or more charging stations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub country_code: String,
    pub party_id: String,
    pub id: String,
    #[serde(default = "default_publish")]
    pub publish: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub charging_stations: Vec<ChargingStation>,
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub version_id: u64,
    /// Fields this node stores but does not interpret.
    #[serde(flatten)]
    pub properties: Map<String, Value>,
}

fn default_publish() -> bool {
    true
}

/// A physical charging station at a location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargingStation {
    pub id: String,
    #[serde(default)]
    pub evses: Vec<Evse>,
    pub last_updated: DateTime<Utc>,
    #[serde(flatten)]
    pub properties: Map<String, Value>,
}

/// An EVSE: one charging point that can serve a single vehicle at a time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evse {
    pub uid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evse_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default)]
    pub connectors: Vec<Connector>,
    pub last_updated: DateTime<Utc>,
    #[serde(flatten)]
    pub properties: Map<String, Value>,
}

/// A socket or cable on an EVSE.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connector {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub standard: Option<String>,
    pub last_updated: DateTime<Utc>,
    #[serde(flatten)]
    pub properties: Map<String, Value>,
}

impl Location {
    pub fn new(owner: &PartyId, id: impl Into<String>, last_updated: DateTime<Utc>) -> Self {
        Self {
            country_code: owner.country_code.clone(),
            party_id: owner.party_id.clone(),
            id: id.into(),
            publish: true,
            name: None,
            charging_stations: Vec::new(),
            last_updated,
            version_id: 0,
            properties: Map::new(),
        }
    }

    pub fn charging_station(&self, id: &str) -> Option<&ChargingStation> {
        self.charging_stations.iter().find(|s| s.id == id)
    }

    pub fn evse(&self, station_id: &str, evse_uid: &str) -> Option<&Evse> {
        self.charging_station(station_id)?.evse(evse_uid)
    }

    pub fn connector(&self, station_id: &str, evse_uid: &str, connector_id: &str) -> Option<&Connector> {
        self.evse(station_id, evse_uid)?.connector(connector_id)
    }

    /// Insert or replace a charging station by id.
    pub fn with_charging_station(&self, station: ChargingStation) -> Self {
        let mut next = self.clone();
        match next.charging_stations.iter_mut().find(|s| s.id == station.id) {
            Some(slot) => *slot = station,
            None => next.charging_stations.push(station),
        }
        next
    }

    /// Remove a charging station. `None` if it does not exist.
    pub fn without_charging_station(&self, id: &str) -> Option<Self> {
        self.charging_station(id)?;
        let mut next = self.clone();
        next.charging_stations.retain(|s| s.id != id);
        Some(next)
    }

    /// Re-stamp after a nested change.
    pub fn touched(mut self, at: DateTime<Utc>) -> Self {
        self.last_updated = at;
        self.version_id += 1;
        self
    }
}

impl ChargingStation {
    pub fn new(id: impl Into<String>, last_updated: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            evses: Vec::new(),
            last_updated,
            properties: Map::new(),
        }
    }

    pub fn evse(&self, uid: &str) -> Option<&Evse> {
        self.evses.iter().find(|e| e.uid == uid)
    }

    pub fn with_evse(&self, evse: Evse) -> Self {
        let mut next = self.clone();
        match next.evses.iter_mut().find(|e| e.uid == evse.uid) {
            Some(slot) => *slot = evse,
            None => next.evses.push(evse),
        }
        next
    }

    pub fn without_evse(&self, uid: &str) -> Option<Self> {
        self.evse(uid)?;
        let mut next = self.clone();
        next.evses.retain(|e| e.uid != uid);
        Some(next)
    }
}

impl Evse {
    pub fn new(uid: impl Into<String>, last_updated: DateTime<Utc>) -> Self {
        Self {
            uid: uid.into(),
            evse_id: None,
            status: None,
            connectors: Vec::new(),
            last_updated,
            properties: Map::new(),
        }
    }

    pub fn connector(&self, id: &str) -> Option<&Connector> {
        self.connectors.iter().find(|c| c.id == id)
    }

    pub fn with_connector(&self, connector: Connector) -> Self {
        let mut next = self.clone();
        match next.connectors.iter_mut().find(|c| c.id == connector.id) {
            Some(slot) => *slot = connector,
            None => next.connectors.push(connector),
        }
        next
    }

    pub fn without_connector(&self, id: &str) -> Option<Self> {
        self.connector(id)?;
        let mut next = self.clone();
        next.connectors.retain(|c| c.id != id);
        Some(next)
    }
}

impl Connector {
    pub fn new(id: impl Into<String>, last_updated: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            standard: None,
            last_updated,
            properties: Map::new(),
        }
    }
}

impl Resource for Location {
    const KIND: ResourceKind = ResourceKind::Location;

    fn id(&self) -> &str {
        &self.id
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

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).single().unwrap()
    }

    fn owner() -> PartyId {
        PartyId::new("DE", "ABC").unwrap()
    }

    #[test]
    fn test_with_charging_station_replaces_by_id() {
        let loc = Location::new(&owner(), "L1", at(1))
            .with_charging_station(ChargingStation::new("S1", at(1)));
        let mut replacement = ChargingStation::new("S1", at(2));
        replacement.properties.insert("floor".into(), Value::from(3));

        let next = loc.with_charging_station(replacement);
        assert_eq!(next.charging_stations.len(), 1);
        assert_eq!(next.charging_station("S1").unwrap().last_updated, at(2));
        assert_eq!(loc.charging_station("S1").unwrap().last_updated, at(1));
    }

    #[test]
    fn test_nested_lookup_and_removal() {
        let evse = Evse::new("E1", at(1)).with_connector(Connector::new("C1", at(1)));
        let station = ChargingStation::new("S1", at(1)).with_evse(evse);
        let loc = Location::new(&owner(), "L1", at(1)).with_charging_station(station);

        assert!(loc.connector("S1", "E1", "C1").is_some());
        assert!(loc.connector("S1", "E1", "C2").is_none());
        assert!(loc.without_charging_station("S2").is_none());

        let emptied = loc.without_charging_station("S1").unwrap();
        assert!(emptied.charging_stations.is_empty());
    }

    #[test]
    fn test_touched_bumps_version() {
        let loc = Location::new(&owner(), "L1", at(1)).touched(at(5));
        assert_eq!(loc.version_id, 1);
        assert_eq!(loc.last_updated, at(5));
    }

    #[test]
    fn test_unknown_fields_survive_serde() {
        let json = serde_json::json!({
            "country_code": "DE",
            "party_id": "ABC",
            "id": "L1",
            "last_updated": "2024-01-01T00:00:00Z",
            "address": "Main Street 1",
            "coordinates": {"latitude": "52.1", "longitude": "4.3"}
        });
        let loc: Location = serde_json::from_value(json).unwrap();
        assert!(loc.publish);
        assert_eq!(loc.properties["address"], "Main Street 1");

        let back = serde_json::to_value(&loc).unwrap();
        assert_eq!(back["coordinates"]["latitude"], "52.1");
    }
}
