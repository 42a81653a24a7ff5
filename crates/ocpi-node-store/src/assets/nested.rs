//! Charging station, EVSE and connector writes.
//!
//! A nested change rebuilds its parent chain, stamps the Location with the
//! child's `last_updated`, bumps the Location's `version_id`, and commits the
//! Location through the ordinary replace path. The Location's downgrade
//! check and compare-and-swap govern the write.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;

use ocpi_node_core::{
    patch_value, ChargingStation, CommandResult, Connector, Evse, FailureKind, Location, PartyId,
    Resource,
};

use crate::assets::collection::StoredResource;
use crate::assets::command::WriteVerb;
use crate::assets::store::AssetStore;
use crate::error::Result;
use crate::traits::WriteContext;

type LocationResult = Result<CommandResult<Arc<Location>>>;

/// A timestamp strictly after `existing`, used when a change carries none.
fn stamp_after(existing: DateTime<Utc>) -> DateTime<Utc> {
    Utc::now().max(existing + Duration::milliseconds(1))
}

fn missing<T>(what: &str, path: &[&str]) -> CommandResult<T> {
    CommandResult::failed(FailureKind::NotFound, format!("{} {} not found", what, path.join("/")))
}

fn patch_failed<T>(error: impl std::fmt::Display) -> CommandResult<T> {
    CommandResult::failed(FailureKind::Validation, error.to_string())
}

impl AssetStore {
    fn current_location(&self, party: &PartyId, location_id: &str) -> Option<Arc<Location>> {
        self.party_data(party)
            .and_then(|data| Location::collection(&data).get(location_id))
    }

    /// Commit a rebuilt Location against the snapshot it was built from.
    async fn commit_location(
        &self,
        existing: Arc<Location>,
        rebuilt: Location,
        ctx: &WriteContext,
    ) -> LocationResult {
        let owner = existing.owner();
        let Some(party) = self.party_data(&owner) else {
            return Ok(CommandResult::failed(
                FailureKind::NotFound,
                format!("unknown party {}", owner),
            ));
        };
        self.replace(&party, existing, rebuilt, WriteVerb::AddOrUpdate, ctx)
            .await
    }

    pub async fn add_or_update_charging_station(
        &self,
        party: &PartyId,
        location_id: &str,
        station: ChargingStation,
        ctx: &WriteContext,
    ) -> LocationResult {
        let Some(location) = self.current_location(party, location_id) else {
            return Ok(missing("Location", &[location_id]));
        };

        let stamp = station.last_updated;
        let rebuilt = location.with_charging_station(station).touched(stamp);
        self.commit_location(location, rebuilt, ctx).await
    }

    pub async fn add_or_update_evse(
        &self,
        party: &PartyId,
        location_id: &str,
        station_id: &str,
        evse: Evse,
        ctx: &WriteContext,
    ) -> LocationResult {
        let Some(location) = self.current_location(party, location_id) else {
            return Ok(missing("Location", &[location_id]));
        };
        let Some(station) = location.charging_station(station_id) else {
            return Ok(missing("ChargingStation", &[location_id, station_id]));
        };

        let stamp = evse.last_updated;
        let rebuilt = location
            .with_charging_station(station.with_evse(evse))
            .touched(stamp);
        self.commit_location(location, rebuilt, ctx).await
    }

    pub async fn add_or_update_connector(
        &self,
        party: &PartyId,
        location_id: &str,
        station_id: &str,
        evse_uid: &str,
        connector: Connector,
        ctx: &WriteContext,
    ) -> LocationResult {
        let Some(location) = self.current_location(party, location_id) else {
            return Ok(missing("Location", &[location_id]));
        };
        let Some(station) = location.charging_station(station_id) else {
            return Ok(missing("ChargingStation", &[location_id, station_id]));
        };
        let Some(evse) = station.evse(evse_uid) else {
            return Ok(missing("EVSE", &[location_id, station_id, evse_uid]));
        };

        let stamp = connector.last_updated;
        let rebuilt = location
            .with_charging_station(station.with_evse(evse.with_connector(connector)))
            .touched(stamp);
        self.commit_location(location, rebuilt, ctx).await
    }

    pub async fn remove_charging_station(
        &self,
        party: &PartyId,
        location_id: &str,
        station_id: &str,
        ctx: &WriteContext,
    ) -> LocationResult {
        let Some(location) = self.current_location(party, location_id) else {
            return Ok(missing("Location", &[location_id]));
        };
        let Some(rebuilt) = location.without_charging_station(station_id) else {
            return Ok(missing("ChargingStation", &[location_id, station_id]));
        };

        let rebuilt = rebuilt.touched(stamp_after(location.last_updated));
        self.commit_location(location, rebuilt, ctx).await
    }

    pub async fn remove_evse(
        &self,
        party: &PartyId,
        location_id: &str,
        station_id: &str,
        evse_uid: &str,
        ctx: &WriteContext,
    ) -> LocationResult {
        let Some(location) = self.current_location(party, location_id) else {
            return Ok(missing("Location", &[location_id]));
        };
        let Some(station) = location
            .charging_station(station_id)
            .and_then(|station| station.without_evse(evse_uid))
        else {
            return Ok(missing("EVSE", &[location_id, station_id, evse_uid]));
        };

        let stamp = stamp_after(location.last_updated);
        let rebuilt = location.with_charging_station(station).touched(stamp);
        self.commit_location(location, rebuilt, ctx).await
    }

    pub async fn remove_connector(
        &self,
        party: &PartyId,
        location_id: &str,
        station_id: &str,
        evse_uid: &str,
        connector_id: &str,
        ctx: &WriteContext,
    ) -> LocationResult {
        let Some(location) = self.current_location(party, location_id) else {
            return Ok(missing("Location", &[location_id]));
        };
        let Some(station) = location.charging_station(station_id) else {
            return Ok(missing("ChargingStation", &[location_id, station_id]));
        };
        let Some(evse) = station
            .evse(evse_uid)
            .and_then(|evse| evse.without_connector(connector_id))
        else {
            return Ok(missing("Connector", &[location_id, station_id, evse_uid, connector_id]));
        };

        let stamp = stamp_after(location.last_updated);
        let rebuilt = location
            .with_charging_station(station.with_evse(evse))
            .touched(stamp);
        self.commit_location(location, rebuilt, ctx).await
    }

    /// Merge-patch one EVSE. A patch without `last_updated` is stamped now.
    pub async fn try_patch_evse(
        &self,
        party: &PartyId,
        location_id: &str,
        station_id: &str,
        evse_uid: &str,
        patch: &Value,
        ctx: &WriteContext,
    ) -> LocationResult {
        let Some(location) = self.current_location(party, location_id) else {
            return Ok(missing("Location", &[location_id]));
        };
        let Some(station) = location.charging_station(station_id) else {
            return Ok(missing("ChargingStation", &[location_id, station_id]));
        };
        let Some(evse) = station.evse(evse_uid) else {
            return Ok(missing("EVSE", &[location_id, station_id, evse_uid]));
        };

        let mut patched: Evse = match patch_value(evse, patch, "EVSE") {
            Ok(patched) => patched,
            Err(e) => return Ok(patch_failed(e)),
        };
        if patch.get("last_updated").is_none() {
            patched.last_updated = stamp_after(location.last_updated);
        }

        let stamp = patched.last_updated;
        let rebuilt = location
            .with_charging_station(station.with_evse(patched))
            .touched(stamp);
        self.commit_location(location, rebuilt, ctx).await
    }

    /// Merge-patch one connector. A patch without `last_updated` is stamped now.
    #[allow(clippy::too_many_arguments)]
    pub async fn try_patch_connector(
        &self,
        party: &PartyId,
        location_id: &str,
        station_id: &str,
        evse_uid: &str,
        connector_id: &str,
        patch: &Value,
        ctx: &WriteContext,
    ) -> LocationResult {
        let Some(location) = self.current_location(party, location_id) else {
            return Ok(missing("Location", &[location_id]));
        };
        let Some(station) = location.charging_station(station_id) else {
            return Ok(missing("ChargingStation", &[location_id, station_id]));
        };
        let Some(evse) = station.evse(evse_uid) else {
            return Ok(missing("EVSE", &[location_id, station_id, evse_uid]));
        };
        let Some(connector) = evse.connector(connector_id) else {
            return Ok(missing("Connector", &[location_id, station_id, evse_uid, connector_id]));
        };

        let mut patched: Connector = match patch_value(connector, patch, "Connector") {
            Ok(patched) => patched,
            Err(e) => return Ok(patch_failed(e)),
        };
        if patch.get("last_updated").is_none() {
            patched.last_updated = stamp_after(location.last_updated);
        }

        let stamp = patched.last_updated;
        let rebuilt = location
            .with_charging_station(station.with_evse(evse.with_connector(patched)))
            .touched(stamp);
        self.commit_location(location, rebuilt, ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::events::{AssetEvent, Change};
    use crate::assets::store::AssetStoreConfig;
    use crate::memory::MemoryAuditLog;
    use crate::traits::{AuditLog, AuditLogExt, LogStream};
    use chrono::TimeZone;
    use ocpi_node_core::{BusinessDetails, LocalParty, Role};
    use serde_json::json;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).single().unwrap()
    }

    fn owner() -> PartyId {
        PartyId::new("DE", "ABC").unwrap()
    }

    async fn store_with_location() -> (Arc<MemoryAuditLog>, AssetStore) {
        let log = Arc::new(MemoryAuditLog::new());
        let store = AssetStore::new(log.clone(), AssetStoreConfig::default());
        let ctx = WriteContext::default();
        store
            .add_party(LocalParty::new(owner(), Role::Cpo, BusinessDetails::named("ABC")), &ctx)
            .await
            .unwrap();

        let evse = Evse::new("E1", at(10)).with_connector(Connector::new("C1", at(10)));
        let location = Location::new(&owner(), "L1", at(10))
            .with_charging_station(ChargingStation::new("S1", at(10)).with_evse(evse));
        assert!(store.add(location, &ctx).await.unwrap().is_success());
        (log, store)
    }

    #[tokio::test]
    async fn test_evse_update_restamps_location() {
        let (_, store) = store_with_location().await;
        let ctx = WriteContext::default();

        let mut evse = Evse::new("E1", at(20));
        evse.status = Some("CHARGING".into());
        let result = store
            .add_or_update_evse(&owner(), "L1", "S1", evse, &ctx)
            .await
            .unwrap();

        let location = result.data.unwrap();
        assert_eq!(location.last_updated, at(20));
        assert_eq!(location.version_id, 1);
        assert_eq!(location.evse("S1", "E1").unwrap().status.as_deref(), Some("CHARGING"));
    }

    #[tokio::test]
    async fn test_stale_connector_is_a_location_downgrade() {
        let (log, store) = store_with_location().await;
        let ctx = WriteContext::default();

        let result = store
            .add_or_update_connector(&owner(), "L1", "S1", "E1", Connector::new("C2", at(5)), &ctx)
            .await
            .unwrap();

        assert!(result.is_failed_with(FailureKind::Downgrade));
        assert!(store.current_location(&owner(), "L1").unwrap().connector("S1", "E1", "C2").is_none());
        assert_eq!(log.len(LogStream::Assets).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_missing_parent_is_not_found() {
        let (_, store) = store_with_location().await;
        let ctx = WriteContext::default();

        let result = store
            .add_or_update_evse(&owner(), "L1", "S9", Evse::new("E2", at(30)), &ctx)
            .await
            .unwrap();
        assert!(result.is_failed_with(FailureKind::NotFound));

        let result = store
            .remove_connector(&owner(), "L1", "S1", "E1", "C9", &ctx)
            .await
            .unwrap();
        assert!(result.is_failed_with(FailureKind::NotFound));
    }

    #[tokio::test]
    async fn test_remove_evse_logs_location_snapshot() {
        let (log, store) = store_with_location().await;
        let ctx = WriteContext::default();

        let result = store
            .remove_evse(&owner(), "L1", "S1", "E1", &ctx)
            .await
            .unwrap();
        let location = result.data.unwrap();
        assert!(location.charging_station("S1").unwrap().evses.is_empty());
        assert!(location.last_updated > at(10));

        let commands = log.commands(LogStream::Assets).await.unwrap();
        assert_eq!(commands.last().map(String::as_str), Some("addOrUpdateLocation"));
    }

    #[tokio::test]
    async fn test_patch_connector_emits_location_change() {
        let (_, store) = store_with_location().await;
        let mut events = store.subscribe();
        let ctx = WriteContext::default();

        let result = store
            .try_patch_connector(
                &owner(),
                "L1",
                "S1",
                "E1",
                "C1",
                &json!({"standard": "IEC_62196_T2"}),
                &ctx,
            )
            .await
            .unwrap();
        assert!(result.is_success());

        match events.recv().await.unwrap() {
            AssetEvent::Location(Change::Changed { previous, current }) => {
                assert!(previous.connector("S1", "E1", "C1").unwrap().standard.is_none());
                assert_eq!(
                    current.connector("S1", "E1", "C1").unwrap().standard.as_deref(),
                    Some("IEC_62196_T2")
                );
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_patch_evse_rejects_uid_change() {
        let (_, store) = store_with_location().await;
        let result = store
            .try_patch_evse(&owner(), "L1", "S1", "E1", &json!({"uid": "E9"}), &WriteContext::default())
            .await
            .unwrap();
        assert!(result.is_failed_with(FailureKind::Validation));
    }
}
