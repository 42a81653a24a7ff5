//! JSON merge patch (RFC 7396) over serialized resources.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::ValidationError;
use crate::resource::Resource;

/// Fields that identify a resource and may never be patched.
const IMMUTABLE_FIELDS: [&str; 4] = ["id", "uid", "country_code", "party_id"];

/// Merge `patch` into `target` in place.
///
/// `null` members delete, objects merge recursively, everything else replaces.
pub fn merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(patch_map) = patch else {
        *target = patch.clone();
        return;
    };

    if !target.is_object() {
        *target = Value::Object(serde_json::Map::new());
    }

    if let Value::Object(target_map) = target {
        for (key, value) in patch_map {
            if value.is_null() {
                target_map.remove(key);
            } else {
                merge_patch(
                    target_map.entry(key.clone()).or_insert(Value::Null),
                    value,
                );
            }
        }
    }
}

/// Check that a patch is a non-empty object touching no identity field.
pub fn validate_patch(patch: &Value) -> Result<(), ValidationError> {
    let Value::Object(map) = patch else {
        return Err(ValidationError::InvalidPatch);
    };
    if map.is_empty() {
        return Err(ValidationError::EmptyPatch);
    }
    for field in IMMUTABLE_FIELDS {
        if map.contains_key(field) {
            return Err(ValidationError::ImmutableField(field));
        }
    }
    Ok(())
}

/// Apply a merge patch to a resource, producing a new value.
pub fn apply_patch<R: Resource>(resource: &R, patch: &Value) -> Result<R, ValidationError> {
    patch_value(resource, patch, R::KIND.noun())
}

/// Apply a merge patch to any serializable value, e.g. a nested EVSE.
pub fn patch_value<T>(value: &T, patch: &Value, kind: &'static str) -> Result<T, ValidationError>
where
    T: Serialize + DeserializeOwned,
{
    validate_patch(patch)?;

    let mut json = serde_json::to_value(value).map_err(|e| ValidationError::PatchedValueInvalid {
        kind,
        reason: e.to_string(),
    })?;
    merge_patch(&mut json, patch);

    serde_json::from_value(json).map_err(|e| ValidationError::PatchedValueInvalid {
        kind,
        reason: e.to_string(),
    })
}
