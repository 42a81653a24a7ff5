//! Canonical CBOR encoding and state digests.
//!
//! Values are first lowered to `serde_json::Value`, then re-encoded as CBOR
//! with map keys sorted by their encoded bytes and definite lengths only,
//! so the same logical state always yields the same bytes.

use std::fmt;

use ciborium::value::{Integer, Value as Cbor};
use serde::Serialize;
use serde_json::Value as Json;

use crate::error::CoreError;

/// Domain separator mixed into every state digest.
pub const DIGEST_DOMAIN: &[u8] = b"ocpi-node/state-digest/v1";

/// Encode a value to canonical CBOR bytes.
pub fn canonical_bytes<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, CoreError> {
    let json = serde_json::to_value(value).map_err(|e| CoreError::EncodingError(e.to_string()))?;
    let cbor = json_to_cbor(&json)?;
    let mut buf = Vec::new();
    ciborium::into_writer(&cbor, &mut buf).map_err(|e| CoreError::EncodingError(e.to_string()))?;
    Ok(buf)
}

fn json_to_cbor(value: &Json) -> Result<Cbor, CoreError> {
    Ok(match value {
        Json::Null => Cbor::Null,
        Json::Bool(b) => Cbor::Bool(*b),
        Json::Number(n) => {
            if let Some(i) = n.as_i64() {
                Cbor::Integer(Integer::from(i))
            } else if let Some(u) = n.as_u64() {
                Cbor::Integer(Integer::from(u))
            } else {
                let f = n
                    .as_f64()
                    .ok_or_else(|| CoreError::EncodingError(format!("unrepresentable number {}", n)))?;
                Cbor::Float(f)
            }
        }
        Json::String(s) => Cbor::Text(s.clone()),
        Json::Array(items) => Cbor::Array(items.iter().map(json_to_cbor).collect::<Result<_, _>>()?),
        Json::Object(map) => {
            let mut entries = Vec::with_capacity(map.len());
            for (key, value) in map {
                entries.push((encode_key(key)?, Cbor::Text(key.clone()), json_to_cbor(value)?));
            }
            // RFC 8949 deterministic order: bytewise on the encoded key.
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Cbor::Map(entries.into_iter().map(|(_, k, v)| (k, v)).collect())
        }
    })
}

fn encode_key(key: &str) -> Result<Vec<u8>, CoreError> {
    let mut buf = Vec::new();
    ciborium::into_writer(&Cbor::Text(key.to_string()), &mut buf)
        .map_err(|e| CoreError::EncodingError(e.to_string()))?;
    Ok(buf)
}

/// A 32-byte Blake3 digest over canonical state.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct StateDigest(pub [u8; 32]);

impl StateDigest {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for StateDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StateDigest({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for StateDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Incrementally hashes labelled canonical values.
pub struct DigestBuilder {
    hasher: blake3::Hasher,
}

impl DigestBuilder {
    pub fn new() -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(DIGEST_DOMAIN);
        Self { hasher }
    }

    /// Feed one labelled value. Labels and bodies are length-prefixed.
    pub fn update<T: Serialize + ?Sized>(&mut self, label: &str, value: &T) -> Result<(), CoreError> {
        let bytes = canonical_bytes(value)?;
        self.hasher.update(&(label.len() as u64).to_le_bytes());
        self.hasher.update(label.as_bytes());
        self.hasher.update(&(bytes.len() as u64).to_le_bytes());
        self.hasher.update(&bytes);
        Ok(())
    }

    pub fn finish(self) -> StateDigest {
        StateDigest(*self.hasher.finalize().as_bytes())
    }
}

impl Default for DigestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_order_does_not_matter() {
        let a: Json = serde_json::from_str(r#"{"b": 1, "a": {"y": true, "x": null}}"#).unwrap();
        let b: Json = serde_json::from_str(r#"{"a": {"x": null, "y": true}, "b": 1}"#).unwrap();
        assert_eq!(canonical_bytes(&a).unwrap(), canonical_bytes(&b).unwrap());
    }

    #[test]
    fn test_shorter_keys_sort_first() {
        let bytes = canonical_bytes(&json!({"aa": 1, "b": 2})).unwrap();
        let decoded: Cbor = ciborium::from_reader(&bytes[..]).unwrap();
        let Cbor::Map(entries) = decoded else {
            panic!("expected map");
        };
        assert_eq!(entries[0].0, Cbor::Text("b".into()));
    }

    #[test]
    fn test_digest_depends_on_labels_and_values() {
        let mut one = DigestBuilder::new();
        one.update("registry", &json!([1, 2])).unwrap();
        let mut two = DigestBuilder::new();
        two.update("assets", &json!([1, 2])).unwrap();
        let mut three = DigestBuilder::new();
        three.update("registry", &json!([1, 2])).unwrap();

        let (one, two, three) = (one.finish(), two.finish(), three.finish());
        assert_ne!(one, two);
        assert_eq!(one, three);
        assert_eq!(one.to_hex().len(), 64);
    }
}
