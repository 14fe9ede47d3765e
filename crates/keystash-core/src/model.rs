//! Records, key metadata and the snapshot handed to persistence adapters.

use std::{collections::HashMap, fmt};

use serde::{
    de::{MapAccess, Visitor},
    ser::SerializeMap,
    Deserialize, Deserializer, Serialize, Serializer,
};
use serde_json::Value;

use crate::error::{Result, StoreError};

/// Current snapshot format tag.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Authenticated cipher used to seal a record's secret.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CipherSuite {
    /// XChaCha20-Poly1305; the 24-byte nonce doubles as the KDF salt.
    #[default]
    XChaCha20Poly1305,
    /// AES-256-GCM; a 16-byte salt feeds the KDF, which yields key and IV.
    Aes256Gcm,
}

impl CipherSuite {
    /// Length of the random salt/nonce stored in metadata.
    pub const fn nonce_len(self) -> usize {
        match self {
            Self::XChaCha20Poly1305 => 24,
            Self::Aes256Gcm => 16,
        }
    }

    /// Number of bytes the KDF must produce for this suite.
    pub const fn derived_len(self) -> usize {
        match self {
            Self::XChaCha20Poly1305 => 32,
            Self::Aes256Gcm => 32 + 12,
        }
    }
}

impl fmt::Display for CipherSuite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::XChaCha20Poly1305 => f.write_str("xchacha20poly1305"),
            Self::Aes256Gcm => f.write_str("aes256gcm"),
        }
    }
}

/// Hash function behind PBKDF2-HMAC.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    #[default]
    Sha256,
    Sha512,
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sha256 => f.write_str("sha256"),
            Self::Sha512 => f.write_str("sha512"),
        }
    }
}

/// Everything needed to re-derive the key that sealed a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyMetadata {
    #[serde(default)]
    pub cipher: CipherSuite,
    #[serde(default)]
    pub hash: HashAlgorithm,
    pub iterations: u32,
    /// Base64 salt/nonce.
    pub nonce: String,
}

/// One stored entry: ciphertext, the metadata that produced it, and an
/// optional unencrypted payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub private: String,
    pub metadata: KeyMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public: Option<Value>,
}

/// Insertion-ordered map of record ID to record.
///
/// Serializes as a JSON object whose keys keep insertion order, so the
/// order survives a save/load cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordMap {
    order: Vec<String>,
    entries: HashMap<String, Record>,
}

impl RecordMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&Record> {
        self.entries.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Record> {
        self.entries.get_mut(id)
    }

    /// Insert or replace; a replaced record keeps its position.
    pub fn insert(&mut self, id: impl Into<String>, record: Record) -> Option<Record> {
        let id = id.into();
        if !self.entries.contains_key(&id) {
            self.order.push(id.clone());
        }
        self.entries.insert(id, record)
    }

    pub fn remove(&mut self, id: &str) -> Option<Record> {
        let removed = self.entries.remove(id)?;
        self.order.retain(|existing| existing != id);
        Some(removed)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Record)> {
        self.order
            .iter()
            .filter_map(|id| self.entries.get(id).map(|record| (id.as_str(), record)))
    }
}

impl Serialize for RecordMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (id, record) in self.iter() {
            map.serialize_entry(id, record)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for RecordMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct RecordMapVisitor;

        impl<'de> Visitor<'de> for RecordMapVisitor {
            type Value = RecordMap;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of record id to record")
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut access: A,
            ) -> std::result::Result<RecordMap, A::Error> {
                let mut records = RecordMap::new();
                while let Some((id, record)) = access.next_entry::<String, Record>()? {
                    records.insert(id, record);
                }
                Ok(records)
            }
        }

        deserializer.deserialize_map(RecordMapVisitor)
    }
}

/// Full store state at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    pub records: RecordMap,
}

impl Snapshot {
    pub fn new(records: RecordMap) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            records,
        }
    }

    pub fn encode(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| StoreError::Serialization {
            reason: format!("snapshot: {e}"),
        })
    }

    /// Parse persisted text, rejecting unknown format versions.
    pub fn decode(contents: &str) -> Result<Self> {
        let snapshot: Snapshot =
            serde_json::from_str(contents).map_err(|e| StoreError::InvalidSnapshot {
                reason: e.to_string(),
            })?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(StoreError::InvalidSnapshot {
                reason: format!(
                    "unsupported version {} (expected {SNAPSHOT_VERSION})",
                    snapshot.version
                ),
            });
        }
        Ok(snapshot)
    }
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::new(RecordMap::new())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn record(tag: &str) -> Record {
        Record {
            private: format!("cipher-{tag}"),
            metadata: KeyMetadata {
                cipher: CipherSuite::XChaCha20Poly1305,
                hash: HashAlgorithm::Sha256,
                iterations: 10_000,
                nonce: "AAAA".into(),
            },
            public: None,
        }
    }

    #[test]
    fn keeps_insertion_order_through_serde() {
        let mut records = RecordMap::new();
        records.insert("zeta", record("z"));
        records.insert("alpha", record("a"));
        records.insert("mid", record("m"));
        records.insert("zeta", record("z2"));

        let text = Snapshot::new(records).encode().expect("encode");
        let decoded = Snapshot::decode(&text).expect("decode");

        let ids: Vec<_> = decoded.records.ids().collect();
        assert_eq!(ids, ["zeta", "alpha", "mid"]);
        assert_eq!(decoded.records.get("zeta").unwrap().private, "cipher-z2");
    }

    #[test]
    fn remove_drops_id_from_order() {
        let mut records = RecordMap::new();
        records.insert("a", record("a"));
        records.insert("b", record("b"));
        assert!(records.remove("a").is_some());
        assert!(records.remove("a").is_none());
        assert_eq!(records.ids().collect::<Vec<_>>(), ["b"]);
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn metadata_defaults_when_fields_missing() {
        let value = json!({ "iterations": 10000, "nonce": "bm9uY2U=" });
        let metadata: KeyMetadata = serde_json::from_value(value).expect("parse");
        assert_eq!(metadata.cipher, CipherSuite::XChaCha20Poly1305);
        assert_eq!(metadata.hash, HashAlgorithm::Sha256);
    }

    #[test]
    fn wire_format_uses_unified_field_names() {
        let mut records = RecordMap::new();
        let mut entry = record("w");
        entry.public = Some(json!({ "publicKey": "publicKey" }));
        records.insert("walletID", entry);
        records.insert("bare", record("b"));

        let value = serde_json::to_value(Snapshot::new(records)).expect("to value");
        assert_eq!(value["version"], 1);
        let wallet = &value["records"]["walletID"];
        assert_eq!(wallet["private"], "cipher-w");
        assert_eq!(wallet["metadata"]["cipher"], "xchacha20poly1305");
        assert_eq!(wallet["metadata"]["hash"], "sha256");
        assert_eq!(wallet["metadata"]["iterations"], 10000);
        assert_eq!(wallet["public"]["publicKey"], "publicKey");
        assert!(value["records"]["bare"].get("public").is_none());
    }

    #[test]
    fn rejects_unknown_versions_and_garbage() {
        let err = Snapshot::decode(r#"{ "version": 2, "records": {} }"#).expect_err("version");
        assert!(matches!(err, StoreError::InvalidSnapshot { .. }));

        let err = Snapshot::decode("not json").expect_err("garbage");
        assert!(matches!(err, StoreError::InvalidSnapshot { .. }));
    }
}
