//! Redb-backed durable storage implementation.
//!
//! Uses Redb's ACID transactions with Copy-on-Write for crash safety.
//! Every mutation is a single write transaction, so a crash leaves either the
//! whole change or none of it.

use std::{path::Path, sync::Arc};

use redb::{Database, ReadableTable, TableDefinition};
use sealform_core::{
    AuditEntry, AuditLog, E2eeResponse, KeyStore, ProjectKey, ResponseStore, Scale, ScaleStore,
    StorageError,
};
use serde::{Serialize, de::DeserializeOwned};

/// Table: scales
/// Key: scale_id bytes
/// Value: CBOR-encoded Scale
const SCALES: TableDefinition<&[u8], &[u8]> = TableDefinition::new("scales");

/// Table: project_keys
/// Key: scoped key (scale_id, insertion seq)
/// Value: CBOR-encoded ProjectKey
const PROJECT_KEYS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("project_keys");

/// Table: responses
/// Key: response_id bytes
/// Value: CBOR-encoded E2eeResponse
const RESPONSES: TableDefinition<&[u8], &[u8]> = TableDefinition::new("responses");

/// Table: scale_responses
/// Key: scoped key (scale_id, submission seq)
/// Value: response_id bytes
const SCALE_RESPONSES: TableDefinition<&[u8], &[u8]> = TableDefinition::new("scale_responses");

/// Table: audit
/// Key: seq as big-endian bytes [8 bytes]
/// Value: CBOR-encoded AuditEntry
const AUDIT: TableDefinition<&[u8], &[u8]> = TableDefinition::new("audit");

/// Durable storage backed by Redb.
///
/// Thread-safe through Redb's internal locking. Clone is cheap (Arc).
#[derive(Clone)]
pub struct RedbStorage {
    db: Arc<Database>,
}

impl RedbStorage {
    /// Open or create a Redb database at the given path.
    ///
    /// Creates all tables if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Io` if the database cannot be opened or created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let db = Database::create(path.as_ref()).map_err(io_err)?;

        let txn = db.begin_write().map_err(io_err)?;
        {
            let _ = txn.open_table(SCALES).map_err(io_err)?;
            let _ = txn.open_table(PROJECT_KEYS).map_err(io_err)?;
            let _ = txn.open_table(RESPONSES).map_err(io_err)?;
            let _ = txn.open_table(SCALE_RESPONSES).map_err(io_err)?;
            let _ = txn.open_table(AUDIT).map_err(io_err)?;
        }
        txn.commit().map_err(io_err)?;

        Ok(Self { db: Arc::new(db) })
    }
}

impl ScaleStore for RedbStorage {
    fn get_scale(&self, scale_id: &str) -> Result<Option<Scale>, StorageError> {
        let txn = self.db.begin_read().map_err(io_err)?;
        let table = txn.open_table(SCALES).map_err(io_err)?;

        match table.get(scale_id.as_bytes()).map_err(io_err)? {
            Some(value) => Ok(Some(decode(value.value())?)),
            None => Ok(None),
        }
    }

    fn put_scale(&self, scale: &Scale) -> Result<(), StorageError> {
        let bytes = encode(scale)?;

        let txn = self.db.begin_write().map_err(io_err)?;
        {
            let mut table = txn.open_table(SCALES).map_err(io_err)?;
            table.insert(scale.id.as_bytes(), bytes.as_slice()).map_err(io_err)?;
        }
        txn.commit().map_err(io_err)?;

        Ok(())
    }
}

impl KeyStore for RedbStorage {
    fn add_project_key(&self, key: &ProjectKey) -> Result<(), StorageError> {
        let bytes = encode(key)?;

        let txn = self.db.begin_write().map_err(io_err)?;
        {
            let mut table = txn.open_table(PROJECT_KEYS).map_err(io_err)?;

            let existing: Vec<(Vec<u8>, ProjectKey)> = scoped_entries(&table, &key.scale_id)?;
            if existing.iter().any(|(_, k)| k.fingerprint == key.fingerprint) {
                return Err(StorageError::Duplicate {
                    kind: "project key",
                    id: key.fingerprint.clone(),
                });
            }

            let seq = next_seq(&table, &key.scale_id)?;
            let db_key = encode_scoped_key(&key.scale_id, seq)?;
            table.insert(db_key.as_slice(), bytes.as_slice()).map_err(io_err)?;
        }
        txn.commit().map_err(io_err)?;

        Ok(())
    }

    fn list_project_keys(&self, scale_id: &str) -> Result<Vec<ProjectKey>, StorageError> {
        let txn = self.db.begin_read().map_err(io_err)?;
        let table = txn.open_table(PROJECT_KEYS).map_err(io_err)?;

        let entries: Vec<(Vec<u8>, ProjectKey)> = scoped_entries(&table, scale_id)?;
        Ok(entries.into_iter().map(|(_, key)| key).collect())
    }

    fn disable_project_key(
        &self,
        scale_id: &str,
        fingerprint: &str,
    ) -> Result<bool, StorageError> {
        let txn = self.db.begin_write().map_err(io_err)?;
        let found = {
            let mut table = txn.open_table(PROJECT_KEYS).map_err(io_err)?;

            let entries: Vec<(Vec<u8>, ProjectKey)> = scoped_entries(&table, scale_id)?;
            match entries.into_iter().find(|(_, k)| k.fingerprint == fingerprint) {
                Some((db_key, mut key)) => {
                    key.disabled = true;
                    let bytes = encode(&key)?;
                    table.insert(db_key.as_slice(), bytes.as_slice()).map_err(io_err)?;
                    true
                },
                None => false,
            }
        };
        txn.commit().map_err(io_err)?;

        Ok(found)
    }
}

impl ResponseStore for RedbStorage {
    fn add_e2ee_response(&self, response: &E2eeResponse) -> Result<(), StorageError> {
        let bytes = encode(response)?;
        let id = response.response_id.as_bytes();

        let txn = self.db.begin_write().map_err(io_err)?;
        {
            let mut responses = txn.open_table(RESPONSES).map_err(io_err)?;
            if responses.get(id).map_err(io_err)?.is_some() {
                return Err(StorageError::Duplicate {
                    kind: "response",
                    id: response.response_id.clone(),
                });
            }
            responses.insert(id, bytes.as_slice()).map_err(io_err)?;

            let mut index = txn.open_table(SCALE_RESPONSES).map_err(io_err)?;
            let seq = next_seq(&index, &response.scale_id)?;
            let db_key = encode_scoped_key(&response.scale_id, seq)?;
            index.insert(db_key.as_slice(), id).map_err(io_err)?;
        }
        txn.commit().map_err(io_err)?;

        Ok(())
    }

    fn list_e2ee_responses(&self, scale_id: &str) -> Result<Vec<E2eeResponse>, StorageError> {
        let txn = self.db.begin_read().map_err(io_err)?;
        let index = txn.open_table(SCALE_RESPONSES).map_err(io_err)?;
        let responses = txn.open_table(RESPONSES).map_err(io_err)?;

        let (start, end) = scope_bounds(scale_id)?;
        let mut out = Vec::new();
        for entry in index.range(start.as_slice()..=end.as_slice()).map_err(io_err)? {
            let (_, id) = entry.map_err(io_err)?;
            if let Some(value) = responses.get(id.value()).map_err(io_err)? {
                out.push(decode(value.value())?);
            }
        }

        Ok(out)
    }

    fn append_e2ee_enc_dek(
        &self,
        response_id: &str,
        wrapped_dek: &str,
    ) -> Result<bool, StorageError> {
        let txn = self.db.begin_write().map_err(io_err)?;
        let found = {
            let mut table = txn.open_table(RESPONSES).map_err(io_err)?;

            let current: Option<E2eeResponse> = table
                .get(response_id.as_bytes())
                .map_err(io_err)?
                .map(|value| decode(value.value()))
                .transpose()?;

            match current {
                Some(mut response) => {
                    if !response.enc_dek.iter().any(|existing| existing == wrapped_dek) {
                        response.enc_dek.push(wrapped_dek.to_string());
                        let bytes = encode(&response)?;
                        table.insert(response_id.as_bytes(), bytes.as_slice()).map_err(io_err)?;
                    }
                    true
                },
                None => false,
            }
        };
        txn.commit().map_err(io_err)?;

        Ok(found)
    }

    fn get_e2ee_response(&self, response_id: &str) -> Result<Option<E2eeResponse>, StorageError> {
        let txn = self.db.begin_read().map_err(io_err)?;
        let table = txn.open_table(RESPONSES).map_err(io_err)?;

        match table.get(response_id.as_bytes()).map_err(io_err)? {
            Some(value) => Ok(Some(decode(value.value())?)),
            None => Ok(None),
        }
    }

    fn delete_e2ee_response(&self, response_id: &str) -> Result<bool, StorageError> {
        let txn = self.db.begin_write().map_err(io_err)?;
        let found = {
            let mut responses = txn.open_table(RESPONSES).map_err(io_err)?;
            let removed: Option<E2eeResponse> = responses
                .remove(response_id.as_bytes())
                .map_err(io_err)?
                .map(|value| decode(value.value()))
                .transpose()?;

            match removed {
                Some(response) => {
                    let mut index = txn.open_table(SCALE_RESPONSES).map_err(io_err)?;
                    let (start, end) = scope_bounds(&response.scale_id)?;

                    let mut stale = Vec::new();
                    for entry in index.range(start.as_slice()..=end.as_slice()).map_err(io_err)? {
                        let (key, id) = entry.map_err(io_err)?;
                        if id.value() == response_id.as_bytes() {
                            stale.push(key.value().to_vec());
                        }
                    }
                    for key in stale {
                        index.remove(key.as_slice()).map_err(io_err)?;
                    }
                    true
                },
                None => false,
            }
        };
        txn.commit().map_err(io_err)?;

        Ok(found)
    }
}

impl AuditLog for RedbStorage {
    fn add_audit(&self, entry: &AuditEntry) -> Result<(), StorageError> {
        let bytes = encode(entry)?;

        let txn = self.db.begin_write().map_err(io_err)?;
        {
            let mut table = txn.open_table(AUDIT).map_err(io_err)?;

            let seq = {
                let mut iter = table.iter().map_err(io_err)?;
                match iter.next_back() {
                    Some(last) => {
                        let (key, _) = last.map_err(io_err)?;
                        decode_seq(key.value())? + 1
                    },
                    None => 0,
                }
            };

            table.insert(seq.to_be_bytes().as_slice(), bytes.as_slice()).map_err(io_err)?;
        }
        txn.commit().map_err(io_err)?;

        Ok(())
    }

    fn list_audit(&self, limit: usize) -> Result<Vec<AuditEntry>, StorageError> {
        let txn = self.db.begin_read().map_err(io_err)?;
        let table = txn.open_table(AUDIT).map_err(io_err)?;

        let mut entries = Vec::with_capacity(limit.min(1024));
        for entry in table.iter().map_err(io_err)?.rev().take(limit) {
            let (_, value) = entry.map_err(io_err)?;
            entries.push(decode(value.value())?);
        }
        entries.reverse();

        Ok(entries)
    }
}

/// Decode every record of one scope, paired with its database key.
fn scoped_entries<T, V>(table: &T, scope: &str) -> Result<Vec<(Vec<u8>, V)>, StorageError>
where
    T: ReadableTable<&'static [u8], &'static [u8]>,
    V: DeserializeOwned,
{
    let (start, end) = scope_bounds(scope)?;

    let mut out = Vec::new();
    for entry in table.range(start.as_slice()..=end.as_slice()).map_err(io_err)? {
        let (key, value) = entry.map_err(io_err)?;
        out.push((key.value().to_vec(), decode(value.value())?));
    }
    Ok(out)
}

/// Next insertion seq within a scope (0 for an empty scope).
fn next_seq<T>(table: &T, scope: &str) -> Result<u64, StorageError>
where
    T: ReadableTable<&'static [u8], &'static [u8]>,
{
    let (start, end) = scope_bounds(scope)?;

    let mut range = table.range(start.as_slice()..=end.as_slice()).map_err(io_err)?;
    match range.next_back() {
        Some(last) => {
            let (key, _) = last.map_err(io_err)?;
            Ok(decode_seq(key.value())? + 1)
        },
        None => Ok(0),
    }
}

/// Encode (scope, seq) as a variable-length key.
///
/// Layout: [scope len: 2 bytes BE][scope bytes][seq: 8 bytes BE]
/// The length prefix keeps one scope's keys contiguous and stops a scope
/// from matching the prefix of a longer one. Within a scope, lexicographic
/// order matches seq order.
fn encode_scoped_key(scope: &str, seq: u64) -> Result<Vec<u8>, StorageError> {
    let len = u16::try_from(scope.len())
        .map_err(|_| StorageError::Serialization(format!("scope too long: {}", scope.len())))?;

    let mut key = Vec::with_capacity(2 + scope.len() + 8);
    key.extend_from_slice(&len.to_be_bytes());
    key.extend_from_slice(scope.as_bytes());
    key.extend_from_slice(&seq.to_be_bytes());
    Ok(key)
}

/// Inclusive key range covering every seq of `scope`.
fn scope_bounds(scope: &str) -> Result<(Vec<u8>, Vec<u8>), StorageError> {
    Ok((encode_scoped_key(scope, 0)?, encode_scoped_key(scope, u64::MAX)?))
}

/// Trailing 8-byte big-endian seq of a scoped or audit key.
fn decode_seq(key: &[u8]) -> Result<u64, StorageError> {
    let tail = key
        .len()
        .checked_sub(8)
        .and_then(|start| <[u8; 8]>::try_from(&key[start..]).ok())
        .ok_or_else(|| StorageError::Serialization(format!("key too short: {}", key.len())))?;
    Ok(u64::from_be_bytes(tail))
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StorageError> {
    let mut bytes = Vec::new();
    ciborium::into_writer(value, &mut bytes)
        .map_err(|e| StorageError::Serialization(e.to_string()))?;
    Ok(bytes)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StorageError> {
    ciborium::from_reader(bytes).map_err(|e| StorageError::Serialization(e.to_string()))
}

fn io_err(err: impl std::fmt::Display) -> StorageError {
    StorageError::Io(err.to_string())
}

#[cfg(test)]
mod tests {
    use sealform_core::AuditAction;
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn test_scoped_key_encoding() {
        let key = encode_scoped_key("S1", 42).unwrap();
        assert_eq!(key.len(), 2 + 2 + 8);
        assert_eq!(&key[..2], &[0, 2]);
        assert_eq!(&key[2..4], b"S1");
        assert_eq!(decode_seq(&key).unwrap(), 42);
    }

    #[test]
    fn test_scoped_keys_order_by_seq() {
        let a = encode_scoped_key("S1", 1).unwrap();
        let b = encode_scoped_key("S1", 256).unwrap();
        assert!(a < b);
    }

    #[test]
    fn test_scope_is_not_a_prefix_of_longer_scope() {
        let (start, end) = scope_bounds("S1").unwrap();
        let other = encode_scoped_key("S10", 0).unwrap();
        assert!(!(start.as_slice()..=end.as_slice()).contains(&other.as_slice()));
    }

    #[test]
    fn test_decode_seq_rejects_short_key() {
        assert!(matches!(decode_seq(&[1, 2, 3]), Err(StorageError::Serialization(_))));
    }

    #[test]
    fn test_scale_roundtrip() {
        let dir = tempdir().unwrap();
        let storage = RedbStorage::open(dir.path().join("test.redb")).unwrap();

        let scale = Scale {
            id: "S1".into(),
            tenant_id: "T1".into(),
            name: "Wellbeing".into(),
            turnstile_enabled: true,
        };
        storage.put_scale(&scale).unwrap();

        assert_eq!(storage.get_scale("S1").unwrap(), Some(scale));
        assert_eq!(storage.get_scale("S2").unwrap(), None);
    }

    #[test]
    fn test_audit_sequence_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.redb");
        let entry = |note: &str| AuditEntry {
            time: 1,
            actor: "admin".into(),
            action: AuditAction::RewrapSubmit,
            target: "scale:S1".into(),
            note: note.into(),
        };

        {
            let storage = RedbStorage::open(&path).unwrap();
            storage.add_audit(&entry("first")).unwrap();
        }

        let storage = RedbStorage::open(&path).unwrap();
        storage.add_audit(&entry("second")).unwrap();

        let notes: Vec<_> = storage.list_audit(10).unwrap().into_iter().map(|e| e.note).collect();
        assert_eq!(notes, ["first", "second"]);
    }
}
