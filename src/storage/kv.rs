// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded key-value store backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `kv_values`: key → JSON text
//! - `kv_expiry`: key → expiry as epoch seconds (only for records with a TTL)
//!
//! A record whose expiry is at or before "now" reads as absent. Expired rows
//! are overwritten on the next put and otherwise left in place.

use std::path::Path;

use chrono::Utc;
use redb::{Database, ReadableDatabase, TableDefinition};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::crypto::{self, CryptoError, EncryptedData, MasterKey};

// =============================================================================
// Table Definitions
// =============================================================================

const KV_VALUES: TableDefinition<&str, &str> = TableDefinition::new("kv_values");

const KV_EXPIRY: TableDefinition<&str, i64> = TableDefinition::new("kv_expiry");

/// Default counter window in seconds.
pub const DEFAULT_COUNTER_TTL_SECS: u64 = 3600;

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum KvError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("corrupt record at {key}: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("encryption error: {0}")]
    Crypto(#[from] CryptoError),
}

pub type KvResult<T> = Result<T, KvError>;

#[derive(Debug, Default, Serialize, Deserialize)]
struct Counter {
    count: u64,
}

fn is_expired(expiry: Option<i64>, now: i64) -> bool {
    matches!(expiry, Some(at) if at <= now)
}

// =============================================================================
// KvStore
// =============================================================================

/// Typed JSON persistence over a single redb database.
pub struct KvStore {
    db: Database,
}

impl KvStore {
    /// Open (or create) the store at the given path. The parent directory
    /// must exist.
    pub fn open(path: &Path) -> KvResult<Self> {
        Self::init(Database::create(path)?)
    }

    /// Volatile store for tests and throwaway runs.
    pub fn in_memory() -> KvResult<Self> {
        let db = Database::builder().create_with_backend(redb::backends::InMemoryBackend::new())?;
        Self::init(db)
    }

    fn init(db: Database) -> KvResult<Self> {
        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(KV_VALUES)?;
            let _ = write_txn.open_table(KV_EXPIRY)?;
        }
        write_txn.commit()?;
        Ok(Self { db })
    }

    // -------------------------------------------------------------------------
    // Raw access
    // -------------------------------------------------------------------------

    fn get_raw(&self, key: &str) -> KvResult<Option<String>> {
        let read_txn = self.db.begin_read()?;
        let values = read_txn.open_table(KV_VALUES)?;
        let expiry = read_txn.open_table(KV_EXPIRY)?;

        let expires_at = expiry.get(key)?.map(|v| v.value());
        if is_expired(expires_at, Utc::now().timestamp()) {
            return Ok(None);
        }
        Ok(values.get(key)?.map(|v| v.value().to_string()))
    }

    fn put_raw(&self, key: &str, value: &str, ttl_secs: Option<u64>) -> KvResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut values = write_txn.open_table(KV_VALUES)?;
            let mut expiry = write_txn.open_table(KV_EXPIRY)?;
            values.insert(key, value)?;
            match ttl_secs {
                Some(ttl) => {
                    let at = Utc::now().timestamp().saturating_add(ttl as i64);
                    expiry.insert(key, at)?;
                }
                None => {
                    expiry.remove(key)?;
                }
            }
        }
        write_txn.commit()?;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // JSON records
    // -------------------------------------------------------------------------

    /// Serialize `value` and store it, optionally expiring after `ttl_secs`.
    pub fn put_json<T: Serialize>(&self, key: &str, value: &T, ttl_secs: Option<u64>) -> KvResult<()> {
        let json = serde_json::to_string(value)?;
        self.put_raw(key, &json, ttl_secs)
    }

    /// Lenient read: malformed JSON is logged and reported as absent.
    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> KvResult<Option<T>> {
        let Some(raw) = self.get_raw(key)? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!(key = %key, error = %e, "Malformed JSON in KV store, treating as absent");
                Ok(None)
            }
        }
    }

    /// Strict read for tagged records: parse failure is [`KvError::Corrupt`].
    pub fn get_record<T: DeserializeOwned>(&self, key: &str) -> KvResult<Option<T>> {
        let Some(raw) = self.get_raw(key)? else {
            return Ok(None);
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| KvError::Corrupt {
                key: key.to_string(),
                source,
            })
    }

    pub fn exists(&self, key: &str) -> KvResult<bool> {
        Ok(self.get_raw(key)?.is_some())
    }

    pub fn delete(&self, key: &str) -> KvResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut values = write_txn.open_table(KV_VALUES)?;
            let mut expiry = write_txn.open_table(KV_EXPIRY)?;
            values.remove(key)?;
            expiry.remove(key)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Live keys starting with `prefix`, in key order.
    pub fn scan_prefix(&self, prefix: &str) -> KvResult<Vec<String>> {
        let read_txn = self.db.begin_read()?;
        let values = read_txn.open_table(KV_VALUES)?;
        let expiry = read_txn.open_table(KV_EXPIRY)?;
        let now = Utc::now().timestamp();

        let mut keys = Vec::new();
        for entry in values.range(prefix..)? {
            let (key, _) = entry?;
            let key = key.value();
            if !key.starts_with(prefix) {
                break;
            }
            let expires_at = expiry.get(key)?.map(|v| v.value());
            if !is_expired(expires_at, now) {
                keys.push(key.to_string());
            }
        }
        Ok(keys)
    }

    // -------------------------------------------------------------------------
    // Encrypted values
    // -------------------------------------------------------------------------

    /// Encrypt `token` under `master_key` and store the [`EncryptedData`].
    pub fn store_encrypted_token(&self, key: &str, token: &str, master_key: &MasterKey) -> KvResult<()> {
        let encrypted = crypto::encrypt(token, master_key)?;
        self.put_json(key, &encrypted, None)
    }

    /// Load and decrypt a token. Decryption failure reads as absent.
    pub fn get_encrypted_token(&self, key: &str, master_key: &MasterKey) -> KvResult<Option<String>> {
        let Some(encrypted) = self.get_json::<EncryptedData>(key)? else {
            return Ok(None);
        };
        match crypto::decrypt(&encrypted, master_key) {
            Ok(token) => Ok(Some(token)),
            Err(e) => {
                warn!(key = %key, error = %e, "Stored token could not be decrypted");
                Ok(None)
            }
        }
    }

    // -------------------------------------------------------------------------
    // Counters
    // -------------------------------------------------------------------------

    /// Increment `{count}` at `key`. Every increment resets the TTL.
    pub fn increment_counter(&self, key: &str, ttl_secs: u64) -> KvResult<u64> {
        let current = self.get_json::<Counter>(key)?.unwrap_or_default();
        let next = Counter {
            count: current.count + 1,
        };
        self.put_json(key, &next, Some(ttl_secs))?;
        Ok(next.count)
    }

    pub fn get_counter(&self, key: &str) -> KvResult<u64> {
        Ok(self.get_json::<Counter>(key)?.map(|c| c.count).unwrap_or(0))
    }

    pub fn reset_counter(&self, key: &str) -> KvResult<()> {
        self.delete(key)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> KvStore {
        KvStore::in_memory().unwrap()
    }

    fn test_key() -> MasterKey {
        MasterKey::from_hex(&"42".repeat(32)).unwrap()
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Record {
        name: String,
        n: u32,
    }

    #[test]
    fn put_and_get_json() {
        let kv = store();
        let record = Record {
            name: "alice".into(),
            n: 3,
        };
        kv.put_json("rec:1", &record, None).unwrap();

        assert_eq!(kv.get_json::<Record>("rec:1").unwrap(), Some(record));
        assert!(kv.exists("rec:1").unwrap());
        assert!(!kv.exists("rec:2").unwrap());
    }

    #[test]
    fn malformed_json_is_absent_but_strict_read_errors() {
        let kv = store();
        kv.put_json("rec:1", &json!({"unexpected": true}), None).unwrap();

        assert_eq!(kv.get_json::<Record>("rec:1").unwrap(), None);
        assert!(matches!(
            kv.get_record::<Record>("rec:1"),
            Err(KvError::Corrupt { .. })
        ));
        assert!(kv.get_record::<Record>("missing").unwrap().is_none());
    }

    #[test]
    fn expired_records_read_as_absent() {
        let kv = store();
        kv.put_json("short", &json!(1), Some(0)).unwrap();
        kv.put_json("long", &json!(2), Some(3600)).unwrap();

        assert!(!kv.exists("short").unwrap());
        assert!(kv.exists("long").unwrap());
        assert_eq!(kv.scan_prefix("").unwrap(), vec!["long".to_string()]);
    }

    #[test]
    fn put_without_ttl_clears_previous_expiry() {
        let kv = store();
        kv.put_json("k", &json!(1), Some(0)).unwrap();
        kv.put_json("k", &json!(2), None).unwrap();
        assert_eq!(kv.get_json::<i32>("k").unwrap(), Some(2));
    }

    #[test]
    fn delete_removes_value() {
        let kv = store();
        kv.put_json("k", &json!("v"), Some(60)).unwrap();
        kv.delete("k").unwrap();
        assert!(!kv.exists("k").unwrap());
        kv.delete("never-existed").unwrap();
    }

    #[test]
    fn scan_prefix_only_returns_matching_keys() {
        let kv = store();
        for key in ["user_session:a", "user_session:b", "token:x", "user_sessions"] {
            kv.put_json(key, &json!({}), None).unwrap();
        }
        assert_eq!(
            kv.scan_prefix("user_session:").unwrap(),
            vec!["user_session:a".to_string(), "user_session:b".to_string()]
        );
    }

    #[test]
    fn encrypted_token_round_trip() {
        let kv = store();
        let key = test_key();
        kv.store_encrypted_token("github_token:u1", "gho_secret", &key).unwrap();

        let raw = kv.get_json::<EncryptedData>("github_token:u1").unwrap().unwrap();
        assert!(!raw.ciphertext.contains("gho_secret"));

        assert_eq!(
            kv.get_encrypted_token("github_token:u1", &key).unwrap(),
            Some("gho_secret".to_string())
        );
    }

    #[test]
    fn encrypted_token_under_other_key_reads_as_absent() {
        let kv = store();
        kv.store_encrypted_token("t", "value", &test_key()).unwrap();
        let other = MasterKey::from_hex(&"17".repeat(32)).unwrap();
        assert_eq!(kv.get_encrypted_token("t", &other).unwrap(), None);
    }

    #[test]
    fn counter_increments_and_resets() {
        let kv = store();
        assert_eq!(kv.get_counter("c").unwrap(), 0);
        assert_eq!(kv.increment_counter("c", 3600).unwrap(), 1);
        assert_eq!(kv.increment_counter("c", 3600).unwrap(), 2);
        assert_eq!(kv.get_counter("c").unwrap(), 2);

        kv.reset_counter("c").unwrap();
        assert_eq!(kv.get_counter("c").unwrap(), 0);
    }

    #[test]
    fn expired_counter_starts_over() {
        let kv = store();
        kv.increment_counter("c", 0).unwrap();
        assert_eq!(kv.get_counter("c").unwrap(), 0);
        assert_eq!(kv.increment_counter("c", 3600).unwrap(), 1);
    }

    #[test]
    fn open_on_disk_persists_across_handles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kv.redb");
        {
            let kv = KvStore::open(&path).unwrap();
            kv.put_json("k", &json!("v"), None).unwrap();
        }
        let kv = KvStore::open(&path).unwrap();
        assert_eq!(kv.get_json::<String>("k").unwrap(), Some("v".to_string()));
    }

    #[test]
    fn open_reports_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("kv.redb");
        assert!(KvStore::open(&path).is_err());
    }
}
