//! Per-user token cache on disk.
//!
//! File layout (one entry per upper-case username):
//!
//! ```json
//! { "JS05533": { "token_encrypted": "<base64 nonce+ciphertext>", "timestamp": 1700000000, "encrypted": true } }
//! ```
//!
//! The legacy plaintext form `{"token": "...", "password": "...", "timestamp": ...}`
//! is still read. Reads never fail: a missing or unreadable file is an empty cache.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::crypto::{CipherError, TokenCipher};
use crate::config::Config;

const SECONDS_PER_HOUR: i64 = 3600;

/// A cached login for one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialRecord {
    pub token: String,
    pub password: String,
    pub issued_at: Option<DateTime<Utc>>,
}

impl CredentialRecord {
    pub fn new(token: impl Into<String>, password: impl Into<String>, issued_at: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            password: password.into(),
            issued_at: Some(issued_at),
        }
    }

    pub fn is_expired(&self, ttl_hours: u64) -> bool {
        self.is_expired_at(Utc::now(), ttl_hours)
    }

    /// Expired once `now` reaches `issued_at + ttl`; records without a
    /// timestamp are always expired.
    pub fn is_expired_at(&self, now: DateTime<Utc>, ttl_hours: u64) -> bool {
        match self.issued_at {
            None => true,
            Some(issued_at) => {
                let ttl = i64::try_from(ttl_hours)
                    .unwrap_or(i64::MAX / SECONDS_PER_HOUR)
                    .saturating_mul(SECONDS_PER_HOUR);
                now.timestamp() >= issued_at.timestamp().saturating_add(ttl)
            }
        }
    }
}

/// Plaintext sealed inside `token_encrypted`.
#[derive(Serialize, Deserialize)]
struct SealedSecret {
    token: String,
    password: String,
}

/// On-disk form of one entry.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    token_encrypted: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    timestamp: Option<i64>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    encrypted: bool,
}

pub type CredentialMap = BTreeMap<String, CredentialRecord>;

pub struct CredentialStore {
    path: PathBuf,
    cipher: TokenCipher,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>, secret: &str) -> Self {
        Self {
            path: path.into(),
            cipher: TokenCipher::new(secret),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.token_file.clone(), &config.encryption_key)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load every readable record. Entries that fail to decode are skipped.
    pub fn load(&self) -> CredentialMap {
        match self.read_locked() {
            Ok(contents) => self.parse(&contents),
            Err(e) if e.kind() == io::ErrorKind::NotFound => CredentialMap::new(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to read token cache");
                CredentialMap::new()
            }
        }
    }

    /// Replace the whole cache.
    pub fn save(&self, records: &CredentialMap) -> io::Result<()> {
        self.modify(|current| *current = records.clone())
    }

    /// Insert or overwrite the record for `username`.
    pub fn upsert(&self, username: &str, record: CredentialRecord) -> io::Result<()> {
        self.modify(|current| {
            current.insert(username.to_string(), record);
        })
    }

    pub fn remove(&self, username: &str) -> io::Result<()> {
        self.modify(|current| {
            current.remove(username);
        })
    }

    /// Read-modify-write under one exclusive lock.
    pub fn modify<F>(&self, f: F) -> io::Result<()>
    where
        F: FnOnce(&mut CredentialMap),
    {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)?;
        file.lock_exclusive()?;
        let result = self.rewrite(&mut file, f);
        let unlocked = FileExt::unlock(&file);
        result?;
        unlocked
    }

    fn rewrite<F>(&self, file: &mut File, f: F) -> io::Result<()>
    where
        F: FnOnce(&mut CredentialMap),
    {
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;
        let mut records = self.parse(&contents);
        f(&mut records);

        let stored: BTreeMap<&str, StoredRecord> = records
            .iter()
            .map(|(username, record)| (username.as_str(), self.encode(username, record)))
            .collect();
        let serialized = serde_json::to_string(&stored)?;

        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        file.write_all(serialized.as_bytes())?;
        file.flush()
    }

    fn read_locked(&self) -> io::Result<String> {
        let mut file = File::open(&self.path)?;
        FileExt::lock_shared(&file)?;
        let mut contents = String::new();
        let read = file.read_to_string(&mut contents);
        let unlocked = FileExt::unlock(&file);
        read?;
        unlocked?;
        Ok(contents)
    }

    fn parse(&self, contents: &str) -> CredentialMap {
        if contents.trim().is_empty() {
            return CredentialMap::new();
        }
        let entries: BTreeMap<String, Value> = match serde_json::from_str(contents) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Token cache is not valid JSON, ignoring");
                return CredentialMap::new();
            }
        };

        entries
            .into_iter()
            .filter_map(|(username, value)| {
                let stored: StoredRecord = serde_json::from_value(value).ok()?;
                let record = self.decode(&username, stored)?;
                Some((username, record))
            })
            .collect()
    }

    fn decode(&self, username: &str, stored: StoredRecord) -> Option<CredentialRecord> {
        let issued_at = stored
            .timestamp
            .and_then(|ts| Utc.timestamp_opt(ts, 0).single());

        if stored.encrypted || (stored.token.is_none() && stored.token_encrypted.is_some()) {
            let sealed = stored.token_encrypted?;
            let secret = self
                .cipher
                .decrypt(&sealed)
                .and_then(|plain| serde_json::from_slice::<SealedSecret>(&plain).map_err(CipherError::from));
            return match secret {
                Ok(secret) => Some(CredentialRecord {
                    token: secret.token,
                    password: secret.password,
                    issued_at,
                }),
                Err(e) => {
                    debug!(username, error = %e, "Dropping undecryptable token record");
                    None
                }
            };
        }

        let mut token = stored.token?;
        if TokenCipher::looks_sealed(&token) {
            // Older caches sealed only the token itself.
            match self.cipher.decrypt(&token).map(String::from_utf8) {
                Ok(Ok(plain)) => token = plain,
                _ => {
                    debug!(username, "Dropping legacy token that failed to decrypt");
                    return None;
                }
            }
        }
        Some(CredentialRecord {
            token,
            password: stored.password.unwrap_or_default(),
            issued_at,
        })
    }

    fn encode(&self, username: &str, record: &CredentialRecord) -> StoredRecord {
        Self::stored_from(username, record, self.seal(record))
    }

    fn seal(&self, record: &CredentialRecord) -> Result<String, CipherError> {
        let plain = serde_json::to_vec(&SealedSecret {
            token: record.token.clone(),
            password: record.password.clone(),
        })?;
        self.cipher.encrypt(&plain)
    }

    /// Sealed when possible; on failure the record is kept in plaintext
    /// rather than lost.
    fn stored_from(
        username: &str,
        record: &CredentialRecord,
        sealed: Result<String, CipherError>,
    ) -> StoredRecord {
        let timestamp = record.issued_at.map(|t| t.timestamp());
        match sealed {
            Ok(sealed) => StoredRecord {
                token_encrypted: Some(sealed),
                timestamp,
                encrypted: true,
                ..StoredRecord::default()
            },
            Err(e) => {
                warn!(username, error = %e, "Encryption failed, storing token record in plaintext");
                StoredRecord {
                    token: Some(record.token.clone()),
                    password: Some(record.password.clone()),
                    timestamp,
                    ..StoredRecord::default()
                }
            }
        }
    }
}
