// SPDX-License-Identifier: EUPL-1.2
// Copyright (c) 2026 Benjamin Küttner <benjamin.kuettner@icloud.com>

//! Encrypted record wallet.
//!
//! Records are grouped by category (`did`, `key`, `issuer`, `verifier`,
//! `setting`, sessions) and stored in a single SQLite file. Every value is
//! sealed with ChaCha20-Poly1305 under an Argon2id key derived from the
//! wallet passphrase. Tags live in their own indexed table, in clear text,
//! so lookups filter in SQL.
//!
//! Sealed value layout: `nonce (12 bytes) || aead-ciphertext`.

mod seal;

use chrono::{DateTime, Utc};
use rusqlite::types::ToSql;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, PoisonError};

pub use seal::KdfParams;
use seal::Sealer;

pub type Tags = BTreeMap<String, String>;

#[derive(Debug, thiserror::Error)]
pub enum WalletError {
    #[error("invalid wallet key")]
    InvalidKey,
    #[error("record {category}/{name} already exists")]
    Duplicate { category: String, name: String },
    #[error("wallet sealing failed: {0}")]
    Sealing(String),
    #[error("wallet storage error: {0}")]
    Storage(#[from] rusqlite::Error),
    #[error("wallet record encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("wallet I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type WalletResult<T> = Result<T, WalletError>;

/// How a write treats an existing record.
enum WriteMode<'a> {
    Insert,
    Upsert,
    /// Overwrite only while tag `name` holds one of `allowed`.
    IfTag { name: &'a str, allowed: &'a [&'a str] },
}

pub struct Wallet {
    conn: Mutex<Connection>,
    sealer: Sealer,
}

impl std::fmt::Debug for Wallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wallet").finish_non_exhaustive()
    }
}

fn metadata(conn: &Connection, name: &str) -> WalletResult<Option<Vec<u8>>> {
    Ok(conn
        .query_row("SELECT value FROM metadata WHERE name = ?1", params![name], |row| {
            row.get(0)
        })
        .optional()?)
}

fn set_metadata(conn: &Connection, name: &str, value: &[u8]) -> WalletResult<()> {
    conn.execute(
        "INSERT INTO metadata (name, value) VALUES (?1, ?2)",
        params![name, value],
    )?;
    Ok(())
}

impl Wallet {
    /// Open (or create) the wallet file at `path`.
    pub fn open(path: &Path, key: &str) -> WalletResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::init(Connection::open(path)?, key)
    }

    pub fn open_in_memory(key: &str) -> WalletResult<Self> {
        Self::init(Connection::open_in_memory()?, key)
    }

    fn init(conn: Connection, key: &str) -> WalletResult<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS metadata (
                name  TEXT PRIMARY KEY,
                value BLOB NOT NULL
            );
            CREATE TABLE IF NOT EXISTS records (
                category   TEXT NOT NULL,
                name       TEXT NOT NULL,
                value      BLOB NOT NULL,
                expires_at INTEGER,
                PRIMARY KEY (category, name)
            );
            CREATE TABLE IF NOT EXISTS record_tags (
                category  TEXT NOT NULL,
                name      TEXT NOT NULL,
                tag_name  TEXT NOT NULL,
                tag_value TEXT NOT NULL,
                PRIMARY KEY (category, name, tag_name)
            );
            CREATE INDEX IF NOT EXISTS record_tags_lookup
                ON record_tags (category, tag_name, tag_value);
            CREATE INDEX IF NOT EXISTS records_expiry
                ON records (category, expires_at);",
        )?;

        let salt = match metadata(&conn, "salt")? {
            Some(salt) => salt,
            None => {
                let salt = seal::random_salt().to_vec();
                set_metadata(&conn, "salt", &salt)?;
                salt
            }
        };
        let kdf = match metadata(&conn, "kdf")? {
            Some(raw) => serde_json::from_slice(&raw)?,
            None => {
                let kdf = KdfParams::default();
                set_metadata(&conn, "kdf", &serde_json::to_vec(&kdf)?)?;
                kdf
            }
        };

        let sealer = Sealer::derive(key, &salt, &kdf)?;

        match metadata(&conn, "check")? {
            Some(sealed) => {
                let opened = sealer.open(&sealed).map_err(|_| WalletError::InvalidKey)?;
                if opened != seal::CHECK_VALUE {
                    return Err(WalletError::InvalidKey);
                }
            }
            None => set_metadata(&conn, "check", &sealer.seal(seal::CHECK_VALUE)?)?,
        }

        Ok(Self {
            conn: Mutex::new(conn),
            sealer,
        })
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn write<T: Serialize>(
        &self,
        category: &str,
        name: &str,
        value: &T,
        tags: &Tags,
        expires_at: Option<DateTime<Utc>>,
        mode: WriteMode<'_>,
    ) -> WalletResult<bool> {
        let sealed = self.sealer.seal(&serde_json::to_vec(value)?)?;
        let expires_at = expires_at.map(|at| at.timestamp());
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let written = match mode {
            WriteMode::Insert => {
                let result = tx.execute(
                    "INSERT INTO records (category, name, value, expires_at)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![category, name, sealed, expires_at],
                );
                match result {
                    Ok(n) => n,
                    Err(rusqlite::Error::SqliteFailure(e, _))
                        if e.code == rusqlite::ErrorCode::ConstraintViolation =>
                    {
                        return Err(WalletError::Duplicate {
                            category: category.to_owned(),
                            name: name.to_owned(),
                        });
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            WriteMode::Upsert => tx.execute(
                "INSERT INTO records (category, name, value, expires_at) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (category, name)
                 DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at",
                params![category, name, sealed, expires_at],
            )?,
            WriteMode::IfTag { name: tag, allowed } => tx.execute(
                "UPDATE records SET value = ?3, expires_at = ?4
                 WHERE category = ?1 AND name = ?2 AND EXISTS (
                     SELECT 1 FROM record_tags t
                     WHERE t.category = ?1 AND t.name = ?2 AND t.tag_name = ?5
                       AND t.tag_value IN (SELECT value FROM json_each(?6))
                 )",
                params![
                    category,
                    name,
                    sealed,
                    expires_at,
                    tag,
                    serde_json::to_string(allowed)?
                ],
            )?,
        };
        if written == 0 {
            return Ok(false);
        }

        write_tags(&tx, category, name, tags)?;
        tx.commit()?;
        Ok(true)
    }

    /// Insert a new record. Fails with [`WalletError::Duplicate`] if it exists.
    pub fn insert<T: Serialize>(
        &self,
        category: &str,
        name: &str,
        value: &T,
        tags: &Tags,
    ) -> WalletResult<()> {
        self.write(category, name, value, tags, None, WriteMode::Insert)?;
        Ok(())
    }

    /// Insert or overwrite a record.
    pub fn replace<T: Serialize>(
        &self,
        category: &str,
        name: &str,
        value: &T,
        tags: &Tags,
    ) -> WalletResult<()> {
        self.write(category, name, value, tags, None, WriteMode::Upsert)?;
        Ok(())
    }

    /// Insert or overwrite a record that [`Wallet::purge_expired`] removes
    /// once `expires_at` has passed.
    pub fn replace_expiring<T: Serialize>(
        &self,
        category: &str,
        name: &str,
        value: &T,
        tags: &Tags,
        expires_at: DateTime<Utc>,
    ) -> WalletResult<()> {
        self.write(category, name, value, tags, Some(expires_at), WriteMode::Upsert)?;
        Ok(())
    }

    /// Overwrite an existing record only if its tag `tag` currently holds
    /// one of `allowed`. Returns whether the record was written; the check
    /// and the write are a single statement.
    #[allow(clippy::too_many_arguments)]
    pub fn replace_if_tag<T: Serialize>(
        &self,
        category: &str,
        name: &str,
        value: &T,
        tags: &Tags,
        expires_at: Option<DateTime<Utc>>,
        tag: &str,
        allowed: &[&str],
    ) -> WalletResult<bool> {
        self.write(
            category,
            name,
            value,
            tags,
            expires_at,
            WriteMode::IfTag { name: tag, allowed },
        )
    }

    pub fn fetch<T: DeserializeOwned>(&self, category: &str, name: &str) -> WalletResult<Option<T>> {
        let sealed: Option<Vec<u8>> = self
            .conn()
            .query_row(
                "SELECT value FROM records WHERE category = ?1 AND name = ?2",
                params![category, name],
                |row| row.get(0),
            )
            .optional()?;

        sealed.map(|blob| self.unseal(&blob)).transpose()
    }

    fn unseal<T: DeserializeOwned>(&self, blob: &[u8]) -> WalletResult<T> {
        let plain = self.sealer.open(blob)?;
        Ok(serde_json::from_slice(&plain)?)
    }

    /// Names and sealed values of the records matching `filter`, by name.
    fn select(
        &self,
        category: &str,
        filter: &Tags,
        limit: Option<u32>,
    ) -> WalletResult<Vec<(String, Vec<u8>)>> {
        let mut sql = String::from("SELECT r.name, r.value FROM records r WHERE r.category = ?1");
        let mut args: Vec<&dyn ToSql> = vec![&category];
        for (tag_name, tag_value) in filter {
            sql.push_str(&format!(
                " AND EXISTS (SELECT 1 FROM record_tags t
                   WHERE t.category = r.category AND t.name = r.name
                     AND t.tag_name = ?{} AND t.tag_value = ?{})",
                args.len() + 1,
                args.len() + 2
            ));
            args.push(tag_name);
            args.push(tag_value);
        }
        sql.push_str(" ORDER BY r.name");
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(args.as_slice(), |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// All records of a category whose tags contain every `filter` entry,
    /// ordered by name.
    pub fn fetch_all<T: DeserializeOwned>(
        &self,
        category: &str,
        filter: &Tags,
    ) -> WalletResult<Vec<(String, T)>> {
        self.select(category, filter, None)?
            .into_iter()
            .map(|(name, blob)| Ok((name, self.unseal(&blob)?)))
            .collect()
    }

    /// First record (by name) matching `filter`.
    pub fn find<T: DeserializeOwned>(&self, category: &str, filter: &Tags) -> WalletResult<Option<T>> {
        self.select(category, filter, Some(1))?
            .into_iter()
            .next()
            .map(|(_, blob)| self.unseal(&blob))
            .transpose()
    }

    pub fn remove(&self, category: &str, name: &str) -> WalletResult<bool> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM record_tags WHERE category = ?1 AND name = ?2",
            params![category, name],
        )?;
        let removed = tx.execute(
            "DELETE FROM records WHERE category = ?1 AND name = ?2",
            params![category, name],
        )?;
        tx.commit()?;
        Ok(removed > 0)
    }

    /// Delete the records of `category` that expired before `now`.
    pub fn purge_expired(&self, category: &str, now: DateTime<Utc>) -> WalletResult<usize> {
        let now = now.timestamp();
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM record_tags WHERE category = ?1 AND name IN (
                 SELECT name FROM records
                 WHERE category = ?1 AND expires_at IS NOT NULL AND expires_at < ?2
             )",
            params![category, now],
        )?;
        let purged = tx.execute(
            "DELETE FROM records WHERE category = ?1 AND expires_at IS NOT NULL AND expires_at < ?2",
            params![category, now],
        )?;
        tx.commit()?;
        Ok(purged)
    }

    pub fn count(&self, category: &str) -> WalletResult<usize> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM records WHERE category = ?1",
            params![category],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or_default())
    }
}

fn write_tags(tx: &Transaction<'_>, category: &str, name: &str, tags: &Tags) -> WalletResult<()> {
    tx.execute(
        "DELETE FROM record_tags WHERE category = ?1 AND name = ?2",
        params![category, name],
    )?;
    let mut stmt = tx.prepare(
        "INSERT INTO record_tags (category, name, tag_name, tag_value) VALUES (?1, ?2, ?3, ?4)",
    )?;
    for (tag_name, tag_value) in tags {
        stmt.execute(params![category, name, tag_name, tag_value])?;
    }
    Ok(())
}

/// Build a tag map from `(key, value)` pairs.
pub fn tags<const N: usize>(pairs: [(&str, &str); N]) -> Tags {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_owned(), v.to_owned()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Record {
        value: String,
    }

    fn record(value: &str) -> Record {
        Record {
            value: value.into(),
        }
    }

    #[test]
    fn insert_then_fetch() {
        let wallet = Wallet::open_in_memory("key").unwrap();
        wallet
            .insert("did", "did:indy:local:abc", &record("one"), &Tags::new())
            .unwrap();

        let fetched: Option<Record> = wallet.fetch("did", "did:indy:local:abc").unwrap();
        assert_eq!(fetched, Some(record("one")));
        let missing: Option<Record> = wallet.fetch("did", "did:indy:local:zzz").unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn insert_rejects_duplicates_but_replace_overwrites() {
        let wallet = Wallet::open_in_memory("key").unwrap();
        wallet.insert("setting", "a", &record("one"), &Tags::new()).unwrap();

        let err = wallet
            .insert("setting", "a", &record("two"), &Tags::new())
            .unwrap_err();
        assert!(matches!(err, WalletError::Duplicate { .. }));

        wallet.replace("setting", "a", &record("two"), &Tags::new()).unwrap();
        let fetched: Option<Record> = wallet.fetch("setting", "a").unwrap();
        assert_eq!(fetched, Some(record("two")));
    }

    #[test]
    fn fetch_all_filters_by_tags() {
        let wallet = Wallet::open_in_memory("key").unwrap();
        wallet
            .insert("did", "b", &record("indy"), &tags([("method", "indy")]))
            .unwrap();
        wallet
            .insert("did", "a", &record("key"), &tags([("method", "key")]))
            .unwrap();
        wallet
            .insert("did", "c", &record("indy2"), &tags([("method", "indy")]))
            .unwrap();

        let all: Vec<(String, Record)> = wallet.fetch_all("did", &Tags::new()).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].0, "a");

        let indy: Vec<(String, Record)> =
            wallet.fetch_all("did", &tags([("method", "indy")])).unwrap();
        let names: Vec<&str> = indy.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["b", "c"]);
    }

    #[test]
    fn remove_and_count() {
        let wallet = Wallet::open_in_memory("key").unwrap();
        wallet.insert("key", "k1", &record("1"), &Tags::new()).unwrap();
        wallet.insert("key", "k2", &record("2"), &Tags::new()).unwrap();
        assert_eq!(wallet.count("key").unwrap(), 2);

        assert!(wallet.remove("key", "k1").unwrap());
        assert!(!wallet.remove("key", "k1").unwrap());
        assert_eq!(wallet.count("key").unwrap(), 1);
        assert_eq!(wallet.count("did").unwrap(), 0);
    }

    #[test]
    fn reopening_with_wrong_key_fails() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("wallet/backend.sqlite");
        {
            let wallet = Wallet::open(&path, "correct horse").unwrap();
            wallet.insert("setting", "x", &record("v"), &Tags::new()).unwrap();
        }

        let err = Wallet::open(&path, "wrong").unwrap_err();
        assert!(matches!(err, WalletError::InvalidKey));

        let wallet = Wallet::open(&path, "correct horse").unwrap();
        let fetched: Option<Record> = wallet.fetch("setting", "x").unwrap();
        assert_eq!(fetched, Some(record("v")));
    }

    #[test]
    fn values_are_not_stored_in_clear() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("backend.sqlite");
        let wallet = Wallet::open(&path, "key").unwrap();
        wallet
            .insert("key", "verkey", &record("very-secret-seed"), &Tags::new())
            .unwrap();
        drop(wallet);

        let raw = std::fs::read(&path).unwrap();
        let needle = b"very-secret-seed";
        assert!(!raw.windows(needle.len()).any(|w| w == needle));
    }

    #[test]
    fn replace_moves_tags_with_the_record() {
        let wallet = Wallet::open_in_memory("key").unwrap();
        wallet
            .insert("session", "s1", &record("one"), &tags([("state", "OfferCreated")]))
            .unwrap();
        wallet
            .replace("session", "s1", &record("two"), &tags([("state", "Completed")]))
            .unwrap();

        let stale: Option<Record> = wallet.find("session", &tags([("state", "OfferCreated")])).unwrap();
        assert!(stale.is_none());
        let current: Option<Record> = wallet.find("session", &tags([("state", "Completed")])).unwrap();
        assert_eq!(current, Some(record("two")));
    }

    #[test]
    fn conditional_replace_requires_expected_tag() {
        let wallet = Wallet::open_in_memory("key").unwrap();
        wallet
            .insert("session", "s1", &record("one"), &tags([("state", "A")]))
            .unwrap();

        let written = wallet
            .replace_if_tag("session", "s1", &record("two"), &tags([("state", "B")]), None, "state", &["A"])
            .unwrap();
        assert!(written);

        // A second writer that still believes the state is A loses.
        let written = wallet
            .replace_if_tag("session", "s1", &record("three"), &tags([("state", "C")]), None, "state", &["A"])
            .unwrap();
        assert!(!written);
        let stored: Option<Record> = wallet.fetch("session", "s1").unwrap();
        assert_eq!(stored, Some(record("two")));

        let missing = wallet
            .replace_if_tag("session", "nope", &record("x"), &Tags::new(), None, "state", &["A"])
            .unwrap();
        assert!(!missing);
        assert_eq!(wallet.count("session").unwrap(), 1);
    }

    #[test]
    fn expired_records_are_purged_with_their_tags() {
        let wallet = Wallet::open_in_memory("key").unwrap();
        let now = Utc::now();
        wallet
            .replace_expiring("session", "old", &record("1"), &tags([("code", "a")]), now - chrono::Duration::hours(1))
            .unwrap();
        wallet
            .replace_expiring("session", "new", &record("2"), &tags([("code", "b")]), now + chrono::Duration::hours(1))
            .unwrap();
        wallet.insert("session", "kept", &record("3"), &Tags::new()).unwrap();

        assert_eq!(wallet.purge_expired("session", now).unwrap(), 1);
        assert_eq!(wallet.count("session").unwrap(), 2);
        let gone: Option<Record> = wallet.find("session", &tags([("code", "a")])).unwrap();
        assert!(gone.is_none());
        let live: Option<Record> = wallet.find("session", &tags([("code", "b")])).unwrap();
        assert_eq!(live, Some(record("2")));
    }

    #[test]
    fn kdf_params_are_stored_next_to_the_salt() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("backend.sqlite");
        drop(Wallet::open(&path, "key").unwrap());

        let conn = Connection::open(&path).unwrap();
        let stored = metadata(&conn, "kdf").unwrap().unwrap();
        let params: KdfParams = serde_json::from_slice(&stored).unwrap();
        assert_eq!(params, KdfParams::default());
        assert_eq!(metadata(&conn, "salt").unwrap().unwrap().len(), 16);
    }
}
