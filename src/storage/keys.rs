//! sshgrid key records
//!
//! The server side of an sshgrid session looks up the keys for a reverse
//! tunnel by client username. Records start out unused; whatever accepts the
//! tunnel flips the flag.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::path::Path;

/// Default location of the key database on a project server
pub const DEFAULT_KEY_DB: &str = "/sshgrid/keys.db";

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One sshgrid session's key material
#[derive(Debug, Clone, PartialEq)]
pub struct KeyRecord {
    /// Private key the client opens the tunnel with
    pub client_key: String,
    /// Login name the tunnel authenticates as
    pub client_username: String,
    /// Private key the server uses to log into the client
    pub server_key: String,
    /// Creation timestamp
    pub create_date: DateTime<Utc>,
    /// Whether the session has been picked up
    pub used: bool,
}

impl KeyRecord {
    /// Create a new, unused record stamped with the current time
    pub fn new(client_key: String, client_username: String, server_key: String) -> Self {
        Self {
            client_key,
            client_username,
            server_key,
            create_date: Utc::now(),
            used: false,
        }
    }
}

/// Handle on the sshgrid key database
pub struct KeyStore {
    conn: Connection,
}

impl KeyStore {
    /// Open (creating if needed) the key database at `path`
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {:?}", parent))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open key database {:?}", path))?;
        Self::init(conn)
    }

    /// In-memory store, for tests and dry runs
    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS keys \
             (client_key, client_username, server_key, create_date, used)",
            [],
        )
        .context("Failed to create keys table")?;
        Ok(Self { conn })
    }

    /// Insert a record
    pub fn insert(&self, record: &KeyRecord) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO keys VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    record.client_key,
                    record.client_username,
                    record.server_key,
                    record.create_date.format(DATE_FORMAT).to_string(),
                    record.used as i64,
                ],
            )
            .context("Failed to store sshgrid keys")?;
        Ok(())
    }

    /// Look up the record for a client username
    #[cfg(test)]
    pub fn get(&self, client_username: &str) -> Result<Option<KeyRecord>> {
        use chrono::NaiveDateTime;
        use rusqlite::OptionalExtension;

        let row = self
            .conn
            .query_row(
                "SELECT client_key, client_username, server_key, create_date, used \
                 FROM keys WHERE client_username = ?1",
                params![client_username],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, i64>(4)?,
                    ))
                },
            )
            .optional()
            .context("Failed to query sshgrid keys")?;

        row.map(|(client_key, client_username, server_key, date, used)| {
            let create_date = NaiveDateTime::parse_from_str(&date, DATE_FORMAT)
                .with_context(|| format!("Bad create_date {:?}", date))?
                .and_utc();
            Ok(KeyRecord {
                client_key,
                client_username,
                server_key,
                create_date,
                used: used != 0,
            })
        })
        .transpose()
    }
}
