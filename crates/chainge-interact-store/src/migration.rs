//! Database schema migrations for SQLite.
//!
//! Each migration transforms the schema from version N to N+1. Applied
//! versions are recorded in `schema_migrations`.

use chainge_interact_core::now_millis;
use rusqlite::Connection;

use crate::error::{Result, StoreError};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Initialize or migrate the database schema. Idempotent.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let current: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;

    if current > CURRENT_VERSION {
        return Err(StoreError::Migration(format!(
            "database schema version {} is newer than supported {}",
            current, CURRENT_VERSION
        )));
    }

    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;

        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;

            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, now_millis()],
            )?;
        }

        tx.commit()?;
        tracing::debug!(from = current, to = CURRENT_VERSION, "migrated token store schema");
    }

    Ok(())
}

fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Migration v1: token log.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE tokens (
            token_id BLOB PRIMARY KEY,        -- 32 bytes, Blake3 hash of canonical bytes
            nonce TEXT NOT NULL,              -- interaction id
            seq INTEGER NOT NULL,             -- position within the interaction
            interaction_type INTEGER NOT NULL,
            issuer TEXT NOT NULL,
            issued_at INTEGER NOT NULL,       -- issuer-claimed (Unix ms)
            canonical_bytes BLOB NOT NULL,
            ingested_at INTEGER NOT NULL,     -- local receive time, the replay clock

            UNIQUE(nonce, seq)
        );

        CREATE INDEX idx_tokens_nonce_seq ON tokens(nonce, seq);
        CREATE INDEX idx_tokens_first_type ON tokens(seq, interaction_type);
        "#,
    )?;

    Ok(())
}
