//! SqliteStore - SQLite WAL persistence
//!
//! - WAL mode: history reads never block the writer
//! - Append-only snapshots and events, ordered by AUTOINCREMENT sequence
//! - BLAKE3 integrity hash verified on every snapshot load
//! - A partial unique index keeps at most one open protocol per Blueprint
//! - `commit_event` runs in a single transaction

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::path::Path;
use tracing::debug;

use super::{BlueprintStore, EventCommit};
use crate::error::{BlueprintError, Result, ResultExt};
use crate::event::EventRecord;
use crate::physics::state::StateSnapshot;
use crate::profile::Blueprint;
use crate::seda::SedaProtocol;
use crate::types::{BlueprintId, Timestamp};

/// SQLite-backed store
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Open (or create) a database in WAL mode. `:memory:` is accepted.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating database directory '{}'", parent.display()))?;
            }
        }

        let conn = Connection::open(path)
            .with_context(|| format!("opening SQLite database '{}'", path.display()))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )
        .context("configuring SQLite PRAGMAs")?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    /// Idempotent DDL
    fn migrate(&self) -> Result<()> {
        self.conn
            .lock()
            .execute_batch(
                "
            CREATE TABLE IF NOT EXISTS blueprints (
                id            TEXT PRIMARY KEY,
                owner         TEXT NOT NULL,
                payload_json  TEXT NOT NULL,
                created_at_ms INTEGER NOT NULL
            );

            -- Append-only state history
            CREATE TABLE IF NOT EXISTS state_snapshots (
                seq            INTEGER PRIMARY KEY AUTOINCREMENT,
                id             TEXT NOT NULL UNIQUE,
                blueprint_id   TEXT NOT NULL REFERENCES blueprints(id),
                integrity_hash TEXT NOT NULL,
                payload_json   TEXT NOT NULL,
                recorded_at_ms INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_snapshots_blueprint
                ON state_snapshots(blueprint_id, seq DESC);

            -- Append-only event log
            CREATE TABLE IF NOT EXISTS events (
                seq            INTEGER PRIMARY KEY AUTOINCREMENT,
                id             TEXT NOT NULL UNIQUE,
                blueprint_id   TEXT NOT NULL REFERENCES blueprints(id),
                severity       INTEGER NOT NULL,
                payload_json   TEXT NOT NULL,
                occurred_at_ms INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_events_blueprint_time
                ON events(blueprint_id, occurred_at_ms);

            CREATE TABLE IF NOT EXISTS seda_protocols (
                id            TEXT PRIMARY KEY,
                blueprint_id  TEXT NOT NULL REFERENCES blueprints(id),
                status        TEXT NOT NULL,
                level         INTEGER NOT NULL,
                payload_json  TEXT NOT NULL,
                updated_at_ms INTEGER NOT NULL
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_protocols_one_open
                ON seda_protocols(blueprint_id) WHERE status != 'resolved';
            ",
            )
            .context("migrating SQLite schema")?;
        Ok(())
    }

    fn insert_snapshot(conn: &Connection, snapshot: &StateSnapshot) -> Result<()> {
        let payload_json = serde_json::to_string(snapshot)?;
        conn.execute(
            "INSERT INTO state_snapshots (id, blueprint_id, integrity_hash, payload_json, recorded_at_ms)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                snapshot.id.to_string(),
                snapshot.blueprint_id.to_string(),
                snapshot.integrity_hash.to_hex(),
                payload_json,
                snapshot.recorded_at.timestamp_millis()
            ],
        )
        .context("INSERT state_snapshots")?;
        Ok(())
    }

    fn insert_event(conn: &Connection, event: &EventRecord) -> Result<()> {
        let payload_json = serde_json::to_string(event)?;
        conn.execute(
            "INSERT INTO events (id, blueprint_id, severity, payload_json, occurred_at_ms)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                event.id.to_string(),
                event.blueprint_id.to_string(),
                event.severity.value(),
                payload_json,
                event.occurred_at.timestamp_millis()
            ],
        )
        .context("INSERT events")?;
        Ok(())
    }

    fn upsert_protocol(tx: &Transaction<'_>, protocol: &SedaProtocol) -> Result<()> {
        if protocol.is_open() {
            let other: Option<String> = tx
                .query_row(
                    "SELECT id FROM seda_protocols
                     WHERE blueprint_id = ?1 AND status != 'resolved' AND id != ?2",
                    params![protocol.blueprint_id.to_string(), protocol.id.to_string()],
                    |row| row.get(0),
                )
                .optional()?;
            if let Some(other) = other {
                return Err(BlueprintError::StateInvariant(format!(
                    "blueprint {} already has open SEDA protocol {}",
                    protocol.blueprint_id, other
                )));
            }
        }

        let payload_json = serde_json::to_string(protocol)?;
        tx.execute(
            "INSERT INTO seda_protocols (id, blueprint_id, status, level, payload_json, updated_at_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                status = excluded.status,
                level = excluded.level,
                payload_json = excluded.payload_json,
                updated_at_ms = excluded.updated_at_ms",
            params![
                protocol.id.to_string(),
                protocol.blueprint_id.to_string(),
                protocol.status.to_string(),
                protocol.level,
                payload_json,
                protocol.updated_at.timestamp_millis()
            ],
        )
        .context("UPSERT seda_protocols")?;
        Ok(())
    }

    fn decode_snapshot(payload_json: &str, stored_hash: &str) -> Result<StateSnapshot> {
        let snapshot: StateSnapshot =
            serde_json::from_str(payload_json).context("decoding state snapshot")?;
        if snapshot.integrity_hash.to_hex() != stored_hash {
            return Err(BlueprintError::StateInvariant(format!(
                "snapshot {} hash column does not match payload",
                snapshot.id
            )));
        }
        snapshot.verify_integrity()?;
        Ok(snapshot)
    }

    fn query_events(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<EventRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(params, |row| row.get::<_, String>(0))
            .context("query events")?;
        rows.map(|payload| Ok(serde_json::from_str(&payload?)?))
            .collect()
    }
}

impl BlueprintStore for SqliteStore {
    fn save_blueprint(&self, blueprint: &Blueprint) -> Result<()> {
        let payload_json = serde_json::to_string(blueprint)?;
        self.conn
            .lock()
            .execute(
                "INSERT INTO blueprints (id, owner, payload_json, created_at_ms)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(id) DO UPDATE SET payload_json = excluded.payload_json",
                params![
                    blueprint.id.to_string(),
                    blueprint.owner.0,
                    payload_json,
                    blueprint.created_at.timestamp_millis()
                ],
            )
            .context("UPSERT blueprints")?;
        Ok(())
    }

    fn load_blueprint(&self, id: BlueprintId) -> Result<Option<Blueprint>> {
        let payload: Option<String> = self
            .conn
            .lock()
            .query_row(
                "SELECT payload_json FROM blueprints WHERE id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )
            .optional()
            .context("query blueprints")?;
        payload
            .map(|p| serde_json::from_str(&p).context("decoding blueprint"))
            .transpose()
    }

    fn list_blueprints(&self) -> Result<Vec<Blueprint>> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare("SELECT payload_json FROM blueprints ORDER BY created_at_ms, id")?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .context("query blueprints")?;
        rows.map(|payload| Ok(serde_json::from_str(&payload?)?))
            .collect()
    }

    fn load_latest_state(&self, id: BlueprintId) -> Result<Option<StateSnapshot>> {
        let row: Option<(String, String)> = self
            .conn
            .lock()
            .query_row(
                "SELECT payload_json, integrity_hash FROM state_snapshots
                 WHERE blueprint_id = ?1 ORDER BY seq DESC LIMIT 1",
                params![id.to_string()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .context("query state_snapshots")?;
        row.map(|(payload, hash)| Self::decode_snapshot(&payload, &hash))
            .transpose()
    }

    fn append_state(&self, snapshot: &StateSnapshot) -> Result<()> {
        Self::insert_snapshot(&self.conn.lock(), snapshot)?;
        debug!(blueprint_id = %snapshot.blueprint_id, snapshot_id = %snapshot.id, "state appended");
        Ok(())
    }

    fn state_history(&self, id: BlueprintId, limit: usize) -> Result<Vec<StateSnapshot>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT payload_json, integrity_hash FROM state_snapshots
             WHERE blueprint_id = ?1 ORDER BY seq DESC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![id.to_string(), limit as i64], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .context("query state history")?;
        rows.map(|row| {
            let (payload, hash) = row?;
            Self::decode_snapshot(&payload, &hash)
        })
        .collect()
    }

    fn commit_event(&self, commit: &EventCommit) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        if let Some(baseline) = &commit.baseline {
            Self::insert_snapshot(&tx, baseline)?;
        }
        Self::insert_snapshot(&tx, &commit.snapshot)?;
        Self::insert_event(&tx, &commit.event)?;
        if let Some(protocol) = &commit.protocol {
            Self::upsert_protocol(&tx, protocol)?;
        }
        tx.commit().context("committing event")?;
        debug!(event_id = %commit.event.id, "event committed");
        Ok(())
    }

    fn count_events(&self, id: BlueprintId) -> Result<u64> {
        let count: i64 = self.conn.lock().query_row(
            "SELECT COUNT(*) FROM events WHERE blueprint_id = ?1",
            params![id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn events_since(&self, id: BlueprintId, since: Timestamp) -> Result<Vec<EventRecord>> {
        self.query_events(
            "SELECT payload_json FROM events
             WHERE blueprint_id = ?1 AND occurred_at_ms >= ?2
             ORDER BY occurred_at_ms, seq",
            params![id.to_string(), since.timestamp_millis()],
        )
    }

    fn recent_events(&self, id: BlueprintId, limit: usize) -> Result<Vec<EventRecord>> {
        self.query_events(
            "SELECT payload_json FROM events
             WHERE blueprint_id = ?1 ORDER BY seq DESC LIMIT ?2",
            params![id.to_string(), limit as i64],
        )
    }

    fn load_open_protocol(&self, id: BlueprintId) -> Result<Option<SedaProtocol>> {
        let payload: Option<String> = self
            .conn
            .lock()
            .query_row(
                "SELECT payload_json FROM seda_protocols
                 WHERE blueprint_id = ?1 AND status != 'resolved'",
                params![id.to_string()],
                |row| row.get(0),
            )
            .optional()
            .context("query seda_protocols")?;
        payload
            .map(|p| serde_json::from_str(&p).context("decoding SEDA protocol"))
            .transpose()
    }

    fn open_or_update_protocol(&self, protocol: &SedaProtocol) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        Self::upsert_protocol(&tx, protocol)?;
        tx.commit()?;
        Ok(())
    }
}
