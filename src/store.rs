//! Local state mirror.
//!
//! A durable, best-effort cache of what this service has asked the
//! upstream to do. It is never consulted to decide whether an upstream
//! call succeeded and is never reconciled against live upstream state.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use log::info;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::StoreError;
use crate::types::{ContainerRecord, ContainerStatus, ResourceRequest};

pub trait ContainerStore: Send + Sync {
    fn insert(&self, record: &ContainerRecord) -> Result<(), StoreError>;
    fn get(&self, id: u32) -> Result<Option<ContainerRecord>, StoreError>;
    fn list(&self) -> Result<Vec<ContainerRecord>, StoreError>;
    /// Overwrites only the fields present in `resources`.
    fn update_resources(&self, id: u32, resources: &ResourceRequest) -> Result<(), StoreError>;
    fn set_status(&self, id: u32, status: ContainerStatus) -> Result<(), StoreError>;
    /// Returns whether a row was removed.
    fn remove(&self, id: u32) -> Result<bool, StoreError>;
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS containers (
    id INTEGER PRIMARY KEY,
    hostname TEXT NOT NULL,
    password TEXT NOT NULL,
    ip TEXT NOT NULL,
    ipv6 TEXT NOT NULL,
    memory INTEGER NOT NULL,
    cpu INTEGER NOT NULL,
    disk INTEGER NOT NULL,
    status TEXT NOT NULL
);";

const COLUMNS: &str = "id, hostname, password, ip, ipv6, memory, cpu, disk, status";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        info!("Opened container database at {}", path.display());
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<(ContainerRecord, String)> {
    let status: String = row.get(8)?;
    let record = ContainerRecord {
        id: row.get(0)?,
        hostname: row.get(1)?,
        password: row.get(2)?,
        ipv4: row.get(3)?,
        ipv6: row.get(4)?,
        memory: row.get(5)?,
        cpu: row.get(6)?,
        disk: row.get(7)?,
        // Replaced once the text column is validated.
        status: ContainerStatus::Creating,
    };
    Ok((record, status))
}

fn with_status((mut record, status): (ContainerRecord, String)) -> Result<ContainerRecord, StoreError> {
    record.status = status.parse()?;
    Ok(record)
}

impl ContainerStore for SqliteStore {
    fn insert(&self, record: &ContainerRecord) -> Result<(), StoreError> {
        self.conn()?.execute(
            &format!("INSERT INTO containers ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"),
            params![
                record.id,
                record.hostname,
                record.password,
                record.ipv4,
                record.ipv6,
                record.memory,
                record.cpu,
                record.disk,
                record.status.as_str(),
            ],
        )?;
        Ok(())
    }

    fn get(&self, id: u32) -> Result<Option<ContainerRecord>, StoreError> {
        let row = self
            .conn()?
            .query_row(
                &format!("SELECT {COLUMNS} FROM containers WHERE id = ?1"),
                params![id],
                record_from_row,
            )
            .optional()?;
        row.map(with_status).transpose()
    }

    fn list(&self) -> Result<Vec<ContainerRecord>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!("SELECT {COLUMNS} FROM containers ORDER BY id"))?;
        let rows = stmt.query_map([], record_from_row)?;
        let records: Result<Vec<_>, StoreError> = rows.map(|row| with_status(row?)).collect();
        records
    }

    fn update_resources(&self, id: u32, resources: &ResourceRequest) -> Result<(), StoreError> {
        self.conn()?.execute(
            "UPDATE containers SET
                memory = COALESCE(?1, memory),
                cpu = COALESCE(?2, cpu),
                disk = COALESCE(?3, disk)
             WHERE id = ?4",
            params![resources.memory, resources.cpu, resources.disk, id],
        )?;
        Ok(())
    }

    fn set_status(&self, id: u32, status: ContainerStatus) -> Result<(), StoreError> {
        self.conn()?.execute(
            "UPDATE containers SET status = ?1 WHERE id = ?2",
            params![status.as_str(), id],
        )?;
        Ok(())
    }

    fn remove(&self, id: u32) -> Result<bool, StoreError> {
        let removed = self
            .conn()?
            .execute("DELETE FROM containers WHERE id = ?1", params![id])?;
        Ok(removed > 0)
    }
}
