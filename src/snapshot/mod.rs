//! Snapshot client
//!
//! Streams rows from a Kismet SQLite log (`*.kismet`) opened read-only.
//!
//! Rows are read through a keyset cursor over `rowid`, a batch at a time, so
//! the stream is lazy and comes back in the table's natural row order:
//!
//! ```text
//! SELECT rowid, "devmac", "avg_lat" FROM "devices"
//! WHERE rowid > ?1 ORDER BY rowid LIMIT ?2
//! ```
//!
//! Tables with their own `rowid` column are stepped through `_rowid_` or
//! `oid` instead.

mod decode;
mod schema;

use crate::config::SnapshotConfig;
use crate::filter::SnapshotFilter;
use crate::reader::{ReaderError, ReaderResult, Record, RecordReader, RecordStream, StopOnError};
use decode::ColumnMapping;
use rusqlite::types::Value;
use rusqlite::{params, Connection, OpenFlags};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};

/// Record reader backed by a local snapshot file
pub struct SnapshotQueryClient {
    conn: Option<Connection>,
    path: PathBuf,
    filter: SnapshotFilter,
    rowid: &'static str,
    batch_size: usize,
    streamed: bool,
}

impl std::fmt::Debug for SnapshotQueryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotQueryClient")
            .field("path", &self.path)
            .field("filter", &self.filter)
            .field("open", &self.conn.is_some())
            .finish_non_exhaustive()
    }
}

impl SnapshotQueryClient {
    /// Open `path` read-only and check the filter against its schema
    pub fn open(
        path: impl AsRef<Path>,
        filter: SnapshotFilter,
        config: &SnapshotConfig,
    ) -> ReaderResult<Self> {
        let path = path.as_ref();

        if config.batch_size == 0 {
            return Err(ReaderError::Configuration(
                "snapshot batch_size must be at least 1".to_string(),
            ));
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| {
            ReaderError::Connection(format!("failed to open snapshot {}: {}", path.display(), e))
        })?;

        schema::probe(&conn, path)?;
        schema::validate(&conn, filter.table(), filter.columns())?;
        let rowid = schema::rowid_alias(&conn, filter.table())?;

        match schema::kismet_db_version(&conn) {
            Some(version) => tracing::debug!(db_version = version, "Opened Kismet log"),
            None => tracing::debug!("Snapshot has no KISMET metadata table"),
        }
        tracing::info!(
            path = %path.display(),
            table = filter.table(),
            columns = ?filter.columns(),
            "Snapshot opened"
        );

        Ok(Self {
            conn: Some(conn),
            path: path.to_path_buf(),
            filter,
            rowid,
            batch_size: config.batch_size,
            streamed: false,
        })
    }

    fn cursor_sql(&self) -> String {
        let columns: Vec<String> = self
            .filter
            .columns()
            .iter()
            .map(|c| schema::quote_identifier(c))
            .collect();

        format!(
            "SELECT {rowid}, {} FROM {} WHERE {rowid} > ?1 ORDER BY {rowid} LIMIT ?2",
            columns.join(", "),
            schema::quote_identifier(self.filter.table()),
            rowid = self.rowid
        )
    }
}

impl RecordReader for SnapshotQueryClient {
    fn backend(&self) -> &'static str {
        "snapshot"
    }

    fn elements(&mut self) -> ReaderResult<RecordStream<'_>> {
        if self.streamed {
            return Err(ReaderError::Configuration(
                "snapshot rows were already streamed; open a new client".to_string(),
            ));
        }

        let sql = self.cursor_sql();
        let conn = self.conn.as_ref().ok_or_else(|| {
            ReaderError::Connection("snapshot is already closed".to_string())
        })?;

        // Preparing up front surfaces tables without a rowid before any pull
        conn.prepare_cached(&sql).map_err(|e| {
            ReaderError::Configuration(format!(
                "cannot step through table '{}': {}",
                self.filter.table(),
                e
            ))
        })?;
        self.streamed = true;

        let mapping = ColumnMapping::new(self.filter.columns());
        if mapping.is_empty() {
            tracing::warn!(
                columns = ?self.filter.columns(),
                "No requested column maps to an identifier or coordinate"
            );
        }

        Ok(Box::new(StopOnError::new(RowCursor {
            conn,
            sql,
            mapping,
            width: self.filter.columns().len(),
            batch_size: self.batch_size,
            last_rowid: i64::MIN,
            buffered: VecDeque::new(),
            exhausted: false,
        })))
    }

    fn finish(mut self: Box<Self>) -> ReaderResult<()> {
        match self.conn.take() {
            Some(conn) => conn.close().map_err(|(_, e)| {
                ReaderError::Connection(format!(
                    "failed to close snapshot {}: {}",
                    self.path.display(),
                    e
                ))
            }),
            None => Ok(()),
        }
    }
}

/// Keyset cursor over one table
struct RowCursor<'a> {
    conn: &'a Connection,
    sql: String,
    mapping: ColumnMapping,
    width: usize,
    batch_size: usize,
    last_rowid: i64,
    buffered: VecDeque<(i64, Vec<Value>)>,
    exhausted: bool,
}

impl RowCursor<'_> {
    fn refill(&mut self) -> ReaderResult<()> {
        let mut stmt = self.conn.prepare_cached(&self.sql).map_err(read_error)?;
        let width = self.width;

        let rows = stmt
            .query_map(params![self.last_rowid, self.batch_size as i64], |row| {
                let rowid: i64 = row.get(0)?;
                let values = (1..=width)
                    .map(|i| row.get::<_, Value>(i))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok((rowid, values))
            })
            .map_err(read_error)?;

        let batch = rows.collect::<Result<VecDeque<_>, _>>().map_err(read_error)?;

        self.exhausted = batch.len() < self.batch_size;
        if let Some((rowid, _)) = batch.back() {
            self.last_rowid = *rowid;
        }
        tracing::trace!(rows = batch.len(), last_rowid = self.last_rowid, "Read snapshot batch");
        self.buffered = batch;

        Ok(())
    }
}

impl Iterator for RowCursor<'_> {
    type Item = ReaderResult<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffered.is_empty() && !self.exhausted {
            if let Err(e) = self.refill() {
                return Some(Err(e));
            }
        }

        let (rowid, values) = self.buffered.pop_front()?;
        Some(self.mapping.decode(rowid, &values))
    }
}

fn read_error(e: rusqlite::Error) -> ReaderError {
    ReaderError::Connection(format!("failed to read snapshot: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::drain;
    use std::ops::ControlFlow;
    use tempfile::{tempdir, TempDir};

    /// Write a small Kismet-style log with `rows` devices
    fn write_snapshot(rows: usize) -> (TempDir, PathBuf) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("capture.kismet");
        let conn = Connection::open(&path).unwrap();

        conn.execute_batch(
            "CREATE TABLE KISMET (kismet_version TEXT, db_version INT, db_module TEXT);
             INSERT INTO KISMET VALUES ('2023-07-R1', 9, 'kismetlog');
             CREATE TABLE devices (
                 first_time INT, last_time INT, devkey TEXT, phyname TEXT, devmac TEXT,
                 strongest_signal INT, min_lat REAL, min_lon REAL, max_lat REAL, max_lon REAL,
                 avg_lat REAL, avg_lon REAL, bytes_data INT, type TEXT, device BLOB,
                 UNIQUE(phyname, devmac) ON CONFLICT REPLACE);
             CREATE TABLE datasources (uuid TEXT, typestring TEXT, definition TEXT,
                 name TEXT, interface TEXT, json BLOB);
             CREATE TABLE keyed (k TEXT PRIMARY KEY, v TEXT) WITHOUT ROWID;",
        )
        .unwrap();

        for i in 0..rows {
            conn.execute(
                "INSERT INTO devices (devkey, phyname, devmac, avg_lat, avg_lon, type)
                 VALUES (?1, 'IEEE802.11', ?2, ?3, ?4, 'Wi-Fi Device')",
                params![
                    format!("4202770D00000000_{:012X}", i),
                    format!("AA:BB:CC:00:00:{:02X}", i),
                    40.0 + i as f64,
                    -70.0 - i as f64
                ],
            )
            .unwrap();
        }

        (dir, path)
    }

    fn open(path: &Path, filter: &str, batch_size: usize) -> ReaderResult<SnapshotQueryClient> {
        SnapshotQueryClient::open(
            path,
            SnapshotFilter::parse(filter).unwrap(),
            &SnapshotConfig { batch_size },
        )
    }

    #[test]
    fn test_yields_every_row_in_order() {
        let (_dir, path) = write_snapshot(7);
        let mut client = open(&path, "devices/devmac devices/avg_lat devices/avg_lon", 3).unwrap();

        let records: Vec<Record> = client
            .elements()
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(records.len(), 7);
        for (i, record) in records.iter().enumerate() {
            assert_eq!(
                record.identifier.as_deref(),
                Some(format!("AA:BB:CC:00:00:{:02X}", i).as_str())
            );
            assert_eq!(record.latitude, Some(40.0 + i as f64));
            assert_eq!(record.longitude, Some(-70.0 - i as f64));
        }

        Box::new(client).finish().unwrap();
    }

    #[test]
    fn test_batch_boundary_exact_multiple() {
        let (_dir, path) = write_snapshot(4);
        let mut client = open(&path, "devices/devmac", 2).unwrap();

        let mut stream = client.elements().unwrap();
        assert_eq!(stream.by_ref().count(), 4);
        assert!(stream.next().is_none());
        assert!(stream.next().is_none());
    }

    #[test]
    fn test_empty_table() {
        let (_dir, path) = write_snapshot(0);
        let mut client = open(&path, "devices/devmac", 16).unwrap();
        assert!(client.elements().unwrap().next().is_none());
    }

    #[test]
    fn test_degraded_and_unmapped_columns() {
        let (_dir, path) = write_snapshot(2);
        let mut client = open(&path, "devices/devmac devices/phyname devices/type", 16).unwrap();

        let first = client.elements().unwrap().next().unwrap().unwrap();
        assert_eq!(first.identifier.as_deref(), Some("AA:BB:CC:00:00:00"));
        assert!(!first.has_position());
    }

    #[test]
    fn test_other_table() {
        let (_dir, path) = write_snapshot(0);
        let conn = Connection::open(&path).unwrap();
        conn.execute(
            "INSERT INTO datasources (uuid, typestring, name)
             VALUES ('5FE308BD-0000-0000-0000-00C0CA9A1234', 'linuxwifi', 'wlan0')",
            [],
        )
        .unwrap();
        drop(conn);

        let mut client = open(&path, "datasources/uuid datasources/name", 16).unwrap();
        let records: Vec<_> = client.elements().unwrap().collect();
        assert_eq!(records.len(), 1);
        assert_eq!(
            records[0].as_ref().unwrap().identifier.as_deref(),
            Some("5FE308BD-0000-0000-0000-00C0CA9A1234")
        );
    }

    #[test]
    fn test_schema_mismatch() {
        let (_dir, path) = write_snapshot(1);

        assert!(matches!(
            open(&path, "network/chan", 16),
            Err(ReaderError::Configuration(_))
        ));
        assert!(matches!(
            open(&path, "devices/devmac devices/chan", 16),
            Err(ReaderError::Configuration(_))
        ));
    }

    #[test]
    fn test_missing_and_invalid_files() {
        let dir = tempdir().unwrap();

        let missing = dir.path().join("nope.kismet");
        assert!(matches!(
            open(&missing, "devices/devmac", 16),
            Err(ReaderError::Connection(_))
        ));
        assert!(!missing.exists());

        let text = dir.path().join("notes.kismet");
        std::fs::write(&text, "this is not a database, just some text padding it out").unwrap();
        assert!(matches!(
            open(&text, "devices/devmac", 16),
            Err(ReaderError::Connection(_))
        ));
    }

    #[test]
    fn test_table_with_own_rowid_column() {
        let (_dir, path) = write_snapshot(0);
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE tagged (rowid TEXT, devmac TEXT);
             INSERT INTO tagged VALUES ('zz', 'AA:BB:CC:00:00:01');
             INSERT INTO tagged VALUES ('aa', 'AA:BB:CC:00:00:02');
             INSERT INTO tagged VALUES ('mm', 'AA:BB:CC:00:00:03');
             CREATE TABLE hidden (rowid TEXT, _rowid_ TEXT, oid TEXT, devmac TEXT);",
        )
        .unwrap();
        drop(conn);

        let mut client = open(&path, "tagged/devmac", 2).unwrap();
        let ids: Vec<String> = client
            .elements()
            .unwrap()
            .map(|r| r.unwrap().identifier.unwrap())
            .collect();
        assert_eq!(
            ids,
            ["AA:BB:CC:00:00:01", "AA:BB:CC:00:00:02", "AA:BB:CC:00:00:03"]
        );

        assert!(matches!(
            open(&path, "hidden/devmac", 2),
            Err(ReaderError::Configuration(_))
        ));
    }

    #[test]
    fn test_without_rowid_table() {
        let (_dir, path) = write_snapshot(0);
        let mut client = open(&path, "keyed/k", 16).unwrap();
        assert!(matches!(
            client.elements(),
            Err(ReaderError::Configuration(_))
        ));
    }

    #[test]
    fn test_elements_only_once() {
        let (_dir, path) = write_snapshot(1);
        let mut client = open(&path, "devices/devmac", 16).unwrap();

        drop(client.elements().unwrap());
        assert!(matches!(
            client.elements(),
            Err(ReaderError::Configuration(_))
        ));
    }

    #[test]
    fn test_bad_row_aborts_and_finishes() {
        let (_dir, path) = write_snapshot(5);
        let conn = Connection::open(&path).unwrap();
        conn.execute(
            "UPDATE devices SET avg_lat = 'unknown' WHERE rowid = 3",
            [],
        )
        .unwrap();
        drop(conn);

        let reader: Box<dyn RecordReader> =
            Box::new(open(&path, "devices/devmac devices/avg_lat", 2).unwrap());

        let mut seen = Vec::new();
        let result = drain(reader, |_, record| {
            seen.push(record.identifier.clone().unwrap());
            ControlFlow::Continue(())
        });

        assert!(matches!(result, Err(ReaderError::Parse(ref m)) if m.contains("row 3")));
        assert_eq!(seen, vec!["AA:BB:CC:00:00:00", "AA:BB:CC:00:00:01"]);
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let (_dir, path) = write_snapshot(1);
        assert!(matches!(
            open(&path, "devices/devmac", 0),
            Err(ReaderError::Configuration(_))
        ));
    }

    #[test]
    fn test_snapshot_is_not_modified() {
        let (_dir, path) = write_snapshot(3);
        let before = std::fs::read(&path).unwrap();

        let reader: Box<dyn RecordReader> = Box::new(open(&path, "devices/devmac", 2).unwrap());
        assert_eq!(drain(reader, |_, _| ControlFlow::Continue(())).unwrap(), 3);

        assert_eq!(std::fs::read(&path).unwrap(), before);
    }
}
