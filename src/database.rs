//! Working-copy management and queries against the uploaded SQLite file.
//!
//! By default the input database is copied into a private temporary directory
//! and every mutation (view creation) happens on that copy; the caller decides
//! whether to persist it. `WorkingMode::InPlace` skips the copy.
//!
//! The copy is taken with `VACUUM INTO` through a read-only connection, so
//! pages still sitting in a `-wal` sidecar end up in the working copy.

use std::{
    fs::{self, File},
    io::Read,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow, bail, ensure};
use log::{debug, info};
use rusqlite::{Connection, OpenFlags};
use tempfile::TempDir;

use crate::{data::Cell, data::Dataset, view::quote_ident};

const SQLITE_HEADER: &[u8; 16] = b"SQLite format 3\0";
const WORKING_FILE_NAME: &str = "working.db";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkingMode {
    #[default]
    Copy,
    InPlace,
}

#[derive(Debug)]
pub struct WorkingDatabase {
    connection: Option<Connection>,
    path: PathBuf,
    source: PathBuf,
    // Held so the working copy is removed on drop.
    _temp_dir: Option<TempDir>,
}

impl WorkingDatabase {
    pub fn open(source: &Path, mode: WorkingMode) -> Result<Self> {
        ensure_sqlite_file(source)?;
        let (path, temp_dir) = match mode {
            WorkingMode::InPlace => (source.to_path_buf(), None),
            WorkingMode::Copy => {
                let dir = tempfile::Builder::new()
                    .prefix("sales-view-")
                    .tempdir()
                    .context("Creating working directory")?;
                let path = dir.path().join(WORKING_FILE_NAME);
                snapshot_database(source, &path)
                    .with_context(|| format!("Copying {source:?} to working copy {path:?}"))?;
                debug!("Working copy of {source:?} at {path:?}");
                (path, Some(dir))
            }
        };
        let connection = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .with_context(|| format!("Opening SQLite database {path:?}"))?;
        Ok(Self {
            connection: Some(connection),
            path,
            source: source.to_path_buf(),
            _temp_dir: temp_dir,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn connection(&mut self) -> Result<&mut Connection> {
        self.connection
            .as_mut()
            .ok_or_else(|| anyhow!("Database connection already closed"))
    }

    /// Closes the connection and copies the working file to `destination`.
    /// Saving onto the working file itself (however the path is spelled) is a no-op.
    pub fn persist_to(mut self, destination: &Path) -> Result<()> {
        if let Some(conn) = self.connection.take() {
            conn.close()
                .map_err(|(_, err)| err)
                .context("Closing working database")?;
        }
        if is_same_file(&self.path, destination) {
            info!("Database already saved at {destination:?}");
            return Ok(());
        }
        fs::copy(&self.path, destination)
            .with_context(|| format!("Saving database to {destination:?}"))?;
        info!("Saved database to {destination:?}");
        Ok(())
    }
}

// `fs::copy` truncates its destination before reading the source, so the
// two paths must never resolve to the same file.
fn is_same_file(left: &Path, right: &Path) -> bool {
    match (fs::canonicalize(left), fs::canonicalize(right)) {
        (Ok(left), Ok(right)) => left == right,
        _ => false,
    }
}

fn snapshot_database(source: &Path, destination: &Path) -> Result<()> {
    let target = destination
        .to_str()
        .ok_or_else(|| anyhow!("Working copy path {destination:?} is not valid UTF-8"))?;
    let conn = Connection::open_with_flags(
        source,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .with_context(|| format!("Opening SQLite database {source:?}"))?;
    conn.execute("VACUUM INTO ?1", [target])
        .context("Writing database snapshot")?;
    Ok(())
}

fn ensure_sqlite_file(path: &Path) -> Result<()> {
    let mut file =
        File::open(path).with_context(|| format!("Opening input database {path:?}"))?;
    let mut header = Vec::with_capacity(SQLITE_HEADER.len());
    file.by_ref()
        .take(SQLITE_HEADER.len() as u64)
        .read_to_end(&mut header)
        .with_context(|| format!("Reading header of {path:?}"))?;
    // An empty file is a valid, empty database.
    if header.is_empty() {
        return Ok(());
    }
    ensure!(
        header.as_slice() == SQLITE_HEADER,
        "{path:?} is not a SQLite database"
    );
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseObject {
    pub name: String,
    pub kind: String,
    /// Row count for tables; views are not counted.
    pub rows: Option<i64>,
}

pub fn list_objects(conn: &Connection) -> Result<Vec<DatabaseObject>> {
    let mut stmt = conn
        .prepare(
            "SELECT name, type FROM sqlite_master \
             WHERE type IN ('table', 'view') AND name NOT LIKE 'sqlite_%' \
             ORDER BY type, name",
        )
        .context("Listing database objects")?;
    let entries = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut objects = Vec::with_capacity(entries.len());
    for (name, kind) in entries {
        let rows = if kind == "table" {
            Some(count_rows(conn, &name)?)
        } else {
            None
        };
        objects.push(DatabaseObject { name, kind, rows });
    }
    Ok(objects)
}

pub fn count_rows(conn: &Connection, table: &str) -> Result<i64> {
    conn.query_row(
        &format!("SELECT COUNT(*) FROM {}", quote_ident(table)),
        [],
        |row| row.get(0),
    )
    .with_context(|| format!("Counting rows in '{table}'"))
}

pub fn query_dataset(conn: &Connection, sql: &str) -> Result<Dataset> {
    debug!("Query: {sql}");
    let mut stmt = conn
        .prepare(sql)
        .with_context(|| format!("Preparing query: {sql}"))?;
    let headers = stmt
        .column_names()
        .into_iter()
        .map(String::from)
        .collect::<Vec<_>>();
    let column_count = headers.len();
    let mut dataset = Dataset::new(headers);

    let mut rows = stmt.query([]).context("Executing query")?;
    while let Some(row) = rows.next().context("Reading query row")? {
        let mut cells = Vec::with_capacity(column_count);
        for idx in 0..column_count {
            cells.push(Cell::from_value_ref(row.get_ref(idx)?));
        }
        dataset.rows.push(cells);
    }
    Ok(dataset)
}

/// Reads every row of `view`, or the first `limit` rows.
pub fn read_view(conn: &Connection, view: &str, limit: Option<usize>) -> Result<Dataset> {
    if view.trim().is_empty() {
        bail!("View name must not be empty");
    }
    let mut sql = format!("SELECT * FROM {}", quote_ident(view));
    if let Some(limit) = limit {
        sql.push_str(&format!(" LIMIT {limit}"));
    }
    query_dataset(conn, &sql).with_context(|| format!("Reading view '{view}'"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn seed(path: &Path) {
        let conn = Connection::open(path).expect("create db");
        conn.execute_batch(
            "CREATE TABLE items (id INTEGER, name TEXT, price REAL);
             INSERT INTO items VALUES (1, 'pen', 1.5), (2, 'ink', NULL);
             CREATE VIEW cheap AS SELECT * FROM items WHERE price < 2;",
        )
        .expect("seed");
    }

    #[test]
    fn copy_mode_leaves_source_untouched() {
        let dir = tempdir().expect("temp dir");
        let source = dir.path().join("input.db");
        seed(&source);

        let mut working = WorkingDatabase::open(&source, WorkingMode::Copy).expect("open");
        assert_ne!(working.path(), source.as_path());
        working
            .connection()
            .expect("conn")
            .execute_batch("CREATE VIEW extra AS SELECT 1")
            .expect("mutate");

        let saved = dir.path().join("saved.db");
        working.persist_to(&saved).expect("persist");

        let original = Connection::open(&source).expect("reopen source");
        let names = list_objects(&original)
            .expect("list")
            .into_iter()
            .map(|o| o.name)
            .collect::<Vec<_>>();
        assert!(!names.contains(&"extra".to_string()));

        let persisted = Connection::open(&saved).expect("open saved");
        assert!(
            list_objects(&persisted)
                .expect("list")
                .iter()
                .any(|o| o.name == "extra")
        );
    }

    #[test]
    fn working_copy_is_removed_on_drop() {
        let dir = tempdir().expect("temp dir");
        let source = dir.path().join("input.db");
        seed(&source);
        let working = WorkingDatabase::open(&source, WorkingMode::Copy).expect("open");
        let path = working.path().to_path_buf();
        assert!(path.exists());
        drop(working);
        assert!(!path.exists());
    }

    #[test]
    fn persisting_onto_the_input_under_another_spelling_keeps_it() {
        let dir = tempdir().expect("temp dir");
        let source = dir.path().join("input.db");
        seed(&source);
        fs::create_dir(dir.path().join("sub")).expect("sub dir");

        let mut working = WorkingDatabase::open(&source, WorkingMode::InPlace).expect("open");
        working
            .connection()
            .expect("conn")
            .execute_batch("CREATE VIEW extra AS SELECT 1")
            .expect("mutate");
        let size_before = fs::metadata(&source).expect("metadata").len();

        let respelled = dir.path().join("sub").join("..").join("input.db");
        working.persist_to(&respelled).expect("persist");

        assert_eq!(fs::metadata(&source).expect("metadata").len(), size_before);
        let conn = Connection::open(&source).expect("reopen");
        assert_eq!(count_rows(&conn, "items").expect("count"), 2);
        assert!(
            list_objects(&conn)
                .expect("list")
                .iter()
                .any(|o| o.name == "extra")
        );
    }

    #[cfg(unix)]
    #[test]
    fn persisting_through_a_symlink_to_the_input_keeps_it() {
        let dir = tempdir().expect("temp dir");
        let source = dir.path().join("input.db");
        seed(&source);
        let link = dir.path().join("link.db");
        std::os::unix::fs::symlink(&source, &link).expect("symlink");

        let working = WorkingDatabase::open(&source, WorkingMode::InPlace).expect("open");
        working.persist_to(&link).expect("persist");

        let conn = Connection::open(&source).expect("reopen");
        assert_eq!(count_rows(&conn, "items").expect("count"), 2);
    }

    #[test]
    fn working_copy_includes_uncheckpointed_wal_pages() {
        let dir = tempdir().expect("temp dir");
        let source = dir.path().join("input.db");
        seed(&source);

        let writer = Connection::open(&source).expect("open writer");
        let mode: String = writer
            .query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))
            .expect("wal mode");
        assert_eq!(mode, "wal");
        let _: i64 = writer
            .query_row("PRAGMA wal_autocheckpoint = 0", [], |row| row.get(0))
            .expect("disable checkpoints");
        writer
            .execute_batch("INSERT INTO items VALUES (3, 'pad', 4.0), (4, 'cap', 0.5);")
            .expect("insert");
        assert!(dir.path().join("input.db-wal").exists());

        let mut working = WorkingDatabase::open(&source, WorkingMode::Copy).expect("open");
        let rows = count_rows(working.connection().expect("conn"), "items").expect("count");
        assert_eq!(rows, 4);
        drop(writer);
    }

    #[test]
    fn empty_file_opens_as_empty_database() {
        let dir = tempdir().expect("temp dir");
        let source = dir.path().join("empty.db");
        File::create(&source).expect("create");
        let mut working = WorkingDatabase::open(&source, WorkingMode::Copy).expect("open");
        let objects = list_objects(working.connection().expect("conn")).expect("list");
        assert!(objects.is_empty());
    }

    #[test]
    fn rejects_non_sqlite_files() {
        let dir = tempdir().expect("temp dir");
        let source = dir.path().join("notes.db");
        fs::write(&source, "just some text, definitely not sqlite").expect("write");
        let err = WorkingDatabase::open(&source, WorkingMode::Copy).unwrap_err();
        assert!(err.to_string().contains("not a SQLite database"));
    }

    #[test]
    fn list_objects_counts_tables_only() {
        let dir = tempdir().expect("temp dir");
        let source = dir.path().join("input.db");
        seed(&source);
        let conn = Connection::open(&source).expect("open");
        let objects = list_objects(&conn).expect("list");
        assert_eq!(
            objects,
            vec![
                DatabaseObject {
                    name: "items".into(),
                    kind: "table".into(),
                    rows: Some(2)
                },
                DatabaseObject {
                    name: "cheap".into(),
                    kind: "view".into(),
                    rows: None
                },
            ]
        );
    }

    #[test]
    fn read_view_materializes_typed_cells() {
        let dir = tempdir().expect("temp dir");
        let source = dir.path().join("input.db");
        seed(&source);
        let conn = Connection::open(&source).expect("open");
        let dataset = read_view(&conn, "items", Some(10)).expect("read");
        assert_eq!(dataset.headers, vec!["id", "name", "price"]);
        assert_eq!(dataset.rows[0][0], Cell::Integer(1));
        assert_eq!(dataset.rows[0][2], Cell::Real(1.5));
        assert!(dataset.rows[1][2].is_null());

        let limited = read_view(&conn, "items", Some(1)).expect("read");
        assert_eq!(limited.len(), 1);
    }
}
