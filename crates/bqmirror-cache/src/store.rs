//! SQLite-backed metadata store
//!
//! Persistent mirror of the warehouse hierarchy. The store lives at
//! `{cache_dir}/bqmirror/metadata-v{CACHE_SCHEMA_VERSION}.db`, so a release
//! that changes the stored shape opens a fresh file instead of misreading an
//! old one.
//!
//! # Design
//!
//! - One table per level: `cached_projects`, `cached_datasets`,
//!   `cached_tables`, `cached_columns`
//! - Every `replace_*` is a single transaction (delete the scope, insert the
//!   new generation), so readers see either the old or the new rows of a scope
//! - No TTL - rows persist until their scope is replaced or the store is cleared
//!
//! # Scopes
//!
//! ```text
//! projects                      -> cached_projects
//! datasets:{project}            -> cached_datasets WHERE project = ?
//! columns:{project}.{dataset}   -> cached_tables + cached_columns WHERE project = ? AND dataset = ?
//! ```

use crate::query::{CacheQuery, QueryResult};
use bqmirror_core::{Column, Dataset, Project, Scope, Table};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info, warn};

/// Current store schema version. Bump this when the stored shape changes.
pub const CACHE_SCHEMA_VERSION: u32 = 1;

/// Errors that can occur during store operations
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Failed to determine cache directory")]
    NoCacheDir,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cache store is closed")]
    Closed,

    #[error("Cache store lock poisoned")]
    Poisoned,
}

pub type CacheResult<T> = Result<T, CacheError>;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS cached_projects (
        id TEXT PRIMARY KEY
    );

    CREATE TABLE IF NOT EXISTS cached_datasets (
        project TEXT NOT NULL,
        id TEXT NOT NULL,
        location TEXT NOT NULL,
        PRIMARY KEY (project, id)
    );

    CREATE TABLE IF NOT EXISTS cached_tables (
        project TEXT NOT NULL,
        dataset TEXT NOT NULL,
        id TEXT NOT NULL,
        PRIMARY KEY (project, dataset, id)
    );

    CREATE TABLE IF NOT EXISTS cached_columns (
        project TEXT NOT NULL,
        dataset TEXT NOT NULL,
        table_id TEXT NOT NULL,
        name TEXT NOT NULL,
        data_type TEXT NOT NULL,
        ordinal INTEGER NOT NULL,
        PRIMARY KEY (project, dataset, table_id, name)
    );

    CREATE TABLE IF NOT EXISTS meta (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );
";

/// Durable, scoped mirror of warehouse metadata
///
/// All access goes through one connection behind a mutex, so replaces on
/// disjoint scopes from different tasks are serialized and never interleave.
pub struct CacheStore {
    conn: Mutex<Option<Connection>>,
    path: Option<PathBuf>,
}

impl CacheStore {
    /// Open or create the per-user store
    pub fn open_default() -> CacheResult<Self> {
        Self::open(&Self::default_path()?)
    }

    /// Open or create a store at `path`
    pub fn open(path: &Path) -> CacheResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(Some(conn)),
            path: Some(path.to_path_buf()),
        };
        store.initialize()?;

        info!(path = %path.display(), "opened metadata cache");
        Ok(store)
    }

    /// Open an in-memory store (for testing)
    pub fn open_in_memory() -> CacheResult<Self> {
        let store = Self {
            conn: Mutex::new(Some(Connection::open_in_memory()?)),
            path: None,
        };
        store.initialize()?;
        Ok(store)
    }

    /// Versioned file name of the store
    pub fn file_name() -> String {
        format!("metadata-v{}.db", CACHE_SCHEMA_VERSION)
    }

    /// Path of the per-user store
    pub fn default_path() -> CacheResult<PathBuf> {
        let base = dirs::cache_dir()
            .or_else(|| dirs::home_dir().map(|home| home.join(".cache")))
            .ok_or(CacheError::NoCacheDir)?;
        Ok(base.join("bqmirror").join(Self::file_name()))
    }

    /// Backing file, `None` for in-memory stores
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn with_conn<T>(&self, f: impl FnOnce(&mut Connection) -> CacheResult<T>) -> CacheResult<T> {
        let mut guard = self.conn.lock().map_err(|_| CacheError::Poisoned)?;
        let conn = guard.as_mut().ok_or(CacheError::Closed)?;
        f(conn)
    }

    /// Create tables if absent and check the stored version
    ///
    /// Safe to call on a store that is already initialized.
    pub fn initialize(&self) -> CacheResult<()> {
        self.with_conn(|conn| {
            conn.execute_batch(SCHEMA)?;

            let stored: Option<String> = conn
                .query_row("SELECT value FROM meta WHERE key = 'version'", [], |row| row.get(0))
                .optional()?;

            match stored {
                Some(v) if v == CACHE_SCHEMA_VERSION.to_string() => {}
                Some(v) => {
                    // Only reachable through an explicit path override
                    warn!(stored = %v, current = CACHE_SCHEMA_VERSION, "cache version mismatch, clearing");
                    clear_all(conn)?;
                    set_version(conn)?;
                }
                None => set_version(conn)?,
            }
            Ok(())
        })
    }

    /// Remove every cached row
    pub fn clear(&self) -> CacheResult<()> {
        self.with_conn(|conn| {
            clear_all(conn)?;
            info!("cleared metadata cache");
            Ok(())
        })
    }

    /// Replace the global project list
    pub fn replace_projects(&self, projects: &[Project]) -> CacheResult<()> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM cached_projects", [])?;
            {
                let mut insert = tx.prepare("INSERT OR IGNORE INTO cached_projects (id) VALUES (?1)")?;
                for project in projects {
                    insert.execute(params![project.id])?;
                }
            }
            touch(&tx, &Scope::Projects)?;
            tx.commit()?;

            debug!(count = projects.len(), "replaced projects");
            Ok(())
        })
    }

    /// Replace the datasets of one project
    ///
    /// Datasets whose `project` differs from `project` are ignored.
    pub fn replace_datasets(&self, project: &str, datasets: &[Dataset]) -> CacheResult<()> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM cached_datasets WHERE project = ?1", params![project])?;
            {
                let mut insert = tx.prepare(
                    "INSERT OR IGNORE INTO cached_datasets (project, id, location) VALUES (?1, ?2, ?3)",
                )?;
                for dataset in datasets.iter().filter(|d| d.project == project) {
                    insert.execute(params![project, dataset.id, dataset.location])?;
                }
            }
            touch(&tx, &Scope::datasets(project))?;
            tx.commit()?;

            debug!(project, count = datasets.len(), "replaced datasets");
            Ok(())
        })
    }

    /// Replace the tables and columns of one dataset
    ///
    /// A table id that appears twice keeps only its first definition.
    pub fn replace_columns(&self, project: &str, dataset: &str, tables: &[Table]) -> CacheResult<()> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "DELETE FROM cached_columns WHERE project = ?1 AND dataset = ?2",
                params![project, dataset],
            )?;
            tx.execute(
                "DELETE FROM cached_tables WHERE project = ?1 AND dataset = ?2",
                params![project, dataset],
            )?;
            {
                let mut insert_table = tx.prepare(
                    "INSERT OR IGNORE INTO cached_tables (project, dataset, id) VALUES (?1, ?2, ?3)",
                )?;
                let mut insert_column = tx.prepare(
                    "INSERT OR IGNORE INTO cached_columns
                        (project, dataset, table_id, name, data_type, ordinal)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                )?;

                for table in tables {
                    if insert_table.execute(params![project, dataset, table.id])? == 0 {
                        continue;
                    }
                    for (ordinal, column) in table.columns.iter().enumerate() {
                        insert_column.execute(params![
                            project,
                            dataset,
                            table.id,
                            column.name,
                            column.data_type,
                            ordinal as i64
                        ])?;
                    }
                }
            }
            touch(&tx, &Scope::columns(project, dataset))?;
            tx.commit()?;

            debug!(project, dataset, count = tables.len(), "replaced tables");
            Ok(())
        })
    }

    /// Read rows matching `query`
    pub fn query(&self, query: &CacheQuery) -> CacheResult<QueryResult> {
        self.with_conn(|conn| match query {
            CacheQuery::Projects => read_projects(conn).map(QueryResult::Projects),
            CacheQuery::Datasets { project } => {
                read_datasets(conn, project.as_deref()).map(QueryResult::Datasets)
            }
            CacheQuery::Tables { project, dataset, table } => read_tables(
                conn,
                project.as_deref(),
                dataset.as_deref(),
                table.as_deref(),
            )
            .map(QueryResult::Tables),
        })
    }

    /// All cached projects
    pub fn projects(&self) -> CacheResult<Vec<Project>> {
        self.with_conn(|conn| read_projects(conn))
    }

    /// Cached datasets of one project
    pub fn datasets(&self, project: &str) -> CacheResult<Vec<Dataset>> {
        self.with_conn(|conn| read_datasets(conn, Some(project)))
    }

    /// Cached tables (with columns) of one dataset
    pub fn tables(&self, project: &str, dataset: &str) -> CacheResult<Vec<Table>> {
        self.with_conn(|conn| read_tables(conn, Some(project), Some(dataset), None))
    }

    /// When `scope` was last replaced (RFC 3339), if ever
    pub fn last_refresh(&self, scope: &Scope) -> CacheResult<Option<String>> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT value FROM meta WHERE key = ?1",
                    params![refresh_key(scope)],
                    |row| row.get(0),
                )
                .optional()?)
        })
    }

    /// Flush and close the underlying connection
    ///
    /// Later calls on this store return [`CacheError::Closed`]. Closing twice is a no-op.
    pub fn close(&self) -> CacheResult<()> {
        let mut guard = self.conn.lock().map_err(|_| CacheError::Poisoned)?;
        if let Some(conn) = guard.take() {
            conn.close().map_err(|(_, e)| CacheError::Sqlite(e))?;
            info!("closed metadata cache");
        }
        Ok(())
    }

    /// Whether [`CacheStore::close`] has been called
    pub fn is_closed(&self) -> bool {
        self.conn.lock().map(|guard| guard.is_none()).unwrap_or(true)
    }
}

fn set_version(conn: &Connection) -> CacheResult<()> {
    conn.execute(
        "INSERT OR REPLACE INTO meta (key, value) VALUES ('version', ?1)",
        params![CACHE_SCHEMA_VERSION.to_string()],
    )?;
    Ok(())
}

fn clear_all(conn: &Connection) -> CacheResult<()> {
    conn.execute_batch(
        "
        DELETE FROM cached_columns;
        DELETE FROM cached_tables;
        DELETE FROM cached_datasets;
        DELETE FROM cached_projects;
        DELETE FROM meta WHERE key LIKE 'refreshed:%';
        ",
    )?;
    Ok(())
}

fn read_projects(conn: &Connection) -> CacheResult<Vec<Project>> {
    let mut stmt = conn.prepare("SELECT id FROM cached_projects ORDER BY id")?;
    let rows = stmt
        .query_map([], |row| Ok(Project::new(row.get::<_, String>(0)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn read_datasets(conn: &Connection, project: Option<&str>) -> CacheResult<Vec<Dataset>> {
    let mut stmt = conn.prepare(
        "SELECT project, id, location FROM cached_datasets
         WHERE (?1 IS NULL OR project = ?1)
         ORDER BY project, id",
    )?;
    let rows = stmt
        .query_map(params![project], |row| {
            Ok(Dataset {
                project: row.get(0)?,
                id: row.get(1)?,
                location: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Tables with their columns in ordinal order; a table with no columns still appears
fn read_tables(
    conn: &Connection,
    project: Option<&str>,
    dataset: Option<&str>,
    table: Option<&str>,
) -> CacheResult<Vec<Table>> {
    let mut stmt = conn.prepare(
        "SELECT t.project, t.dataset, t.id, c.name, c.data_type
         FROM cached_tables t
         LEFT JOIN cached_columns c
           ON c.project = t.project AND c.dataset = t.dataset AND c.table_id = t.id
         WHERE (?1 IS NULL OR t.project = ?1)
           AND (?2 IS NULL OR t.dataset = ?2)
           AND (?3 IS NULL OR t.id = ?3)
         ORDER BY t.project, t.dataset, t.id, c.ordinal",
    )?;
    let mut rows = stmt.query(params![project, dataset, table])?;

    let mut tables: Vec<Table> = Vec::new();
    while let Some(row) = rows.next()? {
        let project: String = row.get(0)?;
        let dataset: String = row.get(1)?;
        let id: String = row.get(2)?;
        let name: Option<String> = row.get(3)?;
        let data_type: Option<String> = row.get(4)?;

        let same_table = tables
            .last()
            .is_some_and(|t| t.project == project && t.dataset == dataset && t.id == id);
        if !same_table {
            tables.push(Table {
                project,
                dataset,
                id,
                columns: Vec::new(),
            });
        }
        if let (Some(name), Some(data_type), Some(last)) = (name, data_type, tables.last_mut()) {
            last.columns.push(Column::new(name, data_type));
        }
    }
    Ok(tables)
}

fn refresh_key(scope: &Scope) -> String {
    format!("refreshed:{}", scope)
}

fn touch(conn: &Connection, scope: &Scope) -> CacheResult<()> {
    conn.execute(
        "INSERT OR REPLACE INTO meta (key, value) VALUES (?1, ?2)",
        params![refresh_key(scope), chrono::Utc::now().to_rfc3339()],
    )?;
    Ok(())
}
