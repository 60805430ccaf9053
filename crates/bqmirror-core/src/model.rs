//! Warehouse metadata model
//!
//! The hierarchy mirrored locally is project → dataset → table → column.
//! Table ids are stored in their folded form: date-sharded tables such as
//! `events_20210101` and `events_20210102` collapse into one `events_*` entry.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Minimum length of a trailing digit run that is folded into `*`
pub const SHARD_SUFFIX_MIN_DIGITS: usize = 8;

/// A warehouse project
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Project {
    /// Project id (globally unique)
    pub id: String,
}

impl Project {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// A dataset inside a project
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dataset {
    /// Owning project id
    pub project: String,

    /// Dataset id (unique within the project)
    pub id: String,

    /// Processing location (e.g. `US`, `asia-northeast1`)
    ///
    /// Queries against the dataset's INFORMATION_SCHEMA must be routed here.
    pub location: String,
}

impl Dataset {
    pub fn new(
        project: impl Into<String>,
        id: impl Into<String>,
        location: impl Into<String>,
    ) -> Self {
        Self {
            project: project.into(),
            id: id.into(),
            location: location.into(),
        }
    }
}

/// A column of a (possibly folded) table
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Column {
    /// Column name
    pub name: String,

    /// Warehouse type string, kept opaque (`STRUCT<a INT64>`, `ARRAY<STRING>`, ...)
    pub data_type: String,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
        }
    }
}

/// A table with its columns
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    /// Owning project id
    pub project: String,

    /// Owning dataset id
    pub dataset: String,

    /// Folded table id
    pub id: String,

    /// Columns in warehouse ordinal order
    pub columns: Vec<Column>,
}

impl Table {
    /// Create a table, folding the given name
    pub fn new(
        project: impl Into<String>,
        dataset: impl Into<String>,
        name: &str,
        columns: Vec<Column>,
    ) -> Self {
        Self {
            project: project.into(),
            dataset: dataset.into(),
            id: fold_shard_suffix(name),
            columns,
        }
    }

    /// Group flat `(table_name, column)` rows into tables
    ///
    /// Table names are folded before grouping, so every shard of a date-sharded
    /// table lands in the same group. Within a group the first occurrence of a
    /// column name wins. Groups keep the order in which they first appear.
    pub fn group_rows<I>(project: &str, dataset: &str, rows: I) -> Vec<Table>
    where
        I: IntoIterator<Item = (String, Column)>,
    {
        let mut tables: Vec<Table> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();

        for (table_name, column) in rows {
            let id = fold_shard_suffix(&table_name);
            let slot = match index.get(&id) {
                Some(&slot) => slot,
                None => {
                    tables.push(Table {
                        project: project.to_string(),
                        dataset: dataset.to_string(),
                        id: id.clone(),
                        columns: Vec::new(),
                    });
                    index.insert(id, tables.len() - 1);
                    tables.len() - 1
                }
            };

            let table = &mut tables[slot];
            if !table.columns.iter().any(|c| c.name == column.name) {
                table.columns.push(column);
            }
        }

        tables
    }

    /// Find a column by name
    pub fn find_column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// Fold a trailing run of [`SHARD_SUFFIX_MIN_DIGITS`] or more ASCII digits into `*`
///
/// `u_20210101` becomes `u_*`; `u_2021` and `users` are returned unchanged.
pub fn fold_shard_suffix(name: &str) -> String {
    let digits = name
        .bytes()
        .rev()
        .take_while(|b| b.is_ascii_digit())
        .count();

    if digits >= SHARD_SUFFIX_MIN_DIGITS {
        let mut folded = String::with_capacity(name.len() - digits + 1);
        folded.push_str(&name[..name.len() - digits]);
        folded.push('*');
        folded
    } else {
        name.to_string()
    }
}

/// A lexical token with its 1-based source position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    /// Line number (1-indexed)
    pub line: u32,

    /// Column number (1-indexed, in characters)
    pub column: u32,

    /// Source text of the token
    pub literal: String,
}

impl Token {
    pub fn new(line: u32, column: u32, literal: impl Into<String>) -> Self {
        Self {
            line,
            column,
            literal: literal.into(),
        }
    }
}

/// One level of the hierarchy over which a cache replace is atomic
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "lowercase")]
pub enum Scope {
    /// The global project list
    Projects,

    /// All datasets of one project
    Datasets { project: String },

    /// All tables and columns of one dataset
    Columns { project: String, dataset: String },
}

impl Scope {
    pub fn datasets(project: impl Into<String>) -> Self {
        Self::Datasets {
            project: project.into(),
        }
    }

    pub fn columns(project: impl Into<String>, dataset: impl Into<String>) -> Self {
        Self::Columns {
            project: project.into(),
            dataset: dataset.into(),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Projects => write!(f, "projects"),
            Self::Datasets { project } => write!(f, "datasets:{}", project),
            Self::Columns { project, dataset } => write!(f, "columns:{}.{}", project, dataset),
        }
    }
}
