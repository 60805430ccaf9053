//! Read path over the cached hierarchy

use bqmirror_core::{Dataset, Project, Table};

/// What to read from the store
///
/// `None` filters match everything at that level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheQuery {
    /// All projects
    Projects,

    /// Datasets, optionally of one project
    Datasets { project: Option<String> },

    /// Tables with their columns, optionally narrowed by project, dataset and table id
    Tables {
        project: Option<String>,
        dataset: Option<String>,
        table: Option<String>,
    },
}

impl CacheQuery {
    pub fn datasets_of(project: impl Into<String>) -> Self {
        Self::Datasets {
            project: Some(project.into()),
        }
    }

    pub fn tables_of(project: impl Into<String>, dataset: impl Into<String>) -> Self {
        Self::Tables {
            project: Some(project.into()),
            dataset: Some(dataset.into()),
            table: None,
        }
    }
}

/// Rows returned by [`crate::CacheStore::query`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryResult {
    Projects(Vec<Project>),
    Datasets(Vec<Dataset>),
    Tables(Vec<Table>),
}

impl QueryResult {
    /// Number of top-level rows
    pub fn len(&self) -> usize {
        match self {
            Self::Projects(rows) => rows.len(),
            Self::Datasets(rows) => rows.len(),
            Self::Tables(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
