//! Filter string parsing
//!
//! Turns the raw `--filter` string into a validated, backend-specific
//! descriptor. Two dialects exist:
//!
//! ```text
//! remote:    kismet.device.base.macaddr kismet.device.base.location
//! snapshot:  devices/devmac devices/avg_lat devices/avg_lon
//! ```
//!
//! Remote tokens are passed to Kismet untouched; the service decides
//! whether a field path is legal. Snapshot tokens must all name the same
//! table.

use crate::reader::{ReaderError, ReaderResult};

/// Separator between table and column in a snapshot token
const TABLE_SEPARATOR: char = '/';

/// Which backend dialect a filter string is written in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMode {
    Remote,
    Snapshot,
}

/// Field-path selectors for the remote service, in request order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFilter {
    fields: Vec<String>,
}

impl RemoteFilter {
    /// Parse a whitespace-separated list of field paths
    pub fn parse(raw: &str) -> ReaderResult<Self> {
        let fields: Vec<String> = raw.split_whitespace().map(str::to_string).collect();

        if fields.is_empty() {
            return Err(ReaderError::Configuration(
                "remote filter needs at least one field path".to_string(),
            ));
        }

        Ok(Self { fields })
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }
}

/// One table and the ordered columns requested from it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotFilter {
    table: String,
    columns: Vec<String>,
}

impl SnapshotFilter {
    /// Parse whitespace-separated `table/column` tokens
    pub fn parse(raw: &str) -> ReaderResult<Self> {
        let mut table: Option<&str> = None;
        let mut columns = Vec::new();

        for token in raw.split_whitespace() {
            let (token_table, column) = split_token(token)?;

            match table {
                None => table = Some(token_table),
                Some(existing) if existing != token_table => {
                    return Err(ReaderError::Configuration(format!(
                        "filter '{}' names table '{}' but earlier filters use '{}'; \
                         all snapshot filters must use one table",
                        token, token_table, existing
                    )));
                }
                Some(_) => {}
            }

            columns.push(column.to_string());
        }

        let table = table.ok_or_else(|| {
            ReaderError::Configuration(
                "snapshot filter needs at least one table/column pair".to_string(),
            )
        })?;

        Ok(Self {
            table: table.to_string(),
            columns,
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }
}

fn split_token(token: &str) -> ReaderResult<(&str, &str)> {
    let parts: Vec<&str> = token.split(TABLE_SEPARATOR).collect();

    match parts.as_slice() {
        [table, column] if !table.is_empty() && !column.is_empty() => Ok((*table, *column)),
        _ => Err(ReaderError::Configuration(format!(
            "bad snapshot filter '{}': expected table{}column",
            token, TABLE_SEPARATOR
        ))),
    }
}

/// Validated filter for exactly one backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterDescriptor {
    Remote(RemoteFilter),
    Snapshot(SnapshotFilter),
}

/// Parse `raw` in the dialect selected by `mode`
pub fn parse_filter(raw: &str, mode: FilterMode) -> ReaderResult<FilterDescriptor> {
    match mode {
        FilterMode::Remote => RemoteFilter::parse(raw).map(FilterDescriptor::Remote),
        FilterMode::Snapshot => SnapshotFilter::parse(raw).map(FilterDescriptor::Snapshot),
    }
}
