//! Per-batch loader parameters and their validation.
//!
//! When jobs are built programmatically (rather than parsed from a
//! pre-built command file), every job in the batch shares one
//! [`LoadParams`]: the SRID, tile size, target schema/table, and the
//! connection settings passed to the external SQL client. All of these are
//! validated once, before any job is constructed, so a bad parameter aborts
//! the whole batch up front instead of failing job by job.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Batch parameter validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParamError {
    /// SRID must be a positive EPSG code.
    #[error("invalid SRID: {0} (must be a positive EPSG code)")]
    InvalidSrid(i32),
    /// Tile size must be `WxH` with positive integers (e.g. `100x100`).
    #[error("invalid tile size: '{0}' (expected WxH, e.g. 100x100)")]
    InvalidTileSize(String),
    /// Schema/table names must be plain SQL identifiers.
    #[error("invalid SQL identifier: '{0}'")]
    InvalidIdentifier(String),
    /// Port must be non-zero.
    #[error("invalid port: 0")]
    InvalidPort,
    /// A required field was left empty.
    #[error("missing required parameter: {0}")]
    MissingField(&'static str),
}

/// Connection settings handed to the external SQL client process.
///
/// The engine never opens a database connection itself; these values are
/// only interpolated into the `psql` argument string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionParams {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub dbname: String,
}

impl Default for ConnectionParams {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            user: String::new(),
            dbname: String::new(),
        }
    }
}

/// Fixed per-batch parameters for programmatic job construction.
///
/// # Examples
///
/// ```
/// use rasterload_core::{ConnectionParams, LoadParams, validate_load_params};
///
/// let params = LoadParams {
///     srid: 4326,
///     tile_size: "100x100".to_string(),
///     schema: "elevation".to_string(),
///     table: "dem_1arc".to_string(),
///     append: true,
///     connection: ConnectionParams {
///         user: "loader".to_string(),
///         dbname: "dshub".to_string(),
///         ..Default::default()
///     },
/// };
/// assert!(validate_load_params(&params).is_empty());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadParams {
    /// Spatial reference identifier applied to every raster in the batch.
    pub srid: i32,
    /// Tile size passed to the loader, `WxH`.
    pub tile_size: String,
    /// Target schema name.
    pub schema: String,
    /// Target table name.
    pub table: String,
    /// Append to an existing table instead of creating it.
    pub append: bool,
    /// Settings for the external SQL client.
    pub connection: ConnectionParams,
}

impl LoadParams {
    /// Qualified `schema.table` target name.
    pub fn qualified_table(&self) -> String {
        format!("{}.{}", self.schema, self.table)
    }
}

/// Validates batch loader parameters, returning all problems found.
///
/// An empty result means the parameters are safe to interpolate into
/// loader and SQL-client command strings.
pub fn validate_load_params(params: &LoadParams) -> Vec<ParamError> {
    let mut errors = Vec::new();

    if params.srid <= 0 {
        errors.push(ParamError::InvalidSrid(params.srid));
    }
    if !is_valid_tile_size(&params.tile_size) {
        errors.push(ParamError::InvalidTileSize(params.tile_size.clone()));
    }
    for name in [&params.schema, &params.table] {
        if !is_sql_identifier(name) {
            errors.push(ParamError::InvalidIdentifier(name.clone()));
        }
    }
    if params.connection.port == 0 {
        errors.push(ParamError::InvalidPort);
    }
    if params.connection.user.trim().is_empty() {
        errors.push(ParamError::MissingField("user"));
    }
    if params.connection.dbname.trim().is_empty() {
        errors.push(ParamError::MissingField("dbname"));
    }

    errors
}

fn is_valid_tile_size(raw: &str) -> bool {
    let Some((width, height)) = raw.split_once('x') else {
        return false;
    };
    let positive = |s: &str| s.parse::<u32>().map(|v| v > 0).unwrap_or(false);
    positive(width) && positive(height)
}

fn is_sql_identifier(raw: &str) -> bool {
    let mut chars = raw.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
