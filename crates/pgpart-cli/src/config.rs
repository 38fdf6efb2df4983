//! CLI configuration from environment variables.

use anyhow::{Context, Result};

#[derive(Debug, Clone)]
pub struct CliConfig {
    /// Connection string with any `table` query parameter removed.
    pub database_url: String,
    /// Parent table named by `?table=` in `DATABASE_URL`, used when
    /// `--table` is not given.
    pub table: Option<String>,
    pub max_connections: u32,
    /// Schema to put on the `search_path` of every connection.
    pub schema: Option<String>,
}

impl CliConfig {
    pub fn from_env() -> Result<Self> {
        let raw_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let (database_url, table) = split_table_param(&raw_url)?;
        Ok(Self {
            database_url,
            table,
            max_connections: std::env::var("PGPART_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .context("Invalid PGPART_MAX_CONNECTIONS")?,
            schema: std::env::var("PGPART_SCHEMA")
                .ok()
                .filter(|s| !s.is_empty()),
        })
    }

    /// Like [`from_env`](Self::from_env), but an unset `DATABASE_URL` is
    /// `None` rather than an error. Malformed values still fail.
    pub fn from_env_if_set() -> Result<Option<Self>> {
        match std::env::var("DATABASE_URL") {
            Err(std::env::VarError::NotPresent) => Ok(None),
            _ => Self::from_env().map(Some),
        }
    }
}

/// Split `postgres://host/db?sslmode=require&table=events` into the
/// connection string without `table` and the table name.
fn split_table_param(uri: &str) -> Result<(String, Option<String>)> {
    let mut parsed = url::Url::parse(uri).context("Invalid DATABASE_URL")?;
    let mut table = None;
    let kept: Vec<(String, String)> = parsed
        .query_pairs()
        .filter_map(|(k, v)| {
            if k == "table" {
                table = Some(v.to_string());
                None
            } else {
                Some((k.to_string(), v.to_string()))
            }
        })
        .collect();

    if table.is_none() {
        return Ok((uri.to_string(), None));
    }
    if kept.is_empty() {
        parsed.set_query(None);
    } else {
        parsed.query_pairs_mut().clear().extend_pairs(kept);
    }
    Ok((parsed.to_string(), table))
}
