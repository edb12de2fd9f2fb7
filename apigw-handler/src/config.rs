use anyhow::{ensure, Context, Result};

pub(crate) const TABLE_NAME_VAR: &str = "TABLE_NAME";

/// Settings resolved once at cold start.
#[derive(Debug, Clone)]
pub(crate) struct Config {
    pub table_name: String,
}

impl Config {
    pub(crate) fn from_env() -> Result<Self> {
        let table_name =
            std::env::var(TABLE_NAME_VAR).with_context(|| format!("{TABLE_NAME_VAR} not set"))?;
        Self::new(table_name)
    }

    fn new(table_name: String) -> Result<Self> {
        ensure!(!table_name.trim().is_empty(), "{TABLE_NAME_VAR} is empty");
        Ok(Config { table_name })
    }
}
