//! SQL steps against a SQLite database.

mod after;
mod executor;
mod validator;

pub use after::JdbcAfter;
pub use executor::JdbcExecutor;
pub use validator::{JdbcValidator, NO_RESULTS};

use crate::result::Outcome;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One result row keyed by column name. SQL `NULL` is `None`.
pub type Row = HashMap<String, Option<String>>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JdbcRequest {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub driver: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

impl JdbcRequest {
    pub fn query(query: impl Into<String>) -> Self {
        Self {
            query: Some(query.into()),
            ..Self::default()
        }
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn driver(mut self, driver: impl Into<String>) -> Self {
        self.driver = Some(driver.into());
        self
    }
}

#[derive(Debug, Clone)]
pub struct JdbcResponse {
    /// Rows in result-set order.
    pub rows: Vec<Row>,
    pub success: bool,
    pub message: Option<String>,
}

impl JdbcResponse {
    pub fn rows(rows: Vec<Row>) -> Self {
        Self {
            rows,
            success: true,
            message: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            rows: Vec::new(),
            success: false,
            message: Some(message.into()),
        }
    }
}

impl Outcome for JdbcResponse {
    fn success(&self) -> bool {
        self.success
    }

    fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}
