use super::{JdbcRequest, JdbcResponse, Row};
use crate::context::ExecutionContext;
use crate::engine::Executor;
use crate::error::EngineError;
use crate::expression::interpolate;
use crate::model::{StepRequest, StepResponse};
use async_trait::async_trait;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use tracing::{debug, error, info, instrument};

const KIND: &str = "JDBC";
const SQLITE: &str = "sqlite";

#[derive(Debug, Default)]
pub struct JdbcExecutor;

impl JdbcExecutor {
    async fn send(
        &self,
        request: &JdbcRequest,
        context: &ExecutionContext,
    ) -> Result<Vec<Row>, EngineError> {
        let query = request
            .query
            .as_deref()
            .map(|query| interpolate(query, context))
            .transpose()?
            .ok_or(EngineError::NotConfigured {
                what: "query",
                kind: KIND,
            })?;
        let defaults = &context.configuration.jdbc;
        let url = request
            .url
            .as_deref()
            .or(defaults.url.as_deref())
            .ok_or(EngineError::NotConfigured {
                what: "url",
                kind: KIND,
            })?;
        let driver = request
            .driver
            .as_deref()
            .or(defaults.driver.as_deref())
            .ok_or(EngineError::NotConfigured {
                what: "driver",
                kind: KIND,
            })?;
        if !driver.eq_ignore_ascii_case(SQLITE) {
            return Err(EngineError::UnsupportedDriver(driver.to_string()));
        }

        let path = database_path(url).to_string();
        info!("Query: {}", query);
        let rows = tokio::task::spawn_blocking(move || run_query(&path, &query))
            .await
            .map_err(|e| EngineError::Protocol(format!("Query task failed: {e}")))??;
        debug!("Response: {} row(s)", rows.len());
        Ok(rows)
    }
}

#[async_trait]
impl Executor<JdbcRequest, JdbcResponse> for JdbcExecutor {
    #[instrument(skip_all)]
    async fn execute(
        &self,
        request: &JdbcRequest,
        context: &mut ExecutionContext,
    ) -> Result<JdbcResponse, EngineError> {
        match self.send(request, context).await {
            Ok(rows) => {
                let response = JdbcResponse::rows(rows);
                context.record(
                    StepRequest::Jdbc(request.clone()),
                    Some(StepResponse::Jdbc(response.clone())),
                );
                Ok(response)
            }
            Err(err) => {
                context.record(StepRequest::Jdbc(request.clone()), None);
                if err.is_fatal() {
                    return Err(err);
                }
                error!("JDBC request failed: {}", err);
                Ok(JdbcResponse::failed(err.to_string()))
            }
        }
    }
}

/// Strip the `jdbc:sqlite:` or `sqlite:` scheme from a database URL.
fn database_path(url: &str) -> &str {
    url.strip_prefix("jdbc:sqlite:")
        .or_else(|| url.strip_prefix("sqlite:"))
        .unwrap_or(url)
}

fn run_query(path: &str, query: &str) -> Result<Vec<Row>, EngineError> {
    let connection = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_URI,
    )?;
    let mut statement = connection.prepare(query)?;
    let columns: Vec<String> = statement
        .column_names()
        .into_iter()
        .map(str::to_string)
        .collect();

    let mut rows = Vec::new();
    let mut cursor = statement.query([])?;
    while let Some(row) = cursor.next()? {
        let mut mapped = Row::with_capacity(columns.len());
        for (idx, column) in columns.iter().enumerate() {
            mapped.insert(column.clone(), cell_text(row.get_ref(idx)?));
        }
        rows.push(mapped);
    }
    Ok(rows)
}

fn cell_text(value: ValueRef<'_>) -> Option<String> {
    match value {
        ValueRef::Null => None,
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Real(f) => Some(f.to_string()),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Some(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}
