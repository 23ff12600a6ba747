use super::{JdbcRequest, JdbcResponse, NO_RESULTS};
use crate::context::ExecutionContext;
use crate::engine::After;
use crate::result::{AfterResult, OUT_OF_BOUNDS};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JdbcAfter {
    /// Store one cell in `property`. `NULL` unsets the property.
    Column {
        column: String,
        #[serde(default)]
        row: usize,
        property: String,
    },
}

impl After<JdbcRequest, JdbcResponse> for JdbcAfter {
    fn name(&self) -> &'static str {
        match self {
            JdbcAfter::Column { .. } => "ColumnValue",
        }
    }

    fn apply(
        &self,
        context: &mut ExecutionContext,
        _request: &JdbcRequest,
        response: &JdbcResponse,
    ) -> AfterResult {
        let JdbcAfter::Column {
            column,
            row,
            property,
        } = self;

        if response.rows.is_empty() {
            return AfterResult::failure(self.name(), NO_RESULTS);
        }
        let Some(selected) = response.rows.get(*row) else {
            return AfterResult::failure(self.name(), OUT_OF_BOUNDS);
        };
        let Some(value) = selected.get(column) else {
            return AfterResult::failure(self.name(), format!("Column '{column}' does not exist."));
        };

        info!(
            "Assigned '{}' to property {}",
            value.as_deref().unwrap_or("null"),
            property
        );
        context.configuration.properties.set(property, value.clone());
        AfterResult::success(self.name())
    }
}
