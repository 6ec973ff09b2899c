//! Query collaborator: runs one query against a workspace over HTTP

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::AccessToken;
use crate::error::LogQueryError;
use crate::model::{Cell, Column, QueryRequest, QueryResult, Table};

/// Runs a query against a target workspace
#[async_trait]
pub trait LogsQuery: Send + Sync {
    async fn query_workspace(
        &self,
        workspace_id: &str,
        request: &QueryRequest,
    ) -> Result<QueryResult, LogQueryError>;
}

#[derive(Debug, Serialize)]
struct QueryBody<'a> {
    query: &'a str,
    timespan: String,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    tables: Vec<WireTable>,
    #[serde(default)]
    error: Option<ServiceError>,
}

#[derive(Debug, Deserialize)]
struct WireTable {
    name: String,
    columns: Vec<Column>,
    #[serde(default)]
    rows: Vec<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ServiceError,
}

#[derive(Debug, Deserialize)]
struct ServiceError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl ServiceError {
    fn describe(&self) -> String {
        match (&self.code, &self.message) {
            (Some(code), Some(message)) => format!("{}: {}", code, message),
            (None, Some(message)) => message.clone(),
            (Some(code), None) => code.clone(),
            (None, None) => "unknown service error".to_string(),
        }
    }
}

impl WireTable {
    fn into_table(self) -> Table {
        let columns = self.columns;
        let rows = self
            .rows
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .enumerate()
                    .map(|(i, value)| {
                        let column_type = columns.get(i).map(|c| c.column_type.as_str()).unwrap_or("");
                        Cell::from_json(value, column_type)
                    })
                    .collect()
            })
            .collect();
        Table::new(self.name, columns, rows)
    }
}

/// HTTP client for the workspace query API
pub struct LogsClient {
    http: Client,
    endpoint: Url,
    token: String,
}

impl LogsClient {
    /// Build a client bound to `endpoint` that authenticates with `token`
    pub fn new(
        endpoint: &str,
        token: &AccessToken,
        timeout: std::time::Duration,
    ) -> Result<Self, LogQueryError> {
        let url = Url::parse(endpoint).map_err(|e| {
            LogQueryError::ClientConstruction(format!("invalid query endpoint '{}': {}", endpoint, e))
        })?;
        if url.cannot_be_a_base() {
            return Err(LogQueryError::ClientConstruction(format!(
                "invalid query endpoint '{}': not a base URL",
                endpoint
            )));
        }
        if token.token.is_empty() {
            return Err(LogQueryError::ClientConstruction(
                "access token is empty".to_string(),
            ));
        }

        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LogQueryError::ClientConstruction(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            endpoint: url,
            token: token.token.clone(),
        })
    }

    /// Query URL for a workspace; the id is encoded as a single path segment
    pub fn query_url(&self, workspace_id: &str) -> Result<Url, LogQueryError> {
        if matches!(workspace_id.trim(), "" | "." | "..") {
            return Err(LogQueryError::Query(format!(
                "invalid workspace id '{}'",
                workspace_id
            )));
        }

        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| LogQueryError::Query("query endpoint is not a base URL".to_string()))?
            .pop_if_empty()
            .extend(["v1", "workspaces", workspace_id, "query"]);
        Ok(url)
    }
}

#[async_trait]
impl LogsQuery for LogsClient {
    async fn query_workspace(
        &self,
        workspace_id: &str,
        request: &QueryRequest,
    ) -> Result<QueryResult, LogQueryError> {
        let url = self.query_url(workspace_id)?;
        let request_id = Uuid::new_v4();
        let body = QueryBody {
            query: request.query(),
            timespan: request.interval().to_iso8601(),
        };

        info!(
            request_id = %request_id,
            workspace_id = workspace_id,
            timespan = %body.timespan,
            "Issuing log query"
        );

        let response = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .header("x-ms-client-request-id", request_id.to_string())
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LogQueryError::Query("query timed out".to_string())
                } else {
                    LogQueryError::Query(format!("request failed: {}", e))
                }
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| LogQueryError::Query(format!("failed to read response: {}", e)))?;

        if !status.is_success() {
            let detail = serde_json::from_str::<ErrorEnvelope>(&text)
                .map(|envelope| envelope.error.describe())
                .unwrap_or_else(|_| text.lines().next().unwrap_or("").trim().to_string());
            return Err(LogQueryError::Query(format!(
                "service returned {}: {}",
                status, detail
            )));
        }

        let parsed: QueryResponse = serde_json::from_str(&text)
            .map_err(|e| LogQueryError::Query(format!("malformed response: {}", e)))?;

        // Partial failures still carry usable tables
        if let Some(error) = &parsed.error {
            warn!(request_id = %request_id, error = %error.describe(), "Query returned a partial error");
        }

        let result = QueryResult::new(parsed.tables.into_iter().map(WireTable::into_table).collect());
        info!(
            request_id = %request_id,
            tables = result.tables.len(),
            rows = result.row_count(),
            "Query completed"
        );
        Ok(result)
    }
}
