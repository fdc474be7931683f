//! HTTP query service client.
//!
//! Speaks the service's JSON 1.1 protocol: every operation is a POST to the
//! endpoint with an `X-Amz-Target` header naming it. Request signing is left
//! to the endpoint (a signing proxy or a local emulator); a static
//! `Authorization` header can be configured for proxies that want one.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use super::{
    ColumnInfo, ExecutionId, ExecutionStatistics, QueryExecution, QueryService, QueryState,
    RawResultPage, SavedQuery, SubmitRequest, Workgroup,
};
use crate::config::ServiceConfig;
use crate::error::{ConsoleError, Result};
use crate::paging::Page;

/// Prefix of the `X-Amz-Target` header value.
const TARGET_PREFIX: &str = "AmazonAthena";

/// Content type of the JSON 1.1 protocol.
const CONTENT_TYPE: &str = "application/x-amz-json-1.1";

/// Server-side encryption requested for result files.
const RESULT_ENCRYPTION: &str = "SSE_S3";

/// Query service client over HTTP.
#[derive(Debug, Clone)]
pub struct HttpQueryService {
    endpoint: Url,
    auth_header: Option<String>,
    client: Client,
}

impl HttpQueryService {
    /// Creates a client for the configured endpoint.
    pub fn new(config: &ServiceConfig) -> Result<Self> {
        let endpoint = config.endpoint_url()?;
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| ConsoleError::remote(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            endpoint,
            auth_header: config.auth_header.clone(),
            client,
        })
    }

    /// Issues one operation and decodes its response.
    async fn call<Req, Resp>(&self, operation: &str, request: &Req) -> Result<Resp>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        debug!("{} {}", operation, self.endpoint);

        let mut builder = self
            .client
            .post(self.endpoint.clone())
            .header("X-Amz-Target", format!("{TARGET_PREFIX}.{operation}"))
            .header("Content-Type", CONTENT_TYPE)
            .json(request);
        if let Some(auth) = &self.auth_header {
            builder = builder.header("Authorization", auth);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ConsoleError::remote(format!("{operation} request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ConsoleError::remote(format!("Failed to read response: {e}")))?;

        if !status.is_success() {
            return Err(parse_error(status, &body));
        }

        serde_json::from_str(&body).map_err(|e| {
            ConsoleError::remote(format!("Failed to parse {operation} response: {e}"))
        })
    }
}

/// Maps an error response to a [`ConsoleError`], keeping the provider's message.
fn parse_error(status: reqwest::StatusCode, body: &str) -> ConsoleError {
    if let Ok(error) = serde_json::from_str::<WireError>(body) {
        let message = error.message.or(error.message_lower);
        let kind = error
            .kind
            .as_deref()
            .map(|k| k.rsplit('#').next().unwrap_or(k).to_string());
        match (kind, message) {
            (Some(kind), Some(message)) => {
                return ConsoleError::remote(format!("{kind}: {message}"))
            }
            (None, Some(message)) => return ConsoleError::remote(message),
            (Some(kind), None) => return ConsoleError::remote(format!("{kind} ({status})")),
            (None, None) => {}
        }
    }
    ConsoleError::remote(format!("Service error ({status}): {body}"))
}

fn timestamp(secs: Option<f64>) -> Option<DateTime<Utc>> {
    secs.and_then(|s| DateTime::<Utc>::from_timestamp_millis((s * 1000.0).round() as i64))
}

fn convert_execution(wire: WireExecution) -> Result<QueryExecution> {
    let id = wire
        .query_execution_id
        .ok_or_else(|| ConsoleError::remote("Query execution without id"))?;
    let status = wire.status.unwrap_or_default();
    let state = status
        .state
        .as_deref()
        .ok_or_else(|| ConsoleError::remote(format!("Query execution {id} has no state")))
        .and_then(QueryState::parse)?;
    let context = wire.query_execution_context.unwrap_or_default();

    Ok(QueryExecution {
        id: ExecutionId::new(id),
        query: wire.query.unwrap_or_default(),
        status: state,
        state_reason: status.state_change_reason,
        created: timestamp(status.submission_date_time),
        completed: timestamp(status.completion_date_time),
        workgroup: wire.work_group,
        catalog: context.catalog,
        database: context.database,
        output_location: wire.result_configuration.and_then(|r| r.output_location),
        statistics: wire.statistics.map(|s| ExecutionStatistics {
            engine_execution_time_ms: s.engine_execution_time_in_millis,
            data_scanned_bytes: s.data_scanned_in_bytes,
        }),
    })
}

fn convert_results(wire: WireResultsResponse) -> RawResultPage {
    let result_set = wire.result_set.unwrap_or_default();
    let columns = result_set
        .result_set_metadata
        .map(|m| {
            m.column_info
                .into_iter()
                .map(|c| ColumnInfo::new(c.name, c.data_type))
                .collect()
        })
        .unwrap_or_default();
    let rows = result_set
        .rows
        .into_iter()
        .map(|row| row.data.into_iter().map(|d| d.var_char_value).collect())
        .collect();

    RawResultPage {
        columns,
        rows,
        next_token: wire.next_token,
    }
}

fn start_request(request: &SubmitRequest) -> WireStartRequest<'_> {
    WireStartRequest {
        query_string: &request.query,
        work_group: &request.workgroup,
        query_execution_context: request
            .database
            .as_deref()
            .map(|database| WireContextRequest { database }),
        result_configuration: WireResultConfigurationRequest {
            output_location: request.output_location.as_deref(),
            encryption_configuration: WireEncryption {
                encryption_option: RESULT_ENCRYPTION,
            },
        },
    }
}

#[async_trait]
impl QueryService for HttpQueryService {
    async fn submit(&self, request: &SubmitRequest) -> Result<ExecutionId> {
        let response: WireStartResponse = self
            .call("StartQueryExecution", &start_request(request))
            .await?;
        response
            .query_execution_id
            .filter(|id| !id.is_empty())
            .map(ExecutionId::new)
            .ok_or(ConsoleError::NoExecutionId)
    }

    async fn get_execution(&self, id: &ExecutionId) -> Result<QueryExecution> {
        let response: WireGetExecutionResponse = self
            .call(
                "GetQueryExecution",
                &WireExecutionIdRequest {
                    query_execution_id: id.as_str(),
                },
            )
            .await?;
        let wire = response
            .query_execution
            .ok_or_else(|| ConsoleError::remote(format!("Query execution {id} was not found")))?;
        convert_execution(wire)
    }

    async fn get_results(&self, id: &ExecutionId, token: Option<&str>) -> Result<RawResultPage> {
        let response: WireResultsResponse = self
            .call(
                "GetQueryResults",
                &WireResultsRequest {
                    query_execution_id: id.as_str(),
                    next_token: token,
                },
            )
            .await?;
        Ok(convert_results(response))
    }

    async fn list_workgroups(&self, token: Option<&str>) -> Result<Page<Workgroup>> {
        let response: WireListWorkgroupsResponse = self
            .call("ListWorkGroups", &WireListRequest { work_group: None, next_token: token })
            .await?;
        let items = response
            .work_groups
            .into_iter()
            .map(|w| Workgroup::new(w.name.unwrap_or_else(|| "Unknown".to_string())))
            .collect();
        Ok(Page::new(items, response.next_token))
    }

    async fn list_saved_queries(
        &self,
        workgroup: &str,
        token: Option<&str>,
    ) -> Result<Page<SavedQuery>> {
        let ids: WireNamedQueryIds = self
            .call(
                "ListNamedQueries",
                &WireListRequest {
                    work_group: Some(workgroup),
                    next_token: token,
                },
            )
            .await?;
        if ids.named_query_ids.is_empty() {
            return Ok(Page::new(Vec::new(), ids.next_token));
        }

        let batch: WireNamedQueries = self
            .call(
                "BatchGetNamedQuery",
                &WireBatchNamedQueryRequest {
                    named_query_ids: &ids.named_query_ids,
                },
            )
            .await?;
        let items = batch
            .named_queries
            .into_iter()
            .map(|q| SavedQuery {
                key: q.named_query_id.unwrap_or_default(),
                name: q.name,
                body: q.query_string,
                description: q.description,
            })
            .collect();
        Ok(Page::new(items, ids.next_token))
    }

    async fn list_executions(
        &self,
        workgroup: &str,
        token: Option<&str>,
    ) -> Result<Page<QueryExecution>> {
        let ids: WireExecutionIds = self
            .call(
                "ListQueryExecutions",
                &WireListRequest {
                    work_group: Some(workgroup),
                    next_token: token,
                },
            )
            .await?;
        if ids.query_execution_ids.is_empty() {
            return Ok(Page::new(Vec::new(), ids.next_token));
        }

        let batch: WireExecutions = self
            .call(
                "BatchGetQueryExecution",
                &WireBatchExecutionRequest {
                    query_execution_ids: &ids.query_execution_ids,
                },
            )
            .await?;
        let items = batch
            .query_executions
            .into_iter()
            .map(convert_execution)
            .collect::<Result<Vec<_>>>()?;
        Ok(Page::new(items, ids.next_token))
    }
}

// Wire format types.

#[derive(Debug, Deserialize)]
struct WireError {
    #[serde(rename = "__type")]
    kind: Option<String>,
    #[serde(rename = "Message")]
    message: Option<String>,
    #[serde(rename = "message")]
    message_lower: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct WireStartRequest<'a> {
    query_string: &'a str,
    work_group: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    query_execution_context: Option<WireContextRequest<'a>>,
    result_configuration: WireResultConfigurationRequest<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct WireContextRequest<'a> {
    database: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct WireResultConfigurationRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    output_location: Option<&'a str>,
    encryption_configuration: WireEncryption,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct WireEncryption {
    encryption_option: &'static str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireStartResponse {
    query_execution_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct WireExecutionIdRequest<'a> {
    query_execution_id: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireGetExecutionResponse {
    query_execution: Option<WireExecution>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireExecution {
    query_execution_id: Option<String>,
    query: Option<String>,
    status: Option<WireStatus>,
    work_group: Option<String>,
    query_execution_context: Option<WireContext>,
    result_configuration: Option<WireResultConfiguration>,
    statistics: Option<WireStatistics>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireStatus {
    state: Option<String>,
    state_change_reason: Option<String>,
    submission_date_time: Option<f64>,
    completion_date_time: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireContext {
    database: Option<String>,
    catalog: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireResultConfiguration {
    output_location: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireStatistics {
    engine_execution_time_in_millis: Option<u64>,
    data_scanned_in_bytes: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct WireResultsRequest<'a> {
    query_execution_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    next_token: Option<&'a str>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireResultsResponse {
    result_set: Option<WireResultSet>,
    next_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireResultSet {
    #[serde(default)]
    rows: Vec<WireRow>,
    result_set_metadata: Option<WireResultSetMetadata>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireRow {
    #[serde(default)]
    data: Vec<WireDatum>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireDatum {
    var_char_value: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireResultSetMetadata {
    #[serde(default)]
    column_info: Vec<WireColumn>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireColumn {
    name: String,
    #[serde(rename = "Type")]
    data_type: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct WireListRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    work_group: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    next_token: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireListWorkgroupsResponse {
    #[serde(default)]
    work_groups: Vec<WireWorkgroup>,
    next_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireWorkgroup {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireNamedQueryIds {
    #[serde(default)]
    named_query_ids: Vec<String>,
    next_token: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct WireBatchNamedQueryRequest<'a> {
    named_query_ids: &'a [String],
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireNamedQueries {
    #[serde(default)]
    named_queries: Vec<WireNamedQuery>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireNamedQuery {
    named_query_id: Option<String>,
    name: String,
    description: Option<String>,
    query_string: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireExecutionIds {
    #[serde(default)]
    query_execution_ids: Vec<String>,
    next_token: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct WireBatchExecutionRequest<'a> {
    query_execution_ids: &'a [String],
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireExecutions {
    #[serde(default)]
    query_executions: Vec<WireExecution>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_start_request_shape() {
        let request = SubmitRequest::new("primary", "SELECT 1")
            .with_database(Some("events".to_string()))
            .with_output_location(Some("s3://results/".to_string()));

        let value = serde_json::to_value(start_request(&request)).unwrap();
        assert_eq!(
            value,
            json!({
                "QueryString": "SELECT 1",
                "WorkGroup": "primary",
                "QueryExecutionContext": { "Database": "events" },
                "ResultConfiguration": {
                    "OutputLocation": "s3://results/",
                    "EncryptionConfiguration": { "EncryptionOption": "SSE_S3" }
                }
            })
        );
    }

    #[test]
    fn test_start_request_omits_unset_fields() {
        let request = SubmitRequest::new("primary", "SELECT 1");
        let value = serde_json::to_value(start_request(&request)).unwrap();
        assert!(value.get("QueryExecutionContext").is_none());
        assert!(value["ResultConfiguration"].get("OutputLocation").is_none());
    }

    #[test]
    fn test_convert_execution() {
        let wire: WireGetExecutionResponse = serde_json::from_value(json!({
            "QueryExecution": {
                "QueryExecutionId": "abc-123",
                "Query": "SELECT 1",
                "WorkGroup": "primary",
                "QueryExecutionContext": { "Database": "events", "Catalog": "AwsDataCatalog" },
                "ResultConfiguration": { "OutputLocation": "s3://results/abc-123.csv" },
                "Status": {
                    "State": "SUCCEEDED",
                    "SubmissionDateTime": 1700000000.5,
                    "CompletionDateTime": 1700000002.0
                },
                "Statistics": { "EngineExecutionTimeInMillis": 1500, "DataScannedInBytes": 2048 }
            }
        }))
        .unwrap();

        let execution = convert_execution(wire.query_execution.unwrap()).unwrap();
        assert_eq!(execution.id.as_str(), "abc-123");
        assert_eq!(execution.status, QueryState::Succeeded);
        assert_eq!(execution.database.as_deref(), Some("events"));
        assert_eq!(execution.catalog.as_deref(), Some("AwsDataCatalog"));
        assert_eq!(
            execution.output_location.as_deref(),
            Some("s3://results/abc-123.csv")
        );
        assert_eq!(execution.created.unwrap().timestamp_millis(), 1_700_000_000_500);
        assert_eq!(
            execution.statistics.unwrap().engine_execution_time_ms,
            Some(1500)
        );
    }

    #[test]
    fn test_convert_execution_requires_state() {
        let wire: WireExecution =
            serde_json::from_value(json!({ "QueryExecutionId": "abc", "Status": {} })).unwrap();
        assert!(matches!(
            convert_execution(wire),
            Err(ConsoleError::RemoteService(_))
        ));
    }

    #[test]
    fn test_convert_results() {
        let wire: WireResultsResponse = serde_json::from_value(json!({
            "ResultSet": {
                "Rows": [
                    { "Data": [ { "VarCharValue": "id" }, { "VarCharValue": "name" } ] },
                    { "Data": [ { "VarCharValue": "1" }, {} ] }
                ],
                "ResultSetMetadata": {
                    "ColumnInfo": [
                        { "Name": "id", "Type": "integer" },
                        { "Name": "name", "Type": "varchar" }
                    ]
                }
            },
            "NextToken": "tok"
        }))
        .unwrap();

        let page = convert_results(wire);
        assert_eq!(page.columns[0], ColumnInfo::new("id", "integer"));
        assert_eq!(page.rows.len(), 2);
        assert_eq!(page.rows[1], vec![Some("1".to_string()), None]);
        assert_eq!(page.next_token.as_deref(), Some("tok"));
    }

    #[test]
    fn test_parse_error_keeps_provider_message() {
        let err = parse_error(
            reqwest::StatusCode::BAD_REQUEST,
            r#"{"__type":"com.amazonaws.athena#InvalidRequestException","Message":"line 1:8: mismatched input"}"#,
        );
        assert_eq!(
            err,
            ConsoleError::remote("InvalidRequestException: line 1:8: mismatched input")
        );
    }

    #[test]
    fn test_parse_error_unstructured_body() {
        let err = parse_error(reqwest::StatusCode::BAD_GATEWAY, "upstream down");
        assert!(err.to_string().contains("upstream down"));
        assert!(err.to_string().contains("502"));
    }

    #[test]
    fn test_new_rejects_bad_endpoint() {
        let config = ServiceConfig {
            endpoint: Some("not a url".to_string()),
            ..ServiceConfig::default()
        };
        assert!(HttpQueryService::new(&config).is_err());
    }
}
