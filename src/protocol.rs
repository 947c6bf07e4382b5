//! Wire types for the `/v1/statement` protocol.

use serde::Deserialize;

use crate::error::Error;
use crate::typesig::TypeSignature;

/// One response envelope from the coordinator. Every page of a query is
/// delivered in this shape; fields that are absent decode to their defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct QueryResults {
    pub id: String,
    pub info_uri: String,
    pub partial_cancel_uri: String,
    pub next_uri: String,
    pub columns: Vec<RawColumn>,
    pub data: Vec<Vec<serde_json::Value>>,
    pub stats: QueryStats,
    pub error: QueryError,
    pub update_type: String,
    pub update_count: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct RawColumn {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub type_signature: TypeSignature,
}

/// Query-level execution statistics, reported on every page.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueryStats {
    pub state: String,
    pub scheduled: bool,
    pub nodes: i64,
    pub total_splits: i64,
    pub queued_splits: i64,
    pub running_splits: i64,
    pub completed_splits: i64,
    pub user_time_millis: i64,
    pub cpu_time_millis: i64,
    pub wall_time_millis: i64,
    pub processed_rows: i64,
    pub processed_bytes: i64,
    pub root_stage: Option<Box<StageStats>>,
    pub progress_percentage: f64,
}

/// Per-stage statistics, nested under [`QueryStats::root_stage`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StageStats {
    pub stage_id: String,
    pub state: String,
    pub done: bool,
    pub nodes: i64,
    pub total_splits: i64,
    pub queued_splits: i64,
    pub running_splits: i64,
    pub completed_splits: i64,
    pub user_time_millis: i64,
    pub cpu_time_millis: i64,
    pub wall_time_millis: i64,
    pub processed_rows: i64,
    pub processed_bytes: i64,
    pub sub_stages: Vec<StageStats>,
}

/// Server-side error envelope.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct QueryError {
    pub message: String,
    pub error_name: String,
    pub error_code: i32,
    pub error_location: ErrorLocation,
    pub failure_info: FailureInfo,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct ErrorLocation {
    pub line_number: i32,
    pub column_number: i32,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct FailureInfo {
    #[serde(rename = "type")]
    pub kind: String,
}

/// Translates a server error envelope into a client error. An empty error
/// name means the envelope carried no error.
pub(crate) fn check_response_error(status: u16, error: &QueryError) -> Result<(), Error> {
    match error.error_name.as_str() {
        "" => Ok(()),
        "USER_CANCELLED" => Err(Error::QueryCancelled),
        _ => Err(Error::QueryFailed {
            status,
            reason: format!("{}: {}", error.failure_info.kind, error.message),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_decodes_with_missing_fields() {
        let body = r#"{"id": "q1", "nextUri": "http://coord/v1/statement/q1/1"}"#;
        let results: QueryResults = serde_json::from_str(body).unwrap();

        assert_eq!(results.id, "q1");
        assert_eq!(results.next_uri, "http://coord/v1/statement/q1/1");
        assert!(results.columns.is_empty());
        assert!(results.data.is_empty());
        assert!(results.error.error_name.is_empty());
    }

    #[test]
    fn test_stats_decode_with_nested_stages() {
        let body = r#"{
            "id": "q1",
            "stats": {
                "state": "RUNNING",
                "completedSplits": 3,
                "rootStage": {
                    "stageId": "0",
                    "subStages": [{"stageId": "1", "processedRows": 10}]
                }
            }
        }"#;
        let results: QueryResults = serde_json::from_str(body).unwrap();

        assert_eq!(results.stats.state, "RUNNING");
        assert_eq!(results.stats.completed_splits, 3);
        let root = results.stats.root_stage.unwrap();
        assert_eq!(root.sub_stages.len(), 1);
        assert_eq!(root.sub_stages[0].processed_rows, 10);
    }

    #[test]
    fn test_user_cancelled_maps_to_cancellation() {
        let error = QueryError {
            error_name: "USER_CANCELLED".to_string(),
            ..Default::default()
        };

        assert!(matches!(
            check_response_error(200, &error),
            Err(Error::QueryCancelled)
        ));
    }

    #[test]
    fn test_named_error_maps_to_query_failed() {
        let error = QueryError {
            message: "line 1:8: Column 'x' cannot be resolved".to_string(),
            error_name: "COLUMN_NOT_FOUND".to_string(),
            failure_info: FailureInfo {
                kind: "com.facebook.presto.sql.analyzer.SemanticException".to_string(),
            },
            ..Default::default()
        };

        match check_response_error(200, &error) {
            Err(Error::QueryFailed { status, reason }) => {
                assert_eq!(status, 200);
                assert!(reason.contains("SemanticException"));
                assert!(reason.contains("cannot be resolved"));
            }
            other => panic!("expected QueryFailed, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_error_name_is_ok() {
        assert!(check_response_error(200, &QueryError::default()).is_ok());
    }
}
