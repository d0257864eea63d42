//! Wire types returned by the eventing REST API.
//!
//! Counters the server omits decode as zero.

use serde::{Deserialize, Serialize};

/// `GET /api/v1/list/functions`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FunctionList {
    #[serde(default)]
    pub functions: Vec<String>,
}

/// `GET /api/v1/status/{name}` wraps the status in an `app` object.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusResponse {
    pub app: FunctionStatus,
}

/// Deployment/processing status of one function.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FunctionStatus {
    /// Combined deployment + processing status string.
    pub composite_status: String,
    pub deployment_status: bool,
    pub processing_status: bool,
    pub redeploy_required: bool,
}

/// `GET /getExecutionStats?name={name}`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionStats {
    pub on_update_success: u64,
    pub on_update_failure: u64,
    pub on_delete_success: u64,
    pub on_delete_failure: u64,
    pub agg_queue_size: u64,
    pub feedback_queue_size: u64,
    pub curl: CurlCounts,
}

/// Outbound curl calls by verb.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CurlCounts {
    pub get: u64,
    pub post: u64,
    pub put: u64,
    pub delete: u64,
    pub head: u64,
}

/// `GET /getFailureStats?name={name}`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FailureStats {
    pub timeout_count: u64,
    pub bucket_op_exception_count: u64,
    pub n1ql_op_exception_count: u64,
    pub checkpoint_failure_count: u64,
    pub curl_non_200_response: u64,
    pub bucket_op_cache_miss_count: u64,
}

/// `GET /getDcpEventsRemaining?name={name}`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BacklogResponse {
    pub dcp_backlog: u64,
}

/// Everything fetched for one function in one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawFunctionStats {
    pub name: String,
    pub status: FunctionStatus,
    pub execution: ExecutionStats,
    pub failures: FailureStats,
    /// Pending change-feed items.
    pub backlog_size: u64,
}
