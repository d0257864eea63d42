//! HTTP client for the eventing REST API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::StatsError;
use crate::types::*;

/// Source of live function data.
#[async_trait]
pub trait StatsSource: Send + Sync {
    /// Names of all functions currently defined on the cluster.
    async fn list_functions(&self) -> Result<Vec<String>, StatsError>;

    async fn get_status(&self, name: &str) -> Result<FunctionStatus, StatsError>;

    async fn get_execution_stats(&self, name: &str) -> Result<ExecutionStats, StatsError>;

    async fn get_failure_stats(&self, name: &str) -> Result<FailureStats, StatsError>;

    /// Pending change-feed item count.
    async fn get_backlog(&self, name: &str) -> Result<u64, StatsError>;

    /// Fetch status, counters, and backlog for one function. Fails if any
    /// of the underlying calls fails.
    async fn fetch_stats(&self, name: &str) -> Result<RawFunctionStats, StatsError> {
        let (status, execution, failures, backlog_size) = futures::try_join!(
            self.get_status(name),
            self.get_execution_stats(name),
            self.get_failure_stats(name),
            self.get_backlog(name),
        )?;
        Ok(RawFunctionStats {
            name: name.to_string(),
            status,
            execution,
            failures,
            backlog_size,
        })
    }
}

/// `StatsSource` backed by the eventing service's HTTP API.
#[derive(Clone)]
pub struct EventingClient {
    http: reqwest::Client,
    base: Url,
    credentials: Option<(String, Option<String>)>,
}

impl EventingClient {
    /// Create a client for `base_url` (e.g. `http://127.0.0.1:8096`).
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, StatsError> {
        let base = Url::parse(base_url)
            .map_err(|e| StatsError::InvalidUrl(format!("{base_url:?}: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(StatsError::InvalidUrl(format!("{base_url:?}: not a base URL")));
        }
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent("eventwatch/0.1")
            .build()
            .map_err(StatsError::Client)?;
        Ok(Self {
            http,
            base,
            credentials: None,
        })
    }

    /// Send HTTP basic auth with every request.
    pub fn with_basic_auth(mut self, username: &str, password: Option<&str>) -> Self {
        self.credentials = Some((username.to_string(), password.map(str::to_string)));
        self
    }

    pub fn base_url(&self) -> &str {
        self.base.as_str().trim_end_matches('/')
    }

    /// Append path segments to the base URL, percent-encoding each one.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, StatsError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| StatsError::InvalidUrl(self.base.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        query: &[(&str, &str)],
    ) -> Result<T, StatsError> {
        let endpoint = self.endpoint(segments)?;
        let url = endpoint.to_string();
        let mut req = self.http.get(endpoint).query(query);
        if let Some((user, pass)) = &self.credentials {
            req = req.basic_auth(user, pass.as_ref());
        }

        let resp = req.send().await.map_err(|source| StatsError::Http {
            url: url.clone(),
            source,
        })?;

        let status = resp.status();
        if !status.is_success() {
            debug!(%url, status = %status, "eventing API non-2xx");
            return Err(StatsError::Status {
                url,
                status: status.as_u16(),
            });
        }

        let body = resp.bytes().await.map_err(|source| StatsError::Http {
            url: url.clone(),
            source,
        })?;
        serde_json::from_slice(&body).map_err(|source| StatsError::Decode { url, source })
    }
}

#[async_trait]
impl StatsSource for EventingClient {
    async fn list_functions(&self) -> Result<Vec<String>, StatsError> {
        let list: FunctionList = self
            .get_json(&["api", "v1", "list", "functions"], &[])
            .await?;
        Ok(list.functions)
    }

    async fn get_status(&self, name: &str) -> Result<FunctionStatus, StatsError> {
        let resp: StatusResponse = self
            .get_json(&["api", "v1", "status", name], &[])
            .await?;
        Ok(resp.app)
    }

    async fn get_execution_stats(&self, name: &str) -> Result<ExecutionStats, StatsError> {
        self.get_json(&["getExecutionStats"], &[("name", name)]).await
    }

    async fn get_failure_stats(&self, name: &str) -> Result<FailureStats, StatsError> {
        self.get_json(&["getFailureStats"], &[("name", name)]).await
    }

    async fn get_backlog(&self, name: &str) -> Result<u64, StatsError> {
        let resp: BacklogResponse = self
            .get_json(&["getDcpEventsRemaining"], &[("name", name)])
            .await?;
        Ok(resp.dcp_backlog)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::Json;
    use axum::Router;
    use axum::extract::{Path, Query};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::get;
    use serde_json::{Value, json};
    use std::collections::HashMap;

    /// Serve a fake eventing API on an ephemeral port and return its base URL.
    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn eventing_router() -> Router {
        base_routes().route(
            "/getFailureStats",
            get(|| async { Json(json!({ "timeout_count": 1, "n1ql_op_exception_count": 5 })) }),
        )
    }

    /// Every endpoint except failure stats.
    fn base_routes() -> Router {
        Router::new()
            .route(
                "/api/v1/list/functions",
                get(|| async { Json(json!({ "functions": ["orders", "audit"] })) }),
            )
            .route(
                "/api/v1/status/{name}",
                get(|Path(name): Path<String>| async move {
                    Json(json!({
                        "app": {
                            "name": name,
                            "composite_status": "deployed",
                            "deployment_status": true,
                            "processing_status": true,
                            "redeploy_required": false,
                            "num_deployed_nodes": 1
                        },
                        "num_eventing_nodes": 1
                    }))
                }),
            )
            .route(
                "/getExecutionStats",
                get(|Query(q): Query<HashMap<String, String>>| async move {
                    assert_eq!(q.get("name").map(String::as_str), Some("orders"));
                    Json(json!({
                        "on_update_success": 120,
                        "on_update_failure": 2,
                        "on_delete_success": 7,
                        "agg_queue_size": 3,
                        "curl": { "get": 4, "post": 1 }
                    }))
                }),
            )
            .route(
                "/getDcpEventsRemaining",
                get(|| async { Json(json!({ "dcp_backlog": 1500 })) }),
            )
    }

    fn client(base_url: &str) -> EventingClient {
        EventingClient::new(base_url, Duration::from_secs(2)).unwrap()
    }

    #[tokio::test]
    async fn list_functions_decodes_names() {
        let base = serve(eventing_router()).await;
        let names = client(&base).list_functions().await.unwrap();
        assert_eq!(names, vec!["orders".to_string(), "audit".to_string()]);
    }

    #[tokio::test]
    async fn fetch_stats_combines_all_endpoints() {
        let base = serve(eventing_router()).await;
        let stats = client(&base).fetch_stats("orders").await.unwrap();

        assert_eq!(stats.name, "orders");
        assert_eq!(stats.status.composite_status, "deployed");
        assert!(!stats.status.redeploy_required);
        assert_eq!(stats.execution.on_update_failure, 2);
        // Omitted counters default to zero.
        assert_eq!(stats.execution.on_delete_failure, 0);
        assert_eq!(stats.execution.curl.get, 4);
        assert_eq!(stats.execution.curl.head, 0);
        assert_eq!(stats.failures.timeout_count, 1);
        assert_eq!(stats.failures.n1ql_op_exception_count, 5);
        assert_eq!(stats.backlog_size, 1500);
    }

    #[tokio::test]
    async fn non_success_status_is_reported() {
        let router = Router::new().route(
            "/api/v1/list/functions",
            get(|| async { (StatusCode::UNAUTHORIZED, "nope") }),
        );
        let base = serve(router).await;

        let err = client(&base).list_functions().await.unwrap_err();
        assert!(matches!(err, StatsError::Status { status: 401, .. }), "{err}");
    }

    #[tokio::test]
    async fn malformed_body_is_decode_error() {
        let router = Router::new().route(
            "/getDcpEventsRemaining",
            get(|| async { "not json" }),
        );
        let base = serve(router).await;

        let err = client(&base).get_backlog("orders").await.unwrap_err();
        assert!(matches!(err, StatsError::Decode { .. }), "{err}");
    }

    #[tokio::test]
    async fn one_failing_endpoint_fails_fetch_stats() {
        let router = base_routes().route(
            "/getFailureStats",
            get(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
        );
        let base = serve(router).await;

        let err = client(&base).fetch_stats("orders").await.unwrap_err();
        assert!(matches!(err, StatsError::Status { status: 500, .. }), "{err}");
    }

    #[tokio::test]
    async fn connection_refused_is_http_error() {
        let err = client("http://127.0.0.1:1").list_functions().await.unwrap_err();
        assert!(matches!(err, StatsError::Http { .. }), "{err}");
    }

    #[tokio::test]
    async fn basic_auth_header_is_sent() {
        let router = Router::new().route(
            "/api/v1/list/functions",
            get(|headers: HeaderMap| async move {
                let auth = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                Json::<Value>(json!({ "functions": [auth] }))
            }),
        );
        let base = serve(router).await;

        let names = client(&base)
            .with_basic_auth("Administrator", Some("password"))
            .list_functions()
            .await
            .unwrap();
        // base64("Administrator:password")
        assert_eq!(names, vec!["Basic QWRtaW5pc3RyYXRvcjpwYXNzd29yZA==".to_string()]);
    }

    #[tokio::test]
    async fn function_name_is_a_single_encoded_segment() {
        let router = Router::new().route(
            "/api/v1/status/{name}",
            get(|Path(name): Path<String>| async move {
                Json(json!({ "app": { "composite_status": name } }))
            }),
        );
        let base = serve(router).await;

        let status = client(&base).get_status("a b/c?x#y").await.unwrap();
        assert_eq!(status.composite_status, "a b/c?x#y");
    }

    #[test]
    fn endpoint_encodes_segments_under_base_path() {
        let c = client("http://localhost:8096/eventing/");
        let url = c.endpoint(&["api", "v1", "status", "a b/c"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:8096/eventing/api/v1/status/a%20b%2Fc");
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let c = client("http://localhost:8096/");
        assert_eq!(c.base_url(), "http://localhost:8096");
    }

    #[test]
    fn unusable_base_url_is_rejected() {
        for base in ["not a url", "mailto:ops@example.com"] {
            let err = EventingClient::new(base, Duration::from_secs(1)).err().unwrap();
            assert!(matches!(err, StatsError::InvalidUrl(_)), "{err}");
        }
    }
}
