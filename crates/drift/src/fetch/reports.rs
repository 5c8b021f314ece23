//! Admin Reports API page source.
//!
//! `GET {base_url}/admin/reports/v1/activity/users/{user_key}/applications/{category}`
//! with `startTime`, `endTime`, `maxResults` and `pageToken` query parameters.
//! Each returned activity is re-encoded as compact single-line JSON.

use async_trait::async_trait;
use serde::Deserialize;
use snafu::prelude::*;
use std::time::Duration;
use tracing::debug;

use super::{Page, PageRequest, PageSource, Record, TokenSource};
use crate::category::Category;
use crate::error::{
    ClientBuildSnafu, DecodeSnafu, EncodeSnafu, FetchError, RequestSnafu, StatusSnafu,
};
use crate::watermark::format_watermark;

/// Longest upstream error body kept in a [`FetchError::Status`].
const MAX_ERROR_BODY: usize = 512;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActivitiesResponse {
    #[serde(default)]
    items: Vec<serde_json::Value>,
    #[serde(default)]
    next_page_token: Option<String>,
}

/// HTTP client for the activities endpoint.
#[derive(Debug, Clone)]
pub struct ReportsClient {
    http: reqwest::Client,
    base_url: String,
    user_key: String,
    token: TokenSource,
}

impl ReportsClient {
    pub fn new(
        base_url: impl Into<String>,
        user_key: impl Into<String>,
        token: TokenSource,
        request_timeout: Duration,
    ) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .context(ClientBuildSnafu)?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            user_key: user_key.into(),
            token,
        })
    }

    fn activities_url(&self, category: Category) -> String {
        format!(
            "{}/admin/reports/v1/activity/users/{}/applications/{}",
            self.base_url, self.user_key, category
        )
    }
}

#[async_trait]
impl PageSource for ReportsClient {
    async fn fetch_page(&self, request: PageRequest<'_>) -> Result<Page, FetchError> {
        let category = request.category;
        let token = self.token.resolve(&self.http).await?;

        let mut query = vec![
            ("startTime", format_watermark(request.window.start)),
            ("endTime", format_watermark(request.window.end)),
            ("maxResults", request.max_results.to_string()),
        ];
        if let Some(page_token) = request.page_token {
            query.push(("pageToken", page_token.to_string()));
        }

        let response = self
            .http
            .get(self.activities_url(category))
            .bearer_auth(token)
            .query(&query)
            .send()
            .await
            .context(RequestSnafu { category })?;

        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            if body.len() > MAX_ERROR_BODY {
                let cut = (0..=MAX_ERROR_BODY)
                    .rev()
                    .find(|i| body.is_char_boundary(*i))
                    .unwrap_or(0);
                body.truncate(cut);
            }
            return StatusSnafu {
                category,
                status: status.as_u16(),
                body,
            }
            .fail();
        }

        let body: ActivitiesResponse = response.json().await.context(DecodeSnafu { category })?;

        let records = body
            .items
            .iter()
            .map(|item| {
                serde_json::to_string(item)
                    .map(Record::from)
                    .context(EncodeSnafu { category })
            })
            .collect::<Result<Vec<_>, _>>()?;

        debug!(
            category = %category,
            records = records.len(),
            has_next = body.next_page_token.is_some(),
            "Fetched activities page"
        );

        Ok(Page {
            records,
            next_page_token: body.next_page_token,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::extract::{Path, Query, State};
    use axum::http::{HeaderMap, StatusCode};
    use axum::response::{IntoResponse, Response};
    use axum::routing::{get, post};
    use chrono::{TimeZone, Utc};
    use futures::TryStreamExt;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use crate::fetch::{PaginatedFetcher, RecordFetcher};
    use crate::scheduler::PollWindow;

    #[derive(Debug, Clone)]
    struct SeenRequest {
        user: String,
        application: String,
        query: HashMap<String, String>,
        authorization: Option<String>,
    }

    #[derive(Clone, Default)]
    struct ServerState {
        seen: Arc<Mutex<Vec<SeenRequest>>>,
    }

    /// `drive` answers with a full page and a token, then a short final page.
    /// `calendar` always fails.
    async fn activities(
        State(state): State<ServerState>,
        Path((user, application)): Path<(String, String)>,
        Query(query): Query<HashMap<String, String>>,
        headers: HeaderMap,
    ) -> Response {
        let page_token = query.get("pageToken").cloned();
        state.seen.lock().unwrap().push(SeenRequest {
            user,
            application: application.clone(),
            query,
            authorization: headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
        });

        match (application.as_str(), page_token.as_deref()) {
            ("drive", None) => {
                let items: Vec<_> = (0..1000)
                    .map(|i| {
                        serde_json::json!({
                            "id": { "uniqueQualifier": i },
                            "kind": "admin#reports#activity",
                        })
                    })
                    .collect();
                axum::Json(serde_json::json!({ "items": items, "nextPageToken": "page-2" }))
                    .into_response()
            }
            ("drive", Some("page-2")) => axum::Json(serde_json::json!({
                "items": [
                    { "id": { "uniqueQualifier": 1000 } },
                    { "id": { "uniqueQualifier": 1001 } },
                ]
            }))
            .into_response(),
            ("calendar", _) => (StatusCode::FORBIDDEN, "insufficient permissions").into_response(),
            _ => {
                let body = serde_json::json!({ "kind": "admin#reports#activities" });
                axum::Json(body).into_response()
            }
        }
    }

    async fn issue_token() -> Response {
        axum::Json(serde_json::json!({ "access_token": "minted", "expires_in": 3600 }))
            .into_response()
    }

    async fn serve() -> (String, ServerState) {
        let state = ServerState::default();
        let app = Router::new()
            .route(
                "/admin/reports/v1/activity/users/{user}/applications/{application}",
                get(activities),
            )
            .route("/token", post(issue_token))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (format!("http://{addr}"), state)
    }

    fn window() -> PollWindow {
        PollWindow::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 5, 0).unwrap(),
        )
    }

    fn fetcher(base_url: &str, token: TokenSource) -> PaginatedFetcher<ReportsClient> {
        PaginatedFetcher::new(
            ReportsClient::new(base_url, "all", token, Duration::from_secs(5)).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_second_page_requested_and_totals_both_pages() {
        let (base_url, state) = serve().await;
        let fetcher = fetcher(&base_url, TokenSource::Static("secret".to_string()));

        let records: Vec<Record> = fetcher
            .fetch(Category::Drive, window())
            .try_collect()
            .await
            .unwrap();

        assert_eq!(records.len(), 1002);
        assert_eq!(
            records[0].as_str(),
            r#"{"id":{"uniqueQualifier":0},"kind":"admin#reports#activity"}"#
        );
        assert_eq!(records[1001].as_str(), r#"{"id":{"uniqueQualifier":1001}}"#);

        let seen = state.seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].user, "all");
        assert_eq!(seen[0].application, "drive");
        assert_eq!(seen[0].query.get("startTime").unwrap(), "2024-01-01T00:00:00Z");
        assert_eq!(seen[0].query.get("endTime").unwrap(), "2024-01-01T00:05:00Z");
        assert_eq!(seen[0].query.get("maxResults").unwrap(), "1000");
        assert!(!seen[0].query.contains_key("pageToken"));
        assert_eq!(seen[1].query.get("pageToken").unwrap(), "page-2");
        assert_eq!(seen[1].authorization.as_deref(), Some("Bearer secret"));
    }

    #[tokio::test]
    async fn test_missing_items_is_empty_page() {
        let (base_url, _state) = serve().await;
        let fetcher = fetcher(&base_url, TokenSource::Static("secret".to_string()));

        let records: Vec<Record> = fetcher
            .fetch(Category::Login, window())
            .try_collect()
            .await
            .unwrap();

        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_error_status_carries_category_and_body() {
        let (base_url, _state) = serve().await;
        let fetcher = fetcher(&base_url, TokenSource::Static("secret".to_string()));

        let err = fetcher
            .fetch(Category::Calendar, window())
            .try_collect::<Vec<_>>()
            .await
            .unwrap_err();

        match err {
            FetchError::Status {
                category,
                status,
                body,
            } => {
                assert_eq!(category, Category::Calendar);
                assert_eq!(status, 403);
                assert_eq!(body, "insufficient permissions");
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_token_file_is_reread() {
        let (base_url, state) = serve().await;
        let token_file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(token_file.path(), "first\n").unwrap();
        let fetcher = fetcher(&base_url, TokenSource::File(token_file.path().to_path_buf()));

        fetcher
            .fetch(Category::Login, window())
            .try_collect::<Vec<_>>()
            .await
            .unwrap();
        std::fs::write(token_file.path(), "second").unwrap();
        fetcher
            .fetch(Category::Login, window())
            .try_collect::<Vec<_>>()
            .await
            .unwrap();

        let seen = state.seen.lock().unwrap().clone();
        assert_eq!(seen[0].authorization.as_deref(), Some("Bearer first"));
        assert_eq!(seen[1].authorization.as_deref(), Some("Bearer second"));
    }

    #[tokio::test]
    async fn test_service_account_token_sent_on_every_page() {
        let (base_url, state) = serve().await;
        let temp_dir = tempfile::TempDir::new().unwrap();
        let key_path = temp_dir.path().join("key.json");
        let key = serde_json::json!({
            "client_email": "drift@audit.iam.gserviceaccount.com",
            "private_key": include_str!("../../tests/fixtures/service_account_key.pem"),
            "token_uri": format!("{base_url}/token"),
        });
        std::fs::write(&key_path, key.to_string()).unwrap();
        let fetcher = fetcher(
            &base_url,
            TokenSource::service_account(key_path, "admin@example.com"),
        );

        let records: Vec<Record> = fetcher
            .fetch(Category::Drive, window())
            .try_collect()
            .await
            .unwrap();

        assert_eq!(records.len(), 1002);
        let seen = state.seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 2);
        assert!(
            seen.iter()
                .all(|r| r.authorization.as_deref() == Some("Bearer minted"))
        );
    }

    #[tokio::test]
    async fn test_connection_failure_is_request_error() {
        // Bind then drop to get a port with nothing listening.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let base_url = format!("http://{addr}");
        let fetcher = fetcher(&base_url, TokenSource::Static("t".to_string()));
        let err = fetcher
            .fetch(Category::Admin, window())
            .try_collect::<Vec<_>>()
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Request { category: Category::Admin, .. }));
    }

    #[test]
    fn test_activities_url_trims_trailing_slash() {
        let client = ReportsClient::new(
            "https://admin.googleapis.com/",
            "all",
            TokenSource::Static("t".to_string()),
            Duration::from_secs(1),
        )
        .unwrap();

        let expected = "https://admin.googleapis.com/admin/reports/v1/activity/users/all/\
                        applications/user_accounts";
        assert_eq!(client.activities_url(Category::UserAccounts), expected);
    }
}
