use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::config::BdxConfig;
use crate::error::SourceError;
use crate::services::query::{AggregationLevel, PropertyDescriptor, TrendQuery};
use crate::services::reshape::{SeriesColumn, SeriesTable};

const LOGIN_PATH: &str = "/api/auth/login";
const LOGOUT_PATH: &str = "/api/auth/logout";
const RETRIEVE_PATH: &str = "/api/trending/retrieve";
const ERROR_BODY_LIMIT: usize = 512;

/// Anything that can answer a trend query with a [`SeriesTable`].
pub trait TrendSource: Send + Sync {
    fn retrieve<'a>(
        &'a self,
        query: &'a TrendQuery,
    ) -> BoxFuture<'a, Result<SeriesTable, SourceError>>;
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    #[serde(default)]
    token: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RetrieveRequest<'a> {
    properties: &'a [PropertyDescriptor],
    timeframe: Timeframe,
    aggregation_level: AggregationLevel,
}

#[derive(Serialize)]
struct Timeframe {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

#[derive(Deserialize)]
struct RetrieveResponse {
    #[serde(default)]
    columns: Vec<PropertyDescriptor>,
    #[serde(default)]
    rows: Vec<RetrieveRow>,
}

#[derive(Deserialize)]
struct RetrieveRow {
    #[serde(default)]
    time: Option<String>,
    #[serde(default)]
    values: Vec<Option<f64>>,
}

fn into_series_table(response: RetrieveResponse) -> Result<SeriesTable, SourceError> {
    let width = response.columns.len();
    let mut index = Vec::with_capacity(response.rows.len());
    let mut values: Vec<Vec<Option<f64>>> = vec![Vec::with_capacity(response.rows.len()); width];

    for (row_number, row) in response.rows.into_iter().enumerate() {
        if row.values.len() != width {
            return Err(SourceError::Decode(format!(
                "row {row_number} has {} values for {width} columns",
                row.values.len()
            )));
        }
        index.push(row.time);
        for (column, value) in values.iter_mut().zip(row.values) {
            column.push(value);
        }
    }

    let columns = response
        .columns
        .into_iter()
        .zip(values)
        .map(|(descriptor, values)| SeriesColumn { descriptor, values })
        .collect();
    Ok(SeriesTable::new(index, columns))
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, SourceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(SourceError::Status {
        status: status.as_u16(),
        body: truncate_chars(&body, ERROR_BODY_LIMIT),
    })
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// Unauthenticated handle on a BDX server. Use [`BdxClient::open_session`] to log in.
#[derive(Clone)]
pub struct BdxClient {
    http: Client,
    base_url: String,
    username: String,
    password: String,
}

impl BdxClient {
    pub fn new(config: &BdxConfig) -> Result<Self, SourceError> {
        let http = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    pub async fn open_session(&self) -> Result<BdxSession, SourceError> {
        let url = format!("{}{LOGIN_PATH}", self.base_url);
        let response = self
            .http
            .post(url)
            .json(&LoginRequest {
                username: &self.username,
                password: &self.password,
            })
            .send()
            .await?;
        let payload: LoginResponse = check_status(response).await?.json().await?;
        let token = payload
            .token
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty())
            .ok_or(SourceError::MissingToken)?;

        tracing::info!(base_url = %self.base_url, user = %self.username, "BDX session opened");
        Ok(BdxSession {
            http: self.http.clone(),
            base_url: self.base_url.clone(),
            token,
        })
    }
}

/// An authenticated BDX session. Safe to share between concurrent requests; release it
/// with [`BdxSession::close`].
pub struct BdxSession {
    http: Client,
    base_url: String,
    token: String,
}

impl BdxSession {
    pub async fn retrieve_table(&self, query: &TrendQuery) -> Result<SeriesTable, SourceError> {
        let url = format!("{}{RETRIEVE_PATH}", self.base_url);
        let request = RetrieveRequest {
            properties: &query.properties,
            timeframe: Timeframe {
                start: query.window.start(),
                end: query.window.end(),
            },
            aggregation_level: query.aggregation,
        };
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .json(&request)
            .send()
            .await?;
        let payload: RetrieveResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|err| SourceError::Decode(err.to_string()))?;
        into_series_table(payload)
    }

    pub async fn close(self) -> Result<(), SourceError> {
        let url = format!("{}{LOGOUT_PATH}", self.base_url);
        let response = self.http.post(url).bearer_auth(&self.token).send().await?;
        check_status(response).await?;
        tracing::info!(base_url = %self.base_url, "BDX session closed");
        Ok(())
    }
}

impl TrendSource for BdxSession {
    fn retrieve<'a>(
        &'a self,
        query: &'a TrendQuery,
    ) -> BoxFuture<'a, Result<SeriesTable, SourceError>> {
        Box::pin(self.retrieve_table(query))
    }
}

/// Long-lived session for the gateway. When BDX rejects the token (HTTP 401) it logs in
/// again and retries the request once.
pub struct SharedSession {
    client: BdxClient,
    session: RwLock<BdxSession>,
}

impl SharedSession {
    pub async fn open(client: BdxClient) -> Result<Self, SourceError> {
        let session = client.open_session().await?;
        Ok(Self {
            client,
            session: RwLock::new(session),
        })
    }

    async fn retrieve_with_relogin(
        &self,
        query: &TrendQuery,
    ) -> Result<SeriesTable, SourceError> {
        let rejected_token = {
            let session = self.session.read().await;
            match session.retrieve_table(query).await {
                Err(SourceError::Status { status: 401, .. }) => session.token.clone(),
                other => return other,
            }
        };

        let mut session = self.session.write().await;
        // Another request may already have logged in again while we waited.
        if session.token == rejected_token {
            tracing::warn!(
                base_url = %self.client.base_url,
                "BDX token rejected; logging in again"
            );
            *session = self.client.open_session().await?;
        }
        session.downgrade().retrieve_table(query).await
    }

    pub async fn close(self) -> Result<(), SourceError> {
        self.session.into_inner().close().await
    }
}

impl TrendSource for SharedSession {
    fn retrieve<'a>(
        &'a self,
        query: &'a TrendQuery,
    ) -> BoxFuture<'a, Result<SeriesTable, SourceError>> {
        Box::pin(self.retrieve_with_relogin(query))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::TimeWindow;
    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[derive(Clone, Default)]
    struct FakeBdx {
        calls: Arc<Mutex<Vec<String>>>,
        last_body: Arc<Mutex<Option<serde_json::Value>>>,
        logins: Arc<AtomicUsize>,
        valid_token: Arc<Mutex<String>>,
    }

    impl FakeBdx {
        fn revoke_token(&self) {
            *self.valid_token.lock().expect("lock") = "revoked".to_string();
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().expect("lock").clone()
        }
    }

    fn bearer(headers: &HeaderMap) -> Option<String> {
        headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string())
    }

    async fn fake_login(
        State(fake): State<FakeBdx>,
        Json(body): Json<serde_json::Value>,
    ) -> Result<Json<serde_json::Value>, StatusCode> {
        fake.calls.lock().expect("lock").push("login".to_string());
        if body["password"] != "secret" {
            return Err(StatusCode::UNAUTHORIZED);
        }
        let n = fake.logins.fetch_add(1, Ordering::SeqCst) + 1;
        let token = format!("tok-{n}");
        *fake.valid_token.lock().expect("lock") = token.clone();
        Ok(Json(serde_json::json!({"token": token})))
    }

    async fn fake_retrieve(
        State(fake): State<FakeBdx>,
        headers: HeaderMap,
        Json(body): Json<serde_json::Value>,
    ) -> Result<Json<serde_json::Value>, StatusCode> {
        fake.calls.lock().expect("lock").push("retrieve".to_string());
        let expected = format!("Bearer {}", fake.valid_token.lock().expect("lock"));
        if bearer(&headers).as_deref() != Some(expected.as_str()) {
            return Err(StatusCode::UNAUTHORIZED);
        }
        *fake.last_body.lock().expect("lock") = Some(body);
        Ok(Json(serde_json::json!({
            "columns": [
                {"componentPathId": 1, "propertyName": "value"},
                {"componentPathId": 2, "propertyName": "value"}
            ],
            "rows": [
                {"time": "2025-03-01T00:00:00Z", "values": [1.0, null]},
                {"time": null, "values": [2.0, 3.0]}
            ]
        })))
    }

    async fn fake_logout(State(fake): State<FakeBdx>) -> StatusCode {
        fake.calls.lock().expect("lock").push("logout".to_string());
        StatusCode::NO_CONTENT
    }

    async fn spawn_fake() -> Option<(String, FakeBdx)> {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.ok()?;
        let addr = listener.local_addr().ok()?;
        let fake = FakeBdx::default();
        let app = Router::new()
            .route(LOGIN_PATH, post(fake_login))
            .route(RETRIEVE_PATH, post(fake_retrieve))
            .route(LOGOUT_PATH, post(fake_logout))
            .with_state(fake.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });
        Some((format!("http://{addr}/"), fake))
    }

    fn config(base_url: String, password: &str) -> BdxConfig {
        BdxConfig {
            base_url,
            username: "report-bot".to_string(),
            password: password.to_string(),
            request_timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn session_login_retrieve_logout() {
        let Some((base_url, fake)) = spawn_fake().await else {
            // Sandbox environments can block binding attempts.
            return;
        };
        let client = BdxClient::new(&config(base_url, "secret")).expect("client");
        let session = client.open_session().await.expect("login");

        let window = TimeWindow::new(
            Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).single().expect("start"),
            Utc.with_ymd_and_hms(2025, 3, 31, 23, 59, 59).single().expect("end"),
        )
        .expect("window");
        let query = TrendQuery::build(&[1, 2], &["value".to_string()], window);
        let table = session.retrieve(&query).await.expect("retrieve");
        session.close().await.expect("logout");

        assert_eq!(table.shape().rows, 2);
        assert_eq!(table.labels(), vec!["1_value", "2_value"]);
        assert_eq!(table.columns()[1].values, vec![None, Some(3.0)]);
        assert_eq!(table.index()[1], None);

        let body = fake.last_body.lock().expect("lock").clone().expect("body");
        assert_eq!(body["aggregationLevel"], "POINT");
        assert_eq!(body["properties"][1]["componentPathId"], 2);
        assert_eq!(body["timeframe"]["start"], "2025-03-01T00:00:00Z");

        let calls = fake.calls.lock().expect("lock").clone();
        assert_eq!(calls, vec!["login", "retrieve", "logout"]);
    }

    #[tokio::test]
    async fn rejected_login_is_a_status_error() {
        let Some((base_url, _fake)) = spawn_fake().await else {
            return;
        };
        let client = BdxClient::new(&config(base_url, "wrong")).expect("client");
        let err = client.open_session().await.err().expect("login must fail");
        assert!(matches!(err, SourceError::Status { status: 401, .. }), "{err}");
    }

    fn march_query() -> TrendQuery {
        let window = TimeWindow::new(
            Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).single().expect("start"),
            Utc.with_ymd_and_hms(2025, 3, 31, 23, 59, 59).single().expect("end"),
        )
        .expect("window");
        TrendQuery::build(&[1, 2], &["value".to_string()], window)
    }

    #[tokio::test]
    async fn shared_session_logs_in_again_after_token_expiry() {
        let Some((base_url, fake)) = spawn_fake().await else {
            return;
        };
        let client = BdxClient::new(&config(base_url, "secret")).expect("client");
        let shared = SharedSession::open(client).await.expect("login");
        let query = march_query();

        shared.retrieve(&query).await.expect("first retrieve");
        fake.revoke_token();
        let table = shared.retrieve(&query).await.expect("retrieve after expiry");
        assert_eq!(table.shape().rows, 2);
        shared.close().await.expect("logout");

        assert_eq!(
            fake.calls(),
            vec!["login", "retrieve", "retrieve", "login", "retrieve", "logout"]
        );
    }

    #[tokio::test]
    async fn multibyte_error_bodies_are_truncated_on_char_boundaries() {
        let Ok(listener) = tokio::net::TcpListener::bind("127.0.0.1:0").await else {
            return;
        };
        let addr = listener.local_addr().expect("addr");
        let mut page = "a".repeat(ERROR_BODY_LIMIT - 1);
        page.push_str("éé");
        let app = Router::new().route(
            LOGIN_PATH,
            post(move || {
                let page = page.clone();
                async move { (StatusCode::UNAUTHORIZED, page) }
            }),
        );
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        let client =
            BdxClient::new(&config(format!("http://{addr}"), "secret")).expect("client");
        let err = client.open_session().await.err().expect("login must fail");
        match err {
            SourceError::Status { status, body } => {
                assert_eq!(status, 401);
                assert_eq!(body.chars().count(), ERROR_BODY_LIMIT);
                assert!(body.ends_with('é'));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn truncation_counts_characters() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("ok", 10), "ok");
    }

    #[test]
    fn ragged_rows_fail_to_decode() {
        let response = RetrieveResponse {
            columns: vec![PropertyDescriptor::new(1, "value")],
            rows: vec![RetrieveRow {
                time: Some("2025-03-01T00:00:00Z".to_string()),
                values: vec![Some(1.0), Some(2.0)],
            }],
        };
        assert!(matches!(
            into_series_table(response),
            Err(SourceError::Decode(_))
        ));
    }
}
