//! REST client for the dayloop game backend.
//!
//! Auth uses `Authorization: Bearer <token>` only. Guest creation returns a
//! token which the client captures so later protected calls authenticate;
//! transport failures map to retryable errors, non-success statuses to
//! `RemoteError::Api` with the status preserved for retry classification.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};

use dayloop_core::profile::ProfileSnapshot;
use dayloop_core::remote::{
    GuestIdentity, IdentityService, LeaderboardPage, LeaderboardQuery, LeaderboardService,
    ProfileService, RemoteError, RemoteResult, ScoreReceipt, ScoreService, ScoreSubmission,
    SessionUser,
};

/// Default timeout for API requests.
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const MAX_LOG_BODY_CHARS: usize = 512;

#[derive(serde::Deserialize)]
struct ApiErrorBody {
    error: String,
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionEnvelope {
    user: SessionUser,
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatedUser {
    id: String,
    #[serde(default)]
    token: Option<String>,
}

/// Client for the dayloop REST backend.
#[derive(Debug)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
    token: Mutex<Option<String>>,
}

impl ApiClient {
    /// Create a new API client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - The base URL of the backend (e.g. "https://api.dayloop.app")
    pub fn new(base_url: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: Mutex::new(None),
        }
    }

    /// Install a bearer token (e.g. restored from the host's token storage).
    pub fn set_token(&self, token: &str) {
        if let Ok(mut slot) = self.token.lock() {
            *slot = Some(token.to_string());
        }
    }

    /// Forget the stored bearer token (sign-out).
    pub fn clear_token(&self) {
        if let Ok(mut slot) = self.token.lock() {
            *slot = None;
        }
    }

    fn bearer(&self) -> Option<String> {
        self.token.lock().ok().and_then(|slot| slot.clone())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Create headers for an API request, attaching the bearer token when set.
    fn headers(&self) -> RemoteResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(token) = self.bearer() {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| RemoteError::Auth("Invalid access token format".to_string()))?;
            headers.insert(AUTHORIZATION, value);
        }
        Ok(headers)
    }

    fn transport(err: reqwest::Error) -> RemoteError {
        RemoteError::transport(err.to_string())
    }

    fn log_response(status: reqwest::StatusCode, body: &str) {
        if status.is_success() {
            debug!("API response status: {}", status);
            return;
        }
        let mut preview = body.chars().take(MAX_LOG_BODY_CHARS).collect::<String>();
        if body.chars().count() > MAX_LOG_BODY_CHARS {
            preview.push_str("...");
        }
        debug!("API response error ({}): {}", status, preview);
    }

    /// Parse a JSON response body, mapping non-success statuses to
    /// [`RemoteError::Api`].
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> RemoteResult<T> {
        let status = response.status();
        let body = response.text().await.map_err(Self::transport)?;
        Self::log_response(status, &body);

        if !status.is_success() {
            if let Ok(error) = serde_json::from_str::<ApiErrorBody>(&body) {
                return Err(RemoteError::api(status.as_u16(), error.error));
            }
            return Err(RemoteError::api(
                status.as_u16(),
                format!("Request failed: {}", body),
            ));
        }

        serde_json::from_str(&body).map_err(|e| {
            log::error!(
                "Failed to deserialize response. Body: {}, Error: {}",
                body,
                e
            );
            RemoteError::api(status.as_u16(), format!("Failed to parse response: {}", e))
        })
    }

    fn query_enum_value<T: serde::Serialize>(value: &T) -> RemoteResult<String> {
        serde_json::to_string(value)
            .map(|s| s.trim_matches('"').to_string())
            .map_err(|e| RemoteError::Invalid(format!("unencodable query value: {e}")))
    }
}

#[async_trait]
impl IdentityService for ApiClient {
    /// POST /api/users
    ///
    /// The backend mints a guest user and returns a JWT for it; the token is
    /// captured so subsequent protected calls authenticate as this guest.
    async fn create_guest(&self) -> RemoteResult<GuestIdentity> {
        let response = self
            .client
            .post(self.url("/api/users"))
            .headers(self.headers()?)
            .json(&serde_json::json!({}))
            .send()
            .await
            .map_err(Self::transport)?;

        let created: CreatedUser = Self::parse_response(response).await?;
        if let Some(token) = &created.token {
            self.set_token(token);
        }
        Ok(GuestIdentity { id: created.id })
    }

    /// GET /api/auth/session
    ///
    /// 401 means "not signed in", which is a successful `None` here; only
    /// transport failures and unexpected statuses are errors.
    async fn get_session(&self) -> RemoteResult<Option<SessionUser>> {
        let response = self
            .client
            .get(self.url("/api/auth/session"))
            .headers(self.headers()?)
            .send()
            .await
            .map_err(Self::transport)?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Ok(None);
        }
        let envelope: SessionEnvelope = Self::parse_response(response).await?;
        Ok(Some(envelope.user))
    }
}

#[async_trait]
impl ScoreService for ApiClient {
    /// POST /api/score
    async fn submit_score(&self, submission: &ScoreSubmission) -> RemoteResult<ScoreReceipt> {
        let response = self
            .client
            .post(self.url("/api/score"))
            .headers(self.headers()?)
            .json(submission)
            .send()
            .await
            .map_err(Self::transport)?;

        Self::parse_response(response).await
    }
}

#[async_trait]
impl ProfileService for ApiClient {
    /// GET /api/users/{userId}
    async fn get_profile(&self, user_id: &str) -> RemoteResult<ProfileSnapshot> {
        let response = self
            .client
            .get(self.url(&format!("/api/users/{}", user_id)))
            .headers(self.headers()?)
            .send()
            .await
            .map_err(Self::transport)?;

        Self::parse_response(response).await
    }
}

#[async_trait]
impl LeaderboardService for ApiClient {
    /// GET /api/leaderboard?sortBy={sort}&limit={n}&userId={id}
    async fn get_leaderboard(&self, query: &LeaderboardQuery) -> RemoteResult<LeaderboardPage> {
        let mut params: Vec<(&str, String)> = vec![
            ("sortBy", Self::query_enum_value(&query.sort_by)?),
            ("limit", query.limit.to_string()),
        ];
        if let Some(user_id) = &query.user_id {
            params.push(("userId", user_id.clone()));
        }

        let response = self
            .client
            .get(self.url("/api/leaderboard"))
            .headers(self.headers()?)
            .query(&params)
            .send()
            .await
            .map_err(Self::transport)?;

        Self::parse_response(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::Mutex as TokioMutex;

    use chrono::NaiveDate;
    use dayloop_core::remote::{LeaderboardSort, RetryClass};

    #[derive(Debug, Clone)]
    struct CapturedRequest {
        request_line: String,
        authorization: Option<String>,
    }

    #[derive(Debug, Clone)]
    struct MockResponse {
        status: u16,
        body: String,
    }

    fn header_end_offset(buffer: &[u8]) -> Option<usize> {
        buffer.windows(4).position(|window| window == b"\r\n\r\n")
    }

    async fn read_http_request(
        stream: &mut tokio::net::TcpStream,
    ) -> Option<(String, HashMap<String, String>)> {
        let mut buffer = Vec::new();
        loop {
            let mut chunk = [0_u8; 2048];
            let read = stream.read(&mut chunk).await.ok()?;
            if read == 0 {
                return None;
            }
            buffer.extend_from_slice(&chunk[..read]);
            if header_end_offset(&buffer).is_some() {
                break;
            }
        }

        let header_end = header_end_offset(&buffer)?;
        let head = String::from_utf8_lossy(&buffer[..header_end]).to_string();
        let mut lines = head.lines();
        let request_line = lines.next()?.to_string();

        let mut headers = HashMap::new();
        for line in lines {
            if let Some((name, value)) = line.split_once(':') {
                headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
            }
        }

        let content_length = headers
            .get("content-length")
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(0);
        let mut body_read = buffer.len().saturating_sub(header_end + 4);
        while body_read < content_length {
            let mut chunk = [0_u8; 2048];
            let read = stream.read(&mut chunk).await.ok()?;
            if read == 0 {
                break;
            }
            body_read = body_read.saturating_add(read);
        }

        Some((request_line, headers))
    }

    fn status_text(status: u16) -> &'static str {
        match status {
            200 => "OK",
            201 => "Created",
            400 => "Bad Request",
            401 => "Unauthorized",
            500 => "Internal Server Error",
            _ => "Error",
        }
    }

    async fn write_http_response(
        stream: &mut tokio::net::TcpStream,
        status: u16,
        body: &str,
    ) -> std::io::Result<()> {
        let response = format!(
            "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            status_text(status),
            body.len(),
            body
        );
        stream.write_all(response.as_bytes()).await?;
        stream.flush().await
    }

    async fn start_mock_server(
        responses: Vec<MockResponse>,
    ) -> (
        String,
        Arc<TokioMutex<Vec<CapturedRequest>>>,
        tokio::task::JoinHandle<()>,
    ) {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("listener addr");
        let captured = Arc::new(TokioMutex::new(Vec::<CapturedRequest>::new()));
        let scripted = Arc::new(TokioMutex::new(VecDeque::from(responses)));
        let captured_clone = Arc::clone(&captured);
        let scripted_clone = Arc::clone(&scripted);

        let handle = tokio::spawn(async move {
            loop {
                let (mut stream, _) = match listener.accept().await {
                    Ok(value) => value,
                    Err(_) => break,
                };
                let Some((request_line, headers)) = read_http_request(&mut stream).await else {
                    continue;
                };
                captured_clone.lock().await.push(CapturedRequest {
                    request_line,
                    authorization: headers.get("authorization").cloned(),
                });
                let response = scripted_clone.lock().await.pop_front().unwrap_or(MockResponse {
                    status: 500,
                    body: r#"{"error":"unexpected request"}"#.to_string(),
                });
                let _ = write_http_response(&mut stream, response.status, &response.body).await;
            }
        });

        (format!("http://{}", addr), captured, handle)
    }

    #[tokio::test]
    async fn session_401_is_unauthenticated_not_an_error() {
        let (base_url, _captured, server) = start_mock_server(vec![MockResponse {
            status: 401,
            body: r#"{"error":"Unauthorized"}"#.to_string(),
        }])
        .await;

        let client = ApiClient::new(&base_url);
        let session = client.get_session().await.expect("session check");
        assert_eq!(session, None);

        server.abort();
    }

    #[tokio::test]
    async fn session_parses_the_signed_in_user() {
        let (base_url, _captured, server) = start_mock_server(vec![MockResponse {
            status: 200,
            body: r#"{"user":{"id":"u-1","email":"p@example.com"}}"#.to_string(),
        }])
        .await;

        let client = ApiClient::new(&base_url);
        let session = client.get_session().await.expect("session check");
        assert_eq!(
            session,
            Some(SessionUser {
                id: "u-1".to_string(),
                email: Some("p@example.com".to_string()),
            })
        );

        server.abort();
    }

    #[tokio::test]
    async fn guest_creation_captures_the_token_for_later_calls() {
        let (base_url, captured, server) = start_mock_server(vec![
            MockResponse {
                status: 201,
                body: r#"{"id":"guest-1","email":null,"token":"jwt-guest-1"}"#.to_string(),
            },
            MockResponse {
                status: 200,
                body: r#"{"accepted":true,"streak":2}"#.to_string(),
            },
        ])
        .await;

        let client = ApiClient::new(&base_url);
        let guest = client.create_guest().await.expect("guest creation");
        assert_eq!(guest.id, "guest-1");

        let submission = ScoreSubmission {
            date: NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
            puzzle_id: "binary".to_string(),
            score: 10,
            time_taken_ms: Some(42_000),
            streak: 2,
        };
        let receipt = client.submit_score(&submission).await.expect("submit");
        assert!(receipt.accepted);
        assert_eq!(receipt.streak, 2);

        let requests = captured.lock().await.clone();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].authorization, None);
        assert_eq!(
            requests[1].authorization.as_deref(),
            Some("Bearer jwt-guest-1")
        );

        server.abort();
    }

    #[tokio::test]
    async fn validation_failure_is_permanent_and_server_error_is_retryable() {
        let (base_url, _captured, server) = start_mock_server(vec![
            MockResponse {
                status: 400,
                body: r#"{"error":"Missing required fields: date, puzzleId, score"}"#.to_string(),
            },
            MockResponse {
                status: 500,
                body: r#"{"error":"Failed to save score"}"#.to_string(),
            },
        ])
        .await;

        let client = ApiClient::new(&base_url);
        let submission = ScoreSubmission {
            date: NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
            puzzle_id: "binary".to_string(),
            score: 10,
            time_taken_ms: None,
            streak: 1,
        };

        let rejected = client.submit_score(&submission).await.unwrap_err();
        assert_eq!(rejected.retry_class(), RetryClass::Permanent);
        assert!(rejected.to_string().contains("Missing required fields"));

        let transient = client.submit_score(&submission).await.unwrap_err();
        assert_eq!(transient.retry_class(), RetryClass::Retryable);

        server.abort();
    }

    #[tokio::test]
    async fn unreachable_backend_maps_to_a_retryable_transport_error() {
        // Nothing listens on this port; connect fails fast.
        let client = ApiClient::new("http://127.0.0.1:9");
        let err = client.get_session().await.unwrap_err();
        assert!(matches!(err, RemoteError::Transport(_)));
        assert_eq!(err.retry_class(), RetryClass::Retryable);
    }

    #[tokio::test]
    async fn leaderboard_query_is_encoded_in_the_request_line() {
        let (base_url, captured, server) = start_mock_server(vec![MockResponse {
            status: 200,
            body: r#"{"top":[{"rank":1,"id":"u-1","email":null,"streakCount":4,"totalPoints":120}],"currentUser":null}"#
                .to_string(),
        }])
        .await;

        let client = ApiClient::new(&base_url);
        let query = LeaderboardQuery {
            sort_by: LeaderboardSort::TotalPoints,
            limit: 10,
            user_id: Some("u-9".to_string()),
        };
        let page = client.get_leaderboard(&query).await.expect("leaderboard");
        assert_eq!(page.top.len(), 1);
        assert_eq!(page.top[0].total_points, 120);

        let requests = captured.lock().await.clone();
        let request_line = &requests[0].request_line;
        assert!(request_line.contains("/api/leaderboard?"));
        assert!(request_line.contains("sortBy=total_points"));
        assert!(request_line.contains("limit=10"));
        assert!(request_line.contains("userId=u-9"));

        server.abort();
    }

    #[tokio::test]
    async fn profile_dates_tolerate_unpadded_server_keys() {
        let (base_url, _captured, server) = start_mock_server(vec![MockResponse {
            status: 200,
            body: r#"{
                "id":"u-1","email":null,"streakCount":2,"lastPlayed":"2025-03-11",
                "totalPoints":20,"stats":{"puzzlesSolved":2,"avgSolveTimeMs":30000},
                "dailyScores":[
                    {"date":"2025-3-10","puzzleId":"binary","score":10,"timeTakenMs":30000},
                    {"date":"2025-03-11","puzzleId":"pattern","score":10,"timeTakenMs":30000}
                ]
            }"#
            .to_string(),
        }])
        .await;

        let client = ApiClient::new(&base_url);
        let profile = client.get_profile("u-1").await.expect("profile");
        assert_eq!(profile.daily_scores.len(), 2);
        assert_eq!(
            profile.daily_scores[0].date,
            NaiveDate::from_ymd_opt(2025, 3, 10).unwrap()
        );

        server.abort();
    }
}
