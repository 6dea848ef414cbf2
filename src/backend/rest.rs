use super::{ListingSource, RemoteError, Session};
use crate::listing::{Listing, ListingFilter, ListingId, ListingSummary};
use crate::util::{validate_endpoint, UrlValidationError};
use async_trait::async_trait;
use futures::StreamExt;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use std::time::Duration;
use url::Url;

const MAX_RESPONSE_SIZE: usize = 4 * 1024 * 1024; // 4MB
const MAX_ERROR_BODY_SIZE: usize = 64 * 1024;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

const LISTINGS_PATH: &str = "rest/v1/listings";
/// Columns of the feed projection; the detail view selects `*`.
const SUMMARY_COLUMNS: &str = "id,title,price,image_url,created_at,category";

/// Transport retry policy for transient failures (429, 5xx, timeouts).
///
/// Delays grow exponentially from `base_delay`: 1x, 2x, 4x...
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub const fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
        }
    }

    fn delay(&self, retry: u32) -> Duration {
        self.base_delay.saturating_mul(1u32 << retry.min(16))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(500),
        }
    }
}

/// Client for the backend's PostgREST interface.
///
/// Every request carries the project's anon key as `apikey`. The bearer token is
/// the signed-in user's access token when a [`Session`] is attached, otherwise the
/// anon key itself.
pub struct RestClient {
    pub(super) http: reqwest::Client,
    /// Always ends with `/` so relative joins append instead of replacing.
    pub(super) endpoint: Url,
    pub(super) anon_key: SecretString,
    session: Option<Session>,
    timeout: Duration,
    retry: RetryPolicy,
}

impl std::fmt::Debug for RestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestClient")
            .field("endpoint", &self.endpoint.as_str())
            .field("anon_key", &"[REDACTED]")
            .field("session", &self.session)
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .finish()
    }
}

impl RestClient {
    /// Create a client for `endpoint` (the project URL, e.g. `https://abc.supabase.co`).
    ///
    /// # Errors
    ///
    /// - [`RemoteError::InsecureEndpoint`] for plain HTTP to a non-loopback host
    /// - [`RemoteError::InvalidEndpoint`] if the URL cannot be parsed or has another scheme
    pub fn new(
        http: reqwest::Client,
        endpoint: &str,
        anon_key: SecretString,
    ) -> Result<Self, RemoteError> {
        let mut endpoint = validate_endpoint(endpoint).map_err(|e| match e {
            UrlValidationError::Insecure(_) => RemoteError::InsecureEndpoint,
            other => RemoteError::InvalidEndpoint(other.to_string()),
        })?;
        if !endpoint.path().ends_with('/') {
            let path = format!("{}/", endpoint.path());
            endpoint.set_path(&path);
        }

        Ok(Self {
            http,
            endpoint,
            anon_key,
            session: None,
            timeout: DEFAULT_TIMEOUT,
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Attach a signed-in session; subsequent requests act as that user.
    pub fn with_session(mut self, session: Session) -> Self {
        tracing::info!(user_id = %session.user_id(), "Backend client authenticated");
        self.session = Some(session);
        self
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Fetch the full row for one listing. `Ok(None)` if it no longer exists.
    pub async fn fetch_listing(&self, id: &ListingId) -> Result<Option<Listing>, RemoteError> {
        let mut url = self.url(LISTINGS_PATH)?;
        url.query_pairs_mut()
            .append_pair("select", "*")
            .append_pair("id", &format!("eq.{}", id))
            .append_pair("limit", "1");

        let rows: Vec<Listing> = self.get_json(url).await?;
        tracing::debug!(listing_id = %id, found = !rows.is_empty(), "Fetched listing detail");
        Ok(rows.into_iter().next())
    }

    pub(super) fn url(&self, path: &str) -> Result<Url, RemoteError> {
        self.endpoint
            .join(path)
            .map_err(|e| RemoteError::InvalidEndpoint(e.to_string()))
    }

    fn page_url(
        &self,
        offset: usize,
        limit: usize,
        filter: &ListingFilter,
    ) -> Result<Url, RemoteError> {
        let mut url = self.url(LISTINGS_PATH)?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("select", SUMMARY_COLUMNS)
                .append_pair("order", "created_at.desc")
                .append_pair("offset", &offset.to_string())
                .append_pair("limit", &limit.to_string());
            if let Some(category) = filter.category {
                query.append_pair("category", &format!("eq.{}", category));
            }
            if let Some(seller) = &filter.seller {
                query.append_pair("user_id", &format!("eq.{}", seller));
            }
        }
        Ok(url)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let bearer = match &self.session {
            Some(session) => session.access_token(),
            None => self.anon_key.expose_secret(),
        };
        request
            .header("apikey", self.anon_key.expose_secret())
            .header("Authorization", format!("Bearer {}", bearer))
            .header("Accept", "application/json")
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, RemoteError> {
        let bytes = self
            .execute(|| self.authorized(self.http.get(url.clone())))
            .await?;
        serde_json::from_slice(&bytes).map_err(|e| RemoteError::Decode(e.to_string()))
    }

    /// Send a request built by `build`, retrying transient failures.
    ///
    /// `build` is called once per attempt since a `RequestBuilder` is consumed
    /// by `send`.
    pub(super) async fn execute<F>(&self, build: F) -> Result<Vec<u8>, RemoteError>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut retry_count = 0;

        loop {
            match self.attempt(build()).await {
                Ok(bytes) => return Ok(bytes),
                Err(e) if e.is_retryable() && retry_count < self.retry.max_retries => {
                    let delay = self.retry.delay(retry_count);
                    tracing::warn!(
                        error = %e,
                        retry = retry_count + 1,
                        delay_ms = delay.as_millis() as u64,
                        "Transient backend error, retrying after delay"
                    );
                    tokio::time::sleep(delay).await;
                    retry_count += 1;
                }
                Err(RemoteError::Status { status: 429, .. }) => {
                    return Err(RemoteError::RateLimited(retry_count));
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn attempt(&self, request: reqwest::RequestBuilder) -> Result<Vec<u8>, RemoteError> {
        let response = tokio::time::timeout(self.timeout, request.send())
            .await
            .map_err(|_| RemoteError::Timeout(self.timeout))?
            .map_err(RemoteError::Network)?;

        let status = response.status();
        if !status.is_success() {
            // Best effort: the body only improves the error message
            let body = read_limited_bytes(response, MAX_ERROR_BODY_SIZE)
                .await
                .unwrap_or_default();
            return Err(RemoteError::Status {
                status: status.as_u16(),
                message: error_message(&body)
                    .unwrap_or_else(|| status.canonical_reason().unwrap_or("error").to_string()),
            });
        }

        read_limited_bytes(response, MAX_RESPONSE_SIZE).await
    }
}

#[async_trait]
impl ListingSource for RestClient {
    async fn fetch_page(
        &self,
        offset: usize,
        limit: usize,
        filter: &ListingFilter,
    ) -> Result<Vec<ListingSummary>, RemoteError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let url = self.page_url(offset, limit, filter)?;
        let rows: Vec<ListingSummary> = self.get_json(url).await?;
        tracing::debug!(
            offset,
            limit,
            rows = rows.len(),
            category = ?filter.category,
            seller = filter.seller.is_some(),
            "Fetched listing page"
        );
        Ok(rows)
    }
}

/// Extract a human-readable message from a PostgREST or auth error body.
fn error_message(body: &[u8]) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(body).ok()?;
    ["message", "error_description", "msg", "error"]
        .iter()
        .find_map(|key| value.get(key).and_then(|v| v.as_str()))
        .map(str::to_owned)
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, RemoteError> {
    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(RemoteError::ResponseTooLarge(limit));
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(RemoteError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(RemoteError::ResponseTooLarge(limit));
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listing::Category;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> RestClient {
        RestClient::new(
            reqwest::Client::new(),
            &server.uri(),
            SecretString::from("anon-key".to_string()),
        )
        .unwrap()
        .with_retry_policy(RetryPolicy {
            max_retries: 2,
            base_delay: Duration::from_millis(1),
        })
    }

    fn rows(ids: &[&str]) -> serde_json::Value {
        let rows: Vec<_> = ids
            .iter()
            .enumerate()
            .map(|(i, id)| {
                json!({
                    "id": id,
                    "title": format!("Listing {}", id),
                    "price": 10 + i,
                    "image_url": null,
                    "created_at": format!("2024-05-01T10:{:02}:00Z", 59 - i),
                    "category": "books"
                })
            })
            .collect();
        json!(rows)
    }

    #[tokio::test]
    async fn test_fetch_page_query_shape() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/listings"))
            .and(query_param("select", SUMMARY_COLUMNS))
            .and(query_param("order", "created_at.desc"))
            .and(query_param("offset", "20"))
            .and(query_param("limit", "10"))
            .and(header("apikey", "anon-key"))
            .and(header("Authorization", "Bearer anon-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(rows(&["a", "b"])))
            .expect(1)
            .mount(&server)
            .await;

        let page = client(&server)
            .fetch_page(20, 10, &ListingFilter::default())
            .await
            .unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].id.as_str(), "a");
        assert_eq!(page[1].price, 11.0);
    }

    #[tokio::test]
    async fn test_fetch_page_applies_filters() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/listings"))
            .and(query_param("category", "eq.books"))
            .and(query_param("user_id", "eq.user-7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(rows(&["a"])))
            .expect(1)
            .mount(&server)
            .await;

        let filter = ListingFilter {
            category: Some(Category::Books),
            seller: Some("user-7".to_string()),
        };
        let page = client(&server).fetch_page(0, 10, &filter).await.unwrap();
        assert_eq!(page.len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_page_empty_collection() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let page = client(&server)
            .fetch_page(0, 10, &ListingFilter::default())
            .await
            .unwrap();
        assert!(page.is_empty());
    }

    #[tokio::test]
    async fn test_endpoint_with_path_prefix_is_preserved() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/project/rest/v1/listings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let client = RestClient::new(
            reqwest::Client::new(),
            &format!("{}/project", server.uri()),
            SecretString::from("anon-key".to_string()),
        )
        .unwrap();
        client
            .fetch_page(0, 10, &ListingFilter::default())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_client_error_carries_backend_message() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "code": "42703",
                "message": "column listings.category does not exist"
            })))
            .expect(1) // 4xx is not retried
            .mount(&server)
            .await;

        let err = client(&server)
            .fetch_page(0, 10, &ListingFilter::default())
            .await
            .unwrap_err();
        match err {
            RemoteError::Status { status, message } => {
                assert_eq!(status, 400);
                assert!(message.contains("does not exist"));
            }
            e => panic!("Expected Status error, got {:?}", e),
        }
    }

    #[tokio::test]
    async fn test_server_error_retries_then_fails() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3) // Initial request + 2 retries
            .mount(&server)
            .await;

        let err = client(&server)
            .fetch_page(0, 10, &ListingFilter::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::Status { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_server_error_then_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(rows(&["a"])))
            .mount(&server)
            .await;

        let page = client(&server)
            .fetch_page(0, 10, &ListingFilter::default())
            .await
            .unwrap();
        assert_eq!(page.len(), 1);
    }

    #[tokio::test]
    async fn test_rate_limited_after_retries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .expect(3)
            .mount(&server)
            .await;

        let err = client(&server)
            .fetch_page(0, 10, &ListingFilter::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::RateLimited(2)));
    }

    #[tokio::test]
    async fn test_malformed_row_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
                "id": "a",
                "title": "Broken",
                "price": -4,
                "created_at": "2024-05-01T10:00:00Z"
            }])))
            .mount(&server)
            .await;

        let err = client(&server)
            .fetch_page(0, 10, &ListingFilter::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::Decode(_)));
    }

    #[tokio::test]
    async fn test_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([]))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let err = client(&server)
            .with_timeout(Duration::from_millis(50))
            .with_retry_policy(RetryPolicy::none())
            .fetch_page(0, 10, &ListingFilter::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_fetch_listing_found_and_missing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("id", "eq.a"))
            .and(query_param("select", "*"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
                "id": "a",
                "title": "Desk",
                "price": "80.00",
                "created_at": "2024-05-01T10:00:00Z",
                "description": "Solid oak",
                "user_id": "user-1"
            }])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("id", "eq.gone"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let client = client(&server);
        let listing = client
            .fetch_listing(&ListingId::new("a"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(listing.summary.title, "Desk");
        assert_eq!(listing.description.as_deref(), Some("Solid oak"));

        let missing = client.fetch_listing(&ListingId::new("gone")).await.unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn test_insecure_endpoint_rejected() {
        let err = RestClient::new(
            reqwest::Client::new(),
            "http://abc.supabase.co",
            SecretString::from("k".to_string()),
        )
        .unwrap_err();
        assert!(matches!(err, RemoteError::InsecureEndpoint));
    }

    #[test]
    fn test_debug_redacts_anon_key() {
        let client = RestClient::new(
            reqwest::Client::new(),
            "https://abc.supabase.co",
            SecretString::from("super-secret-anon".to_string()),
        )
        .unwrap();
        let debug = format!("{:?}", client);
        assert!(!debug.contains("super-secret-anon"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_retry_delay_doubles() {
        let policy = RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
        };
        assert_eq!(policy.delay(0), Duration::from_millis(100));
        assert_eq!(policy.delay(1), Duration::from_millis(200));
        assert_eq!(policy.delay(2), Duration::from_millis(400));
    }
}
