// src/fetch.rs
use crate::error::FetchError;
use crate::rate_limit::RateLimitState;
use reqwest::{header::HeaderMap, Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Per-call knobs: how long to wait and how hard to retry.
#[derive(Debug, Clone, Copy)]
pub struct FetchOptions {
    pub timeout: Duration,
    pub max_retries: u32,
    pub backoff_base: Duration,
    /// Cut the body at this many bytes; `None` reads it whole.
    pub max_body_bytes: Option<usize>,
}

impl FetchOptions {
    /// Delay before retry number `attempt` (0-based): base * 2^attempt.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_base
            .saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// A fully-formed outbound request.
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    url: String,
    query: Vec<(String, String)>,
    headers: Vec<(String, String)>,
    body: Option<Value>,
}

impl Request {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn post_json(url: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::POST,
            body: Some(body),
            ..Self::get(url)
        }
    }

    pub fn query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn header(mut self, key: &str, value: impl ToString) -> Self {
        self.headers.push((key.to_string(), value.to_string()));
        self
    }

    /// RapidAPI-style auth: key header plus the host the key is scoped to.
    pub fn rapidapi_key(self, key: &str) -> Self {
        let host = url::Url::parse(&self.url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string));
        let req = self.header("x-rapidapi-key", key);
        match host {
            Some(host) => req.header("x-rapidapi-host", host),
            None => req,
        }
    }
}

/// Rate-limit bookkeeping key: host plus path, query ignored.
pub fn endpoint_key(url: &str) -> Result<String, FetchError> {
    let parsed = url::Url::parse(url)
        .map_err(|e| FetchError::InvalidInput(format!("bad request url {url}: {e}")))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| FetchError::InvalidInput(format!("request url {url} has no host")))?;
    match parsed.port() {
        Some(port) => Ok(format!("{host}:{port}{}", parsed.path())),
        None => Ok(format!("{host}{}", parsed.path())),
    }
}

/// The only way out to the network. Cheap to clone; clones share one
/// `RateLimitState`, so a cooldown seen by one analyzer holds for all.
#[derive(Debug, Clone)]
pub struct FetchClient {
    http: Client,
    rate_limits: Arc<Mutex<RateLimitState>>,
    default_cooldown: Duration,
}

impl FetchClient {
    pub fn new(default_cooldown: Duration) -> eyre::Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("token-risk-monitor/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            rate_limits: Arc::new(Mutex::new(RateLimitState::new())),
            default_cooldown,
        })
    }

    /// Cooldown left for the endpoint behind `url`, if throttled.
    #[cfg(test)]
    pub fn cooldown_remaining(&self, url: &str) -> Option<Duration> {
        let endpoint = endpoint_key(url).ok()?;
        self.state().cooldown_remaining(&endpoint, Instant::now())
    }

    #[cfg(test)]
    pub fn rate_limits(&self) -> MutexGuard<'_, RateLimitState> {
        self.state()
    }

    pub async fn fetch_json<T: DeserializeOwned>(
        &self,
        req: &Request,
        opts: &FetchOptions,
    ) -> Result<T, FetchError> {
        let body = self.execute(req, opts).await?;
        serde_json::from_str(&body).map_err(|e| {
            warn!("Undecodable payload from {}: {}", req.url, e);
            FetchError::MalformedResponse(e.to_string())
        })
    }

    pub async fn fetch_text(&self, req: &Request, opts: &FetchOptions) -> Result<String, FetchError> {
        self.execute(req, opts).await
    }

    async fn execute(&self, req: &Request, opts: &FetchOptions) -> Result<String, FetchError> {
        let endpoint = endpoint_key(&req.url)?;

        let (cooling, known) = {
            let state = self.state();
            (
                state.cooldown_remaining(&endpoint, Instant::now()),
                state.get(&endpoint).cloned(),
            )
        };
        if let Some(known) = known {
            debug!(
                "{} last called {:?} ago, quota left {:?}",
                endpoint,
                known.last_call.map(|t| t.elapsed()),
                known.remaining_quota
            );
        }
        if let Some(wait) = cooling {
            warn!("⏳ {} cooling down for {}s, not calling", endpoint, wait.as_secs());
            return Err(FetchError::RateLimited {
                retry_after: Some(wait),
            });
        }

        let mut attempt = 0;
        loop {
            debug!("📡 {} {} (attempt {})", req.method, req.url, attempt + 1);

            let res = self.build(req, opts).send().await;
            let now = Instant::now();

            match res {
                Ok(resp) => {
                    let status = resp.status();
                    let quota = remaining_quota(resp.headers());

                    if status == StatusCode::TOO_MANY_REQUESTS {
                        let retry_after = retry_after(resp.headers());
                        self.state().mark_limited(
                            &endpoint,
                            now,
                            retry_after.unwrap_or(self.default_cooldown),
                        );
                        warn!("🚦 {} rate limited (retry-after {:?})", endpoint, retry_after);
                        return Err(FetchError::RateLimited { retry_after });
                    }

                    self.state()
                        .record_call(&endpoint, now, quota, self.default_cooldown);

                    if !status.is_success() {
                        warn!("{} answered HTTP {}", endpoint, status);
                        return Err(FetchError::ServiceError(status.as_u16()));
                    }

                    return read_body(resp, opts.max_body_bytes).await;
                }
                Err(e) if e.is_builder() => {
                    return Err(FetchError::InvalidInput(e.to_string()));
                }
                Err(e) => {
                    self.state()
                        .record_call(&endpoint, now, None, self.default_cooldown);

                    if attempt >= opts.max_retries {
                        warn!(
                            "❌ {} failed after {} retries: {}",
                            endpoint, opts.max_retries, e
                        );
                        return Err(FetchError::NetworkFailure(e.to_string()));
                    }

                    let delay = opts.backoff(attempt);
                    info!(
                        "⚠️ {} request failed (attempt {}): {}. Retrying in {:?}...",
                        endpoint,
                        attempt + 1,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    fn build(&self, req: &Request, opts: &FetchOptions) -> reqwest::RequestBuilder {
        let mut builder = self
            .http
            .request(req.method.clone(), &req.url)
            .timeout(opts.timeout);
        if !req.query.is_empty() {
            builder = builder.query(&req.query);
        }
        for (key, value) in &req.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }
        if let Some(body) = &req.body {
            builder = builder.json(body);
        }
        builder
    }

    fn state(&self) -> MutexGuard<'_, RateLimitState> {
        self.rate_limits
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

async fn read_body(mut resp: Response, limit: Option<usize>) -> Result<String, FetchError> {
    let Some(limit) = limit else {
        return resp
            .text()
            .await
            .map_err(|e| FetchError::NetworkFailure(e.to_string()));
    };

    let mut buf: Vec<u8> = Vec::new();
    while let Some(chunk) = resp
        .chunk()
        .await
        .map_err(|e| FetchError::NetworkFailure(e.to_string()))?
    {
        let room = limit - buf.len();
        if chunk.len() >= room {
            buf.extend_from_slice(&chunk[..room]);
            debug!("Body cut at {} bytes", limit);
            break;
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    header_u64(headers, "retry-after").map(Duration::from_secs)
}

fn remaining_quota(headers: &HeaderMap) -> Option<u64> {
    header_u64(headers, "x-ratelimit-requests-remaining")
        .or_else(|| header_u64(headers, "x-ratelimit-remaining"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::support::{serve, unused_addr};
    use axum::{http::StatusCode as AxumStatus, routing::get, Json, Router};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn opts() -> FetchOptions {
        FetchOptions {
            timeout: Duration::from_millis(200),
            max_retries: 2,
            backoff_base: Duration::from_millis(5),
            max_body_bytes: None,
        }
    }

    fn client() -> FetchClient {
        FetchClient::new(Duration::from_secs(60)).unwrap()
    }

    #[test]
    fn backoff_doubles_per_attempt() {
        let o = FetchOptions {
            backoff_base: Duration::from_millis(500),
            ..opts()
        };
        assert_eq!(o.backoff(0), Duration::from_millis(500));
        assert_eq!(o.backoff(1), Duration::from_secs(1));
        assert_eq!(o.backoff(3), Duration::from_secs(4));
    }

    #[test]
    fn endpoint_key_drops_query() {
        assert_eq!(
            endpoint_key("https://api.example.com/v1/coins?limit=5").unwrap(),
            "api.example.com/v1/coins"
        );
        assert!(matches!(
            endpoint_key("not a url"),
            Err(FetchError::InvalidInput(_))
        ));
    }

    #[test]
    fn rapidapi_key_sets_host_header() {
        let req = Request::get("https://twitter-api45.p.rapidapi.com/screenname.php")
            .rapidapi_key("secret");
        assert!(req
            .headers
            .contains(&("x-rapidapi-host".into(), "twitter-api45.p.rapidapi.com".into())));
        assert!(req.headers.contains(&("x-rapidapi-key".into(), "secret".into())));
    }

    #[tokio::test]
    async fn decodes_json_and_records_quota() {
        let app = Router::new().route(
            "/coin",
            get(|| async {
                (
                    [("x-ratelimit-requests-remaining", "17")],
                    Json(json!({"mint": "ABC"})),
                )
            }),
        );
        let base = serve(app).await;
        let client = client();

        let url = format!("{base}/coin");
        let value: Value = client.fetch_json(&Request::get(&url), &opts()).await.unwrap();
        assert_eq!(value["mint"], "ABC");

        let key = endpoint_key(&url).unwrap();
        let state = client.rate_limits();
        let entry = state.get(&key).unwrap();
        assert!(entry.last_call.is_some());
        assert_eq!(entry.remaining_quota, Some(17));
    }

    #[tokio::test]
    async fn exhausted_quota_fails_fast_on_next_call() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let app = Router::new().route(
            "/profile",
            get(move || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    (
                        [("x-ratelimit-requests-remaining", "0")],
                        Json(json!({"followers_count": 1})),
                    )
                }
            }),
        );
        let base = serve(app).await;
        let client = client();
        let url = format!("{base}/profile");

        let first: Value = client.fetch_json(&Request::get(&url), &opts()).await.unwrap();
        assert_eq!(first["followers_count"], 1);

        let second = client.fetch_text(&Request::get(&url), &opts()).await;
        assert!(matches!(second, Err(FetchError::RateLimited { retry_after: Some(_) })));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn capped_body_is_cut() {
        let app = Router::new().route("/page", get(|| async { "a".repeat(50_000) }));
        let base = serve(app).await;
        let capped = FetchOptions {
            max_body_bytes: Some(100),
            ..opts()
        };

        let body = client()
            .fetch_text(&Request::get(format!("{base}/page")), &capped)
            .await
            .unwrap();
        assert_eq!(body.len(), 100);

        let whole = client()
            .fetch_text(&Request::get(format!("{base}/page")), &opts())
            .await
            .unwrap();
        assert_eq!(whole.len(), 50_000);
    }

    #[tokio::test]
    async fn undecodable_payload_is_malformed() {
        let app = Router::new().route("/coin", get(|| async { "<html>nope</html>" }));
        let base = serve(app).await;

        let res: Result<Value, _> = client()
            .fetch_json(&Request::get(format!("{base}/coin")), &opts())
            .await;
        assert!(matches!(res, Err(FetchError::MalformedResponse(_))));
    }

    #[tokio::test]
    async fn non_success_status_is_service_error() {
        let app = Router::new().route(
            "/coin",
            get(|| async { (AxumStatus::BAD_GATEWAY, "upstream down") }),
        );
        let base = serve(app).await;

        let res = client()
            .fetch_text(&Request::get(format!("{base}/coin")), &opts())
            .await;
        assert_eq!(res, Err(FetchError::ServiceError(502)));
    }

    #[tokio::test]
    async fn too_many_requests_marks_cooldown_and_fails_fast_afterwards() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let app = Router::new().route(
            "/detect",
            get(move || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    (AxumStatus::TOO_MANY_REQUESTS, [("retry-after", "30")], "slow down")
                }
            }),
        );
        let base = serve(app).await;
        let client = client();
        let url = format!("{base}/detect");

        let first = client.fetch_text(&Request::get(&url), &opts()).await;
        assert_eq!(
            first,
            Err(FetchError::RateLimited {
                retry_after: Some(Duration::from_secs(30))
            })
        );
        assert!(client.cooldown_remaining(&url).is_some());

        // Inside the window: no request leaves the process.
        let second = client.fetch_text(&Request::get(&url), &opts()).await;
        assert!(matches!(second, Err(FetchError::RateLimited { retry_after: Some(_) })));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cooldown_is_shared_between_clones() {
        let app = Router::new().route(
            "/detect",
            get(|| async { (AxumStatus::TOO_MANY_REQUESTS, "slow down") }),
        );
        let base = serve(app).await;
        let client = client();
        let other = client.clone();
        let url = format!("{base}/detect");

        let _ = client.fetch_text(&Request::get(&url), &opts()).await;
        assert!(other.cooldown_remaining(&url).is_some());
    }

    #[tokio::test]
    async fn connection_refused_retries_then_fails() {
        let addr = unused_addr().await;
        let client = client();
        let url = format!("http://{addr}/coin");

        let res = client.fetch_text(&Request::get(&url), &opts()).await;
        assert!(matches!(res, Err(FetchError::NetworkFailure(_))));

        let key = endpoint_key(&url).unwrap();
        assert!(client.rate_limits().get(&key).unwrap().last_call.is_some());
    }

    #[tokio::test]
    async fn timeouts_are_retried_up_to_max_retries() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let app = Router::new().route(
            "/slow",
            get(move || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_secs(2)).await;
                    "late"
                }
            }),
        );
        let base = serve(app).await;

        let res = client()
            .fetch_text(&Request::get(format!("{base}/slow")), &opts())
            .await;
        assert!(matches!(res, Err(FetchError::NetworkFailure(_))));
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }
}
