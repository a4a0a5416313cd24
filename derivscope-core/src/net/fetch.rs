//! Retrying HTTP fetch client.
//!
//! Wraps a single HTTP call with retry, exponential backoff, `Retry-After`
//! honoring on HTTP 429, and classification of failures into retryable vs
//! terminal. Network problems are never raised as hard failures: every call
//! returns a typed result and callers above treat a failure as "no data
//! this run" for that request.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use thiserror::Error;

use super::throttle::Throttle;
use super::transport::{HttpTransport, RawResponse, Transport, TransportError};

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// An outbound request: URL, ordered query parameters, timeout.
/// Immutable once constructed (builder methods consume `self`).
#[derive(Debug, Clone)]
pub struct Endpoint {
    url: String,
    query: Vec<(String, String)>,
    timeout: Duration,
}

impl Endpoint {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            query: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Append a query parameter. Order is preserved.
    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn params(&self) -> &[(String, String)] {
        &self.query
    }

    pub fn request_timeout(&self) -> Duration {
        self.timeout
    }
}

/// Failure classification for a fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    /// 400/404/405 — the request itself is wrong; retrying cannot help.
    ClientError,
    /// HTTP 429 — transient, honored via `Retry-After` or backoff.
    RateLimited,
    /// Any other non-2xx status.
    ServerError,
    Timeout,
    Transport,
    /// 2xx with a body that does not decode as the expected shape.
    Decode,
}

/// Typed fetch failure. Everything except `Client` is retryable within the
/// attempt budget.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("HTTP {status} client error: {url}")]
    Client { status: u16, url: String },

    #[error("rate limited (HTTP 429): {url}")]
    RateLimited { url: String },

    #[error("HTTP {status}: {url}")]
    Server { status: u16, url: String },

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("undecodable response body: {0}")]
    Decode(String),

    #[error("all fallback endpoints exhausted")]
    Exhausted,
}

impl FetchError {
    pub fn kind(&self) -> FetchErrorKind {
        match self {
            FetchError::Client { .. } => FetchErrorKind::ClientError,
            FetchError::RateLimited { .. } => FetchErrorKind::RateLimited,
            FetchError::Server { .. } => FetchErrorKind::ServerError,
            FetchError::Timeout(_) => FetchErrorKind::Timeout,
            FetchError::Transport(_) | FetchError::Exhausted => FetchErrorKind::Transport,
            FetchError::Decode(_) => FetchErrorKind::Decode,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind() != FetchErrorKind::ClientError
    }
}

/// Retry budget and backoff schedule.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Backoff delay for a 0-indexed attempt: `base_delay × 2^attempt`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt)
    }

    /// Wait after an HTTP 429: the provider's `Retry-After` wins when it is
    /// larger than the computed backoff.
    pub fn rate_limit_delay(&self, attempt: u32, retry_after: Option<u64>) -> Duration {
        let backoff = self.backoff_delay(attempt);
        match retry_after {
            Some(secs) => backoff.max(Duration::from_secs(secs)),
            None => backoff,
        }
    }
}

/// Structured diagnostics for retry behavior, so tests can assert on it
/// without parsing text.
pub trait FetchObserver: Send + Sync {
    /// A failed attempt that will be retried after `wait`.
    fn on_retry(&self, url: &str, attempt: u32, max_attempts: u32, wait: Duration, error: &FetchError);

    /// The attempt budget is exhausted; `error` is what the caller gets.
    fn on_give_up(&self, url: &str, attempts: u32, error: &FetchError);

    /// A fallback-chain candidate failed and the next one will be tried.
    fn on_fallback(&self, failed_url: &str);
}

/// Observer that prints one line per event to stderr.
pub struct StderrObserver;

impl FetchObserver for StderrObserver {
    fn on_retry(&self, url: &str, attempt: u32, max_attempts: u32, wait: Duration, error: &FetchError) {
        eprintln!(
            "  retry {}/{} for {url} in {:.1}s: {error}",
            attempt + 1,
            max_attempts,
            wait.as_secs_f64()
        );
    }

    fn on_give_up(&self, url: &str, attempts: u32, error: &FetchError) {
        eprintln!("  FAILED after {attempts} attempts: {url}: {error}");
    }

    fn on_fallback(&self, failed_url: &str) {
        eprintln!("  trying next fallback after {failed_url}");
    }
}

enum Classified<T> {
    Success(T),
    Terminal(FetchError),
    Retryable {
        error: FetchError,
        rate_limited: bool,
        retry_after: Option<u64>,
    },
}

/// Shared fetch primitive for every data source.
///
/// Holds the transport, the process-wide throttle, and the diagnostics
/// sink. The retry policy is passed per call so sources with different
/// budgets can share one client.
pub struct FetchClient {
    transport: Box<dyn Transport>,
    throttle: Arc<Throttle>,
    observer: Box<dyn FetchObserver>,
}

impl FetchClient {
    pub fn new(transport: Box<dyn Transport>, throttle: Arc<Throttle>) -> Self {
        Self {
            transport,
            throttle,
            observer: Box::new(StderrObserver),
        }
    }

    /// Production client: reqwest transport behind the shared throttle.
    pub fn http(throttle: Arc<Throttle>) -> Self {
        Self::new(Box::new(HttpTransport::new()), throttle)
    }

    pub fn with_observer(mut self, observer: Box<dyn FetchObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// GET with retry, backoff, and 429 handling.
    pub fn get<T: DeserializeOwned>(
        &self,
        endpoint: &Endpoint,
        policy: &RetryPolicy,
    ) -> Result<T, FetchError> {
        self.run_attempts(endpoint, policy, true, |transport, ep| transport.get(ep))
    }

    /// Try each endpoint in order, returning the first success. All
    /// candidates failing yields the last failure; an empty chain yields
    /// `Exhausted`. Callers treat either as "no data this run".
    pub fn get_with_fallback<T: DeserializeOwned>(
        &self,
        endpoints: &[Endpoint],
        policy: &RetryPolicy,
    ) -> Result<T, FetchError> {
        let mut last_error = FetchError::Exhausted;
        for (i, endpoint) in endpoints.iter().enumerate() {
            match self.get(endpoint, policy) {
                Ok(value) => return Ok(value),
                Err(error) => {
                    if i + 1 < endpoints.len() {
                        self.observer.on_fallback(endpoint.url());
                    }
                    last_error = error;
                }
            }
        }
        Err(last_error)
    }

    /// POST with the same retry/backoff loop but no status special-casing:
    /// the POST endpoints in this system are trusted internal-shape calls,
    /// so any failure is retryable up to the attempt budget.
    pub fn post<T: DeserializeOwned>(
        &self,
        endpoint: &Endpoint,
        body: &serde_json::Value,
        policy: &RetryPolicy,
    ) -> Result<T, FetchError> {
        self.run_attempts(endpoint, policy, false, |transport, ep| {
            transport.post(ep, body)
        })
    }

    fn run_attempts<T, F>(
        &self,
        endpoint: &Endpoint,
        policy: &RetryPolicy,
        classify_statuses: bool,
        issue: F,
    ) -> Result<T, FetchError>
    where
        T: DeserializeOwned,
        F: Fn(&dyn Transport, &Endpoint) -> Result<RawResponse, TransportError>,
    {
        for attempt in 0..policy.max_attempts {
            self.throttle.acquire();

            let (error, wait) = match issue(self.transport.as_ref(), endpoint) {
                Ok(resp) => match Self::classify::<T>(resp, endpoint, classify_statuses) {
                    Classified::Success(value) => return Ok(value),
                    Classified::Terminal(error) => return Err(error),
                    Classified::Retryable {
                        error,
                        rate_limited,
                        retry_after,
                    } => {
                        let wait = if rate_limited {
                            policy.rate_limit_delay(attempt, retry_after)
                        } else {
                            policy.backoff_delay(attempt)
                        };
                        (error, wait)
                    }
                },
                Err(TransportError::Timeout(msg)) => {
                    (FetchError::Timeout(msg), policy.backoff_delay(attempt))
                }
                Err(TransportError::Connect(msg)) => {
                    (FetchError::Transport(msg), policy.backoff_delay(attempt))
                }
            };

            if attempt + 1 >= policy.max_attempts {
                self.observer
                    .on_give_up(endpoint.url(), policy.max_attempts, &error);
                return Err(error);
            }
            self.observer
                .on_retry(endpoint.url(), attempt, policy.max_attempts, wait, &error);
            std::thread::sleep(wait);
        }

        // max_attempts of 0 allows no attempts at all.
        Err(FetchError::Exhausted)
    }

    fn classify<T: DeserializeOwned>(
        resp: RawResponse,
        endpoint: &Endpoint,
        classify_statuses: bool,
    ) -> Classified<T> {
        let url = endpoint.url().to_string();

        if classify_statuses && matches!(resp.status, 400 | 404 | 405) {
            return Classified::Terminal(FetchError::Client {
                status: resp.status,
                url,
            });
        }
        if classify_statuses && resp.status == 429 {
            return Classified::Retryable {
                error: FetchError::RateLimited { url },
                rate_limited: true,
                retry_after: resp.retry_after,
            };
        }
        if !(200..300).contains(&resp.status) {
            return Classified::Retryable {
                error: FetchError::Server {
                    status: resp.status,
                    url,
                },
                rate_limited: false,
                retry_after: None,
            };
        }
        match serde_json::from_str::<T>(&resp.body) {
            Ok(value) => Classified::Success(value),
            Err(e) => Classified::Retryable {
                error: FetchError::Decode(e.to_string()),
                rate_limited: false,
                retry_after: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Transport that replays a scripted sequence of responses and counts
    /// calls through a shared handle.
    struct ScriptedTransport {
        script: Mutex<VecDeque<Result<RawResponse, TransportError>>>,
        calls: Arc<Mutex<u32>>,
    }

    impl ScriptedTransport {
        fn next(&self) -> Result<RawResponse, TransportError> {
            *self.calls.lock().unwrap() += 1;
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .expect("scripted transport ran out of responses")
        }
    }

    impl Transport for ScriptedTransport {
        fn get(&self, _endpoint: &Endpoint) -> Result<RawResponse, TransportError> {
            self.next()
        }

        fn post(
            &self,
            _endpoint: &Endpoint,
            _body: &serde_json::Value,
        ) -> Result<RawResponse, TransportError> {
            self.next()
        }
    }

    #[derive(Clone, Default)]
    struct Recording {
        retries: Arc<Mutex<Vec<(u32, Duration, FetchErrorKind)>>>,
        give_ups: Arc<Mutex<Vec<FetchErrorKind>>>,
        fallbacks: Arc<Mutex<Vec<String>>>,
    }

    impl FetchObserver for Recording {
        fn on_retry(&self, _url: &str, attempt: u32, _max: u32, wait: Duration, error: &FetchError) {
            self.retries.lock().unwrap().push((attempt, wait, error.kind()));
        }

        fn on_give_up(&self, _url: &str, _attempts: u32, error: &FetchError) {
            self.give_ups.lock().unwrap().push(error.kind());
        }

        fn on_fallback(&self, failed_url: &str) {
            self.fallbacks.lock().unwrap().push(failed_url.to_string());
        }
    }

    fn ok_json(body: &str) -> Result<RawResponse, TransportError> {
        Ok(RawResponse {
            status: 200,
            retry_after: None,
            body: body.to_string(),
        })
    }

    fn status(code: u16) -> Result<RawResponse, TransportError> {
        Ok(RawResponse {
            status: code,
            retry_after: None,
            body: String::new(),
        })
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::ZERO,
        }
    }

    fn client_with(
        script: Vec<Result<RawResponse, TransportError>>,
        observer: Recording,
    ) -> (FetchClient, Arc<Mutex<u32>>) {
        let calls = Arc::new(Mutex::new(0));
        let transport = ScriptedTransport {
            script: Mutex::new(script.into()),
            calls: Arc::clone(&calls),
        };
        let throttle = Arc::new(Throttle::new(Duration::ZERO));
        let client =
            FetchClient::new(Box::new(transport), throttle).with_observer(Box::new(observer));
        (client, calls)
    }

    #[test]
    fn success_on_first_attempt() {
        let (client, calls) = client_with(vec![ok_json(r#"{"x": 1}"#)], Recording::default());
        let value: serde_json::Value = client
            .get(&Endpoint::new("http://test/a"), &fast_policy(4))
            .unwrap();
        assert_eq!(value["x"], 1);
        assert_eq!(*calls.lock().unwrap(), 1);
    }

    #[test]
    fn transient_errors_consume_exactly_the_attempt_budget() {
        let recording = Recording::default();
        let (client, calls) = client_with(
            vec![status(500), status(502), status(503), status(500)],
            recording.clone(),
        );
        let result: Result<serde_json::Value, _> =
            client.get(&Endpoint::new("http://test/a"), &fast_policy(4));

        let err = result.unwrap_err();
        assert_eq!(err.kind(), FetchErrorKind::ServerError);
        assert_eq!(*calls.lock().unwrap(), 4);
        assert_eq!(recording.retries.lock().unwrap().len(), 3);
        assert_eq!(
            recording.give_ups.lock().unwrap().as_slice(),
            &[FetchErrorKind::ServerError]
        );
    }

    #[test]
    fn client_error_is_terminal_after_one_attempt() {
        for code in [400, 404, 405] {
            let (client, calls) = client_with(vec![status(code)], Recording::default());
            let result: Result<serde_json::Value, _> =
                client.get(&Endpoint::new("http://test/a"), &fast_policy(10));
            assert_eq!(result.unwrap_err().kind(), FetchErrorKind::ClientError);
            assert_eq!(*calls.lock().unwrap(), 1);
        }
    }

    #[test]
    fn rate_limit_consumes_an_attempt_then_retries() {
        let recording = Recording::default();
        let (client, calls) = client_with(
            vec![status(429), ok_json(r#"{"ok": true}"#)],
            recording.clone(),
        );
        let value: serde_json::Value = client
            .get(&Endpoint::new("http://test/a"), &fast_policy(4))
            .unwrap();
        assert_eq!(value["ok"], true);
        assert_eq!(*calls.lock().unwrap(), 2);

        let retries = recording.retries.lock().unwrap();
        assert_eq!(retries.len(), 1);
        assert_eq!(retries[0].2, FetchErrorKind::RateLimited);
    }

    #[test]
    fn retry_after_wins_over_smaller_backoff() {
        let policy = RetryPolicy {
            max_attempts: 4,
            base_delay: Duration::from_secs(2),
        };
        // Attempt 0 backoff is 2s; a Retry-After of 10 must win.
        assert_eq!(policy.rate_limit_delay(0, Some(10)), Duration::from_secs(10));
        // A Retry-After smaller than the backoff does not shrink the wait.
        assert_eq!(policy.rate_limit_delay(2, Some(1)), Duration::from_secs(8));
        assert_eq!(policy.rate_limit_delay(1, None), Duration::from_secs(4));
    }

    #[test]
    fn backoff_doubles_per_attempt() {
        let policy = RetryPolicy {
            max_attempts: 4,
            base_delay: Duration::from_secs(2),
        };
        assert_eq!(policy.backoff_delay(0), Duration::from_secs(2));
        assert_eq!(policy.backoff_delay(1), Duration::from_secs(4));
        assert_eq!(policy.backoff_delay(2), Duration::from_secs(8));
    }

    #[test]
    fn undecodable_body_is_retried() {
        let (client, calls) = client_with(
            vec![ok_json("not json at all"), ok_json(r#"{"x": 2}"#)],
            Recording::default(),
        );
        let value: serde_json::Value = client
            .get(&Endpoint::new("http://test/a"), &fast_policy(4))
            .unwrap();
        assert_eq!(value["x"], 2);
        assert_eq!(*calls.lock().unwrap(), 2);
    }

    #[test]
    fn transport_failure_surfaces_after_budget() {
        let (client, _) = client_with(
            vec![
                Err(TransportError::Timeout("deadline".into())),
                Err(TransportError::Timeout("deadline".into())),
            ],
            Recording::default(),
        );
        let result: Result<serde_json::Value, _> =
            client.get(&Endpoint::new("http://test/a"), &fast_policy(2));
        assert_eq!(result.unwrap_err().kind(), FetchErrorKind::Timeout);
    }

    #[test]
    fn fallback_returns_first_success() {
        let recording = Recording::default();
        let (client, calls) = client_with(
            vec![status(500), status(500), ok_json(r#"{"from": "b"}"#)],
            recording.clone(),
        );
        let endpoints = [Endpoint::new("http://test/a"), Endpoint::new("http://test/b")];
        let value: serde_json::Value = client
            .get_with_fallback(&endpoints, &fast_policy(2))
            .unwrap();
        assert_eq!(value["from"], "b");
        assert_eq!(*calls.lock().unwrap(), 3);
        assert_eq!(
            recording.fallbacks.lock().unwrap().as_slice(),
            &["http://test/a".to_string()]
        );
    }

    #[test]
    fn fallback_returns_last_failure_when_all_fail() {
        let (client, _) = client_with(vec![status(500), status(503)], Recording::default());
        let endpoints = [Endpoint::new("http://test/a"), Endpoint::new("http://test/b")];
        let result: Result<serde_json::Value, _> =
            client.get_with_fallback(&endpoints, &fast_policy(1));
        assert_eq!(result.unwrap_err().kind(), FetchErrorKind::ServerError);
    }

    #[test]
    fn empty_fallback_chain_is_exhausted_not_fatal() {
        let (client, _) = client_with(vec![], Recording::default());
        let result: Result<serde_json::Value, _> =
            client.get_with_fallback(&[], &fast_policy(4));
        assert!(matches!(result.unwrap_err(), FetchError::Exhausted));
    }

    #[test]
    fn post_retries_even_client_statuses() {
        let (client, calls) = client_with(
            vec![status(400), ok_json(r#"{"posted": true}"#)],
            Recording::default(),
        );
        let value: serde_json::Value = client
            .post(
                &Endpoint::new("http://test/a"),
                &serde_json::json!({"type": "info"}),
                &fast_policy(4),
            )
            .unwrap();
        assert_eq!(value["posted"], true);
        assert_eq!(*calls.lock().unwrap(), 2);
    }

    #[test]
    fn endpoint_preserves_query_order() {
        let ep = Endpoint::new("http://test/a")
            .query("per_page", 100)
            .query("page", 2);
        assert_eq!(ep.params()[0].0, "per_page");
        assert_eq!(ep.params()[1], ("page".to_string(), "2".to_string()));
    }
}
