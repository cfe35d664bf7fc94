//! Blocking fetcher: one logical GET with a bounded retry/backoff loop.
//!
//! The network sits behind [Transport] so the attempt bound and outcome classification can be
//! exercised without a server.

use super::error::{FetchError, TransportError};
use rand::Rng;
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (compatible; listscrape/0.1)";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;
const MAX_REDIRECTS: usize = 10;

/// Status and body of one HTTP exchange. Body is only read for 2xx responses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

/// A single GET with no retry logic of its own.
pub trait Transport {
    fn get(&mut self, url: &str) -> Result<RawResponse, TransportError>;
}

/// [Transport] over a blocking reqwest client (User-Agent, timeout, limited redirects).
#[derive(Debug)]
pub struct HttpTransport {
    inner: reqwest::blocking::Client,
}

impl HttpTransport {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let inner = reqwest::blocking::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()?;
        Ok(Self { inner })
    }
}

impl Transport for HttpTransport {
    fn get(&mut self, url: &str) -> Result<RawResponse, TransportError> {
        let response = self
            .inner
            .get(url)
            .send()
            .map_err(|e| TransportError::from_reqwest(&e))?;
        let status = response.status();
        if !status.is_success() {
            return Ok(RawResponse {
                status: status.as_u16(),
                body: String::new(),
            });
        }
        let body = response
            .text()
            .map_err(|e| TransportError::from_reqwest(&e))?;
        Ok(RawResponse {
            status: status.as_u16(),
            body,
        })
    }
}

/// Attempt bound and backoff schedule.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. At least 1.
    pub max_attempts: u32,
    /// Delay after the first failed attempt. Zero disables backoff (and jitter).
    pub backoff_initial: Duration,
    pub backoff_multiplier: f64,
    /// Upper bound of the uniform random delay added to each backoff.
    pub jitter_max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_initial: Duration::ZERO,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            jitter_max: Duration::ZERO,
        }
    }
}

impl RetryPolicy {
    /// `backoff_initial * backoff_multiplier^(attempt - 1)`, without jitter.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        if self.backoff_initial.is_zero() {
            return Duration::ZERO;
        }
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.backoff_initial.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        match Duration::try_from_secs_f64(secs) {
            Ok(d) => d,
            Err(_) if secs > 0.0 => Duration::MAX,
            Err(_) => Duration::ZERO,
        }
    }

    /// Sleep before the attempt after `attempt` failed: base delay plus jitter in `[0, jitter_max]`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt);
        if base.is_zero() || self.jitter_max.is_zero() {
            return base;
        }
        let jitter = rand::thread_rng().gen_range(0.0..=self.jitter_max.as_secs_f64());
        base.saturating_add(Duration::from_secs_f64(jitter))
    }
}

/// Anything that can produce page HTML for a URL. The pipeline depends on this, not on [Fetcher].
pub trait Fetch {
    fn fetch(&mut self, url: &str) -> Result<String, FetchError>;
}

/// Why an attempt did not succeed.
#[derive(Debug)]
enum Failure {
    Status(u16),
    Transport(TransportError),
}

impl Failure {
    fn into_error(self, url: &str, attempts: u32) -> FetchError {
        match self {
            Failure::Status(status) => FetchError::HttpStatus {
                url: url.to_string(),
                status,
                attempts,
            },
            Failure::Transport(source) => FetchError::Network {
                url: url.to_string(),
                attempts,
                source,
            },
        }
    }
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Failure::Status(status) => write!(f, "HTTP {}", status),
            Failure::Transport(e) => write!(f, "{}", e),
        }
    }
}

#[derive(Debug)]
enum Outcome {
    Success(String),
    Retryable(Failure),
    Terminal(Failure),
}

/// 2xx succeeds; 429, 5xx, and transient transport failures retry; everything else is terminal.
fn classify(result: Result<RawResponse, TransportError>) -> Outcome {
    match result {
        Ok(r) if (200..300).contains(&r.status) => Outcome::Success(r.body),
        Ok(r) if r.status == 429 || (500..600).contains(&r.status) => {
            Outcome::Retryable(Failure::Status(r.status))
        }
        Ok(r) => Outcome::Terminal(Failure::Status(r.status)),
        Err(e) if e.kind.is_retryable() => Outcome::Retryable(Failure::Transport(e)),
        Err(e) => Outcome::Terminal(Failure::Transport(e)),
    }
}

/// Per-call retry state. Lives for one [Fetcher::get] call.
#[derive(Debug)]
struct AttemptState {
    attempt: u32,
    last_error: Option<String>,
    next_delay: Duration,
}

impl AttemptState {
    fn new() -> Self {
        Self {
            attempt: 1,
            last_error: None,
            next_delay: Duration::ZERO,
        }
    }
}

/// Fetcher with a bounded retry loop. Issues at most `max_attempts` GETs per call.
#[derive(Debug)]
pub struct Fetcher<T = HttpTransport> {
    transport: T,
    policy: RetryPolicy,
}

impl Fetcher<HttpTransport> {
    pub fn builder() -> FetcherBuilder {
        FetcherBuilder::default()
    }
}

impl<T: Transport> Fetcher<T> {
    pub fn with_transport(transport: T, mut policy: RetryPolicy) -> Self {
        policy.max_attempts = policy.max_attempts.max(1);
        Self { transport, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// GET `url`, retrying retryable outcomes until success or `max_attempts` is reached.
    pub fn get(&mut self, url: &str) -> Result<String, FetchError> {
        let max_attempts = self.policy.max_attempts;
        let mut state = AttemptState::new();
        loop {
            match classify(self.transport.get(url)) {
                Outcome::Success(body) => {
                    debug!(url, attempt = state.attempt, bytes = body.len(), "Fetched");
                    return Ok(body);
                }
                Outcome::Terminal(failure) => return Err(failure.into_error(url, state.attempt)),
                Outcome::Retryable(failure) => {
                    if state.attempt >= max_attempts {
                        warn!(
                            url,
                            attempts = state.attempt,
                            previous = state.last_error.as_deref().unwrap_or("none"),
                            "Giving up after {}",
                            failure
                        );
                        return Err(failure.into_error(url, state.attempt));
                    }
                    state.next_delay = self.policy.delay(state.attempt);
                    warn!(
                        url,
                        attempt = state.attempt,
                        max_attempts,
                        delay_ms = state.next_delay.as_millis() as u64,
                        "Retrying after {}",
                        failure
                    );
                    state.last_error = Some(failure.to_string());
                    if !state.next_delay.is_zero() {
                        std::thread::sleep(state.next_delay);
                    }
                    state.attempt += 1;
                }
            }
        }
    }
}

impl<T: Transport> Fetch for Fetcher<T> {
    fn fetch(&mut self, url: &str) -> Result<String, FetchError> {
        self.get(url)
    }
}

/// Builder for an HTTP [Fetcher].
#[derive(Debug)]
pub struct FetcherBuilder {
    user_agent: Option<String>,
    timeout: Duration,
    policy: RetryPolicy,
}

impl Default for FetcherBuilder {
    fn default() -> Self {
        Self {
            user_agent: None,
            timeout: DEFAULT_TIMEOUT,
            policy: RetryPolicy::default(),
        }
    }
}

impl FetcherBuilder {
    /// Set a custom User-Agent. If not set, a crawler-identifying default is used.
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    /// Per-request timeout. Default 10s.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Total attempts per fetch (default 3). Zero is treated as 1.
    pub fn max_attempts(mut self, n: u32) -> Self {
        self.policy.max_attempts = n.max(1);
        self
    }

    pub fn backoff_initial(mut self, delay: Duration) -> Self {
        self.policy.backoff_initial = delay;
        self
    }

    pub fn backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.policy.backoff_multiplier = multiplier;
        self
    }

    pub fn jitter_max(mut self, jitter: Duration) -> Self {
        self.policy.jitter_max = jitter;
        self
    }

    pub fn policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn build(self) -> Result<Fetcher<HttpTransport>, reqwest::Error> {
        let user_agent = self
            .user_agent
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());
        let transport = HttpTransport::new(&user_agent, self.timeout)?;
        Ok(Fetcher::with_transport(transport, self.policy))
    }
}
