// Zaptec cloud HTTP client
//
// Wraps `reqwest::Client` with bearer-token auth, the shared rate
// limiter, and the retry policy the vendor's fair-use rules demand.
// Endpoint methods live in `endpoints.rs`; this module is transport
// mechanics only.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use reqwest::Method;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use url::Url;

use crate::auth::Credentials;
use crate::error::ApiError;
use crate::limiter::RateLimiter;
use crate::models::{TokenError, TokenResponse};
use crate::transport::TransportConfig;

/// Tuning knobs for the request/retry engine.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// API root, trailing slash optional (default `https://api.zaptec.com/api/`).
    pub base_url: Url,
    /// OAuth token endpoint (default `https://api.zaptec.com/oauth/token`).
    pub token_url: Url,
    /// Attempt budget per logical request, re-auth replays included.
    pub retries: u32,
    /// Delay before the first retry.
    pub retry_initial_delay: Duration,
    /// Exponential backoff factor between retries.
    pub retry_factor: f64,
    /// Relative jitter applied to each backoff delay.
    pub retry_jitter: f64,
    /// Ceiling for a single backoff delay.
    pub retry_max_delay: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: Url::parse("https://api.zaptec.com/api/").expect("static URL"),
            token_url: Url::parse("https://api.zaptec.com/oauth/token").expect("static URL"),
            retries: 9,
            retry_initial_delay: Duration::from_millis(10),
            retry_factor: 2.3,
            retry_jitter: 0.1,
            retry_max_delay: Duration::from_secs(600),
        }
    }
}

/// What a failed attempt left behind, used to pick the terminal error
/// once the attempt budget runs out.
enum RetryCause {
    Connect(String),
    Timeout,
    RateLimited,
    Status(u16),
}

/// Authenticated client for the Zaptec cloud API.
///
/// Every attempt -- first try or retry -- reserves a slot from the
/// shared [`RateLimiter`] before touching the network, so pollers and
/// commands cannot conspire to exceed the vendor ceiling.
pub struct ApiClient {
    http: reqwest::Client,
    config: ApiConfig,
    credentials: Credentials,
    access_token: RwLock<Option<SecretString>>,
    limiter: Arc<RateLimiter>,
}

impl ApiClient {
    /// Create a new client. Does not authenticate -- call
    /// [`login()`](Self::login) before issuing requests.
    pub fn new(
        credentials: Credentials,
        limiter: Arc<RateLimiter>,
        transport: &TransportConfig,
        config: ApiConfig,
    ) -> Result<Self, ApiError> {
        let http = transport.build_client()?;
        Ok(Self {
            http,
            config,
            credentials,
            access_token: RwLock::new(None),
            limiter,
        })
    }

    /// The shared rate limiter handle.
    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Authenticate and cache an access token.
    pub async fn login(&self) -> Result<(), ApiError> {
        self.refresh_token().await
    }

    // ── Token flow ───────────────────────────────────────────────────

    /// Fetch a fresh access token with the password grant.
    ///
    /// The token grant has no server-side effect, so 5xx responses are
    /// retried here even though the exchange is a POST.
    async fn refresh_token(&self) -> Result<(), ApiError> {
        let url = self.config.token_url.clone();
        let form = [
            ("username", self.credentials.username.clone()),
            (
                "password",
                self.credentials.password.expose_secret().to_owned(),
            ),
            ("grant_type", "password".to_owned()),
        ];

        let mut delay = self.config.retry_initial_delay;
        let mut last = RetryCause::Timeout;
        for attempt in 1..=self.config.retries {
            if attempt > 1 {
                self.backoff(&mut delay).await;
            }
            self.limiter.reserve_slot().await;
            debug!(attempt, "requesting access token");

            let resp = match self.http.post(url.clone()).form(&form).send().await {
                Ok(resp) => resp,
                Err(e) if e.is_timeout() => {
                    last = RetryCause::Timeout;
                    continue;
                }
                Err(e) if e.is_connect() => {
                    last = RetryCause::Connect(e.to_string());
                    continue;
                }
                Err(e) => {
                    return Err(ApiError::Connection {
                        message: e.to_string(),
                    });
                }
            };

            match resp.status().as_u16() {
                200 => {
                    let body = resp.text().await.unwrap_or_default();
                    let token: TokenResponse = parse_body(&body, "oauth/token")?;
                    *self.access_token.write().await = Some(SecretString::from(token.access_token));
                    debug!("access token refreshed");
                    return Ok(());
                }
                400 => {
                    let body = resp.text().await.unwrap_or_default();
                    let detail = serde_json::from_str::<TokenError>(&body)
                        .ok()
                        .and_then(|e| e.error_description)
                        .unwrap_or_else(|| "invalid credentials".into());
                    return Err(ApiError::Authentication { message: detail });
                }
                429 => {
                    last = RetryCause::RateLimited;
                }
                s @ 500..=599 => {
                    last = RetryCause::Status(s);
                }
                s => {
                    return Err(ApiError::RequestFailed {
                        method: "POST",
                        url: url.to_string(),
                        status: s,
                    });
                }
            }
        }

        Err(self.exhausted("POST", &url, last))
    }

    // ── Request engine ───────────────────────────────────────────────

    /// Send a request and return the raw response body.
    ///
    /// Retry policy:
    /// - connect errors and timeouts retry with backoff;
    /// - 429 retries with backoff, surfacing [`ApiError::RateLimited`]
    ///   when the attempt budget runs out;
    /// - 5xx retries for GET only -- a mutating request may already have
    ///   taken effect server-side, so it fails immediately;
    /// - 401 triggers one re-authentication, then a replay; a second
    ///   401 is fatal.
    async fn send_text(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<String, ApiError> {
        let url = self.api_url(path);
        let method_name = method_str(&method);
        let mutating = method == Method::POST || method == Method::PUT;

        let mut delay = self.config.retry_initial_delay;
        let mut reauthed = false;
        let mut last = RetryCause::Timeout;
        for attempt in 1..=self.config.retries {
            if attempt > 1 {
                self.backoff(&mut delay).await;
            }
            self.limiter.reserve_slot().await;
            debug!(method = method_name, %url, attempt, "request");

            let token = self.access_token.read().await.clone();
            let mut req = self
                .http
                .request(method.clone(), url.clone())
                .header(reqwest::header::ACCEPT, "application/json");
            if let Some(ref token) = token {
                req = req.bearer_auth(token.expose_secret());
            }
            if let Some(json) = body {
                req = req.json(json);
            }

            let resp = match req.send().await {
                Ok(resp) => resp,
                Err(e) if e.is_timeout() => {
                    debug!(attempt, "request timed out, will retry");
                    last = RetryCause::Timeout;
                    continue;
                }
                Err(e) if e.is_connect() => {
                    debug!(attempt, error = %e, "connection failed, will retry");
                    last = RetryCause::Connect(e.to_string());
                    continue;
                }
                Err(e) => {
                    return Err(ApiError::Connection {
                        message: e.to_string(),
                    });
                }
            };

            match resp.status().as_u16() {
                200 | 201 | 204 => {
                    return resp.text().await.map_err(|e| ApiError::Connection {
                        message: e.to_string(),
                    });
                }
                401 => {
                    if reauthed {
                        return Err(ApiError::Authentication {
                            message: "token rejected after re-authentication".into(),
                        });
                    }
                    debug!("access token expired, re-authenticating");
                    self.refresh_token().await?;
                    reauthed = true;
                }
                429 => {
                    warn!(attempt, %url, "rate limited by the cloud, backing off");
                    last = RetryCause::RateLimited;
                }
                s @ 500..=599 => {
                    if mutating {
                        return Err(ApiError::RequestFailed {
                            method: method_name,
                            url: url.to_string(),
                            status: s,
                        });
                    }
                    debug!(status = s, attempt, "server error on read, will retry");
                    last = RetryCause::Status(s);
                }
                s => {
                    return Err(ApiError::RequestFailed {
                        method: method_name,
                        url: url.to_string(),
                        status: s,
                    });
                }
            }
        }

        Err(self.exhausted(method_name, &url, last))
    }

    /// GET a JSON document.
    pub(crate) async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let body = self.send_text(Method::GET, path, None).await?;
        parse_body(&body, path)
    }

    /// POST and discard the response body (many vendor endpoints answer
    /// 200 with an empty or uninteresting payload).
    pub(crate) async fn post_unit(
        &self,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<(), ApiError> {
        self.send_text(Method::POST, path, body).await.map(|_| ())
    }

    // ── Helpers ──────────────────────────────────────────────────────

    fn api_url(&self, path: &str) -> Url {
        let base = self.config.base_url.as_str().trim_end_matches('/');
        Url::parse(&format!("{base}/{path}")).expect("invalid API URL")
    }

    /// Sleep out the current backoff delay (with jitter), then advance it.
    async fn backoff(&self, delay: &mut Duration) {
        let jitter = self.config.retry_jitter;
        let factor = rand::thread_rng().gen_range(1.0 - jitter..=1.0 + jitter);
        let sleep_for = delay.mul_f64(factor.max(0.0)).min(self.config.retry_max_delay);
        debug!(?sleep_for, "backing off before retry");
        tokio::time::sleep(sleep_for).await;
        *delay = delay
            .mul_f64(self.config.retry_factor)
            .min(self.config.retry_max_delay);
    }

    /// Terminal error once the attempt budget is spent.
    fn exhausted(&self, method: &'static str, url: &Url, last: RetryCause) -> ApiError {
        let attempts = self.config.retries;
        match last {
            RetryCause::Timeout => ApiError::Timeout {
                url: url.to_string(),
                attempts,
            },
            RetryCause::RateLimited => ApiError::RateLimited { attempts },
            RetryCause::Connect(message) => ApiError::Connection {
                message: format!("{message} ({attempts} attempts)"),
            },
            RetryCause::Status(status) => ApiError::RequestFailed {
                method,
                url: url.to_string(),
                status,
            },
        }
    }
}

fn method_str(method: &Method) -> &'static str {
    match method.as_str() {
        "GET" => "GET",
        "POST" => "POST",
        "PUT" => "PUT",
        "DELETE" => "DELETE",
        _ => "OTHER",
    }
}

/// Deserialize a response body, mapping failure to a validation error
/// that keeps a preview of the offending payload.
fn parse_body<T: DeserializeOwned>(body: &str, context: &str) -> Result<T, ApiError> {
    serde_json::from_str(body).map_err(|e| ApiError::Validation {
        message: format!("{context}: {e}"),
        body: body.chars().take(200).collect(),
    })
}
