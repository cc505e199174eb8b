//! Shared blocking HTTP client for metadata providers.

use std::io::ErrorKind;
use std::num::NonZeroU32;
use std::time::{Duration, Instant};

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use log::debug;
use serde_json::Value;

use super::RemoteError;

const USER_AGENT: &str = concat!("nowplaying/", env!("CARGO_PKG_VERSION"));
const RATE_LIMIT_WAIT_CAP: Duration = Duration::from_secs(1);
const RATE_LIMIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// `ureq` agent plus an optional spacing limiter shared by every request.
pub struct HttpClient {
    agent: ureq::Agent,
    timeout: Duration,
    limiter: Option<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
}

impl HttpClient {
    /// Creates a client. A zero `min_request_interval` disables spacing.
    pub fn new(timeout: Duration, min_request_interval: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout_read(timeout)
            .timeout_write(timeout)
            .user_agent(USER_AGENT)
            .build();
        let limiter = Quota::with_period(min_request_interval)
            .map(|quota| quota.allow_burst(NonZeroU32::MIN))
            .map(RateLimiter::direct);

        Self {
            agent,
            timeout,
            limiter,
        }
    }

    fn wait_for_rate_limit_slot(&self) -> Result<(), RemoteError> {
        let Some(limiter) = self.limiter.as_ref() else {
            return Ok(());
        };
        let deadline = Instant::now() + RATE_LIMIT_WAIT_CAP;
        loop {
            if limiter.check().is_ok() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                debug!("Remote request dropped: local rate limit slot not available");
                return Err(RemoteError::RateLimited);
            }
            std::thread::sleep(RATE_LIMIT_POLL_INTERVAL);
        }
    }

    /// GETs `url` and parses the body as JSON.
    pub fn get_json(&self, url: &str, headers: &[(&str, &str)]) -> Result<Value, RemoteError> {
        self.wait_for_rate_limit_slot()?;
        let mut request = self
            .agent
            .get(url)
            .set("Accept", "application/json")
            .timeout(self.timeout);
        for (name, value) in headers {
            request = request.set(name, value);
        }
        let response = request.call().map_err(classify_ureq_failure)?;
        read_json(response)
    }

    /// POSTs a form body and parses the response as JSON.
    pub fn post_form_json(&self, url: &str, form: &[(&str, &str)]) -> Result<Value, RemoteError> {
        self.wait_for_rate_limit_slot()?;
        let response = self
            .agent
            .post(url)
            .set("Accept", "application/json")
            .timeout(self.timeout)
            .send_form(form)
            .map_err(classify_ureq_failure)?;
        read_json(response)
    }
}

fn read_json(response: ureq::Response) -> Result<Value, RemoteError> {
    response.into_json::<Value>().map_err(|error| {
        if is_io_timeout(&error) {
            RemoteError::Timeout(format!("failed to read response: {error}"))
        } else {
            RemoteError::Malformed(format!("invalid JSON response: {error}"))
        }
    })
}

fn is_io_timeout(error: &std::io::Error) -> bool {
    matches!(error.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock)
        || error.to_string().to_ascii_lowercase().contains("timed out")
}

/// Maps a `ureq` failure onto the provider error taxonomy.
pub fn classify_ureq_failure(error: ureq::Error) -> RemoteError {
    match error {
        ureq::Error::Status(code, _) => match code {
            401 | 403 => RemoteError::Unauthorized,
            429 => RemoteError::RateLimited,
            408 | 504 => RemoteError::Timeout(format!("HTTP {code}")),
            _ => RemoteError::Status(code),
        },
        ureq::Error::Transport(transport) => {
            let message = transport.to_string();
            let lowered = message.to_ascii_lowercase();
            if lowered.contains("timed out") || lowered.contains("timeout") {
                RemoteError::Timeout(message)
            } else {
                RemoteError::Transport(message)
            }
        }
    }
}

/// Returns `value[key]` as a trimmed, non-empty string.
pub fn json_str(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}
