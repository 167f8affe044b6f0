//! Blocking HTTP plumbing shared by the bundled adapters.
//!
//! Every adapter call goes through `get_text`, which turns transport errors
//! and HTTP statuses into `FetchError`s the executor knows how to retry.

use reqwest::StatusCode;
use reqwest::blocking::Client;
use std::time::Duration;
use tracing::debug;

use crate::cancel::CancelToken;
use crate::config::HttpSettings;
use crate::error::{FetchError, MAX_RETRY_AFTER};

/// Longest body excerpt quoted in an error message.
const BODY_EXCERPT: usize = 200;

pub fn build_client(settings: &HttpSettings) -> Result<Client, reqwest::Error> {
    Client::builder()
        .connect_timeout(Duration::from_secs(settings.connect_timeout_secs))
        .timeout(Duration::from_secs(settings.read_timeout_secs))
        .user_agent(settings.user_agent.clone())
        .build()
}

/// GETs `url` and returns the body of a 2xx response.
///
/// The request timeout is shortened to whatever is left of the token's
/// deadline so a timed-out batch does not wait on a slow provider.
pub fn get_text(client: &Client, url: &str, cancel: &CancelToken) -> Result<String, FetchError> {
    cancel.check()?;
    debug!(url, "GET");

    let mut request = client.get(url).header("Accept", "application/json");
    if let Some(remaining) = cancel.remaining() {
        if remaining.is_zero() {
            return Err(FetchError::Timeout);
        }
        request = request.timeout(remaining);
    }

    let response = request.send().map_err(|e| {
        // a deadline-shortened timeout is the caller's timeout, not the provider's
        if e.is_timeout() && cancel.is_cancelled() {
            return cancel.check().err().unwrap_or(FetchError::Timeout);
        }
        transport_error(&e)
    })?;

    let status = response.status();
    let retry_after = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_retry_after);

    let body = response.text().map_err(|e| transport_error(&e))?;

    if status.is_success() {
        return Ok(body);
    }
    Err(status_error(status, retry_after, url, &body))
}

fn transport_error(e: &reqwest::Error) -> FetchError {
    if e.is_decode() {
        FetchError::Malformed(format!("undecodable body: {}", e))
    } else {
        FetchError::Transient(e.to_string())
    }
}

/// Maps a non-2xx status to the error taxonomy.
pub fn status_error(
    status: StatusCode,
    retry_after: Option<Duration>,
    url: &str,
    body: &str,
) -> FetchError {
    let excerpt: String = body.chars().take(BODY_EXCERPT).collect();
    let message = format!("HTTP {} from {}: {}", status.as_u16(), url, excerpt.trim());

    match status {
        StatusCode::TOO_MANY_REQUESTS => FetchError::RateLimited {
            retry_after,
            message,
        },
        StatusCode::REQUEST_TIMEOUT => FetchError::Transient(message),
        StatusCode::NOT_FOUND => FetchError::StationNotFound(message),
        s if s.is_server_error() => FetchError::Transient(message),
        _ => FetchError::Malformed(message),
    }
}

/// `Retry-After` in its delay-seconds form, capped at `MAX_RETRY_AFTER`.
/// HTTP-date values are ignored; the backoff policy covers those.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value
        .trim()
        .parse::<u64>()
        .ok()
        .map(|secs| Duration::from_secs(secs).min(MAX_RETRY_AFTER))
}
