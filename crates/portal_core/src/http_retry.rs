/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - Portal Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use rand::{thread_rng, Rng};
use reqwest::{RequestBuilder, Response, StatusCode};
use std::time::Duration;
use tracing::debug;

const MAX_BACKOFF: Duration = Duration::from_secs(5);

/// Sends an idempotent request, retrying on 429/5xx and transport errors.
/// Never use this for requests that create something.
pub async fn send_with_retry<F>(mut build: F, attempts: u32) -> reqwest::Result<Response>
where
    F: FnMut() -> RequestBuilder,
{
    let max_attempts = attempts.clamp(1, 5);
    let mut backoff = Duration::from_millis(200);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match build().send().await {
            Ok(resp) => {
                let status = resp.status();
                if !should_retry_status(status) || attempt >= max_attempts {
                    return Ok(resp);
                }
                let wait = retry_after_hint(&resp).map_or(backoff, |hint| hint.max(backoff));
                debug!("http {status}, retrying in {}ms (attempt {attempt})", wait.as_millis());
                sleep_with_jitter(wait.min(MAX_BACKOFF)).await;
            }
            Err(e) => {
                if attempt >= max_attempts {
                    return Err(e);
                }
                debug!("http transport error, retrying (attempt {attempt}): {e}");
                sleep_with_jitter(backoff).await;
            }
        }
        backoff = backoff.saturating_mul(2).min(MAX_BACKOFF);
    }
}

pub(crate) fn should_retry_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// `Retry-After` in (possibly fractional) seconds.
pub(crate) fn retry_after_hint(resp: &Response) -> Option<Duration> {
    let raw = resp.headers().get(reqwest::header::RETRY_AFTER)?.to_str().ok()?;
    parse_retry_after(raw)
}

pub(crate) fn parse_retry_after(raw: &str) -> Option<Duration> {
    let secs: f64 = raw.trim().parse().ok()?;
    if !secs.is_finite() || secs < 0.0 {
        return None;
    }
    Some(Duration::from_millis((secs * 1000.0) as u64))
}

async fn sleep_with_jitter(base: Duration) {
    let jitter_ms: u64 = thread_rng().gen_range(0..=200);
    tokio::time::sleep(base + Duration::from_millis(jitter_ms)).await;
}
