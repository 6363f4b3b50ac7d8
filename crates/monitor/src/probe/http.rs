use std::time::Duration;

use tokio::time::Instant;

use super::Latency;
use crate::error::ProbeError;
use crate::service::HttpCheck;
use crate::types::ProbeOutcome;

const LATENCY: Latency =
    Latency::tiered(2000, "slow response time", 5000, "very slow response time");

/// Bodies are only inspected up to this many bytes.
const MAX_BODY: usize = 1024 * 1024;

pub(super) async fn probe(
    client: &reqwest::Client,
    check: &HttpCheck,
    limit: Duration,
) -> Result<ProbeOutcome, ProbeError> {
    let mut request = client.request(check.method.clone(), check.url.clone()).timeout(limit);
    for (key, value) in &check.headers {
        request = request.header(key, value);
    }

    let start = Instant::now();
    let mut response = request.send().await?;
    let response_time = start.elapsed();
    let status_code = response.status().as_u16();

    let body_matches = match &check.expected_body {
        Some(expected) => match read_limited(&mut response).await {
            Ok(body) => String::from_utf8_lossy(&body).contains(expected.as_str()),
            // An unreadable body is not held against the service.
            Err(_) => true,
        },
        None => true,
    };

    classify_http(status_code, check.expected_status, body_matches, response_time)
}

async fn read_limited(response: &mut reqwest::Response) -> Result<Vec<u8>, reqwest::Error> {
    let mut body = Vec::new();
    while let Some(chunk) = response.chunk().await? {
        let room = MAX_BODY - body.len();
        body.extend_from_slice(&chunk[..chunk.len().min(room)]);
        if body.len() >= MAX_BODY {
            break;
        }
    }
    Ok(body)
}

/// Classify an HTTP response.
///
/// A body mismatch wins over a status mismatch. Both latency tiers map to
/// `degraded`; only the message differs.
pub fn classify_http(
    status_code: u16,
    expected_status: u16,
    body_matches: bool,
    response_time: Duration,
) -> Result<ProbeOutcome, ProbeError> {
    let code = i64::from(status_code);
    if !body_matches {
        return Err(ProbeError::validation(code, "expected body not found"));
    }
    if status_code != expected_status {
        return Err(ProbeError::validation(code, format!("unexpected status code: {status_code}")));
    }
    Ok(LATENCY.classify(response_time, code))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Status;

    #[test]
    fn test_fast_matching_response_is_operational() {
        let outcome = classify_http(200, 200, true, Duration::from_millis(1500)).unwrap();
        assert_eq!(outcome.status, Status::Operational);
        assert_eq!(outcome.code, 200);
        assert!(outcome.message.is_empty());
    }

    #[test]
    fn test_slow_tiers_are_both_degraded() {
        let slow = classify_http(200, 200, true, Duration::from_secs(3)).unwrap();
        assert_eq!(slow.status, Status::Degraded);
        assert_eq!(slow.message, "slow response time");

        let very_slow = classify_http(200, 200, true, Duration::from_secs(6)).unwrap();
        assert_eq!(very_slow.status, Status::Degraded);
        assert_eq!(very_slow.message, "very slow response time");
    }

    #[test]
    fn test_status_mismatch_carries_code() {
        let err = classify_http(503, 200, true, Duration::from_millis(10)).unwrap_err();
        assert_eq!(err.code(), 503);
        assert_eq!(err.to_string(), "unexpected status code: 503");
    }

    #[test]
    fn test_body_mismatch_is_reported_first() {
        let err = classify_http(500, 200, false, Duration::from_millis(10)).unwrap_err();
        assert_eq!(err.to_string(), "expected body not found");
        assert_eq!(err.code(), 500);
    }
}
