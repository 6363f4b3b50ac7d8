use std::io;
use std::time::Duration;

use tokio::time::{Instant, timeout};

use super::{Latency, connect_udp};
use crate::error::ProbeError;
use crate::service::UdpCheck;
use crate::types::ProbeOutcome;

const LATENCY: Latency = Latency::tiered(500, "slow response", 2000, "very slow response");

/// Send the payload and wait up to half the timeout for a reply.
///
/// Silence is only a failure when a reply pattern is configured.
pub(super) async fn probe(check: &UdpCheck, limit: Duration) -> Result<ProbeOutcome, ProbeError> {
    let start = Instant::now();
    let socket = connect_udp(&check.endpoint.address, limit).await?;

    socket
        .send(&check.payload)
        .await
        .map_err(|e| ProbeError::protocol(format!("write failed: {e}")))?;

    let mut buf = [0u8; 1024];
    let read = match timeout(limit / 2, socket.recv(&mut buf)).await {
        Ok(result) => result,
        Err(_) => Err(io::ErrorKind::TimedOut.into()),
    };
    let response_time = start.elapsed();

    match read {
        Err(e) if e.kind() == io::ErrorKind::TimedOut => match check.expected {
            Some(_) => Err(ProbeError::protocol("no response received")),
            None => Ok(ProbeOutcome::operational(response_time, 0)),
        },
        Err(e) => Err(ProbeError::protocol(format!("read error: {e}"))),
        Ok(n) => {
            let reply = String::from_utf8_lossy(&buf[..n]);
            match &check.expected {
                Some(expected) if !reply.contains(expected.as_str()) => {
                    Err(ProbeError::validation(0, "unexpected response"))
                }
                _ => Ok(LATENCY.classify(response_time, 0)),
            }
        }
    }
}
