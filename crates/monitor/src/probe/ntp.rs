use std::time::Duration;

use tokio::time::{Instant, timeout_at};

use super::{Latency, connect_udp};
use crate::error::ProbeError;
use crate::service::Endpoint;
use crate::types::ProbeOutcome;

/// SNTP client request: LI=0, VN=3, Mode=3 followed by 47 zero bytes.
pub const NTP_REQUEST: [u8; 48] = {
    let mut packet = [0u8; 48];
    packet[0] = 0x1B;
    packet
};

const MODE_SERVER: u8 = 4;

const LATENCY: Latency = Latency::single(200, "slow NTP response");

pub(super) async fn probe(
    endpoint: &Endpoint,
    limit: Duration,
) -> Result<ProbeOutcome, ProbeError> {
    let start = Instant::now();
    let deadline = start + limit;
    let socket = connect_udp(&endpoint.address, limit).await?;

    socket.send(&NTP_REQUEST).await.map_err(|_| ProbeError::protocol("NTP write failed"))?;

    let mut buf = [0u8; 48];
    let n = match timeout_at(deadline, socket.recv(&mut buf)).await {
        Ok(Ok(n)) => n,
        _ => return Err(ProbeError::protocol("NTP read failed")),
    };
    let response_time = start.elapsed();

    if !is_server_reply(&buf[..n]) {
        return Err(ProbeError::protocol("invalid NTP response"));
    }
    Ok(LATENCY.classify(response_time, 0))
}

fn is_server_reply(reply: &[u8]) -> bool {
    reply.first().is_some_and(|first| first & 0x07 == MODE_SERVER)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_header() {
        assert_eq!(NTP_REQUEST[0], 0x1B);
        assert_eq!(NTP_REQUEST[0] & 0x07, 3);
        assert!(NTP_REQUEST[1..].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_server_mode_detection() {
        assert!(is_server_reply(&[0x24, 0x01]));
        assert!(is_server_reply(&[0x1C]));
        assert!(!is_server_reply(&[0x1B]));
        assert!(!is_server_reply(&[]));
    }
}
