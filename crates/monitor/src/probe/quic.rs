use std::io;
use std::time::Duration;

use tokio::time::{Instant, timeout};
use tracing::debug;

use super::connect_udp;
use crate::error::ProbeError;
use crate::service::QuicCheck;
use crate::types::ProbeOutcome;

/// Minimal QUIC v1 long-header packet: fixed bits, version 1, an 8-byte zero
/// destination connection id and an empty source connection id.
pub const QUIC_PROBE: [u8; 15] = [
    0xC0, // long header, fixed bit
    0x00, 0x00, 0x00, 0x01, // version
    0x08, // DCID length
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // DCID
    0x00, // SCID length
];

const SLOW_HANDSHAKE: Duration = Duration::from_millis(500);

/// Any UDP reply to the probe packet proves a QUIC endpoint is listening.
/// Silence is ambiguous, so a read timeout only degrades the service.
pub(super) async fn probe(check: &QuicCheck, limit: Duration) -> Result<ProbeOutcome, ProbeError> {
    debug!(address = %check.address, alpn = ?check.alpn, "Sending QUIC probe");

    let start = Instant::now();
    let socket = connect_udp(&check.address, limit).await?;
    socket
        .send(&QUIC_PROBE)
        .await
        .map_err(|e| ProbeError::protocol(format!("write failed: {e}")))?;

    let mut buf = [0u8; 1200];
    let read = timeout(limit, socket.recv(&mut buf)).await;
    let response_time = start.elapsed();

    let n = match read {
        Err(_) => {
            return Ok(ProbeOutcome::degraded(
                response_time,
                0,
                "QUIC probe timeout (port may be open)",
            ));
        }
        Ok(Err(e)) if e.kind() == io::ErrorKind::TimedOut => {
            return Ok(ProbeOutcome::degraded(
                response_time,
                0,
                "QUIC probe timeout (port may be open)",
            ));
        }
        Ok(Err(e)) => return Err(ProbeError::protocol(e.to_string())),
        Ok(Ok(n)) => n,
    };

    if n == 0 {
        return Err(ProbeError::protocol("empty response"));
    }
    if response_time > SLOW_HANDSHAKE {
        return Ok(ProbeOutcome::degraded(response_time, 0, "slow QUIC handshake"));
    }

    let outcome = ProbeOutcome::operational(response_time, 0);
    // Short-header replies still prove the port answers.
    if buf[0] & 0x80 == 0 {
        return Ok(outcome.with_message("QUIC response received"));
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_packet_layout() {
        assert_eq!(QUIC_PROBE.len(), 15);
        assert_eq!(QUIC_PROBE[0], 0xC0);
        assert_eq!(&QUIC_PROBE[1..5], &[0, 0, 0, 1]);
        assert_eq!(QUIC_PROBE[5], 8);
        assert!(QUIC_PROBE[6..14].iter().all(|b| *b == 0));
        assert_eq!(QUIC_PROBE[14], 0);
    }
}
