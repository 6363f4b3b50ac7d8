use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::time::Instant;

use super::{Latency, connect_tcp, read_before};
use crate::error::ProbeError;
use crate::service::Endpoint;
use crate::types::ProbeOutcome;

pub(super) const MONGODB_LATENCY: Latency = Latency::single(200, "slow MongoDB connection");
pub(super) const POSTGRES_LATENCY: Latency = Latency::single(200, "slow PostgreSQL connection");
const REDIS_LATENCY: Latency = Latency::single(100, "slow Redis response");
const MYSQL_LATENCY: Latency = Latency::single(200, "slow MySQL response");

/// Protocol version carried by every MySQL/MariaDB initial handshake packet.
const MYSQL_PROTOCOL_VERSION: u8 = 10;

/// Inline `PING`; any reply containing `PONG` is healthy.
pub(super) async fn probe_redis(
    endpoint: &Endpoint,
    limit: Duration,
) -> Result<ProbeOutcome, ProbeError> {
    let start = Instant::now();
    let mut stream = connect_tcp(&endpoint.address, limit).await?;

    stream
        .write_all(b"PING\r\n")
        .await
        .map_err(|_| ProbeError::protocol("Redis write failed"))?;

    let mut buf = [0u8; 64];
    let n = read_before(&mut stream, &mut buf, start + limit)
        .await
        .ok()
        .filter(|&n| n > 0)
        .ok_or_else(|| ProbeError::protocol("Redis read failed"))?;
    let response_time = start.elapsed();

    if !String::from_utf8_lossy(&buf[..n]).contains("PONG") {
        return Err(ProbeError::protocol("invalid Redis response"));
    }
    Ok(REDIS_LATENCY.classify(response_time, 0))
}

/// Reads the server's initial handshake packet without logging in.
pub(super) async fn probe_mysql(
    endpoint: &Endpoint,
    limit: Duration,
) -> Result<ProbeOutcome, ProbeError> {
    let start = Instant::now();
    let mut stream = connect_tcp(&endpoint.address, limit).await?;

    let mut buf = [0u8; 256];
    let n = read_before(&mut stream, &mut buf, start + limit)
        .await
        .ok()
        .filter(|&n| n > 0)
        .ok_or_else(|| ProbeError::protocol("MySQL read failed"))?;
    let response_time = start.elapsed();

    if !is_mysql_handshake(&buf[..n]) {
        return Err(ProbeError::protocol("invalid MySQL handshake"));
    }
    Ok(MYSQL_LATENCY.classify(response_time, 0))
}

/// 3-byte payload length, 1-byte sequence id, then the protocol version.
fn is_mysql_handshake(packet: &[u8]) -> bool {
    packet.len() > 4 && packet[4] == MYSQL_PROTOCOL_VERSION
}
