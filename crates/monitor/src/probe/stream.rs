//! Connect-only probes: TCP, LDAP and the database ports that are checked by
//! reachability alone, plus the websocket/gRPC probes that may add TLS.

use std::time::Duration;

use tokio::time::Instant;

use super::tls::Connectors;
use super::{Latency, connect_tcp};
use crate::error::ProbeError;
use crate::service::{Endpoint, StreamTarget};
use crate::types::ProbeOutcome;

const TCP_LATENCY: Latency = Latency::tiered(1000, "slow connection", 3000, "very slow connection");
pub(super) const WEBSOCKET_LATENCY: Latency =
    Latency::tiered(1000, "slow connection", 3000, "very slow connection");
pub(super) const GRPC_LATENCY: Latency =
    Latency::tiered(500, "slow connection", 2000, "very slow connection");
pub(super) const LDAP_LATENCY: Latency = Latency::single(500, "slow LDAP connection");

pub(super) async fn probe_tcp(
    endpoint: &Endpoint,
    limit: Duration,
) -> Result<ProbeOutcome, ProbeError> {
    probe_connect(endpoint, limit, TCP_LATENCY).await
}

/// Succeeds when a TCP connection can be established.
pub(super) async fn probe_connect(
    endpoint: &Endpoint,
    limit: Duration,
    latency: Latency,
) -> Result<ProbeOutcome, ProbeError> {
    let start = Instant::now();
    let _stream = connect_tcp(&endpoint.address, limit).await?;
    Ok(latency.classify(start.elapsed(), 0))
}

/// Connect over TCP and, when the target requires it, complete a TLS handshake.
pub(super) async fn probe_stream(
    connectors: &Connectors,
    target: &StreamTarget,
    limit: Duration,
    latency: Latency,
) -> Result<ProbeOutcome, ProbeError> {
    let start = Instant::now();
    let deadline = start + limit;
    let stream = connect_tcp(&target.address, limit).await?;

    if target.tls {
        let remaining = deadline.saturating_duration_since(Instant::now());
        connectors
            .handshake(stream, &target.server_name, target.skip_tls_verify, remaining)
            .await?;
    }

    Ok(latency.classify(start.elapsed(), 0))
}
