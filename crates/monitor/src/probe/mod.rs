//! Protocol probes.
//!
//! Each probe performs exactly one check attempt bounded by the service's
//! timeout and classifies the result. Internally a probe returns
//! `Result<ProbeOutcome, ProbeError>`; [`Prober::run`] turns every error into a
//! `down` outcome so the scheduler only ever sees classifications.

mod banner;
mod database;
mod dns;
mod http;
mod icmp;
mod ntp;
mod quic;
mod stream;
mod tls;
mod udp;

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::{Instant, timeout, timeout_at};
use tracing::debug;

use crate::error::ProbeError;
use crate::service::{Check, Service};
use crate::types::ProbeOutcome;

pub use self::http::classify_http;
pub use self::ntp::NTP_REQUEST;
pub use self::quic::QUIC_PROBE;
pub use self::tls::classify_certificate;

const USER_AGENT: &str = "StatusMonitor/1.0";

/// Executes probes for any [`Check`] kind.
///
/// Holds the shared HTTP clients and TLS configurations so individual checks
/// stay cheap.
pub struct Prober {
    http: reqwest::Client,
    http_insecure: reqwest::Client,
    tls: tls::Connectors,
}

impl Prober {
    pub fn new() -> Result<Self, ProbeError> {
        let http = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
        let http_insecure = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .danger_accept_invalid_certs(true)
            .build()?;

        Ok(Self { http, http_insecure, tls: tls::Connectors::new()? })
    }

    /// Perform one check attempt for `service`.
    pub async fn run(&self, service: &Service) -> ProbeOutcome {
        let started = Instant::now();
        let limit = service.timeout;

        let result = match &service.check {
            Check::Http(check) => {
                let client = if check.skip_tls_verify { &self.http_insecure } else { &self.http };
                http::probe(client, check, limit).await
            }
            Check::Tcp(endpoint) => stream::probe_tcp(endpoint, limit).await,
            Check::Udp(check) => udp::probe(check, limit).await,
            Check::Icmp { host } => icmp::probe(host, limit).await,
            Check::Dns(check) => dns::probe(check, limit).await,
            Check::WebSocket(target) => {
                stream::probe_stream(&self.tls, target, limit, stream::WEBSOCKET_LATENCY).await
            }
            Check::Grpc(target) => {
                stream::probe_stream(&self.tls, target, limit, stream::GRPC_LATENCY).await
            }
            Check::Quic(check) => quic::probe(check, limit).await,
            Check::Smtp(check) => banner::probe_smtp(check, limit).await,
            Check::Ssh(endpoint) => banner::probe(endpoint, limit, &banner::SSH).await,
            Check::Tls(check) => tls::probe(&self.tls, check, limit).await,
            Check::Pop3(endpoint) => banner::probe(endpoint, limit, &banner::POP3).await,
            Check::Imap(endpoint) => banner::probe(endpoint, limit, &banner::IMAP).await,
            Check::Ftp(endpoint) => banner::probe(endpoint, limit, &banner::FTP).await,
            Check::Ntp(endpoint) => ntp::probe(endpoint, limit).await,
            Check::Ldap(endpoint) => {
                stream::probe_connect(endpoint, limit, stream::LDAP_LATENCY).await
            }
            Check::Redis(endpoint) => database::probe_redis(endpoint, limit).await,
            Check::MongoDb(endpoint) => {
                stream::probe_connect(endpoint, limit, database::MONGODB_LATENCY).await
            }
            Check::MySql(endpoint) => database::probe_mysql(endpoint, limit).await,
            Check::Postgres(endpoint) => {
                stream::probe_connect(endpoint, limit, database::POSTGRES_LATENCY).await
            }
        };

        result.unwrap_or_else(|err| {
            debug!(service = %service.name, error = %err, "Probe failed");
            ProbeOutcome::down(started.elapsed(), err.code(), err.to_string())
        })
    }
}

/// Response-time thresholds for one protocol.
///
/// `rt < slow` is operational; anything slower is degraded with `slow_message`,
/// or `very_slow_message` once the optional second tier is reached.
#[derive(Debug, Clone, Copy)]
pub struct Latency {
    pub slow: Duration,
    pub slow_message: &'static str,
    pub very_slow: Option<(Duration, &'static str)>,
}

impl Latency {
    pub const fn single(slow_ms: u64, message: &'static str) -> Self {
        Self { slow: Duration::from_millis(slow_ms), slow_message: message, very_slow: None }
    }

    pub const fn tiered(
        slow_ms: u64,
        slow_message: &'static str,
        very_slow_ms: u64,
        very_slow_message: &'static str,
    ) -> Self {
        Self {
            slow: Duration::from_millis(slow_ms),
            slow_message,
            very_slow: Some((Duration::from_millis(very_slow_ms), very_slow_message)),
        }
    }

    pub fn classify(&self, response_time: Duration, code: i64) -> ProbeOutcome {
        if response_time < self.slow {
            return ProbeOutcome::operational(response_time, code);
        }
        match self.very_slow {
            Some((limit, message)) if response_time >= limit => {
                ProbeOutcome::degraded(response_time, code, message)
            }
            _ => ProbeOutcome::degraded(response_time, code, self.slow_message),
        }
    }
}

/// Dial `address` over TCP, giving up after `limit`.
pub(crate) async fn connect_tcp(address: &str, limit: Duration) -> Result<TcpStream, ProbeError> {
    timeout(limit, TcpStream::connect(address))
        .await
        .map_err(|_| ProbeError::Timeout { address: address.to_string(), timeout: limit })?
        .map_err(|source| ProbeError::Connect { address: address.to_string(), source })
}

/// Resolve `address` and return a UDP socket connected to its first address.
pub(crate) async fn connect_udp(address: &str, limit: Duration) -> Result<UdpSocket, ProbeError> {
    let target = resolve(address, limit).await?;
    let local: SocketAddr = if target.is_ipv4() {
        SocketAddr::from(([0, 0, 0, 0], 0))
    } else {
        SocketAddr::from(([0u16; 8], 0))
    };

    let socket = UdpSocket::bind(local)
        .await
        .map_err(|source| ProbeError::Connect { address: address.to_string(), source })?;
    socket
        .connect(target)
        .await
        .map_err(|source| ProbeError::Connect { address: address.to_string(), source })?;
    Ok(socket)
}

async fn resolve(address: &str, limit: Duration) -> Result<SocketAddr, ProbeError> {
    let mut addrs = timeout(limit, tokio::net::lookup_host(address))
        .await
        .map_err(|_| ProbeError::Timeout { address: address.to_string(), timeout: limit })?
        .map_err(|e| ProbeError::Resolve(format!("DNS resolution failed: {e}")))?;

    addrs
        .next()
        .ok_or_else(|| {
            ProbeError::Resolve(format!("DNS resolution failed: no addresses for {address}"))
        })
}

/// Read once from `stream` before `deadline`. A timeout surfaces as
/// [`std::io::ErrorKind::TimedOut`].
pub(crate) async fn read_before<R>(
    stream: &mut R,
    buf: &mut [u8],
    deadline: Instant,
) -> std::io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    match timeout_at(deadline, stream.read(buf)).await {
        Ok(result) => result,
        Err(_) => Err(std::io::ErrorKind::TimedOut.into()),
    }
}
