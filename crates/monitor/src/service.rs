//! Resolved service descriptors.
//!
//! A [`Service`] is what the engine schedules. Its [`Check`] carries only the
//! parameters its protocol needs, with default ports, URL rewriting and TLS
//! inference already applied by [`crate::config`].

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use url::Url;

/// A monitored endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct Service {
    /// Unique key
    pub name: String,
    pub group: String,
    pub description: String,
    pub interval: Duration,
    pub timeout: Duration,
    pub check: Check,
}

impl Service {
    pub fn kind(&self) -> CheckKind {
        self.check.kind()
    }

    /// Human-readable target: the URL for URL-based checks, `host:port` otherwise
    pub fn target(&self) -> String {
        match &self.check {
            Check::Http(http) => http.url.to_string(),
            Check::Tcp(endpoint)
            | Check::Ssh(endpoint)
            | Check::Pop3(endpoint)
            | Check::Imap(endpoint)
            | Check::Ftp(endpoint)
            | Check::Ntp(endpoint)
            | Check::Ldap(endpoint)
            | Check::Redis(endpoint)
            | Check::MongoDb(endpoint)
            | Check::MySql(endpoint)
            | Check::Postgres(endpoint) => endpoint.to_string(),
            Check::Udp(udp) => udp.endpoint.to_string(),
            Check::Icmp { host } => host.clone(),
            Check::Dns(dns) => dns.host.clone(),
            Check::WebSocket(target) | Check::Grpc(target) => target.address.clone(),
            Check::Quic(quic) => quic.address.clone(),
            Check::Smtp(smtp) => smtp.endpoint.to_string(),
            Check::Tls(tls) => tls.endpoint.to_string(),
        }
    }
}

/// Check type as named in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CheckKind {
    Http,
    Tcp,
    Udp,
    Icmp,
    Dns,
    WebSocket,
    Grpc,
    Quic,
    Smtp,
    Ssh,
    Tls,
    Pop3,
    Imap,
    Ftp,
    Ntp,
    Ldap,
    Redis,
    MongoDb,
    MySql,
    Postgres,
}

impl CheckKind {
    pub const ALL: [CheckKind; 20] = [
        CheckKind::Http,
        CheckKind::Tcp,
        CheckKind::Udp,
        CheckKind::Icmp,
        CheckKind::Dns,
        CheckKind::WebSocket,
        CheckKind::Grpc,
        CheckKind::Quic,
        CheckKind::Smtp,
        CheckKind::Ssh,
        CheckKind::Tls,
        CheckKind::Pop3,
        CheckKind::Imap,
        CheckKind::Ftp,
        CheckKind::Ntp,
        CheckKind::Ldap,
        CheckKind::Redis,
        CheckKind::MongoDb,
        CheckKind::MySql,
        CheckKind::Postgres,
    ];

    /// Parse a configured type name. Returns `None` for unknown names.
    pub fn parse(name: &str) -> Option<Self> {
        let name = name.trim().to_ascii_lowercase();
        CheckKind::ALL.into_iter().find(|kind| kind.as_str() == name)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CheckKind::Http => "http",
            CheckKind::Tcp => "tcp",
            CheckKind::Udp => "udp",
            CheckKind::Icmp => "icmp",
            CheckKind::Dns => "dns",
            CheckKind::WebSocket => "websocket",
            CheckKind::Grpc => "grpc",
            CheckKind::Quic => "quic",
            CheckKind::Smtp => "smtp",
            CheckKind::Ssh => "ssh",
            CheckKind::Tls => "tls",
            CheckKind::Pop3 => "pop3",
            CheckKind::Imap => "imap",
            CheckKind::Ftp => "ftp",
            CheckKind::Ntp => "ntp",
            CheckKind::Ldap => "ldap",
            CheckKind::Redis => "redis",
            CheckKind::MongoDb => "mongodb",
            CheckKind::MySql => "mysql",
            CheckKind::Postgres => "postgres",
        }
    }

    /// Well-known port used when none is configured
    pub fn default_port(self) -> Option<u16> {
        match self {
            CheckKind::Smtp => Some(25),
            CheckKind::Ssh => Some(22),
            CheckKind::Tls => Some(443),
            CheckKind::Pop3 => Some(110),
            CheckKind::Imap => Some(143),
            CheckKind::Ftp => Some(21),
            CheckKind::Ntp => Some(123),
            CheckKind::Ldap => Some(389),
            CheckKind::Redis => Some(6379),
            CheckKind::MongoDb => Some(27017),
            CheckKind::MySql => Some(3306),
            CheckKind::Postgres => Some(5432),
            CheckKind::Grpc | CheckKind::Quic => Some(443),
            _ => None,
        }
    }
}

impl fmt::Display for CheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Protocol-specific check parameters
#[derive(Debug, Clone, PartialEq)]
pub enum Check {
    Http(HttpCheck),
    Tcp(Endpoint),
    Udp(UdpCheck),
    Icmp { host: String },
    Dns(DnsCheck),
    WebSocket(StreamTarget),
    Grpc(StreamTarget),
    Quic(QuicCheck),
    Smtp(SmtpCheck),
    Ssh(Endpoint),
    Tls(TlsCheck),
    Pop3(Endpoint),
    Imap(Endpoint),
    Ftp(Endpoint),
    Ntp(Endpoint),
    Ldap(Endpoint),
    Redis(Endpoint),
    MongoDb(Endpoint),
    MySql(Endpoint),
    Postgres(Endpoint),
}

impl Check {
    pub fn kind(&self) -> CheckKind {
        match self {
            Check::Http(_) => CheckKind::Http,
            Check::Tcp(_) => CheckKind::Tcp,
            Check::Udp(_) => CheckKind::Udp,
            Check::Icmp { .. } => CheckKind::Icmp,
            Check::Dns(_) => CheckKind::Dns,
            Check::WebSocket(_) => CheckKind::WebSocket,
            Check::Grpc(_) => CheckKind::Grpc,
            Check::Quic(_) => CheckKind::Quic,
            Check::Smtp(_) => CheckKind::Smtp,
            Check::Ssh(_) => CheckKind::Ssh,
            Check::Tls(_) => CheckKind::Tls,
            Check::Pop3(_) => CheckKind::Pop3,
            Check::Imap(_) => CheckKind::Imap,
            Check::Ftp(_) => CheckKind::Ftp,
            Check::Ntp(_) => CheckKind::Ntp,
            Check::Ldap(_) => CheckKind::Ldap,
            Check::Redis(_) => CheckKind::Redis,
            Check::MongoDb(_) => CheckKind::MongoDb,
            Check::MySql(_) => CheckKind::MySql,
            Check::Postgres(_) => CheckKind::Postgres,
        }
    }
}

/// A dialable `host:port` address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub address: String,
}

impl Endpoint {
    pub fn new(host: &str, port: u16) -> Self {
        Self { address: join_host_port(host, port) }
    }

    /// Use `address` as given; it is expected to already carry a port
    pub fn raw(address: impl Into<String>) -> Self {
        Self { address: address.into() }
    }

    /// Host part without port or IPv6 brackets
    pub fn host(&self) -> &str {
        split_host(&self.address)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.address)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpCheck {
    pub url: Url,
    pub method: reqwest::Method,
    pub headers: Vec<(String, String)>,
    pub expected_status: u16,
    pub expected_body: Option<String>,
    pub skip_tls_verify: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UdpCheck {
    pub endpoint: Endpoint,
    pub payload: Vec<u8>,
    /// Substring the reply must contain; `None` means silence is acceptable
    pub expected: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DnsRecordType {
    A,
    Aaaa,
    Cname,
    Mx,
    Txt,
    Ns,
    /// Any other configured type: plain host lookup
    Host(String),
}

impl DnsRecordType {
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_uppercase().as_str() {
            "" | "A" => DnsRecordType::A,
            "AAAA" => DnsRecordType::Aaaa,
            "CNAME" => DnsRecordType::Cname,
            "MX" => DnsRecordType::Mx,
            "TXT" => DnsRecordType::Txt,
            "NS" => DnsRecordType::Ns,
            other => DnsRecordType::Host(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DnsCheck {
    pub host: String,
    pub record_type: DnsRecordType,
    pub resolver: SocketAddr,
}

/// TCP or TLS stream target (websocket, grpc)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamTarget {
    pub address: String,
    pub server_name: String,
    pub tls: bool,
    pub skip_tls_verify: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuicCheck {
    pub address: String,
    /// Reported only; the minimal probe does not negotiate ALPN
    pub alpn: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpCheck {
    pub endpoint: Endpoint,
    /// Require the STARTTLS extension in the EHLO reply
    pub starttls: bool,
    /// Require the AUTH extension in the EHLO reply
    pub auth: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsCheck {
    pub endpoint: Endpoint,
    pub server_name: String,
    pub warn_days: i64,
}

/// `host:port`, bracketing bare IPv6 literals
pub fn join_host_port(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}

/// Host part of an address that may carry a port
pub fn split_host(address: &str) -> &str {
    if let Some(rest) = address.strip_prefix('[') {
        return rest.split_once(']').map(|(host, _)| host).unwrap_or(rest);
    }
    match address.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') && port.parse::<u16>().is_ok() => host,
        _ => address,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_kind_parse() {
        assert_eq!(CheckKind::parse("http"), Some(CheckKind::Http));
        assert_eq!(CheckKind::parse("MongoDB"), Some(CheckKind::MongoDb));
        assert_eq!(CheckKind::parse(" websocket "), Some(CheckKind::WebSocket));
        assert_eq!(CheckKind::parse("gopher"), None);

        for kind in CheckKind::ALL {
            assert_eq!(CheckKind::parse(kind.as_str()), Some(kind));
        }
    }

    #[test]
    fn test_join_host_port() {
        assert_eq!(join_host_port("example.com", 25), "example.com:25");
        assert_eq!(join_host_port("::1", 22), "[::1]:22");
        assert_eq!(join_host_port("[::1]", 22), "[::1]:22");
    }

    #[test]
    fn test_split_host() {
        assert_eq!(split_host("example.com:443"), "example.com");
        assert_eq!(split_host("example.com"), "example.com");
        assert_eq!(split_host("[::1]:443"), "::1");
        assert_eq!(split_host("::1"), "::1");
    }

    #[test]
    fn test_dns_record_type_parse() {
        assert_eq!(DnsRecordType::parse(""), DnsRecordType::A);
        assert_eq!(DnsRecordType::parse("aaaa"), DnsRecordType::Aaaa);
        assert_eq!(DnsRecordType::parse("SRV"), DnsRecordType::Host("SRV".to_string()));
    }
}
