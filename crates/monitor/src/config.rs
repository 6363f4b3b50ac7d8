use std::collections::{BTreeMap, HashSet};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use std::{env, fmt, fs, path};

use serde::{Deserialize, Serialize};
use tracing::warn;
use url::Url;

use crate::error::ConfigError;
use crate::service::{
    Check, CheckKind, DnsCheck, DnsRecordType, Endpoint, HttpCheck, QuicCheck, Service,
    SmtpCheck, StreamTarget, TlsCheck, UdpCheck, join_host_port, split_host,
};

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_EXPECTED_STATUS: u16 = 200;
pub const DEFAULT_DNS_RESOLVER: &str = "8.8.8.8:53";
pub const DEFAULT_TLS_WARN_DAYS: i64 = 30;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub services: Vec<ServiceConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub enabled: bool,
    pub data_dir: path::PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { enabled: true, data_dir: path::PathBuf::from("data") }
    }
}

/// One `[[services]]` entry as written in the config file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub group: String,
    pub description: String,
    #[serde(rename = "type")]
    pub check_type: String,
    pub url: String,
    pub host: String,
    pub port: u16,
    pub method: String,
    #[serde(with = "duration")]
    pub interval: Duration,
    #[serde(with = "duration")]
    pub timeout: Duration,
    pub headers: BTreeMap<String, String>,
    pub expected_status: u16,
    pub expected_body: String,
    pub dns_record_type: String,
    pub dns_resolver: String,
    pub skip_tls_verify: bool,
    pub udp_payload: String,
    pub udp_expected: String,
    pub quic_alpn: Vec<String>,
    pub tls_warn_days: i64,
    pub smtp_starttls: bool,
    pub smtp_auth: bool,
    pub connection_string: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            group: String::new(),
            description: String::new(),
            check_type: CheckKind::Http.as_str().to_string(),
            url: String::new(),
            host: String::new(),
            port: 0,
            method: "GET".to_string(),
            interval: DEFAULT_INTERVAL,
            timeout: DEFAULT_TIMEOUT,
            headers: BTreeMap::new(),
            expected_status: DEFAULT_EXPECTED_STATUS,
            expected_body: String::new(),
            dns_record_type: "A".to_string(),
            dns_resolver: DEFAULT_DNS_RESOLVER.to_string(),
            skip_tls_verify: false,
            udp_payload: String::new(),
            udp_expected: String::new(),
            quic_alpn: Vec::new(),
            tls_warn_days: DEFAULT_TLS_WARN_DAYS,
            smtp_starttls: false,
            smtp_auth: false,
            connection_string: String::new(),
        }
    }
}

impl ServiceConfig {
    /// Resolve this entry into a schedulable [`Service`].
    ///
    /// Empty or zero values fall back to the documented defaults; an unknown
    /// check type is treated as `http`.
    pub fn to_service(&self) -> Result<Service, ConfigError> {
        let kind = match CheckKind::parse(&self.check_type) {
            Some(kind) => kind,
            None => {
                if !self.check_type.trim().is_empty() {
                    warn!(
                        service = %self.name,
                        check_type = %self.check_type,
                        "Unknown check type, falling back to http"
                    );
                }
                CheckKind::Http
            }
        };

        let check = match kind {
            CheckKind::Http => Check::Http(self.http_check()?),
            CheckKind::Tcp => Check::Tcp(self.plain_endpoint(kind)?),
            CheckKind::Udp => Check::Udp(UdpCheck {
                endpoint: self.plain_endpoint(kind)?,
                payload: if self.udp_payload.is_empty() {
                    vec![0x00]
                } else {
                    self.udp_payload.as_bytes().to_vec()
                },
                expected: non_empty(&self.udp_expected),
            }),
            CheckKind::Icmp => Check::Icmp { host: self.host_or_url_host(kind)? },
            CheckKind::Dns => Check::Dns(DnsCheck {
                host: self.host_or_url_host(kind)?,
                record_type: DnsRecordType::parse(&self.dns_record_type),
                resolver: self.resolver()?,
            }),
            CheckKind::WebSocket => Check::WebSocket(self.websocket_target()?),
            CheckKind::Grpc => Check::Grpc(self.grpc_target()?),
            CheckKind::Quic => Check::Quic(QuicCheck {
                address: self.quic_address()?,
                alpn: self.quic_alpn.clone(),
            }),
            CheckKind::Smtp => Check::Smtp(SmtpCheck {
                endpoint: self.endpoint(kind)?,
                starttls: self.smtp_starttls,
                auth: self.smtp_auth,
            }),
            CheckKind::Ssh => Check::Ssh(self.endpoint(kind)?),
            CheckKind::Tls => Check::Tls(self.tls_check()?),
            CheckKind::Pop3 => Check::Pop3(self.endpoint(kind)?),
            CheckKind::Imap => Check::Imap(self.endpoint(kind)?),
            CheckKind::Ftp => Check::Ftp(self.endpoint(kind)?),
            CheckKind::Ntp => Check::Ntp(self.endpoint(kind)?),
            CheckKind::Ldap => Check::Ldap(self.endpoint(kind)?),
            CheckKind::Redis => Check::Redis(self.database_endpoint(kind)?),
            CheckKind::MongoDb => Check::MongoDb(self.database_endpoint(kind)?),
            CheckKind::MySql => Check::MySql(self.database_endpoint(kind)?),
            CheckKind::Postgres => Check::Postgres(self.database_endpoint(kind)?),
        };

        Ok(Service {
            name: self.name.clone(),
            group: self.group.clone(),
            description: self.description.clone(),
            interval: or_default(self.interval, DEFAULT_INTERVAL),
            timeout: or_default(self.timeout, DEFAULT_TIMEOUT),
            check,
        })
    }

    fn http_check(&self) -> Result<HttpCheck, ConfigError> {
        let url = self.parse_url()?;
        let method_name = if self.method.trim().is_empty() { "GET" } else { self.method.trim() };
        let method = reqwest::Method::from_bytes(method_name.to_ascii_uppercase().as_bytes())
            .map_err(|_| {
                ConfigError::invalid(&self.name, format!("unsupported HTTP method: {method_name}"))
            })?;

        Ok(HttpCheck {
            url,
            method,
            headers: self.headers.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            expected_status: if self.expected_status == 0 {
                DEFAULT_EXPECTED_STATUS
            } else {
                self.expected_status
            },
            expected_body: non_empty(&self.expected_body),
            skip_tls_verify: self.skip_tls_verify,
        })
    }

    fn parse_url(&self) -> Result<Url, ConfigError> {
        if self.url.trim().is_empty() {
            return Err(ConfigError::invalid(&self.name, "url is required"));
        }
        Url::parse(self.url.trim())
            .map_err(|e| ConfigError::invalid(&self.name, format!("invalid url {}: {e}", self.url)))
    }

    fn require_host(&self, kind: CheckKind) -> Result<&str, ConfigError> {
        let host = self.host.trim();
        if host.is_empty() {
            return Err(ConfigError::invalid(
                &self.name,
                format!("host is required for {kind} checks"),
            ));
        }
        Ok(host)
    }

    /// `host` or `host:port` without any default port (tcp, udp)
    fn plain_endpoint(&self, kind: CheckKind) -> Result<Endpoint, ConfigError> {
        let host = self.require_host(kind)?;
        Ok(if self.port > 0 { Endpoint::new(host, self.port) } else { Endpoint::raw(host) })
    }

    /// `host:port`, with the protocol's well-known port when unset
    fn endpoint(&self, kind: CheckKind) -> Result<Endpoint, ConfigError> {
        let host = self.require_host(kind)?;
        let port = match (self.port, kind.default_port()) {
            (0, Some(default)) => default,
            (port, _) => port,
        };
        Ok(Endpoint::new(host, port))
    }

    /// Database checks may take their address from `connection_string`
    fn database_endpoint(&self, kind: CheckKind) -> Result<Endpoint, ConfigError> {
        if !self.host.trim().is_empty() || self.connection_string.trim().is_empty() {
            return self.endpoint(kind);
        }

        let url = Url::parse(self.connection_string.trim()).map_err(|e| {
            ConfigError::invalid(&self.name, format!("invalid connection_string: {e}"))
        })?;
        let host = url
            .host_str()
            .filter(|host| !host.is_empty())
            .ok_or_else(|| ConfigError::invalid(&self.name, "connection_string has no host"))?;
        let port = url
            .port()
            .or(if self.port > 0 { Some(self.port) } else { None })
            .or(kind.default_port())
            .unwrap_or_default();

        Ok(Endpoint::new(host, port))
    }

    /// `host`, or the host part of `url` (icmp, dns)
    fn host_or_url_host(&self, kind: CheckKind) -> Result<String, ConfigError> {
        if !self.host.trim().is_empty() {
            return Ok(self.host.trim().to_string());
        }
        if self.url.trim().is_empty() {
            return Err(ConfigError::invalid(
                &self.name,
                format!("host is required for {kind} checks"),
            ));
        }
        Ok(match Url::parse(self.url.trim()) {
            Ok(url) => match url.host_str() {
                Some(host) => host.trim_start_matches('[').trim_end_matches(']').to_string(),
                None => self.url.trim().to_string(),
            },
            Err(_) => self.url.trim().to_string(),
        })
    }

    fn resolver(&self) -> Result<SocketAddr, ConfigError> {
        let raw = self.dns_resolver.trim();
        let raw = if raw.is_empty() { DEFAULT_DNS_RESOLVER } else { raw };
        if let Ok(addr) = raw.parse::<SocketAddr>() {
            return Ok(addr);
        }
        raw.parse::<IpAddr>()
            .map(|ip| SocketAddr::new(ip, 53))
            .map_err(|_| ConfigError::invalid(&self.name, format!("invalid dns_resolver: {raw}")))
    }

    /// Websocket URLs are rewritten to their http scheme counterparts and dialed
    /// as plain TCP (ws) or TLS (wss) on 80/443 unless a port is given.
    fn websocket_target(&self) -> Result<StreamTarget, ConfigError> {
        let mut url = self.parse_url()?;
        let tls = match url.scheme() {
            "wss" | "https" => true,
            "ws" | "http" => false,
            other => {
                return Err(ConfigError::invalid(
                    &self.name,
                    format!("unsupported websocket scheme: {other}"),
                ));
            }
        };
        let http_scheme = if tls { "https" } else { "http" };
        // Switching between special schemes cannot fail.
        let _ = url.set_scheme(http_scheme);

        let host = url
            .host_str()
            .ok_or_else(|| ConfigError::invalid(&self.name, "websocket url has no host"))?
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_string();
        let port = url.port_or_known_default().unwrap_or(if tls { 443 } else { 80 });

        Ok(StreamTarget {
            address: join_host_port(&host, port),
            server_name: host,
            tls,
            skip_tls_verify: self.skip_tls_verify,
        })
    }

    /// gRPC targets come from `host` or a `grpc://`/`grpcs://` URL; TLS is used
    /// for `grpcs://` or port 443, which is also the default port.
    fn grpc_target(&self) -> Result<StreamTarget, ConfigError> {
        let url = self.url.trim();
        let mut host = self.host.trim().to_string();
        if host.is_empty() && !url.is_empty() {
            host = strip_path(url.trim_start_matches("grpc://").trim_start_matches("grpcs://"))
                .to_string();
        }
        if host.is_empty() {
            return Err(ConfigError::invalid(&self.name, "host or url is required for grpc checks"));
        }

        let address = if self.port > 0 {
            join_host_port(split_host(&host), self.port)
        } else if split_host(&host) == host {
            join_host_port(&host, 443)
        } else {
            host.clone()
        };
        let tls = url.starts_with("grpcs://") || address.ends_with(":443");

        Ok(StreamTarget {
            server_name: split_host(&address).to_string(),
            address,
            tls,
            skip_tls_verify: self.skip_tls_verify,
        })
    }

    fn quic_address(&self) -> Result<String, ConfigError> {
        let source = if self.url.trim().is_empty() { self.host.trim() } else { self.url.trim() };
        let host = strip_path(
            source
                .trim_start_matches("https://")
                .trim_start_matches("http://")
                .trim_start_matches("quic://"),
        );
        if host.is_empty() {
            return Err(ConfigError::invalid(&self.name, "url or host is required for quic checks"));
        }

        if split_host(host) != host {
            return Ok(host.to_string());
        }
        let port = if self.port > 0 { self.port } else { 443 };
        Ok(join_host_port(host, port))
    }

    fn tls_check(&self) -> Result<TlsCheck, ConfigError> {
        let mut host = self.host.trim().to_string();
        if host.is_empty() {
            host = strip_path(
                self.url.trim().trim_start_matches("https://").trim_start_matches("http://"),
            )
            .to_string();
        }
        if host.is_empty() {
            return Err(ConfigError::invalid(&self.name, "host or url is required for tls checks"));
        }

        let bare_host = split_host(&host).to_string();
        let embedded_port = host
            .rsplit_once(':')
            .filter(|_| bare_host != host)
            .and_then(|(_, port)| port.trim_end_matches(']').parse::<u16>().ok());
        let port = match (self.port, embedded_port) {
            (0, Some(port)) => port,
            (0, None) => 443,
            (port, _) => port,
        };

        Ok(TlsCheck {
            endpoint: Endpoint::new(&bare_host, port),
            server_name: bare_host,
            warn_days: if self.tls_warn_days <= 0 {
                DEFAULT_TLS_WARN_DAYS
            } else {
                self.tls_warn_days
            },
        })
    }
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() { None } else { Some(value.to_string()) }
}

fn or_default(value: Duration, default: Duration) -> Duration {
    if value.is_zero() { default } else { value }
}

fn strip_path(host: &str) -> &str {
    match host.find('/') {
        Some(idx) => &host[..idx],
        None => host,
    }
}

/// Used to ensure we are actually reading a toml file
fn normalize_toml_path(path: &path::Path) -> path::PathBuf {
    let mut path = path.to_path_buf();
    if path.extension().map(|ext| ext != "toml").unwrap_or(true) {
        path.set_extension("toml");
    }
    path
}

/// Get default config path ($XDG_CONFIG_HOME/statuspage/config.toml or
/// $HOME/.config/...)
pub fn default_config_path() -> Result<path::PathBuf, ConfigError> {
    let path = if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
        path::PathBuf::from(config_home)
    } else if let Ok(home_dir) = env::var("HOME") {
        path::PathBuf::from(home_dir).join(".config")
    } else {
        return Err(ConfigError::ConfigPathUnavailable);
    };

    Ok(path.join("statuspage/config.toml"))
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let write_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str, value: &dyn fmt::Display| {
                writeln!(f, "  {:indent$}{}: {}", "", label, value, indent = level * 2)
            }
        };
        let write_title_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str| {
                writeln!(f, "{:indent$}{}", "", label, indent = level * 2)
            }
        };

        let write_title_1 = write_title_indented(1);
        let write_1 = write_indented(1);
        let write_2 = write_indented(2);

        writeln!(f, "Current Configuration State:")?;
        write_title_1(f, "Storage")?;
        write_1(f, "Enabled", &self.storage.enabled)?;
        write_1(f, "Data Directory", &self.storage.data_dir.display())?;

        write_title_1(f, "Services")?;
        for service in &self.services {
            write_1(f, "Name", &service.name)?;
            match service.to_service() {
                Ok(resolved) => {
                    write_2(f, "Type", &resolved.kind())?;
                    write_2(f, "Target", &resolved.target())?;
                    write_2(f, "Interval", &format_duration(resolved.interval))?;
                    write_2(f, "Timeout", &format_duration(resolved.timeout))?;
                }
                Err(err) => write_2(f, "Error", &err)?,
            }
        }

        Ok(())
    }
}

impl Config {
    /// Generate Config structure from file
    ///
    /// Creates a default config in ~/.config/statuspage/config.toml
    ///  or the specified path, with the name config.toml if one does not exist
    ///
    /// ```no_run
    /// # use status_monitor::config::Config;
    /// let cfg = Config::from_config(None::<&std::path::Path>)?;
    /// println!("{}", cfg);
    /// # Ok::<(), status_monitor::error::ConfigError>(())
    /// ```
    pub fn from_config(optional_path: Option<impl AsRef<path::Path>>) -> Result<Self, ConfigError> {
        let config_path: path::PathBuf = if let Some(path) = optional_path {
            normalize_toml_path(path.as_ref())
        } else {
            default_config_path()?
        };

        if config_path.exists() {
            let raw_string = fs::read_to_string(&config_path).map_err(|source| {
                ConfigError::Read { path: config_path.display().to_string(), source }
            })?;
            Self::from_toml(&raw_string)
        } else {
            let config = Self::default();
            config.write_config(&config_path)?;
            Ok(config)
        }
    }

    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    /// Serialize and write a config to a file
    pub fn write_config(&self, path: &path::Path) -> Result<(), ConfigError> {
        let config_str: String = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: parent.display().to_string(),
                source,
            })?;
        }

        fs::write(path, config_str)
            .map_err(|source| ConfigError::Write { path: path.display().to_string(), source })
    }

    /// Resolve and validate every configured service, preserving file order.
    pub fn services(&self) -> Result<Vec<Service>, ConfigError> {
        let mut seen = HashSet::new();
        let mut services = Vec::with_capacity(self.services.len());

        for (index, entry) in self.services.iter().enumerate() {
            if entry.name.trim().is_empty() {
                return Err(ConfigError::EmptyName { index });
            }
            if !seen.insert(entry.name.clone()) {
                return Err(ConfigError::DuplicateService(entry.name.clone()));
            }
            services.push(entry.to_service()?);
        }

        Ok(services)
    }
}

pub fn format_duration(value: Duration) -> String {
    if value.subsec_nanos() == 0 {
        format!("{}s", value.as_secs())
    } else {
        format!("{}ms", value.as_millis())
    }
}

/// Parse `"500ms"`, `"30s"`, `"2m"`, `"1h"` or a bare number of seconds.
pub fn parse_duration(text: &str) -> Result<Duration, String> {
    let text = text.trim();
    let split = text.find(|c: char| !(c.is_ascii_digit() || c == '.')).unwrap_or(text.len());
    let (number, unit) = text.split_at(split);

    let value: f64 = number.parse().map_err(|_| format!("invalid duration: {text:?}"))?;
    let factor = match unit.trim() {
        "ms" => 0.001,
        "" | "s" => 1.0,
        "m" => 60.0,
        "h" => 3600.0,
        other => return Err(format!("unknown duration unit {other:?} in {text:?}")),
    };

    Duration::try_from_secs_f64(value * factor).map_err(|_| format!("invalid duration: {text:?}"))
}

mod duration {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer, de};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawDuration {
        Seconds(u64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_duration(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        match RawDuration::deserialize(deserializer)? {
            RawDuration::Seconds(secs) => Ok(Duration::from_secs(secs)),
            RawDuration::Text(text) => super::parse_duration(&text).map_err(de::Error::custom),
        }
    }
}
