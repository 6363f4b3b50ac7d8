use std::time::Duration;

use hickory_resolver::Resolver;
use hickory_resolver::config::{NameServerConfig, ResolverConfig, ResolverOpts};
use hickory_resolver::name_server::TokioConnectionProvider;
use hickory_resolver::proto::rr::RecordType;
use hickory_resolver::proto::xfer::Protocol;
use tokio::time::{Instant, timeout};

use super::Latency;
use crate::error::ProbeError;
use crate::service::{DnsCheck, DnsRecordType};
use crate::types::ProbeOutcome;

const LATENCY: Latency =
    Latency::tiered(100, "slow DNS resolution", 500, "very slow DNS resolution");

/// Resolve `check.host` against the configured resolver only, bypassing the
/// system configuration and any cache.
pub(super) async fn probe(check: &DnsCheck, limit: Duration) -> Result<ProbeOutcome, ProbeError> {
    let mut config = ResolverConfig::new();
    config.add_name_server(NameServerConfig::new(check.resolver, Protocol::Udp));

    let mut options = ResolverOpts::default();
    options.timeout = limit;
    options.attempts = 1;
    options.cache_size = 0;

    let resolver = Resolver::builder_with_config(config, TokioConnectionProvider::default())
        .with_options(options)
        .build();

    let host = check.host.as_str();
    let start = Instant::now();
    let lookup = async {
        match &check.record_type {
            DnsRecordType::A => resolver.ipv4_lookup(host).await.map(drop),
            DnsRecordType::Aaaa => resolver.ipv6_lookup(host).await.map(drop),
            DnsRecordType::Cname => match resolver.lookup(host, RecordType::CNAME).await {
                Ok(_) => Ok(()),
                // A host without an alias is its own canonical name.
                Err(e) if e.is_no_records_found() => resolver.lookup_ip(host).await.map(drop),
                Err(e) => Err(e),
            },
            DnsRecordType::Mx => resolver.mx_lookup(host).await.map(drop),
            DnsRecordType::Txt => resolver.txt_lookup(host).await.map(drop),
            DnsRecordType::Ns => resolver.ns_lookup(host).await.map(drop),
            DnsRecordType::Host(_) => resolver.lookup_ip(host).await.map(drop),
        }
    };

    timeout(limit, lookup)
        .await
        .map_err(|_| ProbeError::Resolve(format!("lookup of {host} timed out after {limit:?}")))?
        .map_err(|e| ProbeError::Resolve(e.to_string()))?;

    Ok(LATENCY.classify(start.elapsed(), 0))
}
