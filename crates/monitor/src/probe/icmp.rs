use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tokio::time::{Instant, timeout};

use super::Latency;
use crate::error::ProbeError;
use crate::types::ProbeOutcome;

const LATENCY: Latency = Latency::tiered(100, "high latency", 500, "very high latency");

/// Runs the system `ping` for a single echo request. Only the exit status is
/// inspected.
pub(super) async fn probe(host: &str, limit: Duration) -> Result<ProbeOutcome, ProbeError> {
    let mut command = ping_command(host, limit);
    command.stdin(Stdio::null()).stdout(Stdio::null()).stderr(Stdio::null()).kill_on_drop(true);

    let start = Instant::now();
    // The ping deadline covers the reply; allow a little extra for process startup.
    let status = timeout(limit + Duration::from_secs(1), command.status()).await;
    let response_time = start.elapsed();

    match status {
        Ok(Ok(status)) if status.success() => Ok(LATENCY.classify(response_time, 0)),
        _ => Err(ProbeError::protocol("ping failed")),
    }
}

#[cfg(windows)]
fn ping_command(host: &str, limit: Duration) -> Command {
    let mut command = Command::new("ping");
    command.args(["-n", "1", "-w", &limit.as_millis().to_string(), host]);
    command
}

#[cfg(not(windows))]
fn ping_command(host: &str, limit: Duration) -> Command {
    let mut command = Command::new("ping");
    command.args(["-c", "1", "-W", &limit.as_secs().max(1).to_string(), host]);
    command
}
