//! Greeting-banner probes for SSH, SMTP, POP3, IMAP and FTP.
//!
//! The server speaks first on all of these, so one read after connecting is
//! enough to classify the service.

use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::Instant;

use super::{Latency, connect_tcp, read_before};
use crate::error::ProbeError;
use crate::service::{Endpoint, SmtpCheck};
use crate::types::ProbeOutcome;

/// How a protocol's greeting is judged
pub(super) struct BannerProtocol {
    name: &'static str,
    buffer: usize,
    accepts: fn(&str) -> bool,
    /// Code recorded when the banner is accepted
    code: i64,
    latency: Latency,
    rejection: fn(&str) -> String,
}

pub(super) const SSH: BannerProtocol = BannerProtocol {
    name: "SSH",
    buffer: 256,
    accepts: |banner| banner.starts_with("SSH-"),
    code: 0,
    latency: Latency::single(500, "slow SSH response"),
    rejection: |_| "invalid SSH banner".to_string(),
};

pub(super) const SMTP: BannerProtocol = BannerProtocol {
    name: "SMTP",
    buffer: 512,
    accepts: |banner| banner.starts_with("220"),
    code: 220,
    latency: Latency::single(1000, "slow SMTP response"),
    rejection: |banner| format!("unexpected SMTP response: {}", banner.trim()),
};

pub(super) const POP3: BannerProtocol = BannerProtocol {
    name: "POP3",
    buffer: 512,
    accepts: |banner| banner.starts_with("+OK"),
    code: 0,
    latency: Latency::single(1000, "slow POP3 response"),
    rejection: |_| "invalid POP3 response".to_string(),
};

pub(super) const IMAP: BannerProtocol = BannerProtocol {
    name: "IMAP",
    buffer: 512,
    accepts: |banner| banner.contains("OK"),
    code: 0,
    latency: Latency::single(1000, "slow IMAP response"),
    rejection: |_| "invalid IMAP response".to_string(),
};

pub(super) const FTP: BannerProtocol = BannerProtocol {
    name: "FTP",
    buffer: 512,
    accepts: |banner| banner.starts_with("220"),
    code: 220,
    latency: Latency::single(1000, "slow FTP response"),
    rejection: |_| "invalid FTP response".to_string(),
};

pub(super) async fn probe(
    endpoint: &Endpoint,
    limit: Duration,
    protocol: &BannerProtocol,
) -> Result<ProbeOutcome, ProbeError> {
    let (_, _, outcome) = greet(endpoint, limit, protocol).await?;
    Ok(outcome)
}

/// Connect and judge the greeting, handing back the open stream and the
/// bytes read so far.
async fn greet(
    endpoint: &Endpoint,
    limit: Duration,
    protocol: &BannerProtocol,
) -> Result<(TcpStream, String, ProbeOutcome), ProbeError> {
    let start = Instant::now();
    let mut stream = connect_tcp(&endpoint.address, limit).await?;

    let mut buf = vec![0u8; protocol.buffer];
    let n = match read_before(&mut stream, &mut buf, start + limit).await {
        Ok(n) if n > 0 => n,
        _ => {
            return Err(ProbeError::protocol(format!(
                "failed to read {} banner",
                protocol.name
            )));
        }
    };
    let response_time = start.elapsed();

    let banner = String::from_utf8_lossy(&buf[..n]).into_owned();
    if !(protocol.accepts)(&banner) {
        return Err(ProbeError::protocol((protocol.rejection)(&banner)));
    }

    let outcome = protocol.latency.classify(response_time, protocol.code);
    Ok((stream, banner, outcome))
}

/// SMTP banner check, optionally followed by an `EHLO` capability check.
pub(super) async fn probe_smtp(
    check: &SmtpCheck,
    limit: Duration,
) -> Result<ProbeOutcome, ProbeError> {
    let start = Instant::now();
    let (mut stream, banner, outcome) = greet(&check.endpoint, limit, &SMTP).await?;
    if !check.starttls && !check.auth {
        return Ok(outcome);
    }

    let deadline = start + limit;
    // A multi-line greeting may span several reads.
    read_reply(&mut stream, banner.into_bytes(), deadline, "SMTP greeting").await?;
    let capabilities = ehlo(&mut stream, deadline).await?;
    // Best effort; the connection is dropped either way.
    let _ = stream.write_all(b"QUIT\r\n").await;

    if check.starttls && !advertises(&capabilities, "STARTTLS") {
        return Err(ProbeError::validation(220, "STARTTLS not advertised"));
    }
    if check.auth && !advertises(&capabilities, "AUTH") {
        return Err(ProbeError::validation(220, "AUTH not advertised"));
    }
    Ok(outcome)
}

async fn ehlo(stream: &mut TcpStream, deadline: Instant) -> Result<String, ProbeError> {
    stream
        .write_all(b"EHLO status-monitor.local\r\n")
        .await
        .map_err(|e| ProbeError::protocol(format!("EHLO write failed: {e}")))?;

    let reply = read_reply(stream, Vec::new(), deadline, "EHLO response").await?;
    if !reply.starts_with("250") {
        return Err(ProbeError::protocol(format!("EHLO rejected: {}", reply.trim())));
    }
    Ok(reply)
}

/// Keep reading until `reply` holds a complete SMTP reply.
async fn read_reply(
    stream: &mut TcpStream,
    mut reply: Vec<u8>,
    deadline: Instant,
    what: &str,
) -> Result<String, ProbeError> {
    let mut buf = [0u8; 512];
    loop {
        let text = String::from_utf8_lossy(&reply);
        if reply_complete(&text) {
            return Ok(text.into_owned());
        }

        match read_before(stream, &mut buf, deadline).await {
            Ok(n) if n > 0 => reply.extend_from_slice(&buf[..n]),
            _ => return Err(ProbeError::protocol(format!("failed to read {what}"))),
        }
    }
}

/// A multi-line SMTP reply ends with a line whose code is followed by a space.
fn reply_complete(text: &str) -> bool {
    if !text.ends_with('\n') {
        return false;
    }
    text.lines()
        .last()
        .map(|line| line.len() == 3 || line.as_bytes().get(3) == Some(&b' '))
        .unwrap_or(false)
}

fn advertises(capabilities: &str, keyword: &str) -> bool {
    capabilities.lines().any(|line| {
        line.get(4..)
            .and_then(|rest| rest.split_whitespace().next())
            .is_some_and(|word| word.eq_ignore_ascii_case(keyword))
    })
}
