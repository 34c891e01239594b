//! Proxy candidates and the plaintext feed parser.
//!
//! Two feed layouts are understood:
//!
//! - one `ip:port` per line;
//! - many `ip:port CC-flags` tokens per line, where `CC` is a two-letter
//!   country code.
//!
//! Both go through the same token scanner, so a line in either layout yields
//! every acceptable candidate it contains. Anything unparseable is skipped.

use std::collections::HashSet;
use std::fmt;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Ports that are almost never forward proxies.
const DENIED_PORTS: [u16; 12] = [22, 23, 25, 53, 110, 143, 443, 993, 995, 3306, 3389, 5432];

const MIN_PORT: u16 = 80;
const MAX_PORT: u16 = 65000;

pub const UNKNOWN_COUNTRY: &str = "Unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyProtocol {
    Socks5,
}

impl ProxyProtocol {
    pub fn scheme(&self) -> &'static str {
        match self {
            ProxyProtocol::Socks5 => "socks5",
        }
    }
}

/// A third-party forward proxy under evaluation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProxyCandidate {
    pub host: Ipv4Addr,
    pub port: u16,
    pub protocol: ProxyProtocol,
    pub country: String,
    pub latency: Option<Duration>,
    pub last_tested: Option<DateTime<Utc>>,
    pub working: bool,
}

impl ProxyCandidate {
    pub fn new(host: Ipv4Addr, port: u16, country: impl Into<String>) -> Self {
        Self {
            host,
            port,
            protocol: ProxyProtocol::Socks5,
            country: country.into(),
            latency: None,
            last_tested: None,
            working: false,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.host, self.port))
    }

    /// Proxy URL suitable for HTTP clients and the bypass service.
    pub fn url(&self) -> String {
        format!("{}://{}:{}", self.protocol.scheme(), self.host, self.port)
    }

    /// Record the outcome of a latency test.
    pub fn tested(mut self, latency: Option<Duration>) -> Self {
        self.working = latency.is_some();
        self.latency = latency;
        self.last_tested = Some(Utc::now());
        self
    }
}

impl fmt::Display for ProxyCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Parse a proxy feed body into candidates, deduplicated by `host:port`.
pub fn parse_proxy_list(body: &str) -> Vec<ProxyCandidate> {
    let mut seen = HashSet::new();
    let mut candidates = Vec::new();

    for line in body.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let tokens: Vec<&str> = line.split_whitespace().collect();
        for (i, token) in tokens.iter().enumerate() {
            let Some((host, port)) = parse_host_port(token) else {
                continue;
            };
            if !seen.insert((host, port)) {
                continue;
            }
            let country = tokens
                .get(i + 1)
                .and_then(|next| country_flag(next))
                .map(str::to_string)
                .unwrap_or_else(|| country_from_ip(host).to_string());
            candidates.push(ProxyCandidate::new(host, port, country));
        }
    }

    candidates
}

fn parse_host_port(token: &str) -> Option<(Ipv4Addr, u16)> {
    let token = token
        .strip_prefix("socks5://")
        .or_else(|| token.strip_prefix("socks5h://"))
        .unwrap_or(token);
    let (host, port) = token.split_once(':')?;
    let host: Ipv4Addr = host.trim().parse().ok()?;
    let port: u16 = port.trim().parse().ok()?;

    if !is_public_ipv4(host) || !is_acceptable_port(port) {
        return None;
    }
    Some((host, port))
}

/// `US-H`, `RU-A-S!`, `DE` and the like.
fn country_flag(token: &str) -> Option<&str> {
    let code = token.split('-').next()?;
    (code.len() == 2 && code.bytes().all(|b| b.is_ascii_uppercase())).then_some(code)
}

pub fn is_acceptable_port(port: u16) -> bool {
    (MIN_PORT..=MAX_PORT).contains(&port) && !DENIED_PORTS.contains(&port)
}

/// Rejects unroutable, private, reserved and broadcast-looking addresses.
pub fn is_public_ipv4(ip: Ipv4Addr) -> bool {
    if ip.is_unspecified()
        || ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_multicast()
        || ip.is_broadcast()
    {
        return false;
    }

    let [a, _, _, d] = ip.octets();
    // "this network" and the 240.0.0.0/4 reserved block
    if a == 0 || a >= 240 {
        return false;
    }
    // network and broadcast addresses
    d != 0 && d != 255
}

/// Coarse country guess from the first octet, used when the feed carries no
/// country flag. Only good enough for log output and pool statistics.
pub fn country_from_ip(ip: Ipv4Addr) -> &'static str {
    let [a, ..] = ip.octets();
    match a {
        8 | 39 | 47 => "CN",
        3 | 13 | 18 | 34 | 35 => "US",
        1..=2 | 5..=39 | 96..=126 | 128..=159 | 198..=199 => "US",
        40..=95 | 192..=195 => "EU",
        160..=191 => "Various",
        196..=197 => "AF",
        200..=201 => "LA",
        202..=203 | 210..=211 | 218..=222 => "AP",
        _ => UNKNOWN_COUNTRY,
    }
}
