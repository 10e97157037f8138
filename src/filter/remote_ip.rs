//! Client address resolution behind reverse proxies.
//!
//! # Responsibilities
//! - Trust forwarded-for headers only from configured proxy ranges
//! - Walk the forwarded-for chain right to left to find the client
//! - Rewrite the header to the part of the chain that was not consumed
//! - Resolve the original scheme from the protocol header
//!
//! # Design Decisions
//! - The immediate peer must be an internal or trusted proxy, otherwise the
//!   headers are ignored and the peer is the client
//! - Internal proxies are skipped silently; trusted proxies are recorded
//! - An entry that is not an IP address ends the walk

use std::collections::VecDeque;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{uri::Scheme, HeaderName, HeaderValue, Request},
    response::Response,
};
use futures_util::future::BoxFuture;
use thiserror::Error;

use crate::config::RemoteIpConfig;
use crate::filter::{Filter, FilterError, FilterNext};

/// Error parsing an address range.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteIpError {
    #[error("invalid address range '{0}'")]
    Range(String),

    #[error("invalid header name '{0}'")]
    Header(String),
}

/// An address block in CIDR notation. A bare address is a /32 or /128.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpRange {
    network: IpAddr,
    prefix: u8,
}

impl IpRange {
    /// IPv4-mapped IPv6 addresses are tested as IPv4.
    pub fn contains(&self, ip: IpAddr) -> bool {
        match (self.network, ip.to_canonical()) {
            (IpAddr::V4(net), IpAddr::V4(ip)) => {
                let mask = u32::MAX.checked_shl(32 - self.prefix as u32).unwrap_or(0);
                u32::from(net) & mask == u32::from(ip) & mask
            }
            (IpAddr::V6(net), IpAddr::V6(ip)) => {
                let mask = u128::MAX.checked_shl(128 - self.prefix as u32).unwrap_or(0);
                u128::from(net) & mask == u128::from(ip) & mask
            }
            _ => false,
        }
    }
}

impl FromStr for IpRange {
    type Err = RemoteIpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || RemoteIpError::Range(s.to_string());
        let (addr, prefix) = match s.split_once('/') {
            Some((addr, prefix)) => (addr, Some(prefix)),
            None => (s, None),
        };

        let network: IpAddr = addr.trim().parse().map_err(|_| invalid())?;
        let max = if network.is_ipv4() { 32 } else { 128 };
        let prefix = match prefix {
            Some(p) => p.trim().parse::<u8>().map_err(|_| invalid())?,
            None => max,
        };
        if prefix > max {
            return Err(invalid());
        }

        Ok(Self { network, prefix })
    }
}

impl fmt::Display for IpRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix)
    }
}

/// The client as seen after proxy resolution. Attached to every request
/// that passes the filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteAddr {
    /// Resolved client address.
    pub ip: IpAddr,
    /// Address of the immediate peer.
    pub peer: IpAddr,
    /// Trusted proxies traversed, nearest to the client first.
    pub proxies: Vec<IpAddr>,
    /// Scheme the client used.
    pub scheme: Scheme,
}

/// Rewrites the apparent client address from trusted proxy headers.
#[derive(Debug, Clone)]
pub struct RemoteIpFilter {
    remote_ip_header: HeaderName,
    protocol_header: HeaderName,
    https_value: String,
    internal_proxies: Vec<IpRange>,
    trusted_proxies: Vec<IpRange>,
}

impl RemoteIpFilter {
    pub fn from_config(config: &RemoteIpConfig) -> Result<Self, RemoteIpError> {
        let header = |name: &str| {
            HeaderName::from_str(&name.to_ascii_lowercase())
                .map_err(|_| RemoteIpError::Header(name.to_string()))
        };
        let ranges = |list: &[String]| {
            list.iter()
                .map(|r| r.parse::<IpRange>())
                .collect::<Result<Vec<_>, _>>()
        };

        Ok(Self {
            remote_ip_header: header(&config.remote_ip_header)?,
            protocol_header: header(&config.protocol_header)?,
            https_value: config.protocol_header_https_value.clone(),
            internal_proxies: ranges(&config.internal_proxies)?,
            trusted_proxies: ranges(&config.trusted_proxies)?,
        })
    }

    fn is_internal(&self, ip: IpAddr) -> bool {
        self.internal_proxies.iter().any(|r| r.contains(ip))
    }

    fn is_trusted(&self, ip: IpAddr) -> bool {
        self.trusted_proxies.iter().any(|r| r.contains(ip))
    }

    /// Resolve the client for a request arriving from `peer`, rewriting the
    /// forwarded-for header in place.
    pub fn resolve(&self, request: &mut Request<Body>, peer: IpAddr) -> RemoteAddr {
        let peer = peer.to_canonical();
        let mut resolved = RemoteAddr {
            ip: peer,
            peer,
            proxies: Vec::new(),
            scheme: Scheme::HTTP,
        };

        if !self.is_internal(peer) && !self.is_trusted(peer) {
            return resolved;
        }

        let entries: Vec<String> = request
            .headers()
            .get_all(&self.remote_ip_header)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let mut idx = entries.len();
        let mut client = None;
        let mut proxies = VecDeque::new();
        while idx > 0 {
            let Ok(ip) = entries[idx - 1].parse::<IpAddr>().map(|ip| ip.to_canonical()) else {
                break;
            };
            idx -= 1;
            client = Some(ip);
            if self.is_internal(ip) {
                continue;
            }
            if self.is_trusted(ip) {
                proxies.push_front(ip);
                continue;
            }
            break;
        }

        if let Some(ip) = client {
            resolved.ip = ip;
            resolved.proxies = proxies.into();

            let remaining = entries[..idx].join(", ");
            let headers = request.headers_mut();
            headers.remove(&self.remote_ip_header);
            if !remaining.is_empty() {
                if let Ok(value) = HeaderValue::from_str(&remaining) {
                    headers.insert(self.remote_ip_header.clone(), value);
                }
            }
        }

        if let Some(proto) = request
            .headers()
            .get(&self.protocol_header)
            .and_then(|v| v.to_str().ok())
        {
            if proto.trim().eq_ignore_ascii_case(&self.https_value) {
                resolved.scheme = Scheme::HTTPS;
            }
        }

        resolved
    }
}

impl Filter for RemoteIpFilter {
    fn process<'a>(
        &'a self,
        mut request: Request<Body>,
        next: FilterNext<'a>,
    ) -> BoxFuture<'a, Result<Response, FilterError>> {
        Box::pin(async move {
            let peer = request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip());

            if let Some(peer) = peer {
                let remote = self.resolve(&mut request, peer);
                if remote.ip != peer {
                    tracing::debug!(
                        peer = %peer,
                        client = %remote.ip,
                        proxies = ?remote.proxies,
                        "Resolved client address from forwarded header"
                    );
                }
                request.extensions_mut().insert(remote);
            } else {
                tracing::trace!("No peer address on request, skipping client resolution");
            }

            next.run(request).await
        })
    }
}
