//! Subscription target validation.
//!
//! Runs once, when a subscription is registered. Deliveries trust the
//! stored URL.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use thiserror::Error;
use url::{Host, Url};

/// Why a target URL was refused.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TargetValidationError {
    /// Not a parseable absolute URL.
    #[error("invalid webhook URL: {0}")]
    InvalidUrl(String),
    /// Anything other than `https`.
    #[error("webhook URL must use https, got '{0}'")]
    InsecureScheme(String),
    /// No host component.
    #[error("webhook URL has no host")]
    MissingHost,
    /// The host is, or resolves to, a non-public address.
    #[error("webhook host '{host}' resolves to non-public address {address}")]
    ForbiddenAddress {
        /// Host as written.
        host: String,
        /// Offending address.
        address: IpAddr,
    },
    /// DNS lookup failed or returned nothing.
    #[error("webhook host '{0}' could not be resolved")]
    Unresolvable(String),
}

/// Checks that a subscription URL is HTTPS and points at the public
/// internet.
#[derive(Debug, Clone, Copy, Default)]
pub struct TargetValidator;

impl TargetValidator {
    /// Create a validator.
    pub fn new() -> Self {
        Self
    }

    /// Validate `raw`, resolving its host when it is a name.
    pub async fn validate(&self, raw: &str) -> Result<Url, TargetValidationError> {
        let url = Url::parse(raw).map_err(|e| TargetValidationError::InvalidUrl(e.to_string()))?;

        if url.scheme() != "https" {
            return Err(TargetValidationError::InsecureScheme(url.scheme().to_string()));
        }

        let port = url.port_or_known_default().unwrap_or(443);
        match url.host() {
            None => Err(TargetValidationError::MissingHost),
            Some(Host::Ipv4(v4)) => check_address(&v4.to_string(), IpAddr::V4(v4)).map(|_| url.clone()),
            Some(Host::Ipv6(v6)) => check_address(&v6.to_string(), IpAddr::V6(v6)).map(|_| url.clone()),
            Some(Host::Domain(domain)) => {
                let host = domain.trim_end_matches('.').to_ascii_lowercase();
                if host == "localhost" || host.ends_with(".localhost") {
                    return Err(TargetValidationError::ForbiddenAddress {
                        host,
                        address: IpAddr::V4(Ipv4Addr::LOCALHOST),
                    });
                }

                let addresses: Vec<IpAddr> = tokio::net::lookup_host((host.as_str(), port))
                    .await
                    .map_err(|_| TargetValidationError::Unresolvable(host.clone()))?
                    .map(|addr| addr.ip())
                    .collect();
                if addresses.is_empty() {
                    return Err(TargetValidationError::Unresolvable(host));
                }
                for address in addresses {
                    check_address(&host, address)?;
                }
                Ok(url.clone())
            }
        }
    }
}

fn check_address(host: &str, address: IpAddr) -> Result<(), TargetValidationError> {
    if is_forbidden_ip(address) {
        Err(TargetValidationError::ForbiddenAddress {
            host: host.to_string(),
            address,
        })
    } else {
        Ok(())
    }
}

/// Whether `ip` is loopback, private, link-local, or otherwise not a
/// routable public address.
pub fn is_forbidden_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_forbidden_v4(v4),
        IpAddr::V6(v6) => is_forbidden_v6(v6),
    }
}

fn is_forbidden_v4(ip: Ipv4Addr) -> bool {
    let [a, b, ..] = ip.octets();
    ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_broadcast()
        || ip.is_documentation()
        || ip.is_multicast()
        // 0.0.0.0/8
        || a == 0
        // 100.64.0.0/10 carrier-grade NAT
        || (a == 100 && (b & 0xc0) == 64)
        // 198.18.0.0/15 benchmarking
        || (a == 198 && (b & 0xfe) == 18)
        // 240.0.0.0/4 reserved
        || a >= 240
}

fn is_forbidden_v6(ip: Ipv6Addr) -> bool {
    if let Some(mapped) = ip.to_ipv4_mapped() {
        return is_forbidden_v4(mapped);
    }
    let first = ip.segments()[0];
    ip.is_loopback()
        || ip.is_unspecified()
        || ip.is_multicast()
        // fc00::/7 unique local
        || (first & 0xfe00) == 0xfc00
        // fe80::/10 link-local
        || (first & 0xffc0) == 0xfe80
        // 2001:db8::/32 documentation
        || (first == 0x2001 && ip.segments()[1] == 0x0db8)
}
