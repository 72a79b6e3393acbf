//! Access control for MCP servers: client IP allow-lists and `Authorization` header checks.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use sha2::{Digest, Sha256};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use subtle::ConstantTimeEq;

/// One allow-list entry: a single address or a CIDR block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpRule {
    Single(IpAddr),
    Cidr { network: IpAddr, prefix_len: u8 },
}

impl IpRule {
    pub fn contains(&self, ip: IpAddr) -> bool {
        match *self {
            IpRule::Single(allowed) => normalize(allowed) == normalize(ip),
            IpRule::Cidr {
                network,
                prefix_len,
            } => match (normalize(ip), normalize(network)) {
                (IpAddr::V4(ip), IpAddr::V4(net)) => {
                    let mask = u32::MAX.checked_shl(32 - prefix_len as u32).unwrap_or(0);
                    u32::from(ip) & mask == u32::from(net) & mask
                }
                (IpAddr::V6(ip), IpAddr::V6(net)) => {
                    let mask = u128::MAX.checked_shl(128 - prefix_len as u32).unwrap_or(0);
                    u128::from(ip) & mask == u128::from(net) & mask
                }
                _ => false,
            },
        }
    }
}

/// IPv4-mapped IPv6 addresses (`::ffff:127.0.0.1`) compare as their IPv4 form; dual-stack
/// listeners report clients that way.
fn normalize(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V6(v6) => v6
            .to_ipv4_mapped()
            .map(IpAddr::V4)
            .unwrap_or(IpAddr::V6(v6)),
        v4 => v4,
    }
}

impl FromStr for IpRule {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let Some((network, prefix)) = s.split_once('/') else {
            return IpAddr::from_str(s)
                .map(IpRule::Single)
                .map_err(|e| format!("Invalid IP address '{}': {}", s, e));
        };
        let network = IpAddr::from_str(network)
            .map_err(|e| format!("Invalid network address '{}': {}", network, e))?;
        let prefix_len: u8 = prefix
            .parse()
            .map_err(|_| format!("Invalid CIDR prefix length: {}", prefix))?;
        let max = if network.is_ipv4() { 32 } else { 128 };
        if prefix_len > max {
            return Err(format!(
                "CIDR prefix length {} exceeds maximum {} for {}",
                prefix_len, max, network
            ));
        }
        Ok(IpRule::Cidr {
            network,
            prefix_len,
        })
    }
}

/// Client IP allow-list. Empty means every client is allowed.
#[derive(Debug, Clone, Default)]
pub struct IpFilter {
    rules: Vec<IpRule>,
}

impl IpFilter {
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    /// Add an address (`127.0.0.1`, `::1`) or CIDR block (`10.0.0.0/8`).
    pub fn allow(&mut self, ip_or_cidr: &str) -> Result<(), String> {
        self.rules.push(ip_or_cidr.parse()?);
        Ok(())
    }

    pub fn is_allowed(&self, ip: IpAddr) -> bool {
        self.rules.is_empty() || self.rules.iter().any(|rule| rule.contains(ip))
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// How clients must authenticate.
#[derive(Clone, Default)]
pub enum AuthConfig {
    #[default]
    None,
    /// `Authorization: Bearer <token>`
    Bearer(String),
    /// `Authorization: Basic <base64(username:password)>`
    Basic { username: String, password: String },
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthConfig::None => write!(f, "AuthConfig::None"),
            AuthConfig::Bearer(_) => write!(f, "AuthConfig::Bearer(***)"),
            AuthConfig::Basic { username, .. } => {
                write!(f, "AuthConfig::Basic {{ username: {:?} }}", username)
            }
        }
    }
}

impl AuthConfig {
    pub fn bearer(token: impl Into<String>) -> Self {
        Self::Bearer(token.into())
    }

    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Basic {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn is_required(&self) -> bool {
        !matches!(self, AuthConfig::None)
    }

    /// Check the raw `Authorization` header (absent header passes only with `None`).
    ///
    /// Secrets are compared as SHA-256 digests with `ct_eq` so neither length nor prefix leaks
    /// through timing.
    pub fn validate(&self, header: Option<&str>) -> bool {
        let header = header.map(str::trim);
        match (self, header) {
            (AuthConfig::None, _) => true,
            (_, None) => false,
            (AuthConfig::Bearer(token), Some(h)) => match h.strip_prefix("Bearer ") {
                Some(provided) => digest_eq(token.as_bytes(), provided.trim().as_bytes()),
                None => false,
            },
            (AuthConfig::Basic { username, password }, Some(h)) => {
                let Some(encoded) = h.strip_prefix("Basic ") else {
                    return false;
                };
                match BASE64.decode(encoded.trim()) {
                    Ok(decoded) => {
                        let expected = format!("{}:{}", username, password);
                        digest_eq(expected.as_bytes(), &decoded)
                    }
                    Err(_) => false,
                }
            }
        }
    }

    /// Value for a `WWW-Authenticate` challenge, if any.
    pub fn challenge(&self) -> Option<&'static str> {
        match self {
            AuthConfig::None => None,
            AuthConfig::Bearer(_) => Some("Bearer"),
            AuthConfig::Basic { .. } => Some("Basic realm=\"mcp\""),
        }
    }
}

fn digest_eq(expected: &[u8], provided: &[u8]) -> bool {
    Sha256::digest(expected)
        .ct_eq(&Sha256::digest(provided))
        .into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_filter_allows_everyone() {
        let filter = IpFilter::new();
        assert!(filter.is_allowed("203.0.113.9".parse().unwrap()));
    }

    #[test]
    fn test_single_and_cidr_rules() {
        let mut filter = IpFilter::new();
        filter.allow("127.0.0.1").unwrap();
        filter.allow("10.1.0.0/16").unwrap();
        filter.allow("2001:db8::/32").unwrap();

        assert!(filter.is_allowed("127.0.0.1".parse().unwrap()));
        assert!(filter.is_allowed("10.1.200.3".parse().unwrap()));
        assert!(!filter.is_allowed("10.2.0.1".parse().unwrap()));
        assert!(filter.is_allowed("2001:db8:1::5".parse().unwrap()));
        assert!(!filter.is_allowed("2001:db9::1".parse().unwrap()));
    }

    #[test]
    fn test_mapped_ipv4_matches_ipv4_rule() {
        let mut filter = IpFilter::new();
        filter.allow("127.0.0.1").unwrap();
        assert!(filter.is_allowed("::ffff:127.0.0.1".parse().unwrap()));
    }

    #[test]
    fn test_zero_prefix_matches_family() {
        let rule: IpRule = "0.0.0.0/0".parse().unwrap();
        assert!(rule.contains("8.8.8.8".parse().unwrap()));
        assert!(!rule.contains("::2".parse().unwrap()));
    }

    #[test]
    fn test_invalid_rules_are_rejected() {
        let mut filter = IpFilter::new();
        assert!(filter.allow("not-an-ip").is_err());
        assert!(filter.allow("10.0.0.0/33").is_err());
        assert!(filter.allow("10.0.0.0/x").is_err());
        assert!(filter.is_empty());
    }

    #[test]
    fn test_bearer_validation() {
        let auth = AuthConfig::bearer("s3cret");
        assert!(auth.validate(Some("Bearer s3cret")));
        assert!(!auth.validate(Some("Bearer s3cre")));
        assert!(!auth.validate(Some("Basic s3cret")));
        assert!(!auth.validate(None));
        assert!(AuthConfig::None.validate(None));
    }

    #[test]
    fn test_basic_validation() {
        let auth = AuthConfig::basic("ops", "pa:ss");
        let header = format!("Basic {}", BASE64.encode("ops:pa:ss"));
        assert!(auth.validate(Some(&header)));
        let wrong = format!("Basic {}", BASE64.encode("ops:nope"));
        assert!(!auth.validate(Some(&wrong)));
        assert!(!auth.validate(Some("Basic !!!notbase64")));
    }

    #[test]
    fn test_debug_hides_secrets() {
        let shown = format!("{:?}", AuthConfig::bearer("s3cret"));
        assert!(!shown.contains("s3cret"));
    }
}
