//! The `ipaddr` extension type: an IPv4 or IPv6 address with a prefix
//! length, supporting equality and prefix-containment, not ordering.

use std::fmt::Display;
use std::net::{Ipv4Addr, Ipv6Addr};

use crate::err::{ErrExtensionArgument, EvaluationError};

/// An IP address together with a CIDR prefix length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IpAddr {
    V4 { addr: Ipv4Addr, prefix: u8 },
    V6 { addr: Ipv6Addr, prefix: u8 },
}

impl IpAddr {
    /// Parse `"127.0.0.1"`, `"10.0.0.0/8"`, `"::1"`, or `"2001:db8::/32"`.
    pub fn parse(s: &str) -> Result<Self, EvaluationError> {
        let invalid = || {
            ErrExtensionArgument {
                name: "ip".into(),
                msg: format!("`{s}` is not a valid IP address"),
            }
            .into()
        };

        let (addr_str, prefix_str) = match s.split_once('/') {
            Some((a, p)) => (a, Some(p)),
            None => (s, None),
        };

        if let Ok(addr) = addr_str.parse::<Ipv4Addr>() {
            let prefix = match prefix_str {
                Some(p) => p.parse::<u8>().map_err(|_| invalid())?,
                None => 32,
            };
            if prefix > 32 {
                return Err(invalid());
            }
            return Ok(IpAddr::V4 { addr, prefix });
        }
        if let Ok(addr) = addr_str.parse::<Ipv6Addr>() {
            let prefix = match prefix_str {
                Some(p) => p.parse::<u8>().map_err(|_| invalid())?,
                None => 128,
            };
            if prefix > 128 {
                return Err(invalid());
            }
            return Ok(IpAddr::V6 { addr, prefix });
        }
        Err(invalid())
    }

    pub fn is_ipv4(&self) -> bool {
        matches!(self, IpAddr::V4 { .. })
    }

    pub fn is_ipv6(&self) -> bool {
        matches!(self, IpAddr::V6 { .. })
    }

    pub fn is_loopback(&self) -> bool {
        match self {
            IpAddr::V4 { addr, .. } => addr.is_loopback(),
            IpAddr::V6 { addr, .. } => addr.is_loopback(),
        }
    }

    pub fn is_multicast(&self) -> bool {
        match self {
            IpAddr::V4 { addr, .. } => addr.is_multicast(),
            IpAddr::V6 { addr, .. } => addr.is_multicast(),
        }
    }

    /// True if `self`'s network (the range covered by its prefix) entirely
    /// contains `other`'s network.
    pub fn is_in_range(&self, other: &IpAddr) -> bool {
        match (self, other) {
            (IpAddr::V4 { addr: a, prefix: pa }, IpAddr::V4 { addr: b, prefix: pb }) => {
                network_contains(u32::from(*a), *pa, u32::from(*b), *pb, 32)
            }
            (IpAddr::V6 { addr: a, prefix: pa }, IpAddr::V6 { addr: b, prefix: pb }) => {
                network_contains(u128::from(*a), *pa, u128::from(*b), *pb, 128)
            }
            _ => false,
        }
    }
}

fn network_contains<T>(container_addr: T, container_prefix: u8, member_addr: T, member_prefix: u8, width: u8) -> bool
where
    T: Copy + PartialEq + std::ops::Shr<u32, Output = T>,
{
    if container_prefix > member_prefix {
        return false;
    }
    if container_prefix == 0 {
        return true;
    }
    let shift = (width - container_prefix) as u32;
    (container_addr >> shift) == (member_addr >> shift)
}

impl Display for IpAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IpAddr::V4 { addr, prefix } if *prefix == 32 => write!(f, "{addr}"),
            IpAddr::V4 { addr, prefix } => write!(f, "{addr}/{prefix}"),
            IpAddr::V6 { addr, prefix } if *prefix == 128 => write!(f, "{addr}"),
            IpAddr::V6 { addr, prefix } => write!(f, "{addr}/{prefix}"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_plain_and_cidr() {
        let a = IpAddr::parse("127.0.0.1").unwrap();
        assert!(a.is_loopback());
        let b = IpAddr::parse("10.0.0.0/8").unwrap();
        assert!(!b.is_loopback());
    }

    #[test]
    fn range_containment() {
        let network = IpAddr::parse("10.0.0.0/8").unwrap();
        let member = IpAddr::parse("10.1.2.3").unwrap();
        let outsider = IpAddr::parse("11.0.0.0").unwrap();
        assert!(network.is_in_range(&member));
        assert!(!network.is_in_range(&outsider));
    }

    #[test]
    fn mismatched_families_never_in_range() {
        let v4 = IpAddr::parse("127.0.0.1").unwrap();
        let v6 = IpAddr::parse("::1").unwrap();
        assert!(!v4.is_in_range(&v6));
    }

    #[test]
    fn rejects_garbage() {
        assert!(IpAddr::parse("not-an-ip").is_err());
    }
}
