//! Bit-level prefix arithmetic.
//!
//! A [`NetPrefix`] holds the routing part of an address in a fixed-width
//! window (the upper 64 bits of an IPv6 address, or a whole IPv4 address)
//! so child prefixes can be derived by writing numbered segments into it.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use ipnet::{IpNet, Ipv4Net, Ipv6Net};

use super::error::{PlanError, Result};
use crate::models::AddressFamily;

impl AddressFamily {
    pub fn of(net: &IpNet) -> Self {
        match net {
            IpNet::V4(_) => Self::V4,
            IpNet::V6(_) => Self::V6,
        }
    }

    /// Width of the integer window in bits
    pub fn window_bits(self) -> u8 {
        match self {
            Self::V4 => 32,
            Self::V6 => 64,
        }
    }

    /// Deepest mask length a plan of this family may reach
    pub fn max_mask_len(self) -> u8 {
        match self {
            Self::V4 => 24,
            Self::V6 => 64,
        }
    }
}

/// Parse a CIDR string, IPv4 or IPv6
pub fn parse_network(cidr: &str) -> Result<IpNet> {
    IpNet::from_str(cidr).map_err(|_| PlanError::malformed(format!("invalid CIDR: '{}'", cidr)))
}

/// Parse an IPv4 literal block and require it to be written canonically
/// (no host bits, no leading zeros)
pub fn parse_canonical_v4(cidr: &str) -> Result<Ipv4Net> {
    let net = Ipv4Net::from_str(cidr)
        .map_err(|_| PlanError::malformed(format!("invalid IPv4 block: '{}'", cidr)))?;
    let canonical = net.trunc().to_string();
    if canonical != cidr {
        return Err(PlanError::malformed(format!(
            "IPv4 block '{}' is not canonical (expected '{}')",
            cidr, canonical
        )));
    }
    Ok(net)
}

/// `len` one-bits starting `offset` bits from the top of a `window`-bit integer
fn segment_mask(window: u8, offset: u8, len: u8) -> u64 {
    if len == 0 {
        return 0;
    }
    let ones = if len >= 64 { u64::MAX } else { (1u64 << len) - 1 };
    ones << (window - offset - len)
}

/// Routing bits of a network plus a mask length
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetPrefix {
    family: AddressFamily,
    bits: u64,
    /// Bits already taken by the source network or a written segment
    claimed: u64,
    mask_len: u8,
}

impl NetPrefix {
    /// Capture `network`'s address bits tagged with `mask_len`
    pub fn from_network(network: &IpNet, mask_len: u8) -> Result<Self> {
        let family = AddressFamily::of(network);
        let limit = family.max_mask_len();
        if mask_len > limit || network.prefix_len() > limit {
            return Err(PlanError::capacity(format!(
                "{} cannot be bit-allocated down to /{} (limit /{}); use literal blocks instead",
                network, mask_len, limit
            )));
        }

        let bits = match network.network() {
            IpAddr::V4(addr) => u64::from(u32::from(addr)),
            IpAddr::V6(addr) => (u128::from(addr) >> 64) as u64,
        };

        Ok(Self {
            family,
            bits,
            claimed: segment_mask(family.window_bits(), 0, network.prefix_len()),
            mask_len,
        })
    }

    pub fn mask_len(&self) -> u8 {
        self.mask_len
    }

    pub fn with_mask_len(mut self, mask_len: u8) -> Self {
        self.mask_len = mask_len;
        self
    }

    /// Write `value` into the `bit_width`-bit field starting `bit_offset`
    /// bits from the top of the window.
    ///
    /// Segments may not overlap the source network or each other.
    pub fn set_segment(&mut self, bit_offset: u8, bit_width: u8, value: u64) -> Result<()> {
        let window = self.family.window_bits();
        if u16::from(bit_offset) + u16::from(bit_width) > u16::from(window) {
            return Err(PlanError::capacity(format!(
                "segment at bit {} with width {} exceeds the {}-bit window",
                bit_offset, bit_width, window
            )));
        }
        if bit_width < 64 && value >> bit_width != 0 {
            return Err(PlanError::capacity(format!(
                "value {} does not fit in {} bits",
                value, bit_width
            )));
        }
        if bit_width == 0 {
            return Ok(());
        }

        let mask = segment_mask(window, bit_offset, bit_width);
        if self.claimed & mask != 0 {
            return Err(PlanError::capacity(format!(
                "segment at bit {} with width {} overlaps bits already allocated",
                bit_offset, bit_width
            )));
        }

        self.bits |= value << (window - bit_offset - bit_width);
        self.claimed |= mask;
        Ok(())
    }

    pub fn to_network(&self) -> Result<IpNet> {
        let net = match self.family {
            AddressFamily::V4 => {
                Ipv4Net::new(Ipv4Addr::from(self.bits as u32), self.mask_len).map(IpNet::V4)
            }
            AddressFamily::V6 => {
                Ipv6Net::new(Ipv6Addr::from(u128::from(self.bits) << 64), self.mask_len).map(IpNet::V6)
            }
        };
        net.map_err(|e| PlanError::malformed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn net(s: &str) -> IpNet {
        s.parse().unwrap()
    }

    #[test]
    fn test_ipv6_segment() {
        let mut p = NetPrefix::from_network(&net("2001:503:ba3e::/48"), 64).unwrap();
        p.set_segment(48, 16, 1).unwrap();
        assert_eq!(p.to_network().unwrap().to_string(), "2001:503:ba3e:1::/64");
    }

    #[test]
    fn test_ipv6_nested_segments() {
        let base = NetPrefix::from_network(&net("2001:db8::/32"), 64).unwrap();
        let mut region = base;
        region.set_segment(32, 8, 3).unwrap();
        let mut site = region.with_mask_len(48);
        site.set_segment(40, 8, 0xff).unwrap();
        assert_eq!(site.to_network().unwrap().to_string(), "2001:db8:3ff::/48");
        assert_eq!(site.mask_len(), 48);
    }

    #[test]
    fn test_ipv4_segment() {
        let mut p = NetPrefix::from_network(&net("10.0.0.0/8"), 16).unwrap();
        p.set_segment(8, 8, 5).unwrap();
        assert_eq!(p.to_network().unwrap().to_string(), "10.5.0.0/16");
    }

    #[test]
    fn test_from_network_limits() {
        assert!(matches!(
            NetPrefix::from_network(&net("10.0.0.0/25"), 24),
            Err(PlanError::CapacityExceeded(_))
        ));
        assert!(matches!(
            NetPrefix::from_network(&net("10.0.0.0/8"), 28),
            Err(PlanError::CapacityExceeded(_))
        ));
        assert!(matches!(
            NetPrefix::from_network(&net("2001:db8::/32"), 80),
            Err(PlanError::CapacityExceeded(_))
        ));
        assert!(NetPrefix::from_network(&net("2001:db8::/64"), 64).is_ok());
    }

    #[test]
    fn test_segment_outside_window() {
        let mut p = NetPrefix::from_network(&net("2001:db8::/32"), 64).unwrap();
        assert!(matches!(p.set_segment(60, 8, 1), Err(PlanError::CapacityExceeded(_))));
    }

    #[test]
    fn test_segment_value_too_wide() {
        let mut p = NetPrefix::from_network(&net("2001:db8::/32"), 64).unwrap();
        assert!(matches!(p.set_segment(32, 2, 4), Err(PlanError::CapacityExceeded(_))));
        assert!(p.set_segment(32, 2, 3).is_ok());
    }

    #[test]
    fn test_overlapping_segments_rejected() {
        let mut p = NetPrefix::from_network(&net("2001:503:ba3e::/48"), 64).unwrap();
        // overlaps the source network
        assert!(matches!(p.set_segment(40, 16, 1), Err(PlanError::CapacityExceeded(_))));
        p.set_segment(48, 8, 1).unwrap();
        assert!(matches!(p.set_segment(52, 8, 1), Err(PlanError::CapacityExceeded(_))));
        assert!(p.set_segment(56, 8, 1).is_ok());
    }

    #[test]
    fn test_parse_canonical_v4() {
        assert!(parse_canonical_v4("10.1.0.0/16").is_ok());
        assert!(matches!(parse_canonical_v4("10.1.0.1/16"), Err(PlanError::MalformedInput(_))));
        assert!(matches!(parse_canonical_v4("10.1.0.0"), Err(PlanError::MalformedInput(_))));
        assert!(matches!(parse_canonical_v4("2001:db8::/32"), Err(PlanError::MalformedInput(_))));
    }
}
