use anyhow::{bail, ensure, Context, Result};
use std::{
    fmt::Display,
    net::{IpAddr, Ipv4Addr, Ipv6Addr},
    str::FromStr,
};

/// An IP network in CIDR notation, e.g. 10.0.0.0/16 or fd00::/48. The address is kept exactly as
/// the user wrote it, so a CIDR with host bits set can be reported back by validation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct IpNet {
    pub(crate) addr: IpAddr,
    pub(crate) prefix: u8,
}

impl IpNet {
    pub(crate) fn new(addr: IpAddr, prefix: u8) -> Result<Self> {
        ensure!(
            prefix <= max_prefix(&addr),
            "invalid prefix length {} for {}",
            prefix,
            addr
        );
        Ok(Self { addr, prefix })
    }

    pub(crate) fn parse(value: &str) -> Result<Self> {
        let (addr, prefix) = value.split_once('/').context(format!("invalid CIDR address: {}", value))?;

        let addr = IpAddr::from_str(addr).context(format!("invalid CIDR address: {}", value))?;
        let prefix = prefix.parse::<u8>().context(format!("invalid CIDR address: {}", value))?;

        Self::new(addr, prefix).context(format!("invalid CIDR address: {}", value))
    }

    pub(crate) fn is_ipv4(&self) -> bool {
        self.addr.is_ipv4()
    }

    pub(crate) fn bits(&self) -> u8 {
        max_prefix(&self.addr)
    }

    /// The address with all host bits cleared
    pub(crate) fn network(&self) -> IpAddr {
        match self.addr {
            IpAddr::V4(addr) => IpAddr::V4(Ipv4Addr::from(u32::from(addr) & v4_mask(self.prefix))),
            IpAddr::V6(addr) => IpAddr::V6(Ipv6Addr::from(u128::from(addr) & v6_mask(self.prefix))),
        }
    }

    /// The same network with host bits cleared
    pub(crate) fn trunc(&self) -> Self {
        Self {
            addr: self.network(),
            prefix: self.prefix,
        }
    }

    pub(crate) fn contains(&self, ip: &IpAddr) -> bool {
        match (self.addr, ip) {
            (IpAddr::V4(addr), IpAddr::V4(ip)) => {
                let mask = v4_mask(self.prefix);
                u32::from(addr) & mask == u32::from(*ip) & mask
            }
            (IpAddr::V6(addr), IpAddr::V6(ip)) => {
                let mask = v6_mask(self.prefix);
                u128::from(addr) & mask == u128::from(*ip) & mask
            }
            _ => false,
        }
    }

    pub(crate) fn overlaps(&self, other: &IpNet) -> bool {
        self.contains(&other.network()) || other.contains(&self.network())
    }
}

fn max_prefix(addr: &IpAddr) -> u8 {
    match addr {
        IpAddr::V4(_) => 32,
        IpAddr::V6(_) => 128,
    }
}

fn v4_mask(prefix: u8) -> u32 {
    match prefix {
        0 => 0,
        prefix => u32::MAX << (32 - u32::from(prefix)),
    }
}

fn v6_mask(prefix: u8) -> u128 {
    match prefix {
        0 => 0,
        prefix => u128::MAX << (128 - u32::from(prefix)),
    }
}

impl Display for IpNet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix)
    }
}

impl FromStr for IpNet {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        if value.is_empty() {
            bail!("empty CIDR address");
        }
        Self::parse(value)
    }
}

impl serde::Serialize for IpNet {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for IpNet {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        IpNet::parse(&value).map_err(|err| serde::de::Error::custom(format!("{:#}", err)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() -> Result<()> {
        assert_eq!(IpNet::parse("10.0.0.0/16")?.to_string(), "10.0.0.0/16");
        assert_eq!(IpNet::parse("fd00::/48")?.to_string(), "fd00::/48");
        assert!(IpNet::parse("10.0.0.0").is_err());
        assert!(IpNet::parse("10.0.0.0/33").is_err());
        assert!(IpNet::parse("fd00::/129").is_err());
        assert!(IpNet::parse("not-an-ip/8").is_err());

        Ok(())
    }

    #[test]
    fn test_network() -> Result<()> {
        assert_eq!(IpNet::parse("13.0.128.0/16")?.trunc().to_string(), "13.0.0.0/16");
        assert_eq!(IpNet::parse("10.0.0.1/0")?.trunc().to_string(), "0.0.0.0/0");
        assert_eq!(IpNet::parse("fd00:1::5/64")?.trunc().to_string(), "fd00:1::/64");

        Ok(())
    }

    #[test]
    fn test_contains_and_overlaps() -> Result<()> {
        let machine = IpNet::parse("10.0.0.0/16")?;

        assert!(machine.contains(&"10.0.200.4".parse()?));
        assert!(!machine.contains(&"10.1.0.1".parse()?));
        assert!(!machine.contains(&"fd00::1".parse()?));

        assert!(machine.overlaps(&IpNet::parse("10.0.2.0/24")?));
        assert!(IpNet::parse("10.0.2.0/24")?.overlaps(&machine));
        assert!(!machine.overlaps(&IpNet::parse("172.30.0.0/16")?));
        assert!(!machine.overlaps(&IpNet::parse("fd00::/48")?));

        Ok(())
    }
}
