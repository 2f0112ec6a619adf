//! overlay address allocation for nodes.
//!
//! allocation returns the numerically smallest unallocated address in each
//! configured prefix, skipping the network and broadcast addresses. the
//! caller serialises access with the same lock that guards node creation.

use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use ipnet::IpNet;

use crate::Error;

/// allocates overlay addresses for new nodes.
pub struct IpAllocator {
    prefix_v4: Option<IpNet>,
    prefix_v6: Option<IpNet>,
    allocated_v4: HashSet<IpAddr>,
    allocated_v6: HashSet<IpAddr>,
}

impl IpAllocator {
    /// create a new allocator with the given prefixes.
    pub fn new(prefix_v4: Option<IpNet>, prefix_v6: Option<IpNet>) -> Self {
        Self {
            prefix_v4,
            prefix_v6,
            allocated_v4: HashSet::new(),
            allocated_v6: HashSet::new(),
        }
    }

    /// load already-allocated addresses from the database.
    pub fn load_allocated(&mut self, addresses: impl IntoIterator<Item = IpAddr>) {
        for addr in addresses {
            match addr {
                IpAddr::V4(_) => {
                    self.allocated_v4.insert(addr);
                }
                IpAddr::V6(_) => {
                    self.allocated_v6.insert(addr);
                }
            }
        }
    }

    /// allocate the smallest free ipv4 address.
    pub fn allocate_v4(&mut self) -> Result<Option<IpAddr>, Error> {
        let Some(IpNet::V4(prefix)) = self.prefix_v4 else {
            return Ok(None);
        };

        let network = u32::from(prefix.network());
        let broadcast = u32::from(prefix.broadcast());
        let mut candidate = network.saturating_add(1);
        while candidate < broadcast {
            let ip = IpAddr::V4(Ipv4Addr::from(candidate));
            if !self.allocated_v4.contains(&ip) {
                self.allocated_v4.insert(ip);
                return Ok(Some(ip));
            }
            candidate += 1;
        }

        Err(Error::NoAddressesAvailable)
    }

    /// allocate the smallest free ipv6 address.
    pub fn allocate_v6(&mut self) -> Result<Option<IpAddr>, Error> {
        let Some(IpNet::V6(prefix)) = self.prefix_v6 else {
            return Ok(None);
        };

        let network = u128::from(prefix.network());
        let last = u128::from(prefix.broadcast());
        let mut candidate = network.saturating_add(1);
        while candidate < last {
            let ip = IpAddr::V6(Ipv6Addr::from(candidate));
            if !self.allocated_v6.contains(&ip) {
                self.allocated_v6.insert(ip);
                return Ok(Some(ip));
            }
            candidate += 1;
        }

        Err(Error::NoAddressesAvailable)
    }

    /// allocate both addresses for a new node.
    pub fn allocate(&mut self) -> Result<(Option<IpAddr>, Option<IpAddr>), Error> {
        let v4 = self.allocate_v4()?;
        let v6 = self.allocate_v6()?;
        Ok((v4, v6))
    }

    /// release an address back to the pool.
    pub fn release(&mut self, addr: IpAddr) {
        match addr {
            IpAddr::V4(_) => {
                self.allocated_v4.remove(&addr);
            }
            IpAddr::V6(_) => {
                self.allocated_v6.remove(&addr);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocates_smallest_first() {
        let prefix: IpNet = "100.64.0.0/10".parse().unwrap();
        let mut allocator = IpAllocator::new(Some(prefix), None);

        let ip1 = allocator.allocate_v4().unwrap().unwrap();
        let ip2 = allocator.allocate_v4().unwrap().unwrap();
        assert_eq!(ip1.to_string(), "100.64.0.1");
        assert_eq!(ip2.to_string(), "100.64.0.2");
    }

    #[test]
    fn test_skips_network_and_broadcast() {
        let prefix: IpNet = "100.64.0.0/30".parse().unwrap();
        let mut allocator = IpAllocator::new(Some(prefix), None);

        // /30 has hosts .1 and .2; .0 is the network, .3 the broadcast
        assert_eq!(
            allocator.allocate_v4().unwrap().unwrap().to_string(),
            "100.64.0.1"
        );
        assert_eq!(
            allocator.allocate_v4().unwrap().unwrap().to_string(),
            "100.64.0.2"
        );
        assert!(matches!(
            allocator.allocate_v4(),
            Err(Error::NoAddressesAvailable)
        ));
    }

    #[test]
    fn test_fills_released_gap() {
        let prefix: IpNet = "100.64.0.0/24".parse().unwrap();
        let mut allocator = IpAllocator::new(Some(prefix), None);

        let first = allocator.allocate_v4().unwrap().unwrap();
        allocator.allocate_v4().unwrap().unwrap();
        allocator.release(first);

        // the freed smallest address is handed out again
        assert_eq!(allocator.allocate_v4().unwrap().unwrap(), first);
    }

    #[test]
    fn test_skips_preloaded_addresses() {
        let prefix: IpNet = "100.64.0.0/24".parse().unwrap();
        let mut allocator = IpAllocator::new(Some(prefix), None);
        allocator.load_allocated(["100.64.0.1".parse::<IpAddr>().unwrap()]);

        assert_eq!(
            allocator.allocate_v4().unwrap().unwrap().to_string(),
            "100.64.0.2"
        );
    }

    #[test]
    fn test_v6_allocation() {
        let prefix: IpNet = "fd7a:115c:a1e0::/48".parse().unwrap();
        let mut allocator = IpAllocator::new(None, Some(prefix));

        let ip = allocator.allocate_v6().unwrap().unwrap();
        assert_eq!(ip.to_string(), "fd7a:115c:a1e0::1");
        let ip = allocator.allocate_v6().unwrap().unwrap();
        assert_eq!(ip.to_string(), "fd7a:115c:a1e0::2");
    }

    #[test]
    fn test_unconfigured_prefix_yields_none() {
        let mut allocator = IpAllocator::new(None, None);
        assert!(allocator.allocate_v4().unwrap().is_none());
        assert!(allocator.allocate_v6().unwrap().is_none());
    }
}
