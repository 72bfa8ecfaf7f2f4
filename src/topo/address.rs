use std::fmt;
use std::net::Ipv4Addr;

/// Handle of a virtual host address as the topology sees it: a stable
/// process-wide id (path-cache key) plus the virtual network IP
/// (attachment key). Allocation of both lives outside the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address {
    id: u32,
    ip: Ipv4Addr,
}

impl Address {
    pub fn new(id: u32, ip: Ipv4Addr) -> Address {
        Address { id, ip }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn ip(&self) -> Ipv4Addr {
        self.ip
    }

    /// The IP as a host-order integer, for prefix matching.
    pub fn network_ip(&self) -> u32 {
        u32::from(self.ip)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.ip, self.id)
    }
}
