#![cfg_attr(not(any(feature = "std", test)), no_std)]

//! Connection tuple model shared between the kernel programs and userspace.
//!
//! Every type stored in a map is `#[repr(C)]` with explicit zeroed padding so
//! that byte-wise hashing in kernel maps agrees with field equality.

use core::fmt;
use core::net::Ipv4Addr;

/// Identity of the inbound proxy leg, 127.0.0.6 in host order.
pub const INBOUND_PROXY_ADDR: u32 = 0x7f00_0006;

/// Port the proxy accepts redirected outbound application traffic on.
pub const OUTBOUND_INTERCEPT_PORT: u16 = 15001;

/// Port the proxy accepts redirected inbound traffic on.
pub const INBOUND_INTERCEPT_PORT: u16 = 15006;

/// Default capacity of each correlation table.
pub const DEFAULT_TABLE_CAPACITY: u32 = 1_000_000;

/// Slot of the debug table holding the log verbosity.
pub const DEBUG_SLOT_LEVEL: u32 = 0;
/// Slot of the debug table counting successful redirections.
pub const DEBUG_SLOT_REDIRECTS: u32 = 1;
pub const DEBUG_SLOTS: u32 = 2;

/// `AF_INET` as reported by the kernel.
pub const AF_INET: u32 = 2;

/// Whether `port` is one of the proxy's interception listeners.
#[inline(always)]
pub const fn is_intercept_port(port: u16) -> bool {
    port == OUTBOUND_INTERCEPT_PORT || port == INBOUND_INTERCEPT_PORT
}

/// An IPv4 address and port, both in host byte order.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub addr: u32,
    pub port: u16,
    pub _pad: u16,
}

impl Endpoint {
    #[inline(always)]
    pub const fn new(addr: u32, port: u16) -> Self {
        Self {
            addr,
            port,
            _pad: 0,
        }
    }

    pub fn ip(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.addr)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip(), self.port)
    }
}

/// One side of a TCP connection: the local and remote endpoints as seen by
/// the socket that owns it.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ConnTuple {
    pub local: Endpoint,
    pub remote: Endpoint,
}

impl ConnTuple {
    #[inline(always)]
    pub const fn new(local: Endpoint, remote: Endpoint) -> Self {
        Self { local, remote }
    }

    /// The same connection seen from the opposite end.
    #[inline(always)]
    pub const fn mirror(&self) -> Self {
        Self {
            local: self.remote,
            remote: self.local,
        }
    }

    /// Whether either endpoint is the inbound proxy identity.
    #[inline(always)]
    pub const fn touches_inbound_proxy(&self) -> bool {
        self.local.addr == INBOUND_PROXY_ADDR || self.remote.addr == INBOUND_PROXY_ADDR
    }
}

impl fmt::Display for ConnTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.local, self.remote)
    }
}

/// Socket addressing exactly as the kernel surfaces it to `sock_ops` and
/// `sk_msg` programs.
///
/// Addresses are in network byte order and the local port in host byte order.
/// The remote port is a full 32-bit network-order word, so on little-endian
/// hosts the port lands in the upper 16 bits.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WireAddrs {
    pub local_ip4: u32,
    pub local_port: u32,
    pub remote_ip4: u32,
    pub remote_port: u32,
}

impl WireAddrs {
    /// Convert to the host-order tuple used by every table.
    ///
    /// This is the only place byte order is handled; nothing downstream of it
    /// sees wire values.
    #[inline(always)]
    pub fn normalize(&self) -> ConnTuple {
        ConnTuple {
            local: Endpoint::new(u32::from_be(self.local_ip4), self.local_port as u16),
            remote: Endpoint::new(
                u32::from_be(self.remote_ip4),
                u32::from_be(self.remote_port) as u16,
            ),
        }
    }

    /// Encode a host-order tuple the way the kernel would present it.
    pub fn from_tuple(tuple: &ConnTuple) -> Self {
        Self {
            local_ip4: tuple.local.addr.to_be(),
            local_port: tuple.local.port as u32,
            remote_ip4: tuple.remote.addr.to_be(),
            remote_port: u32::from(tuple.remote.port).to_be(),
        }
    }
}

#[cfg(feature = "std")]
mod std_impls {
    use std::net::SocketAddrV4;

    use super::Endpoint;

    impl From<SocketAddrV4> for Endpoint {
        fn from(addr: SocketAddrV4) -> Self {
            Endpoint::new(u32::from(*addr.ip()), addr.port())
        }
    }

    impl From<Endpoint> for SocketAddrV4 {
        fn from(ep: Endpoint) -> Self {
            SocketAddrV4::new(ep.ip(), ep.port)
        }
    }
}

#[cfg(feature = "user")]
unsafe impl aya::Pod for Endpoint {}

#[cfg(feature = "user")]
unsafe impl aya::Pod for ConnTuple {}

#[cfg(test)]
mod tests {
    use super::*;

    fn ep(a: u8, b: u8, c: u8, d: u8, port: u16) -> Endpoint {
        Endpoint::new(u32::from(Ipv4Addr::new(a, b, c, d)), port)
    }

    #[test]
    fn test_inbound_proxy_addr_is_127_0_0_6() {
        assert_eq!(Ipv4Addr::from(INBOUND_PROXY_ADDR), Ipv4Addr::new(127, 0, 0, 6));
    }

    #[test]
    fn test_normalize_converts_remote_port_and_addresses() {
        let wire = WireAddrs {
            local_ip4: u32::from_ne_bytes([10, 0, 0, 5]),
            local_port: 40000,
            remote_ip4: u32::from_ne_bytes([10, 0, 0, 9]),
            remote_port: 8080u32.to_be(),
        };
        let tuple = wire.normalize();
        assert_eq!(tuple.local, ep(10, 0, 0, 5, 40000));
        assert_eq!(tuple.remote, ep(10, 0, 0, 9, 8080));
    }

    #[test]
    fn test_normalize_reads_remote_port_as_network_word() {
        // Bytes exactly as the kernel lays out `remote_port`: big-endian u32.
        let wire = WireAddrs {
            local_ip4: u32::from_ne_bytes([127, 0, 0, 1]),
            local_port: 15001,
            remote_ip4: u32::from_ne_bytes([10, 0, 0, 5]),
            remote_port: u32::from_ne_bytes([0, 0, 0x9c, 0x40]),
        };
        let tuple = wire.normalize();
        assert_eq!(tuple.remote.port, 40000);
        assert_eq!(tuple.local.port, 15001);
    }

    #[test]
    fn test_from_tuple_matches_kernel_layout() {
        let tuple = ConnTuple::new(ep(10, 0, 0, 5, 40000), ep(10, 0, 0, 9, 8080));
        let wire = WireAddrs::from_tuple(&tuple);
        assert_eq!(wire.remote_port, 8080u32.to_be());
        assert_eq!(wire.remote_port.to_ne_bytes(), [0, 0, 0x1f, 0x90]);
        assert_eq!(wire.local_port, 40000);
    }

    #[test]
    fn test_from_tuple_inverts_normalize() {
        let tuple = ConnTuple::new(ep(127, 0, 0, 1, 15001), ep(10, 0, 0, 5, 40000));
        assert_eq!(WireAddrs::from_tuple(&tuple).normalize(), tuple);
    }

    #[test]
    fn test_mirror() {
        let tuple = ConnTuple::new(ep(10, 0, 0, 5, 40000), ep(10, 0, 0, 9, 8080));
        let mirrored = tuple.mirror();
        assert_eq!(mirrored.local, tuple.remote);
        assert_eq!(mirrored.remote, tuple.local);
        assert_eq!(mirrored.mirror(), tuple);
    }

    #[test]
    fn test_intercept_ports() {
        assert!(is_intercept_port(15001));
        assert!(is_intercept_port(15006));
        assert!(!is_intercept_port(8080));
    }

    #[test]
    fn test_display() {
        let tuple = ConnTuple::new(ep(10, 0, 0, 5, 40000), ep(10, 0, 0, 9, 8080));
        assert_eq!(tuple.to_string(), "10.0.0.5:40000 -> 10.0.0.9:8080");
    }
}
