// # Netlink Network Stack
//
// Linux implementation of the netlease NetworkStack over rtnetlink.
//
// Address, route and MTU mutations go through a shared netlink handle;
// the message-pump connection task is spawned once at construction.
// Kernel EEXIST answers are mapped to `MutationOutcome::AlreadyPresent`
// so the reconciler can treat duplicates as success.
//
// ## Platform Support
//
// Netlink is Linux-only. On other platforms this crate exposes the same
// type whose constructor fails, matching how optional platform backends
// are selected at runtime.

#[cfg(not(target_os = "linux"))]
use netlease_core::error::Error;

/// Network prefix length for a contiguous netmask
pub fn prefix_len(netmask: std::net::Ipv4Addr) -> u8 {
    u32::from(netmask).count_ones() as u8
}

#[cfg(target_os = "linux")]
mod linux {
    use super::prefix_len;
    use async_trait::async_trait;
    use netlease_core::error::{Error, Result};
    use netlease_core::lease::Route;
    use netlease_core::traits::{MutationOutcome, NetworkStack};
    use netlink_packet_route::AddressFamily;
    use netlink_packet_route::address::{AddressAttribute, AddressMessage};
    use netlink_packet_route::link::LinkAttribute;
    use netlink_packet_route::route::RouteAttribute;
    use rtnetlink::{Handle, LinkUnspec, RouteMessageBuilder};
    use std::net::{IpAddr, Ipv4Addr};
    use tokio_stream::StreamExt;
    use tracing::debug;

    /// Identity of a network interface as the kernel sees it
    #[derive(Debug, Clone)]
    pub struct LinkInfo {
        /// Interface index
        pub index: u32,
        /// Hardware address
        pub hwaddr: Vec<u8>,
        /// Current MTU
        pub mtu: u32,
    }

    /// rtnetlink-backed NetworkStack
    pub struct NetlinkStack {
        handle: Handle,
    }

    impl NetlinkStack {
        /// Open a netlink connection and spawn its message pump
        pub async fn new() -> Result<Self> {
            let (connection, handle, _) = rtnetlink::new_connection()
                .map_err(|e| Error::network(format!("unable to create netlink socket: {}", e)))?;
            tokio::spawn(connection);
            Ok(Self { handle })
        }

        /// Look up an interface by name
        pub async fn link_info(&self, ifname: &str) -> Result<LinkInfo> {
            let mut links = self
                .handle
                .link()
                .get()
                .match_name(ifname.to_string())
                .execute();

            let link = links
                .next()
                .await
                .ok_or_else(|| Error::network(format!("no such interface: {}", ifname)))?
                .map_err(|e| Error::network(format!("link lookup for {}: {}", ifname, e)))?;

            let mut hwaddr = Vec::new();
            let mut mtu = 0;
            for attr in &link.attributes {
                match attr {
                    LinkAttribute::Address(bytes) => hwaddr = bytes.clone(),
                    LinkAttribute::Mtu(value) => mtu = *value,
                    _ => {}
                }
            }

            Ok(LinkInfo {
                index: link.header.index,
                hwaddr,
                mtu,
            })
        }

        async fn ifindex(&self, ifname: &str) -> Result<u32> {
            Ok(self.link_info(ifname).await?.index)
        }

        /// Find the kernel's address message for an exact address on an
        /// interface, needed to delete it
        async fn find_address(
            &self,
            ifindex: u32,
            address: Ipv4Addr,
        ) -> Result<Option<AddressMessage>> {
            let mut addresses = self
                .handle
                .address()
                .get()
                .set_link_index_filter(ifindex)
                .execute();

            while let Some(message) = addresses.next().await {
                let message =
                    message.map_err(|e| Error::network(format!("address dump: {}", e)))?;
                if message.header.family != AddressFamily::Inet {
                    continue;
                }
                let matches = message.attributes.iter().any(
                    |attr| matches!(attr, AddressAttribute::Address(IpAddr::V4(v4)) if *v4 == address),
                );
                if matches {
                    return Ok(Some(message));
                }
            }
            Ok(None)
        }

        fn route_message(
            &self,
            ifindex: u32,
            route: &Route,
            metric: u32,
        ) -> netlink_packet_route::route::RouteMessage {
            let mut builder = RouteMessageBuilder::<Ipv4Addr>::default()
                .destination_prefix(route.destination, prefix_len(route.netmask))
                .output_interface(ifindex);
            if !route.gateway.is_unspecified() {
                builder = builder.gateway(route.gateway);
            }
            let mut message = builder.build();
            if metric > 0 {
                message.attributes.push(RouteAttribute::Priority(metric));
            }
            message
        }
    }

    /// Whether a netlink error is the kernel saying "already there"
    fn is_eexist(err: &rtnetlink::Error) -> bool {
        matches!(
            err,
            rtnetlink::Error::NetlinkError(msg)
                if msg.code.map(|c| c.get()) == Some(-libc::EEXIST)
        )
    }

    #[async_trait]
    impl NetworkStack for NetlinkStack {
        async fn add_address(
            &self,
            ifname: &str,
            address: Ipv4Addr,
            netmask: Ipv4Addr,
            _broadcast: Ipv4Addr,
        ) -> Result<MutationOutcome> {
            let ifindex = self.ifindex(ifname).await?;

            match self
                .handle
                .address()
                .add(ifindex, IpAddr::V4(address), prefix_len(netmask))
                .execute()
                .await
            {
                Ok(()) => Ok(MutationOutcome::Applied),
                Err(e) if is_eexist(&e) => Ok(MutationOutcome::AlreadyPresent),
                Err(e) => Err(Error::network(format!(
                    "add address {} on {}: {}",
                    address, ifname, e
                ))),
            }
        }

        async fn del_address(
            &self,
            ifname: &str,
            address: Ipv4Addr,
            _netmask: Ipv4Addr,
        ) -> Result<()> {
            let ifindex = self.ifindex(ifname).await?;

            let Some(message) = self.find_address(ifindex, address).await? else {
                debug!("address {} not present on {}", address, ifname);
                return Ok(());
            };

            self.handle
                .address()
                .del(message)
                .execute()
                .await
                .map_err(|e| {
                    Error::network(format!("delete address {} on {}: {}", address, ifname, e))
                })
        }

        async fn add_route(
            &self,
            ifname: &str,
            route: &Route,
            metric: u32,
        ) -> Result<MutationOutcome> {
            let ifindex = self.ifindex(ifname).await?;
            let message = self.route_message(ifindex, route, metric);

            match self.handle.route().add(message).execute().await {
                Ok(()) => Ok(MutationOutcome::Applied),
                Err(e) if is_eexist(&e) => Ok(MutationOutcome::AlreadyPresent),
                Err(e) => Err(Error::network(format!(
                    "add route {} on {}: {}",
                    route, ifname, e
                ))),
            }
        }

        async fn del_route(&self, ifname: &str, route: &Route, metric: u32) -> Result<()> {
            let ifindex = self.ifindex(ifname).await?;
            let message = self.route_message(ifindex, route, metric);

            self.handle
                .route()
                .del(message)
                .execute()
                .await
                .map_err(|e| {
                    Error::network(format!("delete route {} on {}: {}", route, ifname, e))
                })
        }

        async fn set_mtu(&self, ifname: &str, mtu: u32) -> Result<()> {
            let ifindex = self.ifindex(ifname).await?;

            self.handle
                .link()
                .set(LinkUnspec::new_with_index(ifindex).mtu(mtu).build())
                .execute()
                .await
                .map_err(|e| Error::network(format!("set MTU {} on {}: {}", mtu, ifname, e)))
        }

        // The kernel registers the subnet route at metric 0 when an
        // address is added; it has to be re-registered at our metric so
        // a peer interface's subnet route cannot shadow it.
        fn wants_subnet_route_refresh(&self) -> bool {
            true
        }
    }
}

#[cfg(target_os = "linux")]
pub use linux::{LinkInfo, NetlinkStack};

/// Stub for non-Linux platforms; construction always fails
#[cfg(not(target_os = "linux"))]
mod stub {
    use super::unsupported;
    use async_trait::async_trait;
    use netlease_core::error::Result;
    use netlease_core::lease::Route;
    use netlease_core::traits::{MutationOutcome, NetworkStack};
    use std::net::Ipv4Addr;

    /// Identity of a network interface as the kernel sees it
    #[derive(Debug, Clone)]
    pub struct LinkInfo {
        pub index: u32,
        pub hwaddr: Vec<u8>,
        pub mtu: u32,
    }

    pub struct NetlinkStack;

    impl NetlinkStack {
        pub async fn new() -> Result<Self> {
            Err(unsupported())
        }

        pub async fn link_info(&self, _ifname: &str) -> Result<LinkInfo> {
            Err(unsupported())
        }
    }

    #[async_trait]
    impl NetworkStack for NetlinkStack {
        async fn add_address(
            &self,
            _ifname: &str,
            _address: Ipv4Addr,
            _netmask: Ipv4Addr,
            _broadcast: Ipv4Addr,
        ) -> Result<MutationOutcome> {
            Err(unsupported())
        }

        async fn del_address(
            &self,
            _ifname: &str,
            _address: Ipv4Addr,
            _netmask: Ipv4Addr,
        ) -> Result<()> {
            Err(unsupported())
        }

        async fn add_route(
            &self,
            _ifname: &str,
            _route: &Route,
            _metric: u32,
        ) -> Result<MutationOutcome> {
            Err(unsupported())
        }

        async fn del_route(&self, _ifname: &str, _route: &Route, _metric: u32) -> Result<()> {
            Err(unsupported())
        }

        async fn set_mtu(&self, _ifname: &str, _mtu: u32) -> Result<()> {
            Err(unsupported())
        }
    }
}

#[cfg(not(target_os = "linux"))]
fn unsupported() -> Error {
    Error::config("the netlink network stack is only supported on Linux")
}

#[cfg(not(target_os = "linux"))]
pub use stub::{LinkInfo, NetlinkStack};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_len_for_common_masks() {
        assert_eq!(prefix_len("255.255.255.0".parse().unwrap()), 24);
        assert_eq!(prefix_len("255.255.0.0".parse().unwrap()), 16);
        assert_eq!(prefix_len("255.255.255.255".parse().unwrap()), 32);
        assert_eq!(prefix_len("0.0.0.0".parse().unwrap()), 0);
    }
}
