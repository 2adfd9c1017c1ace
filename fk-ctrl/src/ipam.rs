use std::net::Ipv4Addr;
use std::sync::Mutex;

use fk_core::errors::*;
use ipnet::Ipv4Net;
use tracing::*;

err_impl! {IpamError,
    #[error("IP pool exhausted in {0}")]
    PoolExhausted(String),
}

// Hands out pod addresses.  Allocate and release are serialized internally
// and never block beyond the lock; an allocation failure surfaces in the
// pod's status and is retried on the next event for that pod.
#[cfg_attr(test, mockall::automock)]
pub trait IpAllocator: Send + Sync {
    fn allocate(&self, ns_name: &str) -> anyhow::Result<Ipv4Addr>;
    fn release(&self, ns_name: &str, ip: Ipv4Addr);

    // Marks an address that is already assigned in the cluster as used, so
    // state can be rebuilt from the live pod set after a restart.
    fn reserve(&self, ip: Ipv4Addr);
}

// First-fit bitmap over a single CIDR; the network and broadcast addresses
// are never handed out.
pub struct CidrAllocator {
    net: Ipv4Net,
    used: Mutex<Vec<u64>>,
}

impl CidrAllocator {
    pub fn new(net: Ipv4Net) -> CidrAllocator {
        let size = 1u64 << (32 - net.prefix_len());
        CidrAllocator {
            net,
            used: Mutex::new(vec![0; (size as usize).div_ceil(64)]),
        }
    }

    // Host addresses sit at offsets [1, size - 2] from the network address;
    // anything outside that is not allocatable.
    fn offset_of(&self, ip: Ipv4Addr) -> Option<u64> {
        let size = 1u64 << (32 - self.net.prefix_len());
        let offset = (u32::from(ip) as u64).checked_sub(u32::from(self.net.network()) as u64)?;
        (1..size.saturating_sub(1)).contains(&offset).then_some(offset)
    }

    fn addr_at(&self, offset: u64) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.net.network()) + offset as u32)
    }
}

impl IpAllocator for CidrAllocator {
    fn allocate(&self, ns_name: &str) -> anyhow::Result<Ipv4Addr> {
        let size = 1u64 << (32 - self.net.prefix_len());
        let mut used = self.used.lock().unwrap();
        for offset in 1..size.saturating_sub(1) {
            let (word, bit) = ((offset / 64) as usize, offset % 64);
            if used[word] & (1 << bit) == 0 {
                used[word] |= 1 << bit;
                let ip = self.addr_at(offset);
                debug!("allocated {ip} to {ns_name}");
                return Ok(ip);
            }
        }
        Err(IpamError::pool_exhausted(&self.net.to_string()))
    }

    fn release(&self, ns_name: &str, ip: Ipv4Addr) {
        let Some(offset) = self.offset_of(ip) else {
            warn!("{ns_name} released {ip}, which is outside {}", self.net);
            return;
        };
        let (word, bit) = ((offset / 64) as usize, offset % 64);
        let mut used = self.used.lock().unwrap();
        if used[word] & (1 << bit) == 0 {
            warn!("{ns_name} released {ip}, which was not allocated");
        }
        used[word] &= !(1 << bit);
    }

    fn reserve(&self, ip: Ipv4Addr) {
        if let Some(offset) = self.offset_of(ip) {
            let (word, bit) = ((offset / 64) as usize, offset % 64);
            self.used.lock().unwrap()[word] |= 1 << bit;
        }
    }
}

// Allocation through the host's CNI plug-ins ships as a separate plug-in
// binary; this build only carries the capability probe, so requesting it
// fails startup validation.
pub fn cni_supported() -> bool {
    false
}
