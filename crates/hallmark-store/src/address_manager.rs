//! Address manager -- local listen addresses plus capped observed-address
//! learning.
//!
//! Observed addresses come from remote peers' identify responses and tell
//! this node what its public-facing address looks like. Retention is capped
//! so a flood of bogus observations cannot grow memory; excess observations
//! are dropped silently.

use multiaddr::Multiaddr;
use parking_lot::RwLock;

/// Local listen/observed address registry.
pub trait AddressManager: Send + Sync {
    /// Current listen addresses.
    fn addresses(&self) -> Vec<Multiaddr>;

    /// Addresses remote peers have reported seeing this node at.
    fn observed_addresses(&self) -> Vec<Multiaddr>;

    /// Record one observation, subject to the retention cap.
    fn add_observed_address(&self, addr: Multiaddr);
}

/// In-memory manager with a hard observed-address cap.
pub struct MemoryAddressManager {
    listen: RwLock<Vec<Multiaddr>>,
    observed: RwLock<Vec<Multiaddr>>,
    max_observed: usize,
}

impl MemoryAddressManager {
    pub fn new(listen: Vec<Multiaddr>, max_observed: usize) -> Self {
        Self {
            listen: RwLock::new(listen),
            observed: RwLock::new(Vec::new()),
            max_observed,
        }
    }

    /// Replace the listen addresses.
    pub fn set_addresses(&self, addrs: Vec<Multiaddr>) {
        *self.listen.write() = addrs;
    }
}

impl AddressManager for MemoryAddressManager {
    fn addresses(&self) -> Vec<Multiaddr> {
        self.listen.read().clone()
    }

    fn observed_addresses(&self) -> Vec<Multiaddr> {
        self.observed.read().clone()
    }

    fn add_observed_address(&self, addr: Multiaddr) {
        let mut observed = self.observed.write();
        if observed.contains(&addr) {
            return;
        }
        if observed.len() >= self.max_observed {
            tracing::debug!(%addr, "address manager: observed cap reached, dropping");
            return;
        }
        tracing::debug!(%addr, "address manager: observed address recorded");
        observed.push(addr);
    }
}
