//! Port reservation for in-process nodes.

use std::collections::HashSet;
use std::net::{SocketAddr, TcpListener};

use parking_lot::Mutex;

use crate::error::SimulationError;

/// Hands out listening sockets for simulated nodes.
///
/// A requested port of 0 binds an OS-assigned ephemeral port, falling back to
/// a scan of the configured range. The socket stays bound and is handed to
/// the node, so nothing can claim the port between reservation and serving.
#[derive(Debug)]
pub struct PortAllocator {
    range_start: u16,
    range_end: u16,
    allocated: Mutex<HashSet<u16>>,
}

impl Default for PortAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl PortAllocator {
    /// Allocator with the default fallback range (18000-19000).
    pub fn new() -> Self {
        Self::with_range(18000, 19000)
    }

    pub fn with_range(start: u16, end: u16) -> Self {
        Self {
            range_start: start,
            range_end: end,
            allocated: Mutex::new(HashSet::new()),
        }
    }

    /// Bind `host:port`, or an allocated port on `host` when `port` is 0.
    ///
    /// Binding the same explicit port twice through one allocator is a
    /// configuration error.
    pub fn bind(&self, host: &str, port: u16) -> Result<TcpListener, SimulationError> {
        if port == 0 {
            return self.bind_any(host);
        }

        let mut allocated = self.allocated.lock();
        if allocated.contains(&port) {
            return Err(SimulationError::Configuration(format!(
                "port {port} is assigned to more than one node"
            )));
        }
        let listener = TcpListener::bind((host, port))?;
        allocated.insert(port);
        Ok(listener)
    }

    fn bind_any(&self, host: &str) -> Result<TcpListener, SimulationError> {
        if let Some(listener) = Self::try_ephemeral(host) {
            let addr = listener.local_addr()?;
            self.allocated.lock().insert(addr.port());
            return Ok(listener);
        }
        self.try_range(host).ok_or(SimulationError::PortExhausted)
    }

    fn try_ephemeral(host: &str) -> Option<TcpListener> {
        TcpListener::bind((host, 0)).ok()
    }

    fn try_range(&self, host: &str) -> Option<TcpListener> {
        let mut allocated = self.allocated.lock();

        for port in self.range_start..self.range_end {
            if allocated.contains(&port) {
                continue;
            }
            if let Ok(listener) = TcpListener::bind((host, port)) {
                allocated.insert(port);
                return Some(listener);
            }
        }

        None
    }

    /// Reserve an ephemeral port on `127.0.0.1` without keeping it bound.
    pub fn allocate(&self) -> Option<SocketAddr> {
        let listener = self.bind_any("127.0.0.1").ok()?;
        listener.local_addr().ok()
    }

    /// Release a previously allocated port.
    pub fn release(&self, port: u16) {
        self.allocated.lock().remove(&port);
    }

    pub fn is_allocated(&self, port: u16) -> bool {
        self.allocated.lock().contains(&port)
    }

    pub fn allocated_count(&self) -> usize {
        self.allocated.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ephemeral_binds_are_unique() {
        let allocator = PortAllocator::new();

        let first = allocator.bind("127.0.0.1", 0).unwrap();
        let second = allocator.bind("127.0.0.1", 0).unwrap();

        let a = first.local_addr().unwrap().port();
        let b = second.local_addr().unwrap().port();
        assert_ne!(a, b);
        assert!(allocator.is_allocated(a));
        assert!(allocator.is_allocated(b));
        assert_eq!(allocator.allocated_count(), 2);
    }

    #[test]
    fn explicit_port_is_bound_as_requested() {
        let port = PortAllocator::new().allocate().unwrap().port();

        let allocator = PortAllocator::new();
        let listener = allocator.bind("127.0.0.1", port).unwrap();
        assert_eq!(listener.local_addr().unwrap().port(), port);
    }

    #[test]
    fn duplicate_explicit_port_is_rejected() {
        let allocator = PortAllocator::new();
        let listener = allocator.bind("127.0.0.1", 0).unwrap();
        let port = listener.local_addr().unwrap().port();

        let err = allocator.bind("127.0.0.1", port).unwrap_err();
        assert!(matches!(err, SimulationError::Configuration(_)));
    }

    #[test]
    fn release_allows_reuse() {
        let allocator = PortAllocator::new();
        let addr = allocator.allocate().unwrap();

        assert!(allocator.is_allocated(addr.port()));
        allocator.release(addr.port());
        assert!(!allocator.is_allocated(addr.port()));
    }
}
