use std::time::Duration;

use crate::codec::{self, DEFAULT_PAYLOAD_SIZE, ICMP_HEADER_SIZE, IPV4_HEADER_SIZE};
use crate::error::{TraceError, TraceResult};

/// Default hop ceiling
pub const DEFAULT_MAX_HOPS: u8 = 64;
/// Default per-hop receive deadline
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);
/// Largest payload that still fits one IPv4 datagram
pub const MAX_PAYLOAD_SIZE: usize = u16::MAX as usize - IPV4_HEADER_SIZE - ICMP_HEADER_SIZE;

/// Settings for one trace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceConfig {
    /// Highest TTL to probe
    pub max_hops: u8,
    /// TTL of the first probe
    pub first_hop: u8,
    /// How long to wait for a matching reply to each probe
    pub timeout: Duration,
    /// Echo payload bytes per probe
    pub payload_size: usize,
    /// ICMP identifier shared by every probe of the trace
    pub identifier: u16,
    /// End the trace at the first Destination Unreachable
    pub stop_on_unreachable: bool,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            max_hops: DEFAULT_MAX_HOPS,
            first_hop: 1,
            timeout: DEFAULT_TIMEOUT,
            payload_size: DEFAULT_PAYLOAD_SIZE,
            identifier: codec::process_identifier(),
            stop_on_unreachable: true,
        }
    }
}

impl TraceConfig {
    pub fn validate(&self) -> TraceResult<()> {
        if self.max_hops == 0 {
            return Err(TraceError::InvalidConfig(
                "max hops must be at least 1".to_string(),
            ));
        }
        if self.first_hop == 0 || self.first_hop > self.max_hops {
            return Err(TraceError::InvalidConfig(format!(
                "first hop must be between 1 and {}, got {}",
                self.max_hops, self.first_hop
            )));
        }
        if self.timeout.is_zero() {
            return Err(TraceError::InvalidConfig(
                "timeout must be greater than zero".to_string(),
            ));
        }
        if self.payload_size > MAX_PAYLOAD_SIZE {
            return Err(TraceError::InvalidConfig(format!(
                "payload size must be at most {}, got {}",
                MAX_PAYLOAD_SIZE, self.payload_size
            )));
        }
        Ok(())
    }
}
