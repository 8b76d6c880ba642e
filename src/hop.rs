use std::net::Ipv4Addr;
use std::time::Duration;

/// What a single hop told us.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HopOutcome {
    /// The destination sent an Echo Reply
    Reached,
    /// A router sent Time Exceeded
    Forwarded,
    /// A router or the destination sent Destination Unreachable with this code
    Unreachable { code: u8 },
    /// Nothing matching arrived before the deadline
    Timeout,
}

/// Metadata of the reply that answered a probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplyInfo {
    /// TTL the reply arrived with
    pub ttl: u8,
    /// Local address the reply was sent to
    pub destination: Ipv4Addr,
    /// Index of the interface it arrived on, when the platform reports it
    pub interface: Option<u32>,
}

/// Result of probing one TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HopResult {
    /// Hop number, equal to the TTL of the probe
    pub hop: u8,
    /// Who answered. `None` on timeout.
    pub responder: Option<Ipv4Addr>,
    /// Time from send until the matching reply, or until the deadline on timeout
    pub rtt: Duration,
    pub outcome: HopOutcome,
    /// `None` on timeout
    pub reply: Option<ReplyInfo>,
}

impl HopResult {
    pub fn timed_out(hop: u8, waited: Duration) -> Self {
        Self {
            hop,
            responder: None,
            rtt: waited,
            outcome: HopOutcome::Timeout,
            reply: None,
        }
    }

    pub fn is_reached(&self) -> bool {
        self.outcome == HopOutcome::Reached
    }

    pub fn is_unreachable(&self) -> bool {
        matches!(self.outcome, HopOutcome::Unreachable { .. })
    }
}
