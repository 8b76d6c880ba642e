//! ICMP Echo traceroute.
//!
//! Probes a destination with Echo Requests of increasing TTL and classifies
//! the Time Exceeded, Destination Unreachable and Echo Reply messages that
//! come back, one hop at a time.

pub mod classify;
pub mod codec;
pub mod config;
pub mod error;
pub mod hop;
pub mod probe;
pub mod resolve;
pub mod trace;
pub mod transport;

#[cfg(test)]
mod testing;

pub use config::TraceConfig;
pub use error::{TraceError, TraceResult};
pub use hop::{HopOutcome, HopResult, ReplyInfo};
pub use trace::Trace;
pub use transport::{ControlInfo, RawSocket, Received, Transport};

use tracing::info;

/// Resolve `host`, open a raw ICMP socket and return the hop iterator.
///
/// Resolution happens first: a host without an IPv4 address fails before
/// any socket is opened.
pub fn traceroute(host: &str, config: &TraceConfig) -> TraceResult<Trace<RawSocket>> {
    config.validate()?;

    let destination = resolve::resolve(host)?;
    info!(host, %destination, max_hops = config.max_hops, "Tracing route");

    let socket = RawSocket::open()?;
    Trace::new(socket, destination, config)
}
