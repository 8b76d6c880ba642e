//! One TTL's worth of probing.
//!
//! Sends one Echo Request and reads until a reply correlates with it or the
//! deadline passes: `Sending -> AwaitingReply -> {Matched, TimedOut}`.

use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::classify::{Probe, classify};
use crate::codec::{self, Envelope};
use crate::config::TraceConfig;
use crate::error::TraceResult;
use crate::hop::{HopOutcome, HopResult, ReplyInfo};
use crate::transport::{ControlInfo, Transport};

/// Large enough for any reply on an Ethernet-sized path
const RECV_BUFFER_SIZE: usize = 1500;

/// Sends probes for one trace and waits for their answers.
#[derive(Debug)]
pub struct Prober {
    identifier: u16,
    payload: Vec<u8>,
    timeout: Duration,
    buffer: Vec<u8>,
}

impl Prober {
    pub fn new(identifier: u16, payload: Vec<u8>, timeout: Duration) -> Self {
        Self {
            identifier,
            payload,
            timeout,
            buffer: vec![0u8; RECV_BUFFER_SIZE],
        }
    }

    pub fn from_config(config: &TraceConfig) -> Self {
        Self::new(
            config.identifier,
            codec::payload(config.payload_size),
            config.timeout,
        )
    }

    pub fn identifier(&self) -> u16 {
        self.identifier
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Probe `destination` with one Echo Request at `ttl`.
    ///
    /// Timeouts and Destination Unreachable are results. Only transport
    /// failures are errors.
    pub fn probe<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
        destination: Ipv4Addr,
        ttl: u8,
        sequence: u16,
    ) -> TraceResult<HopResult> {
        let probe = Probe::new(self.identifier, sequence, &self.payload)?;

        transport.set_ttl(ttl)?;
        debug!(ttl, seq = sequence, id = self.identifier, %destination, "Sending probe");
        let sent_at = Instant::now();
        transport.send_to(&probe.packet, destination)?;
        let deadline = sent_at + self.timeout;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                debug!(ttl, "Timeout waiting for response");
                return Ok(HopResult::timed_out(ttl, sent_at.elapsed()));
            }

            let Some(received) = transport.recv_from(&mut self.buffer, remaining)? else {
                continue;
            };
            let datagram = &self.buffer[..received.len];

            match correlate(datagram, &probe) {
                Ok((outcome, envelope)) => {
                    let rtt = sent_at.elapsed();
                    let reply = reply_info(&envelope, &received.control);
                    debug!(
                        ttl,
                        responder = %envelope.source,
                        reply_ttl = reply.ttl,
                        interface = ?reply.interface,
                        rtt_ms = rtt.as_secs_f64() * 1000.0,
                        ?outcome,
                        "Received probe response"
                    );
                    return Ok(HopResult {
                        hop: ttl,
                        responder: Some(envelope.source),
                        rtt,
                        outcome,
                        reply: Some(reply),
                    });
                }
                Err(e) if e.is_retryable() => {
                    trace!(peer = %received.peer, error = %e, "Skipping packet");
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn correlate(datagram: &[u8], probe: &Probe) -> TraceResult<(HopOutcome, Envelope)> {
    let (envelope, icmp) = Envelope::parse(datagram)?;
    let message = codec::decode(icmp)?;
    let outcome = classify(&message, probe)?;
    Ok((outcome, envelope))
}

/// Prefer what the kernel reported; the IPv4 header fills the gaps.
fn reply_info(envelope: &Envelope, control: &ControlInfo) -> ReplyInfo {
    ReplyInfo {
        ttl: control.ttl.unwrap_or(envelope.ttl),
        destination: control.destination.unwrap_or(envelope.destination),
        interface: control.interface,
    }
}
