//! Correlate inbound ICMP messages with the probe we are waiting on.
//!
//! A raw ICMP socket receives every ICMP packet delivered to the host, so
//! most of what the probe loop reads belongs to someone else: other pings,
//! other traceroutes, our own earlier probes. Correlation is purely by the
//! (identifier, sequence) pair of the Echo Request.

use tracing::{debug, trace};

use crate::codec::{self, Echo, EchoKind, IcmpMessage, MessageBody, Quote};
use crate::error::{TraceError, TraceResult};
use crate::hop::HopOutcome;

/// An outbound Echo Request as it went on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Probe {
    pub identifier: u16,
    pub sequence: u16,
    pub packet: Vec<u8>,
}

impl Probe {
    pub fn new(identifier: u16, sequence: u16, payload: &[u8]) -> TraceResult<Self> {
        Ok(Self {
            identifier,
            sequence,
            packet: codec::encode(identifier, sequence, payload)?,
        })
    }

    /// Serialized length of the probe
    pub fn len(&self) -> usize {
        self.packet.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packet.is_empty()
    }

    fn is_answered_by(&self, echo: &Echo) -> bool {
        echo.identifier == self.identifier && echo.sequence == self.sequence
    }
}

/// Decide whether `message` answers `probe`, and what it means if it does.
///
/// Returns `NonMatchingPacket` for anything that is not ours. That error is
/// retryable: the caller keeps reading until a match or its deadline.
pub fn classify(message: &IcmpMessage, probe: &Probe) -> TraceResult<HopOutcome> {
    match &message.body {
        MessageBody::Echo(echo) if echo.kind == EchoKind::Reply => {
            if probe.is_answered_by(echo) {
                Ok(HopOutcome::Reached)
            } else {
                trace!(
                    expected_id = probe.identifier,
                    expected_seq = probe.sequence,
                    id = echo.identifier,
                    seq = echo.sequence,
                    "Ignored Echo Reply for another probe"
                );
                Err(TraceError::NonMatchingPacket)
            }
        }
        MessageBody::Echo(echo) => {
            trace!(
                id = echo.identifier,
                seq = echo.sequence,
                "Ignored Echo Request"
            );
            Err(TraceError::NonMatchingPacket)
        }
        MessageBody::TimeExceeded(quote) => {
            match_quote(quote, probe)?;
            Ok(HopOutcome::Forwarded)
        }
        MessageBody::DestinationUnreachable(quote) => {
            match_quote(quote, probe)?;
            debug!(
                code = message.code,
                seq = probe.sequence,
                "Destination or path rejected the probe"
            );
            Ok(HopOutcome::Unreachable { code: message.code })
        }
        MessageBody::Other { icmp_type, .. } => {
            trace!(icmp_type = *icmp_type, code = message.code, "Ignored ICMP message");
            Err(TraceError::NonMatchingPacket)
        }
    }
}

/// Check that the datagram quoted in an ICMP error is our probe.
///
/// The probe is assumed to be the last `probe.len()` bytes of the quote,
/// which holds as long as the router quoted the original datagram in full
/// and without padding. RFC 4884 quotes are zero-padded to 128 bytes, so a
/// probe shorter than that is never found in one.
fn match_quote(quote: &Quote, probe: &Probe) -> TraceResult<()> {
    let quoted = &quote.datagram;
    if quoted.len() < probe.len() {
        trace!(
            quoted = quoted.len(),
            needed = probe.len(),
            "Quote too short to hold the probe"
        );
        return Err(TraceError::NonMatchingPacket);
    }

    let tail = &quoted[quoted.len() - probe.len()..];
    let original = match codec::decode(tail) {
        Ok(message) => message,
        Err(e) => {
            trace!(error = %e, "Quote does not contain an ICMP message");
            return Err(TraceError::NonMatchingPacket);
        }
    };

    match original.body {
        MessageBody::Echo(echo) if echo.kind == EchoKind::Request && probe.is_answered_by(&echo) => {
            Ok(())
        }
        MessageBody::Echo(echo) => {
            trace!(
                expected_id = probe.identifier,
                expected_seq = probe.sequence,
                id = echo.identifier,
                seq = echo.sequence,
                "Quote belongs to another probe"
            );
            Err(TraceError::NonMatchingPacket)
        }
        _ => {
            trace!("Quote is not an Echo Request");
            Err(TraceError::NonMatchingPacket)
        }
    }
}
