//! ICMPv4 Echo encoding and inbound message decoding using pnet.

use std::net::Ipv4Addr;

use pnet::packet::Packet;
use pnet::packet::icmp::echo_reply::EchoReplyPacket;
use pnet::packet::icmp::echo_request::{EchoRequestPacket, MutableEchoRequestPacket};
use pnet::packet::icmp::{IcmpCode, IcmpPacket, IcmpType, IcmpTypes};
use pnet::packet::ipv4::Ipv4Packet;
use pnet::util;

use crate::error::{TraceError, TraceResult};

/// ICMP header size (fixed)
pub const ICMP_HEADER_SIZE: usize = 8;
/// Default probe payload size
pub const DEFAULT_PAYLOAD_SIZE: usize = 16;
/// Minimum IPv4 header size (IHL = 5)
pub const IPV4_HEADER_SIZE: usize = 20;

// Highest defined codes for the error messages we understand (RFC 792, RFC 1812)
const MAX_TIME_EXCEEDED_CODE: u8 = 1;
const MAX_DEST_UNREACHABLE_CODE: u8 = 15;

/// Get process identifier for the ICMP identification field
pub fn process_identifier() -> u16 {
    (std::process::id() & 0xffff) as u16
}

/// Build a probe payload of `size` bytes filled with a repeating pattern
pub fn payload(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i & 0xff) as u8).collect()
}

/// Which half of the Echo pair a message is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EchoKind {
    Request,
    Reply,
}

/// An Echo Request or Echo Reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Echo {
    pub kind: EchoKind,
    pub identifier: u16,
    pub sequence: u16,
    pub payload: Vec<u8>,
}

/// The part of an ICMP error message that quotes the datagram which triggered it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quote {
    /// Original IP header plus as much of the original ICMP message as the
    /// router chose to include.
    pub datagram: Vec<u8>,
    /// RFC 4884 extension structure, if the sender declared one.
    pub extensions: Vec<u8>,
}

impl Quote {
    /// Split an error message body (everything after the 8 byte header).
    ///
    /// Byte 5 of the header is the RFC 4884 length of the quoted datagram in
    /// 32-bit words. Zero means legacy layout: the whole body is the quote.
    fn from_error_message(bytes: &[u8]) -> Self {
        let body = &bytes[ICMP_HEADER_SIZE..];
        let declared = bytes[5] as usize * 4;

        if declared > 0 && declared <= body.len() {
            Self {
                datagram: body[..declared].to_vec(),
                extensions: body[declared..].to_vec(),
            }
        } else {
            Self {
                datagram: body.to_vec(),
                extensions: Vec::new(),
            }
        }
    }
}

/// Body of an inbound ICMP message, by type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageBody {
    Echo(Echo),
    TimeExceeded(Quote),
    DestinationUnreachable(Quote),
    /// Any ICMP type a traceroute has no use for. Holds the full message.
    Other { icmp_type: u8, bytes: Vec<u8> },
}

/// A decoded ICMP message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IcmpMessage {
    pub code: u8,
    pub body: MessageBody,
}

impl IcmpMessage {
    /// Wire value of the ICMP type field.
    pub fn icmp_type(&self) -> u8 {
        match &self.body {
            MessageBody::Echo(echo) => match echo.kind {
                EchoKind::Request => IcmpTypes::EchoRequest.0,
                EchoKind::Reply => IcmpTypes::EchoReply.0,
            },
            MessageBody::TimeExceeded(_) => IcmpTypes::TimeExceeded.0,
            MessageBody::DestinationUnreachable(_) => IcmpTypes::DestinationUnreachable.0,
            MessageBody::Other { icmp_type, .. } => *icmp_type,
        }
    }
}

/// Build an ICMP Echo Request packet
///
/// Layout: type 8, code 0, RFC 1071 checksum, identifier, sequence, payload.
pub fn encode(identifier: u16, sequence: u16, payload: &[u8]) -> TraceResult<Vec<u8>> {
    let mut buffer = vec![0u8; ICMP_HEADER_SIZE + payload.len()];

    {
        let mut packet = MutableEchoRequestPacket::new(&mut buffer).ok_or_else(|| {
            TraceError::MalformedPacket("Failed to create echo request packet".to_string())
        })?;
        packet.set_icmp_type(IcmpTypes::EchoRequest);
        packet.set_icmp_code(IcmpCode::new(0));
        packet.set_identifier(identifier);
        packet.set_sequence_number(sequence);
        packet.set_payload(payload);
    }

    // Skip word 1, the checksum field itself
    let checksum = util::checksum(&buffer, 1);
    buffer[2..4].copy_from_slice(&checksum.to_be_bytes());

    Ok(buffer)
}

/// Parse raw ICMP bytes (no IP header) into a typed message.
pub fn decode(bytes: &[u8]) -> TraceResult<IcmpMessage> {
    if bytes.len() < ICMP_HEADER_SIZE {
        return Err(TraceError::MalformedPacket(format!(
            "ICMP message too short: expected at least {} bytes, got {}",
            ICMP_HEADER_SIZE,
            bytes.len()
        )));
    }

    let packet = IcmpPacket::new(bytes)
        .ok_or_else(|| TraceError::MalformedPacket("Failed to parse ICMP header".to_string()))?;
    let icmp_type = packet.get_icmp_type();
    let code = packet.get_icmp_code().0;

    let body = match icmp_type {
        IcmpTypes::EchoReply => {
            check_code(icmp_type, code, 0)?;
            MessageBody::Echo(decode_echo(bytes, EchoKind::Reply)?)
        }
        IcmpTypes::EchoRequest => {
            check_code(icmp_type, code, 0)?;
            MessageBody::Echo(decode_echo(bytes, EchoKind::Request)?)
        }
        IcmpTypes::TimeExceeded => {
            check_code(icmp_type, code, MAX_TIME_EXCEEDED_CODE)?;
            MessageBody::TimeExceeded(Quote::from_error_message(bytes))
        }
        IcmpTypes::DestinationUnreachable => {
            check_code(icmp_type, code, MAX_DEST_UNREACHABLE_CODE)?;
            MessageBody::DestinationUnreachable(Quote::from_error_message(bytes))
        }
        other => MessageBody::Other {
            icmp_type: other.0,
            bytes: bytes.to_vec(),
        },
    };

    Ok(IcmpMessage { code, body })
}

fn check_code(icmp_type: IcmpType, code: u8, max: u8) -> TraceResult<()> {
    if code > max {
        return Err(TraceError::MalformedPacket(format!(
            "Unknown code {} for ICMP type {}",
            code, icmp_type.0
        )));
    }
    Ok(())
}

fn decode_echo(bytes: &[u8], kind: EchoKind) -> TraceResult<Echo> {
    let malformed = || TraceError::MalformedPacket("Failed to parse echo message".to_string());

    let (identifier, sequence, payload) = match kind {
        EchoKind::Reply => {
            let packet = EchoReplyPacket::new(bytes).ok_or_else(malformed)?;
            (
                packet.get_identifier(),
                packet.get_sequence_number(),
                packet.payload().to_vec(),
            )
        }
        EchoKind::Request => {
            let packet = EchoRequestPacket::new(bytes).ok_or_else(malformed)?;
            (
                packet.get_identifier(),
                packet.get_sequence_number(),
                packet.payload().to_vec(),
            )
        }
    };

    Ok(Echo {
        kind,
        identifier,
        sequence,
        payload,
    })
}

/// Header fields of the IPv4 datagram that carried an inbound ICMP message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Envelope {
    pub source: Ipv4Addr,
    pub destination: Ipv4Addr,
    /// TTL remaining when the reply reached us
    pub ttl: u8,
}

impl Envelope {
    /// Split a datagram read from a raw IPv4 socket into its header fields
    /// and the ICMP bytes it carries.
    pub fn parse(datagram: &[u8]) -> TraceResult<(Envelope, &[u8])> {
        let ip = Ipv4Packet::new(datagram).ok_or_else(|| {
            TraceError::MalformedPacket(format!(
                "IPv4 datagram too short: {} bytes",
                datagram.len()
            ))
        })?;

        if ip.get_version() != 4 {
            return Err(TraceError::MalformedPacket(format!(
                "Not an IPv4 datagram (version {})",
                ip.get_version()
            )));
        }

        // The kernel may rewrite total_length on some platforms, so only the
        // IHL is trusted here.
        let header_len = ip.get_header_length() as usize * 4;
        if header_len < IPV4_HEADER_SIZE || header_len > datagram.len() {
            return Err(TraceError::MalformedPacket(format!(
                "Bad IPv4 header length {} for a {} byte datagram",
                header_len,
                datagram.len()
            )));
        }

        let envelope = Envelope {
            source: ip.get_source(),
            destination: ip.get_destination(),
            ttl: ip.get_ttl(),
        };

        Ok((envelope, &datagram[header_len..]))
    }
}
