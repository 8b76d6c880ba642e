//! Scripted transport and packet builders shared by the unit tests.

use std::collections::VecDeque;
use std::net::Ipv4Addr;
use std::time::Duration;

use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv4::{self, MutableIpv4Packet};
use pnet::util;

use crate::codec::IPV4_HEADER_SIZE;
use crate::error::{TraceError, TraceResult};
use crate::transport::{ControlInfo, Received, Transport};

pub const LOCAL: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 20);
pub const TARGET: Ipv4Addr = Ipv4Addr::new(8, 8, 8, 8);

/// Address of the router at `hop` in the fake path
pub fn router(hop: u8) -> Ipv4Addr {
    Ipv4Addr::new(10, 0, 0, hop)
}

/// Wrap an ICMP message in an IPv4 header
pub fn wrap_ipv4(source: Ipv4Addr, destination: Ipv4Addr, ttl: u8, icmp: &[u8]) -> Vec<u8> {
    let mut buffer = vec![0u8; IPV4_HEADER_SIZE + icmp.len()];
    {
        let mut packet = MutableIpv4Packet::new(&mut buffer).unwrap();
        packet.set_version(4);
        packet.set_header_length(5);
        packet.set_total_length((IPV4_HEADER_SIZE + icmp.len()) as u16);
        packet.set_ttl(ttl);
        packet.set_next_level_protocol(IpNextHeaderProtocols::Icmp);
        packet.set_source(source);
        packet.set_destination(destination);
        packet.set_payload(icmp);
        let checksum = ipv4::checksum(&packet.to_immutable());
        packet.set_checksum(checksum);
    }
    buffer
}

/// ICMP error of `icmp_type`/`code` quoting `probe` as it left this host
pub fn icmp_error(icmp_type: u8, code: u8, probe: &[u8]) -> Vec<u8> {
    let mut icmp = vec![icmp_type, code, 0, 0, 0, 0, 0, 0];
    icmp.extend_from_slice(&wrap_ipv4(LOCAL, TARGET, 1, probe));
    let checksum = util::checksum(&icmp, 1);
    icmp[2..4].copy_from_slice(&checksum.to_be_bytes());
    icmp
}

/// Echo Reply mirroring an Echo Request
pub fn echo_reply(probe: &[u8]) -> Vec<u8> {
    let mut reply = probe.to_vec();
    reply[0] = 0;
    reply[2..4].fill(0);
    let checksum = util::checksum(&reply, 1);
    reply[2..4].copy_from_slice(&checksum.to_be_bytes());
    reply
}

type Script = Box<dyn FnMut(u8, &[u8]) -> Vec<(Ipv4Addr, Vec<u8>)>>;

/// In-memory transport. Every send runs the script, which returns the
/// datagrams (peer, IPv4 bytes) the network answers with.
pub struct ScriptedTransport {
    ttl: u8,
    script: Script,
    inbox: VecDeque<(Ipv4Addr, Vec<u8>)>,
    /// (ttl, packet) for every send
    pub sent: Vec<(u8, Vec<u8>)>,
    /// Fail sends from this TTL on
    pub fail_send_at: Option<u8>,
    /// Attached to every datagram handed out
    pub control: ControlInfo,
}

impl ScriptedTransport {
    pub fn new(script: impl FnMut(u8, &[u8]) -> Vec<(Ipv4Addr, Vec<u8>)> + 'static) -> Self {
        Self {
            ttl: 0,
            script: Box::new(script),
            inbox: VecDeque::new(),
            sent: Vec::new(),
            fail_send_at: None,
            control: ControlInfo::default(),
        }
    }

    /// Network where hops below `dest_hop` answer Time Exceeded and
    /// `dest_hop` answers with an Echo Reply
    pub fn path(dest_hop: u8) -> Self {
        Self::new(move |ttl, probe| {
            if ttl < dest_hop {
                let icmp = icmp_error(11, 0, probe);
                vec![(router(ttl), wrap_ipv4(router(ttl), LOCAL, 64, &icmp))]
            } else {
                vec![(TARGET, wrap_ipv4(TARGET, LOCAL, 64, &echo_reply(probe)))]
            }
        })
    }

    pub fn sent_ttls(&self) -> Vec<u8> {
        self.sent.iter().map(|(ttl, _)| *ttl).collect()
    }
}

impl Transport for ScriptedTransport {
    fn set_ttl(&mut self, ttl: u8) -> TraceResult<()> {
        self.ttl = ttl;
        Ok(())
    }

    fn send_to(&mut self, packet: &[u8], _destination: Ipv4Addr) -> TraceResult<()> {
        if self.fail_send_at.is_some_and(|ttl| self.ttl >= ttl) {
            return Err(TraceError::Send {
                ttl: self.ttl,
                source: std::io::Error::other("network is unreachable"),
            });
        }
        self.sent.push((self.ttl, packet.to_vec()));
        let replies = (self.script)(self.ttl, packet);
        self.inbox.extend(replies);
        Ok(())
    }

    fn recv_from(&mut self, buf: &mut [u8], timeout: Duration) -> TraceResult<Option<Received>> {
        match self.inbox.pop_front() {
            Some((peer, datagram)) => {
                let len = datagram.len().min(buf.len());
                buf[..len].copy_from_slice(&datagram[..len]);
                Ok(Some(Received {
                    len,
                    peer,
                    control: self.control,
                }))
            }
            None => {
                std::thread::sleep(timeout);
                Ok(None)
            }
        }
    }
}
