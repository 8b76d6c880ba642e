//! End-to-end tests for the probe -> classify -> hop pipeline
//!
//! A scripted transport stands in for the raw socket and plays the part of
//! the network, so no privileges or network access are needed.

use std::collections::VecDeque;
use std::net::Ipv4Addr;
use std::time::Duration;

use pathfinder::codec::{self, IPV4_HEADER_SIZE};
use pathfinder::{
    ControlInfo, HopOutcome, Received, Trace, TraceConfig, TraceError, TraceResult, Transport,
};
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv4::MutableIpv4Packet;

const LOCAL: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 20);
const TARGET: Ipv4Addr = Ipv4Addr::new(203, 0, 113, 80);
const IDENTIFIER: u16 = 0x5A5A;

fn router(hop: u8) -> Ipv4Addr {
    Ipv4Addr::new(172, 16, hop, 1)
}

fn wrap_ipv4(source: Ipv4Addr, icmp: &[u8]) -> Vec<u8> {
    let mut buffer = vec![0u8; IPV4_HEADER_SIZE + icmp.len()];
    let mut packet = MutableIpv4Packet::new(&mut buffer).unwrap();
    packet.set_version(4);
    packet.set_header_length(5);
    packet.set_total_length((IPV4_HEADER_SIZE + icmp.len()) as u16);
    packet.set_ttl(250);
    packet.set_next_level_protocol(IpNextHeaderProtocols::Icmp);
    packet.set_source(source);
    packet.set_destination(LOCAL);
    packet.set_payload(icmp);
    buffer
}

/// ICMP error quoting the probe behind its original IPv4 header
fn quoting(icmp_type: u8, code: u8, probe: &[u8]) -> Vec<u8> {
    let mut icmp = vec![icmp_type, code, 0, 0, 0, 0, 0, 0];
    let mut original = wrap_ipv4(LOCAL, probe);
    original[16..20].copy_from_slice(&TARGET.octets());
    icmp.extend_from_slice(&original);
    icmp
}

fn reply_to(probe: &[u8]) -> Vec<u8> {
    let mut reply = probe.to_vec();
    reply[0] = 0;
    reply
}

/// Simulated path: `route[i]` answers the probe with TTL i + 1.
#[derive(Clone, Copy)]
enum Hop {
    Router,
    Silent,
    Rejects(u8),
    Destination,
}

struct Network {
    route: Vec<Hop>,
    ttl: u8,
    inbox: VecDeque<(Ipv4Addr, Vec<u8>)>,
    sent: Vec<u8>,
    noise: bool,
}

impl Network {
    fn new(route: Vec<Hop>) -> Self {
        Self {
            route,
            ttl: 0,
            inbox: VecDeque::new(),
            sent: Vec::new(),
            noise: false,
        }
    }

    fn with_noise(mut self) -> Self {
        self.noise = true;
        self
    }
}

impl Transport for Network {
    fn set_ttl(&mut self, ttl: u8) -> TraceResult<()> {
        self.ttl = ttl;
        Ok(())
    }

    fn send_to(&mut self, packet: &[u8], destination: Ipv4Addr) -> TraceResult<()> {
        assert_eq!(destination, TARGET);
        self.sent.push(self.ttl);

        if self.noise {
            // A concurrent ping from another process and a stray redirect
            let other = codec::encode(IDENTIFIER.wrapping_add(1), self.ttl as u16, b"ping").unwrap();
            self.inbox.push_back((TARGET, wrap_ipv4(TARGET, &reply_to(&other))));
            self.inbox.push_back((router(1), wrap_ipv4(router(1), &quoting(11, 0, &other))));
            self.inbox
                .push_back((router(1), wrap_ipv4(router(1), &[5, 0, 0, 0, 1, 1, 1, 1])));
            self.inbox.push_back((router(1), vec![0x45]));
        }

        let index = self.ttl as usize - 1;
        match self.route.get(index).copied().unwrap_or(Hop::Silent) {
            Hop::Router => {
                let from = router(self.ttl);
                self.inbox.push_back((from, wrap_ipv4(from, &quoting(11, 0, packet))));
            }
            Hop::Rejects(code) => {
                let from = router(self.ttl);
                self.inbox.push_back((from, wrap_ipv4(from, &quoting(3, code, packet))));
            }
            Hop::Destination => {
                self.inbox.push_back((TARGET, wrap_ipv4(TARGET, &reply_to(packet))));
            }
            Hop::Silent => {}
        }
        Ok(())
    }

    fn recv_from(&mut self, buf: &mut [u8], timeout: Duration) -> TraceResult<Option<Received>> {
        match self.inbox.pop_front() {
            Some((peer, datagram)) => {
                buf[..datagram.len()].copy_from_slice(&datagram);
                Ok(Some(Received {
                    len: datagram.len(),
                    peer,
                    control: ControlInfo::default(),
                }))
            }
            None => {
                std::thread::sleep(timeout);
                Ok(None)
            }
        }
    }
}

fn config(max_hops: u8) -> TraceConfig {
    TraceConfig {
        max_hops,
        timeout: Duration::from_millis(40),
        identifier: IDENTIFIER,
        ..Default::default()
    }
}

#[test]
fn test_trace_reaches_destination_on_fifth_hop() {
    let route = vec![
        Hop::Router,
        Hop::Router,
        Hop::Router,
        Hop::Router,
        Hop::Destination,
    ];
    let mut trace = Trace::new(Network::new(route), TARGET, &config(5)).unwrap();
    assert_eq!(trace.identifier(), IDENTIFIER);
    assert_eq!(trace.destination(), TARGET);

    let hops: Vec<_> = trace.by_ref().collect::<TraceResult<_>>().unwrap();

    assert_eq!(hops.len(), 5);
    assert!(hops[..4].iter().all(|h| h.outcome == HopOutcome::Forwarded));
    assert_eq!(hops[4].outcome, HopOutcome::Reached);
    assert_eq!(hops[4].responder, Some(TARGET));
    assert_eq!(trace.transport().sent, vec![1, 2, 3, 4, 5]);
}

#[test]
fn test_reply_metadata_falls_back_to_the_ip_header() {
    let route = vec![Hop::Router, Hop::Destination];
    let hops: Vec<_> = Trace::new(Network::new(route), TARGET, &config(5))
        .unwrap()
        .collect::<TraceResult<_>>()
        .unwrap();

    for hop in &hops {
        let reply = hop.reply.expect("answered hops carry reply metadata");
        assert_eq!(reply.ttl, 250);
        assert_eq!(reply.destination, LOCAL);
        assert_eq!(reply.interface, None);
    }
}

#[test]
fn test_noise_does_not_disturb_correlation() {
    let route = vec![Hop::Router, Hop::Router, Hop::Destination];
    let trace = Trace::new(Network::new(route).with_noise(), TARGET, &config(30)).unwrap();

    let hops: Vec<_> = trace.collect::<TraceResult<_>>().unwrap();
    let responders: Vec<_> = hops.iter().map(|h| h.responder).collect();
    assert_eq!(
        responders,
        vec![Some(router(1)), Some(router(2)), Some(TARGET)]
    );
}

#[test]
fn test_silent_hops_are_reported_as_timeouts() {
    let route = vec![Hop::Router, Hop::Silent, Hop::Silent, Hop::Destination];
    let hops: Vec<_> = Trace::new(Network::new(route), TARGET, &config(10))
        .unwrap()
        .collect::<TraceResult<_>>()
        .unwrap();

    assert_eq!(hops.len(), 4);
    for silent in &hops[1..3] {
        assert_eq!(silent.outcome, HopOutcome::Timeout);
        assert_eq!(silent.responder, None);
        assert_eq!(silent.reply, None);
        assert!(silent.rtt >= Duration::from_millis(40));
    }
    assert!(hops[3].is_reached());
}

#[test]
fn test_rejection_is_a_hop_not_an_error() {
    let route = vec![Hop::Router, Hop::Rejects(10), Hop::Destination];
    let mut trace = Trace::new(Network::new(route), TARGET, &config(10)).unwrap();

    let hops: Vec<_> = trace.by_ref().collect::<TraceResult<_>>().unwrap();
    assert_eq!(hops.len(), 2);
    assert_eq!(hops[1].outcome, HopOutcome::Unreachable { code: 10 });
    assert_eq!(hops[1].responder, Some(router(2)));
    assert_eq!(trace.transport().sent, vec![1, 2]);
}

#[test]
fn test_hop_ceiling_without_destination() {
    let route = vec![Hop::Router; 3];
    let hops: Vec<_> = Trace::new(Network::new(route), TARGET, &config(4))
        .unwrap()
        .collect::<TraceResult<_>>()
        .unwrap();

    assert_eq!(hops.len(), 4);
    assert_eq!(hops[3].outcome, HopOutcome::Timeout);
}

#[test]
fn test_host_without_ipv4_fails_before_opening_a_socket() {
    // Would be a Privilege error (or succeed, as root) if a socket were opened
    let err = pathfinder::traceroute("2001:db8::7", &TraceConfig::default()).unwrap_err();
    assert!(err.is_resolution());
    assert!(matches!(err, TraceError::NoIpv4Address { .. }));
}

#[test]
fn test_invalid_config_is_rejected() {
    let config = TraceConfig {
        max_hops: 0,
        ..Default::default()
    };
    assert!(matches!(
        pathfinder::traceroute("192.0.2.1", &config),
        Err(TraceError::InvalidConfig(_))
    ));
}
