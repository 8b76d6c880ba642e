//! Hop-by-hop traceroute iteration.
//!
//! Sends one probe at a time and waits for a response (or timeout) before
//! sending the next. Each hop is yielded as soon as it is known, so a caller
//! that stops pulling stops the trace.

use std::net::Ipv4Addr;

use tracing::debug;

use crate::config::TraceConfig;
use crate::error::TraceResult;
use crate::hop::HopResult;
use crate::probe::Prober;
use crate::transport::Transport;

/// A running trace. Owns the transport; dropping the trace closes it.
#[derive(Debug)]
pub struct Trace<T: Transport> {
    transport: T,
    prober: Prober,
    destination: Ipv4Addr,
    next_ttl: u16,
    max_hops: u8,
    stop_on_unreachable: bool,
    hops: Vec<HopResult>,
    done: bool,
}

impl<T: Transport> Trace<T> {
    pub fn new(transport: T, destination: Ipv4Addr, config: &TraceConfig) -> TraceResult<Self> {
        config.validate()?;

        Ok(Self {
            transport,
            prober: Prober::from_config(config),
            destination,
            next_ttl: config.first_hop as u16,
            max_hops: config.max_hops,
            stop_on_unreachable: config.stop_on_unreachable,
            hops: Vec::new(),
            done: false,
        })
    }

    pub fn destination(&self) -> Ipv4Addr {
        self.destination
    }

    pub fn identifier(&self) -> u16 {
        self.prober.identifier()
    }

    pub fn max_hops(&self) -> u8 {
        self.max_hops
    }

    /// Hops yielded so far
    pub fn hops(&self) -> &[HopResult] {
        &self.hops
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn finish(&self, hop: &HopResult) -> bool {
        if hop.is_reached() {
            debug!(hop = hop.hop, "Reached destination, stopping");
            return true;
        }
        if hop.is_unreachable() && self.stop_on_unreachable {
            debug!(hop = hop.hop, "Destination unreachable, stopping");
            return true;
        }
        if hop.hop >= self.max_hops {
            debug!(max_hops = self.max_hops, "Hop limit reached, stopping");
            return true;
        }
        false
    }
}

impl<T: Transport> Iterator for Trace<T> {
    type Item = TraceResult<HopResult>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.next_ttl > self.max_hops as u16 {
            return None;
        }

        let ttl = self.next_ttl as u8;
        self.next_ttl += 1;

        match self
            .prober
            .probe(&mut self.transport, self.destination, ttl, ttl as u16)
        {
            Ok(hop) => {
                self.hops.push(hop);
                self.done = self.finish(&hop);
                Some(Ok(hop))
            }
            Err(e) => {
                debug!(ttl, error = %e, "Fatal error during probe");
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
