use std::net::{IpAddr, Ipv4Addr};

use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Table};
use dns_lookup::lookup_addr;
use pathfinder::{HopOutcome, HopResult, ReplyInfo};

// Helper function to format IP or hostname
pub fn format_address(ip: Ipv4Addr, resolve: bool) -> String {
    if resolve {
        match lookup_addr(&IpAddr::V4(ip)) {
            Ok(hostname) if hostname != ip.to_string() => format!("{} ({})", hostname, ip),
            _ => ip.to_string(), // If lookup fails, fallback to IP string
        }
    } else {
        ip.to_string()
    }
}

/// Classic traceroute annotation for a Destination Unreachable code
pub fn unreachable_marker(code: u8) -> String {
    match code {
        0 | 6 | 9 => "!N".to_string(),
        1 | 7 | 10 => "!H".to_string(),
        2 => "!P".to_string(),
        // Port unreachable comes from the destination itself
        3 => String::new(),
        4 => "!F".to_string(),
        5 => "!S".to_string(),
        13 => "!X".to_string(),
        14 => "!V".to_string(),
        15 => "!C".to_string(),
        other => format!("!<{}>", other),
    }
}

/// One output line for a hop whose responder was rendered as `address`.
pub fn format_hop(hop: &HopResult, address: Option<&str>) -> String {
    match (hop.outcome, address) {
        (HopOutcome::Timeout, _) | (_, None) => format!(" {:<2}  *", hop.hop),
        (HopOutcome::Unreachable { code }, Some(address)) => {
            let marker = unreachable_marker(code);
            if marker.is_empty() {
                format!(" {:<2}  {}  {:.2?}", hop.hop, address, hop.rtt)
            } else {
                format!(" {:<2}  {}  {:.2?} {}", hop.hop, address, hop.rtt, marker)
            }
        }
        (_, Some(address)) => format!(" {:<2}  {}  {:.2?}", hop.hop, address, hop.rtt),
    }
}

fn outcome_label(outcome: HopOutcome) -> String {
    match outcome {
        HopOutcome::Reached => "reached".to_string(),
        HopOutcome::Forwarded => "time exceeded".to_string(),
        HopOutcome::Unreachable { code } => format!("unreachable (code {})", code),
        HopOutcome::Timeout => "no answer".to_string(),
    }
}

/// Prints hops as they arrive and remembers them for the summary table.
pub struct HopPrinter {
    resolve: bool,
    rows: Vec<(HopResult, Option<String>)>,
}

impl HopPrinter {
    pub fn new(resolve: bool) -> Self {
        Self {
            resolve,
            rows: Vec::new(),
        }
    }

    pub fn print(&mut self, hop: &HopResult) {
        let address = hop.responder.map(|ip| format_address(ip, self.resolve));
        println!("{}", format_hop(hop, address.as_deref()));
        self.rows.push((*hop, address));
    }

    pub fn table(&self) -> Table {
        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.set_header(vec!["Hop", "Address", "RTT", "Reply TTL", "Outcome"]);

        for (hop, address) in &self.rows {
            let rtt = match hop.outcome {
                HopOutcome::Timeout => "*".to_string(),
                _ => format!("{:.2?}", hop.rtt),
            };
            table.add_row(vec![
                Cell::new(hop.hop),
                Cell::new(address.as_deref().unwrap_or("*")),
                Cell::new(rtt),
                Cell::new(hop.reply.map_or("*".to_string(), |r| r.ttl.to_string())),
                Cell::new(outcome_label(hop.outcome)),
            ]);
        }

        table
    }
}
