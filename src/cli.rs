use std::time::Duration;

use clap::Parser;
use pathfinder::TraceConfig;
use pathfinder::codec::{self, DEFAULT_PAYLOAD_SIZE};
use pathfinder::config::DEFAULT_MAX_HOPS;

#[derive(Parser, Debug)]
#[clap(
    author,
    version,
    about = "Trace the route to a host with ICMP Echo probes."
)]
pub struct CliArgs {
    /// Destination host name or IPv4 address
    pub host: String,

    /// Maximum number of hops (TTL)
    #[clap(short, long, default_value_t = DEFAULT_MAX_HOPS)]
    pub max_hops: u8,

    /// TTL of the first probe
    #[clap(short, long, default_value_t = 1)]
    pub first_hop: u8,

    /// Timeout for each hop in milliseconds
    #[clap(short = 't', long, default_value_t = 3000)]
    pub timeout_ms: u64,

    /// Echo payload size in bytes
    #[clap(short = 's', long, default_value_t = DEFAULT_PAYLOAD_SIZE)]
    pub payload_size: usize,

    /// Resolve IP addresses to hostnames
    #[clap(short, long)]
    pub resolve: bool,

    /// Keep probing after a Destination Unreachable
    #[clap(long)]
    pub keep_going: bool,

    /// Print a summary table when the trace ends
    #[clap(long)]
    pub table: bool,

    /// Verbose logging (debug level)
    #[clap(short, long)]
    pub verbose: bool,
}

impl From<&CliArgs> for TraceConfig {
    fn from(args: &CliArgs) -> Self {
        Self {
            max_hops: args.max_hops,
            first_hop: args.first_hop,
            timeout: Duration::from_millis(args.timeout_ms),
            payload_size: args.payload_size,
            identifier: codec::process_identifier(),
            stop_on_unreachable: !args.keep_going,
        }
    }
}
