use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use pathfinder::{HopOutcome, TraceConfig};
use tracing_subscriber::EnvFilter;

mod cli;
mod output;

use cli::CliArgs;
use output::{HopPrinter, format_address};

fn main() -> ExitCode {
    let args = CliArgs::parse();
    init_logging(args.verbose);

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(args: &CliArgs) -> Result<()> {
    ctrlc::set_handler(|| {
        eprintln!("\nTrace interrupted.");
        std::process::exit(130);
    })
    .context("Failed to install Ctrl-C handler")?;

    let config = TraceConfig::from(args);
    let mut trace = pathfinder::traceroute(&args.host, &config)?;
    let destination = trace.destination();
    let target = format_address(destination, args.resolve);

    println!(
        "Tracing route to {} with max {} hops:",
        target, config.max_hops
    );

    let mut printer = HopPrinter::new(args.resolve);
    let mut last = None;
    for hop in trace.by_ref() {
        let hop = hop.with_context(|| format!("Trace to {} aborted", destination))?;
        printer.print(&hop);
        last = Some(hop.outcome);
    }

    match last {
        Some(HopOutcome::Reached) => println!("Trace complete to {}.", target),
        Some(HopOutcome::Unreachable { .. }) if config.stop_on_unreachable => {
            println!("Trace aborted to {} (destination unreachable).", target)
        }
        _ => println!(
            "Trace to {} finished (max hops {} reached).",
            target, config.max_hops
        ),
    }

    if args.table {
        println!("{}", printer.table());
    }

    Ok(())
}
