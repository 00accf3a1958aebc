use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Env;
use log::info;

use collision_stats::config::{EOL_LEN, FIRST_YEAR, HEADER_LEN, RECORD_LEN};
use collision_stats::{Config, Coordinator, Layout, Query};

/// Aggregate statistics over a fixed-width collision file.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Collision records file
    file: PathBuf,

    /// Number of persistent workers
    workers: usize,

    /// Queries to run, in order (1-5)
    #[arg(value_parser = clap::value_parser!(u8).range(1..=5))]
    queries: Vec<u8>,

    /// Header line length, terminator excluded
    #[arg(long, default_value_t = HEADER_LEN)]
    header_bytes: usize,

    /// Line terminator width (2 for CRLF, 1 for LF)
    #[arg(long, default_value_t = EOL_LEN)]
    eol_bytes: usize,

    /// First year of the month tally
    #[arg(long, default_value_t = FIRST_YEAR)]
    first_year: u16,

    /// Print the collision and record totals before the query results
    #[arg(long)]
    summary: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    let mut queries = Vec::with_capacity(args.queries.len());
    for &id in &args.queries {
        queries.push(Query::try_from(id)?);
    }
    let layout = Layout {
        header_len: args.header_bytes,
        record_len: RECORD_LEN,
        eol_len: args.eol_bytes,
    };
    let config = Config::new(args.workers)?
        .with_layout(layout)
        .with_first_year(args.first_year)?;

    let mut coordinator = Coordinator::start(&args.file, config)
        .with_context(|| format!("Failed to load {}", args.file.display()))?;
    if args.summary {
        let summary = coordinator.summary();
        let (groups, units) = (summary.groups, summary.units);
        println!("Found {groups} collisions in {units} records.");
    }

    for query in queries {
        let answer = coordinator
            .run(query)
            .with_context(|| format!("Query {} failed", query.id()))?;
        println!("{answer}");
    }
    coordinator.shutdown()?;
    info!("done");
    Ok(())
}
