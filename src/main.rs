//! hydrofetch command-line tool
//!
//! Lists stations and fetches observation tables using the providers
//! enabled in hydrofetch.toml. Data goes to stdout as JSON lines; progress
//! and the failure report go to stderr.
//!
//! Usage:
//!   hydrofetch stations COOPS,IOC [--bbox W,S,E,N]
//!   hydrofetch fetch COOPS:8518750,USGS:05568500 water_level 2024-01-01 2024-03-15 \
//!       [--concurrency N] [--attempts N] [--timeout SECS] [--datum D]
//!
//! Environment:
//!   HYDROFETCH_CONFIG     - configuration file (default hydrofetch.toml)
//!   RUST_LOG              - log filter (default info)
//!   HYDROFETCH_LOG_FORMAT - "json" for JSON log lines

use chrono::{DateTime, NaiveDate, Utc};
use hydrofetch::logging::init_logging;
use hydrofetch::{
    config, FetchOverrides, HydroClient, Product, ProviderId, QueryOptions, QueryRequest, Region, StationKey,
};
use std::env;
use std::io::{self, Write};
use std::time::Duration;

const USAGE: &str = "Usage:
  hydrofetch stations <PROVIDER,...> [--bbox W,S,E,N]
  hydrofetch fetch <PROVIDER:ID,...> <product> <start> <end> [--concurrency N] [--attempts N] [--timeout SECS] [--datum D]";

fn main() {
    init_logging("info");

    let args: Vec<String> = env::args().skip(1).collect();
    if let Err(e) = run(&args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: &[String]) -> Result<(), String> {
    let Some(command) = args.first() else {
        return Err(format!("missing command\n{}", USAGE));
    };

    match command.as_str() {
        "stations" => run_stations(&args[1..]),
        "fetch" => run_fetch(&args[1..]),
        "--help" | "-h" | "help" => {
            println!("{}", USAGE);
            Ok(())
        }
        other => Err(format!("unknown command '{}'\n{}", other, USAGE)),
    }
}

fn client() -> Result<HydroClient, String> {
    let config = config::load_from_env().map_err(|e| e.to_string())?;
    HydroClient::from_config(&config).map_err(|e| e.to_string())
}

// ---------------------------------------------------------------------------
// stations
// ---------------------------------------------------------------------------

fn run_stations(args: &[String]) -> Result<(), String> {
    let mut providers: Option<Vec<ProviderId>> = None;
    let mut region: Option<Region> = None;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--bbox" => {
                let value = flag_value(args, i)?;
                region = Some(parse_bbox(value)?);
                i += 2;
            }
            positional if providers.is_none() => {
                providers = Some(positional.split(',').map(|p| ProviderId::new(p.trim())).collect());
                i += 1;
            }
            other => return Err(format!("unexpected argument '{}'\n{}", other, USAGE)),
        }
    }
    let providers = providers.ok_or_else(|| format!("missing provider list\n{}", USAGE))?;

    let client = client()?;
    let stations = client
        .get_stations(&providers, region.as_ref(), None)
        .map_err(|e| e.to_string())?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for station in &stations {
        let line = serde_json::to_string(station).map_err(|e| e.to_string())?;
        writeln!(out, "{}", line).map_err(|e| e.to_string())?;
    }
    eprintln!("{} stations", stations.len());
    Ok(())
}

// ---------------------------------------------------------------------------
// fetch
// ---------------------------------------------------------------------------

fn run_fetch(args: &[String]) -> Result<(), String> {
    let mut positional: Vec<&str> = Vec::new();
    let mut overrides = FetchOverrides::new();
    let mut options = QueryOptions::default();

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--concurrency" => {
                overrides.concurrency_limit = Some(parse_number(flag_value(args, i)?, "--concurrency")?);
                i += 2;
            }
            "--attempts" => {
                overrides.max_attempts = Some(parse_number(flag_value(args, i)?, "--attempts")?);
                i += 2;
            }
            "--timeout" => {
                let secs: u64 = parse_number(flag_value(args, i)?, "--timeout")?;
                overrides.timeout = Some(Duration::from_secs(secs));
                i += 2;
            }
            "--datum" => {
                options = options.with_datum(flag_value(args, i)?);
                i += 2;
            }
            flag if flag.starts_with("--") => return Err(format!("unknown flag '{}'\n{}", flag, USAGE)),
            value => {
                positional.push(value);
                i += 1;
            }
        }
    }

    let [stations, product, start, end] = positional[..] else {
        return Err(format!("expected <stations> <product> <start> <end>\n{}", USAGE));
    };

    let stations = stations
        .split(',')
        .map(|s| s.trim().parse::<StationKey>())
        .collect::<Result<Vec<_>, _>>()?;
    let product: Product = product.parse()?;
    let request = QueryRequest::new(stations, product, parse_time(start)?, parse_time(end)?)
        .map_err(|e| e.to_string())?
        .with_options(options);

    let client = client()?;
    let outcome = client.fetch(&request, overrides).map_err(|e| e.to_string())?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for row in outcome.table.rows() {
        let line = serde_json::to_string(&row).map_err(|e| e.to_string())?;
        writeln!(out, "{}", line).map_err(|e| e.to_string())?;
    }

    eprintln!(
        "{} observations across {} series, {} failed sub-queries",
        outcome.table.len(),
        outcome.table.series_keys().count(),
        outcome.failures.len()
    );
    for failure in outcome.failures.iter() {
        eprintln!("   ✗ {} {} {} - {}", failure.station, failure.product, failure.interval, failure.error);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Argument helpers
// ---------------------------------------------------------------------------

fn flag_value(args: &[String], i: usize) -> Result<&str, String> {
    args.get(i + 1)
        .map(String::as_str)
        .ok_or_else(|| format!("{} requires a value", args[i]))
}

fn parse_number<T: std::str::FromStr>(raw: &str, flag: &str) -> Result<T, String> {
    raw.parse().map_err(|_| format!("{} expects a number, got '{}'", flag, raw))
}

/// RFC 3339 timestamp or a bare date (midnight UTC).
fn parse_time(raw: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| format!("invalid time '{}': use YYYY-MM-DD or RFC 3339", raw))
}

fn parse_bbox(raw: &str) -> Result<Region, String> {
    let parts = raw
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| format!("invalid --bbox '{}'", raw))?;
    let [west, south, east, north] = parts[..] else {
        return Err(format!("--bbox expects W,S,E,N, got '{}'", raw));
    };
    Region::bbox(west, south, east, north).map_err(|e| e.to_string())
}
