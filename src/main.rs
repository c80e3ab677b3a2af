//! `snowobs`: fetch hourly point observations and print them as JSON.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, NaiveDateTime, Utc};
use clap::{Args, Parser, Subcommand};

use snowobs_service::config::ServiceConfig;
use snowobs_service::logging::{self, DataSource};
use snowobs_service::{BoundingBox, FetchOptions, ObservationMatrix, PgObservationStore, fetch};

#[derive(Parser)]
#[command(name = "snowobs", version, about = "Hourly point observations from the observation store")]
struct Cli {
    /// Increase verbosity (-v info and SQL, -vv debug, -vvv trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Path to TOML configuration file.
    #[arg(short, long, global = true, default_value = "snowobs.toml")]
    config: PathBuf,

    /// Cache directory; overrides the config file.
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    /// Bounding box as lon_min,lon_max,lat_min,lat_max. Disables caching.
    #[arg(long, global = true, value_parser = parse_bbox, allow_hyphen_values = true)]
    bbox: Option<BoundingBox>,

    /// Fill value for cells without data; overrides the config file.
    #[arg(long, global = true, allow_hyphen_values = true)]
    no_data: Option<f64>,

    /// Write JSON here instead of stdout.
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Hourly snow depth (cm).
    Depth(RangeArgs),
    /// Hourly snow water equivalent (mm).
    Swe(RangeArgs),
    /// Hourly SWE rows (mm), not pivoted.
    SweRows(RangeArgs),
    /// Hourly air temperature (deg C).
    AirTemp(RangeArgs),
    /// Snow depth for hours before a target, at stations reporting depth then.
    PrevDepth(PriorArgs),
    /// Air temperature for hours before a target, at stations reporting depth then.
    PrevAirTemp(PriorArgs),
    /// Air temperature for hours before a target, all stations.
    PriorAirTemp(PriorArgs),
    /// Snowfall (cm) ending at a target, at stations reporting depth then.
    Snowfall(AccumulationArgs),
    /// Precipitation (mm) ending at a target, at stations reporting depth then.
    Precip(AccumulationArgs),
}

#[derive(Args)]
struct RangeArgs {
    /// First hour, YYYYMMDDHH or RFC 3339.
    #[arg(long, value_parser = parse_time)]
    begin: DateTime<Utc>,
    /// Last hour (inclusive), YYYYMMDDHH or RFC 3339.
    #[arg(long, value_parser = parse_time)]
    end: DateTime<Utc>,
}

#[derive(Args)]
struct PriorArgs {
    #[arg(long, value_parser = parse_time)]
    target: DateTime<Utc>,
    /// Number of hours before the target.
    #[arg(long)]
    hours: u32,
}

#[derive(Args)]
struct AccumulationArgs {
    #[arg(long, value_parser = parse_time)]
    target: DateTime<Utc>,
    /// Accumulation period in hours.
    #[arg(long)]
    duration: u32,
}

fn parse_time(s: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Ok(t.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(&format!("{}0000", s), "%Y%m%d%H%M%S")
        .map(|t| t.and_utc())
        .map_err(|_| format!("expected YYYYMMDDHH or RFC 3339, got '{}'", s))
}

fn parse_bbox(s: &str) -> Result<BoundingBox, String> {
    let parts: Vec<f64> = s
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .map_err(|e| format!("bad bounding box '{}': {}", s, e))?;
    match parts.as_slice() {
        [lon_min, lon_max, lat_min, lat_max] => {
            Ok(BoundingBox::new(*lon_min, *lon_max, *lat_min, *lat_max))
        }
        _ => Err(format!("bounding box needs 4 values, got {}", parts.len())),
    }
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = ServiceConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    let options = FetchOptions {
        no_data_value: cli.no_data.unwrap_or(config.output.no_data_value),
        bounding_box: cli.bbox,
        cache_dir: cli.cache_dir.clone().or_else(|| config.cache.dir.clone()),
        verbose: cli.verbose > 0,
    };

    let mut store = PgObservationStore::new(config.postgres_config()?, config.statement_timeout());

    let json = match &cli.command {
        Command::SweRows(a) => {
            let rows = fetch::get_swe_rows(&mut store, a.begin, a.end, &options)?;
            logging::info(DataSource::System, &format!("{} rows", rows.len()));
            serde_json::to_string_pretty(&rows)?
        }
        command => {
            let matrix = fetch_matrix(&mut store, command, &options)?;
            let (stations, slots) = matrix.shape();
            logging::info(
                DataSource::System,
                &format!("{} stations x {} slots ({})", stations, slots, matrix.unit()),
            );
            serde_json::to_string_pretty(&matrix)?
        }
    };

    match &cli.output {
        Some(path) => {
            let mut out = BufWriter::new(
                File::create(path).with_context(|| format!("creating {}", path.display()))?,
            );
            out.write_all(json.as_bytes())?;
            out.flush()?;
        }
        None => {
            let stdout = io::stdout();
            let mut out = stdout.lock();
            out.write_all(json.as_bytes())?;
            writeln!(out)?;
        }
    }
    Ok(())
}

fn fetch_matrix(
    store: &mut PgObservationStore,
    command: &Command,
    options: &FetchOptions,
) -> Result<ObservationMatrix> {
    let matrix = match command {
        Command::Depth(a) => fetch::get_snow_depth_obs(store, a.begin, a.end, options)?,
        Command::Swe(a) => fetch::get_swe_obs(store, a.begin, a.end, options)?,
        Command::AirTemp(a) => fetch::get_air_temp_obs(store, a.begin, a.end, options)?,
        Command::PrevDepth(a) => fetch::get_prev_snow_depth_obs(store, a.target, a.hours, options)?,
        Command::PrevAirTemp(a) => fetch::get_prev_air_temp_obs(store, a.target, a.hours, options)?,
        Command::PriorAirTemp(a) => {
            fetch::get_prior_air_temp_obs(store, a.target, a.hours, options)?
        }
        Command::Snowfall(a) => fetch::get_snowfall_obs(store, a.target, a.duration, options)?,
        Command::Precip(a) => fetch::get_precip_obs(store, a.target, a.duration, options)?,
        Command::SweRows(_) => bail!("swe-rows does not produce a matrix"),
    };
    Ok(matrix)
}
