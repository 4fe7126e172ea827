//! accident-geo CLI - enrich accident tables from CSV inputs
//!
//! Usage:
//!   accident-geo enrich --accidents <csv> --crosswalks <csv> --traffic-lights <csv>
//!                       --zones <csv> --counters <csv> [--roads <csv>]
//!                       [--config <json>] --output <dir>
//!
//! Writes `accident_data_<year>.csv` for every accident year plus
//! `accident_data_all.csv` with every row.

use accident_geo::io::{
    read_accidents, read_counters, read_facilities, read_protection_zones, read_road_segments,
    write_enriched,
};
use accident_geo::{
    enrich, split_by_year, EnrichError, EnrichmentConfig, EnrichmentInputs, FacilityCategory,
    RoadTable,
};
use clap::{Parser, Subcommand};
use log::info;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "accident-geo")]
#[command(about = "Spatial enrichment of traffic accident tables", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose debug output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Join accidents with facilities, counters and roads, and detect hotspots
    Enrich {
        /// Accident table
        #[arg(long)]
        accidents: PathBuf,

        /// Crosswalk locations (lat, lng)
        #[arg(long)]
        crosswalks: PathBuf,

        /// Traffic light locations (lat, lng)
        #[arg(long)]
        traffic_lights: PathBuf,

        /// Protection zones (category, lat, lng)
        #[arg(long)]
        zones: PathBuf,

        /// Traffic-volume counters (lat, lng, one column per year)
        #[arg(long)]
        counters: PathBuf,

        /// Road speed table
        #[arg(long)]
        roads: Option<PathBuf>,

        /// JSON file overriding the default configuration
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output directory
        #[arg(short, long)]
        output: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format(|buf, record| writeln!(buf, "[{:5}] {}", record.level(), record.args()))
        .init();

    let result = match cli.command {
        Commands::Enrich {
            accidents,
            crosswalks,
            traffic_lights,
            zones,
            counters,
            roads,
            config,
            output,
        } => run_enrich(EnrichPaths {
            accidents,
            crosswalks,
            traffic_lights,
            zones,
            counters,
            roads,
            config,
            output,
        }),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

struct EnrichPaths {
    accidents: PathBuf,
    crosswalks: PathBuf,
    traffic_lights: PathBuf,
    zones: PathBuf,
    counters: PathBuf,
    roads: Option<PathBuf>,
    config: Option<PathBuf>,
    output: PathBuf,
}

fn open(path: &Path) -> Result<BufReader<File>, EnrichError> {
    Ok(BufReader::new(File::open(path)?))
}

fn load_config(path: Option<&Path>) -> Result<EnrichmentConfig, Box<dyn std::error::Error>> {
    let Some(path) = path else {
        return Ok(EnrichmentConfig::default());
    };
    let config: EnrichmentConfig = serde_json::from_reader(open(path)?)?;
    info!("Loaded configuration from {}", path.display());
    Ok(config)
}

fn run_enrich(paths: EnrichPaths) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(paths.config.as_deref())?;

    let accidents = read_accidents(open(&paths.accidents)?)?;
    info!("Loaded {} accidents from {}", accidents.len(), paths.accidents.display());

    let mut facilities = vec![
        read_facilities(open(&paths.crosswalks)?, FacilityCategory::Crosswalk)?,
        read_facilities(open(&paths.traffic_lights)?, FacilityCategory::TrafficLight)?,
    ];
    facilities.extend(read_protection_zones(open(&paths.zones)?)?);
    for set in &facilities {
        info!("Loaded {} {} locations", set.len(), set.category);
    }

    let counters = read_counters(open(&paths.counters)?)?;
    info!("Loaded {} traffic counters", counters.len());

    let roads = match &paths.roads {
        Some(path) => {
            let table = RoadTable::from_segments(read_road_segments(open(path)?)?);
            info!("Loaded {} roads", table.len());
            Some(table)
        }
        None => None,
    };

    let inputs = EnrichmentInputs { facilities, counters, roads };
    let rows = enrich(accidents, &inputs, &config)?;

    fs::create_dir_all(&paths.output)?;
    write_table(&paths.output.join("accident_data_all.csv"), &rows)?;
    for (year, year_rows) in split_by_year(rows) {
        write_table(&paths.output.join(format!("accident_data_{}.csv", year)), &year_rows)?;
    }

    Ok(())
}

fn write_table(path: &Path, rows: &[accident_geo::EnrichedAccident]) -> Result<(), EnrichError> {
    write_enriched(BufWriter::new(File::create(path)?), rows)?;
    info!("Wrote {} rows to {}", rows.len(), path.display());
    Ok(())
}
