use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process;
use std::str::FromStr;

use clap::{Parser, Subcommand, ValueEnum};
use clinicscout::export::{DEFAULT_SHEET_NAME, to_csv, to_xlsx};
use clinicscout::filter::{ColumnInput, FilterConfig, describe_columns};
use clinicscout::geocode::{NominatimGeocoder, map_points};
use clinicscout::types::{ListingKind, PageLimit, Region, Service};
use clinicscout::{Dataset, Session};
use log::LevelFilter;

#[derive(Parser)]
#[command(name = "clinicscout")]
#[command(about = "A prodoctorov.ru listing scraper and filter", long_about = None)]
struct Cli {
    #[arg(
        short = 'l',
        long = "log-level",
        value_enum,
        default_value = "info",
        global = true,
        help = "Set the logging level"
    )]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => LevelFilter::Off,
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

#[derive(Debug, Clone, PartialEq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
    Csv,
    Xlsx,
}

impl OutputFormat {
    fn extension(&self) -> Option<&'static str> {
        match self {
            OutputFormat::Csv => Some("csv"),
            OutputFormat::Xlsx => Some("xlsx"),
            OutputFormat::Text | OutputFormat::Json => None,
        }
    }
}

#[derive(Debug, clap::Args)]
struct OutputArgs {
    #[arg(
        short = 'f',
        long = "filter",
        value_name = "COLUMN=VALUE",
        value_parser = parse_filter,
        help = "Filter a column; ranges as MIN..MAX, choices as A|B, text as a substring. Repeatable"
    )]
    filters: Vec<ColumnInput>,

    #[arg(long, help = "List the columns with their inferred kinds and exit")]
    describe: bool,

    #[arg(
        short = 'o',
        long = "output",
        value_enum,
        default_value = "text",
        help = "Output format"
    )]
    format: OutputFormat,

    #[arg(
        long,
        value_name = "PATH",
        help = "File to write csv/xlsx output to, defaults to <region>.<ext>"
    )]
    out: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape clinic or doctor listings of a region
    Listing {
        #[arg(long, value_parser = parse_region, help = "Region slug or name, e.g. sochi or Сочи")]
        region: Region,

        #[arg(long, value_parser = parse_kind, default_value = "clinics", help = "clinics or doctors")]
        kind: ListingKind,

        #[arg(
            long,
            value_parser = parse_page_limit,
            default_value = "none",
            help = "Stop after this many pages (1-20), or none"
        )]
        page_limit: PageLimit,

        #[command(flatten)]
        output: OutputArgs,
    },
    /// Find clinics of a region offering every given diagnostic service
    Services {
        #[arg(long, value_parser = parse_region, help = "Region slug or name, e.g. sochi or Сочи")]
        region: Region,

        #[arg(
            short = 's',
            long = "service",
            value_parser = parse_service,
            required = true,
            help = "Service: mrt, kt or rentgen. Repeatable"
        )]
        services: Vec<Service>,

        #[arg(long, help = "Geocode clinic addresses into lat/lon columns")]
        geocode: bool,

        #[arg(long, help = "Print map points of geocoded clinics instead of the table")]
        map: bool,

        #[command(flatten)]
        output: OutputArgs,
    },
}

fn parse_region(s: &str) -> Result<Region, String> {
    Region::from_str(s).map_err(|e| e.to_string())
}

fn parse_kind(s: &str) -> Result<ListingKind, String> {
    ListingKind::from_str(s).map_err(|e| e.to_string())
}

fn parse_service(s: &str) -> Result<Service, String> {
    Service::from_str(s).map_err(|e| e.to_string())
}

fn parse_page_limit(s: &str) -> Result<PageLimit, String> {
    PageLimit::from_str(s).map_err(|e| e.to_string())
}

fn parse_filter(s: &str) -> Result<ColumnInput, String> {
    ColumnInput::from_str(s).map_err(|e| e.to_string())
}

fn serialize_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            log::error!("Error serializing to JSON: {}", e);
            process::exit(1);
        }
    }
}

fn default_export_path(region: Region, extension: &str) -> PathBuf {
    PathBuf::from(format!("{}.{}", region, extension))
}

fn write_export(dataset: &Dataset, format: &OutputFormat, path: &Path) -> io::Result<()> {
    let bytes = match format {
        OutputFormat::Csv => to_csv(dataset),
        OutputFormat::Xlsx => to_xlsx(dataset, DEFAULT_SHEET_NAME),
        OutputFormat::Text | OutputFormat::Json => {
            return Err(io::Error::other(format!("{:?} is not a file format", format)));
        }
    }
    .map_err(io::Error::other)?;
    fs::write(path, bytes)
}

fn render(dataset: &Dataset, region: Region, output: &OutputArgs) {
    if output.describe {
        let columns = describe_columns(dataset, &FilterConfig::default()).unwrap_or_else(|e| {
            log::error!("Error describing columns: {}", e);
            process::exit(1);
        });
        if output.format == OutputFormat::Json {
            serialize_json(&columns);
        } else {
            for column in columns {
                println!("{}", column);
            }
        }
        return;
    }

    match output.format.extension() {
        Some(extension) => {
            let path = output
                .out
                .clone()
                .unwrap_or_else(|| default_export_path(region, extension));
            write_export(dataset, &output.format, &path).unwrap_or_else(|e| {
                log::error!("Error writing {}: {}", path.display(), e);
                process::exit(1);
            });
            println!("Saved {} row(s) to {}", dataset.len(), path.display());
        }
        None if output.format == OutputFormat::Json => serialize_json(dataset),
        None => {
            if dataset.is_empty() {
                println!("No entries to display.");
            } else {
                print!("{}", dataset);
            }
        }
    }
}

fn filtered(session: &Session, filters: &[ColumnInput]) -> Dataset {
    session
        .filter_last_result(filters, &FilterConfig::default())
        .unwrap_or_else(|e| {
            log::error!("Invalid filter: {}", e);
            process::exit(1);
        })
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(cli.log_level.clone().into())
        .init();

    let mut session = Session::new().unwrap_or_else(|e| {
        log::error!("Error creating scraper: {}", e);
        process::exit(1);
    });

    match cli.command {
        Commands::Listing {
            region,
            kind,
            page_limit,
            output,
        } => {
            let outcome = session
                .search_listing(region, kind, page_limit)
                .await
                .unwrap_or_else(|e| {
                    log::error!("Error scraping {} listings: {}", kind, e);
                    process::exit(1);
                });
            eprintln!("{}", outcome.report);

            let dataset = filtered(&session, &output.filters);
            render(&dataset, region, &output);
        }

        Commands::Services {
            region,
            services,
            geocode,
            map,
            output,
        } => {
            let search = session
                .search_services(region, &services)
                .await
                .unwrap_or_else(|e| {
                    log::error!("Error searching services: {}", e);
                    process::exit(1);
                });
            for entry in &search.reports {
                eprintln!("{}: {}", entry.service, entry.report);
            }
            eprintln!("{}", search);

            if geocode || map {
                let geocoder = NominatimGeocoder::new().unwrap_or_else(|e| {
                    log::error!("Error creating geocoder: {}", e);
                    process::exit(1);
                });
                session
                    .geocode_last_result(&geocoder)
                    .await
                    .unwrap_or_else(|e| {
                        log::error!("Error geocoding clinics: {}", e);
                        process::exit(1);
                    });
            }

            let dataset = filtered(&session, &output.filters);
            if map {
                let points = map_points(&dataset);
                if output.format == OutputFormat::Json {
                    serialize_json(&points);
                } else {
                    for point in points {
                        println!(
                            "{:.6}, {:.6}  {}  {}",
                            point.lat,
                            point.lon,
                            point.name.as_deref().unwrap_or("—"),
                            point.address.as_deref().unwrap_or("—")
                        );
                    }
                }
            } else {
                render(&dataset, region, &output);
            }
        }
    }
}
