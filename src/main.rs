//! # Tide Station Configuration Tool
//!
//! Command line front end for preparing the firmware configuration of the
//! tide and buoy display: validate a `tide-config.toml` or `config.h`, render
//! `config.h`, write starter templates, inspect timezone rules, and generate
//! the weather icon header.

// Test modules
#[cfg(test)]
mod tests;

use anyhow::{bail, Context};
use chrono::{Datelike, Utc};
use clap::{Parser, Subcommand};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tide_station_lib::{
    config::{Config, CONFIG_FILE},
    header, icons, secrets, stations,
    timezone::{self, format_utc_offset},
    validate::{self, Severity},
};

/// Template file names written by `init`.
const TEMPLATE_TOML: &str = "config.example.toml";
const TEMPLATE_HEADER: &str = "config.example.h";

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a tide-config.toml or config.h
    Check {
        /// Configuration file (.toml or .h)
        #[arg(long, default_value = CONFIG_FILE)]
        config: PathBuf,

        /// Reference year for timezone checks (default: current year)
        #[arg(long)]
        year: Option<i32>,

        /// Also look the stations up with NOAA and NDBC
        #[arg(long, default_value_t = false)]
        online: bool,
    },

    /// Render config.h from a configuration file
    Header {
        #[arg(long, default_value = CONFIG_FILE)]
        config: PathBuf,

        /// Reference year for checking and deriving TIMEZONE_POSIX (default: current year)
        #[arg(long)]
        year: Option<i32>,

        /// Output path (stdout when omitted)
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Write config.example.toml and config.example.h
    Init {
        #[arg(long, default_value = ".")]
        dir: PathBuf,
    },

    /// Derive a POSIX TZ string from an IANA zone, or cross-check one
    Tz {
        /// IANA zone name, e.g. America/Los_Angeles
        name: String,

        #[arg(long)]
        year: Option<i32>,

        /// POSIX TZ string to compare against the IANA zone
        #[arg(long)]
        posix: Option<String>,
    },

    /// Generate the weather icon header
    Icons {
        /// Output path (stdout when omitted)
        #[arg(long)]
        out: Option<PathBuf>,

        /// Convert NAME_WxH.png files from this directory instead of drawing
        #[arg(long)]
        input_dir: Option<PathBuf>,

        /// Also save the drawn icons as PNGs in this directory
        #[arg(long)]
        write_png: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let current_year = Utc::now().year();

    let success = match cli.command {
        Commands::Check {
            config,
            year,
            online,
        } => run_check(&config, year.unwrap_or(current_year), online)?,
        Commands::Header { config, year, out } => {
            run_header(&config, out.as_deref(), year.unwrap_or(current_year))?
        }
        Commands::Init { dir } => {
            for path in init_templates(&dir)? {
                eprintln!("Wrote {}", path.display());
            }
            eprintln!("Copy config.example.h to config.h and fill in your values");
            true
        }
        Commands::Tz { name, year, posix } => {
            run_tz(&name, year.unwrap_or(current_year), posix.as_deref())?
        }
        Commands::Icons {
            out,
            input_dir,
            write_png,
        } => run_icons(out.as_deref(), input_dir.as_deref(), write_png.as_deref())?,
    };

    Ok(if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Load a configuration file and apply credential overrides from the environment.
fn load_config(path: &Path) -> anyhow::Result<Config> {
    let config = Config::load_any(path)
        .with_context(|| format!("failed to load {}", path.display()))?;
    Ok(config.with_env_overrides(env::vars()))
}

/// Print validation findings to stderr; returns true when there are no errors.
fn print_report(config: &Config, report: &validate::ValidationReport) -> bool {
    eprintln!(
        "Configuration: {} @ {:.4}, {:.4} ({}), tide {} / buoy {}",
        config.wifi.ssid,
        config.location.latitude,
        config.location.longitude,
        config.location.timezone,
        config.stations.tide,
        config.stations.buoy
    );
    for issue in &report.issues {
        let label = match issue.severity() {
            Severity::Error => "Error",
            Severity::Warning => "Warning",
        };
        eprintln!("{}: {}", label, issue);
    }

    let errors = report.errors().count();
    let warnings = report.warnings().count();
    if report.is_ok() {
        eprintln!("Configuration OK ({} warnings)", warnings);
    } else {
        eprintln!(
            "Configuration invalid: {} errors, {} warnings",
            errors, warnings
        );
    }
    report.is_ok()
}

fn run_check(path: &Path, year: i32, online: bool) -> anyhow::Result<bool> {
    let config = load_config(path)?;
    let report = validate::validate(&config, year);
    let mut ok = print_report(&config, &report);

    if online {
        // Create Tokio runtime for the station lookups
        let rt = tokio::runtime::Runtime::new()?;
        let client = stations::http_client()?;
        let station_report = rt.block_on(stations::verify_stations(&client, &config, Utc::now()));

        match &station_report.tide {
            Ok(info) => eprintln!(
                "Tide station {}: {}{} ({:.4}, {:.4})",
                info.id,
                info.name,
                info.state
                    .as_deref()
                    .map(|s| format!(", {}", s))
                    .unwrap_or_default(),
                info.lat,
                info.lng
            ),
            Err(e) => eprintln!("Error: tide station {}: {}", config.stations.tide, e),
        }
        match &station_report.buoy {
            Ok(obs) => eprintln!(
                "Buoy {}: last observation {}",
                config.stations.buoy,
                obs.time.format("%Y-%m-%d %H:%M UTC")
            ),
            Err(e) => eprintln!("Error: buoy {}: {}", config.stations.buoy, e),
        }
        for finding in &station_report.findings {
            eprintln!("Warning: {}", finding);
        }
        ok &= station_report.is_ok();
    }

    Ok(ok)
}

fn run_header(path: &Path, out: Option<&Path>, year: i32) -> anyhow::Result<bool> {
    let config = load_config(path)?;
    let report = validate::validate(&config, year);
    if !print_report(&config, &report) {
        eprintln!("Refusing to render config.h from an invalid configuration");
        return Ok(false);
    }

    let text = header::render(&config, year).context("failed to derive TIMEZONE_POSIX")?;
    emit(out, &text)?;

    if let Some(out) = out {
        match secrets::is_gitignored(out) {
            Ok(true) => {}
            Ok(false) => eprintln!(
                "Warning: {} is not gitignored; it contains Wi-Fi credentials",
                out.display()
            ),
            Err(e) => eprintln!(
                "Warning: could not check .gitignore for {}: {}",
                out.display(),
                e
            ),
        }
    }
    Ok(true)
}

fn run_tz(name: &str, year: i32, posix: Option<&str>) -> anyhow::Result<bool> {
    let tz = timezone::resolve(name)?;

    let Some(posix) = posix else {
        let derived = timezone::derive_posix(name, year)?;
        println!("{}", derived);
        for change in timezone::iana_transitions(&tz, year)? {
            eprintln!(
                "  {}  {} -> {}",
                change.at.format("%Y-%m-%d %H:%M:%S UTC"),
                format_utc_offset(change.before),
                format_utc_offset(change.after)
            );
        }
        return Ok(true);
    };

    let report = timezone::check_consistency(name, posix, year)?;
    if report.is_consistent() {
        eprintln!(
            "{} matches {} throughout {} ({} instants checked)",
            posix, name, year, report.checked
        );
        return Ok(true);
    }

    eprintln!(
        "{} disagrees with {} at {} of {} instants in {}",
        posix,
        name,
        report.mismatches.len(),
        report.checked,
        year
    );
    for mismatch in report.mismatches.iter().take(5) {
        eprintln!(
            "  {}  {} has {}, POSIX rule has {}",
            mismatch.at.format("%Y-%m-%d %H:%M:%S UTC"),
            name,
            format_utc_offset(mismatch.iana_offset),
            format_utc_offset(mismatch.posix_offset)
        );
    }
    if let Ok(derived) = timezone::derive_posix(name, year) {
        eprintln!("Suggested TIMEZONE_POSIX: {}", derived);
    }
    Ok(false)
}

fn run_icons(
    out: Option<&Path>,
    input_dir: Option<&Path>,
    write_png: Option<&Path>,
) -> anyhow::Result<bool> {
    if let Some(dir) = write_png {
        let written = icons::write_pngs(dir)
            .with_context(|| format!("failed to write icons to {}", dir.display()))?;
        eprintln!("Wrote {} PNGs to {}", written.len(), dir.display());
    }

    let icons = match input_dir {
        Some(dir) => {
            let import = icons::load_png_dir(dir)
                .with_context(|| format!("failed to read icons from {}", dir.display()))?;
            for warning in &import.warnings {
                eprintln!("Warning: {}", warning);
            }
            if import.icons.is_empty() {
                bail!("no NAME_WxH.png icons in {}", dir.display());
            }
            import.icons
        }
        None => icons::generate_all(),
    };

    let text = icons::render_icon_header(&icons);
    emit(out, &text)?;
    eprintln!("Generated {} icons", icons.len());
    Ok(true)
}

/// Write the starter templates into `dir`, refusing to overwrite either one.
fn init_templates(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let toml_path = dir.join(TEMPLATE_TOML);
    let header_path = dir.join(TEMPLATE_HEADER);
    for path in [&toml_path, &header_path] {
        if path.exists() {
            bail!("{} already exists; not overwriting", path.display());
        }
    }

    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    Config::example()
        .save(&toml_path)
        .with_context(|| format!("failed to write {}", toml_path.display()))?;
    fs::write(&header_path, header::render_template())
        .with_context(|| format!("failed to write {}", header_path.display()))?;
    Ok(vec![toml_path, header_path])
}

/// Write `text` to `out`, or to stdout when no path is given.
fn emit(out: Option<&Path>, text: &str) -> anyhow::Result<()> {
    match out {
        Some(path) => {
            fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))?;
            eprintln!("Wrote {}", path.display());
        }
        None => print!("{}", text),
    }
    Ok(())
}
