//! # Command Workflow Tests
//!
//! These tests drive the same functions the subcommands call, using temporary
//! directories so nothing touches the working tree.

use std::fs;
use tempfile::tempdir;
use tide_station_lib::config::Config;

use crate::{init_templates, run_check, run_header, run_icons, run_tz};

/// `init` writes both templates and they describe the same configuration.
#[test]
fn init_writes_matching_templates() {
    let dir = tempdir().unwrap();
    let written = init_templates(dir.path()).unwrap();
    assert_eq!(written.len(), 2);

    let from_toml = Config::load_from_path(dir.path().join("config.example.toml")).unwrap();
    let from_header = Config::from_header_file(dir.path().join("config.example.h")).unwrap();
    assert_eq!(from_toml, Config::example());
    assert_eq!(from_header, Config::example());

    let header = fs::read_to_string(dir.path().join("config.example.h")).unwrap();
    assert!(header.starts_with("// config.example.h - Copy to config.h"));
}

/// `init` refuses to overwrite an existing template and leaves it untouched.
#[test]
fn init_refuses_to_overwrite() {
    let dir = tempdir().unwrap();
    let existing = dir.path().join("config.example.h");
    fs::write(&existing, "// mine\n").unwrap();

    let err = init_templates(dir.path()).unwrap_err();
    assert!(err.to_string().contains("already exists"));
    assert_eq!(fs::read_to_string(&existing).unwrap(), "// mine\n");
    assert!(!dir.path().join("config.example.toml").exists());
}

/// `init` creates the target directory when needed.
#[test]
fn init_creates_missing_directory() {
    let dir = tempdir().unwrap();
    let nested = dir.path().join("firmware").join("conf");
    init_templates(&nested).unwrap();
    assert!(nested.join("config.example.toml").exists());
}

/// A valid configuration renders a config.h that parses back to itself.
#[test]
fn header_round_trips_through_file() {
    let dir = tempdir().unwrap();
    let source = dir.path().join("tide-config.toml");
    let out = dir.path().join("config.h");
    Config::example().save(&source).unwrap();

    assert!(run_header(&source, Some(&out), 2025).unwrap());
    let rendered = Config::from_header_file(&out).unwrap();
    assert_eq!(rendered.location, Config::example().location);
    assert_eq!(rendered.stations, Config::example().stations);
}

/// Derived TIMEZONE_POSIX is written when the source omits it.
#[test]
fn header_derives_missing_posix() {
    let dir = tempdir().unwrap();
    let source = dir.path().join("tide-config.toml");
    let out = dir.path().join("config.h");
    let mut config = Config::example();
    config.location.timezone = "Europe/Berlin".to_string();
    config.location.timezone_posix = None;
    config.save(&source).unwrap();

    assert!(run_header(&source, Some(&out), 2025).unwrap());
    let text = fs::read_to_string(&out).unwrap();
    assert!(text.contains("#define TIMEZONE_POSIX \"CET-1CEST,M3.5.0,M10.5.0/3\""));
}

/// An invalid configuration is reported and nothing is written.
#[test]
fn header_refuses_invalid_config() {
    let dir = tempdir().unwrap();
    let source = dir.path().join("tide-config.toml");
    let out = dir.path().join("config.h");
    let mut config = Config::example();
    config.location.latitude = 95.0;
    config.save(&source).unwrap();

    assert!(!run_header(&source, Some(&out), 2025).unwrap());
    assert!(!out.exists());
}

/// `check` accepts both file formats and fails on a missing file.
#[test]
fn check_reads_toml_and_header() {
    let dir = tempdir().unwrap();
    init_templates(dir.path()).unwrap();

    assert!(run_check(&dir.path().join("config.example.toml"), 2025, false).unwrap());
    assert!(run_check(&dir.path().join("config.example.h"), 2025, false).unwrap());
    assert!(run_check(&dir.path().join("absent.toml"), 2025, false).is_err());
}

/// `check` reports a mismatched POSIX rule as a failure.
#[test]
fn check_flags_timezone_mismatch() {
    let dir = tempdir().unwrap();
    let source = dir.path().join("tide-config.toml");
    let mut config = Config::example();
    config.location.timezone_posix = Some("EST5EDT,M3.2.0,M11.1.0".to_string());
    config.save(&source).unwrap();

    assert!(!run_check(&source, 2025, false).unwrap());
}

#[test]
fn tz_derives_and_cross_checks() {
    assert!(run_tz("America/Los_Angeles", 2025, None).unwrap());
    assert!(run_tz("America/Los_Angeles", 2025, Some("PST8PDT,M3.2.0,M11.1.0")).unwrap());
    assert!(!run_tz("America/Los_Angeles", 2025, Some("PST8PDT,M4.1.0,M10.5.0")).unwrap());
    assert!(run_tz("Mars/Olympus_Mons", 2025, None).is_err());
    assert!(run_tz("Europe/Paris", 2025, Some("not a rule")).is_err());
}

/// `icons --write-png` output converts back through `--input-dir`.
#[test]
fn icons_round_trip_through_png_directory() {
    let dir = tempdir().unwrap();
    let pngs = dir.path().join("png");
    let drawn = dir.path().join("drawn.h");
    let converted = dir.path().join("converted.h");

    assert!(run_icons(Some(&drawn), None, Some(&pngs)).unwrap());
    assert!(run_icons(Some(&converted), Some(&pngs), None).unwrap());
    assert_eq!(
        fs::read_to_string(&drawn).unwrap(),
        fs::read_to_string(&converted).unwrap()
    );
}

/// A directory without usable PNGs is an error, not an empty header.
#[test]
fn icons_reject_empty_input_dir() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("logo.png"), b"skipped by name").unwrap();
    let out = dir.path().join("weather_icons.h");

    assert!(run_icons(Some(&out), Some(dir.path()), None).is_err());
    assert!(!out.exists());
}
