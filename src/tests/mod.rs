//! Tests for the command line workflows: template generation, header output
//! and timezone inspection, exercised against temporary directories.

mod cli_tests;
