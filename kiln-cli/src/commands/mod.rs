//! Command implementations for the Kiln CLI.
//!
//! Each command module provides a `run` function that executes the command logic.

pub mod doctor;
pub mod protect;
pub mod scan;
