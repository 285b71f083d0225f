//! Command-line front end: submit one job or job array and wait for it.

pub mod runner;

pub use runner::{run, succeeded, ArrayRange, Cli, RunError};
