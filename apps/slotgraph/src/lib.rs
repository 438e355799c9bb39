//! # slotgraph
//!
//! Command-line front end for `slotgraph-core`: a JSON donor-file parser,
//! TOML rule configuration and the `plan`, `adapt`, `slots`, `snapshot` and
//! `verify` commands.

pub mod cli;
pub mod config;
pub mod json_parser;
