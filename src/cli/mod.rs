//! CLI command handlers

pub mod commands;

pub use commands::{balances, export, logistics, records, Workspace};
