//! Output formatting for CLI

use serde::Serialize;
use std::fmt::Display;

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Print `data` as pretty JSON, or its text rendering
pub fn emit<T: Serialize + Display>(data: &T, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(data)?),
        OutputFormat::Text => print!("{data}"),
    }
    Ok(())
}
