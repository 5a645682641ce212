//! Output rendering for analysis results.

use std::io::Write;

use anyhow::{Context, Result};
use clap::ValueEnum;

use crate::analysis::ModuleAnalysis;

/// Supported report formats.
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Pretty-printed JSON.
    #[default]
    Json,
    /// YAML.
    Yaml,
    /// One `path|version|branch,branch,...` line per module.
    Simple,
}

/// Writes `results` to `writer` in the requested format.
pub fn render(
    results: &[ModuleAnalysis],
    format: OutputFormat,
    writer: &mut dyn Write,
) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let rendered = serde_json::to_string_pretty(results)
                .context("Failed to serialize results to JSON")?;
            writeln!(writer, "{rendered}")?;
        }
        OutputFormat::Yaml => {
            serde_yaml::to_writer(&mut *writer, results)
                .context("Failed to serialize results to YAML")?;
        }
        OutputFormat::Simple => {
            for result in results {
                writeln!(
                    writer,
                    "{}|{}|{}",
                    result.require.path,
                    result.require.version,
                    result.branches.join(",")
                )?;
            }
        }
    }

    Ok(())
}
