//! Output formatting: table, JSON, YAML, plain.
//!
//! Renders data in the format selected by `--output`. Table uses `tabled`,
//! structured formats use serde, plain emits one identifier per line.

use std::io::{self, IsTerminal, Write};

use owo_colors::OwoColorize;
use tabled::{Table, Tabled, settings::Style};

use keafly_core::EventLevel;

use crate::cli::{ColorMode, OutputFormat};
use crate::error::CliError;

// ── Color helpers ───────────────────────────────────────────────────

/// Determine whether color output should be enabled.
pub fn should_color(mode: ColorMode) -> bool {
    match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => io::stdout().is_terminal() && std::env::var("NO_COLOR").is_err(),
    }
}

/// Event level tag, colored by severity when enabled.
pub fn level_tag(level: EventLevel, color: bool) -> String {
    let tag = format!("{:<7}", level.to_string());
    if !color {
        return tag;
    }
    match level {
        EventLevel::Info => tag.cyan().to_string(),
        EventLevel::Warning => tag.yellow().to_string(),
        EventLevel::Error => tag.red().bold().to_string(),
    }
}

/// Utilization as a percentage, red above 90 % when enabled.
pub fn percent(ratio: f64, color: bool) -> String {
    let text = format!("{:.1}%", ratio * 100.0);
    if color && ratio > 0.9 {
        text.red().to_string()
    } else {
        text
    }
}

// ── Render dispatchers ───────────────────────────────────────────────

/// Render a list of serde-serializable items in the chosen format.
///
/// - `table`: maps each item through `to_row` and uses the `Tabled` derive
/// - `json` / `json-compact` / `yaml`: serializes the original data
/// - `plain`: calls `id_fn` on each item to emit one identifier per line
pub fn render_list<T, R>(
    format: OutputFormat,
    data: &[T],
    to_row: impl Fn(&T) -> R,
    id_fn: impl Fn(&T) -> String,
) -> Result<String, CliError>
where
    T: serde::Serialize,
    R: Tabled,
{
    Ok(match format {
        OutputFormat::Table => {
            let rows: Vec<R> = data.iter().map(to_row).collect();
            render_table(&rows)
        }
        OutputFormat::Json => serde_json::to_string_pretty(data)?,
        OutputFormat::JsonCompact => serde_json::to_string(data)?,
        OutputFormat::Yaml => serde_yaml::to_string(data)?,
        OutputFormat::Plain => data.iter().map(&id_fn).collect::<Vec<_>>().join("\n"),
    })
}

/// Render a single serializable document in a structured format.
///
/// Table and plain formats have no generic rendering for a document and
/// fall back to pretty JSON.
pub fn render_value<T: serde::Serialize>(format: OutputFormat, data: &T) -> Result<String, CliError> {
    Ok(match format {
        OutputFormat::JsonCompact => serde_json::to_string(data)?,
        OutputFormat::Yaml => serde_yaml::to_string(data)?,
        OutputFormat::Table | OutputFormat::Json | OutputFormat::Plain => {
            serde_json::to_string_pretty(data)?
        }
    })
}

/// Print the rendered output to stdout, respecting quiet mode.
pub fn print_output(output: &str, quiet: bool) {
    if quiet || output.is_empty() {
        return;
    }
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{output}");
}

/// Report daemons that could not answer on stderr.
pub fn print_erred(erred: &[keafly_core::DaemonId], quiet: bool) {
    if quiet || erred.is_empty() {
        return;
    }
    let ids = erred.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ");
    eprintln!("warning: no answer from daemons {ids}");
}

fn render_table<R: Tabled>(rows: &[R]) -> String {
    Table::new(rows).with(Style::rounded()).to_string()
}

/// `-` for absent optional cells.
pub fn or_dash(value: Option<&str>) -> String {
    value.unwrap_or("-").to_owned()
}
