//! Serialization of the documents printed on stdout.

use serde::Serialize;
use vresolve_common::types::OutputFormat;

/// Serializes `value` in the requested format, ending with a newline.
///
/// # Errors
///
/// Returns an error if the value cannot be serialized.
pub fn format_document<T: Serialize>(value: &T, format: OutputFormat) -> anyhow::Result<String> {
    let mut text = match format {
        OutputFormat::Json => serde_json::to_string_pretty(value)?,
        OutputFormat::Yaml => serde_yaml::to_string(value)?,
    };
    if !text.ends_with('\n') {
        text.push('\n');
    }
    Ok(text)
}

/// Prints `value` to stdout in the requested format.
///
/// # Errors
///
/// Returns an error if the value cannot be serialized.
pub fn print_document<T: Serialize>(value: &T, format: OutputFormat) -> anyhow::Result<()> {
    print!("{}", format_document(value, format)?);
    Ok(())
}
