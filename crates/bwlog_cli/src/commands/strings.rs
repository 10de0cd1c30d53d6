//! Strings command implementation.

use bwlog_core::LogRootReader;
use regex::Regex;
use serde::Serialize;
use std::path::Path;

/// One catalog entry.
#[derive(Debug, Serialize)]
pub struct FormatStringInfo {
    /// Offset in the `strings` file.
    pub offset: u32,
    /// Format text.
    pub text: String,
}

/// Runs the strings command.
pub fn run(
    path: &Path,
    grep: Option<&str>,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let reader = LogRootReader::open(path)?;
    let filter = grep.map(Regex::new).transpose()?;

    let strings: Vec<_> = reader
        .format_strings()
        .into_iter()
        .filter(|(_, text)| filter.as_ref().map_or(true, |re| re.is_match(text)))
        .map(|(offset, text)| FormatStringInfo { offset, text })
        .collect();

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&strings)?);
        }
        _ => {
            for s in &strings {
                println!("{:>10}  {:?}", s.offset, s.text);
            }
        }
    }

    Ok(())
}
