//! Inspect command implementation.

use crate::config::FileConfig;
use bwlog_core::root::{ActiveFiles, LogRootDir};
use bwlog_core::segment::LogEntry;
use bwlog_core::LogRootReader;
use serde::Serialize;
use std::path::Path;

const ENTRY_SIZE: u64 = LogEntry::SIZE as u64;

/// Root inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Root path.
    pub path: String,
    /// Layout version.
    pub version: Option<u32>,
    /// Segment budget in bytes.
    pub segment_budget: u64,
    /// Number of format strings.
    pub format_strings: usize,
    /// Process type names, by id.
    pub component_names: Vec<String>,
    /// Known hosts.
    pub hosts: Vec<HostInfo>,
    /// Files the writer has open.
    pub active_files: Vec<String>,
    /// Per-user statistics.
    pub users: Vec<UserStats>,
}

/// One cached hostname.
#[derive(Debug, Serialize)]
pub struct HostInfo {
    /// Dotted quad.
    pub address: String,
    /// Name.
    pub name: String,
}

/// Statistics for one user log.
#[derive(Debug, Serialize)]
pub struct UserStats {
    /// Uid.
    pub uid: u16,
    /// Directory name.
    pub username: String,
    /// Number of component records.
    pub components: usize,
    /// Total entries.
    pub entries: u64,
    /// Total bytes across segments.
    pub bytes: u64,
    /// Segment details (if requested).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segments: Option<Vec<SegmentStats>>,
}

/// Statistics for one segment.
#[derive(Debug, Serialize)]
pub struct SegmentStats {
    /// Segment suffix.
    pub suffix: String,
    /// Number of entries.
    pub entries: u32,
    /// Size of the args file.
    pub args_size: u64,
    /// Share of the segment budget used.
    pub fill: f64,
    /// First entry time, in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<f64>,
    /// Last entry time, in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<f64>,
}

/// Runs the inspect command.
pub fn run(
    path: &Path,
    config: &FileConfig,
    show_segments: bool,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let reader = LogRootReader::open(path)?;
    let budget = config.segment_size_bytes();

    let mut result = InspectResult {
        path: path.display().to_string(),
        version: LogRootDir::open(path, false)?.read_version()?,
        segment_budget: budget,
        format_strings: reader.format_strings().len(),
        component_names: reader
            .component_names()
            .into_iter()
            .map(|(_, name)| name)
            .collect(),
        hosts: reader
            .hostnames()
            .into_iter()
            .map(|(ip, name)| HostInfo {
                address: ip.to_string(),
                name,
            })
            .collect(),
        active_files: ActiveFiles::read(path)?,
        users: Vec::new(),
    };

    for info in reader.users() {
        let log = reader.user_log(info.uid)?;
        let segments: Vec<SegmentStats> = log
            .segments()
            .iter()
            .map(|s| {
                let bytes = u64::from(s.num_entries()) * ENTRY_SIZE + s.args_size();
                SegmentStats {
                    suffix: s.suffix().to_string(),
                    entries: s.num_entries(),
                    args_size: s.args_size(),
                    fill: bytes as f64 / budget.max(1) as f64,
                    start: s.start().map(|t| t.as_secs_f64()),
                    end: s.end().map(|t| t.as_secs_f64()),
                }
            })
            .collect();

        result.users.push(UserStats {
            uid: info.uid,
            username: info.username.clone(),
            components: log.components().len(),
            entries: segments.iter().map(|s| u64::from(s.entries)).sum(),
            bytes: segments
                .iter()
                .map(|s| u64::from(s.entries) * ENTRY_SIZE + s.args_size)
                .sum(),
            segments: show_segments.then_some(segments),
        });
    }

    // Output
    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

fn print_text_output(result: &InspectResult) {
    println!("Log Root: {}", result.path);
    match result.version {
        Some(v) => println!("Version: {v}"),
        None => println!("Version: (missing)"),
    }
    println!("Segment budget: {} bytes", result.segment_budget);
    println!("Format strings: {}", result.format_strings);
    println!("Process types: {}", result.component_names.join(", "));
    println!();

    println!("Hosts:");
    for host in &result.hosts {
        println!("  {:<15} {}", host.address, host.name);
    }
    println!();

    if !result.active_files.is_empty() {
        println!("Active files:");
        for file in &result.active_files {
            println!("  {file}");
        }
        println!();
    }

    println!("Users:");
    for user in &result.users {
        println!(
            "  {:>6} {:<16} {:>10} entries {:>12} bytes {:>4} components",
            user.uid, user.username, user.entries, user.bytes, user.components
        );
        for segment in user.segments.iter().flatten() {
            println!(
                "         {:<28} {:>10} entries {:>6.1}% full",
                segment.suffix,
                segment.entries,
                segment.fill * 100.0
            );
        }
    }
}
