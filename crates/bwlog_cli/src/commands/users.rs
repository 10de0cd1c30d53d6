//! Users command implementation.

use bwlog_core::user_log::Extremity;
use bwlog_core::LogRootReader;
use serde::Serialize;
use std::path::Path;

/// One user and the span of their log.
#[derive(Debug, Serialize)]
pub struct UserSummary {
    /// Uid.
    pub uid: u16,
    /// Directory name.
    pub username: String,
    /// Number of segments.
    pub segments: usize,
    /// Time of the oldest entry, in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first: Option<f64>,
    /// Time of the newest entry, in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last: Option<f64>,
}

/// Runs the users command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let reader = LogRootReader::open(path)?;
    let mut users = Vec::new();

    for info in reader.users() {
        let log = match reader.user_log(info.uid) {
            Ok(log) => log,
            Err(e) => {
                tracing::warn!(uid = info.uid, error = %e, "cannot open user log");
                continue;
            }
        };
        let time_of = |which| {
            log.extremity(which)
                .and_then(|address| log.get_entry(&address).ok())
                .map(|entry| entry.time.as_secs_f64())
        };
        users.push(UserSummary {
            uid: info.uid,
            username: info.username.clone(),
            segments: log.segment_count(),
            first: time_of(Extremity::Begin),
            last: time_of(Extremity::End),
        });
    }

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&users)?);
        }
        _ => {
            println!("{:>6}  {:<16} {:>8}", "UID", "USER", "SEGMENTS");
            for user in &users {
                println!("{:>6}  {:<16} {:>8}", user.uid, user.username, user.segments);
            }
        }
    }

    Ok(())
}
