//! Query command implementation.

use crate::config::CliError;
use bwlog_core::{
    Direction, DisplayFlags, LogRootReader, LogTime, MatchTarget, MessagePriority,
    Query, QueryItem, QueryParams, QueryResult,
};
use chrono::{Local, NaiveDateTime, TimeZone};
use clap::Args;
use serde::Serialize;
use std::path::Path;
use std::time::Duration;

/// Arguments of the query command.
#[derive(Debug, Args)]
pub struct QueryArgs {
    /// Uid whose log to search
    #[arg(short, long)]
    uid: Option<u16>,

    /// User name whose log to search (instead of --uid)
    #[arg(long, conflicts_with = "uid")]
    user: Option<String>,

    /// Start time: seconds since the epoch or "YYYY-MM-DD HH:MM:SS[.mmm]"
    #[arg(long)]
    from: Option<String>,

    /// End time (exclusive), same forms as --from
    #[arg(long)]
    to: Option<String>,

    /// Only entries from this host (name or dotted quad)
    #[arg(long)]
    host: Option<String>,

    /// Only entries from this pid
    #[arg(long)]
    pid: Option<i32>,

    /// Only entries from this app instance id
    #[arg(long)]
    app_id: Option<i32>,

    /// Comma-separated process type names
    #[arg(long, value_delimiter = ',')]
    procs: Vec<String>,

    /// Comma-separated severities (names or numbers)
    #[arg(long, value_delimiter = ',')]
    severities: Vec<String>,

    /// Only messages matching this regex
    #[arg(short = 'I', long)]
    include: Option<String>,

    /// No messages matching this regex
    #[arg(short = 'X', long)]
    exclude: Option<String>,

    /// Match patterns against format strings instead of messages
    #[arg(long)]
    match_format: bool,

    /// Newest entries first
    #[arg(short, long)]
    backwards: bool,

    /// Context entries around each match
    #[arg(short = 'C', long, default_value = "0")]
    context: usize,

    /// Stop after this many matches
    #[arg(short = 'n', long)]
    limit: Option<usize>,

    /// Keep waiting for new entries
    #[arg(short, long)]
    follow: bool,

    /// Poll interval for --follow, in milliseconds
    #[arg(long, default_value = "1000")]
    interval: u64,

    /// Comma-separated columns: date,time,host,user,pid,appid,procs,severity,message
    #[arg(long, value_delimiter = ',')]
    columns: Vec<String>,

    /// Output format (text, json)
    #[arg(long, default_value = "text")]
    format: String,
}

/// A result as printed by `--format json`.
#[derive(Debug, Serialize)]
pub struct ResultRecord<'a> {
    /// `match` or `context`.
    pub kind: &'static str,
    /// Entry time in seconds.
    pub time: f64,
    /// Sending host.
    pub host: &'a str,
    /// Owning user.
    pub user: &'a str,
    /// Process id.
    pub pid: i32,
    /// App instance id.
    pub app_id: i32,
    /// Process type.
    pub component: &'a str,
    /// Severity name.
    pub severity: &'static str,
    /// Rendered message.
    pub message: &'a str,
    /// Segment suffix.
    pub suffix: &'a str,
    /// Index in the segment.
    pub index: u32,
}

impl<'a> ResultRecord<'a> {
    fn new(kind: &'static str, r: &'a QueryResult) -> Self {
        Self {
            kind,
            time: r.time.as_secs_f64(),
            host: &r.host,
            user: &r.username,
            pid: r.pid,
            app_id: r.app_id,
            component: &r.component,
            severity: MessagePriority::name_of(r.priority),
            message: r.message.strip_suffix('\n').unwrap_or(&r.message),
            suffix: &r.address.suffix,
            index: r.address.index,
        }
    }
}

/// Parses seconds since the epoch or a local date-time.
pub fn parse_time(value: &str) -> Result<LogTime, CliError> {
    if let Ok(secs) = value.parse::<f64>() {
        return Ok(LogTime::from_secs_f64(secs));
    }
    let invalid = || CliError::InvalidArgument {
        what: "time",
        value: value.to_string(),
    };
    let naive = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"]
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(value, f).ok())
        .ok_or_else(invalid)?;
    let local = Local
        .from_local_datetime(&naive)
        .earliest()
        .ok_or_else(invalid)?;
    Ok(LogTime::new(
        local.timestamp(),
        local.timestamp_subsec_millis() as u16,
    ))
}

/// Builds a priority mask from names or numbers.
pub fn severity_mask(values: &[String]) -> Result<i32, CliError> {
    values.iter().try_fold(0i32, |mask, value| {
        let priority = value
            .parse::<u8>()
            .ok()
            .filter(|p| *p < 32)
            .or_else(|| MessagePriority::from_name(value).map(|p| p as u8))
            .ok_or_else(|| CliError::InvalidArgument {
                what: "severity",
                value: value.clone(),
            })?;
        Ok(mask | (1 << priority))
    })
}

fn display_flags(columns: &[String]) -> Result<DisplayFlags, CliError> {
    if columns.is_empty() {
        return Ok(DisplayFlags::default());
    }
    columns.iter().try_fold(DisplayFlags::NONE, |flags, name| {
        DisplayFlags::from_name(name)
            .map(|f| flags | f)
            .ok_or_else(|| CliError::InvalidArgument {
                what: "column",
                value: name.clone(),
            })
    })
}

fn build_params(
    reader: &LogRootReader,
    args: &QueryArgs,
) -> Result<QueryParams, Box<dyn std::error::Error>> {
    let uid = match (args.uid, &args.user) {
        (Some(uid), _) => uid,
        (None, Some(name)) => reader.uid_of(name).ok_or_else(|| CliError::InvalidArgument {
            what: "user",
            value: name.clone(),
        })?,
        (None, None) => {
            let mut users = reader.users();
            match (users.next(), users.next()) {
                (Some(only), None) => only.uid,
                _ => return Err("several users have logs: pass --uid or --user".into()),
            }
        }
    };

    let mut params = QueryParams::new(uid)
        .context_lines(args.context)
        .direction(if args.backwards {
            Direction::Backwards
        } else {
            Direction::Forwards
        });
    if let Some(from) = &args.from {
        params = params.start_time(parse_time(from)?);
    }
    if let Some(to) = &args.to {
        params = params.end_time(parse_time(to)?);
    }
    if let Some(host) = &args.host {
        params = params.host(host.clone());
    }
    if let Some(pid) = args.pid {
        params = params.pid(pid);
    }
    if let Some(app_id) = args.app_id {
        params = params.app_id(app_id);
    }
    if !args.procs.is_empty() {
        let names = reader.component_names();
        let mut mask = 0i32;
        for proc_name in &args.procs {
            let (id, _) = names
                .iter()
                .find(|(_, n)| n.eq_ignore_ascii_case(proc_name))
                .ok_or_else(|| CliError::InvalidArgument {
                    what: "process type",
                    value: proc_name.clone(),
                })?;
            mask |= 1i32.checked_shl(u32::from(*id)).unwrap_or(0);
        }
        params = params.process_types(mask);
    }
    if !args.severities.is_empty() {
        params = params.priorities(severity_mask(&args.severities)?);
    }
    if let Some(include) = &args.include {
        params = params.include(include.clone());
    }
    if let Some(exclude) = &args.exclude {
        params = params.exclude(exclude.clone());
    }
    if args.match_format {
        params = params.match_target(MatchTarget::FormatString);
    }
    Ok(params)
}

struct Printer {
    flags: DisplayFlags,
    json: bool,
    matches: usize,
    limit: usize,
}

impl Printer {
    fn done(&self) -> bool {
        self.matches >= self.limit
    }

    /// Prints everything the query currently has.
    fn drain(&mut self, query: &mut Query) -> Result<(), Box<dyn std::error::Error>> {
        while !self.done() {
            let Some(item) = query.next() else {
                break;
            };
            match item {
                Ok(QueryItem::Match(r)) => {
                    self.matches += 1;
                    self.print("match", &r)?;
                }
                Ok(QueryItem::Context(r)) => self.print("context", &r)?,
                Ok(QueryItem::Separator) if !self.json => println!("--"),
                Ok(QueryItem::Separator) => {}
                Err(e) if e.is_entry_local() => {
                    tracing::warn!(error = %e, "skipping unreadable entry");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    fn print(&self, kind: &'static str, r: &QueryResult) -> Result<(), Box<dyn std::error::Error>> {
        if self.json {
            println!("{}", serde_json::to_string(&ResultRecord::new(kind, r))?);
        } else {
            println!("{}", r.format(self.flags));
        }
        Ok(())
    }
}

/// Runs the query command.
pub fn run(path: &Path, args: &QueryArgs) -> Result<(), Box<dyn std::error::Error>> {
    let reader = LogRootReader::open(path)?;
    let params = build_params(&reader, args)?;
    let mut query = reader.query(params)?;

    let mut printer = Printer {
        flags: display_flags(&args.columns)?,
        json: args.format == "json",
        matches: 0,
        limit: args.limit.unwrap_or(usize::MAX),
    };

    printer.drain(&mut query)?;
    while args.follow && !printer.done() {
        std::thread::sleep(Duration::from_millis(args.interval));
        query.resume()?;
        printer.drain(&mut query)?;
    }

    tracing::debug!(
        matches = printer.matches,
        scanned = query.scanned(),
        "query finished"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn times() {
        assert_eq!(parse_time("12.5").unwrap(), LogTime::new(12, 500));
        let parsed = parse_time("2024-03-01 12:00:00.250").unwrap();
        assert_eq!(parsed.millis, 250);
        assert_eq!(
            parse_time("2024-03-01T12:00:00").unwrap().secs,
            parsed.secs
        );
        assert!(parse_time("yesterday").is_err());
    }

    #[test]
    fn severities() {
        let mask = severity_mask(&["info".to_string(), "5".to_string()]).unwrap();
        assert_eq!(mask, (1 << 2) | (1 << 5));
        assert!(severity_mask(&["loud".to_string()]).is_err());
    }

    #[test]
    fn columns() {
        let flags = display_flags(&["host".to_string(), "message".to_string()]).unwrap();
        assert_eq!(flags, DisplayFlags::HOST | DisplayFlags::MESSAGE);
        assert_eq!(display_flags(&[]).unwrap(), DisplayFlags::ALL);
        assert!(display_flags(&["colour".to_string()]).is_err());
    }
}
