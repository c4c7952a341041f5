//! Command-line flag surface.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Local, NaiveDate, TimeZone, Utc};
use clap::Parser;

use super::constants::{default_user_agent, DATE_FORMAT, TIMESTAMP_FORMAT};

#[derive(Debug, Parser)]
#[command(
    name = "pagewatch",
    about = "Polite, resumable single-host web crawler that monitors pages for changes.",
    disable_version_flag = true
)]
pub struct Opt {
    /// Absolute base URL to crawl, e.g. <http/https>://<domain-name>.
    /// Required unless running with --server or -v.
    #[arg(long)]
    pub baseurl: Option<String>,

    /// Number of crawlers to invoke
    #[arg(long, default_value_t = 10)]
    pub n: usize,

    /// Idle time after which a crawler quits when the queue is empty. Min: 1s
    #[arg(long = "idle-time", default_value = "10s", value_parser = parse_duration)]
    pub idle_time: Duration,

    /// Delay between subsequent requests. Min: 1ms
    #[arg(long = "req-delay", default_value = "50ms", value_parser = parse_duration)]
    pub req_delay: Duration,

    /// Number of times to retry failed GET requests
    #[arg(long, default_value_t = 2)]
    pub retry: u32,

    /// Days past which monitored URLs should be updated
    #[arg(long, default_value_t = 1)]
    pub days: u32,

    /// User-Agent string to use while crawling
    #[arg(long, default_value_t = default_user_agent())]
    pub ua: String,

    /// Comma separated marked url paths to save/update. An unmonitored URL
    /// matching a marked path is promoted to monitored.
    #[arg(long, default_value = "")]
    pub murls: String,

    /// Comma separated url patterns to ignore
    #[arg(long, default_value = "")]
    pub ignore: String,

    /// DSN string to database. Postgres DSN supported; when empty the
    /// crawler uses the embedded sqlite database.
    #[arg(long = "db-dsn", default_value = "")]
    pub db_dsn: String,

    /// Write the latest crawled content to disk and exit. Customise with
    /// --path and --date.
    #[arg(long)]
    pub db2disk: bool,

    /// Output path for crawled page content (with --db2disk)
    #[arg(long)]
    pub path: Option<PathBuf>,

    /// Cut-off date (YYYY-MM-DD) up to which the latest crawled pages are
    /// saved to disk (with --db2disk)
    #[arg(long)]
    pub date: Option<String>,

    /// Re-queue all saved and alive URLs of the base URL to refresh their
    /// embedded HREFs without saving content
    #[arg(long = "update-hrefs")]
    pub update_hrefs: bool,

    /// Open the management server on port 8100. All other options except
    /// --db-dsn and --verbose are ignored.
    #[arg(long)]
    pub server: bool,

    /// Prints additional info while logging
    #[arg(long)]
    pub verbose: bool,

    /// Display app version
    #[arg(short = 'v')]
    pub version: bool,
}

impl Opt {
    /// The exporter output root: `--path` or `./OUT/<timestamp>`.
    pub fn save_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(default_save_path)
    }
}

/// The default exporter output root, `./OUT/<timestamp>`.
pub fn default_save_path() -> PathBuf {
    PathBuf::from(format!("./OUT/{}", Local::now().format(TIMESTAMP_FORMAT)))
}

/// Parses duration literals with a unit suffix: `500us`, `50ms`, `10s`,
/// `5m`, `1h`.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    let unit_start = s
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| format!("missing unit in duration '{s}'"))?;
    let (value, unit) = s.split_at(unit_start);
    let value: u64 = value
        .parse()
        .map_err(|_| format!("invalid duration '{s}'"))?;
    match unit {
        "us" | "µs" => Ok(Duration::from_micros(value)),
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => Ok(Duration::from_secs(value * 60)),
        "h" => Ok(Duration::from_secs(value * 3600)),
        _ => Err(format!("unknown duration unit '{unit}'")),
    }
}

/// Splits a comma-separated flag value, trimming entries and dropping
/// empties.
pub fn separate_args(args: &str) -> Vec<String> {
    args.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Marked URL paths from the flag value, each given a leading `/` when
/// missing.
pub fn marked_url_args(args: &str) -> Vec<String> {
    separate_args(args)
        .into_iter()
        .map(|m| {
            if m.starts_with('/') {
                m
            } else {
                format!("/{m}")
            }
        })
        .collect()
}

/// Parses the exporter cut-off date (`YYYY-MM-DD`, local midnight) and
/// extends it by 24h − 1s so the whole day is included. `None` means today.
pub fn parse_cutoff_date(date: Option<&str>) -> Result<DateTime<Utc>, String> {
    let date_str = match date {
        Some(d) => d.to_string(),
        None => Local::now().format(DATE_FORMAT).to_string(),
    };
    let naive = NaiveDate::parse_from_str(&date_str, DATE_FORMAT)
        .map_err(|e| format!("could not parse cut-off date: {e}"))?;
    let start = Local
        .from_local_datetime(&naive.and_hms_opt(0, 0, 0).expect("midnight is valid"))
        .single()
        .ok_or_else(|| format!("ambiguous local date '{date_str}'"))?;
    Ok(start.with_timezone(&Utc) + chrono::Duration::hours(24) - chrono::Duration::seconds(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration_units() {
        assert_eq!(parse_duration("500us").unwrap(), Duration::from_micros(500));
        assert_eq!(parse_duration("50ms").unwrap(), Duration::from_millis(50));
        assert_eq!(parse_duration("10s").unwrap(), Duration::from_secs(10));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
    }

    #[test]
    fn test_parse_duration_rejects_garbage() {
        assert!(parse_duration("10").is_err());
        assert!(parse_duration("s").is_err());
        assert!(parse_duration("10d").is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn test_separate_args() {
        assert_eq!(separate_args(""), Vec::<String>::new());
        assert_eq!(separate_args("a"), vec!["a"]);
        assert_eq!(separate_args(" a , b ,,c"), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_marked_url_args_leading_slash() {
        assert_eq!(
            marked_url_args("accounts,/loans"),
            vec!["/accounts", "/loans"]
        );
    }

    #[test]
    fn test_parse_cutoff_date() {
        let cutoff = parse_cutoff_date(Some("2026-08-01")).unwrap();
        let next = parse_cutoff_date(Some("2026-08-02")).unwrap();
        // the cutoff covers the whole named day
        assert_eq!(next - cutoff, chrono::Duration::hours(24));
        assert!(parse_cutoff_date(Some("01-08-2026")).is_err());
        assert!(parse_cutoff_date(None).is_ok());
    }
}
