use super::CollectError;
use chrono::{DateTime, Local, TimeZone};
use std::fmt::Display;
use std::path::Path;
use std::time::Duration;

const TIME_FORMAT: &str = "%Y %m/%d %H%M-%S";

pub(super) fn host_name() -> Result<String, CollectError> {
    hostname::get()
        .map(|name| name.to_string_lossy().to_string())
        .map_err(CollectError::Hostname)
}

/// First line of the load-average source, without its terminator.
pub(super) async fn load_average(path: &Path, timeout: Duration) -> Result<String, CollectError> {
    let content = read_source(path, timeout).await?;
    Ok(content.lines().next().unwrap_or_default().to_string())
}

pub(super) async fn memory_usage(path: &Path, timeout: Duration) -> Result<String, CollectError> {
    let content = read_source(path, timeout).await?;
    Ok(format_memory(&content))
}

pub(super) fn local_time() -> String {
    format_time(&Local::now())
}

/// Renders `<free>/<total>` from meminfo text. A missing label leaves its side empty.
pub(super) fn format_memory(meminfo: &str) -> String {
    let mut free = "";
    let mut total = "";
    for line in meminfo.lines() {
        if let Some(rest) = line.strip_prefix("MemFree:") {
            free = first_field(rest);
        } else if let Some(rest) = line.strip_prefix("MemTotal:") {
            total = first_field(rest);
        }
    }
    format!("{free}/{total}")
}

pub(super) fn format_time<Tz>(time: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    time.format(TIME_FORMAT).to_string()
}

fn first_field(rest: &str) -> &str {
    rest.split_whitespace().next().unwrap_or_default()
}

async fn read_source(path: &Path, timeout: Duration) -> Result<String, CollectError> {
    match tokio::time::timeout(timeout, tokio::fs::read(path)).await {
        Ok(Ok(bytes)) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
        Ok(Err(source)) => Err(CollectError::Read {
            path: path.to_path_buf(),
            source,
        }),
        Err(_) => Err(CollectError::TimedOut {
            what: format!("read {}", path.display()),
            after: timeout,
        }),
    }
}
