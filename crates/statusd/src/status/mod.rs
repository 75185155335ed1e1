//! Builds the status record served on every request.
//!
//! Collectors never fail the record: each field carries either its value or
//! the text of the error that prevented reading it.

mod fields;
mod tasklist;

use crate::config::CollectorConfig;
use serde::Serialize;
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use system_utils::PipelineFailure;
use thiserror::Error;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub(crate) struct StatusRecord {
    pub(crate) host: String,
    pub(crate) load: String,
    pub(crate) memory: String,
    pub(crate) time: String,
    pub(crate) tasklist: String,
}

#[derive(Debug, Error)]
pub(crate) enum CollectError {
    #[error("hostname: {0}")]
    Hostname(#[source] io::Error),
    #[error("read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Pipeline(#[from] PipelineFailure),
    #[error("{what} timed out after {after:?}")]
    TimedOut { what: String, after: Duration },
}

pub(crate) async fn collect_status(config: &CollectorConfig) -> StatusRecord {
    let (load, memory, tasklist) = tokio::join!(
        fields::load_average(&config.loadavg_path, config.timeout),
        fields::memory_usage(&config.meminfo_path, config.timeout),
        tasklist::task_list(&config.tasklist, config.timeout),
    );
    StatusRecord {
        host: render_field("host", fields::host_name()),
        load: render_field("load", load),
        memory: render_field("memory", memory),
        time: fields::local_time(),
        tasklist: render_field("tasklist", tasklist),
    }
}

fn render_field(field: &'static str, result: Result<String, CollectError>) -> String {
    result.unwrap_or_else(|err| {
        tracing::debug!(field, error = %err, "collector failed");
        err.to_string()
    })
}
