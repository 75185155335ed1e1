use super::CollectError;
use std::time::Duration;
use system_utils::{run_pipeline_with_timeout, CommandSpec, PipelineError};

pub(super) async fn task_list(
    stages: &[CommandSpec],
    timeout: Duration,
) -> Result<String, CollectError> {
    let output = run_pipeline_with_timeout(stages, timeout)
        .await
        .map_err(|failure| match failure.error {
            PipelineError::TimedOut { after } => CollectError::TimedOut {
                what: "tasklist".to_string(),
                after,
            },
            _ => CollectError::Pipeline(failure),
        })?;
    if !output.stderr.is_empty() {
        tracing::warn!(
            stderr = %String::from_utf8_lossy(&output.stderr),
            "tasklist pipeline wrote to stderr"
        );
    }
    Ok(String::from_utf8_lossy(trim_trailing_newline(&output.stdout)).into_owned())
}

/// Drops one trailing `\n`, if there is one.
pub(super) fn trim_trailing_newline(bytes: &[u8]) -> &[u8] {
    bytes.strip_suffix(b"\n").unwrap_or(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_collectors;
    use tokio::process::Command;

    fn stage(argv: &[&str]) -> CommandSpec {
        CommandSpec::new(argv.iter().copied()).unwrap()
    }

    #[test]
    fn trims_only_a_trailing_newline() {
        assert_eq!(trim_trailing_newline(b"a\nb\n"), b"a\nb");
        assert_eq!(trim_trailing_newline(b"a\nb"), b"a\nb");
        assert_eq!(trim_trailing_newline(b"\n\n"), b"\n");
        assert_eq!(trim_trailing_newline(b""), b"");
    }

    #[tokio::test]
    async fn filters_process_listing() {
        let stages = [
            stage(&["printf", "1 init\\n2 su nobody -c x\\n3 sshd\\n"]),
            stage(&["grep", "su nobody"]),
        ];
        let list = task_list(&stages, Duration::from_secs(10)).await.unwrap();
        assert_eq!(list, "2 su nobody -c x");
    }

    #[tokio::test]
    async fn no_stages_yield_empty_list() {
        let list = task_list(&[], Duration::from_secs(10)).await.unwrap();
        assert_eq!(list, "");
    }

    #[tokio::test]
    async fn no_match_reports_filter_exit_status() {
        let stages = [stage(&["printf", "1 init\\n"]), stage(&["grep", "su nobody"])];
        let err = task_list(&stages, Duration::from_secs(10)).await.unwrap_err();
        assert!(matches!(err, CollectError::Pipeline(_)));
        assert_eq!(err.to_string(), "grep: exit status: 1");
    }

    #[tokio::test]
    async fn hung_pipeline_times_out() {
        let stages = [stage(&["sleep", "30"])];
        let err = task_list(&stages, Duration::from_millis(200))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "tasklist timed out after 200ms");
    }

    #[tokio::test]
    async fn stderr_does_not_fail_the_list() {
        let stages = [stage(&["sh", "-c", "echo warning >&2; echo row"])];
        let list = task_list(&stages, Duration::from_secs(10)).await.unwrap();
        assert_eq!(list, "row");
    }

    #[tokio::test]
    async fn default_filter_does_not_list_itself() {
        let mut target = Command::new("sh")
            .args(["-c", "sleep 30; : su nobody"])
            .kill_on_drop(true)
            .spawn()
            .unwrap();
        let collectors = default_collectors();
        let list = task_list(&collectors.tasklist, collectors.timeout)
            .await
            .unwrap();
        target.kill().await.ok();
        assert!(list.lines().any(|line| line.contains("sleep 30; : su nobody")));
        assert!(
            list.lines().all(|line| !line.contains("grep")),
            "filter listed itself: {list}"
        );
    }
}
