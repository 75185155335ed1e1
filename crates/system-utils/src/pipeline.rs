//! Runs a chain of external commands, each stage's stdout feeding the next
//! stage's stdin through an OS pipe.
//!
//! Only the last stage's stdout is captured. Every stage's stderr lands in
//! one shared buffer, so interleaving between stages is best-effort.

use std::io;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

use crate::capture::{read_stream_capture, CaptureBuffers};
use crate::path::resolve_command_path;

/// One stage of a pipeline: a program followed by its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    argv: Vec<String>,
}

impl CommandSpec {
    pub fn new<I, S>(argv: I) -> Result<Self, PipelineError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let argv: Vec<String> = argv.into_iter().map(Into::into).collect();
        match argv.first() {
            Some(program) if !program.trim().is_empty() => Ok(Self { argv }),
            _ => Err(PipelineError::EmptyCommand),
        }
    }

    pub fn program(&self) -> &str {
        &self.argv[0]
    }

    pub fn args(&self) -> &[String] {
        &self.argv[1..]
    }

    pub fn argv(&self) -> &[String] {
        &self.argv
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("empty command")]
    EmptyCommand,
    #[error("create pipe: {0}")]
    Pipe(#[source] io::Error),
    #[error("spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("wait on {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("{program}: {status}")]
    Exit { program: String, status: ExitStatus },
    #[error("read output of {program}: {source}")]
    Capture {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("pipeline timed out after {after:?}")]
    TimedOut { after: Duration },
}

/// A failed run together with whatever the stages wrote before it stopped.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct PipelineFailure {
    pub error: PipelineError,
    pub output: PipelineOutput,
}

/// Runs `stages` to completion.
///
/// An empty slice is a no-op that succeeds with empty output. Stages are
/// started first to last and then waited on in the same order; the first
/// spawn, wait or exit failure ends the run, and stages still alive at that
/// point are killed.
pub async fn run_pipeline(stages: &[CommandSpec]) -> Result<PipelineOutput, PipelineFailure> {
    let buffers = CaptureBuffers::default();
    let result = execute_stages(stages, &buffers).await;
    finish(result, &buffers).await
}

/// Same as [`run_pipeline`], but every stage is killed once `timeout` elapses.
pub async fn run_pipeline_with_timeout(
    stages: &[CommandSpec],
    timeout: Duration,
) -> Result<PipelineOutput, PipelineFailure> {
    let buffers = CaptureBuffers::default();
    let result = match tokio::time::timeout(timeout, execute_stages(stages, &buffers)).await {
        Ok(result) => result,
        Err(_) => Err(PipelineError::TimedOut { after: timeout }),
    };
    finish(result, &buffers).await
}

async fn finish(
    result: Result<(), PipelineError>,
    buffers: &CaptureBuffers,
) -> Result<PipelineOutput, PipelineFailure> {
    let (stdout, stderr) = buffers.snapshot().await;
    let output = PipelineOutput { stdout, stderr };
    match result {
        Ok(()) => Ok(output),
        Err(error) => {
            tracing::debug!(
                error = %error,
                stderr_bytes = output.stderr.len(),
                "pipeline failed"
            );
            Err(PipelineFailure { error, output })
        }
    }
}

struct RunningStage {
    program: String,
    child: Child,
    captures: Vec<JoinHandle<io::Result<()>>>,
}

impl RunningStage {
    /// Waits for the process and for its captured streams to reach EOF.
    async fn wait(mut self) -> Result<(), PipelineError> {
        let status = self
            .child
            .wait()
            .await
            .map_err(|source| PipelineError::Wait {
                program: self.program.clone(),
                source,
            })?;
        for capture in self.captures.drain(..) {
            let source = match capture.await {
                Ok(Ok(())) => continue,
                Ok(Err(err)) => err,
                Err(join) => io::Error::other(join),
            };
            return Err(PipelineError::Capture {
                program: self.program,
                source,
            });
        }
        if !status.success() {
            return Err(PipelineError::Exit {
                program: self.program,
                status,
            });
        }
        Ok(())
    }
}

async fn execute_stages(
    stages: &[CommandSpec],
    buffers: &CaptureBuffers,
) -> Result<(), PipelineError> {
    if stages.is_empty() {
        return Ok(());
    }

    let commands = build_commands(stages)?;

    let mut running = Vec::with_capacity(stages.len());
    for (stage, mut cmd) in stages.iter().zip(commands) {
        let mut child = cmd.spawn().map_err(|source| PipelineError::Spawn {
            program: stage.program().to_string(),
            source,
        })?;
        // The command still owns the parent's copies of the pipe ends.
        drop(cmd);

        let mut captures = Vec::with_capacity(2);
        if let Some(stderr) = child.stderr.take() {
            captures.push(tokio::spawn(read_stream_capture(
                stderr,
                Arc::clone(&buffers.stderr),
            )));
        }
        if let Some(stdout) = child.stdout.take() {
            captures.push(tokio::spawn(read_stream_capture(
                stdout,
                Arc::clone(&buffers.stdout),
            )));
        }
        running.push(RunningStage {
            program: stage.program().to_string(),
            child,
            captures,
        });
    }

    for stage in running {
        stage.wait().await?;
    }
    Ok(())
}

/// Wires every pipe before any stage is started.
fn build_commands(stages: &[CommandSpec]) -> Result<Vec<Command>, PipelineError> {
    let last = stages.len() - 1;
    let mut commands = Vec::with_capacity(stages.len());
    let mut upstream: Option<io::PipeReader> = None;

    for (index, stage) in stages.iter().enumerate() {
        let mut cmd = Command::new(resolve_command_path(stage.program()));
        cmd.args(stage.args());
        match upstream.take() {
            Some(reader) => cmd.stdin(reader),
            None => cmd.stdin(Stdio::null()),
        };
        if index < last {
            let (reader, writer) = io::pipe().map_err(PipelineError::Pipe)?;
            cmd.stdout(writer);
            upstream = Some(reader);
        } else {
            cmd.stdout(Stdio::piped());
        }
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);
        commands.push(cmd);
    }

    Ok(commands)
}
