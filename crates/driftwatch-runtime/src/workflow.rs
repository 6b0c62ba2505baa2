//! Workflows executed once per test case
//!
//! A workflow is ordinary synchronous code that records results through the
//! [`CaseContext`] it is handed. Any closure with the right signature is a
//! workflow; [`CommandWorkflow`] runs an external program instead.

use anyhow::{Context, anyhow, bail};
use std::io::Read;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread::JoinHandle;
use std::time::Duration;

use driftwatch_core::{CaseContext, TestCase, WorkflowConfig};

/// Largest stdout captured inline as a string; longer output becomes a blob
pub const INLINE_STDOUT_LIMIT: usize = 4 * 1024;

/// Environment variable carrying the case id into command workflows
pub const CASE_ENV: &str = "DRIFTWATCH_CASE";

/// How often a running command checks for cancellation
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Code under test, run once per test case
///
/// Returning an error fails the case with the error chain as its message.
pub trait Workflow: Send + Sync + 'static {
    /// Execute the workflow for `ctx.testcase()`
    fn execute(&self, ctx: &CaseContext) -> anyhow::Result<()>;
}

impl<F> Workflow for F
where
    F: Fn(&CaseContext) -> anyhow::Result<()> + Send + Sync + 'static,
{
    fn execute(&self, ctx: &CaseContext) -> anyhow::Result<()> {
        self(ctx)
    }
}

/// Runs an external command per case and captures what it produced
///
/// Captured keys:
/// - `exit_code`: the process exit code (`-1` when killed by a signal)
/// - `stdout`: trimmed standard output, or a blob when it is large
/// - one artifact per declared output file, keyed by its resolved path
///
/// A non-zero exit code is a captured result, not a failure. Failing to
/// start the program or a missing output file fails the case. The process
/// is killed once the case is cancelled or times out.
#[derive(Debug, Clone)]
pub struct CommandWorkflow {
    command: Vec<String>,
    outputs: Vec<String>,
    working_dir: PathBuf,
}

impl CommandWorkflow {
    /// Workflow running `command` in the current directory
    pub fn new(command: Vec<String>) -> Self {
        Self {
            command,
            outputs: Vec::new(),
            working_dir: PathBuf::from("."),
        }
    }

    /// Workflow described by a configuration section
    pub fn from_config(config: &WorkflowConfig, working_dir: impl Into<PathBuf>) -> Self {
        Self::new(config.command.clone())
            .with_outputs(config.outputs.clone())
            .with_working_dir(working_dir)
    }

    /// Output files to capture as artifacts
    pub fn with_outputs(mut self, outputs: Vec<String>) -> Self {
        self.outputs = outputs;
        self
    }

    /// Directory the command runs in and output paths resolve against
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = dir.into();
        self
    }
}

impl Workflow for CommandWorkflow {
    fn execute(&self, ctx: &CaseContext) -> anyhow::Result<()> {
        let testcase = ctx.testcase();
        let argv = self
            .command
            .iter()
            .map(|arg| substitute(arg, testcase))
            .collect::<anyhow::Result<Vec<_>>>()?;
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| anyhow!("workflow command is empty"))?;

        tracing::debug!(program = %program, args = ?args, "Spawning workflow command");
        let mut child = Command::new(program)
            .args(args)
            .current_dir(&self.working_dir)
            .env(CASE_ENV, ctx.id())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("failed to run '{}'", program))?;
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if ctx.is_cancelled() {
                // Pipe readers are detached: a grandchild may still hold the pipes
                let _ = child.kill();
                let _ = child.wait();
                bail!("'{}' was killed after cancellation", program);
            }
            std::thread::sleep(POLL_INTERVAL);
        };
        let stdout = collect(stdout)?;
        let stderr = collect(stderr)?;

        let exit_code = status.code().unwrap_or(-1);
        if exit_code != 0 {
            tracing::debug!(
                exit_code,
                stderr = %String::from_utf8_lossy(&stderr).trim(),
                "Workflow command exited non-zero"
            );
        }
        ctx.capture("exit_code", exit_code)?;

        if stdout.len() > INLINE_STDOUT_LIMIT {
            ctx.capture_artifact("stdout", stdout)?;
        } else {
            ctx.capture("stdout", String::from_utf8_lossy(&stdout).trim())?;
        }

        for template in &self.outputs {
            let relative = substitute(template, testcase)?;
            let path = self.working_dir.join(&relative);
            let bytes = std::fs::read(&path)
                .with_context(|| format!("output file {} was not produced", path.display()))?;
            ctx.capture_artifact(&relative, bytes)?;
        }

        Ok(())
    }
}

/// Read a child pipe to the end on its own thread
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<std::io::Result<Vec<u8>>> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            pipe.read_to_end(&mut buf)?;
        }
        Ok(buf)
    })
}

fn collect(reader: JoinHandle<std::io::Result<Vec<u8>>>) -> anyhow::Result<Vec<u8>> {
    reader
        .join()
        .map_err(|_| anyhow!("output reader thread panicked"))?
        .context("failed to read command output")
}

/// Replace `{case}` and `{param:<name>}` placeholders in `template`
pub fn substitute(template: &str, testcase: &TestCase) -> anyhow::Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        let Some(end) = tail.find('}') else {
            out.push_str(tail);
            return Ok(out);
        };
        let placeholder = &tail[1..end];

        if placeholder == "case" {
            out.push_str(&testcase.id);
        } else if let Some(name) = placeholder.strip_prefix("param:") {
            match testcase.parameters.get(name) {
                Some(value) => out.push_str(value),
                None => bail!(
                    "test case '{}' has no parameter '{}' for placeholder in '{}'",
                    testcase.id,
                    name,
                    template
                ),
            }
        } else {
            out.push_str(&tail[..=end]);
        }
        rest = &tail[end + 1..];
    }

    out.push_str(rest);
    Ok(out)
}
