/// Job Runner - executes an adapter's recipe against a job directory
///
/// **Responsibility:**
/// Spawn the optional compile command, then the run command, with the job
/// directory as working directory, under ONE deadline shared by both steps.
///
/// **Guarantees:**
/// - Compile strictly precedes run; a failed or timed-out compile skips run
/// - Time spent compiling is deducted from the run budget, never reset
/// - stdout and stderr are captured separately, up to a per-stream cap
/// - Every child runs in its own process group; on deadline, cancellation or
///   normal exit the whole group is SIGKILLed so no grandchild outlives the job
/// - Partial output is returned on timeout
///
/// The runner knows nothing about workspaces or validation; that is the
/// executor's job.

use crate::adapters::{CommandContext, LanguageAdapter};
use crate::error::ExecutionError;
use chrono::{DateTime, Utc};
use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use polyrun_common::types::{ExecutionResult, Outcome, Phase};
use std::io::ErrorKind;
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// How long to keep reading pipes after the process group is gone.
const OUTPUT_DRAIN_GRACE: Duration = Duration::from_millis(500);
const READ_CHUNK_BYTES: usize = 8 * 1024;
const TRUNCATION_MARKER: &str = "\n[output truncated]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Prepared,
    Compiling,
    Running,
    Finished,
}

/// One accepted request, materialized on disk and ready to run.
#[derive(Debug)]
pub struct Job {
    pub id: Uuid,
    pub language: String,
    pub work_dir: PathBuf,
    pub source_file: PathBuf,
    pub artifact: Option<PathBuf>,
    /// Entry name substituted for `{entry}`.
    pub entry: String,
    pub deadline: Instant,
    pub started_at: DateTime<Utc>,
    started: Instant,
    state: JobState,
}

impl Job {
    /// The deadline starts counting now.
    pub fn new(
        id: Uuid,
        language: impl Into<String>,
        work_dir: PathBuf,
        source_file: PathBuf,
        budget: Duration,
    ) -> Self {
        let started = Instant::now();
        Self {
            id,
            language: language.into(),
            work_dir,
            source_file,
            artifact: None,
            entry: crate::adapters::DEFAULT_ENTRY.to_string(),
            deadline: started + budget,
            started_at: Utc::now(),
            started,
            state: JobState::Prepared,
        }
    }

    pub fn with_artifact(mut self, artifact: Option<PathBuf>) -> Self {
        self.artifact = artifact;
        self
    }

    pub fn with_entry(mut self, entry: impl Into<String>) -> Self {
        self.entry = entry.into();
        self
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn budget(&self) -> Duration {
        self.deadline.saturating_duration_since(self.started)
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    fn context(&self) -> CommandContext<'_> {
        CommandContext {
            source: &self.source_file,
            artifact: self.artifact.as_deref(),
            entry: &self.entry,
            workdir: &self.work_dir,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Termination {
    Exited,
    DeadlineElapsed,
    Cancelled,
}

#[derive(Debug, Default)]
struct Captured {
    text: String,
    truncated: bool,
}

#[derive(Debug)]
struct ProcessOutput {
    status: Option<ExitStatus>,
    stdout: Captured,
    stderr: Captured,
    termination: Termination,
}

impl ProcessOutput {
    fn succeeded(&self) -> bool {
        self.termination == Termination::Exited && self.status.is_some_and(|s| s.success())
    }

    fn exit_code(&self) -> Option<i32> {
        self.status.and_then(|s| s.code())
    }
}

#[derive(Debug, Clone)]
pub struct JobRunner {
    max_output_bytes: usize,
}

impl JobRunner {
    pub fn new(max_output_bytes: usize) -> Self {
        Self { max_output_bytes }
    }

    /// Run `job` with `adapter`'s recipe. Returns a result for every terminal
    /// outcome; errors are reserved for infrastructure failures and
    /// cancellation.
    #[tracing::instrument(
        skip_all,
        fields(job_id = %job.id, language = %job.language, budget_ms = job.budget().as_millis() as u64)
    )]
    pub async fn run(
        &self,
        job: &mut Job,
        adapter: &LanguageAdapter,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult, ExecutionError> {
        let result = self.run_phases(job, adapter, cancel).await;
        job.state = JobState::Finished;
        result
    }

    async fn run_phases(
        &self,
        job: &mut Job,
        adapter: &LanguageAdapter,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult, ExecutionError> {
        let (compile_cmd, run_cmd) = {
            let ctx = job.context();
            (adapter.compile_command(&ctx), adapter.run_command(&ctx))
        };

        if let Some(argv) = compile_cmd {
            job.state = JobState::Compiling;
            debug!(command = ?argv, "Compiling");

            let output = self
                .spawn_and_wait(Phase::Compile, &argv, &job.work_dir, job.deadline, cancel)
                .await?;

            match output.termination {
                Termination::Cancelled => return Err(ExecutionError::Cancelled),
                Termination::DeadlineElapsed => {
                    return Ok(self.finish(job, Outcome::Timeout, Some(Phase::Compile), output));
                }
                Termination::Exited if !output.succeeded() => {
                    warn!(
                        compile_ms = job.elapsed().as_millis() as u64,
                        error_preview = output.stderr.text.lines().next().unwrap_or(""),
                        "Compilation failed"
                    );
                    return Ok(self.finish(job, Outcome::CompileError, None, output));
                }
                Termination::Exited => {
                    debug!(
                        compile_ms = job.elapsed().as_millis() as u64,
                        remaining_ms = job.remaining().as_millis() as u64,
                        "Compilation succeeded"
                    );
                }
            }
        }

        job.state = JobState::Running;
        debug!(command = ?run_cmd, "Running");

        let output = self
            .spawn_and_wait(Phase::Run, &run_cmd, &job.work_dir, job.deadline, cancel)
            .await?;

        match output.termination {
            Termination::Cancelled => Err(ExecutionError::Cancelled),
            Termination::DeadlineElapsed => {
                Ok(self.finish(job, Outcome::Timeout, Some(Phase::Run), output))
            }
            Termination::Exited if output.succeeded() => {
                Ok(self.finish(job, Outcome::Success, None, output))
            }
            Termination::Exited => Ok(self.finish(job, Outcome::RuntimeError, None, output)),
        }
    }

    /// Spawn one command and wait for it to exit, the deadline to pass, or
    /// the token to be cancelled, whichever comes first.
    async fn spawn_and_wait(
        &self,
        phase: Phase,
        argv: &[String],
        cwd: &Path,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Result<ProcessOutput, ExecutionError> {
        let (program, args) = argv.split_first().ok_or_else(|| {
            ExecutionError::infrastructure(format!("empty {} command", phase), String::new())
        })?;

        let mut std_command = std::process::Command::new(program);
        std_command
            .args(args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0);

        let mut command = tokio::process::Command::from(std_command);
        command.kill_on_drop(true);

        let mut child = command
            .spawn()
            .map_err(|e| spawn_error(program, phase, e))?;
        let mut group = ProcessGroup::new(child.id());

        let stdout = OutputCapture::spawn(child.stdout.take(), self.max_output_bytes);
        let stderr = OutputCapture::spawn(child.stderr.take(), self.max_output_bytes);

        let waited = tokio::select! {
            status = child.wait() => Ok(status),
            _ = tokio::time::sleep_until(deadline) => Err(Termination::DeadlineElapsed),
            _ = cancel.cancelled() => Err(Termination::Cancelled),
        };

        let (status, termination) = match waited {
            Ok(Ok(status)) => (Some(status), Termination::Exited),
            Ok(Err(e)) => {
                group.kill();
                let _ = child.wait().await;
                return Err(ExecutionError::infrastructure(
                    format!("failed to wait for {} process '{}': {}", phase, program, e),
                    String::new(),
                ));
            }
            Err(termination) => {
                if termination == Termination::DeadlineElapsed {
                    warn!(phase = %phase, program = %program, "Deadline elapsed, killing process group");
                } else {
                    info!(phase = %phase, program = %program, "Cancelled, killing process group");
                }
                group.kill();
                if let Err(e) = child.wait().await {
                    warn!(error = %e, "Failed to reap killed process");
                }
                (None, termination)
            }
        };

        // Descendants may outlive the leader and keep the pipes open.
        group.kill();

        Ok(ProcessOutput {
            status,
            stdout: stdout.finish().await,
            stderr: stderr.finish().await,
            termination,
        })
    }

    fn finish(
        &self,
        job: &Job,
        outcome: Outcome,
        timed_out_in: Option<Phase>,
        output: ProcessOutput,
    ) -> ExecutionResult {
        let exit_code = output.exit_code();
        let truncated = output.stdout.truncated || output.stderr.truncated;

        let mut stdout = output.stdout.text;
        if output.stdout.truncated {
            stdout.push_str(TRUNCATION_MARKER);
        }

        let mut stderr = match outcome {
            // Some compilers report diagnostics on stdout only
            Outcome::CompileError if output.stderr.text.trim().is_empty() => {
                std::mem::take(&mut stdout)
            }
            _ => output.stderr.text,
        };
        if output.stderr.truncated {
            stderr.push_str(TRUNCATION_MARKER);
        }

        match outcome {
            Outcome::Timeout => {
                let phase = timed_out_in.unwrap_or(Phase::Run);
                push_note(
                    &mut stderr,
                    &format!(
                        "[Execution timed out after {}ms during {}]",
                        job.budget().as_millis(),
                        phase
                    ),
                );
            }
            Outcome::RuntimeError => {
                if let Some(note) = output.status.as_ref().and_then(signal_note) {
                    push_note(&mut stderr, &note);
                }
            }
            Outcome::Success | Outcome::CompileError => {}
        }

        let finished_at = Utc::now();
        let duration_ms = job.elapsed().as_millis() as u64;

        match outcome {
            Outcome::Success => info!(duration_ms, "Execution succeeded"),
            Outcome::Timeout => warn!(duration_ms, phase = ?timed_out_in, "Execution timed out"),
            _ => info!(duration_ms, outcome = %outcome, exit_code = ?exit_code, "Execution failed"),
        }

        ExecutionResult {
            job_id: job.id,
            success: outcome == Outcome::Success,
            outcome,
            timed_out_in,
            stdout,
            stderr,
            exit_code,
            language: job.language.clone(),
            started_at: job.started_at,
            finished_at,
            duration_ms,
            truncated,
        }
    }
}

fn push_note(stderr: &mut String, note: &str) {
    if !stderr.is_empty() && !stderr.ends_with('\n') {
        stderr.push('\n');
    }
    stderr.push_str(note);
}

fn spawn_error(program: &str, phase: Phase, e: std::io::Error) -> ExecutionError {
    let message = match e.kind() {
        ErrorKind::NotFound => format!("toolchain '{}' not found", program),
        ErrorKind::PermissionDenied => format!("toolchain '{}' is not executable", program),
        _ => format!("failed to spawn {} command '{}'", phase, program),
    };
    ExecutionError::infrastructure(message, e.to_string())
}

/// Human-readable note for a process killed by a signal.
fn signal_note(status: &ExitStatus) -> Option<String> {
    let signal = status.signal()?;
    let note = match Signal::try_from(signal) {
        Ok(Signal::SIGSEGV) => "[Process killed: segmentation fault]".to_string(),
        Ok(Signal::SIGKILL) => "[Process killed: SIGKILL, likely out of memory]".to_string(),
        Ok(Signal::SIGABRT) => "[Process aborted]".to_string(),
        Ok(sig) => format!("[Process terminated by signal {} ({})]", signal, sig.as_str()),
        Err(_) => format!("[Process terminated by signal {}]", signal),
    };
    Some(note)
}

/// Kill guard for a child's process group.
///
/// Killing happens at most once; the guard also fires on drop so a cancelled
/// future cannot leak the tree.
struct ProcessGroup {
    pgid: Option<Pid>,
}

impl ProcessGroup {
    fn new(pid: Option<u32>) -> Self {
        Self {
            pgid: pid.map(|pid| Pid::from_raw(pid as i32)),
        }
    }

    fn kill(&mut self) {
        let Some(pgid) = self.pgid.take() else {
            return;
        };
        match killpg(pgid, Signal::SIGKILL) {
            Ok(()) | Err(Errno::ESRCH) => {}
            Err(e) => warn!(pgid = %pgid, error = %e, "Failed to kill process group"),
        }
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill();
    }
}

struct CaptureBuffer {
    bytes: Vec<u8>,
    limit: usize,
    truncated: bool,
}

impl CaptureBuffer {
    fn push(&mut self, data: &[u8]) {
        let room = self.limit.saturating_sub(self.bytes.len());
        if data.len() > room {
            self.bytes.extend_from_slice(&data[..room]);
            self.truncated = true;
        } else {
            self.bytes.extend_from_slice(data);
        }
    }
}

/// Background reader for one pipe. The buffer is shared so whatever was read
/// before a kill is still available if the reader has to be aborted.
struct OutputCapture {
    buffer: Arc<Mutex<CaptureBuffer>>,
    task: Option<JoinHandle<()>>,
}

impl OutputCapture {
    fn spawn<R>(reader: Option<R>, limit: usize) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buffer = Arc::new(Mutex::new(CaptureBuffer {
            bytes: Vec::new(),
            limit,
            truncated: false,
        }));

        let task = reader.map(|mut reader| {
            let buffer = Arc::clone(&buffer);
            tokio::spawn(async move {
                let mut chunk = vec![0u8; READ_CHUNK_BYTES];
                loop {
                    match reader.read(&mut chunk).await {
                        Ok(0) => break,
                        // Keep draining past the cap so the child never blocks on a full pipe
                        Ok(n) => lock(&buffer).push(&chunk[..n]),
                        Err(e) => {
                            debug!(error = %e, "Output pipe read failed");
                            break;
                        }
                    }
                }
            })
        });

        Self { buffer, task }
    }

    async fn finish(mut self) -> Captured {
        if let Some(mut task) = self.task.take() {
            if tokio::time::timeout(OUTPUT_DRAIN_GRACE, &mut task).await.is_err() {
                debug!("Output pipe still open after process exit, abandoning reader");
                task.abort();
            }
        }

        let mut buffer = lock(&self.buffer);
        Captured {
            text: String::from_utf8_lossy(&buffer.bytes).into_owned(),
            truncated: std::mem::take(&mut buffer.truncated),
        }
    }
}

fn lock(buffer: &Mutex<CaptureBuffer>) -> MutexGuard<'_, CaptureBuffer> {
    buffer.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::LanguageRegistry;
    use polyrun_common::types::RecipeShape;
    use std::fs;

    const MAX_OUTPUT: usize = 64 * 1024;

    fn has_bash() -> bool {
        which::which("bash").is_ok()
    }

    fn bash() -> LanguageAdapter {
        LanguageRegistry::builtin().get("bash").unwrap().as_ref().clone()
    }

    /// A path-addressed adapter driven entirely by bash snippets.
    fn scripted_compiler(compile_script: &str, run_script: &str) -> LanguageAdapter {
        LanguageAdapter {
            id: "scripted".to_string(),
            aliases: vec![],
            extension: "txt".to_string(),
            shape: RecipeShape::PathAddressed,
            compile: Some(vec![
                "bash".to_string(),
                "-c".to_string(),
                compile_script.to_string(),
                "{artifact}".to_string(),
            ]),
            run: vec![
                "bash".to_string(),
                "-c".to_string(),
                run_script.to_string(),
                "{artifact}".to_string(),
            ],
            default_entry: None,
            artifact_extension: None,
        }
    }

    fn job_in(dir: &Path, source: &str, budget: Duration) -> Job {
        let id = Uuid::new_v4();
        let source_file = dir.join("main.sh");
        fs::write(&source_file, source).unwrap();
        Job::new(id, "bash", dir.to_path_buf(), source_file, budget)
            .with_artifact(Some(dir.join("artifact")))
    }

    /// True while `pid` exists and is not a zombie.
    fn is_running(pid: i32) -> bool {
        let Ok(stat) = fs::read_to_string(format!("/proc/{}/stat", pid)) else {
            return false;
        };
        let state = stat
            .rsplit_once(')')
            .and_then(|(_, rest)| rest.trim_start().chars().next());
        !matches!(state, Some('Z') | Some('X') | None)
    }

    #[tokio::test]
    async fn test_success_captures_streams_separately() {
        if !has_bash() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let mut job = job_in(
            dir.path(),
            "echo out\necho warn >&2\nexit 0\n",
            Duration::from_secs(10),
        );
        let runner = JobRunner::new(MAX_OUTPUT);

        let result = runner
            .run(&mut job, &bash(), &CancellationToken::new())
            .await
            .unwrap();

        assert!(result.success, "stderr: {}", result.stderr);
        assert_eq!(result.outcome, Outcome::Success);
        assert_eq!(result.stdout, "out\n");
        assert_eq!(result.stderr, "warn\n");
        assert_eq!(result.exit_code, Some(0));
        assert_eq!(job.state(), JobState::Finished);
        assert!(result.finished_at >= result.started_at);
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_runtime_error() {
        if !has_bash() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let mut job = job_in(dir.path(), "echo partial\nexit 3\n", Duration::from_secs(10));

        let result = JobRunner::new(MAX_OUTPUT)
            .run(&mut job, &bash(), &CancellationToken::new())
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(result.outcome, Outcome::RuntimeError);
        assert_eq!(result.exit_code, Some(3));
        assert_eq!(result.stdout, "partial\n");
    }

    #[tokio::test]
    async fn test_signal_death_is_annotated() {
        if !has_bash() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let mut job = job_in(dir.path(), "kill -SEGV $$\n", Duration::from_secs(10));

        let result = JobRunner::new(MAX_OUTPUT)
            .run(&mut job, &bash(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.outcome, Outcome::RuntimeError);
        assert_eq!(result.exit_code, None);
        assert!(result.stderr.contains("segmentation fault"), "{}", result.stderr);
    }

    #[tokio::test]
    async fn test_timeout_returns_partial_output() {
        if !has_bash() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let mut job = job_in(
            dir.path(),
            "echo started\nsleep 30\necho never\n",
            Duration::from_millis(500),
        );

        let start = std::time::Instant::now();
        let result = JobRunner::new(MAX_OUTPUT)
            .run(&mut job, &bash(), &CancellationToken::new())
            .await
            .unwrap();

        assert!(start.elapsed() < Duration::from_secs(5));
        assert!(!result.success);
        assert!(result.is_timeout());
        assert_eq!(result.timed_out_in, Some(Phase::Run));
        assert_eq!(result.stdout, "started\n");
        assert!(result.stderr.contains("timed out"));
        assert_eq!(result.exit_code, None);
    }

    #[tokio::test]
    async fn test_timeout_kills_grandchildren() {
        if !has_bash() || !Path::new("/proc/self/stat").exists() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let mut job = job_in(
            dir.path(),
            "sleep 60 &\necho $! > grandchild.pid\nwait\n",
            Duration::from_millis(500),
        );

        let result = JobRunner::new(MAX_OUTPUT)
            .run(&mut job, &bash(), &CancellationToken::new())
            .await
            .unwrap();
        assert!(result.is_timeout());

        let pid: i32 = fs::read_to_string(dir.path().join("grandchild.pid"))
            .unwrap()
            .trim()
            .parse()
            .unwrap();

        let mut alive = true;
        for _ in 0..40 {
            if !is_running(pid) {
                alive = false;
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(!alive, "grandchild {} survived the timeout", pid);
    }

    #[tokio::test]
    async fn test_background_process_is_killed_after_normal_exit() {
        if !has_bash() || !Path::new("/proc/self/stat").exists() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let mut job = job_in(
            dir.path(),
            "sleep 60 > /dev/null 2>&1 &\necho $! > bg.pid\necho done\n",
            Duration::from_secs(10),
        );

        let result = JobRunner::new(MAX_OUTPUT)
            .run(&mut job, &bash(), &CancellationToken::new())
            .await
            .unwrap();
        assert!(result.success);

        let pid: i32 = fs::read_to_string(dir.path().join("bg.pid"))
            .unwrap()
            .trim()
            .parse()
            .unwrap();
        let mut alive = true;
        for _ in 0..40 {
            if !is_running(pid) {
                alive = false;
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(!alive);
    }

    #[tokio::test]
    async fn test_compile_failure_skips_run() {
        if !has_bash() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let mut job = job_in(dir.path(), "irrelevant", Duration::from_secs(10));
        let adapter = scripted_compiler(
            "echo 'main.txt:1: expected expression' >&2; exit 1",
            "touch ran",
        );

        let result = JobRunner::new(MAX_OUTPUT)
            .run(&mut job, &adapter, &CancellationToken::new())
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(result.outcome, Outcome::CompileError);
        assert!(result.stderr.contains("expected expression"));
        assert!(!dir.path().join("ran").exists());
    }

    #[tokio::test]
    async fn test_compile_diagnostics_on_stdout_are_reported() {
        if !has_bash() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let mut job = job_in(dir.path(), "irrelevant", Duration::from_secs(10));
        let adapter = scripted_compiler("echo 'syntax error'; exit 2", "true");

        let result = JobRunner::new(MAX_OUTPUT)
            .run(&mut job, &adapter, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.outcome, Outcome::CompileError);
        assert!(result.stderr.contains("syntax error"));
    }

    #[tokio::test]
    async fn test_compile_then_run() {
        if !has_bash() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let mut job = job_in(dir.path(), "irrelevant", Duration::from_secs(10));
        let adapter = scripted_compiler("echo 'echo compiled' > \"$0\"", "bash \"$0\"");

        let result = JobRunner::new(MAX_OUTPUT)
            .run(&mut job, &adapter, &CancellationToken::new())
            .await
            .unwrap();

        assert!(result.success, "stderr: {}", result.stderr);
        assert_eq!(result.stdout, "compiled\n");
    }

    #[tokio::test]
    async fn test_deadline_is_shared_between_compile_and_run() {
        if !has_bash() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let budget = Duration::from_millis(2000);
        let mut job = job_in(dir.path(), "irrelevant", budget);
        // Each step fits the budget alone; together they do not.
        let adapter = scripted_compiler("sleep 1.5; echo built > \"$0\"", "sleep 1; echo ran");

        let start = std::time::Instant::now();
        let result = JobRunner::new(MAX_OUTPUT)
            .run(&mut job, &adapter, &CancellationToken::new())
            .await
            .unwrap();
        let elapsed = start.elapsed();

        assert!(result.is_timeout());
        assert_eq!(result.timed_out_in, Some(Phase::Run));
        assert!(elapsed < budget + Duration::from_millis(1500), "took {:?}", elapsed);
        assert!(!result.stdout.contains("ran"));
    }

    #[tokio::test]
    async fn test_compile_timeout_is_tagged() {
        if !has_bash() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let mut job = job_in(dir.path(), "irrelevant", Duration::from_millis(300));
        let adapter = scripted_compiler("sleep 30", "touch ran");

        let result = JobRunner::new(MAX_OUTPUT)
            .run(&mut job, &adapter, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.outcome, Outcome::Timeout);
        assert_eq!(result.timed_out_in, Some(Phase::Compile));
        assert!(!dir.path().join("ran").exists());
    }

    #[tokio::test]
    async fn test_output_is_capped() {
        if !has_bash() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let mut job = job_in(
            dir.path(),
            "for i in $(seq 1 1000); do echo 0123456789; done\n",
            Duration::from_secs(10),
        );

        let result = JobRunner::new(16)
            .run(&mut job, &bash(), &CancellationToken::new())
            .await
            .unwrap();

        assert!(result.success);
        assert!(result.truncated);
        assert!(result.stdout.starts_with("0123456789\n01234"));
        assert!(result.stdout.ends_with(TRUNCATION_MARKER));
    }

    #[tokio::test]
    async fn test_missing_toolchain_is_infrastructure_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut job = job_in(dir.path(), "x", Duration::from_secs(10));
        let mut adapter = bash();
        adapter.run = vec![
            "polyrun-no-such-toolchain".to_string(),
            "{source}".to_string(),
        ];

        let err = JobRunner::new(MAX_OUTPUT)
            .run(&mut job, &adapter, &CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            ExecutionError::Infrastructure { message, .. } => {
                assert!(message.contains("polyrun-no-such-toolchain"));
            }
            other => panic!("expected infrastructure error, got {:?}", other),
        }
        assert_eq!(job.state(), JobState::Finished);
    }

    #[tokio::test]
    async fn test_cancellation_stops_the_job() {
        if !has_bash() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let mut job = job_in(dir.path(), "sleep 30\n", Duration::from_secs(30));
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            trigger.cancel();
        });

        let start = std::time::Instant::now();
        let err = JobRunner::new(MAX_OUTPUT)
            .run(&mut job, &bash(), &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, ExecutionError::Cancelled));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_capture_buffer_truncates_at_limit() {
        let mut buffer = CaptureBuffer {
            bytes: Vec::new(),
            limit: 5,
            truncated: false,
        };
        buffer.push(b"abc");
        assert!(!buffer.truncated);
        buffer.push(b"defg");
        assert_eq!(buffer.bytes, b"abcde");
        assert!(buffer.truncated);
        buffer.push(b"h");
        assert_eq!(buffer.bytes, b"abcde");
    }

    #[test]
    fn test_job_budget() {
        let job = Job::new(
            Uuid::new_v4(),
            "python",
            PathBuf::from("/tmp"),
            PathBuf::from("/tmp/a.py"),
            Duration::from_secs(30),
        );
        assert_eq!(job.budget(), Duration::from_secs(30));
        assert!(job.remaining() <= Duration::from_secs(30));
        assert_eq!(job.state(), JobState::Prepared);
        assert_eq!(job.entry, "Main");
    }
}
