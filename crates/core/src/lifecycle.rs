//! Lifecycle phase execution harness
//!
//! An action exposes up to two lifecycle phases, `main` and `post`, each backed
//! by an entry-point file. This module launches an entry point as a child
//! process with a controlled environment, captures both output streams as they
//! arrive, and classifies the outcome by exit code.

use crate::errors::ExecutionError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, instrument, warn};

/// Lifecycle phases of an action, in invocation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionPhase {
    /// Primary invocation
    Main,
    /// Cleanup invocation, run after `main` has completed
    Post,
}

impl ActionPhase {
    /// Get the phase name as string
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionPhase::Main => "main",
            ActionPhase::Post => "post",
        }
    }

    /// Manifest field holding this phase's entry point
    pub fn manifest_field(&self) -> &'static str {
        match self {
            ActionPhase::Main => "runs.main",
            ActionPhase::Post => "runs.post",
        }
    }
}

impl fmt::Display for ActionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Environment variable through which the orchestrator passes an input.
///
/// Spaces become underscores and the name is upper-cased; hyphens are kept,
/// so `working-directory` maps to `INPUT_WORKING-DIRECTORY`.
pub fn input_env_var(name: &str) -> String {
    format!("INPUT_{}", name.replace(' ', "_").to_uppercase())
}

/// Execution context for entry points
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    /// Program used to run the entry point; `None` executes the file directly
    pub interpreter: Option<String>,
    /// Environment variables passed to the child
    pub environment: IndexMap<String, String>,
    /// Inherit the parent environment instead of starting from a minimal one
    pub inherit_env: bool,
    /// Working directory for the child
    pub working_directory: Option<PathBuf>,
}

impl ExecutionContext {
    /// Create new execution context that runs entry points through `interpreter`
    pub fn new(interpreter: Option<String>) -> Self {
        Self {
            interpreter,
            ..Self::default()
        }
    }

    /// Add environment variable
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    /// Add an action input using the orchestrator's naming convention
    pub fn with_input(self, name: &str, value: impl Into<String>) -> Self {
        self.with_env(input_env_var(name), value)
    }

    /// Inherit the parent environment
    pub fn with_inherited_env(mut self, inherit: bool) -> Self {
        self.inherit_env = inherit;
        self
    }

    /// Set working directory
    pub fn with_working_directory(mut self, dir: PathBuf) -> Self {
        self.working_directory = Some(dir);
        self
    }

    fn command_for(&self, entry_point: &Path) -> (String, Command) {
        let (program, mut command) = match &self.interpreter {
            Some(interpreter) => {
                let mut cmd = Command::new(interpreter);
                cmd.arg(entry_point);
                (interpreter.clone(), cmd)
            }
            None => (entry_point.display().to_string(), Command::new(entry_point)),
        };

        if !self.inherit_env {
            command.env_clear();
            if let Some(path) = std::env::var_os("PATH") {
                command.env("PATH", path);
            }
        }
        command.envs(&self.environment);

        if let Some(ref dir) = self.working_directory {
            command.current_dir(dir);
        }

        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        (program, command)
    }
}

/// Output stream of a child process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl OutputStream {
    /// Get the stream name as string
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputStream::Stdout => "stdout",
            OutputStream::Stderr => "stderr",
        }
    }

    fn index(&self) -> usize {
        match self {
            OutputStream::Stdout => 0,
            OutputStream::Stderr => 1,
        }
    }

    /// Prefix written ahead of each chunk in a transcript
    pub fn tag(&self) -> &'static str {
        match self {
            OutputStream::Stdout => "stdout > ",
            OutputStream::Stderr => "stderr > ",
        }
    }
}

/// One read from a child output stream, as raw bytes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputChunk {
    pub stream: OutputStream,
    pub bytes: Vec<u8>,
}

/// Captured output of a child process, in arrival order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedOutput {
    chunks: Vec<OutputChunk>,
}

impl CapturedOutput {
    /// Append a chunk as received from the operating system
    pub fn push(&mut self, stream: OutputStream, bytes: &[u8]) {
        self.chunks.push(OutputChunk {
            stream,
            bytes: bytes.to_vec(),
        });
    }

    pub fn chunks(&self) -> &[OutputChunk] {
        &self.chunks
    }

    /// All chunks, each prefixed with its stream tag
    pub fn transcript(&self) -> String {
        self.decoded()
            .into_iter()
            .fold(String::new(), |mut acc, (stream, text)| {
                acc.push_str(stream.tag());
                acc.push_str(&text);
                acc
            })
    }

    /// All chunks from both streams, untagged
    pub fn combined(&self) -> String {
        self.decoded().into_iter().map(|(_, text)| text).collect()
    }

    /// Chunks from a single stream, untagged
    pub fn stream(&self, stream: OutputStream) -> String {
        self.decoded()
            .into_iter()
            .filter(|(s, _)| *s == stream)
            .map(|(_, text)| text)
            .collect()
    }

    /// Decode chunks in order. A UTF-8 sequence cut off at the end of a chunk
    /// is completed from the next chunk of the same stream.
    fn decoded(&self) -> Vec<(OutputStream, String)> {
        let mut carry: [Vec<u8>; 2] = Default::default();
        let mut decoded: Vec<(OutputStream, String)> = Vec::with_capacity(self.chunks.len());

        for chunk in &self.chunks {
            let pending = &mut carry[chunk.stream.index()];
            pending.extend_from_slice(&chunk.bytes);
            let cut = pending.len() - incomplete_suffix(pending);
            let tail = pending.split_off(cut);
            decoded.push((chunk.stream, String::from_utf8_lossy(pending).into_owned()));
            *pending = tail;
        }

        // Sequences still incomplete at end of output
        for stream in [OutputStream::Stdout, OutputStream::Stderr] {
            let pending = &carry[stream.index()];
            if pending.is_empty() {
                continue;
            }
            if let Some((_, text)) = decoded.iter_mut().rev().find(|(s, _)| *s == stream) {
                text.push_str(&String::from_utf8_lossy(pending));
            }
        }
        decoded
    }
}

/// Length of a trailing UTF-8 sequence that is missing continuation bytes
fn incomplete_suffix(bytes: &[u8]) -> usize {
    for back in 1..=bytes.len().min(3) {
        let byte = bytes[bytes.len() - back];
        if byte & 0xC0 == 0x80 {
            continue;
        }
        let width = match byte {
            0xC0..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF7 => 4,
            _ => 1,
        };
        return if width > back { back } else { 0 };
    }
    0
}

/// Result of a successful entry-point execution
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// Exit code of the child (always zero for a returned result)
    pub exit_code: i32,
    /// Captured output
    pub output: CapturedOutput,
    /// Wall-clock duration from spawn to exit
    pub duration: Duration,
}

impl ExecutionResult {
    /// Tagged transcript of both streams
    pub fn transcript(&self) -> String {
        self.output.transcript()
    }

    /// Untagged output of both streams in arrival order
    pub fn combined_output(&self) -> String {
        self.output.combined()
    }

    pub fn stdout(&self) -> String {
        self.output.stream(OutputStream::Stdout)
    }

    pub fn stderr(&self) -> String {
        self.output.stream(OutputStream::Stderr)
    }
}

/// Run an entry point to completion and capture its output.
///
/// Chunks from stdout and stderr are recorded in the order they are read.
/// A zero exit code yields the captured output; any other code yields
/// [`ExecutionError::NonZeroExit`] carrying the code and the full transcript.
/// Termination by signal is reported as exit code `-1`.
#[instrument(skip(ctx), fields(phase = %phase.as_str(), entry_point = %entry_point.display()))]
pub async fn run_entry_point(
    phase: ActionPhase,
    entry_point: &Path,
    ctx: &ExecutionContext,
) -> Result<ExecutionResult, ExecutionError> {
    let (program, mut command) = ctx.command_for(entry_point);
    let start_time = Instant::now();

    let mut child = command
        .spawn()
        .map_err(|source| ExecutionError::Spawn { program, source })?;

    let mut stdout = child.stdout.take().ok_or_else(|| ExecutionError::Capture {
        stream: "stdout",
        source: std::io::Error::other("stdout was not piped"),
    })?;
    let mut stderr = child.stderr.take().ok_or_else(|| ExecutionError::Capture {
        stream: "stderr",
        source: std::io::Error::other("stderr was not piped"),
    })?;

    let mut output = CapturedOutput::default();
    let mut stdout_buf = [0u8; 8192];
    let mut stderr_buf = [0u8; 8192];
    let mut stdout_open = true;
    let mut stderr_open = true;

    while stdout_open || stderr_open {
        let (stream, read) = tokio::select! {
            read = stdout.read(&mut stdout_buf), if stdout_open => (OutputStream::Stdout, read),
            read = stderr.read(&mut stderr_buf), if stderr_open => (OutputStream::Stderr, read),
        };
        let n = read.map_err(|source| ExecutionError::Capture {
            stream: stream.as_str(),
            source,
        })?;
        let (buf, open) = match stream {
            OutputStream::Stdout => (&stdout_buf[..n], &mut stdout_open),
            OutputStream::Stderr => (&stderr_buf[..n], &mut stderr_open),
        };
        if n == 0 {
            *open = false;
        } else {
            debug!("[{}] {}: {}", phase, stream.as_str(), String::from_utf8_lossy(buf));
            output.push(stream, buf);
        }
    }

    let exit_status = child.wait().await.map_err(ExecutionError::Wait)?;
    let exit_code = exit_status.code().unwrap_or(-1);
    let duration = start_time.elapsed();

    debug!("Entry point exited with code {} in {:?}", exit_code, duration);

    if exit_code != 0 {
        warn!("runs.{} exited with code {}", phase, exit_code);
        return Err(ExecutionError::NonZeroExit {
            code: exit_code,
            output: output.transcript(),
        });
    }

    Ok(ExecutionResult {
        exit_code,
        output,
        duration,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn script(dir: &TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, body).unwrap();
        path
    }

    fn sh() -> ExecutionContext {
        ExecutionContext::new(Some("sh".to_string()))
    }

    #[test]
    fn test_action_phase_as_str() {
        assert_eq!(ActionPhase::Main.as_str(), "main");
        assert_eq!(ActionPhase::Post.as_str(), "post");
        assert_eq!(ActionPhase::Post.manifest_field(), "runs.post");
        assert!(ActionPhase::Main < ActionPhase::Post);
    }

    #[test]
    fn test_input_env_var_convention() {
        assert_eq!(input_env_var("branch"), "INPUT_BRANCH");
        assert_eq!(
            input_env_var("working-directory"),
            "INPUT_WORKING-DIRECTORY"
        );
        assert_eq!(input_env_var("my input"), "INPUT_MY_INPUT");
    }

    #[test]
    fn test_captured_output_rendering() {
        let mut output = CapturedOutput::default();
        output.push(OutputStream::Stdout, b"foo");
        output.push(OutputStream::Stderr, b"warn");
        output.push(OutputStream::Stdout, b"bar");

        assert_eq!(output.transcript(), "stdout > foostderr > warnstdout > bar");
        assert_eq!(output.combined(), "foowarnbar");
        assert_eq!(output.stream(OutputStream::Stdout), "foobar");
        assert_eq!(output.stream(OutputStream::Stderr), "warn");
        assert_eq!(output.chunks().len(), 3);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_entry_point_success() {
        let dir = TempDir::new().unwrap();
        let entry = script(&dir, "ok.sh", "printf foobar\n");

        let result = run_entry_point(ActionPhase::Main, &entry, &sh())
            .await
            .unwrap();

        assert_eq!(result.exit_code, 0);
        assert_eq!(result.stdout(), "foobar");
        assert_eq!(result.stderr(), "");
        assert_eq!(result.combined_output(), "foobar");
        assert_eq!(result.transcript(), "stdout > foobar");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_entry_point_non_zero_exit_keeps_output() {
        let dir = TempDir::new().unwrap();
        let entry = script(&dir, "bad.sh", "printf 'went wrong' >&2\nexit 1\n");

        let err = run_entry_point(ActionPhase::Main, &entry, &sh())
            .await
            .unwrap_err();

        match &err {
            ExecutionError::NonZeroExit { code, output } => {
                assert_eq!(*code, 1);
                assert_eq!(output, "stderr > went wrong");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.to_string().contains("Exit code: 1"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_entry_point_spawn_failure() {
        let dir = TempDir::new().unwrap();
        let entry = script(&dir, "ok.sh", "printf foobar\n");
        let ctx = ExecutionContext::new(Some("definitely-not-an-interpreter-xyz".to_string()));

        let err = run_entry_point(ActionPhase::Main, &entry, &ctx)
            .await
            .unwrap_err();

        assert!(matches!(err, ExecutionError::Spawn { .. }));
    }

    /// Parse an `env` dump into a map
    fn env_dump(result: &ExecutionResult) -> IndexMap<String, String> {
        result
            .stdout()
            .lines()
            .filter_map(|line| line.split_once('='))
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_entry_point_minimal_environment() {
        // `env` run directly prints exactly what the child received, with no
        // shell in between to drop names such as `INPUT_WORKING-DIRECTORY`
        let entry = Path::new("env");
        std::env::set_var("ACTVERIFY_LEAK", "leaked");

        let ctx = ExecutionContext::new(None)
            .with_input("branch", "test-dummy")
            .with_input("working-directory", "test-dummy");
        let result = run_entry_point(ActionPhase::Main, entry, &ctx).await.unwrap();
        let env = env_dump(&result);
        assert_eq!(env.get("INPUT_BRANCH").map(String::as_str), Some("test-dummy"));
        assert_eq!(
            env.get("INPUT_WORKING-DIRECTORY").map(String::as_str),
            Some("test-dummy")
        );
        assert!(!env.contains_key("ACTVERIFY_LEAK"));
        assert!(env.keys().all(|key| key.starts_with("INPUT_") || key == "PATH"));

        let inherited = run_entry_point(ActionPhase::Main, entry, &ctx.with_inherited_env(true))
            .await
            .unwrap();
        let env = env_dump(&inherited);
        assert_eq!(env.get("ACTVERIFY_LEAK").map(String::as_str), Some("leaked"));
        assert_eq!(
            env.get("INPUT_WORKING-DIRECTORY").map(String::as_str),
            Some("test-dummy")
        );
        std::env::remove_var("ACTVERIFY_LEAK");
    }

    #[test]
    fn test_character_split_across_chunks_is_reassembled() {
        let mut output = CapturedOutput::default();
        output.push(OutputStream::Stdout, b"caf\xC3");
        output.push(OutputStream::Stderr, b"!");
        output.push(OutputStream::Stdout, b"\xA9 \xE2\x82");
        output.push(OutputStream::Stdout, b"\xAC");

        assert_eq!(output.stream(OutputStream::Stdout), "caf\u{e9} \u{20ac}");
        assert_eq!(output.combined(), "caf!\u{e9} \u{20ac}");
        assert_eq!(
            output.transcript(),
            "stdout > cafstderr > !stdout > \u{e9} stdout > \u{20ac}"
        );
    }

    #[test]
    fn test_truncated_character_at_end_is_replaced() {
        let mut output = CapturedOutput::default();
        output.push(OutputStream::Stdout, b"ok\xE2\x82");

        assert_eq!(output.combined(), "ok\u{fffd}");
        assert_eq!(incomplete_suffix(b"ok\xE2\x82"), 2);
        assert_eq!(incomplete_suffix("\u{20ac}".as_bytes()), 0);
        assert_eq!(incomplete_suffix(b"plain"), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_entry_point_reassembles_split_character() {
        let dir = TempDir::new().unwrap();
        let entry = script(&dir, "split.sh", "printf 'caf\\303'\nsleep 0.2\nprintf '\\251'\n");

        let result = run_entry_point(ActionPhase::Main, &entry, &sh())
            .await
            .unwrap();

        assert_eq!(result.combined_output(), "caf\u{e9}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_entry_point_tags_both_streams() {
        let dir = TempDir::new().unwrap();
        let entry = script(&dir, "both.sh", "printf out\nsleep 0.1\nprintf err >&2\n");

        let result = run_entry_point(ActionPhase::Post, &entry, &sh())
            .await
            .unwrap();

        assert_eq!(result.transcript(), "stdout > outstderr > err");
        assert_eq!(result.combined_output(), "outerr");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_entry_point_working_directory() {
        let dir = TempDir::new().unwrap();
        let entry = script(&dir, "pwd.sh", "ls\n");
        fs::write(dir.path().join("marker.txt"), "").unwrap();

        let ctx = sh().with_working_directory(dir.path().to_path_buf());
        let result = run_entry_point(ActionPhase::Main, &entry, &ctx)
            .await
            .unwrap();

        assert!(result.stdout().contains("marker.txt"));
    }
}
