//! Subprocess engine adapter.
//!
//! The engine program receives the [`EngineCall`] as one JSON document on
//! stdin, extended with an `output_path`. It must write the transformed table
//! to that path as a headered CSV and exit with status 0. Anything it prints
//! is kept as diagnostics; on a non-zero exit the last stderr line becomes
//! the failure message.
//!
//! The output path is also exported as `WEEDOUT_OUTPUT_PATH`.
//!
//! On Unix the engine leads its own process group. The whole group is killed
//! on timeout, and any workers still alive when the engine exits are killed
//! too, so the timeout covers everything the engine started.

use parking_lot::Mutex;
use serde::Serialize;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::{EngineCall, EngineFailure, EngineOutput, PreprocessingEngine};
use crate::csv_io::read_csv;

/// Per-stream cap on captured engine output.
const MAX_CAPTURE_BYTES: usize = 1024 * 1024;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// How long to keep reading engine output after the engine is gone.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

#[derive(Serialize)]
struct CommandPayload<'a> {
    #[serde(flatten)]
    call: &'a EngineCall,
    output_path: &'a Path,
}

/// Runs an external program as the preprocessing engine.
#[derive(Debug, Clone)]
pub struct CommandEngine {
    program: PathBuf,
    args: Vec<String>,
    timeout: Option<Duration>,
}

impl CommandEngine {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: None,
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Kill the engine if it runs longer than `timeout`.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn output_path_for(input: &Path) -> PathBuf {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        let name = format!(".{}.engine-{}.csv", stem, uuid::Uuid::new_v4());
        match input.parent() {
            Some(parent) => parent.join(name),
            None => PathBuf::from(name),
        }
    }

    fn spawn(&self, output_path: &Path) -> Result<Child, EngineFailure> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .env("WEEDOUT_OUTPUT_PATH", output_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        // Own process group, so workers the engine starts can be stopped with it.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        command.spawn().map_err(|e| {
            EngineFailure::new(format!(
                "Failed to start engine '{}': {}",
                self.program.display(),
                e
            ))
        })
    }

    fn wait(&self, child: &mut Child, started: Instant) -> Result<ExitStatus, EngineFailure> {
        loop {
            if let Some(limit) = self.timeout
                && started.elapsed() > limit
            {
                kill_process_group(child);
                let _ = child.kill();
                let _ = child.wait();
                return Err(EngineFailure::new(format!(
                    "Engine timed out after {:.1}s",
                    limit.as_secs_f64()
                )));
            }
            match child.try_wait() {
                Ok(Some(status)) => return Ok(status),
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => return Err(EngineFailure::new(format!("Failed to wait for engine: {}", e))),
            }
        }
    }

    fn execute(&self, call: &EngineCall, output_path: &Path) -> Result<EngineOutput, EngineFailure> {
        let payload = serde_json::to_vec(&CommandPayload { call, output_path })
            .map_err(|e| EngineFailure::new(format!("Failed to encode engine call: {}", e)))?;

        let started = Instant::now();
        let mut child = self.spawn(output_path)?;

        let stdout = child.stdout.take().map(|s| Capture::start(s, MAX_CAPTURE_BYTES));
        let stderr = child.stderr.take().map(|s| Capture::start(s, MAX_CAPTURE_BYTES));
        let feeder = child.stdin.take().map(|stdin| feed_stdin(stdin, payload));

        let status = self.wait(&mut child, started);
        // Stragglers still holding the pipes would keep the captures open.
        kill_process_group(&child);

        let out = Capture::finish(stdout);
        let err = Capture::finish(stderr);
        let diagnostics = combine_streams(&out, &err);

        let status = status.map_err(|f| f.with_diagnostics(diagnostics.clone()))?;

        if !status.success() {
            let message = err
                .lines()
                .rev()
                .map(str::trim)
                .find(|line| !line.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| format!("Engine exited with {}", status));
            return Err(EngineFailure::new(message).with_diagnostics(diagnostics));
        }

        if let Some(feeder) = feeder
            && feeder.is_finished()
            && let Ok(Err(e)) = feeder.join()
        {
            return Err(EngineFailure::new(format!("Failed to send engine call: {}", e))
                .with_diagnostics(diagnostics));
        }

        let frame = read_csv(output_path).map_err(|e| {
            EngineFailure::new(format!("Engine produced no readable output: {}", e))
                .with_diagnostics(diagnostics.clone())
        })?;

        Ok(EngineOutput { frame, diagnostics })
    }
}

impl PreprocessingEngine for CommandEngine {
    fn name(&self) -> &str {
        self.program.to_str().unwrap_or("command")
    }

    fn run(&self, call: &EngineCall) -> Result<EngineOutput, EngineFailure> {
        let output_path = Self::output_path_for(&call.file_path);
        let result = self.execute(call, &output_path);
        if output_path.exists() {
            let _ = std::fs::remove_file(&output_path);
        }
        result
    }
}

/// Write the call to the engine's stdin on its own thread.
///
/// An engine that exits without reading its input closes the pipe early,
/// which is not an error.
fn feed_stdin(mut stdin: ChildStdin, payload: Vec<u8>) -> JoinHandle<io::Result<()>> {
    thread::spawn(move || match stdin.write_all(&payload) {
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => Ok(()),
        other => other,
    })
}

/// Output stream drained on its own thread, keeping at most `cap` bytes.
struct Capture {
    buffer: Arc<Mutex<Vec<u8>>>,
    reader: JoinHandle<()>,
}

impl Capture {
    fn start<R: Read + Send + 'static>(mut source: R, cap: usize) -> Self {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let sink = buffer.clone();
        let reader = thread::spawn(move || {
            let mut chunk = [0u8; 8192];
            loop {
                let n = match source.read(&mut chunk) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => n,
                };
                let mut out = sink.lock();
                let room = cap.saturating_sub(out.len());
                out.extend_from_slice(&chunk[..n.min(room)]);
            }
        });
        Self { buffer, reader }
    }

    /// Text captured so far. Waits at most [`DRAIN_GRACE`] for the stream to
    /// close; a reader still blocked after that is left behind.
    fn finish(capture: Option<Self>) -> String {
        let Some(capture) = capture else {
            return String::new();
        };
        let deadline = Instant::now() + DRAIN_GRACE;
        while !capture.reader.is_finished() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        let bytes = capture.buffer.lock();
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

/// Send SIGKILL to the engine's process group.
#[cfg(unix)]
fn kill_process_group(child: &Child) {
    if let Ok(pgid) = i32::try_from(child.id()) {
        // SAFETY: kill(2) takes plain integers; a group that is already gone
        // yields ESRCH, which is ignored.
        unsafe {
            libc::kill(-pgid, libc::SIGKILL);
        }
    }
}

#[cfg(not(unix))]
fn kill_process_group(_child: &Child) {}

fn combine_streams(stdout: &str, stderr: &str) -> String {
    match (stdout.trim().is_empty(), stderr.trim().is_empty()) {
        (_, true) => stdout.to_string(),
        (true, false) => stderr.to_string(),
        (false, false) => format!("{}\n{}", stdout.trim_end(), stderr),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::engine::SamplingArg;
    use std::fs;
    use tempfile::TempDir;

    fn call_for(path: PathBuf) -> EngineCall {
        EngineCall {
            file_path: path,
            target_column: "target".to_string(),
            dropped_columns: vec![],
            untouched_columns: vec![],
            type_dataset: 0,
            sampling: SamplingArg::Number(0),
            classification: 1,
            strategy_sample: None,
        }
    }

    fn shell(script: &str) -> CommandEngine {
        CommandEngine::new("sh").args(["-c", script])
    }

    #[test]
    fn test_successful_run() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("iris.csv");
        fs::write(&input, "id,target\n1,0\n").unwrap();

        let engine = shell(
            r#"cat > /dev/null; echo "encoding columns"; printf 'id,target\n1,0\n2,1\n' > "$WEEDOUT_OUTPUT_PATH""#,
        );
        let output = engine.run(&call_for(input)).unwrap();

        assert_eq!(output.frame.height(), 2);
        assert!(output.diagnostics.contains("encoding columns"));
        // the intermediate output file is removed
        let leftovers: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[test]
    fn test_payload_reaches_stdin() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("iris.csv");
        let dump = dir.path().join("payload.json");

        let script = format!(
            r#"cat > "{}"; printf 'a\n1\n' > "$WEEDOUT_OUTPUT_PATH""#,
            dump.display()
        );
        shell(&script).run(&call_for(input)).unwrap();

        let payload: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&dump).unwrap()).unwrap();
        assert_eq!(payload["target_column"], "target");
        assert_eq!(payload["classification"], 1);
        assert!(payload["output_path"].as_str().is_some());
        assert!(payload.get("strategy_sample").is_none());
    }

    #[test]
    fn test_failure_uses_last_stderr_line() {
        let dir = TempDir::new().unwrap();
        let engine = shell(
            r#"cat > /dev/null; echo "loading"; echo "Traceback" >&2; echo "KeyError: 'y'" >&2; exit 3"#,
        );
        let failure = engine.run(&call_for(dir.path().join("a.csv"))).unwrap_err();

        assert_eq!(failure.message, "KeyError: 'y'");
        assert!(failure.diagnostics.contains("loading"));
        assert!(failure.diagnostics.contains("Traceback"));
    }

    #[test]
    fn test_missing_output_is_failure() {
        let dir = TempDir::new().unwrap();
        let failure = shell("cat > /dev/null")
            .run(&call_for(dir.path().join("a.csv")))
            .unwrap_err();
        assert!(failure.message.contains("no readable output"));
    }

    #[test]
    fn test_timeout_kills_engine() {
        let dir = TempDir::new().unwrap();
        let engine = shell("exec sleep 5").timeout(Duration::from_millis(100));

        let start = Instant::now();
        let failure = engine.run(&call_for(dir.path().join("a.csv"))).unwrap_err();

        assert!(failure.message.contains("timed out"));
        assert!(start.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn test_timeout_kills_engine_workers() {
        let dir = TempDir::new().unwrap();
        // No exec: the shell stays the leader and `sleep` is its own process.
        let engine = shell("cat > /dev/null; sleep 5; true").timeout(Duration::from_millis(200));

        let start = Instant::now();
        let failure = engine.run(&call_for(dir.path().join("a.csv"))).unwrap_err();

        assert!(failure.message.contains("timed out"));
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_timeout_covers_unread_input() {
        let dir = TempDir::new().unwrap();
        // Larger than a pipe buffer, so writing it blocks until the engine reads.
        let mut call = call_for(dir.path().join("a.csv"));
        call.dropped_columns = (0..20_000).map(|i| format!("column_{:06}", i)).collect();
        let engine = shell("sleep 5").timeout(Duration::from_millis(200));

        let start = Instant::now();
        let failure = engine.run(&call).unwrap_err();

        assert!(failure.message.contains("timed out"));
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_background_worker_does_not_hold_result() {
        let dir = TempDir::new().unwrap();
        let engine = shell(
            r#"cat > /dev/null; (sleep 5 &); printf 'id\n1\n' > "$WEEDOUT_OUTPUT_PATH""#,
        );

        let start = Instant::now();
        let output = engine.run(&call_for(dir.path().join("a.csv"))).unwrap();

        assert_eq!(output.frame.height(), 1);
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_missing_program() {
        let dir = TempDir::new().unwrap();
        let failure = CommandEngine::new("/nonexistent/weedout-engine")
            .run(&call_for(dir.path().join("a.csv")))
            .unwrap_err();
        assert!(failure.message.contains("Failed to start engine"));
    }
}
