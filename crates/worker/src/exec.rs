#![forbid(unsafe_code)]

use serde_json::Value;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use tm_engine::{Generator, GeneratorError, GeneratorRequest};

const WAIT_POLL_MS: u64 = 50;

// Shells out to a configured generator binary: the request goes to stdin as
// JSON, the proposal comes back on stdout. Bounded by a wall-clock timeout;
// the child is killed when it expires.
pub(crate) struct ProcessGenerator {
    bin: String,
    timeout_ms: u64,
}

impl ProcessGenerator {
    pub(crate) fn new(bin: impl Into<String>, timeout_ms: u64) -> Self {
        Self {
            bin: bin.into(),
            timeout_ms,
        }
    }
}

impl Generator for ProcessGenerator {
    fn generate(&self, request: &GeneratorRequest) -> Result<Value, GeneratorError> {
        let out_path = capture_path();
        let result = self.run(request, &out_path);
        let _ = std::fs::remove_file(&out_path);
        result
    }
}

impl ProcessGenerator {
    fn run(&self, request: &GeneratorRequest, out_path: &Path) -> Result<Value, GeneratorError> {
        let stdout_file = File::create(out_path)
            .map_err(|e| GeneratorError::Unavailable(format!("create capture file failed: {e}")))?;

        let mut child = Command::new(&self.bin)
            .stdin(Stdio::piped())
            .stdout(Stdio::from(stdout_file))
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                GeneratorError::Unavailable(format!("failed to spawn generator ({}): {e}", self.bin))
            })?;

        let payload = serde_json::to_string(request)
            .map_err(|e| GeneratorError::Unavailable(format!("encode request failed: {e}")))?;
        if let Some(mut stdin) = child.stdin.take() {
            // A generator that exits early closes the pipe; that is its call.
            let _ = stdin.write_all(payload.as_bytes());
        }

        let deadline = Instant::now() + Duration::from_millis(self.timeout_ms);
        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    if !status.success() {
                        return Err(GeneratorError::Unavailable(format!(
                            "generator exited with {status}"
                        )));
                    }
                    break;
                }
                Ok(None) => {
                    if Instant::now() >= deadline {
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(GeneratorError::Timeout);
                    }
                    std::thread::sleep(Duration::from_millis(WAIT_POLL_MS));
                }
                Err(e) => {
                    return Err(GeneratorError::Unavailable(format!("wait failed: {e}")));
                }
            }
        }

        let text = std::fs::read_to_string(out_path)
            .map_err(|e| GeneratorError::Malformed(format!("read output failed: {e}")))?;
        parse_output(&text)
    }
}

// Some generator wrappers nest the schema-validated payload under
// `structured_output`; unwrap it so downstream coercion sees the items.
pub(crate) fn parse_output(text: &str) -> Result<Value, GeneratorError> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| GeneratorError::Malformed(format!("parse output failed: {e}")))?;
    if let Some(structured) = value.get("structured_output") {
        return Ok(structured.clone());
    }
    Ok(value)
}

fn capture_path() -> PathBuf {
    let nonce = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    std::env::temp_dir().join(format!(
        "tm_worker_generator_{}_{nonce}.json",
        std::process::id()
    ))
}
