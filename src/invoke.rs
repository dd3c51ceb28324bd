use std::io::{self, Read};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::{debug, warn};

use crate::model::Answer;
use crate::util::round2;

pub const QA_PROGRAM: &str = "claude-mpm";
pub const QUESTION_TIMEOUT: Duration = Duration::from_secs(120);
const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone)]
pub struct Invocation {
    pub program: String,
    pub leading_args: Vec<String>,
    pub trailing_args: Vec<String>,
    pub timeout: Duration,
}

impl Default for Invocation {
    fn default() -> Self {
        let owned = |values: &[&str]| -> Vec<String> {
            values.iter().map(|value| value.to_string()).collect()
        };
        Self {
            program: QA_PROGRAM.to_string(),
            leading_args: owned(&[
                "run",
                "--non-interactive",
                "--no-hooks",
                "--no-tickets",
                "--launch-method",
                "subprocess",
                "-i",
            ]),
            trailing_args: owned(&["--", "--output-format", "json", "--verbose"]),
            timeout: QUESTION_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParsedOutput {
    ParseSuccess {
        response: String,
        input_tokens: u64,
        output_tokens: u64,
    },
    ParseFailure {
        raw_text: String,
    },
}

impl ParsedOutput {
    pub fn into_parts(self) -> (String, u64, u64) {
        match self {
            Self::ParseSuccess {
                response,
                input_tokens,
                output_tokens,
            } => (response, input_tokens, output_tokens),
            Self::ParseFailure { raw_text } => (raw_text, 0, 0),
        }
    }
}

#[derive(Debug)]
pub enum InvocationOutcome {
    Completed {
        status: ExitStatus,
        stdout: String,
        stderr: String,
    },
    TimedOut,
    Failed(String),
}

impl Invocation {
    pub fn command(&self, sandbox: &Path, question: &str) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.leading_args)
            .arg(question)
            .args(&self.trailing_args)
            .current_dir(sandbox)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        command
    }

    pub fn ask(&self, sandbox: &Path, question: &str) -> Answer {
        let started = Instant::now();
        let outcome = self.execute(sandbox, question);
        let elapsed_seconds = round2(started.elapsed().as_secs_f64());

        match outcome {
            InvocationOutcome::Completed {
                status,
                stdout,
                stderr,
            } => {
                let (response, input_tokens, output_tokens) =
                    parse_output(stdout.trim()).into_parts();
                let error = if status.success() { None } else { Some(stderr) };
                debug!(
                    elapsed_seconds,
                    input_tokens,
                    output_tokens,
                    success = status.success(),
                    "question answered"
                );

                Answer {
                    response,
                    elapsed_seconds,
                    input_tokens,
                    output_tokens,
                    error,
                }
            }
            InvocationOutcome::TimedOut => {
                warn!(timeout_secs = self.timeout.as_secs_f64(), "question timed out");
                failed_answer(
                    elapsed_seconds,
                    format!("Timeout after {} seconds", format_secs(self.timeout)),
                )
            }
            InvocationOutcome::Failed(reason) => {
                warn!(program = %self.program, reason = %reason, "invocation failed");
                failed_answer(elapsed_seconds, reason)
            }
        }
    }

    pub fn execute(&self, sandbox: &Path, question: &str) -> InvocationOutcome {
        let mut child = match self.command(sandbox, question).spawn() {
            Ok(child) => child,
            Err(err) => {
                return InvocationOutcome::Failed(format!(
                    "failed to execute {} in {}: {err}",
                    self.program,
                    sandbox.display()
                ));
            }
        };

        let deadline = Instant::now() + self.timeout;
        let stdout_reader = spawn_reader(child.stdout.take());
        let stderr_reader = spawn_reader(child.stderr.take());

        let status = match wait_until(&mut child, deadline) {
            Ok(Some(status)) => status,
            Ok(None) => return InvocationOutcome::TimedOut,
            Err(err) => {
                return InvocationOutcome::Failed(format!("poll {} failed: {err}", self.program));
            }
        };

        // A detached grandchild can hold the pipes open after the child exits.
        let stdout = match recv_until(&stdout_reader, deadline) {
            Some(Ok(text)) => text,
            Some(Err(err)) => {
                return InvocationOutcome::Failed(format!("read stdout failed: {err}"));
            }
            None => return InvocationOutcome::TimedOut,
        };
        let stderr = match recv_until(&stderr_reader, deadline) {
            Some(Ok(text)) => text,
            Some(Err(err)) => {
                return InvocationOutcome::Failed(format!("read stderr failed: {err}"));
            }
            None => return InvocationOutcome::TimedOut,
        };

        InvocationOutcome::Completed {
            status,
            stdout,
            stderr,
        }
    }
}

pub fn parse_output(output: &str) -> ParsedOutput {
    let Ok(Value::Object(map)) = serde_json::from_str::<Value>(output) else {
        return ParsedOutput::ParseFailure {
            raw_text: output.to_string(),
        };
    };

    let response = match map.get("result") {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Null) | None => output.to_string(),
        Some(other) => other.to_string(),
    };
    let usage = map.get("usage");
    let token_count = |key: &str| {
        usage
            .and_then(|usage| usage.get(key))
            .and_then(Value::as_u64)
            .unwrap_or(0)
    };

    ParsedOutput::ParseSuccess {
        response,
        input_tokens: token_count("input_tokens"),
        output_tokens: token_count("output_tokens"),
    }
}

fn failed_answer(elapsed_seconds: f64, error: String) -> Answer {
    Answer {
        response: String::new(),
        elapsed_seconds,
        input_tokens: 0,
        output_tokens: 0,
        error: Some(error),
    }
}

fn format_secs(duration: Duration) -> String {
    if duration.subsec_nanos() == 0 {
        duration.as_secs().to_string()
    } else {
        format!("{:.2}", duration.as_secs_f64())
    }
}

type Reader = Receiver<io::Result<String>>;

fn spawn_reader<R: Read + Send + 'static>(pipe: Option<R>) -> Reader {
    let (sender, receiver) = mpsc::channel();
    match pipe {
        Some(mut pipe) => {
            thread::spawn(move || {
                let mut buf = Vec::new();
                let result = pipe
                    .read_to_end(&mut buf)
                    .map(|_| String::from_utf8_lossy(&buf).into_owned());
                let _ = sender.send(result);
            });
        }
        None => {
            let _ = sender.send(Ok(String::new()));
        }
    }
    receiver
}

// `None` means the deadline passed before the pipe reached EOF.
fn recv_until(reader: &Reader, deadline: Instant) -> Option<io::Result<String>> {
    match reader.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
        Ok(result) => Some(result),
        Err(RecvTimeoutError::Timeout) => None,
        Err(RecvTimeoutError::Disconnected) => Some(Err(io::Error::other("pipe reader panicked"))),
    }
}

fn wait_until(child: &mut Child, deadline: Instant) -> io::Result<Option<ExitStatus>> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }

        let now = Instant::now();
        if now >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL.min(deadline - now));
    }
}
