//! Bounded subprocess execution for the external engines.

use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::RecvTimeoutError;

use crate::error::EngineError;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Output of a finished command.
#[derive(Debug)]
pub struct CommandOutput {
    pub stdout: Vec<u8>,
    pub stderr: String,
}

/// Substitutes `{key}` placeholders in an argument template.
pub fn render_args(template: &[String], values: &[(&str, String)]) -> Vec<String> {
    template
        .iter()
        .map(|arg| {
            values.iter().fold(arg.clone(), |acc, (key, value)| {
                acc.replace(&format!("{{{}}}", key), value)
            })
        })
        .collect()
}

/// Renders the input path for `{input}`.
pub fn input_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn spawn(program: &str, args: &[String]) -> Result<Child, EngineError> {
    Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                EngineError::CommandMissing {
                    program: program.to_string(),
                }
            } else {
                EngineError::Spawn {
                    program: program.to_string(),
                    source: e,
                }
            }
        })
}

/// Drains a pipe on its own thread. Joining the handle after the child
/// exits yields everything it wrote.
fn collect_pipe<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        buf
    })
}

fn join_pipe(handle: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default()
}

fn kill(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

fn check_status(
    program: &str,
    status: ExitStatus,
    stderr: Option<JoinHandle<Vec<u8>>>,
) -> Result<String, EngineError> {
    let stderr = String::from_utf8_lossy(&join_pipe(stderr))
        .trim()
        .to_string();
    if status.success() {
        Ok(stderr)
    } else {
        Err(EngineError::CommandFailed {
            program: program.to_string(),
            status: status.to_string(),
            stderr,
        })
    }
}

/// Runs a command to completion, killing it once `timeout` elapses.
pub fn run_command(
    program: &str,
    args: &[String],
    timeout: Option<Duration>,
) -> Result<CommandOutput, EngineError> {
    let mut child = spawn(program, args)?;
    let started = Instant::now();
    let stdout = child.stdout.take().map(collect_pipe);
    let stderr = child.stderr.take().map(collect_pipe);

    loop {
        if let Some(status) = child.try_wait().map_err(|e| EngineError::Spawn {
            program: program.to_string(),
            source: e,
        })? {
            let stdout = join_pipe(stdout);
            let stderr = check_status(program, status, stderr)?;
            return Ok(CommandOutput { stdout, stderr });
        }

        if let Some(limit) = timeout {
            if started.elapsed() >= limit {
                kill(&mut child);
                return Err(EngineError::Timeout {
                    program: program.to_string(),
                    limit,
                });
            }
        }

        thread::sleep(POLL_INTERVAL);
    }
}

/// Runs a command and hands every stdout line to `on_line` as it arrives.
/// Returns the captured stderr.
pub fn run_streaming(
    program: &str,
    args: &[String],
    timeout: Option<Duration>,
    mut on_line: impl FnMut(&str),
) -> Result<String, EngineError> {
    let mut child = spawn(program, args)?;
    let started = Instant::now();
    let mut stderr = child.stderr.take().map(collect_pipe);

    let (line_tx, line_rx) = crossbeam_channel::unbounded::<String>();
    if let Some(stdout) = child.stdout.take() {
        thread::spawn(move || {
            for line in BufReader::new(stdout).lines() {
                let Ok(line) = line else { break };
                if line_tx.send(line).is_err() {
                    break;
                }
            }
        });
    } else {
        drop(line_tx);
    }

    let mut stdout_closed = false;
    loop {
        if !stdout_closed {
            match line_rx.recv_timeout(POLL_INTERVAL) {
                Ok(line) => on_line(&line),
                Err(RecvTimeoutError::Disconnected) => stdout_closed = true,
                Err(RecvTimeoutError::Timeout) => {}
            }
        } else {
            match child.try_wait().map_err(|e| EngineError::Spawn {
                program: program.to_string(),
                source: e,
            })? {
                Some(status) => return check_status(program, status, stderr.take()),
                None => thread::sleep(POLL_INTERVAL),
            }
        }

        if let Some(limit) = timeout {
            if started.elapsed() >= limit {
                kill(&mut child);
                return Err(EngineError::Timeout {
                    program: program.to_string(),
                    limit,
                });
            }
        }
    }
}
