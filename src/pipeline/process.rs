use std::ffi::OsStr;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to start {program}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} did not finish within {}s", .timeout.as_secs())]
    TimedOut { program: String, timeout: Duration },
}

#[derive(Debug)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Last `max_lines` lines of stderr, for job logs.
    pub fn stderr_tail(&self, max_lines: usize) -> String {
        tail_lines(&String::from_utf8_lossy(&self.stderr), max_lines)
    }
}

/// Runs `program` to completion or until `timeout` elapses. The child is
/// killed when the timeout fires.
pub async fn run<I, S>(program: &str, args: I, timeout: Duration) -> Result<ProcessOutput, ProcessError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| ProcessError::Spawn {
            program: program.to_string(),
            source,
        })?;

    // Dropping the wait future on timeout drops the child, which kills it.
    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => Ok(ProcessOutput {
            status: output.status,
            stdout: output.stdout,
            stderr: output.stderr,
        }),
        Ok(Err(source)) => Err(ProcessError::Spawn {
            program: program.to_string(),
            source,
        }),
        Err(_) => Err(ProcessError::TimedOut {
            program: program.to_string(),
            timeout,
        }),
    }
}

/// Upper bound on the bytes kept by [`tail_lines`].
pub const MAX_TAIL_BYTES: usize = 4096;

/// Last `max_lines` non-empty lines of `text`, capped at [`MAX_TAIL_BYTES`].
/// Carriage returns count as line breaks so ffmpeg progress updates stay
/// separate lines.
pub fn tail_lines(text: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = text
        .split(['\n', '\r'])
        .filter(|l| !l.trim().is_empty())
        .collect();
    let start = lines.len().saturating_sub(max_lines);
    let tail = lines[start..].join("\n");
    if tail.len() <= MAX_TAIL_BYTES {
        return tail;
    }
    let mut cut = tail.len() - MAX_TAIL_BYTES;
    while !tail.is_char_boundary(cut) {
        cut += 1;
    }
    tail[cut..].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_exit_status_and_stderr() {
        let output = run("sh", ["-c", "echo boom >&2; exit 3"], Duration::from_secs(5))
            .await
            .unwrap();
        assert!(!output.success());
        assert_eq!(output.status.code(), Some(3));
        assert_eq!(output.stderr_tail(5), "boom");
    }

    #[tokio::test]
    async fn times_out_long_running_process() {
        let result = run("sh", ["-c", "sleep 5"], Duration::from_millis(100)).await;
        assert!(matches!(result, Err(ProcessError::TimedOut { .. })));
    }

    #[tokio::test]
    async fn missing_binary_is_a_spawn_error() {
        let result = run("definitely-not-a-real-binary", ["-v"], Duration::from_secs(1)).await;
        assert!(matches!(result, Err(ProcessError::Spawn { .. })));
    }

    #[test]
    fn tail_keeps_last_non_empty_lines() {
        assert_eq!(tail_lines("a\n\nb\nc\n", 2), "b\nc");
        assert_eq!(tail_lines("", 3), "");
    }

    #[test]
    fn tail_splits_progress_updates_and_caps_size() {
        let mut stderr = String::new();
        for i in 0..20_000 {
            stderr.push_str(&format!("frame={i} fps=30 q=28.0 size=1024kB speed=1x\r"));
        }
        stderr.push_str("\nConversion failed!\n");

        let tail = tail_lines(&stderr, 3);
        assert!(tail.len() <= MAX_TAIL_BYTES);
        assert_eq!(tail.lines().count(), 3);
        assert!(tail.ends_with("Conversion failed!"));
        assert!(tail.contains("frame=19999"));
    }

    #[test]
    fn tail_cap_keeps_the_end_of_a_long_line() {
        let long = format!("{}END", "é".repeat(MAX_TAIL_BYTES));
        let tail = tail_lines(&long, 15);
        assert!(tail.len() <= MAX_TAIL_BYTES);
        assert!(tail.ends_with("END"));
    }
}
