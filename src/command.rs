use std::io::Read;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::channel::{bounded, RecvTimeoutError};

use crate::error::CommandError;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Runs an external program and returns its stdout, killing it if it
/// outlives `timeout`.
pub fn run(program: &str, args: &[&str], timeout: Duration) -> Result<String, CommandError> {
    log::debug!("Running {} {}", program, args.join(" "));
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|source| CommandError::Spawn { program: program.to_string(), source })?;

    // Drain stdout on a separate thread so a chatty child can't block on a full pipe.
    // A background descendant may keep the pipe open after the child exits, so the
    // read is bounded by the same deadline.
    let mut stdout = child.stdout.take();
    let (tx, rx) = bounded(1);
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(ref mut out) = stdout {
            let _ = out.read_to_end(&mut buf);
        }
        let _ = tx.send(buf);
    });

    let timed_out = || CommandError::Timeout { program: program.to_string(), timeout };
    let deadline = Instant::now() + timeout;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) if Instant::now() >= deadline => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(timed_out());
            }
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(source) => return Err(CommandError::Spawn { program: program.to_string(), source }),
        }
    };

    let buf = match rx.recv_timeout(deadline.saturating_duration_since(Instant::now()).max(POLL_INTERVAL)) {
        Ok(buf) => buf,
        Err(RecvTimeoutError::Timeout) => {
            log::warn!("{} exited but its output stayed open past {}ms", program, timeout.as_millis());
            return Err(timed_out());
        }
        Err(RecvTimeoutError::Disconnected) => Vec::new(),
    };
    if !status.success() {
        return Err(CommandError::Status { program: program.to_string(), status });
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn should_capture_stdout() {
        let out = run("echo", &["hello"], Duration::from_secs(5)).unwrap();
        assert_eq!(out.trim(), "hello");
    }

    #[test]
    fn should_report_missing_program() {
        let err = run("arp-sentinel-no-such-program", &[], Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, CommandError::Spawn { .. }));
    }

    #[test]
    fn should_report_failed_exit_status() {
        let err = run("false", &[], Duration::from_secs(5)).unwrap_err();
        assert!(matches!(err, CommandError::Status { .. }));
    }

    #[test]
    fn should_kill_program_on_timeout() {
        let started = Instant::now();
        let err = run("sleep", &["5"], Duration::from_millis(100)).unwrap_err();
        assert!(matches!(err, CommandError::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn should_time_out_when_descendant_holds_stdout() {
        let started = Instant::now();
        let err = run("sh", &["-c", "sleep 3 & echo hi"], Duration::from_millis(200)).unwrap_err();
        assert!(matches!(err, CommandError::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
