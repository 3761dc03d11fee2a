//! Supervised handle for the single background training job.
//!
//! At most one trainer child process runs at a time. All state transitions
//! happen under one mutex, so a start racing a stop (or another start) can
//! never observe a half-cleared handle. Stopping terminates the child,
//! waits with a timeout, and escalates to a forceful kill.

use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::log_info;

/// How long `stop` waits after the termination signal before escalating.
const TERM_TIMEOUT: Duration = Duration::from_secs(5);
/// How long `stop` waits after the forceful kill.
const KILL_TIMEOUT: Duration = Duration::from_secs(1);
/// Poll interval while waiting for the child to exit.
const WAIT_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("trainer binary not found at {0}")]
    TrainerBinaryMissing(PathBuf),
    #[error("failed to locate trainer binary: {0}")]
    TrainerBinaryUnresolved(std::io::Error),
    #[error("failed to spawn trainer: {0}")]
    Spawn(std::io::Error),
    #[error("failed to stop trainer: {0}")]
    Stop(std::io::Error),
}

/// Result of a stop request.
#[derive(Debug, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped,
    NotRunning,
}

enum JobState {
    Idle,
    Running { child: Child, environment: String },
}

pub struct TrainingSupervisor {
    state: Mutex<JobState>,
}

pub type SharedSupervisor = Arc<TrainingSupervisor>;

impl TrainingSupervisor {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(JobState::Idle),
        }
    }

    /// Launch a training job for `environment`, replacing any live job.
    ///
    /// The trainer runs as a sibling binary of the current executable so the
    /// web server never blocks on the training loop.
    pub fn start(&self, environment: &str, extra_args: &[String]) -> Result<(), SupervisorError> {
        let trainer = trainer_binary()?;
        let mut cmd = Command::new(trainer);
        cmd.arg(environment)
            .args(extra_args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        self.start_with_command(environment, cmd)
    }

    /// Spawn an arbitrary command as the supervised job.
    pub fn start_with_command(
        &self,
        environment: &str,
        mut cmd: Command,
    ) -> Result<(), SupervisorError> {
        let mut state = self.lock();

        // Replace a live job: terminate it before spawning the next one
        if let JobState::Running { child, environment } = &mut *state {
            log_info!("[TRAINER] Replacing running job for {}", environment);
            let _ = terminate_child(child);
            *state = JobState::Idle;
        }

        let child = cmd.spawn().map_err(SupervisorError::Spawn)?;
        log_info!(
            "[TRAINER] Started training process for {} (pid {})",
            environment,
            child.id()
        );
        *state = JobState::Running {
            child,
            environment: environment.to_string(),
        };
        Ok(())
    }

    /// Stop the running job, if any.
    pub fn stop(&self) -> Result<StopOutcome, SupervisorError> {
        let mut state = self.lock();

        match &mut *state {
            JobState::Idle => Ok(StopOutcome::NotRunning),
            JobState::Running { child, environment } => {
                // A job that already exited counts as not running
                if matches!(child.try_wait(), Ok(Some(_))) {
                    *state = JobState::Idle;
                    return Ok(StopOutcome::NotRunning);
                }

                log_info!("[TRAINER] Stopping training process for {}", environment);
                match terminate_child(child) {
                    Ok(()) => {
                        *state = JobState::Idle;
                        Ok(StopOutcome::Stopped)
                    }
                    Err(e) => Err(SupervisorError::Stop(e)),
                }
            }
        }
    }

    /// Non-blocking liveness check. Reaps a child that has exited on its own.
    pub fn is_running(&self) -> bool {
        let mut state = self.lock();

        if let JobState::Running { child, environment } = &mut *state {
            match child.try_wait() {
                Ok(None) => true,
                Ok(Some(status)) => {
                    log_info!(
                        "[TRAINER] Training process for {} exited with {}",
                        environment,
                        status
                    );
                    *state = JobState::Idle;
                    false
                }
                Err(_) => false,
            }
        } else {
            false
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, JobState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for TrainingSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TrainingSupervisor {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            if let JobState::Running { child, .. } = &mut *state {
                let _ = child.kill();
                let _ = child.wait();
            }
        }
    }
}

/// Terminate gently, then escalate: SIGTERM, bounded wait, SIGKILL, reap.
fn terminate_child(child: &mut Child) -> std::io::Result<()> {
    send_term(child)?;

    if wait_with_timeout(child, TERM_TIMEOUT)? {
        return Ok(());
    }

    // Force kill if it's still alive
    child.kill()?;
    wait_with_timeout(child, KILL_TIMEOUT)?;
    child.wait()?;
    Ok(())
}

#[cfg(not(windows))]
fn send_term(child: &mut Child) -> std::io::Result<()> {
    let ret = unsafe { libc::kill(child.id() as libc::pid_t, libc::SIGTERM) };
    if ret == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

// Windows has no SIGTERM equivalent for arbitrary processes
#[cfg(windows)]
fn send_term(child: &mut Child) -> std::io::Result<()> {
    child.kill()
}

/// Poll `try_wait` until the child exits or the timeout elapses.
/// Returns true when the child has been reaped.
fn wait_with_timeout(child: &mut Child, timeout: Duration) -> std::io::Result<bool> {
    let deadline = Instant::now() + timeout;
    loop {
        if child.try_wait()?.is_some() {
            return Ok(true);
        }
        if Instant::now() >= deadline {
            return Ok(false);
        }
        std::thread::sleep(WAIT_POLL);
    }
}

/// Path of the trainer binary, expected next to the current executable.
fn trainer_binary() -> Result<PathBuf, SupervisorError> {
    let exe = std::env::current_exe().map_err(SupervisorError::TrainerBinaryUnresolved)?;
    let dir = exe.parent().unwrap_or_else(|| std::path::Path::new("."));
    let trainer = dir.join(format!("train_agent{}", std::env::consts::EXE_SUFFIX));
    if trainer.exists() {
        Ok(trainer)
    } else {
        Err(SupervisorError::TrainerBinaryMissing(trainer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sleep_command(seconds: u32) -> Command {
        let mut cmd = Command::new("sleep");
        cmd.arg(seconds.to_string());
        cmd
    }

    #[test]
    fn test_status_is_false_when_idle() {
        let supervisor = TrainingSupervisor::new();
        assert!(!supervisor.is_running());
    }

    #[test]
    fn test_stop_without_job_reports_not_running() {
        let supervisor = TrainingSupervisor::new();
        assert_eq!(supervisor.stop().unwrap(), StopOutcome::NotRunning);
    }

    #[test]
    fn test_start_then_status_reports_running() {
        let supervisor = TrainingSupervisor::new();
        supervisor
            .start_with_command("cartpole", sleep_command(30))
            .unwrap();
        assert!(supervisor.is_running());
        assert_eq!(supervisor.stop().unwrap(), StopOutcome::Stopped);
    }

    #[test]
    fn test_stop_kills_the_job() {
        let supervisor = TrainingSupervisor::new();
        supervisor
            .start_with_command("cartpole", sleep_command(30))
            .unwrap();
        assert_eq!(supervisor.stop().unwrap(), StopOutcome::Stopped);
        assert!(!supervisor.is_running());
        assert_eq!(supervisor.stop().unwrap(), StopOutcome::NotRunning);
    }

    #[test]
    fn test_exited_job_is_reaped_by_status() {
        let supervisor = TrainingSupervisor::new();
        let mut cmd = Command::new("true");
        cmd.stdout(Stdio::null());
        supervisor.start_with_command("cartpole", cmd).unwrap();
        // Give the process a moment to exit on its own
        std::thread::sleep(Duration::from_millis(200));
        assert!(!supervisor.is_running());
        assert_eq!(supervisor.stop().unwrap(), StopOutcome::NotRunning);
    }

    #[test]
    fn test_start_replaces_running_job() {
        let supervisor = TrainingSupervisor::new();
        supervisor
            .start_with_command("cartpole", sleep_command(30))
            .unwrap();
        supervisor
            .start_with_command("pacman", sleep_command(30))
            .unwrap();
        assert!(supervisor.is_running());
        assert_eq!(supervisor.stop().unwrap(), StopOutcome::Stopped);
        assert!(!supervisor.is_running());
    }
}
