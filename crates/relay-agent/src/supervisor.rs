use std::{collections::HashMap, process::Stdio, sync::Arc};

use relay_process::{StreamId, StreamReport, StreamState};
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    process::Command,
    sync::{Mutex, OwnedMutexGuard},
};

use crate::error::AgentError;
use crate::liveness;
use crate::pid_store::PidStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// SIGTERM was delivered and tracking was removed. The process may still
    /// be exiting; that is fine, the record is already gone.
    SignalSent { pid: u32 },
    NotRunning,
}

/// Lifecycle core: start, stop, and status for supervised stream processes.
///
/// The pid file plus the liveness probe is the single source of truth; there
/// is no authoritative in-memory table. Each spawned child is owned by a
/// detached wait task, which also keeps children reaped so a dead pid never
/// lingers in a signalable state within this agent run.
#[derive(Debug, Clone)]
pub struct Supervisor {
    pid_store: PidStore,
    // Per-stream guards: start/stop/status for one id are serialized so two
    // concurrent starts cannot both pass the liveness check.
    locks: Arc<Mutex<HashMap<i64, Arc<Mutex<()>>>>>,
}

impl Supervisor {
    pub fn new(pid_store: PidStore) -> Self {
        Self {
            pid_store,
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn pid_store(&self) -> &PidStore {
        &self.pid_store
    }

    async fn guard(&self, stream_id: StreamId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks
                .entry(stream_id.0)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// Spawns `command` for `stream_id` and records the pid.
    ///
    /// Fails with `AlreadyRunning` when the recorded pid is still alive; a
    /// stale record is overwritten by the new launch.
    pub async fn start(&self, stream_id: StreamId, command: &[String]) -> Result<u32, AgentError> {
        let _guard = self.guard(stream_id).await;

        if let Some(pid) = self.pid_store.read(stream_id).await
            && liveness::pid_is_alive(pid)
        {
            return Err(AgentError::AlreadyRunning { stream_id, pid });
        }

        let (program, args) = command.split_first().ok_or_else(|| {
            AgentError::Launch(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "command must not be empty",
            ))
        })?;

        tracing::info!(
            stream_id = stream_id.0,
            command = %command.join(" "),
            "starting stream process"
        );

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(AgentError::Launch)?;

        let pid = child.id().ok_or_else(|| {
            AgentError::Launch(std::io::Error::other(
                "child exited before its pid could be read",
            ))
        })?;

        if let Err(err) = self.pid_store.write(stream_id, pid).await {
            // Untracked processes are orphans; take the child down again.
            let _ = child.start_kill();
            return Err(AgentError::Launch(err));
        }

        if let Some(out) = child.stdout.take() {
            spawn_drain(stream_id, "stdout", out);
        }
        if let Some(err) = child.stderr.take() {
            spawn_drain(stream_id, "stderr", err);
        }

        // The wait task owns the child: it reaps the process and logs the
        // exit code. Diagnostic only; supervision state is not touched here.
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) if status.success() => {
                    tracing::info!(stream_id = stream_id.0, pid, "stream process exited cleanly");
                }
                Ok(status) => {
                    tracing::warn!(
                        stream_id = stream_id.0,
                        pid,
                        exit_code = ?status.code(),
                        "stream process exited with error"
                    );
                }
                Err(err) => {
                    tracing::warn!(stream_id = stream_id.0, pid, %err, "wait for stream process failed");
                }
            }
        });

        tracing::info!(stream_id = stream_id.0, pid, "stream process started");
        Ok(pid)
    }

    /// Sends SIGTERM to the tracked process and removes its record.
    ///
    /// Fire-and-forget by contract: a successful signal send is success, no
    /// exit confirmation. An absent or stale record resolves to `NotRunning`.
    pub async fn stop(&self, stream_id: StreamId) -> Result<StopOutcome, AgentError> {
        let _guard = self.guard(stream_id).await;

        let pid = self.pid_store.read(stream_id).await;
        let Some(pid) = pid.filter(|&p| liveness::pid_is_alive(p)) else {
            self.pid_store.delete(stream_id).await;
            tracing::info!(stream_id = stream_id.0, "stop requested but stream is not running");
            return Ok(StopOutcome::NotRunning);
        };

        send_sigterm(pid).map_err(|source| AgentError::Termination { pid, source })?;
        self.pid_store.delete(stream_id).await;
        tracing::info!(stream_id = stream_id.0, pid, "sent SIGTERM to stream process");
        Ok(StopOutcome::SignalSent { pid })
    }

    /// Reconciles the pid file with the liveness probe.
    ///
    /// The only path that proactively repairs durable state: a parsed but
    /// dead pid gets its file deleted before reporting Idle.
    pub async fn status(&self, stream_id: StreamId) -> StreamReport {
        let _guard = self.guard(stream_id).await;

        match self.pid_store.read(stream_id).await {
            Some(pid) if liveness::pid_is_alive(pid) => StreamReport {
                stream_id,
                state: StreamState::Running,
                pid: Some(pid),
            },
            Some(pid) => {
                tracing::warn!(
                    stream_id = stream_id.0,
                    pid,
                    "stale pid file detected, removing"
                );
                self.pid_store.delete(stream_id).await;
                StreamReport {
                    stream_id,
                    state: StreamState::Idle,
                    pid: None,
                }
            }
            None => StreamReport {
                stream_id,
                state: StreamState::Idle,
                pid: None,
            },
        }
    }
}

#[cfg(unix)]
fn send_sigterm(pid: u32) -> std::io::Result<()> {
    let pid = i32::try_from(pid)
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidInput, "pid out of range"))?;
    let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
    if rc == -1 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(not(unix))]
fn send_sigterm(_pid: u32) -> std::io::Result<()> {
    Err(std::io::Error::other("signals are not supported here"))
}

fn spawn_drain<R>(stream_id: StreamId, channel: &'static str, reader: R)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            tracing::info!(stream_id = stream_id.0, channel, "{line}");
        }
    });
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn fixture() -> (tempfile::TempDir, Supervisor) {
        let dir = tempfile::tempdir().unwrap();
        let supervisor = Supervisor::new(PidStore::new(dir.path()));
        (dir, supervisor)
    }

    fn sleep_command() -> Vec<String> {
        vec!["sleep".to_string(), "5".to_string()]
    }

    /// A pid that was live once but is guaranteed dead and reaped now.
    fn dead_pid() -> u32 {
        let mut child = std::process::Command::new("true").spawn().unwrap();
        let pid = child.id();
        child.wait().unwrap();
        pid
    }

    #[tokio::test]
    async fn start_status_stop_roundtrip() {
        let (_dir, sup) = fixture();
        let id = StreamId(42);

        let pid = sup.start(id, &sleep_command()).await.unwrap();
        assert!(liveness::pid_is_alive(pid));

        let report = sup.status(id).await;
        assert_eq!(report.state, StreamState::Running);
        assert_eq!(report.pid, Some(pid));

        let outcome = sup.stop(id).await.unwrap();
        assert_eq!(outcome, StopOutcome::SignalSent { pid });

        // Tracking is removed immediately, even if the OS process is still
        // on its way out.
        let report = sup.status(id).await;
        assert_eq!(report.state, StreamState::Idle);
        assert_eq!(report.pid, None);
        assert!(!sup.pid_store().path(id).exists());
    }

    #[tokio::test]
    async fn second_start_conflicts_while_first_is_alive() {
        let (_dir, sup) = fixture();
        let id = StreamId(7);

        let pid = sup.start(id, &sleep_command()).await.unwrap();
        let err = sup.start(id, &sleep_command()).await.unwrap_err();
        assert!(matches!(
            err,
            AgentError::AlreadyRunning { pid: p, .. } if p == pid
        ));
        assert!(liveness::pid_is_alive(pid));

        sup.stop(id).await.unwrap();
    }

    #[tokio::test]
    async fn stop_without_record_is_not_running() {
        let (_dir, sup) = fixture();
        let outcome = sup.stop(StreamId(1)).await.unwrap();
        assert_eq!(outcome, StopOutcome::NotRunning);
    }

    #[tokio::test]
    async fn stop_with_stale_record_cleans_up() {
        let (_dir, sup) = fixture();
        let id = StreamId(2);
        sup.pid_store().write(id, dead_pid()).await.unwrap();

        let outcome = sup.stop(id).await.unwrap();
        assert_eq!(outcome, StopOutcome::NotRunning);
        assert!(!sup.pid_store().path(id).exists());
    }

    #[tokio::test]
    async fn status_of_unknown_stream_is_idle() {
        let (_dir, sup) = fixture();
        let report = sup.status(StreamId(999)).await;
        assert_eq!(report.state, StreamState::Idle);
    }

    #[tokio::test]
    async fn status_self_heals_stale_pid_file() {
        let (_dir, sup) = fixture();
        let id = StreamId(3);
        sup.pid_store().write(id, dead_pid()).await.unwrap();

        let report = sup.status(id).await;
        assert_eq!(report.state, StreamState::Idle);
        assert!(!sup.pid_store().path(id).exists());
    }

    #[tokio::test]
    async fn status_treats_corrupt_pid_file_as_idle() {
        let (_dir, sup) = fixture();
        let id = StreamId(4);
        tokio::fs::write(sup.pid_store().path(id), "garbage")
            .await
            .unwrap();

        let report = sup.status(id).await;
        assert_eq!(report.state, StreamState::Idle);
    }

    #[tokio::test]
    async fn start_overwrites_stale_record() {
        let (_dir, sup) = fixture();
        let id = StreamId(5);
        sup.pid_store().write(id, dead_pid()).await.unwrap();

        let pid = sup.start(id, &sleep_command()).await.unwrap();
        assert_eq!(sup.pid_store().read(id).await, Some(pid));

        sup.stop(id).await.unwrap();
    }

    #[tokio::test]
    async fn spawn_failure_writes_no_pid_file() {
        let (_dir, sup) = fixture();
        let id = StreamId(6);

        let err = sup
            .start(id, &["/nonexistent/definitely-not-a-binary".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Launch(_)));
        assert!(!sup.pid_store().path(id).exists());
    }

    #[tokio::test]
    async fn empty_command_is_a_launch_error() {
        let (_dir, sup) = fixture();
        let err = sup.start(StreamId(8), &[]).await.unwrap_err();
        assert!(matches!(err, AgentError::Launch(_)));
    }
}
