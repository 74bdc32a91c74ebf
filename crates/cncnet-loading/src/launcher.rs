//! Game process launch.
//!
//! Launching is fire-and-forget: the launcher reports `Started` and, once
//! the process ends, `Exited`. Events are polled from the frame loop.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc;

#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("failed to start {path}: {source}")]
    Spawn {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("the game is already running")]
    AlreadyRunning,
}

/// What to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    pub executable: PathBuf,
    pub working_dir: PathBuf,
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LauncherEvent {
    Started,
    /// The process ended; `code` is `None` when it was killed by a signal
    /// or could not be waited on.
    Exited { code: Option<i32> },
}

pub trait GameLauncher: Send {
    fn launch(&mut self, request: &LaunchRequest) -> Result<(), LaunchError>;

    /// Drain events produced since the last call.
    fn poll_events(&mut self) -> Vec<LauncherEvent>;
}

/// Runs the game as a child process on the tokio runtime.
pub struct ProcessLauncher {
    events_tx: mpsc::UnboundedSender<LauncherEvent>,
    events_rx: mpsc::UnboundedReceiver<LauncherEvent>,
    running: Arc<AtomicBool>,
}

impl ProcessLauncher {
    pub fn new() -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            events_tx,
            events_rx,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

impl Default for ProcessLauncher {
    fn default() -> Self {
        Self::new()
    }
}

impl GameLauncher for ProcessLauncher {
    fn launch(&mut self, request: &LaunchRequest) -> Result<(), LaunchError> {
        if self.running.swap(true, Ordering::AcqRel) {
            return Err(LaunchError::AlreadyRunning);
        }

        let mut cmd = tokio::process::Command::new(&request.executable);
        cmd.args(&request.args).current_dir(&request.working_dir);
        tracing::info!("Launching game: {:?}", cmd);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(source) => {
                self.running.store(false, Ordering::Release);
                return Err(LaunchError::Spawn {
                    path: request.executable.clone(),
                    source,
                });
            }
        };
        let _ = self.events_tx.send(LauncherEvent::Started);

        let tx = self.events_tx.clone();
        let running = Arc::clone(&self.running);
        tokio::spawn(async move {
            let code = match child.wait().await {
                Ok(status) => status.code(),
                Err(e) => {
                    tracing::warn!("Waiting for the game process failed: {e}");
                    None
                }
            };
            tracing::info!("Game process exited with {code:?}");
            running.store(false, Ordering::Release);
            let _ = tx.send(LauncherEvent::Exited { code });
        });
        Ok(())
    }

    fn poll_events(&mut self) -> Vec<LauncherEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events_rx.try_recv() {
            events.push(event);
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_missing_executable_is_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut launcher = ProcessLauncher::new();
        let request = LaunchRequest {
            executable: dir.path().join("no-such-game"),
            working_dir: dir.path().to_path_buf(),
            args: Vec::new(),
        };
        assert!(matches!(launcher.launch(&request), Err(LaunchError::Spawn { .. })));
        assert!(!launcher.is_running());
        assert!(launcher.poll_events().is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_reports_start_and_exit() {
        let dir = tempfile::tempdir().unwrap();
        let mut launcher = ProcessLauncher::new();
        let request = LaunchRequest {
            executable: "sh".into(),
            working_dir: dir.path().to_path_buf(),
            args: vec!["-c".into(), "exit 3".into()],
        };
        launcher.launch(&request).unwrap();
        assert!(matches!(launcher.launch(&request), Err(LaunchError::AlreadyRunning)));

        let mut events = Vec::new();
        for _ in 0..200 {
            events.extend(launcher.poll_events());
            if events.contains(&LauncherEvent::Exited { code: Some(3) }) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(
            events,
            vec![LauncherEvent::Started, LauncherEvent::Exited { code: Some(3) }]
        );
        assert!(!launcher.is_running());
    }
}
