use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::process::Command;
use tokio::sync::{mpsc, watch};

use crate::plan::ResolvedProcess;

const STOP_GRACE_PERIOD: Duration = Duration::from_secs(2);

fn default_log_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tomato-farm-launch")
        .join("logs")
}

/// Returns the log file path for a given process name and PID.
pub fn log_path_for_name_with_pid(log_dir: &Path, name: &str, pid: u32) -> PathBuf {
    let safe_name = name.replace('/', "_").trim_start_matches('_').to_string();
    log_dir.join(format!("{}_{}.log", safe_name, pid))
}

/// Lifecycle state of a spawned process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessStatus {
    Running { pid: u32 },
    /// The process exited; `code` is `None` when it was killed by a signal.
    Exited { code: Option<i32> },
}

impl ProcessStatus {
    pub fn has_exited(&self) -> bool {
        matches!(self, ProcessStatus::Exited { .. })
    }
}

/// Handles returned after starting a process, used to observe it.
pub struct ProcessHandle {
    pub name: String,
    pub pid: u32,
    /// Filesystem path to the log file capturing stdout/stderr.
    pub log_path: PathBuf,
    /// Receiver that streams output lines in real time.
    pub output_rx: mpsc::Receiver<String>,
    pub status_rx: watch::Receiver<ProcessStatus>,
}

/// Starts, tracks, and stops the launched processes.
///
/// Processes are not restarted when they exit.
pub struct Launcher {
    log_dir: PathBuf,
    processes: HashMap<u32, ManagedProcess>,
}

struct ManagedProcess {
    name: String,
    status_rx: watch::Receiver<ProcessStatus>,
}

impl Launcher {
    /// Creates a launcher that writes process logs under the user cache directory.
    pub fn new() -> Self {
        Self::with_log_dir(default_log_dir())
    }

    pub fn with_log_dir(log_dir: PathBuf) -> Self {
        Self {
            log_dir,
            processes: HashMap::new(),
        }
    }

    /// Spawns a resolved process in its own process group and begins streaming its output.
    pub async fn start(&mut self, process: &ResolvedProcess) -> Result<ProcessHandle> {
        tokio::fs::create_dir_all(&self.log_dir)
            .await
            .with_context(|| format!("Failed to create log directory {}", self.log_dir.display()))?;

        let mut cmd = Command::new(&process.program);
        cmd.args(&process.args);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd
            .spawn()
            .with_context(|| format!("Failed to spawn {}", process.program.display()))?;

        let pid = child.id().unwrap_or(0);
        let log_path = log_path_for_name_with_pid(&self.log_dir, &process.name, pid);
        tracing::info!(
            name = %process.name,
            pid,
            cmd = %command_line(process),
            "process started"
        );

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let output_rx = pipe_to_log_file(stdout, stderr, &log_path);

        let (status_tx, status_rx) = watch::channel(ProcessStatus::Running { pid });
        let name = process.name.clone();
        tokio::spawn(async move {
            let code = match child.wait().await {
                Ok(status) => status.code(),
                Err(e) => {
                    tracing::warn!(%name, error = %e, "failed to wait on process");
                    None
                }
            };
            match code {
                Some(0) => tracing::info!(%name, pid, "process has finished cleanly"),
                _ => tracing::error!(%name, pid, ?code, "process has died"),
            }
            status_tx.send_replace(ProcessStatus::Exited { code });
        });

        self.processes.insert(
            pid,
            ManagedProcess {
                name: process.name.clone(),
                status_rx: status_rx.clone(),
            },
        );

        Ok(ProcessHandle {
            name: process.name.clone(),
            pid,
            log_path,
            output_rx,
            status_rx,
        })
    }

    /// Stops a tracked process by PID, sending SIGTERM to its process group and
    /// SIGKILL if it has not exited after the grace period.
    pub async fn stop(&mut self, pid: u32) -> Result<()> {
        let Some(mut process) = self.processes.remove(&pid) else {
            return Ok(());
        };
        if process.status_rx.borrow().has_exited() {
            return Ok(());
        }

        tracing::info!(name = %process.name, pid, "stopping process");
        signal_group(pid, "-TERM").await;

        let exited = tokio::time::timeout(
            STOP_GRACE_PERIOD,
            process.status_rx.wait_for(ProcessStatus::has_exited),
        )
        .await
        .is_ok();
        if !exited {
            tracing::warn!(name = %process.name, pid, "process ignored SIGTERM, killing");
            signal_group(pid, "-KILL").await;
            let _ = process
                .status_rx
                .wait_for(ProcessStatus::has_exited)
                .await;
        }
        Ok(())
    }

    /// Stops every tracked process.
    pub async fn stop_all(&mut self) -> Result<()> {
        let pids: Vec<u32> = self.processes.keys().copied().collect();
        for pid in pids {
            self.stop(pid).await?;
        }
        Ok(())
    }

    /// Removes processes that have exited and returns their PIDs.
    pub fn cleanup_exited(&mut self) -> Vec<u32> {
        let exited: Vec<u32> = self
            .processes
            .iter()
            .filter(|(_, p)| p.status_rx.borrow().has_exited())
            .map(|(&pid, _)| pid)
            .collect();
        for pid in &exited {
            self.processes.remove(pid);
        }
        exited
    }

    pub fn running(&self) -> usize {
        self.processes.len()
    }
}

impl Default for Launcher {
    fn default() -> Self {
        Self::new()
    }
}

fn command_line(process: &ResolvedProcess) -> String {
    std::iter::once(process.program.display().to_string())
        .chain(process.args.iter().cloned())
        .collect::<Vec<_>>()
        .join(" ")
}

async fn signal_group(pid: u32, signal: &str) {
    #[cfg(unix)]
    {
        let pgid = format!("-{}", pid);
        let _ = Command::new("kill")
            .args([signal, &pgid])
            .output()
            .await;
    }
    #[cfg(not(unix))]
    let _ = (pid, signal);
}

fn pipe_to_log_file(
    stdout: Option<tokio::process::ChildStdout>,
    stderr: Option<tokio::process::ChildStderr>,
    log_path: &Path,
) -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(1000);

    if let Some(stdout) = stdout {
        tokio::spawn(forward_lines(stdout, log_path.to_path_buf(), tx.clone()));
    }
    if let Some(stderr) = stderr {
        tokio::spawn(forward_lines(stderr, log_path.to_path_buf(), tx));
    }

    rx
}

async fn forward_lines<R>(stream: R, log_path: PathBuf, tx: mpsc::Sender<String>)
where
    R: tokio::io::AsyncRead + Unpin,
{
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    let mut log_file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .await
        .ok();

    let mut reader = BufReader::new(stream).lines();
    while let Ok(Some(line)) = reader.next_line().await {
        if let Some(ref mut f) = log_file {
            let _ = f.write_all(format!("{line}\n").as_bytes()).await;
            let _ = f.flush().await;
        }
        let _ = tx.send(line).await;
    }
}
