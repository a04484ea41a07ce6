pub mod command;
pub mod probe;
pub mod progress;

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{ChildStdin, Command};
use tokio::sync::watch;
use tracing::{debug, warn};

pub use command::{CommandFactory, Quality};
pub use progress::{Progress, ProgressParser, TimeProgressParser};

/// Fixed upper bound on a graceful stop before escalating to forced
/// termination.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(5);

struct ActiveProcess {
    pid: u32,
    stdin: Option<ChildStdin>,
    exit_rx: watch::Receiver<Option<i32>>,
}

/// Supervises at most one external transcoder process at a time.
///
/// `spawn` waits for any previous process to fully exit first, so two
/// capture/transcode processes can never overlap. The `paused`/`stopped`
/// flags are monotonic for one process instance and reset on each spawn.
pub struct ProcessManager {
    active: Mutex<Option<ActiveProcess>>,
    paused: AtomicBool,
    stopped: AtomicBool,
    stop_timeout: Duration,
}

impl Default for ProcessManager {
    fn default() -> Self {
        Self::new(DEFAULT_STOP_TIMEOUT)
    }
}

impl ProcessManager {
    pub fn new(stop_timeout: Duration) -> Self {
        Self {
            active: Mutex::new(None),
            paused: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            stop_timeout,
        }
    }

    /// Spawns the transcoder, feeding every log line to `listener`.
    ///
    /// Serializes on the previous process: if one is still alive, this call
    /// waits for it to exit before starting the new one.
    pub async fn spawn<F>(&self, program: &str, args: &[String], listener: F) -> Result<()>
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        if let Some(mut rx) = self.exit_receiver() {
            debug!("Waiting for previous process to exit before spawning");
            rx.wait_for(|code| code.is_some())
                .await
                .context("previous process exit channel closed")?;
        }

        debug!("Spawning {} {}", program, args.join(" "));

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn {program}"))?;

        let pid = child.id().context("spawned process has no pid")?;
        let stdin = child.stdin.take();
        let stderr = child.stderr.take().context("no stderr pipe")?;

        // Stream log lines to the listener until the pipe closes.
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                listener(line);
            }
        });

        let (exit_tx, exit_rx) = watch::channel(None);
        tokio::spawn(async move {
            let code = match child.wait().await {
                Ok(status) => status.code().unwrap_or(-1),
                Err(err) => {
                    warn!("Failed to await process exit: {}", err);
                    -1
                }
            };
            let _ = exit_tx.send(Some(code));
        });

        *self.active.lock().unwrap() = Some(ActiveProcess {
            pid,
            stdin,
            exit_rx,
        });
        self.paused.store(false, Ordering::SeqCst);
        self.stopped.store(false, Ordering::SeqCst);

        Ok(())
    }

    fn exit_receiver(&self) -> Option<watch::Receiver<Option<i32>>> {
        self.active
            .lock()
            .unwrap()
            .as_ref()
            .map(|p| p.exit_rx.clone())
    }

    fn pid(&self) -> Option<u32> {
        self.active.lock().unwrap().as_ref().map(|p| p.pid)
    }

    /// Waits for the active process to exit and returns its exit code.
    pub async fn wait(&self) -> Result<i32> {
        let mut rx = self
            .exit_receiver()
            .ok_or_else(|| anyhow!("no active process"))?;
        let code: Option<i32> = *rx
            .wait_for(|code| code.is_some())
            .await
            .context("process exit channel closed")?;
        code.ok_or_else(|| anyhow!("process exit channel yielded no code"))
    }

    /// Exit code of the active process, if it has already exited.
    pub fn exit_code(&self) -> Option<i32> {
        self.exit_receiver().and_then(|rx| *rx.borrow())
    }

    /// OS-level suspend. No-op when already paused or no process is alive.
    pub fn pause(&self) -> Result<()> {
        let Some(pid) = self.pid() else { return Ok(()) };
        if self.paused.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        debug!("Suspending process {}", pid);
        signal(pid, SuspendSignal::Stop)
    }

    /// Resumes a suspended process. No-op when not paused.
    pub fn resume(&self) -> Result<()> {
        let Some(pid) = self.pid() else { return Ok(()) };
        if !self.paused.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        debug!("Resuming process {}", pid);
        signal(pid, SuspendSignal::Continue)
    }

    /// Graceful stop: writes the quit command to the process's stdin and
    /// waits up to the stop timeout; escalates to an interrupt and then a
    /// kill if the process does not exit. Idempotent.
    pub async fn stop(&self) -> Result<()> {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let (pid, stdin) = {
            let mut active = self.active.lock().unwrap();
            match active.as_mut() {
                Some(process) => (process.pid, process.stdin.take()),
                None => return Ok(()),
            }
        };

        // A suspended process cannot react to the quit command.
        if self.paused.swap(false, Ordering::SeqCst) {
            let _ = signal(pid, SuspendSignal::Continue);
        }

        if let Some(mut stdin) = stdin {
            debug!("Sending quit command to process {}", pid);
            let _ = stdin.write_all(b"q").await;
            let _ = stdin.flush().await;
        }

        match tokio::time::timeout(self.stop_timeout, self.wait()).await {
            Ok(_) => {
                debug!("Process {} exited gracefully", pid);
            }
            Err(_) => {
                warn!("Process {} did not exit in time, interrupting", pid);
                let _ = signal(pid, SuspendSignal::Interrupt);
                if tokio::time::timeout(self.stop_timeout, self.wait())
                    .await
                    .is_err()
                {
                    warn!("Process {} still alive, killing", pid);
                    let _ = signal(pid, SuspendSignal::Kill);
                    let _ = self.wait().await;
                }
            }
        }

        Ok(())
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Runs a transcoder invocation to completion and returns its exit code.
    pub async fn run_to_completion<F>(
        &self,
        program: &str,
        args: &[String],
        listener: F,
    ) -> Result<i32>
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        self.spawn(program, args, listener).await?;
        self.wait().await
    }
}

enum SuspendSignal {
    Stop,
    Continue,
    Interrupt,
    Kill,
}

#[cfg(unix)]
fn signal(pid: u32, which: SuspendSignal) -> Result<()> {
    let sig = match which {
        SuspendSignal::Stop => libc::SIGSTOP,
        SuspendSignal::Continue => libc::SIGCONT,
        SuspendSignal::Interrupt => libc::SIGINT,
        SuspendSignal::Kill => libc::SIGKILL,
    };
    let result = unsafe { libc::kill(pid as libc::pid_t, sig) };
    if result != 0 {
        // The process may already be gone; that is fine for every caller.
        debug!("kill({}, {}) failed: {}", pid, sig, std::io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(not(unix))]
fn signal(_pid: u32, _which: SuspendSignal) -> Result<()> {
    Err(anyhow!("process suspend/resume is not supported on this platform"))
}
