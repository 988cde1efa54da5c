//! Process spawning, output capture and process-group termination

use std::io;
use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::signal::{Signal, killpg};
use nix::unistd::Pid;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::{Instant, timeout, timeout_at};
use tracing::{debug, instrument, warn};

use crate::executor::ExecutorError;
use crate::executor::command::StepCommand;

const READ_CHUNK: usize = 8192;

/// Output of a process that exited before the deadline
#[derive(Debug)]
pub(crate) struct Exited {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl Exited {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.status.code()
    }

    pub fn signal(&self) -> Option<i32> {
        self.status.signal()
    }
}

#[derive(Debug)]
pub(crate) enum StepResult {
    Exited(Exited),
    TimedOut,
}

/// The process group of a spawned step
///
/// Sends SIGKILL to the whole group when killed explicitly or when dropped
/// while still armed, so neither a timeout nor a cancelled future leaves
/// children behind.
#[derive(Debug)]
struct ProcessGroup {
    pgid: Option<Pid>,
}

impl ProcessGroup {
    fn new(leader: Option<u32>) -> Self {
        Self {
            pgid: leader.and_then(|id| i32::try_from(id).ok()).map(Pid::from_raw),
        }
    }

    fn kill(&mut self) {
        let Some(pgid) = self.pgid.take() else {
            return;
        };
        match killpg(pgid, Signal::SIGKILL) {
            Ok(()) => debug!(%pgid, "killed process group"),
            // Group already empty
            Err(Errno::ESRCH) => {}
            Err(e) => warn!(%pgid, error = %e, "failed to kill process group"),
        }
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill();
    }
}

/// Run one command until it exits or the deadline passes
///
/// On expiry the whole process group is killed and no output is returned.
/// After a normal exit the group is killed too, which removes background
/// children the step left running.
#[instrument(skip_all, fields(command = %command))]
pub(crate) async fn run_until(
    command: &StepCommand,
    deadline: Instant,
    kill_grace: Duration,
    max_output: usize,
) -> Result<StepResult, ExecutorError> {
    let mut child = command
        .build()?
        .spawn()
        .map_err(|source| ExecutorError::Spawn {
            program: command.program().unwrap_or_default().to_owned(),
            source,
        })?;
    let mut group = ProcessGroup::new(child.id());

    let mut stdout_task = tokio::spawn(drain(child.stdout.take(), max_output));
    let mut stderr_task = tokio::spawn(drain(child.stderr.take(), max_output));

    let status = match timeout_at(deadline, child.wait()).await {
        Ok(status) => status?,
        Err(_) => {
            debug!("deadline reached, killing process group");
            group.kill();
            if timeout(kill_grace, child.wait()).await.is_err() {
                warn!("process did not exit within the kill grace period");
            }
            stdout_task.abort();
            stderr_task.abort();
            return Ok(StepResult::TimedOut);
        }
    };

    // The leader is reaped, so the group id can only be reused once every
    // member is gone; signalling a recycled id this soon is accepted.
    group.kill();

    let streams = timeout_at(deadline, async {
        tokio::join!(&mut stdout_task, &mut stderr_task)
    })
    .await;
    let (stdout, stderr) = match streams {
        Ok((stdout, stderr)) => (joined(stdout)?, joined(stderr)?),
        Err(_) => {
            // An escaped child is still holding the pipes open
            stdout_task.abort();
            stderr_task.abort();
            return Ok(StepResult::TimedOut);
        }
    };

    debug!(
        exit_code = ?status.code(),
        signal = ?status.signal(),
        stdout_len = stdout.len(),
        stderr_len = stderr.len(),
        "process exited"
    );

    Ok(StepResult::Exited(Exited {
        status,
        stdout,
        stderr,
    }))
}

/// Read a stream to the end, keeping at most `limit` bytes
///
/// Bytes beyond the limit are read and dropped so the child never blocks on
/// a full pipe.
async fn drain<R>(reader: Option<R>, limit: usize) -> io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut out = Vec::new();
    let Some(mut reader) = reader else {
        return Ok(out);
    };

    let mut buf = vec![0u8; READ_CHUNK];
    let mut dropped = 0usize;
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        let room = limit.saturating_sub(out.len());
        let keep = n.min(room);
        out.extend_from_slice(&buf[..keep]);
        dropped += n - keep;
    }

    if dropped > 0 {
        debug!(kept = out.len(), dropped, "output truncated");
    }
    Ok(out)
}

fn joined(
    result: Result<io::Result<Vec<u8>>, tokio::task::JoinError>,
) -> Result<Vec<u8>, ExecutorError> {
    Ok(result.map_err(io::Error::other)??)
}
