//! Per-session output pump and terminal transition

use super::handle::SessionHandle;
use crate::hooks::TerminalHook;
use std::sync::Arc;
use std::time::Duration;
use tether_protocol::{LogStream, SessionStatus};
use tether_store::SessionStore;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::Child;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// How long to keep reading pipes after the process exited
const DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Longer lines are split into several Log Lines of at most this size
const MAX_LINE_BYTES: usize = 64 * 1024;

struct Pipe<R> {
    reader: Option<BufReader<R>>,
    buf: Vec<u8>,
    stream: LogStream,
}

impl<R: AsyncRead + Unpin> Pipe<R> {
    fn new(reader: Option<R>, stream: LogStream) -> Self {
        Self {
            reader: reader.map(BufReader::new),
            buf: Vec::new(),
            stream,
        }
    }

    fn is_open(&self) -> bool {
        self.reader.is_some()
    }

    /// Next complete line, or the next `MAX_LINE_BYTES` of an overlong one.
    /// Partial reads stay in `buf`, so a cancelled call resumes where it
    /// left off.
    async fn next_line(&mut self) -> Option<String> {
        let reader = self.reader.as_mut()?;
        let room = MAX_LINE_BYTES.saturating_sub(self.buf.len()).max(1) as u64;
        let read = reader.take(room).read_until(b'\n', &mut self.buf).await;
        match read {
            Ok(0) => {
                self.reader = None;
                (!self.buf.is_empty()).then(|| self.take_line())
            }
            Ok(_) if self.buf.last() == Some(&b'\n') => Some(self.take_line()),
            Ok(_) if self.buf.len() >= MAX_LINE_BYTES => Some(self.take_chunk()),
            Ok(_) => {
                // EOF without a trailing newline
                self.reader = None;
                Some(self.take_line())
            }
            Err(e) => {
                warn!(stream = %self.stream, error = %e, "Failed to read process output");
                self.reader = None;
                None
            }
        }
    }

    fn take_line(&mut self) -> String {
        let mut bytes = std::mem::take(&mut self.buf);
        if bytes.last() == Some(&b'\n') {
            bytes.pop();
        }
        if bytes.last() == Some(&b'\r') {
            bytes.pop();
        }
        String::from_utf8_lossy(&bytes).into_owned()
    }

    /// Split a full buffer without a newline, keeping an incomplete trailing
    /// UTF-8 sequence for the next chunk
    fn take_chunk(&mut self) -> String {
        let cut = match std::str::from_utf8(&self.buf) {
            Err(e) if e.error_len().is_none() && e.valid_up_to() > 0 => e.valid_up_to(),
            _ => self.buf.len(),
        };
        let rest = self.buf.split_off(cut);
        let chunk = std::mem::replace(&mut self.buf, rest);
        String::from_utf8_lossy(&chunk).into_owned()
    }
}

fn record(handle: &SessionHandle, stream: LogStream, line: Option<String>) {
    if let Some(line) = line {
        if let Err(e) = handle.append(stream, line) {
            debug!(session_id = %handle.id(), error = %e, "Dropped output line");
        }
    }
}

/// Spawn the task that reads a session's output until its process exits,
/// then performs the terminal transition.
pub(crate) fn spawn_reader(
    handle: Arc<SessionHandle>,
    mut child: Child,
    hook: Arc<dyn TerminalHook>,
    store: Arc<dyn SessionStore>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut stdout = Pipe::new(child.stdout.take(), LogStream::Stdout);
        let mut stderr = Pipe::new(child.stderr.take(), LogStream::Stderr);

        let exit = loop {
            tokio::select! {
                biased;
                line = stdout.next_line(), if stdout.is_open() => record(&handle, LogStream::Stdout, line),
                line = stderr.next_line(), if stderr.is_open() => record(&handle, LogStream::Stderr, line),
                status = child.wait() => break status,
            }
        };
        handle.mark_exited();
        handle.close_stdin().await;

        let drain = async {
            while stdout.is_open() || stderr.is_open() {
                tokio::select! {
                    line = stdout.next_line(), if stdout.is_open() => record(&handle, LogStream::Stdout, line),
                    line = stderr.next_line(), if stderr.is_open() => record(&handle, LogStream::Stderr, line),
                }
            }
        };
        if tokio::time::timeout(DRAIN_TIMEOUT, drain).await.is_err() {
            debug!(session_id = %handle.id(), "Output pipes still open after exit");
        }

        let exit_code = match exit {
            Ok(status) => status.code(),
            Err(e) => {
                warn!(session_id = %handle.id(), error = %e, "Failed to wait for process");
                None
            }
        };
        finish(&handle, exit_code, hook.as_ref(), store.as_ref()).await;
    })
}

/// Terminal transition: runs at most once per session
async fn finish(
    handle: &SessionHandle,
    exit_code: Option<i32>,
    hook: &dyn TerminalHook,
    store: &dyn SessionStore,
) {
    let reason = handle.begin_finalize();
    let status = if reason.is_none() && exit_code == Some(0) {
        SessionStatus::Completed
    } else {
        SessionStatus::Failed
    };

    // Leftover members of the group lost their leader
    if let Some(group) = handle.process_group() {
        if let Ok(true) = group.kill() {
            debug!(session_id = %handle.id(), pgid = group.id(), "Killed remaining group members");
        }
    }

    hook.on_terminal(handle.id(), exit_code).await;

    let ended_at = chrono::Utc::now();
    if let Err(e) = store.record_status(handle.id(), status, ended_at).await {
        warn!(session_id = %handle.id(), error = %e, "Failed to persist terminal status");
    }

    if handle.complete(status, exit_code, reason.clone()).is_some() {
        info!(
            session_id = %handle.id(),
            status = %status,
            exit_code = ?exit_code,
            reason = reason.as_deref().unwrap_or(""),
            "Session ended"
        );
    }
    handle.mark_finished();
}
