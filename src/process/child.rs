use log::info;
use std::{
    io::IsTerminal,
    mem,
    ops::{Deref, DerefMut},
    pin::{Pin, pin},
    sync::{LazyLock, Mutex},
    task::{Context, Poll},
    time::Duration,
};
use tokio::{
    signal,
    time::{Instant, timeout_at},
};
use tokio_process_stream::{Item, ProcessLineStream};
use tokio_stream::Stream;

static KILLED: LazyLock<Mutex<Vec<ProcessLineStream>>> = LazyLock::new(<_>::default);

/// Kill a child process if still running & keep it so it may be reaped before exiting.
pub fn kill(mut child: ProcessLineStream) {
    let Some(proc) = child.child_mut() else {
        return;
    };
    if !matches!(proc.try_wait(), Ok(None)) {
        return;
    }
    if let Err(err) = proc.start_kill() {
        info!("failed to kill ffmpeg: {err}");
    }

    let mut killed = KILLED.lock().unwrap_or_else(|e| e.into_inner());
    // drop any that have exited already
    killed.retain_mut(|c| {
        c.child_mut()
            .is_some_and(|c| matches!(c.try_wait(), Ok(None)))
    });
    killed.push(child);
}

/// Wait for all child processes, that were [`kill`]ed, to exit.
pub async fn wait() {
    // if waiting takes >500ms log what's happening
    let mut log_deadline = Some(Instant::now() + Duration::from_millis(500));
    let procs = mem::take(&mut *KILLED.lock().unwrap_or_else(|e| e.into_inner()));
    let mut ctrl_c = pin!(signal::ctrl_c());

    for mut proc in procs {
        if let Some(child) = proc.child_mut() {
            if let Some(deadline) = log_deadline {
                if timeout_at(deadline, child.wait()).await.is_err() {
                    log_waiting();
                    log_deadline = None;
                }
            }
            tokio::select! {
                _ = &mut ctrl_c => {
                    log_abort_wait();
                    return;
                }
                _ = child.wait() => {}
            }
        }
    }
}

fn log_waiting() {
    match std::io::stderr().is_terminal() {
        true => eprintln!("Waiting for ffmpeg to exit..."),
        _ => info!("Waiting for ffmpeg to exit"),
    }
}

fn log_abort_wait() {
    match std::io::stderr().is_terminal() {
        true => eprintln!("Aborting wait for ffmpeg"),
        _ => info!("Aborting wait for ffmpeg"),
    }
}

/// Wrapper that [`kill`]s the inner on drop, e.g. when the encode is cancelled.
#[derive(Debug)]
pub struct KillOnDropLineStream(Option<ProcessLineStream>);

impl From<ProcessLineStream> for KillOnDropLineStream {
    fn from(v: ProcessLineStream) -> Self {
        Self(Some(v))
    }
}

impl Drop for KillOnDropLineStream {
    fn drop(&mut self) {
        if let Some(child) = self.0.take() {
            kill(child);
        }
    }
}

impl Deref for KillOnDropLineStream {
    type Target = ProcessLineStream;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref().unwrap() // only none after drop
    }
}

impl DerefMut for KillOnDropLineStream {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.0.as_mut().unwrap() // only none after drop
    }
}

impl Stream for KillOnDropLineStream {
    type Item = Item<String>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut **self).poll_next(cx)
    }
}
