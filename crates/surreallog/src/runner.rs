use std::{ffi::OsString, process::ExitStatus, time::Duration};

use tokio::{
    io::{self, AsyncRead},
    sync::mpsc,
    task::JoinHandle,
    time,
};
use tracing::{debug, warn};
use workflow_commands::{
    AsyncLineSplitter, Event, EventKind, MaskSet, SplitLimits, StreamInterpreter,
};

use crate::{
    error::ConfigError,
    process,
    sender::{BatchSink, BatchingSender},
    SurreallogError,
};

#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    /// Events buffered between the stream readers and the sender before the
    /// readers stop pulling from the child's pipes.
    pub queue_capacity: usize,
    pub limits: SplitLimits,
    /// How long to keep reading after the child exits. Output pipes still
    /// held open by its background processes are abandoned after this.
    pub exit_grace: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            queue_capacity: 10,
            limits: SplitLimits::default(),
            exit_grace: Duration::from_secs(1),
        }
    }
}

/// Runs `argv` to completion, feeding everything it prints through `sender`.
///
/// Returns the child's exit code. The sender has been flushed by the time
/// this returns, on every path. An unsuccessful exit status, a spawn failure
/// and a wait failure are each written to the sender as a final `stderr`
/// event.
pub async fn run<S: BatchSink>(
    argv: &[OsString],
    sender: &BatchingSender<S>,
    options: RunOptions,
) -> Result<i32, SurreallogError> {
    let mut command = process::command(argv).ok_or(ConfigError::MissingCommand)?;
    let mut child = match process::spawn_with_retry(&mut command).await {
        Ok(child) => child,
        Err(err) => return Err(record_failure(sender, err).await),
    };
    let stdout = child
        .stdout
        .take()
        .ok_or(SurreallogError::MissingPipe("stdout"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or(SurreallogError::MissingPipe("stderr"))?;
    debug!(pid = child.id(), "child started");

    let masks = MaskSet::new();
    let (events, mut queue) = mpsc::channel(options.queue_capacity.max(1));
    let readers = [
        tokio::spawn(pump(
            "stdout",
            stdout,
            StreamInterpreter::primary(masks.clone()),
            options.limits,
            events.clone(),
        )),
        tokio::spawn(pump(
            "stderr",
            stderr,
            StreamInterpreter::secondary(masks),
            options.limits,
            events,
        )),
    ];

    let mut queue_open = true;
    let waited = loop {
        tokio::select! {
            biased;
            event = queue.recv(), if queue_open => match event {
                Some(event) => sender.write(event).await,
                None => queue_open = false,
            },
            waited = child.wait() => break waited,
        }
    };
    finish_readers(&mut queue, readers, sender, options.exit_grace).await;

    let status = match waited {
        Ok(status) => status,
        Err(source) => return Err(record_failure(sender, SurreallogError::Wait(source)).await),
    };
    if !status.success() {
        sender
            .write(Event::synthetic(EventKind::Stderr, describe(status)))
            .await;
    }
    sender.flush().await;
    Ok(process::exit_code(status))
}

/// Keeps forwarding events until both readers hit EOF or `grace` runs out,
/// then aborts whichever reader is still blocked on an inherited pipe and
/// forwards what they had already queued.
async fn finish_readers<S: BatchSink>(
    queue: &mut mpsc::Receiver<Event>,
    readers: [JoinHandle<()>; 2],
    sender: &BatchingSender<S>,
    grace: Duration,
) {
    let deadline = time::sleep(grace);
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            biased;
            event = queue.recv() => match event {
                Some(event) => sender.write(event).await,
                None => break,
            },
            _ = &mut deadline => {
                warn!(?grace, "child exited but its output is still open; no longer reading it");
                for reader in &readers {
                    reader.abort();
                }
                break;
            }
        }
    }

    for reader in readers {
        if let Err(err) = reader.await {
            if !err.is_cancelled() {
                warn!("output reader task failed: {err}");
            }
        }
    }
    while let Some(event) = queue.recv().await {
        sender.write(event).await;
    }
}

/// `exit status: 3`, `signal: 9 (SIGKILL)`.
fn describe(status: ExitStatus) -> String {
    status.to_string()
}

async fn record_failure<S: BatchSink>(
    sender: &BatchingSender<S>,
    err: SurreallogError,
) -> SurreallogError {
    sender
        .write(Event::synthetic(EventKind::Stderr, err.to_string()))
        .await;
    sender.flush().await;
    err
}

/// Reads one child stream to EOF, sending an event per interpreted line.
///
/// A line that is too long or a read error ends interpretation of the
/// stream, but the rest of the pipe is still drained so the child never
/// blocks writing to it.
async fn pump<R: AsyncRead + Unpin>(
    stream: &'static str,
    reader: R,
    mut interpreter: StreamInterpreter,
    limits: SplitLimits,
    events: mpsc::Sender<Event>,
) {
    let mut splitter = AsyncLineSplitter::new(reader, limits.max_line_bytes);
    let failure = loop {
        match splitter.next_line().await {
            None => {
                debug!(stream, lines = splitter.line_number(), "child stream closed");
                return;
            }
            Some(Ok(line)) => {
                let Some(event) = interpreter.interpret(&line) else {
                    continue;
                };
                if events.send(event).await.is_err() {
                    debug!(stream, "event queue closed");
                    return;
                }
            }
            Some(Err(err)) => break err,
        }
    };

    warn!(stream, "no longer capturing output: {failure}");
    let mut rest = splitter.into_inner();
    match io::copy(&mut rest, &mut io::sink()).await {
        Ok(discarded) => debug!(stream, discarded, "drained child stream"),
        Err(err) => debug!(stream, "failed to drain child stream: {err}"),
    }
}
