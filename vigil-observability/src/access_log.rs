use crate::registry::{EventReceiver, SinkRegistry};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};
use vigil_core::LogFormat;

/// Destination for rendered access lines.
pub trait LineSink: Send + 'static {
    fn write_line(&mut self, line: &str);
}

/// Writes access lines through `tracing` under the `vigil::access` target.
pub struct TracingLineSink;

impl LineSink for TracingLineSink {
    fn write_line(&mut self, line: &str) {
        info!(target: "vigil::access", "{line}");
    }
}

/// Default access-log subscriber.
///
/// One task drains one bounded channel, so lines never interleave. The task
/// lives until [`AccessLogWorker::shutdown`] is awaited (or the handle is
/// dropped); queued events are written out before it exits.
pub struct AccessLogWorker {
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl AccessLogWorker {
    /// Subscribe to `registry` and start writing lines to `sink`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<S: LineSink>(
        registry: &SinkRegistry,
        format: LogFormat,
        capacity: usize,
        sink: S,
    ) -> Self {
        let rx = registry.subscribe(capacity);
        let (stop, stop_rx) = oneshot::channel();
        let task = tokio::spawn(Self::run(rx, stop_rx, format, sink));
        debug!(capacity, ?format, "Access log worker started");
        Self { stop, task }
    }

    async fn run<S: LineSink>(
        mut rx: EventReceiver,
        mut stop: oneshot::Receiver<()>,
        format: LogFormat,
        mut sink: S,
    ) {
        loop {
            tokio::select! {
                biased;
                maybe = rx.recv() => match maybe {
                    Some(event) => sink.write_line(&event.format(format)),
                    None => break,
                },
                _ = &mut stop => {
                    while let Ok(event) = rx.try_recv() {
                        sink.write_line(&event.format(format));
                    }
                    break;
                }
            }
        }
        debug!("Access log worker stopped");
    }

    /// Stop the worker after flushing whatever is already queued.
    pub async fn shutdown(self) {
        let Self { stop, task } = self;
        let _ = stop.send(());
        if let Err(e) = task.await {
            error!(error = %e, "Access log worker terminated abnormally");
        }
    }
}
