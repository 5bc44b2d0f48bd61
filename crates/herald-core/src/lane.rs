//! Single-worker background lane for outbound I/O.
//!
//! Jobs run one at a time in submission order on a dedicated tokio task,
//! so requests to the same endpoint are ordered and a rate-limit sleep
//! holds back everything queued behind it. Submitting never blocks.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Mutex;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

enum Message {
    Run(BoxFuture<'static, ()>),
    Drain(oneshot::Sender<()>),
}

/// Serialized background execution context.
pub struct IoLane {
    tx: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl IoLane {
    /// Start the lane on the current tokio runtime.
    ///
    /// Panics if called outside a runtime, like `tokio::spawn`.
    pub fn spawn() -> Self {
        Self::spawn_on(&Handle::current())
    }

    /// Start the lane on an explicit runtime handle.
    pub fn spawn_on(handle: &Handle) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = handle.spawn(run_lane(rx));
        Self {
            tx: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Queue a job. Returns `false` once the lane has been shut down.
    pub fn submit<F>(&self, job: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.send(Message::Run(job.boxed()))
    }

    /// Wait until every job submitted before this call has finished.
    pub async fn drain(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.send(Message::Drain(done_tx)) {
            let _ = done_rx.await;
        }
    }

    /// Stop accepting jobs, finish the queued ones and stop the worker.
    pub async fn shutdown(&self) {
        let tx = self.tx.lock().unwrap_or_else(|p| p.into_inner()).take();
        drop(tx);
        let worker = self.worker.lock().unwrap_or_else(|p| p.into_inner()).take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                warn!(error = %e, "io lane worker ended abnormally");
            }
        }
    }

    fn send(&self, msg: Message) -> bool {
        let guard = self.tx.lock().unwrap_or_else(|p| p.into_inner());
        match guard.as_ref() {
            Some(tx) => tx.send(msg).is_ok(),
            None => false,
        }
    }
}

async fn run_lane(mut rx: mpsc::UnboundedReceiver<Message>) {
    debug!("io lane started");
    while let Some(msg) = rx.recv().await {
        match msg {
            Message::Run(job) => {
                if AssertUnwindSafe(job).catch_unwind().await.is_err() {
                    warn!("io lane job panicked");
                }
            }
            Message::Drain(done) => {
                let _ = done.send(());
            }
        }
    }
    debug!("io lane stopped");
}
