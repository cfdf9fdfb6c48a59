//! Context vendor.
//!
//! A single long-running task that hands out fetch contexts on request and
//! owns the "current" one. Pressing the abort key sends on `cancel`; the
//! vendor cancels the current context and replaces it with a fresh one, so
//! any in-flight fetch aborts and subsequent fetches proceed normally.
//!
//! Jobs: `"page"` grants a 5-second-timeout context for unary fetches,
//! `"stream"` a cancellable context with no timeout, `"form"` a background
//! context the vendor does not track (form polling must not die to a fetch
//! abort). Anything else returns the current context.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Deadline applied to unary page and feed fetches.
pub const PAGE_TIMEOUT: Duration = Duration::from_secs(5);

/// A first-class cancellation/timeout pair passed into every fetch.
#[derive(Debug, Clone)]
pub struct FetchContext {
    pub token: CancellationToken,
    pub timeout: Option<Duration>,
}

impl FetchContext {
    fn page(interrupt: &CancellationToken) -> Self {
        Self {
            token: interrupt.child_token(),
            timeout: Some(PAGE_TIMEOUT),
        }
    }

    fn cancellable(interrupt: &CancellationToken) -> Self {
        Self {
            token: interrupt.child_token(),
            timeout: None,
        }
    }
}

/// Spawn the vendor task. It ends when `interrupt` is cancelled.
pub fn spawn_vendor(
    mut jobs: mpsc::Receiver<String>,
    mut cancel: mpsc::Receiver<String>,
    out: mpsc::Sender<FetchContext>,
    messages: mpsc::Sender<String>,
    interrupt: CancellationToken,
) {
    tokio::spawn(async move {
        let mut current = FetchContext::cancellable(&interrupt);
        loop {
            tokio::select! {
                _ = interrupt.cancelled() => return,
                Some(msg) = cancel.recv() => {
                    info!(target: "cex", cancel_msg = %msg, "caught cancel");
                    current.token.cancel();
                    // never block the vendor on a busy orchestrator
                    let _ = messages.try_send("cancelling connection".to_string());
                    current = FetchContext::cancellable(&interrupt);
                }
                Some(job) = jobs.recv() => {
                    let granted = match job.as_str() {
                        "page" => {
                            current = FetchContext::page(&interrupt);
                            current.clone()
                        }
                        "stream" => {
                            current = FetchContext::cancellable(&interrupt);
                            current.clone()
                        }
                        // untracked: a later cancel must not end form polling
                        "form" => FetchContext::cancellable(&interrupt),
                        _ => current.clone(),
                    };
                    info!(target: "cex", job = %job, "sent context to requestor");
                    if out.send(granted).await.is_err() {
                        return;
                    }
                }
            }
        }
    });
}

/// Channel bundle the orchestrator uses to talk to the vendor.
pub struct CexHandle {
    pub jobs: mpsc::Sender<String>,
    pub cancel: mpsc::Sender<String>,
    pub out: mpsc::Receiver<FetchContext>,
}

impl CexHandle {
    /// Request a context of the given kind and wait for the grant.
    pub async fn request(&mut self, job: &str) -> FetchContext {
        // The vendor only dies with the whole process; a closed channel just
        // means shutdown, where an inert context is fine.
        let _ = self.jobs.send(job.to_string()).await;
        self.out.recv().await.unwrap_or(FetchContext {
            token: CancellationToken::new(),
            timeout: None,
        })
    }
}

/// Wire up vendor channels and spawn the task.
pub fn start(messages: mpsc::Sender<String>, interrupt: CancellationToken) -> CexHandle {
    let (jobs_tx, jobs_rx) = mpsc::channel(8);
    let (cancel_tx, cancel_rx) = mpsc::channel(8);
    let (out_tx, out_rx) = mpsc::channel(8);
    spawn_vendor(jobs_rx, cancel_rx, out_tx, messages, interrupt);
    CexHandle {
        jobs: jobs_tx,
        cancel: cancel_tx,
        out: out_rx,
    }
}
