//! Worker-pool dispatch for bound extension actions.
//!
//! # Responsibility
//! - Run triggered actions off the host thread.
//! - Deliver one [`InvocationReport`] per dispatched invocation over a channel.
//!
//! # Invariants
//! - Each extension has one serial lane: its invocations start in submission
//!   order and never overlap, unless an earlier one timed out.
//! - Different extensions run concurrently on the blocking pool.
//! - A timed-out invocation keeps running in the background; only its report
//!   is replaced by [`InvocationError::TimedOut`].
//! - Dropping the dispatcher never waits for running invocations.

use crate::extension::binder::HostAction;
use crate::extension::loader::{InvocationError, InvocationOutput};
use crate::extension::registry::ExtensionId;
use log::{debug, warn};
use std::collections::HashMap;
use std::time::Duration;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinError;

/// Sequence number identifying one dispatched invocation.
pub type InvocationTicket = u64;

/// Outcome of one dispatched invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationReport {
    pub ticket: InvocationTicket,
    pub extension_id: ExtensionId,
    pub label: String,
    pub outcome: Result<InvocationOutput, InvocationError>,
}

struct Job {
    ticket: InvocationTicket,
    action: HostAction,
}

/// Runs host actions on a tokio worker pool.
pub struct ActionDispatcher {
    /// `None` only while dropping.
    runtime: Option<Runtime>,
    handle: Handle,
    lanes: HashMap<ExtensionId, UnboundedSender<Job>>,
    reports_tx: UnboundedSender<InvocationReport>,
    reports_rx: UnboundedReceiver<InvocationReport>,
    timeout: Option<Duration>,
    next_ticket: InvocationTicket,
}

impl ActionDispatcher {
    /// Starts a worker pool with `worker_threads` async workers.
    pub fn new(worker_threads: usize, timeout: Option<Duration>) -> std::io::Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(worker_threads.max(1))
            .thread_name("littletoolkit-ext")
            .enable_time()
            .build()?;
        let handle = runtime.handle().clone();
        let (reports_tx, reports_rx) = mpsc::unbounded_channel();
        Ok(Self {
            runtime: Some(runtime),
            handle,
            lanes: HashMap::new(),
            reports_tx,
            reports_rx,
            timeout,
            next_ticket: 1,
        })
    }

    /// Queues `action` on its extension's lane and returns its ticket.
    pub fn dispatch(&mut self, action: HostAction) -> InvocationTicket {
        let ticket = self.next_ticket;
        self.next_ticket += 1;

        let id = action.id();
        let label = action.label().to_string();
        let job = Job { ticket, action };

        let job = match self.lanes.get(&id) {
            Some(lane) => match lane.send(job) {
                Ok(()) => return ticket,
                Err(mpsc::error::SendError(job)) => job,
            },
            None => job,
        };

        let lane = self.spawn_lane(id);
        if let Err(mpsc::error::SendError(job)) = lane.send(job) {
            warn!(
                "event=extension_dispatch module=dispatch status=error ticket={} label={}",
                ticket, label
            );
            let _ = self.reports_tx.send(InvocationReport {
                ticket: job.ticket,
                extension_id: id,
                label,
                outcome: Err(InvocationError::Unavailable),
            });
        }
        self.lanes.insert(id, lane);
        ticket
    }

    /// Closes the lane of a removed extension. Queued jobs still run.
    pub fn close_lane(&mut self, id: ExtensionId) {
        self.lanes.remove(&id);
    }

    /// Waits up to `timeout` for the next report.
    pub fn next_report(&mut self, timeout: Duration) -> Option<InvocationReport> {
        let reports_rx = &mut self.reports_rx;
        self.handle
            .block_on(async { tokio::time::timeout(timeout, reports_rx.recv()).await })
            .ok()
            .flatten()
    }

    /// Returns a report if one is ready.
    pub fn try_next_report(&mut self) -> Option<InvocationReport> {
        self.reports_rx.try_recv().ok()
    }

    fn spawn_lane(&self, id: ExtensionId) -> UnboundedSender<Job> {
        let (lane_tx, mut lane_rx) = mpsc::unbounded_channel::<Job>();
        let reports = self.reports_tx.clone();
        let timeout = self.timeout;

        self.handle.spawn(async move {
            while let Some(Job { ticket, action }) = lane_rx.recv().await {
                let label = action.label().to_string();
                debug!(
                    "event=extension_invoke module=dispatch status=start ticket={} label={}",
                    ticket, label
                );
                let handle = tokio::task::spawn_blocking(move || action.invoke());
                let outcome = match timeout {
                    Some(limit) => match tokio::time::timeout(limit, handle).await {
                        Ok(joined) => flatten_join(joined),
                        Err(_) => Err(InvocationError::TimedOut {
                            millis: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                        }),
                    },
                    None => flatten_join(handle.await),
                };

                match &outcome {
                    Ok(_) => debug!(
                        "event=extension_invoke module=dispatch status=ok ticket={} label={}",
                        ticket, label
                    ),
                    Err(err) => warn!(
                        "event=extension_invoke module=dispatch status=error ticket={} label={} error={}",
                        ticket, label, err
                    ),
                }

                let report = InvocationReport {
                    ticket,
                    extension_id: id,
                    label,
                    outcome,
                };
                if reports.send(report).is_err() {
                    break;
                }
            }
        });

        lane_tx
    }
}

impl Drop for ActionDispatcher {
    fn drop(&mut self) {
        self.lanes.clear();
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
            debug!("event=extension_dispatch_shutdown module=dispatch status=ok");
        }
    }
}

fn flatten_join(
    joined: Result<Result<InvocationOutput, InvocationError>, JoinError>,
) -> Result<InvocationOutput, InvocationError> {
    match joined {
        Ok(outcome) => outcome,
        Err(err) => Err(InvocationError::Panicked {
            message: err.to_string(),
        }),
    }
}
