use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, watch};

use crate::domain::events::{ConnectivityStatus, ConnectivityTransition};

const CONNECTIVITY_TRANSITION: &str = "CONNECTIVITY_TRANSITION";
const REACHABILITY_OBSERVER_STOPPED: &str = "REACHABILITY_OBSERVER_STOPPED";

/// Listener for edge events. Returning `false` unsubscribes it.
type TransitionListener = Box<dyn Fn(ConnectivityTransition) -> bool + Send + 'static>;

/// Process-wide reachability tracker.
///
/// Platform code reports raw observations through [`ConnectivityMonitor::observe`],
/// possibly repeating the same level many times. Listeners only hear about
/// real changes, so one disconnect/reconnect cycle yields exactly one
/// `BecameReachable`.
#[derive(Clone)]
pub struct ConnectivityMonitor {
    inner: Arc<Mutex<MonitorState>>,
}

struct MonitorState {
    status: ConnectivityStatus,
    listeners: Vec<TransitionListener>,
}

impl std::fmt::Debug for ConnectivityMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectivityMonitor")
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectivityMonitor {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MonitorState {
                status: ConnectivityStatus::Unknown,
                listeners: Vec::new(),
            })),
        }
    }

    pub fn status(&self) -> ConnectivityStatus {
        self.inner
            .lock()
            .map(|state| state.status)
            .unwrap_or(ConnectivityStatus::Unknown)
    }

    pub fn is_reachable(&self) -> bool {
        self.status() == ConnectivityStatus::Reachable
    }

    pub fn subscribe<F>(&self, listener: F)
    where
        F: Fn(ConnectivityTransition) -> bool + Send + 'static,
    {
        if let Ok(mut state) = self.inner.lock() {
            state.listeners.push(Box::new(listener));
        }
    }

    /// Records a raw reachability observation and returns the edge it caused, if any.
    pub fn observe(&self, reachable: bool) -> Option<ConnectivityTransition> {
        let Ok(mut state) = self.inner.lock() else {
            return None;
        };

        let next = ConnectivityStatus::from_reachable(reachable);
        let transition = edge(state.status, next);
        state.status = next;

        if let Some(transition) = transition {
            tracing::info!(
                code = CONNECTIVITY_TRANSITION,
                status = next.as_label(),
                listeners = state.listeners.len(),
                "connectivity changed"
            );
            state.listeners.retain(|listener| listener(transition));
        }

        transition
    }
}

fn edge(previous: ConnectivityStatus, next: ConnectivityStatus) -> Option<ConnectivityTransition> {
    match (previous, next) {
        (ConnectivityStatus::Reachable, ConnectivityStatus::Reachable) => None,
        (_, ConnectivityStatus::Reachable) => Some(ConnectivityTransition::BecameReachable),
        (ConnectivityStatus::Reachable, ConnectivityStatus::Unreachable) => {
            Some(ConnectivityTransition::BecameUnreachable)
        }
        _ => None,
    }
}

/// Background task feeding platform reachability samples into a monitor.
#[derive(Debug)]
pub struct ReachabilityObserver {
    stop_tx: Option<watch::Sender<bool>>,
}

impl ReachabilityObserver {
    pub fn start(monitor: ConnectivityMonitor, samples: mpsc::Receiver<bool>) -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        tokio::spawn(run_observer(monitor, samples, stop_rx));

        Self {
            stop_tx: Some(stop_tx),
        }
    }
}

impl Drop for ReachabilityObserver {
    fn drop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(true);
        }
    }
}

async fn run_observer(
    monitor: ConnectivityMonitor,
    mut samples: mpsc::Receiver<bool>,
    mut stop_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            biased;
            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    break;
                }
            }
            sample = samples.recv() => {
                match sample {
                    Some(reachable) => {
                        monitor.observe(reachable);
                    }
                    None => break,
                }
            }
        }
    }

    tracing::debug!(
        code = REACHABILITY_OBSERVER_STOPPED,
        "reachability observer stopped"
    );
}
