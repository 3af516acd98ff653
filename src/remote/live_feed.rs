use tokio::sync::{mpsc, watch};

const LIVE_FEED_STARTED: &str = "LIVE_FEED_STARTED";
const LIVE_FEED_STOPPED: &str = "LIVE_FEED_STOPPED";
const LIVE_FEED_CLOSED_BY_REMOTE: &str = "LIVE_FEED_CLOSED_BY_REMOTE";

/// Handle for one remote push subscription.
///
/// The owner (an open conversation, or the chat list) keeps it for as long as
/// it wants updates; dropping it stops the forwarding task.
#[derive(Debug)]
pub struct LiveSubscription {
    label: String,
    stop_tx: Option<watch::Sender<bool>>,
}

impl LiveSubscription {
    /// Forwards each snapshot to `on_snapshot` until the handle is dropped,
    /// the remote stream ends, or `on_snapshot` returns `false`.
    pub fn start<T, F>(label: impl Into<String>, feed: mpsc::Receiver<T>, on_snapshot: F) -> Self
    where
        T: Send + 'static,
        F: Fn(T) -> bool + Send + 'static,
    {
        let label = label.into();
        let (stop_tx, stop_rx) = watch::channel(false);
        tokio::spawn(run_feed(label.clone(), feed, stop_rx, on_snapshot));

        tracing::debug!(code = LIVE_FEED_STARTED, feed = %label, "live feed started");

        Self {
            label,
            stop_tx: Some(stop_tx),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl Drop for LiveSubscription {
    fn drop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(true);
        }
    }
}

async fn run_feed<T, F>(
    label: String,
    mut feed: mpsc::Receiver<T>,
    mut stop_rx: watch::Receiver<bool>,
    on_snapshot: F,
) where
    F: Fn(T) -> bool,
{
    loop {
        tokio::select! {
            biased;
            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    tracing::debug!(code = LIVE_FEED_STOPPED, feed = %label, "live feed stopped");
                    return;
                }
            }
            snapshot = feed.recv() => {
                match snapshot {
                    Some(snapshot) => {
                        if !on_snapshot(snapshot) {
                            tracing::debug!(
                                code = LIVE_FEED_STOPPED,
                                feed = %label,
                                "live feed consumer went away"
                            );
                            return;
                        }
                    }
                    None => {
                        tracing::info!(
                            code = LIVE_FEED_CLOSED_BY_REMOTE,
                            feed = %label,
                            "remote closed live feed"
                        );
                        return;
                    }
                }
            }
        }
    }
}
