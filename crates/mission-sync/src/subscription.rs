//! Standing snapshot subscriptions over a store change feed.

use std::sync::{
    Arc, Mutex, MutexGuard, PoisonError,
    atomic::{AtomicBool, Ordering},
};
use std::thread::{self, ThreadId};

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::store::{SnapshotReceiver, StoredDocument};

/// Callback receiving each full snapshot.
pub type SnapshotCallback<T> = Arc<dyn Fn(Vec<T>) + Send + Sync>;

/// Callback receiving change-feed errors.
pub type ErrorCallback = Arc<dyn Fn(StoreError) + Send + Sync>;

/// Handle to one open change feed.
///
/// [`Subscription::unsubscribe`] is idempotent; after it returns no further
/// snapshot or error is delivered, including ones already queued. A callback
/// running on another thread when it is called finishes first. Dropping the
/// handle unsubscribes.
pub struct Subscription {
    label: String,
    active: Arc<AtomicBool>,
    gate: Arc<DeliveryGate>,
    task: Mutex<Option<JoinHandle<()>>>,
}

/// Serializes callbacks against `unsubscribe`.
#[derive(Default)]
struct DeliveryGate {
    lock: Mutex<()>,
    delivering_on: Mutex<Option<ThreadId>>,
}

impl DeliveryGate {
    /// Runs `deliver` while `active` holds. Returns false once inactive.
    fn run(&self, active: &AtomicBool, deliver: impl FnOnce()) -> bool {
        let _guard = relock(&self.lock);
        if !active.load(Ordering::Acquire) {
            return false;
        }
        *relock(&self.delivering_on) = Some(thread::current().id());
        deliver();
        *relock(&self.delivering_on) = None;
        true
    }

    /// Blocks until no callback is running, unless the caller is that
    /// callback.
    fn wait_idle(&self) {
        if *relock(&self.delivering_on) == Some(thread::current().id()) {
            return;
        }
        drop(relock(&self.lock));
    }
}

fn relock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Subscription {
    /// Drives `receiver` on the current tokio runtime.
    ///
    /// Snapshots queued behind a slow callback collapse to the newest one.
    /// `prepare` shapes each snapshot before delivery and runs outside the
    /// delivery lock.
    pub(crate) fn spawn<T, P>(
        label: impl Into<String>,
        mut receiver: SnapshotReceiver,
        prepare: P,
        on_data: SnapshotCallback<T>,
        on_error: Option<ErrorCallback>,
    ) -> Result<Self, StoreError>
    where
        T: Send + 'static,
        P: Fn(Vec<StoredDocument>) -> Vec<T> + Send + Sync + 'static,
    {
        let runtime = Handle::try_current()
            .map_err(|error| StoreError::Internal(format!("subscription needs a tokio runtime: {error}")))?;
        let label = label.into();
        let active = Arc::new(AtomicBool::new(true));
        let gate = Arc::new(DeliveryGate::default());
        let task_active = Arc::clone(&active);
        let task_gate = Arc::clone(&gate);
        let task_label = label.clone();

        let task = runtime.spawn(async move {
            let report = |error: StoreError| {
                task_gate.run(&task_active, || {
                    report_error(task_label.as_str(), on_error.as_ref(), error);
                })
            };
            while let Some(message) = receiver.recv().await {
                let mut latest = None;
                let mut skipped = 0_usize;
                let mut next = Some(message);
                while let Some(message) = next {
                    match message {
                        Ok(snapshot) => {
                            if latest.replace(snapshot).is_some() {
                                skipped += 1;
                            }
                        }
                        Err(error) => {
                            if !report(error) {
                                return;
                            }
                        }
                    }
                    next = receiver.try_recv().ok();
                }
                let Some(snapshot) = latest else {
                    continue;
                };
                if !task_active.load(Ordering::Acquire) {
                    return;
                }
                let records = snapshot.len();
                let items = prepare(snapshot);
                let delivered = task_gate.run(&task_active, || {
                    debug!(subscription = %task_label, records, skipped, "delivering snapshot");
                    on_data(items);
                });
                if !delivered {
                    return;
                }
            }
            task_gate.run(&task_active, || {
                task_active.store(false, Ordering::Release);
                report_error(
                    task_label.as_str(),
                    on_error.as_ref(),
                    StoreError::ChannelClosed,
                );
            });
        });

        Ok(Self {
            label,
            active,
            gate,
            task: Mutex::new(Some(task)),
        })
    }

    /// Closes the feed. Safe to call more than once, including from inside
    /// its own callbacks.
    pub fn unsubscribe(&self) {
        if !self.active.swap(false, Ordering::AcqRel) {
            return;
        }
        self.gate.wait_idle();
        if let Ok(mut guard) = self.task.lock()
            && let Some(task) = guard.take()
        {
            task.abort();
        }
        debug!(subscription = %self.label, "unsubscribed");
    }

    /// False once unsubscribed or once the store closed the feed.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

fn report_error(label: &str, on_error: Option<&ErrorCallback>, error: StoreError) {
    match on_error {
        Some(callback) => callback(error),
        None => warn!(subscription = %label, %error, "subscription error with no handler"),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use tokio::sync::mpsc;

    use super::{ErrorCallback, SnapshotCallback, Subscription};
    use crate::error::StoreError;
    use crate::store::{Document, SnapshotReceiver, StoredDocument};

    fn records(count: usize) -> Vec<StoredDocument> {
        (0..count)
            .map(|index| StoredDocument {
                id: format!("r{index}"),
                data: Document::new(),
            })
            .collect()
    }

    fn counting(
        receiver: SnapshotReceiver,
    ) -> (
        Result<Subscription, StoreError>,
        mpsc::UnboundedReceiver<usize>,
    ) {
        let (seen_tx, seen_rx) = mpsc::unbounded_channel();
        let on_data: SnapshotCallback<StoredDocument> = Arc::new(move |snapshot| {
            let _ = seen_tx.send(snapshot.len());
        });
        let subscription = Subscription::spawn("test", receiver, |snapshot| snapshot, on_data, None);
        (subscription, seen_rx)
    }

    #[tokio::test]
    async fn unsubscribe_is_idempotent_and_stops_delivery() {
        let (sender, receiver) = mpsc::unbounded_channel();
        let (subscription, mut seen_rx) = counting(receiver);
        let subscription = match subscription {
            Ok(value) => value,
            Err(error) => {
                assert!(false, "spawn should succeed: {error}");
                return;
            }
        };

        assert!(sender.send(Ok(Vec::new())).is_ok());
        assert_eq!(seen_rx.recv().await, Some(0));

        subscription.unsubscribe();
        subscription.unsubscribe();
        assert!(!subscription.is_active());

        let _ = sender.send(Ok(Vec::new()));
        let next = tokio::time::timeout(Duration::from_millis(50), seen_rx.recv()).await;
        assert!(!matches!(next, Ok(Some(_))));
    }

    #[tokio::test]
    async fn queued_snapshots_collapse_to_the_newest() {
        let (sender, receiver) = mpsc::unbounded_channel();
        let (subscription, mut seen_rx) = counting(receiver);
        assert!(subscription.is_ok());

        // The current-thread runtime has not polled the task yet.
        for count in 1..=3 {
            assert!(sender.send(Ok(records(count))).is_ok());
        }
        assert_eq!(seen_rx.recv().await, Some(3));
        let next = tokio::time::timeout(Duration::from_millis(50), seen_rx.recv()).await;
        assert!(next.is_err());
    }

    #[tokio::test]
    async fn unsubscribe_from_inside_the_callback_does_not_block() {
        let (sender, receiver) = mpsc::unbounded_channel();
        let slot: Arc<Mutex<Option<Arc<Subscription>>>> = Arc::new(Mutex::new(None));
        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
        let callback_slot = Arc::clone(&slot);
        let on_data: SnapshotCallback<StoredDocument> = Arc::new(move |_| {
            let handle = callback_slot.lock().ok().and_then(|guard| guard.clone());
            if let Some(handle) = handle {
                handle.unsubscribe();
                let _ = seen_tx.send(handle.is_active());
            }
        });
        let subscription = match Subscription::spawn("test", receiver, |snapshot| snapshot, on_data, None) {
            Ok(value) => Arc::new(value),
            Err(error) => {
                assert!(false, "spawn should succeed: {error}");
                return;
            }
        };
        if let Ok(mut guard) = slot.lock() {
            *guard = Some(Arc::clone(&subscription));
        }

        assert!(sender.send(Ok(records(1))).is_ok());
        let seen = tokio::time::timeout(Duration::from_secs(2), seen_rx.recv()).await;
        assert!(matches!(seen, Ok(Some(false))));
        assert!(!subscription.is_active());

        let _ = sender.send(Ok(records(2)));
        let next = tokio::time::timeout(Duration::from_millis(50), seen_rx.recv()).await;
        assert!(!matches!(next, Ok(Some(_))));
    }

    #[tokio::test]
    async fn closed_feed_reports_channel_closed() {
        let (sender, receiver) = mpsc::unbounded_channel();
        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&errors);
        let (done_tx, mut done_rx) = mpsc::unbounded_channel();
        let on_error: ErrorCallback = Arc::new(move |error| {
            if let Ok(mut guard) = sink.lock() {
                guard.push(error);
            }
            let _ = done_tx.send(());
        });
        let on_data: SnapshotCallback<StoredDocument> = Arc::new(|_| {});
        let subscription =
            Subscription::spawn("test", receiver, |snapshot| snapshot, on_data, Some(on_error));
        assert!(subscription.is_ok());

        drop(sender);
        assert_eq!(done_rx.recv().await, Some(()));
        let recorded = errors.lock().map(|guard| guard.clone()).unwrap_or_default();
        assert_eq!(recorded, vec![StoreError::ChannelClosed]);
        assert!(subscription.is_ok_and(|handle| !handle.is_active()));
    }

    #[test]
    fn spawning_outside_a_runtime_is_an_error() {
        let (_sender, receiver) = mpsc::unbounded_channel();
        let (subscription, _seen_rx) = counting(receiver);
        assert!(matches!(subscription, Err(StoreError::Internal(_))));
    }
}
