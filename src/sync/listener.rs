//! Ordered asynchronous listener notification.
//!
//! Every registered listener gets its own unbounded FIFO queue drained by a
//! dedicated task, so slow listener code never runs inside the caller's
//! critical section and callbacks reach each listener in publication order.
//! Registration can enqueue an initial replay callback before any live
//! delta, giving late subscribers the full current state first.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::knowledge::NodeProperty;

/// Listener for raw node property changes.
///
/// "Raw" means unfiltered: every batch accepted into the complete-knowledge
/// registry is reported, including retractions and properties of nodes that
/// are not currently reachable. Reachability-scoped consumers should use
/// [`crate::sync::ReachablePropertyView`] instead.
pub trait PropertyListener: Send + Sync {
    /// Called with every batch of properties newly added to or modified in
    /// the complete knowledge, and once at registration with the full
    /// current snapshot (which may be empty).
    fn on_properties_added_or_modified(&self, properties: &[NodeProperty]);
}

/// Handle identifying a registered listener; pass it back to the registering
/// component to unregister.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "dropping the handle without unregistering leaks the listener"]
pub struct ListenerHandle {
    id: u64,
}

/// A boxed callback applied to one listener.
pub(crate) type Callback<L> = Arc<dyn Fn(&L) + Send + Sync>;

/// Fan-out of ordered asynchronous callbacks to a set of listeners.
///
/// Not synchronized itself; owners keep it behind their own lock so that
/// enqueue order is the order listeners observe.
pub(crate) struct CallbackHub<L: ?Sized + Send + Sync + 'static> {
    next_id: u64,
    senders: Vec<(u64, mpsc::UnboundedSender<Callback<L>>)>,
}

impl<L: ?Sized + Send + Sync + 'static> CallbackHub<L> {
    pub(crate) fn new() -> Self {
        Self {
            next_id: 0,
            senders: Vec::new(),
        }
    }

    /// Register a listener, optionally enqueueing an initial callback that is
    /// guaranteed to run before any later-enqueued callback.
    ///
    /// Spawns the listener's delivery task; must run inside a tokio runtime.
    pub(crate) fn add_listener(
        &mut self,
        listener: Arc<L>,
        initial: Option<Callback<L>>,
    ) -> ListenerHandle {
        let (tx, mut rx) = mpsc::unbounded_channel::<Callback<L>>();
        if let Some(initial) = initial {
            let _ = tx.send(initial);
        }

        let id = self.next_id;
        self.next_id += 1;
        self.senders.push((id, tx));

        tokio::spawn(async move {
            while let Some(callback) = rx.recv().await {
                callback(listener.as_ref());
            }
        });

        ListenerHandle { id }
    }

    /// Unregister a listener; its queue is closed and its task ends after
    /// draining already-enqueued callbacks.
    pub(crate) fn remove_listener(&mut self, handle: &ListenerHandle) {
        self.senders.retain(|(id, _)| *id != handle.id);
    }

    /// Enqueue a callback for every currently registered listener.
    pub(crate) fn enqueue(&mut self, callback: Callback<L>) {
        self.senders
            .retain(|(_, tx)| tx.send(Arc::clone(&callback)).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::time::Duration;

    struct Recorder {
        batches: Mutex<Vec<Vec<String>>>,
    }

    impl Recorder {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                batches: Mutex::new(Vec::new()),
            })
        }

        fn record(&self, values: Vec<String>) {
            self.batches.lock().push(values);
        }
    }

    async fn drain() {
        // Listener tasks run on the same runtime; yielding a few times lets
        // them drain their queues.
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    #[tokio::test]
    async fn test_replay_before_live_deltas() {
        let mut hub: CallbackHub<Recorder> = CallbackHub::new();
        let recorder = Recorder::new();

        let replay = vec!["snapshot".to_string()];
        let _handle = hub.add_listener(
            Arc::clone(&recorder),
            Some(Arc::new(move |l: &Recorder| l.record(replay.clone()))),
        );
        hub.enqueue(Arc::new(|l: &Recorder| l.record(vec!["delta1".to_string()])));
        hub.enqueue(Arc::new(|l: &Recorder| l.record(vec!["delta2".to_string()])));

        drain().await;

        assert_eq!(
            recorder.batches.lock().as_slice(),
            &[
                vec!["snapshot".to_string()],
                vec!["delta1".to_string()],
                vec!["delta2".to_string()],
            ]
        );
    }

    #[tokio::test]
    async fn test_late_subscriber_misses_earlier_deltas() {
        let mut hub: CallbackHub<Recorder> = CallbackHub::new();
        let early = Recorder::new();
        let _early_handle = hub.add_listener(Arc::clone(&early), None);

        hub.enqueue(Arc::new(|l: &Recorder| l.record(vec!["one".to_string()])));

        let late = Recorder::new();
        let _late_handle = hub.add_listener(Arc::clone(&late), None);
        hub.enqueue(Arc::new(|l: &Recorder| l.record(vec!["two".to_string()])));

        drain().await;

        assert_eq!(early.batches.lock().len(), 2);
        assert_eq!(
            late.batches.lock().as_slice(),
            &[vec!["two".to_string()]]
        );
    }

    #[tokio::test]
    async fn test_removed_listener_receives_nothing_further() {
        let mut hub: CallbackHub<Recorder> = CallbackHub::new();
        let recorder = Recorder::new();
        let handle = hub.add_listener(Arc::clone(&recorder), None);

        hub.enqueue(Arc::new(|l: &Recorder| l.record(vec!["kept".to_string()])));
        drain().await;

        hub.remove_listener(&handle);
        hub.enqueue(Arc::new(|l: &Recorder| l.record(vec!["dropped".to_string()])));
        drain().await;

        assert_eq!(
            recorder.batches.lock().as_slice(),
            &[vec!["kept".to_string()]]
        );
    }
}
