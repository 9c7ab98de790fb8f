use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, PoisonError, Weak,
    },
};

use bytes::Bytes;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, trace};

/// Stable key for one live viewer in the subscriber set.
pub type SubscriberId = u64;

/// One frame in flight per subscriber. A full slot means the viewer is still
/// flushing the previous frame.
const DELIVERY_SLOTS: usize = 1;

/// Outcome of a single publish call.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PublishReport {
    pub delivered: usize,
    pub dropped: usize,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StreamerStats {
    pub subscribers: usize,
    pub frames_published: u64,
    pub frames_delivered: u64,
    pub frames_dropped: u64,
}

/// Fan-out hub for encoded frames.
///
/// Cloning is cheap and every clone shares the same subscriber set. The set
/// lock is held only to mutate or snapshot membership, never while delivering.
#[derive(Clone, Default)]
pub struct BroadcastStreamer {
    inner: Arc<StreamerInner>,
}

#[derive(Default)]
struct StreamerInner {
    set: Mutex<SubscriberSet>,
    next_id: AtomicU64,
    published: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

#[derive(Default)]
struct SubscriberSet {
    senders: HashMap<SubscriberId, mpsc::Sender<Bytes>>,
    closed: bool,
}

impl StreamerInner {
    fn lock(&self) -> MutexGuard<'_, SubscriberSet> {
        // Membership stays consistent even if a holder panicked.
        self.set.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn remove(&self, id: SubscriberId) -> bool {
        let removed = self.lock().senders.remove(&id).is_some();
        if removed {
            debug!(subscriber = id, "Subscriber removed");
        }
        removed
    }
}

impl BroadcastStreamer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new viewer. After [`close`](Self::close) the returned
    /// subscription is already terminated.
    pub fn subscribe(&self) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(DELIVERY_SLOTS);
        let mut set = self.inner.lock();
        if set.closed {
            debug!(subscriber = id, "Subscribe after close");
        } else {
            set.senders.insert(id, tx);
            info!(
                subscriber = id,
                subscribers = set.senders.len(),
                "Subscriber added"
            );
        }
        Subscription {
            id,
            rx,
            streamer: Arc::downgrade(&self.inner),
        }
    }

    /// Remove a viewer. Unknown or already removed ids are ignored.
    pub fn unsubscribe(&self, id: SubscriberId) {
        self.inner.remove(id);
    }

    /// Offer `frame` to every subscriber without waiting on any of them.
    pub fn publish(&self, frame: Bytes) -> PublishReport {
        let targets: Vec<(SubscriberId, mpsc::Sender<Bytes>)> = {
            let set = self.inner.lock();
            set.senders
                .iter()
                .map(|(id, tx)| (*id, tx.clone()))
                .collect()
        };

        let mut report = PublishReport::default();
        let mut gone = Vec::new();
        for (id, tx) in targets {
            match tx.try_send(frame.clone()) {
                Ok(()) => report.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    trace!(subscriber = id, "Delivery slot busy, frame dropped");
                    report.dropped += 1;
                }
                Err(TrySendError::Closed(_)) => gone.push(id),
            }
        }

        if !gone.is_empty() {
            let mut set = self.inner.lock();
            for id in gone {
                set.senders.remove(&id);
            }
        }

        self.inner.published.fetch_add(1, Ordering::Relaxed);
        self.inner
            .delivered
            .fetch_add(report.delivered as u64, Ordering::Relaxed);
        self.inner
            .dropped
            .fetch_add(report.dropped as u64, Ordering::Relaxed);
        report
    }

    /// Close every delivery path; live subscriptions drain and then end.
    pub fn close(&self) {
        let drained = {
            let mut set = self.inner.lock();
            set.closed = true;
            std::mem::take(&mut set.senders)
        };
        info!(subscribers = drained.len(), "Streamer closed");
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().senders.len()
    }

    pub fn stats(&self) -> StreamerStats {
        StreamerStats {
            subscribers: self.subscriber_count(),
            frames_published: self.inner.published.load(Ordering::Relaxed),
            frames_delivered: self.inner.delivered.load(Ordering::Relaxed),
            frames_dropped: self.inner.dropped.load(Ordering::Relaxed),
        }
    }
}

/// Receiving side of one viewer. Dropping it unsubscribes.
pub struct Subscription {
    id: SubscriberId,
    rx: mpsc::Receiver<Bytes>,
    streamer: Weak<StreamerInner>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Next frame, or `None` once the streamer closed this delivery path.
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }

    /// Frame currently waiting in the delivery slot, if any.
    #[cfg(test)]
    fn try_recv(&mut self) -> Option<Bytes> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.streamer.upgrade() {
            inner.remove(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[test]
    fn publish_without_subscribers_is_noop() {
        let streamer = BroadcastStreamer::new();
        let report = streamer.publish(Bytes::from_static(b"frame"));
        assert_eq!(report, PublishReport::default());
        assert_eq!(streamer.stats().frames_published, 1);
    }

    #[tokio::test]
    async fn stalled_subscriber_does_not_block_active_one() {
        let streamer = BroadcastStreamer::new();
        let mut active = streamer.subscribe();
        let mut stalled = streamer.subscribe();
        assert_eq!(streamer.subscriber_count(), 2);

        const FRAMES: u8 = 20;
        for n in 0..FRAMES {
            let report = streamer.publish(Bytes::from(vec![n]));
            assert_eq!(report.delivered + report.dropped, 2);
            let frame = timeout(Duration::from_millis(100), active.recv())
                .await
                .expect("active subscriber starved")
                .expect("stream open");
            assert_eq!(frame.as_ref(), &[n]);
        }

        // The stalled viewer only ever held the first frame.
        assert_eq!(stalled.try_recv().as_deref(), Some(&[0u8][..]));
        assert!(stalled.try_recv().is_none());

        let stats = streamer.stats();
        assert_eq!(stats.frames_delivered, FRAMES as u64 + 1);
        assert_eq!(stats.frames_dropped, FRAMES as u64 - 1);
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let streamer = BroadcastStreamer::new();
        let sub = streamer.subscribe();
        let id = sub.id();
        streamer.unsubscribe(id);
        streamer.unsubscribe(id);
        streamer.unsubscribe(9_999);
        assert_eq!(streamer.subscriber_count(), 0);
        drop(sub);
        assert_eq!(streamer.subscriber_count(), 0);
    }

    #[test]
    fn dropping_subscription_unsubscribes() {
        let streamer = BroadcastStreamer::new();
        let first = streamer.subscribe();
        let second = streamer.subscribe();
        assert_ne!(first.id(), second.id());
        drop(first);
        assert_eq!(streamer.subscriber_count(), 1);
        drop(second);
        assert_eq!(streamer.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn close_terminates_subscribers() {
        let streamer = BroadcastStreamer::new();
        let mut sub = streamer.subscribe();
        streamer.publish(Bytes::from_static(b"last"));
        streamer.close();

        assert_eq!(sub.recv().await.as_deref(), Some(&b"last"[..]));
        assert!(sub.recv().await.is_none());

        let mut late = streamer.subscribe();
        assert!(late.recv().await.is_none());
        assert_eq!(streamer.subscriber_count(), 0);
    }

    #[test]
    fn clones_share_subscriber_set() {
        let streamer = BroadcastStreamer::new();
        let clone = streamer.clone();
        let _sub = clone.subscribe();
        assert_eq!(streamer.subscriber_count(), 1);
        assert_eq!(streamer.publish(Bytes::from_static(b"x")).delivered, 1);
    }

    #[tokio::test]
    async fn concurrent_publish_and_membership_changes() {
        let streamer = BroadcastStreamer::new();
        let publisher = {
            let streamer = streamer.clone();
            tokio::spawn(async move {
                for n in 0..200u32 {
                    streamer.publish(Bytes::from(n.to_le_bytes().to_vec()));
                    tokio::task::yield_now().await;
                }
            })
        };
        for _ in 0..50 {
            let mut sub = streamer.subscribe();
            let _ = sub.try_recv();
            tokio::task::yield_now().await;
        }
        publisher.await.expect("publisher task");
        assert_eq!(streamer.subscriber_count(), 0);
        assert_eq!(streamer.stats().frames_published, 200);
    }
}
