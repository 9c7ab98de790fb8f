use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::watch;

/// Latest polled frame, shared between the poller and HTTP handlers.
#[derive(Clone)]
pub struct FrameView {
    tx: Arc<watch::Sender<Option<Bytes>>>,
}

impl FrameView {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    pub fn update(&self, frame: Bytes) {
        self.tx.send_replace(Some(frame));
    }

    pub fn latest(&self) -> Option<Bytes> {
        self.tx.borrow().clone()
    }
}

impl Default for FrameView {
    fn default() -> Self {
        Self::new()
    }
}
