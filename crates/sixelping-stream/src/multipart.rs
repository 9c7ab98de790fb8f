use std::convert::Infallible;

use async_stream::stream;
use bytes::{BufMut, Bytes, BytesMut};
use futures::Stream;
use sixelping_types::clock::unix_secs;
use tracing::debug;
use uuid::Uuid;

use crate::streamer::Subscription;

pub const PART_CONTENT_TYPE: &str = "image/jpeg";

/// Frames each JPEG as one part of a `multipart/x-mixed-replace` response.
#[derive(Debug, Clone)]
pub struct MultipartFramer {
    boundary: String,
    start_time: i64,
}

impl MultipartFramer {
    /// Random boundary, start time taken now.
    pub fn new() -> Self {
        Self::with_boundary(Uuid::new_v4().simple().to_string(), unix_secs())
    }

    pub fn with_boundary(boundary: impl Into<String>, start_time: i64) -> Self {
        Self {
            boundary: boundary.into(),
            start_time,
        }
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    pub fn content_type(&self) -> String {
        format!("multipart/x-mixed-replace; boundary={}", self.boundary)
    }

    pub fn part(&self, frame: &[u8], timestamp: i64) -> Bytes {
        let header = format!(
            "--{}\r\nContent-Type: {}\r\nContent-Length: {}\r\nX-StartTime: {}\r\nX-TimeStamp: {}\r\n\r\n",
            self.boundary,
            PART_CONTENT_TYPE,
            frame.len(),
            self.start_time,
            timestamp
        );
        let mut out = BytesMut::with_capacity(header.len() + frame.len() + 2);
        out.put_slice(header.as_bytes());
        out.put_slice(frame);
        out.put_slice(b"\r\n");
        out.freeze()
    }

    pub fn closing(&self) -> Bytes {
        Bytes::from(format!("--{}--\r\n", self.boundary))
    }
}

impl Default for MultipartFramer {
    fn default() -> Self {
        Self::new()
    }
}

/// Turn a subscription into the body of a live multipart response.
///
/// The stream ends with the closing delimiter once the streamer closes the
/// subscription. Dropping the stream (client went away) drops the
/// subscription, which unsubscribes it.
pub fn multipart_stream(
    mut subscription: Subscription,
    framer: MultipartFramer,
) -> impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static {
    stream! {
        while let Some(frame) = subscription.recv().await {
            yield Ok(framer.part(&frame, unix_secs()));
        }
        debug!(subscriber = subscription.id(), "Live stream delivery path closed");
        yield Ok(framer.closing());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streamer::BroadcastStreamer;
    use futures::StreamExt;

    #[test]
    fn part_layout() {
        let framer = MultipartFramer::with_boundary("frame", 1_700_000_000);
        let part = framer.part(b"JPEG", 1_700_000_005);
        assert_eq!(
            part.as_ref(),
            b"--frame\r\nContent-Type: image/jpeg\r\nContent-Length: 4\r\nX-StartTime: 1700000000\r\nX-TimeStamp: 1700000005\r\n\r\nJPEG\r\n"
        );
        assert_eq!(framer.closing().as_ref(), b"--frame--\r\n");
        assert_eq!(
            framer.content_type(),
            "multipart/x-mixed-replace; boundary=frame"
        );
    }

    #[test]
    fn random_boundaries_differ() {
        let a = MultipartFramer::new();
        let b = MultipartFramer::new();
        assert_ne!(a.boundary(), b.boundary());
        assert_eq!(a.boundary().len(), 32);
    }

    #[tokio::test]
    async fn stream_yields_parts_then_closing() {
        let streamer = BroadcastStreamer::new();
        let framer = MultipartFramer::with_boundary("b", 0);
        let body = multipart_stream(streamer.subscribe(), framer);
        let mut body = Box::pin(body);

        streamer.publish(Bytes::from_static(b"one"));
        let first = body.next().await.expect("first part").unwrap();
        assert!(first.starts_with(b"--b\r\nContent-Type: image/jpeg\r\nContent-Length: 3\r\n"));
        assert!(first.ends_with(b"\r\n\r\none\r\n"));

        streamer.publish(Bytes::from_static(b"two"));
        let second = body.next().await.expect("second part").unwrap();
        assert!(second.ends_with(b"two\r\n"));

        streamer.close();
        let closing = body.next().await.expect("closing").unwrap();
        assert_eq!(closing.as_ref(), b"--b--\r\n");
        assert!(body.next().await.is_none());
    }

    #[tokio::test]
    async fn dropping_body_unsubscribes() {
        let streamer = BroadcastStreamer::new();
        let body = multipart_stream(streamer.subscribe(), MultipartFramer::new());
        assert_eq!(streamer.subscriber_count(), 1);
        drop(body);
        assert_eq!(streamer.subscriber_count(), 0);
    }
}
