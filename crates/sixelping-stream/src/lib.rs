//! Fan-out of encoded frames to live viewers with drop-on-backpressure delivery.

pub mod multipart;
pub mod streamer;

pub use multipart::{multipart_stream, MultipartFramer};
pub use streamer::{BroadcastStreamer, PublishReport, StreamerStats, SubscriberId, Subscription};
