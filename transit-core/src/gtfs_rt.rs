//! GTFS-RT protobuf decoding shared by the fetcher (header timestamp only)
//! and the gateway (full vehicle-position extraction).

use prost::Message;

use crate::error::CoreError;

pub use gtfs_realtime::FeedMessage;

pub fn decode_feed(bytes: &[u8]) -> Result<FeedMessage, CoreError> {
    FeedMessage::decode(bytes).map_err(CoreError::from)
}

/// The feed-level header timestamp, as epoch seconds. `0` if absent, which
/// callers use as the "parse failed / invalid" sentinel.
pub fn header_timestamp(feed: &FeedMessage) -> i64 {
    feed.header.timestamp.map(|t| t as i64).unwrap_or(0)
}
