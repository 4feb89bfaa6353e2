//! Shared building blocks for the `fetcher` and `gateway` binaries: geo
//! math, gzip helpers, GTFS-RT protobuf decoding, CSV column lookup, and
//! the push-frame wire contract between the two services.

pub mod csv_util;
pub mod error;
pub mod geo;
pub mod gtfs_rt;
pub mod gzip;
pub mod wire;

pub use error::CoreError;
