use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("ZIP error: {0}")]
    ZipError(#[from] zip::result::ZipError),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("protobuf decode error: {0}")]
    ProtobufError(#[from] prost::DecodeError),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("hex decode error: {0}")]
    HexError(#[from] hex::FromHexError),
    #[error("GTFS parse error: {0}")]
    ParseError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_parse_error() {
        let err = CoreError::ParseError("missing column".into());
        assert_eq!(err.to_string(), "GTFS parse error: missing column");
    }

    #[test]
    fn error_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: CoreError = io_err.into();
        assert!(matches!(err, CoreError::IoError(_)));
    }

    #[test]
    fn error_from_prost_decode_error() {
        let bad_bytes: &[u8] = &[0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x7F];
        let result = <gtfs_realtime::FeedMessage as prost::Message>::decode(bad_bytes);
        let err: CoreError = result.unwrap_err().into();
        assert!(matches!(err, CoreError::ProtobufError(_)));
    }
}
