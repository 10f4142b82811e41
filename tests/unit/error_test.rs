//! Tests for error types

use resume_parse_pool::core::{PoolError, ProcessingError};
use resume_parse_pool::document::{ExtractError, ParseError};

#[test]
fn test_queue_full_error() {
    assert_eq!(format!("{}", PoolError::QueueFull), "task queue is full");
}

#[test]
fn test_shutdown_error() {
    assert_eq!(format!("{}", PoolError::PoolShutdown), "pool has been shut down");
}

#[test]
fn test_invalid_config_error() {
    let err = PoolError::InvalidConfig("pool_size must be greater than 0".to_string());
    assert_eq!(
        format!("{}", err),
        "invalid configuration: pool_size must be greater than 0"
    );
}

#[test]
fn test_processing_error_message() {
    let err = ProcessingError::new("truncated upload");
    assert_eq!(err.message(), "truncated upload");
    assert_eq!(PoolError::from(err), PoolError::Processing("truncated upload".into()));
}

#[test]
fn test_extract_error_flows_into_parse_error() {
    let err: ParseError = ExtractError::Empty.into();
    assert_eq!(format!("{}", err), "document contains no text");

    let err: ParseError = PoolError::Timeout.into();
    assert_eq!(format!("{}", err), "operation timed out");
}
