//! Tests for utility functions

use resume_parse_pool::core::UnitId;
use resume_parse_pool::util::{init_tracing, now_ms};

#[test]
fn test_now_ms_advances() {
    let before = now_ms();
    std::thread::sleep(std::time::Duration::from_millis(2));
    assert!(now_ms() > before);
}

#[test]
fn test_init_tracing_is_idempotent() {
    init_tracing();
    init_tracing();
}

#[test]
fn test_unit_id_display() {
    assert_eq!(UnitId(7).to_string(), "unit-7");
    assert!(UnitId(1) < UnitId(2));
}
