//! Error handling tests

use armory_sheets::error::{ArmoryError, ArmoryResult};

// ═══════════════════════════════════════════════════════════════════════════
// CLASSIFICATION TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_auth_expired_is_detected() {
    assert!(ArmoryError::AuthExpired.is_auth_expired());
    assert!(!ArmoryError::Fetch("401".to_string()).is_auth_expired());
}

#[test]
fn test_inline_errors_are_not_fatal() {
    assert!(!ArmoryError::Validation("qty".to_string()).is_fatal());
    assert!(!ArmoryError::EmptyResult("nothing".to_string()).is_fatal());
}

#[test]
fn test_io_level_errors_are_fatal() {
    for err in [
        ArmoryError::AuthExpired,
        ArmoryError::WriteFailed("500".to_string()),
        ArmoryError::Fetch("400".to_string()),
        ArmoryError::Conflict("row 3".to_string()),
        ArmoryError::AccessDenied("x".to_string()),
    ] {
        assert!(err.is_fatal(), "{} should be fatal", err);
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// DISPLAY TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_display_messages() {
    assert_eq!(
        ArmoryError::AuthExpired.to_string(),
        "Authentication expired, please sign in again"
    );
    assert_eq!(
        ArmoryError::Validation("quantity must be positive".to_string()).to_string(),
        "Validation error: quantity must be positive"
    );
    assert_eq!(
        ArmoryError::Conflict("row 4".to_string()).to_string(),
        "Row changed since it was fetched: row 4"
    );
}

// ═══════════════════════════════════════════════════════════════════════════
// CONVERSION TESTS
// ═══════════════════════════════════════════════════════════════════════════

fn read_missing() -> ArmoryResult<String> {
    Ok(std::fs::read_to_string("/definitely/not/here.yaml")?)
}

#[test]
fn test_io_error_converts() {
    let err = read_missing().unwrap_err();
    assert!(matches!(err, ArmoryError::Io(_)));
    assert!(err.to_string().starts_with("IO error"));
}

#[test]
fn test_yaml_error_converts() {
    fn parse() -> ArmoryResult<Vec<String>> {
        Ok(serde_yaml::from_str("{ not: [a list")?)
    }
    assert!(matches!(parse(), Err(ArmoryError::Yaml(_))));
}

#[test]
fn test_json_error_converts() {
    fn parse() -> ArmoryResult<serde_json::Value> {
        Ok(serde_json::from_str("{")?)
    }
    assert!(matches!(parse(), Err(ArmoryError::Json(_))));
}

#[test]
fn test_anyhow_wraps_armory_error() {
    let err: anyhow::Error = ArmoryError::NotFound("sheet 'x'".to_string()).into();
    assert_eq!(err.to_string(), "Not found: sheet 'x'");
    assert!(err.downcast_ref::<ArmoryError>().is_some());
}
