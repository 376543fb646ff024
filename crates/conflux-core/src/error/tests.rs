use super::*;

#[test]
fn test_capacity_message() {
    let error = Error::Capacity { max: 1 };

    let msg = error.user_message();
    assert!(msg.contains("full"));
    assert!(msg.contains('1'));

    let suggestion = error.suggestion().unwrap();
    assert!(suggestion.contains("max_agents"));
}

#[test]
fn test_display_messages() {
    assert_eq!(
        Error::NotFound("worker w1".to_string()).to_string(),
        "not found: worker w1"
    );
    assert_eq!(
        Error::Unavailable("no agents available".to_string()).to_string(),
        "unavailable: no agents available"
    );
    assert_eq!(Error::Cancelled.to_string(), "cancelled");
}

#[test]
fn test_invalid_config_message() {
    let error = Error::InvalidConfig {
        field: "router.confidence_threshold".to_string(),
        message: "must be within 0..=1".to_string(),
    };

    let msg = error.user_message();
    assert!(msg.contains("router.confidence_threshold"));
    assert!(msg.contains("0..=1"));

    let suggestion = error.suggestion().unwrap();
    assert!(suggestion.contains("router.confidence_threshold"));
}

#[test]
fn test_format_error_for_cli() {
    let error = Error::Degenerate("cycle between steps [1, 2]".to_string());

    let output = format_error_for_cli(&error);
    assert!(output.contains("cycle between steps"));
    assert!(output.contains("circular"));
}

#[test]
fn test_no_suggestion_for_routing() {
    let error = Error::Routing("model offline".to_string());
    assert!(error.suggestion().is_none());
    assert!(format_error_for_cli(&error).contains("model offline"));
}
