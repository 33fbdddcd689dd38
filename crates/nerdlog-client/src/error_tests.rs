use super::*;

#[test]
fn as_str_is_stable_per_variant() {
    assert_eq!(ClientError::connect("refused", 1).as_str(), "connect");
    assert_eq!(ClientError::bootstrap("no agent").as_str(), "bootstrap");
    assert_eq!(ClientError::protocol("bad s: line").as_str(), "protocol");
    assert_eq!(ClientError::command("boom").as_str(), "command");
    assert_eq!(ClientError::NotConnected.as_str(), "not_connected");
}

#[test]
fn display_includes_attempt_number() {
    let err = ClientError::connect("timed out", 3);
    assert_eq!(err.to_string(), "connect failed (attempt 3): timed out");
}

#[test]
fn not_connected_has_fixed_message() {
    assert_eq!(ClientError::NotConnected.to_string(), "not connected");
}
