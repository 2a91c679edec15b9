#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use wsline_session::config;

#[test]
fn deny_unknown_fields_nested() {
    let bad = r#"
version: 1
session:
  max_message_bytes: 65536
  close_timeout_ms: 5000
  max_mesage_bytes: 123 # typo should fail
"#;

    let err = config::load_from_str(bad).expect_err("must fail");
    assert_eq!(err.kind().as_str(), "CONFIG");
}

#[test]
fn ok_minimal_config() {
    let ok = r#"
version: 1
session:
  max_message_bytes: 65536
  close_timeout_ms: 5000
"#;
    let cfg = config::load_from_str(ok).expect("must parse");
    assert_eq!(cfg.version, 1);
    assert_eq!(cfg.session.max_frame_bytes(), 65536);
    assert_eq!(cfg.session.outbound_queue, 1024);
    assert_eq!(cfg.session.close_timeout().as_millis(), 5000);
}

#[test]
fn limits_have_no_defaults() {
    let missing = r#"
version: 1
session:
  close_timeout_ms: 5000
"#;
    let err = config::load_from_str(missing).expect_err("must fail");
    assert_eq!(err.kind().as_str(), "CONFIG");
}

#[test]
fn out_of_range_values_rejected() {
    let frame_over_message = r#"
version: 1
session:
  max_message_bytes: 1024
  max_frame_bytes: 4096
  close_timeout_ms: 5000
"#;
    assert!(config::load_from_str(frame_over_message).is_err());

    let bad_version = r#"
version: 2
session:
  max_message_bytes: 1024
  close_timeout_ms: 5000
"#;
    assert!(config::load_from_str(bad_version).is_err());

    let tiny_timeout = r#"
version: 1
session:
  max_message_bytes: 1024
  close_timeout_ms: 1
"#;
    assert!(config::load_from_str(tiny_timeout).is_err());
}
