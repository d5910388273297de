#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::time::Duration;

use telelink_sender::config;

#[test]
fn deny_unknown_fields_nested() {
    let bad = r#"
version: 1
link:
  name: "events"
  send_timeout: 5000 # typo should fail
"#;

    let err = config::load_from_str(bad).expect_err("must fail");
    assert_eq!(err.kind().as_str(), "CONFIG");
}

#[test]
fn ok_minimal_config() {
    let cfg = config::load_from_str("version: 1\n").expect("must parse");
    assert_eq!(cfg.version, 1);
    assert_eq!(cfg.link.name, "events");
    assert_eq!(cfg.link.delivery_tag_len, 16);
    assert_eq!(cfg.link.send_timeout(), Duration::from_secs(60));
}

#[test]
fn overrides_apply() {
    let ok = r#"
version: 1
link:
  name: "twin"
  send_timeout_ms: 2500
  close_timeout_ms: 1000
  delivery_tag_len: 32
"#;
    let cfg = config::load_from_str(ok).expect("must parse");
    assert_eq!(cfg.link.name, "twin");
    assert_eq!(cfg.link.send_timeout(), Duration::from_millis(2500));
    assert_eq!(cfg.link.close_timeout(), Duration::from_secs(1));
    assert_eq!(cfg.link.delivery_tag_len, 32);
}

#[test]
fn rejects_out_of_range_values() {
    for bad in [
        "version: 2\n",
        "version: 1\nlink:\n  delivery_tag_len: 4\n",
        "version: 1\nlink:\n  send_timeout_ms: 10\n",
        "version: 1\nlink:\n  name: \"  \"\n",
    ] {
        let err = config::load_from_str(bad).expect_err("must fail");
        assert_eq!(err.kind().as_str(), "CONFIG", "input={bad}");
    }
}

#[test]
fn missing_file_is_config_error() {
    let err = config::load_from_file("/nonexistent/telelink.yaml").expect_err("must fail");
    assert_eq!(err.kind().as_str(), "CONFIG");
}
