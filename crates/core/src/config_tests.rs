use super::*;

#[test]
fn empty_document_yields_defaults() {
    let cfg = TownConfig::from_toml_str("").unwrap();
    assert_eq!(cfg, TownConfig::default());
}

#[test]
fn partial_document_merges_with_defaults() {
    let cfg = TownConfig::from_toml_str(
        r#"
        [heartbeat]
        interval_secs = 60
        "#,
    )
    .unwrap();
    assert_eq!(cfg.heartbeat.interval_secs, 60);
    assert_eq!(cfg.heartbeat.nudge_after_secs, HeartbeatConfig::default().nudge_after_secs);
}

#[test]
fn stranded_scan_interval_falls_back_on_zero() {
    let mut cfg = ConvoyConfig::default();
    cfg.stranded_scan_interval_secs = 0;
    assert_eq!(cfg.stranded_scan_interval(), Duration::from_secs(30));
}

#[test]
fn malformed_document_is_an_error() {
    assert!(TownConfig::from_toml_str("not = [valid").is_err());
}
