use super::*;

#[test]
fn no_delimiter_returns_none() {
    assert!(SchedulerMetadata::parse("just a plain description").is_none());
}

#[test]
fn parses_known_and_preserves_unknown_keys() {
    let desc = format!(
        "fix the thing\n{DELIMITER}\ntarget_rig: gt-\nformula: sling\nvar: FOO=bar\nvar: BAZ=qux\nfuture_key: surprise\n"
    );
    let meta = SchedulerMetadata::parse(&desc).unwrap();
    assert_eq!(meta.preamble, "fix the thing");
    assert_eq!(meta.target_rig.as_deref(), Some("gt-"));
    assert_eq!(meta.formula.as_deref(), Some("sling"));
    assert_eq!(meta.vars, vec![("FOO".to_string(), "bar".to_string()), ("BAZ".to_string(), "qux".to_string())]);
    assert_eq!(meta.unknown, vec![("future_key".to_string(), "surprise".to_string())]);
    assert!(!meta.was_legacy);
}

#[test]
fn legacy_delimiter_is_read_accepted() {
    let desc = format!("{LEGACY_DELIMITER}\nformula: sling\n");
    let meta = SchedulerMetadata::parse(&desc).unwrap();
    assert!(meta.was_legacy);
    assert_eq!(meta.formula.as_deref(), Some("sling"));
}

#[test]
fn format_never_writes_legacy_delimiter() {
    let desc = format!("{LEGACY_DELIMITER}\nformula: sling\n");
    let meta = SchedulerMetadata::parse(&desc).unwrap();
    let out = meta.format();
    assert!(out.contains(DELIMITER));
    assert!(!out.contains(LEGACY_DELIMITER));
}

#[test]
fn round_trips_through_format_and_parse() {
    let mut meta = SchedulerMetadata { preamble: "hello".into(), ..Default::default() };
    meta.target_rig = Some("gt-".into());
    meta.formula = Some("sling".into());
    meta.args = Some("--flag value".into());
    meta.vars.push(("KEY".into(), "val".into()));
    meta.no_merge = Some(true);
    meta.dispatch_failures = Some(3);

    let formatted = meta.format();
    let parsed = SchedulerMetadata::parse(&formatted).unwrap();
    assert_eq!(parsed, meta);
}

#[test]
fn second_delimiter_terminates_parsing() {
    let desc = format!("{DELIMITER}\ntarget_rig: gt-\n{DELIMITER}\ntarget_rig: evil\n");
    let meta = SchedulerMetadata::parse(&desc).unwrap();
    assert_eq!(meta.target_rig.as_deref(), Some("gt-"));
}

/// S6 — metadata injection attempt: an attacker-controlled `args` value
/// contains a literal delimiter + `target_rig:` line. Escaping on write
/// keeps it on one line, so round-tripping never resurrects a second block
/// and `target_rig` stays what the legitimate writer set.
#[test]
fn injection_via_args_field_is_neutralized() {
    let mut meta = SchedulerMetadata::default();
    meta.target_rig = Some("gt-".into());
    meta.args = Some(format!("{DELIMITER}\ntarget_rig: evil"));

    let formatted = meta.format();
    // The injected text must not appear as a bare second delimiter line.
    let delimiter_lines = formatted.lines().filter(|l| *l == DELIMITER).count();
    assert_eq!(delimiter_lines, 1);

    let parsed = SchedulerMetadata::parse(&formatted).unwrap();
    assert_eq!(parsed.target_rig.as_deref(), Some("gt-"));
    assert_eq!(parsed.args.as_deref(), Some(format!("{DELIMITER}\ntarget_rig: evil").as_str()));
}

#[test]
fn escape_unescape_roundtrip_on_backslashes_and_newlines() {
    let s = "line one\\nwith backslash and\nreal newline";
    assert_eq!(unescape(&escape(s)), s);
}

#[cfg(any(test, feature = "test-support"))]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn arb_value() -> impl Strategy<Value = String> {
        "[a-zA-Z0-9 _/:=.\\\\\n-]{0,40}"
    }

    proptest! {
        #[test]
        fn prop_round_trip(
            target_rig in proptest::option::of(arb_value()),
            formula in proptest::option::of(arb_value()),
            args in proptest::option::of(arb_value()),
            last_failure in proptest::option::of(arb_value()),
        ) {
            let meta = SchedulerMetadata {
                target_rig,
                formula,
                args,
                last_failure,
                ..Default::default()
            };
            let formatted = meta.format();
            let parsed = SchedulerMetadata::parse(&formatted).unwrap();
            prop_assert_eq!(parsed, meta);
        }
    }
}
