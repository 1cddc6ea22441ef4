use serde_json::json;
use windrow::{
    canonical_group, encode_salt, CodecError, Measurement, RowKeyCodec, TimeWindow, MAGIC_NUMBER,
    VERSION,
};

const SALT_DIVISOR: u32 = 1000;
const FIFTEEN_MINUTES: u64 = 15 * 60 * 1000;

/// Thu, Aug 25 2016 13:27:10 GMT
const AUG2016: u64 = 1_472_131_630_748;

fn codec() -> RowKeyCodec {
    RowKeyCodec::new(SALT_DIVISOR, FIFTEEN_MINUTES)
}

fn measurement(groups: Vec<String>) -> Measurement {
    let window = TimeWindow::containing(AUG2016, FIFTEEN_MINUTES).expect("valid duration");
    Measurement::new("profile", "entity", window).with_groups(groups)
}

/// Builds the expected key byte-by-byte, independent of the codec's own
/// writer, so layout regressions show up as byte diffs.
fn expected_key(groups: &[&str]) -> Vec<u8> {
    let window = TimeWindow::containing(AUG2016, FIFTEEN_MINUTES).expect("valid duration");
    let salt = encode_salt(window.index(), SALT_DIVISOR);
    let mut key = Vec::new();
    key.extend_from_slice(&MAGIC_NUMBER.to_be_bytes());
    key.push(VERSION);
    key.extend_from_slice(&(salt.len() as i32).to_be_bytes());
    key.extend_from_slice(&salt);
    key.extend_from_slice(&(b"profile".len() as i32).to_be_bytes());
    key.extend_from_slice(b"profile");
    key.extend_from_slice(&(b"entity".len() as i32).to_be_bytes());
    key.extend_from_slice(b"entity");
    key.extend_from_slice(&(groups.len() as i32).to_be_bytes());
    for group in groups {
        key.extend_from_slice(&(group.len() as i32).to_be_bytes());
        key.extend_from_slice(group.as_bytes());
    }
    key.extend_from_slice(&window.index().to_be_bytes());
    key.extend_from_slice(&FIFTEEN_MINUTES.to_be_bytes());
    key
}

#[test]
fn encode_without_groups_matches_expected_layout() {
    let measurement = measurement(Vec::new());
    let key = codec().encode(&measurement).expect("encodable identity");
    assert_eq!(key, expected_key(&[]));

    let decoded = codec().decode(&key).expect("decodable key");
    assert_eq!(decoded, measurement.identity());
}

#[test]
fn encode_with_one_group_round_trips() {
    let measurement = measurement(vec!["group1".to_string()]);
    let key = codec().encode(&measurement).expect("encodable identity");
    assert_eq!(key, expected_key(&["group1"]));

    let decoded = codec().decode(&key).expect("decodable key");
    assert_eq!(decoded, measurement.identity());
}

#[test]
fn encode_with_two_groups_round_trips() {
    let measurement = measurement(vec!["group1".to_string(), "group2".to_string()]);
    let key = codec().encode(&measurement).expect("encodable identity");
    assert_eq!(key, expected_key(&["group1", "group2"]));

    let decoded = codec().decode(&key).expect("decodable key");
    assert_eq!(decoded.groups, vec!["group1", "group2"]);
}

#[test]
fn integer_group_decodes_as_its_decimal_string() {
    // Groups are canonicalized to strings before they reach the key, so
    // an integer 200 round-trips as "200".
    let groups = vec![canonical_group(&json!(200))];
    let measurement = measurement(groups);
    let key = codec().encode(&measurement).expect("encodable identity");
    assert_eq!(key, expected_key(&["200"]));

    let decoded = codec().decode(&key).expect("decodable key");
    assert_eq!(decoded.groups, vec!["200"]);
}

#[test]
fn mixed_groups_keep_their_order() {
    let groups = vec![canonical_group(&json!(200)), canonical_group(&json!("group1"))];
    let measurement = measurement(groups);
    let key = codec().encode(&measurement).expect("encodable identity");
    assert_eq!(key, expected_key(&["200", "group1"]));

    let decoded = codec().decode(&key).expect("decodable key");
    assert_eq!(decoded.groups, vec!["200", "group1"]);
}

#[test]
fn salt_is_deterministic_per_window_index() {
    let measurement = measurement(Vec::new());
    let first = codec().encode(&measurement).expect("encodable identity");
    let second = codec().encode(&measurement).expect("encodable identity");
    assert_eq!(first, second);

    let index = measurement.window().index();
    assert_eq!(
        encode_salt(index, SALT_DIVISOR),
        encode_salt(index, SALT_DIVISOR)
    );
    // Salt is rendered as decimal digits, never a fixed-width integer.
    let salt = encode_salt(index, SALT_DIVISOR);
    assert!(salt.iter().all(u8::is_ascii_digit));
}

#[test]
fn empty_profile_name_is_rejected_at_encode() {
    let window = TimeWindow::containing(AUG2016, FIFTEEN_MINUTES).expect("valid duration");
    let measurement = Measurement::new("", "entity", window);
    assert_eq!(
        codec().encode(&measurement),
        Err(CodecError::InvalidIdentity)
    );
}

#[test]
fn empty_entity_is_rejected_at_encode() {
    let window = TimeWindow::containing(AUG2016, FIFTEEN_MINUTES).expect("valid duration");
    let measurement = Measurement::new("profile", "", window);
    assert_eq!(
        codec().encode(&measurement),
        Err(CodecError::InvalidIdentity)
    );
}

#[test]
fn altered_magic_number_is_rejected() {
    let mut key = codec()
        .encode(&measurement(Vec::new()))
        .expect("encodable identity");
    key[0] = 0x00;
    key[1] = 0x0b;
    match codec().decode(&key) {
        Err(CodecError::MalformedKey(reason)) => assert!(reason.contains("magic")),
        other => panic!("expected malformed key, got {other:?}"),
    }
}

#[test]
fn altered_version_is_rejected() {
    let mut key = codec()
        .encode(&measurement(Vec::new()))
        .expect("encodable identity");
    key[2] = 9;
    match codec().decode(&key) {
        Err(CodecError::MalformedKey(reason)) => assert!(reason.contains("version")),
        other => panic!("expected malformed key, got {other:?}"),
    }
}

#[test]
fn truncated_key_is_rejected_at_every_boundary() {
    let key = codec()
        .encode(&measurement(vec!["group1".to_string()]))
        .expect("encodable identity");
    // Only magic + version present.
    assert!(matches!(
        codec().decode(&key[..3]),
        Err(CodecError::MalformedKey(_))
    ));
    // Every shorter prefix must fail too, never panic.
    for len in 0..key.len() {
        assert!(
            matches!(codec().decode(&key[..len]), Err(CodecError::MalformedKey(_))),
            "prefix of {len} bytes decoded unexpectedly"
        );
    }
}

#[test]
fn negative_length_prefix_is_rejected() {
    let mut key = codec()
        .encode(&measurement(Vec::new()))
        .expect("encodable identity");
    // Corrupt the salt length field (first i32 after magic + version).
    key[3] = 0xff;
    assert!(matches!(
        codec().decode(&key),
        Err(CodecError::MalformedKey(_))
    ));
}

#[test]
fn encode_range_covers_one_hour_with_five_keys() {
    let start = AUG2016;
    let end = AUG2016 + 60 * 60 * 1000;
    let keys = codec()
        .encode_range("profile", "entity", &[], start, end)
        .expect("valid range");
    assert_eq!(keys.len(), 5);

    let mut previous_index = None;
    for key in &keys {
        let decoded = codec().decode(key).expect("decodable key");
        assert_eq!(decoded.profile_name, "profile");
        assert_eq!(decoded.entity, "entity");
        if let Some(previous) = previous_index {
            assert_eq!(decoded.window.index(), previous + 1);
        }
        previous_index = Some(decoded.window.index());
    }
}

#[test]
fn encode_range_matches_per_window_encode() {
    let start = AUG2016;
    let end = AUG2016 + 30 * 60 * 1000;
    let keys = codec()
        .encode_range("profile", "entity", &[], start, end)
        .expect("valid range");

    let mut window = TimeWindow::containing(start, FIFTEEN_MINUTES).expect("valid duration");
    for key in &keys {
        let expected = codec()
            .encode(&Measurement::new("profile", "entity", window))
            .expect("encodable identity");
        assert_eq!(key, &expected);
        window = window.next();
    }
}

#[test]
fn encode_range_rejects_empty_identity() {
    assert_eq!(
        codec().encode_range("", "entity", &[], AUG2016, AUG2016 + 1),
        Err(CodecError::InvalidIdentity)
    );
}
