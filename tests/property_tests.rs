//! Property-based tests using proptest over the frame codec, request numbers
//! and InfoType selection.

use proptest::prelude::*;
use rfplayer_rs::rfp::frame::{
    classify_header, command_line, decode, extract_req_num, trim_line, Frame, HeaderInfo,
    Qualifier,
};
use rfplayer_rs::rfp::mock::split_command_line;
use rfplayer_rs::InfoType;
use serde_json::{Map, Value};

const HEADERS: [&str; 8] = [
    "ZIA--", "ZIA22", "ZIA33", "ZIA44", "ZIO--", "ZIO22", "ZIO33", "ZIO44",
];

fn qualifier() -> impl Strategy<Value = Qualifier> {
    prop_oneof![
        Just(Qualifier::Reply),
        Just(Qualifier::Xml),
        Just(Qualifier::Json),
        Just(Qualifier::Text),
    ]
}

/// JSON values the dongle could plausibly report: no floats, and strings
/// free of quotes so they survive single quote rendering.
fn json_value() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        "[a-zA-Z0-9 _.:%+-]{0,12}".prop_map(Value::String),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-zA-Z_]{1,10}", inner, 0..4)
                .prop_map(|m| Value::Object(m.into_iter().collect())),
        ]
    })
}

fn json_event() -> impl Strategy<Value = Value> {
    prop::collection::btree_map("[a-zA-Z_]{1,10}", json_value(), 1..4)
        .prop_map(|m| Value::Object(m.into_iter().collect::<Map<String, Value>>()))
}

proptest! {
    #[test]
    fn prop_header_synced_only_when_known(prefix in "[ZIAO0-9+-]{5}") {
        let synced = classify_header(prefix.as_bytes()) != HeaderInfo::Unsynced;
        prop_assert_eq!(synced, HEADERS.contains(&prefix.as_str()));
    }

    #[test]
    fn prop_frame_keeps_line(line in "\\PC{0,80}") {
        if let Ok(frame) = Frame::from_line(&line) {
            prop_assert_eq!(frame.to_line(), trim_line(&line));
            prop_assert!(HEADERS.contains(&frame.header.prefix().as_str()));
        }
    }

    #[test]
    fn prop_known_header_always_parses(
        index in 0usize..8,
        payload in "[ -~]{1,60}",
    ) {
        let line = format!("{}{payload}", HEADERS[index]);
        prop_assert!(Frame::from_line(&line).is_ok(), "{}", line);
    }

    #[test]
    fn prop_decode_never_panics(payload in "\\PC{0,120}", q in qualifier()) {
        let _ = decode(&payload, q);
    }

    #[test]
    fn prop_req_num_roundtrip(n in any::<u32>(), key in "[a-z]{3,12}Status", quoted in any::<bool>()) {
        let value = if quoted { format!("\"{n}\"") } else { n.to_string() };
        let payload = format!("{{\"{key}\":{{\"reqNum\":{value},\"info\":[]}}}}");
        prop_assert_eq!(extract_req_num(&payload), Some(n));
    }

    #[test]
    fn prop_command_line_roundtrip(n in 1u32..1_000_000, command in "[A-Z][A-Z ]{0,20}[A-Z]") {
        let line = command_line(Some(n), &command);
        prop_assert_eq!(split_command_line(&line), Some((Some(n), command.as_str())));
    }

    #[test]
    fn prop_info_type_selection(discriminator in any::<u8>()) {
        match InfoType::select(discriminator) {
            Some(t) => prop_assert_eq!(t.code(), discriminator),
            None => prop_assert!(discriminator > 11),
        }
    }

    #[test]
    fn prop_json_event_roundtrip(value in json_event(), single_quoted in any::<bool>()) {
        let mut payload = value.to_string();
        if single_quoted {
            payload = payload.replace('"', "'");
        }
        let frame = Frame::from_line(&format!("ZIA33{payload}")).unwrap();
        prop_assert_eq!(frame.header.qualifier, Qualifier::Json);
        prop_assert_eq!(frame.decode().unwrap().into_value(), value);
    }
}
