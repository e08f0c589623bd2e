//! Integration tests for the frame codec: header classification, payload
//! decoding, request numbers and outbound command lines.

use rfplayer_rs::rfp::frame::{
    bare_command_line, classify_header, command_line, decode, extract_req_num, trim_line,
    DecodeFailure, DecodedMessage, Frame, HeaderInfo, Qualifier, SourceFormat,
};
use rfplayer_rs::{decode_line, parse_line, RfpError};
use serde_json::json;

/// Tests that the 8 known headers are synced with the right source and qualifier.
#[test]
fn test_known_headers_are_synced() {
    let cases = [
        ("ZIA--", SourceFormat::Ascii, Qualifier::Reply),
        ("ZIA22", SourceFormat::Ascii, Qualifier::Xml),
        ("ZIA33", SourceFormat::Ascii, Qualifier::Json),
        ("ZIA44", SourceFormat::Ascii, Qualifier::Text),
        ("ZIO--", SourceFormat::Binary, Qualifier::Reply),
        ("ZIO22", SourceFormat::Binary, Qualifier::Xml),
        ("ZIO33", SourceFormat::Binary, Qualifier::Json),
        ("ZIO44", SourceFormat::Binary, Qualifier::Text),
    ];
    for (prefix, source, qualifier) in cases {
        match classify_header(prefix.as_bytes()) {
            HeaderInfo::Synced(header) => {
                assert_eq!(header.source, source, "{prefix}");
                assert_eq!(header.qualifier, qualifier, "{prefix}");
                assert_eq!(header.prefix(), prefix);
            }
            HeaderInfo::Unsynced => panic!("{prefix} should be synced"),
        }
    }
}

/// Tests that lookalike prefixes are unsynced.
#[test]
fn test_unknown_headers_are_unsynced() {
    for prefix in ["ZIA++", "ZIA11", "ZIB33", "zia33", "ZXA33", "IZA33", "ZIA3"] {
        assert_eq!(classify_header(prefix.as_bytes()), HeaderInfo::Unsynced, "{prefix}");
    }
}

/// Tests that a frame keeps its payload and timestamp, and rejects short lines.
#[test]
fn test_frame_from_line() {
    let frame = parse_line("ZIA33{\"frame\":{}}\r").unwrap();
    assert_eq!(frame.header.qualifier, Qualifier::Json);
    assert_eq!(frame.payload, "{\"frame\":{}}");
    assert_eq!(frame.to_line(), "ZIA33{\"frame\":{}}");

    assert!(matches!(parse_line("ZIA33"), Err(RfpError::Unsynced(_))));
    assert!(matches!(parse_line("garbage line"), Err(RfpError::Unsynced(_))));
}

/// Tests that a leading line break from the previous terminator is stripped.
#[test]
fn test_trim_line() {
    assert_eq!(trim_line("\nZIA--PONG\r"), "ZIA--PONG");
    assert_eq!(trim_line("ZIA--PONG"), "ZIA--PONG");
}

/// Tests that JSON events decode, including the single-quote dialect.
#[test]
fn test_json_events_decode() {
    let value = json!({"frame": {"header": {"infoType": "4"}}});
    let message = decode(&value.to_string(), Qualifier::Json).unwrap();
    assert_eq!(message, DecodedMessage::Json(value));

    let message = decode("{'frame': {'header': {'protocol': '5'}}}", Qualifier::Json).unwrap();
    assert_eq!(message.as_value().unwrap()["frame"]["header"]["protocol"], "5");
}

/// Tests that broken or empty JSON events are rejected.
#[test]
fn test_bad_json_events() {
    assert!(matches!(
        decode("{not json", Qualifier::Json),
        Err(DecodeFailure::NotJson(_))
    ));
    assert_eq!(decode("{}", Qualifier::Json), Err(DecodeFailure::Empty));
}

/// Tests that replies fall back to text and only fail when empty.
#[test]
fn test_reply_fallbacks() {
    assert_eq!(
        decode("PONG", Qualifier::Reply).unwrap(),
        DecodedMessage::Text("PONG".into())
    );
    assert!(decode("{\"a\":1}", Qualifier::Reply).unwrap().has_key("a"));
    assert_eq!(decode("ok", Qualifier::Reply), Err(DecodeFailure::Empty));
}

/// Tests that text events are kept verbatim.
#[test]
fn test_text_events() {
    let message = decode_line("ZIA44RECEIVED PROTOCOLS: X10 RTS").unwrap();
    assert_eq!(message.as_text(), Some("RECEIVED PROTOCOLS: X10 RTS"));
}

/// Tests that the request number is read one level below the root.
#[test]
fn test_req_num_extraction() {
    assert_eq!(
        extract_req_num(r#"{"systemStatus":{"reqNum":"12","info":[]}}"#),
        Some(12)
    );
    assert_eq!(extract_req_num(r#"{"transcoderStatus":{"reqNum":7}}"#), Some(7));
    assert_eq!(extract_req_num(r#"{"reqNum":"3"}"#), None);
    assert_eq!(extract_req_num("File Download is done!"), None);

    let frame = Frame::from_line(r#"ZIA--{"radioStatus":{"band":[]}}"#).unwrap();
    assert_eq!(frame.req_num(), None);
}

/// Tests the outbound command line forms.
#[test]
fn test_command_lines() {
    assert_eq!(command_line(Some(4), "STATUS JSON"), "ZIA++4 STATUS JSON");
    assert_eq!(command_line(None, "FORMAT JSON"), "ZIA++ FORMAT JSON");
    assert_eq!(bare_command_line("HELLO"), "ZIA++HELLO");
}
