//! Integration tests for the dongle configuration vocabulary and the actions
//! sent through an open client.

use rfplayer_rs::rfp::commands::{
    band_command_line, parse_mac, parse_protocols_reply, protocol_command_line,
    system_catalogue, system_command_line, ActionCommand, MacAddress, ProtocolMode,
    TranscoderEntry,
};
use rfplayer_rs::rfp::mock::{MockConnector, MockTransport};
use rfplayer_rs::{DongleClient, EngineConfig, RfpError, SerialConfig};
use std::sync::Arc;
use std::time::Duration;

/// Tests band parameters against the per band value sets.
#[test]
fn test_band_parameters() {
    assert_eq!(
        band_command_line("433Mhz", "Frequency", "433420").unwrap(),
        "FREQ L 433420"
    );
    assert_eq!(
        band_command_line("H", "DSPTRIGGER", "6").unwrap(),
        "DSPTRIGGER H 6"
    );

    let err = band_command_line("868Mhz", "Frequency", "433420").unwrap_err();
    assert!(err.to_string().contains("H band parameter Frequency bad value"));
    let err = band_command_line("L", "Gain", "1").unwrap_err();
    assert!(err.to_string().contains("read only"));
    assert!(matches!(
        band_command_line("915Mhz", "FREQ", "0"),
        Err(RfpError::Configuration(_))
    ));
}

/// Tests the system commands and their value checks.
#[test]
fn test_system_commands() {
    assert_eq!(system_command_line("LEDACTIVITY", "1").unwrap(), "LEDACTIVITY 1");
    assert_eq!(system_command_line("FACTORYRESET", "").unwrap(), "FACTORYRESET");
    assert_eq!(system_command_line("INITLB", "ignored").unwrap(), "INITLB");
    assert_eq!(
        system_command_line("SETMAC", "0x2AB265C3").unwrap(),
        "SETMAC 0x2AB265C3"
    );
    assert!(system_command_line("LBT", "5").is_err());
    assert!(system_command_line("REBOOT", "").is_err());
    assert!(system_command_line("SETMAC", "0x2ab265c3")
        .unwrap_err()
        .to_string()
        .contains("doesn't match regular expression"));

    let catalogue = system_catalogue();
    assert_eq!(catalogue["Set MAC"]["cmd"]["name"], "SETMAC");
    assert_eq!(catalogue["Set MAC"]["cmd"]["type"], "string");
    assert_eq!(catalogue["Init Leaky Buckets"]["cmd"]["type"], "empty");
}

/// Tests the accepted MAC forms.
#[test]
fn test_mac_forms() {
    assert_eq!(parse_mac("0x2AB265C3").unwrap(), MacAddress(0x2AB2_65C3));
    assert_eq!(parse_mac("7").unwrap(), MacAddress(7));
    assert_eq!(parse_mac("123456765").unwrap(), MacAddress(123_456_765));
    for bad in ["0", "0x2AB265", "1234567890", "12a", ""] {
        assert!(parse_mac(bad).is_err(), "{bad}");
    }
}

/// Tests protocol activation lines and the dongle's answer.
#[test]
fn test_protocol_activation() {
    assert_eq!(
        protocol_command_line(ProtocolMode::Repeater, "OREGON", false),
        "REPEATER - OREGON"
    );
    assert_eq!(
        parse_protocols_reply("TRANSMITTED PROTOCOLS: X10 RTS"),
        Some((ProtocolMode::Transmitter, vec!["X10".into(), "RTS".into()]))
    );
    assert_eq!(
        parse_protocols_reply("RECEIVED PROTOCOLS:"),
        Some((ProtocolMode::Receiver, Vec::new()))
    );
    assert_eq!(parse_protocols_reply("JAMMING OFF"), None);
}

/// Tests transcoder entries in their three modes.
#[test]
fn test_transcoder_entries() {
    let keep = TranscoderEntry {
        entry: "1".into(),
        mode: "KEEP".into(),
        out_cmd: "ON".into(),
        out_protocols: "X10".into(),
        out_addr: "B2".into(),
        ..TranscoderEntry::default()
    };
    assert_eq!(keep.to_command().unwrap(), "TRANSCODER ENTRY 1 KEEP TO ON X10 B2");

    let capture: TranscoderEntry = serde_json::from_value(serde_json::json!({
        "entry": "3", "mode": "CAPTURE", "srcProtocols": "RTS",
        "outCmd": "DIM", "outProtocols": "CHACON", "outAddr": "A4", "outDim": "30",
        "outBrust": "2", "comment": "porch"
    }))
    .unwrap();
    assert_eq!(
        capture.to_command().unwrap(),
        "TRANSCODER ENTRY 3 RTS CAPTURE TO DIM CHACON A4 %30 BURST 2 [porch]"
    );

    let bad = TranscoderEntry {
        entry: "2".into(),
        mode: "MIRROR".into(),
        ..TranscoderEntry::default()
    };
    assert!(bad.to_command().is_err());
}

/// Tests action rendering against the transmitter protocols.
#[test]
fn test_actions() {
    let available = vec!["X10".to_string(), "CHACON".to_string()];
    let dim = ActionCommand {
        protocol: "CHACON".into(),
        action: "DIM".into(),
        address: "A1".into(),
        dim: Some("55".into()),
        burst: "3".into(),
        ..ActionCommand::default()
    };
    assert_eq!(dim.to_command(&available).unwrap(), "DIM A1 CHACON %55 BURST 3");

    let too_bright = ActionCommand {
        dim: Some("150".into()),
        ..dim.clone()
    };
    assert!(too_bright.to_command(&available).is_err());
    assert!(dim.to_command(&[]).is_err());
}

/// Tests that an action on an open client is written with the dongle's
/// transmitter protocols.
#[tokio::test]
async fn test_action_through_client() {
    let mock = MockTransport::rfp1000();
    let (events, _rx) = tokio::sync::mpsc::unbounded_channel();
    let client = DongleClient::new(
        "rfp.1",
        "/dev/rfplayer",
        SerialConfig::default(),
        EngineConfig {
            poll_interval: Duration::from_millis(10),
            settle_delay: Duration::from_millis(20),
            ..EngineConfig::default()
        },
        Arc::new(MockConnector::new(mock.clone())),
        events,
    );
    client.open().await.unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;

    let on = ActionCommand {
        protocol: "BLYSS".into(),
        action: "ON".into(),
        address: "C3".into(),
        ..ActionCommand::default()
    };
    assert!(client.send_action(&on).is_ok());

    let unknown = ActionCommand {
        protocol: "OREGON".into(),
        ..on.clone()
    };
    let report = client.send_action(&unknown);
    assert_eq!(report.error, "Configuration error: Bad action protocols : OREGON.");

    tokio::time::sleep(Duration::from_millis(60)).await;
    assert!(mock.written().contains(&"ZIA++ ON C3 BLYSS".to_string()));
    client.shutdown().await;
}
