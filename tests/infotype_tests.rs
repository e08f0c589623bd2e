//! Integration tests for the InfoType decoders: protocol whitelists, RF ids,
//! measure extraction, candidate sets and command rendering.

use rfplayer_rs::device::SensorDescriptor;
use rfplayer_rs::infotypes::{info_types_for_protocol, protocol_name, RenderError};
use rfplayer_rs::{CommandValues, InfoType, RfpError, RfpFrame, SensorValue};
use serde_json::{json, Value};

fn frame(value: Value) -> RfpFrame {
    RfpFrame::from_message(&json!({ "frame": value })).unwrap()
}

fn sensor(name: &str, data_type: &str) -> SensorDescriptor {
    SensorDescriptor {
        id: 1,
        name: name.to_string(),
        data_type: data_type.to_string(),
        reference: name.to_string(),
    }
}

fn oregon_thermohygro() -> RfpFrame {
    frame(json!({
        "header": {
            "frameType": "0", "dataFlag": "0", "rfLevel": "-70", "floorNoise": "-99",
            "rfQuality": "6", "protocol": "5", "protocolMeaning": "OREGON",
            "infoType": "4", "frequency": "433920"
        },
        "infos": {
            "subType": "0", "id_PHY": "0x1A2D", "adr": "154", "channel": "1",
            "qualifier": "32", "lowBatt": "0",
            "measures": [
                {"type": "temperature", "value": "+21.5", "unit": "Celsius"},
                {"type": "hygrometry", "value": "48", "unit": "%"}
            ]
        }
    }))
}

/// Tests that an OREGON infoType 4 event yields typed temperature and humidity.
#[test]
fn test_thermohygro_scenario() {
    let f = oregon_thermohygro();
    let t = InfoType::of_frame(&f).unwrap();
    assert_eq!(t, InfoType::Thermohygro);
    assert!(t.is_valid(&f));
    assert_eq!(t.device_id(&f).as_deref(), Some("0x1A2D.154.1"));

    assert_eq!(
        t.sensor_value(&f, &sensor("temperature", "DT_Temp")).unwrap(),
        Some(SensorValue::Float(21.5))
    );
    assert_eq!(
        t.sensor_value(&f, &sensor("hygrometry", "DT_Humidity")).unwrap(),
        Some(SensorValue::Int(48))
    );
    assert_eq!(
        t.sensor_value(&f, &sensor("rf_quality", "DT_Number")).unwrap(),
        Some(SensorValue::Int(60))
    );
    assert_eq!(
        t.sensor_value(&f, &sensor("low_battery", "DT_Bool")).unwrap(),
        Some(SensorValue::Int(0))
    );
}

/// Tests that a protocol outside the whitelist stops extraction.
#[test]
fn test_whitelist() {
    let f = frame(json!({"header": {"protocol": "4", "infoType": "4"}}));
    let t = InfoType::of_frame(&f).unwrap();
    assert!(!t.is_valid(&f));
    assert!(t.device_id(&f).is_none());
    assert!(matches!(
        t.sensor_value(&f, &sensor("temperature", "DT_Temp")),
        Err(RfpError::DecodeMismatch(_))
    ));
}

/// Tests that the barometer converts hPa to Pa.
#[test]
fn test_barometer_pressure() {
    let f = frame(json!({
        "header": {"protocol": "5", "infoType": "5"},
        "infos": {"id_PHY": "0x5A6D", "adr": "1", "channel": "0",
                  "measures": [{"type": "pressure", "value": "1013", "unit": "hPa"}]}
    }));
    assert_eq!(
        InfoType::Barometer
            .sensor_value(&f, &sensor("pressure", "DT_Pressure"))
            .unwrap(),
        Some(SensorValue::Int(101_300))
    );
}

/// Tests that scaled values too large for an i64 give no value instead of
/// overflowing.
#[test]
fn test_oversized_scaled_values() {
    let f = frame(json!({
        "header": {"protocol": "5", "infoType": "5", "rfQuality": "1000000000000000000"},
        "infos": {"id_PHY": "0x5A6D", "adr": "1", "channel": "0",
                  "measures": [{"type": "pressure", "value": "9223372036854775807", "unit": "hPa"}]}
    }));
    let t = InfoType::Barometer;
    assert_eq!(t.sensor_value(&f, &sensor("pressure", "DT_Pressure")).unwrap(), None);
    assert_eq!(t.sensor_value(&f, &sensor("rf_quality", "DT_Number")).unwrap(), None);
}

/// Tests that a measure missing from the frame gives no value.
#[test]
fn test_missing_measure() {
    let f = oregon_thermohygro();
    assert_eq!(
        InfoType::Thermohygro
            .sensor_value(&f, &sensor("wind_speed", "DT_Speed"))
            .unwrap(),
        None
    );
}

/// Tests the switch states of an infoType 1 CHACON event.
#[test]
fn test_switch_states() {
    let on = frame(json!({
        "header": {"protocol": "4", "infoType": "1", "rfQuality": "9"},
        "infos": {"subType": "1", "id": "2630683"}
    }));
    let t = InfoType::of_frame(&on).unwrap();
    assert_eq!(t.device_id(&on).as_deref(), Some("2630683"));
    assert_eq!(
        t.sensor_value(&on, &sensor("switch", "DT_Switch")).unwrap(),
        Some(SensorValue::Int(1))
    );
    assert_eq!(
        t.available_sensors(&on),
        vec![vec!["switch", "rf_quality"]]
    );
    assert_eq!(
        t.available_commands(&on),
        vec![vec!["switch", "switch_all", "dimmer"]]
    );
}

/// Tests that switch state 1 on CHACON renders the ON command.
#[test]
fn test_render_chacon_switch() {
    let values = CommandValues::new().with("value", "1");
    let line = InfoType::Switch
        .render_command("4", "A1", "switch", &values)
        .unwrap();
    assert_eq!(line, "ON A1 CHACON");

    let dim = CommandValues::new().with("value", "0").with("level", 40);
    assert_eq!(
        InfoType::Switch
            .render_command("1", "B3", "dimmer", &dim)
            .unwrap(),
        "DIM B3 X10 %40"
    );
}

/// Tests that unknown triples are rejected with a reason.
#[test]
fn test_render_rejections() {
    let on = CommandValues::new().with("value", "1");
    assert_eq!(
        InfoType::Thermohygro.render_command("5", "x", "switch", &on),
        Err(RenderError::NotRenderable(4))
    );
    assert!(matches!(
        InfoType::Switch.render_command("4", "A1", "open_gate", &on),
        Err(RenderError::UnknownCommand { .. })
    ));
    assert!(matches!(
        InfoType::Switch.render_command("4", "A1", "switch", &CommandValues::new().with("value", "7")),
        Err(RenderError::UnknownState { .. })
    ));
    assert_eq!(
        InfoType::Switch.render_command("4", "A1", "dimmer", &on),
        Err(RenderError::MissingParameter("level"))
    );
}

/// Tests the protocol catalogue lookups.
#[test]
fn test_protocol_catalogue() {
    assert_eq!(protocol_name("9"), "RTS");
    assert_eq!(protocol_name("77"), "UNKNOWN");
    assert_eq!(
        info_types_for_protocol("5"),
        vec![
            InfoType::Thermohygro,
            InfoType::Barometer,
            InfoType::Wind,
            InfoType::Uv,
            InfoType::Rain
        ]
    );
    assert!(info_types_for_protocol("42").is_empty());
}
