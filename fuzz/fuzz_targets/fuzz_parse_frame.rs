#![no_main]

use libfuzzer_sys::fuzz_target;
use rfplayer_rs::infotypes::{InfoType, RfpFrame};
use rfplayer_rs::rfp::frame::{classify_header, extract_req_num, Frame};

fuzz_target!(|data: &[u8]| {
    // The codec must survive anything the serial line hands it
    let _ = classify_header(data);
    let line = String::from_utf8_lossy(data);
    let Ok(frame) = Frame::from_line(&line) else {
        return;
    };
    let _ = frame.req_num();
    let _ = extract_req_num(&frame.payload);

    // Decoded events go through the InfoType decoders
    if let Ok(message) = frame.decode() {
        if let Some(value) = message.as_value() {
            if let Ok(rfp) = RfpFrame::from_message(value) {
                if let Some(info_type) = InfoType::of_frame(&rfp) {
                    let _ = info_type.device_id(&rfp);
                    let _ = info_type.available_sensors(&rfp);
                    let _ = info_type.available_commands(&rfp);
                }
            }
        }
    }
});
