use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rfplayer_rs::rfp::frame::{classify_header, extract_req_num, Frame};
use rfplayer_rs::{InfoType, RfpFrame};

const THERMOHYGRO: &str = r#"ZIA33{"frame":{"header":{"frameType":"0","dataFlag":"0","rfLevel":"-70","floorNoise":"-99","rfQuality":"6","protocol":"5","protocolMeaning":"OREGON","infoType":"4","frequency":"433920"},"infos":{"subType":"0","id_PHY":"0x1A2D","adr":"154","channel":"1","qualifier":"32","lowBatt":"0","measures":[{"type":"temperature","value":"+21.5","unit":"Celsius"},{"type":"hygrometry","value":"48","unit":"%"}]}}}"#;

const STATUS_REPLY: &str = r#"ZIA--{"systemStatus":{"reqNum":"12","info":[{"n":"Version","v":"1.12","unit":"","c":""}]}}"#;

fn benchmark_classify_header(c: &mut Criterion) {
    c.bench_function("classify_header", |b| {
        b.iter(|| black_box(classify_header(black_box(b"ZIA33"))))
    });
}

fn benchmark_decode_event(c: &mut Criterion) {
    c.bench_function("decode_event", |b| {
        b.iter(|| {
            let frame = Frame::from_line(black_box(THERMOHYGRO)).unwrap();
            let _ = black_box(frame.decode());
        })
    });
}

fn benchmark_req_num(c: &mut Criterion) {
    let frame = Frame::from_line(STATUS_REPLY).unwrap();
    c.bench_function("extract_req_num", |b| {
        b.iter(|| black_box(extract_req_num(black_box(&frame.payload))))
    });
}

fn benchmark_device_id(c: &mut Criterion) {
    let message = Frame::from_line(THERMOHYGRO)
        .unwrap()
        .decode()
        .unwrap()
        .into_value();
    let frame = RfpFrame::from_message(&message).unwrap();
    c.bench_function("device_id", |b| {
        b.iter(|| black_box(InfoType::Thermohygro.device_id(black_box(&frame))))
    });
}

criterion_group!(
    benches,
    benchmark_classify_header,
    benchmark_decode_event,
    benchmark_req_num,
    benchmark_device_id
);
criterion_main!(benches);
