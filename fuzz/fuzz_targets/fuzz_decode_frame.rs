#![no_main]

use libfuzzer_sys::fuzz_target;
use pace_bms_rs::pace::frame::decode_frame;
use pace_bms_rs::{DeviceIdentity, FrameCodec};

fuzz_target!(|data: &[u8]| {
    let _ = decode_frame(data);

    let codec = FrameCodec::new(&DeviceIdentity::default());
    let _ = codec.decode(data);
    let _ = codec.decode_request(data);

    // Same bytes wrapped in a valid envelope, so the INFO decoders get reached
    if let Ok(frame) = codec.encode_response(1, 0, data) {
        assert!(codec.decode(&frame).is_ok());
    }
});
