#![no_main]

use libfuzzer_sys::fuzz_target;
use pace_bms_rs::payload::{
    decode_device_text, decode_system_datetime, CapacityInformation, Configuration,
    ConfigurationKind, Protocols,
};
use pace_bms_rs::{AnalogInformation, StatusInformation};

fuzz_target!(|data: &[u8]| {
    if let Ok(analog) = AnalogInformation::decode(data) {
        let _ = analog.measurements();
    }
    if let Ok(status) = StatusInformation::decode(data) {
        let _ = status.text_measurements();
    }
    let _ = decode_system_datetime(data);
    let _ = decode_device_text(data);
    for kind in ConfigurationKind::ALL {
        if let Ok(config) = Configuration::decode(kind, data) {
            let _ = config.payload();
        }
    }
    let _ = CapacityInformation::decode(data);
    let _ = Protocols::decode(data);
});
