use chrono::NaiveDate;
use pace_bms_rs::payload::{ConfigurationKind, Protocols};
use pace_bms_rs::{
    DecodeError, DeviceIdentity, FrameCodec, MosfetState, MosfetType, Request, SwitchCommand,
};
use proptest::prelude::*;

const ANALOG_RESPONSE: &[u8] = b"~25014600F07A0001100CC70CC80CC70CC70CC70CC50CC60CC70CC70CC60CC70CC60CC60CC70CC60CC7060B9B0B990B990B990BB30BBCFF1FCCCD12D303286A008C2710E1E4\r";

fn request_strategy() -> impl Strategy<Value = Request> {
    let datetime = (2000i32..2256, 1u32..=12, 1u32..=28, 0u32..24, 0u32..60, 0u32..60)
        .prop_map(|(y, mo, d, h, mi, s)| {
            NaiveDate::from_ymd_opt(y, mo, d)
                .and_then(|date| date.and_hms_opt(h, mi, s))
                .unwrap()
        });
    prop_oneof![
        Just(Request::ReadAnalogInformation),
        Just(Request::ReadStatusInformation),
        Just(Request::ReadHardwareVersion),
        Just(Request::ReadSerialNumber),
        Just(Request::ReadSystemDateTime),
        Just(Request::Shutdown),
        Just(Request::ReadRemainingCapacity),
        Just(Request::ReadProtocols),
        proptest::sample::select(ConfigurationKind::ALL.to_vec())
            .prop_map(Request::ReadConfiguration),
        any::<(u8, u8, u8)>().prop_map(|(can, rs485, protocol_type)| {
            Request::WriteProtocols(Protocols {
                can,
                rs485,
                protocol_type,
            })
        }),
        datetime.prop_map(Request::WriteSystemDateTime),
        proptest::sample::select(SwitchCommand::ALL.to_vec()).prop_map(Request::WriteSwitch),
        (any::<bool>(), any::<bool>()).prop_map(|(charge, close)| Request::WriteMosfet {
            mosfet: if charge {
                MosfetType::Charge
            } else {
                MosfetType::Discharge
            },
            state: if close {
                MosfetState::Close
            } else {
                MosfetState::Open
            },
        }),
    ]
}

proptest! {
    #[test]
    fn test_request_round_trip(
        request in request_strategy(),
        address in 0u8..=15,
        command_set in 0x20u8..=0x25,
    ) {
        let identity = DeviceIdentity::new(address, command_set, None, None, None).unwrap();
        let codec = FrameCodec::new(&identity);
        let frame = codec.encode(&request, address).unwrap();
        prop_assert_eq!(frame[0], b'~');
        prop_assert_eq!(frame[frame.len() - 1], b'\r');
        prop_assert_eq!(codec.decode_request(&frame).unwrap(), request);
    }

    #[test]
    fn test_clock_outside_pack_years_is_refused(
        year in prop_oneof![1900i32..2000, 2256i32..2500],
        day in 1u32..=28,
    ) {
        let at = NaiveDate::from_ymd_opt(year, 1, day)
            .and_then(|date| date.and_hms_opt(12, 0, 0))
            .unwrap();
        let codec = FrameCodec::new(&DeviceIdentity::default());
        let result = codec.encode(&Request::WriteSystemDateTime(at), 1);
        prop_assert!(matches!(result, Err(DecodeError::OutOfRange(_))));
    }

    #[test]
    fn test_response_round_trip(
        info in proptest::collection::vec(any::<u8>(), 0..200),
        address in 0u8..=15,
    ) {
        let identity = DeviceIdentity::new(address, 0x25, None, None, None).unwrap();
        let codec = FrameCodec::new(&identity);
        let frame = codec.encode_response(address, 0x00, &info).unwrap();
        prop_assert_eq!(frame.len(), 18 + info.len() * 2);
        prop_assert_eq!(codec.decode(&frame).unwrap().info, info);
    }

    #[test]
    fn test_single_byte_corruption_is_rejected(
        index in 0usize..ANALOG_RESPONSE.len(),
        replacement in any::<u8>(),
    ) {
        // hex digits are accepted in either case
        prop_assume!(!ANALOG_RESPONSE[index].eq_ignore_ascii_case(&replacement));
        let mut corrupted = ANALOG_RESPONSE.to_vec();
        corrupted[index] = replacement;
        let codec = FrameCodec::new(&DeviceIdentity::default());
        prop_assert!(codec.decode(&corrupted).is_err());
    }

    #[test]
    fn test_decode_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..64)) {
        let codec = FrameCodec::new(&DeviceIdentity::default());
        let _ = codec.decode(&bytes);
        let _ = codec.decode_request(&bytes);
    }
}

#[test]
fn test_address_mismatch() {
    // well-formed analog response from pack 1, polled as pack 2
    let codec = FrameCodec::new(&DeviceIdentity::new(2, 0x25, None, None, None).unwrap());
    assert_eq!(
        codec.decode(ANALOG_RESPONSE).unwrap_err(),
        DecodeError::AddressMismatch {
            expected: 2,
            actual: 1
        }
    );
}

#[test]
fn test_version_and_chemistry_overrides() {
    let identity = DeviceIdentity::new(1, 0x25, None, Some(0x20), Some(0x4A)).unwrap();
    let codec = FrameCodec::new(&identity);
    let frame = codec.encode(&Request::ReadAnalogInformation, 1).unwrap();
    assert!(frame.starts_with(b"~20014A42"));
    assert!(matches!(
        codec.decode(ANALOG_RESPONSE),
        Err(DecodeError::VersionMismatch {
            expected: 0x20,
            actual: 0x25
        })
    ));
}
