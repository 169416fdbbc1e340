//! Request/response pairs captured from a real pack (P16S100A, firmware 1.00).

use chrono::NaiveDate;
use pace_bms_rs::payload::{
    decode_device_text, decode_system_datetime, verify_switch_ack, CapacityInformation,
    CellBalancing, ChargeCurrentLimiter, Configuration, ConfigurationKind, CurrentProtection,
    FastCurrentProtection, FullChargeLowCharge, Protocols, ShortCircuitProtection, Sleep,
    TemperatureProtection, VoltageProtection,
};
use pace_bms_rs::{
    AnalogInformation, DeviceIdentity, FrameCodec, MosfetState, MosfetType, Request,
    StatusInformation, SwitchCommand,
};

const ANALOG_REQUEST: &[u8] = b"~25014642E00201FD30\r";
const ANALOG_RESPONSE: &[u8] = b"~25014600F07A0001100CC70CC80CC70CC70CC70CC50CC60CC70CC70CC60CC70CC60CC60CC70CC60CC7060B9B0B990B990B990BB30BBCFF1FCCCD12D303286A008C2710E1E4\r";
const STATUS_REQUEST: &[u8] = b"~25014644E00201FD2E\r";
const STATUS_RESPONSE: &[u8] = b"~25014600004C000110000000000000000000000000000000000600000000000000000000000E000000000000EF3A\r";
const HARDWARE_VERSION_REQUEST: &[u8] = b"~250146C10000FD9A\r";
const HARDWARE_VERSION_RESPONSE: &[u8] =
    b"~25014600602850313653313030412D313831322D312E30302000F58E\r";
const SERIAL_NUMBER_REQUEST: &[u8] = b"~250146C20000FD99\r";
const SERIAL_NUMBER_RESPONSE: &[u8] = b"~25014600B05031383132313031333830333039442020202020202020202020202020202020202020202020202020EE0F\r";

fn pack(address: u8) -> FrameCodec {
    FrameCodec::new(&DeviceIdentity::new(address, 0x25, None, None, None).unwrap())
}

#[test]
fn test_read_analog_information() {
    let codec = pack(1);
    assert_eq!(
        &codec.encode(&Request::ReadAnalogInformation, 1).unwrap()[..],
        ANALOG_REQUEST
    );

    let response = codec.decode(ANALOG_RESPONSE).unwrap();
    let analog = AnalogInformation::decode(&response.info).unwrap();
    assert_eq!(
        analog.cell_voltages_mv,
        vec![
            3271, 3272, 3271, 3271, 3271, 3269, 3270, 3271, 3271, 3270, 3271, 3270, 3270, 3271,
            3270, 3271
        ]
    );
    assert_eq!(analog.temperatures_dc, vec![241, 239, 239, 239, 265, 274]);
    assert_eq!(analog.current_ma, -2250);
    assert_eq!(analog.total_voltage_mv, 52429);
    assert_eq!(analog.remaining_capacity_mah, 48190);
    assert_eq!(analog.full_capacity_mah, Some(103460));
    assert_eq!(analog.cycle_count, Some(140));
    assert_eq!(analog.design_capacity_mah, Some(100000));

    assert!((analog.state_of_charge().unwrap() - 46.578).abs() < 0.01);
    assert_eq!(analog.state_of_health(), Some(100.0));
    assert!((analog.power() - -117.965).abs() < 0.01);
    assert_eq!(analog.min_cell_voltage_mv(), Some(3269));
    assert_eq!(analog.max_cell_voltage_mv(), Some(3272));
    assert_eq!(analog.average_cell_voltage_mv(), Some(3270));
    assert_eq!(analog.max_cell_differential_mv(), Some(3));
}

#[test]
fn test_read_status_information() {
    let codec = pack(1);
    assert_eq!(
        &codec.encode(&Request::ReadStatusInformation, 1).unwrap()[..],
        STATUS_REQUEST
    );

    let response = codec.decode(STATUS_RESPONSE).unwrap();
    let status = StatusInformation::decode(&response.info).unwrap();
    assert_eq!(
        status.system_text(),
        "Discharging; Discharge MOSFET On; Charge MOSFET On"
    );
    assert_eq!(status.warning_text(), "");
    assert_eq!(status.balancing_text(), "");
    assert_eq!(status.configuration_text(), "");
    assert_eq!(status.protection_text(), "");
    assert_eq!(status.fault_text(), "");
}

#[test]
fn test_read_identification_strings() {
    let codec = pack(1);
    assert_eq!(
        &codec.encode(&Request::ReadHardwareVersion, 1).unwrap()[..],
        HARDWARE_VERSION_REQUEST
    );
    assert_eq!(
        &codec.encode(&Request::ReadSerialNumber, 1).unwrap()[..],
        SERIAL_NUMBER_REQUEST
    );

    let hardware = codec.decode(HARDWARE_VERSION_RESPONSE).unwrap();
    assert_eq!(decode_device_text(&hardware.info), "P16S100A-1812-1.00");
    let serial = codec.decode(SERIAL_NUMBER_RESPONSE).unwrap();
    assert_eq!(decode_device_text(&serial.info), "1812101380309D");
}

#[test]
fn test_write_switch_commands() {
    let codec = pack(0);
    assert_eq!(
        &codec
            .encode(&Request::WriteSwitch(SwitchCommand::BuzzerOn), 0)
            .unwrap()[..],
        b"~25004699E0020DFD12\r"
    );
    assert_eq!(
        &codec
            .encode(&Request::WriteSwitch(SwitchCommand::BuzzerOff), 0)
            .unwrap()[..],
        b"~25004699E0020CFD13\r"
    );

    let ack = codec.decode(b"~25004600C0040D01FCC3\r").unwrap();
    assert!(verify_switch_ack(&ack.info, SwitchCommand::BuzzerOn).is_ok());
    assert!(verify_switch_ack(&ack.info, SwitchCommand::BuzzerOff).is_err());
}

#[test]
fn test_write_mosfet_and_shutdown() {
    let codec = pack(0);
    let charge = |state| Request::WriteMosfet {
        mosfet: MosfetType::Charge,
        state,
    };
    assert_eq!(
        &codec.encode(&charge(MosfetState::Open), 0).unwrap()[..],
        b"~2500469AE00200FD1E\r"
    );
    assert_eq!(
        &codec.encode(&charge(MosfetState::Close), 0).unwrap()[..],
        b"~2500469AE00201FD1D\r"
    );
    assert!(codec.decode(b"~25004600E00226FD30\r").is_ok());

    assert_eq!(
        &codec.encode(&Request::Shutdown, 0).unwrap()[..],
        b"~2500469CE00201FD1B\r"
    );
    let ack = codec.decode(b"~250046000000FDAF\r").unwrap();
    assert!(ack.info.is_empty());
}

#[test]
fn test_system_date_time() {
    let codec = pack(0);
    assert_eq!(
        &codec.encode(&Request::ReadSystemDateTime, 0).unwrap()[..],
        b"~250046B10000FD9C\r"
    );
    let response = codec.decode(b"~25004600400C180815051D1FFB10\r").unwrap();
    assert_eq!(
        decode_system_datetime(&response.info).unwrap(),
        NaiveDate::from_ymd_opt(2024, 8, 21)
            .unwrap()
            .and_hms_opt(5, 29, 31)
            .unwrap()
    );

    let at = NaiveDate::from_ymd_opt(2024, 8, 20)
        .unwrap()
        .and_hms_opt(14, 15, 37)
        .unwrap();
    assert_eq!(
        &codec.encode(&Request::WriteSystemDateTime(at), 0).unwrap()[..],
        b"~250046B2400C1808140E0F25FAFC\r"
    );
}

#[test]
fn test_requests_decode_on_device_side() {
    let codec = pack(1);
    assert_eq!(
        codec.decode_request(ANALOG_REQUEST).unwrap(),
        Request::ReadAnalogInformation
    );
    assert_eq!(
        codec.decode_request(SERIAL_NUMBER_REQUEST).unwrap(),
        Request::ReadSerialNumber
    );
}

/// (read request, read response, decoded value, write request), bus address 0.
fn configuration_captures() -> Vec<(&'static [u8], &'static [u8], Configuration, &'static [u8])> {
    let voltage = |alarm_mv, protection_mv, release_mv| VoltageProtection {
        alarm_mv,
        protection_mv,
        release_mv,
        delay_ms: 1000,
    };
    let temperatures = |[ca, cp, cr, da, dp, dr]: [i16; 6]| TemperatureProtection {
        charge_alarm_dc: ca,
        charge_protection_dc: cp,
        charge_release_dc: cr,
        discharge_alarm_dc: da,
        discharge_protection_dc: dp,
        discharge_release_dc: dr,
    };
    vec![
        (
            b"~250046D10000FD9A\r",
            b"~25004600F010010E100E740D340AFA35\r",
            Configuration::CellOverVoltage(voltage(3600, 3700, 3380)),
            b"~250046D0F010010E100E740D340AFA21\r",
        ),
        (
            b"~250046D30000FD98\r",
            b"~25004600F010010AF009C40B540AFA24\r",
            Configuration::CellUnderVoltage(voltage(2800, 2500, 2900)),
            b"~250046D2F010010AF009C40B540AFA0E\r",
        ),
        (
            b"~250046D70000FD94\r",
            b"~25004600F01001AF009C40B5400AFA24\r",
            Configuration::PackUnderVoltage(voltage(44800, 40000, 46400)),
            b"~250046D6F01001AF009C40B5400AFA0A\r",
        ),
        (
            b"~250046D90000FD92\r",
            b"~25004600400C010068006E0AFB1D\r",
            Configuration::ChargeOverCurrent(CurrentProtection {
                alarm_a: 104,
                protection_a: 110,
                delay_ms: 1000,
            }),
            b"~250046D8400C010068006E0AFB01\r",
        ),
        (
            b"~250046E50000FD95\r",
            b"~25004600E0020CFD25\r",
            Configuration::ShortCircuitProtection(ShortCircuitProtection { delay_us: 300 }),
            b"~250046E4E0020CFD0C\r",
        ),
        (
            b"~250046B60000FD97\r",
            b"~2500460080080D48001EFBE9\r",
            Configuration::CellBalancing(CellBalancing {
                threshold_mv: 3400,
                delta_mv: 30,
            }),
            b"~250046B580080D48001EFBD2\r",
        ),
        (
            b"~250046A00000FD9E\r",
            b"~2500460080080C1C0005FBF3\r",
            Configuration::Sleep(Sleep {
                cell_mv: 3100,
                delay_minutes: 5,
            }),
            b"~250046A880080C1C0005FBDA\r",
        ),
        (
            b"~250046AF0000FD88\r",
            b"~25004600600ADAC007D005FB60\r",
            Configuration::FullChargeLowCharge(FullChargeLowCharge {
                full_charge_mv: 56000,
                full_charge_ma: 2000,
                low_charge_alarm_percent: 5,
            }),
            b"~250046AE600ADAC007D005FB3A\r",
        ),
        (
            b"~250046DD0000FD87\r",
            b"~25004600501A010CA80CD00C9E0CDA0D020CD0F7BE\r",
            Configuration::ChargeAndDischargeOverTemperature(temperatures([
                510, 550, 500, 560, 600, 550,
            ])),
            b"~250046DC501A010CA80CD00C9E0CDA0D020CD0F797\r",
        ),
        (
            b"~250046DF0000FD85\r",
            b"~25004600501A010AAA0A780AAA0A1409E20A14F7E5\r",
            Configuration::ChargeAndDischargeUnderTemperature(temperatures([
                0, -50, 0, -150, -200, -150,
            ])),
            b"~250046DE501A010AAA0A780AAA0A1409E20A14F7BC\r",
        ),
        (
            b"~250046ED0000FD86\r",
            b"~25004600C0040064FCCE\r",
            Configuration::ChargeCurrentLimiterStartCurrent(ChargeCurrentLimiter {
                start_current_a: 100,
            }),
            b"~250046EEC0040064FCA4\r",
        ),
    ]
}

#[test]
fn test_configuration_read_and_write() {
    let codec = pack(0);
    for (read, response, expected, write) in configuration_captures() {
        let kind = expected.kind();
        assert_eq!(
            &codec.encode(&Request::ReadConfiguration(kind), 0).unwrap()[..],
            read,
            "{}",
            kind.key()
        );
        let info = codec.decode(response).unwrap().info;
        assert_eq!(Configuration::decode(kind, &info).unwrap(), expected);
        assert_eq!(
            &codec
                .encode(&Request::WriteConfiguration(expected), 0)
                .unwrap()[..],
            write,
            "{}",
            kind.key()
        );
    }
    assert!(codec.decode(b"~250046000000FDAF\r").unwrap().info.is_empty());
}

#[test]
fn test_configuration_quirks() {
    let codec = pack(0);

    // reported negative, written positive
    let info = codec
        .decode(b"~25004600400C01FF97FF920AFAD3\r")
        .unwrap()
        .info;
    let slow = Configuration::decode(ConfigurationKind::DischargeSlowOverCurrent, &info).unwrap();
    assert_eq!(
        slow,
        Configuration::DischargeSlowOverCurrent(CurrentProtection {
            alarm_a: 105,
            protection_a: 110,
            delay_ms: 1000,
        })
    );
    assert_eq!(
        &codec.encode(&Request::WriteConfiguration(slow), 0).unwrap()[..],
        b"~250046DA400C010069006E0AFAF7\r"
    );

    // the read response carries three extra bytes the write leaves out
    let info = codec
        .decode(b"~25004600400C009604009604FB32\r")
        .unwrap()
        .info;
    let fast = Configuration::decode(ConfigurationKind::DischargeFastOverCurrent, &info).unwrap();
    assert_eq!(
        fast,
        Configuration::DischargeFastOverCurrent(FastCurrentProtection {
            protection_a: 150,
            delay_ms: 100,
        })
    );
    assert_eq!(
        &codec.encode(&Request::WriteConfiguration(fast), 0).unwrap()[..],
        b"~250046E2A006009604FC4E\r"
    );

    // captured while writing 57.61 V back
    let pack_ov = Configuration::PackOverVoltage(VoltageProtection {
        alarm_mv: 57610,
        protection_mv: 59200,
        release_mv: 54000,
        delay_ms: 1000,
    });
    assert_eq!(
        &codec.encode(&Request::WriteConfiguration(pack_ov), 0).unwrap()[..],
        b"~250046D4F01001E10AE740D2F00AF9FB\r"
    );
    assert_eq!(
        &codec
            .encode(&Request::ReadConfiguration(ConfigurationKind::PackOverVoltage), 0)
            .unwrap()[..],
        b"~250046D50000FD96\r"
    );
}

#[test]
fn test_remaining_capacity_and_protocols() {
    let codec = pack(0);
    assert_eq!(
        &codec.encode(&Request::ReadRemainingCapacity, 0).unwrap()[..],
        b"~250046A60000FD98\r"
    );
    let info = codec
        .decode(b"~25004600400C183C286A2710FB0E\r")
        .unwrap()
        .info;
    assert_eq!(
        CapacityInformation::decode(&info).unwrap(),
        CapacityInformation {
            remaining_mah: 62040,
            full_mah: 103460,
            design_mah: 100000,
        }
    );

    assert_eq!(
        &codec.encode(&Request::ReadProtocols, 0).unwrap()[..],
        b"~250046EB0000FD88\r"
    );
    let info = codec.decode(b"~25004600A006131400FC6F\r").unwrap().info;
    let protocols = Protocols::decode(&info).unwrap();
    assert_eq!(
        protocols,
        Protocols {
            can: 0x13,
            rs485: 0x14,
            protocol_type: 0x00,
        }
    );
    assert_eq!(
        &codec.encode(&Request::WriteProtocols(protocols), 0).unwrap()[..],
        b"~250046ECA006131400FC47\r"
    );
}
