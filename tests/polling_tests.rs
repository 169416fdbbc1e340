use std::sync::{Arc, Mutex};
use std::time::Duration;

use pace_bms_rs::constants::*;
use pace_bms_rs::{
    DeviceIdentity, Measurement, MockPaceBms, PaceBmsPoller, PaceTransport, Request,
    SensorSink, SinkRegistry, TextMeasurement, TextSensorSink, TransportConfig,
};

const ANALOG_RESPONSE: &[u8] = b"~25014600F07A0001100CC70CC80CC70CC70CC70CC50CC60CC70CC70CC60CC70CC60CC60CC70CC60CC7060B9B0B990B990B990BB30BBCFF1FCCCD12D303286A008C2710E1E4\r";
const HARDWARE_VERSION_RESPONSE: &[u8] =
    b"~25014600602850313653313030412D313831322D312E30302000F58E\r";
const SERIAL_NUMBER_RESPONSE: &[u8] = b"~25014600B05031383132313031333830333039442020202020202020202020202020202020202020202020202020EE0F\r";

#[derive(Default)]
struct RecordingSink {
    values: Mutex<Vec<(Measurement, f32)>>,
    texts: Mutex<Vec<(TextMeasurement, String)>>,
}

impl RecordingSink {
    fn values(&self) -> Vec<(Measurement, f32)> {
        self.values.lock().unwrap().clone()
    }

    fn texts(&self) -> Vec<(TextMeasurement, String)> {
        self.texts.lock().unwrap().clone()
    }
}

impl SensorSink for RecordingSink {
    fn publish(&self, measurement: Measurement, value: f32) {
        self.values.lock().unwrap().push((measurement, value));
    }
}

impl TextSensorSink for RecordingSink {
    fn publish_text(&self, measurement: TextMeasurement, value: &str) {
        self.texts.lock().unwrap().push((measurement, value.to_string()));
    }
}

fn register_everything(sink: &Arc<RecordingSink>) -> SinkRegistry {
    let mut registry = SinkRegistry::new();
    for measurement in Measurement::all() {
        registry.register(measurement, sink.clone());
    }
    for measurement in TextMeasurement::ALL {
        registry.register_text(measurement, sink.clone());
    }
    registry
}

fn scripted_pack() -> (DeviceIdentity, MockPaceBms) {
    let identity = DeviceIdentity::default();
    let mock = MockPaceBms::new(&identity);
    mock.reply(PACE_CID2_READ_ANALOG_INFORMATION, ANALOG_RESPONSE);
    mock.reply(PACE_CID2_READ_HARDWARE_VERSION, HARDWARE_VERSION_RESPONSE);
    mock.reply(PACE_CID2_READ_SERIAL_NUMBER, SERIAL_NUMBER_RESPONSE);
    (identity, mock)
}

fn poller(
    identity: &DeviceIdentity,
    mock: &MockPaceBms,
    sinks: SinkRegistry,
) -> PaceBmsPoller<tokio::io::DuplexStream> {
    let transport = PaceTransport::new(mock.attach(), identity, TransportConfig::default());
    PaceBmsPoller::new(Arc::new(transport), sinks)
}

#[tokio::test(start_paused = true)]
async fn test_partial_failure_publishes_only_successful_requests() {
    let (identity, mock) = scripted_pack();
    mock.silence(PACE_CID2_READ_STATUS_INFORMATION);
    mock.silence(PACE_CID2_READ_SYSTEM_DATETIME);
    let sink = Arc::new(RecordingSink::default());
    let poller = poller(&identity, &mock, register_everything(&sink));
    assert_eq!(poller.plan().len(), 5);

    let report = poller.tick().await;
    assert_eq!(report.succeeded, 3);
    assert_eq!(report.failed, 2);
    // every request went out, the timeouts did not end the cycle
    assert_eq!(mock.received().len(), 5);

    let values = sink.values();
    assert!(values.contains(&(Measurement::CellVoltage(6), 3.269)));
    assert!(values.contains(&(Measurement::Temperature(1), 24.1)));
    assert!(values.contains(&(Measurement::CycleCount, 140.0)));

    let texts = sink.texts();
    assert_eq!(
        texts,
        vec![
            (
                TextMeasurement::HardwareVersion,
                "P16S100A-1812-1.00".to_string()
            ),
            (TextMeasurement::SerialNumber, "1812101380309D".to_string()),
        ]
    );
    assert_eq!(report.published, values.len() + texts.len());
}

#[tokio::test(start_paused = true)]
async fn test_unregistered_measurements_are_not_published() {
    let (identity, mock) = scripted_pack();
    let sink = Arc::new(RecordingSink::default());
    let mut registry = SinkRegistry::new();
    registry.register(Measurement::Voltage, sink.clone());
    registry.register(Measurement::CellVoltage(3), sink.clone());
    let poller = poller(&identity, &mock, registry);
    assert_eq!(poller.plan(), &[Request::ReadAnalogInformation]);

    let report = poller.tick().await;
    assert_eq!(report.published, 2);
    assert_eq!(
        sink.values(),
        vec![
            (Measurement::Voltage, 52.429),
            (Measurement::CellVoltage(3), 3.271)
        ]
    );
    assert!(sink.texts().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_failed_request_recovers_on_next_tick() {
    let (identity, mock) = scripted_pack();
    mock.silence(PACE_CID2_READ_SERIAL_NUMBER);
    let sink = Arc::new(RecordingSink::default());
    let mut registry = SinkRegistry::new();
    registry.register_text(TextMeasurement::SerialNumber, sink.clone());
    let poller = poller(&identity, &mock, registry);

    assert_eq!(poller.tick().await.failed, 1);
    assert!(sink.texts().is_empty());

    mock.reply(PACE_CID2_READ_SERIAL_NUMBER, SERIAL_NUMBER_RESPONSE);
    assert_eq!(poller.tick().await.succeeded, 1);
    assert_eq!(sink.texts().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_status_and_clock_are_published_as_text() {
    let identity = DeviceIdentity::default();
    let mock = MockPaceBms::new(&identity);
    mock.reply(
        PACE_CID2_READ_STATUS_INFORMATION,
        b"~25014600004C000110000000000000000000000000000000000600000000000000000000000E000000000000EF3A\r".as_slice(),
    );
    mock.reply_info(
        PACE_CID2_READ_SYSTEM_DATETIME,
        &[0x18, 0x08, 0x15, 0x05, 0x1D, 0x1F],
    )
    .unwrap();
    let sink = Arc::new(RecordingSink::default());
    let mut registry = SinkRegistry::new();
    registry.register_text(TextMeasurement::SystemStatus, sink.clone());
    registry.register_text(TextMeasurement::SystemDateTime, sink.clone());
    let poller = poller(&identity, &mock, registry);

    poller.tick().await;
    assert_eq!(
        sink.texts(),
        vec![
            (
                TextMeasurement::SystemStatus,
                "Discharging; Discharge MOSFET On; Charge MOSFET On".to_string()
            ),
            (
                TextMeasurement::SystemDateTime,
                "2024-08-21 05:29:31".to_string()
            ),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_overrunning_tick_skips_missed_ticks() {
    let (identity, mock) = scripted_pack();
    let frame = pace_bms_rs::FrameCodec::new(&identity)
        .encode_response(1, PACE_RTN_OK, b"1812")
        .unwrap();
    // each cycle takes 150 ms against a 100 ms interval
    mock.reply_after(PACE_CID2_READ_SERIAL_NUMBER, Duration::from_millis(150), frame);
    let sink = Arc::new(RecordingSink::default());
    let mut registry = SinkRegistry::new();
    registry.register_text(TextMeasurement::SerialNumber, sink.clone());
    let transport = PaceTransport::new(
        mock.attach(),
        &identity,
        TransportConfig {
            request_throttle: Duration::ZERO,
            response_timeout: Duration::from_millis(200),
        },
    );
    let poller = PaceBmsPoller::new(Arc::new(transport), registry);

    poller
        .run(
            Duration::from_millis(100),
            tokio::time::sleep(Duration::from_millis(1000)),
        )
        .await;

    let received = mock.received();
    assert!(received.len() <= 7);
    for pair in received.windows(2) {
        assert!(pair[1].at - pair[0].at >= Duration::from_millis(150));
    }
}
