//! # PACE BMS Poller
//!
//! Issues the queries needed to feed the registered sinks once per update
//! interval. The query plan is fixed at construction: a request is only sent if
//! at least one registered sink consumes what it decodes to, and only if the
//! device's protocol profile supports it.
//!
//! Write commands queued with [`PaceBmsPoller::queue_command`] run at the start
//! of the next tick, before the plan.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use log::{debug, info, warn};
use tokio::time::{interval, MissedTickBehavior};

use crate::error::{DecodeError, PaceBmsError, TransportError};
use crate::pace::{PaceTransport, Request, SerialLine};
use crate::payload::{
    decode_device_text, decode_system_datetime, verify_switch_ack, AnalogInformation,
    CapacityInformation, Configuration, ConfigurationKind, Protocols, StatusInformation,
};
use crate::sinks::{Measurement, SinkRegistry, TextMeasurement};

/// Outcome of one polling cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Requests that returned a decodable response
    pub succeeded: usize,
    /// Requests that failed; their measurements were not published
    pub failed: usize,
    /// Values handed to sinks
    pub published: usize,
}

/// Drives one BMS through a [`PaceTransport`].
pub struct PaceBmsPoller<P> {
    transport: Arc<PaceTransport<P>>,
    sinks: SinkRegistry,
    plan: Vec<Request>,
    commands: Mutex<VecDeque<Request>>,
}

impl<P: SerialLine> PaceBmsPoller<P> {
    pub fn new(transport: Arc<PaceTransport<P>>, sinks: SinkRegistry) -> Self {
        let plan = build_plan(&transport, &sinks);
        info!(
            "Polling plan: [{}]",
            plan.iter().map(Request::name).collect::<Vec<_>>().join(", ")
        );
        PaceBmsPoller {
            transport,
            sinks,
            plan,
            commands: Mutex::new(VecDeque::new()),
        }
    }

    /// The reads issued every tick, in order.
    pub fn plan(&self) -> &[Request] {
        &self.plan
    }

    pub fn sinks(&self) -> &SinkRegistry {
        &self.sinks
    }

    pub fn transport(&self) -> &Arc<PaceTransport<P>> {
        &self.transport
    }

    fn commands(&self) -> MutexGuard<'_, VecDeque<Request>> {
        match self.commands.lock() {
            Ok(commands) => commands,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Queues a write command for the next tick. Read requests are refused.
    pub fn queue_command(&self, request: Request) -> bool {
        if !request.is_write() {
            warn!("Refusing to queue {} request: not a write command", request.name());
            return false;
        }
        debug!("Queued {} request", request.name());
        self.commands().push_back(request);
        true
    }

    /// Number of write commands waiting for the next tick.
    pub fn pending_commands(&self) -> usize {
        self.commands().len()
    }

    /// Runs one polling cycle: queued writes first, then the plan.
    ///
    /// A failed request is logged and skipped; the rest of the cycle continues.
    pub async fn tick(&self) -> TickReport {
        let queued: Vec<Request> = self.commands().drain(..).collect();
        let mut report = TickReport::default();
        for request in queued.iter().chain(self.plan.iter()) {
            match self.execute(request).await {
                Ok(published) => {
                    report.succeeded += 1;
                    report.published += published;
                }
                Err(e) => {
                    report.failed += 1;
                    log_failure(request, &e);
                }
            }
        }
        debug!(
            "Tick finished: {} succeeded, {} failed, {} values published",
            report.succeeded, report.failed, report.published
        );
        report
    }

    /// Sends `request`, decodes the response and publishes to the registered
    /// sinks. Returns how many values were published.
    pub async fn execute(&self, request: &Request) -> Result<usize, PaceBmsError> {
        let response = self.transport.send(request).await?;
        let info = &response.info;
        let published = match request {
            Request::ReadAnalogInformation => {
                let analog = AnalogInformation::decode(info)?;
                analog
                    .measurements()
                    .into_iter()
                    .filter(|(measurement, value)| self.sinks.publish(*measurement, *value))
                    .count()
            }
            Request::ReadStatusInformation => {
                let status = StatusInformation::decode(info)?;
                status
                    .text_measurements()
                    .into_iter()
                    .filter(|(measurement, text)| self.sinks.publish_text(*measurement, text))
                    .count()
            }
            Request::ReadHardwareVersion => self.publish_text(
                TextMeasurement::HardwareVersion,
                &decode_device_text(info),
            ),
            Request::ReadSerialNumber => {
                self.publish_text(TextMeasurement::SerialNumber, &decode_device_text(info))
            }
            Request::ReadSystemDateTime => {
                let at = decode_system_datetime(info)?;
                self.publish_text(
                    TextMeasurement::SystemDateTime,
                    &at.format("%Y-%m-%d %H:%M:%S").to_string(),
                )
            }
            Request::WriteSwitch(switch) => {
                verify_switch_ack(info, *switch)?;
                info!("{switch:?} acknowledged");
                0
            }
            Request::ReadRemainingCapacity => {
                let capacity = CapacityInformation::decode(info)?;
                [
                    (Measurement::RemainingCapacity, capacity.remaining_mah),
                    (Measurement::FullCapacity, capacity.full_mah),
                    (Measurement::DesignCapacity, capacity.design_mah),
                ]
                .into_iter()
                .filter(|(measurement, mah)| {
                    self.sinks.publish(*measurement, *mah as f32 / 1000.0)
                })
                .count()
            }
            Request::ReadConfiguration(kind) => {
                let config = Configuration::decode(*kind, info)?;
                info!("{} configuration: {config:?}", kind.key());
                0
            }
            Request::ReadProtocols => {
                let protocols = Protocols::decode(info)?;
                info!("Protocols: {protocols:?}");
                0
            }
            Request::WriteSystemDateTime(_)
            | Request::WriteMosfet { .. }
            | Request::Shutdown
            | Request::WriteConfiguration(_)
            | Request::WriteProtocols(_) => {
                info!("{} request acknowledged", request.name());
                0
            }
        };
        Ok(published)
    }

    /// Reads one configuration group without publishing it.
    pub async fn read_configuration(
        &self,
        kind: ConfigurationKind,
    ) -> Result<Configuration, PaceBmsError> {
        let response = self.transport.send(&Request::ReadConfiguration(kind)).await?;
        Ok(Configuration::decode(kind, &response.info)?)
    }

    /// Reads the CAN and RS-485 protocol selection.
    pub async fn read_protocols(&self) -> Result<Protocols, PaceBmsError> {
        let response = self.transport.send(&Request::ReadProtocols).await?;
        Ok(Protocols::decode(&response.info)?)
    }

    fn publish_text(&self, measurement: TextMeasurement, value: &str) -> usize {
        usize::from(self.sinks.publish_text(measurement, value))
    }

    /// Ticks every `update_interval` until `shutdown` resolves.
    ///
    /// The first tick runs immediately. A tick that overruns the interval
    /// causes the missed ticks to be skipped, never queued.
    pub async fn run<F>(&self, update_interval: Duration, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut ticker = interval(update_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Polling stopped");
                    return;
                }
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }
    }
}

fn build_plan<P: SerialLine>(transport: &PaceTransport<P>, sinks: &SinkRegistry) -> Vec<Request> {
    let wanted = [
        (Request::ReadAnalogInformation, sinks.has_any_sensor()),
        (Request::ReadStatusInformation, sinks.has_any_status_text()),
        (
            Request::ReadHardwareVersion,
            sinks.has_text(TextMeasurement::HardwareVersion),
        ),
        (
            Request::ReadSerialNumber,
            sinks.has_text(TextMeasurement::SerialNumber),
        ),
        (
            Request::ReadSystemDateTime,
            sinks.has_text(TextMeasurement::SystemDateTime),
        ),
    ];
    let profile = transport.codec().profile();
    wanted
        .into_iter()
        .filter(|(_, needed)| *needed)
        .filter_map(|(request, _)| {
            if profile.supports(&request) {
                Some(request)
            } else {
                warn!(
                    "{} request is not supported by command set 0x{:02X}, \
                     its sinks will never be published",
                    request.name(),
                    profile.command_set
                );
                None
            }
        })
        .collect()
}

fn log_failure(request: &Request, error: &PaceBmsError) {
    match error {
        PaceBmsError::Transport(TransportError::DecodeFailed(DecodeError::ErrorResponse {
            ..
        })) => warn!(
            "BMS response did not indicate success for {} request: {error}",
            request.name()
        ),
        _ => warn!("{} request failed: {error}", request.name()),
    }
}
