use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::NaiveDateTime;
use clap::{Parser, Subcommand, ValueEnum};
use log::info;
use pace_bms_rs::logging::{init_logger_with_level, verbosity_level};
use pace_bms_rs::payload::{Configuration, ConfigurationKind, Protocols};
use pace_bms_rs::{
    available_ports, connect, JsonLinesSink, Measurement, MosfetState, MosfetType,
    PaceBmsConfig, PaceBmsPoller, PaceTransport, Request, Settings, SinkRegistry, SwitchCommand,
    TextMeasurement,
};
use tokio_serial::SerialStream;

#[derive(Parser)]
#[command(name = "pace-bms")]
#[command(about = "CLI tool for PACE battery management systems")]
struct Cli {
    /// JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Serial port, overrides the configuration
    #[arg(short, long, global = true)]
    port: Option<String>,

    /// BMS address, overrides the configuration
    #[arg(short, long, global = true)]
    address: Option<u8>,

    /// More output (-v info, -vv debug, -vvv frame dumps)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll every update interval and print values as JSON lines
    Poll {
        /// Run a single cycle and exit
        #[arg(long)]
        once: bool,
    },
    /// Read one group of values
    Read { what: ReadTarget },
    Switch { switch: SwitchKind, state: OnOff },
    LimiterGear { gear: Gear },
    Mosfet { mosfet: MosfetKind, state: MosfetAction },
    /// Set the BMS clock, to the local time unless --at is given
    SetTime {
        /// "YYYY-MM-DD HH:MM:SS"
        #[arg(long, value_parser = parse_datetime)]
        at: Option<NaiveDateTime>,
    },
    /// Read or write a protection or system configuration group
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Read or select the CAN and RS-485 protocols
    Protocols {
        #[command(subcommand)]
        action: ProtocolsAction,
    },
    /// Shut down and restart the BMS
    Reboot,
    /// List serial ports
    Ports,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print one group as JSON
    Read {
        /// Group name, e.g. cell_over_voltage
        #[arg(value_parser = parse_kind)]
        kind: ConfigurationKind,
    },
    /// Write one group given as JSON, e.g. '{"kind":"sleep","cell_mv":3100,"delay_minutes":5}'
    Write {
        #[arg(value_parser = parse_configuration)]
        json: Configuration,
    },
}

#[derive(Subcommand)]
enum ProtocolsAction {
    /// Print the protocol selection as JSON
    Read,
    Write {
        #[arg(long)]
        can: u8,
        #[arg(long)]
        rs485: u8,
        #[arg(long = "type")]
        protocol_type: u8,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ReadTarget {
    Analog,
    Status,
    HardwareVersion,
    SerialNumber,
    DateTime,
    RemainingCapacity,
}

#[derive(Clone, Copy, ValueEnum)]
enum SwitchKind {
    Buzzer,
    Led,
    ChargeCurrentLimiter,
}

#[derive(Clone, Copy, ValueEnum)]
enum OnOff {
    On,
    Off,
}

#[derive(Clone, Copy, ValueEnum)]
enum Gear {
    Low,
    High,
}

#[derive(Clone, Copy, ValueEnum)]
enum MosfetKind {
    Charge,
    Discharge,
}

#[derive(Clone, Copy, ValueEnum)]
enum MosfetAction {
    Open,
    Close,
}

fn parse_datetime(value: &str) -> Result<NaiveDateTime, String> {
    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S").map_err(|e| e.to_string())
}

fn parse_kind(value: &str) -> Result<ConfigurationKind, String> {
    ConfigurationKind::from_key(value).ok_or_else(|| {
        let known: Vec<_> = ConfigurationKind::ALL.iter().map(|k| k.key()).collect();
        format!("unknown group, expected one of: {}", known.join(", "))
    })
}

fn parse_configuration(value: &str) -> Result<Configuration, String> {
    serde_json::from_str(value).map_err(|e| e.to_string())
}

fn switch_command(switch: SwitchKind, state: OnOff) -> SwitchCommand {
    match (switch, state) {
        (SwitchKind::Buzzer, OnOff::On) => SwitchCommand::BuzzerOn,
        (SwitchKind::Buzzer, OnOff::Off) => SwitchCommand::BuzzerOff,
        (SwitchKind::Led, OnOff::On) => SwitchCommand::LedOn,
        (SwitchKind::Led, OnOff::Off) => SwitchCommand::LedOff,
        (SwitchKind::ChargeCurrentLimiter, OnOff::On) => SwitchCommand::ChargeCurrentLimiterOn,
        (SwitchKind::ChargeCurrentLimiter, OnOff::Off) => SwitchCommand::ChargeCurrentLimiterOff,
    }
}

fn load_settings(cli: &Cli) -> Result<Settings> {
    let mut config = match &cli.config {
        Some(path) => PaceBmsConfig::load(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => PaceBmsConfig::default(),
    };
    if let Some(address) = cli.address {
        config.address = u64::from(address).into();
    }
    config.validate().context("Invalid configuration")
}

/// Registry that prints only what `request` produces.
fn registry_for(request: &Request, sink: Arc<JsonLinesSink<std::io::Stdout>>) -> SinkRegistry {
    let mut registry = SinkRegistry::new();
    match request {
        Request::ReadAnalogInformation => {
            for measurement in Measurement::all() {
                registry.register(measurement, sink.clone());
            }
        }
        Request::ReadStatusInformation => {
            for measurement in TextMeasurement::ALL.into_iter().filter(|m| m.is_status()) {
                registry.register_text(measurement, sink.clone());
            }
        }
        Request::ReadHardwareVersion => {
            registry.register_text(TextMeasurement::HardwareVersion, sink);
        }
        Request::ReadSerialNumber => {
            registry.register_text(TextMeasurement::SerialNumber, sink);
        }
        Request::ReadSystemDateTime => {
            registry.register_text(TextMeasurement::SystemDateTime, sink);
        }
        Request::ReadRemainingCapacity => {
            registry.register(Measurement::RemainingCapacity, sink.clone());
            registry.register(Measurement::FullCapacity, sink.clone());
            registry.register(Measurement::DesignCapacity, sink);
        }
        _ => {}
    }
    registry
}

fn open(cli: &Cli, settings: &Settings) -> Result<Arc<PaceTransport<SerialStream>>> {
    let port = settings.port_or(cli.port.as_deref())?;
    let transport =
        connect(&port, settings).with_context(|| format!("Failed to open serial port {port}"))?;
    Ok(Arc::new(transport))
}

/// Reads that print a decoded value instead of publishing measurements.
async fn print_json(cli: &Cli, read: Request) -> Result<()> {
    let settings = load_settings(cli)?;
    let poller = PaceBmsPoller::new(open(cli, &settings)?, SinkRegistry::new());
    let json = match read {
        Request::ReadConfiguration(kind) => {
            let config = poller
                .read_configuration(kind)
                .await
                .with_context(|| format!("Reading {} failed", kind.key()))?;
            serde_json::to_string_pretty(&config)?
        }
        Request::ReadProtocols => {
            let protocols = poller
                .read_protocols()
                .await
                .context("Reading protocols failed")?;
            serde_json::to_string_pretty(&protocols)?
        }
        other => bail!("{} has no JSON form", other.name()),
    };
    println!("{json}");
    Ok(())
}

async fn poll(cli: &Cli, once: bool) -> Result<()> {
    let settings = load_settings(cli)?;
    let sink = Arc::new(JsonLinesSink::new(std::io::stdout()));
    let poller = PaceBmsPoller::new(open(cli, &settings)?, settings.sink_registry(sink));
    if poller.plan().is_empty() {
        bail!("No configured sensor can be read from this BMS");
    }
    if once {
        let report = poller.tick().await;
        if report.succeeded == 0 {
            bail!("Every request failed");
        }
        return Ok(());
    }
    info!("Polling every {:?}", settings.update_interval);
    poller
        .run(settings.update_interval, async {
            // without a signal handler we run until killed
            let _ = tokio::signal::ctrl_c().await;
        })
        .await;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logger_with_level(verbosity_level(cli.verbose));

    let request = match &cli.command {
        Commands::Ports => {
            for port in available_ports().context("Failed to enumerate serial ports")? {
                println!("{port}");
            }
            return Ok(());
        }
        Commands::Poll { once } => return poll(&cli, *once).await,
        Commands::Read { what } => match what {
            ReadTarget::Analog => Request::ReadAnalogInformation,
            ReadTarget::Status => Request::ReadStatusInformation,
            ReadTarget::HardwareVersion => Request::ReadHardwareVersion,
            ReadTarget::SerialNumber => Request::ReadSerialNumber,
            ReadTarget::DateTime => Request::ReadSystemDateTime,
            ReadTarget::RemainingCapacity => Request::ReadRemainingCapacity,
        },
        Commands::Config { action } => match action {
            ConfigAction::Read { kind } => {
                return print_json(&cli, Request::ReadConfiguration(*kind)).await
            }
            ConfigAction::Write { json } => Request::WriteConfiguration(*json),
        },
        Commands::Protocols { action } => match action {
            ProtocolsAction::Read => return print_json(&cli, Request::ReadProtocols).await,
            ProtocolsAction::Write {
                can,
                rs485,
                protocol_type,
            } => Request::WriteProtocols(Protocols {
                can: *can,
                rs485: *rs485,
                protocol_type: *protocol_type,
            }),
        },
        Commands::Switch { switch, state } => Request::WriteSwitch(switch_command(*switch, *state)),
        Commands::LimiterGear { gear } => Request::WriteSwitch(match gear {
            Gear::Low => SwitchCommand::ChargeCurrentLimiterGearLow,
            Gear::High => SwitchCommand::ChargeCurrentLimiterGearHigh,
        }),
        Commands::Mosfet { mosfet, state } => Request::WriteMosfet {
            mosfet: match mosfet {
                MosfetKind::Charge => MosfetType::Charge,
                MosfetKind::Discharge => MosfetType::Discharge,
            },
            state: match state {
                MosfetAction::Open => MosfetState::Open,
                MosfetAction::Close => MosfetState::Close,
            },
        },
        Commands::SetTime { at } => Request::WriteSystemDateTime(
            at.unwrap_or_else(|| chrono::Local::now().naive_local()),
        ),
        Commands::Reboot => Request::Shutdown,
    };

    let settings = load_settings(&cli)?;
    let sink = Arc::new(JsonLinesSink::new(std::io::stdout()));
    let poller = PaceBmsPoller::new(open(&cli, &settings)?, registry_for(&request, sink));
    poller
        .execute(&request)
        .await
        .with_context(|| format!("{} request failed", request.name()))?;
    Ok(())
}
