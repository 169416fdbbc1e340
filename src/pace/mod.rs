pub mod frame;
pub mod identity;
pub mod request;
pub mod serial;
pub mod serial_mock;
pub mod transport;

pub use frame::{decode_frame, pack_frame, parse_frame, FrameCodec, PaceFrame, Response};
pub use identity::{CommandFamily, DeviceIdentity, ProtocolProfile};
pub use request::{MosfetState, MosfetType, Request, SwitchCommand};
pub use serial::{FlowControl, FlowControlPin, SerialConfig, SerialLine};
pub use serial_mock::MockPaceBms;
pub use transport::{PaceTransport, TransportConfig};
