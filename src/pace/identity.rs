//! Device identity and the protocol profile derived from it.
//!
//! A [`DeviceIdentity`] is fixed for the lifetime of a device instance. The codec
//! never inspects the raw identity per frame; it resolves a [`ProtocolProfile`]
//! once and uses that for every encode/decode.

use crate::constants::{
    PACE_ADDRESS_MAX, PACE_CID1_LITHIUM_IRON, PACE_COMMANDSET_MAX, PACE_COMMANDSET_MIN,
    PACE_DEFAULT_ADDRESS, PACE_DEFAULT_COMMANDSET,
};
use crate::error::ConfigError;
use crate::pace::request::Request;

/// Immutable description of the addressed pack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    address: u8,
    command_set: u8,
    variant: Option<String>,
    version: Option<u8>,
    chemistry: Option<u8>,
}

impl DeviceIdentity {
    /// Validates and builds an identity. Out-of-range values are configuration errors.
    pub fn new(
        address: u8,
        command_set: u8,
        variant: Option<String>,
        version: Option<u8>,
        chemistry: Option<u8>,
    ) -> Result<Self, ConfigError> {
        if address > PACE_ADDRESS_MAX {
            return Err(ConfigError::OutOfRange {
                option: "address",
                value: address as u64,
                min: 0,
                max: PACE_ADDRESS_MAX as u64,
            });
        }
        if !(PACE_COMMANDSET_MIN..=PACE_COMMANDSET_MAX).contains(&command_set) {
            return Err(ConfigError::OutOfRange {
                option: "protocol_commandset",
                value: command_set as u64,
                min: PACE_COMMANDSET_MIN as u64,
                max: PACE_COMMANDSET_MAX as u64,
            });
        }
        Ok(DeviceIdentity {
            address,
            command_set,
            variant,
            version,
            chemistry,
        })
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn command_set(&self) -> u8 {
        self.command_set
    }

    pub fn variant(&self) -> Option<&str> {
        self.variant.as_deref()
    }

    pub fn version(&self) -> Option<u8> {
        self.version
    }

    pub fn chemistry(&self) -> Option<u8> {
        self.chemistry
    }

    /// Resolves the codec strategy for this identity.
    pub fn profile(&self) -> ProtocolProfile {
        ProtocolProfile::resolve(self)
    }
}

impl Default for DeviceIdentity {
    fn default() -> Self {
        DeviceIdentity {
            address: PACE_DEFAULT_ADDRESS,
            command_set: PACE_DEFAULT_COMMANDSET,
            variant: None,
            version: None,
            chemistry: None,
        }
    }
}

/// Which requests a command set understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandFamily {
    /// Command set 0x25: the full PACE command table.
    Pace,
    /// Command sets 0x20-0x24: only the two standard analog/status reads.
    Standard,
}

/// Codec behaviour resolved once from a [`DeviceIdentity`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolProfile {
    /// Configured command set, kept for diagnostics
    pub command_set: u8,
    /// VER byte written to and expected in every frame
    pub version: u8,
    /// CID1 byte written to and expected in every frame
    pub cid1: u8,
    pub family: CommandFamily,
}

impl ProtocolProfile {
    fn resolve(identity: &DeviceIdentity) -> Self {
        let family = if identity.command_set == 0x25 {
            CommandFamily::Pace
        } else {
            CommandFamily::Standard
        };
        ProtocolProfile {
            command_set: identity.command_set,
            version: identity.version.unwrap_or(identity.command_set),
            cid1: identity.chemistry.unwrap_or(PACE_CID1_LITHIUM_IRON),
            family,
        }
    }

    /// Whether the device is expected to understand `request`.
    pub fn supports(&self, request: &Request) -> bool {
        match self.family {
            CommandFamily::Pace => true,
            CommandFamily::Standard => matches!(
                request,
                Request::ReadAnalogInformation | Request::ReadStatusInformation
            ),
        }
    }
}
