//! # PACE Frame Codec
//!
//! Builds request frames and parses/validates response frames of the PACE BMS
//! serial protocol. Frames are ASCII:
//!
//! ```text
//! SOI  VER  ADR  CID1  CID2/RTN  LENGTH  INFO        CHKSUM  EOI
//! '~'  2hex 2hex 2hex  2hex      4hex    LENID chars 4hex    '\r'
//! ```
//!
//! - `LENGTH` holds a 4-bit checksum (LCHKSUM) over the 12-bit INFO length (LENID).
//! - `CHKSUM` is the two's complement of the sum of every ASCII byte between SOI
//!   and CHKSUM.
//!
//! The envelope is parsed with `nom` ([`parse_frame`]); [`decode_frame`] adds the
//! length and checksum verification; [`FrameCodec`] adds the identity checks
//! (protocol version, address, chemistry, return code).
//!
//! ```rust
//! use pace_bms_rs::pace::{DeviceIdentity, FrameCodec, Request};
//!
//! let codec = FrameCodec::new(&DeviceIdentity::default());
//! let bytes = codec.encode(&Request::ReadAnalogInformation, 1).unwrap();
//! assert_eq!(&bytes[..], b"~25014642E00201FD30\r");
//! ```

use bytes::{BufMut, Bytes, BytesMut};
use nom::bytes::complete::tag;
use nom::IResult;

use crate::constants::{
    PACE_EOI, PACE_FRAME_OVERHEAD, PACE_MAX_INFO_LEN, PACE_RTN_OK, PACE_SOI,
};
use crate::error::DecodeError;
use crate::pace::identity::{DeviceIdentity, ProtocolProfile};
use crate::pace::request::Request;
use crate::util::hex::{encode_hex_upper, hex_payload, hex_u16, hex_u8};

const SOI_TAG: &[u8] = &[PACE_SOI];
const EOI_TAG: &[u8] = &[PACE_EOI];

/// A PACE frame with its INFO field hex-decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaceFrame {
    pub version: u8,
    pub address: u8,
    pub cid1: u8,
    /// CID2 on requests, RTN on responses
    pub command: u8,
    pub info: Vec<u8>,
}

/// The fixed-size part of a frame up to and including LENGTH.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub version: u8,
    pub address: u8,
    pub cid1: u8,
    pub command: u8,
    pub length: u16,
}

impl FrameHeader {
    /// Number of INFO characters announced by LENGTH.
    pub fn lenid(&self) -> usize {
        (self.length & 0x0FFF) as usize
    }

    /// Length checksum nibble carried by LENGTH.
    pub fn lchksum(&self) -> u8 {
        (self.length >> 12) as u8
    }
}

/// Parses SOI through LENGTH.
pub fn parse_header(input: &[u8]) -> IResult<&[u8], FrameHeader> {
    let (input, _) = tag(SOI_TAG)(input)?;
    let (input, version) = hex_u8(input)?;
    let (input, address) = hex_u8(input)?;
    let (input, cid1) = hex_u8(input)?;
    let (input, command) = hex_u8(input)?;
    let (input, length) = hex_u16(input)?;
    Ok((
        input,
        FrameHeader {
            version,
            address,
            cid1,
            command,
            length,
        },
    ))
}

/// Uses `nom` to parse a complete frame envelope. Checksums are not verified.
pub fn parse_frame(input: &[u8]) -> IResult<&[u8], (PaceFrame, u16)> {
    let (input, header) = parse_header(input)?;
    let (input, info) = hex_payload(header.lenid())(input)?;
    let (input, checksum) = hex_u16(input)?;
    let (input, _) = tag(EOI_TAG)(input)?;
    Ok((
        input,
        (
            PaceFrame {
                version: header.version,
                address: header.address,
                cid1: header.cid1,
                command: header.command,
                info,
            },
            checksum,
        ),
    ))
}

/// LCHKSUM for a LENID: two's complement (mod 16) of the sum of its three nibbles.
pub fn length_checksum(lenid: u16) -> u8 {
    let sum = (lenid & 0x0F) + ((lenid >> 4) & 0x0F) + ((lenid >> 8) & 0x0F);
    (sum.wrapping_neg() & 0x0F) as u8
}

/// CHKSUM over the ASCII bytes between SOI and CHKSUM.
pub fn frame_checksum(body: &[u8]) -> u16 {
    body.iter()
        .fold(0u16, |acc, &b| acc.wrapping_add(b as u16))
        .wrapping_neg()
}

/// Serialises a frame, computing LENGTH and CHKSUM.
pub fn pack_frame(frame: &PaceFrame) -> Result<Bytes, DecodeError> {
    let info = encode_hex_upper(&frame.info);
    if info.len() > PACE_MAX_INFO_LEN {
        return Err(DecodeError::Malformed(format!(
            "INFO of {} bytes does not fit the length field",
            frame.info.len()
        )));
    }
    let lenid = info.len() as u16;
    let length = ((length_checksum(lenid) as u16) << 12) | lenid;

    let mut out = BytesMut::with_capacity(PACE_FRAME_OVERHEAD + info.len());
    out.put_u8(PACE_SOI);
    out.put_slice(
        encode_hex_upper(&[frame.version, frame.address, frame.cid1, frame.command]).as_bytes(),
    );
    out.put_slice(encode_hex_upper(&length.to_be_bytes()).as_bytes());
    out.put_slice(info.as_bytes());
    let checksum = frame_checksum(&out[1..]);
    out.put_slice(encode_hex_upper(&checksum.to_be_bytes()).as_bytes());
    out.put_u8(PACE_EOI);
    Ok(out.freeze())
}

/// Parses and verifies a frame: size, markers, length checksum and frame checksum.
pub fn decode_frame(bytes: &[u8]) -> Result<PaceFrame, DecodeError> {
    if bytes.len() < PACE_FRAME_OVERHEAD {
        return Err(DecodeError::Truncated {
            expected: PACE_FRAME_OVERHEAD,
            actual: bytes.len(),
        });
    }
    if bytes[0] != PACE_SOI {
        return Err(DecodeError::Malformed(format!(
            "expected SOI '~', got 0x{:02X}",
            bytes[0]
        )));
    }
    let (_, header) = parse_header(bytes).map_err(|e| nom_error("header", e))?;
    if length_checksum(header.length & 0x0FFF) != header.lchksum() {
        return Err(DecodeError::LengthChecksumMismatch(header.length));
    }

    let expected = PACE_FRAME_OVERHEAD + header.lenid();
    if bytes.len() < expected {
        return Err(DecodeError::Truncated {
            expected,
            actual: bytes.len(),
        });
    }
    if bytes.len() > expected {
        return Err(DecodeError::Malformed(format!(
            "oversize frame: expected {expected} bytes, got {}",
            bytes.len()
        )));
    }
    if bytes[expected - 1] != PACE_EOI {
        return Err(DecodeError::Malformed("missing EOI".to_string()));
    }

    let (_, carried) =
        hex_u16(&bytes[expected - 5..expected - 1]).map_err(|e| nom_error("checksum", e))?;
    let calculated = frame_checksum(&bytes[1..expected - 5]);
    if carried != calculated {
        return Err(DecodeError::ChecksumMismatch {
            expected: carried,
            calculated,
        });
    }

    if header.lenid() % 2 != 0 {
        return Err(DecodeError::Malformed(format!(
            "odd INFO length {}",
            header.lenid()
        )));
    }
    let (_, (frame, _)) = parse_frame(bytes).map_err(|e| nom_error("INFO", e))?;
    Ok(frame)
}

fn nom_error(field: &str, err: nom::Err<nom::error::Error<&[u8]>>) -> DecodeError {
    match err {
        nom::Err::Incomplete(_) => DecodeError::Malformed(format!("incomplete {field}")),
        nom::Err::Error(e) | nom::Err::Failure(e) => {
            DecodeError::Malformed(format!("invalid {field} ({:?})", e.code))
        }
    }
}

/// A decoded, validated response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub version: u8,
    pub address: u8,
    pub cid1: u8,
    pub return_code: u8,
    pub info: Vec<u8>,
    /// The frame exactly as received
    pub raw: Bytes,
}

/// Encodes requests and decodes responses for one device identity.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    profile: ProtocolProfile,
    address: u8,
}

impl FrameCodec {
    pub fn new(identity: &DeviceIdentity) -> Self {
        FrameCodec {
            profile: identity.profile(),
            address: identity.address(),
        }
    }

    pub fn profile(&self) -> &ProtocolProfile {
        &self.profile
    }

    /// Address this codec expects in responses.
    pub fn address(&self) -> u8 {
        self.address
    }

    /// Builds the request frame sent to `address`.
    pub fn encode(&self, request: &Request, address: u8) -> Result<Bytes, DecodeError> {
        pack_frame(&PaceFrame {
            version: self.profile.version,
            address,
            cid1: self.profile.cid1,
            command: request.cid2(),
            info: request.payload(address)?,
        })
    }

    /// Decodes a response frame and checks it against the identity.
    pub fn decode(&self, bytes: &[u8]) -> Result<Response, DecodeError> {
        let frame = decode_frame(bytes)?;
        self.check_identity(&frame)?;
        if frame.command != PACE_RTN_OK {
            return Err(DecodeError::ErrorResponse {
                code: frame.command,
            });
        }
        Ok(Response {
            version: frame.version,
            address: frame.address,
            cid1: frame.cid1,
            return_code: frame.command,
            info: frame.info,
            raw: Bytes::copy_from_slice(bytes),
        })
    }

    /// Decodes a request addressed to this identity (device side).
    pub fn decode_request(&self, bytes: &[u8]) -> Result<Request, DecodeError> {
        let frame = decode_frame(bytes)?;
        self.check_identity(&frame)?;
        Request::from_parts(frame.command, &frame.info)
    }

    /// Builds a response frame (device side).
    pub fn encode_response(
        &self,
        address: u8,
        return_code: u8,
        info: &[u8],
    ) -> Result<Bytes, DecodeError> {
        pack_frame(&PaceFrame {
            version: self.profile.version,
            address,
            cid1: self.profile.cid1,
            command: return_code,
            info: info.to_vec(),
        })
    }

    fn check_identity(&self, frame: &PaceFrame) -> Result<(), DecodeError> {
        if frame.version != self.profile.version {
            return Err(DecodeError::VersionMismatch {
                expected: self.profile.version,
                actual: frame.version,
            });
        }
        if frame.address != self.address {
            return Err(DecodeError::AddressMismatch {
                expected: self.address,
                actual: frame.address,
            });
        }
        if frame.cid1 != self.profile.cid1 {
            return Err(DecodeError::ChemistryMismatch {
                expected: self.profile.cid1,
                actual: frame.cid1,
            });
        }
        Ok(())
    }
}
