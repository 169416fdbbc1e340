//! # ASCII Hex Field Utilities
//!
//! PACE frames carry every numeric field as upper-case ASCII hex. This module
//! provides the `nom` parsers used to read those fields and small helpers for
//! rendering frames in log output.
//!
//! ```rust
//! use pace_bms_rs::util::hex::{hex_u8, hex_u16};
//!
//! let (rest, ver) = hex_u8(b"25014642").unwrap();
//! assert_eq!(ver, 0x25);
//! let (_, word) = hex_u16(rest).unwrap();
//! assert_eq!(word, 0x0146);
//! ```

use nom::bytes::complete::{take, take_while_m_n};
use nom::combinator::{map, map_res};
use nom::IResult;

/// Parses exactly `2 * N` hex digits into `N` bytes.
pub fn hex_array<const N: usize>(input: &[u8]) -> IResult<&[u8], [u8; N]> {
    map_res(
        take_while_m_n(2 * N, 2 * N, |c: u8| c.is_ascii_hexdigit()),
        |digits: &[u8]| {
            let mut out = [0u8; N];
            hex::decode_to_slice(digits, &mut out).map(|_| out)
        },
    )(input)
}

/// Parses a two-digit hex byte.
pub fn hex_u8(input: &[u8]) -> IResult<&[u8], u8> {
    map(hex_array::<1>, |[byte]: [u8; 1]| byte)(input)
}

/// Parses a four-digit big-endian hex word.
pub fn hex_u16(input: &[u8]) -> IResult<&[u8], u16> {
    map(hex_array::<2>, u16::from_be_bytes)(input)
}

/// Takes `chars` ASCII characters and decodes them as hex bytes.
pub fn hex_payload(chars: usize) -> impl Fn(&[u8]) -> IResult<&[u8], Vec<u8>> {
    move |input: &[u8]| map_res(take(chars), |ascii: &[u8]| hex::decode(ascii))(input)
}

/// Upper-case hex encoding, the only form a PACE device accepts.
pub fn encode_hex_upper(data: &[u8]) -> String {
    hex::encode_upper(data)
}

/// Renders an ASCII frame for logs, escaping control characters (`\r`).
pub fn format_frame_ascii(frame: &[u8]) -> String {
    frame.iter().flat_map(|b| std::ascii::escape_default(*b)).map(char::from).collect()
}
