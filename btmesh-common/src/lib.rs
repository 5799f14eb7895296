#![cfg_attr(not(test), no_std)]

use core::array::TryFromSliceError;
use core::ops::{Add, BitAnd, Sub};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

pub mod address;
pub mod mic;

/// A `heapless` capacity was too small for the data being written.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct InsufficientBuffer;

impl From<()> for InsufficientBuffer {
    fn from(_: ()) -> Self {
        InsufficientBuffer
    }
}

impl From<u8> for InsufficientBuffer {
    fn from(_: u8) -> Self {
        InsufficientBuffer
    }
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ParseError {
    InvalidPDUFormat,
    InvalidValue,
    InvalidLength,
    InsufficientBuffer,
}

impl From<()> for ParseError {
    fn from(_: ()) -> Self {
        Self::InsufficientBuffer
    }
}

impl From<InsufficientBuffer> for ParseError {
    fn from(_: InsufficientBuffer) -> Self {
        Self::InsufficientBuffer
    }
}

impl From<TryFromSliceError> for ParseError {
    fn from(_: TryFromSliceError) -> Self {
        Self::InvalidLength
    }
}

/// IV Index, as carried by the network layer and consulted when reconstructing
/// the nonce material a segmented message's SeqAuth feeds into. Lower transport
/// treats it as opaque except for the single low bit (`Ivi`) present in every
/// network header.
#[derive(Copy, Clone, Default, PartialEq, Eq, Debug, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct IvIndex(u32);

#[cfg(feature = "defmt")]
impl ::defmt::Format for IvIndex {
    fn format(&self, fmt: ::defmt::Formatter) {
        ::defmt::write!(fmt, "{}", self.0)
    }
}

impl IvIndex {
    pub fn new(iv_index: u32) -> Self {
        Self(iv_index)
    }

    pub fn value(&self) -> u32 {
        self.0
    }
}

/// The single-bit IV Index Indicator carried in every network header.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Ivi {
    Zero,
    One,
}

impl Ivi {
    pub fn parse(ivi: u8) -> Result<Ivi, ParseError> {
        match ivi {
            0 => Ok(Ivi::Zero),
            1 => Ok(Ivi::One),
            _ => Err(ParseError::InvalidValue),
        }
    }
}

impl From<Ivi> for u8 {
    fn from(ivi: Ivi) -> Self {
        match ivi {
            Ivi::Zero => 0,
            Ivi::One => 1,
        }
    }
}

/// Time-to-live. Drives the acknowledgment-timer formulas (`150/200 + 50*ttl`).
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Ttl(u8);

impl Ttl {
    pub fn new(ttl: u8) -> Self {
        Self(ttl & 0x7F)
    }

    pub fn parse(ttl: u8) -> Result<Self, ParseError> {
        Ok(Self(ttl & 0x7F))
    }

    pub fn value(&self) -> u8 {
        self.0
    }

    pub fn decr(&self) -> Self {
        if self.0 > 1 {
            Self(self.0 - 1)
        } else {
            Self(0)
        }
    }
}

pub struct SeqRolloverError;

/// A 24-bit network sequence number.
#[derive(Default, Copy, Clone, Eq, PartialEq, PartialOrd, Ord, Debug, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Seq(u32);

impl Add<u32> for Seq {
    type Output = Result<Seq, SeqRolloverError>;

    fn add(self, rhs: u32) -> Self::Output {
        let val = self.0 + rhs;
        if val > 0x00FF_FFFF {
            Err(SeqRolloverError)
        } else {
            Ok(Self(val))
        }
    }
}

impl Seq {
    pub fn new(seq: u32) -> Self {
        Self(seq & 0x00FF_FFFF)
    }

    pub fn parse(data: &[u8; 3]) -> Self {
        Self(u32::from_be_bytes([0, data[0], data[1], data[2]]))
    }

    pub fn to_be_bytes(&self) -> [u8; 3] {
        let b = self.0.to_be_bytes();
        [b[1], b[2], b[3]]
    }

    pub fn value(&self) -> u32 {
        self.0
    }
}

impl From<Seq> for SeqZero {
    fn from(seq: Seq) -> Self {
        Self((seq.0 & 0x1FFF) as u16)
    }
}

impl From<Seq> for SeqAuth {
    fn from(seq: Seq) -> Self {
        SeqAuth(seq.0)
    }
}

/// The low 13 bits of a message's SeqAuth, carried in every segment.
#[derive(Copy, Clone, Eq, PartialEq, PartialOrd, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SeqZero(u16);

impl SeqZero {
    pub fn new(seq_zero: u16) -> Self {
        Self(seq_zero & 0x1FFF)
    }

    pub fn parse(data: u16) -> Result<Self, ParseError> {
        if data > 0x1FFF {
            Err(ParseError::InvalidValue)
        } else {
            Ok(Self(data))
        }
    }

    pub fn value(&self) -> u16 {
        self.0
    }
}

impl BitAnd<u16> for SeqZero {
    type Output = u16;

    fn bitand(self, rhs: u16) -> Self::Output {
        self.0 & rhs
    }
}

/// The 24-bit SEQ of the first segment of a segmented message: the freshness
/// reference and nonce source the upper layer decrypts against.
#[derive(Copy, Clone, Eq, PartialEq, PartialOrd, Ord, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SeqAuth(u32);

impl SeqAuth {
    pub fn new(seq_auth: u32) -> Self {
        Self(seq_auth & 0x00FF_FFFF)
    }

    pub fn value(&self) -> u32 {
        self.0
    }

    pub fn seq_zero(&self) -> SeqZero {
        SeqZero((self.0 & 0x1FFF) as u16)
    }

    /// Reconstructs the SeqAuth of a segment from the containing network PDU's
    /// SEQ and the segment's 13-bit `seq_zero`, handling the wrap at the
    /// 13-bit boundary (RFC-faithful to the Bluetooth Mesh Lower Transport
    /// reassembly algorithm: candidate must never exceed `net_seq`).
    pub fn reconstruct(net_seq: Seq, seq_zero: SeqZero) -> Self {
        let net_seq = net_seq.value();
        let mut candidate = (net_seq & 0x00FF_E000) | seq_zero.value() as u32;
        if candidate > net_seq {
            candidate = candidate.wrapping_sub(0x2000);
        }
        Self(candidate & 0x00FF_FFFF)
    }
}

impl From<SeqAuth> for Seq {
    fn from(seq_auth: SeqAuth) -> Self {
        Seq::new(seq_auth.0)
    }
}

/// Network-header CTL bit: access (application-encrypted) vs. control
/// (no application encryption, 64-bit NetMIC, 8-byte segments).
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Ctl {
    Access,
    Control,
}

impl Ctl {
    pub fn parse(ctl: u8) -> Result<Ctl, ParseError> {
        match ctl {
            0 => Ok(Ctl::Access),
            1 => Ok(Ctl::Control),
            _ => Err(ParseError::InvalidValue),
        }
    }

    pub fn netmic_size(&self) -> usize {
        match self {
            Ctl::Access => 4,
            Ctl::Control => 8,
        }
    }

    /// Maximum payload octets per segment: 12 for access, 8 for control.
    pub fn max_segment_len(&self) -> usize {
        match self {
            Ctl::Access => 12,
            Ctl::Control => 8,
        }
    }
}

/// Network ID: the low 7 bits of network header byte 0, identifying which
/// network key decrypted this PDU.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Nid(u8);

impl Nid {
    pub fn new(nid: u8) -> Self {
        Self(nid & 0x7F)
    }

    pub fn parse(data: u8) -> Result<Self, ParseError> {
        Ok(Self(data & 0x7F))
    }
}

impl From<Nid> for u8 {
    fn from(nid: Nid) -> Self {
        nid.0
    }
}

impl From<u8> for Nid {
    fn from(val: u8) -> Self {
        Self(val & 0x7F)
    }
}

/// Application-key flag (AKF) + application-key identifier (AID), the low
/// 7 bits of an access message's lower-transport body[0].
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Aid(u8);

impl Aid {
    /// `akf_aid` is the full low-7-bit field (AKF bit + 6-bit AID), as read
    /// from body[0] & 0x7F. Returns `None` when AKF is clear (device-key
    /// encrypted message; the low 6 bits are then meaningless RFU).
    pub fn parse(akf_aid: u8) -> Option<Self> {
        if akf_aid & 0b0100_0000 != 0 {
            Some(Self(akf_aid & 0b0011_1111))
        } else {
            None
        }
    }

    pub fn emit(&self) -> u8 {
        0b0100_0000 | (self.0 & 0b0011_1111)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seq_auth_no_wrap() {
        let net_seq = Seq::new(0x001234);
        let seq_zero = SeqZero::new(0x0234);
        assert_eq!(SeqAuth::reconstruct(net_seq, seq_zero).value(), 0x001234);
    }

    #[test]
    fn seq_auth_wraps_when_candidate_overshoots() {
        // net_seq's low 13 bits are smaller than seq_zero: candidate built from
        // net_seq's high bits would exceed net_seq, so it must wrap back 0x2000.
        let net_seq = Seq::new(0x002001);
        let seq_zero = SeqZero::new(0x1FFE);
        let reconstructed = SeqAuth::reconstruct(net_seq, seq_zero);
        assert!(reconstructed.value() <= net_seq.value());
        assert_eq!(reconstructed.value(), 0x0FFE);
    }

    #[test]
    fn aid_parse_roundtrip() {
        assert_eq!(Aid::parse(0x00), None);
        let aid = Aid::parse(0b0101_0101).unwrap();
        assert_eq!(aid.emit(), 0b0101_0101);
    }

    #[test]
    fn seq_to_be_bytes_roundtrip() {
        let seq = Seq::new(0x00AABBCC);
        assert_eq!(seq.to_be_bytes(), [0xAA, 0xBB, 0xCC]);
        assert_eq!(Seq::parse(&[0xAA, 0xBB, 0xCC]), seq);
    }
}
