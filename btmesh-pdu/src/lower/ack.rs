use crate::lower::control::{ControlOpcode, UnsegmentedLowerControlPDU};
use crate::System;
use btmesh_common::{InsufficientBuffer, ParseError, SeqZero};
use heapless::Vec;

/// A Segment Acknowledgment: the 7-byte unsegmented control message used to
/// acknowledge (or abort) a segmented transfer. OBO is always `false` here —
/// this layer never models a Friend relaying acks on behalf of an LPN.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SegmentAcknowledgment {
    obo: bool,
    seq_zero: SeqZero,
    block_ack: u32,
}

impl SegmentAcknowledgment {
    pub fn new(obo: bool, seq_zero: SeqZero, block_ack: u32) -> Self {
        Self {
            obo,
            seq_zero,
            block_ack,
        }
    }

    pub fn obo(&self) -> bool {
        self.obo
    }

    pub fn seq_zero(&self) -> SeqZero {
        self.seq_zero
    }

    pub fn block_ack(&self) -> u32 {
        self.block_ack
    }

    /// Parses the 6-byte parameters of an opcode-0 unsegmented control PDU
    /// (i.e. everything after body[0]).
    pub fn parse(parameters: &[u8]) -> Result<Self, ParseError> {
        if parameters.len() < 6 {
            return Err(ParseError::InvalidLength);
        }
        let word = u16::from_be_bytes([parameters[0], parameters[1]]);
        let obo = word & 0x8000 != 0;
        let seq_zero = SeqZero::parse((word >> 2) & 0x1FFF)?;
        let block_ack = u32::from_be_bytes([
            parameters[2],
            parameters[3],
            parameters[4],
            parameters[5],
        ]);
        Ok(Self {
            obo,
            seq_zero,
            block_ack,
        })
    }

    pub fn try_from_control<S: System>(
        pdu: &UnsegmentedLowerControlPDU<S>,
    ) -> Result<Self, ParseError> {
        if !pdu.opcode().is_segment_acknowledgment() {
            return Err(ParseError::InvalidValue);
        }
        Self::parse(pdu.parameters())
    }

    /// Emits the full 7-byte wire message (body[0] = 0x00 included).
    pub fn emit<const N: usize>(&self, xmit: &mut Vec<u8, N>) -> Result<(), InsufficientBuffer> {
        xmit.push(ControlOpcode::SEGMENT_ACKNOWLEDGMENT.value())
            .map_err(|_| InsufficientBuffer)?;
        let word: u16 = ((self.obo as u16) << 15) | ((self.seq_zero.value() & 0x1FFF) << 2);
        xmit.extend_from_slice(&word.to_be_bytes())?;
        xmit.extend_from_slice(&self.block_ack.to_be_bytes())?;
        Ok(())
    }
}
