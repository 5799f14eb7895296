use btmesh_common::address::{Address, UnicastAddress};
use btmesh_common::mic::SzMic;
use btmesh_common::{Aid, Ctl, InsufficientBuffer, Ivi, Nid, Seq, SeqZero, Ttl};
use btmesh_pdu::lower::control::ControlOpcode;
use btmesh_pdu::lower::BlockAck;
use heapless::Vec;

/// Maximum assembled payload: 32 segments * 12 bytes (access is the larger
/// of the two segment sizes).
pub const MAX_TRANSPORT_PDU_LEN: usize = 32 * 12;

/// Snapshot of the network header a segmented message is carried under.
/// For inbound messages this is captured at reassembly start with bytes
/// [2..5) overwritten by the reconstructed SeqAuth (not the per-segment
/// SEQ) since the Upper layer's nonce derives from SeqAuth. For outbound
/// messages it is supplied by the caller and `seq` already *is* the SeqAuth.
#[derive(Copy, Clone, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NetworkHeader {
    pub netkey_index: u16,
    pub ivi: Ivi,
    pub nid: Nid,
    pub ctl: Ctl,
    pub ttl: Ttl,
    pub seq_auth: Seq,
    pub src: UnicastAddress,
    pub dst: Address,
}

/// The "Transport PDU" of the data model: owned by this layer for segmented
/// traffic, whether being reassembled (inbound) or segmented (outbound).
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct UpperTransportPdu {
    header: NetworkHeader,
    akf_aid: Option<Aid>,
    szmic: SzMic,
    seq_zero: SeqZero,
    data: Vec<u8, MAX_TRANSPORT_PDU_LEN>,
    block_ack: BlockAck,
    control_opcode: Option<ControlOpcode>,
}

impl UpperTransportPdu {
    pub fn new(
        header: NetworkHeader,
        akf_aid: Option<Aid>,
        szmic: SzMic,
        data: &[u8],
    ) -> Result<Self, InsufficientBuffer> {
        let seq_zero = SeqZero::from(header.seq_auth);
        Ok(Self {
            header,
            akf_aid,
            szmic,
            seq_zero,
            data: Vec::from_slice(data)?,
            block_ack: BlockAck::default(),
            control_opcode: None,
        })
    }

    pub(crate) fn empty(header: NetworkHeader, akf_aid: Option<Aid>, szmic: SzMic, seq_zero: SeqZero) -> Self {
        Self {
            header,
            akf_aid,
            szmic,
            seq_zero,
            data: Vec::new(),
            block_ack: BlockAck::default(),
            control_opcode: None,
        }
    }

    /// Only meaningful when `header().ctl` is `Control`: the opcode carried
    /// by each outbound segment in place of `akf_aid` (§4.4's body[0] formula
    /// is shared between access and control; which field it holds depends on
    /// CTL). Unused for inbound reassembly, which treats the segment header
    /// uniformly and leaves opcode reconstruction to Upper Transport.
    pub fn with_control_opcode(mut self, opcode: ControlOpcode) -> Self {
        self.control_opcode = Some(opcode);
        self
    }

    pub fn control_opcode(&self) -> Option<ControlOpcode> {
        self.control_opcode
    }

    pub fn header(&self) -> &NetworkHeader {
        &self.header
    }

    pub fn akf_aid(&self) -> Option<Aid> {
        self.akf_aid
    }

    pub fn szmic(&self) -> SzMic {
        self.szmic
    }

    pub fn seq_zero(&self) -> SeqZero {
        self.seq_zero
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub(crate) fn data_mut(&mut self) -> &mut Vec<u8, MAX_TRANSPORT_PDU_LEN> {
        &mut self.data
    }

    pub fn block_ack(&self) -> BlockAck {
        self.block_ack
    }

    pub(crate) fn block_ack_mut(&mut self) -> &mut BlockAck {
        &mut self.block_ack
    }

    pub fn seg_n(&self) -> u8 {
        let max_seg = self.header.ctl.max_segment_len();
        let len = self.data.len().max(1);
        (((len - 1) / max_seg) as u8).min(31)
    }
}

/// Outcome of an outbound segmented (or unsegmented) send, surfaced to
/// Upper Transport via `UpperTransportHandler::sent`.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SendOutcome {
    Success,
    AbortedByRemote,
    Failed,
}

/// Upper Transport's callback surface: received PDUs and send completions.
pub trait UpperTransportHandler {
    fn received(&mut self, pdu: UpperTransportPdu);
    fn unsegmented_received(&mut self, src: UnicastAddress, akf_aid: Option<Aid>, data: &[u8]);
    fn control_received(&mut self, src: UnicastAddress, opcode: u8, parameters: &[u8]);
    fn sent(&mut self, outcome: SendOutcome);
}
