use crate::timer::TimerId;
use crate::upper::UpperTransportPdu;

/// An inbound segmented message currently being reassembled for one peer.
/// Detached from the peer and freed on completion or incomplete-timer
/// expiry; never more than one per peer (§3 invariants).
pub struct InFlightReassembly {
    pdu: UpperTransportPdu,
    ack_timer: Option<TimerId>,
    incomplete_timer: Option<TimerId>,
}

impl InFlightReassembly {
    pub(crate) fn new(pdu: UpperTransportPdu) -> Self {
        Self {
            pdu,
            ack_timer: None,
            incomplete_timer: None,
        }
    }

    pub fn pdu(&self) -> &UpperTransportPdu {
        &self.pdu
    }

    pub(crate) fn pdu_mut(&mut self) -> &mut UpperTransportPdu {
        &mut self.pdu
    }

    pub(crate) fn into_pdu(self) -> UpperTransportPdu {
        self.pdu
    }

    pub(crate) fn ack_timer(&self) -> Option<TimerId> {
        self.ack_timer
    }

    pub(crate) fn set_ack_timer(&mut self, handle: Option<TimerId>) {
        self.ack_timer = handle;
    }

    pub(crate) fn incomplete_timer(&self) -> Option<TimerId> {
        self.incomplete_timer
    }

    pub(crate) fn set_incomplete_timer(&mut self, handle: Option<TimerId>) {
        self.incomplete_timer = handle;
    }

    /// Copies `segment` into the assembled buffer at `seg_o * max_seg`,
    /// extending the buffer as needed, and marks the segment acknowledged.
    /// Idempotent: re-ingesting the same `seg_o` leaves `block_ack` and the
    /// bytes already written unchanged in effect (the same bytes are
    /// rewritten).
    pub(crate) fn ingest(&mut self, seg_o: u8, seg_n: u8, segment: &[u8], max_seg: usize) {
        let offset = seg_o as usize * max_seg;
        let needed = offset + segment.len();
        let buf = self.pdu.data_mut();
        if buf.len() < needed {
            // extend with zeros up to `needed`
            while buf.len() < needed {
                if buf.push(0).is_err() {
                    break;
                }
            }
        }
        for (i, b) in segment.iter().enumerate() {
            if let Some(slot) = buf.get_mut(offset + i) {
                *slot = *b;
            }
        }
        self.pdu.block_ack_mut().ack(seg_o);

        if seg_o == seg_n {
            let final_len = seg_n as usize * max_seg + segment.len();
            buf.truncate(final_len);
        }
    }

    pub(crate) fn is_complete(&self, seg_n: u8) -> bool {
        self.pdu.block_ack().is_complete_through(seg_n)
    }
}
