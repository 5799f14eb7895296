use crate::network::SendToken;
use crate::timer::TimerId;
use crate::upper::UpperTransportPdu;
use btmesh_pdu::lower::BlockAck;

/// Default retry budget for a unicast segmented send before `Failed` is
/// surfaced (§9 open question #2: the source retransmits indefinitely on
/// unicast; this layer bounds it explicitly instead).
pub const DEFAULT_UNICAST_RETRIES: u8 = 4;

/// The single globally-active outbound segmented message
/// (`lower_transport_outgoing_pdu`, §3/§5). Owns the pre-allocated send
/// cursor; at most one of these exists at a time.
pub struct OutgoingTransportPdu {
    pdu: UpperTransportPdu,
    next_seg_o: u8,
    retries_left: u8,
    tx_ack_timer: Option<TimerId>,
    send_token: Option<SendToken>,
}

impl OutgoingTransportPdu {
    pub(crate) fn new(mut pdu: UpperTransportPdu, retries: u8) -> Self {
        let seg_n = pdu.seg_n();
        *pdu.block_ack_mut() = BlockAck::new(BlockAck::mask_through(seg_n));
        Self {
            pdu,
            next_seg_o: 0,
            retries_left: retries,
            tx_ack_timer: None,
            send_token: None,
        }
    }

    pub fn pdu(&self) -> &UpperTransportPdu {
        &self.pdu
    }

    pub(crate) fn into_pdu(self) -> UpperTransportPdu {
        self.pdu
    }

    pub fn seg_n(&self) -> u8 {
        self.pdu.seg_n()
    }

    pub(crate) fn reset_cursor(&mut self) {
        self.next_seg_o = 0;
    }

    /// Advances past segments already acknowledged and returns the next
    /// segment index still pending, or `None` once the cursor has passed
    /// `seg_n` for this pass.
    pub(crate) fn advance_cursor(&mut self) -> Option<u8> {
        let seg_n = self.seg_n();
        while self.next_seg_o <= seg_n && !self.pdu.block_ack().is_acked(self.next_seg_o) {
            self.next_seg_o += 1;
        }
        if self.next_seg_o <= seg_n {
            let seg_o = self.next_seg_o;
            self.next_seg_o += 1;
            Some(seg_o)
        } else {
            None
        }
    }

    /// Segment `seg_o`'s payload slice: `max_seg` bytes, or the remainder
    /// for the final segment.
    pub(crate) fn segment_bytes(&self, seg_o: u8, max_seg: usize) -> &[u8] {
        let offset = seg_o as usize * max_seg;
        let end = (offset + max_seg).min(self.pdu.data().len());
        &self.pdu.data()[offset..end]
    }

    /// Folds a remote Segment Acknowledgment's bitmap into the outstanding
    /// set (AND-NOT, §4.4); returns `true` once every segment is
    /// acknowledged.
    pub(crate) fn apply_remote_ack(&mut self, received: u32) -> bool {
        self.pdu.block_ack_mut().clear_acked(received);
        self.pdu.block_ack().is_empty()
    }

    pub(crate) fn ack_timer(&self) -> Option<TimerId> {
        self.tx_ack_timer
    }

    pub(crate) fn set_ack_timer(&mut self, handle: Option<TimerId>) {
        self.tx_ack_timer = handle;
    }

    /// The token of the segment send currently awaiting a `SENT` completion,
    /// if any. Used by `network_pdu_sent` to tell "my segment completed"
    /// apart from an unrelated Segment Acknowledgment's completion landing
    /// on the same callback.
    pub(crate) fn send_token(&self) -> Option<SendToken> {
        self.send_token
    }

    pub(crate) fn set_send_token(&mut self, token: Option<SendToken>) {
        self.send_token = token;
    }

    pub(crate) fn retries_left(&self) -> u8 {
        self.retries_left
    }

    pub(crate) fn decrement_retry(&mut self) -> bool {
        if self.retries_left == 0 {
            false
        } else {
            self.retries_left -= 1;
            true
        }
    }
}
