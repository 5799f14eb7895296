use crate::peer::PeerRegistry;
use crate::queue::Fifo;
use crate::reassembly::InFlightReassembly;
use crate::segmentation::{OutgoingTransportPdu, DEFAULT_UNICAST_RETRIES};
use crate::sequence::SequenceAllocator;
use crate::timer::{TimerEvent, TimerSource};
use crate::upper::{NetworkHeader, SendOutcome, UpperTransportHandler, UpperTransportPdu};
use crate::network::{NetworkLayer, SendToken};

use btmesh_common::address::{Address, UnicastAddress};
use btmesh_common::mic::SzMic;
use btmesh_common::{Aid, Ctl, Ivi, Nid, Seq, SeqAuth, SeqZero, Ttl};
use btmesh_pdu::lower::access::SegmentedLowerAccessPDU;
use btmesh_pdu::lower::ack::SegmentAcknowledgment;
use btmesh_pdu::lower::control::{ControlOpcode, SegmentedLowerControlPDU};
use btmesh_pdu::lower::{LowerPdu, SegmentedLowerPdu, UnsegmentedLowerPdu};
use btmesh_pdu::network::NetworkPdu;
use heapless::Vec;

/// Retry budget used for group/virtual sends (§4.4 literal `retry_count = 2`).
const GROUP_RETRIES: u8 = 2;

const INGRESS_DEPTH: usize = 8;
const EGRESS_DEPTH: usize = 4;

/// An item waiting in the egress queue: either a ready-to-send network PDU
/// (unsegmented) or a transport PDU awaiting segmentation.
pub enum EgressItem {
    Unsegmented(NetworkPdu),
    Segmented(UpperTransportPdu),
}

/// Structured snapshot returned by [`LowerTransport::dump`].
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LowerTransportDump {
    pub primary_element_address: UnicastAddress,
    pub seq: Seq,
    pub peer_count: usize,
    pub outgoing_active: bool,
    pub ingress_depth: usize,
    pub egress_depth: usize,
}

/// The Lower Transport Layer instance: owns every piece of state named in
/// §3/§5 as a field rather than a process global. `N` bounds the peer table;
/// `NW`/`UT`/`TS` are the Network layer, Upper Transport handler and timer
/// facility this node is wired to.
pub struct LowerTransport<NW, UT, TS, const N: usize = 4> {
    primary_element_address: UnicastAddress,
    sequence: SequenceAllocator,
    peers: PeerRegistry<N>,
    outgoing: Option<OutgoingTransportPdu>,
    ingress: Fifo<NetworkPdu, INGRESS_DEPTH>,
    egress: Fifo<EgressItem, EGRESS_DEPTH>,
    unicast_retries: u8,
    next_send_token: u32,
    network: NW,
    upper: UT,
    timer: TS,
}

impl<NW, UT, TS, const N: usize> LowerTransport<NW, UT, TS, N>
where
    NW: NetworkLayer,
    UT: UpperTransportHandler,
    TS: TimerSource,
{
    pub fn new(network: NW, upper: UT, timer: TS) -> Self {
        Self {
            primary_element_address: UnicastAddress::new(1).unwrap(),
            sequence: SequenceAllocator::default(),
            peers: PeerRegistry::new(),
            outgoing: None,
            ingress: Fifo::new(),
            egress: Fifo::new(),
            unicast_retries: DEFAULT_UNICAST_RETRIES,
            next_send_token: 0,
            network,
            upper,
            timer,
        }
    }

    /// Allocates a fresh token identifying the next PDU handed to
    /// `NetworkLayer::send`, so its eventual `SENT` completion can be told
    /// apart from any other in-flight send.
    fn alloc_send_token(&mut self) -> SendToken {
        let token = SendToken(self.next_send_token);
        self.next_send_token = self.next_send_token.wrapping_add(1);
        token
    }

    // ---- Public API (§6) ----------------------------------------------

    /// Resets every piece of layer state: peer table, queues, the active
    /// outgoing send. Does not touch the sequence counter (persisted by the
    /// host) or the wired-in collaborators.
    pub fn init(&mut self) {
        self.reset();
    }

    pub fn reset(&mut self) {
        self.peers.reset();
        self.outgoing = None;
        self.ingress = Fifo::new();
        self.egress = Fifo::new();
    }

    pub fn set_primary_element_address(&mut self, address: UnicastAddress) {
        self.primary_element_address = address;
    }

    pub fn primary_element_address(&self) -> UnicastAddress {
        self.primary_element_address
    }

    pub fn peek_seq(&self) -> Seq {
        self.sequence.peek()
    }

    pub fn set_seq(&mut self, seq: Seq) {
        self.sequence.set(seq);
    }

    /// Number of peer contexts currently tracked.
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// A structured snapshot of layer state for diagnostics (§6 `dump()`):
    /// derives `Format`/`Debug` rather than printing, matching the donor
    /// workspace's convention of deriving a diagnostic type instead of
    /// writing a bespoke text dump.
    pub fn dump(&self) -> LowerTransportDump {
        LowerTransportDump {
            primary_element_address: self.primary_element_address,
            seq: self.sequence.peek(),
            peer_count: self.peers.len(),
            outgoing_active: self.outgoing.is_some(),
            ingress_depth: self.ingress.len(),
            egress_depth: self.egress.len(),
        }
    }

    pub fn set_unicast_retries(&mut self, retries: u8) {
        self.unicast_retries = retries;
    }

    /// Queues a segmented send. Only one segmented message may be in flight
    /// at a time; callers should wait for `UpperTransportHandler::sent`
    /// before submitting another if `egress` capacity is a concern.
    pub fn send_segmented(&mut self, pdu: UpperTransportPdu) -> Result<(), UpperTransportPdu> {
        self.egress
            .push_back(EgressItem::Segmented(pdu))
            .map_err(|item| match item {
                EgressItem::Segmented(pdu) => pdu,
                _ => unreachable!(),
            })?;
        self.poll();
        Ok(())
    }

    pub fn send_unsegmented(&mut self, pdu: NetworkPdu) -> Result<(), NetworkPdu> {
        self.egress
            .push_back(EgressItem::Unsegmented(pdu))
            .map_err(|item| match item {
                EgressItem::Unsegmented(pdu) => pdu,
                _ => unreachable!(),
            })?;
        self.poll();
        Ok(())
    }

    /// Hands a freshly-received cleartext network PDU to the layer.
    pub fn network_pdu_received(&mut self, pdu: NetworkPdu) -> Result<(), NetworkPdu> {
        self.ingress.push_back(pdu)?;
        self.poll();
        Ok(())
    }

    /// The Network layer's completion callback, carrying the token of
    /// whichever PDU finished sending. Only advances the active outgoing
    /// message's cursor if `token` matches the segment it is currently
    /// waiting on — a Segment Acknowledgment's own completion (dispatched
    /// fire-and-forget from the reassembly engine, §4.5) can interleave
    /// with an in-flight segmented send and must not be mistaken for it.
    pub fn network_pdu_sent(&mut self, token: SendToken) {
        let is_current_segment = self
            .outgoing
            .as_ref()
            .and_then(|o| o.send_token())
            .map(|expected| expected == token)
            .unwrap_or(false);
        if is_current_segment {
            self.send_next_segment();
        }
        self.poll();
    }

    pub fn timer_fired(&mut self, event: TimerEvent) {
        match event {
            TimerEvent::AckTimeout(src) => self.on_ack_timeout(src),
            TimerEvent::IncompleteTimeout(src) => self.on_incomplete_timeout(src),
            TimerEvent::TxAckTimeout => self.on_tx_ack_timeout(),
        }
        self.poll();
    }

    // ---- Dispatcher run loop (§4.7) ------------------------------------

    /// Drains the ingress queue, then starts the next outbound item if none
    /// is currently in flight. Non-reentrant: callers invoke it once per
    /// event (PDU in, PDU sent, timer fire) and let it run to quiescence.
    pub fn poll(&mut self) {
        while let Some(pdu) = self.ingress.pop_front() {
            self.handle_inbound(pdu);
        }
        if self.outgoing.is_none() {
            if let Some(item) = self.egress.pop_front() {
                self.begin_egress(item);
            }
        }
    }

    fn begin_egress(&mut self, item: EgressItem) {
        match item {
            EgressItem::Unsegmented(pdu) => {
                let token = self.alloc_send_token();
                self.network.send(pdu, token);
            }
            EgressItem::Segmented(pdu) => {
                let retries = if pdu.header().dst.is_unicast() {
                    self.unicast_retries
                } else {
                    GROUP_RETRIES
                };
                self.outgoing = Some(OutgoingTransportPdu::new(pdu, retries));
                self.send_next_segment();
            }
        }
    }

    // ---- Inbound classification & reassembly (§4.2/§4.3) ---------------

    fn handle_inbound(&mut self, network_pdu: NetworkPdu) {
        let src = network_pdu.src();
        let seq = network_pdu.seq();

        let accepted = match self.peers.get_or_create(src) {
            Some(peer) => {
                if peer.accepts_seq(seq) {
                    peer.record_seq(seq);
                    true
                } else {
                    false
                }
            }
            None => false,
        };
        if !accepted {
            return;
        }

        let parsed = match LowerPdu::parse(&network_pdu) {
            Ok(parsed) => parsed,
            Err(_) => return,
        };

        match parsed {
            LowerPdu::Unsegmented(pdu) => self.handle_unsegmented(&network_pdu, pdu),
            LowerPdu::Segmented(seg) => self.handle_segment(&network_pdu, &seg),
        }
    }

    fn handle_unsegmented(&mut self, network_pdu: &NetworkPdu, pdu: UnsegmentedLowerPdu) {
        let src = network_pdu.src();
        match pdu {
            UnsegmentedLowerPdu::Access(access) => {
                self.upper
                    .unsegmented_received(src, access.aid(), access.upper_pdu());
            }
            UnsegmentedLowerPdu::Control(ctrl) => {
                if ctrl.opcode().is_segment_acknowledgment() {
                    self.handle_seg_ack(ctrl.parameters());
                } else {
                    self.upper
                        .control_received(src, ctrl.opcode().value(), ctrl.parameters());
                }
            }
        }
    }

    fn handle_segment(&mut self, network_pdu: &NetworkPdu, seg: &SegmentedLowerPdu) {
        let src = network_pdu.src();
        let ttl = network_pdu.ttl();
        let net_seq = network_pdu.seq();
        let ctl = network_pdu.ctl();
        let seq_zero = seg.seq_zero();
        let seg_o = seg.seg_o();
        let seg_n = seg.seg_n();
        let max_seg = ctl.max_segment_len();
        let segment_bytes: &[u8] = match seg {
            SegmentedLowerPdu::Access(a) => a.segment_m(),
            SegmentedLowerPdu::Control(c) => c.segment_m(),
        };

        enum Action {
            Ingest,
            ResendAck(u32),
            Drop,
        }

        let action = match self.peers.get_or_create(src) {
            None => Action::Drop,
            Some(peer) => {
                if let Some(reassembly) = peer.reassembly() {
                    if reassembly.pdu().seq_zero() == seq_zero {
                        Action::Ingest
                    } else {
                        Action::Drop
                    }
                } else if peer.completed_seq_zero() == Some(seq_zero)
                    && !peer.completed_block_ack().is_empty()
                {
                    Action::ResendAck(peer.completed_block_ack().value())
                } else {
                    let seq_auth = SeqAuth::reconstruct(net_seq, seq_zero);
                    let accept = peer.seq_auth().map(|last| seq_auth > last).unwrap_or(true);
                    if accept {
                        let (akf_aid, szmic) = match seg {
                            SegmentedLowerPdu::Access(a) => (a.akf_aid(), a.szmic()),
                            SegmentedLowerPdu::Control(_) => (None, SzMic::Bit64),
                        };
                        let header = NetworkHeader {
                            netkey_index: network_pdu.netkey_index(),
                            ivi: network_pdu.ivi(),
                            nid: network_pdu.nid(),
                            ctl,
                            ttl,
                            seq_auth: Seq::from(seq_auth),
                            src,
                            dst: network_pdu.dst(),
                        };
                        peer.attach_reassembly(InFlightReassembly::new(UpperTransportPdu::empty(
                            header, akf_aid, szmic, seq_zero,
                        )));
                        Action::Ingest
                    } else {
                        Action::Drop
                    }
                }
            }
        };

        match action {
            Action::Drop => {}
            Action::ResendAck(block_ack) => {
                self.send_ack(
                    network_pdu.netkey_index(),
                    network_pdu.ivi(),
                    network_pdu.nid(),
                    ttl,
                    src,
                    seq_zero,
                    block_ack,
                );
            }
            Action::Ingest => self.ingest_segment(src, ttl, seg_o, seg_n, segment_bytes, max_seg),
        }
    }

    fn ingest_segment(
        &mut self,
        src: UnicastAddress,
        ttl: Ttl,
        seg_o: u8,
        seg_n: u8,
        segment: &[u8],
        max_seg: usize,
    ) {
        let peer = match self.peers.get_or_create(src) {
            Some(peer) => peer,
            None => return,
        };
        let reassembly = match peer.reassembly_mut() {
            Some(reassembly) => reassembly,
            None => return,
        };

        if reassembly.ack_timer().is_none() {
            let id = self
                .timer
                .schedule(150 + 50 * ttl.value() as u32, TimerEvent::AckTimeout(src));
            reassembly.set_ack_timer(Some(id));
        }

        if let Some(old) = reassembly.incomplete_timer() {
            self.timer.cancel(old);
        }
        let inc_id = self.timer.schedule(10_000, TimerEvent::IncompleteTimeout(src));
        reassembly.set_incomplete_timer(Some(inc_id));

        reassembly.ingest(seg_o, seg_n, segment, max_seg);

        if !reassembly.is_complete(seg_n) {
            return;
        }

        let ack_timer = reassembly.ack_timer();
        let inc_timer = reassembly.incomplete_timer();
        if let Some(t) = ack_timer {
            self.timer.cancel(t);
        }
        if let Some(t) = inc_timer {
            self.timer.cancel(t);
        }

        let header = *reassembly.pdu().header();
        let seq_zero = reassembly.pdu().seq_zero();
        let block_ack = reassembly.pdu().block_ack();
        let seq_auth = SeqAuth::from(header.seq_auth);

        let peer = match self.peers.get_or_create(src) {
            Some(peer) => peer,
            None => return,
        };
        let completed = peer.complete_reassembly(seq_auth, seq_zero, block_ack);

        self.send_ack(
            header.netkey_index,
            header.ivi,
            header.nid,
            header.ttl,
            src,
            seq_zero,
            block_ack.value(),
        );
        if let Some(reassembly) = completed {
            self.upper.received(reassembly.into_pdu());
        }
    }

    fn send_ack(
        &mut self,
        netkey_index: u16,
        ivi: Ivi,
        nid: Nid,
        ttl: Ttl,
        dst: UnicastAddress,
        seq_zero: SeqZero,
        block_ack: u32,
    ) {
        let ack = SegmentAcknowledgment::new(false, seq_zero, block_ack);
        let mut body: Vec<u8, 16> = Vec::new();
        if ack.emit(&mut body).is_err() {
            return;
        }
        let seq = self.sequence.next();
        if let Ok(pdu) = NetworkPdu::new(
            netkey_index,
            ivi,
            nid,
            Ctl::Control,
            ttl,
            seq,
            self.primary_element_address,
            Address::Unicast(dst),
            &body,
            (),
        ) {
            let token = self.alloc_send_token();
            self.network.send(pdu, token);
        }
    }

    // ---- Timer callbacks -------------------------------------------------

    fn on_ack_timeout(&mut self, src: UnicastAddress) {
        let snapshot = match self.peers.get_or_create(src) {
            Some(peer) => match peer.reassembly_mut() {
                Some(reassembly) => {
                    reassembly.set_ack_timer(None);
                    Some((
                        *reassembly.pdu().header(),
                        reassembly.pdu().seq_zero(),
                        reassembly.pdu().block_ack().value(),
                    ))
                }
                None => None,
            },
            None => None,
        };
        if let Some((header, seq_zero, block_ack)) = snapshot {
            self.send_ack(header.netkey_index, header.ivi, header.nid, header.ttl, src, seq_zero, block_ack);
        }
    }

    /// Incomplete-timer expiry (§4.3 step 4, §7): the reassembly is
    /// abandoned, not completed — `PeerContext::abandon_reassembly` leaves
    /// `seq_auth` unadvanced, so a later retransmission of the same message
    /// is accepted as new (§9 open question #4, preserved as-is).
    fn on_incomplete_timeout(&mut self, src: UnicastAddress) {
        let reassembly = match self.peers.get_or_create(src) {
            Some(peer) => peer.abandon_reassembly(),
            None => None,
        };
        if let Some(reassembly) = reassembly {
            if let Some(t) = reassembly.ack_timer() {
                self.timer.cancel(t);
            }
        }
    }

    /// A TX ack timeout means no Segment Acknowledgment completed the
    /// bitmap in time. §9 open question #2: the source retransmits
    /// indefinitely on unicast; here every timeout (unicast or group/virtual
    /// alike) consumes one retry, and exhaustion surfaces `SEND_FAILED`.
    fn on_tx_ack_timeout(&mut self) {
        let exhausted = match self.outgoing.as_mut() {
            Some(outgoing) => {
                outgoing.set_ack_timer(None);
                if outgoing.decrement_retry() {
                    outgoing.reset_cursor();
                    false
                } else {
                    true
                }
            }
            None => return,
        };
        if exhausted {
            self.outgoing = None;
            self.upper.sent(SendOutcome::Failed);
        } else {
            self.send_next_segment();
        }
    }

    // ---- Segmentation / TX engine (§4.4) --------------------------------

    fn handle_seg_ack(&mut self, params: &[u8]) {
        let ack = match SegmentAcknowledgment::parse(params) {
            Ok(ack) => ack,
            Err(_) => return,
        };
        let matches = self
            .outgoing
            .as_ref()
            .map(|o| o.pdu().seq_zero() == ack.seq_zero())
            .unwrap_or(false);
        if !matches {
            return;
        }

        if ack.block_ack() == 0 {
            let timer = self.outgoing.as_ref().and_then(|o| o.ack_timer());
            if let Some(t) = timer {
                self.timer.cancel(t);
            }
            self.outgoing = None;
            self.upper.sent(SendOutcome::AbortedByRemote);
            return;
        }

        let complete = self
            .outgoing
            .as_mut()
            .map(|o| o.apply_remote_ack(ack.block_ack()))
            .unwrap_or(false);
        if complete {
            let timer = self.outgoing.as_ref().and_then(|o| o.ack_timer());
            if let Some(t) = timer {
                self.timer.cancel(t);
            }
            self.outgoing = None;
            self.upper.sent(SendOutcome::Success);
        }
    }

    /// Sends the next still-pending segment of the active outgoing message,
    /// or finalizes the current pass if every segment has been dispatched.
    fn send_next_segment(&mut self) {
        let seg_o = match self.outgoing.as_mut().and_then(|o| o.advance_cursor()) {
            Some(seg_o) => seg_o,
            None => {
                self.finish_send_pass();
                return;
            }
        };

        let (header, akf_aid, szmic, seq_zero, seg_n, control_opcode, segment): (
            NetworkHeader,
            Option<Aid>,
            SzMic,
            SeqZero,
            u8,
            Option<ControlOpcode>,
            Vec<u8, 12>,
        ) = {
            let outgoing = self.outgoing.as_ref().unwrap();
            let pdu = outgoing.pdu();
            let header = *pdu.header();
            let max_seg = header.ctl.max_segment_len();
            let segment = Vec::from_slice(outgoing.segment_bytes(seg_o, max_seg)).unwrap_or_default();
            (
                header,
                pdu.akf_aid(),
                pdu.szmic(),
                pdu.seq_zero(),
                outgoing.seg_n(),
                pdu.control_opcode(),
                segment,
            )
        };

        let mut body: Vec<u8, 16> = Vec::new();
        let emitted = match header.ctl {
            Ctl::Access => SegmentedLowerAccessPDU::<()>::new(akf_aid, szmic, seq_zero, seg_o, seg_n, &segment)
                .ok()
                .and_then(|p| p.emit(&mut body).ok()),
            Ctl::Control => match control_opcode {
                Some(opcode) => SegmentedLowerControlPDU::<()>::new(opcode, seq_zero, seg_o, seg_n, &segment)
                    .ok()
                    .and_then(|p| p.emit(&mut body).ok()),
                None => None,
            },
        };
        if emitted.is_none() {
            return;
        }

        let seq = self.sequence.next();
        let network_pdu = match NetworkPdu::new(
            header.netkey_index,
            header.ivi,
            header.nid,
            header.ctl,
            header.ttl,
            seq,
            header.src,
            header.dst,
            &body,
            (),
        ) {
            Ok(pdu) => pdu,
            Err(_) => return,
        };

        if header.dst.is_unicast() {
            let old = self.outgoing.as_ref().and_then(|o| o.ack_timer());
            if let Some(t) = old {
                self.timer.cancel(t);
            }
            let id = self
                .timer
                .schedule(200 + 50 * header.ttl.value() as u32, TimerEvent::TxAckTimeout);
            if let Some(o) = self.outgoing.as_mut() {
                o.set_ack_timer(Some(id));
            }
        }

        let token = self.alloc_send_token();
        if let Some(o) = self.outgoing.as_mut() {
            o.set_send_token(Some(token));
        }
        self.network.send(network_pdu, token);
    }

    /// Called once the send cursor has passed `seg_n` for the current pass
    /// (§4.4 step 5): unicast waits on the ack timer / a remote Segment
    /// Acknowledgment; group/virtual retries up to the bound or fails.
    fn finish_send_pass(&mut self) {
        let unicast = self
            .outgoing
            .as_ref()
            .map(|o| o.pdu().header().dst.is_unicast())
            .unwrap_or(true);
        if unicast {
            return;
        }

        let retried = self.outgoing.as_mut().map(|o| o.decrement_retry()).unwrap_or(false);
        if retried {
            if let Some(o) = self.outgoing.as_mut() {
                o.reset_cursor();
            }
            self.send_next_segment();
        } else {
            self.outgoing = None;
            self.upper.sent(SendOutcome::Failed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::test_util::VirtualTimer;
    use btmesh_common::mic::SzMic;

    struct RecordingNetwork {
        sent: Vec<NetworkPdu, 16>,
        tokens: Vec<SendToken, 16>,
    }

    impl RecordingNetwork {
        fn new() -> Self {
            Self {
                sent: Vec::new(),
                tokens: Vec::new(),
            }
        }

        /// The token of the most recent `send`, as a host's real Network
        /// layer would hand back once that PDU finished going out over the
        /// air.
        fn last_token(&self) -> SendToken {
            *self.tokens.last().unwrap()
        }
    }

    impl NetworkLayer for RecordingNetwork {
        fn send(&mut self, pdu: NetworkPdu, token: SendToken) {
            let _ = self.sent.push(pdu);
            let _ = self.tokens.push(token);
        }
    }

    #[derive(Default)]
    struct RecordingUpper {
        received: Vec<(u16, usize), 8>,
        unsegmented: Vec<usize, 8>,
        outcomes: Vec<SendOutcome, 8>,
    }

    impl UpperTransportHandler for RecordingUpper {
        fn received(&mut self, pdu: UpperTransportPdu) {
            let _ = self.received.push((pdu.seq_zero().value(), pdu.data().len()));
        }

        fn unsegmented_received(&mut self, _src: UnicastAddress, _akf_aid: Option<Aid>, data: &[u8]) {
            let _ = self.unsegmented.push(data.len());
        }

        fn control_received(&mut self, _src: UnicastAddress, _opcode: u8, _parameters: &[u8]) {}

        fn sent(&mut self, outcome: SendOutcome) {
            let _ = self.outcomes.push(outcome);
        }
    }

    type TestLowerTransport = LowerTransport<RecordingNetwork, RecordingUpper, VirtualTimer, 4>;

    fn harness() -> TestLowerTransport {
        let mut lt = LowerTransport::new(RecordingNetwork::new(), RecordingUpper::default(), VirtualTimer::new());
        lt.set_primary_element_address(UnicastAddress::new(1).unwrap());
        lt
    }

    fn inbound_network_pdu(seq: u32, body: &[u8]) -> NetworkPdu {
        NetworkPdu::new(
            0,
            Ivi::Zero,
            Nid::new(0x10),
            Ctl::Access,
            Ttl::new(5),
            Seq::new(seq),
            UnicastAddress::new(0x0002).unwrap(),
            Address::Unicast(UnicastAddress::new(0x0001).unwrap()),
            body,
            (),
        )
        .unwrap()
    }

    /// Like [`inbound_network_pdu`], but carries the network CTL bit set —
    /// needed for an incoming Segment Acknowledgment, which is a lower-
    /// transport *control* message, not access.
    fn inbound_control_pdu(seq: u32, body: &[u8]) -> NetworkPdu {
        NetworkPdu::new(
            0,
            Ivi::Zero,
            Nid::new(0x10),
            Ctl::Control,
            Ttl::new(5),
            Seq::new(seq),
            UnicastAddress::new(0x0002).unwrap(),
            Address::Unicast(UnicastAddress::new(0x0001).unwrap()),
            body,
            (),
        )
        .unwrap()
    }

    /// §8 scenario 1: single-segment inbound produces a delivered PDU and an
    /// ACK with seq_zero=2, block_ack=1.
    #[test]
    fn scenario_single_segment_inbound_acks_and_delivers() {
        let mut lt = harness();
        let body = [0x80u8, 0x00, 0x08, 0x00, 0xAA, 0xBB, 0xCC, 0xDD];
        lt.network_pdu_received(inbound_network_pdu(100, &body)).unwrap();

        assert_eq!(lt.upper.received.len(), 1);
        assert_eq!(lt.upper.received[0], (2, 4));
        assert_eq!(lt.network.sent.len(), 1);
        assert_eq!(lt.network.sent[0].transport_pdu()[0], 0x00);
    }

    /// A two-segment access message: seq_zero=5, seg_n=1, segment 0 is the
    /// full 12-byte slot and segment 1 is the 2-byte remainder. Computed
    /// against the same body[1..4) formula `SegmentedLowerAccessPDU::emit`
    /// writes, so it round-trips through `parse` with the `seg_o`/`seg_n`
    /// the test intends rather than arbitrary bytes.
    const TWO_SEGMENT_SEG0: [u8; 16] = [
        0x80, 0x00, 0x14, 0x01, 0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF, 0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF,
    ];
    const TWO_SEGMENT_SEG1: [u8; 6] = [0x80, 0x00, 0x14, 0x21, 0xEE, 0xFF];

    /// §8 scenario 2: out-of-order segments for the same message reassemble
    /// once both arrive, with no ACK emitted before completion.
    #[test]
    fn scenario_out_of_order_reassembles_then_acks_once() {
        let mut lt = harness();
        lt.network_pdu_received(inbound_network_pdu(200, &TWO_SEGMENT_SEG1)).unwrap();
        assert_eq!(lt.network.sent.len(), 0);
        assert_eq!(lt.upper.received.len(), 0);

        lt.network_pdu_received(inbound_network_pdu(201, &TWO_SEGMENT_SEG0)).unwrap();

        assert_eq!(lt.upper.received.len(), 1);
        assert_eq!(lt.network.sent.len(), 1);
    }

    /// §8 scenario 3: replaying a segment of an already-completed message
    /// retransmits the cached ACK and does not start a new reassembly.
    #[test]
    fn scenario_duplicate_of_completed_message_resends_ack_only() {
        let mut lt = harness();
        lt.network_pdu_received(inbound_network_pdu(200, &TWO_SEGMENT_SEG1)).unwrap();
        lt.network_pdu_received(inbound_network_pdu(201, &TWO_SEGMENT_SEG0)).unwrap();
        assert_eq!(lt.upper.received.len(), 1);
        assert_eq!(lt.network.sent.len(), 1);

        // A later, higher-SEQ replay of segment 0 belongs to the message
        // already folded into `peer.block_ack` — it must not reassemble.
        lt.network_pdu_received(inbound_network_pdu(202, &TWO_SEGMENT_SEG0)).unwrap();

        assert_eq!(lt.upper.received.len(), 1, "no new reassembly from the duplicate");
        assert_eq!(lt.network.sent.len(), 2, "the cached ACK is retransmitted");
        assert_eq!(lt.network.sent[1].transport_pdu()[1..], lt.network.sent[0].transport_pdu()[1..]);
    }

    /// §8 scenario 6 / §9 open question #4: incomplete-timer expiry does not
    /// advance the peer's seq_auth, so a later retransmission of the same
    /// message is accepted as new rather than treated as a stale duplicate.
    #[test]
    fn incomplete_timeout_does_not_block_later_retransmission() {
        let mut lt = harness();
        lt.network_pdu_received(inbound_network_pdu(300, &TWO_SEGMENT_SEG0)).unwrap();
        assert_eq!(lt.upper.received.len(), 0);

        let due = lt.timer.advance(10_000);
        for event in due {
            lt.timer_fired(event);
        }
        assert_eq!(lt.network.sent.len(), 0, "no ACK is sent from incomplete-timer expiry");

        // Same seg_o=0 retransmitted later with a fresh, higher SEQ: accepted
        // as a brand new reassembly rather than dropped as stale.
        lt.network_pdu_received(inbound_network_pdu(301, &TWO_SEGMENT_SEG0)).unwrap();
        assert_eq!(lt.network.sent.len(), 0);
    }

    /// §8 scenario 4/§9 bug #3: a Segment Acknowledgment that completes the
    /// bitmap must surface `Success`, not `AbortedByRemote`.
    #[test]
    fn tx_completion_surfaces_success_not_abort() {
        let mut lt = harness();
        let header = NetworkHeader {
            netkey_index: 0,
            ivi: Ivi::Zero,
            nid: Nid::new(0x10),
            ctl: Ctl::Access,
            ttl: Ttl::new(5),
            seq_auth: Seq::new(0x2000),
            src: UnicastAddress::new(0x0001).unwrap(),
            dst: Address::Unicast(UnicastAddress::new(0x0002).unwrap()),
        };
        let pdu = UpperTransportPdu::new(header, None, SzMic::Bit32, &[0xAAu8; 24]).unwrap();
        lt.send_segmented(pdu).unwrap();
        assert_eq!(lt.network.sent.len(), 1);
        lt.network_pdu_sent(lt.network.last_token());
        assert_eq!(lt.network.sent.len(), 2);

        // seq_zero=0 (matches the outgoing message's seq_auth=0x2000), block_ack=0x3.
        let ack_body = [0x00u8, 0x00, 0x00, 0x00, 0x00, 0x00, 0x03];
        lt.network_pdu_received(inbound_control_pdu(400, &ack_body)).unwrap();

        assert_eq!(lt.upper.outcomes.len(), 1);
        assert_eq!(lt.upper.outcomes[0], SendOutcome::Success);
    }

    /// §8 scenario 5: a Segment Acknowledgment with block_ack=0 aborts the
    /// send and is reported distinctly from success.
    #[test]
    fn tx_remote_abort_surfaces_aborted_by_remote() {
        let mut lt = harness();
        let header = NetworkHeader {
            netkey_index: 0,
            ivi: Ivi::Zero,
            nid: Nid::new(0x10),
            ctl: Ctl::Access,
            ttl: Ttl::new(5),
            seq_auth: Seq::new(0x2000),
            src: UnicastAddress::new(0x0001).unwrap(),
            dst: Address::Unicast(UnicastAddress::new(0x0002).unwrap()),
        };
        let pdu = UpperTransportPdu::new(header, None, SzMic::Bit32, &[0xAAu8; 24]).unwrap();
        lt.send_segmented(pdu).unwrap();
        lt.network_pdu_sent(lt.network.last_token());

        // seq_zero=0, block_ack=0: the remote rejects the whole message.
        let abort_body = [0x00u8, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];
        lt.network_pdu_received(inbound_control_pdu(500, &abort_body)).unwrap();

        assert_eq!(lt.upper.outcomes.len(), 1);
        assert_eq!(lt.upper.outcomes[0], SendOutcome::AbortedByRemote);
    }

    /// §6 `dump()`: the snapshot tracks peer count and in-flight state
    /// rather than requiring callers to reach into private fields.
    #[test]
    fn dump_reflects_peer_and_outgoing_state() {
        let mut lt = harness();
        assert_eq!(lt.dump().peer_count, 0);
        assert!(!lt.dump().outgoing_active);

        let body = [0x80u8, 0x00, 0x08, 0x00, 0xAA, 0xBB, 0xCC, 0xDD];
        lt.network_pdu_received(inbound_network_pdu(100, &body)).unwrap();
        assert_eq!(lt.dump().peer_count, 1);

        let header = NetworkHeader {
            netkey_index: 0,
            ivi: Ivi::Zero,
            nid: Nid::new(0x10),
            ctl: Ctl::Access,
            ttl: Ttl::new(5),
            seq_auth: Seq::new(0x2000),
            src: UnicastAddress::new(0x0001).unwrap(),
            dst: Address::Unicast(UnicastAddress::new(0x0002).unwrap()),
        };
        let pdu = UpperTransportPdu::new(header, None, SzMic::Bit32, &[0xAAu8; 24]).unwrap();
        lt.send_segmented(pdu).unwrap();
        assert!(lt.dump().outgoing_active);
    }

    /// §9 bug #2: a unicast send that never receives a completing ack is
    /// bounded, eventually surfacing `Failed` rather than retrying forever.
    #[test]
    fn tx_ack_timeout_exhaustion_surfaces_failed() {
        let mut lt = harness();
        lt.set_unicast_retries(2);
        let header = NetworkHeader {
            netkey_index: 0,
            ivi: Ivi::Zero,
            nid: Nid::new(0x10),
            ctl: Ctl::Access,
            ttl: Ttl::new(0),
            seq_auth: Seq::new(0x3000),
            src: UnicastAddress::new(0x0001).unwrap(),
            dst: Address::Unicast(UnicastAddress::new(0x0002).unwrap()),
        };
        let pdu = UpperTransportPdu::new(header, None, SzMic::Bit32, &[0xAAu8; 4]).unwrap();
        lt.send_segmented(pdu).unwrap();
        lt.network_pdu_sent(lt.network.last_token());

        for _ in 0..2 {
            let due = lt.timer.advance(200);
            for event in due {
                lt.timer_fired(event);
            }
            lt.network_pdu_sent(lt.network.last_token());
        }
        let due = lt.timer.advance(200);
        for event in due {
            lt.timer_fired(event);
        }

        assert_eq!(lt.upper.outcomes.last(), Some(&SendOutcome::Failed));
    }

    /// An interleaved Segment Acknowledgment's own `SENT` completion must not
    /// be mistaken for the in-flight segmented send's completion: it carries
    /// a different token, so it must not advance the outgoing cursor.
    #[test]
    fn interleaved_ack_send_does_not_advance_outgoing_cursor() {
        let mut lt = harness();
        let header = NetworkHeader {
            netkey_index: 0,
            ivi: Ivi::Zero,
            nid: Nid::new(0x10),
            ctl: Ctl::Access,
            ttl: Ttl::new(5),
            seq_auth: Seq::new(0x2000),
            src: UnicastAddress::new(0x0001).unwrap(),
            dst: Address::Unicast(UnicastAddress::new(0x0002).unwrap()),
        };
        let pdu = UpperTransportPdu::new(header, None, SzMic::Bit32, &[0xAAu8; 24]).unwrap();
        lt.send_segmented(pdu).unwrap();
        assert_eq!(lt.network.sent.len(), 1, "segment 0 dispatched");
        let segment_token = lt.network.last_token();

        // A fully separate inbound reassembly completes and its ACK is sent
        // fire-and-forget while segment 0's own SENT is still outstanding.
        let body = [0x80u8, 0x00, 0x08, 0x00, 0xAA, 0xBB, 0xCC, 0xDD];
        lt.network_pdu_received(inbound_network_pdu(100, &body)).unwrap();
        assert_eq!(lt.network.sent.len(), 2, "the ack was also dispatched");
        let ack_token = lt.network.last_token();
        assert_ne!(segment_token, ack_token);

        // The ack's completion lands on the same callback but must not
        // advance the outgoing message past segment 0.
        lt.network_pdu_sent(ack_token);
        assert_eq!(
            lt.network.sent.len(),
            2,
            "an unrelated ack completion must not emit segment 1"
        );

        // Only the real segment 0 completion unblocks segment 1.
        lt.network_pdu_sent(segment_token);
        assert_eq!(lt.network.sent.len(), 3, "segment 1 now dispatched");
    }
}
