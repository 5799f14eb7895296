use crate::reassembly::InFlightReassembly;
use btmesh_common::address::UnicastAddress;
use btmesh_common::{Seq, SeqAuth, SeqZero};
use btmesh_pdu::lower::BlockAck;
use heapless::FnvIndexMap;

/// Per-source-address reassembly bookkeeping (§3 "Peer context"). Lookup is
/// by SRC address; a context is created lazily on first contact and never
/// evicted by this layer (no eviction policy is required by the spec).
pub struct PeerContext {
    seq: Option<Seq>,
    seq_auth: Option<SeqAuth>,
    seq_zero: Option<SeqZero>,
    block_ack: BlockAck,
    reassembly: Option<InFlightReassembly>,
}

impl Default for PeerContext {
    fn default() -> Self {
        Self {
            seq: None,
            seq_auth: None,
            seq_zero: None,
            block_ack: BlockAck::default(),
            reassembly: None,
        }
    }
}

impl PeerContext {
    /// Replay guard: accepted iff strictly greater than the last-seen SEQ.
    pub fn accepts_seq(&self, seq: Seq) -> bool {
        match self.seq {
            None => true,
            Some(last) => seq > last,
        }
    }

    pub fn record_seq(&mut self, seq: Seq) {
        self.seq = Some(seq);
    }

    pub fn seq_auth(&self) -> Option<SeqAuth> {
        self.seq_auth
    }

    pub fn completed_seq_zero(&self) -> Option<SeqZero> {
        self.seq_zero
    }

    pub fn completed_block_ack(&self) -> BlockAck {
        self.block_ack
    }

    pub fn reassembly(&self) -> Option<&InFlightReassembly> {
        self.reassembly.as_ref()
    }

    pub fn reassembly_mut(&mut self) -> Option<&mut InFlightReassembly> {
        self.reassembly.as_mut()
    }

    pub fn attach_reassembly(&mut self, reassembly: InFlightReassembly) {
        self.reassembly = Some(reassembly);
    }

    /// Detaches the active reassembly without marking the message complete
    /// (incomplete-timer expiry: `seq_auth` is deliberately left unadvanced,
    /// per the documented §9 open question — a later retransmission of the
    /// same message is therefore accepted as new).
    pub fn abandon_reassembly(&mut self) -> Option<InFlightReassembly> {
        self.reassembly.take()
    }

    /// Detaches the active reassembly as a completed message: advances
    /// `seq_auth`/`seq_zero`/`block_ack` so a later duplicate segment
    /// re-triggers a cached ACK instead of starting a new reassembly.
    pub fn complete_reassembly(&mut self, seq_auth: SeqAuth, seq_zero: SeqZero, block_ack: BlockAck) -> Option<InFlightReassembly> {
        let reassembly = self.reassembly.take();
        self.seq_auth = Some(seq_auth);
        self.seq_zero = Some(seq_zero);
        self.block_ack = block_ack;
        reassembly
    }
}

/// Fixed-capacity table of peer contexts keyed by source unicast address.
pub struct PeerRegistry<const N: usize> {
    peers: FnvIndexMap<UnicastAddress, PeerContext, N>,
}

impl<const N: usize> Default for PeerRegistry<N> {
    fn default() -> Self {
        Self {
            peers: FnvIndexMap::new(),
        }
    }
}

impl<const N: usize> PeerRegistry<N> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up (or lazily creates) the context for `address`. Returns
    /// `None` only if the table is at capacity and `address` is not already
    /// present.
    pub fn get_or_create(&mut self, address: UnicastAddress) -> Option<&mut PeerContext> {
        if !self.peers.contains_key(&address) {
            self.peers
                .insert(address, PeerContext::default())
                .ok()?;
        }
        self.peers.get_mut(&address)
    }

    pub fn get(&self, address: UnicastAddress) -> Option<&PeerContext> {
        self.peers.get(&address)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn reset(&mut self) {
        self.peers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seq_strictly_increasing() {
        let mut peer = PeerContext::default();
        assert!(peer.accepts_seq(Seq::new(5)));
        peer.record_seq(Seq::new(5));
        assert!(!peer.accepts_seq(Seq::new(5)));
        assert!(!peer.accepts_seq(Seq::new(4)));
        assert!(peer.accepts_seq(Seq::new(6)));
    }

    #[test]
    fn registry_lazily_creates_and_reuses() {
        let mut registry: PeerRegistry<4> = PeerRegistry::new();
        let addr = UnicastAddress::new(1).unwrap();
        registry.get_or_create(addr).unwrap().record_seq(Seq::new(1));
        assert_eq!(registry.get(addr).unwrap().seq, Some(Seq::new(1)));
    }
}
